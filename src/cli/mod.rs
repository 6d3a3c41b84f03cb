//! CLI argument parsing and validation module
//!
//! Handles command-line interface using clap, including:
//! - The `watch`, `summary` and `tree` subcommands
//! - Config file selection and per-run overrides
//! - Output format selection (human/JSON)
//! - Quiet mode

use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

/// What the user asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Watch,
    Summary,
    Tree,
}

/// Parsed command line
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub action: Action,
    pub sid: String,
    pub config_path: Option<PathBuf>,
    pub server: Option<String>,
    /// Poll interval override in milliseconds
    pub poll_interval_ms: Option<u64>,
    pub json_output: bool,
    pub quiet_mode: bool,
}

fn long_version() -> &'static str {
    concat!(env!("SUBWATCH_VERSION"), " (", env!("GIT_HASH"), ")")
}

fn sid_arg() -> Arg {
    Arg::new("sid")
        .value_name("SID")
        .help("Submission identifier")
        .required(true)
}

fn common_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Configuration file (default: <config dir>/subwatch/config.toml)")
                .global(true),
        )
        .arg(
            Arg::new("server")
                .short('s')
                .long("server")
                .value_name("URL")
                .help("Platform base URL, overrides the config file")
                .global(true),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .help("Output in JSON format")
                .action(ArgAction::SetTrue)
                .global(true),
        )
}

/// Build the clap command tree
pub fn build_command() -> Command {
    let watch = Command::new("watch")
        .about("Follow a submission live until it completes")
        .arg(sid_arg())
        .arg(
            Arg::new("poll-interval")
                .short('i')
                .long("poll-interval")
                .value_name("SECONDS")
                .help("Polling interval in seconds (0.1 - 300.0)")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Do not print events while watching")
                .action(ArgAction::SetTrue),
        );

    let summary = Command::new("summary")
        .about("Print the authoritative summary of a submission")
        .arg(sid_arg());

    let tree = Command::new("tree")
        .about("Print the authoritative file tree of a submission")
        .arg(sid_arg());

    common_args(
        Command::new("subwatch")
            .version(env!("SUBWATCH_VERSION"))
            .long_version(long_version())
            .about("Follow file-analysis submissions live")
            .long_about(
                "Follows a submission on a file-analysis platform: streams its results as they are \
                 produced, aggregates tags, heuristics, the attack matrix and the file tree, and \
                 falls back to polling when the live channel is silent.",
            )
            .subcommand_required(true)
            .arg_required_else_help(true)
            .subcommand(watch)
            .subcommand(summary)
            .subcommand(tree),
    )
}

/// Parse command line arguments
pub fn parse_args() -> Result<CliArgs> {
    from_matches(&build_command().get_matches())
}

fn from_matches(matches: &ArgMatches) -> Result<CliArgs> {
    let (action, sub) = match matches.subcommand() {
        Some(("watch", sub)) => (Action::Watch, sub),
        Some(("summary", sub)) => (Action::Summary, sub),
        Some(("tree", sub)) => (Action::Tree, sub),
        _ => return Err(anyhow!("No subcommand given")),
    };

    let sid = sub
        .get_one::<String>("sid")
        .cloned()
        .ok_or_else(|| anyhow!("Missing submission id"))?;

    let poll_interval_ms = match action {
        Action::Watch => match sub.get_one::<f64>("poll-interval") {
            Some(secs) => Some(validate_poll_interval(*secs)?),
            None => None,
        },
        _ => None,
    };
    let quiet_mode = action == Action::Watch && sub.get_flag("quiet");

    Ok(CliArgs {
        action,
        sid,
        config_path: sub.get_one::<String>("config").map(PathBuf::from),
        server: sub.get_one::<String>("server").cloned(),
        poll_interval_ms,
        json_output: sub.get_flag("json"),
        quiet_mode,
    })
}

fn validate_poll_interval(secs: f64) -> Result<u64> {
    if !(0.1..=300.0).contains(&secs) {
        return Err(anyhow!(
            "Invalid polling interval: {}s. Must be between 0.1 and 300.0 seconds",
            secs
        ));
    }
    Ok((secs * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliArgs> {
        let matches = build_command().try_get_matches_from(args)?;
        from_matches(&matches)
    }

    #[test]
    fn test_watch_with_overrides() {
        let args = parse(&[
            "subwatch", "watch", "sid-1", "--poll-interval", "2.5", "--server", "https://al", "--json", "-q",
        ])
        .unwrap();
        assert_eq!(args.action, Action::Watch);
        assert_eq!(args.sid, "sid-1");
        assert_eq!(args.poll_interval_ms, Some(2500));
        assert_eq!(args.server.as_deref(), Some("https://al"));
        assert!(args.json_output);
        assert!(args.quiet_mode);
    }

    #[test]
    fn test_global_flags_before_subcommand() {
        let args = parse(&["subwatch", "--config", "/tmp/c.toml", "summary", "sid-2"]).unwrap();
        assert_eq!(args.action, Action::Summary);
        assert_eq!(args.config_path, Some(PathBuf::from("/tmp/c.toml")));
        assert!(!args.quiet_mode);
    }

    #[test]
    fn test_poll_interval_out_of_range() {
        assert!(parse(&["subwatch", "watch", "s", "--poll-interval", "0.05"]).is_err());
        assert!(parse(&["subwatch", "watch", "s", "--poll-interval", "301"]).is_err());
    }

    #[test]
    fn test_sid_is_required() {
        assert!(parse(&["subwatch", "tree"]).is_err());
    }
}
