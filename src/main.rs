#![forbid(unsafe_code)]

mod cli;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use cli::{Action, CliArgs};
use subwatch::api::{HttpApi, SubmissionApi};
use subwatch::config::WatchConfiguration;
use subwatch::live::SocketIoConnector;
use subwatch::session::SubmissionWatcher;
use subwatch::tree::FileTree;
use subwatch::{logging, output};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args()?;

    let mut config = WatchConfiguration::load(args.config_path.as_deref())?;
    if let Some(server) = &args.server {
        config.server.url = server.clone();
    }
    if let Some(interval_ms) = args.poll_interval_ms {
        config.live.poll_interval_ms = interval_ms;
    }
    config.validate()?;

    logging::init_logging(config.logging.level, config.logging.unified)?;

    let api = Arc::new(HttpApi::new(&config.server).context("Failed to create HTTP client")?);

    match args.action {
        Action::Summary => {
            let report = api
                .get_summary(&args.sid)
                .await
                .with_context(|| format!("Failed to fetch summary of {}", args.sid))?;
            if args.json_output {
                println!("{}", output::format_json(&report)?);
            } else {
                print!("{}", output::format_summary_human(&report.summary));
            }
        }
        Action::Tree => {
            let report = api
                .get_tree(&args.sid)
                .await
                .with_context(|| format!("Failed to fetch file tree of {}", args.sid))?;
            if args.json_output {
                println!("{}", output::format_json(&report)?);
            } else {
                print!("{}", output::format_tree_human(&FileTree::from_wire(&report.tree)));
            }
        }
        Action::Watch => run_watch(&args, &config, api).await?,
    }

    Ok(())
}

async fn run_watch(args: &CliArgs, config: &WatchConfiguration, api: Arc<HttpApi>) -> Result<()> {
    let connector = SocketIoConnector::new(&config.server).context("Failed to prepare live channel")?;
    let mut watcher = SubmissionWatcher::new(api, Arc::new(connector), config);

    let printer = if args.quiet_mode {
        None
    } else {
        let mut events = watcher.subscribe();
        let json = args.json_output;
        Some(tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(missed)) => {
                        log::warn!("Skipped {} watch events", missed);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                let timestamp = output::timestamp_now().unwrap_or_default();
                // JSON mode keeps stdout for the final report
                if json {
                    match output::format_event_json(&timestamp, &event) {
                        Ok(line) => eprintln!("{}", line),
                        Err(e) => log::warn!("Failed to encode event: {}", e),
                    }
                } else {
                    println!("{}", output::format_event_human(&timestamp, &event));
                }
            }
        }))
    };

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let report = watcher
        .watch(&args.sid, shutdown)
        .await
        .with_context(|| format!("Failed to watch submission {}", args.sid))?;

    // Closing the bus ends the printer
    drop(watcher);
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    if args.json_output {
        println!("{}", output::format_json(&report)?);
    } else {
        println!();
        print!("{}", output::format_report_human(&report));
    }
    Ok(())
}
