//! Output formatting module
//!
//! Handles:
//! - Human-readable rendering of summaries, file trees and errors
//! - JSON output of reports and watch events
//! - Timestamped event lines for interactive watches

use anyhow::Result;
use serde::Serialize;
use std::fmt::Write as _;
use time::format_description::well_known::Iso8601;
use time::OffsetDateTime;

use crate::constants::TBD_NODE;
use crate::session::{ErrorRecord, ReportSource, WatchEvent, WatchReport};
use crate::summary::Summary;
use crate::tree::{FileTree, NodeId};

const SHORT_HASH_LEN: usize = 12;

/// Current UTC time in ISO 8601
pub fn timestamp_now() -> Result<String> {
    Ok(OffsetDateTime::now_utc().format(&Iso8601::DEFAULT)?)
}

/// One line describing a watch event
pub fn format_event_human(timestamp: &str, event: &WatchEvent) -> String {
    let detail = match event {
        WatchEvent::StatusChanged { from, to } => format!("Status changed: {} -> {}", from, to),
        WatchEvent::ResultsMerged { results, errors } => {
            format!("Merged {} results and {} errors", results, errors)
        }
        WatchEvent::OutstandingServices { services: None } => {
            "Outstanding services: none trackable (rescheduled)".to_string()
        }
        WatchEvent::OutstandingServices { services: Some(services) } if services.is_empty() => {
            "Outstanding services: none (queued)".to_string()
        }
        WatchEvent::OutstandingServices { services: Some(services) } => {
            let list: Vec<String> = services
                .iter()
                .map(|(name, files)| format!("{} ({})", name, files))
                .collect();
            format!("Outstanding services: {}", list.join(", "))
        }
        WatchEvent::ChannelError { message } => format!("Live channel error: {}", message),
        WatchEvent::Completed { sid } => format!("Submission {} completed", sid),
    };
    format!("[{}] {}", timestamp, detail)
}

#[derive(Serialize)]
struct TimestampedEvent<'a> {
    timestamp: &'a str,
    #[serde(flatten)]
    event: &'a WatchEvent,
}

/// A watch event as a single-line JSON object
pub fn format_event_json(timestamp: &str, event: &WatchEvent) -> Result<String> {
    Ok(serde_json::to_string(&TimestampedEvent { timestamp, event })?)
}

/// Pretty JSON of any serializable report
pub fn format_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Tags by section and type, heuristics by tier, attack matrix by category
pub fn format_summary_human(summary: &Summary) -> String {
    let mut out = String::new();
    if summary.is_empty() {
        out.push_str("No summary data.\n");
        return out;
    }

    for (section, groups) in &summary.tags {
        let _ = writeln!(out, "{}:", serde_label(section));
        for (tag_type, entries) in groups {
            let _ = writeln!(out, "  {}:", tag_type);
            for entry in entries {
                let _ = writeln!(out, "    {} [{}]", entry.value, entry.verdict);
            }
        }
    }

    if !summary.heuristics.is_empty() {
        out.push_str("heuristics:\n");
        // Most severe tier first
        for (verdict, entries) in summary.heuristics.iter().rev() {
            let _ = writeln!(out, "  {}:", verdict);
            for entry in entries {
                let _ = writeln!(out, "    {} {}", entry.heur_id, entry.name);
            }
        }
    }

    if !summary.attack_matrix.is_empty() {
        out.push_str("attack matrix:\n");
        for (category, entries) in &summary.attack_matrix {
            let _ = writeln!(out, "  {}:", category);
            for entry in entries {
                let _ = writeln!(out, "    {} {} [{}]", entry.attack_id, entry.pattern, entry.verdict);
            }
        }
    }
    out
}

fn serde_label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

/// Indented tree with names, scores and short hashes
pub fn format_tree_human(tree: &FileTree) -> String {
    let mut out = String::new();
    if tree.is_empty() {
        out.push_str("No files.\n");
        return out;
    }

    for root in tree.roots() {
        write_node(&mut out, tree, *root, 0);
    }
    if tree.has_pending() {
        let _ = writeln!(out, "{} (parent not yet known)", TBD_NODE);
        for parked in tree.pending() {
            write_node(&mut out, tree, *parked, 1);
        }
    }
    out
}

fn write_node(out: &mut String, tree: &FileTree, id: NodeId, depth: usize) {
    let node = tree.node(id);
    let name = if node.names.is_empty() {
        "(unnamed)".to_string()
    } else {
        node.names.join(" | ")
    };
    let short: String = node.sha256.chars().take(SHORT_HASH_LEN).collect();
    let truncated = if node.truncated { " (truncated)" } else { "" };
    let _ = writeln!(
        out,
        "{}{} [{}] score={} {}{}",
        "  ".repeat(depth),
        name,
        node.file_type,
        node.score,
        short,
        truncated
    );
    for child in tree.children(id) {
        write_node(out, tree, *child, depth + 1);
    }
}

pub fn format_errors_human(errors: &[ErrorRecord]) -> String {
    let mut out = String::new();
    if errors.is_empty() {
        return out;
    }
    let _ = writeln!(out, "Errors ({}):", errors.len());
    for error in errors {
        let service = error.service.as_deref().unwrap_or("-");
        match &error.message {
            Some(message) => {
                let _ = writeln!(out, "  {} {}: {}", error.key, service, message);
            }
            None => {
                let _ = writeln!(out, "  {}", error.key);
            }
        }
    }
    out
}

/// Full human rendering of a watch outcome
pub fn format_report_human(report: &WatchReport) -> String {
    let mut out = String::new();
    let source = match report.source {
        ReportSource::Authoritative => "authoritative",
        ReportSource::Live => "live (incomplete)",
    };
    let _ = writeln!(out, "Submission {}", report.submission.sid);
    let _ = writeln!(out, "  Status: {}", report.status);
    let _ = writeln!(out, "  Data: {}", source);
    if let Some(score) = report.submission.max_score {
        let _ = writeln!(out, "  Max score: {}", score);
    }
    out.push('\n');

    out.push_str(&format_summary_human(&report.summary));
    out.push('\n');
    out.push_str(&format_tree_human(&FileTree::from_wire(&report.tree)));

    let errors = format_errors_human(&report.errors);
    if !errors.is_empty() {
        out.push('\n');
        out.push_str(&errors);
    }
    out
}
