//! Configuration loading and text rendering for the postsync CLI.

use anyhow::{Context, Result};
use postsync_sync::{
    RecordOutcome, RefreshOutcome, RefreshReport, ReplayResult, StatusSummary, SyncConfig,
    SyncReport,
};
use postsync_types::EnhancedPost;
use std::fmt::Write;
use std::path::Path;

/// Loads the config file if one is given, then applies the `--api-url`
/// override.
pub fn load_config(path: Option<&Path>, api_url: Option<&str>) -> Result<SyncConfig> {
    let mut config = match path {
        Some(path) => SyncConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SyncConfig::default(),
    };
    if let Some(url) = api_url {
        config.remote.base_url = url.trim_end_matches('/').to_string();
    }
    Ok(config)
}

fn describe_outcome(outcome: &RecordOutcome) -> String {
    let result = match &outcome.result {
        ReplayResult::Synced { id } if *id != outcome.id => format!("synced as {id}"),
        ReplayResult::Synced { .. } => "synced".to_string(),
        ReplayResult::Purged => "deleted".to_string(),
        ReplayResult::Failed(e) => format!("failed: {e}"),
        ReplayResult::DeleteFailed(e) => format!("delete failed: {e}"),
        ReplayResult::Skipped => "skipped".to_string(),
        ReplayResult::Superseded => "superseded by a newer local edit".to_string(),
        ReplayResult::Unrecorded(e) => format!("not recorded: {e}"),
    };
    format!(
        "  {:<8} {:>6}  {:<7} {}",
        outcome.kind.as_str(),
        outcome.id,
        format!("{:?}", outcome.action).to_lowercase(),
        result
    )
}

pub fn render_report(report: &SyncReport) -> String {
    if report.is_empty() {
        return "Nothing to sync.\n".to_string();
    }
    let mut out = String::new();
    for outcome in &report.outcomes {
        let _ = writeln!(out, "{}", describe_outcome(outcome));
    }
    for kind in &report.busy {
        let _ = writeln!(out, "  {:<8} already syncing, skipped", kind.as_str());
    }
    for (kind, error) in &report.failed_kinds {
        let _ = writeln!(out, "  {:<8} could not be loaded: {error}", kind.as_str());
    }
    let _ = writeln!(
        out,
        "{} synced, {} deleted, {} failed, {} skipped",
        report.synced(),
        report.purged(),
        report.failed(),
        report.skipped()
    );
    if report.queue_cleared {
        let _ = writeln!(out, "Cleared {} queued operations.", report.drained_operations);
    } else {
        let _ = writeln!(out, "Queue kept for the next pass.");
    }
    out
}

pub fn render_refresh(report: &RefreshReport) -> String {
    let mut out = String::new();
    for (kind, outcome) in &report.collections {
        let line = match outcome {
            RefreshOutcome::Updated(n) => format!("{n} updated"),
            RefreshOutcome::Busy => "already syncing, skipped".to_string(),
            RefreshOutcome::Failed(e) => format!("failed: {e}"),
        };
        let _ = writeln!(out, "  {:<8} {line}", kind.as_str());
    }
    out
}

pub fn render_status(summary: &StatusSummary) -> String {
    let mut out = String::new();
    for collection in &summary.collections {
        let _ = write!(out, "  {:<8} {:>5} total", collection.kind.as_str(), collection.total);
        for (status, n) in &collection.by_status {
            if *n > 0 {
                let _ = write!(out, ", {n} {status}");
            }
        }
        out.push('\n');
    }
    let _ = writeln!(out, "  {} queued operations", summary.queued_operations);
    out
}

pub fn render_posts(posts: &[EnhancedPost]) -> String {
    let mut out = String::new();
    for enhanced in posts {
        let post = &enhanced.post;
        let id = post.id.map_or_else(|| "-".to_string(), |id| id.to_string());
        let _ = writeln!(
            out,
            "{:>6}  {}  ({} by {}, {} comments)",
            id,
            post.title,
            post.meta.sync_status,
            enhanced.author_name,
            enhanced.comment_count
        );
    }
    out
}

/// Posts as a JSON array, for scripting.
pub fn posts_json(posts: &[EnhancedPost]) -> Result<String> {
    serde_json::to_string_pretty(posts).context("Failed to serialize posts")
}
