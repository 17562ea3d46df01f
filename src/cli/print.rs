use std::fmt::Write as _;

use curator_api_types::{DashboardStats, Feed, JobSnapshot, StepStatus};
use serde::Serialize;

use super::CliError;

pub fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

pub fn feed_table(feeds: &[Feed]) -> String {
    let mut out = String::new();
    for feed in feeds {
        let state = if feed.active() { "active" } else { "paused" };
        let _ = writeln!(
            out,
            "{:>5}  {:<7} {:<32} {}",
            feed.id, state, feed.source_name, feed.url
        );
    }
    out
}

pub fn job_summary(job: &JobSnapshot) -> String {
    let mut out = format!(
        "job #{} {:?}: {}/{} steps done, {} failed",
        job.id, job.status, job.completed_steps, job.total_steps, job.failed_steps
    );
    if let Some(message) = job.message.as_deref() {
        let _ = write!(out, " ({message})");
    }
    for step in &job.steps {
        let name = step.source_name.as_deref().unwrap_or(&step.source_type);
        let detail = match step.status {
            StepStatus::Skipped => step.skip_reason.as_deref(),
            StepStatus::Failed => step.error_message.as_deref(),
            _ => None,
        };
        let _ = write!(out, "\n  {:<10} {name}", format!("{:?}", step.status));
        if let Some(detail) = detail {
            let _ = write!(out, " - {detail}");
        }
    }
    out
}

pub fn dashboard(stats: &DashboardStats) -> String {
    format!(
        "categories   {}\nfeeds        {} ({} active)\ntags         {}\nleads        {}",
        stats.categories, stats.feeds, stats.active_feeds, stats.tags, stats.leads
    )
}
