//! `docpipe queue list`: print jobs still in flight, same shape the
//! queue-introspection endpoint reports (§6).

use crate::cli::output::{format_number, format_time, print_table};
use docpipe_protocol::JobState;
use docpipe_queue::JobQueue;
use std::sync::Arc;

pub async fn list(queue: Arc<dyn JobQueue>, kind_filter: Option<&str>) -> anyhow::Result<()> {
    let mut jobs = queue.list_active().await?;
    if let Some(kind) = kind_filter {
        jobs.retain(|j| j.kind == kind);
    }

    if jobs.is_empty() {
        println!("no jobs in flight");
        return Ok(());
    }

    let rows = jobs
        .iter()
        .map(|job| {
            vec![
                job.id.to_string(),
                job.kind.clone(),
                state_label(job.state).to_string(),
                format_number(job.retry_count as u64),
                format_time(job.created_on.into()),
            ]
        })
        .collect();

    print_table(&["ID", "Kind", "State", "Retries", "Created"], rows);
    Ok(())
}

fn state_label(state: JobState) -> &'static str {
    match state {
        JobState::Created => "created",
        JobState::Retry => "retry",
        JobState::Active => "active",
        JobState::Completed => "completed",
        JobState::Cancelled => "cancelled",
        JobState::Failed => "failed",
    }
}
