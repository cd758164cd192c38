//! Usage-row and per-job completion logging (§4.M).

use crate::metrics::METRICS;
use docpipe_protocol::{JobId, UsageRow};

/// Record a usage row: every handler that calls an external provider or
/// performs a user-visible operation logs one of these.
pub fn log_usage_row(row: &UsageRow) {
    match row {
        UsageRow::Llm {
            provider,
            model,
            feature,
            input_tokens,
            output_tokens,
            cost_usd,
            latency,
            namespace,
        } => {
            METRICS.record_usage_cost(*cost_usd);
            tracing::info!(
                provider = %provider,
                model = %model,
                feature = %feature,
                input_tokens,
                output_tokens,
                cost_usd,
                latency_ms = latency.as_millis() as u64,
                namespace = namespace.as_deref().unwrap_or(""),
                "usage_row"
            );
        }
        UsageRow::Feature {
            feature,
            status,
            duration,
            error_message,
            metadata,
        } => {
            METRICS.record_usage_cost(0.0);
            tracing::info!(
                feature = %feature,
                status = ?status,
                duration_ms = duration.as_millis() as u64,
                error_message = error_message.as_deref().unwrap_or(""),
                metadata = %serde_json::Value::Object(metadata.clone()),
                "usage_row"
            );
        }
    }
}

/// Log a one-line event for a finished job, per §4.M: `job_id`, `kind`,
/// `retry_count`, success/failure, and the result envelope.
pub fn log_job_completion(
    job_id: JobId,
    kind: &str,
    retry_count: u32,
    success: bool,
    envelope: &serde_json::Value,
) {
    if success {
        METRICS.inc_jobs_completed();
    } else {
        METRICS.inc_jobs_failed_permanently();
    }
    tracing::info!(
        job_id = %job_id,
        kind = %kind,
        retry_count,
        success,
        envelope = %envelope,
        "job_completed"
    );
}
