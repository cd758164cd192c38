//! The health endpoint's report shape (§4.M).

use docpipe_queue::CountsByKind;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub uptime_s: u64,
    pub graph_connectivity: bool,
    pub queue_counts: CountsByKindSerializable,
}

/// [`CountsByKind`] keyed by string job-state for JSON serialization.
#[derive(Debug, Clone, Serialize)]
pub struct CountsByKindSerializable(pub std::collections::HashMap<String, std::collections::HashMap<String, u64>>);

impl From<&CountsByKind> for CountsByKindSerializable {
    fn from(counts: &CountsByKind) -> Self {
        let mut out = std::collections::HashMap::new();
        for (kind, by_state) in counts {
            let mut state_map = std::collections::HashMap::new();
            for (state, count) in by_state {
                state_map.insert(state.as_str().to_string(), *count);
            }
            out.insert(kind.clone(), state_map);
        }
        Self(out)
    }
}

pub struct HealthTracker {
    started_at: Instant,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn report(&self, graph_connectivity: bool, queue_counts: &CountsByKind) -> HealthReport {
        let status = if graph_connectivity {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        HealthReport {
            status,
            uptime_s: self.started_at.elapsed().as_secs(),
            graph_connectivity,
            queue_counts: queue_counts.into(),
        }
    }
}
