//! Usage rows recorded by observability (§3, §4.M).

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureOutcome {
    Success,
    Error,
    Timeout,
}

/// A single usage row: either an LLM call or a named feature invocation (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageRow {
    Llm {
        provider: String,
        model: String,
        feature: String,
        input_tokens: u32,
        output_tokens: u32,
        cost_usd: f64,
        latency: Duration,
        namespace: Option<String>,
    },
    Feature {
        feature: String,
        status: FeatureOutcome,
        duration: Duration,
        error_message: Option<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    },
}

impl UsageRow {
    pub fn feature_name(&self) -> &str {
        match self {
            Self::Llm { feature, .. } => feature,
            Self::Feature { feature, .. } => feature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_name_is_readable_from_either_variant() {
        let llm = UsageRow::Llm {
            provider: "openai".into(),
            model: "gpt-4o".into(),
            feature: "analyze".into(),
            input_tokens: 100,
            output_tokens: 50,
            cost_usd: 0.002,
            latency: Duration::from_millis(500),
            namespace: Some("org:deal".into()),
        };
        assert_eq!(llm.feature_name(), "analyze");

        let feature = UsageRow::Feature {
            feature: "fast_path_embedding".into(),
            status: FeatureOutcome::Success,
            duration: Duration::from_millis(120),
            error_message: None,
            metadata: serde_json::Map::new(),
        };
        assert_eq!(feature.feature_name(), "fast_path_embedding");
    }
}
