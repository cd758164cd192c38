//! Agent model strings, registry, and cost table (§4.L).

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn model_string_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-z][-a-z0-9]*:[a-zA-Z0-9][-a-zA-Z0-9_.]*$")
            .expect("model string pattern is a valid regex")
    })
}

/// A validated `provider:model-name` string (§4.L).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelString(String);

impl ModelString {
    pub fn parse(raw: &str) -> Result<Self, ModelStringError> {
        if model_string_pattern().is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(ModelStringError::InvalidFormat(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn provider(&self) -> &str {
        self.0.split(':').next().unwrap_or("")
    }
}

impl TryFrom<String> for ModelString {
    type Error = ModelStringError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ModelString> for String {
    fn from(value: ModelString) -> Self {
        value.0
    }
}

impl std::fmt::Display for ModelString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelStringError {
    #[error("'{0}' is not a valid provider:model-name string")]
    InvalidFormat(String),
}

/// Primary + optional fallback model for one agent role.
#[derive(Debug, Clone)]
pub struct AgentModelConfig {
    pub primary: ModelString,
    pub fallback: Option<ModelString>,
}

/// Per-agent model configuration, with environment-variable overrides of
/// the configured primary (`<AGENT>_MODEL`, uppercased agent name) (§4.L).
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    agents: HashMap<String, AgentModelConfig>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: impl Into<String>, config: AgentModelConfig) {
        self.agents.insert(agent.into(), config);
    }

    /// Resolve the primary model for `agent`, honoring the `<AGENT>_MODEL`
    /// environment override when present and valid.
    pub fn resolve_primary(&self, agent: &str) -> Option<ModelString> {
        let env_key = format!("{}_MODEL", agent.to_uppercase());
        if let Ok(value) = std::env::var(&env_key) {
            if let Ok(model) = ModelString::parse(&value) {
                return Some(model);
            }
        }
        self.agents.get(agent).map(|c| c.primary.clone())
    }

    pub fn resolve_fallback(&self, agent: &str) -> Option<ModelString> {
        self.agents.get(agent).and_then(|c| c.fallback.clone())
    }
}

/// USD cost per million input/output tokens. Unknown models cost zero (§4.L).
#[derive(Debug, Clone, Default)]
pub struct CostTable {
    rates: HashMap<String, (f64, f64)>,
}

impl CostTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate(&mut self, model: &ModelString, input_per_million: f64, output_per_million: f64) {
        self.rates
            .insert(model.as_str().to_string(), (input_per_million, output_per_million));
    }

    /// Cost in USD for the given token counts. Unknown models cost zero.
    pub fn cost_usd(&self, model: &ModelString, input_tokens: u64, output_tokens: u64) -> f64 {
        match self.rates.get(model.as_str()) {
            Some((input_rate, output_rate)) => {
                (input_tokens as f64 / 1_000_000.0) * input_rate
                    + (output_tokens as f64 / 1_000_000.0) * output_rate
            }
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_model_strings() {
        assert!(ModelString::parse("openai:gpt-4o").is_ok());
        assert!(ModelString::parse("anthropic:claude-3.5-sonnet").is_ok());
    }

    #[test]
    fn rejects_malformed_model_strings() {
        assert!(ModelString::parse("gpt-4o").is_err());
        assert!(ModelString::parse("OpenAI:gpt-4o").is_err());
        assert!(ModelString::parse("openai:").is_err());
    }

    #[test]
    fn unknown_model_costs_zero() {
        let table = CostTable::new();
        let model = ModelString::parse("openai:gpt-4o").unwrap();
        assert_eq!(table.cost_usd(&model, 1000, 1000), 0.0);
    }

    #[test]
    fn known_model_computes_blended_cost() {
        let mut table = CostTable::new();
        let model = ModelString::parse("openai:gpt-4o").unwrap();
        table.set_rate(&model, 5.0, 15.0);
        let cost = table.cost_usd(&model, 1_000_000, 1_000_000);
        assert!((cost - 20.0).abs() < 1e-9);
    }

    #[test]
    fn env_override_takes_priority_over_configured_primary() {
        let mut registry = ModelRegistry::new();
        registry.register(
            "extraction",
            AgentModelConfig {
                primary: ModelString::parse("openai:gpt-4o").unwrap(),
                fallback: None,
            },
        );
        std::env::set_var("EXTRACTION_MODEL", "anthropic:claude-3.5-sonnet");
        let resolved = registry.resolve_primary("extraction").unwrap();
        assert_eq!(resolved.as_str(), "anthropic:claude-3.5-sonnet");
        std::env::remove_var("EXTRACTION_MODEL");
    }
}
