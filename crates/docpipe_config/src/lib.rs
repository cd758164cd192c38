//! Configuration, agent model registry, and cost table (§4.L).

pub mod fallback;
pub mod model;
pub mod settings;

pub use fallback::call_with_fallback;
pub use model::{AgentModelConfig, CostTable, ModelRegistry, ModelString, ModelStringError};
pub use settings::{Neo4jSettings, RagMode, Settings};
