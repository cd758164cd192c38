//! Process-wide settings loaded from the environment (§6 "Environment variables").

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RagMode {
    Graphiti,
    Semantic,
    GoogleFileSearch,
}

impl RagMode {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "graphiti" => Some(Self::Graphiti),
            "semantic" => Some(Self::Semantic),
            "google_file_search" => Some(Self::GoogleFileSearch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub rag_mode: RagMode,
    pub neo4j: Option<Neo4jSettings>,
    /// Intake file-size ceiling in bytes (default 100 MB, per §4.C `parsing.too_large`).
    pub max_file_size_bytes: u64,
}

impl Settings {
    const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 100 * 1024 * 1024;

    /// Load settings from the process environment, per the variable names
    /// listed in §6. Missing optional settings fall back to sensible
    /// defaults rather than failing; `NEO4J_URI` absent leaves `neo4j: None`.
    pub fn from_env() -> Self {
        let rag_mode = std::env::var("RAG_MODE")
            .ok()
            .and_then(|v| RagMode::parse(&v))
            .unwrap_or(RagMode::Graphiti);

        let neo4j = std::env::var("NEO4J_URI").ok().map(|uri| Neo4jSettings {
            uri,
            user: std::env::var("NEO4J_USER").unwrap_or_default(),
            password: std::env::var("NEO4J_PASSWORD").unwrap_or_default(),
        });

        let max_file_size_bytes = std::env::var("MAX_FILE_SIZE_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(Self::DEFAULT_MAX_FILE_SIZE_BYTES);

        Self {
            rag_mode,
            neo4j,
            max_file_size_bytes,
        }
    }

    /// `<PROVIDER>_API_KEY` lookup for an external provider, per §6.
    pub fn provider_api_key(provider: &str) -> Option<String> {
        std::env::var(format!("{}_API_KEY", provider.to_uppercase())).ok()
    }
}
