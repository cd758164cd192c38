//! Error classification taxonomy (§4.C, §4.K).
//!
//! Grounded on `errors/types.py::classify_error()` from the source
//! system: a closed set of error kinds recovered from a raw message by
//! case-insensitive substring matching, in a fixed priority order so
//! two phrases in the same message resolve deterministically.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    GraphConnection,
    Network,
    LlmService,
    ParsingPasswordProtected,
    ParsingCorrupted,
    ParsingUnsupportedType,
    ParsingTooLarge,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::GraphConnection => "graph_connection",
            Self::Network => "network",
            Self::LlmService => "llm_service",
            Self::ParsingPasswordProtected => "parsing.password_protected",
            Self::ParsingCorrupted => "parsing.corrupted",
            Self::ParsingUnsupportedType => "parsing.unsupported_type",
            Self::ParsingTooLarge => "parsing.too_large",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a job failing with this kind should be retried automatically
    /// (§4.C): only permanent parsing failures and the unknown bucket are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::ParsingPasswordProtected
                | Self::ParsingCorrupted
                | Self::ParsingUnsupportedType
                | Self::ParsingTooLarge
        )
    }

    /// The closed, user-visible message for this kind (§4.C, §7): raw
    /// provider errors never reach users, only these fixed strings.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RateLimit => "Service is temporarily busy.",
            Self::GraphConnection => "Knowledge graph temporarily unavailable.",
            Self::Network => "Request timed out or couldn't connect.",
            Self::LlmService => "AI service temporarily unavailable.",
            Self::ParsingPasswordProtected => "File is password-protected.",
            Self::ParsingCorrupted => "File appears corrupted.",
            Self::ParsingUnsupportedType => "File type isn't supported.",
            Self::ParsingTooLarge => "File is too large.",
            Self::Unknown => "Something went wrong.",
        }
    }

    /// HTTP status code a classified error maps to at the external surface (§7).
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RateLimit => 429,
            Self::GraphConnection | Self::LlmService => 503,
            Self::Network => 504,
            Self::ParsingPasswordProtected
            | Self::ParsingCorrupted
            | Self::ParsingUnsupportedType
            | Self::ParsingTooLarge => 422,
            Self::Unknown => 500,
        }
    }
}

/// The result of classifying a raw error message (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub raw_message: String,
    pub retryable: bool,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, raw_message: impl Into<String>) -> Self {
        let retryable = kind.is_retryable();
        Self {
            kind,
            raw_message: raw_message.into(),
            retryable,
        }
    }
}

/// Classify a raw error message into a [`ClassifiedError`] (§4.C).
///
/// Matching is case-insensitive substring matching, tried in the order
/// below; the first rule to match wins. A message with no match
/// classifies as [`ErrorKind::Unknown`], keeping `raw_message` as given;
/// [`ErrorKind::user_message`] is what callers show externally.
pub fn classify(raw_message: &str) -> ClassifiedError {
    let lower = raw_message.to_lowercase();

    let contains_any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if contains_any(&["rate limit", "429", "too many requests"]) {
        return ClassifiedError::new(ErrorKind::RateLimit, raw_message);
    }
    if contains_any(&["neo4j", "graphiti", "graph database"]) {
        return ClassifiedError::new(ErrorKind::GraphConnection, raw_message);
    }
    if contains_any(&[
        "timeout",
        "network",
        "econnrefused",
        "connection refused",
        "socket",
    ]) {
        return ClassifiedError::new(ErrorKind::Network, raw_message);
    }
    if contains_any(&["503", "service unavailable", "overloaded"]) {
        return ClassifiedError::new(ErrorKind::LlmService, raw_message);
    }
    if lower.contains("password") && (lower.contains("protect") || lower.contains("encrypt")) {
        return ClassifiedError::new(ErrorKind::ParsingPasswordProtected, raw_message);
    }
    if contains_any(&["corrupt", "malformed"]) {
        return ClassifiedError::new(ErrorKind::ParsingCorrupted, raw_message);
    }
    if lower.contains("unsupported") && (lower.contains("type") || lower.contains("format")) {
        return ClassifiedError::new(ErrorKind::ParsingUnsupportedType, raw_message);
    }
    if contains_any(&["too large", "file size", "exceeds maximum"]) {
        return ClassifiedError::new(ErrorKind::ParsingTooLarge, raw_message);
    }

    ClassifiedError::new(ErrorKind::Unknown, raw_message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit() {
        assert_eq!(classify("HTTP 429 Too Many Requests").kind, ErrorKind::RateLimit);
        assert_eq!(classify("Rate limit exceeded").kind, ErrorKind::RateLimit);
    }

    #[test]
    fn classifies_graph_connection() {
        assert_eq!(
            classify("Neo4j connection pool exhausted").kind,
            ErrorKind::GraphConnection
        );
    }

    #[test]
    fn classifies_network() {
        assert_eq!(classify("ECONNREFUSED 127.0.0.1:7687").kind, ErrorKind::Network);
        assert_eq!(classify("socket hang up").kind, ErrorKind::Network);
        assert_eq!(classify("Connection refused by host").kind, ErrorKind::Network);
    }

    #[test]
    fn classifies_llm_service() {
        assert_eq!(
            classify("upstream returned 503 Service Unavailable").kind,
            ErrorKind::LlmService
        );
    }

    #[test]
    fn classifies_password_protected_requires_both_terms() {
        assert_eq!(
            classify("This PDF is password protected").kind,
            ErrorKind::ParsingPasswordProtected
        );
        assert_eq!(
            classify("password was incorrect").kind,
            ErrorKind::Unknown,
            "password alone without protect/encrypt must not match"
        );
    }

    #[test]
    fn classifies_corrupted() {
        assert_eq!(classify("the archive is corrupt").kind, ErrorKind::ParsingCorrupted);
        assert_eq!(classify("malformed xml header").kind, ErrorKind::ParsingCorrupted);
    }

    #[test]
    fn classifies_unsupported_type_requires_both_terms() {
        assert_eq!(
            classify("unsupported file type .xyz").kind,
            ErrorKind::ParsingUnsupportedType
        );
        assert_eq!(classify("unsupported operation").kind, ErrorKind::Unknown);
    }

    #[test]
    fn unknown_keeps_raw_message_but_has_a_fixed_user_message() {
        let c = classify("the cat knocked over the server rack");
        assert_eq!(c.kind, ErrorKind::Unknown);
        assert_eq!(c.raw_message, "the cat knocked over the server rack");
        assert_eq!(c.kind.user_message(), "Something went wrong.");
        assert!(c.retryable);
    }

    #[test]
    fn permanent_parsing_failures_are_not_retryable() {
        assert!(!classify("password protected document").retryable);
        assert!(!classify("corrupt zip").retryable);
        assert!(!classify("unsupported file format").retryable);
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(classify("429 too many requests").retryable);
        assert!(classify("neo4j timeout").retryable);
    }
}
