//! Shared data model, error taxonomy, and tenant namespace types for the
//! document intelligence pipeline. Every other crate in the workspace
//! depends on this one; it depends on nothing in the workspace.

pub mod chunk;
pub mod document;
pub mod episode;
pub mod errors;
pub mod finding;
pub mod financial;
pub mod ids;
pub mod job;
pub mod namespace;
pub mod usage;

pub use chunk::{Chunk, ChunkKind, ChunkMetadata, Formula, Table};
pub use document::{Document, DocumentStatus, RetryHistoryEntry, Stage};
pub use episode::{confidence as fact_confidence, Episode, Fact, SchemaHint};
pub use errors::{classify, ClassifiedError, ErrorKind};
pub use finding::{Domain, Finding, FindingType};
pub use financial::{FinancialMetric, MetricCategory, PeriodType};
pub use ids::{DealId, DocumentId, JobId, OrganizationId, UserId};
pub use job::{EnqueueOptions, Job, JobEnvelope, JobState};
pub use namespace::{Namespace, NamespaceError};
pub use usage::{FeatureOutcome, UsageRow};
