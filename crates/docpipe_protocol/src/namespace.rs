//! Multi-tenant namespace composition (§4.J).
//!
//! The source system joins `{organization_id}` and `{deal_id}` two
//! different ways depending on consumer: a colon join is authoritative
//! for graph-store group ids, an underscore join is a fast-path node
//! property used for index compatibility. Both forms are first-class
//! here rather than one being derived informally from the other.

use crate::ids::{DealId, OrganizationId};
use std::fmt;

/// The composite tenant namespace `{org}:{deal}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub organization_id: OrganizationId,
    pub deal_id: DealId,
}

impl Namespace {
    pub fn new(organization_id: OrganizationId, deal_id: DealId) -> Self {
        Self {
            organization_id,
            deal_id,
        }
    }

    /// The colon-joined form, authoritative for graph-store searches.
    pub fn colon(&self) -> String {
        format!("{}:{}", self.organization_id, self.deal_id)
    }

    /// The underscore-joined form, used only as a fast-path node property.
    pub fn underscore(&self) -> String {
        format!("{}_{}", self.organization_id, self.deal_id)
    }

    /// Parse a colon-joined namespace string back into its halves.
    ///
    /// Both halves must be non-empty and parse as UUIDs (§8 invariant:
    /// "the namespace contains a colon and both halves are non-empty").
    pub fn parse_colon(value: &str) -> Result<Self, NamespaceError> {
        let (org_part, deal_part) = value
            .split_once(':')
            .ok_or_else(|| NamespaceError::MissingColon(value.to_string()))?;
        if org_part.is_empty() || deal_part.is_empty() {
            return Err(NamespaceError::EmptyHalf(value.to_string()));
        }
        let organization_id = org_part
            .parse()
            .map_err(|_| NamespaceError::InvalidUuid(org_part.to_string()))?;
        let deal_id = deal_part
            .parse()
            .map_err(|_| NamespaceError::InvalidUuid(deal_part.to_string()))?;
        Ok(Self {
            organization_id,
            deal_id,
        })
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.colon())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum NamespaceError {
    #[error("namespace '{0}' is missing the ':' separator")]
    MissingColon(String),
    #[error("namespace '{0}' has an empty organization or deal half")]
    EmptyHalf(String),
    #[error("'{0}' is not a valid uuid")]
    InvalidUuid(String),
}
