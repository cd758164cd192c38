//! Multi-tenant membership checks and the legacy namespace migration utility (§4.J).

pub mod membership;
pub mod migration;

pub use membership::{check_membership, MembershipError, MembershipResolver, Role};
pub use migration::{
    migrate_namespace, migrate_namespaces, DealOrganizationLookup, MigrationOutcome,
    MigrationReport, NamespaceRewriter,
};
