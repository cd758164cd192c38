//! Legacy deal-only namespace migration (§4.J).
//!
//! Rewrites graph-store namespaces that predate the composite
//! `{organization_id}:{deal_id}` scheme (when a namespace was just a bare
//! deal id) to the composite form. Idempotent: entries already containing
//! `:` are skipped. Reports orphans: namespaces with no matching deal.

use async_trait::async_trait;
use docpipe_protocol::{DealId, Namespace, OrganizationId};
use std::str::FromStr;

/// Resolves a legacy namespace string (a bare deal id) to its owning
/// organization, so the migration can compose the composite namespace.
#[async_trait]
pub trait DealOrganizationLookup: Send + Sync {
    async fn organization_for_deal(&self, deal_id: DealId) -> Option<OrganizationId>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Already composite; left untouched.
    AlreadyMigrated,
    /// Rewritten to the composite namespace (the value it was/would be rewritten to).
    Migrated(Namespace),
    /// No matching deal found for a legacy namespace.
    Orphan,
    /// The legacy value wasn't a valid deal id at all.
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub legacy_namespace: String,
    pub outcome: MigrationOutcome,
}

/// A namespace rewriter that carries out the graph-store write when not
/// in dry-run mode. Kept separate from [`DealOrganizationLookup`] so tests
/// can assert on dry-run behavior without a live graph engine.
#[async_trait]
pub trait NamespaceRewriter: Send + Sync {
    async fn rewrite(&self, legacy_namespace: &str, composite: &Namespace);
}

/// Migrate one legacy namespace string. `dry_run` suppresses the actual
/// rewrite but still reports what would happen.
pub async fn migrate_namespace(
    lookup: &dyn DealOrganizationLookup,
    rewriter: &dyn NamespaceRewriter,
    legacy_namespace: &str,
    dry_run: bool,
) -> MigrationReport {
    let outcome = if legacy_namespace.contains(':') {
        MigrationOutcome::AlreadyMigrated
    } else {
        match DealId::from_str(legacy_namespace) {
            Ok(deal_id) => match lookup.organization_for_deal(deal_id).await {
                Some(organization_id) => {
                    let composite = Namespace::new(organization_id, deal_id);
                    if !dry_run {
                        rewriter.rewrite(legacy_namespace, &composite).await;
                    }
                    MigrationOutcome::Migrated(composite)
                }
                None => MigrationOutcome::Orphan,
            },
            Err(_) => MigrationOutcome::Malformed,
        }
    };

    MigrationReport {
        legacy_namespace: legacy_namespace.to_string(),
        outcome,
    }
}

/// Migrate a batch of legacy namespaces, one report per input.
pub async fn migrate_namespaces(
    lookup: &dyn DealOrganizationLookup,
    rewriter: &dyn NamespaceRewriter,
    legacy_namespaces: &[String],
    dry_run: bool,
) -> Vec<MigrationReport> {
    let mut reports = Vec::with_capacity(legacy_namespaces.len());
    for ns in legacy_namespaces {
        reports.push(migrate_namespace(lookup, rewriter, ns, dry_run).await);
    }
    reports
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeLookup(HashMap<DealId, OrganizationId>);

    #[async_trait]
    impl DealOrganizationLookup for FakeLookup {
        async fn organization_for_deal(&self, deal_id: DealId) -> Option<OrganizationId> {
            self.0.get(&deal_id).copied()
        }
    }

    #[derive(Default)]
    struct RecordingRewriter(Mutex<Vec<(String, Namespace)>>);

    #[async_trait]
    impl NamespaceRewriter for RecordingRewriter {
        async fn rewrite(&self, legacy_namespace: &str, composite: &Namespace) {
            self.0
                .lock()
                .unwrap()
                .push((legacy_namespace.to_string(), *composite));
        }
    }

    #[tokio::test]
    async fn already_composite_namespaces_are_skipped() {
        let lookup = FakeLookup(HashMap::new());
        let rewriter = RecordingRewriter::default();
        let report = migrate_namespace(&lookup, &rewriter, "org:deal", false).await;
        assert_eq!(report.outcome, MigrationOutcome::AlreadyMigrated);
        assert!(rewriter.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn legacy_namespace_is_rewritten() {
        let deal_id = DealId::new();
        let org_id = OrganizationId::new();
        let mut map = HashMap::new();
        map.insert(deal_id, org_id);
        let lookup = FakeLookup(map);
        let rewriter = RecordingRewriter::default();

        let legacy = deal_id.to_string();
        let report = migrate_namespace(&lookup, &rewriter, &legacy, false).await;
        assert_eq!(
            report.outcome,
            MigrationOutcome::Migrated(Namespace::new(org_id, deal_id))
        );
        assert_eq!(rewriter.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dry_run_reports_without_rewriting() {
        let deal_id = DealId::new();
        let org_id = OrganizationId::new();
        let mut map = HashMap::new();
        map.insert(deal_id, org_id);
        let lookup = FakeLookup(map);
        let rewriter = RecordingRewriter::default();

        let legacy = deal_id.to_string();
        let report = migrate_namespace(&lookup, &rewriter, &legacy, true).await;
        assert!(matches!(report.outcome, MigrationOutcome::Migrated(_)));
        assert!(rewriter.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn namespace_with_no_matching_deal_is_an_orphan() {
        let lookup = FakeLookup(HashMap::new());
        let rewriter = RecordingRewriter::default();
        let legacy = DealId::new().to_string();
        let report = migrate_namespace(&lookup, &rewriter, &legacy, false).await;
        assert_eq!(report.outcome, MigrationOutcome::Orphan);
    }

    #[tokio::test]
    async fn malformed_legacy_namespace_is_reported() {
        let lookup = FakeLookup(HashMap::new());
        let rewriter = RecordingRewriter::default();
        let report = migrate_namespace(&lookup, &rewriter, "not-a-uuid", false).await;
        assert_eq!(report.outcome, MigrationOutcome::Malformed);
    }
}
