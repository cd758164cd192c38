//! `docpipe migrate-namespace`: rewrite legacy deal-only graph namespaces
//! to the composite `{organization_id}:{deal_id}` form (§4.J).

use async_trait::async_trait;
use docpipe_db::StorageAdapter;
use docpipe_protocol::{DealId, Namespace, OrganizationId};
use docpipe_tenant::migration::{migrate_namespace, DealOrganizationLookup, MigrationOutcome, NamespaceRewriter};
use std::sync::Arc;

struct StorageBackedLookup {
    storage: Arc<dyn StorageAdapter>,
}

#[async_trait]
impl DealOrganizationLookup for StorageBackedLookup {
    async fn organization_for_deal(&self, deal_id: DealId) -> Option<OrganizationId> {
        self.storage.get_deal(deal_id).await.ok().map(|deal| deal.organization_id)
    }
}

/// No live graph store is wired into this binary (§3 "external provider
/// seams"); the rewrite step logs what it would have written instead.
struct LoggingRewriter;

#[async_trait]
impl NamespaceRewriter for LoggingRewriter {
    async fn rewrite(&self, legacy_namespace: &str, composite: &Namespace) {
        tracing::info!(legacy_namespace, composite = %composite, "would rewrite graph-store namespace");
    }
}

pub async fn run(storage: Arc<dyn StorageAdapter>, legacy_namespace: &str, dry_run: bool) -> anyhow::Result<()> {
    let lookup = StorageBackedLookup { storage };
    let report = migrate_namespace(&lookup, &LoggingRewriter, legacy_namespace, dry_run).await;

    match report.outcome {
        MigrationOutcome::AlreadyMigrated => println!("{}: already migrated", report.legacy_namespace),
        MigrationOutcome::Migrated(composite) => println!(
            "{}: {} -> {composite}",
            report.legacy_namespace,
            if dry_run { "would migrate" } else { "migrated" }
        ),
        MigrationOutcome::Orphan => println!("{}: orphan (no matching deal)", report.legacy_namespace),
        MigrationOutcome::Malformed => println!("{}: malformed (not a valid deal id)", report.legacy_namespace),
    }
    Ok(())
}
