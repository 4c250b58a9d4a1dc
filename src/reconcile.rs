// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Startup merge of the two durable backends.
//!
//! For each persisted type in dependency order, the key sets of both sides
//! are unioned:
//!
//! | primary | secondary | action                              |
//! |---------|-----------|-------------------------------------|
//! | a       | -         | copy a to secondary                 |
//! | -       | b         | copy b to primary                   |
//! | a       | b, b != a | overwrite secondary with a          |
//! | a       | a         | nothing                             |
//!
//! Everything runs under suppression, so no copy is replicated back and no
//! booking copy derives a notification. A second run finds nothing to do.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::entity::{EntitySnapshot, EntityType};
use crate::registry::Backend;
use crate::storage::traits::StorageError;
use crate::sync::SyncContext;

/// Outcome counts for one entity type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TypeCounts {
    pub copied_to_primary: usize,
    pub copied_to_secondary: usize,
    pub overwritten: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl TypeCounts {
    /// Records written on either side.
    #[must_use]
    pub fn changes(&self) -> usize {
        self.copied_to_primary + self.copied_to_secondary + self.overwritten
    }

    fn add(&mut self, other: &TypeCounts) {
        self.copied_to_primary += other.copied_to_primary;
        self.copied_to_secondary += other.copied_to_secondary;
        self.overwritten += other.overwritten;
        self.unchanged += other.unchanged;
        self.failed += other.failed;
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    per_type: BTreeMap<EntityType, TypeCounts>,
}

impl ReconcileReport {
    #[must_use]
    pub fn counts(&self, entity_type: EntityType) -> TypeCounts {
        self.per_type.get(&entity_type).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn totals(&self) -> TypeCounts {
        let mut total = TypeCounts::default();
        for counts in self.per_type.values() {
            total.add(counts);
        }
        total
    }

    /// True when neither side was written.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.totals().changes() == 0
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.totals();
        write!(
            f,
            "to_primary={} to_secondary={} overwritten={} unchanged={} failed={}",
            t.copied_to_primary, t.copied_to_secondary, t.overwritten, t.unchanged, t.failed
        )
    }
}

enum Action<'a> {
    ToPrimary(&'a EntitySnapshot),
    ToSecondary(&'a EntitySnapshot),
    Overwrite(&'a EntitySnapshot),
    Unchanged,
}

/// Merge `primary` and `secondary` in both directions.
///
/// A table that cannot be listed aborts the run; a single record that
/// cannot be written is counted as failed and skipped.
#[instrument(skip_all, fields(primary = %primary.family(), secondary = %secondary.family()))]
pub async fn reconcile(
    ctx: &SyncContext,
    primary: &Backend,
    secondary: &Backend,
) -> Result<ReconcileReport, StorageError> {
    let started = Instant::now();
    let report = ctx.suppression().scope(merge_tables(primary, secondary)).await?;

    crate::metrics::record_reconcile_duration(started.elapsed());
    info!(
        report = %report,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Reconciliation complete"
    );
    Ok(report)
}

async fn merge_tables(
    primary: &Backend,
    secondary: &Backend,
) -> Result<ReconcileReport, StorageError> {
    let mut report = ReconcileReport::default();

    for entity_type in EntityType::PERSISTED {
        let ours = by_id(primary.snapshots(entity_type).await?);
        let theirs = by_id(secondary.snapshots(entity_type).await?);
        let ids: BTreeSet<&String> = ours.keys().chain(theirs.keys()).collect();

        let mut counts = TypeCounts::default();
        for id in ids {
            let action = match (ours.get(id), theirs.get(id)) {
                (Some(a), None) => Action::ToSecondary(a),
                (None, Some(b)) => Action::ToPrimary(b),
                (Some(a), Some(b)) if a != b => Action::Overwrite(a),
                _ => Action::Unchanged,
            };

            let written = match &action {
                Action::ToSecondary(a) | Action::Overwrite(a) => {
                    secondary.upsert_snapshot(a).await.map(|_| ())
                }
                Action::ToPrimary(b) => primary.upsert_snapshot(b).await.map(|_| ()),
                Action::Unchanged => Ok(()),
            };
            match (written, action) {
                (Err(e), _) => {
                    warn!(
                        entity_type = %entity_type,
                        id = %id,
                        error = %e,
                        "Reconcile copy failed"
                    );
                    counts.failed += 1;
                }
                (Ok(()), Action::ToSecondary(_)) => counts.copied_to_secondary += 1,
                (Ok(()), Action::ToPrimary(_)) => counts.copied_to_primary += 1,
                (Ok(()), Action::Overwrite(_)) => counts.overwritten += 1,
                (Ok(()), Action::Unchanged) => counts.unchanged += 1,
            }
        }

        let copies = [
            ("to_primary", counts.copied_to_primary),
            ("to_secondary", counts.copied_to_secondary),
            ("overwrite", counts.overwritten),
        ];
        for (direction, count) in copies {
            crate::metrics::record_reconcile_copy(entity_type, direction, count);
        }
        report.per_type.insert(entity_type, counts);
    }
    Ok(report)
}

fn by_id(snapshots: Vec<EntitySnapshot>) -> BTreeMap<String, EntitySnapshot> {
    snapshots.into_iter().map(|s| (s.id(), s)).collect()
}
