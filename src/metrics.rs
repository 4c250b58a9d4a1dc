// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for venue-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `venue_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `entity`: User, Venue, Booking, Notification
//! - `operation`: INSERT, UPDATE, DELETE
//! - `backend`: sql, csv, memory
//! - `outcome`: success, error, skipped

use metrics::{counter, gauge, histogram};
use std::time::Duration;

use crate::entity::{EntityType, OperationKind};
use crate::storage::BackendFamily;

// ═══════════════════════════════════════════════════════════════════════════
// WRITES - Committed DAO writes
// ═══════════════════════════════════════════════════════════════════════════

/// Record a committed write
pub fn record_write(entity: EntityType, operation: OperationKind, backend: BackendFamily) {
    counter!(
        "venue_sync_writes_total",
        "entity" => entity.as_str(),
        "operation" => operation.as_str(),
        "backend" => backend.as_str()
    )
    .increment(1);
}

/// Set current cache entry count
pub fn set_cache_entries(count: usize) {
    gauge!("venue_sync_cache_entries").set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// OBSERVERS - Replication and notification fan-out
// ═══════════════════════════════════════════════════════════════════════════

/// Record one replication attempt to the secondary backend
pub fn record_replication(entity: EntityType, target: BackendFamily, outcome: &str) {
    counter!(
        "venue_sync_replications_total",
        "entity" => entity.as_str(),
        "backend" => target.as_str(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a missing dependency copied ahead of a replicated record
pub fn record_dependency_copy(entity: EntityType, target: BackendFamily) {
    counter!(
        "venue_sync_replication_dependencies_total",
        "entity" => entity.as_str(),
        "backend" => target.as_str()
    )
    .increment(1);
}

/// Record a derived notification
pub fn record_notification(kind: &str, outcome: &str) {
    counter!(
        "venue_sync_notifications_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an observer error that was swallowed
pub fn record_observer_failure(observer: &str, error_kind: &str) {
    counter!(
        "venue_sync_observer_failures_total",
        "observer" => observer.to_string(),
        "error" => error_kind.to_string()
    )
    .increment(1);
}

/// Record a bulk operation mirrored to the secondary
pub fn record_bulk_replication(operation: &str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    counter!(
        "venue_sync_bulk_replications_total",
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// STARTUP - Backend selection and reconciliation
// ═══════════════════════════════════════════════════════════════════════════

/// Record a switch to the alternate durable backend after a failed probe
pub fn record_backend_fallback(from: BackendFamily, to: BackendFamily) {
    counter!(
        "venue_sync_backend_fallbacks_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Record the active backend after a switch
pub fn record_backend_switch(backend: BackendFamily) {
    counter!(
        "venue_sync_backend_switches_total",
        "backend" => backend.as_str()
    )
    .increment(1);
}

/// Set backend health status (1 = healthy, 0 = unhealthy)
pub fn set_backend_healthy(backend: BackendFamily, healthy: bool) {
    gauge!(
        "venue_sync_backend_healthy",
        "backend" => backend.as_str()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// Record records copied by reconciliation (`direction`: to_primary, to_secondary, overwrite)
pub fn record_reconcile_copy(entity: EntityType, direction: &str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        "venue_sync_reconcile_copies_total",
        "entity" => entity.as_str(),
        "direction" => direction.to_string()
    )
    .increment(count as u64);
}

/// Record reconciliation duration
pub fn record_reconcile_duration(duration: Duration) {
    histogram!("venue_sync_reconcile_seconds").record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_total(recorder: &DebuggingRecorder, name: &str) -> u64 {
        recorder
            .snapshotter()
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == name)
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(v) => v,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_write_counter_is_labelled() {
        let recorder = DebuggingRecorder::new();
        metrics::with_local_recorder(&recorder, || {
            record_write(EntityType::Booking, OperationKind::Insert, BackendFamily::Csv);
            record_write(EntityType::Booking, OperationKind::Update, BackendFamily::Csv);
        });

        let snapshot = recorder.snapshotter().snapshot().into_vec();
        let labels: Vec<String> = snapshot
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == "venue_sync_writes_total")
            .flat_map(|(key, _, _, _)| {
                key.key()
                    .labels()
                    .map(|l| l.value().to_string())
                    .collect::<Vec<_>>()
            })
            .collect();
        assert!(labels.contains(&"INSERT".to_string()));
        assert!(labels.contains(&"csv".to_string()));
    }

    #[test]
    fn test_reconcile_copy_skips_zero() {
        let recorder = DebuggingRecorder::new();
        metrics::with_local_recorder(&recorder, || {
            record_reconcile_copy(EntityType::User, "to_primary", 0);
            record_reconcile_copy(EntityType::User, "to_secondary", 4);
        });
        assert_eq!(counter_total(&recorder, "venue_sync_reconcile_copies_total"), 4);
    }

    #[test]
    fn test_remaining_metrics_do_not_panic() {
        set_cache_entries(12);
        record_replication(EntityType::Venue, BackendFamily::Sql, "success");
        record_dependency_copy(EntityType::User, BackendFamily::Sql);
        record_notification("BOOKING_REQUESTED", "success");
        record_observer_failure("replication", "backend");
        record_bulk_replication("mark_all_read", false);
        record_backend_fallback(BackendFamily::Sql, BackendFamily::Csv);
        record_backend_switch(BackendFamily::Memory);
        set_backend_healthy(BackendFamily::Csv, true);
        record_reconcile_duration(Duration::from_millis(3));
    }
}
