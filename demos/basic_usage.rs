// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic venue-sync usage example.
//!
//! Demonstrates:
//! 1. Connecting SQLite (primary) and CSV (secondary) in a scratch directory
//! 2. Saving a manager, a fan, a venue and a booking request
//! 3. Confirming the booking and reading both users' notifications
//! 4. Checking that the CSV mirror holds the same bookings
//! 5. Displaying metrics
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```
//!
//! Set `VENUE_SYNC_SQL_URL` / `VENUE_SYNC_CSV_DIR` to keep the data around
//! (e.g. `VENUE_SYNC_SQL_URL=sqlite:venues.db?mode=rwc`).

use chrono::{NaiveDate, NaiveTime};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use venue_sync::{BackendFamily, Booking, BookingStatus, Registry, SyncConfig, User, Venue};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().map_err(|_| "failed to install metrics recorder")?;

    venue_sync::logging::init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║             venue-sync: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and connect
    // ─────────────────────────────────────────────────────────────────────────
    let scratch = tempfile::tempdir()?;
    let mut config = SyncConfig::from_env()?;
    if config.sql_url.is_none() {
        let db = scratch.path().join("venues.db");
        config.sql_url = Some(format!("sqlite://{}?mode=rwc", db.display()));
        config.csv_dir = scratch.path().join("csv");
    }

    println!("📦 Connecting (primary: {})...", config.primary);
    let registry = Registry::connect(&config).await?;
    println!("   └─ Active: {}", registry.active_family());
    match registry.secondary() {
        Some(secondary) => println!("   └─ Mirror: {}", secondary.family()),
        None => println!("   └─ Mirror: (none, running single-backend)"),
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Seed records
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Saving records...");
    let users = registry.user_dao();
    users.upsert(&User::manager("mgr1", "Mia", "Reyes", "mia@pubs.com", "Pubs Ltd")).await?;
    let fan =
        User::fan("fan1", "Ada", "Lovelace", "ada@example.com").with_favourite_team("Celtics");
    users.upsert(&fan).await?;

    let venue = registry
        .venue_dao()
        .save(Venue::new("The Hoop", "Sports Bar", "1 Main St", "Boston", 80, "mgr1"))
        .await?;
    println!("   └─ Venue #{}: {}", venue.id, venue.name);

    let booking = registry
        .booking_dao()
        .save(Booking::request(
            "fan1",
            venue.id,
            NaiveDate::from_ymd_opt(2026, 11, 2).ok_or("bad date")?,
            NaiveTime::from_hms_opt(19, 30, 0).ok_or("bad time")?,
            "Celtics",
            "Lakers",
        ))
        .await?;
    println!(
        "   └─ Booking #{}: {} ({})",
        booking.id,
        booking.game_label(),
        booking.status.as_str()
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Confirm and read notifications
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n✅ Confirming booking #{}...", booking.id);
    let confirmed = registry.booking_dao().confirm(booking.id).await?;
    assert_eq!(confirmed.status, BookingStatus::Confirmed);

    let notifications = registry.notification_dao();
    for username in ["mgr1", "fan1"] {
        println!("\n🔔 Notifications for {username}:");
        for n in notifications.retrieve_by_user(username).await? {
            let unread = if n.read { "" } else { " (unread)" };
            println!("   └─ [{}] {}{}", n.kind.as_str(), n.message, unread);
        }
    }

    let marked = registry.mark_all_notifications_read("fan1").await?;
    println!("\n📭 Marked {marked} notification(s) read for fan1");

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Compare the mirror
    // ─────────────────────────────────────────────────────────────────────────
    if let Some(csv) = registry.backend(BackendFamily::Csv) {
        let active = registry.active_backend().dao::<Booking>().retrieve_all().await?;
        let mirrored = csv.dao::<Booking>().retrieve_all().await?;
        println!("\n🔍 Bookings: {} active / {} in CSV", active.len(), mirrored.len());
        if active == mirrored {
            println!("   └─ ✅ Backends agree");
        } else {
            println!("   └─ ⚠️  Backends differ");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Print counters and gauges sorted by name.
fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines = Vec::new();
    for (composite_key, _, _, value) in snapshotter.snapshot().into_vec() {
        let (_, key) = composite_key.into_parts();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() {
            String::new()
        } else {
            format!("{{{}}}", labels.join(","))
        };
        let rendered = match value {
            DebugValue::Counter(v) => v.to_string(),
            DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
            DebugValue::Histogram(samples) => format!("{} sample(s)", samples.len()),
        };
        lines.push(format!("{}{} = {}", key.name(), label_str, rendered));
    }
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {line}");
    }
}
