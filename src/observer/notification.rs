// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, trace};

use super::{ObservationEvent, StoreObserver};
use crate::dao::Dao;
use crate::entity::{Entity, EntitySnapshot, OperationKind};
use crate::model::{Booking, BookingStatus, Notification, NotificationKind, Venue};
use crate::storage::traits::StorageError;
use crate::sync::SyncContext;

/// Derives a notification for the counterpart of each booking write.
///
/// | Booking event               | Recipient     | Kind                |
/// |-----------------------------|---------------|---------------------|
/// | INSERT                      | venue manager | `BookingRequested`  |
/// | UPDATE, status CONFIRMED    | fan           | `BookingApproved`   |
/// | UPDATE, status REJECTED     | fan           | `BookingRejected`   |
///
/// Everything else is ignored. Notifications are saved through the active
/// backend's notification DAO, so they replicate like any other write.
pub struct NotificationFanout {
    ctx: Arc<SyncContext>,
    venues: Arc<Dao<Venue>>,
    notifications: Arc<Dao<Notification>>,
}

impl NotificationFanout {
    #[must_use]
    pub fn new(
        ctx: Arc<SyncContext>,
        venues: Arc<Dao<Venue>>,
        notifications: Arc<Dao<Notification>>,
    ) -> Self {
        Self {
            ctx,
            venues,
            notifications,
        }
    }

    async fn derive(
        &self,
        kind: OperationKind,
        booking: &Booking,
    ) -> Result<Option<Notification>, StorageError> {
        let derived = match (kind, booking.status) {
            (OperationKind::Insert, _) => {
                let venue = self
                    .venues
                    .retrieve_by_id(&booking.venue_id)
                    .await?
                    .ok_or_else(|| {
                        StorageError::not_found(Venue::SCHEMA, &booking.venue_id.to_string())
                    })?;
                Notification::new(
                    &venue.manager_username,
                    NotificationKind::BookingRequested,
                    Some(booking.id),
                    format!(
                        "{} requested {} at {}",
                        booking.fan_username,
                        booking.game_label(),
                        venue.name
                    ),
                )
            }
            (OperationKind::Update, BookingStatus::Confirmed) => Notification::new(
                &booking.fan_username,
                NotificationKind::BookingApproved,
                Some(booking.id),
                format!("Your booking for {} was approved", booking.game_label()),
            ),
            (OperationKind::Update, BookingStatus::Rejected) => Notification::new(
                &booking.fan_username,
                NotificationKind::BookingRejected,
                Some(booking.id),
                format!("Your booking for {} was rejected", booking.game_label()),
            ),
            _ => return Ok(None),
        };
        Ok(Some(derived))
    }
}

#[async_trait]
impl StoreObserver for NotificationFanout {
    fn name(&self) -> &str {
        "notification_fanout"
    }

    async fn on_event(&self, event: &ObservationEvent) -> Result<(), StorageError> {
        if self.ctx.suppression().is_suppressed() {
            trace!(id = event.entity_id(), "Suppressed, no notification");
            return Ok(());
        }
        let Some(EntitySnapshot::Booking(booking)) = event.entity() else {
            return Ok(());
        };

        let Some(notification) = self.derive(event.kind(), booking).await? else {
            debug!(
                booking = booking.id,
                kind = %event.kind(),
                status = %booking.status,
                "No notification for event"
            );
            return Ok(());
        };

        let kind = notification.kind;
        match self.notifications.save(notification).await {
            Ok(saved) => {
                info!(
                    booking = booking.id,
                    recipient = %saved.username,
                    kind = %kind,
                    notification = saved.id,
                    "Notification created"
                );
                crate::metrics::record_notification(kind.as_str(), "success");
                Ok(())
            }
            Err(e) => {
                crate::metrics::record_notification(kind.as_str(), "error");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use chrono::{NaiveDate, NaiveTime};

    struct Fixture {
        ctx: Arc<SyncContext>,
        notifications: Arc<Dao<Notification>>,
        fanout: NotificationFanout,
    }

    async fn fixture() -> Fixture {
        let ctx = SyncContext::new();
        let store = Arc::new(MemoryStore::new());
        let venues = Arc::new(Dao::<Venue>::new(store.clone(), ctx.clone()));
        let notifications = Arc::new(Dao::<Notification>::new(store, ctx.clone()));
        venues
            .save(Venue::new("The Hoop", "Pub", "x", "Boston", 80, "mgr1"))
            .await
            .unwrap();
        let fanout = NotificationFanout::new(ctx.clone(), venues, notifications.clone());
        Fixture {
            ctx,
            notifications,
            fanout,
        }
    }

    fn booking(status: BookingStatus) -> Booking {
        Booking::request(
            "fan1",
            1,
            NaiveDate::from_ymd_opt(2026, 2, 10).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            "Celtics",
            "Lakers",
        )
        .with_id(5)
        .with_status(status)
    }

    fn event(kind: OperationKind, status: BookingStatus) -> ObservationEvent {
        ObservationEvent::written(kind, booking(status).into_snapshot())
    }

    #[tokio::test]
    async fn test_insert_notifies_manager() {
        let f = fixture().await;
        f.fanout
            .on_event(&event(OperationKind::Insert, BookingStatus::Pending))
            .await
            .unwrap();

        let inbox = f.notifications.retrieve_by_user("mgr1").await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::BookingRequested);
        assert_eq!(inbox[0].booking_id, Some(5));
        assert!(!inbox[0].read);
        assert!(inbox[0].message.contains("Lakers @ Celtics"));
    }

    #[tokio::test]
    async fn test_status_updates_notify_fan() {
        let f = fixture().await;
        f.fanout
            .on_event(&event(OperationKind::Update, BookingStatus::Confirmed))
            .await
            .unwrap();
        f.fanout
            .on_event(&event(OperationKind::Update, BookingStatus::Rejected))
            .await
            .unwrap();

        let kinds: Vec<NotificationKind> = f
            .notifications
            .retrieve_all()
            .await
            .unwrap()
            .into_iter()
            .map(|n| {
                assert_eq!(n.username, "fan1");
                n.kind
            })
            .collect();
        assert_eq!(
            kinds,
            vec![NotificationKind::BookingApproved, NotificationKind::BookingRejected]
        );
    }

    #[tokio::test]
    async fn test_cancel_and_delete_are_silent() {
        let f = fixture().await;
        f.fanout
            .on_event(&event(OperationKind::Update, BookingStatus::Cancelled))
            .await
            .unwrap();
        f.fanout
            .on_event(&ObservationEvent::deleted(crate::entity::EntityType::Booking, "5"))
            .await
            .unwrap();
        assert!(f.notifications.retrieve_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_suppressed_is_silent() {
        let f = fixture().await;
        let inserted = event(OperationKind::Insert, BookingStatus::Pending);
        f.ctx
            .suppression()
            .scope(f.fanout.on_event(&inserted))
            .await
            .unwrap();
        assert!(f.notifications.retrieve_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_venue_is_an_error() {
        let f = fixture().await;
        let orphan = booking(BookingStatus::Pending);
        let orphan = Booking { venue_id: 77, ..orphan };
        let result = f
            .fanout
            .on_event(&ObservationEvent::written(OperationKind::Insert, orphan.into_snapshot()))
            .await;
        assert!(result.unwrap_err().is_not_found());
    }
}
