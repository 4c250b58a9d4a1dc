// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity-specific queries and booking status transitions.

use tracing::debug;

use super::Dao;
use crate::entity::{Entity, EntityKey};
use crate::model::{Booking, BookingStatus, Notification, Role, User, Venue};
use crate::storage::traits::StorageError;

impl Dao<User> {
    pub async fn retrieve_by_role(&self, role: Role) -> Result<Vec<User>, StorageError> {
        self.retrieve_where(|u| u.role == role).await
    }
}

impl Dao<Venue> {
    /// Flat query: venues only, managers left as usernames.
    pub async fn retrieve_by_manager(&self, username: &str) -> Result<Vec<Venue>, StorageError> {
        self.retrieve_where(|v| v.manager_username == username).await
    }

    /// Case-insensitive.
    pub async fn retrieve_by_city(&self, city: &str) -> Result<Vec<Venue>, StorageError> {
        self.retrieve_where(|v| v.city.eq_ignore_ascii_case(city)).await
    }
}

impl Dao<Booking> {
    pub async fn retrieve_by_fan(&self, username: &str) -> Result<Vec<Booking>, StorageError> {
        self.retrieve_where(|b| b.fan_username == username).await
    }

    pub async fn retrieve_by_venue(&self, venue_id: u64) -> Result<Vec<Booking>, StorageError> {
        self.retrieve_where(|b| b.venue_id == venue_id).await
    }

    pub async fn retrieve_by_status(
        &self,
        status: BookingStatus,
    ) -> Result<Vec<Booking>, StorageError> {
        self.retrieve_where(|b| b.status == status).await
    }

    pub async fn confirm(&self, id: u64) -> Result<Booking, StorageError> {
        self.transition(id, BookingStatus::Confirmed).await
    }

    pub async fn reject(&self, id: u64) -> Result<Booking, StorageError> {
        self.transition(id, BookingStatus::Rejected).await
    }

    pub async fn cancel(&self, id: u64) -> Result<Booking, StorageError> {
        self.transition(id, BookingStatus::Cancelled).await
    }

    /// Status change through the regular update path, so observers fire.
    async fn transition(&self, id: u64, next: BookingStatus) -> Result<Booking, StorageError> {
        let mut booking = self
            .retrieve_by_id(&id)
            .await?
            .ok_or_else(|| StorageError::not_found(Booking::SCHEMA, &id.to_string()))?;

        if !booking.status.can_transition_to(next) {
            return Err(StorageError::Validation(format!(
                "booking {} cannot move from {} to {}",
                id, booking.status, next
            )));
        }

        booking.status = next;
        self.update(&booking).await?;
        Ok(booking)
    }
}

impl Dao<Notification> {
    /// Newest first.
    pub async fn retrieve_by_user(
        &self,
        username: &str,
    ) -> Result<Vec<Notification>, StorageError> {
        let mut found = self.retrieve_where(|n| n.username == username).await?;
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    pub async fn retrieve_unread(&self, username: &str) -> Result<Vec<Notification>, StorageError> {
        let mut unread = self.retrieve_by_user(username).await?;
        unread.retain(|n| !n.read);
        Ok(unread)
    }

    /// Bulk write: no observer events. Returns the number of rows changed.
    ///
    /// Callers that need the change mirrored go through
    /// [`Registry::mark_all_notifications_read`](crate::Registry::mark_all_notifications_read).
    pub async fn mark_all_read(&self, username: &str) -> Result<usize, StorageError> {
        let unread = self.retrieve_unread(username).await?;
        let mut changed = 0;
        for mut notification in unread {
            notification.read = true;
            self.store().update(Notification::SCHEMA, notification.to_row()).await?;
            // The cache is shared by every backend; this may be the secondary.
            self.context().cache().remove(&EntityKey::new(Notification::TYPE, notification.id())?);
            changed += 1;
        }
        debug!(username, changed, family = %self.family(), "Marked notifications read");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::entity::OperationKind;
    use crate::model::NotificationKind;
    use crate::observer::testing::RecordingObserver;
    use crate::storage::memory::MemoryStore;
    use crate::sync::SyncContext;

    fn dao<E: Entity>() -> Dao<E> {
        Dao::new(Arc::new(MemoryStore::new()), SyncContext::new())
    }

    fn booking(fan: &str, venue_id: u64) -> Booking {
        Booking::request(
            fan,
            venue_id,
            NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
            "Celtics",
            "Lakers",
        )
    }

    #[tokio::test]
    async fn test_users_by_role() {
        let users = dao::<User>();
        users.save(User::fan("fan1", "A", "B", "a@b.c")).await.unwrap();
        users.save(User::manager("mgr1", "C", "D", "c@d.e", "Pubs Ltd")).await.unwrap();

        let managers = users.retrieve_by_role(Role::VenueManager).await.unwrap();
        assert_eq!(managers.len(), 1);
        assert_eq!(managers[0].username, "mgr1");
    }

    #[tokio::test]
    async fn test_venues_by_manager_and_city() {
        let venues = dao::<Venue>();
        venues.save(Venue::new("A", "Pub", "x", "Boston", 10, "mgr1")).await.unwrap();
        venues.save(Venue::new("B", "Bar", "y", "Chicago", 10, "mgr1")).await.unwrap();
        venues.save(Venue::new("C", "Pub", "z", "boston", 10, "mgr2")).await.unwrap();

        assert_eq!(venues.retrieve_by_manager("mgr1").await.unwrap().len(), 2);
        assert_eq!(venues.retrieve_by_city("BOSTON").await.unwrap().len(), 2);
        assert!(venues.retrieve_by_manager("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_booking_queries() {
        let bookings = dao::<Booking>();
        bookings.save(booking("fan1", 1)).await.unwrap();
        bookings.save(booking("fan1", 2)).await.unwrap();
        bookings.save(booking("fan2", 1)).await.unwrap();
        bookings.confirm(3).await.unwrap();

        assert_eq!(bookings.retrieve_by_fan("fan1").await.unwrap().len(), 2);
        assert_eq!(bookings.retrieve_by_venue(1).await.unwrap().len(), 2);
        let confirmed = bookings.retrieve_by_status(BookingStatus::Confirmed).await.unwrap();
        assert_eq!(confirmed.iter().map(|b| b.id).collect::<Vec<_>>(), vec![3]);
    }

    #[tokio::test]
    async fn test_transitions_fire_update_events() {
        let bookings = dao::<Booking>();
        let recorder = Arc::new(RecordingObserver::default());
        let saved = bookings.save(booking("fan1", 1)).await.unwrap();
        bookings.add_observer(recorder.clone());

        let confirmed = bookings.confirm(saved.id).await.unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        let cancelled = bookings.cancel(saved.id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);

        assert_eq!(recorder.kinds(), vec![OperationKind::Update, OperationKind::Update]);
    }

    #[tokio::test]
    async fn test_illegal_transitions_are_rejected() {
        let bookings = dao::<Booking>();
        let saved = bookings.save(booking("fan1", 1)).await.unwrap();
        bookings.cancel(saved.id).await.unwrap();

        assert!(matches!(bookings.confirm(saved.id).await, Err(StorageError::Validation(_))));
        assert!(matches!(bookings.cancel(saved.id).await, Err(StorageError::Validation(_))));
        assert!(bookings.reject(42).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_mark_all_read_is_silent_and_counts() {
        let notifications = dao::<Notification>();
        for i in 0..3 {
            notifications
                .save(Notification::new("fan1", NotificationKind::BookingApproved, Some(i), "ok"))
                .await
                .unwrap();
        }
        notifications
            .save(Notification::new("fan2", NotificationKind::BookingRejected, None, "no"))
            .await
            .unwrap();
        let recorder = Arc::new(RecordingObserver::default());
        notifications.add_observer(recorder.clone());

        assert_eq!(notifications.mark_all_read("fan1").await.unwrap(), 3);
        assert_eq!(notifications.mark_all_read("fan1").await.unwrap(), 0);

        assert!(notifications.retrieve_unread("fan1").await.unwrap().is_empty());
        assert_eq!(notifications.retrieve_unread("fan2").await.unwrap().len(), 1);
        assert!(recorder.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_notifications_newest_first() {
        let notifications = dao::<Notification>();
        for i in 1..=3 {
            notifications
                .save(Notification::new("fan1", NotificationKind::BookingApproved, Some(i), "ok"))
                .await
                .unwrap();
        }
        let ids: Vec<u64> = notifications
            .retrieve_by_user("fan1")
            .await
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }
}
