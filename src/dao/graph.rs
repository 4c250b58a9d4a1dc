// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Venue ↔ Manager graph loading.
//!
//! A venue points at its manager, and a manager owns a list of venues, so a
//! naive eager load never terminates. Each resolution claims its key in the
//! [`LoadingGuard`](crate::sync::LoadingGuard) first; a key already claimed
//! higher up the same load is answered with a stand-in:
//!
//! ```text
//! load_venue(1)
//!   claim Venue:1
//!   manager mgr1 ── claim VenueManager:mgr1
//!     venues of mgr1 (flat query): [1, 2]
//!       Venue:1 in flight  -> stand-in (manager: None)
//!       Venue:2            -> claim, manager mgr1 in flight
//!                             -> minimal manager (user + stand-in venues)
//! ```

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, instrument};

use super::Dao;
use crate::entity::{Entity, EntityKey, EntityType};
use crate::model::{ResolvedVenue, User, Venue, VenueManager};
use crate::storage::traits::StorageError;
use crate::sync::SyncContext;

pub struct GraphLoader {
    users: Arc<Dao<User>>,
    venues: Arc<Dao<Venue>>,
    ctx: Arc<SyncContext>,
}

impl GraphLoader {
    #[must_use]
    pub fn new(users: Arc<Dao<User>>, venues: Arc<Dao<Venue>>, ctx: Arc<SyncContext>) -> Self {
        Self { users, venues, ctx }
    }

    /// Venue with its manager, whose venues are resolved in turn.
    #[instrument(skip(self))]
    pub async fn load_venue(&self, id: u64) -> Result<Option<ResolvedVenue>, StorageError> {
        let _serial = self.ctx.graph_lock().await;
        match self.venues.retrieve_by_id(&id).await? {
            Some(venue) => Ok(Some(self.resolve_venue(venue).await?)),
            None => Ok(None),
        }
    }

    /// Manager with their venues. Fails with `Validation` when the user is
    /// not a venue manager.
    #[instrument(skip(self))]
    pub async fn load_manager(&self, username: &str) -> Result<Option<VenueManager>, StorageError> {
        let _serial = self.ctx.graph_lock().await;
        let Some(user) = self.users.retrieve_by_id(username).await? else {
            return Ok(None);
        };
        if !user.is_manager() {
            return Err(StorageError::Validation(format!(
                "user '{}' is not a venue manager",
                username
            )));
        }
        Ok(Some(self.resolve_manager(user).await?))
    }

    fn resolve_venue(&self, venue: Venue) -> BoxFuture<'_, Result<ResolvedVenue, StorageError>> {
        async move {
            let Some(_ticket) = self.ctx.loading().start_loading(venue.key()?) else {
                debug!(venue = venue.id, "Venue in flight, using stand-in");
                return Ok(ResolvedVenue::stand_in(venue));
            };

            let manager = match self.users.retrieve_by_id(&venue.manager_username).await? {
                Some(user) if user.is_manager() => {
                    Some(Box::new(self.resolve_manager(user).await?))
                }
                _ => None,
            };
            Ok(ResolvedVenue { venue, manager })
        }
        .boxed()
    }

    fn resolve_manager(&self, user: User) -> BoxFuture<'_, Result<VenueManager, StorageError>> {
        async move {
            let key = EntityKey::new(EntityType::VenueManager, user.username.clone())?;
            let owned = self.venues.retrieve_by_manager(&user.username).await?;

            let Some(_ticket) = self.ctx.loading().start_loading(key) else {
                debug!(manager = %user.username, "Manager in flight, using minimal manager");
                let venues = owned.into_iter().map(ResolvedVenue::stand_in).collect();
                return Ok(VenueManager { user, venues });
            };

            let mut venues = Vec::with_capacity(owned.len());
            for venue in owned {
                venues.push(self.resolve_venue(venue).await?);
            }
            Ok(VenueManager { user, venues })
        }
        .boxed()
    }
}
