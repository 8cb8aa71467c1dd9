//! Per-user connection slots of a match.
//!
//! A slot is either active (the user holds a live connection) or reserved
//! (the user was connected, dropped, and may come back). Users without a
//! slot are absent. Slots keep insertion order, which is the order marks are
//! handed out in.

use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Unique identifier for a user account.
pub type UserId = String;

/// Seats per match.
pub const MATCH_CAPACITY: usize = 2;

/// A live connection of a user to a match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Getters, Serialize, Deserialize, derive_new::new)]
pub struct Presence {
    /// Account the connection belongs to.
    #[new(into)]
    user_id: UserId,
    /// Transport session of the connection.
    #[new(into)]
    session_id: String,
}

/// Participation state of one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// Connected.
    Active(Presence),
    /// Disconnected, may rejoin.
    Reserved,
}

/// How an admitted join will be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First time this user joins.
    NewJoin,
    /// The user held a reserved slot.
    Rejoin,
}

/// Why a join attempt was refused. The display text is the rejection
/// message sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
pub enum JoinRejection {
    /// The account is already connected from another device.
    #[display("already joined")]
    AlreadyJoined,
    /// No free seat.
    #[display("match full")]
    MatchFull,
}

/// Slots plus the count of admitted joins that have not completed yet.
#[derive(Debug, Clone, Default)]
pub struct PresenceTable {
    slots: Vec<(UserId, Slot)>,
    joins_in_progress: u32,
}

impl PresenceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admission control for a join attempt.
    ///
    /// The rejoin check runs before the capacity check so a returning
    /// player is never counted against their own seat.
    #[instrument(skip(self), fields(active = self.active_count(), joins_in_progress = self.joins_in_progress))]
    pub fn admit(&mut self, user_id: &str) -> Result<Admission, JoinRejection> {
        match self.slot(user_id) {
            Some(Slot::Active(_)) => {
                debug!(user_id, "Rejecting second device");
                return Err(JoinRejection::AlreadyJoined);
            }
            Some(Slot::Reserved) => {
                self.joins_in_progress += 1;
                debug!(user_id, "Admitting rejoin");
                return Ok(Admission::Rejoin);
            }
            None => {}
        }

        if self.occupancy() >= MATCH_CAPACITY {
            debug!(user_id, "Rejecting join, match full");
            return Err(JoinRejection::MatchFull);
        }

        self.joins_in_progress += 1;
        Ok(Admission::NewJoin)
    }

    /// Marks an admitted join as connected.
    #[instrument(skip(self, presence), fields(user_id = %presence.user_id))]
    pub fn complete_join(&mut self, presence: Presence) {
        self.joins_in_progress = self.joins_in_progress.saturating_sub(1);
        match self.slots.iter_mut().find(|(id, _)| *id == presence.user_id) {
            Some((_, slot)) => *slot = Slot::Active(presence),
            None => {
                let user_id = presence.user_id.clone();
                self.slots.push((user_id, Slot::Active(presence)));
            }
        }
    }

    /// Releases a seat taken by an admitted join that will not complete.
    /// Returns false if no join was in flight.
    pub fn cancel_join(&mut self) -> bool {
        if self.joins_in_progress == 0 {
            return false;
        }
        self.joins_in_progress -= 1;
        true
    }

    /// Moves a user's slot to reserved. Returns false for unknown users.
    #[instrument(skip(self))]
    pub fn mark_departed(&mut self, user_id: &str) -> bool {
        match self.slots.iter_mut().find(|(id, _)| id == user_id) {
            Some((_, slot)) => {
                *slot = Slot::Reserved;
                true
            }
            None => false,
        }
    }

    /// Drops every reserved slot. Returns how many were dropped.
    #[instrument(skip(self))]
    pub fn purge_reserved(&mut self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|(_, slot)| matches!(slot, Slot::Active(_)));
        let purged = before - self.slots.len();
        if purged > 0 {
            debug!(purged, "Purged reserved slots");
        }
        purged
    }

    /// The slot held by a user, if any.
    pub fn slot(&self, user_id: &str) -> Option<&Slot> {
        self.slots
            .iter()
            .find(|(id, _)| id == user_id)
            .map(|(_, slot)| slot)
    }

    /// True if the user is currently connected.
    pub fn is_active(&self, user_id: &str) -> bool {
        matches!(self.slot(user_id), Some(Slot::Active(_)))
    }

    /// Connected presences in slot order.
    pub fn active_presences(&self) -> Vec<Presence> {
        self.slots
            .iter()
            .filter_map(|(_, slot)| match slot {
                Slot::Active(presence) => Some(presence.clone()),
                Slot::Reserved => None,
            })
            .collect()
    }

    /// Number of connected users.
    pub fn active_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Active(_)))
            .count()
    }

    /// Number of slots, active or reserved.
    pub fn total(&self) -> usize {
        self.slots.len()
    }

    /// Connected users plus joins in flight.
    pub fn occupancy(&self) -> usize {
        self.active_count() + self.joins_in_progress as usize
    }

    /// Admitted joins that have not completed.
    pub fn joins_in_progress(&self) -> u32 {
        self.joins_in_progress
    }

    /// User ids with a slot, in slot order.
    pub fn user_ids(&self) -> Vec<UserId> {
        self.slots.iter().map(|(id, _)| id.clone()).collect()
    }
}
