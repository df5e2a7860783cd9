use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::ReservationError;
use crate::models::WaitingListEntry;

/// FIFO of users waiting for rooms on one package.
///
/// Entries are kept sorted by (`date_added`, `id`) and `position` is recomputed after every
/// change, so positions are always exactly 1..=N.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitingList {
    package_id: Uuid,
    entries: Vec<WaitingListEntry>,
}

impl WaitingList {
    pub fn new(package_id: Uuid) -> Self {
        Self {
            package_id,
            entries: Vec::new(),
        }
    }

    /// Rebuild a queue from stored rows in any order.
    pub fn from_entries(package_id: Uuid, entries: Vec<WaitingListEntry>) -> Self {
        let mut list = Self { package_id, entries };
        list.renumber();
        list
    }

    pub fn package_id(&self) -> Uuid {
        self.package_id
    }

    pub fn entries(&self) -> &[WaitingListEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_for(&self, user_id: Uuid) -> Option<&WaitingListEntry> {
        self.entries.iter().find(|e| e.user_id == user_id)
    }

    pub fn position_of(&self, user_id: Uuid) -> Option<u32> {
        self.entry_for(user_id).map(|e| e.position)
    }

    /// Append a user. `has_live_booking` comes from the caller's view of the bookings table.
    pub fn join(
        &mut self,
        user_id: Uuid,
        rooms: u32,
        has_live_booking: bool,
        now: DateTime<Utc>,
    ) -> Result<&WaitingListEntry, ReservationError> {
        if rooms == 0 {
            return Err(ReservationError::InvalidRequest(
                "waiting list request must ask for at least one room".to_string(),
            ));
        }
        if has_live_booking {
            return Err(ReservationError::AlreadyBooked(self.package_id));
        }
        if self.entry_for(user_id).is_some() {
            return Err(ReservationError::AlreadyQueued(self.package_id));
        }

        let entry = WaitingListEntry::new(user_id, self.package_id, rooms, now);
        let entry_id = entry.id;
        self.entries.push(entry);
        self.renumber();

        self.entries
            .iter()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| ReservationError::Storage("joined entry vanished".to_string()))
    }

    /// Remove a user's entry; the rest move up.
    pub fn leave(&mut self, user_id: Uuid) -> Option<WaitingListEntry> {
        let index = self.entries.iter().position(|e| e.user_id == user_id)?;
        let removed = self.entries.remove(index);
        self.renumber();
        Some(removed)
    }

    /// Earliest entry that has not been notified yet. Lapsed holds never qualify.
    pub fn peek_front(&self) -> Option<&WaitingListEntry> {
        self.entries.iter().find(|e| !e.is_notified)
    }

    /// Whether the user heads the queue, ignoring entries whose hold has lapsed but that the
    /// sweeper has not removed yet.
    pub fn is_user_next(&self, user_id: Uuid, now: DateTime<Utc>, window: Duration) -> bool {
        self.entries
            .iter()
            .find(|e| !e.hold_lapsed(now, window))
            .is_some_and(|e| e.user_id == user_id)
    }

    /// Rooms promised to notified entries whose window is still open.
    pub fn held_rooms(&self, now: DateTime<Utc>, window: Duration) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.holds_rooms(now, window))
            .map(|e| e.number_of_rooms)
            .sum()
    }

    /// Rooms the given user may take out of the held pool.
    pub fn live_hold_for(&self, user_id: Uuid, now: DateTime<Utc>, window: Duration) -> u32 {
        self.entry_for(user_id)
            .filter(|e| e.holds_rooms(now, window))
            .map_or(0, |e| e.number_of_rooms)
    }

    /// Notify the front entry if the rooms it asked for are free and unheld.
    ///
    /// No rooms leave the ledger; the entry's hold only keeps others from taking them.
    pub fn promote(&mut self, available_rooms: u32, now: DateTime<Utc>, window: Duration) -> Option<WaitingListEntry> {
        let free = available_rooms.saturating_sub(self.held_rooms(now, window));
        let entry = self.entries.iter_mut().find(|e| !e.is_notified)?;
        if entry.number_of_rooms > free {
            return None;
        }
        entry.is_notified = true;
        entry.date_notified = Some(now);
        Some(entry.clone())
    }

    /// Keep promoting in FIFO order until the front entry no longer fits.
    pub fn promote_all(&mut self, available_rooms: u32, now: DateTime<Utc>, window: Duration) -> Vec<WaitingListEntry> {
        let mut promoted = Vec::new();
        while let Some(entry) = self.promote(available_rooms, now, window) {
            promoted.push(entry);
        }
        promoted
    }

    /// Drop notified entries whose window has closed.
    pub fn expire_holds(&mut self, now: DateTime<Utc>, window: Duration) -> Vec<WaitingListEntry> {
        let (expired, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.is_notified && !e.holds_rooms(now, window));
        self.entries = kept;
        self.renumber();
        expired
    }

    fn renumber(&mut self) {
        self.entries
            .sort_by(|a, b| a.date_added.cmp(&b.date_added).then_with(|| a.id.cmp(&b.id)));
        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.position = index as u32 + 1;
        }
    }
}
