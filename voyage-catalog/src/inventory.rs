use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Remaining capacity for one package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub package_id: Uuid,
    pub available_rooms: u32,
    pub total_rooms: u32,
}

/// In-memory room ledger.
///
/// Callers must serialize access (the in-memory reservation store keeps it behind its
/// state lock) so that every `reserve` is checked and applied as one step.
#[derive(Debug, Clone, Default)]
pub struct InventoryLedger {
    entries: HashMap<Uuid, LedgerEntry>,
}

impl InventoryLedger {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register capacity for a package. `available_rooms` is clamped to `total_rooms`.
    pub fn initialize(&mut self, package_id: Uuid, total_rooms: u32, available_rooms: u32) {
        self.entries.insert(
            package_id,
            LedgerEntry {
                package_id,
                available_rooms: available_rooms.min(total_rooms),
                total_rooms,
            },
        );
    }

    pub fn get(&self, package_id: &Uuid) -> Option<&LedgerEntry> {
        self.entries.get(package_id)
    }

    pub fn available(&self, package_id: &Uuid) -> Option<u32> {
        self.entries.get(package_id).map(|e| e.available_rooms)
    }

    /// Take `rooms` out of the ledger.
    ///
    /// `held` rooms are promised to notified waiting-list entries and cannot be taken by
    /// this caller. Returns the remaining raw availability.
    pub fn reserve(&mut self, package_id: &Uuid, rooms: u32, held: u32) -> Result<u32, LedgerError> {
        let entry = self
            .entries
            .get_mut(package_id)
            .ok_or(LedgerError::NotFound(*package_id))?;

        let reservable = entry.available_rooms.saturating_sub(held);
        if rooms == 0 || reservable < rooms {
            return Err(LedgerError::InsufficientRooms {
                requested: rooms,
                reservable,
            });
        }

        entry.available_rooms -= rooms;
        Ok(entry.available_rooms)
    }

    /// Return rooms previously reserved. Never exceeds the package's capacity.
    pub fn release(&mut self, package_id: &Uuid, rooms: u32) -> Result<u32, LedgerError> {
        let entry = self
            .entries
            .get_mut(package_id)
            .ok_or(LedgerError::NotFound(*package_id))?;

        let restored = entry.available_rooms.saturating_add(rooms);
        if restored > entry.total_rooms {
            tracing::warn!(
                "Release of {} room(s) on package {} would exceed capacity {}, clamping",
                rooms,
                package_id,
                entry.total_rooms
            );
        }
        entry.available_rooms = restored.min(entry.total_rooms);
        Ok(entry.available_rooms)
    }

    /// Share of capacity currently reserved, 0.0..=1.0.
    pub fn utilization(&self, package_id: &Uuid) -> Option<f64> {
        self.entries.get(package_id).map(|entry| {
            if entry.total_rooms == 0 {
                0.0
            } else {
                1.0 - (f64::from(entry.available_rooms) / f64::from(entry.total_rooms))
            }
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("No ledger entry for package {0}")]
    NotFound(Uuid),

    #[error("Insufficient rooms: requested {requested}, reservable {reservable}")]
    InsufficientRooms { requested: u32, reservable: u32 },
}
