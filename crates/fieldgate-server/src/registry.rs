//! Client registry: the devices currently known to the gateway.
//!
//! Records are created by registration events, overwritten by later
//! registrations, and removed by the liveness monitor. The map is guarded by
//! a `std::sync::RwLock`; every critical section is a short map operation
//! that never spans an `.await`.

use fieldgate_types::ClientRecord;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Shared, cloneable handle to the registry.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<HashMap<String, ClientRecord>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the record for `record.id`, returning the
    /// previous record if one existed. Fields are overwritten, never merged.
    pub fn upsert(&self, record: ClientRecord) -> Option<ClientRecord> {
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.id.clone(), record)
    }

    pub fn get(&self, id: &str) -> Option<ClientRecord> {
        self.clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn remove(&self, id: &str) -> Option<ClientRecord> {
        self.clients
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
    }

    /// Removes `id` only if it is still registered at `address`.
    ///
    /// Used for liveness eviction: a device that re-registered with a new
    /// address while its old address was being probed keeps its entry.
    pub fn remove_if_address(&self, id: &str, address: &str) -> bool {
        let mut clients = self.clients.write().unwrap_or_else(|e| e.into_inner());
        match clients.get(id) {
            Some(record) if record.address == address => {
                clients.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Returns a copy of every record, ordered by client id.
    pub fn snapshot(&self) -> Vec<ClientRecord> {
        let mut records: Vec<ClientRecord> = self
            .clients
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    pub fn len(&self) -> usize {
        self.clients.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
