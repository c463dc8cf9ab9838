//! Client admission and per-client session records.
//!
//! The gate admits clients into the lobby until the game starts. Starting
//! the game is a one-way latch: from then on every admission is rejected,
//! including clients that were admitted before and reconnect later.
//! Admission never spawns a player entity.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::actions::ActionId;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Opaque transport-level client identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client {}", self.0)
    }
}

/// Build chosen in the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LoadoutSelection {
    /// Character class.
    pub class_id: u32,
    /// Chosen actions, referenced by id.
    pub actions: Vec<ActionId>,
}

/// One admitted client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRecord {
    /// Client identifier.
    pub client_id: ClientId,
    /// Lobby slot, the lowest free index at admission.
    pub slot: u32,
    /// Lobby selection, if any has been made.
    pub selection: Option<LoadoutSelection>,
}

/// Structured admission outcome. Rejections are policy, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdmissionResult {
    /// The client has a record.
    Approved,
    /// The game has started; the lobby is closed.
    RejectedGameStarted,
    /// Every slot is taken.
    RejectedServerFull,
}

impl AdmissionResult {
    /// Returns `true` for [`AdmissionResult::Approved`].
    pub fn is_approved(self) -> bool {
        self == AdmissionResult::Approved
    }
}

/// Programmer errors on the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// `start_game` was called twice.
    #[error("game already started")]
    AlreadyStarted,

    /// The client has no record.
    #[error("unknown {0}")]
    UnknownClient(ClientId),
}

// ---------------------------------------------------------------------------
// SessionGate
// ---------------------------------------------------------------------------

/// Owner of every [`ClientRecord`].
#[derive(Debug, Default)]
pub struct SessionGate {
    clients: HashMap<ClientId, ClientRecord>,
    started: bool,
    /// Slot cap; 0 is unlimited.
    max_clients: u32,
}

impl SessionGate {
    /// Creates an open gate with at most `max_clients` records (0 is
    /// unlimited).
    pub fn new(max_clients: u32) -> Self {
        Self {
            clients: HashMap::new(),
            started: false,
            max_clients,
        }
    }

    /// Admits `client_id` if the lobby is still open.
    pub fn admit(&mut self, client_id: ClientId) -> AdmissionResult {
        if self.started {
            tracing::info!("Rejected {client_id}: game already started");
            return AdmissionResult::RejectedGameStarted;
        }
        if self.clients.contains_key(&client_id) {
            return AdmissionResult::Approved;
        }
        if self.max_clients > 0 && self.clients.len() >= self.max_clients as usize {
            tracing::info!("Rejected {client_id}: server full ({} clients)", self.clients.len());
            return AdmissionResult::RejectedServerFull;
        }

        let slot = self.lowest_free_slot();
        self.clients.insert(
            client_id,
            ClientRecord {
                client_id,
                slot,
                selection: None,
            },
        );
        tracing::info!("Approved {client_id} in slot {slot}");
        AdmissionResult::Approved
    }

    fn lowest_free_slot(&self) -> u32 {
        (0..)
            .find(|slot| !self.clients.values().any(|r| r.slot == *slot))
            .unwrap_or_default()
    }

    /// Closes the lobby. The latch never resets.
    pub fn start_game(&mut self) -> Result<(), SessionError> {
        if self.started {
            return Err(SessionError::AlreadyStarted);
        }
        self.started = true;
        tracing::info!("Game started with {} clients", self.clients.len());
        Ok(())
    }

    /// Removes the record of `client_id`. Unknown clients are ignored.
    pub fn on_disconnect(&mut self, client_id: ClientId) -> Option<ClientRecord> {
        let record = self.clients.remove(&client_id);
        if record.is_some() {
            tracing::info!("{client_id} disconnected");
        }
        record
    }

    /// Stores `selection` for a present client. Returns `false` when the
    /// client is gone, in which case the selection is dropped.
    pub fn set_selection(&mut self, client_id: ClientId, selection: LoadoutSelection) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(record) => {
                record.selection = Some(selection);
                true
            }
            None => {
                tracing::debug!("Dropped selection from {client_id}: not connected");
                false
            }
        }
    }

    /// Record of `client_id`.
    pub fn get(&self, client_id: ClientId) -> Option<&ClientRecord> {
        self.clients.get(&client_id)
    }

    /// Record of `client_id`, or [`SessionError::UnknownClient`].
    pub fn require(&self, client_id: ClientId) -> Result<&ClientRecord, SessionError> {
        self.get(client_id)
            .ok_or(SessionError::UnknownClient(client_id))
    }

    /// Returns `true` once the game has started.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Records ordered by slot.
    pub fn records(&self) -> Vec<&ClientRecord> {
        let mut records: Vec<_> = self.clients.values().collect();
        records.sort_by_key(|r| r.slot);
        records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if no client is admitted.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: ClientId = ClientId(1);
    const B: ClientId = ClientId(2);
    const C: ClientId = ClientId(3);

    #[test]
    fn test_admission_latch() {
        let mut gate = SessionGate::new(0);
        assert_eq!(gate.admit(A), AdmissionResult::Approved);
        gate.start_game().unwrap();
        assert_eq!(gate.admit(B), AdmissionResult::RejectedGameStarted);

        gate.on_disconnect(A);
        assert_eq!(gate.admit(A), AdmissionResult::RejectedGameStarted);
        assert!(gate.is_empty());
    }

    #[test]
    fn test_start_game_twice_is_an_error() {
        let mut gate = SessionGate::new(0);
        gate.start_game().unwrap();
        assert_eq!(gate.start_game(), Err(SessionError::AlreadyStarted));
        assert!(gate.is_started());
    }

    #[test]
    fn test_readmission_keeps_record() {
        let mut gate = SessionGate::new(0);
        gate.admit(A);
        gate.set_selection(A, LoadoutSelection { class_id: 7, actions: vec![ActionId(2)] });
        assert_eq!(gate.admit(A), AdmissionResult::Approved);
        assert_eq!(gate.len(), 1);
        assert_eq!(gate.get(A).unwrap().selection.as_ref().unwrap().class_id, 7);
    }

    #[test]
    fn test_server_full() {
        let mut gate = SessionGate::new(2);
        gate.admit(A);
        gate.admit(B);
        assert_eq!(gate.admit(C), AdmissionResult::RejectedServerFull);
        gate.on_disconnect(A);
        assert_eq!(gate.admit(C), AdmissionResult::Approved);
    }

    #[test]
    fn test_lowest_free_slot_reused() {
        let mut gate = SessionGate::new(0);
        gate.admit(A);
        gate.admit(B);
        assert_eq!(gate.get(B).unwrap().slot, 1);

        gate.on_disconnect(A);
        gate.admit(C);
        assert_eq!(gate.get(C).unwrap().slot, 0);

        let slots: Vec<u32> = gate.records().iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![0, 1]);
    }

    #[test]
    fn test_unknown_disconnect_is_silent() {
        let mut gate = SessionGate::new(0);
        assert!(gate.on_disconnect(A).is_none());
        assert_eq!(gate.require(A), Err(SessionError::UnknownClient(A)));
    }

    #[test]
    fn test_selection_after_disconnect_is_dropped() {
        let mut gate = SessionGate::new(0);
        gate.admit(A);
        gate.on_disconnect(A);
        assert!(!gate.set_selection(A, LoadoutSelection::default()));
        assert!(gate.get(A).is_none());
    }

    #[test]
    fn test_admission_result_wire_format() {
        let bytes = postcard::to_allocvec(&AdmissionResult::RejectedGameStarted).unwrap();
        let decoded: AdmissionResult = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, AdmissionResult::RejectedGameStarted);
        assert!(!decoded.is_approved());
    }
}
