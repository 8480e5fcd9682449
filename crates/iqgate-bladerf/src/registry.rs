//! Buddy registry: shared hardware parameters across the two logical
//! devices of one physical transceiver.
//!
//! The receive and transmit directions of a BladeRF1 are independent
//! logical devices sharing one USB session. Whichever opens first owns the
//! handle; the other attaches by copying the owner's published
//! [`SharedParams`]. The registry is the only channel between them -- no
//! raw pointer aliasing, only `Arc` clones of immutable snapshots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use iqgate_core::sdk::SdrHandle;
use iqgate_core::types::Direction;

/// Run state of a logical device's engine, visible to its buddy.
///
/// The buddy consults this before rewiring shared RF hardware: expansion
/// board changes are skipped while the peer is [`Running`](EngineState::Running).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// Device object exists but was never started.
    #[default]
    NotStarted,
    /// Opened and configured, not streaming.
    Idle,
    /// Streaming worker is active.
    Running,
}

/// Hardware parameters shared between the two directions of one chip.
///
/// Published by whichever device mutates them; consumed as an immutable
/// snapshot (the whole struct is cloned out of the registry).
#[derive(Clone, Default)]
pub struct SharedParams {
    /// The open hardware session, if any.
    pub handle: Option<Arc<dyn SdrHandle>>,
    /// Whether the XB-200 expansion board is currently attached.
    pub xb200_attached: bool,
}

#[derive(Default)]
struct BuddyEntry {
    shared: SharedParams,
    state: EngineState,
}

/// Registry of logical devices keyed by (serial, direction).
///
/// One registry instance is shared by all devices in a process. Entries
/// are weak, queryable links -- the registry never owns the hardware
/// session, it only republishes `Arc` clones.
#[derive(Default)]
pub struct BuddyRegistry {
    entries: Mutex<HashMap<(String, Direction), BuddyEntry>>,
}

fn lock(
    entries: &Mutex<HashMap<(String, Direction), BuddyEntry>>,
) -> MutexGuard<'_, HashMap<(String, Direction), BuddyEntry>> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}

impl BuddyRegistry {
    /// Create an empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(BuddyRegistry::default())
    }

    /// Publish this device's shared parameters, preserving its run state.
    pub fn publish(&self, serial: &str, dir: Direction, shared: SharedParams) {
        let mut entries = lock(&self.entries);
        let entry = entries.entry((serial.to_string(), dir)).or_default();
        entry.shared = shared;
    }

    /// Remove this device's entry entirely.
    pub fn clear(&self, serial: &str, dir: Direction) {
        lock(&self.entries).remove(&(serial.to_string(), dir));
    }

    /// Snapshot of the buddy's shared parameters, if the buddy is registered.
    pub fn peer(&self, serial: &str, dir: Direction) -> Option<SharedParams> {
        lock(&self.entries)
            .get(&(serial.to_string(), dir.opposite()))
            .map(|e| e.shared.clone())
    }

    /// Whether the buddy direction has a registry entry.
    pub fn peer_registered(&self, serial: &str, dir: Direction) -> bool {
        lock(&self.entries).contains_key(&(serial.to_string(), dir.opposite()))
    }

    /// The buddy's engine run state, if the buddy is registered.
    pub fn peer_state(&self, serial: &str, dir: Direction) -> Option<EngineState> {
        lock(&self.entries)
            .get(&(serial.to_string(), dir.opposite()))
            .map(|e| e.state)
    }

    /// Record this device's engine run state.
    pub fn set_state(&self, serial: &str, dir: Direction, state: EngineState) {
        let mut entries = lock(&self.entries);
        let entry = entries.entry((serial.to_string(), dir)).or_default();
        entry.state = state;
    }

    /// Update the expansion board flag in this device's published entry.
    pub fn set_xb200_attached(&self, serial: &str, dir: Direction, attached: bool) {
        let mut entries = lock(&self.entries);
        let entry = entries.entry((serial.to_string(), dir)).or_default();
        entry.shared.xb200_attached = attached;
    }

    /// Number of registered entries (diagnostics and tests).
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iqgate_test_harness::MockSdrHandle;

    #[test]
    fn empty_registry_has_no_peer() {
        let reg = BuddyRegistry::new();
        assert!(reg.peer("s1", Direction::Tx).is_none());
        assert!(!reg.peer_registered("s1", Direction::Tx));
        assert!(reg.peer_state("s1", Direction::Tx).is_none());
    }

    #[test]
    fn publish_is_visible_to_opposite_direction_only() {
        let reg = BuddyRegistry::new();
        let handle = MockSdrHandle::new();
        reg.publish(
            "s1",
            Direction::Rx,
            SharedParams {
                handle: Some(handle),
                xb200_attached: true,
            },
        );
        // The Tx side sees the Rx entry as its peer.
        let peer = reg.peer("s1", Direction::Tx).unwrap();
        assert!(peer.handle.is_some());
        assert!(peer.xb200_attached);
        // The Rx side has no peer yet.
        assert!(reg.peer("s1", Direction::Rx).is_none());
    }

    #[test]
    fn entries_are_scoped_by_serial() {
        let reg = BuddyRegistry::new();
        reg.publish("s1", Direction::Rx, SharedParams::default());
        assert!(!reg.peer_registered("s2", Direction::Tx));
        assert!(reg.peer_registered("s1", Direction::Tx));
    }

    #[test]
    fn state_survives_republish() {
        let reg = BuddyRegistry::new();
        reg.publish("s1", Direction::Rx, SharedParams::default());
        reg.set_state("s1", Direction::Rx, EngineState::Running);
        reg.publish("s1", Direction::Rx, SharedParams::default());
        assert_eq!(
            reg.peer_state("s1", Direction::Tx),
            Some(EngineState::Running)
        );
    }

    #[test]
    fn clear_removes_entry() {
        let reg = BuddyRegistry::new();
        reg.publish("s1", Direction::Rx, SharedParams::default());
        reg.clear("s1", Direction::Rx);
        assert!(reg.is_empty());
        assert!(!reg.peer_registered("s1", Direction::Tx));
    }

    #[test]
    fn xb200_flag_update_preserves_handle() {
        let reg = BuddyRegistry::new();
        reg.publish(
            "s1",
            Direction::Tx,
            SharedParams {
                handle: Some(MockSdrHandle::new()),
                xb200_attached: false,
            },
        );
        reg.set_xb200_attached("s1", Direction::Tx, true);
        let peer = reg.peer("s1", Direction::Rx).unwrap();
        assert!(peer.xb200_attached);
        assert!(peer.handle.is_some());
    }
}
