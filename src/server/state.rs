//! Owned server state
//!
//! All mutable GATT server state lives in [`ServerState`], owned by the
//! server and passed by reference into event dispatch and notify. There is
//! no global state; sharing across contexts is the caller's concern.

use crate::config::gatt::MAX_VALUE_LEN;
use crate::server::stack::{CharPerms, CharProps};
use heapless::Vec;

/// Permissions the data characteristic is created with
pub const DATA_CHAR_PERMS: CharPerms = CharPerms::READ.union(CharPerms::WRITE);

/// Properties the data characteristic is created with
pub const DATA_CHAR_PROPS: CharProps =
    CharProps::READ.union(CharProps::WRITE).union(CharProps::NOTIFY);

/// Progress of the one-shot service construction sequence
///
/// Phases advance strictly in declaration order, one stack event per step.
/// The table is write-once: `CharacteristicAdded` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    /// Waiting for stack registration
    Unregistered,
    /// Service created, waiting for it to start
    ServiceCreated,
    /// Service started, characteristic add requested
    ServiceStarted,
    /// Characteristic in place, attribute table final
    CharacteristicAdded,
}

/// Identifiers of the currently connected central
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveConnection {
    /// Connection identifier assigned by the stack
    pub conn_id: u16,
    /// Stack interface the connection arrived on
    pub interface: u8,
}

/// Value buffer backing the characteristic
///
/// Fixed 64-byte capacity; writes beyond it are truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicValue {
    bytes: Vec<u8, MAX_VALUE_LEN>,
}

impl CharacteristicValue {
    /// Create an empty value
    pub const fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Replace the value, truncating to the buffer capacity
    pub fn set(&mut self, data: &[u8]) {
        let take = data.len().min(MAX_VALUE_LEN);
        self.bytes.clear();
        let _ = self.bytes.extend_from_slice(&data[..take]);
    }

    /// Current value bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Current value length
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the value is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Default for CharacteristicValue {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable state of the GATT server
///
/// Populated strictly in event order: registration assigns nothing, service
/// creation fills `service_handle`, the characteristic event fills
/// `char_handle`, connect fills `connection`. Disconnect clears only
/// `connection`; handles persist for the process lifetime.
pub struct ServerState {
    /// Construction progress of the service table
    pub phase: BuildPhase,
    /// Handle assigned to the service, absent until creation completes
    pub service_handle: Option<u16>,
    /// Value attribute handle, absent until the characteristic is added
    pub char_handle: Option<u16>,
    /// Properties the characteristic is built with
    pub properties: CharProps,
    /// Connected central; absence means no connection
    pub connection: Option<ActiveConnection>,
    /// Current characteristic value
    pub value: CharacteristicValue,
}

impl ServerState {
    /// Create the initial state
    pub const fn new() -> Self {
        Self {
            phase: BuildPhase::Unregistered,
            service_handle: None,
            char_handle: None,
            properties: DATA_CHAR_PROPS,
            connection: None,
            value: CharacteristicValue::new(),
        }
    }

    /// Whether a central is currently connected
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = ServerState::new();

        assert_eq!(state.phase, BuildPhase::Unregistered);
        assert_eq!(state.service_handle, None);
        assert_eq!(state.char_handle, None);
        assert!(!state.is_connected());
        assert!(state.value.is_empty());
        assert!(state.properties.contains(CharProps::NOTIFY));
    }

    #[test]
    fn test_value_set_and_overwrite() {
        let mut value = CharacteristicValue::new();

        value.set(b"hello");
        assert_eq!(value.as_slice(), b"hello");

        // A shorter write fully replaces the previous value
        value.set(b"hi");
        assert_eq!(value.as_slice(), b"hi");
        assert_eq!(value.len(), 2);
    }

    #[test]
    fn test_value_truncates_at_capacity() {
        let mut value = CharacteristicValue::new();
        let big = [0x55_u8; 80];

        value.set(&big);
        assert_eq!(value.len(), MAX_VALUE_LEN);
    }
}
