//! Events delivered by the radio stack
//!
//! The stack reports the outcome of earlier requests and link activity as
//! asynchronous events. Each request→event pairing follows the GATT server
//! lifecycle: registration, service creation, characteristic creation, then
//! connect/disconnect and writes for the life of the process.

use crate::config::gatt::MAX_VALUE_LEN;
use heapless::Vec;

/// One asynchronous event from the BLE stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BleEvent {
    /// The GATT application is registered and the stack is ready for
    /// service creation
    RegistrationComplete,

    /// A service was created; carries the handle assigned to it
    ServiceCreated { service_handle: u16 },

    /// The characteristic was added; carries its value attribute handle
    CharacteristicAdded { attr_handle: u16 },

    /// A central connected
    Connected {
        /// Connection identifier assigned by the stack
        conn_id: u16,
        /// Stack interface the connection arrived on
        interface: u8,
    },

    /// The central disconnected
    Disconnected {
        /// HCI disconnect reason code
        reason: u8,
    },

    /// The central wrote to the characteristic value
    WriteReceived {
        /// Written bytes, truncated to the value buffer maximum
        payload: Vec<u8, MAX_VALUE_LEN>,
    },

    /// Advertising start completed
    AdvertisingStarted { success: bool },
}

impl BleEvent {
    /// Build a write event from a raw payload, truncating if oversized
    pub fn write_from_slice(data: &[u8]) -> Self {
        let take = data.len().min(MAX_VALUE_LEN);
        let mut payload = Vec::new();
        // Truncation cannot fail after the length clamp
        let _ = payload.extend_from_slice(&data[..take]);
        Self::WriteReceived { payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_from_slice_preserves_payload() {
        let event = BleEvent::write_from_slice(b"send_now");

        match event {
            BleEvent::WriteReceived { payload } => {
                assert_eq!(payload.as_slice(), b"send_now");
            }
            _ => panic!("Expected WriteReceived event"),
        }
    }

    #[test]
    fn test_write_from_slice_truncates_oversized() {
        let big = [0xAB_u8; 100];
        let event = BleEvent::write_from_slice(&big);

        match event {
            BleEvent::WriteReceived { payload } => {
                assert_eq!(payload.len(), MAX_VALUE_LEN);
                assert!(payload.iter().all(|&b| b == 0xAB));
            }
            _ => panic!("Expected WriteReceived event"),
        }
    }
}
