//! Radio stack trait for abstraction and testability
//!
//! This trait defines the requests the GATT server issues to the underlying
//! BLE stack, allowing the real radio glue to be swapped with a mock for
//! testing. All requests are fire-and-forget: the return value reports only
//! whether the stack accepted the request, completion arrives later as an
//! event.

use crate::config::gap;

/// Errors reported by the radio stack when a request is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// Stack cannot accept the request right now
    Busy,
    /// Request parameters were rejected
    InvalidParameter,
    /// Stack is not initialised or the referenced resource does not exist
    NotReady,
}

/// Advertisement PDU type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvType {
    /// Connectable and scannable undirected advertising
    ConnectableUndirected,
    /// Scannable undirected advertising
    ScannableUndirected,
    /// Non-connectable undirected advertising
    NonConnectableUndirected,
}

/// Address type used in advertising PDUs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnAddrType {
    /// Factory-programmed public address
    Public,
    /// Random static address
    Random,
}

/// Advertising channels to broadcast on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvChannelMap {
    /// Channels 37, 38 and 39
    All,
    /// Channel 37 only
    Channel37,
    /// Channel 38 only
    Channel38,
    /// Channel 39 only
    Channel39,
}

/// Scan and connection request filter policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvFilterPolicy {
    /// Accept scan and connection requests from any device
    Any,
    /// Accept scan requests from the white list only
    FilterScan,
    /// Accept connection requests from the white list only
    FilterConnect,
    /// Accept both only from the white list
    FilterBoth,
}

/// Advertising configuration
///
/// Constructed once at startup and reused for every advertising start.
/// Intervals are in units of 0.625 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvertisingParams {
    /// Minimum advertising interval
    pub interval_min: u16,
    /// Maximum advertising interval
    pub interval_max: u16,
    /// Advertisement PDU type
    pub adv_type: AdvType,
    /// Own device address type
    pub own_addr_type: OwnAddrType,
    /// Channels to broadcast on
    pub channel_map: AdvChannelMap,
    /// Scan/connection filter policy
    pub filter_policy: AdvFilterPolicy,
}

impl AdvertisingParams {
    /// Default parameters, usable in const context
    pub const fn new() -> Self {
        Self {
            interval_min: gap::ADV_INTERVAL_MIN,
            interval_max: gap::ADV_INTERVAL_MAX,
            adv_type: AdvType::ConnectableUndirected,
            own_addr_type: OwnAddrType::Public,
            channel_map: AdvChannelMap::All,
            filter_policy: AdvFilterPolicy::Any,
        }
    }
}

impl Default for AdvertisingParams {
    fn default() -> Self {
        Self::new()
    }
}

/// Attribute access permissions for a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharPerms(u8);

impl CharPerms {
    /// Value may be read by the client
    pub const READ: Self = Self(0x01);
    /// Value may be written by the client
    pub const WRITE: Self = Self(0x10);

    /// No access
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Combine two permission sets in const context
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Raw permission bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Check whether all bits of `other` are set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for CharPerms {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Characteristic property flags advertised to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharProps(u8);

impl CharProps {
    /// Client may read the value
    pub const READ: Self = Self(0x02);
    /// Client may write the value
    pub const WRITE: Self = Self(0x08);
    /// Server may notify the value
    pub const NOTIFY: Self = Self(0x10);

    /// No properties
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Combine two property sets in const context
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Raw property bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Check whether all bits of `other` are set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for CharProps {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Abstract BLE stack interface for testability
///
/// This trait allows the server to issue requests against either the real
/// radio glue or a mock implementation for testing. Outcomes of accepted
/// requests are delivered asynchronously as [`BleEvent`]s.
///
/// [`BleEvent`]: crate::server::events::BleEvent
pub trait BleStack {
    /// Set the GAP device name used in advertising
    fn set_device_name(&mut self, name: &str) -> Result<(), StackError>;

    /// Start broadcasting advertising frames
    ///
    /// `None` restarts with the most recently used parameters.
    fn start_advertising(&mut self, params: Option<&AdvertisingParams>) -> Result<(), StackError>;

    /// Create a GATT service with a 16-bit UUID and an attribute table budget
    fn create_service(&mut self, service_uuid: u16, num_handles: u16) -> Result<(), StackError>;

    /// Start a previously created service
    fn start_service(&mut self, service_handle: u16) -> Result<(), StackError>;

    /// Add a characteristic to a started service
    fn add_characteristic(
        &mut self,
        service_handle: u16,
        char_uuid: u16,
        perms: CharPerms,
        props: CharProps,
        max_len: usize,
        initial_value: &[u8],
    ) -> Result<(), StackError>;

    /// Send a notification or indication to a connected central
    fn send_notification(
        &mut self,
        interface: u8,
        conn_id: u16,
        attr_handle: u16,
        payload: &[u8],
        confirm: bool,
    ) -> Result<(), StackError>;
}

#[cfg(test)]
pub mod mock {
    //! Mock BLE stack for testing

    use super::*;
    use crate::config::gatt::MAX_VALUE_LEN;
    use core::cell::RefCell;
    use heapless::{String, Vec};

    /// Maximum requests retained in the mock history
    const HISTORY_SIZE: usize = 16;

    /// One recorded stack request with owned copies of its arguments
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StackRequest {
        SetDeviceName {
            name: String<32>,
        },
        StartAdvertising {
            params: Option<AdvertisingParams>,
        },
        CreateService {
            service_uuid: u16,
            num_handles: u16,
        },
        StartService {
            service_handle: u16,
        },
        AddCharacteristic {
            service_handle: u16,
            char_uuid: u16,
            perms: CharPerms,
            props: CharProps,
            max_len: usize,
            initial_value: Vec<u8, MAX_VALUE_LEN>,
        },
        SendNotification {
            interface: u8,
            conn_id: u16,
            attr_handle: u16,
            payload: Vec<u8, MAX_VALUE_LEN>,
            confirm: bool,
        },
    }

    /// Mock BLE stack for unit testing
    ///
    /// Records every request in order so tests can assert on the exact
    /// sequence the server issued.
    pub struct MockBleStack {
        /// Record of accepted requests
        requests: RefCell<Vec<StackRequest, HISTORY_SIZE>>,
        /// Error to return on the next request
        next_error: RefCell<Option<StackError>>,
    }

    impl MockBleStack {
        /// Create a new mock stack
        pub fn new() -> Self {
            Self {
                requests: RefCell::new(Vec::new()),
                next_error: RefCell::new(None),
            }
        }

        /// Set an error to be returned by the next request
        pub fn set_next_error(&self, error: StackError) {
            *self.next_error.borrow_mut() = Some(error);
        }

        /// Get all recorded requests in issue order
        pub fn get_request_history(&self) -> Vec<StackRequest, HISTORY_SIZE> {
            self.requests.borrow().clone()
        }

        /// Count recorded start-advertising requests
        pub fn advertising_start_count(&self) -> usize {
            self.requests
                .borrow()
                .iter()
                .filter(|r| matches!(r, StackRequest::StartAdvertising { .. }))
                .count()
        }

        /// Count recorded send-notification requests
        pub fn notification_count(&self) -> usize {
            self.requests
                .borrow()
                .iter()
                .filter(|r| matches!(r, StackRequest::SendNotification { .. }))
                .count()
        }

        fn take_error(&self) -> Result<(), StackError> {
            match self.next_error.borrow_mut().take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        fn record(&self, request: StackRequest) {
            let _ = self.requests.borrow_mut().push(request);
        }
    }

    impl Default for MockBleStack {
        fn default() -> Self {
            Self::new()
        }
    }

    impl BleStack for MockBleStack {
        fn set_device_name(&mut self, name: &str) -> Result<(), StackError> {
            self.take_error()?;
            let mut owned = String::new();
            owned
                .push_str(name)
                .map_err(|_| StackError::InvalidParameter)?;
            self.record(StackRequest::SetDeviceName { name: owned });
            Ok(())
        }

        fn start_advertising(
            &mut self,
            params: Option<&AdvertisingParams>,
        ) -> Result<(), StackError> {
            self.take_error()?;
            self.record(StackRequest::StartAdvertising {
                params: params.copied(),
            });
            Ok(())
        }

        fn create_service(&mut self, service_uuid: u16, num_handles: u16) -> Result<(), StackError> {
            self.take_error()?;
            self.record(StackRequest::CreateService {
                service_uuid,
                num_handles,
            });
            Ok(())
        }

        fn start_service(&mut self, service_handle: u16) -> Result<(), StackError> {
            self.take_error()?;
            self.record(StackRequest::StartService { service_handle });
            Ok(())
        }

        fn add_characteristic(
            &mut self,
            service_handle: u16,
            char_uuid: u16,
            perms: CharPerms,
            props: CharProps,
            max_len: usize,
            initial_value: &[u8],
        ) -> Result<(), StackError> {
            self.take_error()?;
            let mut value = Vec::new();
            value
                .extend_from_slice(initial_value)
                .map_err(|_| StackError::InvalidParameter)?;
            self.record(StackRequest::AddCharacteristic {
                service_handle,
                char_uuid,
                perms,
                props,
                max_len,
                initial_value: value,
            });
            Ok(())
        }

        fn send_notification(
            &mut self,
            interface: u8,
            conn_id: u16,
            attr_handle: u16,
            payload: &[u8],
            confirm: bool,
        ) -> Result<(), StackError> {
            self.take_error()?;
            let mut owned = Vec::new();
            owned
                .extend_from_slice(payload)
                .map_err(|_| StackError::InvalidParameter)?;
            self.record(StackRequest::SendNotification {
                interface,
                conn_id,
                attr_handle,
                payload: owned,
                confirm,
            });
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_mock_records_in_order() {
            let mut stack = MockBleStack::new();

            stack.set_device_name("test").unwrap();
            stack.create_service(0x00FF, 10).unwrap();

            let history = stack.get_request_history();
            assert_eq!(history.len(), 2);
            assert!(matches!(history[0], StackRequest::SetDeviceName { .. }));
            assert_eq!(
                history[1],
                StackRequest::CreateService {
                    service_uuid: 0x00FF,
                    num_handles: 10,
                }
            );
        }

        #[test]
        fn test_mock_error_injection() {
            let mut stack = MockBleStack::new();

            stack.set_next_error(StackError::Busy);
            let result = stack.start_advertising(None);
            assert_eq!(result, Err(StackError::Busy));

            // Error should be cleared, next call should succeed and be recorded
            stack.start_advertising(None).unwrap();
            assert_eq!(stack.advertising_start_count(), 1);
        }

        #[test]
        fn test_mock_rejected_request_not_recorded() {
            let mut stack = MockBleStack::new();

            stack.set_next_error(StackError::NotReady);
            let _ = stack.start_service(3);

            assert!(stack.get_request_history().is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_props_bitor_and_contains() {
        let props = CharProps::READ | CharProps::WRITE | CharProps::NOTIFY;

        assert!(props.contains(CharProps::READ));
        assert!(props.contains(CharProps::NOTIFY));
        assert_eq!(props.bits(), 0x1A);

        let read_only = CharProps::READ;
        assert!(!read_only.contains(CharProps::NOTIFY));
    }

    #[test]
    fn test_perms_bitor_and_contains() {
        let perms = CharPerms::READ | CharPerms::WRITE;

        assert!(perms.contains(CharPerms::READ));
        assert!(perms.contains(CharPerms::WRITE));
        assert_eq!(perms.bits(), 0x11);
        assert!(!CharPerms::empty().contains(CharPerms::READ));
    }

    #[test]
    fn test_default_advertising_params() {
        let params = AdvertisingParams::default();

        assert_eq!(params.interval_min, 0x20);
        assert_eq!(params.interval_max, 0x40);
        assert_eq!(params.adv_type, AdvType::ConnectableUndirected);
        assert_eq!(params.channel_map, AdvChannelMap::All);
        assert_eq!(params.filter_policy, AdvFilterPolicy::Any);
    }
}
