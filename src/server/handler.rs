//! GATT server event handling
//!
//! This module owns the server lifecycle: it consumes [`BleEvent`]s from the
//! radio stack, advances the service construction sequence, tracks the
//! single active connection and serves the write/notify protocol. All stack
//! interaction goes through the [`BleStack`] trait so the logic can be
//! exercised against a mock.

use crate::config::{commands, gap, gatt};
use crate::server::events::BleEvent;
use crate::server::stack::{AdvertisingParams, BleStack, StackError};
use crate::server::state::{
    ActiveConnection, BuildPhase, ServerState, DATA_CHAR_PERMS, DATA_CHAR_PROPS,
};
use log::{debug, info, warn};

/// Single-service GATT server
///
/// Owns all server state. Events are fed in through [`handle_event`] and
/// notifications go out through [`notify`]; both are synchronous, rejected
/// stack requests are logged and otherwise ignored.
///
/// [`handle_event`]: Self::handle_event
/// [`notify`]: Self::notify
pub struct GattServer {
    state: ServerState,
    adv_params: AdvertisingParams,
}

impl GattServer {
    /// Create a server with the default advertising parameters
    pub const fn new() -> Self {
        Self::with_params(AdvertisingParams::new())
    }

    /// Create a server with explicit advertising parameters
    pub const fn with_params(adv_params: AdvertisingParams) -> Self {
        Self {
            state: ServerState::new(),
            adv_params,
        }
    }

    /// Read access to the server state
    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Advertising parameters the server was configured with
    pub fn adv_params(&self) -> &AdvertisingParams {
        &self.adv_params
    }

    /// Dispatch one stack event
    ///
    /// Events must be delivered in the order the stack emits them; builder
    /// events arriving out of order are logged and dropped.
    pub fn handle_event<S: BleStack>(&mut self, stack: &mut S, event: BleEvent) {
        match event {
            BleEvent::RegistrationComplete => self.handle_registration(stack),
            BleEvent::ServiceCreated { service_handle } => {
                self.handle_service_created(stack, service_handle)
            }
            BleEvent::CharacteristicAdded { attr_handle } => {
                self.handle_characteristic_added(attr_handle)
            }
            BleEvent::Connected { conn_id, interface } => self.handle_connected(conn_id, interface),
            BleEvent::Disconnected { reason } => self.handle_disconnected(stack, reason),
            BleEvent::WriteReceived { payload } => self.handle_write(stack, &payload),
            BleEvent::AdvertisingStarted { success } => {
                if success {
                    info!("Advertising started");
                } else {
                    warn!("Advertising failed to start, device is not discoverable");
                }
            }
        }
    }

    /// Send a notification carrying `payload` to the connected central
    ///
    /// No-op unless a central is connected and the characteristic exists.
    /// Fire-and-forget: a rejected send is logged, never returned.
    pub fn notify<S: BleStack>(&self, stack: &mut S, payload: &[u8]) {
        let (conn, attr_handle) = match (self.state.connection, self.state.char_handle) {
            (Some(conn), Some(handle)) => (conn, handle),
            _ => {
                debug!("Notify skipped, no active connection");
                return;
            }
        };

        if let Err(e) = stack.send_notification(
            conn.interface,
            conn.conn_id,
            attr_handle,
            payload,
            false,
        ) {
            warn!("Notification rejected: {:?}", e);
        }
    }

    /// Registration complete: establish identity, go discoverable, build the
    /// service table
    fn handle_registration<S: BleStack>(&mut self, stack: &mut S) {
        info!("Registered, advertising as '{}'", gap::DEVICE_NAME);

        self.log_rejected("set device name", stack.set_device_name(gap::DEVICE_NAME));
        self.log_rejected(
            "start advertising",
            stack.start_advertising(Some(&self.adv_params)),
        );
        self.log_rejected(
            "create service",
            stack.create_service(gatt::SERVICE_UUID, gatt::NUM_HANDLES),
        );
    }

    /// Service created: start it and attach the data characteristic
    fn handle_service_created<S: BleStack>(&mut self, stack: &mut S, service_handle: u16) {
        if self.state.phase != BuildPhase::Unregistered {
            warn!(
                "Service created event in phase {:?}, ignoring",
                self.state.phase
            );
            return;
        }

        info!("Service created, handle {}", service_handle);
        self.state.service_handle = Some(service_handle);
        self.state.phase = BuildPhase::ServiceCreated;

        self.log_rejected("start service", stack.start_service(service_handle));
        self.state.phase = BuildPhase::ServiceStarted;

        self.log_rejected(
            "add characteristic",
            stack.add_characteristic(
                service_handle,
                gatt::CHAR_UUID,
                DATA_CHAR_PERMS,
                DATA_CHAR_PROPS,
                gatt::MAX_VALUE_LEN,
                self.state.value.as_slice(),
            ),
        );
    }

    /// Characteristic added: capture its value attribute handle for notify
    fn handle_characteristic_added(&mut self, attr_handle: u16) {
        if self.state.phase != BuildPhase::ServiceStarted {
            warn!(
                "Characteristic added event in phase {:?}, ignoring",
                self.state.phase
            );
            return;
        }

        info!("Characteristic added, handle {}", attr_handle);
        self.state.char_handle = Some(attr_handle);
        self.state.phase = BuildPhase::CharacteristicAdded;
    }

    /// Central connected: record its identifiers
    ///
    /// A connect while already connected replaces the stored identifiers.
    /// The stack is configured for a single link, so the previous one is
    /// already gone by the time this arrives.
    fn handle_connected(&mut self, conn_id: u16, interface: u8) {
        if let Some(old) = self.state.connection {
            warn!(
                "Connect while conn {} is active, replacing with conn {}",
                old.conn_id, conn_id
            );
        } else {
            info!("Central connected, conn {} on interface {}", conn_id, interface);
        }

        self.state.connection = Some(ActiveConnection { conn_id, interface });
    }

    /// Central disconnected: drop the connection and resume advertising
    fn handle_disconnected<S: BleStack>(&mut self, stack: &mut S, reason: u8) {
        info!(
            "Central disconnected (reason 0x{:02X}), restarting advertising",
            reason
        );

        self.state.connection = None;
        self.log_rejected("restart advertising", stack.start_advertising(None));
    }

    /// Write received: store the value and check for the trigger command
    fn handle_write<S: BleStack>(&mut self, stack: &mut S, payload: &[u8]) {
        match core::str::from_utf8(payload) {
            Ok(text) => info!("Write received, {} bytes: {:?}", payload.len(), text),
            Err(_) => info!("Write received, {} bytes (binary)", payload.len()),
        }
        debug!("Write payload: {:02X?}", payload);

        self.state.value.set(payload);

        if payload == commands::SEND_NOW {
            info!("Send trigger received, notifying");
            self.notify(stack, commands::SEND_NOW_RESPONSE);
        }
    }

    fn log_rejected(&self, what: &str, result: Result<(), StackError>) {
        if let Err(e) = result {
            warn!("Request to {} rejected: {:?}", what, e);
        }
    }
}

impl Default for GattServer {
    fn default() -> Self {
        Self::new()
    }
}
