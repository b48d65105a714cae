//! BLE host task
//!
//! Runs the radio stack: advertises, accepts one central at a time and
//! bridges link activity into server events. Requests the server issues come
//! back through [`RadioStack`], the on-device [`BleStack`] implementation,
//! which completes build requests against the static attribute table and
//! queues notifications for the connection loop to send.

use core::cell::RefCell;

use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::Duration;
use heapless::{String, Vec};
use log::{debug, info, warn};
use trouble_host::prelude::*;

use crate::config::gap;
use crate::config::gatt::{self, MAX_VALUE_LEN};
use crate::config::queues::NOTIFY_QUEUE_SIZE;
use crate::server::events::BleEvent;
use crate::server::handler::GattServer;
use crate::server::stack::{AdvertisingParams, BleStack, CharPerms, CharProps, StackError};

/// Number of maximum concurrent connections
const CONNECTIONS_MAX: usize = 1;
/// Number of L2CAP channels (signalling + ATT)
const L2CAP_CHANNELS_MAX: usize = 2;

/// Interface identifier reported for the single registered application
const APP_INTERFACE: u8 = 0;

/// Completion events a single build request can fan out into
const PENDING_EVENTS_MAX: usize = 4;

/// BLE GATT server with the single data service
#[gatt_server(mutex_type = CriticalSectionRawMutex)]
struct Server {
    data_service: DataService,
}

/// Primary data service
#[gatt_service(uuid = "000000ff-0000-1000-8000-00805f9b34fb")]
struct DataService {
    /// Read/write value, notified on demand
    #[characteristic(uuid = "0000ff01-0000-1000-8000-00805f9b34fb", read, write, notify)]
    value: Vec<u8, MAX_VALUE_LEN>,
}

/// Server and its stack adapter behind one lock
///
/// Both the connection loop and any application task go through this cell,
/// so one dispatch or notify call is always observed whole.
struct SharedServer {
    server: GattServer,
    stack: RadioStack,
}

/// Shared server state, filled in when the BLE task starts
static SERVER_STATE: Mutex<CriticalSectionRawMutex, RefCell<Option<SharedServer>>> =
    Mutex::new(RefCell::new(None));

/// Payloads waiting to be sent as notifications
static NOTIFY_CHANNEL: Channel<CriticalSectionRawMutex, Vec<u8, MAX_VALUE_LEN>, NOTIFY_QUEUE_SIZE> =
    Channel::new();

/// Signal that the server has requested an advertising start
static ADV_REQUEST: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// On-device stack adapter
///
/// The attribute table is declared statically through the GATT macros, so
/// build requests complete immediately: each one queues the completion event
/// the server expects, carrying the real handles. Advertising and
/// notification requests are handed to the async side.
struct RadioStack {
    /// Name broadcast in advertising frames
    device_name: String<32>,
    /// Parameters from the most recent explicit advertising request
    last_adv_params: AdvertisingParams,
    /// Completion events not yet delivered back to the server
    pending: Vec<BleEvent, PENDING_EVENTS_MAX>,
    /// Value attribute handle of the data characteristic
    char_handle: u16,
}

impl RadioStack {
    fn new(char_handle: u16) -> Self {
        let mut device_name = String::new();
        let _ = device_name.push_str(gap::DEVICE_NAME);

        Self {
            device_name,
            last_adv_params: AdvertisingParams::new(),
            pending: Vec::new(),
            char_handle,
        }
    }

    /// Pop the oldest queued completion event
    fn take_pending(&mut self) -> Option<BleEvent> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }

    fn queue_completion(&mut self, event: BleEvent) -> Result<(), StackError> {
        self.pending.push(event).map_err(|_| StackError::Busy)
    }
}

impl BleStack for RadioStack {
    fn set_device_name(&mut self, name: &str) -> Result<(), StackError> {
        self.device_name.clear();
        self.device_name
            .push_str(name)
            .map_err(|_| StackError::InvalidParameter)
    }

    fn start_advertising(&mut self, params: Option<&AdvertisingParams>) -> Result<(), StackError> {
        if let Some(params) = params {
            self.last_adv_params = *params;
        }
        ADV_REQUEST.signal(());
        Ok(())
    }

    fn create_service(&mut self, service_uuid: u16, _num_handles: u16) -> Result<(), StackError> {
        if service_uuid != gatt::SERVICE_UUID {
            return Err(StackError::InvalidParameter);
        }

        // Service declaration sits two handles below the value attribute
        let service_handle = self.char_handle.saturating_sub(2);
        self.queue_completion(BleEvent::ServiceCreated { service_handle })
    }

    fn start_service(&mut self, _service_handle: u16) -> Result<(), StackError> {
        // The static table is live from construction, nothing to do
        Ok(())
    }

    fn add_characteristic(
        &mut self,
        _service_handle: u16,
        char_uuid: u16,
        _perms: CharPerms,
        _props: CharProps,
        max_len: usize,
        _initial_value: &[u8],
    ) -> Result<(), StackError> {
        if char_uuid != gatt::CHAR_UUID || max_len > MAX_VALUE_LEN {
            return Err(StackError::InvalidParameter);
        }

        let attr_handle = self.char_handle;
        self.queue_completion(BleEvent::CharacteristicAdded { attr_handle })
    }

    fn send_notification(
        &mut self,
        _interface: u8,
        _conn_id: u16,
        _attr_handle: u16,
        payload: &[u8],
        _confirm: bool,
    ) -> Result<(), StackError> {
        let mut owned = Vec::new();
        owned
            .extend_from_slice(payload)
            .map_err(|_| StackError::InvalidParameter)?;
        NOTIFY_CHANNEL.try_send(owned).map_err(|_| StackError::Busy)
    }
}

/// Deliver one stack event to the server
///
/// Build requests accepted during dispatch complete immediately; their
/// completion events are delivered in order before this returns, the same
/// way the stack would deliver its callbacks.
fn dispatch_event(event: BleEvent) {
    SERVER_STATE.lock(|cell| {
        let mut borrowed = cell.borrow_mut();
        if let Some(shared) = borrowed.as_mut() {
            shared.server.handle_event(&mut shared.stack, event);
            while let Some(completion) = shared.stack.take_pending() {
                shared.server.handle_event(&mut shared.stack, completion);
            }
        } else {
            warn!("Dropping event before server start: {:?}", event);
        }
    });
}

/// Send a notification to the connected central, callable from any task
///
/// No-op while no central is connected.
pub fn notify_value(payload: &[u8]) {
    SERVER_STATE.lock(|cell| {
        let mut borrowed = cell.borrow_mut();
        if let Some(shared) = borrowed.as_mut() {
            shared.server.notify(&mut shared.stack, payload);
        } else {
            debug!("Notify ignored, server not started");
        }
    });
}

fn init_server(char_handle: u16) {
    SERVER_STATE.lock(|cell| {
        cell.replace(Some(SharedServer {
            server: GattServer::new(),
            stack: RadioStack::new(char_handle),
        }));
    });
}

/// Name and parameters for the next advertising start, as set by the server
fn advertising_snapshot() -> (String<32>, AdvertisingParams) {
    SERVER_STATE.lock(|cell| {
        let borrowed = cell.borrow();
        if let Some(shared) = borrowed.as_ref() {
            (shared.stack.device_name.clone(), shared.stack.last_adv_params)
        } else {
            let mut name = String::new();
            let _ = name.push_str(gap::DEVICE_NAME);
            (name, AdvertisingParams::new())
        }
    })
}

/// Convert advertising parameters into the transport representation
///
/// Interval units are 0.625 ms. PDU type and channel selection follow from
/// the advertisement kind used on start.
fn transport_adv_params(params: &AdvertisingParams) -> AdvertisementParameters {
    AdvertisementParameters {
        interval_min: Duration::from_micros(u64::from(params.interval_min) * 625),
        interval_max: Duration::from_micros(u64::from(params.interval_max) * 625),
        ..Default::default()
    }
}

/// Main BLE task that manages the Bluetooth stack and connections
///
/// This task:
/// 1. Builds the host stack and the static GATT table
/// 2. Registers the server and replays its build sequence
/// 3. Advertises whenever the server asks for it
/// 4. Feeds connect/disconnect/write activity back as server events
/// 5. Sends queued notifications over the live connection
pub async fn ble_task<C: Controller>(controller: C, device_id: [u8; 3]) {
    let mut resources: HostResources<DefaultPacketPool, CONNECTIONS_MAX, L2CAP_CHANNELS_MAX> =
        HostResources::new();

    // Build the BLE stack with address derived from device ID
    let stack = trouble_host::new(controller, &mut resources).set_random_address(Address::random([
        device_id[0],
        device_id[1],
        device_id[2],
        0x2A,
        0x90,
        0xC3,
    ]));

    let Host {
        mut peripheral,
        mut runner,
        ..
    } = stack.build();

    let gap_config = GapConfig::Peripheral(PeripheralConfig {
        name: gap::DEVICE_NAME,
        appearance: &appearance::UNKNOWN,
    });
    let server = match Server::new_with_config(gap_config) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to build GATT server: {:?}", e);
            return;
        }
    };
    let value_handle = server.data_service.value.handle;

    init_server(value_handle);

    // The stack is up and the application registered; this kicks off the
    // device name, advertising and service build requests
    dispatch_event(BleEvent::RegistrationComplete);

    let runner_task = async {
        loop {
            if let Err(e) = runner.run().await {
                warn!("BLE runner error: {:?}", e);
            }
        }
    };

    let peripheral_task = async {
        let mut next_conn_id: u16 = 0;

        loop {
            ADV_REQUEST.wait().await;

            let (device_name, params) = advertising_snapshot();
            let mut adv_data = [0u8; 31];
            let len = match AdStructure::encode_slice(
                &[
                    AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
                    AdStructure::CompleteLocalName(device_name.as_bytes()),
                ],
                &mut adv_data,
            ) {
                Ok(l) => l,
                Err(_) => return,
            };

            let advertiser = match peripheral
                .advertise(
                    &transport_adv_params(&params),
                    Advertisement::ConnectableScannableUndirected {
                        adv_data: &adv_data[..len],
                        scan_data: &[],
                    },
                )
                .await
            {
                Ok(a) => {
                    dispatch_event(BleEvent::AdvertisingStarted { success: true });
                    a
                }
                Err(e) => {
                    warn!("Advertise request failed: {:?}", e);
                    dispatch_event(BleEvent::AdvertisingStarted { success: false });
                    continue;
                }
            };

            let conn = match advertiser.accept().await {
                Ok(acceptor) => match acceptor.with_attribute_server(&server) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("Attribute server attach failed: {:?}", e);
                        ADV_REQUEST.signal(());
                        continue;
                    }
                },
                Err(e) => {
                    warn!("Accept failed: {:?}", e);
                    ADV_REQUEST.signal(());
                    continue;
                }
            };

            // Drop notifications queued against a previous link
            while NOTIFY_CHANNEL.try_receive().is_ok() {}

            let conn_id = next_conn_id;
            next_conn_id = next_conn_id.wrapping_add(1);
            dispatch_event(BleEvent::Connected {
                conn_id,
                interface: APP_INTERFACE,
            });

            loop {
                match select(conn.next(), NOTIFY_CHANNEL.receive()).await {
                    Either::First(event) => match event {
                        GattConnectionEvent::Disconnected { reason } => {
                            dispatch_event(BleEvent::Disconnected {
                                reason: reason.into_inner(),
                            });
                            break;
                        }
                        GattConnectionEvent::Gatt { event } => {
                            if let GattEvent::Write(ref write_event) = event {
                                if write_event.handle() == value_handle {
                                    dispatch_event(BleEvent::write_from_slice(write_event.data()));
                                }
                            }
                            match event.accept() {
                                Ok(reply) => reply.send().await,
                                Err(e) => warn!("Error sending response: {:?}", e),
                            }
                        }
                        _ => {}
                    },
                    Either::Second(payload) => {
                        if server
                            .data_service
                            .value
                            .notify(&conn, &payload)
                            .await
                            .is_err()
                        {
                            debug!("Notification dropped, central not subscribed or link down");
                        }
                    }
                }
            }
        }
    };

    info!("BLE stack running");
    select(runner_task, peripheral_task).await;
}
