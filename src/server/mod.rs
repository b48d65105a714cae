//! Core GATT server
//!
//! Hardware-independent server logic: the event-driven lifecycle handler,
//! its owned state, and the radio stack abstraction it runs against.

pub mod events;
pub mod handler;
pub mod stack;
pub mod state;

pub use events::BleEvent;
pub use handler::GattServer;
pub use stack::{AdvertisingParams, BleStack, CharPerms, CharProps, StackError};
pub use state::{ActiveConnection, BuildPhase, CharacteristicValue, ServerState};
