//! Embassy tasks module
//!
//! Contains the async tasks for the firmware, organised by functionality.

pub mod ble;
pub mod heartbeat;

pub use ble::{ble_task, notify_value};
pub use heartbeat::heartbeat_task;
