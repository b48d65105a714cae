//! Configuration constants for the ESP32 GATT server

/// GATT service and characteristic layout
pub mod gatt {
    /// 16-bit UUID of the primary service
    pub const SERVICE_UUID: u16 = 0x00FF;

    /// 16-bit UUID of the data characteristic
    pub const CHAR_UUID: u16 = 0xFF01;

    /// Attribute handles reserved for the service table
    pub const NUM_HANDLES: u16 = 10;

    /// Maximum length of the characteristic value in bytes
    pub const MAX_VALUE_LEN: usize = 64;
}

/// GAP identity and advertising configuration
pub mod gap {
    /// Name broadcast in advertising frames and returned by the GAP device name
    pub const DEVICE_NAME: &str = "ESP32-BLE-SERVER";

    /// Minimum advertising interval in 0.625 ms units (20 ms)
    pub const ADV_INTERVAL_MIN: u16 = 0x20;

    /// Maximum advertising interval in 0.625 ms units (40 ms)
    pub const ADV_INTERVAL_MAX: u16 = 0x40;
}

/// Write commands recognised by the server
pub mod commands {
    /// Payload that triggers a notification when written to the characteristic
    pub const SEND_NOW: &[u8] = b"send_now";

    /// Notification payload sent in response to [`SEND_NOW`]
    pub const SEND_NOW_RESPONSE: &[u8] = b"Now sending data...";
}

/// Queue sizes for inter-task plumbing
pub mod queues {
    /// Depth of the queue carrying pending notification payloads
    pub const NOTIFY_QUEUE_SIZE: usize = 4;
}

/// Heartbeat configuration
pub mod heartbeat {
    /// Interval of the alive log in seconds
    pub const INTERVAL_S: u64 = 5;
}
