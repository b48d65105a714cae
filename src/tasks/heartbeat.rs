//! Heartbeat task
//!
//! Periodic liveness log standing in for the application's main loop. Also
//! exercises the any-context notify path: the send is a no-op while no
//! central is connected.

use embassy_time::{Duration, Timer};
use log::info;

use crate::config::heartbeat::INTERVAL_S;
use crate::tasks::ble::notify_value;

/// Log a heartbeat forever
pub async fn heartbeat_task() {
    loop {
        info!("Main loop alive");
        notify_value(b"Main loop alive");
        Timer::after(Duration::from_secs(INTERVAL_S)).await;
    }
}
