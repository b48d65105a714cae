#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod server;

// These modules depend on embassy/async features only available with embedded feature
#[cfg(feature = "embedded")]
pub mod tasks;
