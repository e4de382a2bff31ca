//! Utility Functions
//!
//! Common utilities used throughout the crate.

mod logging;

pub use logging::*;

use std::path::PathBuf;

/// Get the application data directory
pub fn get_app_data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("opennow-decoder")
}

/// Convert a timestamp in `time_base` units to microseconds
pub fn to_microseconds(value: i64, time_base: (i32, i32)) -> i64 {
    let (num, den) = time_base;
    if den == 0 {
        return value;
    }
    let scaled = value as i128 * num as i128 * 1_000_000 / den as i128;
    i64::try_from(scaled).unwrap_or(if scaled < 0 { i64::MIN } else { i64::MAX })
}
