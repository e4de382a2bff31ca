//! Application Settings
//!
//! Configuration shared by the library and the demo driver.

pub mod config;

pub use config::{Settings, VideoCodec};
