//! OpenNow Decoder Library
//!
//! Single-stream video decode sessions on top of FFmpeg.

pub mod app;
pub mod media;
pub mod utils;

pub use app::Settings;
pub use media::{AccessUnit, DecodeResult, DecoderHandle, FrameBuffer};
