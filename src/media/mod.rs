//! Media Pipeline
//!
//! Stateful decode session over FFmpeg: compressed access units in, planar
//! YUV pictures out.

mod engine;
mod feeder;
mod backend;
mod handle;
mod negotiate;
mod output;
mod result;
mod retriever;

#[cfg(test)]
pub(crate) mod mock;

pub use engine::{describe_status, Converter, Engine, EngineStatus, Picture, PictureInfo, ERROR_STRING_BUFFER_LENGTH};
pub use feeder::{AccessUnit, CryptoInfo};
pub use backend::{FfmpegConverter, FfmpegEngine};
pub use handle::{close, DecodeStats, DecoderHandle, OpenError};
pub use negotiate::{DeliveryPath, DeliveryPlan, DIRECT_FORMATS, FALLBACK_FORMAT};
pub use output::{FrameBuffer, OutputBuffer, PlaneLayout, NO_TIMESTAMP};
pub use result::DecodeResult;
