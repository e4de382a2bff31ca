//! Decoder Handle
//!
//! Owns the engine instance and everything the session creates on demand:
//! the reusable decoded-picture slot and the cached conversion context.
//! All of it is released exactly once, when the handle is closed or dropped.

use log::{debug, error, info};
use thiserror::Error;

use super::engine::{describe_status, Engine};
use super::backend::FfmpegEngine;
use super::negotiate::CachedConverter;
use super::DecodeResult;

/// Why a handle could not be opened
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("failed to initialize FFmpeg: {0}")]
    Init(String),
    #[error("codec not found: {0}")]
    CodecNotFound(String),
    #[error("failed to allocate codec context")]
    ContextAllocation,
    #[error("failed to allocate extradata ({0} bytes)")]
    ExtradataAllocation(usize),
    #[error("failed to open codec ({code}): {message}")]
    EngineOpen { code: i32, message: String },
}

impl From<&OpenError> for DecodeResult {
    fn from(_: &OpenError) -> Self {
        DecodeResult::OtherError
    }
}

/// Session counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Non-empty access units accepted by the engine
    pub units_submitted: u64,
    /// Pictures written to an output buffer
    pub frames_delivered: u64,
    /// Of those, pictures that went through the conversion context
    pub frames_converted: u64,
    /// Pictures dropped because the output buffer could not be sized
    pub output_failures: u64,
    /// Hard decode errors reported to the caller
    pub decode_errors: u64,
}

/// A stateful single-stream decode session.
///
/// Calls against one handle must be serialized by the caller; the handle
/// never retains borrowed input or output buffers past a call.
pub struct DecoderHandle<E: Engine = FfmpegEngine> {
    pub(crate) engine: E,
    /// Created on the first picture that needs conversion
    pub(crate) converter: Option<CachedConverter<E::Converter>>,
    /// Single reusable picture slot, allocated on the first `get_frame`
    pub(crate) picture: Option<E::Picture>,
    /// Raw status of the most recent engine call
    pub(crate) last_error: i32,
    pub(crate) stats: DecodeStats,
}

impl DecoderHandle<FfmpegEngine> {
    /// Open a decoder for `codec_name`.
    ///
    /// Either returns a fully configured handle or fails without leaking
    /// any engine resource.
    pub fn open(
        codec_name: &str,
        width: u32,
        height: u32,
        extradata: Option<&[u8]>,
        thread_count: u32,
    ) -> Result<Self, OpenError> {
        info!(
            "Opening {} decoder {}x{} (extradata: {} bytes, threads: {})",
            codec_name,
            width,
            height,
            extradata.map_or(0, <[u8]>::len),
            thread_count
        );

        match FfmpegEngine::open(codec_name, width, height, extradata, thread_count) {
            Ok(engine) => Ok(Self::with_engine(engine)),
            Err(e) => {
                error!("Failed to open {} decoder: {}", codec_name, e);
                Err(e)
            }
        }
    }
}

impl<E: Engine> DecoderHandle<E> {
    /// Wrap an already opened engine
    pub fn with_engine(engine: E) -> Self {
        Self {
            engine,
            converter: None,
            picture: None,
            last_error: 0,
            stats: DecodeStats::default(),
        }
    }

    /// Release the handle. Always `Ok`.
    pub fn close(self) -> DecodeResult {
        drop(self);
        DecodeResult::Ok
    }

    /// Drop buffered engine state (partial frames, references) but keep the handle
    pub fn flush(&mut self) {
        debug!("Flushing decoder");
        self.engine.flush();
        if let Some(picture) = self.picture.as_mut() {
            picture.clear();
        }
    }

    /// Raw engine status of the most recent `decode` / `get_frame`
    pub fn last_error_code(&self) -> i32 {
        self.last_error
    }

    /// Engine diagnostic text for [`last_error_code`](Self::last_error_code)
    pub fn describe_last_error(&self) -> String {
        describe_status(self.last_error)
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Whether a conversion context has been created
    pub fn has_converter(&self) -> bool {
        self.converter.is_some()
    }
}

impl<E: Engine> Drop for DecoderHandle<E> {
    fn drop(&mut self) {
        // Conversion context and picture go before the engine.
        self.converter.take();
        self.picture.take();
        info!(
            "Decoder closed: {} units submitted, {} frames delivered ({} converted), {} output failures",
            self.stats.units_submitted,
            self.stats.frames_delivered,
            self.stats.frames_converted,
            self.stats.output_failures
        );
    }
}

/// Close a handle that may not exist. Always `Ok`.
pub fn close<E: Engine>(handle: Option<DecoderHandle<E>>) -> DecodeResult {
    match handle {
        Some(handle) => handle.close(),
        None => DecodeResult::Ok,
    }
}
