//! Packet Feeder
//!
//! Submits compressed access units (or the end-of-stream marker) to the
//! engine and maps the engine's answer into a [`DecodeResult`].

use log::{debug, warn};

use super::engine::{describe_status, Engine, EngineStatus};
use super::handle::DecoderHandle;
use super::DecodeResult;

/// One compressed unit, borrowed for the duration of a single call
#[derive(Debug, Clone, Copy)]
pub struct AccessUnit<'a> {
    pub data: &'a [u8],
    pub timestamp_us: i64,
    /// Decode for reference but discard the output
    pub decode_only: bool,
    /// Flush the decoder after this unit
    pub end_of_stream: bool,
    pub key_frame: bool,
}

impl<'a> AccessUnit<'a> {
    pub fn new(data: &'a [u8], timestamp_us: i64) -> Self {
        Self {
            data,
            timestamp_us,
            decode_only: false,
            end_of_stream: false,
            key_frame: false,
        }
    }

    /// Zero-length unit that only signals end of stream
    pub fn end_of_stream_marker() -> Self {
        Self {
            end_of_stream: true,
            ..Self::new(&[], 0)
        }
    }

    pub fn key_frame(mut self) -> Self {
        self.key_frame = true;
        self
    }

    pub fn decode_only(mut self) -> Self {
        self.decode_only = true;
        self
    }

    pub fn end_of_stream(mut self) -> Self {
        self.end_of_stream = true;
        self
    }
}

/// Encryption parameters of a protected access unit
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoInfo<'a> {
    pub mode: i32,
    pub key: &'a [u8],
    pub iv: &'a [u8],
    pub clear_bytes: &'a [i32],
    pub encrypted_bytes: &'a [i32],
}

impl<E: Engine> DecoderHandle<E> {
    /// Queue one non-empty access unit
    pub fn submit(&mut self, unit: &AccessUnit<'_>) -> DecodeResult {
        let status = self.engine.send(Some(unit));
        self.last_error = status.code();

        match status {
            EngineStatus::Ok => {
                self.stats.units_submitted += 1;
                DecodeResult::Ok
            }
            EngineStatus::Again => DecodeResult::TryAgain,
            EngineStatus::InvalidData => {
                debug!(
                    "Engine flagged {} byte unit at {}us as invalid data, continuing",
                    unit.data.len(),
                    unit.timestamp_us
                );
                DecodeResult::Ok
            }
            EngineStatus::Eof | EngineStatus::Failed(_) => {
                warn!(
                    "Failed to submit unit at {}us: {}",
                    unit.timestamp_us,
                    describe_status(status.code())
                );
                self.stats.decode_errors += 1;
                DecodeResult::DecodeError
            }
        }
    }

    /// Signal that no more input will arrive.
    ///
    /// May report `TryAgain`; [`decode`](Self::decode) folds that into `Ok`.
    pub fn submit_end_of_stream(&mut self) -> DecodeResult {
        let status = self.engine.send(None);
        self.last_error = status.code();

        match status {
            EngineStatus::Ok | EngineStatus::InvalidData => DecodeResult::Ok,
            EngineStatus::Again => DecodeResult::TryAgain,
            EngineStatus::Eof | EngineStatus::Failed(_) => {
                warn!("Failed to signal end of stream: {}", describe_status(status.code()));
                self.stats.decode_errors += 1;
                DecodeResult::DecodeError
            }
        }
    }

    /// Submit an access unit, then the end-of-stream marker if it carries one.
    ///
    /// A zero-length unit without the end-of-stream flag is a no-op.
    pub fn decode(&mut self, unit: &AccessUnit<'_>) -> DecodeResult {
        let mut result = DecodeResult::Ok;

        if !unit.data.is_empty() {
            result = self.submit(unit);
        }

        if result == DecodeResult::Ok && unit.end_of_stream {
            result = match self.submit_end_of_stream() {
                DecodeResult::TryAgain => DecodeResult::Ok,
                other => other,
            };
        }

        result
    }

    /// Encrypted input is not supported by this session
    pub fn secure_decode(&mut self, unit: &AccessUnit<'_>, _crypto: &CryptoInfo<'_>) -> DecodeResult {
        debug!(
            "Rejecting encrypted unit at {}us ({} bytes)",
            unit.timestamp_us,
            unit.data.len()
        );
        DecodeResult::Unsupported
    }
}
