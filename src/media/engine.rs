//! Decoder Engine Protocol
//!
//! The narrow send/receive protocol the session drives. The session never
//! looks at raw engine codes directly: every engine call reports an
//! [`EngineStatus`], and the mapping into [`DecodeResult`](super::DecodeResult)
//! lives in the feeder and retriever.

use std::ffi::CStr;
use std::os::raw::c_char;

use anyhow::Result;

extern crate ffmpeg_next as ffmpeg;

use ffmpeg::ffi;
use ffmpeg::format::Pixel;

use super::feeder::AccessUnit;
use super::output::PlaneLayout;

/// Size of the buffer used to render engine diagnostics
pub const ERROR_STRING_BUFFER_LENGTH: usize = 256;

/// Raw code for "resource temporarily unavailable"
const AGAIN_CODE: i32 = -libc::EAGAIN;

/// Outcome of a single engine call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Ok,
    /// Needs more input (or output must be drained) before progressing
    Again,
    /// Fully drained
    Eof,
    /// Engine flagged the data as invalid
    InvalidData,
    /// Any other negative engine code
    Failed(i32),
}

impl EngineStatus {
    /// Classify a raw engine code
    pub fn from_code(code: i32) -> Self {
        match code {
            c if c >= 0 => EngineStatus::Ok,
            AGAIN_CODE => EngineStatus::Again,
            ffi::AVERROR_EOF => EngineStatus::Eof,
            ffi::AVERROR_INVALIDDATA => EngineStatus::InvalidData,
            c => EngineStatus::Failed(c),
        }
    }

    /// Raw engine code, as reported by `last_error_code`
    pub fn code(self) -> i32 {
        match self {
            EngineStatus::Ok => 0,
            EngineStatus::Again => AGAIN_CODE,
            EngineStatus::Eof => ffi::AVERROR_EOF,
            EngineStatus::InvalidData => ffi::AVERROR_INVALIDDATA,
            EngineStatus::Failed(c) => c,
        }
    }
}

impl From<ffmpeg::Error> for EngineStatus {
    fn from(err: ffmpeg::Error) -> Self {
        EngineStatus::from_code(i32::from(err))
    }
}

impl From<Result<(), ffmpeg::Error>> for EngineStatus {
    fn from(result: Result<(), ffmpeg::Error>) -> Self {
        match result {
            Ok(()) => EngineStatus::Ok,
            Err(e) => e.into(),
        }
    }
}

/// Render the engine's diagnostic text for a raw code.
///
/// Long messages are truncated to the buffer, never rejected.
pub fn describe_status(code: i32) -> String {
    let mut buffer = [0 as c_char; ERROR_STRING_BUFFER_LENGTH];
    // SAFETY: av_strerror writes at most `buffer.len()` bytes and always
    // NUL-terminates within that bound.
    unsafe {
        ffi::av_strerror(code, buffer.as_mut_ptr(), buffer.len());
        CStr::from_ptr(buffer.as_ptr()).to_string_lossy().into_owned()
    }
}

/// Metadata of a decoded picture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureInfo {
    pub format: Pixel,
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp inherited from the access unit, if the engine kept one
    pub timestamp_us: Option<i64>,
}

/// A reusable decoded-picture slot, overwritten by every receive
pub trait Picture {
    fn info(&self) -> PictureInfo;

    /// Copy the native planes into `dst`, packed with 1-byte alignment
    fn copy_to(&self, dst: &mut [u8], layout: &PlaneLayout) -> Result<()>;

    /// Drop the content without giving up the slot
    fn clear(&mut self);
}

/// Color-space/scale conversion context bound to one (format, size) tuple
pub trait Converter<P: Picture> {
    /// Convert `src` into `dst`, laid out per `layout`
    fn convert(&mut self, src: &P, dst: &mut [u8], layout: &PlaneLayout) -> Result<()>;
}

/// The opaque decoder engine the session orchestrates
pub trait Engine {
    type Picture: Picture;
    type Converter: Converter<Self::Picture>;

    /// Queue an access unit, or `None` to signal end of stream
    fn send(&mut self, unit: Option<&AccessUnit<'_>>) -> EngineStatus;

    /// Populate `picture` with the next decoded picture
    fn receive(&mut self, picture: &mut Self::Picture) -> EngineStatus;

    /// Discard buffered input, partial frames, and references
    fn flush(&mut self);

    /// Allocate an empty picture slot
    fn alloc_picture(&self) -> Self::Picture;

    /// Build a conversion context from `source` to `target` at the source size
    fn create_converter(&self, source: &PictureInfo, target: Pixel) -> Result<Self::Converter>;
}
