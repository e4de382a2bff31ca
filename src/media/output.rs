//! Output Buffer Adapter
//!
//! Computes the byte layout a picture needs in the caller's buffer, asks the
//! buffer to size itself, and hands back a writable view only once the buffer
//! is known to be large enough.

use anyhow::{anyhow, Result};
use log::{debug, warn};

extern crate ffmpeg_next as ffmpeg;

use ffmpeg::ffi;
use ffmpeg::format::Pixel;

use super::engine::PictureInfo;
use super::DecodeResult;

/// Timestamp written when the engine did not carry one through
pub const NO_TIMESTAMP: i64 = i64::MIN;

/// Caller-owned destination for decoded pictures
pub trait OutputBuffer {
    /// Resize for a planar YUV picture. Returns `false` if the buffer
    /// cannot hold the requested layout.
    fn init_for_yuv_frame(
        &mut self,
        width: u32,
        height: u32,
        y_stride: i32,
        uv_stride: i32,
        bit_depth: u32,
    ) -> bool;

    /// Backing storage, valid until the next resize
    fn data_mut(&mut self) -> &mut [u8];

    fn set_timestamp_us(&mut self, timestamp_us: i64);
}

/// Byte layout of one picture in a given pixel format, packed with 1-byte alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub format: Pixel,
    pub width: u32,
    pub height: u32,
    /// Per-plane line sizes in bytes
    pub linesizes: [i32; 4],
    /// Total bytes for all planes
    pub buffer_size: usize,
}

impl PlaneLayout {
    pub fn for_format(format: Pixel, width: u32, height: u32) -> Result<Self> {
        let pix_fmt = ffi::AVPixelFormat::from(format);
        let w = i32::try_from(width).map_err(|_| anyhow!("Width {} out of range", width))?;
        let h = i32::try_from(height).map_err(|_| anyhow!("Height {} out of range", height))?;

        let mut linesizes = [0i32; 4];
        // SAFETY: `linesizes` has the four entries av_image_fill_linesizes writes.
        let ret = unsafe { ffi::av_image_fill_linesizes(linesizes.as_mut_ptr(), pix_fmt, w) };
        if ret < 0 {
            return Err(anyhow!("No line sizes for {:?} at width {}", format, width));
        }

        // SAFETY: pure computation over the format descriptor.
        let size = unsafe { ffi::av_image_get_buffer_size(pix_fmt, w, h, 1) };
        if size < 0 {
            return Err(anyhow!("No buffer size for {:?} {}x{}", format, width, height));
        }

        Ok(Self {
            format,
            width,
            height,
            linesizes,
            buffer_size: size as usize,
        })
    }
}

/// Stamp, size, and validate `buffer` for a picture.
///
/// The timestamp is written before anything else. On success returns the
/// writable region, exactly `layout.buffer_size` bytes long.
pub(crate) fn prepare<'b, B: OutputBuffer + ?Sized>(
    buffer: &'b mut B,
    info: &PictureInfo,
    layout: &PlaneLayout,
    bit_depth: u32,
) -> Result<&'b mut [u8], DecodeResult> {
    buffer.set_timestamp_us(info.timestamp_us.unwrap_or(NO_TIMESTAMP));

    if !buffer.init_for_yuv_frame(
        info.width,
        info.height,
        layout.linesizes[0],
        layout.linesizes[1],
        bit_depth,
    ) {
        debug!("Output buffer refused {}x{} {:?}", info.width, info.height, layout.format);
        return Err(DecodeResult::OutputAllocationFailed);
    }

    let data = buffer.data_mut();
    if data.len() < layout.buffer_size {
        warn!(
            "Output buffer too small for {:?} {}x{}: {} < {} bytes",
            layout.format,
            info.width,
            info.height,
            data.len(),
            layout.buffer_size
        );
        return Err(DecodeResult::OutputAllocationFailed);
    }

    Ok(&mut data[..layout.buffer_size])
}

/// Heap-backed output buffer
///
/// Sized the way a planar 4:2:0 host buffer is: a luma plane of
/// `y_stride * height` followed by two chroma planes of
/// `uv_stride * ceil(height / 2)`.
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub y_stride: i32,
    pub uv_stride: i32,
    /// Bytes per sample (1 or 2)
    pub bit_depth: u32,
    pub timestamp_us: i64,
    pub data: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn chroma_height(&self) -> usize {
        (self.height as usize + 1) / 2
    }

    /// Luma plane
    pub fn y_plane(&self) -> &[u8] {
        let len = self.y_stride as usize * self.height as usize;
        &self.data[..len.min(self.data.len())]
    }

    /// First chroma plane (Cb)
    pub fn u_plane(&self) -> &[u8] {
        let start = self.y_stride as usize * self.height as usize;
        let len = self.uv_stride as usize * self.chroma_height();
        self.slice(start, len)
    }

    /// Second chroma plane (Cr)
    pub fn v_plane(&self) -> &[u8] {
        let uv_len = self.uv_stride as usize * self.chroma_height();
        let start = self.y_stride as usize * self.height as usize + uv_len;
        self.slice(start, uv_len)
    }

    fn slice(&self, start: usize, len: usize) -> &[u8] {
        let start = start.min(self.data.len());
        let end = (start + len).min(self.data.len());
        &self.data[start..end]
    }
}

impl OutputBuffer for FrameBuffer {
    fn init_for_yuv_frame(
        &mut self,
        width: u32,
        height: u32,
        y_stride: i32,
        uv_stride: i32,
        bit_depth: u32,
    ) -> bool {
        self.width = width;
        self.height = height;
        self.bit_depth = bit_depth;

        let (Ok(y_stride_len), Ok(uv_stride_len)) =
            (usize::try_from(y_stride), usize::try_from(uv_stride))
        else {
            return false;
        };
        let uv_height = (height as usize + 1) / 2;

        let size = y_stride_len
            .checked_mul(height as usize)
            .zip(uv_stride_len.checked_mul(uv_height))
            .and_then(|(y_len, uv_len)| uv_len.checked_mul(2).and_then(|c| c.checked_add(y_len)));
        let Some(size) = size else {
            return false;
        };

        self.y_stride = y_stride;
        self.uv_stride = uv_stride;
        self.data.resize(size, 0);
        true
    }

    fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn set_timestamp_us(&mut self, timestamp_us: i64) {
        self.timestamp_us = timestamp_us;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(format: Pixel, width: u32, height: u32) -> PictureInfo {
        PictureInfo {
            format,
            width,
            height,
            timestamp_us: Some(42),
        }
    }

    /// Buffer that accepts any resize but never grows
    struct FixedBuffer {
        data: Vec<u8>,
        timestamp_us: i64,
        accept: bool,
    }

    impl OutputBuffer for FixedBuffer {
        fn init_for_yuv_frame(&mut self, _: u32, _: u32, _: i32, _: i32, _: u32) -> bool {
            self.accept
        }

        fn data_mut(&mut self) -> &mut [u8] {
            &mut self.data
        }

        fn set_timestamp_us(&mut self, timestamp_us: i64) {
            self.timestamp_us = timestamp_us;
        }
    }

    #[test]
    fn test_yuv420p_layout() {
        let layout = PlaneLayout::for_format(Pixel::YUV420P, 64, 48).unwrap();
        assert_eq!(layout.linesizes[0], 64);
        assert_eq!(layout.linesizes[1], 32);
        assert_eq!(layout.linesizes[2], 32);
        assert_eq!(layout.buffer_size, 64 * 48 + 2 * 32 * 24);
    }

    #[test]
    fn test_ten_bit_layout_uses_two_bytes_per_sample() {
        let layout = PlaneLayout::for_format(Pixel::YUV420P10LE, 64, 48).unwrap();
        assert_eq!(layout.linesizes[0], 128);
        assert_eq!(layout.linesizes[1], 64);
    }

    #[test]
    fn test_frame_buffer_sizes_for_420() {
        let mut buffer = FrameBuffer::new();
        assert!(buffer.init_for_yuv_frame(65, 33, 65, 33, 1));
        assert_eq!(buffer.data.len(), 65 * 33 + 2 * 33 * 17);
        assert_eq!(buffer.y_plane().len(), 65 * 33);
        assert_eq!(buffer.u_plane().len(), 33 * 17);
        assert_eq!(buffer.v_plane().len(), 33 * 17);
    }

    #[test]
    fn test_frame_buffer_rejects_negative_stride() {
        let mut buffer = FrameBuffer::new();
        assert!(!buffer.init_for_yuv_frame(16, 16, -16, 8, 1));
    }

    #[test]
    fn test_prepare_writes_timestamp_first() {
        let layout = PlaneLayout::for_format(Pixel::YUV420P, 16, 16).unwrap();
        let mut buffer = FixedBuffer {
            data: Vec::new(),
            timestamp_us: 0,
            accept: false,
        };
        let result = prepare(&mut buffer, &info(Pixel::YUV420P, 16, 16), &layout, 1);
        assert_eq!(result.err(), Some(DecodeResult::OutputAllocationFailed));
        assert_eq!(buffer.timestamp_us, 42);
    }

    #[test]
    fn test_prepare_detects_short_buffer() {
        let layout = PlaneLayout::for_format(Pixel::YUV420P, 16, 16).unwrap();
        let mut buffer = FixedBuffer {
            data: vec![0; layout.buffer_size - 1],
            timestamp_us: 0,
            accept: true,
        };
        let result = prepare(&mut buffer, &info(Pixel::YUV420P, 16, 16), &layout, 1);
        assert_eq!(result.err(), Some(DecodeResult::OutputAllocationFailed));
    }

    #[test]
    fn test_prepare_returns_exact_region() {
        let layout = PlaneLayout::for_format(Pixel::YUV420P, 16, 16).unwrap();
        let mut buffer = FrameBuffer::new();
        let region = prepare(&mut buffer, &info(Pixel::YUV420P, 16, 16), &layout, 1).unwrap();
        assert_eq!(region.len(), layout.buffer_size);
    }

    #[test]
    fn test_missing_timestamp_is_marked() {
        let layout = PlaneLayout::for_format(Pixel::YUV420P, 16, 16).unwrap();
        let mut buffer = FrameBuffer::new();
        let mut picture = info(Pixel::YUV420P, 16, 16);
        picture.timestamp_us = None;
        prepare(&mut buffer, &picture, &layout, 1).unwrap();
        assert_eq!(buffer.timestamp_us, NO_TIMESTAMP);
    }
}
