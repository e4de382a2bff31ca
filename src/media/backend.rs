//! FFmpeg Engine
//!
//! libavcodec/libswscale implementation of the engine protocol.

use std::ptr;

use anyhow::{anyhow, Result};
use log::{debug, info};

extern crate ffmpeg_next as ffmpeg;

use ffmpeg::codec::{context::Context as CodecContext, decoder};
use ffmpeg::ffi;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as ScalerContext, flag::Flags as ScalerFlags};
use ffmpeg::util::frame::video::Video as FfmpegFrame;
use ffmpeg::Packet;

use super::engine::{describe_status, Converter, Engine, EngineStatus, Picture, PictureInfo};
use super::feeder::AccessUnit;
use super::handle::OpenError;
use super::output::PlaneLayout;

/// HEVC Main 10 profile id, applied to every codec as an upper-bound hint
const HEVC_MAIN_10_PROFILE: i32 = 2;

/// Coded sample depth hint applied at open
const CODED_BITS_PER_SAMPLE: i32 = 10;

/// Extradata length as stored on the codec context
fn extradata_size(len: usize) -> Result<i32, OpenError> {
    i32::try_from(len).map_err(|_| OpenError::ExtradataAllocation(len))
}

/// Non-owning packet over the unit's bytes.
///
/// # Safety
/// The packet points at `unit.data` without holding a reference to it and
/// must be dropped before the unit. `buf` stays null, so the engine copies the
/// data on submit and unref never frees it.
unsafe fn packet_view(unit: &AccessUnit<'_>) -> Option<Packet> {
    let size = i32::try_from(unit.data.len()).ok()?;

    let mut packet = Packet::empty();
    packet.set_pts(Some(unit.timestamp_us));
    packet.set_dts(Some(unit.timestamp_us));

    let raw = packet.as_mut_ptr();
    (*raw).data = unit.data.as_ptr() as *mut u8;
    (*raw).size = size;
    if unit.decode_only {
        (*raw).flags |= ffi::AV_PKT_FLAG_DISCARD as i32;
    }
    if unit.key_frame {
        (*raw).flags |= ffi::AV_PKT_FLAG_KEY as i32;
    }
    Some(packet)
}

pub struct FfmpegEngine {
    decoder: decoder::Video,
    codec_name: String,
}

impl FfmpegEngine {
    pub fn open(
        codec_name: &str,
        width: u32,
        height: u32,
        extradata: Option<&[u8]>,
        thread_count: u32,
    ) -> Result<Self, OpenError> {
        ffmpeg::init().map_err(|e| OpenError::Init(e.to_string()))?;

        let codec = decoder::find_by_name(codec_name)
            .ok_or_else(|| OpenError::CodecNotFound(codec_name.to_string()))?;

        let mut ctx = CodecContext::new_with_codec(codec);
        // SAFETY: read-only null check on the freshly allocated context.
        if unsafe { ctx.as_ptr().is_null() } {
            return Err(OpenError::ContextAllocation);
        }

        // SAFETY: the context is non-null and not yet opened. The extradata
        // buffer is allocated with libav's allocator so the context frees it.
        // Only the thread count is set; the thread type keeps libavcodec's
        // frame|slice default.
        unsafe {
            let raw = ctx.as_mut_ptr();
            (*raw).bits_per_coded_sample = CODED_BITS_PER_SAMPLE;
            (*raw).profile = HEVC_MAIN_10_PROFILE;
            (*raw).thread_count = i32::try_from(thread_count).unwrap_or(0);

            if let Some(data) = extradata.filter(|d| !d.is_empty()) {
                let size = extradata_size(data.len())?;
                let buffer = ffi::av_mallocz(data.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize)
                    as *mut u8;
                if buffer.is_null() {
                    return Err(OpenError::ExtradataAllocation(data.len()));
                }
                ptr::copy_nonoverlapping(data.as_ptr(), buffer, data.len());
                (*raw).extradata = buffer;
                (*raw).extradata_size = size;
            }
        }

        let mut decoder = ctx
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.video())
            .map_err(|e| {
                let code = i32::from(e);
                OpenError::EngineOpen {
                    code,
                    message: describe_status(code),
                }
            })?;

        // SAFETY: the opened context stays owned by `decoder`.
        unsafe {
            let raw = decoder.as_mut_ptr();
            (*raw).width = i32::try_from(width).unwrap_or(0);
            (*raw).height = i32::try_from(height).unwrap_or(0);
        }

        info!(
            "Opened decoder {} ({}x{}, {} threads)",
            codec_name, width, height, thread_count
        );

        Ok(Self {
            decoder,
            codec_name: codec_name.to_string(),
        })
    }
}

impl Engine for FfmpegEngine {
    type Picture = FfmpegFrame;
    type Converter = FfmpegConverter;

    fn send(&mut self, unit: Option<&AccessUnit<'_>>) -> EngineStatus {
        let Some(unit) = unit else {
            return self.decoder.send_eof().into();
        };

        // SAFETY: the packet is dropped at the end of this call, while
        // `unit.data` is still borrowed.
        let Some(packet) = (unsafe { packet_view(unit) }) else {
            return EngineStatus::from_code(-libc::EINVAL);
        };

        self.decoder.send_packet(&packet).into()
    }

    fn receive(&mut self, picture: &mut FfmpegFrame) -> EngineStatus {
        self.decoder.receive_frame(picture).into()
    }

    fn flush(&mut self) {
        self.decoder.flush();
    }

    fn alloc_picture(&self) -> FfmpegFrame {
        FfmpegFrame::empty()
    }

    fn create_converter(&self, source: &PictureInfo, target: Pixel) -> Result<FfmpegConverter> {
        FfmpegConverter::new(source, target)
    }
}

impl Drop for FfmpegEngine {
    fn drop(&mut self) {
        debug!("Releasing {} decoder", self.codec_name);
    }
}

/// Raw plane pointers and line sizes of a frame
///
/// # Safety
/// `frame` must hold a decoded picture.
unsafe fn planes(frame: &FfmpegFrame) -> (*const *const u8, *const i32) {
    let raw = frame.as_ptr();
    ((*raw).data.as_ptr() as *const *const u8, (*raw).linesize.as_ptr())
}

impl Picture for FfmpegFrame {
    fn info(&self) -> PictureInfo {
        PictureInfo {
            format: self.format(),
            width: self.width(),
            height: self.height(),
            timestamp_us: self.pts(),
        }
    }

    fn copy_to(&self, dst: &mut [u8], layout: &PlaneLayout) -> Result<()> {
        if self.format() != layout.format || self.width() != layout.width || self.height() != layout.height {
            return Err(anyhow!(
                "Picture {:?} {}x{} does not match layout {:?} {}x{}",
                self.format(),
                self.width(),
                self.height(),
                layout.format,
                layout.width,
                layout.height
            ));
        }
        let dst_size = i32::try_from(dst.len()).map_err(|_| anyhow!("Output region too large"))?;

        // SAFETY: the frame holds a picture matching `layout`, and
        // av_image_copy_to_buffer writes at most `dst_size` bytes.
        let written = unsafe {
            let (data, linesizes) = planes(self);
            ffi::av_image_copy_to_buffer(
                dst.as_mut_ptr(),
                dst_size,
                data,
                linesizes,
                ffi::AVPixelFormat::from(layout.format),
                layout.width as i32,
                layout.height as i32,
                1,
            )
        };
        if written < 0 {
            return Err(anyhow!("Plane copy failed: {}", describe_status(written)));
        }
        Ok(())
    }

    fn clear(&mut self) {
        // SAFETY: unref leaves a valid empty frame behind.
        unsafe { ffi::av_frame_unref(self.as_mut_ptr()) };
    }
}

/// libswscale context converting into a packed destination
pub struct FfmpegConverter {
    context: ScalerContext,
    width: u32,
    height: u32,
}

impl FfmpegConverter {
    pub fn new(source: &PictureInfo, target: Pixel) -> Result<Self> {
        let context = ScalerContext::get(
            source.format,
            source.width,
            source.height,
            target,
            source.width,
            source.height,
            ScalerFlags::BICUBIC,
        )
        .map_err(|e| anyhow!("Failed to create scaler for {:?}: {:?}", source.format, e))?;

        Ok(Self {
            context,
            width: source.width,
            height: source.height,
        })
    }
}

impl Converter<FfmpegFrame> for FfmpegConverter {
    fn convert(&mut self, src: &FfmpegFrame, dst: &mut [u8], layout: &PlaneLayout) -> Result<()> {
        if src.width() != self.width || src.height() != self.height || layout.height != self.height {
            return Err(anyhow!(
                "Scaler built for {}x{} cannot take {}x{}",
                self.width,
                self.height,
                src.width(),
                src.height()
            ));
        }
        let height = i32::try_from(self.height).map_err(|_| anyhow!("Height out of range"))?;

        let mut dst_planes = [ptr::null_mut::<u8>(); 4];
        // SAFETY: `dst` holds at least `layout.buffer_size` bytes for the
        // target format (checked below), and the scaler was built for the
        // source picture's format and size.
        unsafe {
            let size = ffi::av_image_fill_pointers(
                dst_planes.as_mut_ptr(),
                ffi::AVPixelFormat::from(layout.format),
                height,
                dst.as_mut_ptr(),
                layout.linesizes.as_ptr(),
            );
            if size < 0 || size as usize > dst.len() {
                return Err(anyhow!("Output region too small for {:?}", layout.format));
            }

            let (src_planes, src_linesizes) = planes(src);
            let rows = ffi::sws_scale(
                self.context.as_mut_ptr(),
                src_planes,
                src_linesizes,
                0,
                height,
                dst_planes.as_ptr(),
                layout.linesizes.as_ptr(),
            );
            if rows < 0 {
                return Err(anyhow!("Scaling failed: {}", describe_status(rows)));
            }
        }
        Ok(())
    }
}
