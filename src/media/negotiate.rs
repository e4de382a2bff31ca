//! Format Negotiation & Conversion
//!
//! Decides whether a decoded picture can be handed out in its native layout
//! or has to be converted to 8-bit 4:2:0 first, and owns the policy for the
//! conversion context cached on the decoder handle.

use log::{debug, info, warn};

extern crate ffmpeg_next as ffmpeg;

use ffmpeg::format::Pixel;

use super::engine::{Converter, Engine, Picture, PictureInfo};
use super::handle::DecodeStats;
use super::output::{self, OutputBuffer, PlaneLayout};
use super::DecodeResult;

/// Native formats delivered without conversion
pub const DIRECT_FORMATS: [Pixel; 4] = [
    Pixel::YUV420P,
    Pixel::YUVJ420P,
    Pixel::YUV420P10LE,
    Pixel::YUV444P10LE,
];

/// Delivery format for everything outside [`DIRECT_FORMATS`]
pub const FALLBACK_FORMAT: Pixel = Pixel::YUV420P;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    /// Plane-by-plane copy of the native data
    Direct,
    /// Color-space conversion into [`FALLBACK_FORMAT`]
    Convert,
}

/// How one picture reaches the output buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPlan {
    pub format: Pixel,
    pub path: DeliveryPath,
    /// Bytes per sample reported to the output buffer
    pub bit_depth: u32,
}

impl DeliveryPlan {
    pub fn for_native(native: Pixel) -> Self {
        let (format, path) = if DIRECT_FORMATS.contains(&native) {
            (native, DeliveryPath::Direct)
        } else {
            (FALLBACK_FORMAT, DeliveryPath::Convert)
        };

        // Only 10-bit 4:2:0 is reported as two bytes per sample; 10-bit 4:4:4
        // is reported as one even though its planes are 16-bit.
        let bit_depth = if format == Pixel::YUV420P10LE { 2 } else { 1 };

        Self {
            format,
            path,
            bit_depth,
        }
    }
}

/// Conversion context together with the tuple it was built for.
///
/// Never rebuilt for the lifetime of the handle.
pub struct CachedConverter<C> {
    converter: C,
    source: Pixel,
    width: u32,
    height: u32,
}

impl<C> CachedConverter<C> {
    fn matches(&self, picture: &PictureInfo) -> bool {
        self.source == picture.format && self.width == picture.width && self.height == picture.height
    }
}

/// Write one decoded picture into `output`
pub(crate) fn deliver<E, B>(
    engine: &E,
    cache: &mut Option<CachedConverter<E::Converter>>,
    picture: &E::Picture,
    output: &mut B,
    stats: &mut DecodeStats,
) -> DecodeResult
where
    E: Engine,
    B: OutputBuffer + ?Sized,
{
    let picture_info = picture.info();
    let plan = DeliveryPlan::for_native(picture_info.format);

    let layout = match PlaneLayout::for_format(plan.format, picture_info.width, picture_info.height) {
        Ok(layout) => layout,
        Err(e) => {
            warn!("Cannot lay out decoded picture: {}", e);
            return DecodeResult::DecodeError;
        }
    };

    let region = match output::prepare(output, &picture_info, &layout, plan.bit_depth) {
        Ok(region) => region,
        Err(code) => {
            stats.output_failures += 1;
            return code;
        }
    };

    match plan.path {
        DeliveryPath::Direct => {
            if let Err(e) = picture.copy_to(region, &layout) {
                warn!("Copying {:?} picture failed: {}", picture_info.format, e);
                return DecodeResult::DecodeError;
            }
        }
        DeliveryPath::Convert => {
            if cache.is_none() {
                match engine.create_converter(&picture_info, plan.format) {
                    Ok(converter) => {
                        info!(
                            "Converting {:?} {}x{} to {:?}",
                            picture_info.format, picture_info.width, picture_info.height, plan.format
                        );
                        *cache = Some(CachedConverter {
                            converter,
                            source: picture_info.format,
                            width: picture_info.width,
                            height: picture_info.height,
                        });
                    }
                    Err(e) => {
                        warn!("Failed to create conversion context: {}", e);
                        return DecodeResult::DecodeError;
                    }
                }
            }

            let Some(cached) = cache.as_mut() else {
                return DecodeResult::DecodeError;
            };

            // The cached context is bound to the first picture's format and size.
            // A mismatching picture is refused rather than scaled through a
            // context that would read past its planes.
            if !cached.matches(&picture_info) {
                warn!(
                    "Conversion context bound to {:?} {}x{} cannot take {:?} {}x{}",
                    cached.source,
                    cached.width,
                    cached.height,
                    picture_info.format,
                    picture_info.width,
                    picture_info.height
                );
                return DecodeResult::DecodeError;
            }

            if let Err(e) = cached.converter.convert(picture, region, &layout) {
                warn!("Conversion of {:?} picture failed: {}", picture_info.format, e);
                return DecodeResult::DecodeError;
            }
            stats.frames_converted += 1;
        }
    }

    debug!(
        "Delivered {:?} {}x{} pts={:?}",
        plan.format, picture_info.width, picture_info.height, picture_info.timestamp_us
    );
    stats.frames_delivered += 1;
    DecodeResult::Ok
}
