//! OpenNow Decoder - file decode driver
//!
//! Demuxes a media file with FFmpeg and pushes its video stream through a
//! decode session, one access unit at a time.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};

extern crate ffmpeg_next as ffmpeg;

use ffmpeg::media::Type as MediaType;
use ffmpeg::Packet;

use opennow_decoder::app::Settings;
use opennow_decoder::media::{AccessUnit, DecodeResult, DecoderHandle, Engine, FrameBuffer};
use opennow_decoder::utils::{self, to_microseconds};

/// Video stream properties needed to open a session
struct StreamSetup {
    index: usize,
    decoder_name: String,
    width: u32,
    height: u32,
    extradata: Vec<u8>,
    time_base: (i32, i32),
}

fn probe_stream(input: &ffmpeg::format::context::Input, settings: &Settings) -> Result<StreamSetup> {
    let stream = input
        .streams()
        .best(MediaType::Video)
        .ok_or_else(|| anyhow!("No video stream"))?;
    let parameters = stream.parameters();

    // An explicit override wins, then the stream's own codec, then the configured codec
    let decoder_name = ffmpeg::codec::decoder::find(parameters.id())
        .filter(|_| settings.decoder_name.is_none())
        .map(|codec| codec.name().to_string())
        .unwrap_or_else(|| settings.resolved_decoder_name().to_string());

    // SAFETY: codec parameters stay valid while `input` is borrowed.
    let (width, height, extradata) = unsafe {
        let raw = parameters.as_ptr();
        let extradata = if (*raw).extradata.is_null() || (*raw).extradata_size <= 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts((*raw).extradata, (*raw).extradata_size as usize).to_vec()
        };
        ((*raw).width.max(0) as u32, (*raw).height.max(0) as u32, extradata)
    };

    let time_base = stream.time_base();

    Ok(StreamSetup {
        index: stream.index(),
        decoder_name,
        width: if width > 0 { width } else { settings.width },
        height: if height > 0 { height } else { settings.height },
        extradata,
        time_base: (time_base.numerator(), time_base.denominator()),
    })
}

/// Pull every ready picture; returns the result that stopped the loop
fn drain<E: Engine>(handle: &mut DecoderHandle<E>, buffer: &mut FrameBuffer) -> DecodeResult {
    loop {
        match handle.get_frame(buffer) {
            DecodeResult::Ok => {
                debug!(
                    "Frame {}x{} at {}us",
                    buffer.width,
                    buffer.height,
                    buffer.timestamp_us
                );
            }
            DecodeResult::OutputAllocationFailed => {
                warn!("Dropped frame at {}us: output buffer refused", buffer.timestamp_us);
            }
            other => return other,
        }
    }
}

/// Submit one unit, draining once and retrying if the engine pushes back
fn feed<E: Engine>(
    handle: &mut DecoderHandle<E>,
    buffer: &mut FrameBuffer,
    unit: &AccessUnit<'_>,
) -> DecodeResult {
    let mut result = handle.decode(unit);
    if result == DecodeResult::TryAgain {
        // Engine wants its output drained before taking more input
        drain(handle, buffer);
        result = handle.decode(unit);
    }

    if result.is_error() {
        warn!("Unit at {}us rejected: {} ({})", unit.timestamp_us, result, handle.describe_last_error());
    } else if result == DecodeResult::TryAgain {
        debug!("Unit at {}us dropped: engine still busy after drain", unit.timestamp_us);
    }
    result
}

fn run(path: &Path, settings: &Settings) -> Result<()> {
    ffmpeg::init().map_err(|e| anyhow!("Failed to initialize FFmpeg: {:?}", e))?;

    let mut input = ffmpeg::format::input(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let setup = probe_stream(&input, settings)?;

    info!(
        "Decoding stream #{} of {} with {} ({}x{}, {} bytes extradata)",
        setup.index,
        path.display(),
        setup.decoder_name,
        setup.width,
        setup.height,
        setup.extradata.len()
    );

    let extradata = (!setup.extradata.is_empty()).then_some(setup.extradata.as_slice());
    let mut handle = DecoderHandle::open(
        &setup.decoder_name,
        setup.width,
        setup.height,
        extradata,
        settings.threads,
    )?;
    let mut buffer = FrameBuffer::new();

    let mut packet = Packet::empty();
    loop {
        match packet.read(&mut input) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => break,
            Err(e) => {
                warn!("Demux error: {:?}", e);
                break;
            }
        }
        if packet.stream() != setup.index {
            continue;
        }
        let Some(data) = packet.data() else {
            continue;
        };

        let timestamp = packet.pts().or(packet.dts()).unwrap_or(0);
        let mut unit = AccessUnit::new(data, to_microseconds(timestamp, setup.time_base));
        if packet.is_key() {
            unit = unit.key_frame();
        }

        feed(&mut handle, &mut buffer, &unit);

        if drain(&mut handle, &mut buffer).is_error() {
            warn!("Frame retrieval failed: {}", handle.describe_last_error());
        }
    }

    handle.decode(&AccessUnit::end_of_stream_marker());
    let last = drain(&mut handle, &mut buffer);
    if last != DecodeResult::EndOfStream {
        warn!("Drain stopped with {} instead of end of stream", last);
    }

    let stats = handle.stats().clone();
    info!(
        "Done: {} units, {} frames ({} converted), {} decode errors",
        stats.units_submitted, stats.frames_delivered, stats.frames_converted, stats.decode_errors
    );
    handle.close();

    Ok(())
}

fn main() -> Result<()> {
    let settings = Settings::load().unwrap_or_else(|e| {
        eprintln!("Using default settings: {}", e);
        Settings::default()
    });

    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else if settings.console_log {
        utils::init_logging_with_console()?;
    } else {
        utils::init_logging()?;
    }

    info!("OpenNow Decoder v{}", env!("CARGO_PKG_VERSION"));

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: opennow-decoder <input-file>"))?;

    if let Err(e) = run(Path::new(&path), &settings) {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
