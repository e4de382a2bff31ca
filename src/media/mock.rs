//! Scripted in-memory engine for session tests

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::{anyhow, Result};

extern crate ffmpeg_next as ffmpeg;

use ffmpeg::format::Pixel;

use super::engine::{Converter, Engine, EngineStatus, Picture, PictureInfo};
use super::feeder::AccessUnit;
use super::output::PlaneLayout;

/// What the engine saw on one `send`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentUnit {
    pub len: usize,
    pub timestamp_us: i64,
    pub decode_only: bool,
    pub key_frame: bool,
}

#[derive(Debug, Default)]
struct Counters {
    engine_drops: usize,
    picture_drops: usize,
    pictures_allocated: usize,
    flushes: usize,
    converters_created: usize,
    converter_drops: usize,
    conversions: usize,
    /// `None` entries are end-of-stream markers
    sent: Vec<Option<SentUnit>>,
}

/// Shared view on what the mock engine did, usable after the handle is gone
#[derive(Debug, Clone, Default)]
pub struct MockProbe(Rc<RefCell<Counters>>);

impl MockProbe {
    pub fn engine_drops(&self) -> usize {
        self.0.borrow().engine_drops
    }

    pub fn picture_drops(&self) -> usize {
        self.0.borrow().picture_drops
    }

    pub fn pictures_allocated(&self) -> usize {
        self.0.borrow().pictures_allocated
    }

    pub fn flushes(&self) -> usize {
        self.0.borrow().flushes
    }

    pub fn converters_created(&self) -> usize {
        self.0.borrow().converters_created
    }

    pub fn converter_drops(&self) -> usize {
        self.0.borrow().converter_drops
    }

    pub fn conversions(&self) -> usize {
        self.0.borrow().conversions
    }

    pub fn sent(&self) -> Vec<Option<SentUnit>> {
        self.0.borrow().sent.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockFrame {
    pub format: Pixel,
    pub width: u32,
    pub height: u32,
    pub timestamp_us: Option<i64>,
    /// Byte every plane is filled with
    pub fill: u8,
}

pub struct MockPicture {
    probe: MockProbe,
    pub frame: Option<MockFrame>,
}

impl MockPicture {
    pub fn is_cleared(&self) -> bool {
        self.frame.is_none()
    }
}

impl Picture for MockPicture {
    fn info(&self) -> PictureInfo {
        match self.frame {
            Some(frame) => PictureInfo {
                format: frame.format,
                width: frame.width,
                height: frame.height,
                timestamp_us: frame.timestamp_us,
            },
            None => PictureInfo {
                format: Pixel::None,
                width: 0,
                height: 0,
                timestamp_us: None,
            },
        }
    }

    fn copy_to(&self, dst: &mut [u8], layout: &PlaneLayout) -> Result<()> {
        let frame = self.frame.ok_or_else(|| anyhow!("empty picture"))?;
        dst[..layout.buffer_size].fill(frame.fill);
        Ok(())
    }

    fn clear(&mut self) {
        self.frame = None;
    }
}

impl Drop for MockPicture {
    fn drop(&mut self) {
        self.probe.0.borrow_mut().picture_drops += 1;
    }
}

pub struct MockConverter {
    probe: MockProbe,
}

/// Byte the converter writes for a picture filled with `fill`
pub fn converted_fill(fill: u8) -> u8 {
    fill ^ 0xFF
}

impl Converter<MockPicture> for MockConverter {
    fn convert(&mut self, src: &MockPicture, dst: &mut [u8], layout: &PlaneLayout) -> Result<()> {
        let frame = src.frame.ok_or_else(|| anyhow!("empty picture"))?;
        dst[..layout.buffer_size].fill(converted_fill(frame.fill));
        self.probe.0.borrow_mut().conversions += 1;
        Ok(())
    }
}

impl Drop for MockConverter {
    fn drop(&mut self) {
        self.probe.0.borrow_mut().converter_drops += 1;
    }
}

/// Engine producing one picture per access unit, held back by `delay` pictures
/// until end of stream.
pub struct MockEngine {
    probe: MockProbe,
    pub format: Pixel,
    pub width: u32,
    pub height: u32,
    delay: usize,
    pending: VecDeque<MockFrame>,
    draining: bool,
    next_fill: u8,
    send_overrides: VecDeque<EngineStatus>,
    receive_overrides: VecDeque<EngineStatus>,
    fail_converter: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            probe: MockProbe::default(),
            format: Pixel::YUV420P,
            width: 16,
            height: 16,
            delay: 0,
            pending: VecDeque::new(),
            draining: false,
            next_fill: 1,
            send_overrides: VecDeque::new(),
            receive_overrides: VecDeque::new(),
            fail_converter: false,
        }
    }

    pub fn with_format(mut self, format: Pixel) -> Self {
        self.format = format;
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_delay(mut self, delay: usize) -> Self {
        self.delay = delay;
        self
    }

    /// Next `send` returns `status` instead of queueing
    pub fn then_send(mut self, status: EngineStatus) -> Self {
        self.send_overrides.push_back(status);
        self
    }

    /// Next `receive` returns `status` without touching the picture
    pub fn then_receive(mut self, status: EngineStatus) -> Self {
        self.receive_overrides.push_back(status);
        self
    }

    pub fn failing_converter(mut self) -> Self {
        self.fail_converter = true;
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }

    fn record(&self, unit: Option<&AccessUnit<'_>>) {
        self.probe.0.borrow_mut().sent.push(unit.map(|u| SentUnit {
            len: u.data.len(),
            timestamp_us: u.timestamp_us,
            decode_only: u.decode_only,
            key_frame: u.key_frame,
        }));
    }
}

impl Engine for MockEngine {
    type Picture = MockPicture;
    type Converter = MockConverter;

    fn send(&mut self, unit: Option<&AccessUnit<'_>>) -> EngineStatus {
        self.record(unit);

        if let Some(status) = self.send_overrides.pop_front() {
            return status;
        }
        if self.draining {
            return EngineStatus::Eof;
        }

        match unit {
            Some(unit) => {
                self.pending.push_back(MockFrame {
                    format: self.format,
                    width: self.width,
                    height: self.height,
                    timestamp_us: Some(unit.timestamp_us),
                    fill: self.next_fill,
                });
                self.next_fill = self.next_fill.wrapping_add(1);
            }
            None => self.draining = true,
        }
        EngineStatus::Ok
    }

    fn receive(&mut self, picture: &mut MockPicture) -> EngineStatus {
        if let Some(status) = self.receive_overrides.pop_front() {
            return status;
        }

        if self.pending.len() > self.delay || (self.draining && !self.pending.is_empty()) {
            picture.frame = self.pending.pop_front();
            EngineStatus::Ok
        } else if self.draining {
            EngineStatus::Eof
        } else {
            EngineStatus::Again
        }
    }

    fn flush(&mut self) {
        self.pending.clear();
        self.draining = false;
        self.probe.0.borrow_mut().flushes += 1;
    }

    fn alloc_picture(&self) -> MockPicture {
        self.probe.0.borrow_mut().pictures_allocated += 1;
        MockPicture {
            probe: self.probe.clone(),
            frame: None,
        }
    }

    fn create_converter(&self, _source: &PictureInfo, _target: Pixel) -> Result<MockConverter> {
        if self.fail_converter {
            return Err(anyhow!("converter unavailable"));
        }
        self.probe.0.borrow_mut().converters_created += 1;
        Ok(MockConverter {
            probe: self.probe.clone(),
        })
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.probe.0.borrow_mut().engine_drops += 1;
    }
}
