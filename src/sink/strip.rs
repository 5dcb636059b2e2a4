//! Adapter for `smart-leds` writers
//!
//! Any [`SmartLedsWrite`] driver (WS2812 over SPI, APA102, ...) becomes a
//! [`DisplaySink`]. Brightness is baked into the buffered colors with
//! 8-bit scaling; the whole buffer goes out on flush.

use core::fmt::Debug;

use smart_leds::SmartLedsWrite;

use super::DisplaySink;
use crate::color::{BLACK, Rgb, dim};
use crate::error::SinkError;
use crate::position_map::Position;

pub struct SmartLedsSink<W> {
    writer: W,
    buffer: Vec<Rgb>,
}

impl<W> SmartLedsSink<W>
where
    W: SmartLedsWrite<Color = Rgb>,
    W::Error: Debug,
{
    pub fn new(writer: W, count: usize) -> Self {
        Self {
            writer,
            buffer: vec![BLACK; count],
        }
    }

    /// Buffered (brightness-scaled) colors
    pub fn buffer(&self) -> &[Rgb] {
        &self.buffer
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}

impl<W> DisplaySink for SmartLedsSink<W>
where
    W: SmartLedsWrite<Color = Rgb>,
    W::Error: Debug,
{
    fn set_pixel(&mut self, position: Position, color: Rgb, brightness: f32) -> Result<(), SinkError> {
        if let Some(slot) = self.buffer.get_mut(position) {
            *slot = dim(color, brightness);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SinkError> {
        self.buffer.fill(BLACK);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer
            .write(self.buffer.iter().copied())
            .map_err(|err| SinkError::Flush(format!("{err:?}")))
    }

    fn is_ready(&self) -> bool {
        true
    }
}
