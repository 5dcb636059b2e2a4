use super::{DisplaySink, LedMode};
use crate::color::Rgb;
use crate::error::SinkError;
use crate::math8::clamp_unit;
use crate::position_map::Position;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedPixel {
    pub color: Rgb,
    pub brightness: f32,
}

/// In-memory strip
///
/// Keeps the pending buffer and what the last flush showed, so tests and
/// previews can inspect the output.
#[derive(Debug, Clone)]
pub struct SimulatedSink {
    pending: Vec<Option<SimulatedPixel>>,
    shown: Vec<Option<SimulatedPixel>>,
    flushes: u64,
    ready: bool,
}

impl SimulatedSink {
    pub fn new(count: usize) -> Self {
        Self {
            pending: vec![None; count],
            shown: vec![None; count],
            flushes: 0,
            ready: true,
        }
    }

    /// Sink that reports itself as not initialized
    #[must_use]
    pub fn not_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }

    /// Pixel as of the last flush
    pub fn shown(&self, position: Position) -> Option<SimulatedPixel> {
        self.shown.get(position).copied().flatten()
    }

    /// Number of lit positions as of the last flush
    pub fn lit(&self) -> usize {
        self.shown.iter().filter(|pixel| pixel.is_some()).count()
    }

    pub const fn flush_count(&self) -> u64 {
        self.flushes
    }
}

impl DisplaySink for SimulatedSink {
    fn set_pixel(&mut self, position: Position, color: Rgb, brightness: f32) -> Result<(), SinkError> {
        if let Some(slot) = self.pending.get_mut(position) {
            *slot = Some(SimulatedPixel {
                color,
                brightness: clamp_unit(brightness),
            });
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SinkError> {
        self.pending.fill(None);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.shown.clone_from(&self.pending);
        self.flushes += 1;
        tracing::trace!(lit = self.lit(), "simulated strip flushed");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn mode(&self) -> LedMode {
        LedMode::Simulated
    }
}
