//! Display sinks
//!
//! A sink buffers per-pixel writes and only shows them on `flush`.
//! Out-of-range positions are ignored.

mod simulated;
mod strip;

pub use simulated::{SimulatedPixel, SimulatedSink};
pub use strip::SmartLedsSink;

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::error::SinkError;
use crate::frame::RenderFrame;
use crate::position_map::Position;

/// Whether the sink drives real hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedMode {
    Real,
    Simulated,
}

/// Abstract LED strip
///
/// Implement this trait to support different hardware platforms.
pub trait DisplaySink {
    /// Buffer one pixel at a unit brightness
    fn set_pixel(&mut self, position: Position, color: Rgb, brightness: f32) -> Result<(), SinkError>;

    /// Blank the buffer
    fn clear(&mut self) -> Result<(), SinkError>;

    /// Make buffered writes visible
    fn flush(&mut self) -> Result<(), SinkError>;

    fn is_ready(&self) -> bool;

    fn mode(&self) -> LedMode {
        LedMode::Real
    }
}

/// Result of pushing one frame to a sink
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub written: usize,
    pub failed_writes: usize,
    pub clear_error: Option<SinkError>,
    pub flush_error: Option<SinkError>,
}

impl PushReport {
    pub fn is_clean(&self) -> bool {
        self.failed_writes == 0 && self.clear_error.is_none() && self.flush_error.is_none()
    }
}

/// Clear, write every frame pixel, then flush once
///
/// Failures are collected rather than returned so one bad pixel does not
/// cost the rest of the frame.
pub fn push_frame<D: DisplaySink + ?Sized>(sink: &mut D, frame: &RenderFrame) -> PushReport {
    let mut report = PushReport {
        clear_error: sink.clear().err(),
        ..PushReport::default()
    };
    for (position, pixel) in frame.iter() {
        match sink.set_pixel(position, pixel.color, pixel.brightness) {
            Ok(()) => report.written += 1,
            Err(err) => {
                report.failed_writes += 1;
                tracing::trace!(%err, position, "pixel write failed");
            }
        }
    }
    report.flush_error = sink.flush().err();
    report
}

/// Turn every LED off
pub fn blank<D: DisplaySink + ?Sized>(sink: &mut D) -> Result<(), SinkError> {
    sink.clear()?;
    sink.flush()
}
