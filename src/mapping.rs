//! Station to LED mapping session
//!
//! Walks the stations one at a time while a single white LED marks the
//! candidate position. Each station is accepted onto the lit LED or skipped;
//! an LED can belong to one station only. The result becomes the `stations`
//! table of a [`Config`].

use std::collections::BTreeMap;

use crate::color::{Rgb, WHITE};
use crate::config::Config;
use crate::error::{ConfigError, MappingError, SinkError};
use crate::frame::{Pixel, PixelKind, RenderFrame};
use crate::position_map::{Position, PositionMap, StopId};
use crate::sink::{DisplaySink, PushReport, push_frame};

/// One keyboard command of the interactive session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapCommand {
    Accept,
    Next,
    Prev,
    Skip,
    Quit,
}

impl MapCommand {
    /// Empty line accepts; `n`, `p`, `s`, `q` step, skip and quit
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => Some(Self::Accept),
            "n" => Some(Self::Next),
            "p" => Some(Self::Prev),
            "s" => Some(Self::Skip),
            "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StationMapper {
    stations: Vec<(StopId, String)>,
    current: usize,
    cursor: Position,
    count: usize,
    assigned: BTreeMap<StopId, Position>,
}

impl StationMapper {
    /// Start a session over `stations` (code, display name) on a strip of `count` LEDs
    pub fn new(stations: Vec<(StopId, String)>, count: usize) -> Result<Self, ConfigError> {
        if count == 0 {
            return Err(ConfigError::ZeroPositions);
        }
        Ok(Self {
            stations,
            current: 0,
            cursor: 0,
            count,
            assigned: BTreeMap::new(),
        })
    }

    /// Station being mapped, as `(code, name)`
    pub fn station(&self) -> Option<(&str, &str)> {
        self.stations
            .get(self.current)
            .map(|(code, name)| (code.as_str(), name.as_str()))
    }

    /// Candidate LED
    pub const fn cursor(&self) -> Position {
        self.cursor
    }

    pub const fn count(&self) -> usize {
        self.count
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.stations.len()
    }

    pub fn next_led(&mut self) -> Position {
        self.cursor = (self.cursor + 1) % self.count;
        self.cursor
    }

    pub fn prev_led(&mut self) -> Position {
        self.cursor = (self.cursor + self.count - 1) % self.count;
        self.cursor
    }

    /// Assign the lit LED to the current station and move on
    ///
    /// The next station starts on the LED after the accepted one.
    pub fn accept(&mut self) -> Result<Position, MappingError> {
        let Some((stop, _)) = self.stations.get(self.current) else {
            return Err(MappingError::Finished);
        };

        let candidate = self
            .assigned
            .iter()
            .map(|(code, position)| (code.clone(), *position))
            .chain([(stop.clone(), self.cursor)]);
        if let Err(ConfigError::DuplicatePosition { position, first, .. }) =
            PositionMap::new(candidate, Some(self.count))
        {
            return Err(MappingError::LedTaken { position, stop: first });
        }

        let position = self.cursor;
        tracing::debug!(stop = %stop, position, "station mapped");
        self.assigned.insert(stop.clone(), position);
        self.current += 1;
        self.cursor = (position + 1) % self.count;
        Ok(position)
    }

    /// Leave the current station unmapped
    pub fn skip(&mut self) {
        if !self.is_finished() {
            self.current += 1;
        }
    }

    pub fn assignments(&self) -> &BTreeMap<StopId, Position> {
        &self.assigned
    }

    /// Light only the candidate LED
    pub fn show<D: DisplaySink + ?Sized>(&self, sink: &mut D) -> Result<(), SinkError> {
        sink.clear()?;
        sink.set_pixel(self.cursor, WHITE, 1.0)?;
        sink.flush()
    }

    /// `base` with its station table replaced by this session's assignments
    pub fn into_config(self, base: Config) -> Result<Config, ConfigError> {
        let config = Config {
            stations: self.assigned,
            led_count: Some(self.count),
            ..base
        };
        config.validate()?;
        Ok(config)
    }
}

/// Distinct color for the `index`-th mapped LED of the test pattern
#[allow(clippy::cast_possible_truncation)]
pub const fn test_pattern_color(index: usize) -> Rgb {
    Rgb {
        r: ((index * 50) % 255) as u8,
        g: ((index * 85) % 255) as u8,
        b: ((index * 120) % 255) as u8,
    }
}

/// Frame lighting every mapped position in its test pattern color
pub fn test_pattern(positions: &PositionMap) -> RenderFrame {
    let mut frame = RenderFrame::new();
    for (index, (_, position)) in positions.iter().enumerate() {
        frame.set(position, Pixel::new(test_pattern_color(index), 1.0, PixelKind::Manual));
    }
    frame
}

pub fn show_test_pattern<D: DisplaySink + ?Sized>(positions: &PositionMap, sink: &mut D) -> PushReport {
    push_frame(sink, &test_pattern(positions))
}
