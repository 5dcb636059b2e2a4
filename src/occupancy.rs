//! Boarding events and the per-stop occupancy snapshot

use std::collections::BTreeMap;

use embassy_time::Instant;
use serde::Serialize;

use crate::palette::{LineId, LinePalette, normalize_line};
use crate::position_map::StopId;

const STATUS_BOARDING: &str = "BRD";
const STATUS_ARRIVING: &str = "ARR";
const STATUS_DELAYED: &str = "DLY";

/// Status of one predicted vehicle at a stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardingStatus {
    /// Physically stopped and loading passengers
    Boarding,
    Arriving,
    Delayed,
    /// Countdown in minutes
    Minutes(u32),
    /// Anything else (`--`, empty, unknown markers)
    Placeholder,
}

impl BoardingStatus {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_ascii_uppercase();
        match raw.as_str() {
            STATUS_BOARDING => Self::Boarding,
            STATUS_ARRIVING => Self::Arriving,
            STATUS_DELAYED => Self::Delayed,
            other => other
                .parse::<u32>()
                .map(Self::Minutes)
                .unwrap_or(Self::Placeholder),
        }
    }

    pub const fn is_boarding(&self) -> bool {
        matches!(self, Self::Boarding)
    }
}

/// One validated prediction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardingEvent {
    pub stop_id: StopId,
    pub line_id: LineId,
    pub status: BoardingStatus,
}

impl BoardingEvent {
    pub fn new(stop_id: impl Into<StopId>, line_id: impl Into<LineId>, status: BoardingStatus) -> Self {
        Self {
            stop_id: stop_id.into(),
            line_id: line_id.into(),
            status,
        }
    }
}

/// Which lines are boarding at which stops, as of one fetch
///
/// Replaced wholesale on every successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StopOccupancy {
    stops: BTreeMap<StopId, Vec<LineId>>,
    #[serde(skip)]
    fetched_at: Option<Instant>,
}

impl StopOccupancy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep strictly boarding events on known lines, grouped by stop
    ///
    /// Line order within a stop follows event order.
    pub fn from_events<'a, I>(events: I, palette: &LinePalette) -> Self
    where
        I: IntoIterator<Item = &'a BoardingEvent>,
    {
        let mut stops: BTreeMap<StopId, Vec<LineId>> = BTreeMap::new();
        for event in events {
            if !event.status.is_boarding() {
                continue;
            }
            let stop = event.stop_id.trim();
            let line = normalize_line(&event.line_id);
            if stop.is_empty() || !palette.is_known(&line) {
                continue;
            }
            stops.entry(stop.to_owned()).or_default().push(line);
        }
        Self {
            stops,
            fetched_at: None,
        }
    }

    /// Add a stop with its lines
    #[must_use]
    pub fn with_stop(mut self, stop: &str, lines: &[&str]) -> Self {
        self.stops.insert(
            stop.to_owned(),
            lines.iter().map(|line| (*line).to_owned()).collect(),
        );
        self
    }

    #[must_use]
    pub fn fetched_at(mut self, at: Instant) -> Self {
        self.fetched_at = Some(at);
        self
    }

    pub const fn fetch_time(&self) -> Option<Instant> {
        self.fetched_at
    }

    pub fn lines_at(&self, stop: &str) -> Option<&[LineId]> {
        self.stops.get(stop).map(Vec::as_slice)
    }

    pub fn contains(&self, stop: &str) -> bool {
        self.stops.contains_key(stop)
    }

    pub fn stops(&self) -> impl Iterator<Item = &str> {
        self.stops.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[LineId])> {
        self.stops
            .iter()
            .map(|(stop, lines)| (stop.as_str(), lines.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}
