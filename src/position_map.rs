//! Stop to strip position lookup
//!
//! Bidirectional mapping between stop codes and physical LED positions,
//! plus the adjacency used by the pre-glow.

use std::collections::HashMap;

use heapless::Vec as HVec;

use crate::error::ConfigError;

/// Physical index into the LED strip
pub type Position = usize;

/// Opaque stop (station/platform) code
pub type StopId = String;

#[derive(Debug, Clone)]
pub struct PositionMap {
    count: usize,
    by_stop: HashMap<StopId, Position>,
    by_position: Vec<Option<StopId>>,
}

impl PositionMap {
    /// Build the map, validating that every position is unique and in range
    ///
    /// When `count` is `None` the strip length is `max(position) + 1`.
    pub fn new<I, S>(stations: I, count: Option<usize>) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, Position)>,
        S: Into<StopId>,
    {
        let stations: Vec<(StopId, Position)> = stations
            .into_iter()
            .map(|(stop, position)| (stop.into(), position))
            .collect();

        let count = count.unwrap_or_else(|| {
            stations
                .iter()
                .map(|(_, position)| position + 1)
                .max()
                .unwrap_or(0)
        });
        if count == 0 {
            return Err(ConfigError::ZeroPositions);
        }

        let mut by_stop = HashMap::with_capacity(stations.len());
        let mut by_position: Vec<Option<StopId>> = vec![None; count];

        for (stop, position) in stations {
            if position >= count {
                return Err(ConfigError::PositionOutOfRange {
                    stop,
                    position,
                    count,
                });
            }
            if by_stop.contains_key(&stop) {
                return Err(ConfigError::DuplicateStop(stop));
            }
            if let Some(first) = &by_position[position] {
                return Err(ConfigError::DuplicatePosition {
                    position,
                    first: first.clone(),
                    second: stop,
                });
            }
            by_position[position] = Some(stop.clone());
            by_stop.insert(stop, position);
        }

        Ok(Self {
            count,
            by_stop,
            by_position,
        })
    }

    /// Total number of positions on the strip
    pub const fn count(&self) -> usize {
        self.count
    }

    pub const fn contains(&self, position: Position) -> bool {
        position < self.count
    }

    pub fn position_of(&self, stop: &str) -> Option<Position> {
        self.by_stop.get(stop).copied()
    }

    pub fn stop_at(&self, position: Position) -> Option<&str> {
        self.by_position.get(position)?.as_deref()
    }

    /// In-range neighbors of a position, `+1` first, then `-1`
    pub fn neighbors(&self, position: Position) -> HVec<Position, 2> {
        let mut out = HVec::new();
        if position + 1 < self.count {
            let _ = out.push(position + 1);
        }
        if position > 0 && position - 1 < self.count {
            let _ = out.push(position - 1);
        }
        out
    }

    /// Mapped stops ordered by position
    pub fn iter(&self) -> impl Iterator<Item = (&str, Position)> {
        self.by_position
            .iter()
            .enumerate()
            .filter_map(|(position, stop)| Some((stop.as_deref()?, position)))
    }

    /// Number of mapped stops
    pub fn len(&self) -> usize {
        self.by_stop.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_stop.is_empty()
    }
}
