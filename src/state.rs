//! Render state carried between ticks
//!
//! Holds the fade tails, the glow start times, and what the previous tick
//! showed. A stop is either occupied, fading, or neither; never both.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use embassy_time::Instant;

use crate::color::Rgb;
use crate::position_map::StopId;

/// Afterglow of a stop that just stopped boarding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeEntry {
    /// Color the stop showed on its last occupied tick
    pub color: Rgb,
    /// Remaining steps; only ever decreases
    pub steps: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RenderState {
    fades: BTreeMap<StopId, FadeEntry>,
    glow_started: HashMap<StopId, Instant>,
    previous_occupied: BTreeSet<StopId>,
    last_colors: HashMap<StopId, Rgb>,
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fade(&self, stop: &str) -> Option<FadeEntry> {
        self.fades.get(stop).copied()
    }

    pub fn is_fading(&self, stop: &str) -> bool {
        self.fades.contains_key(stop)
    }

    pub fn fades(&self) -> impl Iterator<Item = (&str, &FadeEntry)> {
        self.fades.iter().map(|(stop, entry)| (stop.as_str(), entry))
    }

    pub fn glow_started_at(&self, stop: &str) -> Option<Instant> {
        self.glow_started.get(stop).copied()
    }

    pub fn was_occupied(&self, stop: &str) -> bool {
        self.previous_occupied.contains(stop)
    }

    /// Color the stop displayed on the previous tick
    pub fn last_color(&self, stop: &str) -> Option<Rgb> {
        self.last_colors.get(stop).copied()
    }

    /// Start fades for stops that were occupied last tick but not now
    ///
    /// Stops that never displayed a color get no fade.
    pub(crate) fn begin_fades(&mut self, occupied_now: &BTreeSet<StopId>, steps: u32) {
        for stop in self.previous_occupied.difference(occupied_now) {
            if let Some(color) = self.last_colors.get(stop) {
                self.fades.insert(
                    stop.clone(),
                    FadeEntry {
                        color: *color,
                        steps,
                    },
                );
            }
        }
    }

    /// Drop fades of stops that are occupied again
    pub(crate) fn cancel_fades(&mut self, occupied_now: &BTreeSet<StopId>) {
        self.fades.retain(|stop, _| !occupied_now.contains(stop));
    }

    /// Glow start of an occupied stop, recorded on first sight
    pub(crate) fn glow_start(&mut self, stop: &str, now: Instant) -> Instant {
        *self.glow_started.entry(stop.to_owned()).or_insert(now)
    }

    pub(crate) fn retain_glows(&mut self, occupied_now: &BTreeSet<StopId>) {
        self.glow_started.retain(|stop, _| occupied_now.contains(stop));
    }

    /// Step every fade down by one, dropping the exhausted ones
    ///
    /// Returns the surviving fades with their remaining steps.
    pub(crate) fn advance_fades(&mut self) -> Vec<(StopId, FadeEntry)> {
        self.fades.retain(|_, entry| {
            entry.steps = entry.steps.saturating_sub(1);
            entry.steps > 0
        });
        self.fades
            .iter()
            .map(|(stop, entry)| (stop.clone(), *entry))
            .collect()
    }

    /// Remember this tick's occupancy and colors for the next one
    pub(crate) fn commit(&mut self, occupied_now: BTreeSet<StopId>, colors: HashMap<StopId, Rgb>) {
        self.previous_occupied = occupied_now;
        self.last_colors = colors;
    }

    /// Forget everything
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
