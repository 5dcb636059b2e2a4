use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use embassy_time::{Duration, Instant};

use crate::color::Rgb;
use crate::frame::{Pixel, PixelKind, RenderFrame};
use crate::math8::{clamp_unit, ratio};
use crate::occupancy::StopOccupancy;
use crate::palette::{LineId, LinePalette};
use crate::position_map::{Position, PositionMap, StopId};
use crate::state::RenderState;

/// Configuration for fades and the pre-glow
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTimings {
    /// Ticks of afterglow once a stop stops boarding
    pub fade_steps: u32,
    /// Time for the pre-glow to reach its maximum
    pub preglow_rise: Duration,
    /// Pre-glow ceiling (0.0-1.0)
    pub max_preglow: f32,
}

impl Default for RenderTimings {
    fn default() -> Self {
        Self {
            fade_steps: 24,
            preglow_rise: Duration::from_secs(12),
            max_preglow: 0.6,
        }
    }
}

/// Time of one render tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Monotonic time, drives glow ramps
    pub now: Instant,
    /// Whole wall-clock seconds, drives the blink phase
    pub wall_secs: u64,
}

impl Tick {
    pub const fn new(now: Instant, wall_secs: u64) -> Self {
        Self { now, wall_secs }
    }
}

/// Render engine
///
/// Turns an occupancy snapshot plus the carried [`RenderState`] into a
/// complete frame. Solid writes land first; glow and fade only fill
/// positions nobody else claimed this tick.
#[derive(Debug, Clone)]
pub struct Renderer {
    positions: Arc<PositionMap>,
    palette: Arc<LinePalette>,
    timings: RenderTimings,
}

impl Renderer {
    pub fn new(positions: Arc<PositionMap>, palette: Arc<LinePalette>, timings: RenderTimings) -> Self {
        Self {
            positions,
            palette,
            timings,
        }
    }

    pub const fn timings(&self) -> &RenderTimings {
        &self.timings
    }

    pub fn positions(&self) -> &PositionMap {
        &self.positions
    }

    /// Render one tick
    pub fn render(&self, tick: Tick, snapshot: &StopOccupancy, state: &mut RenderState) -> RenderFrame {
        // A stop without lines is not occupied
        let occupied: BTreeSet<StopId> = snapshot
            .iter()
            .filter(|(_, lines)| !lines.is_empty())
            .map(|(stop, _)| stop.to_owned())
            .collect();

        state.begin_fades(&occupied, self.timings.fade_steps);
        state.cancel_fades(&occupied);

        let mut frame = RenderFrame::new();
        let mut colors: HashMap<StopId, Rgb> = HashMap::with_capacity(occupied.len());
        let mut glows: Vec<(Position, Pixel)> = Vec::new();

        for (stop, lines) in snapshot.iter() {
            let Some(position) = self.positions.position_of(stop) else {
                continue;
            };
            let Some((color, kind)) = self.select_color(lines, tick.wall_secs) else {
                continue;
            };

            frame.set(position, Pixel::new(color, 1.0, kind));
            colors.insert(stop.to_owned(), color);

            let started = state.glow_start(stop, tick.now);
            if let Some(neighbor) = self.glow_target(position, &occupied, state) {
                let level = self.preglow_level(started, tick.now);
                glows.push((neighbor, Pixel::new(color, level, PixelKind::Glow)));
            }
        }

        for (position, pixel) in glows {
            frame.fill(position, pixel);
        }
        state.retain_glows(&occupied);

        for (stop, fade) in state.advance_fades() {
            let Some(position) = self.positions.position_of(&stop) else {
                continue;
            };
            let level = ratio(u64::from(fade.steps), u64::from(self.timings.fade_steps));
            frame.fill(position, Pixel::new(fade.color, level, PixelKind::Fade));
        }

        state.commit(occupied, colors);
        frame
    }

    /// Color for the lines boarding at one stop
    ///
    /// One line is solid. Several lines cycle through their colors in
    /// snapshot order, one per wall-clock second. No lines, no color.
    pub fn select_color(&self, lines: &[LineId], phase: u64) -> Option<(Rgb, PixelKind)> {
        match lines {
            [] => None,
            [line] => Some((self.palette.color_of(line), PixelKind::Solid)),
            _ => {
                let len = lines.len() as u64;
                let index = usize::try_from(phase % len).unwrap_or(0);
                Some((self.palette.color_of(&lines[index]), PixelKind::Blink))
            }
        }
    }

    /// Pre-glow brightness for a stop boarding since `started`
    ///
    /// Linear ramp from 0 to `max_preglow` over `preglow_rise`, then flat.
    pub fn preglow_level(&self, started: Instant, now: Instant) -> f32 {
        let max = clamp_unit(self.timings.max_preglow);
        let elapsed = now.as_millis().saturating_sub(started.as_millis());
        let rise = self.timings.preglow_rise.as_millis();
        if rise == 0 {
            return max;
        }
        (ratio(elapsed, rise) * max).min(max)
    }

    /// First neighbor that maps to a stop which is neither boarding nor fading
    fn glow_target(&self, position: Position, occupied: &BTreeSet<StopId>, state: &RenderState) -> Option<Position> {
        self.positions.neighbors(position).into_iter().find(|candidate| {
            self.positions
                .stop_at(*candidate)
                .is_some_and(|stop| !occupied.contains(stop) && !state.is_fading(stop))
        })
    }
}
