//! Per-tick visual output

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::color::{Rgb, dim, to_array};
use crate::math8::clamp_unit;
use crate::position_map::Position;

/// Why a position is lit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelKind {
    /// Single line boarding
    Solid,
    /// Several lines boarding, cycling once per second
    Blink,
    /// Anticipation glow next to a boarding stop
    Glow,
    /// Afterglow of a stop that stopped boarding
    Fade,
    /// One-off override from the control surface
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pixel {
    pub color: Rgb,
    /// Always within `[0.0, 1.0]`
    pub brightness: f32,
    pub kind: PixelKind,
}

impl Pixel {
    pub fn new(color: Rgb, brightness: f32, kind: PixelKind) -> Self {
        Self {
            color,
            brightness: clamp_unit(brightness),
            kind,
        }
    }

    /// Color with brightness applied
    pub fn output(&self) -> Rgb {
        dim(self.color, self.brightness)
    }
}

/// Complete visual state for one tick
///
/// Every tick produces a fresh frame; nothing is patched in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderFrame {
    pixels: BTreeMap<Position, Pixel>,
}

impl RenderFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, position: Position) -> Option<&Pixel> {
        self.pixels.get(&position)
    }

    pub fn is_set(&self, position: Position) -> bool {
        self.pixels.contains_key(&position)
    }

    /// Write a pixel, replacing whatever was there
    pub fn set(&mut self, position: Position, pixel: Pixel) {
        self.pixels.insert(position, pixel);
    }

    /// Write a pixel only if the position is still empty
    pub fn fill(&mut self, position: Position, pixel: Pixel) -> bool {
        if self.is_set(position) {
            return false;
        }
        self.pixels.insert(position, pixel);
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (Position, &Pixel)> {
        self.pixels.iter().map(|(position, pixel)| (*position, pixel))
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Ordered LED list for UI polling
    pub fn to_published(&self) -> Vec<PublishedLed> {
        self.iter()
            .map(|(position, pixel)| PublishedLed {
                position,
                color: to_array(pixel.color),
                brightness: pixel.brightness,
                kind: pixel.kind,
            })
            .collect()
    }
}

/// One LED as reported to the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedLed {
    pub position: Position,
    pub color: [u8; 3],
    pub brightness: f32,
    pub kind: PixelKind,
}
