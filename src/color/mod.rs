use smart_leds::RGB8;

use crate::math8::{scale8, unit_to_u8};

pub type Rgb = RGB8;

pub const BLACK: Rgb = rgb_from_u32(0x00_00_00);
pub const WHITE: Rgb = rgb_from_u32(0xFF_FF_FF);

/// Create an RGB color from a u32 value (0xRRGGBB format)
#[allow(clippy::cast_possible_truncation)]
pub const fn rgb_from_u32(color: u32) -> Rgb {
    Rgb {
        r: ((color >> 16) & 0xFF) as u8,
        g: ((color >> 8) & 0xFF) as u8,
        b: (color & 0xFF) as u8,
    }
}

/// Scale every channel by a unit brightness (0.0-1.0)
#[inline]
pub fn dim(color: Rgb, brightness: f32) -> Rgb {
    let level = unit_to_u8(brightness);
    if level == 255 {
        return color;
    }
    Rgb {
        r: scale8(color.r, level),
        g: scale8(color.g, level),
        b: scale8(color.b, level),
    }
}

/// Channel triple in `[r, g, b]` order, as used by configuration and the UI
#[inline]
pub const fn to_array(color: Rgb) -> [u8; 3] {
    [color.r, color.g, color.b]
}

#[inline]
pub const fn from_array(channels: [u8; 3]) -> Rgb {
    Rgb {
        r: channels[0],
        g: channels[1],
        b: channels[2],
    }
}
