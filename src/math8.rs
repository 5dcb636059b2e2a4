/// Scale an 8-bit value by a factor (0-255 = 0.0-1.0)
#[inline]
#[allow(clippy::cast_lossless, clippy::cast_possible_truncation)]
pub const fn scale8(value: u8, scale: u8) -> u8 {
    ((value as u16 * (1 + scale as u16)) >> 8) as u8
}

/// Clamp a brightness into `[0.0, 1.0]`, mapping NaN to 0
#[inline]
pub fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Convert a unit brightness to an 8-bit scale factor
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn unit_to_u8(value: f32) -> u8 {
    (clamp_unit(value) * 255.0).round() as u8
}

/// Ratio of `part` to `whole` as a unit float
#[inline]
#[allow(clippy::cast_precision_loss)]
pub fn ratio(part: u64, whole: u64) -> f32 {
    if whole == 0 {
        return 1.0;
    }
    clamp_unit(part as f32 / whole as f32)
}
