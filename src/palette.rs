//! Line to color lookup

use std::collections::HashMap;

use crate::color::{Rgb, WHITE};

/// Opaque line (route) code
pub type LineId = String;

/// Color used for lines without a palette entry
pub const FALLBACK_COLOR: Rgb = WHITE;

/// Normalize a raw line code: trimmed and uppercased
pub fn normalize_line(raw: &str) -> LineId {
    raw.trim().to_ascii_uppercase()
}

#[derive(Debug, Clone, Default)]
pub struct LinePalette {
    colors: HashMap<LineId, Rgb>,
}

impl LinePalette {
    pub fn new<I, S>(colors: I) -> Self
    where
        I: IntoIterator<Item = (S, Rgb)>,
        S: AsRef<str>,
    {
        Self {
            colors: colors
                .into_iter()
                .map(|(line, color)| (normalize_line(line.as_ref()), color))
                .collect(),
        }
    }

    pub fn is_known(&self, line: &str) -> bool {
        self.colors.contains_key(line)
    }

    pub fn get(&self, line: &str) -> Option<Rgb> {
        self.colors.get(line).copied()
    }

    /// Color for a line, falling back to white
    pub fn color_of(&self, line: &str) -> Rgb {
        self.get(line).unwrap_or(FALLBACK_COLOR)
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Known line codes, sorted
    pub fn lines(&self) -> Vec<&str> {
        let mut lines: Vec<&str> = self.colors.keys().map(String::as_str).collect();
        lines.sort_unstable();
        lines
    }
}
