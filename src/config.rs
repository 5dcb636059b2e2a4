//! Static configuration
//!
//! Loaded once at startup from JSON and treated as immutable afterwards.
//! Every field has a default; the default layout is the Red Line.

use std::collections::BTreeMap;
use std::path::Path;

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::color::from_array;
use crate::error::ConfigError;
use crate::fetcher::FetchPolicy;
use crate::palette::LinePalette;
use crate::position_map::{Position, PositionMap, StopId};
use crate::renderer::RenderTimings;

const DEFAULT_STATIONS: [(&str, Position, &str); 27] = [
    ("A15", 0, "Shady Grove"),
    ("A14", 1, "Rockville"),
    ("A13", 2, "Twinbrook"),
    ("A12", 3, "White Flint"),
    ("A11", 4, "Grosvenor-Strathmore"),
    ("A10", 5, "Medical Center"),
    ("A09", 6, "Bethesda"),
    ("A08", 7, "Friendship Heights"),
    ("A07", 8, "Tenleytown-AU"),
    ("A06", 9, "Van Ness-UDC"),
    ("A05", 10, "Cleveland Park"),
    ("A04", 11, "Woodley Park"),
    ("A03", 12, "Dupont Circle"),
    ("A02", 13, "Farragut North"),
    ("A01", 14, "Metro Center"),
    ("B01", 15, "Gallery Place"),
    ("B02", 16, "Judiciary Square"),
    ("B03", 17, "Union Station"),
    ("B04", 18, "NoMa-Gallaudet U"),
    ("B05", 19, "Rhode Island Ave"),
    ("B06", 20, "Brookland-CUA"),
    ("B07", 21, "Fort Totten"),
    ("B08", 22, "Takoma"),
    ("B09", 23, "Silver Spring"),
    ("B10", 24, "Forest Glen"),
    ("B11", 25, "Wheaton"),
    ("B12", 26, "Glenmont"),
];

const DEFAULT_LINE_COLORS: [(&str, [u8; 3]); 6] = [
    ("RD", [255, 0, 0]),
    ("BL", [0, 0, 255]),
    ("YL", [255, 255, 0]),
    ("OR", [255, 165, 0]),
    ("GR", [0, 255, 0]),
    ("SV", [192, 192, 192]),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stop code to strip position
    pub stations: BTreeMap<StopId, Position>,
    /// Stop code to display name, for the UI
    pub station_names: BTreeMap<StopId, String>,
    /// Line code to `[r, g, b]`
    pub line_colors: BTreeMap<String, [u8; 3]>,
    /// Strip length; defaults to the highest mapped position + 1
    pub led_count: Option<usize>,
    pub timings: TimingConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub fetch_ttl_secs: u64,
    pub fade_steps: u32,
    pub preglow_rise_secs: f32,
    pub max_preglow: f32,
    pub stale_after_secs: u64,
    pub stale_warn_interval_secs: u64,
    pub backoff_step_secs: u64,
    pub backoff_cap_secs: u64,
    pub tick_millis: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Extra attempts after a retryable transport failure
    pub retries: u32,
    /// Base delay between retries, doubled per attempt
    pub retry_backoff_secs: f32,
    /// Environment variable holding the API key
    pub api_key_env: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stations: DEFAULT_STATIONS
                .iter()
                .map(|(code, position, _)| ((*code).to_owned(), *position))
                .collect(),
            station_names: DEFAULT_STATIONS
                .iter()
                .map(|(code, _, name)| ((*code).to_owned(), (*name).to_owned()))
                .collect(),
            line_colors: DEFAULT_LINE_COLORS
                .iter()
                .map(|(line, color)| ((*line).to_owned(), *color))
                .collect(),
            led_count: None,
            timings: TimingConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            fetch_ttl_secs: 10,
            fade_steps: 24,
            preglow_rise_secs: 12.0,
            max_preglow: 0.6,
            stale_after_secs: 300,
            stale_warn_interval_secs: 30,
            backoff_step_secs: 30,
            backoff_cap_secs: 300,
            tick_millis: 1000,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.wmata.com".to_owned(),
            timeout_secs: 20,
            retries: 4,
            retry_backoff_secs: 1.5,
            api_key_env: "WMATA_API_KEY".to_owned(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.position_map()?;

        let timings = &self.timings;
        if timings.fade_steps == 0 {
            return Err(ConfigError::invalid_timing("fade_steps must be at least 1"));
        }
        if !(0.0..=1.0).contains(&timings.max_preglow) {
            return Err(ConfigError::invalid_timing("max_preglow must be within [0, 1]"));
        }
        if timings.preglow_rise_secs.is_nan() || timings.preglow_rise_secs <= 0.0 {
            return Err(ConfigError::invalid_timing("preglow_rise_secs must be positive"));
        }
        if timings.tick_millis == 0 {
            return Err(ConfigError::invalid_timing("tick_millis must be positive"));
        }
        if timings.fetch_ttl_secs == 0 {
            return Err(ConfigError::invalid_timing("fetch_ttl_secs must be positive"));
        }
        Ok(())
    }

    pub fn position_map(&self) -> Result<PositionMap, ConfigError> {
        PositionMap::new(
            self.stations
                .iter()
                .map(|(stop, position)| (stop.clone(), *position)),
            self.led_count,
        )
    }

    pub fn palette(&self) -> LinePalette {
        LinePalette::new(
            self.line_colors
                .iter()
                .map(|(line, color)| (line.as_str(), from_array(*color))),
        )
    }

    pub fn render_timings(&self) -> RenderTimings {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rise_ms = (self.timings.preglow_rise_secs * 1000.0).round() as u64;
        RenderTimings {
            fade_steps: self.timings.fade_steps,
            preglow_rise: Duration::from_millis(rise_ms),
            max_preglow: self.timings.max_preglow,
        }
    }

    pub fn fetch_policy(&self) -> FetchPolicy {
        FetchPolicy {
            ttl: Duration::from_secs(self.timings.fetch_ttl_secs),
            backoff_step: Duration::from_secs(self.timings.backoff_step_secs),
            backoff_cap: Duration::from_secs(self.timings.backoff_cap_secs),
            stale_after: Duration::from_secs(self.timings.stale_after_secs),
            stale_warn_interval: Duration::from_secs(self.timings.stale_warn_interval_secs),
        }
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_millis(self.timings.tick_millis)
    }
}
