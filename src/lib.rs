pub mod color;
pub mod config;
pub mod controller;
pub mod error;
pub mod fetcher;
pub mod frame;
pub mod frame_scheduler;
pub mod mapping;
pub mod math8;
pub mod occupancy;
pub mod palette;
pub mod position_map;
pub mod renderer;
pub mod sink;
pub mod source;
pub mod state;
pub mod system;

pub use config::{ApiConfig, Config, TimingConfig};
pub use controller::{
    Controller, ControllerStatus, ErrorResponse, HealthReport, LedOverride, LoopSettings, Mode,
    OverrideStatus, StartStatus, StationInfo, StopStatus,
};
pub use error::{ConfigError, ControlError, FetchError, MappingError, SinkError};
pub use fetcher::{FetchOutcome, FetchPolicy, SnapshotFetcher};
pub use frame::{Pixel, PixelKind, PublishedLed, RenderFrame};
pub use frame_scheduler::{FrameResult, FrameScheduler};
pub use mapping::{MapCommand, StationMapper};
pub use occupancy::{BoardingEvent, BoardingStatus, StopOccupancy};
pub use palette::{FALLBACK_COLOR, LineId, LinePalette};
pub use position_map::{Position, PositionMap, StopId};
pub use renderer::{RenderTimings, Renderer, Tick};
pub use sink::{DisplaySink, LedMode, SimulatedSink, SmartLedsSink};
pub use source::{PredictionSource, WmataClient};
pub use state::{FadeEntry, RenderState};

pub use color::Rgb;
pub use embassy_time::{Duration, Instant};
