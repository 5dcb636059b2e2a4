//! Control surface
//!
//! Owns the background worker that runs the scheduling loop, and exposes
//! start/stop, status, the published frame, and one-off LED overrides to a
//! UI layer. Share it as `Arc<Controller<..>>`; every method takes `&self`.
//!
//! Manual overrides go straight to the sink and are not serialized against
//! the worker, so the next tick may paint over them.
//!
//! A panic inside one iteration (source, driver, render) is caught and
//! logged; the loop carries on with the next tick in degraded mode.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration as StdDuration, Instant as StdInstant, SystemTime, UNIX_EPOCH};

use embassy_time::{Duration, Instant};
use serde::{Deserialize, Serialize};

use crate::color::from_array;
use crate::config::Config;
use crate::error::{ConfigError, ControlError, SinkError};
use crate::fetcher::{FetchPolicy, SnapshotFetcher};
use crate::frame::{Pixel, PixelKind, PublishedLed, RenderFrame};
use crate::frame_scheduler::{DEFAULT_FRAME_DURATION, FrameScheduler};
use crate::palette::LinePalette;
use crate::position_map::{Position, PositionMap, StopId};
use crate::renderer::{RenderTimings, Renderer, Tick};
use crate::sink::{DisplaySink, LedMode, PushReport, blank};
use crate::source::PredictionSource;
use crate::system::{MemoryUsage, memory_usage};

/// Longest `stop` waits for the worker to exit
pub const STOP_TIMEOUT: StdDuration = StdDuration::from_secs(1);

const STOP_POLL: StdDuration = StdDuration::from_millis(10);
const WORKER_NAME: &str = "metro-lights-worker";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartStatus {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideStatus {
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerStatus {
    pub running: bool,
    pub led_mode: LedMode,
    pub sink_ready: bool,
    pub mode: Mode,
    pub seconds_since_success: Option<u64>,
    pub consecutive_failures: u32,
    /// A worker detached by `stop` is still finishing its last iteration
    pub lingering_worker: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    #[serde(flatten)]
    pub status: ControllerStatus,
    pub memory: Option<MemoryUsage>,
}

/// Structured error body for callers of the control surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    pub message: String,
    pub led_mode: LedMode,
}

/// A stop as listed in the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationInfo {
    pub code: StopId,
    pub position: Position,
    pub name: String,
}

/// One-off LED write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedOverride {
    #[serde(alias = "index")]
    pub position: Position,
    pub color: [u8; 3],
    #[serde(default = "full_brightness")]
    pub brightness: f32,
}

const fn full_brightness() -> f32 {
    1.0
}

/// Loop settings fixed at construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    pub timings: RenderTimings,
    pub policy: FetchPolicy,
    pub frame_duration: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            timings: RenderTimings::default(),
            policy: FetchPolicy::default(),
            frame_duration: DEFAULT_FRAME_DURATION,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct LoopHealth {
    last_success: Option<Instant>,
    failures: u32,
    stale: bool,
    sink_degraded: bool,
    tick_failed: bool,
}

/// State the worker publishes for concurrent readers
#[derive(Debug, Default)]
struct Published {
    frame: RwLock<Arc<RenderFrame>>,
    health: Mutex<LoopHealth>,
}

impl Published {
    fn frame(&self) -> Arc<RenderFrame> {
        Arc::clone(&*self.frame.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn replace(&self, frame: RenderFrame) {
        *self.frame.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(frame);
    }

    fn update(&self, apply: impl FnOnce(&mut RenderFrame)) {
        let mut guard = self.frame.write().unwrap_or_else(PoisonError::into_inner);
        apply(Arc::make_mut(&mut *guard));
    }

    fn health(&self) -> LoopHealth {
        *lock(&self.health)
    }
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

pub struct Controller<S: ?Sized, D> {
    source: Arc<S>,
    sink: Arc<Mutex<D>>,
    positions: Arc<PositionMap>,
    palette: Arc<LinePalette>,
    station_names: BTreeMap<StopId, String>,
    settings: LoopSettings,
    published: Arc<Published>,
    worker: Mutex<Option<Worker>>,
    lingering: Mutex<Option<JoinHandle<()>>>,
}

impl<S, D> Controller<S, D>
where
    S: PredictionSource + ?Sized + 'static,
    D: DisplaySink + Send + 'static,
{
    pub fn new(
        source: Arc<S>,
        sink: D,
        positions: Arc<PositionMap>,
        palette: Arc<LinePalette>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            source,
            sink: Arc::new(Mutex::new(sink)),
            positions,
            palette,
            station_names: BTreeMap::new(),
            settings,
            published: Arc::new(Published::default()),
            worker: Mutex::new(None),
            lingering: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config, source: Arc<S>, sink: D) -> Result<Self, ConfigError> {
        config.validate()?;
        let settings = LoopSettings {
            timings: config.render_timings(),
            policy: config.fetch_policy(),
            frame_duration: config.tick_duration(),
        };
        let mut controller = Self::new(
            source,
            sink,
            Arc::new(config.position_map()?),
            Arc::new(config.palette()),
            settings,
        );
        controller.station_names = config.station_names.clone();
        Ok(controller)
    }

    /// Start the update worker; a no-op if it is already running
    ///
    /// Every start begins with empty render state and an immediate fetch.
    pub fn start(&self) -> Result<StartStatus, ControlError> {
        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return Ok(StartStatus::AlreadyRunning);
        }
        if !lock(&self.sink).is_ready() {
            return Err(ControlError::SinkNotReady);
        }
        if self.has_lingering_worker() {
            tracing::warn!("previous update worker is still exiting; it will not write to the strip");
        }

        *lock(&self.published.health) = LoopHealth::default();
        let now = Instant::now();
        let fetcher = SnapshotFetcher::new(
            Arc::clone(&self.source),
            Arc::clone(&self.palette),
            self.settings.policy,
            now,
        );
        let renderer = Renderer::new(
            Arc::clone(&self.positions),
            Arc::clone(&self.palette),
            self.settings.timings,
        );
        let running = Arc::new(AtomicBool::new(true));
        let context = WorkerContext {
            scheduler: FrameScheduler::with_frame_duration(fetcher, renderer, self.settings.frame_duration),
            sink: Arc::clone(&self.sink),
            published: Arc::clone(&self.published),
            running: Arc::clone(&running),
        };

        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_owned())
            .spawn(move || context.run())
            .map_err(|err| ControlError::Spawn(err.to_string()))?;

        *worker = Some(Worker { running, handle });
        tracing::info!("updater started");
        Ok(StartStatus::Started)
    }

    /// Stop the worker, then blank the strip and the published frame
    ///
    /// Waits at most [`STOP_TIMEOUT`] for the worker to exit. A worker stuck
    /// in a slow fetch is detached instead; it never writes to the strip
    /// again and exits once the fetch returns, possibly after a new `start`.
    /// Calling this while stopped has the same result as a real stop.
    pub fn stop(&self) -> StopStatus {
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            worker.running.store(false, Ordering::Release);
            worker.handle.thread().unpark();
            if let Some(handle) = join_with_timeout(worker.handle, STOP_TIMEOUT) {
                *lock(&self.lingering) = Some(handle);
            }
        }

        {
            let mut sink = lock(&self.sink);
            if sink.is_ready() {
                if let Err(err) = blank(&mut *sink) {
                    tracing::warn!(%err, "failed to clear strip on stop");
                }
            }
        }
        self.published.replace(RenderFrame::new());
        tracing::info!("updater stopped; LEDs cleared");
        StopStatus::Stopped
    }

    pub fn is_running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    pub fn status(&self) -> ControllerStatus {
        let health = self.published.health();
        let (sink_ready, led_mode) = {
            let sink = lock(&self.sink);
            (sink.is_ready(), sink.mode())
        };
        let degraded = health.failures > 0 || health.stale || health.sink_degraded || health.tick_failed;
        ControllerStatus {
            running: self.is_running(),
            led_mode,
            sink_ready,
            mode: if degraded { Mode::Degraded } else { Mode::Healthy },
            seconds_since_success: health
                .last_success
                .map(|at| Instant::now().as_secs().saturating_sub(at.as_secs())),
            consecutive_failures: health.failures,
            lingering_worker: self.has_lingering_worker(),
        }
    }

    fn has_lingering_worker(&self) -> bool {
        let mut lingering = lock(&self.lingering);
        if lingering.as_ref().is_some_and(JoinHandle::is_finished) {
            lingering.take();
        }
        lingering.is_some()
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: self.status(),
            memory: memory_usage(),
        }
    }

    /// Latest published frame
    pub fn frame(&self) -> Arc<RenderFrame> {
        self.published.frame()
    }

    /// Published LEDs ordered by position
    pub fn led_status(&self) -> Vec<PublishedLed> {
        self.published.frame().to_published()
    }

    /// Apply one-off LED writes and flush
    ///
    /// Out-of-range positions are skipped. A failed write does not stop the
    /// batch: the remaining writes are applied, flushed and published, and
    /// the first failure is returned.
    pub fn set_leds(&self, overrides: &[LedOverride]) -> Result<OverrideStatus, ControlError> {
        let mut sink = lock(&self.sink);
        if !sink.is_ready() {
            return Err(ControlError::SinkNotReady);
        }

        let mut applied = Vec::with_capacity(overrides.len());
        let mut first_error: Option<SinkError> = None;
        for led in overrides {
            if !self.positions.contains(led.position) {
                tracing::debug!(position = led.position, "skipping out-of-range override");
                continue;
            }
            let pixel = Pixel::new(from_array(led.color), led.brightness, PixelKind::Manual);
            match sink.set_pixel(led.position, pixel.color, pixel.brightness) {
                Ok(()) => applied.push((led.position, pixel)),
                Err(err) => {
                    tracing::warn!(%err, position = led.position, "manual override write failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        let flushed = sink.flush();
        drop(sink);

        if let Err(err) = flushed {
            tracing::warn!(%err, "failed to flush manual override");
            return Err(first_error.unwrap_or(err).into());
        }
        self.published.update(|frame| {
            for (position, pixel) in &applied {
                frame.set(*position, *pixel);
            }
        });
        tracing::info!(leds = applied.len(), "applied manual override");
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(OverrideStatus::Success),
        }
    }

    /// Mapped stops ordered by position, with display names where known
    pub fn stations(&self) -> Vec<StationInfo> {
        self.positions
            .iter()
            .map(|(code, position)| StationInfo {
                code: code.to_owned(),
                position,
                name: self
                    .station_names
                    .get(code)
                    .cloned()
                    .unwrap_or_else(|| code.to_owned()),
            })
            .collect()
    }

    pub fn palette(&self) -> &LinePalette {
        &self.palette
    }

    pub fn led_mode(&self) -> LedMode {
        lock(&self.sink).mode()
    }

    /// Convert a control error into the structured response body
    pub fn error_response(&self, err: &ControlError) -> ErrorResponse {
        ErrorResponse {
            status: "error",
            message: err.to_string(),
            led_mode: self.led_mode(),
        }
    }

    /// Inspect the sink
    pub fn with_sink<R>(&self, inspect: impl FnOnce(&D) -> R) -> R {
        inspect(&lock(&self.sink))
    }
}

impl<S: ?Sized, D> Drop for Controller<S, D> {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.running.store(false, Ordering::Release);
            worker.handle.thread().unpark();
        }
    }
}

struct WorkerContext<S: ?Sized, D> {
    scheduler: FrameScheduler<S>,
    sink: Arc<Mutex<D>>,
    published: Arc<Published>,
    running: Arc<AtomicBool>,
}

impl<S: PredictionSource + ?Sized, D: DisplaySink> WorkerContext<S, D> {
    fn run(mut self) {
        while self.is_running() {
            let now = Instant::now();
            let tick = Tick::new(now, wall_clock_secs());

            let (scheduler, sink, running) = (&mut self.scheduler, &self.sink, &self.running);
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                // Checked under the sink lock so nothing is written after stop clears the strip
                scheduler.tick_with(tick, || {
                    let sink = lock(sink);
                    running.load(Ordering::Acquire).then_some(sink)
                })
            }));

            let deadline = match outcome {
                Ok(Some(result)) => {
                    log_push(&result.push);
                    self.record_health(&result.push, now, false);
                    self.published.replace(result.frame);
                    result.next_deadline
                }
                Ok(None) => break,
                Err(payload) => {
                    tracing::error!(panic = %panic_message(payload.as_ref()), "update iteration panicked");
                    self.record_health(&PushReport::default(), now, true);
                    self.scheduler.schedule_next(now).0
                }
            };
            self.sleep_until(deadline);
        }
        tracing::debug!("update worker exited");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn record_health(&self, report: &PushReport, now: Instant, tick_failed: bool) {
        let fetcher = self.scheduler.fetcher();
        let mut health = lock(&self.published.health);
        health.last_success = fetcher.last_success();
        health.failures = fetcher.consecutive_failures();
        health.stale = fetcher.is_stale(now);
        health.sink_degraded = !report.is_clean();
        health.tick_failed = tick_failed;
    }

    /// Park until `deadline` or until stop unparks us
    fn sleep_until(&self, deadline: Instant) {
        let remaining = deadline.as_millis().saturating_sub(Instant::now().as_millis());
        let deadline = StdInstant::now() + StdDuration::from_millis(remaining);
        while self.is_running() {
            let now = StdInstant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
    }
}

fn log_push(report: &PushReport) {
    if report.is_clean() {
        return;
    }
    tracing::warn!(
        failed_writes = report.failed_writes,
        clear_error = ?report.clear_error,
        flush_error = ?report.flush_error,
        "display sink degraded"
    );
}

/// Join within `timeout`; hands the handle back if the worker is still running
fn join_with_timeout(handle: JoinHandle<()>, timeout: StdDuration) -> Option<JoinHandle<()>> {
    let deadline = StdInstant::now() + timeout;
    while !handle.is_finished() && StdInstant::now() < deadline {
        thread::sleep(STOP_POLL);
    }
    if !handle.is_finished() {
        tracing::warn!(?timeout, "update worker did not stop in time, detaching");
        return Some(handle);
    }
    if handle.join().is_err() {
        tracing::warn!("update worker panicked");
    }
    None
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn wall_clock_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
