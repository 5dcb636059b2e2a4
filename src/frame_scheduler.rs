//! Frame scheduling and timing utilities.
//!
//! One scheduler iteration: refresh the snapshot when due, render against
//! the (possibly stale) cached snapshot, push the frame to the sink, and
//! work out when the next tick is. The caller is responsible for sleeping.

use core::ops::DerefMut;

use embassy_time::{Duration, Instant};

use crate::fetcher::{FetchOutcome, SnapshotFetcher};
use crate::frame::RenderFrame;
use crate::renderer::{Renderer, Tick};
use crate::sink::{DisplaySink, PushReport, push_frame};
use crate::source::PredictionSource;
use crate::state::RenderState;

/// Default tick length (1 Hz).
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_millis(1000);

/// Result of a frame tick operation.
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub frame: RenderFrame,
    pub fetch: FetchOutcome,
    pub push: PushReport,
    /// The deadline for the next frame.
    pub next_deadline: Instant,
    /// How long to wait until the next frame (may be zero if behind schedule).
    pub sleep_duration: Duration,
}

/// Single-threaded scheduling loop body
///
/// Owns the fetcher, the renderer and the render state. Fetch and render
/// cadences are decoupled: fetches happen when the fetcher says so, renders
/// happen every tick.
pub struct FrameScheduler<S: ?Sized> {
    fetcher: SnapshotFetcher<S>,
    renderer: Renderer,
    state: RenderState,
    next_frame: Instant,
    frame_duration: Duration,
}

impl<S: PredictionSource + ?Sized> FrameScheduler<S> {
    /// Create a new frame scheduler with a 1 Hz tick.
    pub fn new(fetcher: SnapshotFetcher<S>, renderer: Renderer) -> Self {
        Self::with_frame_duration(fetcher, renderer, DEFAULT_FRAME_DURATION)
    }

    pub fn with_frame_duration(fetcher: SnapshotFetcher<S>, renderer: Renderer, frame_duration: Duration) -> Self {
        Self {
            fetcher,
            renderer,
            state: RenderState::new(),
            next_frame: Instant::from_millis(0),
            frame_duration,
        }
    }

    /// Fetch when due and raise the staleness warning if needed
    pub fn refresh(&mut self, now: Instant) -> FetchOutcome {
        let outcome = self.fetcher.refresh_if_due(now);
        self.fetcher.check_staleness(now);
        outcome
    }

    /// Render the cached snapshot
    pub fn render(&mut self, tick: Tick) -> RenderFrame {
        self.renderer
            .render(tick, self.fetcher.snapshot(), &mut self.state)
    }

    /// Advance the deadline and return it with the time left until then
    ///
    /// If we've fallen more than two frames behind, the deadline resets to
    /// `now` instead of bursting to catch up.
    pub fn schedule_next(&mut self, now: Instant) -> (Instant, Duration) {
        let max_drift_ms = self.frame_duration.as_millis() * 2;
        if now.as_millis() > self.next_frame.as_millis() + max_drift_ms {
            self.next_frame = now;
        }

        self.next_frame += self.frame_duration;

        let sleep_duration = if self.next_frame.as_millis() > now.as_millis() {
            Duration::from_millis(self.next_frame.as_millis() - now.as_millis())
        } else {
            Duration::from_millis(0)
        };
        (self.next_frame, sleep_duration)
    }

    /// Run one complete iteration against a sink
    pub fn tick<D: DisplaySink + ?Sized>(&mut self, tick: Tick, sink: &mut D) -> FrameResult {
        let (fetch, frame) = self.prepare(tick);
        let push = push_frame(sink, &frame);
        self.finish(tick, fetch, frame, push)
    }

    /// Run one iteration, pushing through the sink `acquire` hands out
    ///
    /// `acquire` runs after fetch and render, right before the push. When it
    /// returns `None` nothing is pushed or scheduled and `None` comes back.
    pub fn tick_with<D, G>(&mut self, tick: Tick, acquire: impl FnOnce() -> Option<G>) -> Option<FrameResult>
    where
        D: DisplaySink + ?Sized,
        G: DerefMut<Target = D>,
    {
        let (fetch, frame) = self.prepare(tick);
        let push = {
            let mut sink = acquire()?;
            push_frame(&mut *sink, &frame)
        };
        Some(self.finish(tick, fetch, frame, push))
    }

    fn prepare(&mut self, tick: Tick) -> (FetchOutcome, RenderFrame) {
        let fetch = self.refresh(tick.now);
        let frame = self.render(tick);
        (fetch, frame)
    }

    fn finish(&mut self, tick: Tick, fetch: FetchOutcome, frame: RenderFrame, push: PushReport) -> FrameResult {
        let (next_deadline, sleep_duration) = self.schedule_next(tick.now);
        FrameResult {
            frame,
            fetch,
            push,
            next_deadline,
            sleep_duration,
        }
    }

    pub fn fetcher(&self) -> &SnapshotFetcher<S> {
        &self.fetcher
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub const fn frame_duration(&self) -> Duration {
        self.frame_duration
    }
}
