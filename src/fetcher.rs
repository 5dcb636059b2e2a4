//! Snapshot fetcher
//!
//! Pulls predictions on a slow cadence and keeps the last good
//! [`StopOccupancy`]. Failures back off linearly (capped) and never touch
//! the cached snapshot, so rendering carries on from stale data.

use std::sync::Arc;

use embassy_time::{Duration, Instant};

use crate::error::FetchError;
use crate::occupancy::StopOccupancy;
use crate::palette::LinePalette;
use crate::source::PredictionSource;

/// Fetch cadence, backoff and staleness thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// Delay between successful fetches
    pub ttl: Duration,
    /// Backoff grows by this much per consecutive failure
    pub backoff_step: Duration,
    pub backoff_cap: Duration,
    /// Silence after which the data counts as stale
    pub stale_after: Duration,
    /// Minimum spacing of staleness warnings
    pub stale_warn_interval: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
            backoff_step: Duration::from_secs(30),
            backoff_cap: Duration::from_secs(300),
            stale_after: Duration::from_secs(300),
            stale_warn_interval: Duration::from_secs(30),
        }
    }
}

impl FetchPolicy {
    /// Delay before the next attempt after `failures` consecutive failures
    pub fn backoff(&self, failures: u32) -> Duration {
        let linear = self
            .backoff_step
            .as_millis()
            .saturating_mul(u64::from(failures));
        Duration::from_millis(linear.min(self.backoff_cap.as_millis()))
    }
}

/// What a refresh attempt did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Next fetch is not due yet
    NotDue,
    Refreshed { boarding_stops: usize },
    Failed { failures: u32, retry_in: Duration },
}

pub struct SnapshotFetcher<S: ?Sized> {
    source: Arc<S>,
    palette: Arc<LinePalette>,
    policy: FetchPolicy,

    snapshot: StopOccupancy,
    failures: u32,
    next_fetch_at: Instant,
    last_success: Option<Instant>,
    started_at: Instant,
    next_warn_at: Instant,
}

impl<S: PredictionSource + ?Sized> SnapshotFetcher<S> {
    /// Create a fetcher whose first fetch is due immediately
    pub fn new(source: Arc<S>, palette: Arc<LinePalette>, policy: FetchPolicy, now: Instant) -> Self {
        Self {
            source,
            palette,
            policy,
            snapshot: StopOccupancy::new(),
            failures: 0,
            next_fetch_at: now,
            last_success: None,
            started_at: now,
            next_warn_at: now,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_fetch_at
    }

    /// Fetch now, regardless of schedule
    ///
    /// On success the snapshot is replaced and the failure count reset; on
    /// failure the previous snapshot is kept and the next attempt is pushed
    /// out by the backoff.
    #[tracing::instrument(skip(self), fields(failures = self.failures))]
    pub fn fetch(&mut self, now: Instant) -> Result<&StopOccupancy, FetchError> {
        match self.source.fetch_boarding_events() {
            Ok(events) => {
                let snapshot = StopOccupancy::from_events(&events, &self.palette).fetched_at(now);
                tracing::info!(
                    predictions = events.len(),
                    boarding_stops = snapshot.len(),
                    "fetched station predictions"
                );
                self.snapshot = snapshot;
                self.failures = 0;
                self.last_success = Some(now);
                self.next_fetch_at = now + self.policy.ttl;
                Ok(&self.snapshot)
            }
            Err(err) => {
                self.failures = self.failures.saturating_add(1);
                let retry_in = self.policy.backoff(self.failures);
                self.next_fetch_at = now + retry_in;
                tracing::error!(%err, "failed to fetch predictions");
                tracing::warn!(
                    retry_in_secs = retry_in.as_secs(),
                    failures = self.failures,
                    "retrying prediction fetch later"
                );
                Err(err)
            }
        }
    }

    /// Fetch if the schedule says so
    pub fn refresh_if_due(&mut self, now: Instant) -> FetchOutcome {
        if !self.is_due(now) {
            return FetchOutcome::NotDue;
        }
        let fetched = self.fetch(now).map(StopOccupancy::len);
        match fetched {
            Ok(boarding_stops) => FetchOutcome::Refreshed { boarding_stops },
            Err(_) => FetchOutcome::Failed {
                failures: self.failures,
                retry_in: self.policy.backoff(self.failures),
            },
        }
    }

    /// Last good snapshot (empty before the first success)
    pub fn snapshot(&self) -> &StopOccupancy {
        &self.snapshot
    }

    pub fn since_last_success(&self, now: Instant) -> Option<Duration> {
        self.last_success.map(|at| elapsed(at, now))
    }

    pub const fn last_success(&self) -> Option<Instant> {
        self.last_success
    }

    /// Time without a successful fetch, counted from startup if none yet
    pub fn silence(&self, now: Instant) -> Duration {
        elapsed(self.last_success.unwrap_or(self.started_at), now)
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        self.silence(now) > self.policy.stale_after
    }

    /// Emit the rate-limited staleness warning; returns whether it fired
    pub fn check_staleness(&mut self, now: Instant) -> bool {
        if !self.is_stale(now) || now < self.next_warn_at {
            return false;
        }
        tracing::warn!(
            silence_secs = self.silence(now).as_secs(),
            "no successful prediction fetch in {} seconds",
            self.policy.stale_after.as_secs()
        );
        self.next_warn_at = now + self.policy.stale_warn_interval;
        true
    }

    pub const fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub const fn next_fetch_at(&self) -> Instant {
        self.next_fetch_at
    }

    pub const fn policy(&self) -> &FetchPolicy {
        &self.policy
    }
}

fn elapsed(since: Instant, now: Instant) -> Duration {
    Duration::from_millis(now.as_millis().saturating_sub(since.as_millis()))
}
