//! Prediction sources
//!
//! A source yields the current vehicle-at-stop events in one request.
//! Transport retries happen inside the source; the snapshot fetcher treats
//! any error the same way.

mod wmata;

pub use wmata::{PREDICTIONS_PATH, WmataClient, parse_predictions};

use crate::error::FetchError;
use crate::occupancy::BoardingEvent;

pub trait PredictionSource: Send + Sync {
    /// Fetch every current prediction for all stops
    fn fetch_boarding_events(&self) -> Result<Vec<BoardingEvent>, FetchError>;
}
