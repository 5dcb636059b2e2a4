//! WMATA rail prediction client
//!
//! Fetches `GetPrediction/All` and validates each train record into a
//! [`BoardingEvent`]. Records that fail validation are dropped.

use std::thread;
use std::time::Duration as StdDuration;

use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::Value;

use super::PredictionSource;
use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::occupancy::{BoardingEvent, BoardingStatus};
use crate::palette::normalize_line;

pub const PREDICTIONS_PATH: &str = "/StationPrediction.svc/json/GetPrediction/All";

const API_KEY_HEADER: &str = "api_key";

/// Blocking WMATA client with transport-level retries
#[derive(Debug, Clone)]
pub struct WmataClient {
    http: Client,
    url: String,
    api_key: String,
    retries: u32,
    retry_backoff: f32,
}

impl WmataClient {
    /// Build a client, reading the API key from the configured environment variable
    pub fn new(api: &ApiConfig) -> Result<Self, FetchError> {
        let api_key = std::env::var(&api.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| FetchError::MissingCredentials(api.api_key_env.clone()))?;
        Self::with_api_key(api, api_key)
    }

    pub fn with_api_key(api: &ApiConfig, api_key: impl Into<String>) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(StdDuration::from_secs(api.timeout_secs))
            .build()
            .map_err(transport_error)?;
        Ok(Self {
            http,
            url: format!("{}{}", api.base_url.trim_end_matches('/'), PREDICTIONS_PATH),
            api_key: api_key.into(),
            retries: api.retries,
            retry_backoff: api.retry_backoff_secs,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self) -> Result<String, FetchError> {
        let response = self
            .http
            .get(&self.url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(ACCEPT, "application/json")
            .send()
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response.text().map_err(transport_error)
    }

    /// Delay before retry number `attempt` (1-based)
    fn retry_delay(&self, attempt: u32) -> StdDuration {
        let factor = 2f32.powi(i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX));
        StdDuration::try_from_secs_f32(self.retry_backoff * factor).unwrap_or(StdDuration::ZERO)
    }
}

impl PredictionSource for WmataClient {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    fn fetch_boarding_events(&self) -> Result<Vec<BoardingEvent>, FetchError> {
        let mut attempt = 0;
        loop {
            match self.request() {
                Ok(body) => return parse_predictions(&body),
                Err(err) if err.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    let delay = self.retry_delay(attempt);
                    tracing::debug!(%err, attempt, ?delay, "retrying prediction request");
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn transport_error(err: reqwest::Error) -> FetchError {
    FetchError::Transport {
        retryable: err.is_timeout() || err.is_connect(),
        message: err.to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct PredictionsBody {
    #[serde(rename = "Trains", default)]
    trains: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RawTrain {
    #[serde(rename = "LocationCode", default)]
    location_code: Option<String>,
    #[serde(rename = "LocationCode1", default)]
    location_code_alt: Option<String>,
    #[serde(rename = "Line", default)]
    line: Option<String>,
    #[serde(rename = "LineCode", default)]
    line_code: Option<String>,
    #[serde(rename = "Min", default)]
    min: Option<Value>,
}

impl RawTrain {
    fn into_event(self) -> Option<BoardingEvent> {
        let stop = self
            .location_code
            .filter(|code| !code.trim().is_empty())
            .or(self.location_code_alt)?;
        let stop = stop.trim();
        if stop.is_empty() {
            return None;
        }
        let line = self.line.or(self.line_code).unwrap_or_default();
        let status = match self.min {
            Some(Value::String(raw)) => BoardingStatus::parse(&raw),
            Some(Value::Number(minutes)) => minutes
                .as_u64()
                .and_then(|m| u32::try_from(m).ok())
                .map(BoardingStatus::Minutes)
                .unwrap_or(BoardingStatus::Placeholder),
            _ => BoardingStatus::Placeholder,
        };
        Some(BoardingEvent::new(stop, normalize_line(&line), status))
    }
}

/// Decode a `GetPrediction/All` body into validated events
pub fn parse_predictions(body: &str) -> Result<Vec<BoardingEvent>, FetchError> {
    let body: PredictionsBody =
        serde_json::from_str(body).map_err(|err| FetchError::decode(err.to_string()))?;
    let total = body.trains.len();
    let events: Vec<BoardingEvent> = body
        .trains
        .into_iter()
        .filter_map(|train| serde_json::from_value::<RawTrain>(train).ok())
        .filter_map(RawTrain::into_event)
        .collect();
    if events.len() < total {
        tracing::debug!(dropped = total - events.len(), "dropped malformed predictions");
    }
    Ok(events)
}
