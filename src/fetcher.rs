//! Per-gauge fetch against the DWR telemetry time series API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::client::{FetchError, RetryingClient, Transport};
use crate::gauges::GaugeTarget;

/// Terminal outcome of one gauge fetch within a scrape cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Latest discharge reading, in cubic feet per second.
    Success(f64),
    Failure(FailureReason),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }

    /// The reading on success, NaN on failure. Failed gauges are exported
    /// with an explicit NaN value rather than omitted.
    pub fn exposition_value(&self) -> f64 {
        match self {
            FetchOutcome::Success(v) => *v,
            FetchOutcome::Failure(_) => f64::NAN,
        }
    }
}

/// Why a gauge fetch failed.
///
/// `NoData` and `Parse` are kept distinct from transport failures
/// internally, but all three count as plain failures in the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// Transport-level failure, after retries.
    Fetch(FetchError),
    /// Upstream responded with an empty reading list.
    NoData,
    /// Upstream body was not usable. Not retried; the failure is not
    /// transport-transient.
    Parse(String),
    /// The worker task died before producing an outcome.
    Internal(String),
}

/// Fetches the current value for one gauge. Seam between the scrape
/// orchestrator and the upstream API; tests drive the orchestrator with a
/// fake implementation.
#[async_trait]
pub trait FetchGauge: Send + Sync {
    async fn fetch_value(&self, target: &GaugeTarget) -> FetchOutcome;
}

/// Upstream response shape: a list of timestamped readings, chronologically
/// ordered, of which the last is current.
#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(rename = "ResultList", default)]
    result_list: Vec<Reading>,
}

#[derive(Debug, Deserialize)]
struct Reading {
    /// The API serves this as either a JSON number or a numeric string.
    #[serde(rename = "measValue", default)]
    meas_value: Option<serde_json::Value>,
}

/// DWR telemetry fetcher: builds the time series request for a gauge and
/// extracts the latest discharge value from the response.
pub struct DwrFetcher<T: Transport> {
    client: RetryingClient<T>,
    base_url: String,
}

impl<T: Transport> DwrFetcher<T> {
    pub fn new(client: RetryingClient<T>, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Time series request for a station: trailing 10-day window, discharge
    /// parameter only.
    fn request_url(&self, abbrev: &str) -> String {
        format!(
            "{}?abbrev={}&min-modified=-10days&parameter=DISCHRG",
            self.base_url, abbrev
        )
    }
}

#[async_trait]
impl<T: Transport + 'static> FetchGauge for DwrFetcher<T> {
    async fn fetch_value(&self, target: &GaugeTarget) -> FetchOutcome {
        let url = self.request_url(&target.abbrev);

        let body = match self.client.get(&url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(gauge = %target.id, abbrev = %target.abbrev, error = %e, "Fetch failed");
                return FetchOutcome::Failure(FailureReason::Fetch(e));
            }
        };

        let outcome = parse_latest_value(&body);
        if let FetchOutcome::Failure(reason) = &outcome {
            tracing::warn!(gauge = %target.id, abbrev = %target.abbrev, ?reason, "No usable reading");
        }
        outcome
    }
}

/// Extract the latest reading's value from a time series response body.
fn parse_latest_value(body: &str) -> FetchOutcome {
    let response: TimeSeriesResponse = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => return FetchOutcome::Failure(FailureReason::Parse(e.to_string())),
    };

    let Some(latest) = response.result_list.last() else {
        return FetchOutcome::Failure(FailureReason::NoData);
    };

    match &latest.meas_value {
        Some(serde_json::Value::Number(n)) => match n.as_f64() {
            Some(v) => FetchOutcome::Success(v),
            None => FetchOutcome::Failure(FailureReason::Parse(format!(
                "measValue out of range: {n}"
            ))),
        },
        Some(serde_json::Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(v) => FetchOutcome::Success(v),
            Err(_) => FetchOutcome::Failure(FailureReason::Parse(format!(
                "non-numeric measValue: {s:?}"
            ))),
        },
        Some(other) => FetchOutcome::Failure(FailureReason::Parse(format!(
            "unexpected measValue type: {other}"
        ))),
        None => FetchOutcome::Failure(FailureReason::Parse("missing measValue".to_string())),
    }
}
