//! Concurrent dataset acquisition.
//!
//! Every lookup in a batch runs concurrently under its own timeout. The batch
//! always settles to one result per operation, in submission order: a failed,
//! timed-out or panicking lookup becomes a failure entry and never takes its
//! siblings down with it.

use crate::error::{ReportError, Result};
use crate::types::{
    AirQualitySeries, Coordinates, Dataset, DatasetKind, FloodZone, HeatWindDaily,
    HeatWindTimeseries, RiskScore, WildfireCurrent, WildfireTimeseries,
};
use async_trait::async_trait;
use futures::future::{join_all, FutureExt};
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

/// Read-only risk-data lookups keyed by location.
#[async_trait]
pub trait RiskDataProvider: Send + Sync {
    /// Fetch and decode one dataset. The returned dataset must be of `kind`.
    async fn fetch(&self, kind: DatasetKind, at: Coordinates) -> Result<Dataset>;
}

#[async_trait]
impl<P: RiskDataProvider> RiskDataProvider for std::sync::Arc<P> {
    async fn fetch(&self, kind: DatasetKind, at: Coordinates) -> Result<Dataset> {
        (**self).fetch(kind, at).await
    }
}

/// Why one operation in a batch produced no value.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchFailure {
    TimedOut(Duration),
    Failed(String),
    Panicked,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::TimedOut(d) => write!(f, "timed out after {}ms", d.as_millis()),
            FetchFailure::Failed(reason) => f.write_str(reason),
            FetchFailure::Panicked => f.write_str("operation panicked"),
        }
    }
}

/// Run every operation concurrently, each bounded by `timeout`.
///
/// Returns exactly `operations.len()` results in the order given.
pub async fn gather<T, E, F>(
    operations: Vec<F>,
    timeout: Duration,
) -> Vec<std::result::Result<T, FetchFailure>>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: fmt::Display,
{
    let guarded = operations.into_iter().map(|op| async move {
        match AssertUnwindSafe(tokio::time::timeout(timeout, op))
            .catch_unwind()
            .await
        {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(FetchFailure::Failed(e.to_string())),
            Ok(Err(_elapsed)) => Err(FetchFailure::TimedOut(timeout)),
            Err(_panic) => Err(FetchFailure::Panicked),
        }
    });
    join_all(guarded).await
}

/// One settled dataset lookup.
#[derive(Debug)]
pub struct FetchOutcome {
    pub kind: DatasetKind,
    pub result: Result<Dataset>,
}

impl FetchOutcome {
    pub fn success(kind: DatasetKind, dataset: Dataset) -> Self {
        Self {
            kind,
            result: Ok(dataset),
        }
    }

    pub fn failure(kind: DatasetKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            result: Err(ReportError::DatasetFetchFailed {
                dataset: kind,
                reason: reason.into(),
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Every dataset lookup made for one report, successes and failures alike.
#[derive(Debug, Default)]
pub struct AcquiredDatasets {
    outcomes: Vec<FetchOutcome>,
}

impl AcquiredDatasets {
    pub fn from_outcomes(outcomes: Vec<FetchOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[FetchOutcome] {
        &self.outcomes
    }

    pub fn get(&self, kind: DatasetKind) -> Option<&Dataset> {
        self.outcomes
            .iter()
            .find(|o| o.kind == kind)
            .and_then(|o| o.result.as_ref().ok())
    }

    pub fn is_available(&self, kind: DatasetKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn available(&self) -> Vec<DatasetKind> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.kind)
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (DatasetKind, &ReportError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.kind, e)))
    }

    pub fn risk_score(&self) -> Option<&RiskScore> {
        match self.get(DatasetKind::RiskScore)? {
            Dataset::RiskScore(v) => Some(v),
            _ => None,
        }
    }

    pub fn air_quality_daily(&self) -> Option<&AirQualitySeries> {
        match self.get(DatasetKind::AirQualityDaily)? {
            Dataset::AirQualityDaily(v) => Some(v),
            _ => None,
        }
    }

    pub fn flood_zone(&self) -> Option<&FloodZone> {
        match self.get(DatasetKind::FloodZone)? {
            Dataset::FloodZone(v) => Some(v),
            _ => None,
        }
    }

    pub fn wildfire_current(&self) -> Option<&WildfireCurrent> {
        match self.get(DatasetKind::WildfireCurrent)? {
            Dataset::WildfireCurrent(v) => Some(v),
            _ => None,
        }
    }

    pub fn wildfire_timeseries(&self) -> Option<&WildfireTimeseries> {
        match self.get(DatasetKind::WildfireTimeseries)? {
            Dataset::WildfireTimeseries(v) => Some(v),
            _ => None,
        }
    }

    pub fn heat_wind_daily(&self) -> Option<&HeatWindDaily> {
        match self.get(DatasetKind::HeatWindDaily)? {
            Dataset::HeatWindDaily(v) => Some(v),
            _ => None,
        }
    }

    pub fn heat_wind_timeseries(&self) -> Option<&HeatWindTimeseries> {
        match self.get(DatasetKind::HeatWindTimeseries)? {
            Dataset::HeatWindTimeseries(v) => Some(v),
            _ => None,
        }
    }
}

/// Fetch `kinds` at `at` concurrently. Failures are recorded, never returned.
pub async fn acquire<P>(
    provider: &P,
    at: Coordinates,
    kinds: &[DatasetKind],
    timeout: Duration,
) -> AcquiredDatasets
where
    P: RiskDataProvider + ?Sized,
{
    let operations: Vec<_> = kinds
        .iter()
        .map(|&kind| async move {
            let dataset = provider.fetch(kind, at).await?;
            if dataset.kind() != kind {
                return Err(ReportError::upstream(
                    "provider",
                    format!("expected {} payload, got {}", kind, dataset.kind()),
                ));
            }
            Ok::<_, ReportError>(dataset)
        })
        .collect();

    let results = gather(operations, timeout).await;

    let outcomes = kinds
        .iter()
        .zip(results)
        .map(|(&kind, result)| match result {
            Ok(dataset) => FetchOutcome::success(kind, dataset),
            Err(failure) => {
                log::warn!("Dataset {} unavailable: {}", kind, failure);
                FetchOutcome::failure(kind, failure.to_string())
            }
        })
        .collect();

    AcquiredDatasets::from_outcomes(outcomes)
}
