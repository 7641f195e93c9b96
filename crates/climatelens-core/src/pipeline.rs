//! Report coordinator.
//!
//! One call to [`ReportPipeline::generate`] walks a single address through
//! geocoding, dataset acquisition, chart rendering, narrative generation and
//! validation, and PDF assembly. Stages run strictly in sequence; only the
//! dataset lookups inside acquisition run concurrently.

use crate::acquisition::{acquire, AcquiredDatasets, RiskDataProvider};
use crate::charts::{ChartKey, ChartRenderer, ChartSet};
use crate::document::{DocumentBuilder, DocumentConfig, RenderedDocument};
use crate::error::{ReportError, Result};
use crate::narrative::{validate, Narrative, NarrativeContext, NarrativeService};
use crate::preview::{ClimatePreview, PREVIEW_BATCH};
use crate::types::{Coordinates, DatasetKind};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Resolves a free-form address to a location.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` means the address matched nothing.
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>>;
}

#[async_trait]
impl<G: Geocoder> Geocoder for std::sync::Arc<G> {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>> {
        (**self).geocode(address).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Per-lookup timeout for each dataset fetch.
    pub fetch_timeout: Duration,
    pub geocode_timeout: Duration,
    pub narrative_timeout: Duration,
    /// Parent directory for per-request scratch space. System temp dir when unset.
    pub scratch_root: Option<PathBuf>,
    pub document: DocumentConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(20),
            geocode_timeout: Duration::from_secs(10),
            narrative_timeout: Duration::from_secs(120),
            scratch_root: None,
            document: DocumentConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_geocode_timeout(mut self, timeout: Duration) -> Self {
        self.geocode_timeout = timeout;
        self
    }

    pub fn with_narrative_timeout(mut self, timeout: Duration) -> Self {
        self.narrative_timeout = timeout;
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn with_document(mut self, document: DocumentConfig) -> Self {
        self.document = document;
        self
    }
}

/// Coordinator states. `Failed` is reachable from every other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Geocoding,
    Acquiring,
    Rendering,
    Narrating,
    Validating,
    Building,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A finished report. Chart artifacts are gone by the time this is returned;
/// only their keys remain.
#[derive(Debug, Clone)]
pub struct Report {
    pub request_id: Uuid,
    pub address: String,
    pub coordinates: Coordinates,
    pub narrative: Narrative,
    pub document: RenderedDocument,
    /// Charts that rendered successfully, whether or not the narrative used them.
    pub charts: Vec<ChartKey>,
    pub failed_datasets: Vec<DatasetKind>,
}

impl Report {
    /// Download name derived from the address.
    pub fn file_name(&self) -> String {
        report_file_name(&self.address)
    }
}

/// `{address}_ClimateReport.pdf`, with whitespace and path separators
/// replaced by underscores.
pub fn report_file_name(address: &str) -> String {
    let stem: String = address
        .trim()
        .chars()
        .map(|c| match c {
            c if c.is_whitespace() => '_',
            '/' | '\\' | ':' | '"' | '*' | '?' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{}_ClimateReport.pdf", stem)
}

pub struct ReportPipeline<G, P, N, R>
where
    G: Geocoder,
    P: RiskDataProvider,
    N: NarrativeService,
    R: ChartRenderer,
{
    geocoder: G,
    provider: P,
    narrator: N,
    renderer: R,
    builder: DocumentBuilder,
    config: PipelineConfig,
}

impl<G, P, N, R> ReportPipeline<G, P, N, R>
where
    G: Geocoder,
    P: RiskDataProvider,
    N: NarrativeService,
    R: ChartRenderer,
{
    pub fn new(geocoder: G, provider: P, narrator: N, renderer: R, config: PipelineConfig) -> Self {
        Self {
            geocoder,
            provider,
            narrator,
            renderer,
            builder: DocumentBuilder::new(config.document.clone()),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Produce the full PDF report for `address`.
    ///
    /// Chart artifacts are written to a request-scoped scratch directory that
    /// is removed before this returns, on success and on every error path.
    pub async fn generate(&self, address: &str) -> Result<Report> {
        let request_id = Uuid::now_v7();
        let started = Instant::now();
        log::info!("[{}] Report requested for '{}'", request_id, address);

        let result = self.run(request_id, address).await;
        match &result {
            Ok(report) => log::info!(
                "[{}] {} in {:?}: {} pages, charts {:?}, failed datasets {:?}",
                request_id,
                Stage::Done,
                started.elapsed(),
                report.document.page_count(),
                report.charts,
                report.failed_datasets,
            ),
            Err(e) => log::error!(
                "[{}] {} after {:?}: {}",
                request_id,
                Stage::Failed,
                started.elapsed(),
                e
            ),
        }
        result
    }

    async fn run(&self, request_id: Uuid, address: &str) -> Result<Report> {
        enter(request_id, Stage::Geocoding);
        let coordinates = self.locate(address).await?;

        let scratch = self.scratch_dir()?;
        log::debug!("[{}] Scratch directory {}", request_id, scratch.path().display());

        let outcome = self
            .produce(request_id, address, coordinates, scratch.path())
            .await;

        let path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            log::warn!("[{}] Failed to remove {}: {}", request_id, path.display(), e);
        }
        outcome
    }

    async fn produce(
        &self,
        request_id: Uuid,
        address: &str,
        coordinates: Coordinates,
        dir: &Path,
    ) -> Result<Report> {
        enter(request_id, Stage::Acquiring);
        let datasets = acquire(
            &self.provider,
            coordinates,
            &DatasetKind::REPORT_BATCH,
            self.config.fetch_timeout,
        )
        .await;
        let failed_datasets: Vec<DatasetKind> = datasets.failures().map(|(k, _)| k).collect();

        enter(request_id, Stage::Rendering);
        let charts = self.render_charts(request_id, &datasets, dir);
        let rendered: Vec<ChartKey> = charts.keys().copied().collect();

        enter(request_id, Stage::Narrating);
        let context = NarrativeContext::from_datasets(address, coordinates, &datasets, &rendered);
        let raw = self.narrate(&context).await?;

        enter(request_id, Stage::Validating);
        let narrative = validate(&raw, &ChartKey::ALL)?;

        enter(request_id, Stage::Building);
        let document = self.builder.build(address, &narrative, &charts)?;

        Ok(Report {
            request_id,
            address: address.to_string(),
            coordinates,
            narrative,
            document,
            charts: rendered,
            failed_datasets,
        })
    }

    /// Lightweight summary: geocode plus the three scoring lookups. No
    /// charts, narrative or scratch storage.
    pub async fn preview(&self, address: &str) -> Result<ClimatePreview> {
        let request_id = Uuid::now_v7();
        enter(request_id, Stage::Geocoding);
        let coordinates = self.locate(address).await?;

        enter(request_id, Stage::Acquiring);
        let datasets = acquire(
            &self.provider,
            coordinates,
            &PREVIEW_BATCH,
            self.config.fetch_timeout,
        )
        .await;
        Ok(ClimatePreview::from_datasets(address, &datasets))
    }

    async fn locate(&self, address: &str) -> Result<Coordinates> {
        let failed = |reason: String| ReportError::GeocodingFailed {
            address: address.to_string(),
            reason,
        };
        match tokio::time::timeout(self.config.geocode_timeout, self.geocoder.geocode(address)).await
        {
            Ok(Ok(Some(coordinates))) => Ok(coordinates),
            Ok(Ok(None)) => Err(failed("no matching location".into())),
            Ok(Err(e @ ReportError::GeocodingFailed { .. })) => Err(e),
            Ok(Err(e)) => Err(failed(e.to_string())),
            Err(_) => Err(failed(format!(
                "timed out after {}ms",
                self.config.geocode_timeout.as_millis()
            ))),
        }
    }

    /// Render every chart whose source dataset was acquired. A chart that
    /// fails to render is logged and left out.
    fn render_charts(&self, request_id: Uuid, datasets: &AcquiredDatasets, dir: &Path) -> ChartSet {
        let mut charts = ChartSet::new();
        for key in ChartKey::ALL {
            if !datasets.is_available(key.source()) {
                log::debug!("[{}] Skipping chart {}: {} unavailable", request_id, key, key.source());
                continue;
            }
            match self.renderer.render(key, datasets, dir) {
                Ok(artifact) => {
                    charts.insert(key, artifact);
                }
                Err(e) => log::warn!("[{}] Chart {} dropped: {}", request_id, key, e),
            }
        }
        charts
    }

    async fn narrate(&self, context: &NarrativeContext) -> Result<String> {
        match tokio::time::timeout(self.config.narrative_timeout, self.narrator.generate(context))
            .await
        {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(e @ ReportError::NarrativeServiceFailed(_))) => Err(e),
            Ok(Err(e)) => Err(ReportError::NarrativeServiceFailed(e.to_string())),
            Err(_) => Err(ReportError::NarrativeServiceFailed(format!(
                "timed out after {}ms",
                self.config.narrative_timeout.as_millis()
            ))),
        }
    }

    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("climatelens-");
        let dir = match &self.config.scratch_root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

fn enter(request_id: Uuid, stage: Stage) {
    log::info!("[{}] Stage {}", request_id, stage);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_replaces_separators() {
        assert_eq!(
            report_file_name("10 Downing St, London"),
            "10_Downing_St,_London_ClimateReport.pdf"
        );
        assert_eq!(report_file_name(" a/b\\c "), "a_b_c_ClimateReport.pdf");
    }

    #[test]
    fn test_config_builders() {
        let config = PipelineConfig::default()
            .with_fetch_timeout(Duration::from_secs(3))
            .with_scratch_root("/var/tmp/climatelens");
        assert_eq!(config.fetch_timeout, Duration::from_secs(3));
        assert_eq!(config.scratch_root, Some(PathBuf::from("/var/tmp/climatelens")));
        assert_eq!(config.geocode_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Validating.to_string(), "Validating");
    }
}
