mod canvas;
pub mod raster;

pub use raster::RasterChartRenderer;

use crate::acquisition::AcquiredDatasets;
use crate::error::Result;
use crate::types::DatasetKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// The fixed set of charts a report can carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ChartKey {
    RiskBar,
    AqGauges,
    WildfireTs,
    HeatwindScen,
    RecentDaily,
}

impl ChartKey {
    pub const ALL: [ChartKey; 5] = [
        ChartKey::RiskBar,
        ChartKey::AqGauges,
        ChartKey::WildfireTs,
        ChartKey::HeatwindScen,
        ChartKey::RecentDaily,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChartKey::RiskBar => "risk_bar",
            ChartKey::AqGauges => "aq_gauges",
            ChartKey::WildfireTs => "wildfire_ts",
            ChartKey::HeatwindScen => "heatwind_scen",
            ChartKey::RecentDaily => "recent_daily",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Caption printed above the chart image.
    pub fn label(self) -> &'static str {
        match self {
            ChartKey::RiskBar => "Composite Climate Risk Scores",
            ChartKey::AqGauges => "Latest Air Quality Snapshot",
            ChartKey::WildfireTs => "Wildfire Danger Days per Year",
            ChartKey::HeatwindScen => "Heat & Wind Climate Scenarios",
            ChartKey::RecentDaily => "Recent Daily Weather (Last 30 Days)",
        }
    }

    /// The dataset a chart is drawn from. A chart is only rendered when
    /// this dataset was acquired.
    pub fn source(self) -> DatasetKind {
        match self {
            ChartKey::RiskBar => DatasetKind::RiskScore,
            ChartKey::AqGauges => DatasetKind::AirQualityDaily,
            ChartKey::WildfireTs => DatasetKind::WildfireTimeseries,
            ChartKey::HeatwindScen => DatasetKind::HeatWindTimeseries,
            ChartKey::RecentDaily => DatasetKind::HeatWindDaily,
        }
    }
}

impl fmt::Display for ChartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One colour-key row printed under a chart.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub color: [u8; 3],
    pub text: String,
}

impl LegendEntry {
    pub fn new(color: [u8; 3], text: impl Into<String>) -> Self {
        Self {
            color,
            text: text.into(),
        }
    }
}

/// A rendered chart image sitting in request-scoped temporary storage,
/// with the key and axis note the document prints beneath it.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartArtifact {
    pub key: ChartKey,
    pub path: PathBuf,
    pub legend: Vec<LegendEntry>,
    pub note: Option<String>,
}

impl ChartArtifact {
    pub fn new(key: ChartKey, path: impl Into<PathBuf>) -> Self {
        Self {
            key,
            path: path.into(),
            legend: Vec::new(),
            note: None,
        }
    }

    pub fn with_legend(mut self, legend: Vec<LegendEntry>) -> Self {
        self.legend = legend;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Chart key → artifact for one request.
pub type ChartSet = BTreeMap<ChartKey, ChartArtifact>;

/// Turns an acquired dataset into a chart image file.
///
/// Implementations write the image into `dir` and describe it with a
/// [`ChartArtifact`]. `dir` belongs to the current request and is removed
/// when the request finishes, so renderers never clean up after themselves.
pub trait ChartRenderer: Send + Sync {
    fn render(&self, key: ChartKey, datasets: &AcquiredDatasets, dir: &Path)
        -> Result<ChartArtifact>;
}

impl<R: ChartRenderer> ChartRenderer for std::sync::Arc<R> {
    fn render(
        &self,
        key: ChartKey,
        datasets: &AcquiredDatasets,
        dir: &Path,
    ) -> Result<ChartArtifact> {
        (**self).render(key, datasets, dir)
    }
}
