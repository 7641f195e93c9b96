use crate::charts::ChartKey;
use crate::types::DatasetKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Geocoding failed for '{address}': {reason}")]
    GeocodingFailed { address: String, reason: String },

    #[error("Dataset fetch failed ({dataset}): {reason}")]
    DatasetFetchFailed { dataset: DatasetKind, reason: String },

    #[error("Chart render failed ({chart}): {reason}")]
    ChartRenderFailed { chart: ChartKey, reason: String },

    #[error("Narrative service failed: {0}")]
    NarrativeServiceFailed(String),

    #[error("Invalid narrative format: {0}")]
    InvalidNarrativeFormat(String),

    #[error("Narrative schema violation in '{section}': {reason}")]
    NarrativeSchemaViolation { section: String, reason: String },

    #[error("Document assembly failed: {0}")]
    DocumentAssemblyFailed(String),

    #[error("{service} error: {reason}")]
    Upstream { service: &'static str, reason: String },

    #[error("Scratch storage error: {0}")]
    Scratch(#[from] std::io::Error),
}

impl ReportError {
    /// Transport-level failure reported by an external collaborator.
    pub fn upstream(service: &'static str, reason: impl ToString) -> Self {
        Self::Upstream {
            service,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn schema(section: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NarrativeSchemaViolation {
            section: section.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable name, used in logs and HTTP error bodies.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::GeocodingFailed { .. } => "geocoding_failed",
            Self::DatasetFetchFailed { .. } => "dataset_fetch_failed",
            Self::ChartRenderFailed { .. } => "chart_render_failed",
            Self::NarrativeServiceFailed(_) => "narrative_service_failed",
            Self::InvalidNarrativeFormat(_) => "invalid_narrative_format",
            Self::NarrativeSchemaViolation { .. } => "narrative_schema_violation",
            Self::DocumentAssemblyFailed(_) => "document_assembly_failed",
            Self::Upstream { .. } => "upstream_error",
            Self::Scratch(_) => "scratch_storage_error",
        }
    }
}
