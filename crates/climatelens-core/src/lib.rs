pub mod error;
pub mod types;
pub mod acquisition;
pub mod charts;
pub mod narrative;
pub mod document;
pub mod preview;
pub mod pipeline;

pub use error::{ReportError, Result};
pub use types::*;
pub use acquisition::{acquire, gather, AcquiredDatasets, FetchFailure, FetchOutcome, RiskDataProvider};
pub use charts::{
    ChartArtifact, ChartKey, ChartRenderer, ChartSet, LegendEntry, RasterChartRenderer,
};
pub use narrative::{
    extract_json_object, validate, Narrative, NarrativeContext, NarrativeService, Section,
    SectionKey, Subsection,
};
pub use document::{
    DocumentBuilder, DocumentConfig, FontSource, PageGeometry, PageRole, RenderedDocument,
};
pub use preview::{ClimatePreview, RiskItem, RiskLevel};
pub use pipeline::{report_file_name, Geocoder, PipelineConfig, Report, ReportPipeline, Stage};
