use async_trait::async_trait;
use climatelens_core::*;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeGeocoder;

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, address: &str) -> Result<Option<Coordinates>> {
        if address.contains("Nonexistent") {
            return Ok(None);
        }
        Ok(Some(Coordinates::new(51.5034, -0.1276)))
    }
}

struct FakeProvider {
    available: Vec<DatasetKind>,
    calls: AtomicUsize,
}

impl FakeProvider {
    fn serving(available: &[DatasetKind]) -> Self {
        Self {
            available: available.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn payload(kind: DatasetKind) -> serde_json::Value {
    match kind {
        DatasetKind::RiskScore => {
            json!({"scores": {"air_quality": 2.4, "flood_risk": 6.8, "wildfire_risk": 1.2}})
        }
        DatasetKind::AirQualityDaily | DatasetKind::AirQualityMonthly => json!([
            {"date": "2024-05-01", "air_quality_index": 38.0, "pm2_5": 7.5},
            {"date": "2024-05-02", "air_quality_index": 42.0, "pm2_5": 8.1}
        ]),
        DatasetKind::FloodZone => json!({"flood_zone": true}),
        DatasetKind::WildfireCurrent => json!({"properties": {"fire_risk_class": "very low"}}),
        DatasetKind::WildfireTimeseries => json!({"wildfire_risk_timeseries_data": {
            "2030": {"low": 200.0, "high": 3.0, "latitude": 51.5, "longitude": -0.1},
            "2040": {"low": 190.0, "high": 5.0, "latitude": 51.5, "longitude": -0.1}
        }}),
        DatasetKind::HeatWindDaily => json!({"heat_wind_daily_data": [
            {"date": "2024-05-01", "temperature": 14.0, "wind_speed": 4.0},
            {"date": "2024-05-02", "temperature": 16.0, "wind_speed": 3.0}
        ]}),
        DatasetKind::HeatWindTimeseries => json!({"heat_wind_timeseries_data": [
            {"year": 2030, "heatwaves_rcp45": 2.0},
            {"year": 2040, "heatwaves_rcp45": 4.0}
        ]}),
    }
}

#[async_trait]
impl RiskDataProvider for FakeProvider {
    async fn fetch(&self, kind: DatasetKind, _at: Coordinates) -> Result<Dataset> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available.contains(&kind) {
            return Err(ReportError::upstream("provider", "HTTP 503 Service Unavailable"));
        }
        Dataset::from_json(kind, payload(kind)).map_err(|e| ReportError::upstream("provider", e))
    }
}

struct FakeNarrator {
    response: std::result::Result<String, String>,
    seen: Mutex<Option<NarrativeContext>>,
}

impl FakeNarrator {
    fn replying(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            seen: Mutex::new(None),
        }
    }

    fn failing(reason: &str) -> Self {
        Self {
            response: Err(reason.to_string()),
            seen: Mutex::new(None),
        }
    }

    fn context(&self) -> Option<NarrativeContext> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl NarrativeService for FakeNarrator {
    async fn generate(&self, context: &NarrativeContext) -> Result<String> {
        *self.seen.lock().unwrap() = Some(context.clone());
        self.response
            .clone()
            .map_err(|e| ReportError::upstream("narrative", e))
    }
}

/// Renders with the raster renderer but always fails for one key.
struct FlakyRenderer {
    inner: RasterChartRenderer,
    broken: ChartKey,
}

impl ChartRenderer for FlakyRenderer {
    fn render(
        &self,
        key: ChartKey,
        datasets: &AcquiredDatasets,
        dir: &Path,
    ) -> Result<ChartArtifact> {
        if key == self.broken {
            return Err(ReportError::ChartRenderFailed {
                chart: key,
                reason: "renderer crashed".into(),
            });
        }
        self.inner.render(key, datasets, dir)
    }
}

fn narrative_json() -> String {
    let sub = |charts: serde_json::Value| {
        json!([{
            "subtitle": "Key Findings",
            "paragraphs": ["The property shows moderate exposure overall.", "Flood risk dominates."],
            "bullets": ["Elevated flood score", "Low wildfire exposure", "Good air quality"],
            "charts": charts
        }])
    };
    let body = json!({
        "executive_summary": {"title": "Executive Summary", "subsections": sub(json!(["risk_bar"]))},
        "market_analysis": {"title": "Market Analysis", "subsections": sub(json!(["wildfire_ts", "heatwind_scen", "risk_bar"]))},
        "climate_and_esg_risks": {"title": "Climate and ESG Risks", "subsections": sub(json!(["aq_gauges", "recent_daily"]))},
        "final_verdict": {"title": "Final Verdict", "subsections": sub(json!([]))}
    });
    format!("<think>Drafting the {{report}} now.</think>\nHere is the report:\n{}\nDone.", body)
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

type TestPipeline<R> = ReportPipeline<FakeGeocoder, Arc<FakeProvider>, Arc<FakeNarrator>, R>;

fn pipeline<R: ChartRenderer>(
    provider: &Arc<FakeProvider>,
    narrator: &Arc<FakeNarrator>,
    renderer: R,
    scratch: &TempDir,
) -> TestPipeline<R> {
    init_logging();
    let config = PipelineConfig::default()
        .with_fetch_timeout(Duration::from_secs(2))
        .with_scratch_root(scratch.path());
    ReportPipeline::new(FakeGeocoder, provider.clone(), narrator.clone(), renderer, config)
}

fn small_renderer() -> RasterChartRenderer {
    RasterChartRenderer::new().with_size(160, 100)
}

fn scratch_is_empty(scratch: &TempDir) -> bool {
    std::fs::read_dir(scratch.path()).unwrap().next().is_none()
}

/// The output must load in an independent PDF reader with one parsed page
/// per recorded role, each with a decodable content stream.
fn assert_decodes(document: &RenderedDocument) {
    assert!(document.bytes.starts_with(b"%PDF-"));
    let parsed = lopdf::Document::load_mem(&document.bytes).unwrap();
    let pages = parsed.get_pages();
    assert_eq!(pages.len(), document.pages.len());
    for (number, id) in pages {
        let content = parsed.get_and_decode_page_content(id).unwrap();
        assert!(!content.operations.is_empty(), "page {} is blank", number);
    }
}

const PARTIAL: [DatasetKind; 3] = [
    DatasetKind::RiskScore,
    DatasetKind::AirQualityDaily,
    DatasetKind::WildfireCurrent,
];

// ── Partial acquisition ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_partial_failure_still_produces_report() {
    let scratch = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::serving(&PARTIAL));
    let narrator = Arc::new(FakeNarrator::replying(narrative_json()));
    let pipeline = pipeline(&provider, &narrator, small_renderer(), &scratch);

    let report = pipeline.generate("10 Downing Street, London").await.unwrap();

    assert_eq!(provider.calls(), 7);
    assert_eq!(report.charts, vec![ChartKey::RiskBar, ChartKey::AqGauges]);
    assert_eq!(
        report.failed_datasets,
        vec![
            DatasetKind::FloodZone,
            DatasetKind::WildfireTimeseries,
            DatasetKind::HeatWindDaily,
            DatasetKind::HeatWindTimeseries,
        ]
    );
    assert_eq!(
        report.document.pages,
        vec![
            PageRole::Cover,
            PageRole::Section(SectionKey::ExecutiveSummary),
            PageRole::Chart(ChartKey::RiskBar),
            PageRole::Section(SectionKey::MarketAnalysis),
            PageRole::Section(SectionKey::ClimateAndEsgRisks),
            PageRole::Chart(ChartKey::AqGauges),
            PageRole::Section(SectionKey::FinalVerdict),
        ]
    );
    assert_decodes(&report.document);
    assert_eq!(report.file_name(), "10_Downing_Street,_London_ClimateReport.pdf");

    // risk_bar was claimed by the executive summary first.
    assert!(!report.narrative.market_analysis.subsections[0]
        .charts
        .contains(&ChartKey::RiskBar));

    let context = narrator.context().unwrap();
    assert_eq!(context.charts, vec![ChartKey::RiskBar, ChartKey::AqGauges]);
    assert_eq!(context.scores.flood_risk, Some(6.8));
    assert_eq!(context.flood_zone, None);
    assert_eq!(context.wildfire_class.as_deref(), Some("very low"));

    assert!(scratch_is_empty(&scratch));
}

#[tokio::test]
async fn test_chart_render_failure_drops_only_that_chart() {
    let scratch = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::serving(&DatasetKind::REPORT_BATCH));
    let narrator = Arc::new(FakeNarrator::replying(narrative_json()));
    let renderer = FlakyRenderer {
        inner: small_renderer(),
        broken: ChartKey::AqGauges,
    };
    let pipeline = pipeline(&provider, &narrator, renderer, &scratch);

    let report = pipeline.generate("1 High St").await.unwrap();
    assert_eq!(
        report.charts,
        vec![
            ChartKey::RiskBar,
            ChartKey::WildfireTs,
            ChartKey::HeatwindScen,
            ChartKey::RecentDaily,
        ]
    );
    assert!(!report.document.pages.contains(&PageRole::Chart(ChartKey::AqGauges)));
    assert!(report.document.pages.contains(&PageRole::Chart(ChartKey::RecentDaily)));
    assert_decodes(&report.document);
    assert!(scratch_is_empty(&scratch));
}

// ── Fatal narrative failures ─────────────────────────────────────────────────

#[tokio::test]
async fn test_narrative_without_json_fails_and_cleans_up() {
    let scratch = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::serving(&PARTIAL));
    let narrator = Arc::new(FakeNarrator::replying("I'm sorry, I cannot produce that report."));
    let pipeline = pipeline(&provider, &narrator, small_renderer(), &scratch);

    let err = pipeline.generate("1 High St").await.unwrap_err();
    assert!(matches!(err, ReportError::InvalidNarrativeFormat(_)));
    // Charts were rendered before narration, and are gone now.
    assert_eq!(narrator.context().unwrap().charts.len(), 2);
    assert!(scratch_is_empty(&scratch));
}

#[tokio::test]
async fn test_schema_violation_names_section_and_cleans_up() {
    let scratch = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::serving(&PARTIAL));
    let mut body: serde_json::Value = {
        let raw = narrative_json();
        let start = raw.find("\n{").unwrap() + 1;
        let end = raw.rfind('}').unwrap();
        serde_json::from_str(&raw[start..=end]).unwrap()
    };
    body.as_object_mut().unwrap().remove("final_verdict");
    let narrator = Arc::new(FakeNarrator::replying(body.to_string()));
    let pipeline = pipeline(&provider, &narrator, small_renderer(), &scratch);

    match pipeline.generate("1 High St").await {
        Err(ReportError::NarrativeSchemaViolation { section, .. }) => {
            assert_eq!(section, "final_verdict")
        }
        other => panic!("expected schema violation, got {:?}", other.map(|r| r.file_name())),
    }
    assert!(scratch_is_empty(&scratch));
}

#[tokio::test]
async fn test_narrative_service_error_is_fatal() {
    let scratch = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::serving(&PARTIAL));
    let narrator = Arc::new(FakeNarrator::failing("HTTP 429 Too Many Requests"));
    let pipeline = pipeline(&provider, &narrator, small_renderer(), &scratch);

    let err = pipeline.generate("1 High St").await.unwrap_err();
    assert!(matches!(err, ReportError::NarrativeServiceFailed(ref m) if m.contains("429")));
    assert!(scratch_is_empty(&scratch));
}

#[tokio::test]
async fn test_missing_font_fails_document_and_cleans_up() {
    let scratch = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::serving(&PARTIAL));
    let narrator = Arc::new(FakeNarrator::replying(narrative_json()));
    let config = PipelineConfig::default()
        .with_scratch_root(scratch.path())
        .with_document(DocumentConfig::default().with_font(FontSource::TrueType {
            regular: "/nonexistent/Regular.ttf".into(),
            bold: "/nonexistent/Bold.ttf".into(),
        }));
    let pipeline = ReportPipeline::new(
        FakeGeocoder,
        provider.clone(),
        narrator.clone(),
        small_renderer(),
        config,
    );

    let err = pipeline.generate("1 High St").await.unwrap_err();
    assert!(matches!(err, ReportError::DocumentAssemblyFailed(_)));
    assert!(scratch_is_empty(&scratch));
}

// ── Geocoding ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unresolvable_address_fails_before_any_fetch() {
    let scratch = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::serving(&DatasetKind::REPORT_BATCH));
    let narrator = Arc::new(FakeNarrator::replying(narrative_json()));
    let pipeline = pipeline(&provider, &narrator, small_renderer(), &scratch);

    let err = pipeline.generate("Nonexistent Place 9999").await.unwrap_err();
    match err {
        ReportError::GeocodingFailed { address, .. } => assert_eq!(address, "Nonexistent Place 9999"),
        other => panic!("expected GeocodingFailed, got {:?}", other),
    }
    assert_eq!(provider.calls(), 0);
    assert!(narrator.context().is_none());
    assert!(scratch_is_empty(&scratch));
}

struct SlowGeocoder;

#[async_trait]
impl Geocoder for SlowGeocoder {
    async fn geocode(&self, _address: &str) -> Result<Option<Coordinates>> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Some(Coordinates::new(0.0, 0.0)))
    }
}

#[tokio::test]
async fn test_geocoder_timeout_is_geocoding_failure() {
    let provider = Arc::new(FakeProvider::serving(&PARTIAL));
    let narrator = Arc::new(FakeNarrator::replying(narrative_json()));
    let config = PipelineConfig::default().with_geocode_timeout(Duration::from_millis(20));
    let pipeline = ReportPipeline::new(SlowGeocoder, provider.clone(), narrator, small_renderer(), config);

    let err = pipeline.generate("1 High St").await.unwrap_err();
    assert!(matches!(err, ReportError::GeocodingFailed { ref reason, .. } if reason.contains("timed out")));
    assert_eq!(provider.calls(), 0);
}

// ── Concurrency & preview ────────────────────────────────────────────────────

#[tokio::test]
async fn test_concurrent_requests_do_not_share_scratch_space() {
    let scratch = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::serving(&DatasetKind::REPORT_BATCH));
    let narrator = Arc::new(FakeNarrator::replying(narrative_json()));
    let pipeline = pipeline(&provider, &narrator, small_renderer(), &scratch);

    let (a, b) = tokio::join!(pipeline.generate("1 High St"), pipeline.generate("2 Low Rd"));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.request_id, b.request_id);
    assert_eq!(a.charts.len(), 5);
    assert_eq!(b.charts.len(), 5);
    assert_eq!(provider.calls(), 14);
    assert!(scratch_is_empty(&scratch));
}

#[tokio::test]
async fn test_preview_uses_scoring_lookups_only() {
    let scratch = TempDir::new().unwrap();
    let provider = Arc::new(FakeProvider::serving(&DatasetKind::REPORT_BATCH));
    let narrator = Arc::new(FakeNarrator::replying(narrative_json()));
    let pipeline = pipeline(&provider, &narrator, small_renderer(), &scratch);

    let preview = pipeline.preview("1 High St").await.unwrap();
    assert_eq!(provider.calls(), 3);
    assert!(narrator.context().is_none());
    assert_eq!(preview.overall_risk, "High");
    assert_eq!(preview.risks.len(), 3);
    assert_eq!(preview.risks[1].value, 68);
    assert!(preview.summary.contains("inside a mapped flood zone"));

    let err = pipeline.preview("Nonexistent Place 9999").await.unwrap_err();
    assert!(matches!(err, ReportError::GeocodingFailed { .. }));
}
