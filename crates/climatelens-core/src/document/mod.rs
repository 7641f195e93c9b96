//! PDF assembly.
//!
//! A report is a cover page, then one page per non-empty narrative section
//! in canonical order. Each chart a subsection references gets its own page
//! directly after that subsection's text. Long sections flow onto
//! continuation pages.

pub mod fonts;
pub mod layout;

pub use fonts::FontSource;

use crate::charts::{ChartArtifact, ChartKey, ChartSet};
use crate::error::{ReportError, Result};
use crate::narrative::{Narrative, SectionKey};
use chrono::NaiveDate;
use fonts::{FontSet, Weight};
use layout::{wrap_text, PageComposer};
use pdf_writer::{Filter, Name, Pdf, Rect, Ref, TextStr};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const MM: f32 = 72.0 / 25.4;

const TITLE_SIZE: f32 = 24.0;
const HEADING_SIZE: f32 = 18.0;
const SUBTITLE_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 11.0;
const BODY_LEADING: f32 = 15.0;
const BULLET_INDENT: f32 = 16.0;
const LEGEND_SIZE: f32 = 9.0;
const LEGEND_LEADING: f32 = 13.0;
const LEGEND_GAP: f32 = 4.0 * MM;
const LOGO_BOX: f32 = 40.0 * MM;

/// Page size and margins in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    /// Left, right and top margin.
    pub margin: f32,
    /// Content never extends below this line.
    pub bottom_margin: f32,
}

impl PageGeometry {
    pub fn a4() -> Self {
        Self {
            width: 210.0 * MM,
            height: 297.0 * MM,
            margin: 15.0 * MM,
            bottom_margin: 20.0 * MM,
        }
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::a4()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentConfig {
    pub geometry: PageGeometry,
    pub title: String,
    /// Cover logo. When unset or unreadable a placeholder box is drawn.
    pub logo: Option<PathBuf>,
    pub font: FontSource,
    /// Date printed on the cover; today's date when unset.
    pub generated_on: Option<NaiveDate>,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            geometry: PageGeometry::a4(),
            title: "Climate & ESG Risk Report".to_string(),
            logo: None,
            font: FontSource::Helvetica,
            generated_on: None,
        }
    }
}

impl DocumentConfig {
    pub fn with_logo(mut self, path: impl Into<PathBuf>) -> Self {
        self.logo = Some(path.into());
        self
    }

    pub fn with_font(mut self, font: FontSource) -> Self {
        self.font = font;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_generated_on(mut self, date: NaiveDate) -> Self {
        self.generated_on = Some(date);
        self
    }
}

/// What each page of the output holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRole {
    Cover,
    Section(SectionKey),
    Chart(ChartKey),
    /// Overflow of the preceding page.
    Continuation,
}

#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub pages: Vec<PageRole>,
}

impl RenderedDocument {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

struct EmbeddedImage {
    resource: String,
    width: u32,
    height: u32,
}

pub struct DocumentBuilder {
    config: DocumentConfig,
}

impl DocumentBuilder {
    pub fn new(config: DocumentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Lay out the cover, sections and chart pages into a PDF.
    ///
    /// A chart referenced by the narrative but absent from `charts` is
    /// skipped. A chart artifact that exists but cannot be read or decoded
    /// fails the whole document, as does an unusable font asset.
    pub fn build(
        &self,
        address: &str,
        narrative: &Narrative,
        charts: &ChartSet,
    ) -> Result<RenderedDocument> {
        let fonts = FontSet::load(&self.config.font)?;

        let mut pdf = Pdf::new();
        let mut next_id = 1i32;
        let mut alloc = || {
            let r = Ref::new(next_id);
            next_id += 1;
            r
        };
        let catalog_id = alloc();
        let pages_id = alloc();
        let info_id = alloc();

        let font_pairs = fonts.write(&mut pdf, &mut alloc);
        let mut xobjects: Vec<(String, Ref)> = Vec::new();

        let logo = match self.config.logo.as_deref().map(|path| (path, load_image(path))) {
            Some((_, Ok(img))) => Some(embed_image(&img, &mut xobjects, &mut pdf, &mut alloc)),
            Some((path, Err(reason))) => {
                log::warn!("Logo {} unusable, drawing placeholder: {}", path.display(), reason);
                None
            }
            None => None,
        };

        let mut chart_images: HashMap<ChartKey, EmbeddedImage> = HashMap::new();
        for key in narrative.chart_keys() {
            let Some(artifact) = charts.get(&key) else {
                log::debug!("No artifact for chart {}, skipping its page", key);
                continue;
            };
            let img = load_image(&artifact.path).map_err(|reason| {
                ReportError::DocumentAssemblyFailed(format!("chart {}: {}", key, reason))
            })?;
            chart_images.insert(key, embed_image(&img, &mut xobjects, &mut pdf, &mut alloc));
        }

        let geometry = self.config.geometry;
        let mut composer = PageComposer::new(&fonts, geometry);
        self.compose_cover(&mut composer, &fonts, address, logo.as_ref());

        for (key, section) in narrative.sections() {
            if section.is_empty() {
                log::debug!("Section {} has no subsections, no page emitted", key);
                continue;
            }
            composer.start_page(PageRole::Section(key));
            composer.paragraph(&section.title, Weight::Bold, HEADING_SIZE, HEADING_SIZE * 1.4, 0.0);
            composer.rule(0.7);
            composer.advance(10.0);

            for sub in &section.subsections {
                composer.paragraph(&sub.subtitle, Weight::Bold, SUBTITLE_SIZE, SUBTITLE_SIZE * 1.5, 0.0);
                for para in &sub.paragraphs {
                    composer.paragraph(para, Weight::Regular, BODY_SIZE, BODY_LEADING, 0.0);
                    composer.advance(BODY_LEADING / 3.0);
                }
                for bullet in &sub.bullets {
                    composer.bullet(bullet, BODY_SIZE, BODY_LEADING, BULLET_INDENT);
                }
                composer.advance(BODY_LEADING / 2.0);

                for chart in &sub.charts {
                    if let (Some(img), Some(artifact)) = (chart_images.get(chart), charts.get(chart)) {
                        compose_chart(&mut composer, artifact, img);
                    }
                }
            }
        }

        let pages = composer.finish();
        let page_count = pages.len();
        let page_ids: Vec<Ref> = (0..page_count).map(|_| alloc()).collect();
        let content_ids: Vec<Ref> = (0..page_count).map(|_| alloc()).collect();

        let mut roles = Vec::with_capacity(page_count);
        for (i, (role, content)) in pages.into_iter().enumerate() {
            roles.push(role);
            let raw = content.finish();
            let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&raw, 6);
            pdf.stream(content_ids[i], &compressed).filter(Filter::FlateDecode);
        }

        pdf.catalog(catalog_id).pages(pages_id);
        pdf.pages(pages_id)
            .kids(page_ids.iter().copied())
            .count(page_count as i32);
        pdf.document_info(info_id)
            .title(TextStr(&self.config.title))
            .subject(TextStr(address))
            .creator(TextStr("ClimateLens"));

        for (i, page_id) in page_ids.iter().enumerate() {
            let mut page = pdf.page(*page_id);
            page.media_box(Rect::new(0.0, 0.0, geometry.width, geometry.height))
                .parent(pages_id)
                .contents(content_ids[i]);
            let mut resources = page.resources();
            {
                let mut fonts = resources.fonts();
                for (name, font_ref) in &font_pairs {
                    fonts.pair(Name(name.as_bytes()), *font_ref);
                }
            }
            if !xobjects.is_empty() {
                let mut images = resources.x_objects();
                for (name, xobj_ref) in &xobjects {
                    images.pair(Name(name.as_bytes()), *xobj_ref);
                }
            }
        }

        log::debug!(
            "Assembled {} pages ({} chart images) for '{}'",
            page_count,
            chart_images.len(),
            address
        );

        Ok(RenderedDocument {
            bytes: pdf.finish(),
            pages: roles,
        })
    }

    fn compose_cover(
        &self,
        composer: &mut PageComposer<'_>,
        fonts: &FontSet,
        address: &str,
        logo: Option<&EmbeddedImage>,
    ) {
        let geometry = self.config.geometry;
        composer.start_page(PageRole::Cover);
        composer.advance(30.0 * MM);

        match logo {
            Some(img) => {
                let (w, h) = fit(img.width, img.height, LOGO_BOX, LOGO_BOX);
                composer.image(&img.resource, (geometry.width - w) / 2.0, w, h);
            }
            None => composer.placeholder((geometry.width - LOGO_BOX) / 2.0, LOGO_BOX, LOGO_BOX),
        }
        composer.advance(20.0 * MM);

        composer.centered_line(&self.config.title, Weight::Bold, TITLE_SIZE, TITLE_SIZE * 1.6);
        composer.advance(6.0 * MM);

        let regular = fonts.face(Weight::Regular);
        for line in wrap_text(address, composer.text_width(), |s| regular.measure(s, 14.0)) {
            composer.centered_line(&line, Weight::Regular, 14.0, 20.0);
        }
        composer.advance(4.0 * MM);

        let date = self
            .config
            .generated_on
            .unwrap_or_else(|| chrono::Utc::now().date_naive());
        composer.centered_line(
            &format!("Generated {}", date.format("%d %B %Y")),
            Weight::Regular,
            10.0,
            14.0,
        );
    }
}

/// Chart page: caption, image, then the colour key and axis note. The
/// image shrinks to leave room for the key.
fn compose_chart(composer: &mut PageComposer<'_>, artifact: &ChartArtifact, img: &EmbeddedImage) {
    composer.start_page(PageRole::Chart(artifact.key));
    composer.centered_line(artifact.key.label(), Weight::Bold, 14.0, 24.0);
    composer.advance(4.0 * MM);

    let key_rows = artifact.legend.len() + usize::from(artifact.note.is_some());
    let key_height = if key_rows == 0 {
        0.0
    } else {
        LEGEND_GAP + key_rows as f32 * LEGEND_LEADING
    };
    let (w, h) = fit(
        img.width,
        img.height,
        composer.text_width(),
        composer.remaining() - key_height,
    );
    let x = composer.margin() + (composer.text_width() - w) / 2.0;
    composer.image(&img.resource, x, w, h);

    if key_rows > 0 {
        composer.advance(LEGEND_GAP);
        for entry in &artifact.legend {
            composer.swatch(entry.color, &entry.text, LEGEND_SIZE, LEGEND_LEADING, BULLET_INDENT);
        }
        if let Some(note) = &artifact.note {
            composer.paragraph(note, Weight::Regular, LEGEND_SIZE, LEGEND_LEADING, BULLET_INDENT);
        }
    }
    composer.close_page();
}

/// Largest size with the image's aspect ratio that fits the box.
fn fit(px_width: u32, px_height: u32, max_width: f32, max_height: f32) -> (f32, f32) {
    if px_width == 0 || px_height == 0 {
        return (0.0, 0.0);
    }
    let aspect = px_height as f32 / px_width as f32;
    let mut w = max_width;
    let mut h = w * aspect;
    if h > max_height {
        h = max_height.max(0.0);
        w = h / aspect;
    }
    (w, h)
}

fn load_image(path: &Path) -> std::result::Result<image::RgbaImage, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| format!("cannot decode {}: {}", path.display(), e))?;
    Ok(decoded.to_rgba8())
}

/// Write an image as a Flate-compressed RGB XObject, with a soft mask when
/// any pixel is translucent.
fn embed_image(
    rgba: &image::RgbaImage,
    xobjects: &mut Vec<(String, Ref)>,
    pdf: &mut Pdf,
    alloc: &mut impl FnMut() -> Ref,
) -> EmbeddedImage {
    let xobj_ref = alloc();
    let resource = format!("Im{}", xobjects.len() + 1);
    let (w, h) = (rgba.width(), rgba.height());

    let rgb: Vec<u8> = rgba.pixels().flat_map(|p| [p.0[0], p.0[1], p.0[2]]).collect();
    let compressed_rgb = miniz_oxide::deflate::compress_to_vec_zlib(&rgb, 6);

    let smask_ref = if rgba.pixels().any(|p| p.0[3] < 255) {
        let alpha: Vec<u8> = rgba.pixels().map(|p| p.0[3]).collect();
        let compressed_alpha = miniz_oxide::deflate::compress_to_vec_zlib(&alpha, 6);
        let mask_ref = alloc();
        let mut mask = pdf.image_xobject(mask_ref, &compressed_alpha);
        mask.filter(Filter::FlateDecode);
        mask.width(w as i32);
        mask.height(h as i32);
        mask.color_space().device_gray();
        mask.bits_per_component(8);
        Some(mask_ref)
    } else {
        None
    };

    let mut xobj = pdf.image_xobject(xobj_ref, &compressed_rgb);
    xobj.filter(Filter::FlateDecode);
    xobj.width(w as i32);
    xobj.height(h as i32);
    xobj.color_space().device_rgb();
    xobj.bits_per_component(8);
    if let Some(mask_ref) = smask_ref {
        xobj.s_mask(mask_ref);
    }
    drop(xobj);

    xobjects.push((resource.clone(), xobj_ref));
    EmbeddedImage {
        resource,
        width: w,
        height: h,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::LegendEntry;
    use crate::narrative::{Section, Subsection};
    use super::fonts::to_winansi;
    use tempfile::TempDir;

    fn subsection(charts: Vec<ChartKey>) -> Subsection {
        Subsection {
            subtitle: "Overview".into(),
            paragraphs: vec!["The property sits on elevated ground.".into()],
            bullets: vec!["Low flood exposure".into()],
            charts,
        }
    }

    fn section(key: SectionKey, charts: Vec<ChartKey>) -> Section {
        Section {
            title: key.default_title().into(),
            subsections: vec![subsection(charts)],
        }
    }

    fn narrative() -> Narrative {
        Narrative {
            executive_summary: section(SectionKey::ExecutiveSummary, vec![ChartKey::RiskBar]),
            market_analysis: section(SectionKey::MarketAnalysis, vec![ChartKey::WildfireTs]),
            climate_and_esg_risks: section(
                SectionKey::ClimateAndEsgRisks,
                vec![ChartKey::AqGauges, ChartKey::RecentDaily],
            ),
            final_verdict: section(SectionKey::FinalVerdict, vec![]),
        }
    }

    fn write_chart(dir: &TempDir, key: ChartKey) -> ChartArtifact {
        let path = dir.path().join(format!("{}.png", key));
        image::RgbImage::from_pixel(40, 25, image::Rgb([30, 120, 200]))
            .save(&path)
            .unwrap();
        ChartArtifact::new(key, path)
    }

    fn builder() -> DocumentBuilder {
        DocumentBuilder::new(
            DocumentConfig::default()
                .with_generated_on(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
        )
    }

    /// Parse `bytes` with an independent reader and return, per page, the
    /// operators of its decoded content stream.
    fn parsed_page_operators(bytes: &[u8]) -> Vec<Vec<String>> {
        let parsed = lopdf::Document::load_mem(bytes).unwrap();
        parsed
            .get_pages()
            .values()
            .map(|&id| {
                let content = parsed.get_and_decode_page_content(id).unwrap();
                content.operations.into_iter().map(|op| op.operator).collect()
            })
            .collect()
    }

    #[test]
    fn test_pages_follow_canonical_order_with_chart_pages() {
        let dir = TempDir::new().unwrap();
        let mut charts = ChartSet::new();
        for key in [ChartKey::RiskBar, ChartKey::WildfireTs, ChartKey::AqGauges] {
            charts.insert(key, write_chart(&dir, key));
        }

        let doc = builder().build("1 High St", &narrative(), &charts).unwrap();
        assert_eq!(
            doc.pages,
            vec![
                PageRole::Cover,
                PageRole::Section(SectionKey::ExecutiveSummary),
                PageRole::Chart(ChartKey::RiskBar),
                PageRole::Section(SectionKey::MarketAnalysis),
                PageRole::Chart(ChartKey::WildfireTs),
                PageRole::Section(SectionKey::ClimateAndEsgRisks),
                PageRole::Chart(ChartKey::AqGauges),
                PageRole::Section(SectionKey::FinalVerdict),
            ]
        );
        assert!(doc.bytes.starts_with(b"%PDF-"));

        let pages = parsed_page_operators(&doc.bytes);
        assert_eq!(pages.len(), doc.pages.len());
        for (role, ops) in doc.pages.iter().zip(&pages) {
            assert!(!ops.is_empty(), "{:?} has an empty content stream", role);
            if let PageRole::Chart(_) = role {
                assert!(ops.iter().any(|op| op == "Do"), "{:?} draws no image", role);
            }
        }
    }

    /// Text operands drawn on page `index` (zero-based) of a parsed document.
    fn page_strings(bytes: &[u8], index: usize) -> Vec<Vec<u8>> {
        let parsed = lopdf::Document::load_mem(bytes).unwrap();
        let id = parsed.get_pages()[&(index as u32 + 1)];
        parsed
            .get_and_decode_page_content(id)
            .unwrap()
            .operations
            .into_iter()
            .flat_map(|op| op.operands)
            .filter_map(|operand| match operand {
                lopdf::Object::String(bytes, _) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_chart_page_prints_colour_key_and_note() {
        let dir = TempDir::new().unwrap();
        let artifact = write_chart(&dir, ChartKey::RiskBar)
            .with_legend(vec![
                LegendEntry::new([68, 1, 84], "Flood risk: 6 / 10"),
                LegendEntry::new([39, 127, 142], "PM2.5: 9.2 µg/m³"),
            ])
            .with_note("Bars left to right in key order; scale 0 to 10.");
        let mut charts = ChartSet::new();
        charts.insert(ChartKey::RiskBar, artifact);

        let doc = builder().build("1 High St", &narrative(), &charts).unwrap();
        let index = doc
            .pages
            .iter()
            .position(|p| *p == PageRole::Chart(ChartKey::RiskBar))
            .unwrap();
        let strings = page_strings(&doc.bytes, index);

        assert!(strings.contains(&b"Composite Climate Risk Scores".to_vec()));
        assert!(strings.contains(&b"Flood risk: 6 / 10".to_vec()));
        assert!(strings.contains(&to_winansi("PM2.5: 9.2 µg/m³")));
        assert!(strings
            .iter()
            .any(|s| s.starts_with(b"Bars left to right")));
        // The key stays on the chart page.
        assert!(matches!(doc.pages.get(index + 1), Some(PageRole::Section(_))));
    }

    #[test]
    fn test_empty_section_emits_no_page() {
        let mut n = narrative();
        n.market_analysis.subsections.clear();
        let doc = builder().build("1 High St", &n, &ChartSet::new()).unwrap();
        assert!(!doc.pages.contains(&PageRole::Section(SectionKey::MarketAnalysis)));
        assert_eq!(doc.page_count(), 4);
    }

    #[test]
    fn test_chart_without_artifact_is_skipped() {
        let doc = builder().build("1 High St", &narrative(), &ChartSet::new()).unwrap();
        assert!(doc.pages.iter().all(|p| !matches!(p, PageRole::Chart(_))));
    }

    #[test]
    fn test_unreadable_chart_artifact_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("risk_bar.png");
        std::fs::write(&path, b"not a png").unwrap();
        let mut charts = ChartSet::new();
        charts.insert(ChartKey::RiskBar, ChartArtifact::new(ChartKey::RiskBar, path));

        let err = builder().build("1 High St", &narrative(), &charts).unwrap_err();
        assert!(matches!(err, ReportError::DocumentAssemblyFailed(ref m) if m.contains("risk_bar")));
    }

    #[test]
    fn test_missing_font_asset_fails_document() {
        let config = DocumentConfig::default().with_font(FontSource::TrueType {
            regular: "/nonexistent/DejaVuSans.ttf".into(),
            bold: "/nonexistent/DejaVuSans-Bold.ttf".into(),
        });
        let err = DocumentBuilder::new(config)
            .build("1 High St", &narrative(), &ChartSet::new())
            .unwrap_err();
        assert!(matches!(err, ReportError::DocumentAssemblyFailed(_)));
    }

    #[test]
    fn test_missing_logo_falls_back_to_placeholder() {
        let config = DocumentConfig::default().with_logo("/nonexistent/logo.png");
        let doc = DocumentBuilder::new(config)
            .build("1 High St", &narrative(), &ChartSet::new())
            .unwrap();
        assert_eq!(doc.pages[0], PageRole::Cover);
    }

    #[test]
    fn test_logo_is_embedded() {
        let dir = TempDir::new().unwrap();
        let logo = dir.path().join("logo.png");
        image::RgbaImage::from_pixel(16, 16, image::Rgba([0, 0, 0, 128]))
            .save(&logo)
            .unwrap();
        let doc = DocumentBuilder::new(DocumentConfig::default().with_logo(&logo))
            .build("1 High St", &narrative(), &ChartSet::new())
            .unwrap();
        assert!(doc.bytes.windows(4).any(|w| w == b"/Im1"));
        assert!(doc.bytes.windows(6).any(|w| w == b"/SMask"));
    }

    #[test]
    fn test_long_section_flows_onto_continuation_pages() {
        let mut n = narrative();
        let long = "Elevated heat stress days are projected to rise steadily. ".repeat(40);
        n.executive_summary.subsections[0].paragraphs = vec![long; 6];
        let doc = builder().build("1 High St", &n, &ChartSet::new()).unwrap();
        assert_eq!(doc.pages[1], PageRole::Section(SectionKey::ExecutiveSummary));
        assert_eq!(doc.pages[2], PageRole::Continuation);
    }

    #[test]
    fn test_text_after_chart_page_starts_fresh_page() {
        let dir = TempDir::new().unwrap();
        let mut charts = ChartSet::new();
        charts.insert(ChartKey::RiskBar, write_chart(&dir, ChartKey::RiskBar));
        let mut n = narrative();
        n.executive_summary.subsections.push(subsection(vec![]));

        let doc = builder().build("1 High St", &n, &charts).unwrap();
        assert_eq!(
            &doc.pages[..4],
            &[
                PageRole::Cover,
                PageRole::Section(SectionKey::ExecutiveSummary),
                PageRole::Chart(ChartKey::RiskBar),
                PageRole::Continuation,
            ]
        );
    }

    #[test]
    fn test_fit_preserves_aspect_ratio() {
        let (w, h) = fit(1200, 750, 500.0, 1000.0);
        assert!((w - 500.0).abs() < 1e-3 && (h - 312.5).abs() < 1e-3);
        let (w, h) = fit(1200, 750, 500.0, 100.0);
        assert!((h - 100.0).abs() < 1e-3 && (w - 160.0).abs() < 1e-3);
    }
}
