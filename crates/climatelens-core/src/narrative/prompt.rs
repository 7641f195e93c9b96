use crate::acquisition::AcquiredDatasets;
use crate::charts::ChartKey;
use crate::types::{Coordinates, RiskScores};
use serde::Serialize;
use std::fmt::Write;

const SYSTEM_PROMPT: &str = r#"You are a world-class climate-risk and ESG consultant producing reports for high-value residential properties.
Use plain language and do NOT include any links or reference URLs.
STRICT SCHEMA (MUST FOLLOW EXACTLY):
{
  "executive_summary": {
    "title": "Executive Summary",
    "subsections": [
      {
        "subtitle": "Subsection Title",
        "paragraphs": ["Paragraph text..."],
        "bullets": ["Bullet point..."],
        "charts": []
      }
    ]
  },
  "market_analysis": {
    "title": "Market Analysis",
    "subsections": [
      {
        "subtitle": "Subsection Title",
        "paragraphs": ["Paragraph text..."],
        "bullets": ["Bullet point..."],
        "charts": ["wildfire_ts", "heatwind_scen"]
      }
    ]
  },
  "climate_and_esg_risks": {
    "title": "Climate and ESG Risks",
    "subsections": [
      {
        "subtitle": "Subsection Title",
        "paragraphs": ["Paragraph text..."],
        "bullets": ["Bullet point..."],
        "charts": ["risk_bar", "aq_gauges", "recent_daily"]
      }
    ]
  },
  "final_verdict": {
    "title": "Final Verdict",
    "subsections": [
      {
        "subtitle": "Subsection Title",
        "paragraphs": ["Paragraph text..."],
        "bullets": ["Bullet point..."],
        "charts": []
      }
    ]
  }
}

For 'market_analysis', include:
- Average property prices in the area
- Typical rental/valuation trends
- Liquidity, insurance, and resilience premiums

RULES:
1. MUST FOLLOW SCHEMA EXACTLY.
2. NO extra keys, fields, or URLs.
3. Paragraphs: 2-3 short paragraphs per subsection.
4. Bullets: optional, 3-5 bullets if present.
5. Charts: choose from ["risk_bar","aq_gauges","wildfire_ts","heatwind_scen","recent_daily"] with no repeats.
6. Output ONLY JSON. Do not add any explanation or text outside the JSON."#;

/// What the narrative service is told about a property.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NarrativeContext {
    pub address: String,
    pub coordinates: Coordinates,
    pub scores: RiskScores,
    pub flood_zone: Option<String>,
    pub wildfire_class: Option<String>,
    /// Charts that have an artifact and may be referenced.
    pub charts: Vec<ChartKey>,
}

impl NarrativeContext {
    /// Digest the acquired datasets. Missing datasets leave their fields empty.
    pub fn from_datasets(
        address: &str,
        coordinates: Coordinates,
        datasets: &AcquiredDatasets,
        charts: &[ChartKey],
    ) -> Self {
        Self {
            address: address.to_string(),
            coordinates,
            scores: datasets
                .risk_score()
                .map(|r| r.scores.clone())
                .unwrap_or_default(),
            flood_zone: datasets
                .flood_zone()
                .and_then(|f| f.flood_zone.as_ref())
                .map(|f| f.to_string()),
            wildfire_class: datasets
                .wildfire_current()
                .and_then(|w| w.properties.fire_risk_class.clone()),
            charts: charts.to_vec(),
        }
    }

    /// The complete single-message prompt.
    pub fn render_prompt(&self) -> String {
        let mut out = String::with_capacity(SYSTEM_PROMPT.len() + 1024);
        out.push_str(SYSTEM_PROMPT);
        out.push_str("\n\nGenerate a report for the property at:\n");
        let _ = writeln!(out, "Address: {}", self.address);
        let _ = writeln!(out, "Latitude: {}", self.coordinates.latitude);
        let _ = writeln!(out, "Longitude: {}", self.coordinates.longitude);

        out.push_str("\nKey Data:\n");
        let _ = writeln!(out, "- Air Quality Risk: {}", or_unavailable(self.scores.air_quality));
        let _ = writeln!(out, "- Flood Risk: {}", or_unavailable(self.scores.flood_risk));
        let _ = writeln!(out, "- Wildfire Risk: {}", or_unavailable(self.scores.wildfire_risk));
        let _ = writeln!(out, "- Flood Zone: {}", or_unavailable(self.flood_zone.as_deref()));
        let _ = writeln!(
            out,
            "- Wildfire Risk (1km radius): {}",
            or_unavailable(self.wildfire_class.as_deref())
        );

        if !self.charts.is_empty() {
            out.push_str("\nCharts guidance:\n");
            for chart in &self.charts {
                let _ = writeln!(out, "- '{}': include if relevant", chart);
            }
        }

        out.push_str(
            "\n**CRITICAL:** Output must be a single valid JSON object strictly following \
             the schema above, with no extra text, no URLs, and no deviations.\n",
        );
        out
    }
}

fn or_unavailable<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unavailable".to_string())
}
