pub mod extract;
pub mod prompt;
pub mod validator;

pub use extract::extract_json_object;
pub use prompt::NarrativeContext;
pub use validator::validate;

use crate::charts::ChartKey;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Authors the raw narrative text for a report. The output is expected to
/// contain one JSON object and is always passed through [`validate`].
#[async_trait]
pub trait NarrativeService: Send + Sync {
    async fn generate(&self, context: &NarrativeContext) -> Result<String>;
}

#[async_trait]
impl<N: NarrativeService> NarrativeService for std::sync::Arc<N> {
    async fn generate(&self, context: &NarrativeContext) -> Result<String> {
        (**self).generate(context).await
    }
}

/// The four required narrative sections, in canonical document order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    ExecutiveSummary,
    MarketAnalysis,
    ClimateAndEsgRisks,
    FinalVerdict,
}

impl SectionKey {
    pub const ORDER: [SectionKey; 4] = [
        SectionKey::ExecutiveSummary,
        SectionKey::MarketAnalysis,
        SectionKey::ClimateAndEsgRisks,
        SectionKey::FinalVerdict,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SectionKey::ExecutiveSummary => "executive_summary",
            SectionKey::MarketAnalysis => "market_analysis",
            SectionKey::ClimateAndEsgRisks => "climate_and_esg_risks",
            SectionKey::FinalVerdict => "final_verdict",
        }
    }

    pub fn default_title(self) -> &'static str {
        match self {
            SectionKey::ExecutiveSummary => "Executive Summary",
            SectionKey::MarketAnalysis => "Market Analysis",
            SectionKey::ClimateAndEsgRisks => "Climate and ESG Risks",
            SectionKey::FinalVerdict => "Final Verdict",
        }
    }
}

impl fmt::Display for SectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated four-section report narrative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Narrative {
    pub executive_summary: Section,
    pub market_analysis: Section,
    pub climate_and_esg_risks: Section,
    pub final_verdict: Section,
}

impl Narrative {
    pub fn section(&self, key: SectionKey) -> &Section {
        match key {
            SectionKey::ExecutiveSummary => &self.executive_summary,
            SectionKey::MarketAnalysis => &self.market_analysis,
            SectionKey::ClimateAndEsgRisks => &self.climate_and_esg_risks,
            SectionKey::FinalVerdict => &self.final_verdict,
        }
    }

    /// Sections in canonical order.
    pub fn sections(&self) -> impl Iterator<Item = (SectionKey, &Section)> {
        SectionKey::ORDER.into_iter().map(move |k| (k, self.section(k)))
    }

    /// Every chart reference in traversal order.
    pub fn chart_keys(&self) -> Vec<ChartKey> {
        self.sections()
            .flat_map(|(_, s)| s.subsections.iter())
            .flat_map(|sub| sub.charts.iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    pub title: String,
    pub subsections: Vec<Subsection>,
}

impl Section {
    pub fn is_empty(&self) -> bool {
        self.subsections.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subsection {
    pub subtitle: String,
    pub paragraphs: Vec<String>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub bullets: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub charts: Vec<ChartKey>,
}

/// Optional list fields: `null` reads as an empty list.
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
