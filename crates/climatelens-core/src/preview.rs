//! Lightweight risk summary shown before a full report is purchased.

use crate::acquisition::AcquiredDatasets;
use crate::types::DatasetKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lookups needed for a preview. A subset of the report batch.
pub const PREVIEW_BATCH: [DatasetKind; 3] = [
    DatasetKind::RiskScore,
    DatasetKind::FloodZone,
    DatasetKind::WildfireCurrent,
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// Classify a 0-10 composite score.
    pub fn from_score(score: f64) -> Self {
        if score < 3.5 {
            RiskLevel::Low
        } else if score < 6.5 {
            RiskLevel::Moderate
        } else {
            RiskLevel::High
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "Low",
            RiskLevel::Moderate => "Moderate",
            RiskLevel::High => "High",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskItem {
    pub name: String,
    /// Score as a percentage, 0-100.
    pub value: u32,
    pub level: RiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClimatePreview {
    pub address: String,
    /// Worst level across the scored risks, or "Unknown" with no scores.
    pub overall_risk: String,
    pub summary: String,
    pub risks: Vec<RiskItem>,
}

impl ClimatePreview {
    pub fn from_datasets(address: &str, datasets: &AcquiredDatasets) -> Self {
        let scores = datasets.risk_score().map(|r| r.scores.clone()).unwrap_or_default();
        let risks: Vec<RiskItem> = [
            ("Air Quality", scores.air_quality),
            ("Flood Risk", scores.flood_risk),
            ("Wildfire Hazard", scores.wildfire_risk),
        ]
        .into_iter()
        .filter_map(|(name, score)| {
            score.map(|s| RiskItem {
                name: name.to_string(),
                value: (s * 10.0).round().clamp(0.0, 100.0) as u32,
                level: RiskLevel::from_score(s),
            })
        })
        .collect();

        let overall = risks.iter().map(|r| r.level).max();
        let mut summary = match overall {
            Some(level) => format!(
                "Based on our analysis of {}, this location shows {} climate risks.",
                address,
                level.to_string().to_lowercase()
            ),
            None => format!("Risk scores for {} are currently unavailable.", address),
        };
        if let Some(in_zone) = datasets
            .flood_zone()
            .and_then(|f| f.flood_zone.as_ref())
            .and_then(|f| f.in_zone())
        {
            summary.push_str(if in_zone {
                " The property lies inside a mapped flood zone."
            } else {
                " The property lies outside mapped flood zones."
            });
        }
        if let Some(class) = datasets
            .wildfire_current()
            .and_then(|w| w.properties.fire_risk_class.as_deref())
        {
            summary.push_str(&format!(" Wildfire risk within 1km is classed as {}.", class));
        }

        Self {
            address: address.to_string(),
            overall_risk: overall
                .map(|l| l.to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            summary,
            risks,
        }
    }
}
