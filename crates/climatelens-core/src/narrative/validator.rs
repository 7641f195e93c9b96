use super::extract::extract_json_object;
use super::{Narrative, Section, SectionKey};
use crate::charts::ChartKey;
use crate::error::{ReportError, Result};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Parse and validate raw narrative-service output.
///
/// Chart references outside `allowed` are dropped, and each chart key is
/// kept only on the first subsection (in canonical section order, then
/// document order) that references it.
pub fn validate(raw: &str, allowed: &[ChartKey]) -> Result<Narrative> {
    let payload = extract_json_object(raw)?;
    let mut document: Value = serde_json::from_str(payload)
        .map_err(|e| ReportError::InvalidNarrativeFormat(format!("JSON parse error: {}", e)))?;
    let root = document.as_object_mut().ok_or_else(|| {
        ReportError::InvalidNarrativeFormat("top-level value is not an object".into())
    })?;

    for key in SectionKey::ORDER {
        let section = root
            .get(key.as_str())
            .ok_or_else(|| ReportError::schema(key.as_str(), "missing required section"))?;
        let fields = section
            .as_object()
            .ok_or_else(|| ReportError::schema(key.as_str(), "section is not an object"))?;
        if !fields.contains_key("title") || !fields.contains_key("subsections") {
            return Err(ReportError::schema(
                key.as_str(),
                "missing 'title' or 'subsections'",
            ));
        }
    }

    // Fields are evaluated in declaration order, which is the canonical
    // section order the chart allocation depends on.
    let mut claimed = HashSet::new();
    let mut take = |key: SectionKey| {
        let value = root.remove(key.as_str()).unwrap_or(Value::Null);
        prune_section(key, value, allowed, &mut claimed)
    };
    Ok(Narrative {
        executive_summary: take(SectionKey::ExecutiveSummary)?,
        market_analysis: take(SectionKey::MarketAnalysis)?,
        climate_and_esg_risks: take(SectionKey::ClimateAndEsgRisks)?,
        final_verdict: take(SectionKey::FinalVerdict)?,
    })
}

/// Check one section's subsections and allocate its chart references.
/// `claimed` carries the keys already taken by earlier subsections.
fn prune_section(
    key: SectionKey,
    mut value: Value,
    allowed: &[ChartKey],
    claimed: &mut HashSet<ChartKey>,
) -> Result<Section> {
    let subsections = value
        .get_mut("subsections")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| ReportError::schema(key.as_str(), "'subsections' is not a list"))?;

    for sub in subsections.iter_mut() {
        let fields = sub
            .as_object_mut()
            .ok_or_else(|| ReportError::schema(key.as_str(), "subsection is not an object"))?;
        if !fields.contains_key("subtitle") || !fields.contains_key("paragraphs") {
            return Err(ReportError::schema(
                key.as_str(),
                "a subsection is missing 'subtitle' or 'paragraphs'",
            ));
        }
        prune_charts(key, fields, allowed, claimed);
    }

    serde_json::from_value(value).map_err(|e| ReportError::schema(key.as_str(), e.to_string()))
}

fn prune_charts(
    key: SectionKey,
    fields: &mut Map<String, Value>,
    allowed: &[ChartKey],
    claimed: &mut HashSet<ChartKey>,
) {
    let charts = match fields.get("charts") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().and_then(ChartKey::parse))
            .filter(|chart| allowed.contains(chart))
            .filter(|chart| claimed.insert(*chart))
            .map(|chart| Value::from(chart.as_str()))
            .collect(),
        Some(other) => {
            log::debug!("Ignoring non-list 'charts' in {}: {}", key, other);
            Vec::new()
        }
    };
    fields.insert("charts".into(), Value::Array(charts));
}
