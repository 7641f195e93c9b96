use super::canvas::{Canvas, PALETTE};
use super::{ChartArtifact, ChartKey, ChartRenderer, LegendEntry};
use crate::acquisition::AcquiredDatasets;
use crate::error::{ReportError, Result};
use crate::types::{AirQualitySeries, HeatWindDaily, HeatWindTimeseries, RiskScore, WildfireTimeseries};
use image::Rgb;
use std::path::Path;

/// Heat/wind scenario columns plotted on `heatwind_scen`, with their legend text.
pub const HEATWIND_SCENARIOS: [(&str, &str); 3] = [
    ("heatwaves_rcp45", "Heatwaves (RCP4.5)"),
    ("consecutive_dry_days_rcp45", "Consecutive dry days (RCP4.5)"),
    ("extreme_wind_speed_days_rcp45", "Extreme wind days (RCP4.5)"),
];

/// Daily columns left off `recent_daily`.
const DAILY_EXCLUDED: [&str; 2] = ["year", "2m temperature(K)"];

const RECENT_DAYS: usize = 30;

/// Draws charts as PNG bitmaps. Captions, the colour key and axis ranges
/// are printed by the document, so the images carry no text.
#[derive(Debug, Clone)]
pub struct RasterChartRenderer {
    pub width: u32,
    pub height: u32,
}

impl Default for RasterChartRenderer {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 750,
        }
    }
}

/// An image plus the text that explains it.
struct Drawn {
    canvas: Canvas,
    legend: Vec<LegendEntry>,
    note: Option<String>,
}

/// One named line on a line chart.
struct Series {
    name: String,
    points: Vec<(f64, f64)>,
}

fn color(i: usize) -> Rgb<u8> {
    PALETTE[(i * 3) % PALETTE.len()]
}

/// `very_high` → `Very high`.
fn pretty(column: &str) -> String {
    let spaced = column.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => spaced,
    }
}

fn number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

impl RasterChartRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(64);
        self.height = height.max(64);
        self
    }

    fn risk_bar(&self, risk: &RiskScore) -> Drawn {
        let mut canvas = Canvas::new(self.width, self.height);
        canvas.frame(4);
        let scores = [
            ("Air quality", risk.scores.air_quality),
            ("Flood risk", risk.scores.flood_risk),
            ("Wildfire risk", risk.scores.wildfire_risk),
        ];
        let mut legend = Vec::new();
        for (i, (name, score)) in scores.iter().enumerate() {
            canvas.bar(i, scores.len(), 0.6, score.unwrap_or(0.0), 10.0, color(i));
            let text = match score {
                Some(s) => format!("{}: {} / 10", name, number(*s)),
                None => format!("{}: not available", name),
            };
            legend.push(LegendEntry::new(color(i).0, text));
        }
        Drawn {
            canvas,
            legend,
            note: Some("Bars left to right in key order; scale 0 to 10.".into()),
        }
    }

    fn aq_gauges(&self, aq: &AirQualitySeries) -> Drawn {
        let mut canvas = Canvas::new(self.width, self.height);
        canvas.frame(4);
        let latest = aq.latest();
        let aqi = latest.and_then(|r| r.air_quality_index);
        let pm25 = latest.and_then(|r| r.pm2_5);
        let max = aqi.unwrap_or(0.0).max(pm25.unwrap_or(0.0)).max(1.0) * 1.2;
        canvas.bar(0, 2, 0.5, aqi.unwrap_or(0.0), max, PALETTE[1]);
        canvas.bar(1, 2, 0.5, pm25.unwrap_or(0.0), max, PALETTE[5]);

        let reading = |v: Option<f64>, unit: &str| match v {
            Some(v) => format!("{}{}", number(v), unit),
            None => "not available".to_string(),
        };
        let legend = vec![
            LegendEntry::new(PALETTE[1].0, format!("Air Quality Index: {}", reading(aqi, ""))),
            LegendEntry::new(PALETTE[5].0, format!("PM2.5: {}", reading(pm25, " µg/m³"))),
        ];
        let note = latest
            .and_then(|r| r.date.as_deref().or(r.month.as_deref()))
            .map(|d| format!("Latest reading: {}.", d));
        Drawn {
            canvas,
            legend,
            note,
        }
    }

    fn wildfire_ts(&self, ts: &WildfireTimeseries) -> Drawn {
        let series: Vec<Series> = ts
            .danger_levels()
            .into_iter()
            .map(|(level, points)| Series {
                name: format!("{} danger", pretty(&level)),
                points: points.into_iter().map(|(y, d)| (y as f64, d)).collect(),
            })
            .collect();
        self.line_chart(&series, "days")
    }

    fn heatwind_scen(&self, ts: &HeatWindTimeseries) -> Drawn {
        let series: Vec<Series> = HEATWIND_SCENARIOS
            .iter()
            .map(|(col, name)| Series {
                name: name.to_string(),
                points: ts.scenario(col).into_iter().map(|(y, v)| (y as f64, v)).collect(),
            })
            .collect();
        self.line_chart(&series, "days")
    }

    fn recent_daily(&self, daily: &HeatWindDaily) -> Drawn {
        let recent = daily.recent(RECENT_DAYS);
        let mut columns: Vec<&str> = recent
            .iter()
            .flat_map(|day| day.values.keys().map(String::as_str))
            .filter(|col| !DAILY_EXCLUDED.contains(col))
            .collect();
        columns.sort_unstable();
        columns.dedup();

        // Days are evenly spaced, so the x axis is the day index.
        let series: Vec<Series> = columns
            .iter()
            .map(|col| Series {
                name: col.to_string(),
                points: recent
                    .iter()
                    .enumerate()
                    .filter_map(|(i, day)| day.values.get(*col).copied().flatten().map(|v| (i as f64, v)))
                    .collect(),
            })
            .collect();
        let mut drawn = self.line_chart(&series, "");
        if let (Some(first), Some(last)) = (recent.first(), recent.last()) {
            drawn.note = Some(format!("Daily values from {} to {}.", first.date, last.date));
        }
        drawn
    }

    fn line_chart(&self, series: &[Series], unit: &str) -> Drawn {
        let mut canvas = Canvas::new(self.width, self.height);
        canvas.frame(4);

        let (mut x_min, mut x_max, mut y_max) = (f64::MAX, f64::MIN, 0.0f64);
        for &(x, y) in series.iter().flat_map(|s| s.points.iter()) {
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_max = y_max.max(y);
        }
        if x_min > x_max {
            return Drawn {
                canvas,
                legend: Vec::new(),
                note: Some("No data points available.".into()),
            };
        }
        let y_top = y_max.max(1.0) * 1.1;
        let thickness = (self.width / 300).max(2) as i64;

        let mut legend = Vec::new();
        for (i, s) in series.iter().enumerate() {
            let pixels: Vec<(i64, i64)> = s
                .points
                .iter()
                .map(|&(x, y)| (canvas.x_for(x, x_min, x_max), canvas.y_for(y, y_top)))
                .collect();
            canvas.series(&pixels, color(i), thickness);

            let peak = s.points.iter().map(|&(_, y)| y).fold(f64::MIN, f64::max);
            let text = if s.points.is_empty() {
                format!("{}: no data", s.name)
            } else if unit.is_empty() {
                format!("{} (peak {})", s.name, number(peak))
            } else {
                format!("{} (peak {} {})", s.name, number(peak), unit)
            };
            legend.push(LegendEntry::new(color(i).0, text));
        }
        Drawn {
            canvas,
            legend,
            note: Some(format!(
                "Horizontal axis {} to {}; vertical axis 0 to {}.",
                number(x_min),
                number(x_max),
                number(y_top)
            )),
        }
    }
}

fn unavailable(key: ChartKey) -> ReportError {
    ReportError::ChartRenderFailed {
        chart: key,
        reason: format!("source dataset {} not acquired", key.source()),
    }
}

impl ChartRenderer for RasterChartRenderer {
    fn render(
        &self,
        key: ChartKey,
        datasets: &AcquiredDatasets,
        dir: &Path,
    ) -> Result<ChartArtifact> {
        let drawn = match key {
            ChartKey::RiskBar => self.risk_bar(datasets.risk_score().ok_or_else(|| unavailable(key))?),
            ChartKey::AqGauges => {
                self.aq_gauges(datasets.air_quality_daily().ok_or_else(|| unavailable(key))?)
            }
            ChartKey::WildfireTs => {
                self.wildfire_ts(datasets.wildfire_timeseries().ok_or_else(|| unavailable(key))?)
            }
            ChartKey::HeatwindScen => {
                self.heatwind_scen(datasets.heat_wind_timeseries().ok_or_else(|| unavailable(key))?)
            }
            ChartKey::RecentDaily => {
                self.recent_daily(datasets.heat_wind_daily().ok_or_else(|| unavailable(key))?)
            }
        };

        let path = dir.join(format!("{}.png", key));
        drawn
            .canvas
            .image
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| ReportError::ChartRenderFailed {
                chart: key,
                reason: e.to_string(),
            })?;
        let artifact = ChartArtifact::new(key, path).with_legend(drawn.legend);
        Ok(match drawn.note {
            Some(note) => artifact.with_note(note),
            None => artifact,
        })
    }
}
