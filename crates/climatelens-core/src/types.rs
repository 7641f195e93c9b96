use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A resolved location. Every dataset lookup is keyed by one of these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

/// The provider endpoints a report can draw on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKind {
    /// Composite air quality / flood / wildfire scores on a 0-10 scale.
    RiskScore,
    AirQualityDaily,
    AirQualityMonthly,
    /// Whether the location sits inside a mapped flood zone.
    FloodZone,
    /// Wildfire risk class within a 1km radius.
    WildfireCurrent,
    /// Danger days per year, per danger level.
    WildfireTimeseries,
    HeatWindDaily,
    /// Climate-scenario projections (RCP4.5 / RCP8.5) per year.
    HeatWindTimeseries,
}

impl DatasetKind {
    /// The seven lookups fetched for every report, in result order.
    pub const REPORT_BATCH: [DatasetKind; 7] = [
        DatasetKind::RiskScore,
        DatasetKind::AirQualityDaily,
        DatasetKind::FloodZone,
        DatasetKind::WildfireCurrent,
        DatasetKind::WildfireTimeseries,
        DatasetKind::HeatWindDaily,
        DatasetKind::HeatWindTimeseries,
    ];

    /// Provider path, relative to the API base URL.
    pub fn endpoint(self) -> &'static str {
        match self {
            DatasetKind::RiskScore => "/api/climate_risk/risk_score",
            DatasetKind::AirQualityDaily => "/api/airquality/timeseries-daily",
            DatasetKind::AirQualityMonthly => "/api/airquality/timeseries-monthly",
            DatasetKind::FloodZone => "/api/flood/zone-current",
            DatasetKind::WildfireCurrent => "/api/wildfire/risk-current",
            DatasetKind::WildfireTimeseries => "/api/wildfire/timeseries",
            DatasetKind::HeatWindDaily => "/api/heat-wind/daily",
            DatasetKind::HeatWindTimeseries => "/api/heat-wind/timeseries",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DatasetKind::RiskScore => "risk_score",
            DatasetKind::AirQualityDaily => "air_quality_daily",
            DatasetKind::AirQualityMonthly => "air_quality_monthly",
            DatasetKind::FloodZone => "flood_zone",
            DatasetKind::WildfireCurrent => "wildfire_current",
            DatasetKind::WildfireTimeseries => "wildfire_timeseries",
            DatasetKind::HeatWindDaily => "heat_wind_daily",
            DatasetKind::HeatWindTimeseries => "heat_wind_timeseries",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === Dataset records ===

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RiskScore {
    #[serde(default)]
    pub scores: RiskScores,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RiskScores {
    pub air_quality: Option<f64>,
    pub flood_risk: Option<f64>,
    pub wildfire_risk: Option<f64>,
}

/// Air-quality series. The provider returns either a bare list or a list
/// wrapped in `air_quality_timeseries`; both decode to the same shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "AirQualityPayload")]
pub struct AirQualitySeries {
    pub records: Vec<AirQualityRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AirQualityRecord {
    pub date: Option<String>,
    pub month: Option<String>,
    pub air_quality_index: Option<f64>,
    pub pm2_5: Option<f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AirQualityPayload {
    Wrapped {
        air_quality_timeseries: Vec<AirQualityRecord>,
    },
    Bare(Vec<AirQualityRecord>),
}

impl From<AirQualityPayload> for AirQualitySeries {
    fn from(payload: AirQualityPayload) -> Self {
        let records = match payload {
            AirQualityPayload::Wrapped {
                air_quality_timeseries,
            } => air_quality_timeseries,
            AirQualityPayload::Bare(records) => records,
        };
        Self { records }
    }
}

impl AirQualitySeries {
    /// Most recent record (the provider orders oldest first).
    pub fn latest(&self) -> Option<&AirQualityRecord> {
        self.records.last()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FloodZone {
    pub flood_zone: Option<FloodZoneFlag>,
}

/// Some provider revisions send a boolean, others a zone label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FloodZoneFlag {
    Flag(bool),
    Label(String),
}

impl FloodZoneFlag {
    pub fn in_zone(&self) -> Option<bool> {
        match self {
            FloodZoneFlag::Flag(b) => Some(*b),
            FloodZoneFlag::Label(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
        }
    }
}

impl fmt::Display for FloodZoneFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FloodZoneFlag::Flag(b) => write!(f, "{}", b),
            FloodZoneFlag::Label(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WildfireCurrent {
    #[serde(default)]
    pub properties: WildfireProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WildfireProperties {
    #[serde(default, deserialize_with = "text_or_number")]
    pub fire_risk_class: Option<String>,
}

/// Columns the provider repeats in every row that are not measurements.
const WILDFIRE_META_COLUMNS: [&str; 3] = ["latitude", "longitude", "year"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WildfireTimeseries {
    /// Year label → column → value.
    #[serde(rename = "wildfire_risk_timeseries_data", default)]
    pub years: BTreeMap<String, BTreeMap<String, Option<f64>>>,
}

impl WildfireTimeseries {
    /// Danger days per danger level as (year, days) points, ordered by year.
    pub fn danger_levels(&self) -> BTreeMap<String, Vec<(i32, f64)>> {
        let mut levels: BTreeMap<String, Vec<(i32, f64)>> = BTreeMap::new();
        for (label, columns) in &self.years {
            let year = match label.trim().parse::<i32>() {
                Ok(y) => y,
                Err(_) => match columns.get("year").copied().flatten() {
                    Some(y) => y as i32,
                    None => continue,
                },
            };
            for (column, value) in columns {
                if WILDFIRE_META_COLUMNS.contains(&column.as_str()) {
                    continue;
                }
                if let Some(days) = value {
                    levels.entry(column.clone()).or_default().push((year, *days));
                }
            }
        }
        for points in levels.values_mut() {
            points.sort_by_key(|(year, _)| *year);
        }
        levels
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HeatWindTimeseries {
    #[serde(rename = "heat_wind_timeseries_data", default)]
    pub years: Vec<HeatWindYear>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeatWindYear {
    #[serde(deserialize_with = "year_number")]
    pub year: i32,
    #[serde(flatten)]
    pub series: BTreeMap<String, Option<f64>>,
}

impl HeatWindTimeseries {
    /// (year, value) points for one scenario column, skipping missing values.
    pub fn scenario(&self, column: &str) -> Vec<(i32, f64)> {
        let mut points: Vec<(i32, f64)> = self
            .years
            .iter()
            .filter_map(|row| row.series.get(column).copied().flatten().map(|v| (row.year, v)))
            .collect();
        points.sort_by_key(|(year, _)| *year);
        points
    }
}

/// Daily heat/wind observations, bare or wrapped in `heat_wind_daily_data`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "HeatWindDailyPayload")]
pub struct HeatWindDaily {
    pub days: Vec<HeatWindDay>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeatWindDay {
    pub date: String,
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HeatWindDailyPayload {
    Wrapped { heat_wind_daily_data: Vec<HeatWindDay> },
    Bare(Vec<HeatWindDay>),
}

impl From<HeatWindDailyPayload> for HeatWindDaily {
    fn from(payload: HeatWindDailyPayload) -> Self {
        let days = match payload {
            HeatWindDailyPayload::Wrapped {
                heat_wind_daily_data,
            } => heat_wind_daily_data,
            HeatWindDailyPayload::Bare(days) => days,
        };
        Self { days }
    }
}

impl HeatWindDaily {
    /// The trailing `n` days.
    pub fn recent(&self, n: usize) -> &[HeatWindDay] {
        let start = self.days.len().saturating_sub(n);
        &self.days[start..]
    }
}

/// One decoded provider payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    RiskScore(RiskScore),
    AirQualityDaily(AirQualitySeries),
    AirQualityMonthly(AirQualitySeries),
    FloodZone(FloodZone),
    WildfireCurrent(WildfireCurrent),
    WildfireTimeseries(WildfireTimeseries),
    HeatWindDaily(HeatWindDaily),
    HeatWindTimeseries(HeatWindTimeseries),
}

impl Dataset {
    pub fn kind(&self) -> DatasetKind {
        match self {
            Dataset::RiskScore(_) => DatasetKind::RiskScore,
            Dataset::AirQualityDaily(_) => DatasetKind::AirQualityDaily,
            Dataset::AirQualityMonthly(_) => DatasetKind::AirQualityMonthly,
            Dataset::FloodZone(_) => DatasetKind::FloodZone,
            Dataset::WildfireCurrent(_) => DatasetKind::WildfireCurrent,
            Dataset::WildfireTimeseries(_) => DatasetKind::WildfireTimeseries,
            Dataset::HeatWindDaily(_) => DatasetKind::HeatWindDaily,
            Dataset::HeatWindTimeseries(_) => DatasetKind::HeatWindTimeseries,
        }
    }

    /// Decode a raw provider response into the record type for `kind`.
    pub fn from_json(kind: DatasetKind, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            DatasetKind::RiskScore => Dataset::RiskScore(serde_json::from_value(value)?),
            DatasetKind::AirQualityDaily => Dataset::AirQualityDaily(serde_json::from_value(value)?),
            DatasetKind::AirQualityMonthly => {
                Dataset::AirQualityMonthly(serde_json::from_value(value)?)
            }
            DatasetKind::FloodZone => Dataset::FloodZone(serde_json::from_value(value)?),
            DatasetKind::WildfireCurrent => Dataset::WildfireCurrent(serde_json::from_value(value)?),
            DatasetKind::WildfireTimeseries => {
                Dataset::WildfireTimeseries(serde_json::from_value(value)?)
            }
            DatasetKind::HeatWindDaily => Dataset::HeatWindDaily(serde_json::from_value(value)?),
            DatasetKind::HeatWindTimeseries => {
                Dataset::HeatWindTimeseries(serde_json::from_value(value)?)
            }
        })
    }
}

fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(serde_json::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn year_number<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .map(|y| y as i32)
            .ok_or_else(|| D::Error::custom("year out of range")),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid year '{}'", s))),
        other => Err(D::Error::custom(format!("invalid year {}", other))),
    }
}
