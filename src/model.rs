//! Input datasets and output artifact types.
//!
//! Inputs are camelCase JSON, the shape the surrounding application already
//! produces, except for the price-trend points, which arrive snake_case.
//! Everything here is a read-only snapshot: the engine borrows it for the
//! length of one run and never mutates it.

use crate::config::{ReportConfig, MAX_SELECTED_CROPS};
use crate::engine::flow::Page;
use crate::engine::keys::{CanonicalKey, CropIdentity, CropSelectionKey};
use crate::error::{ReportError, SectionError};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ── Inputs ───────────────────────────────────────────────────────────────

/// A `{min, max}` range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min == 0.0 && self.max == 0.0
    }
}

/// Which of the three series a trend point belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeriesKind {
    Historical,
    Current,
    Forecast,
}

impl SeriesKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Historical => "Historical",
            Self::Current => "Current",
            Self::Forecast => "Forecast",
        }
    }
}

/// One dated observation or prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    #[serde(with = "flexible_date")]
    pub date: NaiveDate,
    pub market_value: f64,
    #[serde(default)]
    pub market_band: Band,
    #[serde(default)]
    pub confidence: Band,
}

impl TrendPoint {
    /// `(year, month)` of the point; rows are deduplicated on this.
    pub fn period(&self) -> (i32, u32) {
        (self.date.year(), self.date.month())
    }
}

/// Price history and forecast for one crop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarketPriceTrendItem {
    pub crop_name: Option<String>,
    /// Alternate spelling of `crop_name` used by some feeds.
    pub crop: Option<String>,
    pub variety: Option<String>,
    pub crop_type: Option<String>,
    pub historical: Vec<TrendPoint>,
    pub current: Vec<TrendPoint>,
    pub forecast: Vec<TrendPoint>,
}

impl MarketPriceTrendItem {
    pub fn name(&self) -> &str {
        self.crop_name
            .as_deref()
            .or(self.crop.as_deref())
            .unwrap_or_default()
    }

    /// The most recent current point.
    pub fn latest_current(&self) -> Option<&TrendPoint> {
        self.current.iter().max_by_key(|p| p.date)
    }

    /// The earliest forecast point.
    pub fn next_forecast(&self) -> Option<&TrendPoint> {
        self.forecast.iter().min_by_key(|p| p.date)
    }

    /// Percent change of the latest current value against the last
    /// historical one.
    pub fn change_pct(&self) -> Option<f64> {
        let now = self.latest_current()?.market_value;
        let before = self.historical.iter().max_by_key(|p| p.date)?.market_value;
        (before != 0.0).then(|| (now - before) / before * 100.0)
    }
}

impl CropIdentity for MarketPriceTrendItem {
    fn canonical_key(&self) -> CanonicalKey {
        CanonicalKey::new(self.name(), self.variety.as_deref(), self.crop_type.as_deref())
    }
}

/// A ranked crop from the "top performers" feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopPerformingCrop {
    pub crop_name: Option<String>,
    pub crop: Option<String>,
    pub variety: Option<String>,
    pub crop_type: Option<String>,
    pub rank: u32,
    #[serde(alias = "priceRange")]
    pub price_band: Band,
    #[serde(alias = "avgPrice")]
    pub average_price: f64,
    pub percent_change: f64,
}

impl TopPerformingCrop {
    pub fn name(&self) -> &str {
        self.crop_name
            .as_deref()
            .or(self.crop.as_deref())
            .unwrap_or_default()
    }
}

impl CropIdentity for TopPerformingCrop {
    fn canonical_key(&self) -> CanonicalKey {
        CanonicalKey::new(self.name(), self.variety.as_deref(), self.crop_type.as_deref())
    }
}

/// One slice of a distribution dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionItem {
    #[serde(alias = "name", alias = "region", alias = "category")]
    pub label: String,
    #[serde(alias = "value")]
    pub percentage: f64,
}

/// Mention counts for one source, keyed by crop name.
///
/// Rows arrive as `{source, <crop>: <count>, …}`. Fractional counts are
/// rounded, negative ones become 0, and non-numeric fields such as ids or
/// notes are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSentimentRow")]
pub struct SentimentRow {
    pub source: String,
    #[serde(flatten)]
    pub counts: BTreeMap<String, u64>,
}

#[derive(Deserialize)]
struct RawSentimentRow {
    source: String,
    #[serde(flatten)]
    fields: BTreeMap<String, serde_json::Value>,
}

impl From<RawSentimentRow> for SentimentRow {
    fn from(raw: RawSentimentRow) -> Self {
        let counts = raw
            .fields
            .into_iter()
            .filter_map(|(column, value)| value.as_f64().map(|n| (column, mention_count(n))))
            .collect();
        Self {
            source: raw.source,
            counts,
        }
    }
}

fn mention_count(n: f64) -> u64 {
    if n.is_finite() && n > 0.0 {
        n.round() as u64
    } else {
        0
    }
}

impl SentimentRow {
    pub fn count(&self, column: &str) -> u64 {
        self.counts.get(column).copied().unwrap_or(0)
    }
}

/// Everything one report is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportInputs {
    pub report: ReportConfig,
    pub selected_crop_keys: Vec<String>,
    pub price_trends: Vec<MarketPriceTrendItem>,
    pub sentiment: Vec<SentimentRow>,
    pub top_performers: Vec<TopPerformingCrop>,
    pub regional_distribution: Vec<DistributionItem>,
    pub product_type_distribution: Vec<DistributionItem>,
    pub market_players_by_category: Vec<DistributionItem>,
    /// Report period; defaults to today's local date.
    #[serde(with = "flexible_date::option")]
    pub generated_on: Option<NaiveDate>,
}

impl ReportInputs {
    pub fn new(report: ReportConfig, selected: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            report,
            selected_crop_keys: selected.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Parse and validate the crop selection.
    pub fn selections(&self) -> Result<Vec<CropSelectionKey>, ReportError> {
        match self.selected_crop_keys.len() {
            0 => {
                return Err(ReportError::NoCropsSelected {
                    max: MAX_SELECTED_CROPS,
                })
            }
            n if n > MAX_SELECTED_CROPS => {
                return Err(ReportError::TooManyCrops {
                    count: n,
                    max: MAX_SELECTED_CROPS,
                })
            }
            _ => {}
        }
        self.selected_crop_keys.iter().map(|k| k.parse()).collect()
    }

    pub fn report_date(&self) -> NaiveDate {
        self.generated_on
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    pub fn has_distribution(&self) -> bool {
        !self.regional_distribution.is_empty()
            || !self.product_type_distribution.is_empty()
            || !self.market_players_by_category.is_empty()
    }

    /// Sorted union of crop columns across all sentiment rows.
    pub fn sentiment_columns(&self) -> Vec<String> {
        self.sentiment
            .iter()
            .flat_map(|r| r.counts.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Dates arrive as `YYYY-MM-DD`, `YYYY-MM`, or a full ISO timestamp.
mod flexible_date {
    use chrono::NaiveDate;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Option<NaiveDate> {
        let s = s.trim();
        let head = s.get(..10).unwrap_or(s);
        NaiveDate::parse_from_str(head, "%Y-%m-%d")
            .ok()
            .or_else(|| NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d").ok())
    }

    pub fn serialize<S: Serializer>(date: &NaiveDate, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&date.format("%Y-%m-%d").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("unrecognised date '{raw}'")))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
            match date {
                Some(d) => super::serialize(d, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
            match Option::<String>::deserialize(d)? {
                Some(raw) if !raw.trim().is_empty() => parse(&raw)
                    .map(Some)
                    .ok_or_else(|| D::Error::custom(format!("unrecognised date '{raw}'"))),
                _ => Ok(None),
            }
        }
    }
}

// ── Outputs ──────────────────────────────────────────────────────────────

/// How a section ended up in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    Complete,
    /// Emitted with at least one placeholder.
    Degraded,
}

/// Per-section record in [`ReportStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionOutcome {
    pub name: String,
    pub kind: String,
    /// 1-indexed first and last page the section touched.
    pub first_page: usize,
    pub last_page: usize,
    pub charts_embedded: usize,
    pub status: SectionStatus,
}

/// A non-fatal condition and the section it happened in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionWarning {
    pub section: String,
    pub error: SectionError,
}

/// Summary of one generation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    pub page_count: usize,
    pub sections: Vec<SectionOutcome>,
    pub warnings: Vec<SectionWarning>,
    pub charts_embedded: usize,
    pub pdf_bytes: usize,
    pub content_duration_ms: u64,
    pub capture_duration_ms: u64,
    pub write_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// A finished report.
#[derive(Debug, Clone)]
pub struct ReportArtifact {
    /// File stem, without the `.pdf` extension.
    pub filename: String,
    pub pdf: Vec<u8>,
    /// The stamped display list the PDF was serialised from.
    pub pages: Vec<Page>,
    pub stats: ReportStats,
}

impl ReportArtifact {
    pub fn file_name(&self) -> String {
        format!("{}.pdf", self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::keys::find_match;

    const INPUTS: &str = r#"{
        "report": {"country": "UAE", "city": "Abu Dhabi", "cropType": "Leafy Greens", "currency": "AED", "weight": "kg"},
        "selectedCropKeys": ["kale-red_russian"],
        "priceTrends": [
            {"cropName": "Kale", "variety": "Curly", "current": []},
            {"crop": "Kale", "variety": "Red Russian",
             "historical": [{"date": "2026-01", "market_value": 10.0, "market_band": {"min": 9, "max": 11}, "confidence": {"min": 0, "max": 0}}],
             "current": [{"date": "2026-03-15T00:00:00Z", "market_value": 12.0, "market_band": {"min": 11, "max": 13}, "confidence": {"min": 0, "max": 0}}],
             "forecast": []}
        ],
        "sentiment": [{"source": "Chef Amal", "kale": 12, "basil": 3}, {"source": "Grocer", "mint": 1}],
        "generatedOn": "2026-03-20"
    }"#;

    #[test]
    fn inputs_deserialise_and_match() {
        let inputs: ReportInputs = serde_json::from_str(INPUTS).unwrap();
        let keys = inputs.selections().unwrap();
        let hit = find_match(&keys[0].canonical_key(), &inputs.price_trends).expect("match");
        assert_eq!(hit.name(), "Kale");
        assert_eq!(hit.variety.as_deref(), Some("Red Russian"));
        assert_eq!(hit.historical[0].date, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(hit.latest_current().unwrap().period(), (2026, 3));
        assert_eq!(inputs.report_date(), NaiveDate::from_ymd_opt(2026, 3, 20).unwrap());
    }

    #[test]
    fn change_pct_against_last_historical() {
        let inputs: ReportInputs = serde_json::from_str(INPUTS).unwrap();
        let pct = inputs.price_trends[1].change_pct().unwrap();
        assert!((pct - 20.0).abs() < 1e-9);
        assert!(inputs.price_trends[0].change_pct().is_none());
    }

    #[test]
    fn sentiment_columns_are_sorted_union() {
        let inputs: ReportInputs = serde_json::from_str(INPUTS).unwrap();
        assert_eq!(inputs.sentiment_columns(), ["basil", "kale", "mint"]);
        assert_eq!(inputs.sentiment[1].count("kale"), 0);
    }

    #[test]
    fn sentiment_counts_tolerate_floats_and_extra_fields() {
        let row: SentimentRow =
            serde_json::from_str(r#"{"source": "Reddit", "Kale": 12.5, "Basil": 3, "Mint": -4}"#).unwrap();
        assert_eq!(row.count("Kale"), 13);
        assert_eq!(row.count("Basil"), 3);
        assert_eq!(row.count("Mint"), 0);

        let row: SentimentRow =
            serde_json::from_str(r#"{"source": "Reddit", "id": "abc", "note": null, "Kale": 4}"#).unwrap();
        assert_eq!(row.source, "Reddit");
        assert_eq!(row.counts, BTreeMap::from([("Kale".to_string(), 4)]));
    }

    #[test]
    fn selection_count_is_bounded() {
        let none = ReportInputs::new(ReportConfig::default(), Vec::<String>::new());
        assert!(matches!(none.selections(), Err(ReportError::NoCropsSelected { .. })));

        let four = ReportInputs::new(ReportConfig::default(), ["a-1", "b-2", "c-3", "d-4"]);
        assert!(matches!(
            four.selections(),
            Err(ReportError::TooManyCrops { count: 4, max: 3 })
        ));
    }

    #[test]
    fn missing_date_defaults_to_today() {
        let inputs = ReportInputs::new(ReportConfig::default(), ["kale-curly"]);
        assert_eq!(inputs.report_date(), chrono::Local::now().date_naive());
    }

    #[test]
    fn distribution_aliases() {
        let item: DistributionItem = serde_json::from_str(r#"{"name": "North", "value": 40}"#).unwrap();
        assert_eq!(item.label, "North");
        assert_eq!(item.percentage, 40.0);
    }
}
