//! Core data types
//!
//! This module defines the records that flow between the sampler, the feature
//! derivation engine, the training pipeline and the inference adapter.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of features consumed by the classifier
pub const FEATURE_COUNT: usize = 12;

/// Feature names in the exact order the classifier is fitted on.
///
/// This list is the only definition of the feature contract. Training writes it
/// into the model artifact and loading compares it back.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "sleep_quality_numeric",
    "time_numeric",
    "weekday_numeric",
    "temperature_c",
    "humidity_percent",
    "weather_type_numeric",
    "time_since_last_meal_min",
    "time_since_last_void_min",
    "recent_accident_flag",
    "toileting_status_bucket_numeric",
    "transition_type_numeric",
    "social_context_numeric",
];

/// Binary training target column
pub const TARGET_COLUMN: &str = "escalation_label";

/// Columns produced by the sampler that must never reach the classifier.
///
/// They are partially derived from the same risk score as the label.
pub const LEAKAGE_COLUMNS: [&str; 4] = [
    "behaviour_topography",
    "antecedent_category_numeric",
    "function_inferred_numeric",
    "behaviour_level",
];

/// Spread of the noise-driven sampler fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variability {
    Tight,
    #[default]
    Baseline,
    Wide,
}

impl Variability {
    /// Multiplier applied to the standard deviation of noise-driven fields
    pub fn spread(self) -> f64 {
        match self {
            Variability::Tight => 0.7,
            Variability::Baseline => 1.0,
            Variability::Wide => 1.35,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Variability::Tight => "tight",
            Variability::Baseline => "baseline",
            Variability::Wide => "wide",
        }
    }
}

impl fmt::Display for Variability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tight" => Ok(Variability::Tight),
            "baseline" => Ok(Variability::Baseline),
            "wide" => Ok(Variability::Wide),
            other => Err(format!(
                "unknown variability '{other}' (expected tight, baseline or wide)"
            )),
        }
    }
}

/// One synthetic training record.
///
/// Field order is the dataset column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSample {
    /// Sleep quality (0 = poor, 1 = fair, 2 = good)
    pub sleep_quality_numeric: i64,
    /// Minute of day (360..1440)
    pub time_numeric: i64,
    /// Day of week (0 = Monday .. 6 = Sunday)
    pub weekday_numeric: i64,
    pub temperature_c: i64,
    pub humidity_percent: i64,
    /// Weather bucket (0..=3)
    pub weather_type_numeric: i64,
    pub time_since_last_meal_min: i64,
    pub time_since_last_void_min: i64,
    pub recent_accident_flag: i64,
    pub toileting_status_bucket_numeric: i64,
    pub transition_type_numeric: i64,
    pub social_context_numeric: i64,
    pub antecedent_category_numeric: i64,
    pub function_inferred_numeric: i64,
    /// Ordinal severity derived from the latent risk (0..=3)
    pub behaviour_level: i64,
    pub escalation_label: i64,
    /// Topography tag, empty unless escalated
    pub behaviour_topography: String,
}

/// The fixed 12-feature input of the classifier.
///
/// A `None` means the value could not be derived and no fallback was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub sleep_quality_numeric: Option<f64>,
    pub time_numeric: Option<f64>,
    pub weekday_numeric: Option<f64>,
    pub temperature_c: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub weather_type_numeric: Option<f64>,
    pub time_since_last_meal_min: Option<f64>,
    pub time_since_last_void_min: Option<f64>,
    pub recent_accident_flag: Option<f64>,
    pub toileting_status_bucket_numeric: Option<f64>,
    pub transition_type_numeric: Option<f64>,
    pub social_context_numeric: Option<f64>,
}

impl FeatureVector {
    /// Values in [`FEATURE_NAMES`] order
    pub fn values(&self) -> [Option<f64>; FEATURE_COUNT] {
        [
            self.sleep_quality_numeric,
            self.time_numeric,
            self.weekday_numeric,
            self.temperature_c,
            self.humidity_percent,
            self.weather_type_numeric,
            self.time_since_last_meal_min,
            self.time_since_last_void_min,
            self.recent_accident_flag,
            self.toileting_status_bucket_numeric,
            self.transition_type_numeric,
            self.social_context_numeric,
        ]
    }

    /// Build a vector from values in [`FEATURE_NAMES`] order
    pub fn from_values(values: [Option<f64>; FEATURE_COUNT]) -> Self {
        let [
            sleep_quality_numeric,
            time_numeric,
            weekday_numeric,
            temperature_c,
            humidity_percent,
            weather_type_numeric,
            time_since_last_meal_min,
            time_since_last_void_min,
            recent_accident_flag,
            toileting_status_bucket_numeric,
            transition_type_numeric,
            social_context_numeric,
        ] = values;
        Self {
            sleep_quality_numeric,
            time_numeric,
            weekday_numeric,
            temperature_c,
            humidity_percent,
            weather_type_numeric,
            time_since_last_meal_min,
            time_since_last_void_min,
            recent_accident_flag,
            toileting_status_bucket_numeric,
            transition_type_numeric,
            social_context_numeric,
        }
    }

    /// Project a synthetic sample onto the classifier features
    pub fn from_sample(sample: &BehaviorSample) -> Self {
        Self::from_values([
            Some(sample.sleep_quality_numeric as f64),
            Some(sample.time_numeric as f64),
            Some(sample.weekday_numeric as f64),
            Some(sample.temperature_c as f64),
            Some(sample.humidity_percent as f64),
            Some(sample.weather_type_numeric as f64),
            Some(sample.time_since_last_meal_min as f64),
            Some(sample.time_since_last_void_min as f64),
            Some(sample.recent_accident_flag as f64),
            Some(sample.toileting_status_bucket_numeric as f64),
            Some(sample.transition_type_numeric as f64),
            Some(sample.social_context_numeric as f64),
        ])
    }

    /// Dense row in [`FEATURE_NAMES`] order; missing values become NaN
    pub fn to_row(&self) -> [f64; FEATURE_COUNT] {
        self.values().map(|value| value.unwrap_or(f64::NAN))
    }

    /// Feature names as owned strings, in fit order
    pub fn names() -> Vec<String> {
        FEATURE_NAMES.iter().map(|name| name.to_string()).collect()
    }
}

/// Kind of transition the individual is facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    None,
    Minor,
    Moderate,
    Major,
}

impl TransitionType {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "none" => Some(TransitionType::None),
            "minor" => Some(TransitionType::Minor),
            "moderate" => Some(TransitionType::Moderate),
            "major" => Some(TransitionType::Major),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            TransitionType::None => 0,
            TransitionType::Minor => 1,
            TransitionType::Moderate => 2,
            TransitionType::Major => 3,
        }
    }
}

/// Social setting at prediction time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialContext {
    Alone,
    PlusOne,
    SmallGroup,
    LargeGroup,
}

impl SocialContext {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "alone" => Some(SocialContext::Alone),
            "plus_one" => Some(SocialContext::PlusOne),
            "small_group" => Some(SocialContext::SmallGroup),
            "large_group" => Some(SocialContext::LargeGroup),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            SocialContext::Alone => 0,
            SocialContext::PlusOne => 1,
            SocialContext::SmallGroup => 2,
            SocialContext::LargeGroup => 3,
        }
    }
}

/// Weather condition bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherType {
    Clear,
    Overcast,
    Precipitation,
    Severe,
}

impl WeatherType {
    pub fn code(self) -> u8 {
        match self {
            WeatherType::Clear => 0,
            WeatherType::Overcast => 1,
            WeatherType::Precipitation => 2,
            WeatherType::Severe => 3,
        }
    }
}

/// Toileting status bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToiletingStatus {
    /// Voiding observed in the last 60 minutes, no accident on record
    Normal,
    /// Voiding observed in the last 60 minutes, accident on record before that
    EarlierAccident,
    /// No voiding event in the last 60 minutes
    NoVoidInWindow,
    /// Accident in the last 60 minutes
    RecentAccident,
}

impl ToiletingStatus {
    pub fn code(self) -> u8 {
        match self {
            ToiletingStatus::Normal => 0,
            ToiletingStatus::EarlierAccident => 1,
            ToiletingStatus::NoVoidInWindow => 2,
            ToiletingStatus::RecentAccident => 3,
        }
    }
}

/// Bathroom log entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BathroomEventKind {
    NoVoid,
    Urine,
    BowelMovement,
    UrineAccident,
    BowelMovementAccident,
}

impl BathroomEventKind {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "no void" => Some(BathroomEventKind::NoVoid),
            "urine" => Some(BathroomEventKind::Urine),
            "bowel movement" => Some(BathroomEventKind::BowelMovement),
            "urine accident" => Some(BathroomEventKind::UrineAccident),
            "bowel movement accident" => Some(BathroomEventKind::BowelMovementAccident),
            _ => None,
        }
    }

    /// Any event where something was voided, accidents included
    pub fn is_void(self) -> bool {
        !matches!(self, BathroomEventKind::NoVoid)
    }

    pub fn is_accident(self) -> bool {
        matches!(
            self,
            BathroomEventKind::UrineAccident | BathroomEventKind::BowelMovementAccident
        )
    }
}

/// A timestamped entry from a meal or bathroom log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    /// Entry type label (e.g. "meal", "snack", "urine accident")
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// RFC3339, naive ISO date-time or "HH:MM"
    #[serde(default)]
    pub time: Option<String>,
}

impl TimedEvent {
    pub fn new(kind: &str, time: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.to_string()),
            time: Some(time.into()),
        }
    }
}

/// Time of day as sent by callers: either HHMM already or an "HH:MM" string
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TimeOfDay {
    Numeric(f64),
    Text(String),
}

/// Raw prediction request as received from the serving layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    #[serde(default, deserialize_with = "lenient_number")]
    pub sleep_quality_numeric: Option<f64>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub time_numeric: Option<TimeOfDay>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub weekday_numeric: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub temperature_c: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub humidity_percent: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub weather_type_numeric: Option<f64>,
    /// Pre-computed fallback when the meal log yields nothing
    #[serde(default, deserialize_with = "lenient_number")]
    pub time_since_last_meal_min: Option<f64>,
    /// Pre-computed fallback when the bathroom log has no "no void" entry
    #[serde(default, deserialize_with = "lenient_number")]
    pub time_since_last_void_min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_events")]
    pub meals: Vec<TimedEvent>,
    #[serde(
        default,
        rename = "bathroomVisits",
        alias = "bathroom_visits",
        deserialize_with = "lenient_events"
    )]
    pub bathroom_visits: Vec<TimedEvent>,
    #[serde(
        default,
        rename = "transitionType",
        alias = "transition_type",
        deserialize_with = "lenient_label"
    )]
    pub transition_type: Option<String>,
    #[serde(
        default,
        rename = "socialInteractionContext",
        alias = "social_context",
        deserialize_with = "lenient_label"
    )]
    pub social_context: Option<String>,
}

/// Accept numbers and numeric strings; anything else becomes `None`
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(serde_json::Value::Bool(b)) => Some(if b { 1.0 } else { 0.0 }),
        _ => None,
    })
}

fn lenient_time<'de, D>(deserializer: D) -> Result<Option<TimeOfDay>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().map(TimeOfDay::Numeric),
        Some(serde_json::Value::String(s)) => Some(TimeOfDay::Text(s)),
        _ => None,
    })
}

/// Accept an array of event objects.
///
/// A missing, null or non-array log is empty. Entries that are not objects are
/// skipped, and a non-string `type` or `time` is treated as absent.
fn lenient_events<'de, D>(deserializer: D) -> Result<Vec<TimedEvent>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let entries = match value {
        Some(serde_json::Value::Array(entries)) => entries,
        _ => return Ok(Vec::new()),
    };
    Ok(entries
        .iter()
        .filter_map(|entry| {
            let object = entry.as_object()?;
            let text = |key: &str| {
                object
                    .get(key)
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            };
            Some(TimedEvent {
                kind: text("type"),
                time: text("time"),
            })
        })
        .collect())
}

/// Accept a string label; anything else becomes `None`
fn lenient_label<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        _ => None,
    })
}

/// Class probabilities, rounded to three decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassProbabilities {
    pub low_risk: f64,
    pub high_risk: f64,
}

/// Intermediate values computed from the raw request, returned for audit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalculatedValues {
    pub time_since_last_meal_min: Option<i64>,
    pub time_since_last_void_min: Option<i64>,
    pub toileting_status_bucket_numeric: u8,
    pub recent_accident_flag: u8,
    pub transition_type_numeric: u8,
    pub social_context_numeric: u8,
}

/// Weather values that fed the prediction when a live snapshot was available
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherUsed {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub condition: String,
    pub type_numeric: Option<f64>,
}

/// Prediction returned to the serving layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// 1 = escalation risk, 0 = low risk
    pub prediction: u8,
    pub prediction_label: String,
    /// Probability of the predicted class
    pub confidence: f64,
    pub probabilities: ClassProbabilities,
    /// Threshold applied to the high-risk probability
    pub decision_threshold: f64,
    pub calculated_values: CalculatedValues,
    pub weather_used: Option<WeatherUsed>,
}
