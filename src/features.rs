//! Feature derivation
//!
//! Converts a raw prediction request (irregular meal and bathroom logs,
//! categorical strings, an optional live weather snapshot) into the fixed
//! classifier feature vector.
//!
//! Derivation never fails: unparseable timestamps are skipped, unknown
//! categories map to 0 and out-of-range numbers pass through unchanged.

use crate::types::{
    BathroomEventKind, CalculatedValues, FeatureVector, PredictionRequest, SocialContext,
    TimeOfDay, TimedEvent, ToiletingStatus, TransitionType, WeatherUsed,
};
use crate::weather::WeatherSnapshot;
use chrono::{DateTime, FixedOffset, NaiveDateTime, NaiveTime, TimeZone};

/// Look-back window for the toileting status bucket (60 minutes)
const TOILETING_WINDOW_SEC: i64 = 3600;

/// Naive date-time layouts accepted in event logs
const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Clock-time layouts accepted in event logs (interpreted as today)
const CLOCK_TIME_FORMATS: [&str; 2] = ["%H:%M", "%H:%M:%S"];

/// Everything derived from one request
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedFeatures {
    pub vector: FeatureVector,
    pub calculated: CalculatedValues,
    /// Present only when a live weather snapshot fed the vector
    pub weather_used: Option<WeatherUsed>,
}

/// Feature deriver for prediction requests
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Derive the classifier features as of `now`
    pub fn derive(
        request: &PredictionRequest,
        weather: Option<&WeatherSnapshot>,
        now: DateTime<FixedOffset>,
    ) -> DerivedFeatures {
        // Physiological context
        let meal_gap = minutes_since_latest(&request.meals, |_| true, now);
        let void_gap = minutes_since_latest(
            &request.bathroom_visits,
            |kind| kind == Some(BathroomEventKind::NoVoid),
            now,
        );
        let toileting = toileting_status(&request.bathroom_visits, now);
        let recent_accident_flag = u8::from(toileting == ToiletingStatus::RecentAccident);

        // Environmental context
        let transition = transition_code(request.transition_type.as_deref());
        let social = social_code(request.social_context.as_deref());

        let (temperature, humidity, weather_type, weather_used) = match weather {
            Some(snapshot) => {
                let temperature = snapshot.temperature.or(request.temperature_c);
                let humidity = snapshot.humidity.or(request.humidity_percent);
                let weather_type = Some(f64::from(snapshot.weather_type().code()));
                let used = WeatherUsed {
                    temperature,
                    humidity,
                    condition: snapshot.condition_label().to_string(),
                    type_numeric: weather_type,
                };
                (temperature, humidity, weather_type, Some(used))
            }
            None => (
                request.temperature_c,
                request.humidity_percent,
                request.weather_type_numeric,
                None,
            ),
        };

        let time_numeric = request
            .time_numeric
            .as_ref()
            .and_then(normalize_time_of_day)
            .map(|t| t as f64);

        let vector = FeatureVector {
            sleep_quality_numeric: request.sleep_quality_numeric,
            time_numeric,
            weekday_numeric: request.weekday_numeric,
            temperature_c: temperature,
            humidity_percent: humidity,
            weather_type_numeric: weather_type,
            time_since_last_meal_min: meal_gap
                .map(|m| m as f64)
                .or(request.time_since_last_meal_min),
            time_since_last_void_min: void_gap
                .map(|m| m as f64)
                .or(request.time_since_last_void_min),
            recent_accident_flag: Some(f64::from(recent_accident_flag)),
            toileting_status_bucket_numeric: Some(f64::from(toileting.code())),
            transition_type_numeric: Some(f64::from(transition)),
            social_context_numeric: Some(f64::from(social)),
        };

        log::debug!("derived features: {:?}", vector);

        DerivedFeatures {
            vector,
            calculated: CalculatedValues {
                time_since_last_meal_min: meal_gap,
                time_since_last_void_min: void_gap,
                toileting_status_bucket_numeric: toileting.code(),
                recent_accident_flag,
                transition_type_numeric: transition,
                social_context_numeric: social,
            },
            weather_used,
        }
    }
}

/// Parse an event timestamp relative to `now`.
///
/// Accepts RFC3339, naive ISO date-times (in `now`'s offset) and bare clock
/// times such as "08:30" (today, in `now`'s offset).
pub fn parse_event_time(raw: &str, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t);
    }

    let offset = *now.offset();

    let naive = NAIVE_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            CLOCK_TIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
                .map(|time| now.date_naive().and_time(time))
        })?;

    offset.from_local_datetime(&naive).single()
}

/// Whole minutes between the most recent matching event and `now`.
///
/// Events with missing or unparseable times are skipped. Returns `None` when
/// no event qualifies. Future events yield negative minutes.
pub fn minutes_since_latest<F>(
    events: &[TimedEvent],
    include: F,
    now: DateTime<FixedOffset>,
) -> Option<i64>
where
    F: Fn(Option<BathroomEventKind>) -> bool,
{
    events
        .iter()
        .filter(|e| include(e.kind.as_deref().and_then(BathroomEventKind::from_label)))
        .filter_map(|e| timestamp_of(e, now))
        .max()
        .map(|latest| (now - latest).num_seconds() / 60)
}

/// Classify the bathroom log into a toileting status bucket.
///
/// Priority:
/// 1. an accident within the last 60 minutes → `RecentAccident` (3)
/// 2. no voiding event within the last 60 minutes → `NoVoidInWindow` (2)
/// 3. an accident on record before the window → `EarlierAccident` (1)
/// 4. otherwise → `Normal` (0)
///
/// An empty log carries no information and yields `Normal`.
pub fn toileting_status(visits: &[TimedEvent], now: DateTime<FixedOffset>) -> ToiletingStatus {
    let timed: Vec<(Option<BathroomEventKind>, DateTime<FixedOffset>)> = visits
        .iter()
        .filter_map(|v| {
            let kind = v.kind.as_deref().and_then(BathroomEventKind::from_label);
            timestamp_of(v, now).map(|t| (kind, t))
        })
        .collect();

    if timed.is_empty() {
        return ToiletingStatus::Normal;
    }

    let in_window = |t: &DateTime<FixedOffset>| (now - *t).num_seconds() <= TOILETING_WINDOW_SEC;
    let window: Vec<BathroomEventKind> = timed
        .iter()
        .filter(|(_, t)| in_window(t))
        .filter_map(|(kind, _)| *kind)
        .collect();

    if window.iter().any(|k| k.is_accident()) {
        ToiletingStatus::RecentAccident
    } else if !window.iter().any(|k| k.is_void()) {
        ToiletingStatus::NoVoidInWindow
    } else if timed
        .iter()
        .any(|(kind, _)| kind.map(|k| k.is_accident()).unwrap_or(false))
    {
        ToiletingStatus::EarlierAccident
    } else {
        ToiletingStatus::Normal
    }
}

/// Normalize a time of day to integer HHMM.
///
/// Numbers are truncated; "HH:MM" strings become `HH * 100 + MM`; digit-only
/// strings are read as HHMM.
pub fn normalize_time_of_day(time: &TimeOfDay) -> Option<i64> {
    match time {
        TimeOfDay::Numeric(value) if value.is_finite() => Some(value.trunc() as i64),
        TimeOfDay::Numeric(_) => None,
        TimeOfDay::Text(text) => {
            let text = text.trim();
            let parsed = match text.split_once(':') {
                Some((hours, minutes)) => hours
                    .parse::<i64>()
                    .ok()
                    .zip(minutes.parse::<i64>().ok())
                    .map(|(h, m)| h * 100 + m),
                None => text.parse::<i64>().ok(),
            };
            if parsed.is_none() {
                log::warn!("ignoring unparseable time of day {:?}", text);
            }
            parsed
        }
    }
}

/// Transition label → code (unknown or missing → 0)
pub fn transition_code(label: Option<&str>) -> u8 {
    match label {
        Some(label) => TransitionType::from_label(label)
            .map(TransitionType::code)
            .unwrap_or_else(|| {
                log::warn!("unknown transition type {:?}, using 0", label);
                0
            }),
        None => 0,
    }
}

/// Social context label → code (unknown or missing → 0)
pub fn social_code(label: Option<&str>) -> u8 {
    match label {
        Some(label) => SocialContext::from_label(label)
            .map(SocialContext::code)
            .unwrap_or_else(|| {
                log::warn!("unknown social context {:?}, using 0", label);
                0
            }),
        None => 0,
    }
}

fn timestamp_of(event: &TimedEvent, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let raw = event.time.as_deref()?;
    let parsed = parse_event_time(raw, now);
    if parsed.is_none() {
        log::warn!("skipping event with unparseable time {:?}", raw);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-01-15T14:00:00-05:00").unwrap()
    }

    fn ago(minutes: i64) -> String {
        (now() - Duration::minutes(minutes)).to_rfc3339()
    }

    fn visit(kind: &str, minutes_ago: i64) -> TimedEvent {
        TimedEvent::new(kind, ago(minutes_ago))
    }

    fn full_request() -> PredictionRequest {
        PredictionRequest {
            sleep_quality_numeric: Some(1.0),
            time_numeric: Some(TimeOfDay::Text("14:30".to_string())),
            weekday_numeric: Some(0.0),
            temperature_c: Some(22.0),
            humidity_percent: Some(50.0),
            weather_type_numeric: Some(0.0),
            time_since_last_meal_min: Some(999.0),
            time_since_last_void_min: Some(999.0),
            meals: vec![
                TimedEvent::new("meal", ago(200)),
                TimedEvent::new("snack", ago(45)),
            ],
            bathroom_visits: vec![visit("no void", 90), visit("urine", 20)],
            transition_type: Some("moderate".to_string()),
            social_context: Some("small_group".to_string()),
        }
    }

    #[test]
    fn test_recent_accident_bucket() {
        let visits = vec![visit("urine accident", 10)];
        assert_eq!(toileting_status(&visits, now()), ToiletingStatus::RecentAccident);

        let request = PredictionRequest {
            bathroom_visits: visits,
            ..Default::default()
        };
        let derived = FeatureDeriver::derive(&request, None, now());
        assert_eq!(derived.calculated.toileting_status_bucket_numeric, 3);
        assert_eq!(derived.calculated.recent_accident_flag, 1);
        assert_eq!(derived.vector.recent_accident_flag, Some(1.0));
    }

    #[test]
    fn test_no_void_in_window_bucket() {
        let visits = vec![visit("urine", 80)];
        assert_eq!(toileting_status(&visits, now()), ToiletingStatus::NoVoidInWindow);

        // A "no void" attempt inside the window is still no void
        let visits = vec![visit("urine", 80), visit("no void", 15)];
        assert_eq!(toileting_status(&visits, now()), ToiletingStatus::NoVoidInWindow);
    }

    #[test]
    fn test_earlier_accident_bucket() {
        let visits = vec![visit("bowel movement accident", 120), visit("urine", 30)];
        assert_eq!(toileting_status(&visits, now()), ToiletingStatus::EarlierAccident);
    }

    #[test]
    fn test_normal_bucket() {
        let visits = vec![visit("urine", 30), visit("bowel movement", 200)];
        assert_eq!(toileting_status(&visits, now()), ToiletingStatus::Normal);
        assert_eq!(toileting_status(&[], now()), ToiletingStatus::Normal);
    }

    #[test]
    fn test_accident_priority_over_no_void() {
        let visits = vec![visit("no void", 5), visit("bowel movement accident", 55)];
        assert_eq!(toileting_status(&visits, now()), ToiletingStatus::RecentAccident);
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let visits = vec![visit("urine accident", 60)];
        assert_eq!(toileting_status(&visits, now()), ToiletingStatus::RecentAccident);

        let visits = vec![visit("urine accident", 61)];
        assert_eq!(toileting_status(&visits, now()), ToiletingStatus::NoVoidInWindow);
    }

    #[test]
    fn test_time_since_meal_uses_latest_entry() {
        let meals = vec![
            TimedEvent::new("meal", ago(200)),
            TimedEvent::new("snack", ago(45)),
            TimedEvent::new("meal", "not a time"),
        ];
        assert_eq!(minutes_since_latest(&meals, |_| true, now()), Some(45));
    }

    #[test]
    fn test_time_since_void_only_counts_no_void_entries() {
        let request = PredictionRequest {
            bathroom_visits: vec![visit("no void", 95), visit("urine", 10), visit("no void", 130)],
            ..Default::default()
        };
        let derived = FeatureDeriver::derive(&request, None, now());
        assert_eq!(derived.calculated.time_since_last_void_min, Some(95));
        assert_eq!(derived.vector.time_since_last_void_min, Some(95.0));
    }

    #[test]
    fn test_fallback_used_only_when_log_yields_nothing() {
        let request = PredictionRequest {
            time_since_last_meal_min: Some(120.0),
            time_since_last_void_min: Some(75.0),
            bathroom_visits: vec![visit("urine", 10)],
            ..Default::default()
        };
        let derived = FeatureDeriver::derive(&request, None, now());

        assert_eq!(derived.vector.time_since_last_meal_min, Some(120.0));
        assert_eq!(derived.vector.time_since_last_void_min, Some(75.0));
        assert_eq!(derived.calculated.time_since_last_meal_min, None);

        let request = PredictionRequest {
            time_since_last_meal_min: Some(120.0),
            meals: vec![TimedEvent::new("meal", ago(0))],
            ..Default::default()
        };
        let derived = FeatureDeriver::derive(&request, None, now());
        assert_eq!(derived.vector.time_since_last_meal_min, Some(0.0));
    }

    #[test]
    fn test_missing_values_stay_unset() {
        let derived = FeatureDeriver::derive(&PredictionRequest::default(), None, now());
        let v = derived.vector;

        assert_eq!(v.sleep_quality_numeric, None);
        assert_eq!(v.time_numeric, None);
        assert_eq!(v.temperature_c, None);
        assert_eq!(v.time_since_last_meal_min, None);
        assert_eq!(v.toileting_status_bucket_numeric, Some(0.0));
        assert_eq!(v.transition_type_numeric, Some(0.0));
        assert_eq!(v.social_context_numeric, Some(0.0));
    }

    #[test]
    fn test_clock_times_are_today_in_now_offset() {
        let parsed = parse_event_time("13:15", now()).unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-15T13:15:00-05:00");

        let request = PredictionRequest {
            meals: vec![TimedEvent::new("meal", "12:30")],
            ..Default::default()
        };
        let derived = FeatureDeriver::derive(&request, None, now());
        assert_eq!(derived.calculated.time_since_last_meal_min, Some(90));
    }

    #[test]
    fn test_timestamp_formats() {
        let n = now();
        assert!(parse_event_time("2024-01-15T13:00:00Z", n).is_some());
        assert!(parse_event_time("2024-01-15T13:00:00", n).is_some());
        assert!(parse_event_time("2024-01-15T13:00:00.250", n).is_some());
        assert!(parse_event_time("2024-01-15 13:00", n).is_some());
        assert!(parse_event_time("13:00:30", n).is_some());
        assert_eq!(parse_event_time("yesterday", n), None);
        assert_eq!(parse_event_time("", n), None);

        // Naive times take now's offset
        let naive = parse_event_time("2024-01-15T13:00:00", n).unwrap();
        assert_eq!((n - naive).num_minutes(), 60);
    }

    #[test]
    fn test_future_events_pass_through_negative() {
        let meals = vec![TimedEvent::new("meal", "15:00")];
        assert_eq!(minutes_since_latest(&meals, |_| true, now()), Some(-60));
    }

    #[test]
    fn test_time_of_day_normalization() {
        assert_eq!(normalize_time_of_day(&TimeOfDay::Text("08:05".to_string())), Some(805));
        assert_eq!(normalize_time_of_day(&TimeOfDay::Numeric(1430.0)), Some(1430));
        assert_eq!(normalize_time_of_day(&TimeOfDay::Numeric(930.7)), Some(930));
        assert_eq!(normalize_time_of_day(&TimeOfDay::Text("1745".to_string())), Some(1745));
        assert_eq!(normalize_time_of_day(&TimeOfDay::Text("noon".to_string())), None);
        assert_eq!(normalize_time_of_day(&TimeOfDay::Numeric(f64::NAN)), None);
    }

    #[test]
    fn test_categorical_maps() {
        assert_eq!(transition_code(Some("none")), 0);
        assert_eq!(transition_code(Some("major")), 3);
        assert_eq!(transition_code(Some("sudden")), 0);
        assert_eq!(transition_code(None), 0);
        assert_eq!(social_code(Some("large_group")), 3);
        assert_eq!(social_code(Some("party")), 0);
    }

    #[test]
    fn test_live_weather_overrides_request_values() {
        let snapshot = WeatherSnapshot {
            temperature: Some(31.5),
            humidity: Some(88.0),
            condition: Some("Drizzle".to_string()),
            ..Default::default()
        };
        let derived = FeatureDeriver::derive(&full_request(), Some(&snapshot), now());

        assert_eq!(derived.vector.temperature_c, Some(31.5));
        assert_eq!(derived.vector.humidity_percent, Some(88.0));
        assert_eq!(derived.vector.weather_type_numeric, Some(2.0));
        assert_eq!(
            derived.weather_used,
            Some(WeatherUsed {
                temperature: Some(31.5),
                humidity: Some(88.0),
                condition: "Drizzle".to_string(),
                type_numeric: Some(2.0),
            })
        );
    }

    #[test]
    fn test_partial_snapshot_falls_back_per_field() {
        let snapshot = WeatherSnapshot {
            humidity: Some(60.0),
            condition: Some("Clear".to_string()),
            ..Default::default()
        };
        let derived = FeatureDeriver::derive(&full_request(), Some(&snapshot), now());

        assert_eq!(derived.vector.temperature_c, Some(22.0));
        assert_eq!(derived.vector.humidity_percent, Some(60.0));
        assert_eq!(derived.vector.weather_type_numeric, Some(0.0));
    }

    #[test]
    fn test_request_weather_used_without_snapshot() {
        let derived = FeatureDeriver::derive(&full_request(), None, now());

        assert_eq!(derived.vector.temperature_c, Some(22.0));
        assert_eq!(derived.vector.weather_type_numeric, Some(0.0));
        assert_eq!(derived.weather_used, None);
    }

    #[test]
    fn test_full_derivation() {
        let derived = FeatureDeriver::derive(&full_request(), None, now());

        assert_eq!(
            derived.vector,
            FeatureVector {
                sleep_quality_numeric: Some(1.0),
                time_numeric: Some(1430.0),
                weekday_numeric: Some(0.0),
                temperature_c: Some(22.0),
                humidity_percent: Some(50.0),
                weather_type_numeric: Some(0.0),
                time_since_last_meal_min: Some(45.0),
                time_since_last_void_min: Some(90.0),
                recent_accident_flag: Some(0.0),
                toileting_status_bucket_numeric: Some(0.0),
                transition_type_numeric: Some(2.0),
                social_context_numeric: Some(2.0),
            }
        );
    }

    #[test]
    fn test_derivation_is_idempotent() {
        let request = full_request();
        let first = FeatureDeriver::derive(&request, None, now());
        let second = FeatureDeriver::derive(&request, None, now());
        assert_eq!(first, second);
    }
}
