//! Live weather snapshots
//!
//! The serving layer pushes the most recent weather reading; predictions read
//! whichever snapshot is current at the time. Two payload shapes are accepted:
//! the flat shape pushed by the front end and the OpenWeather current-weather
//! response.

use crate::error::ForecastError;
use crate::types::WeatherType;
use chrono::{TimeZone, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Conditions bucketed as overcast/obscured
const OVERCAST_CONDITIONS: [&str; 9] = [
    "Clouds", "Cloudy", "Fog", "Sand", "Ash", "Squall", "Smoke", "Haze", "Mist",
];

/// Conditions bucketed as precipitation
const PRECIPITATION_CONDITIONS: [&str; 3] = ["Rain", "Drizzle", "Snow"];

/// A single weather reading
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Temperature in °C
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub feels_like: Option<f64>,
    /// Relative humidity in percent
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub wind_speed: Option<f64>,
    /// Textual condition, e.g. "Clear", "Rain"
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherMain {
    temp: Option<f64>,
    feels_like: Option<f64>,
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherCondition {
    main: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherWind {
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OpenWeatherPayload {
    main: OpenWeatherMain,
    #[serde(default)]
    weather: Vec<OpenWeatherCondition>,
    wind: Option<OpenWeatherWind>,
    name: Option<String>,
    dt: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WeatherPayload {
    OpenWeather(OpenWeatherPayload),
    Flat(WeatherSnapshot),
}

impl From<OpenWeatherPayload> for WeatherSnapshot {
    fn from(payload: OpenWeatherPayload) -> Self {
        let timestamp = payload
            .dt
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .map(|t| t.to_rfc3339());

        WeatherSnapshot {
            temperature: payload.main.temp,
            feels_like: payload.main.feels_like,
            humidity: payload.main.humidity,
            wind_speed: payload.wind.and_then(|w| w.speed),
            condition: payload.weather.into_iter().next().and_then(|c| c.main),
            location: payload.name,
            timestamp,
        }
    }
}

impl WeatherSnapshot {
    /// Parse either payload shape
    pub fn from_json(json: &str) -> Result<Self, ForecastError> {
        let payload: WeatherPayload = serde_json::from_str(json)?;
        Ok(match payload {
            WeatherPayload::OpenWeather(ow) => ow.into(),
            WeatherPayload::Flat(flat) => flat,
        })
    }

    /// Bucket of the textual condition (missing condition counts as unknown)
    pub fn weather_type(&self) -> WeatherType {
        bucket_condition(self.condition.as_deref().unwrap_or(""))
    }

    /// Condition label for display
    pub fn condition_label(&self) -> &str {
        self.condition.as_deref().unwrap_or("Unknown")
    }
}

/// Map a textual weather condition to its bucket.
///
/// `Clear` → 0, overcast/obscured → 1, precipitation → 2, anything else
/// (thunderstorms, tornado, unknown) → 3.
pub fn bucket_condition(condition: &str) -> WeatherType {
    if condition == "Clear" {
        WeatherType::Clear
    } else if OVERCAST_CONDITIONS.contains(&condition) {
        WeatherType::Overcast
    } else if PRECIPITATION_CONDITIONS.contains(&condition) {
        WeatherType::Precipitation
    } else {
        WeatherType::Severe
    }
}

/// Last-value cache for the most recently pushed weather snapshot.
///
/// Owned by the serving layer and handed to predictions explicitly. Readers
/// get a cheap `Arc` to an immutable snapshot, so an update racing with a
/// prediction never tears the values the prediction sees.
#[derive(Debug, Default)]
pub struct WeatherCache {
    latest: RwLock<Option<Arc<WeatherSnapshot>>>,
}

impl WeatherCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot
    pub fn update(&self, snapshot: WeatherSnapshot) {
        log::debug!(
            "weather updated: {} {:?}°C {:?}%",
            snapshot.condition_label(),
            snapshot.temperature,
            snapshot.humidity
        );
        *self.latest.write() = Some(Arc::new(snapshot));
    }

    /// Current snapshot, if any has been pushed
    pub fn latest(&self) -> Option<Arc<WeatherSnapshot>> {
        self.latest.read().clone()
    }

    pub fn clear(&self) {
        *self.latest.write() = None;
    }
}
