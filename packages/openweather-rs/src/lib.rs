//! OpenWeather current-weather client.
//!
//! Thin wrapper around the OpenWeather `/data/2.5/weather` endpoint that
//! normalizes the response into a flat [`CurrentWeather`] snapshot with
//! metric units (°C, m/s, mm/h, km, %).

use serde::{Deserialize, Serialize};
use std::time::Duration;

const BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Errors surfaced by the OpenWeather client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("openweather error {status}: {message}")]
    Api {
        status: u16,
        retry_after_ms: Option<u64>,
        message: String,
    },
}

/// Normalized weather snapshot for a single location.
///
/// `visibility` is optional because OpenWeather omits the field in some
/// responses (notably for stations that do not report it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    /// Temperature in °C
    pub temperature: f64,
    /// Relative humidity in %
    pub humidity: f64,
    /// Wind speed in m/s
    pub wind_speed: f64,
    /// Rain or snow volume for the last hour in mm/h
    pub precipitation: f64,
    /// Visibility in km, when reported
    pub visibility: Option<f64>,
    /// Cloud cover in %
    pub cloud_cover: f64,
    /// Human-readable condition, e.g. "light rain"
    pub description: String,
    /// OpenWeather icon code, e.g. "10d"
    pub icon: String,
    /// OpenWeather condition id, e.g. 500
    pub condition_id: i32,
}

// Raw response shapes for /data/2.5/weather.

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: MainData,
    wind: Option<WindData>,
    rain: Option<VolumeData>,
    snow: Option<VolumeData>,
    clouds: Option<CloudsData>,
    visibility: Option<f64>,
    weather: Vec<ConditionData>,
}

#[derive(Debug, Deserialize)]
struct MainData {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct WindData {
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct VolumeData {
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CloudsData {
    all: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionData {
    id: i32,
    description: String,
    icon: String,
}

impl From<WeatherResponse> for CurrentWeather {
    fn from(raw: WeatherResponse) -> Self {
        let precipitation = raw
            .rain
            .and_then(|r| r.one_hour)
            .or_else(|| raw.snow.and_then(|s| s.one_hour))
            .unwrap_or(0.0);
        let condition = raw.weather.into_iter().next();

        Self {
            temperature: raw.main.temp,
            humidity: raw.main.humidity,
            wind_speed: raw.wind.map(|w| w.speed).unwrap_or(0.0),
            precipitation,
            // OpenWeather reports visibility in meters
            visibility: raw.visibility.map(|v| v / 1000.0),
            cloud_cover: raw.clouds.map(|c| c.all).unwrap_or(0.0),
            description: condition
                .as_ref()
                .map(|c| c.description.clone())
                .unwrap_or_default(),
            icon: condition.as_ref().map(|c| c.icon.clone()).unwrap_or_default(),
            condition_id: condition.map(|c| c.id).unwrap_or(0),
        }
    }
}

/// OpenWeather API client.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl OpenWeatherClient {
    /// Create a new client. Weather calls time out after 10 seconds.
    pub fn new(api_key: String) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            api_key,
            client,
            base_url: BASE_URL.to_string(),
        })
    }

    /// Override the base URL (for tests against a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch current weather for a coordinate pair.
    pub async fn current_weather(&self, lat: f64, lon: f64) -> Result<CurrentWeather, Error> {
        let url = format!("{}/weather", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = retry_after_ms(response.headers());
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                retry_after_ms,
                message,
            });
        }

        let raw: WeatherResponse = response.json().await?;
        Ok(raw.into())
    }
}

fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_raw_response_to_snapshot() {
        let raw: WeatherResponse = serde_json::from_value(serde_json::json!({
            "main": { "temp": 22.4, "humidity": 61.0 },
            "wind": { "speed": 4.2 },
            "rain": { "1h": 0.8 },
            "clouds": { "all": 75.0 },
            "visibility": 8000.0,
            "weather": [{ "id": 500, "description": "light rain", "icon": "10d" }]
        }))
        .unwrap();

        let snapshot = CurrentWeather::from(raw);
        assert_eq!(snapshot.temperature, 22.4);
        assert_eq!(snapshot.precipitation, 0.8);
        assert_eq!(snapshot.visibility, Some(8.0));
        assert_eq!(snapshot.condition_id, 500);
        assert_eq!(snapshot.description, "light rain");
    }

    #[test]
    fn missing_sections_default_sanely() {
        let raw: WeatherResponse = serde_json::from_value(serde_json::json!({
            "main": { "temp": -3.0, "humidity": 40.0 },
            "weather": []
        }))
        .unwrap();

        let snapshot = CurrentWeather::from(raw);
        assert_eq!(snapshot.wind_speed, 0.0);
        assert_eq!(snapshot.precipitation, 0.0);
        assert_eq!(snapshot.visibility, None);
        assert_eq!(snapshot.cloud_cover, 0.0);
        assert_eq!(snapshot.condition_id, 0);
    }

    #[test]
    fn snow_counts_as_precipitation() {
        let raw: WeatherResponse = serde_json::from_value(serde_json::json!({
            "main": { "temp": -1.0, "humidity": 90.0 },
            "snow": { "1h": 2.5 },
            "weather": [{ "id": 600, "description": "light snow", "icon": "13d" }]
        }))
        .unwrap();

        assert_eq!(CurrentWeather::from(raw).precipitation, 2.5);
    }
}
