//! Current conditions and forecasts from Open-Meteo.
//!
//! A free-text location is geocoded first; a `"<lat>,<lon>"` pair skips that
//! step. When geocoding finds nothing the tool reports on London instead of
//! failing, but transport and decoding failures at either stage come back as
//! an error result.

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;

use basedai_common::tools::{ParameterDescriptor, ToolDescriptor, ToolInvocation};

use crate::http::endpoint;
use crate::{ToolImplementation, error_result};

const DESCRIPTION: &str = "Fetches current weather and optional forecast for a specified location. \
If no location is provided, defaults to London (51.52,-0.11). \
Accepts a city name (e.g., 'Tokyo', 'New York') or coordinates (e.g., '51.52,-0.11'). \
Forecast type can be 'none' (current weather only), 'hourly' (next 24 hours), or 'daily' (next 7 days). \
Returns temperature, condition, wind speed, and forecast if requested.";

const HOURLY_SAMPLES: usize = 24;
const DAILY_SAMPLES: usize = 7;

/// A resolved place to fetch weather for.
#[derive(Debug, Clone, PartialEq)]
struct Place {
    latitude: f64,
    longitude: f64,
    name: String,
}

impl Place {
    fn london() -> Self {
        Self {
            latitude: 51.52,
            longitude: -0.11,
            name: "London".to_string(),
        }
    }

    /// Parses `"<lat>,<lon>"` with both values in range.
    fn from_coordinates(text: &str) -> Option<Self> {
        let (lat, lon) = text.split_once(',')?;
        let latitude: f64 = lat.trim().parse().ok()?;
        let longitude: f64 = lon.trim().parse().ok()?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
            name: text.trim().to_string(),
        })
    }
}

/// Which forecast to append to the current conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForecastKind {
    #[default]
    None,
    Hourly,
    Daily,
}

impl FromStr for ForecastKind {
    type Err = std::convert::Infallible;

    /// Case-insensitive; anything unrecognised is [`ForecastKind::None`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "hourly" => Self::Hourly,
            "daily" => Self::Daily,
            _ => Self::None,
        })
    }
}

impl fmt::Display for ForecastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        })
    }
}

/// Maps an Open-Meteo weather code to a condition name.
#[must_use]
pub const fn condition_for(code: i64) -> &'static str {
    match code {
        0 => "Clear sky",
        1..=3 => "Partly cloudy",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        61 | 63 | 65 => "Rain",
        71 | 73 | 75 => "Snow",
        95 => "Thunderstorm",
        _ => "Unknown",
    }
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Option<Vec<GeocodingResult>>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResult {
    latitude: f64,
    longitude: f64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: CurrentWeather,
    #[serde(default)]
    hourly: Option<HourlyForecast>,
    #[serde(default)]
    daily: Option<DailyForecast>,
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
    weathercode: i64,
}

#[derive(Debug, Deserialize)]
struct HourlyForecast {
    time: Vec<String>,
    temperature_2m: Vec<f64>,
    weathercode: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct DailyForecast {
    time: Vec<String>,
    temperature_2m_max: Vec<f64>,
    temperature_2m_min: Vec<f64>,
    weathercode: Vec<i64>,
}

fn hour_of(timestamp: &str) -> String {
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M")
        .map_or_else(|_| timestamp.to_string(), |t| t.format("%H:%M").to_string())
}

fn render(place: &Place, kind: ForecastKind, forecast: &ForecastResponse) -> String {
    let current = &forecast.current_weather;
    let mut out = format!(
        "Current weather in {}: {:.1}°F, {}, wind speed {:.1} mph",
        place.name,
        current.temperature,
        condition_for(current.weathercode),
        current.windspeed
    );

    match (kind, &forecast.hourly, &forecast.daily) {
        (ForecastKind::Hourly, Some(hourly), _) => {
            out.push_str("\nHourly forecast (next 24 hours):");
            for ((time, temp), code) in hourly
                .time
                .iter()
                .zip(&hourly.temperature_2m)
                .zip(&hourly.weathercode)
                .take(HOURLY_SAMPLES)
            {
                out.push_str(&format!(
                    "\n  {}: {temp:.1}°F, {}",
                    hour_of(time),
                    condition_for(*code)
                ));
            }
        }
        (ForecastKind::Daily, _, Some(daily)) => {
            out.push_str("\nDaily forecast (next 7 days):");
            for (((date, max), min), code) in daily
                .time
                .iter()
                .zip(&daily.temperature_2m_max)
                .zip(&daily.temperature_2m_min)
                .zip(&daily.weathercode)
                .take(DAILY_SAMPLES)
            {
                out.push_str(&format!(
                    "\n  {date}: {max:.1}°F / {min:.1}°F, {}",
                    condition_for(*code)
                ));
            }
        }
        _ => {}
    }

    out
}

/// Weather lookup backed by the Open-Meteo geocoding and forecast APIs.
#[derive(Debug)]
pub struct WeatherTool {
    descriptor: ToolDescriptor,
    client: Client,
    geocoding_url: String,
    forecast_url: String,
}

impl WeatherTool {
    pub fn new(
        client: Client,
        geocoding_url: impl Into<String>,
        forecast_url: impl Into<String>,
    ) -> Self {
        Self {
            descriptor: ToolDescriptor::builder()
                .name("get_weather")
                .description(DESCRIPTION)
                .optional_parameters(vec![
                    ParameterDescriptor::string(
                        "location",
                        "Optional city name or coordinates (latitude,longitude).",
                    ),
                    ParameterDescriptor::string(
                        "forecast_type",
                        "Optional forecast type: 'none' (current only), 'hourly' (next 24 hours), \
                         or 'daily' (next 7 days).",
                    )
                    .with_default("none"),
                ])
                .build(),
            client,
            geocoding_url: geocoding_url.into(),
            forecast_url: forecast_url.into(),
        }
    }

    async fn geocode(&self, name: &str) -> Result<Option<Place>> {
        let response: GeocodingResponse = self
            .client
            .get(endpoint(&self.geocoding_url, "/v1/search"))
            .query(&[("name", name), ("count", "1")])
            .send()
            .await
            .context("geocoding request failed")?
            .error_for_status()
            .context("geocoding service returned an error")?
            .json()
            .await
            .context("could not decode geocoding response")?;

        Ok(response
            .results
            .and_then(|results| results.into_iter().next())
            .map(|r| Place {
                latitude: r.latitude,
                longitude: r.longitude,
                name: r.name,
            }))
    }

    async fn resolve(&self, location: Option<&str>) -> Result<Place> {
        let Some(location) = location else {
            return Ok(Place::london());
        };
        if let Some(place) = Place::from_coordinates(location) {
            return Ok(place);
        }

        match self.geocode(location).await? {
            Some(place) => Ok(place),
            None => {
                debug!("No geocoding match for '{location}', using London");
                Ok(Place::london())
            }
        }
    }

    async fn fetch(&self, place: &Place, kind: ForecastKind) -> Result<ForecastResponse> {
        let mut query = vec![
            ("latitude", place.latitude.to_string()),
            ("longitude", place.longitude.to_string()),
            ("current_weather", "true".to_string()),
            ("temperature_unit", "fahrenheit".to_string()),
            ("wind_speed_unit", "mph".to_string()),
            ("precipitation_unit", "inch".to_string()),
        ];
        match kind {
            ForecastKind::Hourly => {
                query.push(("hourly", "temperature_2m,weathercode".to_string()));
            }
            ForecastKind::Daily => query.push((
                "daily",
                "temperature_2m_max,temperature_2m_min,weathercode".to_string(),
            )),
            ForecastKind::None => {}
        }

        self.client
            .get(endpoint(&self.forecast_url, "/v1/forecast"))
            .query(&query)
            .send()
            .await
            .context("forecast request failed")?
            .error_for_status()
            .context("forecast service returned an error")?
            .json()
            .await
            .context("could not decode forecast response")
    }

    async fn report(&self, location: Option<&str>, kind: ForecastKind) -> Result<String> {
        let place = self.resolve(location).await?;
        let forecast = self.fetch(&place, kind).await?;
        Ok(render(&place, kind, &forecast))
    }
}

#[async_trait]
impl ToolImplementation for WeatherTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, invocation: &ToolInvocation) -> String {
        let location = invocation.non_blank_str("location");
        let kind = invocation
            .get_str("forecast_type")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();

        match self.report(location, kind).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Weather lookup failed: {e:#}");
                error_result(format!(
                    "could not fetch weather: {e:#}. Try a different location or check connectivity."
                ))
            }
        }
    }
}
