use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    model::{Location, ParseError, TemperatureUnit, WeatherSample, WeatherSeries},
    provider::cache::{Endpoint, JsonCache},
};

use super::WeatherProvider;

const OWM_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Current conditions plus the 5 day / 3 hour forecast, cached on disk.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    location: Location,
    units: TemperatureUnit,
    cache: JsonCache,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String, location: Location, units: TemperatureUnit, cache: JsonCache) -> Self {
        Self {
            api_key,
            location,
            units,
            cache,
            http: Client::new(),
        }
    }

    async fn fetch_body(&self, endpoint: Endpoint) -> Result<String> {
        let (path, what) = match endpoint {
            Endpoint::Current => ("weather", "current weather"),
            Endpoint::Forecast => ("forecast", "forecast"),
        };
        let lat = format!("{:.4}", self.location.latitude);
        let lon = format!("{:.4}", self.location.longitude);

        let res = self
            .http
            .get(format!("{OWM_URL}/{path}"))
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("mode", "json"),
                ("APPID", self.api_key.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to send request to OpenWeather ({what})"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .with_context(|| format!("Failed to read OpenWeather {what} response body"))?;

        if !status.is_success() {
            return Err(anyhow!(
                "OpenWeather {} request failed with status {}: {}",
                what,
                status,
                truncate_body(&body),
            ));
        }

        Ok(body)
    }

    async fn fetch_from_www(&self) -> Result<(String, String)> {
        let forecast = self.fetch_body(Endpoint::Forecast).await?;
        let current = self.fetch_body(Endpoint::Current).await?;

        for (endpoint, body) in [(Endpoint::Current, &current), (Endpoint::Forecast, &forecast)] {
            if let Err(e) = self.cache.write(endpoint, body) {
                warn!("{e:#}");
            }
        }

        Ok((current, forecast))
    }

    fn from_cache(&self) -> Result<(String, String)> {
        Ok((self.cache.read(Endpoint::Current)?, self.cache.read(Endpoint::Forecast)?))
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn fetch_series(&self) -> Result<WeatherSeries> {
        let (current, forecast) = if self.cache.is_fresh() {
            let current = self.cache.path(Endpoint::Current);
            let forecast = self.cache.path(Endpoint::Forecast);
            info!(current = %current.display(), forecast = %forecast.display(), "using cached weather");
            match self.from_cache() {
                Ok(bodies) => bodies,
                Err(e) => {
                    warn!("cache unreadable, fetching instead: {e:#}");
                    self.fetch_from_www().await?
                }
            }
        } else {
            info!("fetching weather from OpenWeather");
            self.fetch_from_www().await?
        };

        parse_series(&current, &forecast, self.location, self.units)
    }
}

#[derive(Debug, Deserialize)]
struct OwCondition {
    id: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwClouds {
    #[serde(default)]
    all: u8,
}

#[derive(Debug, Deserialize)]
struct OwPrecipitation {
    #[serde(rename = "3h")]
    three_hours: Option<f64>,
    #[serde(rename = "1h")]
    one_hour: Option<f64>,
}

impl OwPrecipitation {
    fn amount(&self) -> f64 {
        self.three_hours.or(self.one_hour).unwrap_or(0.0)
    }
}

#[derive(Debug, Deserialize)]
struct OwWind {
    speed: Option<f64>,
    deg: Option<f64>,
}

/// Shared shape of the current-weather response and each forecast entry.
#[derive(Debug, Deserialize)]
struct OwEntry {
    dt: Option<i64>,
    #[serde(default)]
    weather: Vec<OwCondition>,
    main: Option<OwMain>,
    clouds: Option<OwClouds>,
    rain: Option<OwPrecipitation>,
    snow: Option<OwPrecipitation>,
    wind: Option<OwWind>,
}

impl OwEntry {
    fn into_sample(self, units: TemperatureUnit) -> Result<WeatherSample, ParseError> {
        let dt = self.dt.ok_or(ParseError::MissingField("dt"))?;
        let time = DateTime::from_timestamp(dt, 0).ok_or(ParseError::BadTimestamp(dt))?;
        let condition = self
            .weather
            .first()
            .and_then(|w| w.id)
            .ok_or(ParseError::MissingField("weather[0].id"))?;
        let kelvin = self
            .main
            .and_then(|m| m.temp)
            .ok_or(ParseError::MissingField("main.temp"))?;

        Ok(WeatherSample {
            time,
            condition,
            clouds: self.clouds.map(|c| c.all.min(100)).unwrap_or(0),
            rain: self.rain.map(|p| p.amount()).unwrap_or(0.0),
            snow: self.snow.map(|p| p.amount()).unwrap_or(0.0),
            wind_speed: self.wind.as_ref().and_then(|w| w.speed).unwrap_or(0.0),
            wind_deg: self.wind.as_ref().and_then(|w| w.deg).unwrap_or(0.0),
            temperature: units.from_kelvin(kelvin),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    timezone: Option<i32>,
    #[serde(flatten)]
    entry: OwEntry,
}

#[derive(Debug, Deserialize)]
struct OwCity {
    timezone: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    city: Option<OwCity>,
    // Kept loose so one malformed entry does not sink the whole forecast.
    list: Option<Vec<serde_json::Value>>,
}

/// Builds a series from the raw current-weather and forecast JSON bodies.
pub fn parse_series(
    current: &str,
    forecast: &str,
    location: Location,
    units: TemperatureUnit,
) -> Result<WeatherSeries> {
    let current: OwCurrentResponse =
        serde_json::from_str(current).context("Failed to parse OpenWeather current JSON")?;
    let forecast: OwForecastResponse =
        serde_json::from_str(forecast).context("Failed to parse OpenWeather forecast JSON")?;

    let offset_secs = current
        .timezone
        .or(forecast.city.and_then(|c| c.timezone))
        .unwrap_or(0);
    let utc_offset = FixedOffset::east_opt(offset_secs).ok_or(ParseError::BadOffset(offset_secs))?;

    let now = current
        .entry
        .into_sample(units)
        .context("Invalid OpenWeather current conditions")?;

    let list = forecast
        .list
        .ok_or_else(|| anyhow!("OpenWeather forecast response contained no data"))?;

    let mut samples = vec![now];
    for (i, value) in list.into_iter().enumerate() {
        let parsed = serde_json::from_value::<OwEntry>(value)
            .map_err(|e| e.to_string())
            .and_then(|entry| entry.into_sample(units).map_err(|e| e.to_string()));

        match parsed {
            Ok(sample) => {
                let last = samples.last().map(|s| s.time);
                if last.is_some_and(|t| sample.time <= t) {
                    debug!(entry = i, time = %sample.time, "forecast entry not after previous sample; dropped");
                    continue;
                }
                samples.push(sample);
            }
            Err(e) => warn!(entry = i, "forecast entry dropped: {e}"),
        }
    }

    Ok(WeatherSeries::new(location, utc_offset, samples)?)
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let end = (0..=MAX).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURRENT: &str = r#"{
        "coord": {"lon": 21.008, "lat": 52.1961},
        "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds"}],
        "main": {"temp": 283.15, "feels_like": 282.0, "humidity": 80},
        "wind": {"speed": 4.1, "deg": 250},
        "clouds": {"all": 75},
        "rain": {"1h": 0.4},
        "dt": 1717232400,
        "timezone": 7200,
        "name": "Warsaw"
    }"#;

    fn forecast(entries: &str) -> String {
        format!(r#"{{"cod": "200", "city": {{"name": "Warsaw", "timezone": 7200}}, "list": [{entries}]}}"#)
    }

    fn entry(dt: i64, kelvin: f64) -> String {
        format!(r#"{{"dt": {dt}, "main": {{"temp": {kelvin}}}, "weather": [{{"id": 500}}], "rain": {{"3h": 1.5}}}}"#)
    }

    #[test]
    fn parses_current_and_forecast() {
        let body = forecast(&[entry(1717243200, 288.15), entry(1717254000, 281.15)].join(","));
        let series = parse_series(CURRENT, &body, Location::default(), TemperatureUnit::Celsius).unwrap();

        assert_eq!(series.samples().len(), 3);
        assert_eq!(series.utc_offset(), FixedOffset::east_opt(7200).unwrap());

        let now = series.current();
        assert_eq!(now.condition, 803);
        assert_eq!(now.clouds, 75);
        assert!((now.temperature - 10.0).abs() < 1e-9);
        assert!((now.rain - 0.4).abs() < 1e-9);
        assert_eq!(now.snow, 0.0);
        assert_eq!(now.wind_deg, 250.0);

        let next = &series.samples()[1];
        assert!((next.temperature - 15.0).abs() < 1e-9);
        assert_eq!(next.rain, 1.5);
        assert_eq!(next.clouds, 0);
        assert_eq!(next.wind_speed, 0.0);
    }

    #[test]
    fn fahrenheit_conversion_applies_to_all_samples() {
        let body = forecast(&entry(1717243200, 273.15));
        let series = parse_series(CURRENT, &body, Location::default(), TemperatureUnit::Fahrenheit).unwrap();
        assert!((series.current().temperature - 50.0).abs() < 1e-9);
        assert!((series.samples()[1].temperature - 32.0).abs() < 1e-9);
    }

    #[test]
    fn bad_forecast_entries_are_dropped() {
        let entries = [
            entry(1717243200, 288.15),
            r#"{"dt": 1717254000, "weather": [{"id": 500}]}"#.to_string(),
            r#"{"dt": "soon"}"#.to_string(),
            entry(1717264800, 281.15),
        ];
        let series =
            parse_series(CURRENT, &forecast(&entries.join(",")), Location::default(), TemperatureUnit::Celsius)
                .unwrap();
        assert_eq!(series.samples().len(), 3);
    }

    #[test]
    fn entries_not_after_now_are_dropped() {
        let entries = [entry(1717232400 - 3600, 280.0), entry(1717243200, 288.15)];
        let series =
            parse_series(CURRENT, &forecast(&entries.join(",")), Location::default(), TemperatureUnit::Celsius)
                .unwrap();
        assert_eq!(series.samples().len(), 2);
    }

    #[test]
    fn current_without_temperature_is_an_error() {
        let current = r#"{"dt": 1717232400, "weather": [{"id": 800}], "main": {}}"#;
        let err = parse_series(current, &forecast(""), Location::default(), TemperatureUnit::Celsius)
            .unwrap_err();
        assert!(format!("{err:#}").contains("main.temp"));
    }

    #[test]
    fn forecast_without_list_is_an_error() {
        let err = parse_series(CURRENT, r#"{"cod": "401"}"#, Location::default(), TemperatureUnit::Celsius)
            .unwrap_err();
        assert!(err.to_string().contains("no data"));
    }

    #[test]
    fn entry_reports_missing_fields() {
        let e: OwEntry = serde_json::from_str(r#"{"dt": 1, "main": {"temp": 1.0}}"#).unwrap();
        assert_eq!(
            e.into_sample(TemperatureUnit::Celsius).unwrap_err(),
            ParseError::MissingField("weather[0].id")
        );

        let e: OwEntry = serde_json::from_str(r#"{"weather": [{"id": 1}]}"#).unwrap();
        assert_eq!(e.into_sample(TemperatureUnit::Celsius).unwrap_err(), ParseError::MissingField("dt"));
    }

    #[tokio::test]
    async fn fresh_cache_is_served_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = JsonCache::new(
            dir.path().to_path_buf(),
            Location::default(),
            std::time::Duration::from_secs(3600),
        );
        cache.write(Endpoint::Current, CURRENT).unwrap();
        cache.write(Endpoint::Forecast, &forecast(&entry(1717243200, 288.15))).unwrap();

        // An unusable key proves nothing is fetched.
        let provider =
            OpenWeatherProvider::new(String::new(), Location::default(), TemperatureUnit::Celsius, cache);
        let series = provider.fetch_series().await.unwrap();
        assert_eq!(series.samples().len(), 2);
        assert_eq!(series.current().condition, 803);
    }

    #[test]
    fn truncate_body_keeps_short_bodies() {
        assert_eq!(truncate_body("oops"), "oops");
        assert_eq!(truncate_body(&"x".repeat(300)).len(), 203);
    }
}
