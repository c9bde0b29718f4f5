use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const KELVIN_OFFSET: f64 = 273.15;

/// Geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for Location {
    fn default() -> Self {
        Self { latitude: 52.196136, longitude: 21.007963 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn from_kelvin(&self, kelvin: f64) -> f64 {
        let celsius = kelvin - KELVIN_OFFSET;
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TemperatureUnit::Celsius => "celsius",
            TemperatureUnit::Fahrenheit => "fahrenheit",
        })
    }
}

/// One forecast or current-condition observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSample {
    pub time: DateTime<Utc>,
    /// Provider condition code (e.g. OpenWeatherMap `weather[0].id`).
    pub condition: i32,
    /// Cloud cover, 0..=100 percent.
    pub clouds: u8,
    /// Rain over the sample period, mm.
    pub rain: f64,
    /// Snow over the sample period, mm.
    pub snow: f64,
    pub wind_speed: f64,
    /// Direction the wind blows from, degrees.
    pub wind_deg: f64,
    /// Air temperature, already in the configured unit.
    pub temperature: f64,
}

impl fmt::Display for WeatherSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:03}% {:.2} {:.2} {:+.2} ({:5.1},{:03})",
            self.time.format("%Y-%m-%d %H:%M"),
            self.condition,
            self.clouds,
            self.rain,
            self.snow,
            self.temperature,
            self.wind_speed,
            self.wind_deg as i32,
        )
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SeriesError {
    #[error("weather series contains no samples")]
    Empty,

    #[error("sample {index} at {time} does not follow the previous sample")]
    NotIncreasing { index: usize, time: DateTime<Utc> },
}

/// Failure to turn a provider payload into a [`WeatherSample`].
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("timestamp {0} is out of range")]
    BadTimestamp(i64),

    #[error("UTC offset of {0} seconds is out of range")]
    BadOffset(i32),
}

/// Time-ordered samples for one place. The first sample is "now".
#[derive(Debug, Clone)]
pub struct WeatherSeries {
    location: Location,
    utc_offset: FixedOffset,
    samples: Vec<WeatherSample>,
}

impl WeatherSeries {
    pub fn new(
        location: Location,
        utc_offset: FixedOffset,
        samples: Vec<WeatherSample>,
    ) -> Result<Self, SeriesError> {
        if samples.is_empty() {
            return Err(SeriesError::Empty);
        }

        for (index, pair) in samples.windows(2).enumerate() {
            if pair[1].time <= pair[0].time {
                return Err(SeriesError::NotIncreasing { index: index + 1, time: pair[1].time });
            }
        }

        Ok(Self { location, utc_offset, samples })
    }

    pub fn location(&self) -> Location {
        self.location
    }

    /// Civil offset of the place, used for local hours and solar events.
    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }

    pub fn samples(&self) -> &[WeatherSample] {
        &self.samples
    }

    pub fn current(&self) -> &WeatherSample {
        // `new` guarantees at least one sample.
        &self.samples[0]
    }

    /// First sample strictly after `t`, or `None` when `t` is past the data.
    pub fn get(&self, t: DateTime<Utc>) -> Option<&WeatherSample> {
        self.samples.iter().find(|s| s.time > t)
    }

    pub fn sample_after(&self, t: DateTime<Utc>) -> Option<&WeatherSample> {
        self.get(t)
    }

    /// Minimum and maximum temperature of samples at or before `until`.
    pub fn temperature_range(&self, until: DateTime<Utc>) -> (f64, f64) {
        let current = self.current().temperature;
        self.samples
            .iter()
            .filter(|s| s.time <= until)
            .fold((current, current), |(lo, hi), s| {
                (lo.min(s.temperature), hi.max(s.temperature))
            })
    }
}
