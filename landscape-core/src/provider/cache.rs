//! On-disk copies of raw provider responses, keyed by place.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use crate::model::Location;

const CURRENT_PREFIX: &str = "openweathermap_curr_";
const FORECAST_PREFIX: &str = "openweathermap_fcst_";
const EXT: &str = ".json";

/// Which response a cache file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Current,
    Forecast,
}

impl Endpoint {
    fn prefix(&self) -> &'static str {
        match self {
            Endpoint::Current => CURRENT_PREFIX,
            Endpoint::Forecast => FORECAST_PREFIX,
        }
    }
}

/// Six hex digits per coordinate, from its value in 1e-4 degree units.
pub fn place_key(location: Location) -> String {
    coordinate_key(location.latitude) + &coordinate_key(location.longitude)
}

fn coordinate_key(p: f64) -> String {
    let n = (p * 10_000.0) as i64;
    let hex = format!("{:08X}", n as u32);
    hex[2..].to_string()
}

/// True when `path` is missing or was modified more than `max_age` ago.
pub fn is_stale(path: &Path, max_age: Duration) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|m| m.modified()) else {
        return true;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age > max_age,
        // Modified in the future: treat as fresh.
        Err(_) => false,
    }
}

#[derive(Debug, Clone)]
pub struct JsonCache {
    dir: PathBuf,
    key: String,
    max_age: Duration,
}

impl JsonCache {
    pub fn new(dir: PathBuf, location: Location, max_age: Duration) -> Self {
        Self { dir, key: place_key(location), max_age }
    }

    pub fn path(&self, endpoint: Endpoint) -> PathBuf {
        self.dir.join(format!("{}{}{EXT}", endpoint.prefix(), self.key))
    }

    /// Both responses are present and young enough to reuse.
    pub fn is_fresh(&self) -> bool {
        !is_stale(&self.path(Endpoint::Current), self.max_age)
            && !is_stale(&self.path(Endpoint::Forecast), self.max_age)
    }

    pub fn read(&self, endpoint: Endpoint) -> Result<String> {
        let path = self.path(endpoint);
        fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cached response: {}", path.display()))
    }

    pub fn write(&self, endpoint: Endpoint, body: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory: {}", self.dir.display()))?;

        let path = self.path(endpoint);
        fs::write(&path, body)
            .with_context(|| format!("Failed to write cached response: {}", path.display()))
    }
}
