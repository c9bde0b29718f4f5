use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};

use crate::{
    Config, WeatherSeries,
    provider::{cache::JsonCache, openweather::OpenWeatherProvider},
};

pub mod cache;
pub mod openweather;

/// Source of the weather series the landscape is drawn from.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch_series(&self) -> anyhow::Result<WeatherSeries>;
}

/// Construct the OpenWeatherMap provider, with its response cache, from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherProvider>> {
    let api_key = config.require_api_key()?;

    let cache = JsonCache::new(
        config.paths.cache_dir.clone(),
        config.location,
        Duration::from_secs(config.cache_ttl_secs),
    );

    Ok(Box::new(OpenWeatherProvider::new(
        api_key.to_owned(),
        config.location,
        config.units,
        cache,
    )))
}
