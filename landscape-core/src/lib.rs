//! Core library for the `landscape` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - The OpenWeatherMap provider and its on-disk response cache
//! - Weather samples and the time-ordered series drawn from them
//! - Sunrise / sunset calculation
//! - Sprite compositing and the landscape renderer
//!
//! It is used by `landscape-cli`, but can also be reused by other binaries or services.

pub mod canvas;
pub mod config;
pub mod landscape;
pub mod model;
pub mod provider;
pub mod sprite;
pub mod sun;

pub use canvas::render_landscape;
pub use config::Config;
pub use landscape::{DrawSummary, Geometry, LandscapeRenderer};
pub use model::{Location, TemperatureUnit, WeatherSample, WeatherSeries};
pub use provider::{WeatherProvider, provider_from_config};
pub use sun::{EphemerisError, SolarEphemeris};
