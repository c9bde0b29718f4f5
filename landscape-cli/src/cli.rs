use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use clap::{Parser, Subcommand};
use inquire::{CustomType, Password, PasswordDisplayMode, Select, validator::Validation};
use std::path::{Path, PathBuf};
use tracing::info;

use landscape_core::{
    Config, EphemerisError, SolarEphemeris, TemperatureUnit, WeatherSeries,
    canvas::{eink_variant, save_image},
    provider::cache::place_key,
    provider_from_config, render_landscape,
};

use crate::server;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "landscape", version, about = "Draws the weather forecast as a landscape")]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset, e.g. "debug" or "landscape_core=trace".
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Config file to use instead of the platform default.
    #[arg(long, global = true, env = "LANDSCAPE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set the API key, location and units interactively.
    Configure,

    /// Print the current forecast and today's sun times.
    Show,

    /// Draw the landscape into an image file.
    Render {
        /// Output path; the format follows the extension.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rotate for the e-ink panel.
        #[arg(long)]
        eink: bool,
    },

    /// Serve the landscape images over HTTP.
    Serve {
        /// Address to bind, e.g. "127.0.0.1:3355".
        #[arg(long)]
        listen: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let path = match self.config {
            Some(path) => path,
            None => Config::config_file_path()?,
        };
        let config = Config::load_from(&path)?;

        match self.command {
            Command::Configure => configure(config, &path),
            Command::Show => {
                let series = provider_from_config(&config)?.fetch_series().await?;
                print_series(&series);
                Ok(())
            }
            Command::Render { output, eink } => {
                let series = provider_from_config(&config)?.fetch_series().await?;
                let output = output.unwrap_or_else(|| default_output(&config));

                let (img, summary) = render_landscape(&config, &series)?;
                let img = if eink { eink_variant(&img) } else { img };
                save_image(&img, &output)?;

                info!(
                    slots = summary.slots_drawn,
                    omitted_columns = summary.omitted_columns,
                    "landscape rendered"
                );
                println!("Wrote {}", output.display());
                Ok(())
            }
            Command::Serve { listen } => server::run(config, listen).await,
        }
    }
}

fn configure(mut config: Config, path: &Path) -> Result<()> {
    let api_key = Password::new("OpenWeatherMap API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .with_help_message("Leave empty to keep the current key")
        .prompt()
        .context("Failed to read API key")?;
    if !api_key.trim().is_empty() {
        config.set_api_key(api_key.trim().to_string());
    }

    let latitude = CustomType::<f64>::new("Latitude:")
        .with_default(config.location.latitude)
        .with_validator(|v: &f64| {
            Ok(if (-90.0..=90.0).contains(v) {
                Validation::Valid
            } else {
                Validation::Invalid("latitude must be between -90 and 90".into())
            })
        })
        .prompt()
        .context("Failed to read latitude")?;

    let longitude = CustomType::<f64>::new("Longitude:")
        .with_default(config.location.longitude)
        .with_validator(|v: &f64| {
            Ok(if (-180.0..=180.0).contains(v) {
                Validation::Valid
            } else {
                Validation::Invalid("longitude must be between -180 and 180".into())
            })
        })
        .prompt()
        .context("Failed to read longitude")?;
    config.set_location(latitude, longitude);

    let units = [TemperatureUnit::Celsius, TemperatureUnit::Fahrenheit];
    let cursor = units.iter().position(|u| *u == config.units).unwrap_or(0);
    config.units = Select::new("Temperature units:", units.to_vec())
        .with_starting_cursor(cursor)
        .prompt()
        .context("Failed to read units")?;

    config.save_to(path)?;
    println!("Saved configuration to {}", path.display());
    Ok(())
}

/// `<cache_dir>/landscape_<place key>.bmp`
fn default_output(config: &Config) -> PathBuf {
    config
        .paths
        .cache_dir
        .join(format!("landscape_{}.bmp", place_key(config.location)))
}

fn print_series(series: &WeatherSeries) {
    let offset = series.utc_offset();
    let loc = series.location();
    println!("Weather at {:.4}, {:.4} (UTC{})", loc.latitude, loc.longitude, offset);

    for sample in series.samples() {
        println!("{}  {}", local_time(sample.time.with_timezone(&offset)), sample);
    }

    let sun = SolarEphemeris::new(loc);
    let now = series.current().time.with_timezone(&offset);
    println!();
    println!("Sunrise:    {}", sun_time(sun.sunrise(now)));
    println!("Solar noon: {}", local_time(sun.solar_noon(now)));
    println!("Sunset:     {}", sun_time(sun.sunset(now)));
}

fn sun_time(t: Result<DateTime<FixedOffset>, EphemerisError>) -> String {
    match t {
        Ok(t) => local_time(t),
        Err(e) => e.to_string(),
    }
}

fn local_time(t: DateTime<FixedOffset>) -> String {
    t.format("%Y-%m-%d %H:%M").to_string()
}
