//! Canvas setup and image output around a render pass.

use anyhow::{Context, Result};
use image::{DynamicImage, RgbaImage, imageops};
use std::{fs, path::Path};
use tracing::{debug, warn};

use crate::{
    Config,
    landscape::{DrawSummary, LandscapeRenderer},
    model::WeatherSeries,
    sprite::{Compositor, DirSprites, SpriteSheet, WHITE},
};

pub fn load_template(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path)
        .with_context(|| format!("Failed to load template image: {}", path.display()))?;
    Ok(img.to_rgba8())
}

/// The configured template, or a white canvas of the configured size.
pub fn load_or_blank(config: &Config) -> RgbaImage {
    if let Some(path) = &config.paths.template {
        match load_template(path) {
            Ok(img) => return img,
            Err(e) => warn!("{e:#}; using a blank canvas"),
        }
    }
    RgbaImage::from_pixel(config.canvas.width, config.canvas.height, WHITE)
}

/// Writes `canvas` without its alpha channel. The format follows the extension.
pub fn save_image(canvas: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    DynamicImage::ImageRgba8(canvas.clone())
        .to_rgb8()
        .save(path)
        .with_context(|| format!("Failed to write image: {}", path.display()))?;

    debug!(path = %path.display(), "image saved");
    Ok(())
}

/// Panel orientation for the e-ink display.
pub fn eink_variant(canvas: &RgbaImage) -> RgbaImage {
    imageops::rotate90(canvas)
}

/// Draws `series` onto the configured canvas with sprites from
/// `config.paths.sprites_dir`.
pub fn render_landscape(config: &Config, series: &WeatherSeries) -> Result<(RgbaImage, DrawSummary)> {
    let mut canvas = load_or_blank(config);
    let mut sheet = SpriteSheet::new(DirSprites::new(config.paths.sprites_dir.clone()));

    let summary = {
        let compositor = Compositor::new(&mut canvas, &mut sheet, rand::thread_rng());
        let mut renderer = LandscapeRenderer::new(compositor, config.render.geometry)
            .context("Invalid render settings")?;
        renderer.draw(config.render.baseline_y, series)
    };

    debug!(
        sprites = sheet.cached(),
        slots = summary.slots_drawn,
        celestial = summary.celestial,
        "landscape rendered"
    );
    Ok((canvas, summary))
}
