//! Color-keyed sprite compositing onto an RGBA canvas.
//!
//! Sprites are small indexed bitmaps (`cloud_02.png`, `digit_07.png`, ...) in a
//! 2-tone palette. Four colors are reserved: transparent (skipped), outline
//! (black), fill (white) and accent (red, remapped to black so highlighted
//! edges survive on a black and white panel). Any other opaque color is copied
//! unchanged.

use image::{Rgba, RgbaImage};
use rand::Rng;
use std::{
    collections::HashMap,
    fmt::Debug,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::debug;

use crate::landscape::HorizonCurve;

pub const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
pub const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const ACCENT: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

pub const PLUS_SPRITE: u32 = 10;
pub const MINUS_SPRITE: u32 = 11;
pub const COLON_SPRITE: u32 = 12;

const CLOUD_MIN_PERCENT: u8 = 2;
const RAIN_FACTOR: f64 = 20.0;
const SNOW_FACTOR: f64 = 10.0;
const HEAVY_PRECIPITATION_MM: f64 = 5.0;
/// Index offset of the wind sprites leaning west.
const WIND_WEST_OFFSET: u32 = 10;

/// Upper percent bound (exclusive) -> cloud sprite indices to draw.
const CLOUD_SETS: &[(u8, &[u32])] = &[
    (5, &[2]),
    (10, &[3, 2]),
    (20, &[5, 3, 2]),
    (30, &[10, 5]),
    (40, &[10, 10]),
    (50, &[10, 10, 5]),
    (60, &[30, 5]),
    (70, &[30, 10]),
    (80, &[30, 10, 5, 5]),
    (90, &[30, 10, 10]),
];
const OVERCAST_SET: &[u32] = &[50, 30, 10, 10, 5];

#[derive(Debug, Error)]
pub enum SpriteError {
    #[error("sprite {0} not found")]
    NotFound(String),

    #[error("failed to decode sprite {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Where sprite bitmaps come from.
pub trait SpriteSource: Debug {
    fn load(&self, name: &str, index: u32) -> Result<RgbaImage, SpriteError>;
}

/// Sprites stored as `<dir>/<name>_<NN>.png`.
#[derive(Debug, Clone)]
pub struct DirSprites {
    dir: PathBuf,
}

impl DirSprites {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, name: &str, index: u32) -> PathBuf {
        self.dir.join(format!("{name}_{index:02}.png"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SpriteSource for DirSprites {
    fn load(&self, name: &str, index: u32) -> Result<RgbaImage, SpriteError> {
        let path = self.path_for(name, index);
        if !path.exists() {
            return Err(SpriteError::NotFound(path.display().to_string()));
        }

        let img = image::open(&path).map_err(|source| SpriteError::Decode { path, source })?;
        Ok(img.to_rgba8())
    }
}

/// In-memory sprite set, for embedding assets or test fixtures.
#[derive(Debug, Clone, Default)]
pub struct MemorySprites {
    sprites: HashMap<(String, u32), RgbaImage>,
}

impl MemorySprites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, index: u32, img: RgbaImage) {
        self.sprites.insert((name.to_string(), index), img);
    }

    pub fn with(mut self, name: &str, index: u32, img: RgbaImage) -> Self {
        self.insert(name, index, img);
        self
    }
}

impl SpriteSource for MemorySprites {
    fn load(&self, name: &str, index: u32) -> Result<RgbaImage, SpriteError> {
        self.sprites
            .get(&(name.to_string(), index))
            .cloned()
            .ok_or_else(|| SpriteError::NotFound(format!("{name}_{index:02}")))
    }
}

/// Lazily loaded sprites. Each (name, index) is read at most once; failed
/// loads are remembered as misses.
#[derive(Debug)]
pub struct SpriteSheet<S> {
    source: S,
    loaded: HashMap<(String, u32), Option<RgbaImage>>,
}

impl<S: SpriteSource> SpriteSheet<S> {
    pub fn new(source: S) -> Self {
        Self { source, loaded: HashMap::new() }
    }

    pub fn get(&mut self, name: &str, index: u32) -> Option<&RgbaImage> {
        let source = &self.source;
        self.loaded
            .entry((name.to_string(), index))
            .or_insert_with(|| match source.load(name, index) {
                Ok(img) => Some(img),
                Err(e) => {
                    debug!("sprite unavailable: {e}");
                    None
                }
            })
            .as_ref()
    }

    /// Number of distinct sprites requested so far, hits and misses.
    pub fn cached(&self) -> usize {
        self.loaded.len()
    }
}

/// Paints sprites and procedural precipitation onto a borrowed canvas.
///
/// The random source only adds texture (cloud offsets, precipitation speckle);
/// supply a seeded generator for reproducible output.
pub struct Compositor<'a, S, R> {
    canvas: &'a mut RgbaImage,
    sheet: &'a mut SpriteSheet<S>,
    rng: R,
}

impl<'a, S: SpriteSource, R: Rng> Compositor<'a, S, R> {
    pub fn new(canvas: &'a mut RgbaImage, sheet: &'a mut SpriteSheet<S>, rng: R) -> Self {
        Self { canvas, sheet, rng }
    }

    pub fn width(&self) -> i32 {
        self.canvas.width() as i32
    }

    pub fn height(&self) -> i32 {
        self.canvas.height() as i32
    }

    pub fn canvas(&self) -> &RgbaImage {
        &*self.canvas
    }

    /// Sets one pixel. Writes outside the canvas are dropped.
    pub fn dot(&mut self, x: i32, y: i32, color: Rgba<u8>) {
        put(self.canvas, x, y, color);
    }

    /// Draws sprite `name`/`index` with its bottom edge on row `y`.
    /// Returns the sprite width, or 0 when the sprite is unavailable.
    pub fn draw(&mut self, name: &str, index: u32, x: i32, y: i32) -> i32 {
        match self.sheet.get(name, index) {
            Some(sprite) => blit(self.canvas, sprite, x, y),
            None => 0,
        }
    }

    /// Draws a two-digit integer and returns the width consumed.
    ///
    /// A sign glyph is drawn for negative values, and for all values when
    /// `with_sign` is set. `leading_zero` keeps a zero tens digit.
    pub fn draw_int(&mut self, n: i32, x: i32, y: i32, with_sign: bool, leading_zero: bool) -> i32 {
        let magnitude = n.unsigned_abs().min(99);
        let tens = magnitude / 10;
        let ones = magnitude % 10;
        let mut dx = 0;

        if with_sign || n < 0 {
            let sign = if n < 0 { MINUS_SPRITE } else { PLUS_SPRITE };
            dx += self.draw("digit", sign, x + dx, y) + 1;
        }
        if tens != 0 || leading_zero {
            dx += self.draw("digit", tens, x + dx, y) + 1;
        }
        dx += self.draw("digit", ones, x + dx, y) + 1;
        dx
    }

    /// Draws `hh:mm` with zero-padded fields. Returns the width consumed.
    pub fn draw_clock(&mut self, hours: i32, minutes: i32, x: i32, y: i32) -> i32 {
        let mut dx = self.draw_int(hours, x, y, false, true);
        dx += self.draw("digit", COLON_SPRITE, x + dx, y);
        dx += self.draw_int(minutes, x + dx, y, false, true);
        dx + 1
    }

    /// Scatters cloud sprites along `[x, x + width)` for the given cover.
    /// Returns how many cloud sprites were drawn.
    pub fn draw_cloud(&mut self, percent: u8, x: i32, y: i32, width: i32) -> usize {
        if percent < CLOUD_MIN_PERCENT || width <= 0 {
            return 0;
        }

        let mut drawn = 0;
        for &index in cloud_set(percent) {
            let offset = self.rng.gen_range(0..width);
            if self.draw("cloud", index, x + offset, y) > 0 {
                drawn += 1;
            }
        }
        drawn
    }

    /// Rain streaks between `y` and the horizon over `[x, x + width)`.
    pub fn draw_rain(&mut self, value: f64, x: i32, y: i32, width: i32, curve: &HorizonCurve) {
        self.stipple(value, RAIN_FACTOR, x, y, width, curve, 2);
    }

    /// Snow flakes between `y` and the horizon over `[x, x + width)`.
    pub fn draw_snow(&mut self, value: f64, x: i32, y: i32, width: i32, curve: &HorizonCurve) {
        self.stipple(value, SNOW_FACTOR, x, y, width, curve, 1);
    }

    #[allow(clippy::too_many_arguments)]
    fn stipple(
        &mut self,
        value: f64,
        factor: f64,
        x: i32,
        y: i32,
        width: i32,
        curve: &HorizonCurve,
        mark_height: i32,
    ) {
        let threshold = 1.0 - (value / HEAVY_PRECIPITATION_MM) / factor;
        if threshold >= 1.0 {
            return;
        }

        for col in x..x + width {
            let Some(bottom) = curve.row(col) else {
                continue;
            };
            for row in (y + 1..bottom).step_by(2) {
                if self.rng.gen_range(0.0..1.0) > threshold {
                    for k in 0..mark_height {
                        put(self.canvas, col, row - k, BLACK);
                    }
                }
            }
        }
    }

    /// Wind marker standing on the horizon at column `x`.
    /// Returns the sprite width, 0 for calm air or a missing sprite.
    pub fn draw_wind(&mut self, speed: f64, direction: f64, x: i32, curve: &HorizonCurve) -> i32 {
        let (Some(strength), Some(y)) = (wind_strength(speed), curve.row(x)) else {
            return 0;
        };

        // Meteorological direction is where the wind comes from; from the
        // western half it pushes east.
        let leans_east = direction.to_radians().sin() < 0.0;
        let index = if leans_east { strength } else { strength + WIND_WEST_OFFSET };
        self.draw("tree", index, x, y)
    }
}

/// Cloud sprite indices for a cover percentage; larger sets for more cover.
pub fn cloud_set(percent: u8) -> &'static [u32] {
    if percent < CLOUD_MIN_PERCENT {
        return &[];
    }
    CLOUD_SETS
        .iter()
        .find(|(limit, _)| percent < *limit)
        .map(|(_, set)| *set)
        .unwrap_or(OVERCAST_SET)
}

fn wind_strength(speed: f64) -> Option<u32> {
    match speed {
        s if s < 1.5 => None,
        s if s < 3.5 => Some(1),
        s if s < 6.0 => Some(2),
        s if s < 9.0 => Some(3),
        _ => Some(4),
    }
}

fn put(canvas: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= canvas.width() as i32 || y >= canvas.height() as i32 {
        return;
    }
    canvas.put_pixel(x as u32, y as u32, color);
}

fn blit(canvas: &mut RgbaImage, sprite: &RgbaImage, x: i32, bottom: i32) -> i32 {
    let top = bottom - sprite.height() as i32;

    for (sx, sy, px) in sprite.enumerate_pixels() {
        let color = match *px {
            c if c == ACCENT => BLACK,
            c if c.0[3] == 0 => continue,
            c => c,
        };
        put(canvas, x + sx as i32, top + sy as i32, color);
    }

    sprite.width() as i32
}
