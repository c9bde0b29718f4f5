//! The landscape: a horizon whose height follows the temperature forecast,
//! dressed with sprites for sun and moon, clouds, precipitation and wind.

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    model::{WeatherSample, WeatherSeries},
    sprite::{BLACK, Compositor, SpriteSource},
    sun::SolarEphemeris,
};

/// Column of the current temperature, right of the house.
const HOUSE_LABEL_X: i32 = 8;

/// Pixel layout of the forecast strip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    /// Columns reserved for current conditions.
    pub x_start: i32,
    /// Width of one forecast slot.
    pub x_step: i32,
    /// Flat part of each slot where labels sit.
    pub x_flat: i32,
    /// Vertical pixel budget of the temperature curve.
    pub y_step: i32,
    pub default_degrees_per_pixel: f64,
    pub forecast_period_hours: u32,
    /// Most sun/moon sprites drawn in one render.
    pub max_celestial: usize,
    /// Distance from the horizon down to temperature labels.
    pub label_offset: i32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            x_start: 32,
            x_step: 44,
            x_flat: 10,
            y_step: 50,
            default_degrees_per_pixel: 0.5,
            forecast_period_hours: 3,
            max_celestial: 2,
            label_offset: 10,
        }
    }
}

impl Geometry {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.x_step > 0, "render.x_step must be positive");
        anyhow::ensure!(
            (0..self.x_step).contains(&self.x_flat),
            "render.x_flat must be in 0..x_step"
        );
        anyhow::ensure!(self.x_start >= 0, "render.x_start must not be negative");
        anyhow::ensure!(self.y_step > 0, "render.y_step must be positive");
        anyhow::ensure!(
            self.default_degrees_per_pixel > 0.0,
            "render.default_degrees_per_pixel must be positive"
        );
        anyhow::ensure!(self.forecast_period_hours > 0, "render.forecast_period_hours must be positive");
        Ok(())
    }

    fn ramp(&self) -> i32 {
        (self.x_step - self.x_flat) / 2
    }
}

/// Per-draw state: scale, baseline and canvas size. Built at the start of a
/// draw pass and dropped at its end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderContext {
    pub geometry: Geometry,
    pub baseline_y: i32,
    pub width: i32,
    pub height: i32,
    pub now: DateTime<Utc>,
    pub utc_offset: FixedOffset,
    pub t_min: f64,
    pub t_max: f64,
    pub degrees_per_pixel: f64,
}

impl RenderContext {
    pub fn new(geometry: Geometry, baseline_y: i32, width: i32, height: i32, series: &WeatherSeries) -> Self {
        let now = series.current().time;
        let mut ctx = Self {
            geometry,
            baseline_y,
            width,
            height,
            now,
            utc_offset: series.utc_offset(),
            t_min: 0.0,
            t_max: 0.0,
            degrees_per_pixel: geometry.default_degrees_per_pixel,
        };

        let (t_min, t_max) = series.temperature_range(ctx.horizon());
        ctx.t_min = t_min;
        ctx.t_max = t_max;
        ctx.degrees_per_pixel = degrees_per_pixel(&geometry, t_min, t_max);
        ctx
    }

    /// Forecast slots after the current-conditions block.
    pub fn forecasts(&self) -> i32 {
        (self.width.max(self.geometry.x_start) - self.geometry.x_start) / self.geometry.x_step
    }

    /// Slots visited by a draw pass; the last one may hang off the right edge.
    pub fn slot_count(&self) -> usize {
        self.forecasts() as usize + 1
    }

    pub fn period(&self) -> Duration {
        Duration::hours(i64::from(self.geometry.forecast_period_hours))
    }

    /// End of the time range shown on the canvas.
    pub fn horizon(&self) -> DateTime<Utc> {
        self.now + self.period() * self.forecasts()
    }

    pub fn slot_time(&self, slot: usize) -> DateTime<Utc> {
        self.now + self.period() * slot as i32
    }

    pub fn slot_x(&self, slot: usize) -> i32 {
        self.geometry.x_start + slot as i32 * self.geometry.x_step
    }

    /// First column of the slot's flat label zone.
    pub fn flat_x(&self, slot: usize) -> i32 {
        self.slot_x(slot) + self.geometry.ramp()
    }

    /// Canvas row for a temperature. Warmer is higher, i.e. a smaller row.
    pub fn row_for(&self, temperature: f64) -> i32 {
        let lift = ((temperature - self.t_min) / self.degrees_per_pixel) as i32;
        (self.baseline_y + self.geometry.y_step - lift).max(0)
    }

    /// Horizontal distance covered by `dt` at one slot per forecast period.
    pub fn pixels_for(&self, dt: Duration) -> i32 {
        let period = self.period().num_seconds() as f64;
        (dt.num_seconds() as f64 * f64::from(self.geometry.x_step) / period) as i32
    }

    pub fn cloud_y(&self) -> i32 {
        self.baseline_y - self.geometry.y_step / 2
    }

    pub fn celestial_y(&self) -> i32 {
        self.baseline_y - self.geometry.y_step * 5 / 8
    }

    fn curve_len(&self) -> usize {
        (self.width.max(self.geometry.x_start) + self.geometry.x_step + 1) as usize
    }
}

/// Degrees per pixel row. Ranges narrower than the pixel budget use the
/// default scale so calm days are not stretched over the whole strip.
pub fn degrees_per_pixel(geometry: &Geometry, t_min: f64, t_max: f64) -> f64 {
    let range = t_max - t_min;
    if range < f64::from(geometry.y_step) {
        geometry.default_degrees_per_pixel
    } else {
        range / f64::from(geometry.y_step)
    }
}

/// Horizon row for every column, with one slot of slack past the right edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HorizonCurve {
    rows: Vec<i32>,
}

impl HorizonCurve {
    pub fn filled(len: usize, row: i32) -> Self {
        Self { rows: vec![row; len] }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[i32] {
        &self.rows
    }

    pub fn row(&self, x: i32) -> Option<i32> {
        usize::try_from(x).ok().and_then(|x| self.rows.get(x)).copied()
    }

    fn fill(&mut self, from: i32, to: i32, row: i32) {
        for x in from.max(0)..to {
            if let Some(slot) = self.rows.get_mut(x as usize) {
                *slot = row;
            }
        }
    }

    /// Smooth transition from `from_row` at column `start` to `to_row` at `end`.
    fn ease(&mut self, start: i32, end: i32, from_row: i32, to_row: i32) {
        let span = f64::from(end - start);
        for x in start.max(0)..end {
            let t = f64::from(x - start) / span;
            if let Some(slot) = self.rows.get_mut(x as usize) {
                *slot = smooth_step(t, f64::from(from_row), f64::from(to_row)) as i32;
            }
        }
    }
}

/// Cubic Bezier with control ordinates (a, a, b, b). This reduces to the
/// smoothstep polynomial: monotone, no overshoot, flat at both ends.
fn smooth_step(t: f64, a: f64, b: f64) -> f64 {
    let s = t * t * (3.0 - 2.0 * t);
    a + (b - a) * s
}

/// What a draw pass produced, besides the pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawSummary {
    pub curve: HorizonCurve,
    /// Slots that had a forecast sample.
    pub slots_drawn: usize,
    /// Slot labeled with the period minimum.
    pub min_slot: Option<usize>,
    /// Slot labeled with the period maximum.
    pub max_slot: Option<usize>,
    /// Sun and moon sprites placed.
    pub celestial: usize,
    /// Columns whose horizon row fell below the canvas.
    pub omitted_columns: usize,
}

#[derive(Debug, Clone, Copy)]
struct Slot<'s> {
    index: usize,
    start: DateTime<Utc>,
    sample: &'s WeatherSample,
}

pub struct LandscapeRenderer<'a, S, R> {
    compositor: Compositor<'a, S, R>,
    geometry: Geometry,
}

impl<'a, S: SpriteSource, R: Rng> LandscapeRenderer<'a, S, R> {
    /// Fails when `geometry` would make the slot math divide by zero.
    pub fn new(compositor: Compositor<'a, S, R>, geometry: Geometry) -> anyhow::Result<Self> {
        geometry.validate()?;
        Ok(Self { compositor, geometry })
    }

    pub fn compositor(&self) -> &Compositor<'a, S, R> {
        &self.compositor
    }

    /// Renders `series` with the temperature curve's lower bound near
    /// `baseline_y + y_step`.
    pub fn draw(&mut self, baseline_y: i32, series: &WeatherSeries) -> DrawSummary {
        let ctx = RenderContext::new(
            self.geometry,
            baseline_y,
            self.compositor.width(),
            self.compositor.height(),
            series,
        );
        debug!(
            t_min = ctx.t_min,
            t_max = ctx.t_max,
            degrees_per_pixel = ctx.degrees_per_pixel,
            "render scale"
        );

        let slots = collect_slots(&ctx, series);
        let current = series.current();
        let current_row = ctx.row_for(current.temperature);
        let mut curve = HorizonCurve::filled(ctx.curve_len(), current_row);

        self.draw_current(&ctx, current, current_row, &curve);
        trace_curve(&ctx, &slots, current_row, &mut curve);
        let celestial = self.place_celestial(&ctx, series, &slots);
        let (min_slot, max_slot) = self.decorate_slots(&ctx, &slots, &curve);
        let omitted_columns = self.dot_curve(&ctx, &curve);

        DrawSummary {
            curve,
            slots_drawn: slots.len(),
            min_slot,
            max_slot,
            celestial,
            omitted_columns,
        }
    }

    fn draw_current(&mut self, ctx: &RenderContext, current: &WeatherSample, row: i32, curve: &HorizonCurve) {
        let g = &ctx.geometry;
        let c = &mut self.compositor;

        c.draw("house", 0, 0, row);
        c.draw_int(current.temperature.round() as i32, HOUSE_LABEL_X, row + g.label_offset, false, false);
        c.draw_cloud(current.clouds, 0, ctx.cloud_y(), g.x_start);
        c.draw_rain(current.rain, 0, ctx.cloud_y(), g.x_start, curve);
        c.draw_snow(current.snow, 0, ctx.cloud_y(), g.x_start, curve);
    }

    /// Sun at sunrise, moon at sunset, up to `max_celestial` in total.
    fn place_celestial(&mut self, ctx: &RenderContext, series: &WeatherSeries, slots: &[Slot<'_>]) -> usize {
        let sun = SolarEphemeris::new(series.location());
        let limit = ctx.geometry.max_celestial;
        let mut placed = 0;

        for slot in slots {
            let start = slot.start.with_timezone(&ctx.utc_offset);
            let end = start + ctx.period();
            let x = ctx.slot_x(slot.index);

            for (name, event) in [("sun", sun.sunrise(start)), ("moon", sun.sunset(start))] {
                if placed >= limit {
                    return placed;
                }
                match event {
                    Ok(t) if start < t && t < end => {
                        let dx = ctx.pixels_for(t - start) - ctx.geometry.x_step / 2;
                        self.compositor.draw(name, 0, x + dx, ctx.celestial_y());
                        placed += 1;
                    }
                    Ok(_) => {}
                    Err(e) => debug!(slot = slot.index, "no {name} event: {e}"),
                }
            }
        }
        placed
    }

    /// Min/max labels, day markers, wind and sky for every slot.
    fn decorate_slots(
        &mut self,
        ctx: &RenderContext,
        slots: &[Slot<'_>],
        curve: &HorizonCurve,
    ) -> (Option<usize>, Option<usize>) {
        let g = ctx.geometry;
        // Only slots inside the scaled horizon compete; the trailing one may sit off-canvas.
        let horizon = ctx.horizon();
        let labelable = || slots.iter().filter(move |s| s.sample.time <= horizon);
        let min_slot = labelable()
            .reduce(|a, b| if b.sample.temperature < a.sample.temperature { b } else { a })
            .map(|s| s.index);
        let max_slot = labelable()
            .reduce(|a, b| if b.sample.temperature > a.sample.temperature { b } else { a })
            .map(|s| s.index);

        let half_period = ctx.period() / 2;
        let dx_per_hour = f64::from(g.x_step) / f64::from(g.forecast_period_hours);

        for slot in slots {
            let x = ctx.slot_x(slot.index);
            let sample = slot.sample;

            if Some(slot.index) == min_slot || Some(slot.index) == max_slot {
                let label_x = ctx.flat_x(slot.index);
                if let Some(row) = curve.row(label_x) {
                    let t = sample.temperature.round() as i32;
                    self.compositor.draw_int(t, label_x, row + g.label_offset, false, false);
                }
            }

            let end = sample.time + half_period;
            let mut t = sample.time - half_period;
            let mut xx = f64::from(x);
            while t < end {
                let ix = xx as i32;
                if let Some(row) = curve.row(ix) {
                    match t.with_timezone(&ctx.utc_offset).hour() {
                        12 => {
                            self.compositor.draw("flower", 1, ix, row);
                        }
                        0 => {
                            self.compositor.draw("flower", 0, ix, row);
                        }
                        h if h % 3 == 0 => {
                            self.compositor.draw_wind(sample.wind_speed, sample.wind_deg, ix, curve);
                        }
                        _ => {}
                    }
                }
                t += Duration::hours(1);
                xx += dx_per_hour;
            }

            self.compositor.draw_cloud(sample.clouds, x, ctx.cloud_y(), g.x_step);
            self.compositor.draw_rain(sample.rain, x, ctx.cloud_y(), g.x_step, curve);
            self.compositor.draw_snow(sample.snow, x, ctx.cloud_y(), g.x_step, curve);
        }

        (min_slot, max_slot)
    }

    /// Dots the horizon across the canvas; returns columns left out.
    fn dot_curve(&mut self, ctx: &RenderContext, curve: &HorizonCurve) -> usize {
        let mut omitted = 0;
        for x in 0..ctx.width {
            let Some(row) = curve.row(x) else {
                continue;
            };
            if row < ctx.height {
                self.compositor.dot(x, row, BLACK);
            } else {
                warn!(column = x, row, height = ctx.height, "horizon below canvas");
                omitted += 1;
            }
        }
        omitted
    }
}

fn collect_slots<'s>(ctx: &RenderContext, series: &'s WeatherSeries) -> Vec<Slot<'s>> {
    (0..ctx.slot_count())
        .filter_map(|index| {
            let start = ctx.slot_time(index);
            let sample = series.get(start);
            if sample.is_none() {
                debug!(slot = index, %start, "no forecast sample; slot skipped");
            }
            sample.map(|sample| Slot { index, start, sample })
        })
        .collect()
}

/// Ramps into each slot's row, then holds it across the flat label zone.
fn trace_curve(ctx: &RenderContext, slots: &[Slot<'_>], current_row: i32, curve: &mut HorizonCurve) {
    let g = ctx.geometry;
    let mut prev_row = current_row;
    let mut written = g.x_start;

    for slot in slots {
        let row = ctx.row_for(slot.sample.temperature);
        let flat = ctx.flat_x(slot.index);
        let ramp_start = if slot.index == 0 { g.x_start } else { flat - (g.x_step - g.x_flat) };

        curve.fill(written, ramp_start, prev_row);
        curve.ease(ramp_start, flat, prev_row, row);
        curve.fill(flat, flat + g.x_flat, row);

        prev_row = row;
        written = flat + g.x_flat;
    }

    curve.fill(written, curve.len() as i32, prev_row);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Location, tests::sample},
        sprite::{MemorySprites, SpriteSheet, WHITE, tests::solid},
    };
    use chrono::TimeZone;
    use image::RgbaImage;
    use rand::{SeedableRng, rngs::StdRng};

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn series_from(start: DateTime<Utc>, offset: FixedOffset, location: Location, temps: &[f64]) -> WeatherSeries {
        let samples = temps
            .iter()
            .enumerate()
            .map(|(i, t)| sample(start + Duration::hours(3 * i as i64), *t))
            .collect();
        WeatherSeries::new(location, offset, samples).unwrap()
    }

    fn three_slot_series() -> WeatherSeries {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        series_from(start, utc(), Location::default(), &[10.0, 15.0, 8.0])
    }

    fn digits() -> MemorySprites {
        (0..12).fold(MemorySprites::new(), |set, i| set.with("digit", i, solid(3, 5, BLACK)))
    }

    fn render(
        canvas: &mut RgbaImage,
        sprites: MemorySprites,
        geometry: Geometry,
        baseline: i32,
        series: &WeatherSeries,
        seed: u64,
    ) -> DrawSummary {
        let mut sheet = SpriteSheet::new(sprites);
        let compositor = Compositor::new(canvas, &mut sheet, StdRng::seed_from_u64(seed));
        LandscapeRenderer::new(compositor, geometry).unwrap().draw(baseline, series)
    }

    #[test]
    fn narrow_range_uses_default_scale() {
        let g = Geometry::default();
        assert_eq!(degrees_per_pixel(&g, 8.0, 15.0), 0.5);
        assert_eq!(degrees_per_pixel(&g, -3.0, 40.0), 0.5);
        assert_eq!(degrees_per_pixel(&g, -30.0, 70.0), 2.0);
    }

    #[test]
    fn warmer_is_higher_on_screen() {
        let ctx = RenderContext::new(Geometry::default(), 100, 296, 200, &three_slot_series());
        assert!(ctx.row_for(15.0) < ctx.row_for(10.0));
        assert!(ctx.row_for(10.0) < ctx.row_for(8.0));
        assert_eq!(ctx.row_for(8.0), 150);
        assert_eq!(ctx.row_for(15.0), 136);
    }

    #[test]
    fn context_geometry() {
        let ctx = RenderContext::new(Geometry::default(), 65, 296, 128, &three_slot_series());
        assert_eq!(ctx.forecasts(), 6);
        assert_eq!(ctx.slot_count(), 7);
        assert_eq!(ctx.horizon(), ctx.now + Duration::hours(18));
        assert_eq!(ctx.flat_x(0), 49);
        assert_eq!(ctx.flat_x(1), 93);
        assert_eq!(ctx.pixels_for(Duration::hours(3)), 44);
        assert_eq!(ctx.pixels_for(Duration::minutes(90)), 22);
    }

    #[test]
    fn smooth_step_is_monotone_without_overshoot() {
        let mut prev = smooth_step(0.0, 140.0, 100.0);
        assert_eq!(prev, 140.0);
        for i in 1..=20 {
            let y = smooth_step(f64::from(i) / 20.0, 140.0, 100.0);
            assert!(y <= prev && y >= 100.0);
            prev = y;
        }
        assert_eq!(prev, 100.0);
    }

    #[test]
    fn example_series_labels_and_curve_shape() {
        let series = three_slot_series();
        let mut canvas = RgbaImage::from_pixel(296, 200, WHITE);
        let summary = render(&mut canvas, digits(), Geometry::default(), 100, &series, 1);

        assert_eq!(summary.slots_drawn, 2);
        assert_eq!(summary.max_slot, Some(0));
        assert_eq!(summary.min_slot, Some(1));
        assert_eq!(summary.omitted_columns, 0);

        let c = summary.curve.rows();
        // Current 10, then 15, then 8: the horizon rises, then falls.
        assert_eq!(c[0], 146);
        assert_eq!(c[55], 136);
        assert_eq!(c[98], 150);
        assert!(c[32..49].windows(2).all(|w| w[1] <= w[0]));
        assert!(c[59..93].windows(2).all(|w| w[1] >= w[0]));

        // "15" label hangs under the flat part of slot 0.
        assert_eq!(*canvas.get_pixel(50, 144), BLACK);
        // Horizon dot.
        assert_eq!(*canvas.get_pixel(20, 146), BLACK);
        assert_eq!(canvas.dimensions(), (296, 200));
    }

    #[test]
    fn curve_is_defined_for_every_column() {
        let series = three_slot_series();
        let mut canvas = RgbaImage::from_pixel(296, 128, WHITE);
        let summary = render(&mut canvas, MemorySprites::new(), Geometry::default(), 65, &series, 2);

        assert!(summary.curve.len() > 296);
        assert!(summary.curve.rows().iter().all(|r| *r >= 0));
        // Past the last forecast the horizon holds the last row.
        assert_eq!(summary.curve.row(295), summary.curve.row(98));
    }

    #[test]
    fn ties_label_first_occurrence_only() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let series = series_from(start, utc(), Location::default(), &[10.0, 15.0, 8.0, 15.0, 8.0, 12.0]);
        let mut canvas = RgbaImage::from_pixel(296, 200, WHITE);
        let summary = render(&mut canvas, digits(), Geometry::default(), 100, &series, 3);

        assert_eq!(summary.max_slot, Some(0));
        assert_eq!(summary.min_slot, Some(1));
        // The repeated 15 at slot 2 gets no label.
        assert_ne!(*canvas.get_pixel(ctx_flat_x(2) + 1, 144), BLACK);
    }

    #[test]
    fn sample_past_horizon_never_takes_a_label() {
        // Slot 6 starts off-canvas and reaches the coldest sample, at +21h.
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let temps = [12.0, 14.0, 11.0, 20.0, 15.0, 13.0, 16.0, -5.0];
        let series = series_from(start, utc(), Location::default(), &temps);
        let mut canvas = RgbaImage::from_pixel(296, 128, WHITE);
        let summary = render(&mut canvas, digits(), Geometry::default(), 65, &series, 8);

        assert_eq!(summary.slots_drawn, 7);
        assert_eq!(summary.min_slot, Some(1));
        assert_eq!(summary.max_slot, Some(2));
        assert!(ctx_flat_x(1) < 296);
    }

    fn ctx_flat_x(slot: i32) -> u32 {
        let g = Geometry::default();
        (g.x_start + slot * g.x_step + (g.x_step - g.x_flat) / 2) as u32
    }

    #[test]
    fn current_sample_only_renders_flat_horizon() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let series = series_from(start, utc(), Location::default(), &[-4.0]);
        let mut canvas = RgbaImage::from_pixel(296, 128, WHITE);
        let summary = render(&mut canvas, digits(), Geometry::default(), 65, &series, 4);

        assert_eq!(summary.slots_drawn, 0);
        assert_eq!(summary.min_slot, None);
        assert_eq!(summary.max_slot, None);
        assert!(summary.curve.rows().iter().all(|r| *r == 115));
        assert_eq!(canvas.dimensions(), (296, 128));
    }

    #[test]
    fn rows_below_canvas_are_omitted_not_fatal() {
        let series = three_slot_series();
        let mut canvas = RgbaImage::from_pixel(296, 140, WHITE);
        let summary = render(&mut canvas, MemorySprites::new(), Geometry::default(), 100, &series, 5);

        // Rows 146 and 150 fall off a 140 px canvas; slot 0's flat at 136 fits.
        assert!(summary.omitted_columns > 0 && summary.omitted_columns < 296);
        assert_eq!(*canvas.get_pixel(50, 136), BLACK);
        assert_eq!(canvas.dimensions(), (296, 140));
    }

    fn summer_series(location: Location, slots: usize) -> WeatherSeries {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let start = offset.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap().with_timezone(&Utc);
        let temps: Vec<f64> = (0..slots).map(|i| 10.0 + (i % 8) as f64).collect();
        series_from(start, offset, location, &temps)
    }

    fn wide_geometry_width(slots: i32) -> u32 {
        let g = Geometry::default();
        (g.x_start + g.x_step * slots) as u32
    }

    #[test]
    fn celestial_sprites_are_capped() {
        let series = summer_series(Location::default(), 26);
        let width = wide_geometry_width(20);

        let mut canvas = RgbaImage::from_pixel(width, 128, WHITE);
        let capped = render(&mut canvas, MemorySprites::new(), Geometry::default(), 65, &series, 6);
        assert_eq!(capped.celestial, 2);

        let mut canvas = RgbaImage::from_pixel(width, 128, WHITE);
        let geometry = Geometry { max_celestial: 10, ..Geometry::default() };
        let uncapped = render(&mut canvas, MemorySprites::new(), geometry, 65, &series, 6);
        assert!(uncapped.celestial >= 4, "placed {}", uncapped.celestial);
    }

    #[test]
    fn polar_night_places_no_celestial_sprites() {
        let svalbard = Location { latitude: 78.22, longitude: 15.65 };
        let offset = FixedOffset::east_opt(3600).unwrap();
        let start = offset.with_ymd_and_hms(2024, 12, 20, 0, 0, 0).unwrap().with_timezone(&Utc);
        let temps = vec![-12.0; 26];
        let series = series_from(start, offset, svalbard, &temps);

        let mut canvas = RgbaImage::from_pixel(wide_geometry_width(20), 128, WHITE);
        let summary = render(&mut canvas, MemorySprites::new(), Geometry::default(), 65, &series, 7);
        assert_eq!(summary.celestial, 0);
        assert_eq!(summary.slots_drawn, 21);
    }

    #[test]
    fn sprites_land_on_canvas() {
        let series = summer_series(Location::default(), 10);
        let sprites = MemorySprites::new()
            .with("sun", 0, solid(5, 5, BLACK))
            .with("house", 0, solid(6, 6, BLACK));
        let mut canvas = RgbaImage::from_pixel(296, 128, WHITE);
        let summary = render(&mut canvas, sprites, Geometry::default(), 65, &series, 8);

        assert!(summary.celestial >= 1);
        // House bottom edge sits on the current horizon row.
        let row = summary.curve.rows()[0];
        assert_eq!(*canvas.get_pixel(2, (row - 1) as u32), BLACK);
    }

    #[test]
    fn seeded_renders_are_identical() {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let mut samples: Vec<WeatherSample> =
            (0..8).map(|i| sample(start + Duration::hours(3 * i), 5.0 + i as f64)).collect();
        for s in &mut samples {
            s.clouds = 60;
            s.rain = 4.0;
        }
        let series = WeatherSeries::new(Location::default(), utc(), samples).unwrap();
        let sprites = [2, 3, 5, 10, 30, 50]
            .into_iter()
            .fold(MemorySprites::new(), |set, i| set.with("cloud", i, solid(6, 3, BLACK)));

        let mut a = RgbaImage::from_pixel(296, 128, WHITE);
        let mut b = RgbaImage::from_pixel(296, 128, WHITE);
        render(&mut a, sprites.clone(), Geometry::default(), 65, &series, 42);
        render(&mut b, sprites, Geometry::default(), 65, &series, 42);
        assert_eq!(a, b);
    }

    #[test]
    fn renderer_rejects_unusable_geometry() {
        let mut canvas = RgbaImage::from_pixel(296, 128, WHITE);
        let mut sheet = SpriteSheet::new(MemorySprites::new());

        for geometry in [
            Geometry { x_step: 0, ..Geometry::default() },
            Geometry { forecast_period_hours: 0, ..Geometry::default() },
        ] {
            let compositor = Compositor::new(&mut canvas, &mut sheet, StdRng::seed_from_u64(0));
            assert!(LandscapeRenderer::new(compositor, geometry).is_err());
        }

        let compositor = Compositor::new(&mut canvas, &mut sheet, StdRng::seed_from_u64(0));
        assert!(LandscapeRenderer::new(compositor, Geometry::default()).is_ok());
    }

    #[test]
    fn geometry_validation() {
        assert!(Geometry::default().validate().is_ok());
        assert!(Geometry { x_flat: 44, ..Geometry::default() }.validate().is_err());
        assert!(Geometry { x_step: 0, ..Geometry::default() }.validate().is_err());
        assert!(Geometry { default_degrees_per_pixel: 0.0, ..Geometry::default() }.validate().is_err());
    }
}
