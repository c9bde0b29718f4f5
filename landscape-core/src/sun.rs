//! Sunrise, sunset and solar noon for a fixed place (NOAA spreadsheet method).
//!
//! All intermediate angles are in degrees. Results are civil times on the same
//! calendar day and offset as the input instant.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike};
use thiserror::Error;

use crate::model::Location;

/// Zenith angle of the sun's centre at rise/set: refraction plus disk radius.
const ZENITH_DEG: f64 = 90.833;
const JULIAN_OFFSET: f64 = 2_415_018.5;
const J2000: f64 = 2_451_545.0;
const DAYS_PER_CENTURY: f64 = 36_525.0;
const MINUTES_PER_DAY: f64 = 1440.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EphemerisError {
    #[error("the sun does not set on this day (polar day)")]
    PolarDay,

    #[error("the sun does not rise on this day (polar night)")]
    PolarNight,
}

#[inline]
fn sin_deg(x: f64) -> f64 {
    x.to_radians().sin()
}
#[inline]
fn cos_deg(x: f64) -> f64 {
    x.to_radians().cos()
}
#[inline]
fn tan_deg(x: f64) -> f64 {
    x.to_radians().tan()
}

/// Solar quantities for one day, as fractions of the local civil day.
#[derive(Debug, Clone, Copy)]
struct SolarDay {
    noon: f64,
    half_day: Result<f64, EphemerisError>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarEphemeris {
    location: Location,
}

impl SolarEphemeris {
    pub fn new(location: Location) -> Self {
        Self { location }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn sunrise(&self, when: DateTime<FixedOffset>) -> Result<DateTime<FixedOffset>, EphemerisError> {
        let day = self.calc(when);
        let half = day.half_day?;
        Ok(from_day_fraction(when, day.noon - half))
    }

    pub fn sunset(&self, when: DateTime<FixedOffset>) -> Result<DateTime<FixedOffset>, EphemerisError> {
        let day = self.calc(when);
        let half = day.half_day?;
        Ok(from_day_fraction(when, day.noon + half))
    }

    pub fn solar_noon(&self, when: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        from_day_fraction(when, self.calc(when).noon)
    }

    fn calc(&self, when: DateTime<FixedOffset>) -> SolarDay {
        let latitude = self.location.latitude;
        let longitude = self.location.longitude;
        let tz_hours = f64::from(when.offset().local_minus_utc()) / 3600.0;

        let local = when.naive_local();
        let time_frac = f64::from(local.num_seconds_from_midnight()) / 86_400.0;

        let jday = spreadsheet_day(local.date()) + JULIAN_OFFSET + time_frac - tz_hours / 24.0;
        let jcent = (jday - J2000) / DAYS_PER_CENTURY;

        let mean_anom = 357.52911 + jcent * (35999.05029 - 0.0001537 * jcent);
        let mean_long = (280.46646 + jcent * (36000.76983 + jcent * 0.0003032)).rem_euclid(360.0);
        let eccent = 0.016708634 - jcent * (0.000042037 + 0.0001537 * jcent);
        let mean_obliq =
            23.0 + (26.0 + (21.448 - jcent * (46.815 + jcent * (0.00059 - jcent * 0.001813))) / 60.0) / 60.0;
        let obliq = mean_obliq + 0.00256 * cos_deg(125.04 - 1934.136 * jcent);
        let vary = tan_deg(obliq / 2.0).powi(2);

        let eq_center = sin_deg(mean_anom) * (1.914602 - jcent * (0.004817 + 0.000014 * jcent))
            + sin_deg(2.0 * mean_anom) * (0.019993 - 0.000101 * jcent)
            + sin_deg(3.0 * mean_anom) * 0.000289;

        let true_long = mean_long + eq_center;
        let app_long = true_long - 0.00569 - 0.00478 * sin_deg(125.04 - 1934.136 * jcent);
        let declination = (sin_deg(obliq) * sin_deg(app_long)).asin().to_degrees();

        let eq_time = 4.0
            * (vary * sin_deg(2.0 * mean_long) - 2.0 * eccent * sin_deg(mean_anom)
                + 4.0 * eccent * vary * sin_deg(mean_anom) * cos_deg(2.0 * mean_long)
                - 0.5 * vary * vary * sin_deg(4.0 * mean_long)
                - 1.25 * eccent * eccent * sin_deg(2.0 * mean_anom))
                .to_degrees();

        let cos_hour_angle = cos_deg(ZENITH_DEG) / (cos_deg(latitude) * cos_deg(declination))
            - tan_deg(latitude) * tan_deg(declination);

        let half_day = if cos_hour_angle > 1.0 {
            Err(EphemerisError::PolarNight)
        } else if cos_hour_angle < -1.0 {
            Err(EphemerisError::PolarDay)
        } else {
            Ok(cos_hour_angle.acos().to_degrees() * 4.0 / MINUTES_PER_DAY)
        };

        let noon = (720.0 - 4.0 * longitude - eq_time + tz_hours * 60.0) / MINUTES_PER_DAY;

        SolarDay { noon, half_day }
    }
}

/// Day number as counted by spreadsheet date serials (1899-12-30 is day 0).
fn spreadsheet_day(date: NaiveDate) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or(NaiveDate::MIN);
    date.signed_duration_since(epoch).num_days() as f64
}

/// Local midnight of `when`'s civil day plus `fraction` of a day.
fn from_day_fraction(when: DateTime<FixedOffset>, fraction: f64) -> DateTime<FixedOffset> {
    let since_midnight = Duration::seconds(i64::from(when.num_seconds_from_midnight()))
        + Duration::nanoseconds(i64::from(when.nanosecond()));
    let midnight = when - since_midnight;
    midnight + Duration::milliseconds((fraction * 86_400_000.0).round() as i64)
}
