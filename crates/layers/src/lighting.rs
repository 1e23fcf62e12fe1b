//! Sun lighting and the day/night classification driven by one timestamp.
//!
//! Timestamps are epoch milliseconds. Local wall-clock decisions (day or
//! night, start of day) use the viewer's IANA time zone.

use chrono::{DateTime, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::symbology::Rgb;

pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 24 * HOUR_MS;
pub const DAY_ANIMATION_STEPS: usize = 60;

const DAY_START_HOUR: u32 = 6;
const NIGHT_START_HOUR: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeError {
    #[error("timestamp out of range: {0}")]
    OutOfRange(i64),
    #[error("no local midnight for {0}")]
    NoLocalMidnight(i64),
}

pub fn local_time(timestamp_ms: i64, tz: Tz) -> Result<DateTime<Tz>, TimeError> {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|utc| utc.with_timezone(&tz))
        .ok_or(TimeError::OutOfRange(timestamp_ms))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    Day,
    Night,
}

impl TimeOfDay {
    /// Day from 06:00 (inclusive) to 18:00 (exclusive) local time.
    pub fn from_hour(hour: u32) -> Self {
        if (DAY_START_HOUR..NIGHT_START_HOUR).contains(&hour) {
            TimeOfDay::Day
        } else {
            TimeOfDay::Night
        }
    }

    pub fn at(timestamp_ms: i64, tz: Tz) -> Result<Self, TimeError> {
        Ok(Self::from_hour(local_time(timestamp_ms, tz)?.hour()))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeOfDay::Day => "day",
            TimeOfDay::Night => "night",
        }
    }
}

/// Epoch milliseconds of local midnight on the day containing `timestamp_ms`.
pub fn start_of_day(timestamp_ms: i64, tz: Tz) -> Result<i64, TimeError> {
    let local = local_time(timestamp_ms, tz)?;
    let midnight = local.date_naive().and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .ok_or(TimeError::NoLocalMidnight(timestamp_ms))
}

/// Milliseconds elapsed since local midnight.
pub fn time_since_midnight(timestamp_ms: i64, tz: Tz) -> Result<i64, TimeError> {
    Ok(timestamp_ms - start_of_day(timestamp_ms, tz)?)
}

/// Moves `timestamp_ms` to the local day of `date_ms`, keeping its time of day.
pub fn combine_date_and_time(date_ms: i64, timestamp_ms: i64, tz: Tz) -> Result<i64, TimeError> {
    Ok(start_of_day(date_ms, tz)? + time_since_midnight(timestamp_ms, tz)?)
}

/// Sets the local time of day of `timestamp_ms` to `offset_ms` after midnight.
pub fn with_time_of_day(timestamp_ms: i64, offset_ms: i64, tz: Tz) -> Result<i64, TimeError> {
    Ok(start_of_day(timestamp_ms, tz)? + offset_ms.clamp(0, DAY_MS))
}

/// Evenly spaced timestamps sweeping the local day of `timestamp_ms`.
pub fn day_animation_frames(timestamp_ms: i64, tz: Tz, steps: usize) -> Result<Vec<i64>, TimeError> {
    let start = start_of_day(timestamp_ms, tz)?;
    let steps = steps.max(1);
    let step = DAY_MS / steps as i64;
    Ok((0..steps as i64).map(|i| start + i * step).collect())
}

/// Apparent sun position for an observer, SunCalc conventions: azimuth is
/// measured from south, positive towards west.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SunPosition {
    pub azimuth_rad: f64,
    pub altitude_rad: f64,
}

impl SunPosition {
    pub fn at(timestamp_ms: i64, lat_deg: f64, lon_deg: f64) -> Self {
        fn wrap_360(mut d: f64) -> f64 {
            d %= 360.0;
            if d < 0.0 {
                d += 360.0;
            }
            d
        }

        // Julian day from the Unix epoch.
        let jd = 2440587.5 + timestamp_ms as f64 / DAY_MS as f64;
        let n = jd - 2451545.0;

        let l = wrap_360(280.46 + 0.9856474 * n);
        let g = wrap_360(357.528 + 0.9856003 * n);
        let lambda = wrap_360(l + 1.915 * g.to_radians().sin() + 0.020 * (2.0 * g).to_radians().sin());
        let epsilon = 23.439 - 0.0000004 * n;

        let lambda_rad = lambda.to_radians();
        let eps_rad = epsilon.to_radians();
        let alpha = (eps_rad.cos() * lambda_rad.sin()).atan2(lambda_rad.cos()).to_degrees();
        let delta = (eps_rad.sin() * lambda_rad.sin()).asin();

        let t = n / 36525.0;
        let gmst = wrap_360(
            280.46061837 + 360.98564736629 * n + 0.000387933 * t * t - (t * t * t) / 38710000.0,
        );

        let hour_angle = (gmst + lon_deg - alpha).to_radians();
        let phi = lat_deg.to_radians();

        let altitude = (phi.sin() * delta.sin() + phi.cos() * delta.cos() * hour_angle.cos()).asin();
        let azimuth = hour_angle
            .sin()
            .atan2(hour_angle.cos() * phi.sin() - delta.tan() * phi.cos());

        Self {
            azimuth_rad: azimuth,
            altitude_rad: altitude,
        }
    }

    /// Unit vector towards the sun in local east/north/up.
    pub fn direction_enu(&self) -> [f64; 3] {
        let cos_alt = self.altitude_rad.cos();
        [
            -self.azimuth_rad.sin() * cos_alt,
            -self.azimuth_rad.cos() * cos_alt,
            self.altitude_rad.sin(),
        ]
    }

    pub fn is_above_horizon(&self) -> bool {
        self.altitude_rad > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    pub color: Rgb,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SunLight {
    pub timestamp: i64,
    pub color: Rgb,
    pub intensity: f32,
    #[serde(rename = "_shadow")]
    pub shadow: bool,
    pub position: SunPosition,
}

/// Lighting handed to the renderer alongside the layer stack.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightingEffect {
    pub ambient_light: AmbientLight,
    #[serde(rename = "dirLight")]
    pub sun_light: SunLight,
    pub shadow_color: [f32; 4],
}

impl LightingEffect {
    pub const AMBIENT: AmbientLight = AmbientLight {
        color: [160, 190, 255],
        intensity: 2.2,
    };
    pub const SHADOW_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.3];

    /// Lighting at `timestamp_ms` for an observer at `[lon, lat]`.
    pub fn at(timestamp_ms: i64, time_of_day: TimeOfDay, lon_lat: [f64; 2]) -> Self {
        let (color, intensity) = match time_of_day {
            TimeOfDay::Day => ([255, 215, 130], 2.8),
            TimeOfDay::Night => ([150, 150, 200], 0.5),
        };
        Self {
            ambient_light: Self::AMBIENT,
            sun_light: SunLight {
                timestamp: timestamp_ms,
                color,
                intensity,
                shadow: true,
                position: SunPosition::at(timestamp_ms, lon_lat[1], lon_lat[0]),
            },
            shadow_color: Self::SHADOW_COLOR,
        }
    }
}
