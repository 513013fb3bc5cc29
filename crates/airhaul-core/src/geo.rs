// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_NM: f64 = 3440.06;
pub const NM_PER_STATUTE_MILE: f64 = 0.868_976;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn distance_nm(&self, other: &Coord) -> f64 {
        haversine_nm(self.lat, self.lon, other.lat, other.lon)
    }

    /// Point a `fraction` of the way along the great circle towards `other`.
    pub fn intermediate(&self, other: &Coord, fraction: f64) -> Coord {
        let d = self.distance_nm(other) / EARTH_RADIUS_NM;
        if d < 1e-9 {
            return *self;
        }
        let (lat1, lon1) = (self.lat.to_radians(), self.lon.to_radians());
        let (lat2, lon2) = (other.lat.to_radians(), other.lon.to_radians());

        let a = ((1.0 - fraction) * d).sin() / d.sin();
        let b = (fraction * d).sin() / d.sin();
        let x = a * lat1.cos() * lon1.cos() + b * lat2.cos() * lon2.cos();
        let y = a * lat1.cos() * lon1.sin() + b * lat2.cos() * lon2.sin();
        let z = a * lat1.sin() + b * lat2.sin();

        Coord {
            lat: z.atan2((x * x + y * y).sqrt()).to_degrees(),
            lon: y.atan2(x).to_degrees(),
        }
    }
}

pub fn haversine_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_NM * c
}

/// Initial true course from `from` to `to`, degrees in [0, 360).
pub fn true_course(from: &Coord, to: &Coord) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lon = (to.lon - from.lon).to_radians();
    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    normalize_degrees(y.atan2(x).to_degrees())
}

pub fn normalize_degrees(degrees: f64) -> f64 {
    let d = degrees % 360.0;
    if d < 0.0 {
        d + 360.0
    } else {
        d
    }
}

/// Signed smallest rotation from `from` to `to`, in (-180, 180].
pub fn angle_difference(from: f64, to: f64) -> f64 {
    let d = normalize_degrees(to - from);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Component of the wind blowing against the aircraft. Tailwinds are negative.
pub fn headwind_component(wind_from: f64, speed_kt: f64, course: f64) -> f64 {
    speed_kt * (wind_from - course).to_radians().cos()
}

/// Absolute crosswind on a runway or course.
pub fn crosswind_component(wind_from: f64, speed_kt: f64, heading: f64) -> f64 {
    (speed_kt * (wind_from - heading).to_radians().sin()).abs()
}

/// Interpolates a direction along the shorter arc between `from` and `to`.
pub fn interpolate_direction(from: f64, to: f64, t: f64) -> f64 {
    normalize_degrees(from + angle_difference(from, to) * t)
}

pub fn path_length_nm(points: &[Coord]) -> f64 {
    points.windows(2).map(|w| w[0].distance_nm(&w[1])).sum()
}

/// Walks `distance_nm` along a polyline, clamped to its ends.
pub fn point_along_path(points: &[Coord], distance_nm: f64) -> Option<Coord> {
    let first = *points.first()?;
    if distance_nm <= 0.0 {
        return Some(first);
    }
    let mut remaining = distance_nm;
    for w in points.windows(2) {
        let leg = w[0].distance_nm(&w[1]);
        if remaining <= leg && leg > 0.0 {
            return Some(w[0].intermediate(&w[1], remaining / leg));
        }
        remaining -= leg;
    }
    points.last().copied()
}
