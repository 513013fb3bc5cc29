//! Winds aloft: FD bulletin decoding, altitude interpolation and path
//! averaging, with a deterministic synthetic fallback.

use crate::geo::{self, Coord};
use crate::report::WindDirection;
use crate::weather::SourceError;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

/// Forecast levels published in FD bulletins, feet MSL.
pub const STANDARD_LEVELS_FT: [u32; 9] = [
    3_000, 6_000, 9_000, 12_000, 18_000, 24_000, 30_000, 34_000, 39_000,
];

/// Beyond this distance a reference station does not represent the point.
pub const MAX_STATION_DISTANCE_NM: f64 = 300.0;

const SYNTHETIC_DIRECTION: f64 = 270.0;
const SAMPLE_SPACING_NM: f64 = 100.0;

/// FD reporting points with their positions.
const REFERENCE_STATIONS: &[(&str, f64, f64)] = &[
    ("ABQ", 35.04, -106.61),
    ("ALB", 42.75, -73.80),
    ("ATL", 33.64, -84.43),
    ("BIL", 45.81, -108.54),
    ("BOI", 43.56, -116.22),
    ("BOS", 42.36, -71.01),
    ("BUF", 42.94, -78.73),
    ("CLE", 41.41, -81.85),
    ("CVG", 39.05, -84.67),
    ("DCA", 38.85, -77.04),
    ("DEN", 39.86, -104.67),
    ("DFW", 32.90, -97.04),
    ("FSD", 43.58, -96.74),
    ("HOU", 29.65, -95.28),
    ("JAX", 30.49, -81.69),
    ("JFK", 40.64, -73.78),
    ("LAS", 36.08, -115.15),
    ("LAX", 33.94, -118.41),
    ("MEM", 35.04, -89.98),
    ("MIA", 25.79, -80.29),
    ("MKC", 39.12, -94.59),
    ("MSP", 44.88, -93.22),
    ("OMA", 41.30, -95.89),
    ("PDX", 45.59, -122.60),
    ("PHX", 33.43, -112.01),
    ("PIT", 40.49, -80.23),
    ("RDU", 35.88, -78.79),
    ("SAT", 29.53, -98.47),
    ("SEA", 47.45, -122.31),
    ("SFO", 37.62, -122.37),
    ("SLC", 40.79, -111.98),
    ("STL", 38.75, -90.37),
    ("TPA", 27.98, -82.53),
];

pub fn reference_station(ident: &str) -> Option<Coord> {
    REFERENCE_STATIONS
        .iter()
        .find(|(id, _, _)| id.eq_ignore_ascii_case(ident))
        .map(|&(_, lat, lon)| Coord::new(lat, lon))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindSource {
    Bulletin,
    Synthetic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelWind {
    pub direction: WindDirection,
    pub speed_kt: f64,
}

impl LevelWind {
    fn light_and_variable() -> Self {
        Self {
            direction: WindDirection::Variable,
            speed_kt: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindSample {
    pub altitude_ft: f64,
    pub direction: WindDirection,
    pub speed_kt: f64,
    pub source: WindSource,
    pub station: Option<String>,
}

/// Vector-averaged wind along a path at one altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragedWind {
    pub direction_deg: f64,
    pub speed_kt: f64,
    pub source: WindSource,
}

impl AveragedWind {
    pub fn calm(source: WindSource) -> Self {
        Self {
            direction_deg: 0.0,
            speed_kt: 0.0,
            source,
        }
    }

    /// Positive for a headwind on `course`, negative for a tailwind.
    pub fn headwind_on(&self, course: f64) -> f64 {
        geo::headwind_component(self.direction_deg, self.speed_kt, course)
    }
}

/// Decodes one `DDss`, `DDss+TT` or `DDssTT` group.
///
/// Directions 51-86 encode speeds of 100 kt and over (direction + 50,
/// speed - 100); `9900` is light and variable.
pub fn decode_fd_group(token: &str) -> Option<LevelWind> {
    if token.len() < 4 || !token.is_char_boundary(4) {
        return None;
    }
    let (wind, temp) = token.split_at(4);
    if !wind.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let temp_ok = temp.is_empty()
        || (temp.len() == 2 && temp.chars().all(|c| c.is_ascii_digit()))
        || (temp.len() == 3
            && matches!(temp.as_bytes()[0], b'+' | b'-')
            && temp[1..].chars().all(|c| c.is_ascii_digit()));
    if !temp_ok {
        return None;
    }

    let dd: u32 = wind[..2].parse().ok()?;
    let ss: u32 = wind[2..].parse().ok()?;
    if dd == 99 && ss == 0 {
        return Some(LevelWind::light_and_variable());
    }
    let (direction, speed) = if (51..=86).contains(&dd) {
        ((dd - 50) * 10, ss + 100)
    } else {
        (dd * 10, ss)
    };
    if direction > 360 {
        return None;
    }
    Some(LevelWind {
        direction: WindDirection::Degrees((direction % 360) as u16),
        speed_kt: f64::from(speed),
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindsAloftBulletin {
    stations: BTreeMap<String, BTreeMap<u32, LevelWind>>,
}

fn token_spans(line: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        match (c.is_whitespace(), start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                spans.push((i, &line[s..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((line.len(), &line[s..]));
    }
    spans
}

impl WindsAloftBulletin {
    /// Parses FD text. Values are matched to the `FT` header column whose right
    /// edge is closest, so blank low levels at high-terrain stations line up.
    pub fn parse(text: &str) -> Option<Self> {
        let mut columns: Vec<(usize, u32)> = Vec::new();
        let mut stations = BTreeMap::new();

        for line in text.lines() {
            let spans = token_spans(line);
            let Some(&(_, first)) = spans.first() else {
                continue;
            };
            if first == "FT" {
                columns = spans[1..]
                    .iter()
                    .filter_map(|&(end, tok)| tok.parse::<u32>().ok().map(|lvl| (end, lvl)))
                    .collect();
                continue;
            }
            if columns.is_empty()
                || first.len() != 3
                || !first.chars().all(|c| c.is_ascii_alphanumeric())
            {
                continue;
            }

            let mut levels = BTreeMap::new();
            for &(end, token) in &spans[1..] {
                let Some(&(_, level)) = columns.iter().min_by_key(|(col, _)| col.abs_diff(end))
                else {
                    continue;
                };
                if let Some(wind) = decode_fd_group(token) {
                    levels.insert(level, wind);
                }
            }
            if !levels.is_empty() {
                stations.insert(first.to_uppercase(), levels);
            }
        }

        if stations.is_empty() {
            None
        } else {
            Some(Self { stations })
        }
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn levels(&self, station: &str) -> Option<&BTreeMap<u32, LevelWind>> {
        self.stations.get(station)
    }

    /// Nearest reporting station with a known position, within range.
    pub fn nearest_station(&self, point: Coord) -> Option<(&str, f64)> {
        self.stations
            .keys()
            .filter_map(|id| {
                let coord = reference_station(id)?;
                Some((id.as_str(), point.distance_nm(&coord)))
            })
            .filter(|(_, d)| *d <= MAX_STATION_DISTANCE_NM)
            .min_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)))
    }

    /// Wind at `altitude_ft` for a station, interpolated between the two
    /// bracketing levels. Clamped to the lowest/highest reported level.
    pub fn wind_at(&self, station: &str, altitude_ft: f64) -> Option<LevelWind> {
        let levels = self.stations.get(station)?;
        let below = levels
            .range(..=altitude_ft.max(0.0) as u32)
            .next_back()
            .map(|(l, w)| (*l, *w));
        let above = levels
            .range(altitude_ft.max(0.0).ceil() as u32..)
            .next()
            .map(|(l, w)| (*l, *w));

        match (below, above) {
            (Some((lo, w_lo)), Some((hi, w_hi))) if hi > lo => {
                let t = (altitude_ft - f64::from(lo)) / f64::from(hi - lo);
                Some(interpolate_level(w_lo, w_hi, t))
            }
            (Some((_, w)), _) | (None, Some((_, w))) => Some(w),
            (None, None) => None,
        }
    }
}

fn interpolate_level(lo: LevelWind, hi: LevelWind, t: f64) -> LevelWind {
    let speed_kt = lo.speed_kt + (hi.speed_kt - lo.speed_kt) * t;
    let direction = match (lo.direction, hi.direction) {
        (WindDirection::Degrees(a), WindDirection::Degrees(b)) => {
            let d = geo::interpolate_direction(f64::from(a), f64::from(b), t);
            WindDirection::Degrees((d.round() as u16) % 360)
        }
        (WindDirection::Degrees(a), WindDirection::Variable)
        | (WindDirection::Variable, WindDirection::Degrees(a)) => WindDirection::Degrees(a),
        (WindDirection::Variable, WindDirection::Variable) => WindDirection::Variable,
    };
    LevelWind {
        direction,
        speed_kt,
    }
}

/// Prevailing westerly that strengthens with altitude and latitude.
pub fn synthetic_wind(latitude: f64, altitude_ft: f64) -> LevelWind {
    let altitude_fraction = (altitude_ft / 39_000.0).clamp(0.0, 1.0);
    let latitude_factor = (0.4 + latitude.abs() / 50.0).clamp(0.4, 1.4);
    LevelWind {
        direction: WindDirection::Degrees(SYNTHETIC_DIRECTION as u16),
        speed_kt: (10.0 + 60.0 * altitude_fraction) * latitude_factor,
    }
}

#[async_trait]
pub trait WindsAloftSource: Send + Sync {
    async fn bulletin(&self) -> Result<String, SourceError>;
}

/// FD winds/temperatures product from aviationweather.gov.
pub struct AviationWeatherWinds {
    http: reqwest::Client,
    url: String,
}

impl AviationWeatherWinds {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            url: format!(
                "{}/windtemp?region=all&level=low&fcst=06",
                base_url.trim_end_matches('/')
            ),
        }
    }
}

#[async_trait]
impl WindsAloftSource for AviationWeatherWinds {
    async fn bulletin(&self) -> Result<String, SourceError> {
        let response = self.http.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// A fixed bulletin text.
pub struct StaticBulletin(pub String);

#[async_trait]
impl WindsAloftSource for StaticBulletin {
    async fn bulletin(&self) -> Result<String, SourceError> {
        Ok(self.0.clone())
    }
}

/// Wind lookups for one planning request. The bulletin is fetched at most once.
pub struct WindEstimator {
    source: Option<Arc<dyn WindsAloftSource>>,
    timeout: Duration,
    bulletin: OnceCell<Option<WindsAloftBulletin>>,
}

impl WindEstimator {
    pub fn new(source: Option<Arc<dyn WindsAloftSource>>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            bulletin: OnceCell::new(),
        }
    }

    /// Always answers with the synthetic profile.
    pub fn synthetic() -> Self {
        Self::new(None, Duration::from_secs(1))
    }

    async fn bulletin(&self) -> Option<&WindsAloftBulletin> {
        self.bulletin
            .get_or_init(|| async {
                let source = self.source.as_ref()?;
                let text = match tokio::time::timeout(self.timeout, source.bulletin()).await {
                    Ok(Ok(text)) => text,
                    Ok(Err(e)) => {
                        warn!("Winds aloft fetch failed; using synthetic winds — error={}", e);
                        return None;
                    }
                    Err(_) => {
                        warn!(
                            "Winds aloft fetch timed out; using synthetic winds — timeout={:?}",
                            self.timeout
                        );
                        return None;
                    }
                };
                let parsed = WindsAloftBulletin::parse(&text);
                match &parsed {
                    Some(b) => info!("Loaded winds aloft — stations={}", b.station_count()),
                    None => warn!("Winds aloft bulletin had no usable stations"),
                }
                parsed
            })
            .await
            .as_ref()
    }

    pub async fn wind_at(&self, point: Coord, altitude_ft: f64) -> WindSample {
        if let Some(bulletin) = self.bulletin().await {
            if let Some((station, _)) = bulletin.nearest_station(point) {
                if let Some(wind) = bulletin.wind_at(station, altitude_ft) {
                    return WindSample {
                        altitude_ft,
                        direction: wind.direction,
                        speed_kt: wind.speed_kt,
                        source: WindSource::Bulletin,
                        station: Some(station.to_string()),
                    };
                }
            }
        }
        let wind = synthetic_wind(point.lat, altitude_ft);
        WindSample {
            altitude_ft,
            direction: wind.direction,
            speed_kt: wind.speed_kt,
            source: WindSource::Synthetic,
            station: None,
        }
    }

    /// Averages the wind at `altitude_ft` over the part of `path` between the
    /// climb and descent buffers. Variable-direction samples add no vector.
    pub async fn wind_along_path(
        &self,
        path: &[Coord],
        altitude_ft: f64,
        leg_nm: f64,
        climb_buffer_nm: f64,
        descent_buffer_nm: f64,
    ) -> AveragedWind {
        let path_nm = geo::path_length_nm(path);
        if path.len() < 2 || path_nm <= 0.0 || leg_nm <= 0.0 {
            return AveragedWind::calm(WindSource::Synthetic);
        }

        let start = climb_buffer_nm.clamp(0.0, leg_nm);
        let end = (leg_nm - descent_buffer_nm).clamp(start, leg_nm);
        let distances: Vec<f64> = if end - start <= f64::EPSILON {
            vec![(start + end) / 2.0]
        } else {
            let count = ((end - start) / SAMPLE_SPACING_NM).ceil().max(2.0) as usize;
            (0..=count)
                .map(|i| start + (end - start) * i as f64 / count as f64)
                .collect()
        };

        let (mut u, mut v) = (0.0, 0.0);
        let mut source = WindSource::Bulletin;
        let mut counted = 0usize;
        for d in &distances {
            let Some(point) = geo::point_along_path(path, d / leg_nm * path_nm) else {
                continue;
            };
            let sample = self.wind_at(point, altitude_ft).await;
            if sample.source == WindSource::Synthetic {
                source = WindSource::Synthetic;
            }
            counted += 1;
            if let WindDirection::Degrees(deg) = sample.direction {
                let rad = f64::from(deg).to_radians();
                u += sample.speed_kt * rad.sin();
                v += sample.speed_kt * rad.cos();
            }
        }
        if counted == 0 {
            return AveragedWind::calm(WindSource::Synthetic);
        }

        let (u, v) = (u / counted as f64, v / counted as f64);
        let speed_kt = (u * u + v * v).sqrt();
        let direction_deg = if speed_kt < 1e-9 {
            0.0
        } else {
            geo::normalize_degrees(u.atan2(v).to_degrees())
        };
        debug!(
            "Path wind — altitude_ft={:.0} samples={} direction={:.0} speed_kt={:.1} source={:?}",
            altitude_ft, counted, direction_deg, speed_kt, source
        );
        AveragedWind {
            direction_deg,
            speed_kt,
            source,
        }
    }
}
