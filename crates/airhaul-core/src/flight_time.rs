//! Flight-phase time model: climb, cruise and descent under sampled winds.

use crate::apt_dat::Airport;
use crate::config::AircraftProfile;
use crate::geo::{self, Coord};
use crate::report::WeatherReport;
use crate::winds::{WindEstimator, WindSource, STANDARD_LEVELS_FT};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

/// Weight given to a forecast-derived arrival delay.
pub const ARRIVAL_FORECAST_WEIGHT: f64 = 0.7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub minutes: f64,
    pub distance_nm: f64,
    pub ground_speed_kt: f64,
    pub headwind_kt: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightBreakdown {
    pub course_deg: f64,
    pub route_distance_nm: f64,
    pub climb: PhaseTiming,
    pub cruise: PhaseTiming,
    pub descent: PhaseTiming,
    pub taxi_minutes: f64,
    pub departure_delay_minutes: f64,
    pub arrival_delay_minutes: f64,
    pub long_leg_factor_applied: bool,
    /// `None` when no wind was sampled.
    pub wind_source: Option<WindSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlightTimeResult {
    pub minutes: f64,
    pub weather_delay_minutes: f64,
    pub cruise_headwind_kt: f64,
    pub cruise_altitude_ft: f64,
    pub breakdown: FlightBreakdown,
}

impl FlightTimeResult {
    pub fn zero() -> Self {
        Self::default()
    }
}

/// Inputs for one flight leg.
#[derive(Debug, Clone, Copy)]
pub struct FlightLeg<'a> {
    pub distance_nm: f64,
    pub departure: &'a Airport,
    pub arrival: &'a Airport,
    pub departure_weather: Option<&'a WeatherReport>,
    pub arrival_weather: Option<&'a WeatherReport>,
    pub use_arrival_forecast: bool,
    /// Route polyline; the endpoints are used when absent.
    pub waypoints: Option<&'a [Coord]>,
    pub departure_time: Option<DateTime<Utc>>,
}

impl<'a> FlightLeg<'a> {
    /// A direct leg with no weather attached.
    pub fn direct(departure: &'a Airport, arrival: &'a Airport) -> Self {
        Self {
            distance_nm: departure.coord.distance_nm(&arrival.coord),
            departure,
            arrival,
            departure_weather: None,
            arrival_weather: None,
            use_arrival_forecast: false,
            waypoints: None,
            departure_time: None,
        }
    }
}

/// Splits `0..top_ft` at the standard levels. Each slice is sampled at its
/// midpoint and weighted by its share of the altitude change, which at a
/// constant vertical rate is its share of the phase time.
fn altitude_slices(top_ft: f64) -> Vec<(f64, f64)> {
    if top_ft <= 0.0 {
        return Vec::new();
    }
    let mut bounds = vec![0.0];
    bounds.extend(
        STANDARD_LEVELS_FT
            .iter()
            .map(|&l| f64::from(l))
            .filter(|&l| l < top_ft),
    );
    bounds.push(top_ft);
    bounds
        .windows(2)
        .map(|w| ((w[0] + w[1]) / 2.0, (w[1] - w[0]) / top_ft))
        .collect()
}

struct PhaseWind {
    headwind_kt: f64,
    synthetic: bool,
}

async fn phase_wind(
    winds: &WindEstimator,
    path: &[Coord],
    leg_nm: f64,
    start_nm: f64,
    end_nm: f64,
    slices: &[(f64, f64)],
    course: f64,
) -> PhaseWind {
    let mut headwind_kt = 0.0;
    let mut synthetic = false;
    for &(altitude_ft, weight) in slices {
        let avg = winds
            .wind_along_path(path, altitude_ft, leg_nm, start_nm, leg_nm - end_nm)
            .await;
        synthetic |= avg.source == WindSource::Synthetic;
        headwind_kt += avg.headwind_on(course) * weight;
    }
    PhaseWind {
        headwind_kt,
        synthetic,
    }
}

fn phase_timing(minutes: f64, tas_kt: f64, headwind_kt: f64, floor_kt: f64) -> PhaseTiming {
    let ground_speed_kt = (tas_kt - headwind_kt).max(floor_kt);
    PhaseTiming {
        minutes,
        distance_nm: minutes / 60.0 * ground_speed_kt,
        ground_speed_kt,
        headwind_kt,
    }
}

fn delay_minutes(report: Option<&WeatherReport>, at: Option<DateTime<Utc>>) -> f64 {
    report
        .map(|r| r.conditions_at(at).delay().total())
        .unwrap_or(0.0)
}

/// Block time for one leg. A zero-length leg (or one whose endpoints are the
/// same airport) returns zero without consulting winds or weather.
pub async fn compute_flight_time(
    leg: &FlightLeg<'_>,
    aircraft: &AircraftProfile,
    winds: &WindEstimator,
) -> FlightTimeResult {
    if leg.distance_nm <= 0.0 || leg.departure.code == leg.arrival.code {
        return FlightTimeResult::zero();
    }

    let distance_nm = leg.distance_nm;
    let cruise_altitude_ft = aircraft.altitude_bands.cruise_altitude_for(distance_nm);

    let departure_delay = delay_minutes(leg.departure_weather, None);
    let eta = leg.departure_time.map(|t| {
        t + Duration::seconds((distance_nm / aircraft.cruise_tas_kt * 3_600.0) as i64)
    });
    let arrival_delay = match leg.arrival_weather {
        Some(report) if leg.use_arrival_forecast && report.is_forecast() => {
            delay_minutes(Some(report), eta) * ARRIVAL_FORECAST_WEIGHT
        }
        other => delay_minutes(other, None),
    };
    let weather_delay_minutes = departure_delay + arrival_delay;

    let course = geo::true_course(&leg.departure.coord, &leg.arrival.coord);
    let endpoints = [leg.departure.coord, leg.arrival.coord];
    let path = match leg.waypoints {
        Some(points) if points.len() >= 2 => points,
        _ => &endpoints[..],
    };

    let climb_minutes = cruise_altitude_ft / aircraft.climb_rate_fpm;
    let descent_minutes = cruise_altitude_ft / aircraft.descent_rate_fpm;
    // Still-air phase lengths bound where each phase's winds are sampled.
    let climb_span = (climb_minutes / 60.0 * aircraft.climb_tas_kt).min(distance_nm);
    let descent_span = (descent_minutes / 60.0 * aircraft.descent_tas_kt).min(distance_nm);

    let slices = altitude_slices(cruise_altitude_ft);
    let cruise_slice = [(cruise_altitude_ft, 1.0)];
    let (climb_wind, cruise_wind, descent_wind) = tokio::join!(
        phase_wind(winds, path, distance_nm, 0.0, climb_span, &slices, course),
        phase_wind(
            winds,
            path,
            distance_nm,
            climb_span.min(distance_nm - descent_span).max(0.0),
            (distance_nm - descent_span).max(climb_span.min(distance_nm)),
            &cruise_slice,
            course,
        ),
        phase_wind(
            winds,
            path,
            distance_nm,
            distance_nm - descent_span,
            distance_nm,
            &slices,
            course,
        ),
    );

    let floor = aircraft.min_ground_speed_kt;
    let climb = phase_timing(climb_minutes, aircraft.climb_tas_kt, climb_wind.headwind_kt, floor);
    let descent = phase_timing(
        descent_minutes,
        aircraft.descent_tas_kt,
        descent_wind.headwind_kt,
        floor,
    );

    let route_distance_nm = distance_nm * aircraft.route_overage_factor;
    let cruise_distance = (route_distance_nm - climb.distance_nm - descent.distance_nm).max(0.0);
    let cruise_gs = (aircraft.cruise_tas_kt - cruise_wind.headwind_kt).max(floor);
    let cruise = PhaseTiming {
        minutes: cruise_distance / cruise_gs * 60.0,
        distance_nm: cruise_distance,
        ground_speed_kt: cruise_gs,
        headwind_kt: cruise_wind.headwind_kt,
    };

    let taxi_minutes = aircraft.taxi_minutes * 2.0;
    let mut minutes =
        climb.minutes + cruise.minutes + descent.minutes + weather_delay_minutes + taxi_minutes;

    let long_leg_factor_applied =
        route_distance_nm > aircraft.long_leg_threshold_nm && cruise_wind.headwind_kt > 0.0;
    if long_leg_factor_applied {
        minutes *= aircraft.long_leg_headwind_factor;
    }

    let synthetic = climb_wind.synthetic || cruise_wind.synthetic || descent_wind.synthetic;
    let wind_source = if synthetic {
        WindSource::Synthetic
    } else {
        WindSource::Bulletin
    };

    debug!(
        "Flight leg — from={} to={} distance_nm={:.1} altitude_ft={:.0} headwind_kt={:.1} minutes={:.1}",
        leg.departure.code,
        leg.arrival.code,
        distance_nm,
        cruise_altitude_ft,
        cruise_wind.headwind_kt,
        minutes
    );

    FlightTimeResult {
        minutes,
        weather_delay_minutes,
        cruise_headwind_kt: cruise_wind.headwind_kt,
        cruise_altitude_ft,
        breakdown: FlightBreakdown {
            course_deg: course,
            route_distance_nm,
            climb,
            cruise,
            descent,
            taxi_minutes,
            departure_delay_minutes: departure_delay,
            arrival_delay_minutes: arrival_delay,
            long_leg_factor_applied,
            wind_source: Some(wind_source),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apt_dat::AirportType;
    use crate::report::{parse_metar, parse_taf};
    use crate::winds::StaticBulletin;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn airport(code: &str, lat: f64, lon: f64) -> Airport {
        Airport {
            code: code.to_string(),
            name: code.to_string(),
            airport_type: AirportType::Land,
            coord: Coord::new(lat, lon),
            elevation_ft: 0,
            runways: Vec::new(),
            fuel_types: Vec::new(),
            instrument_approach: false,
        }
    }

    fn calm_winds() -> WindEstimator {
        let text = "\
FT  3000    6000    9000   12000   18000   24000  30000  34000  39000
BOS 9900 9900+05 9900+01 9900-04 9900-16 9900-28 990042 990049 990056
JFK 9900 9900+08 9900+04 9900-01 9900-13 9900-25 990041 990049 990057
DCA 9900 9900+08 9900+04 9900-01 9900-13 9900-25 990041 990049 990057
";
        WindEstimator::new(
            Some(Arc::new(StaticBulletin(text.to_string()))),
            std::time::Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_zero_distance_is_zero() {
        let kbos = airport("KBOS", 42.36, -71.01);
        let storm = parse_metar("KBOS 181954Z 31040G55KT 1/4SM +TSRA OVC002").unwrap();
        let leg = FlightLeg {
            distance_nm: 0.0,
            departure: &kbos,
            arrival: &kbos,
            departure_weather: Some(&storm),
            arrival_weather: Some(&storm),
            use_arrival_forecast: false,
            waypoints: None,
            departure_time: None,
        };
        let result =
            compute_flight_time(&leg, &AircraftProfile::default(), &WindEstimator::synthetic())
                .await;
        assert_eq!(result.minutes, 0.0);
        assert_eq!(result.weather_delay_minutes, 0.0);
        assert_eq!(result.breakdown.wind_source, None);
    }

    #[tokio::test]
    async fn test_still_air_matches_phase_arithmetic() {
        let kbos = airport("KBOS", 42.36, -71.01);
        let kdca = airport("KDCA", 38.85, -77.04);
        let aircraft = AircraftProfile::default();
        let leg = FlightLeg::direct(&kbos, &kdca);
        let result = compute_flight_time(&leg, &aircraft, &calm_winds()).await;

        let d = leg.distance_nm;
        assert!(d > 150.0 && d < 400.0);
        assert_eq!(result.cruise_altitude_ft, 17_000.0);
        assert_eq!(result.breakdown.wind_source, Some(WindSource::Bulletin));
        assert!(result.cruise_headwind_kt.abs() < 1e-9);

        let climb_min = 17_000.0 / aircraft.climb_rate_fpm;
        let descent_min = 17_000.0 / aircraft.descent_rate_fpm;
        let climb_nm = climb_min / 60.0 * aircraft.climb_tas_kt;
        let descent_nm = descent_min / 60.0 * aircraft.descent_tas_kt;
        let cruise_nm = d * aircraft.route_overage_factor - climb_nm - descent_nm;
        let expected = climb_min
            + descent_min
            + cruise_nm / aircraft.cruise_tas_kt * 60.0
            + 2.0 * aircraft.taxi_minutes;
        assert!((result.minutes - expected).abs() < 1e-6, "{} vs {}", result.minutes, expected);
    }

    #[tokio::test]
    async fn test_long_leg_factor_only_into_headwind() {
        let aircraft = AircraftProfile::default();
        let east = airport("KEAST", 40.0, -80.0);
        let west = airport("KWEST", 40.0, -94.0);
        let winds = WindEstimator::synthetic();

        let westbound = compute_flight_time(&FlightLeg::direct(&east, &west), &aircraft, &winds).await;
        let eastbound = compute_flight_time(&FlightLeg::direct(&west, &east), &aircraft, &winds).await;

        assert!(westbound.breakdown.route_distance_nm > aircraft.long_leg_threshold_nm);
        assert!(westbound.cruise_headwind_kt > 0.0);
        assert!(westbound.breakdown.long_leg_factor_applied);
        assert!(eastbound.cruise_headwind_kt < 0.0);
        assert!(!eastbound.breakdown.long_leg_factor_applied);
        assert!(westbound.minutes > eastbound.minutes);
        assert_eq!(westbound.breakdown.wind_source, Some(WindSource::Synthetic));
    }

    #[tokio::test]
    async fn test_long_leg_threshold_uses_routed_distance() {
        let aircraft = AircraftProfile::default();
        let east = airport("KEAST", 40.0, -80.0);
        let west = airport("KWEST", 40.0, -90.6);
        let leg = FlightLeg {
            distance_nm: 490.0,
            ..FlightLeg::direct(&east, &west)
        };
        let result = compute_flight_time(&leg, &aircraft, &WindEstimator::synthetic()).await;

        // 490 nm direct is under the threshold; 514.5 nm routed is over it.
        assert!(leg.distance_nm < aircraft.long_leg_threshold_nm);
        assert!((result.breakdown.route_distance_nm - 514.5).abs() < 1e-9);
        assert!(result.cruise_headwind_kt > 0.0);
        assert!(result.breakdown.long_leg_factor_applied);
    }

    #[tokio::test]
    async fn test_ground_speed_floor() {
        let mut aircraft = AircraftProfile::default();
        aircraft.cruise_tas_kt = 40.0;
        aircraft.climb_tas_kt = 30.0;
        aircraft.descent_tas_kt = 30.0;
        let east = airport("KEAST", 40.0, -80.0);
        let west = airport("KWEST", 40.0, -82.0);
        let result = compute_flight_time(
            &FlightLeg::direct(&east, &west),
            &aircraft,
            &WindEstimator::synthetic(),
        )
        .await;
        assert_eq!(result.breakdown.cruise.ground_speed_kt, aircraft.min_ground_speed_kt);
        assert_eq!(result.breakdown.climb.ground_speed_kt, aircraft.min_ground_speed_kt);
        assert!(result.minutes.is_finite());
    }

    #[tokio::test]
    async fn test_weather_delay_weights_forecast() {
        let kbos = airport("KBOS", 42.36, -71.01);
        let kjfk = airport("KJFK", 40.64, -73.78);
        let departure = parse_metar("KBOS 181954Z 28008KT 2SM BR OVC009").unwrap();
        let forecast = parse_taf("TAF KJFK 181730Z 1818/1918 20008KT 4SM -RA BKN020").unwrap();
        let leg = FlightLeg {
            departure_weather: Some(&departure),
            arrival_weather: Some(&forecast),
            use_arrival_forecast: true,
            departure_time: Some(Utc.with_ymd_and_hms(2026, 10, 18, 20, 0, 0).unwrap()),
            ..FlightLeg::direct(&kbos, &kjfk)
        };
        let result = compute_flight_time(&leg, &AircraftProfile::default(), &calm_winds()).await;
        // IFR departure 15; MVFR + rain arrival (5 + 5) weighted 0.7.
        assert!((result.breakdown.departure_delay_minutes - 15.0).abs() < 1e-9);
        assert!((result.breakdown.arrival_delay_minutes - 7.0).abs() < 1e-9);
        assert!((result.weather_delay_minutes - 22.0).abs() < 1e-9);

        let current_arrival = parse_metar("KJFK 181951Z 20008KT 4SM -RA BKN020").unwrap();
        let leg = FlightLeg {
            arrival_weather: Some(&current_arrival),
            ..leg
        };
        let result = compute_flight_time(&leg, &AircraftProfile::default(), &calm_winds()).await;
        assert!((result.breakdown.arrival_delay_minutes - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_altitude_slices_cover_climb() {
        let slices = altitude_slices(17_000.0);
        let total: f64 = slices.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(slices.len(), 5);
        assert!(altitude_slices(0.0).is_empty());
    }
}
