// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz
//
// End-to-end planning against an in-memory airport index and static weather.

use airhaul_core::apt_dat::{Airport, AirportType, Runway, SurfaceType};
use airhaul_core::config::PlannerConfig;
use airhaul_core::directory::{AirportDirectory, AirportIndex, NearbyAirport, SearchFilter};
use airhaul_core::geo::Coord;
use airhaul_core::ground::{FallbackRouter, GroundEstimate, GroundRouter, RouteError, RouteSource};
use airhaul_core::qualify::{SoftViolation, TripEnd};
use airhaul_core::trip::{DegradedData, Location, SegmentKind, TripPlanner, TripRequest};
use airhaul_core::weather::{StaticReports, WeatherEngine};
use airhaul_core::PlanError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// --- Fixtures ---

fn airport(code: &str, lat: f64, lon: f64, fuel: &[&str]) -> Airport {
    Airport {
        code: code.to_string(),
        name: format!("{} Field", code),
        airport_type: AirportType::Land,
        coord: Coord::new(lat, lon),
        elevation_ft: 200,
        runways: vec![Runway {
            name: "09/27".to_string(),
            length_ft: 6_000,
            width_ft: 100,
            surface: SurfaceType::Hard,
            lighted: true,
            heading: 90.0,
        }],
        fuel_types: fuel.iter().map(|f| f.to_string()).collect(),
        instrument_approach: true,
    }
}

fn regional_airports() -> Vec<Airport> {
    vec![
        airport("KHOM", 40.0, -75.0, &["JET-A"]),
        airport("KPIK", 41.0, -75.0, &["JET-A", "100LL"]),
        airport("KDEL", 42.0, -73.5, &["JET-A"]),
        airport("KNOF", 42.08, -73.56, &["100LL"]),
    ]
}

fn departure() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 19, 0, 0).unwrap()
}

fn request() -> TripRequest {
    TripRequest {
        home_base: "KHOM".to_string(),
        pickup: Location::new("Warehouse", 41.05, -75.0),
        delivery: Location::new("Hospital", 42.1, -73.55),
        departure_time: departure(),
        pickup_airport: None,
        delivery_airport: None,
        flight_rules: Default::default(),
    }
}

fn engine(reports: StaticReports) -> WeatherEngine {
    WeatherEngine::new(vec![Arc::new(reports)], std::time::Duration::from_secs(5), 30.0)
}

/// Visual conditions at every field the regional trip touches.
fn clear_reports() -> StaticReports {
    StaticReports::new()
        .with_metar("KHOM", "KHOM 181954Z 27010KT 10SM CLR")
        .with_metar("KPIK", "KPIK 181954Z 30008KT 10SM FEW050")
        .with_metar("KDEL", "KDEL 181954Z 27008KT 10SM FEW050")
}

fn regional_planner(reports: StaticReports) -> TripPlanner {
    TripPlanner::new(
        PlannerConfig::with_default_aircraft(),
        Arc::new(AirportIndex::new(regional_airports())),
    )
    .with_weather(engine(reports))
}

fn has_low_ceiling(violations: &[SoftViolation]) -> bool {
    violations
        .iter()
        .any(|v| matches!(v, SoftViolation::CeilingBelowMinimum { ceiling_ft: 400, .. }))
}

/// Road router with a live traffic feed.
struct TrafficRouter;

#[async_trait]
impl GroundRouter for TrafficRouter {
    async fn estimate(
        &self,
        _from: Coord,
        _to: Coord,
        _departure: Option<DateTime<Utc>>,
    ) -> Result<GroundEstimate, RouteError> {
        Ok(GroundEstimate {
            duration_minutes: 12.0,
            distance_miles: 8.0,
            source: RouteSource::Routed,
            polyline: None,
            traffic_aware: true,
        })
    }
}

/// Counts searches so tests can assert ordering against the pre-check.
struct CountingDirectory {
    inner: AirportIndex,
    searches: AtomicUsize,
}

impl CountingDirectory {
    fn new(airports: Vec<Airport>) -> Self {
        Self {
            inner: AirportIndex::new(airports),
            searches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AirportDirectory for CountingDirectory {
    async fn get(&self, code: &str) -> Option<Airport> {
        self.inner.get(code).await
    }

    async fn search(
        &self,
        center: Coord,
        radius_nm: f64,
        filter: &SearchFilter,
    ) -> Vec<NearbyAirport> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        self.inner.search(center, radius_nm, filter).await
    }
}

// --- Fatal paths ---

#[tokio::test]
async fn test_gusting_departure_blocks_before_any_search() {
    let directory = Arc::new(CountingDirectory::new(regional_airports()));
    let reports = StaticReports::new().with_metar("KHOM", "KHOM 181954Z 27040G55KT 10SM CLR");
    let planner = TripPlanner::new(PlannerConfig::with_default_aircraft(), directory.clone())
        .with_weather(engine(reports));

    let err = planner.plan(&request()).await.unwrap_err();
    match err {
        PlanError::BlockingWeatherViolation {
            station,
            wind_kt,
            gust_kt,
            limit_kt,
            ..
        } => {
            assert_eq!(station, "KHOM");
            assert_eq!(wind_kt, 40);
            assert_eq!(gust_kt, Some(55));
            assert_eq!(limit_kt, 35.0);
        }
        other => panic!("expected BlockingWeatherViolation, got {:?}", other),
    }
    assert_eq!(directory.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_aircraft_is_configuration_error() {
    let directory = Arc::new(CountingDirectory::new(regional_airports()));
    let planner = TripPlanner::new(PlannerConfig::default(), directory.clone());
    let err = planner.plan(&request()).await.unwrap_err();
    assert!(matches!(err, PlanError::ConfigurationMissing(_)));
    assert_eq!(directory.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_home_base() {
    let planner = TripPlanner::new(
        PlannerConfig::with_default_aircraft(),
        Arc::new(AirportIndex::new(regional_airports())),
    );
    let mut req = request();
    req.home_base = "KXYZ".to_string();
    let err = planner.plan(&req).await.unwrap_err();
    assert_eq!(err.kind(), "unknown_airport");
}

#[tokio::test]
async fn test_forced_airport_must_exist() {
    let planner = TripPlanner::new(
        PlannerConfig::with_default_aircraft(),
        Arc::new(AirportIndex::new(regional_airports())),
    );
    let mut req = request();
    req.pickup_airport = Some("KZZZ".to_string());
    match planner.plan(&req).await.unwrap_err() {
        PlanError::NoViableAirport { end, .. } => assert_eq!(end, TripEnd::Pickup),
        other => panic!("expected NoViableAirport, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_candidates_in_range() {
    let planner = TripPlanner::new(
        PlannerConfig::with_default_aircraft(),
        Arc::new(AirportIndex::new(regional_airports())),
    );
    let mut req = request();
    req.delivery = Location::new("Offshore", 30.0, -60.0);
    match planner.plan(&req).await.unwrap_err() {
        PlanError::NoViableAirport { end, .. } => assert_eq!(end, TripEnd::Delivery),
        other => panic!("expected NoViableAirport, got {:?}", other),
    }
}

// --- Complete plans ---

#[tokio::test]
async fn test_full_trip_segments_and_approval() {
    let reports = StaticReports::new()
        .with_metar("KHOM", "KHOM 181954Z 27010KT 10SM CLR")
        .with_metar("KPIK", "KPIK 181954Z 30008KT 10SM FEW050")
        .with_metar("KDEL", "KDEL 181954Z 27010KT 10SM OVC005");
    let planner = TripPlanner::new(
        PlannerConfig::with_default_aircraft(),
        Arc::new(AirportIndex::new(regional_airports())),
    )
    .with_weather(engine(reports));

    let plan = planner.plan(&request()).await.unwrap();
    assert_eq!(plan.pickup_airport, "KPIK");
    assert_eq!(plan.delivery_airport, "KDEL");

    let kinds: Vec<SegmentKind> = plan.segments.iter().map(|s| s.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            SegmentKind::Flight,
            SegmentKind::Ground,
            SegmentKind::Ground,
            SegmentKind::Flight,
            SegmentKind::Ground,
        ]
    );
    let legs: Vec<(&str, &str)> = plan
        .segments
        .iter()
        .map(|s| (s.from.as_str(), s.to.as_str()))
        .collect();
    assert_eq!(
        legs,
        vec![
            ("KHOM", "KPIK"),
            ("KPIK", "Warehouse"),
            ("Warehouse", "KPIK"),
            ("KPIK", "KDEL"),
            ("KDEL", "Hospital"),
        ]
    );

    let total: f64 = plan.segments.iter().map(|s| s.minutes).sum();
    assert!((plan.total_minutes - total).abs() < 1e-9);
    assert_eq!(
        plan.arrival_time,
        departure() + Duration::seconds((total * 60.0).round() as i64)
    );
    assert!(plan.scenario.conservative_minutes >= plan.scenario.expected_minutes);
    assert!(plan.scenario.expected_minutes >= plan.scenario.optimistic_minutes);

    // The closer delivery field has no jet fuel; the other is under minimums.
    assert!(plan.approval.required);
    let pickup = &plan.approval.ends[0];
    let delivery = &plan.approval.ends[1];
    assert_eq!(pickup.end, TripEnd::Pickup);
    assert!(!pickup.requires_approval);
    assert!(delivery.requires_approval);
    assert!(delivery
        .violations
        .iter()
        .any(|v| matches!(v, SoftViolation::CeilingBelowMinimum { ceiling_ft: 500, .. })));
    assert!(delivery.rejected.iter().any(|r| r.code == "KNOF"));

    assert!(plan
        .degraded
        .iter()
        .any(|d| matches!(d, DegradedData::SyntheticWinds { .. })));
    assert!(plan
        .degraded
        .iter()
        .all(|d| !matches!(d, DegradedData::WeatherUnavailable { .. })));
    assert!((plan.confidence - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn test_same_airport_trip_has_no_flights() {
    let airports = vec![
        airport("KHOM", 40.0, -75.0, &["JET-A"]),
        airport("KFAR", 45.0, -70.0, &["JET-A"]),
    ];
    let planner = TripPlanner::new(
        PlannerConfig::with_default_aircraft(),
        Arc::new(AirportIndex::new(airports)),
    );
    let mut req = request();
    req.pickup = Location::new("North gate", 40.05, -75.0);
    req.delivery = Location::new("South gate", 39.95, -75.02);

    let plan = planner.plan(&req).await.unwrap();
    assert_eq!(plan.pickup_airport, "KHOM");
    assert_eq!(plan.delivery_airport, "KHOM");
    assert_eq!(plan.segments.len(), 3);
    assert!(plan.segments.iter().all(|s| s.kind() == SegmentKind::Ground));
    assert!(!plan.approval.required);
    assert!(plan
        .degraded
        .contains(&DegradedData::WeatherUnavailable {
            station: "KHOM".to_string()
        }));
}

#[tokio::test]
async fn test_forced_airport_skips_qualification() {
    let reports = StaticReports::new().with_metar("KHOM", "KHOM 181954Z 27010KT 10SM CLR");
    let planner = TripPlanner::new(
        PlannerConfig::with_default_aircraft(),
        Arc::new(AirportIndex::new(regional_airports())),
    )
    .with_weather(engine(reports));
    let mut req = request();
    // No jet fuel, but a requested airport is taken as given.
    req.delivery_airport = Some("knof".to_string());

    let plan = planner.plan(&req).await.unwrap();
    assert_eq!(plan.delivery_airport, "KNOF");
    assert!(plan.approval.ends[1].forced);
    assert!(plan.approval.ends[1].rejected.is_empty());
}

#[tokio::test]
async fn test_planning_is_deterministic() {
    let reports = StaticReports::new()
        .with_metar("KHOM", "KHOM 181954Z 27010KT 10SM CLR")
        .with_metar("KDEL", "KDEL 181954Z 27010KT 10SM OVC005")
        .with_taf(
            "KPIK",
            "TAF KPIK 181730Z 1818/1918 28012G22KT P6SM BKN050 FM190200 31008KT OVC015",
        );
    let planner = TripPlanner::new(
        PlannerConfig::with_default_aircraft(),
        Arc::new(AirportIndex::new(regional_airports())),
    )
    .with_weather(engine(reports));

    let first = serde_json::to_string(&planner.plan(&request()).await.unwrap()).unwrap();
    let second = serde_json::to_string(&planner.plan(&request()).await.unwrap()).unwrap();
    assert_eq!(first, second);
}

// --- Arrival-time weather ---

#[tokio::test]
async fn test_pickup_forecast_change_before_arrival() {
    // KHOM to KPIK is 60 nm, so the pickup ETA is about 19:14.
    let lowering = clear_reports().with_taf(
        "KPIK",
        "TAF KPIK 181730Z 1818/1918 30008KT P6SM FEW050 FM181910 30008KT P6SM OVC004",
    );
    let plan = regional_planner(lowering).plan(&request()).await.unwrap();
    let pickup = &plan.approval.ends[0];
    assert_eq!(plan.pickup_airport, "KPIK");
    assert!(pickup.requires_approval);
    assert!(has_low_ceiling(&pickup.violations));

    let later = clear_reports().with_taf(
        "KPIK",
        "TAF KPIK 181730Z 1818/1918 30008KT P6SM FEW050 FM181930 30008KT P6SM OVC004",
    );
    let plan = regional_planner(later).plan(&request()).await.unwrap();
    assert_eq!(plan.pickup_airport, "KPIK");
    assert!(!plan.approval.ends[0].requires_approval);
}

#[tokio::test]
async fn test_delivery_forecast_judged_at_linehaul_arrival() {
    // The linehaul leaves KPIK after the inbound flight and the pickup round
    // trip, so KDEL is reached well after 19:35.
    let lowering = clear_reports().with_taf(
        "KDEL",
        "TAF KDEL 181730Z 1818/1918 27008KT P6SM FEW050 FM181935 27008KT P6SM OVC004",
    );
    let plan = regional_planner(lowering).plan(&request()).await.unwrap();
    let delivery = &plan.approval.ends[1];
    assert_eq!(plan.delivery_airport, "KDEL");
    assert!(delivery.requires_approval);
    assert!(has_low_ceiling(&delivery.violations));
    assert!(delivery.rejected.iter().any(|r| r.code == "KNOF"));
    assert!(!plan.approval.ends[0].requires_approval);

    let after_arrival = clear_reports().with_taf(
        "KDEL",
        "TAF KDEL 181730Z 1818/1918 27008KT P6SM FEW050 FM182100 27008KT P6SM OVC004",
    );
    let plan = regional_planner(after_arrival).plan(&request()).await.unwrap();
    assert_eq!(plan.delivery_airport, "KDEL");
    assert!(!plan.approval.required);
}

#[tokio::test]
async fn test_pickup_round_trip_legs_match() {
    let plan = regional_planner(clear_reports()).plan(&request()).await.unwrap();
    let to_pickup = &plan.segments[1];
    let from_pickup = &plan.segments[2];
    assert_eq!((to_pickup.from.as_str(), to_pickup.to.as_str()), ("KPIK", "Warehouse"));
    assert_eq!((from_pickup.from.as_str(), from_pickup.to.as_str()), ("Warehouse", "KPIK"));
    assert!((to_pickup.minutes - from_pickup.minutes).abs() < 1e-9);
}

// --- Confidence ---

#[tokio::test]
async fn test_traffic_aware_router_earns_full_confidence() {
    let planner = regional_planner(clear_reports()).with_router(FallbackRouter::new(
        Some(Arc::new(TrafficRouter)),
        std::time::Duration::from_secs(5),
    ));
    let plan = planner.plan(&request()).await.unwrap();
    assert!(plan
        .degraded
        .iter()
        .all(|d| !matches!(d, DegradedData::HeuristicGroundRoute { .. })));
    assert!((plan.confidence - 0.9).abs() < 1e-9);

    // The bundled routers never claim live traffic.
    let plan = regional_planner(clear_reports()).plan(&request()).await.unwrap();
    assert!((plan.confidence - 0.7).abs() < 1e-9);
}
