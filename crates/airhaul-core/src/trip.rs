//! Trip assembly: airport selection at both ends, flight and ground legs,
//! scenario bounds, confidence and approval.

use crate::apt_dat::Airport;
use crate::config::{AircraftProfile, FlightRules, PlannerConfig};
use crate::directory::AirportDirectory;
use crate::error::PlanError;
use crate::flight_time::{compute_flight_time, FlightLeg, FlightTimeResult};
use crate::geo::Coord;
use crate::ground::{FallbackRouter, GroundEstimate, RouteSource};
use crate::qualify::{
    check_departure, shortlist_end, AirportSelection, ArrivalEstimate, EndRequest,
    QualificationContext, RejectedCandidate, SoftViolation, TripEnd,
};
use crate::report::WeatherReport;
use crate::scenario::{
    compute_bounds, review_bounds, segment_summary, NoopAdvisor, ScenarioAdvisor, ScenarioResult,
};
use crate::weather::WeatherEngine;
use crate::winds::{WindEstimator, WindSource, WindsAloftSource};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub label: String,
    pub coord: Coord,
}

impl Location {
    pub fn new(label: &str, lat: f64, lon: f64) -> Self {
        Self {
            label: label.to_string(),
            coord: Coord::new(lat, lon),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRequest {
    /// Airport code the aircraft starts from.
    pub home_base: String,
    pub pickup: Location,
    pub delivery: Location,
    pub departure_time: DateTime<Utc>,
    #[serde(default)]
    pub pickup_airport: Option<String>,
    #[serde(default)]
    pub delivery_airport: Option<String>,
    #[serde(default)]
    pub flight_rules: FlightRules,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKind {
    Ground,
    Flight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SegmentDetail {
    Ground {
        distance_miles: f64,
        route_quality: RouteSource,
        polyline: Option<String>,
        traffic_aware: bool,
    },
    Flight {
        distance_nm: f64,
        cruise_altitude_ft: f64,
        cruise_headwind_kt: f64,
        weather_delay_minutes: f64,
        wind_source: Option<WindSource>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSegment {
    pub from: String,
    pub to: String,
    pub minutes: f64,
    #[serde(flatten)]
    pub detail: SegmentDetail,
}

impl TripSegment {
    pub fn kind(&self) -> SegmentKind {
        match self.detail {
            SegmentDetail::Ground { .. } => SegmentKind::Ground,
            SegmentDetail::Flight { .. } => SegmentKind::Flight,
        }
    }

    fn ground(from: &str, to: &str, estimate: GroundEstimate) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            minutes: estimate.duration_minutes,
            detail: SegmentDetail::Ground {
                distance_miles: estimate.distance_miles,
                route_quality: estimate.source,
                polyline: estimate.polyline,
                traffic_aware: estimate.traffic_aware,
            },
        }
    }

    fn flight(from: &Airport, to: &Airport, distance_nm: f64, result: FlightTimeResult) -> Self {
        Self {
            from: from.code.clone(),
            to: to.code.clone(),
            minutes: result.minutes,
            detail: SegmentDetail::Flight {
                distance_nm,
                cruise_altitude_ft: result.cruise_altitude_ft,
                cruise_headwind_kt: result.cruise_headwind_kt,
                weather_delay_minutes: result.weather_delay_minutes,
                wind_source: result.breakdown.wind_source,
            },
        }
    }
}

/// Data that was missing or substituted while planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DegradedData {
    WeatherUnavailable { station: String },
    SyntheticWinds { from: String, to: String },
    HeuristicGroundRoute { from: String, to: String },
    AdvisoryUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndApproval {
    pub end: TripEnd,
    pub airport: String,
    pub forced: bool,
    pub requires_approval: bool,
    pub violations: Vec<SoftViolation>,
    pub rejected: Vec<RejectedCandidate>,
}

impl EndApproval {
    fn from_selection(selection: &AirportSelection) -> Self {
        Self {
            end: selection.end,
            airport: selection.airport.code.clone(),
            forced: selection.forced,
            requires_approval: selection.requires_approval,
            violations: selection.violations.clone(),
            rejected: selection.rejected.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub required: bool,
    pub ends: Vec<EndApproval>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPlan {
    pub home_base: String,
    pub pickup_airport: String,
    pub delivery_airport: String,
    pub segments: Vec<TripSegment>,
    pub total_minutes: f64,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub scenario: ScenarioResult,
    pub confidence: f64,
    pub approval: Approval,
    pub degraded: Vec<DegradedData>,
}

fn minutes_to_duration(minutes: f64) -> Duration {
    Duration::seconds((minutes * 60.0).round() as i64)
}

/// Plans trips against a fixed set of collaborators.
#[derive(Clone)]
pub struct TripPlanner {
    config: Arc<PlannerConfig>,
    directory: Arc<dyn AirportDirectory>,
    weather: WeatherEngine,
    router: FallbackRouter,
    winds: Option<Arc<dyn WindsAloftSource>>,
    advisor: Arc<dyn ScenarioAdvisor>,
}

impl TripPlanner {
    /// A planner with no live weather, synthetic winds, heuristic ground
    /// routing and the no-op advisory.
    pub fn new(config: PlannerConfig, directory: Arc<dyn AirportDirectory>) -> Self {
        Self {
            config: Arc::new(config),
            directory,
            weather: WeatherEngine::offline(),
            router: FallbackRouter::heuristic_only(),
            winds: None,
            advisor: Arc::new(NoopAdvisor),
        }
    }

    pub fn with_weather(mut self, weather: WeatherEngine) -> Self {
        self.weather = weather;
        self
    }

    pub fn with_router(mut self, router: FallbackRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_winds(mut self, source: Arc<dyn WindsAloftSource>) -> Self {
        self.winds = Some(source);
        self
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn ScenarioAdvisor>) -> Self {
        self.advisor = advisor;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plans one trip. Either returns a complete plan or a fatal error.
    pub async fn plan(&self, request: &TripRequest) -> Result<TripPlan, PlanError> {
        let config = self.config.as_ref();
        config.validate()?;
        let aircraft = config.aircraft()?;
        let mut degraded = Vec::new();

        let home = self
            .directory
            .get(&request.home_base)
            .await
            .ok_or_else(|| PlanError::UnknownAirport(request.home_base.to_uppercase()))?;
        info!(
            "Planning trip — home={} pickup={} delivery={}",
            home.code, request.pickup.label, request.delivery.label
        );

        // Departure pre-check gates every airport search.
        let home_weather = self.weather.fetch(&home).await;
        if home_weather.is_none() {
            degraded.push(DegradedData::WeatherUnavailable {
                station: home.code.clone(),
            });
        }
        check_departure(&home, home_weather.as_ref(), &config.departure_limits)?;

        let ctx = QualificationContext {
            config,
            directory: self.directory.as_ref(),
            weather: &self.weather,
            router: &self.router,
        };
        let pickup_request = EndRequest {
            end: TripEnd::Pickup,
            point: request.pickup.coord,
            forced_code: request.pickup_airport.clone(),
            reference_time: request.departure_time,
            flight_rules: request.flight_rules,
        };
        let delivery_request = EndRequest {
            end: TripEnd::Delivery,
            point: request.delivery.coord,
            forced_code: request.delivery_airport.clone(),
            reference_time: request.departure_time,
            flight_rules: request.flight_rules,
        };
        let (pickup, delivery) = tokio::join!(
            shortlist_end(ctx, &pickup_request),
            shortlist_end(ctx, &delivery_request),
        );
        let (pickup, delivery) = (pickup?, delivery?);

        let pickup = pickup.select(
            config,
            ArrivalEstimate::new(home.coord, request.departure_time),
        )?;

        // Forced airports skip qualification and arrive without weather.
        let departure = Some(request.departure_time);
        let (pickup_current, pickup_forecast, to_pickup) = tokio::join!(
            self.current_at(&pickup.airport, &home, &home_weather),
            self.forecast_for(&pickup),
            self.airport_to_point(&pickup, request.pickup.coord, departure),
        );

        let winds = WindEstimator::new(self.winds.clone(), config.fetch_timeout());
        let inbound_nm = home.coord.distance_nm(&pickup.airport.coord);
        let inbound_leg = FlightLeg {
            distance_nm: inbound_nm,
            departure: &home,
            arrival: &pickup.airport,
            departure_weather: home_weather.as_ref(),
            arrival_weather: pickup_forecast.as_ref(),
            use_arrival_forecast: true,
            waypoints: None,
            departure_time: Some(request.departure_time),
        };
        let inbound = self.flight(&inbound_leg, aircraft, &winds).await;

        // The linehaul leaves after the inbound flight and the pickup round trip.
        let inbound_minutes = inbound.as_ref().map(|r| r.minutes).unwrap_or(0.0);
        let linehaul_departure = request.departure_time
            + minutes_to_duration(inbound_minutes + to_pickup.duration_minutes * 2.0);
        debug!(
            "Linehaul departure estimated — airport={} at={}",
            pickup.airport.code, linehaul_departure
        );

        let delivery = delivery.select(
            config,
            ArrivalEstimate::new(pickup.airport.coord, linehaul_departure),
        )?;
        let delivery_forecast = self.forecast_for(&delivery).await;
        for (airport, report) in [
            (&pickup.airport, &pickup_forecast),
            (&delivery.airport, &delivery_forecast),
        ] {
            let note = DegradedData::WeatherUnavailable {
                station: airport.code.clone(),
            };
            if report.is_none() && !degraded.contains(&note) {
                degraded.push(note);
            }
        }

        let linehaul_nm = pickup.airport.coord.distance_nm(&delivery.airport.coord);
        let linehaul_leg = FlightLeg {
            distance_nm: linehaul_nm,
            departure: &pickup.airport,
            arrival: &delivery.airport,
            departure_weather: pickup_current.as_ref(),
            arrival_weather: delivery_forecast.as_ref(),
            use_arrival_forecast: true,
            waypoints: None,
            departure_time: Some(linehaul_departure),
        };
        let (linehaul, from_pickup, to_delivery) = tokio::join!(
            self.flight(&linehaul_leg, aircraft, &winds),
            self.router
                .estimate(request.pickup.coord, pickup.airport.coord, departure),
            self.airport_to_point(&delivery, request.delivery.coord, departure),
        );

        let mut segments = Vec::with_capacity(5);
        if let Some(result) = inbound {
            segments.push(TripSegment::flight(&home, &pickup.airport, inbound_nm, result));
        }
        segments.push(TripSegment::ground(
            &pickup.airport.code,
            &request.pickup.label,
            to_pickup,
        ));
        segments.push(TripSegment::ground(
            &request.pickup.label,
            &pickup.airport.code,
            from_pickup,
        ));
        if let Some(result) = linehaul {
            segments.push(TripSegment::flight(
                &pickup.airport,
                &delivery.airport,
                linehaul_nm,
                result,
            ));
        }
        segments.push(TripSegment::ground(
            &delivery.airport.code,
            &request.delivery.label,
            to_delivery,
        ));

        for segment in &segments {
            match &segment.detail {
                SegmentDetail::Flight {
                    wind_source: Some(WindSource::Synthetic),
                    ..
                } => degraded.push(DegradedData::SyntheticWinds {
                    from: segment.from.clone(),
                    to: segment.to.clone(),
                }),
                SegmentDetail::Ground {
                    route_quality: RouteSource::Heuristic,
                    ..
                } => degraded.push(DegradedData::HeuristicGroundRoute {
                    from: segment.from.clone(),
                    to: segment.to.clone(),
                }),
                _ => {}
            }
        }

        let total_minutes: f64 = segments.iter().map(|s| s.minutes).sum();
        let bounds = compute_bounds(&segments, &config.scenario);
        let (scenario, advisory_answered) = review_bounds(
            bounds,
            self.advisor.as_ref(),
            &segment_summary(&segments),
            config.fetch_timeout(),
        )
        .await;
        if !advisory_answered {
            degraded.push(DegradedData::AdvisoryUnavailable);
        }

        let weather_complete = home_weather.is_some()
            && pickup_forecast.is_some()
            && delivery_forecast.is_some();
        let confidence = confidence_score(config, &segments, weather_complete);

        let ends = vec![
            EndApproval::from_selection(&pickup),
            EndApproval::from_selection(&delivery),
        ];
        let approval = Approval {
            required: ends.iter().any(|e| e.requires_approval),
            ends,
        };

        let plan = TripPlan {
            home_base: home.code.clone(),
            pickup_airport: pickup.airport.code.clone(),
            delivery_airport: delivery.airport.code.clone(),
            segments,
            total_minutes,
            departure_time: request.departure_time,
            arrival_time: request.departure_time + minutes_to_duration(total_minutes),
            scenario,
            confidence,
            approval,
            degraded,
        };
        info!(
            "Trip planned — pickup={} delivery={} total_minutes={:.1} approval_required={} confidence={:.2}",
            plan.pickup_airport,
            plan.delivery_airport,
            plan.total_minutes,
            plan.approval.required,
            plan.confidence
        );
        Ok(plan)
    }

    /// `None` when the leg starts and ends at the same airport.
    async fn flight(
        &self,
        leg: &FlightLeg<'_>,
        aircraft: &AircraftProfile,
        winds: &WindEstimator,
    ) -> Option<FlightTimeResult> {
        if leg.departure.code == leg.arrival.code {
            debug!("Omitting same-airport flight — code={}", leg.departure.code);
            return None;
        }
        Some(compute_flight_time(leg, aircraft, winds).await)
    }

    async fn current_at(
        &self,
        airport: &Airport,
        home: &Airport,
        home_weather: &Option<WeatherReport>,
    ) -> Option<WeatherReport> {
        if airport.code == home.code {
            return home_weather.clone();
        }
        self.weather.fetch(airport).await
    }

    /// Reuses the qualification route; forced airports are routed here.
    async fn airport_to_point(
        &self,
        selection: &AirportSelection,
        point: Coord,
        departure: Option<DateTime<Utc>>,
    ) -> GroundEstimate {
        match &selection.ground {
            Some(estimate) => estimate.clone(),
            None => {
                self.router
                    .estimate(selection.airport.coord, point, departure)
                    .await
            }
        }
    }

    async fn forecast_for(&self, selection: &AirportSelection) -> Option<WeatherReport> {
        match &selection.weather {
            Some(report) => Some(report.clone()),
            None => self.weather.fetch_forecast(&selection.airport).await,
        }
    }
}

/// Base score raised by route quality, weather availability and live traffic.
pub fn confidence_score(config: &PlannerConfig, segments: &[TripSegment], weather_complete: bool) -> f64 {
    let settings = &config.confidence;
    let ground: Vec<(&RouteSource, bool)> = segments
        .iter()
        .filter_map(|s| match &s.detail {
            SegmentDetail::Ground {
                route_quality,
                traffic_aware,
                ..
            } => Some((route_quality, *traffic_aware)),
            SegmentDetail::Flight { .. } => None,
        })
        .collect();

    let mut score = settings.base;
    if !ground.is_empty() && ground.iter().all(|(q, _)| **q == RouteSource::Routed) {
        score += settings.route_quality_bonus;
    }
    if weather_complete {
        score += settings.weather_bonus;
    }
    if !ground.is_empty() && ground.iter().all(|(_, traffic)| *traffic) {
        score += settings.traffic_bonus;
    }
    score.min(settings.max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ground(source: RouteSource, traffic_aware: bool) -> TripSegment {
        TripSegment::ground(
            "KAAA",
            "Depot",
            GroundEstimate {
                duration_minutes: 20.0,
                distance_miles: 12.0,
                source,
                polyline: None,
                traffic_aware,
            },
        )
    }

    #[test]
    fn test_confidence_bonuses() {
        let config = PlannerConfig::with_default_aircraft();
        let heuristic = vec![ground(RouteSource::Heuristic, false)];
        assert!((confidence_score(&config, &heuristic, false) - 0.6).abs() < 1e-9);
        assert!((confidence_score(&config, &heuristic, true) - 0.7).abs() < 1e-9);

        let routed = vec![
            ground(RouteSource::Routed, true),
            ground(RouteSource::Routed, true),
        ];
        assert!((confidence_score(&config, &routed, true) - 0.9).abs() < 1e-9);

        let mut generous = config.clone();
        generous.confidence.base = 0.9;
        assert!((confidence_score(&generous, &routed, true) - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_segment_serialises_with_type_tag() {
        let json = serde_json::to_value(ground(RouteSource::Routed, false)).unwrap();
        assert_eq!(json["type"], "ground");
        assert_eq!(json["route_quality"], "routed");
        assert_eq!(json["from"], "KAAA");
        assert_eq!(ground(RouteSource::Routed, false).kind(), SegmentKind::Ground);
    }
}
