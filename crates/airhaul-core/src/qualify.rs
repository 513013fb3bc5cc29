//! Airport qualification for each end of a trip.
//!
//! Candidates near the pickup or delivery point pass through named stages in
//! order: runway, ground-transport budget, fuel (all hard) and weather (soft).
//! Each stage returns a [`StageVerdict`]. A hard rejection is final for that
//! candidate; soft rejections keep the candidate eligible but require approval.

use crate::apt_dat::{Airport, Runway};
use crate::config::{DepartureLimits, FlightRules, OperatingMinima, PipelineSettings, PlannerConfig};
use crate::directory::{AirportDirectory, SearchFilter};
use crate::error::PlanError;
use crate::geo::{self, Coord};
use crate::ground::{FallbackRouter, GroundEstimate};
use crate::report::{WeatherReport, Wind, WindDirection};
use crate::weather::WeatherEngine;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripEnd {
    Pickup,
    Delivery,
}

impl fmt::Display for TripEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripEnd::Pickup => write!(f, "pickup"),
            TripEnd::Delivery => write!(f, "delivery"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum HardViolation {
    NoSuitableRunway {
        min_length_ft: u32,
        min_width_ft: u32,
    },
    GroundTimeOverBudget {
        minutes: f64,
        budget_minutes: f64,
    },
    NoFuel {
        fuel: String,
    },
    ReferenceDataMissing,
}

impl fmt::Display for HardViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HardViolation::NoSuitableRunway {
                min_length_ft,
                min_width_ft,
            } => write!(
                f,
                "no acceptable runway of at least {} x {} ft",
                min_length_ft, min_width_ft
            ),
            HardViolation::GroundTimeOverBudget {
                minutes,
                budget_minutes,
            } => write!(
                f,
                "ground transport {:.0} min exceeds {:.0} min budget",
                minutes, budget_minutes
            ),
            HardViolation::NoFuel { fuel } => write!(f, "no {} available", fuel),
            HardViolation::ReferenceDataMissing => write!(f, "airport reference data unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SoftViolation {
    CeilingBelowMinimum { ceiling_ft: u32, minimum_ft: u32 },
    VisibilityBelowMinimum { visibility_sm: f64, minimum_sm: f64 },
    WindAboveLimit { wind_kt: u32, limit_kt: u32 },
    GustAboveLimit { gust_kt: u32, limit_kt: u32 },
    CrosswindAboveLimit { runway: String, crosswind_kt: f64, limit_kt: f64 },
    NoInstrumentApproach,
}

impl fmt::Display for SoftViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoftViolation::CeilingBelowMinimum {
                ceiling_ft,
                minimum_ft,
            } => write!(f, "ceiling {} ft below {} ft minimum", ceiling_ft, minimum_ft),
            SoftViolation::VisibilityBelowMinimum {
                visibility_sm,
                minimum_sm,
            } => write!(
                f,
                "visibility {:.2} SM below {:.2} SM minimum",
                visibility_sm, minimum_sm
            ),
            SoftViolation::WindAboveLimit { wind_kt, limit_kt } => {
                write!(f, "wind {} kt above {} kt limit", wind_kt, limit_kt)
            }
            SoftViolation::GustAboveLimit { gust_kt, limit_kt } => {
                write!(f, "gusts {} kt above {} kt limit", gust_kt, limit_kt)
            }
            SoftViolation::CrosswindAboveLimit {
                runway,
                crosswind_kt,
                limit_kt,
            } => write!(
                f,
                "crosswind {:.0} kt on runway {} above {:.0} kt limit",
                crosswind_kt, runway, limit_kt
            ),
            SoftViolation::NoInstrumentApproach => {
                write!(f, "no instrument approach for an IFR arrival")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageVerdict {
    Pass,
    HardReject(HardViolation),
    SoftReject(Vec<SoftViolation>),
}

/// The runway end best aligned with the wind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunwayWind {
    pub runway: String,
    pub heading: f64,
    pub crosswind_kt: f64,
    pub headwind_kt: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportCandidate {
    pub airport: Airport,
    pub straight_line_nm: f64,
    pub longest_paved_runway_ft: Option<u32>,
    pub ground: Option<GroundEstimate>,
    pub weather: Option<WeatherReport>,
    pub best_runway: Option<RunwayWind>,
    pub hard_violation: Option<HardViolation>,
    pub soft_violations: Vec<SoftViolation>,
    pub requires_approval: bool,
}

impl AirportCandidate {
    pub fn new(airport: Airport, straight_line_nm: f64) -> Self {
        Self {
            airport,
            straight_line_nm,
            longest_paved_runway_ft: None,
            ground: None,
            weather: None,
            best_runway: None,
            hard_violation: None,
            soft_violations: Vec::new(),
            requires_approval: false,
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.hard_violation.is_none()
    }

    pub fn ground_minutes(&self) -> f64 {
        self.ground
            .as_ref()
            .map(|g| g.duration_minutes)
            .unwrap_or(f64::INFINITY)
    }

    /// Folds a stage verdict into the candidate. Returns false on hard rejection.
    fn record(&mut self, verdict: StageVerdict) -> bool {
        match verdict {
            StageVerdict::Pass => true,
            StageVerdict::HardReject(v) => {
                self.hard_violation = Some(v);
                false
            }
            StageVerdict::SoftReject(vs) => {
                self.soft_violations.extend(vs);
                self.requires_approval = true;
                true
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportSelection {
    pub end: TripEnd,
    pub airport: Airport,
    /// Supplied by the caller rather than chosen by the pipeline.
    pub forced: bool,
    pub requires_approval: bool,
    pub violations: Vec<SoftViolation>,
    pub ground: Option<GroundEstimate>,
    pub weather: Option<WeatherReport>,
    pub rejected: Vec<RejectedCandidate>,
    pub candidates_considered: usize,
}

fn runway_acceptable(runway: &Runway, settings: &PipelineSettings) -> bool {
    runway.length_ft >= settings.min_runway_length_ft
        && runway.width_ft >= settings.min_runway_width_ft
        && settings.acceptable_surfaces.contains(&runway.surface)
}

/// Hard: an acceptable runway must exist. Also reports the longest paved runway.
pub fn runway_stage(airport: &Airport, settings: &PipelineSettings) -> (StageVerdict, Option<u32>) {
    let longest_paved = airport
        .runways
        .iter()
        .filter(|r| runway_acceptable(r, settings) && r.surface.is_paved())
        .map(|r| r.length_ft)
        .max();
    let verdict = if airport.runways.iter().any(|r| runway_acceptable(r, settings)) {
        StageVerdict::Pass
    } else {
        StageVerdict::HardReject(HardViolation::NoSuitableRunway {
            min_length_ft: settings.min_runway_length_ft,
            min_width_ft: settings.min_runway_width_ft,
        })
    };
    (verdict, longest_paved)
}

/// Hard: ground transport must fit the budget.
pub fn ground_stage(estimate: &GroundEstimate, settings: &PipelineSettings) -> StageVerdict {
    if estimate.duration_minutes > settings.max_ground_minutes {
        StageVerdict::HardReject(HardViolation::GroundTimeOverBudget {
            minutes: estimate.duration_minutes,
            budget_minutes: settings.max_ground_minutes,
        })
    } else {
        StageVerdict::Pass
    }
}

/// Hard: the required fuel grade must be on the field.
pub fn fuel_stage(airport: &Airport, settings: &PipelineSettings) -> StageVerdict {
    match &settings.required_fuel {
        Some(fuel) if !airport.has_fuel(fuel) => {
            StageVerdict::HardReject(HardViolation::NoFuel { fuel: fuel.clone() })
        }
        _ => StageVerdict::Pass,
    }
}

/// Picks the runway end with the least crosswind. A variable wind puts its
/// full speed across every runway.
pub fn best_runway<'a, I>(runways: I, wind: &Wind) -> Option<RunwayWind>
where
    I: IntoIterator<Item = &'a Runway>,
{
    let mut ends: Vec<(String, f64)> = Vec::new();
    for runway in runways {
        let mut idents = runway.name.split('/');
        for heading in runway.headings() {
            let ident = idents.next().unwrap_or(runway.name.as_str()).to_string();
            ends.push((ident, heading));
        }
    }

    ends.into_iter()
        .map(|(runway, heading)| {
            let (crosswind_kt, headwind_kt) = match wind.direction {
                _ if wind.is_calm() => (0.0, 0.0),
                WindDirection::Variable => (f64::from(wind.speed_kt), 0.0),
                WindDirection::Degrees(d) => {
                    let speed = f64::from(wind.speed_kt);
                    (
                        geo::crosswind_component(f64::from(d), speed, heading),
                        geo::headwind_component(f64::from(d), speed, heading),
                    )
                }
            };
            RunwayWind {
                runway,
                heading,
                crosswind_kt,
                headwind_kt,
            }
        })
        .min_by(|a, b| {
            a.crosswind_kt
                .total_cmp(&b.crosswind_kt)
                .then_with(|| b.headwind_kt.total_cmp(&a.headwind_kt))
        })
}

/// Soft: weather, wind and approach minima at the estimated arrival time.
/// Missing weather passes; the check is skipped rather than failed.
pub fn weather_stage(
    airport: &Airport,
    report: Option<&WeatherReport>,
    eta: Option<DateTime<Utc>>,
    minima: &OperatingMinima,
    settings: &PipelineSettings,
    rules: FlightRules,
) -> (StageVerdict, Option<RunwayWind>) {
    let mut violations = Vec::new();
    if rules == FlightRules::Ifr && !airport.instrument_approach {
        violations.push(SoftViolation::NoInstrumentApproach);
    }

    let mut runway_wind = None;
    if let Some(report) = report {
        let conditions = report.conditions_at(eta);
        if let Some(ceiling_ft) = conditions.ceiling_ft {
            if ceiling_ft < minima.min_ceiling_ft {
                violations.push(SoftViolation::CeilingBelowMinimum {
                    ceiling_ft,
                    minimum_ft: minima.min_ceiling_ft,
                });
            }
        }
        if conditions.visibility_sm < minima.min_visibility_sm {
            violations.push(SoftViolation::VisibilityBelowMinimum {
                visibility_sm: conditions.visibility_sm,
                minimum_sm: minima.min_visibility_sm,
            });
        }
        let wind = conditions.wind;
        if wind.speed_kt > minima.max_wind_kt {
            violations.push(SoftViolation::WindAboveLimit {
                wind_kt: wind.speed_kt,
                limit_kt: minima.max_wind_kt,
            });
        }
        if let Some(gust_kt) = wind.gust_kt {
            if gust_kt > minima.max_gust_kt {
                violations.push(SoftViolation::GustAboveLimit {
                    gust_kt,
                    limit_kt: minima.max_gust_kt,
                });
            }
        }

        runway_wind = best_runway(
            airport
                .runways
                .iter()
                .filter(|r| runway_acceptable(r, settings)),
            &wind,
        );
        if let Some(rw) = &runway_wind {
            if rw.crosswind_kt > minima.max_crosswind_kt {
                violations.push(SoftViolation::CrosswindAboveLimit {
                    runway: rw.runway.clone(),
                    crosswind_kt: rw.crosswind_kt,
                    limit_kt: minima.max_crosswind_kt,
                });
            }
        }
    }

    let verdict = if violations.is_empty() {
        StageVerdict::Pass
    } else {
        StageVerdict::SoftReject(violations)
    };
    (verdict, runway_wind)
}

/// Index of the winning candidate, if any.
///
/// Candidates are expected in ground-transport order. The first eligible
/// candidate without soft violations wins; otherwise the eligible candidate
/// with the fewest violations, ties broken by ground time. Candidates with a
/// hard violation are never chosen.
pub fn select_candidate(candidates: &[AirportCandidate]) -> Option<usize> {
    let eligible = || candidates.iter().enumerate().filter(|(_, c)| c.is_eligible());
    if let Some((i, _)) = eligible().find(|(_, c)| c.soft_violations.is_empty()) {
        return Some(i);
    }
    eligible()
        .min_by(|(ia, a), (ib, b)| {
            a.soft_violations
                .len()
                .cmp(&b.soft_violations.len())
                .then_with(|| a.ground_minutes().total_cmp(&b.ground_minutes()))
                .then_with(|| ia.cmp(ib))
        })
        .map(|(i, _)| i)
}

/// Blocks planning when the home-base wind exceeds absolute limits.
/// Without a report the check cannot run and planning proceeds.
pub fn check_departure(
    home: &Airport,
    report: Option<&WeatherReport>,
    limits: &DepartureLimits,
) -> Result<Option<RunwayWind>, PlanError> {
    let Some(report) = report else {
        warn!("No departure weather; skipping wind pre-check — station={}", home.code);
        return Ok(None);
    };
    let wind = report.conditions.wind;
    let blocked = |reason: String, crosswind_kt: Option<f64>, limit_kt: f64| {
        PlanError::BlockingWeatherViolation {
            station: report.station.clone(),
            raw: report.raw.clone(),
            wind_kt: wind.speed_kt,
            gust_kt: wind.gust_kt,
            crosswind_kt,
            limit_kt,
            reason,
        }
    };

    if wind.peak_kt() > limits.max_wind_kt {
        let observed = match wind.gust_kt {
            Some(g) => format!("{}G{} kt", wind.speed_kt, g),
            None => format!("{} kt", wind.speed_kt),
        };
        return Err(blocked(
            format!("wind {} exceeds {} kt limit", observed, limits.max_wind_kt),
            None,
            f64::from(limits.max_wind_kt),
        ));
    }

    let runway_wind = best_runway(&home.runways, &wind);
    if let Some(rw) = &runway_wind {
        if rw.crosswind_kt > limits.max_crosswind_kt {
            return Err(blocked(
                format!(
                    "crosswind {:.0} kt on best runway {} exceeds {:.0} kt limit",
                    rw.crosswind_kt, rw.runway, limits.max_crosswind_kt
                ),
                Some(rw.crosswind_kt),
                limits.max_crosswind_kt,
            ));
        }
    }
    debug!("Departure wind within limits — station={}", home.code);
    Ok(runway_wind)
}

/// Collaborators shared by both trip ends.
#[derive(Clone, Copy)]
pub struct QualificationContext<'a> {
    pub config: &'a PlannerConfig,
    pub directory: &'a dyn AirportDirectory,
    pub weather: &'a WeatherEngine,
    pub router: &'a FallbackRouter,
}

#[derive(Debug, Clone)]
pub struct EndRequest {
    pub end: TripEnd,
    /// The pickup or delivery location.
    pub point: Coord,
    pub forced_code: Option<String>,
    /// Departure time handed to the ground router.
    pub reference_time: DateTime<Utc>,
    pub flight_rules: FlightRules,
}

/// Where and when the flight into a trip end leaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArrivalEstimate {
    pub origin: Coord,
    pub departs_at: DateTime<Utc>,
}

impl ArrivalEstimate {
    pub fn new(origin: Coord, departs_at: DateTime<Utc>) -> Self {
        Self { origin, departs_at }
    }

    /// Arrival at `destination` flying the great circle at cruise speed.
    pub fn eta(&self, destination: Coord, cruise_tas_kt: f64) -> DateTime<Utc> {
        let hours = self.origin.distance_nm(&destination) / cruise_tas_kt;
        self.departs_at + Duration::seconds((hours * 3_600.0).round() as i64)
    }
}

/// Outcome of the hard stages for one trip end. Forecasts are already
/// attached; the soft stage runs in [`Shortlist::select`] once the arrival
/// time is known.
#[derive(Debug, Clone)]
pub struct Shortlist {
    pub end: TripEnd,
    pub flight_rules: FlightRules,
    /// Set when the caller named the airport. No stages run.
    pub forced: Option<Airport>,
    /// Survivors in ground-time order.
    pub candidates: Vec<AirportCandidate>,
    pub rejected: Vec<RejectedCandidate>,
    pub considered: usize,
}

fn no_viable(end: TripEnd, reason: String, rejected: Vec<RejectedCandidate>) -> PlanError {
    PlanError::NoViableAirport {
        end,
        reason,
        rejected,
    }
}

/// Candidate search, the hard stages and forecast retrieval for one trip end.
pub async fn shortlist_end(
    ctx: QualificationContext<'_>,
    request: &EndRequest,
) -> Result<Shortlist, PlanError> {
    let settings = &ctx.config.pipeline;
    let end = request.end;
    let mut shortlist = Shortlist {
        end,
        flight_rules: request.flight_rules,
        forced: None,
        candidates: Vec::new(),
        rejected: Vec::new(),
        considered: 0,
    };

    if let Some(code) = &request.forced_code {
        let airport = ctx.directory.get(code).await.ok_or_else(|| {
            no_viable(
                end,
                format!("requested airport {} not found", code.to_uppercase()),
                Vec::new(),
            )
        })?;
        info!("Using requested airport — end={} code={}", end, airport.code);
        shortlist.forced = Some(airport);
        shortlist.considered = 1;
        return Ok(shortlist);
    }

    // Candidate search
    let filter = SearchFilter {
        min_runway_length_ft: settings.min_runway_length_ft,
        surfaces: settings.acceptable_surfaces.clone(),
    };
    let mut nearby = ctx
        .directory
        .search(request.point, settings.search_radius_nm, &filter)
        .await;
    nearby.truncate(settings.max_candidates);
    if nearby.is_empty() {
        return Err(no_viable(
            end,
            format!(
                "no airports within {:.0} nm of the {} point",
                settings.search_radius_nm, end
            ),
            Vec::new(),
        ));
    }
    let considered = nearby.len();
    shortlist.considered = considered;
    debug!("Candidate search — end={} candidates={}", end, considered);

    let fetched = join_all(nearby.iter().map(|n| ctx.directory.get(&n.code))).await;
    let rejected = &mut shortlist.rejected;
    let mut batch: Vec<AirportCandidate> = Vec::with_capacity(considered);
    for (near, airport) in nearby.iter().zip(fetched) {
        match airport {
            Some(a) => batch.push(AirportCandidate::new(a, near.distance_nm)),
            None => rejected.push(RejectedCandidate {
                code: near.code.clone(),
                reason: HardViolation::ReferenceDataMissing.to_string(),
            }),
        }
    }

    // Hard: runway
    let runway_verdicts: Vec<(StageVerdict, Option<u32>)> = batch
        .par_iter()
        .map(|c| runway_stage(&c.airport, settings))
        .collect();
    let mut survivors = Vec::with_capacity(batch.len());
    for (mut candidate, (verdict, longest)) in batch.into_iter().zip(runway_verdicts) {
        candidate.longest_paved_runway_ft = longest;
        if candidate.record(verdict) {
            survivors.push(candidate);
        } else {
            reject(end, &candidate, rejected);
        }
    }

    // Hard: ground-transport budget, then re-rank by transport time
    let estimates = join_all(survivors.iter().map(|c| {
        ctx.router
            .estimate(c.airport.coord, request.point, Some(request.reference_time))
    }))
    .await;
    let mut ranked = Vec::with_capacity(survivors.len());
    for (mut candidate, estimate) in survivors.into_iter().zip(estimates) {
        let verdict = ground_stage(&estimate, settings);
        candidate.ground = Some(estimate);
        if candidate.record(verdict) {
            ranked.push(candidate);
        } else {
            reject(end, &candidate, rejected);
        }
    }
    ranked.sort_by(|a, b| {
        a.ground_minutes()
            .total_cmp(&b.ground_minutes())
            .then_with(|| a.straight_line_nm.total_cmp(&b.straight_line_nm))
            .then_with(|| a.airport.code.cmp(&b.airport.code))
    });

    // Hard: fuel
    let mut fueled = Vec::with_capacity(ranked.len());
    for mut candidate in ranked {
        let verdict = fuel_stage(&candidate.airport, settings);
        if candidate.record(verdict) {
            fueled.push(candidate);
        } else {
            reject(end, &candidate, rejected);
        }
    }

    if fueled.is_empty() {
        return Err(no_viable(
            end,
            format!("all {} candidates failed hard constraints", considered),
            shortlist.rejected,
        ));
    }

    let reports = join_all(fueled.iter().map(|c| ctx.weather.fetch_forecast(&c.airport))).await;
    for (candidate, report) in fueled.iter_mut().zip(reports) {
        candidate.weather = report;
    }
    shortlist.candidates = fueled;
    Ok(shortlist)
}

impl Shortlist {
    /// Runs the soft stage against each candidate's estimated arrival time
    /// and picks the winner.
    pub fn select(
        self,
        config: &PlannerConfig,
        arrival: ArrivalEstimate,
    ) -> Result<AirportSelection, PlanError> {
        let end = self.end;
        if let Some(airport) = self.forced {
            return Ok(AirportSelection {
                end,
                airport,
                forced: true,
                requires_approval: false,
                violations: Vec::new(),
                ground: None,
                weather: None,
                rejected: Vec::new(),
                candidates_considered: self.considered,
            });
        }
        let aircraft = config.aircraft()?;

        // Soft: weather, wind, approach
        let mut candidates = self.candidates;
        for candidate in candidates.iter_mut() {
            let eta = arrival.eta(candidate.airport.coord, aircraft.cruise_tas_kt);
            let (verdict, runway_wind) = weather_stage(
                &candidate.airport,
                candidate.weather.as_ref(),
                Some(eta),
                &config.minima,
                &config.pipeline,
                self.flight_rules,
            );
            candidate.best_runway = runway_wind;
            candidate.record(verdict);
            if candidate.requires_approval {
                debug!(
                    "Candidate needs approval — end={} code={} eta={} violations={}",
                    end,
                    candidate.airport.code,
                    eta,
                    candidate.soft_violations.len()
                );
            }
        }

        // Selection
        let rejected = self.rejected;
        let index = select_candidate(&candidates).ok_or_else(|| {
            no_viable(
                end,
                "no eligible candidate remained".to_string(),
                rejected.clone(),
            )
        })?;
        let winner = candidates.swap_remove(index);
        info!(
            "Selected airport — end={} code={} ground_minutes={:.1} requires_approval={}",
            end,
            winner.airport.code,
            winner.ground_minutes(),
            winner.requires_approval
        );

        Ok(AirportSelection {
            end,
            airport: winner.airport,
            forced: false,
            requires_approval: winner.requires_approval,
            violations: winner.soft_violations,
            ground: winner.ground,
            weather: winner.weather,
            rejected,
            candidates_considered: self.considered,
        })
    }
}

fn reject(end: TripEnd, candidate: &AirportCandidate, rejected: &mut Vec<RejectedCandidate>) {
    let reason = candidate
        .hard_violation
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_default();
    debug!(
        "Candidate rejected — end={} code={} reason={}",
        end, candidate.airport.code, reason
    );
    rejected.push(RejectedCandidate {
        code: candidate.airport.code.clone(),
        reason,
    });
}
