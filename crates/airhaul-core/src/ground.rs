//! Ground-transport time between an airport and a pickup or delivery point.

use crate::geo::{Coord, NM_PER_STATUTE_MILE};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const METRES_PER_STATUTE_MILE: f64 = 1_609.344;

#[derive(Error, Debug)]
pub enum RouteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Routing service returned status {0}")]
    Status(u16),
    #[error("No route found: {0}")]
    NoRoute(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// Computed by a road-routing service.
    Routed,
    /// Straight-line distance at an average speed.
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundEstimate {
    pub duration_minutes: f64,
    pub distance_miles: f64,
    pub source: RouteSource,
    /// Encoded polyline when the router supplies one.
    pub polyline: Option<String>,
    /// Duration reflects live traffic. Only routers backed by a traffic feed
    /// set this; [`HeuristicRouter`] and [`OsrmRouter`] always report false.
    pub traffic_aware: bool,
}

/// Road routing seam. Implementations with a live traffic feed mark their
/// estimates `traffic_aware`, which earns the plan its traffic confidence bonus.
#[async_trait]
pub trait GroundRouter: Send + Sync {
    async fn estimate(
        &self,
        from: Coord,
        to: Coord,
        departure: Option<DateTime<Utc>>,
    ) -> Result<GroundEstimate, RouteError>;
}

/// Great-circle distance stretched by a road factor, driven at an average speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicRouter {
    pub road_factor: f64,
    pub average_mph: f64,
}

impl Default for HeuristicRouter {
    fn default() -> Self {
        Self {
            road_factor: 1.3,
            average_mph: 45.0,
        }
    }
}

impl HeuristicRouter {
    pub fn estimate_between(&self, from: Coord, to: Coord) -> GroundEstimate {
        let distance_miles = from.distance_nm(&to) / NM_PER_STATUTE_MILE * self.road_factor;
        GroundEstimate {
            duration_minutes: distance_miles / self.average_mph * 60.0,
            distance_miles,
            source: RouteSource::Heuristic,
            polyline: None,
            traffic_aware: false,
        }
    }
}

#[async_trait]
impl GroundRouter for HeuristicRouter {
    async fn estimate(
        &self,
        from: Coord,
        to: Coord,
        _departure: Option<DateTime<Utc>>,
    ) -> Result<GroundEstimate, RouteError> {
        Ok(self.estimate_between(from, to))
    }
}

/// OSRM `route/v1/driving` client.
pub struct OsrmRouter {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    duration: f64,
    distance: f64,
    geometry: Option<String>,
}

impl OsrmRouter {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn route_url(&self, from: Coord, to: Coord) -> String {
        format!(
            "{}/route/v1/driving/{:.6},{:.6};{:.6},{:.6}?overview=simplified&geometries=polyline",
            self.base_url, from.lon, from.lat, to.lon, to.lat
        )
    }
}

fn parse_osrm_response(body: &str) -> Result<GroundEstimate, RouteError> {
    let response: OsrmResponse =
        serde_json::from_str(body).map_err(|e| RouteError::NoRoute(e.to_string()))?;
    if response.code != "Ok" {
        return Err(RouteError::NoRoute(
            response.message.unwrap_or(response.code),
        ));
    }
    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| RouteError::NoRoute("empty route list".to_string()))?;
    Ok(GroundEstimate {
        duration_minutes: route.duration / 60.0,
        distance_miles: route.distance / METRES_PER_STATUTE_MILE,
        source: RouteSource::Routed,
        polyline: route.geometry,
        traffic_aware: false,
    })
}

#[async_trait]
impl GroundRouter for OsrmRouter {
    async fn estimate(
        &self,
        from: Coord,
        to: Coord,
        _departure: Option<DateTime<Utc>>,
    ) -> Result<GroundEstimate, RouteError> {
        let response = self.http.get(self.route_url(from, to)).send().await?;
        let status = response.status();
        // OSRM reports NoRoute with a 400 and a JSON body.
        if !status.is_success() && status.as_u16() != 400 {
            return Err(RouteError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_osrm_response(&body)
    }
}

/// Tries the configured router under a timeout and falls back to the
/// heuristic. Never fails.
#[derive(Clone)]
pub struct FallbackRouter {
    primary: Option<Arc<dyn GroundRouter>>,
    heuristic: HeuristicRouter,
    timeout: Duration,
}

impl FallbackRouter {
    pub fn new(primary: Option<Arc<dyn GroundRouter>>, timeout: Duration) -> Self {
        Self {
            primary,
            heuristic: HeuristicRouter::default(),
            timeout,
        }
    }

    pub fn heuristic_only() -> Self {
        Self::new(None, Duration::from_secs(1))
    }

    pub async fn estimate(
        &self,
        from: Coord,
        to: Coord,
        departure: Option<DateTime<Utc>>,
    ) -> GroundEstimate {
        if let Some(primary) = &self.primary {
            match tokio::time::timeout(self.timeout, primary.estimate(from, to, departure)).await {
                Ok(Ok(estimate)) => {
                    debug!(
                        "Ground route — minutes={:.1} miles={:.1} source={:?}",
                        estimate.duration_minutes, estimate.distance_miles, estimate.source
                    );
                    return estimate;
                }
                Ok(Err(e)) => warn!("Ground router failed; using heuristic — error={}", e),
                Err(_) => warn!(
                    "Ground router timed out; using heuristic — timeout={:?}",
                    self.timeout
                ),
            }
        }
        self.heuristic.estimate_between(from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl GroundRouter for Broken {
        async fn estimate(
            &self,
            _from: Coord,
            _to: Coord,
            _departure: Option<DateTime<Utc>>,
        ) -> Result<GroundEstimate, RouteError> {
            Err(RouteError::Status(502))
        }
    }

    struct Slow;

    #[async_trait]
    impl GroundRouter for Slow {
        async fn estimate(
            &self,
            _from: Coord,
            _to: Coord,
            _departure: Option<DateTime<Utc>>,
        ) -> Result<GroundEstimate, RouteError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Err(RouteError::NoRoute("never".to_string()))
        }
    }

    #[test]
    fn test_heuristic_speed_and_factor() {
        let from = Coord::new(40.0, -75.0);
        let to = Coord::new(40.5, -75.0);
        let estimate = HeuristicRouter::default().estimate_between(from, to);
        let straight_miles = from.distance_nm(&to) / NM_PER_STATUTE_MILE;
        assert!((estimate.distance_miles - straight_miles * 1.3).abs() < 1e-9);
        assert!((estimate.duration_minutes - estimate.distance_miles / 45.0 * 60.0).abs() < 1e-9);
        assert_eq!(estimate.source, RouteSource::Heuristic);

        let same = HeuristicRouter::default().estimate_between(from, from);
        assert_eq!(same.duration_minutes, 0.0);
    }

    #[test]
    fn test_osrm_response() {
        let body = r#"{"code":"Ok","routes":[{"duration":1800.0,"distance":40233.6,"geometry":"_p~iF~ps|U_ulLnnqC"}]}"#;
        let estimate = parse_osrm_response(body).unwrap();
        assert!((estimate.duration_minutes - 30.0).abs() < 1e-9);
        assert!((estimate.distance_miles - 25.0).abs() < 1e-6);
        assert_eq!(estimate.source, RouteSource::Routed);
        assert!(estimate.polyline.is_some());

        let no_route = r#"{"code":"NoRoute","message":"Impossible route between points"}"#;
        assert!(matches!(parse_osrm_response(no_route), Err(RouteError::NoRoute(_))));
    }

    #[test]
    fn test_route_url_uses_lon_lat_order() {
        let router = OsrmRouter::new("https://router.example/", Duration::from_secs(5));
        let url = router.route_url(Coord::new(40.0, -75.0), Coord::new(41.0, -74.0));
        assert!(url.starts_with(
            "https://router.example/route/v1/driving/-75.000000,40.000000;-74.000000,41.000000"
        ));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_heuristic() {
        let router = FallbackRouter::new(Some(Arc::new(Broken)), Duration::from_secs(5));
        let estimate = router
            .estimate(Coord::new(40.0, -75.0), Coord::new(40.2, -75.0), None)
            .await;
        assert_eq!(estimate.source, RouteSource::Heuristic);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back_to_heuristic() {
        let router = FallbackRouter::new(Some(Arc::new(Slow)), Duration::from_secs(12));
        let estimate = router
            .estimate(Coord::new(40.0, -75.0), Coord::new(40.2, -75.0), None)
            .await;
        assert_eq!(estimate.source, RouteSource::Heuristic);
    }
}
