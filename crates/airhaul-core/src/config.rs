use crate::apt_dat::SurfaceType;
use crate::error::PlanError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlightRules {
    #[default]
    Vfr,
    Ifr,
}

/// Cruise altitude selection by leg distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AltitudeBands {
    pub short_max_nm: f64,
    pub short_ceiling_ft: f64,
    pub medium_max_nm: f64,
    pub medium_ceiling_ft: f64,
    pub long_ceiling_ft: f64,
}

impl Default for AltitudeBands {
    fn default() -> Self {
        Self {
            short_max_nm: 150.0,
            short_ceiling_ft: 9_000.0,
            medium_max_nm: 400.0,
            medium_ceiling_ft: 17_000.0,
            long_ceiling_ft: 25_000.0,
        }
    }
}

impl AltitudeBands {
    pub fn cruise_altitude_for(&self, distance_nm: f64) -> f64 {
        if distance_nm <= self.short_max_nm {
            self.short_ceiling_ft
        } else if distance_nm <= self.medium_max_nm {
            self.medium_ceiling_ft
        } else {
            self.long_ceiling_ft
        }
    }
}

/// Performance profile of the single aircraft type the planner operates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftProfile {
    pub name: String,
    pub cruise_tas_kt: f64,
    pub climb_tas_kt: f64,
    pub descent_tas_kt: f64,
    pub climb_rate_fpm: f64,
    pub descent_rate_fpm: f64,
    pub min_ground_speed_kt: f64,
    #[serde(default)]
    pub altitude_bands: AltitudeBands,
    /// Stretch applied to great-circle distance for non-direct routing.
    pub route_overage_factor: f64,
    /// Taxi time per airport endpoint.
    pub taxi_minutes: f64,
    pub long_leg_threshold_nm: f64,
    pub long_leg_headwind_factor: f64,
}

impl Default for AircraftProfile {
    fn default() -> Self {
        Self {
            name: "Single-engine turboprop".to_string(),
            cruise_tas_kt: 260.0,
            climb_tas_kt: 160.0,
            descent_tas_kt: 240.0,
            climb_rate_fpm: 1_500.0,
            descent_rate_fpm: 1_500.0,
            min_ground_speed_kt: 60.0,
            altitude_bands: AltitudeBands::default(),
            route_overage_factor: 1.05,
            taxi_minutes: 8.0,
            long_leg_threshold_nm: 500.0,
            long_leg_headwind_factor: 1.05,
        }
    }
}

/// Weather and wind minima at candidate airports. Violations are soft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatingMinima {
    pub min_ceiling_ft: u32,
    pub min_visibility_sm: f64,
    pub max_wind_kt: u32,
    pub max_gust_kt: u32,
    pub max_crosswind_kt: f64,
}

impl Default for OperatingMinima {
    fn default() -> Self {
        Self {
            min_ceiling_ft: 1_000,
            min_visibility_sm: 3.0,
            max_wind_kt: 25,
            max_gust_kt: 35,
            max_crosswind_kt: 20.0,
        }
    }
}

/// Absolute limits at the home base. Exceeding them blocks planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepartureLimits {
    pub max_wind_kt: u32,
    pub max_crosswind_kt: f64,
}

impl Default for DepartureLimits {
    fn default() -> Self {
        Self {
            max_wind_kt: 35,
            max_crosswind_kt: 25.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub search_radius_nm: f64,
    pub max_candidates: usize,
    pub max_ground_minutes: f64,
    pub min_runway_length_ft: u32,
    pub min_runway_width_ft: u32,
    pub acceptable_surfaces: Vec<SurfaceType>,
    /// `None` disables the fuel stage.
    pub required_fuel: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            search_radius_nm: 40.0,
            max_candidates: 10,
            max_ground_minutes: 60.0,
            min_runway_length_ft: 3_000,
            min_runway_width_ft: 60,
            acceptable_surfaces: vec![SurfaceType::Hard],
            required_fuel: Some("JET-A".to_string()),
        }
    }
}

/// One step of a tiered multiplier table. `up_to: None` is the open-ended top tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTier {
    pub up_to: Option<f64>,
    pub conservative: f64,
    pub optimistic: f64,
}

impl ScenarioTier {
    fn new(up_to: Option<f64>, conservative: f64, optimistic: f64) -> Self {
        Self {
            up_to,
            conservative,
            optimistic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioSettings {
    /// Flight tiers keyed by leg distance in nautical miles.
    pub flight_tiers: Vec<ScenarioTier>,
    /// Ground tiers keyed by leg duration in minutes.
    pub ground_tiers: Vec<ScenarioTier>,
}

impl Default for ScenarioSettings {
    fn default() -> Self {
        Self {
            flight_tiers: vec![
                ScenarioTier::new(Some(100.0), 1.10, 0.95),
                ScenarioTier::new(Some(300.0), 1.15, 0.93),
                ScenarioTier::new(Some(600.0), 1.20, 0.90),
                ScenarioTier::new(None, 1.25, 0.88),
            ],
            ground_tiers: vec![
                ScenarioTier::new(Some(30.0), 1.20, 0.90),
                ScenarioTier::new(Some(90.0), 1.30, 0.88),
                ScenarioTier::new(None, 1.40, 0.85),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub fetch_timeout_secs: u64,
    pub weather_base_url: String,
    pub osrm_base_url: String,
    /// Cap for the nearest-station radius search fallback.
    pub radius_search_cap_nm: f64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 12,
            weather_base_url: "https://aviationweather.gov/api/data".to_string(),
            osrm_base_url: "https://router.project-osrm.org".to_string(),
            radius_search_cap_nm: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceSettings {
    pub base: f64,
    pub route_quality_bonus: f64,
    pub weather_bonus: f64,
    pub traffic_bonus: f64,
    pub max: f64,
}

impl Default for ConfidenceSettings {
    fn default() -> Self {
        Self {
            base: 0.6,
            route_quality_bonus: 0.1,
            weather_bonus: 0.1,
            traffic_bonus: 0.1,
            max: 0.95,
        }
    }
}

/// Read-only operating configuration for one planning request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlannerConfig {
    pub aircraft: Option<AircraftProfile>,
    #[serde(default)]
    pub minima: OperatingMinima,
    #[serde(default)]
    pub departure_limits: DepartureLimits,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub scenario: ScenarioSettings,
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub confidence: ConfidenceSettings,
}

impl PlannerConfig {
    /// Stock configuration with the default aircraft profile filled in.
    pub fn with_default_aircraft() -> Self {
        Self {
            aircraft: Some(AircraftProfile::default()),
            ..Self::default()
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read planner config {}", path.display()))?;
        let config: PlannerConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse planner config {}", path.display()))?;
        Ok(config)
    }

    /// Returns the aircraft profile, or `ConfigurationMissing` when absent or unusable.
    pub fn aircraft(&self) -> Result<&AircraftProfile, PlanError> {
        let aircraft = self
            .aircraft
            .as_ref()
            .ok_or_else(|| PlanError::ConfigurationMissing("aircraft".to_string()))?;

        let required = [
            ("aircraft.cruise_tas_kt", aircraft.cruise_tas_kt),
            ("aircraft.climb_tas_kt", aircraft.climb_tas_kt),
            ("aircraft.descent_tas_kt", aircraft.descent_tas_kt),
            ("aircraft.climb_rate_fpm", aircraft.climb_rate_fpm),
            ("aircraft.descent_rate_fpm", aircraft.descent_rate_fpm),
            ("aircraft.min_ground_speed_kt", aircraft.min_ground_speed_kt),
            ("aircraft.route_overage_factor", aircraft.route_overage_factor),
            (
                "aircraft.long_leg_headwind_factor",
                aircraft.long_leg_headwind_factor,
            ),
        ];
        for (field, value) in required {
            if !(value.is_finite() && value > 0.0) {
                return Err(PlanError::ConfigurationMissing(field.to_string()));
            }
        }
        if !(aircraft.taxi_minutes.is_finite() && aircraft.taxi_minutes >= 0.0) {
            return Err(PlanError::ConfigurationMissing(
                "aircraft.taxi_minutes".to_string(),
            ));
        }
        Ok(aircraft)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        self.aircraft()?;
        if self.pipeline.max_candidates == 0 {
            return Err(PlanError::ConfigurationMissing(
                "pipeline.max_candidates".to_string(),
            ));
        }
        if self.pipeline.acceptable_surfaces.is_empty() {
            return Err(PlanError::ConfigurationMissing(
                "pipeline.acceptable_surfaces".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.network.fetch_timeout_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_aircraft_is_configuration_error() {
        let config: PlannerConfig = serde_json::from_str("{}").unwrap();
        assert!(config.aircraft.is_none());
        match config.validate() {
            Err(PlanError::ConfigurationMissing(field)) => assert_eq!(field, "aircraft"),
            other => panic!("expected ConfigurationMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_climb_rate_rejected() {
        let mut config = PlannerConfig::with_default_aircraft();
        config.aircraft.as_mut().unwrap().climb_rate_fpm = 0.0;
        match config.validate() {
            Err(PlanError::ConfigurationMissing(field)) => {
                assert_eq!(field, "aircraft.climb_rate_fpm")
            }
            other => panic!("expected ConfigurationMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_load_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "aircraft": {{
                    "name": "PC-12",
                    "cruise_tas_kt": 270,
                    "climb_tas_kt": 150,
                    "descent_tas_kt": 250,
                    "climb_rate_fpm": 1400,
                    "descent_rate_fpm": 1600,
                    "min_ground_speed_kt": 60,
                    "route_overage_factor": 1.04,
                    "taxi_minutes": 6,
                    "long_leg_threshold_nm": 450,
                    "long_leg_headwind_factor": 1.08
                }},
                "pipeline": {{ "max_ground_minutes": 45, "acceptable_surfaces": ["Hard", "Soft"] }}
            }}"#
        )
        .unwrap();

        let config = PlannerConfig::load(file.path()).unwrap();
        config.validate().unwrap();
        let aircraft = config.aircraft().unwrap();
        assert_eq!(aircraft.name, "PC-12");
        assert_eq!(aircraft.altitude_bands, AltitudeBands::default());
        assert_eq!(config.pipeline.max_ground_minutes, 45.0);
        assert_eq!(config.pipeline.max_candidates, 10);
        assert_eq!(config.minima, OperatingMinima::default());
    }

    #[test]
    fn test_altitude_bands() {
        let bands = AltitudeBands::default();
        assert_eq!(bands.cruise_altitude_for(80.0), 9_000.0);
        assert_eq!(bands.cruise_altitude_for(150.0), 9_000.0);
        assert_eq!(bands.cruise_altitude_for(300.0), 17_000.0);
        assert_eq!(bands.cruise_altitude_for(900.0), 25_000.0);
    }
}
