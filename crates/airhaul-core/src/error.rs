use crate::qualify::{RejectedCandidate, TripEnd};
use thiserror::Error;

/// Fatal planning failures. Anything not listed here degrades instead of aborting.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Departure blocked by weather at {station}: {reason} (report: {raw})")]
    BlockingWeatherViolation {
        station: String,
        raw: String,
        wind_kt: u32,
        gust_kt: Option<u32>,
        crosswind_kt: Option<f64>,
        limit_kt: f64,
        reason: String,
    },
    #[error("No viable {end} airport: {reason}")]
    NoViableAirport {
        end: TripEnd,
        reason: String,
        rejected: Vec<RejectedCandidate>,
    },
    #[error("Unknown airport {0}")]
    UnknownAirport(String),
    #[error("Missing required configuration: {0}")]
    ConfigurationMissing(String),
}

impl PlanError {
    /// Short machine-friendly category for the error.
    pub fn kind(&self) -> &'static str {
        match self {
            PlanError::BlockingWeatherViolation { .. } => "blocking_weather_violation",
            PlanError::NoViableAirport { .. } => "no_viable_airport",
            PlanError::UnknownAirport(_) => "unknown_airport",
            PlanError::ConfigurationMissing(_) => "configuration_missing",
        }
    }
}
