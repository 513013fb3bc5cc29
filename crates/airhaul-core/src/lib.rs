// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Transport trip planning: airport qualification at both ends of a trip,
//! weather-aware flight timing, ground legs and duration bounds.

pub mod apt_dat;
pub mod config;
pub mod directory;
pub mod error;
pub mod flight_time;
pub mod geo;
pub mod ground;
pub mod qualify;
pub mod report;
pub mod scenario;
pub mod trip;
pub mod weather;
pub mod winds;

pub use config::PlannerConfig;
pub use directory::{AirportDirectory, AirportIndex};
pub use error::PlanError;
pub use trip::{Location, TripPlan, TripPlanner, TripRequest};
