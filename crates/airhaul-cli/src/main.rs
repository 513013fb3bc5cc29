// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use airhaul_core::config::{FlightRules, PlannerConfig};
use airhaul_core::directory::AirportIndex;
use airhaul_core::ground::{FallbackRouter, OsrmRouter};
use airhaul_core::report::{parse_metar, parse_taf, WeatherReport};
use airhaul_core::trip::{Location, TripPlanner, TripRequest};
use airhaul_core::weather::{ApiFormat, AviationWeatherClient, ReportSource, StaticReports, WeatherEngine};
use airhaul_core::winds::AviationWeatherWinds;
use airhaul_core::PlanError;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Planner configuration (JSON)
    #[arg(short, long, env = "AIRHAUL_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// More log output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a trip and print it as JSON
    Plan(PlanArgs),
    /// Parse a METAR and print its conditions, category and delay
    Metar {
        /// Raw report text
        raw: String,
    },
    /// Parse a TAF and print the period in force
    Taf {
        /// Raw forecast text
        raw: String,
        /// Time to resolve (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[derive(clap::Args)]
struct PlanArgs {
    /// X-Plane apt.dat with airport reference data
    #[arg(long, env = "AIRHAUL_APT_DAT")]
    apt_dat: PathBuf,

    /// Facilities CSV (code,fuel,approaches)
    #[arg(long)]
    facilities: Option<PathBuf>,

    /// Home base airport code
    #[arg(long)]
    home: String,

    /// Pickup point as "lat,lon"
    #[arg(long)]
    pickup: String,

    #[arg(long, default_value = "Pickup")]
    pickup_label: String,

    /// Delivery point as "lat,lon"
    #[arg(long)]
    delivery: String,

    #[arg(long, default_value = "Delivery")]
    delivery_label: String,

    /// Departure time (RFC 3339); defaults to now
    #[arg(long)]
    depart: Option<DateTime<Utc>>,

    /// Use this pickup airport instead of searching
    #[arg(long)]
    pickup_airport: Option<String>,

    /// Use this delivery airport instead of searching
    #[arg(long)]
    delivery_airport: Option<String>,

    /// Plan under instrument flight rules
    #[arg(long)]
    ifr: bool,

    /// No network: synthetic winds, heuristic ground routes, static weather only
    #[arg(long)]
    offline: bool,

    /// File of METARs, one per line
    #[arg(long)]
    metar: Option<PathBuf>,

    /// File of TAFs separated by blank lines
    #[arg(long)]
    taf: Option<PathBuf>,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Info,
        (false, _) => LevelFilter::Debug,
    };
    let _ = TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    );
}

fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "airhaul", "airhaul")
        .map(|dirs| dirs.config_dir().join("config.json"))
}

fn load_config(explicit: Option<&Path>) -> Result<PlannerConfig> {
    if let Some(path) = explicit {
        return PlannerConfig::load(path);
    }
    match default_config_path() {
        Some(path) if path.exists() => {
            info!("Using config — path={}", path.display());
            PlannerConfig::load(&path)
        }
        _ => Ok(PlannerConfig::with_default_aircraft()),
    }
}

fn parse_point(value: &str) -> Result<(f64, f64)> {
    let (lat, lon) = value
        .split_once(',')
        .ok_or_else(|| anyhow!("expected \"lat,lon\", got {:?}", value))?;
    let lat: f64 = lat.trim().parse().with_context(|| format!("bad latitude in {:?}", value))?;
    let lon: f64 = lon.trim().parse().with_context(|| format!("bad longitude in {:?}", value))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        bail!("coordinate out of range: {}", value);
    }
    Ok((lat, lon))
}

fn load_static_reports(metar: Option<&Path>, taf: Option<&Path>) -> Result<StaticReports> {
    let mut reports = StaticReports::new();
    if let Some(path) = metar {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read METAR file {}", path.display()))?;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match parse_metar(line) {
                Some(report) => reports = reports.with_metar(&report.station, line),
                None => log::warn!("Skipping unparseable METAR — line={}", line),
            }
        }
    }
    if let Some(path) = taf {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read TAF file {}", path.display()))?;
        for block in text.split("\n\n") {
            let raw = block.split_whitespace().collect::<Vec<_>>().join(" ");
            if raw.is_empty() {
                continue;
            }
            match parse_taf(&raw) {
                Some(report) => reports = reports.with_taf(&report.station, &raw),
                None => log::warn!("Skipping unparseable TAF — text={}", raw),
            }
        }
    }
    Ok(reports)
}

fn build_planner(args: &PlanArgs, config: PlannerConfig) -> Result<TripPlanner> {
    let mut index = AirportIndex::from_apt_dat(&args.apt_dat)?;
    if let Some(path) = &args.facilities {
        index.load_facilities(path)?;
    }

    let timeout = config.fetch_timeout();
    let network = config.network.clone();
    let reports = load_static_reports(args.metar.as_deref(), args.taf.as_deref())?;

    let mut sources: Vec<Arc<dyn ReportSource>> = Vec::new();
    if !reports.is_empty() {
        sources.push(Arc::new(reports));
    }
    if !args.offline {
        sources.push(Arc::new(AviationWeatherClient::new(
            &network.weather_base_url,
            ApiFormat::Json,
            timeout,
        )));
        sources.push(Arc::new(AviationWeatherClient::new(
            &network.weather_base_url,
            ApiFormat::Raw,
            timeout,
        )));
    }
    let weather = WeatherEngine::new(sources, timeout, network.radius_search_cap_nm);

    let mut planner = TripPlanner::new(config, Arc::new(index)).with_weather(weather);
    if !args.offline {
        planner = planner
            .with_router(FallbackRouter::new(
                Some(Arc::new(OsrmRouter::new(&network.osrm_base_url, timeout))),
                timeout,
            ))
            .with_winds(Arc::new(AviationWeatherWinds::new(
                &network.weather_base_url,
                timeout,
            )));
    }
    Ok(planner)
}

async fn run_plan(args: PlanArgs, config: PlannerConfig) -> Result<()> {
    let (pickup_lat, pickup_lon) = parse_point(&args.pickup)?;
    let (delivery_lat, delivery_lon) = parse_point(&args.delivery)?;
    let request = TripRequest {
        home_base: args.home.to_uppercase(),
        pickup: Location::new(&args.pickup_label, pickup_lat, pickup_lon),
        delivery: Location::new(&args.delivery_label, delivery_lat, delivery_lon),
        departure_time: args.depart.unwrap_or_else(Utc::now),
        pickup_airport: args.pickup_airport.clone(),
        delivery_airport: args.delivery_airport.clone(),
        flight_rules: if args.ifr {
            FlightRules::Ifr
        } else {
            FlightRules::Vfr
        },
    };

    let planner = build_planner(&args, config)?;
    match planner.plan(&request).await {
        Ok(plan) => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
        Err(e) => {
            print_plan_error(&e)?;
            Err(e.into())
        }
    }
}

fn print_plan_error(error: &PlanError) -> Result<()> {
    let mut body = serde_json::json!({
        "error": error.kind(),
        "message": error.to_string(),
    });
    match error {
        PlanError::BlockingWeatherViolation {
            station,
            raw,
            wind_kt,
            gust_kt,
            crosswind_kt,
            limit_kt,
            ..
        } => {
            body["report"] = serde_json::json!({
                "station": station,
                "raw": raw,
                "wind_kt": wind_kt,
                "gust_kt": gust_kt,
                "crosswind_kt": crosswind_kt,
                "limit_kt": limit_kt,
            });
        }
        PlanError::NoViableAirport { end, rejected, .. } => {
            body["end"] = serde_json::to_value(end)?;
            body["rejected"] = serde_json::to_value(rejected)?;
        }
        _ => {}
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn print_report(report: &WeatherReport, at: Option<DateTime<Utc>>) -> Result<()> {
    let conditions = report.conditions_at(at);
    let body = serde_json::json!({
        "station": report.station,
        "kind": report.kind,
        "flight_category": conditions.flight_category.as_str(),
        "delay": conditions.delay(),
        "delay_minutes": conditions.delay().total(),
        "conditions": conditions,
        "report": report,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Plan(args) => {
            let config = load_config(cli.config.as_deref())?;
            run_plan(args, config).await
        }
        Commands::Metar { raw } => {
            let report = parse_metar(&raw).ok_or_else(|| anyhow!("Could not parse METAR: {}", raw))?;
            print_report(&report, None)
        }
        Commands::Taf { raw, at } => {
            let report = parse_taf(&raw).ok_or_else(|| anyhow!("Could not parse TAF: {}", raw))?;
            print_report(&report, Some(at.unwrap_or_else(Utc::now)))
        }
    }
}
