//! Weather acquisition: current conditions and forecasts for an airport with a
//! fallback chain of report sources.

use crate::apt_dat::Airport;
use crate::geo::Coord;
use crate::report::{parse_metar, parse_taf, WeatherReport};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upstream returned status {0}")]
    Status(u16),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

/// A provider of raw report text. `Ok(None)` means the provider answered but
/// had nothing for the station.
#[async_trait]
pub trait ReportSource: Send + Sync {
    fn name(&self) -> &str;

    async fn current(&self, station: &str) -> Result<Option<String>, SourceError>;

    async fn forecast(&self, station: &str) -> Result<Option<String>, SourceError>;

    /// Raw current reports from stations within `radius_nm`, nearest first.
    async fn nearby_current(
        &self,
        _center: Coord,
        _radius_nm: f64,
    ) -> Result<Vec<String>, SourceError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    Json,
    Raw,
}

/// Client for the aviationweather.gov data API.
pub struct AviationWeatherClient {
    http: reqwest::Client,
    base_url: String,
    format: ApiFormat,
}

#[derive(Debug, Deserialize)]
struct MetarJson {
    #[serde(rename = "rawOb")]
    raw_ob: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TafJson {
    #[serde(rename = "rawTAF")]
    raw_taf: Option<String>,
}

impl AviationWeatherClient {
    pub fn new(base_url: &str, format: ApiFormat, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            format,
        }
    }

    fn format_param(&self) -> &'static str {
        match self.format {
            ApiFormat::Json => "json",
            ApiFormat::Raw => "raw",
        }
    }

    async fn get(&self, product: &str, query: &[(&str, String)]) -> Result<String, SourceError> {
        let mut url = format!("{}/{}?format={}", self.base_url, product, self.format_param());
        for (key, value) in query {
            url.push_str(&format!("&{}={}", key, value));
        }
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        // The API answers 204 when a station has nothing on file.
        if status.as_u16() == 204 {
            return Ok(String::new());
        }
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }

    async fn fetch_product(&self, product: &str, station: &str) -> Result<Option<String>, SourceError> {
        let body = self.get(product, &[("ids", station.to_string())]).await?;
        let body = body.trim();
        if body.is_empty() {
            return Ok(None);
        }
        let raw = match self.format {
            ApiFormat::Raw => body.lines().next().map(|l| l.trim().to_string()),
            ApiFormat::Json if product == "taf" => serde_json::from_str::<Vec<TafJson>>(body)
                .ok()
                .and_then(|rows| rows.into_iter().find_map(|r| r.raw_taf)),
            ApiFormat::Json => serde_json::from_str::<Vec<MetarJson>>(body)
                .ok()
                .and_then(|rows| rows.into_iter().find_map(|r| r.raw_ob)),
        };
        Ok(raw.filter(|r| !r.is_empty()))
    }
}

#[async_trait]
impl ReportSource for AviationWeatherClient {
    fn name(&self) -> &str {
        match self.format {
            ApiFormat::Json => "aviationweather-json",
            ApiFormat::Raw => "aviationweather-raw",
        }
    }

    async fn current(&self, station: &str) -> Result<Option<String>, SourceError> {
        self.fetch_product("metar", station).await
    }

    async fn forecast(&self, station: &str) -> Result<Option<String>, SourceError> {
        // Raw TAF text spans several lines; only the JSON form is used for forecasts.
        if self.format == ApiFormat::Raw {
            return Ok(None);
        }
        self.fetch_product("taf", station).await
    }

    async fn nearby_current(
        &self,
        center: Coord,
        radius_nm: f64,
    ) -> Result<Vec<String>, SourceError> {
        if self.format != ApiFormat::Json {
            return Ok(Vec::new());
        }
        let dlat = radius_nm / 60.0;
        let dlon = radius_nm / (60.0 * center.lat.to_radians().cos().max(0.01));
        let bbox = format!(
            "{:.3},{:.3},{:.3},{:.3}",
            center.lat - dlat,
            center.lon - dlon,
            center.lat + dlat,
            center.lon + dlon
        );
        let body = self.get("metar", &[("bbox", bbox)]).await?;
        let rows: Vec<MetarJson> = serde_json::from_str(body.trim()).unwrap_or_default();

        let mut located: Vec<(f64, String)> = rows
            .into_iter()
            .filter_map(|r| {
                let distance = center.distance_nm(&Coord::new(r.lat?, r.lon?));
                (distance <= radius_nm).then_some((distance, r.raw_ob?))
            })
            .collect();
        located.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(located.into_iter().map(|(_, raw)| raw).collect())
    }
}

/// Fixed in-memory reports, keyed by station code.
#[derive(Debug, Clone, Default)]
pub struct StaticReports {
    metars: HashMap<String, String>,
    tafs: HashMap<String, String>,
    locations: HashMap<String, Coord>,
}

impl StaticReports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metar(mut self, station: &str, raw: &str) -> Self {
        self.metars.insert(station.to_uppercase(), raw.to_string());
        self
    }

    pub fn with_taf(mut self, station: &str, raw: &str) -> Self {
        self.tafs.insert(station.to_uppercase(), raw.to_string());
        self
    }

    /// Makes the station's current report visible to radius searches.
    pub fn with_location(mut self, station: &str, coord: Coord) -> Self {
        self.locations.insert(station.to_uppercase(), coord);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.metars.is_empty() && self.tafs.is_empty()
    }
}

#[async_trait]
impl ReportSource for StaticReports {
    fn name(&self) -> &str {
        "static"
    }

    async fn current(&self, station: &str) -> Result<Option<String>, SourceError> {
        Ok(self.metars.get(&station.to_uppercase()).cloned())
    }

    async fn forecast(&self, station: &str) -> Result<Option<String>, SourceError> {
        Ok(self.tafs.get(&station.to_uppercase()).cloned())
    }

    async fn nearby_current(
        &self,
        center: Coord,
        radius_nm: f64,
    ) -> Result<Vec<String>, SourceError> {
        let mut located: Vec<(f64, &String, &String)> = self
            .locations
            .iter()
            .filter_map(|(code, coord)| {
                let distance = center.distance_nm(coord);
                let raw = self.metars.get(code)?;
                (distance <= radius_nm).then_some((distance, code, raw))
            })
            .collect();
        located.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        Ok(located.into_iter().map(|(_, _, raw)| raw.clone()).collect())
    }
}

/// Walks the source chain: each source by station code, then a radius search.
/// Every failure is logged and absorbed; callers only ever see `None`.
#[derive(Clone)]
pub struct WeatherEngine {
    sources: Vec<Arc<dyn ReportSource>>,
    timeout: Duration,
    radius_cap_nm: f64,
}

impl WeatherEngine {
    pub fn new(sources: Vec<Arc<dyn ReportSource>>, timeout: Duration, radius_cap_nm: f64) -> Self {
        Self {
            sources,
            timeout,
            radius_cap_nm,
        }
    }

    /// JSON API as primary, raw direct-station lookup as secondary.
    pub fn aviation_weather(base_url: &str, timeout: Duration, radius_cap_nm: f64) -> Self {
        let sources: Vec<Arc<dyn ReportSource>> = vec![
            Arc::new(AviationWeatherClient::new(base_url, ApiFormat::Json, timeout)),
            Arc::new(AviationWeatherClient::new(base_url, ApiFormat::Raw, timeout)),
        ];
        Self::new(sources, timeout, radius_cap_nm)
    }

    /// An engine with no sources; every lookup yields `None`.
    pub fn offline() -> Self {
        Self::new(Vec::new(), Duration::from_secs(1), 0.0)
    }

    async fn bounded<T, F>(&self, source: &str, what: &str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T, SourceError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("Weather source failed — source={} request={} error={}", source, what, e);
                None
            }
            Err(_) => {
                warn!(
                    "Weather source failed — source={} request={} error={}",
                    source,
                    what,
                    SourceError::Timeout(self.timeout)
                );
                None
            }
        }
    }

    /// Current conditions for `airport`, or `None` when every source fails.
    pub async fn fetch(&self, airport: &Airport) -> Option<WeatherReport> {
        let code = airport.code.as_str();
        for source in &self.sources {
            let raw = self
                .bounded(source.name(), "current", source.current(code))
                .await
                .flatten();
            if let Some(report) = raw.as_deref().and_then(parse_metar) {
                debug!("Current conditions — station={} source={}", code, source.name());
                return Some(report);
            }
        }

        if self.radius_cap_nm > 0.0 {
            for source in &self.sources {
                let nearby = self
                    .bounded(
                        source.name(),
                        "nearby",
                        source.nearby_current(airport.coord, self.radius_cap_nm),
                    )
                    .await
                    .unwrap_or_default();
                if let Some(report) = nearby.iter().find_map(|raw| parse_metar(raw)) {
                    info!(
                        "Using nearby station for current conditions — airport={} station={} source={}",
                        code,
                        report.station,
                        source.name()
                    );
                    return Some(report);
                }
            }
        }

        debug!("No current conditions available — station={}", code);
        None
    }

    /// Forecast for `airport`. When no source has one, current conditions
    /// stand in; the returned report's kind tells the two apart.
    pub async fn fetch_forecast(&self, airport: &Airport) -> Option<WeatherReport> {
        let code = airport.code.as_str();
        for source in &self.sources {
            let raw = self
                .bounded(source.name(), "forecast", source.forecast(code))
                .await
                .flatten();
            if let Some(report) = raw.as_deref().and_then(parse_taf) {
                debug!("Forecast — station={} source={} periods={}", code, source.name(), report.periods.len());
                return Some(report);
            }
        }

        let current = self.fetch(airport).await;
        if current.is_some() {
            info!("No forecast available; substituting current conditions — station={}", code);
        }
        current
    }
}
