//! Airport reference data: lookup by code and nearby search.

use crate::apt_dat::{Airport, AptDatParser, SurfaceType};
use crate::geo::Coord;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyAirport {
    pub code: String,
    pub name: String,
    pub distance_nm: f64,
}

/// Pre-filter applied by [`AirportDirectory::search`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub min_runway_length_ft: u32,
    /// Empty accepts any surface.
    pub surfaces: Vec<SurfaceType>,
}

impl SearchFilter {
    pub fn accepts(&self, airport: &Airport) -> bool {
        if self.min_runway_length_ft == 0 && self.surfaces.is_empty() {
            return true;
        }
        airport.runways.iter().any(|r| {
            r.length_ft >= self.min_runway_length_ft
                && (self.surfaces.is_empty() || self.surfaces.contains(&r.surface))
        })
    }
}

#[async_trait]
pub trait AirportDirectory: Send + Sync {
    async fn get(&self, code: &str) -> Option<Airport>;

    /// Airports within `radius_nm` of `center`, nearest first.
    async fn search(
        &self,
        center: Coord,
        radius_nm: f64,
        filter: &SearchFilter,
    ) -> Vec<NearbyAirport>;
}

/// In-memory directory built from apt.dat plus a facilities overlay.
#[derive(Debug, Clone, Default)]
pub struct AirportIndex {
    airports: HashMap<String, Airport>,
}

#[derive(Debug, Deserialize)]
struct FacilityRecord {
    code: String,
    #[serde(default)]
    fuel: String,
    #[serde(default)]
    approaches: String,
}

impl AirportIndex {
    pub fn new(airports: Vec<Airport>) -> Self {
        let airports = airports
            .into_iter()
            .map(|a| (a.code.to_uppercase(), a))
            .collect();
        Self { airports }
    }

    pub fn from_apt_dat<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let airports = AptDatParser::parse_file(path)
            .with_context(|| format!("Failed to load apt.dat {}", path.display()))?;
        info!(
            "Loaded airport reference data — path={} airports={}",
            path.display(),
            airports.len()
        );
        Ok(Self::new(airports))
    }

    pub fn len(&self) -> usize {
        self.airports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.airports.is_empty()
    }

    pub fn load_facilities<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open facilities file {}", path.display()))?;
        let merged = self
            .apply_facilities(file)
            .with_context(|| format!("Failed to parse facilities file {}", path.display()))?;
        info!(
            "Merged airport facilities — path={} merged={}",
            path.display(),
            merged
        );
        Ok(merged)
    }

    /// Merges `code,fuel,approaches` rows; fuel grades are `;`-separated.
    pub fn apply_facilities<R: Read>(&mut self, reader: R) -> Result<usize, csv::Error> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut merged = 0;
        for record in rdr.deserialize::<FacilityRecord>() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping malformed facilities row: {}", e);
                    continue;
                }
            };
            let Some(airport) = self.airports.get_mut(&record.code.to_uppercase()) else {
                debug!("Facilities row for unknown airport — code={}", record.code);
                continue;
            };
            airport.fuel_types = record
                .fuel
                .split(';')
                .map(|f| f.trim().to_uppercase())
                .filter(|f| !f.is_empty())
                .collect();
            airport.instrument_approach = parse_flag(&record.approaches);
            merged += 1;
        }
        Ok(merged)
    }
}

fn parse_flag(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    match v.as_str() {
        "y" | "yes" | "true" => true,
        _ => v.parse::<u32>().map(|n| n > 0).unwrap_or(false),
    }
}

#[async_trait]
impl AirportDirectory for AirportIndex {
    async fn get(&self, code: &str) -> Option<Airport> {
        self.airports.get(&code.trim().to_uppercase()).cloned()
    }

    async fn search(
        &self,
        center: Coord,
        radius_nm: f64,
        filter: &SearchFilter,
    ) -> Vec<NearbyAirport> {
        let mut found: Vec<NearbyAirport> = self
            .airports
            .values()
            .filter(|a| filter.accepts(a))
            .filter_map(|a| {
                let distance_nm = center.distance_nm(&a.coord);
                (distance_nm <= radius_nm).then(|| NearbyAirport {
                    code: a.code.clone(),
                    name: a.name.clone(),
                    distance_nm,
                })
            })
            .collect();

        found.sort_by(|a, b| {
            a.distance_nm
                .total_cmp(&b.distance_nm)
                .then_with(|| a.code.cmp(&b.code))
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apt_dat::{AirportType, Runway};

    fn airport(code: &str, lat: f64, lon: f64, len: u32, surface: SurfaceType) -> Airport {
        Airport {
            code: code.to_string(),
            name: format!("{} Field", code),
            airport_type: AirportType::Land,
            coord: Coord::new(lat, lon),
            elevation_ft: 100,
            runways: vec![Runway {
                name: "18/36".to_string(),
                length_ft: len,
                width_ft: 75,
                surface,
                lighted: true,
                heading: 180.0,
            }],
            fuel_types: Vec::new(),
            instrument_approach: false,
        }
    }

    #[tokio::test]
    async fn test_search_sorted_and_filtered() {
        let index = AirportIndex::new(vec![
            airport("KFAR", 40.5, -75.0, 5000, SurfaceType::Hard),
            airport("KNEA", 40.1, -75.0, 5000, SurfaceType::Hard),
            airport("KGRS", 40.2, -75.0, 5000, SurfaceType::Soft),
            airport("KSHT", 40.05, -75.0, 1800, SurfaceType::Hard),
            airport("KWAY", 45.0, -75.0, 9000, SurfaceType::Hard),
        ]);
        let filter = SearchFilter {
            min_runway_length_ft: 3000,
            surfaces: vec![SurfaceType::Hard],
        };
        let found = index.search(Coord::new(40.0, -75.0), 50.0, &filter).await;
        let codes: Vec<&str> = found.iter().map(|n| n.code.as_str()).collect();
        assert_eq!(codes, vec!["KNEA", "KFAR"]);
        assert!(found[0].distance_nm < found[1].distance_nm);

        let all = index
            .search(Coord::new(40.0, -75.0), 50.0, &SearchFilter::default())
            .await;
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_facilities_overlay() {
        let mut index = AirportIndex::new(vec![
            airport("KAAA", 40.0, -75.0, 5000, SurfaceType::Hard),
            airport("KBBB", 41.0, -75.0, 5000, SurfaceType::Hard),
        ]);
        let csv = "code,fuel,approaches\nkaaa,Jet-A;100LL,3\nKBBB,100LL,no\nKZZZ,JET-A,1\n";
        let merged = index.apply_facilities(csv.as_bytes()).unwrap();
        assert_eq!(merged, 2);

        let a = index.get("KAAA").await.unwrap();
        assert!(a.has_fuel("jet-a"));
        assert!(a.has_fuel("100LL"));
        assert!(a.instrument_approach);

        let b = index.get("kbbb").await.unwrap();
        assert!(!b.has_fuel("JET-A"));
        assert!(!b.instrument_approach);

        assert!(index.get("KZZZ").await.is_none());
    }
}
