use crate::geo::{true_course, Coord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

const METERS_TO_FEET: f64 = 3.280_84;
const NM_TO_FEET: f64 = 6_076.12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum AirportType {
    Land,
    Seaplane,
    Heliport,
}

/// Runway surface family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum SurfaceType {
    /// Paved: asphalt, concrete, transparent.
    Hard,
    /// Unpaved: turf, dirt, gravel, lakebed, snow/ice.
    Soft,
    Water,
}

impl SurfaceType {
    /// Maps an apt.dat surface code to its family.
    pub fn from_apt_code(code: u32) -> Self {
        match code {
            1 | 2 | 15 | 20..=38 | 50..=57 => SurfaceType::Hard,
            13 => SurfaceType::Water,
            _ => SurfaceType::Soft,
        }
    }

    pub fn is_paved(&self) -> bool {
        matches!(self, SurfaceType::Hard)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runway {
    /// Designator pair, e.g. "09/27".
    pub name: String,
    pub length_ft: u32,
    pub width_ft: u32,
    pub surface: SurfaceType,
    pub lighted: bool,
    /// True heading of the first-named end.
    pub heading: f64,
}

impl Runway {
    /// Both landing directions of the runway.
    pub fn headings(&self) -> [f64; 2] {
        [self.heading, (self.heading + 180.0) % 360.0]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub code: String,
    pub name: String,
    pub airport_type: AirportType,
    pub coord: Coord,
    pub elevation_ft: i32,
    pub runways: Vec<Runway>,
    /// Fuel grades on the field (facilities overlay).
    #[serde(default)]
    pub fuel_types: Vec<String>,
    /// At least one published instrument approach (facilities overlay).
    #[serde(default)]
    pub instrument_approach: bool,
}

impl Airport {
    pub fn has_fuel(&self, fuel: &str) -> bool {
        self.fuel_types.iter().any(|f| f.eq_ignore_ascii_case(fuel))
    }
}

pub struct AptDatParser;

#[derive(Error, Debug)]
pub enum AptDatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
}

impl AptDatParser {
    /// Parses an apt.dat file and returns a list of airports.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Vec<Airport>, AptDatError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Self::parse(reader)
    }

    pub fn parse<R: BufRead>(mut reader: R) -> Result<Vec<Airport>, AptDatError> {
        let mut airports = Vec::with_capacity(1000);
        let mut line_buf = String::with_capacity(256);
        let mut current_airport: Option<AirportBuilder> = None;
        let mut saw_header = false;

        loop {
            line_buf.clear();
            let bytes_read = reader.read_line(&mut line_buf)?;
            if bytes_read == 0 {
                if let Some(builder) = current_airport.take() {
                    airports.extend(builder.build());
                }
                break;
            }

            let line = line_buf.trim();
            if line.is_empty() {
                continue;
            }

            let mut parts = line.split_whitespace();
            let code_str = match parts.next() {
                Some(s) => s,
                None => continue,
            };
            match code_str {
                "I" | "A" => saw_header = true,
                "1" | "16" | "17" => {
                    if let Some(builder) = current_airport.take() {
                        airports.extend(builder.build());
                    }

                    let apt_type = match code_str {
                        "16" => AirportType::Seaplane,
                        "17" => AirportType::Heliport,
                        _ => AirportType::Land,
                    };

                    current_airport = parse_airport_header(line, apt_type);
                }
                "100" => {
                    if let Some(ref mut builder) = current_airport {
                        parse_runway(line, builder);
                    }
                }
                "101" => {
                    if let Some(ref mut builder) = current_airport {
                        parse_water_runway(line, builder);
                    }
                }
                "102" => {
                    if let Some(ref mut builder) = current_airport {
                        parse_helipad(line, builder);
                    }
                }
                "1302" => {
                    if let Some(ref mut builder) = current_airport {
                        parse_metadata(line, builder);
                    }
                }
                "99" => {
                    if let Some(builder) = current_airport.take() {
                        airports.extend(builder.build());
                    }
                    break;
                }
                _ => {}
            }
        }

        if !saw_header && airports.is_empty() {
            return Err(AptDatError::Parse(
                "missing apt.dat header and no airport records".to_string(),
            ));
        }

        Ok(airports)
    }
}

struct AirportBuilder {
    code: String,
    name: String,
    airport_type: AirportType,
    elevation_ft: i32,
    lats: Vec<f64>,
    lons: Vec<f64>,
    datum: (Option<f64>, Option<f64>),
    runways: Vec<Runway>,
}

impl AirportBuilder {
    fn build(self) -> Option<Airport> {
        let coord = if !self.lats.is_empty() {
            let avg_lat: f64 = self.lats.iter().sum::<f64>() / self.lats.len() as f64;
            let avg_lon: f64 = self.lons.iter().sum::<f64>() / self.lons.len() as f64;
            Coord::new(avg_lat, avg_lon)
        } else if let (Some(lat), Some(lon)) = self.datum {
            Coord::new(lat, lon)
        } else {
            log::debug!("Skipping airport without coordinates — code={}", self.code);
            return None;
        };

        Some(Airport {
            code: self.code,
            name: self.name,
            airport_type: self.airport_type,
            coord,
            elevation_ft: self.elevation_ft,
            runways: self.runways,
            fuel_types: Vec::new(),
            instrument_approach: false,
        })
    }

    fn push_point(&mut self, point: Coord) {
        self.lats.push(point.lat);
        self.lons.push(point.lon);
    }
}

fn parse_airport_header(line: &str, apt_type: AirportType) -> Option<AirportBuilder> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return None;
    }

    Some(AirportBuilder {
        code: parts[4].to_uppercase(),
        name: parts[5..].join(" "),
        airport_type: apt_type,
        elevation_ft: parts[1].parse::<f64>().map(|e| e.round() as i32).unwrap_or(0),
        lats: Vec::with_capacity(4),
        lons: Vec::with_capacity(4),
        datum: (None, None),
        runways: Vec::new(),
    })
}

fn parse_point(lat: Option<&&str>, lon: Option<&&str>) -> Option<Coord> {
    let lat = lat?.parse::<f64>().ok()?;
    let lon = lon?.parse::<f64>().ok()?;
    Some(Coord::new(lat, lon))
}

fn parse_runway(line: &str, builder: &mut AirportBuilder) {
    // 0:100 1:width(m) 2:surface 3:shoulder 4:smooth 5:centerline 6:edge 7:signs
    // 8:rwy1 9:lat 10:lon 11-16:end details 17:rwy2 18:lat 19:lon
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 20 {
        return;
    }

    let end1 = parse_point(parts.get(9), parts.get(10));
    let end2 = parse_point(parts.get(18), parts.get(19));
    if let Some(p) = end1 {
        builder.push_point(p);
    }
    if let Some(p) = end2 {
        builder.push_point(p);
    }

    let (Some(end1), Some(end2)) = (end1, end2) else {
        return;
    };

    let width_m = parts[1].parse::<f64>().unwrap_or(0.0);
    let surface = SurfaceType::from_apt_code(parts[2].parse::<u32>().unwrap_or(0));
    let centerline = parts[5] != "0";
    let edge = parts[6] != "0";

    builder.runways.push(Runway {
        name: format!("{}/{}", parts[8], parts[17]),
        length_ft: (end1.distance_nm(&end2) * NM_TO_FEET).round() as u32,
        width_ft: (width_m * METERS_TO_FEET).round() as u32,
        surface,
        lighted: centerline || edge,
        heading: true_course(&end1, &end2),
    });
}

fn parse_water_runway(line: &str, builder: &mut AirportBuilder) {
    // 0:101 1:width(m) 2:buoys 3:end1 4:lat 5:lon 6:end2 7:lat 8:lon
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 9 {
        return;
    }
    let (Some(end1), Some(end2)) = (
        parse_point(parts.get(4), parts.get(5)),
        parse_point(parts.get(7), parts.get(8)),
    ) else {
        return;
    };
    builder.push_point(end1);
    builder.push_point(end2);

    let width_m = parts[1].parse::<f64>().unwrap_or(0.0);
    builder.runways.push(Runway {
        name: format!("{}/{}", parts[3], parts[6]),
        length_ft: (end1.distance_nm(&end2) * NM_TO_FEET).round() as u32,
        width_ft: (width_m * METERS_TO_FEET).round() as u32,
        surface: SurfaceType::Water,
        lighted: false,
        heading: true_course(&end1, &end2),
    });
}

fn parse_helipad(line: &str, builder: &mut AirportBuilder) {
    let parts: Vec<&str> = line.split_whitespace().collect();
    // 0:102 1:designator 2:lat 3:lon
    if let Some(p) = parse_point(parts.get(2), parts.get(3)) {
        builder.push_point(p);
    }
}

fn parse_metadata(line: &str, builder: &mut AirportBuilder) {
    let mut parts = line.split_whitespace();
    parts.next(); // 1302
    match (parts.next(), parts.next()) {
        (Some("datum_lat"), Some(v)) => builder.datum.0 = v.parse().ok(),
        (Some("datum_lon"), Some(v)) => builder.datum.1 = v.parse().ok(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_airports() {
        let data = "\
I
1000 Version
1 20 0 0 KBOS General Edward Lawrence Logan Intl
100 60.96 1 2 0.25 1 3 0 09 42.35824967 -071.01833215 0 0 3 0 1 1 27 42.36533800 -070.99120668 0 0 3 0 1 1
16 0 0 0 W01 fake seaplane base
101 30.00 0 09W 42.10000000 -071.10000000 27W 42.10000000 -071.08000000
17 50 0 0 H123 fake heliport
102 H1 42.000000 -71.000000 0 0 0 0 0 0 0 0 0 0
1 1200 0 0 X09 Grass Field
1302 datum_lat 40.100000
1302 datum_lon -100.200000
99
";
        let cursor = Cursor::new(data);
        let airports = AptDatParser::parse(cursor).unwrap();

        assert_eq!(airports.len(), 4);

        let kbos = &airports[0];
        assert_eq!(kbos.code, "KBOS");
        assert_eq!(kbos.elevation_ft, 20);
        assert!(kbos.coord.lat > 42.3);
        assert_eq!(kbos.runways.len(), 1);
        let rwy = &kbos.runways[0];
        assert_eq!(rwy.name, "09/27");
        assert_eq!(rwy.width_ft, 200);
        assert_eq!(rwy.surface, SurfaceType::Hard);
        assert!(rwy.lighted);
        // Threshold-to-threshold distance from the fixture coordinates (~1.28 nm)
        assert!(rwy.length_ft > 7_500 && rwy.length_ft < 8_000, "{}", rwy.length_ft);
        assert!((rwy.heading - 70.0).abs() < 5.0, "{}", rwy.heading);

        let w01 = &airports[1];
        assert_eq!(w01.airport_type, AirportType::Seaplane);
        assert_eq!(w01.runways[0].surface, SurfaceType::Water);

        let h123 = &airports[2];
        assert_eq!(h123.code, "H123");
        assert_eq!(h123.coord.lat, 42.0);
        assert!(h123.runways.is_empty());

        let grass = &airports[3];
        assert_eq!(grass.coord, Coord::new(40.1, -100.2));
        assert_eq!(grass.elevation_ft, 1200);
    }

    #[test]
    fn test_surface_codes() {
        assert_eq!(SurfaceType::from_apt_code(1), SurfaceType::Hard);
        assert_eq!(SurfaceType::from_apt_code(2), SurfaceType::Hard);
        assert_eq!(SurfaceType::from_apt_code(3), SurfaceType::Soft);
        assert_eq!(SurfaceType::from_apt_code(5), SurfaceType::Soft);
        assert_eq!(SurfaceType::from_apt_code(13), SurfaceType::Water);
        assert_eq!(SurfaceType::from_apt_code(22), SurfaceType::Hard);
        assert!(SurfaceType::from_apt_code(55).is_paved());
    }

    #[test]
    fn test_garbage_is_error() {
        let cursor = Cursor::new("hello world\n");
        assert!(AptDatParser::parse(cursor).is_err());
    }
}
