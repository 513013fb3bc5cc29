use super::groups::{classify, is_station, parse_issue_time, ConditionsBuilder, Group};
use super::{Conditions, ReportKind, WeatherReport};
use log::debug;

/// Parses a current-conditions report.
///
/// Returns `None` unless the text carries a station identifier followed by a
/// `DDHHMMZ` observation time. Groups that are not understood are skipped;
/// a missing wind group means calm and missing visibility means 10 SM.
pub fn parse_metar(raw: &str) -> Option<WeatherReport> {
    let text = raw.trim().trim_end_matches('=').to_uppercase();
    let tokens: Vec<&str> = text.split_whitespace().collect();

    let mut idx = 0;
    while tokens
        .get(idx)
        .is_some_and(|t| matches!(*t, "METAR" | "SPECI"))
    {
        idx += 1;
    }

    let station = tokens.get(idx).copied().filter(|t| is_station(t))?;
    let issued = tokens.get(idx + 1).and_then(|t| parse_issue_time(t))?;

    let mut builder = ConditionsBuilder::default();
    let mut temperature_c = None;
    let mut dewpoint_c = None;
    let mut altimeter_inhg = None;

    for token in &tokens[idx + 2..] {
        match *token {
            "RMK" | "NOSIG" | "BECMG" | "TEMPO" => break,
            "NIL" => {
                debug!("Missing report — station={}", station);
                return None;
            }
            "AUTO" | "COR" => continue,
            _ => {}
        }
        match classify(token) {
            Group::TemperatureDewpoint(t, d) => {
                if temperature_c.is_none() {
                    temperature_c = Some(t);
                    dewpoint_c = d;
                }
            }
            Group::Altimeter(a) => {
                altimeter_inhg.get_or_insert(a);
            }
            group => builder.apply(group),
        }
    }

    Some(WeatherReport {
        kind: ReportKind::Current,
        station: station.to_string(),
        raw: raw.trim().to_string(),
        issued: Some(issued),
        validity: None,
        conditions: builder.build_on(&Conditions::default()),
        temperature_c,
        dewpoint_c,
        altimeter_inhg,
        periods: Vec::new(),
    })
}
