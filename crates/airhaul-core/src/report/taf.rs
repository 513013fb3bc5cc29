use super::groups::{
    classify, is_station, parse_from_group, parse_issue_time, parse_validity, ConditionsBuilder,
};
use super::{
    Conditions, ForecastPeriod, PeriodKind, ReportKind, ValidityWindow, WeatherReport, ZuluTime,
};
use log::debug;

struct Section {
    kind: PeriodKind,
    start: ZuluTime,
    builder: ConditionsBuilder,
}

fn is_change_group(token: &str) -> bool {
    matches!(token, "TEMPO" | "BECMG" | "INTER")
        || (token.len() == 6
            && token.starts_with("PROB")
            && token[4..].chars().all(|c| c.is_ascii_digit()))
}

/// Parses a forecast into a base period plus one period per `FM` group.
///
/// Each `FM` period starts from the conditions of the period before it and
/// overrides only what it restates. `TEMPO`, `BECMG` and `PROBnn` groups
/// describe transient or gradual changes and are skipped up to the next `FM`.
/// Returns `None` without a station identifier and a `DDHH/DDHH` validity.
pub fn parse_taf(raw: &str) -> Option<WeatherReport> {
    let text = raw.trim().trim_end_matches('=').to_uppercase();
    let tokens: Vec<&str> = text.split_whitespace().collect();

    let mut idx = 0;
    while tokens
        .get(idx)
        .is_some_and(|t| matches!(*t, "TAF" | "AMD" | "COR"))
    {
        idx += 1;
    }

    let station = tokens.get(idx).copied().filter(|t| is_station(t))?;
    idx += 1;
    let issued = tokens.get(idx).and_then(|t| parse_issue_time(t));
    if issued.is_some() {
        idx += 1;
    }
    let (valid_from, valid_to) = tokens.get(idx).and_then(|t| parse_validity(t))?;
    idx += 1;

    let mut sections = vec![Section {
        kind: PeriodKind::Base,
        start: valid_from,
        builder: ConditionsBuilder::default(),
    }];
    let mut skipping = false;

    for token in &tokens[idx..] {
        if *token == "RMK" {
            break;
        }
        if let Some(start) = parse_from_group(token) {
            sections.push(Section {
                kind: PeriodKind::From,
                start,
                builder: ConditionsBuilder::default(),
            });
            skipping = false;
            continue;
        }
        if is_change_group(token) {
            skipping = true;
            continue;
        }
        if skipping {
            continue;
        }
        if let Some(section) = sections.last_mut() {
            section.builder.apply(classify(token));
        }
    }

    let starts: Vec<ZuluTime> = sections.iter().map(|s| s.start).collect();
    let mut periods: Vec<ForecastPeriod> = Vec::with_capacity(sections.len());
    for (i, section) in sections.into_iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(valid_to);
        let conditions = match periods.last() {
            Some(previous) => section.builder.build_on(&previous.conditions),
            None => section.builder.build_on(&Conditions::default()),
        };
        periods.push(ForecastPeriod {
            kind: section.kind,
            window: ValidityWindow {
                from: section.start,
                to: end,
            },
            conditions,
        });
    }

    debug!(
        "Parsed forecast — station={} periods={}",
        station,
        periods.len()
    );

    let base = periods
        .first()
        .map(|p| p.conditions.clone())
        .unwrap_or_default();

    Some(WeatherReport {
        kind: ReportKind::Forecast,
        station: station.to_string(),
        raw: raw.trim().to_string(),
        issued,
        validity: Some(ValidityWindow {
            from: valid_from,
            to: valid_to,
        }),
        conditions: base,
        temperature_c: None,
        dewpoint_c: None,
        altimeter_inhg: None,
        periods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{FlightCategory, WindDirection};
    use chrono::{TimeZone, Utc};

    const KBOS_TAF: &str = "TAF KBOS 181730Z 1818/1918 28012G22KT P6SM BKN050 \
        FM190200 31008KT OVC015";

    #[test]
    fn test_from_period_overrides_and_inherits() {
        let taf = parse_taf(KBOS_TAF).unwrap();
        assert_eq!(taf.periods.len(), 2);
        assert_eq!(taf.periods[0].kind, PeriodKind::Base);
        assert_eq!(taf.periods[1].kind, PeriodKind::From);

        let inside_from = Utc.with_ymd_and_hms(2026, 10, 19, 3, 0, 0).unwrap();
        let period = taf.period_at(inside_from).unwrap();
        assert_eq!(period.kind, PeriodKind::From);
        let c = &period.conditions;
        assert_eq!(c.wind.direction, WindDirection::Degrees(310));
        assert_eq!(c.wind.speed_kt, 8);
        assert_eq!(c.wind.gust_kt, None);
        assert_eq!(c.ceiling_ft, Some(1_500));
        // Visibility was not restated, so it carries over from the base period.
        assert_eq!(c.visibility_sm, 6.0);
        assert_eq!(c.flight_category, FlightCategory::Mvfr);

        let inside_base = Utc.with_ymd_and_hms(2026, 10, 18, 20, 0, 0).unwrap();
        let base = taf.conditions_at(Some(inside_base));
        assert_eq!(base.wind.gust_kt, Some(22));
        assert_eq!(base.ceiling_ft, Some(5_000));
    }

    #[test]
    fn test_target_outside_windows_uses_latest_period() {
        let taf = parse_taf(KBOS_TAF).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 10, 20, 12, 0, 0).unwrap();
        assert_eq!(taf.period_at(later).unwrap().kind, PeriodKind::From);
    }

    #[test]
    fn test_change_groups_are_skipped() {
        let taf = parse_taf(
            "TAF AMD KORD 181740Z 1818/1924 18010KT P6SM SCT040 \
             TEMPO 1820/1824 2SM TSRA BKN020CB \
             PROB30 1902/1906 1SM +TSRA \
             FM191000 20012KT 5SM -RA BKN025 \
             FM191800 22008KT P6SM NSW SKC",
        )
        .unwrap();
        assert_eq!(taf.periods.len(), 3);

        let base = &taf.periods[0].conditions;
        assert!(base.phenomena.is_empty());
        assert_eq!(base.visibility_sm, 6.0);
        assert_eq!(base.ceiling_ft, None);

        let rain = &taf.periods[1].conditions;
        assert_eq!(rain.ceiling_ft, Some(2_500));
        assert_eq!(rain.phenomena.len(), 1);

        let clearing = &taf.periods[2].conditions;
        assert!(clearing.phenomena.is_empty());
        assert_eq!(clearing.ceiling_ft, None);
        assert_eq!(taf.periods[2].window.to, ZuluTime::new(19, 24, 0));
    }

    #[test]
    fn test_rejects_without_validity() {
        assert!(parse_taf("TAF KBOS 181730Z 28012KT P6SM").is_none());
        assert!(parse_taf("TAF 1818/1918 28012KT").is_none());
        assert!(parse_taf("").is_none());
    }

    #[test]
    fn test_parse_is_idempotent() {
        assert_eq!(parse_taf(KBOS_TAF), parse_taf(KBOS_TAF));
    }
}
