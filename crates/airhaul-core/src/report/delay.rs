//! Fixed delay table derived from reported conditions.

use super::{ConditionClass, Conditions, FlightCategory};
use serde::{Deserialize, Serialize};

/// Additive weather delay contributions, minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherDelay {
    pub category: f64,
    pub wind: f64,
    pub gust: f64,
    pub condition: f64,
}

impl WeatherDelay {
    pub fn for_conditions(conditions: &Conditions) -> Self {
        Self {
            category: category_delay(conditions.flight_category),
            wind: wind_delay(conditions.wind.speed_kt),
            gust: gust_delay(conditions.wind.gust_kt),
            condition: condition_delay(conditions),
        }
    }

    pub fn total(&self) -> f64 {
        self.category + self.wind + self.gust + self.condition
    }
}

pub fn category_delay(category: FlightCategory) -> f64 {
    match category {
        FlightCategory::Vfr => 0.0,
        FlightCategory::Mvfr => 5.0,
        FlightCategory::Ifr => 15.0,
        FlightCategory::Lifr => 30.0,
    }
}

pub fn wind_delay(speed_kt: u32) -> f64 {
    match speed_kt {
        s if s > 25 => 10.0,
        s if s > 15 => 5.0,
        _ => 0.0,
    }
}

pub fn gust_delay(gust_kt: Option<u32>) -> f64 {
    match gust_kt {
        Some(g) if g > 30 => 10.0,
        Some(g) if g > 20 => 5.0,
        _ => 0.0,
    }
}

/// Only the most severe condition class counts.
pub fn condition_delay(conditions: &Conditions) -> f64 {
    let classes: Vec<ConditionClass> = conditions.phenomena.iter().map(|p| p.class()).collect();
    if classes.contains(&ConditionClass::Thunderstorm) {
        20.0
    } else if classes.contains(&ConditionClass::SnowOrFreezing) {
        15.0
    } else if classes.contains(&ConditionClass::Rain) {
        5.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::parse_metar;

    #[test]
    fn test_clear_day_has_no_delay() {
        let report = parse_metar("KPHX 181953Z 09006KT 10SM CLR 35/02 A2990").unwrap();
        assert_eq!(report.conditions.delay().total(), 0.0);
    }

    #[test]
    fn test_contributions_add_up() {
        let report =
            parse_metar("KDEN 182012Z 31028G40KT 1/2SM +TSSN VV003 M01/M02 A2988").unwrap();
        let delay = report.conditions.delay();
        assert_eq!(delay.category, 30.0);
        assert_eq!(delay.wind, 10.0);
        assert_eq!(delay.gust, 10.0);
        assert_eq!(delay.condition, 20.0);
        assert_eq!(delay.total(), 70.0);
    }

    #[test]
    fn test_worse_category_never_delays_less() {
        let ordered = [
            FlightCategory::Lifr,
            FlightCategory::Ifr,
            FlightCategory::Mvfr,
            FlightCategory::Vfr,
        ];
        for pair in ordered.windows(2) {
            assert!(category_delay(pair[0]) > category_delay(pair[1]));
        }
    }

    #[test]
    fn test_condition_classes_do_not_stack() {
        let report = parse_metar("KBTV 181954Z 36008KT 3SM -RA -SN BR OVC020").unwrap();
        assert_eq!(report.conditions.delay().condition, 15.0);
        assert_eq!(gust_delay(Some(25)), 5.0);
        assert_eq!(wind_delay(16), 5.0);
        assert_eq!(wind_delay(15), 0.0);
    }
}
