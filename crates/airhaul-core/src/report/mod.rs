//! Fixed-format aviation weather reports: current conditions (METAR) and
//! forecasts (TAF).

pub mod delay;
mod groups;
pub mod metar;
pub mod taf;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub use delay::WeatherDelay;
pub use metar::parse_metar;
pub use taf::parse_taf;

/// Visibility assumed when a report omits it, statute miles.
pub const DEFAULT_VISIBILITY_SM: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindDirection {
    Degrees(u16),
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub direction: WindDirection,
    pub speed_kt: u32,
    pub gust_kt: Option<u32>,
    /// Extremes of a variable-direction group such as `200V250`.
    pub variable_range: Option<(u16, u16)>,
}

impl Wind {
    pub fn calm() -> Self {
        Self {
            direction: WindDirection::Degrees(0),
            speed_kt: 0,
            gust_kt: None,
            variable_range: None,
        }
    }

    pub fn is_calm(&self) -> bool {
        self.speed_kt == 0 && self.gust_kt.is_none()
    }

    /// Gust if reported, otherwise sustained speed.
    pub fn peak_kt(&self) -> u32 {
        self.gust_kt.unwrap_or(self.speed_kt).max(self.speed_kt)
    }
}

impl Default for Wind {
    fn default() -> Self {
        Self::calm()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkyCover {
    Few,
    Scattered,
    Broken,
    Overcast,
    /// Sky obscured; the base is the vertical visibility.
    VerticalVisibility,
}

impl SkyCover {
    pub fn forms_ceiling(&self) -> bool {
        matches!(
            self,
            SkyCover::Broken | SkyCover::Overcast | SkyCover::VerticalVisibility
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkyLayer {
    pub cover: SkyCover,
    pub base_ft: u32,
    pub convective: bool,
}

/// Four ordinal bands, worst first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FlightCategory {
    Lifr,
    Ifr,
    Mvfr,
    Vfr,
}

impl FlightCategory {
    pub fn from_conditions(visibility_sm: f64, ceiling_ft: Option<u32>) -> Self {
        let ceiling = ceiling_ft.unwrap_or(u32::MAX);
        if ceiling < 500 || visibility_sm < 1.0 {
            FlightCategory::Lifr
        } else if ceiling < 1_000 || visibility_sm < 3.0 {
            FlightCategory::Ifr
        } else if ceiling <= 3_000 || visibility_sm <= 5.0 {
            FlightCategory::Mvfr
        } else {
            FlightCategory::Vfr
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlightCategory::Lifr => "LIFR",
            FlightCategory::Ifr => "IFR",
            FlightCategory::Mvfr => "MVFR",
            FlightCategory::Vfr => "VFR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionClass {
    Thunderstorm,
    SnowOrFreezing,
    Rain,
    Obscuration,
    Other,
}

/// A present-weather group such as `-TSRA` or `BR`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherCondition {
    pub raw: String,
}

impl WeatherCondition {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
        }
    }

    pub fn class(&self) -> ConditionClass {
        let wx = self.raw.as_str();
        let has = |code: &str| wx.contains(code);
        if has("TS") || has("FC") || has("SQ") {
            ConditionClass::Thunderstorm
        } else if has("SN") || has("PL") || has("SG") || has("IC") || has("UP") || has("FZ") {
            ConditionClass::SnowOrFreezing
        } else if has("RA") || has("DZ") {
            ConditionClass::Rain
        } else if has("FG") || has("BR") || has("HZ") || has("FU") || has("DU") {
            ConditionClass::Obscuration
        } else {
            ConditionClass::Other
        }
    }
}

/// Conditions in force for a report or one forecast period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    pub wind: Wind,
    pub visibility_sm: f64,
    pub sky: Vec<SkyLayer>,
    pub ceiling_ft: Option<u32>,
    pub phenomena: Vec<WeatherCondition>,
    pub flight_category: FlightCategory,
}

impl Default for Conditions {
    fn default() -> Self {
        Self {
            wind: Wind::calm(),
            visibility_sm: DEFAULT_VISIBILITY_SM,
            sky: Vec::new(),
            ceiling_ft: None,
            phenomena: Vec::new(),
            flight_category: FlightCategory::Vfr,
        }
    }
}

impl Conditions {
    pub fn delay(&self) -> WeatherDelay {
        WeatherDelay::for_conditions(self)
    }
}

/// Lowest broken/overcast/obscured base, ignoring few and scattered layers.
pub fn ceiling_of(layers: &[SkyLayer]) -> Option<u32> {
    layers
        .iter()
        .filter(|l| l.cover.forms_ceiling())
        .map(|l| l.base_ft)
        .min()
}

/// Day-of-month/hour/minute stamp as written in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZuluTime {
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
}

impl ZuluTime {
    pub fn new(day: u8, hour: u8, minute: u8) -> Self {
        Self { day, hour, minute }
    }

    /// Places the stamp in whichever month puts it closest to `reference`.
    pub fn resolve_near(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let (year, month) = (reference.year(), reference.month());
        let months = [
            if month == 1 { (year - 1, 12) } else { (year, month - 1) },
            (year, month),
            if month == 12 { (year + 1, 1) } else { (year, month + 1) },
        ];

        months
            .iter()
            .filter_map(|&(y, m)| {
                let midnight = Utc
                    .with_ymd_and_hms(y, m, u32::from(self.day), 0, 0, 0)
                    .single()?;
                Some(
                    midnight
                        + Duration::hours(i64::from(self.hour))
                        + Duration::minutes(i64::from(self.minute)),
                )
            })
            .min_by_key(|candidate| (*candidate - reference).num_seconds().abs())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub from: ZuluTime,
    pub to: ZuluTime,
}

impl ValidityWindow {
    /// Concrete bounds near `reference`; `to` always falls after `from`.
    pub fn resolve_near(
        &self,
        reference: DateTime<Utc>,
    ) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let from = self.from.resolve_near(reference)?;
        let mut to = self.to.resolve_near(from)?;
        if to <= from {
            to = self.to.resolve_near(from + Duration::days(20))?;
        }
        Some((from, to))
    }

    pub fn contains(&self, target: DateTime<Utc>) -> bool {
        match self.resolve_near(target) {
            Some((from, to)) => from <= target && target < to,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportKind {
    Current,
    Forecast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeriodKind {
    Base,
    From,
}

/// A forecast period with every field resolved against the periods before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPeriod {
    pub kind: PeriodKind,
    pub window: ValidityWindow,
    pub conditions: Conditions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub kind: ReportKind,
    pub station: String,
    pub raw: String,
    pub issued: Option<ZuluTime>,
    pub validity: Option<ValidityWindow>,
    /// Observed conditions, or the base period of a forecast.
    pub conditions: Conditions,
    pub temperature_c: Option<i32>,
    pub dewpoint_c: Option<i32>,
    pub altimeter_inhg: Option<f64>,
    pub periods: Vec<ForecastPeriod>,
}

impl WeatherReport {
    pub fn is_forecast(&self) -> bool {
        self.kind == ReportKind::Forecast
    }

    /// The period whose window contains `target`, else the latest period.
    pub fn period_at(&self, target: DateTime<Utc>) -> Option<&ForecastPeriod> {
        self.periods
            .iter()
            .rev()
            .find(|p| p.window.contains(target))
            .or_else(|| self.periods.last())
    }

    /// Conditions in force at `target`; current reports ignore the time.
    pub fn conditions_at(&self, target: Option<DateTime<Utc>>) -> &Conditions {
        match target.and_then(|t| self.period_at(t)) {
            Some(period) => &period.conditions,
            None => &self.conditions,
        }
    }
}
