//! Token-level decoding shared by the METAR and TAF parsers.

use super::{
    ceiling_of, Conditions, FlightCategory, SkyCover, SkyLayer, WeatherCondition, Wind,
    WindDirection, ZuluTime, DEFAULT_VISIBILITY_SM,
};
use regex::Regex;
use std::sync::OnceLock;

const METRES_PER_STATUTE_MILE: f64 = 1_609.344;
const KT_PER_MPS: f64 = 1.943_84;
const KT_PER_KMH: f64 = 0.539_957;
const INHG_PER_HPA: f64 = 0.029_53;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Group {
    Wind(Wind),
    VariableRange(u16, u16),
    /// Bare whole number; the first half of a mixed visibility like `1 1/2SM`.
    WholeNumber(u32),
    Visibility(f64),
    Cavok,
    Layer(SkyLayer),
    ClearSky,
    Weather(WeatherCondition),
    NoSignificantWeather,
    TemperatureDewpoint(i32, Option<i32>),
    Altimeter(f64),
    Other,
}

pub(crate) fn is_station(token: &str) -> bool {
    static STATION_RE: OnceLock<Regex> = OnceLock::new();
    let re = STATION_RE.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9]{3}$").unwrap());
    re.is_match(token)
}

/// `DDHHMMZ`
pub(crate) fn parse_issue_time(token: &str) -> Option<ZuluTime> {
    static ISSUE_RE: OnceLock<Regex> = OnceLock::new();
    let re = ISSUE_RE.get_or_init(|| Regex::new(r"^(\d{2})(\d{2})(\d{2})Z$").unwrap());
    let caps = re.captures(token)?;
    zulu(&caps[1], &caps[2], &caps[3])
}

/// `DDHH/DDHH`
pub(crate) fn parse_validity(token: &str) -> Option<(ZuluTime, ZuluTime)> {
    static VALID_RE: OnceLock<Regex> = OnceLock::new();
    let re = VALID_RE.get_or_init(|| Regex::new(r"^(\d{2})(\d{2})/(\d{2})(\d{2})$").unwrap());
    let caps = re.captures(token)?;
    Some((
        zulu(&caps[1], &caps[2], "00")?,
        zulu(&caps[3], &caps[4], "00")?,
    ))
}

/// `FMDDHHMM`
pub(crate) fn parse_from_group(token: &str) -> Option<ZuluTime> {
    static FM_RE: OnceLock<Regex> = OnceLock::new();
    let re = FM_RE.get_or_init(|| Regex::new(r"^FM(\d{2})(\d{2})(\d{2})$").unwrap());
    let caps = re.captures(token)?;
    zulu(&caps[1], &caps[2], &caps[3])
}

fn zulu(day: &str, hour: &str, minute: &str) -> Option<ZuluTime> {
    let (day, hour, minute) = (
        day.parse::<u8>().ok()?,
        hour.parse::<u8>().ok()?,
        minute.parse::<u8>().ok()?,
    );
    // Hour 24 closes a validity window at midnight.
    if !(1..=31).contains(&day) || hour > 24 || minute > 59 || (hour == 24 && minute > 0) {
        return None;
    }
    Some(ZuluTime::new(day, hour, minute))
}

pub(crate) fn classify(token: &str) -> Group {
    static WIND_RE: OnceLock<Regex> = OnceLock::new();
    static VRANGE_RE: OnceLock<Regex> = OnceLock::new();
    static VIS_SM_RE: OnceLock<Regex> = OnceLock::new();
    static VIS_M_RE: OnceLock<Regex> = OnceLock::new();
    static SKY_RE: OnceLock<Regex> = OnceLock::new();
    static TEMP_RE: OnceLock<Regex> = OnceLock::new();
    static ALT_RE: OnceLock<Regex> = OnceLock::new();
    static WX_RE: OnceLock<Regex> = OnceLock::new();

    let wind_re = WIND_RE.get_or_init(|| {
        Regex::new(r"^(VRB|\d{3})(\d{2,3})(?:G(\d{2,3}))?(KT|MPS|KMH)$").unwrap()
    });
    if let Some(caps) = wind_re.captures(token) {
        let factor = match &caps[4] {
            "MPS" => KT_PER_MPS,
            "KMH" => KT_PER_KMH,
            _ => 1.0,
        };
        let to_kt = |s: &str| {
            s.parse::<u32>()
                .ok()
                .map(|v| (f64::from(v) * factor).round() as u32)
        };
        let speed_kt = to_kt(&caps[2]).unwrap_or(0);
        let gust_kt = caps.get(3).and_then(|g| to_kt(g.as_str()));
        let direction = match &caps[1] {
            "VRB" => WindDirection::Variable,
            deg => WindDirection::Degrees(deg.parse::<u16>().unwrap_or(0) % 360),
        };
        if speed_kt == 0 && gust_kt.is_none() {
            return Group::Wind(Wind::calm());
        }
        return Group::Wind(Wind {
            direction,
            speed_kt,
            gust_kt,
            variable_range: None,
        });
    }

    let vrange_re = VRANGE_RE.get_or_init(|| Regex::new(r"^(\d{3})V(\d{3})$").unwrap());
    if let Some(caps) = vrange_re.captures(token) {
        if let (Ok(a), Ok(b)) = (caps[1].parse::<u16>(), caps[2].parse::<u16>()) {
            return Group::VariableRange(a, b);
        }
    }

    if token == "CAVOK" {
        return Group::Cavok;
    }

    if token.len() <= 2 && token.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = token.parse::<u32>() {
            return Group::WholeNumber(n);
        }
    }

    let vis_sm_re = VIS_SM_RE
        .get_or_init(|| Regex::new(r"^([PM])?(?:(\d{1,2})|(\d{1,2})/(\d{1,2}))SM$").unwrap());
    if let Some(caps) = vis_sm_re.captures(token) {
        let value = if let Some(whole) = caps.get(2) {
            whole.as_str().parse::<f64>().ok()
        } else {
            match (caps[3].parse::<f64>(), caps[4].parse::<f64>()) {
                (Ok(n), Ok(d)) if d > 0.0 => Some(n / d),
                _ => None,
            }
        };
        if let Some(v) = value {
            return Group::Visibility(v);
        }
    }

    let vis_m_re = VIS_M_RE.get_or_init(|| Regex::new(r"^(\d{4})(?:NDV)?$").unwrap());
    if let Some(caps) = vis_m_re.captures(token) {
        if let Ok(metres) = caps[1].parse::<f64>() {
            let sm = if metres >= 9_999.0 {
                DEFAULT_VISIBILITY_SM
            } else {
                (metres / METRES_PER_STATUTE_MILE).min(DEFAULT_VISIBILITY_SM)
            };
            return Group::Visibility(sm);
        }
    }

    if matches!(token, "SKC" | "CLR" | "NSC" | "NCD") {
        return Group::ClearSky;
    }

    let sky_re = SKY_RE
        .get_or_init(|| Regex::new(r"^(FEW|SCT|BKN|OVC|VV)(\d{3}|///)(CB|TCU|///)?$").unwrap());
    if let Some(caps) = sky_re.captures(token) {
        let cover = match &caps[1] {
            "FEW" => SkyCover::Few,
            "SCT" => SkyCover::Scattered,
            "BKN" => SkyCover::Broken,
            "OVC" => SkyCover::Overcast,
            _ => SkyCover::VerticalVisibility,
        };
        return match caps[2].parse::<u32>() {
            Ok(hundreds) => Group::Layer(SkyLayer {
                cover,
                base_ft: hundreds * 100,
                convective: matches!(caps.get(3).map(|m| m.as_str()), Some("CB" | "TCU")),
            }),
            Err(_) => Group::Other,
        };
    }

    if token == "NSW" {
        return Group::NoSignificantWeather;
    }

    let temp_re = TEMP_RE.get_or_init(|| Regex::new(r"^(M?\d{2})/(M?\d{2})?$").unwrap());
    if let Some(caps) = temp_re.captures(token) {
        let signed = |s: &str| match s.strip_prefix('M') {
            Some(rest) => rest.parse::<i32>().ok().map(|v| -v),
            None => s.parse::<i32>().ok(),
        };
        if let Some(t) = signed(&caps[1]) {
            return Group::TemperatureDewpoint(t, caps.get(2).and_then(|d| signed(d.as_str())));
        }
    }

    let alt_re = ALT_RE.get_or_init(|| Regex::new(r"^([AQ])(\d{4})$").unwrap());
    if let Some(caps) = alt_re.captures(token) {
        if let Ok(value) = caps[2].parse::<f64>() {
            let inhg = if &caps[1] == "A" {
                value / 100.0
            } else {
                value * INHG_PER_HPA
            };
            return Group::Altimeter(inhg);
        }
    }

    let wx_re = WX_RE.get_or_init(|| {
        Regex::new(
            r"^(?:\+|-|VC)?(?:MI|PR|BC|DR|BL|SH|TS|FZ)?(?:DZ|RA|SN|SG|IC|PL|GR|GS|UP|BR|FG|FU|VA|DU|SA|HZ|PY|PO|SQ|FC|SS|DS)*$",
        )
        .unwrap()
    });
    let body = token
        .trim_start_matches(|c: char| c == '+' || c == '-')
        .trim_start_matches("VC");
    if !body.is_empty() && wx_re.is_match(token) {
        return Group::Weather(WeatherCondition::new(token));
    }

    Group::Other
}

/// Accumulates the groups of one report section. Fields left unset inherit
/// from whatever conditions the section is built on.
#[derive(Debug, Default)]
pub(crate) struct ConditionsBuilder {
    wind: Option<Wind>,
    visibility_sm: Option<f64>,
    sky: Option<Vec<SkyLayer>>,
    phenomena: Option<Vec<WeatherCondition>>,
    pending_whole: Option<u32>,
}

impl ConditionsBuilder {
    pub(crate) fn apply(&mut self, group: Group) {
        let whole = self.pending_whole.take();
        match group {
            Group::Wind(wind) => {
                // Only the first wind group counts; later ones belong to remarks or trends.
                if self.wind.is_none() {
                    self.wind = Some(wind);
                }
            }
            Group::VariableRange(a, b) => {
                if let Some(wind) = self.wind.as_mut() {
                    wind.variable_range = Some((a, b));
                }
            }
            Group::WholeNumber(n) => self.pending_whole = Some(n),
            Group::Visibility(v) => {
                if self.visibility_sm.is_none() {
                    let v = match whole {
                        Some(n) if v < 1.0 => f64::from(n) + v,
                        _ => v,
                    };
                    self.visibility_sm = Some(v);
                }
            }
            Group::Cavok => {
                self.visibility_sm = Some(DEFAULT_VISIBILITY_SM);
                self.sky = Some(Vec::new());
                self.phenomena = Some(Vec::new());
            }
            Group::Layer(layer) => self.sky.get_or_insert_with(Vec::new).push(layer),
            Group::ClearSky => {
                self.sky.get_or_insert_with(Vec::new);
            }
            Group::Weather(wx) => self.phenomena.get_or_insert_with(Vec::new).push(wx),
            Group::NoSignificantWeather => self.phenomena = Some(Vec::new()),
            Group::TemperatureDewpoint(..) | Group::Altimeter(_) | Group::Other => {}
        }
    }

    pub(crate) fn build_on(self, base: &Conditions) -> Conditions {
        let wind = self.wind.unwrap_or(base.wind);
        let visibility_sm = self.visibility_sm.unwrap_or(base.visibility_sm);
        let sky = self.sky.unwrap_or_else(|| base.sky.clone());
        let phenomena = self.phenomena.unwrap_or_else(|| base.phenomena.clone());
        let ceiling_ft = ceiling_of(&sky);
        Conditions {
            wind,
            visibility_sm,
            flight_category: FlightCategory::from_conditions(visibility_sm, ceiling_ft),
            sky,
            ceiling_ft,
            phenomena,
        }
    }
}
