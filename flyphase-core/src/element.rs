//! Uniform weather elements and the normalizer that produces them.
//!
//! Every parsed report, free-text warning and bird-risk declaration becomes a
//! flat list of [`WeatherElement`]s, each with a source tag and a half-open
//! validity window `[valid_from, valid_to)`. An open bound is indefinite.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::classify::Report;
use crate::metar::{MetarObservation, VISIBILITY_UNLIMITED_M};
use crate::pirep::Pirep;
use crate::taf::{TafForecast, TafPeriod};
use crate::types::*;

/// Assumed visibility in a dust or sand storm warning.
const DUST_STORM_VISIBILITY_M: u32 = 1000;

/// Bare warning visibility numbers below this are kilometers.
const WARNING_KM_THRESHOLD: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Wind,
    Visibility,
    Cloud,
    Temperature,
    Pressure,
    Phenomenon,
    Bird,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementValue {
    Wind(Wind),
    Visibility(u32),
    Cloud(CloudLayer),
    Temperature(i16),
    Pressure(u16),
    Phenomenon(Phenomenon),
    /// Cumulonimbus reported; distance None means close or unknown.
    Cb { distance_nm: Option<u32> },
    RapidDeterioration,
    Bird(BirdLevel),
}

impl ElementValue {
    pub fn kind(&self) -> ElementKind {
        match self {
            ElementValue::Wind(_) => ElementKind::Wind,
            ElementValue::Visibility(_) => ElementKind::Visibility,
            ElementValue::Cloud(_) => ElementKind::Cloud,
            ElementValue::Temperature(_) => ElementKind::Temperature,
            ElementValue::Pressure(_) => ElementKind::Pressure,
            ElementValue::Phenomenon(_) | ElementValue::Cb { .. } | ElementValue::RapidDeterioration => {
                ElementKind::Phenomenon
            }
            ElementValue::Bird(_) => ElementKind::Bird,
        }
    }
}

impl fmt::Display for ElementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementValue::Wind(w) => write!(f, "{w}"),
            ElementValue::Visibility(v) => write!(f, "{v} m"),
            ElementValue::Cloud(c) => write!(f, "{c}"),
            ElementValue::Temperature(t) => write!(f, "{t}°C"),
            ElementValue::Pressure(q) => write!(f, "Q{q:04}"),
            ElementValue::Phenomenon(p) => write!(f, "{p}"),
            ElementValue::Cb { distance_nm: Some(d) } => write!(f, "CB {d}NM"),
            ElementValue::Cb { distance_nm: None } => write!(f, "CB"),
            ElementValue::RapidDeterioration => write!(f, "rapid deterioration"),
            ElementValue::Bird(b) => write!(f, "bird {b}"),
        }
    }
}

/// One weather fact from one source, valid over a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeatherElement {
    source: Source,
    kind: ElementKind,
    value: ElementValue,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
    origin: DateTime<Utc>,
}

impl WeatherElement {
    pub fn new(
        source: Source,
        value: ElementValue,
        valid_from: Option<DateTime<Utc>>,
        valid_to: Option<DateTime<Utc>>,
        origin: DateTime<Utc>,
    ) -> Self {
        WeatherElement {
            source,
            kind: value.kind(),
            value,
            valid_from,
            valid_to,
            origin,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn value(&self) -> &ElementValue {
        &self.value
    }

    pub fn valid_from(&self) -> Option<DateTime<Utc>> {
        self.valid_from
    }

    pub fn valid_to(&self) -> Option<DateTime<Utc>> {
        self.valid_to
    }

    pub fn origin(&self) -> DateTime<Utc> {
        self.origin
    }

    /// Half-open overlap with `[start, end)`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.valid_from.map_or(true, |f| f < end) && self.valid_to.map_or(true, |t| t > start)
    }
}

/// Validity horizons and the airfield elevation used to place PIREP layers.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub metar_staleness: Duration,
    pub pirep_horizon: Duration,
    pub elevation_ft: i32,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            metar_staleness: Duration::minutes(90),
            pirep_horizon: Duration::minutes(60),
            elevation_ft: 0,
        }
    }
}

/// Convert one parsed report into elements.
pub fn normalize(report: &Report, opts: &NormalizeOptions) -> Vec<WeatherElement> {
    let elements = match report {
        Report::Metar(m) => normalize_metar(m, opts),
        Report::Taf(t) => normalize_taf(t),
        Report::Pirep(p) => normalize_pirep(p, opts),
    };
    debug!(kind = %report.kind(), count = elements.len(), "normalized report");
    elements
}

pub fn normalize_metar(m: &MetarObservation, opts: &NormalizeOptions) -> Vec<WeatherElement> {
    let from = Some(m.observed_at);
    let to = Some(m.observed_at + opts.metar_staleness);
    let el = |value| WeatherElement::new(Source::Metar, value, from, to, m.observed_at);

    let mut out = vec![el(ElementValue::Wind(m.wind)), el(ElementValue::Visibility(m.visibility_m))];
    out.extend(m.clouds.iter().map(|c| el(ElementValue::Cloud(*c))));
    out.extend(m.weather.iter().map(|w| el(ElementValue::Phenomenon(w.clone()))));
    out.extend(m.cb_reports.iter().map(|r| el(ElementValue::Cb { distance_nm: r.distance_nm })));
    if let Some(t) = m.temperature_c {
        out.push(el(ElementValue::Temperature(t)));
    }
    if let Some(q) = m.qnh_hpa {
        out.push(el(ElementValue::Pressure(q)));
    }
    out
}

/// TAF elements. Temporary groups (TEMPO/PROB) hold only for their own window.
/// Anything else holds until the next non-temporary group that sets the same
/// kind: the end of a BECMG transition, the start of an FM, or the TAF end.
pub fn normalize_taf(taf: &TafForecast) -> Vec<WeatherElement> {
    let origin = taf.issued_at.unwrap_or(taf.valid_from);
    let mut out = Vec::new();

    for (idx, period) in taf.periods.iter().enumerate() {
        for kind in [ElementKind::Wind, ElementKind::Visibility, ElementKind::Cloud, ElementKind::Phenomenon] {
            let values = period_values(period, kind);
            if values.is_empty() {
                continue;
            }
            let (from, to) = if period.kind.is_temporary() {
                (period.from, period.to)
            } else {
                let start = if idx == 0 { taf.valid_from } else { period.from };
                (start, superseded_at(taf, idx, kind))
            };
            out.extend(
                values
                    .into_iter()
                    .map(|v| WeatherElement::new(Source::Taf, v, Some(from), Some(to), origin)),
            );
        }
    }
    out
}

fn sets_kind(period: &TafPeriod, kind: ElementKind) -> bool {
    match kind {
        ElementKind::Wind => period.wind.is_some(),
        ElementKind::Visibility => period.visibility_m.is_some(),
        ElementKind::Cloud => period.clouds.is_some(),
        ElementKind::Phenomenon => period.weather.is_some() || period.cb_mentioned,
        _ => false,
    }
}

fn period_values(period: &TafPeriod, kind: ElementKind) -> Vec<ElementValue> {
    match kind {
        ElementKind::Wind => period.wind.map(ElementValue::Wind).into_iter().collect(),
        ElementKind::Visibility => period.visibility_m.map(ElementValue::Visibility).into_iter().collect(),
        ElementKind::Cloud => period
            .clouds
            .iter()
            .flatten()
            .map(|c| ElementValue::Cloud(*c))
            .collect(),
        ElementKind::Phenomenon => {
            let mut v: Vec<ElementValue> = period
                .weather
                .iter()
                .flatten()
                .map(|w| ElementValue::Phenomenon(w.clone()))
                .collect();
            if period.cb_mentioned {
                v.push(ElementValue::Cb { distance_nm: None });
            }
            v
        }
        _ => Vec::new(),
    }
}

fn superseded_at(taf: &TafForecast, idx: usize, kind: ElementKind) -> DateTime<Utc> {
    taf.periods[idx + 1..]
        .iter()
        .filter(|p| !p.kind.is_temporary() && sets_kind(p, kind))
        .map(|p| match p.kind {
            crate::taf::ChangeKind::Becmg => p.to,
            _ => p.from,
        })
        .next()
        .unwrap_or(taf.valid_to)
}

/// PIREP elements, valid for report time ± horizon. Sky heights are
/// converted from AMSL to AGL. A routine report drops light phenomena; an
/// urgent one keeps everything.
pub fn normalize_pirep(p: &Pirep, opts: &NormalizeOptions) -> Vec<WeatherElement> {
    let from = Some(p.reported_at - opts.pirep_horizon);
    let to = Some(p.reported_at + opts.pirep_horizon);
    let el = |value| WeatherElement::new(Source::Pirep, value, from, to, p.reported_at);

    let mut out: Vec<WeatherElement> = p
        .sky
        .iter()
        .map(|l| {
            let agl = (i64::from(l.layer.height_ft) - i64::from(opts.elevation_ft)).max(0) as u32;
            el(ElementValue::Cloud(CloudLayer {
                height_ft: agl,
                ..l.layer
            }))
        })
        .collect();
    if let Some(v) = p.visibility_m {
        out.push(el(ElementValue::Visibility(v)));
    }
    out.extend(
        p.weather
            .iter()
            .filter(|w| p.urgent || w.intensity != Intensity::Light)
            .map(|w| el(ElementValue::Phenomenon(w.clone()))),
    );
    if p.cb_reported {
        out.push(el(ElementValue::Cb { distance_nm: None }));
    }
    out
}

/// Elements asserted by an operator's free-text weather warning.
pub fn normalize_warning(
    text: &str,
    valid_from: Option<DateTime<Utc>>,
    valid_to: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Vec<WeatherElement> {
    let upper = text.to_ascii_uppercase();
    let words: Vec<&str> = upper
        .split(|c: char| c.is_whitespace() || c == ',' || c == '.' || c == ';')
        .filter(|w| !w.is_empty())
        .collect();
    let el = |value| WeatherElement::new(Source::Warning, value, valid_from, valid_to, now);
    let mut out = Vec::new();

    let cb = words.iter().any(|w| {
        matches!(*w, "CB" | "CBS" | "TS" | "THUNDERSTORM" | "THUNDERSTORMS")
            || Phenomenon::parse(w).is_some_and(|p| p.is_thunderstorm())
    });
    if cb {
        let distance_nm = words.iter().find_map(|w| w.strip_suffix("NM")?.parse().ok());
        out.push(el(ElementValue::Cb { distance_nm }));
    }

    let dust = words
        .iter()
        .any(|w| w.starts_with("DUST") || w.starts_with("SAND"));
    let storm = upper.contains("DUST STORM")
        || upper.contains("DUSTSTORM")
        || upper.contains("SAND STORM")
        || upper.contains("SANDSTORM");

    let mut visibility = warning_visibility(&words);
    if storm {
        visibility = Some(visibility.map_or(DUST_STORM_VISIBILITY_M, |v| v.min(DUST_STORM_VISIBILITY_M)));
    }
    if let Some(v) = visibility {
        out.push(el(ElementValue::Visibility(v)));
    }
    if dust {
        if let Some(p) = Phenomenon::parse("BLDU") {
            out.push(el(ElementValue::Phenomenon(p)));
        }
    }

    if let Some(wind) = warning_wind(&words) {
        out.push(el(ElementValue::Wind(wind)));
    }

    if upper.contains("RAPID") && upper.contains("DETERIORAT") {
        out.push(el(ElementValue::RapidDeterioration));
    }

    debug!(count = out.len(), "normalized warning");
    out
}

/// `VIS 1500M`, `VISIBILITY BELOW 3KM`, `VIS 800 OR LESS`, `VIS 3 KM`.
fn warning_visibility(words: &[&str]) -> Option<u32> {
    let start = words.iter().position(|w| w.starts_with("VIS"))?;
    for (n, w) in words.iter().enumerate().skip(start + 1).take(4) {
        let (digits, unit) = split_number(w);
        let Some(value) = digits else { continue };
        let unit = if unit.is_empty() {
            words.get(n + 1).copied().unwrap_or("")
        } else {
            unit
        };
        let meters = match unit {
            "KM" => value.saturating_mul(1000),
            "M" => value,
            _ if value < WARNING_KM_THRESHOLD => value.saturating_mul(1000),
            _ => value,
        };
        return Some(meters.min(VISIBILITY_UNLIMITED_M));
    }
    None
}

/// `WINDS EXCEEDING 40KT`, `GUSTS 45 KT`. Direction is never given.
fn warning_wind(words: &[&str]) -> Option<Wind> {
    let mut strongest: Option<u16> = None;
    for (n, w) in words.iter().enumerate() {
        if !(w.starts_with("WIND") || w.starts_with("GUST")) {
            continue;
        }
        for (m, next) in words.iter().enumerate().skip(n + 1).take(4) {
            let (digits, unit) = split_number(next);
            let Some(v) = digits else { continue };
            let unit = if unit.is_empty() {
                words.get(m + 1).copied().unwrap_or("")
            } else {
                unit
            };
            if matches!(unit, "KT" | "KTS" | "KNOTS") {
                let v = u16::try_from(v).unwrap_or(u16::MAX);
                strongest = Some(strongest.map_or(v, |s| s.max(v)));
                break;
            }
        }
    }
    strongest.map(|speed_kt| Wind {
        direction: WindDirection::Unknown,
        speed_kt,
        gust_kt: None,
        variable_from: None,
    })
}

fn split_number(word: &str) -> (Option<u32>, &str) {
    let end = word.find(|c: char| !c.is_ascii_digit()).unwrap_or(word.len());
    if end == 0 {
        return (None, word);
    }
    (word[..end].parse().ok(), &word[end..])
}

/// The declared bird-strike risk as an indefinite element.
pub fn bird_element(level: BirdLevel, now: DateTime<Utc>) -> WeatherElement {
    WeatherElement::new(Source::Warning, ElementValue::Bird(level), None, None, now)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ParseContext;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 31, 6, 0, 0).unwrap()
    }

    fn ctx() -> ParseContext {
        ParseContext::new(now(), "OEKF")
    }

    fn values(elements: &[WeatherElement], kind: ElementKind) -> Vec<ElementValue> {
        elements
            .iter()
            .filter(|e| e.kind() == kind)
            .map(|e| e.value().clone())
            .collect()
    }

    #[test]
    fn test_metar_window_is_staleness_horizon() {
        let m = MetarObservation::parse("OEKF 310600Z 33012KT 3000 BKN012 18/12 Q1012", &ctx()).unwrap();
        let els = normalize_metar(&m, &NormalizeOptions::default());
        assert_eq!(els.len(), 5);
        for e in &els {
            assert_eq!(e.source(), Source::Metar);
            assert_eq!(e.valid_from(), Some(now()));
            assert_eq!(e.valid_to(), Some(now() + Duration::minutes(90)));
        }
        assert_eq!(values(&els, ElementKind::Visibility), vec![ElementValue::Visibility(3000)]);
    }

    #[test]
    fn test_metar_cb_remark_becomes_phenomenon() {
        let m = MetarObservation::parse("OEKF 310600Z 33012KT 9999 FEW080 22/10 Q1018 RMK CB NW 25NM", &ctx())
            .unwrap();
        let els = normalize_metar(&m, &NormalizeOptions::default());
        assert!(values(&els, ElementKind::Phenomenon).contains(&ElementValue::Cb { distance_nm: Some(25) }));
    }

    #[test]
    fn test_taf_base_superseded_by_becmg_end() {
        let taf = TafForecast::parse(
            "TAF OEKF 310500Z 3106/0112 33012KT 9999 SCT040 BECMG 3110/3112 4000 BR",
            &ctx(),
        )
        .unwrap();
        let els = normalize_taf(&taf);
        let vis: Vec<&WeatherElement> = els.iter().filter(|e| e.kind() == ElementKind::Visibility).collect();
        assert_eq!(vis.len(), 2);
        // base visibility holds until the BECMG transition completes
        assert_eq!(vis[0].valid_from(), Some(taf.valid_from));
        assert_eq!(vis[0].valid_to(), Some(taf.periods[1].to));
        assert_eq!(vis[1].valid_from(), Some(taf.periods[1].from));
        assert_eq!(vis[1].valid_to(), Some(taf.valid_to));
        // clouds untouched by the BECMG: base clouds hold to the end
        let cloud = els.iter().find(|e| e.kind() == ElementKind::Cloud).unwrap();
        assert_eq!(cloud.valid_to(), Some(taf.valid_to));
    }

    #[test]
    fn test_taf_fm_supersedes_at_start() {
        let taf = TafForecast::parse(
            "TAF OEKF 310500Z 3106/0112 33012KT 9999 SCT040 FM311400 18015KT 8000 BKN020",
            &ctx(),
        )
        .unwrap();
        let els = normalize_taf(&taf);
        let base_wind = els.iter().find(|e| e.kind() == ElementKind::Wind).unwrap();
        assert_eq!(base_wind.valid_to(), Some(taf.periods[1].from));
    }

    #[test]
    fn test_taf_tempo_uses_own_window_and_never_supersedes() {
        let taf = TafForecast::parse(
            "TAF OEKF 310500Z 3106/0112 33012KT 9999 SCT040 TEMPO 3112/3116 3000 TSRA",
            &ctx(),
        )
        .unwrap();
        let els = normalize_taf(&taf);
        let vis: Vec<&WeatherElement> = els.iter().filter(|e| e.kind() == ElementKind::Visibility).collect();
        assert_eq!(vis[0].valid_to(), Some(taf.valid_to));
        assert_eq!(vis[1].valid_from(), Some(taf.periods[1].from));
        assert_eq!(vis[1].valid_to(), Some(taf.periods[1].to));
    }

    #[test]
    fn test_pirep_layers_converted_to_agl() {
        let p = Pirep::parse("UA /OV OEKF /TM 0600 /FL080 /SK BKN040 /WX -RA", &ctx()).unwrap();
        let opts = NormalizeOptions {
            elevation_ft: 2000,
            ..NormalizeOptions::default()
        };
        let els = normalize_pirep(&p, &opts);
        assert_eq!(
            values(&els, ElementKind::Cloud),
            vec![ElementValue::Cloud(CloudLayer::new(CloudCover::Bkn, 2000))]
        );
        // routine report: light rain dropped
        assert!(values(&els, ElementKind::Phenomenon).is_empty());
        assert_eq!(els[0].valid_from(), Some(now() - Duration::minutes(60)));
    }

    #[test]
    fn test_urgent_pirep_keeps_light_phenomena() {
        let p = Pirep::parse("UUA /OV OEKF /TM 0600 /FL080 /WX -RA", &ctx()).unwrap();
        let els = normalize_pirep(&p, &NormalizeOptions::default());
        assert_eq!(values(&els, ElementKind::Phenomenon).len(), 1);
    }

    #[test]
    fn test_warning_cb_and_visibility() {
        let els = normalize_warning("TS AND CB EXPECTED, VIS 1500M IN DUST", None, None, now());
        let phen = values(&els, ElementKind::Phenomenon);
        assert!(phen.contains(&ElementValue::Cb { distance_nm: None }));
        assert_eq!(values(&els, ElementKind::Visibility), vec![ElementValue::Visibility(1500)]);
        assert!(els.iter().all(|e| e.valid_from().is_none() && e.valid_to().is_none()));
    }

    #[test]
    fn test_warning_visibility_in_km() {
        let els = normalize_warning("VISIBILITY BELOW 3 KM", None, None, now());
        assert_eq!(values(&els, ElementKind::Visibility), vec![ElementValue::Visibility(3000)]);
        let els = normalize_warning("VIS 4", None, None, now());
        assert_eq!(values(&els, ElementKind::Visibility), vec![ElementValue::Visibility(4000)]);
    }

    #[test]
    fn test_warning_visibility_huge_value_is_capped() {
        let els = normalize_warning("VIS 5000000 KM", None, None, now());
        assert_eq!(
            values(&els, ElementKind::Visibility),
            vec![ElementValue::Visibility(VISIBILITY_UNLIMITED_M)]
        );
        let els = normalize_warning("VIS 4000000000 M", None, None, now());
        assert_eq!(
            values(&els, ElementKind::Visibility),
            vec![ElementValue::Visibility(VISIBILITY_UNLIMITED_M)]
        );
    }

    #[test]
    fn test_warning_dust_storm() {
        let els = normalize_warning("DUST STORM APPROACHING FROM WEST", None, None, now());
        assert_eq!(values(&els, ElementKind::Visibility), vec![ElementValue::Visibility(1000)]);
        assert!(values(&els, ElementKind::Phenomenon)
            .iter()
            .any(|v| matches!(v, ElementValue::Phenomenon(p) if p.codes == "BLDU")));
    }

    #[test]
    fn test_warning_wind_has_unknown_direction() {
        let els = normalize_warning("SURFACE WINDS EXCEEDING 40KT, GUSTS 45 KT", None, None, now());
        let wind = values(&els, ElementKind::Wind);
        assert_eq!(
            wind,
            vec![ElementValue::Wind(Wind {
                direction: WindDirection::Unknown,
                speed_kt: 45,
                gust_kt: None,
                variable_from: None,
            })]
        );
    }

    #[test]
    fn test_warning_rapid_deterioration_and_window() {
        let to = now() + Duration::hours(2);
        let els = normalize_warning("RAPID DETERIORATION EXPECTED", Some(now()), Some(to), now());
        assert_eq!(els.len(), 1);
        assert_eq!(els[0].value(), &ElementValue::RapidDeterioration);
        assert_eq!(els[0].valid_to(), Some(to));
    }

    #[test]
    fn test_overlap_is_half_open() {
        let e = WeatherElement::new(
            Source::Metar,
            ElementValue::Visibility(3000),
            Some(now()),
            Some(now() + Duration::minutes(90)),
            now(),
        );
        assert!(e.overlaps(now() - Duration::minutes(60), now() + Duration::minutes(60)));
        assert!(!e.overlaps(now() + Duration::minutes(90), now() + Duration::minutes(120)));
        assert!(!e.overlaps(now() - Duration::minutes(60), now()));
    }

    #[test]
    fn test_bird_element_is_indefinite() {
        let e = bird_element(BirdLevel::Severe, now());
        assert_eq!(e.kind(), ElementKind::Bird);
        assert!(e.overlaps(now() + Duration::days(3), now() + Duration::days(4)));
    }
}
