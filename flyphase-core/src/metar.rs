//! METAR/SPECI observation parsing.
//!
//! Groups are classified by shape rather than position, so abbreviated input
//! such as `33012KT 3000 BKN012 18/12 Q1012` parses with the station and time
//! defaulted from the [`ParseContext`]. Unknown groups are collected as
//! [`ParseIssue`]s; missing wind, visibility or sky condition is an error.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::{resolve_day_time, two_digit_fields, ParseContext};
use crate::types::*;

/// Statute mile in meters.
const METERS_PER_SM: f64 = 1609.34;

/// Reported visibility at or above 10 km.
pub const VISIBILITY_UNLIMITED_M: u32 = 10_000;

/// Knots per meter/second.
const KT_PER_MPS: f64 = 1.943_84;

/// Assumed distances for qualitative CB locations.
const CB_DISTANT_NM: u32 = 25;
const CB_VICINITY_NM: u32 = 8;

const COMPASS_POINTS: &[&str] = &["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

/// Runway visual range group, e.g. `R33L/1200`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rvr {
    pub runway: String,
    pub meters: u32,
}

/// A cumulonimbus mention in the body or remarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CbReport {
    pub direction: Option<String>,
    /// None when the distance was not given. Treated as close.
    pub distance_nm: Option<u32>,
    pub moving: Option<String>,
}

impl CbReport {
    pub fn is_within(&self, radius_nm: u32) -> bool {
        self.distance_nm.map_or(true, |d| d <= radius_nm)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetarObservation {
    pub station: String,
    pub station_defaulted: bool,
    pub observed_at: DateTime<Utc>,
    pub time_defaulted: bool,
    pub special: bool,
    pub auto: bool,
    pub wind: Wind,
    pub visibility_m: u32,
    pub cavok: bool,
    pub rvr: Vec<Rvr>,
    pub weather: Vec<Phenomenon>,
    pub recent_weather: Vec<String>,
    pub clouds: Vec<CloudLayer>,
    /// NSC, SKC, NCD or CLR reported.
    pub sky_clear: bool,
    pub temperature_c: Option<i16>,
    pub dewpoint_c: Option<i16>,
    pub qnh_hpa: Option<u16>,
    pub wind_shear: bool,
    /// Raw trend suffix from NOSIG/BECMG/TEMPO onwards. Detected, not interpreted.
    pub trend: Option<String>,
    pub remarks: Option<String>,
    pub cb_reports: Vec<CbReport>,
    pub issues: Vec<ParseIssue>,
}

impl MetarObservation {
    /// Parse a METAR, tolerating unknown groups.
    pub fn parse(text: &str, ctx: &ParseContext) -> std::result::Result<Self, ParseError> {
        let upper = text.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Err(ParseError::Empty);
        }

        let (body, remarks) = match upper.find(" RMK") {
            Some(i) => (&upper[..i], Some(upper[i + 4..].trim().to_string())),
            None => (upper.as_str(), None),
        };

        let mut b = Builder::default();
        let tokens: Vec<&str> = body.split_whitespace().collect();
        let mut trend_at = None;
        let mut i = 0;

        while i < tokens.len() {
            let tok = tokens[i];
            let pos = i + 1;
            i += 1;

            if !tok.is_ascii() {
                b.issue(ParseIssue::unrecognized(ReportKind::Metar, tok, pos));
                continue;
            }

            match tok {
                "METAR" if pos == 1 => continue,
                "SPECI" if pos == 1 => {
                    b.special = true;
                    continue;
                }
                "AUTO" => {
                    b.auto = true;
                    continue;
                }
                "COR" => continue,
                "NOSIG" | "BECMG" | "TEMPO" => {
                    trend_at = Some(pos - 1);
                    break;
                }
                _ => {}
            }

            if b.time.is_none() && is_time_group(tok) {
                match parse_time_group(tok, ctx) {
                    Some(t) => b.time = Some(t),
                    None => b.issue(ParseIssue::invalid(
                        ReportKind::Metar,
                        tok,
                        pos,
                        "impossible observation time",
                    )),
                }
                continue;
            }

            if let Some(wind) = parse_wind(tok) {
                if b.wind.is_none() {
                    b.wind = Some(wind);
                    continue;
                }
            }

            if let Some(sector) = parse_variable_sector(tok) {
                if let Some(w) = b.wind.as_mut() {
                    w.variable_from = Some(sector);
                    continue;
                }
            }

            if tok == "CAVOK" {
                b.cavok = true;
                b.visibility(VISIBILITY_UNLIMITED_M);
                continue;
            }

            if let Some(m) = parse_visibility_meters(tok) {
                b.visibility(m);
                continue;
            }

            // "1 1/2SM": whole miles followed by a fraction group
            if tok.len() <= 2 && tok.bytes().all(|c| c.is_ascii_digit()) {
                if let Some(next) = tokens.get(i) {
                    if let (Ok(whole), Some(frac)) = (tok.parse::<f64>(), parse_statute_miles(next)) {
                        if next.contains('/') {
                            b.visibility(sm_to_meters(whole) + frac);
                            i += 1;
                            continue;
                        }
                    }
                }
            }

            if let Some(m) = parse_statute_miles(tok) {
                b.visibility(m);
                continue;
            }

            if let Some(rvr) = parse_rvr(tok) {
                b.rvr.push(rvr);
                continue;
            }

            if let Some(layer) = parse_cloud(tok) {
                b.clouds.push(layer);
                continue;
            }

            if matches!(tok, "NSC" | "SKC" | "NCD" | "CLR") {
                b.sky_clear = true;
                continue;
            }

            if let Some((t, d)) = parse_temperature(tok) {
                if b.temperature.is_none() {
                    b.temperature = Some((t, d));
                    continue;
                }
            }

            if let Some(q) = parse_pressure(tok) {
                b.qnh = Some(q);
                continue;
            }

            if tok == "WS" {
                b.wind_shear = true;
                // WS R33 / WS ALL RWY
                while let Some(next) = tokens.get(i) {
                    if next.starts_with('R') && next.len() <= 4 || *next == "ALL" || *next == "RWY" {
                        i += 1;
                    } else {
                        break;
                    }
                }
                continue;
            }

            if let Some(recent) = tok.strip_prefix("RE") {
                if Phenomenon::parse(recent).is_some() {
                    b.recent.push(recent.to_string());
                    continue;
                }
            }

            if let Some(p) = Phenomenon::parse(tok) {
                b.weather.push(p);
                continue;
            }

            if tok == "CB" {
                b.cb_reports.push(CbReport {
                    direction: None,
                    distance_nm: None,
                    moving: None,
                });
                continue;
            }

            if b.station.is_none() && is_station(tok) {
                b.station = Some(tok.to_string());
                continue;
            }

            b.issue(ParseIssue::unrecognized(ReportKind::Metar, tok, pos));
        }

        let trend = trend_at.map(|start| tokens[start..].join(" "));
        if let Some(rmk) = remarks.as_deref() {
            b.cb_reports.extend(parse_cb_remarks(rmk));
        }

        b.finish(ctx, trend, remarks)
    }

    /// Quality warnings for a successfully parsed report.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.station_defaulted {
            warnings.push(format!("no station id, assumed {}", self.station));
        }
        if self.time_defaulted {
            warnings.push("no observation time, assumed now".into());
        }
        if self.temperature_c.is_none() {
            warnings.push("no temperature group".into());
        }
        if self.qnh_hpa.is_none() {
            warnings.push("no QNH group".into());
        }
        warnings
    }

    /// True if any cloud layer, weather group or CB mention puts a CB within `radius_nm`.
    pub fn has_cb_within(&self, radius_nm: u32) -> bool {
        self.clouds.iter().any(|c| c.is_cb())
            || self.weather.iter().any(|w| w.is_thunderstorm())
            || self.cb_reports.iter().any(|r| r.is_within(radius_nm))
    }

    pub fn ceiling_ft(&self) -> Option<u32> {
        ceiling_of(&self.clouds)
    }

    /// Encode back into METAR text. Cloud heights are written in hundreds of feet.
    pub fn to_report(&self) -> String {
        let mut groups = vec![
            self.station.clone(),
            self.observed_at.format("%d%H%MZ").to_string(),
            self.wind.to_string(),
        ];
        if let Some((from, to)) = self.wind.variable_from {
            groups.push(format!("{from:03}V{to:03}"));
        }
        if self.cavok {
            groups.push("CAVOK".into());
        } else {
            let vis = if self.visibility_m >= VISIBILITY_UNLIMITED_M {
                9999
            } else {
                self.visibility_m
            };
            groups.push(format!("{vis:04}"));
            groups.extend(self.weather.iter().map(|w| w.to_string()));
            if self.clouds.is_empty() {
                groups.push("NSC".into());
            }
            groups.extend(self.clouds.iter().map(|c| c.to_string()));
        }
        if let Some(t) = self.temperature_c {
            let dew = self.dewpoint_c.map(signed_temp).unwrap_or_default();
            groups.push(format!("{}/{}", signed_temp(t), dew));
        }
        if let Some(q) = self.qnh_hpa {
            groups.push(format!("Q{q:04}"));
        }
        groups.join(" ")
    }
}

#[derive(Default)]
struct Builder {
    station: Option<String>,
    time: Option<DateTime<Utc>>,
    special: bool,
    auto: bool,
    wind: Option<Wind>,
    visibility: Option<u32>,
    cavok: bool,
    rvr: Vec<Rvr>,
    weather: Vec<Phenomenon>,
    recent: Vec<String>,
    clouds: Vec<CloudLayer>,
    sky_clear: bool,
    temperature: Option<(i16, Option<i16>)>,
    qnh: Option<u16>,
    wind_shear: bool,
    cb_reports: Vec<CbReport>,
    issues: Vec<ParseIssue>,
}

impl Builder {
    /// Directional minimum groups can repeat; keep the lowest.
    fn visibility(&mut self, meters: u32) {
        self.visibility = Some(self.visibility.map_or(meters, |v| v.min(meters)));
    }

    fn issue(&mut self, issue: ParseIssue) {
        self.issues.push(issue);
    }

    fn finish(
        self,
        ctx: &ParseContext,
        trend: Option<String>,
        remarks: Option<String>,
    ) -> std::result::Result<MetarObservation, ParseError> {
        let wind = self.wind.ok_or(ParseError::MissingField {
            report: ReportKind::Metar,
            field: "wind",
        })?;
        let visibility_m = self.visibility.ok_or(ParseError::MissingField {
            report: ReportKind::Metar,
            field: "visibility",
        })?;
        if self.clouds.is_empty() && !self.cavok && !self.sky_clear {
            return Err(ParseError::MissingField {
                report: ReportKind::Metar,
                field: "cloud or CAVOK",
            });
        }

        Ok(MetarObservation {
            station_defaulted: self.station.is_none(),
            station: self.station.unwrap_or_else(|| ctx.home_icao.clone()),
            time_defaulted: self.time.is_none(),
            observed_at: self.time.unwrap_or(ctx.now),
            special: self.special,
            auto: self.auto,
            wind,
            visibility_m,
            cavok: self.cavok,
            rvr: self.rvr,
            weather: self.weather,
            recent_weather: self.recent,
            clouds: self.clouds,
            sky_clear: self.sky_clear,
            temperature_c: self.temperature.map(|(t, _)| t),
            dewpoint_c: self.temperature.and_then(|(_, d)| d),
            qnh_hpa: self.qnh,
            wind_shear: self.wind_shear,
            trend,
            remarks,
            cb_reports: self.cb_reports,
            issues: self.issues,
        })
    }
}

// ---------------------------------------------------------------------------
// Group parsers (shared with TAF)
// ---------------------------------------------------------------------------

fn is_time_group(tok: &str) -> bool {
    tok.len() == 7 && tok.ends_with('Z') && tok[..6].bytes().all(|c| c.is_ascii_digit())
}

fn parse_time_group(tok: &str, ctx: &ParseContext) -> Option<DateTime<Utc>> {
    let f = two_digit_fields(&tok[..6])?;
    resolve_day_time(ctx.now, f[0], f[1], f[2])
}

/// Four-letter location indicator that is not a weather group.
pub(crate) fn is_station(tok: &str) -> bool {
    tok.len() == 4
        && tok.bytes().all(|c| c.is_ascii_uppercase())
        && Phenomenon::parse(tok).is_none()
        && !matches!(tok, "AUTO" | "NOSIG" | "TEMPO" | "BECMG")
}

/// `dddssKT`, `dddssGggKT`, `VRBssKT`, `00000KT`, and the MPS variants.
pub(crate) fn parse_wind(tok: &str) -> Option<Wind> {
    if !tok.is_ascii() {
        return None;
    }
    let (body, mps) = if let Some(b) = tok.strip_suffix("KT") {
        (b, false)
    } else if let Some(b) = tok.strip_suffix("MPS") {
        (b, true)
    } else {
        return None;
    };
    if body.len() < 5 {
        return None;
    }

    let (dir, rest) = body.split_at(3);
    let direction = if dir == "VRB" {
        WindDirection::Variable
    } else if dir.bytes().all(|c| c.is_ascii_digit()) {
        let d: u16 = dir.parse().ok()?;
        if d > 360 {
            return None;
        }
        WindDirection::Degrees(d % 360)
    } else {
        return None;
    };

    let (speed, gust) = match rest.split_once('G') {
        Some((s, g)) => (s, Some(g)),
        None => (rest, None),
    };
    let digits = |s: &str| (2..=3).contains(&s.len()) && s.bytes().all(|c| c.is_ascii_digit());
    if !digits(speed) || gust.is_some_and(|g| !digits(g)) {
        return None;
    }

    let convert = |v: u16| -> u16 {
        if mps {
            (f64::from(v) * KT_PER_MPS).round() as u16
        } else {
            v
        }
    };
    let speed_kt = convert(speed.parse().ok()?);
    let gust_kt = match gust {
        Some(g) => Some(convert(g.parse().ok()?)),
        None => None,
    };

    Some(Wind {
        direction,
        speed_kt,
        gust_kt,
        variable_from: None,
    })
}

fn parse_variable_sector(tok: &str) -> Option<(u16, u16)> {
    let (from, to) = tok.split_once('V')?;
    if from.len() != 3 || to.len() != 3 {
        return None;
    }
    let from: u16 = from.parse().ok()?;
    let to: u16 = to.parse().ok()?;
    (from <= 360 && to <= 360).then_some((from, to))
}

/// `nnnn`, `9999`, `nnnnNDV`, or a directional minimum like `4000NE`.
pub(crate) fn parse_visibility_meters(tok: &str) -> Option<u32> {
    if !tok.is_ascii() || tok.len() < 4 || !tok[..4].bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let suffix = &tok[4..];
    if !(suffix.is_empty() || suffix == "NDV" || COMPASS_POINTS.contains(&suffix)) {
        return None;
    }
    let m: u32 = tok[..4].parse().ok()?;
    Some(if m >= 9999 { VISIBILITY_UNLIMITED_M } else { m })
}

/// `P6SM`, `10SM`, `1/2SM`, `M1/4SM`, converted to meters.
pub(crate) fn parse_statute_miles(tok: &str) -> Option<u32> {
    let body = tok.strip_suffix("SM")?;
    let body = body
        .strip_prefix('P')
        .or_else(|| body.strip_prefix('M'))
        .unwrap_or(body);
    let miles = match body.split_once('/') {
        Some((n, d)) => {
            let n: f64 = n.parse().ok()?;
            let d: f64 = d.parse().ok()?;
            if d == 0.0 {
                return None;
            }
            n / d
        }
        None => body.parse::<f64>().ok()?,
    };
    Some(sm_to_meters(miles))
}

fn sm_to_meters(miles: f64) -> u32 {
    ((miles * METERS_PER_SM).round() as u32).min(VISIBILITY_UNLIMITED_M)
}

fn parse_rvr(tok: &str) -> Option<Rvr> {
    let rest = tok.strip_prefix('R')?;
    let (runway, value) = rest.split_once('/')?;
    if !tok.is_ascii() || runway.len() < 2 || !runway[..2].bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value = value.trim_start_matches(|c| c == 'P' || c == 'M');
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() != 4 {
        return None;
    }
    let mut meters: u32 = digits.parse().ok()?;
    if value[4..].starts_with("FT") {
        meters = (f64::from(meters) * 0.3048).round() as u32;
    }
    Some(Rvr {
        runway: runway.to_string(),
        meters,
    })
}

/// `FEW/SCT/BKN/OVC` + 3-digit hundreds of feet (+ `CB`/`TCU`), or `VVnnn`.
pub(crate) fn parse_cloud(tok: &str) -> Option<CloudLayer> {
    if !tok.is_ascii() {
        return None;
    }
    let (cover, rest) = if tok.len() >= 5 && tok.starts_with("VV") {
        (CloudCover::Vv, &tok[2..])
    } else if tok.len() >= 6 {
        (CloudCover::from_code(tok.get(..3)?)?, &tok[3..])
    } else {
        return None;
    };
    let height = rest.get(..3)?;
    let height_ft = if height == "///" {
        0
    } else if height.bytes().all(|c| c.is_ascii_digit()) {
        height.parse::<u32>().ok()? * 100
    } else {
        return None;
    };
    let convective = match &rest[3..] {
        "" | "///" => None,
        "CB" => Some(Convective::Cb),
        "TCU" => Some(Convective::Tcu),
        _ => return None,
    };
    Some(CloudLayer {
        cover,
        height_ft,
        convective,
    })
}

fn parse_signed_temp(s: &str) -> Option<i16> {
    let (neg, digits) = match s.strip_prefix('M') {
        Some(d) => (true, d),
        None => (false, s),
    };
    if digits.len() != 2 || !digits.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let v: i16 = digits.parse().ok()?;
    Some(if neg { -v } else { v })
}

fn signed_temp(v: i16) -> String {
    if v < 0 {
        format!("M{:02}", -v)
    } else {
        format!("{v:02}")
    }
}

fn parse_temperature(tok: &str) -> Option<(i16, Option<i16>)> {
    let (t, d) = tok.split_once('/')?;
    let temp = parse_signed_temp(t)?;
    let dew = if d.is_empty() || d == "//" {
        None
    } else {
        Some(parse_signed_temp(d)?)
    };
    Some((temp, dew))
}

/// `Qnnnn` hPa or `Annnn` inches of mercury, returned in hPa.
fn parse_pressure(tok: &str) -> Option<u16> {
    if tok.len() != 5 || !tok.is_ascii() || !tok[1..].bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let v: u32 = tok[1..].parse().ok()?;
    match &tok[..1] {
        "Q" => u16::try_from(v).ok(),
        "A" => Some((f64::from(v) / 100.0 * 33.8639).round() as u16),
        _ => None,
    }
}

/// `CB [dir][-dir] [nnNM|DSNT|VC|OHD] [MOV dir]`, possibly several per remark.
fn parse_cb_remarks(remarks: &str) -> Vec<CbReport> {
    let tokens: Vec<&str> = remarks.split_whitespace().collect();
    let mut reports = Vec::new();

    for (i, tok) in tokens.iter().enumerate() {
        if *tok != "CB" && *tok != "CBS" {
            continue;
        }
        let mut report = CbReport {
            direction: None,
            distance_nm: None,
            moving: None,
        };
        let mut j = i + 1;
        while j < tokens.len() && j <= i + 6 {
            let t = tokens[j];
            match t {
                "CB" | "CBS" => break,
                "DSNT" => report.distance_nm = Some(CB_DISTANT_NM),
                "VC" => report.distance_nm = Some(CB_VICINITY_NM),
                "OHD" => report.distance_nm = Some(0),
                "MOV" => {
                    report.moving = tokens.get(j + 1).map(|d| d.to_string());
                    j += 1;
                }
                _ => {
                    if let Some(n) = t.strip_suffix("NM").and_then(|n| n.parse().ok()) {
                        report.distance_nm = Some(n);
                    } else if is_direction(t) && report.direction.is_none() {
                        report.direction = Some(t.to_string());
                    } else {
                        break;
                    }
                }
            }
            j += 1;
        }
        reports.push(report);
    }
    reports
}

fn is_direction(tok: &str) -> bool {
    tok.split(|c| c == '-' || c == '/')
        .all(|part| COMPASS_POINTS.contains(&part))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
