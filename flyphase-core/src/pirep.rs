//! Pilot report (UA/UUA) parsing.
//!
//! Fields are introduced by `/XX` markers after the header. Sky heights in a
//! PIREP are above mean sea level; conversion to AGL happens at normalization
//! where the airfield elevation is known.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::{resolve_time_of_day, ParseContext};
use crate::metar::{parse_cloud, parse_statute_miles, VISIBILITY_UNLIMITED_M};
use crate::types::*;

/// Recognized field markers.
const FIELDS: &[&str] = &[
    "OV", "TM", "FL", "TP", "SK", "WX", "FV", "TA", "WV", "TB", "IC", "RM",
];

#[derive(Debug, Clone, Serialize)]
pub struct PirepLayer {
    /// Base height, feet AMSL.
    pub layer: CloudLayer,
    pub top_ft: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pirep {
    /// UUA.
    pub urgent: bool,
    pub station: Option<String>,
    pub location: String,
    pub reported_at: DateTime<Utc>,
    pub time_defaulted: bool,
    pub altitude_ft: Option<u32>,
    pub aircraft_type: Option<String>,
    pub sky: Vec<PirepLayer>,
    pub sky_clear: bool,
    pub weather: Vec<Phenomenon>,
    pub visibility_m: Option<u32>,
    pub temperature_c: Option<i16>,
    pub turbulence: Option<String>,
    pub icing: Option<String>,
    pub remarks: Option<String>,
    /// CB or thunderstorm mentioned anywhere in the report.
    pub cb_reported: bool,
    pub issues: Vec<ParseIssue>,
}

impl Pirep {
    pub fn parse(text: &str, ctx: &ParseContext) -> std::result::Result<Self, ParseError> {
        let upper = text.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Err(ParseError::Empty);
        }

        let (header, fields) = split_fields(&upper);
        let mut issues = Vec::new();

        let mut urgent = false;
        let mut station = None;
        for tok in header.split(|c: char| c.is_whitespace() || c == '/').filter(|t| !t.is_empty()) {
            match tok {
                "UUA" => urgent = true,
                "UA" | "PIREP" => {}
                _ if crate::metar::is_station(tok) => station = Some(tok.to_string()),
                _ => issues.push(ParseIssue::unrecognized(ReportKind::Pirep, tok, 0)),
            }
        }

        let mut report = Pirep {
            urgent,
            station,
            location: String::new(),
            reported_at: ctx.now,
            time_defaulted: true,
            altitude_ft: None,
            aircraft_type: None,
            sky: Vec::new(),
            sky_clear: false,
            weather: Vec::new(),
            visibility_m: None,
            temperature_c: None,
            turbulence: None,
            icing: None,
            remarks: None,
            cb_reported: false,
            issues: Vec::new(),
        };

        for (n, (code, value)) in fields.iter().enumerate() {
            let pos = n + 1;
            let value = value.trim();
            let text_value = (!value.is_empty()).then(|| value.to_string());
            match *code {
                "OV" => report.location = value.to_string(),
                "TM" => match parse_hhmm(value).and_then(|(h, m)| resolve_time_of_day(ctx.now, h, m)) {
                    Some(t) => {
                        report.reported_at = t;
                        report.time_defaulted = false;
                    }
                    None => issues.push(ParseIssue::invalid(ReportKind::Pirep, value, pos, "bad /TM time")),
                },
                "FL" => report.altitude_ft = parse_flight_level(value),
                "TP" => report.aircraft_type = text_value,
                "SK" => report.parse_sky(value, pos, &mut issues),
                "WX" => report.parse_weather(value, pos, &mut issues),
                "FV" => match parse_flight_visibility(value) {
                    Some(m) => report.visibility_m = Some(m),
                    None => issues.push(ParseIssue::invalid(ReportKind::Pirep, value, pos, "bad /FV visibility")),
                },
                "TA" => report.temperature_c = parse_air_temperature(value),
                "TB" => report.turbulence = text_value,
                "IC" => report.icing = text_value,
                "RM" => report.remarks = text_value,
                // Wind aloft: no bearing on surface decisions.
                _ => {}
            }
        }

        if report.location.is_empty() {
            return Err(ParseError::MissingField {
                report: ReportKind::Pirep,
                field: "location (/OV)",
            });
        }

        report.cb_reported = report.sky.iter().any(|l| l.layer.is_cb())
            || report.weather.iter().any(|w| w.is_thunderstorm())
            || mentions_cb(&upper);
        report.issues = issues;
        Ok(report)
    }

    fn parse_sky(&mut self, value: &str, pos: usize, issues: &mut Vec<ParseIssue>) {
        for part in value.split(|c: char| c.is_whitespace() || c == '/').filter(|p| !p.is_empty()) {
            if matches!(part, "SKC" | "CLR" | "NSC") {
                self.sky_clear = true;
                continue;
            }
            let (base, top) = match part.split_once('-') {
                Some((b, t)) => (b, Some(t)),
                None => (part, None),
            };
            let top_ft = top.and_then(|t| {
                let digits = t.strip_prefix("TOP").unwrap_or(t);
                digits.parse::<u32>().ok().map(|h| h * 100)
            });
            match parse_cloud(base) {
                Some(layer) => self.sky.push(PirepLayer { layer, top_ft }),
                None => issues.push(ParseIssue::invalid(ReportKind::Pirep, part, pos, "bad /SK layer")),
            }
        }
    }

    fn parse_weather(&mut self, value: &str, pos: usize, issues: &mut Vec<ParseIssue>) {
        for tok in value.split_whitespace() {
            if let Some(vis) = tok.strip_prefix("FV") {
                match parse_flight_visibility(vis) {
                    Some(m) => self.visibility_m = Some(m),
                    None => issues.push(ParseIssue::invalid(ReportKind::Pirep, tok, pos, "bad flight visibility")),
                }
            } else if let Some(p) = Phenomenon::parse(tok) {
                self.weather.push(p);
            } else if tok != "CB" && tok != "NSW" {
                issues.push(ParseIssue::unrecognized(ReportKind::Pirep, tok, pos));
            }
        }
    }
}

/// Split into the header and `(code, value)` pairs at each `/XX` marker.
fn split_fields(text: &str) -> (&str, Vec<(&str, &str)>) {
    let bytes = text.as_bytes();
    let mut marks = Vec::new();
    for (i, _) in text.match_indices('/') {
        let Some(code) = text.get(i + 1..i + 3) else { continue };
        if !FIELDS.contains(&code) {
            continue;
        }
        let boundary = bytes
            .get(i + 3)
            .map_or(true, |c| c.is_ascii_whitespace() || c.is_ascii_digit() || *c == b'/' || *c == b'-');
        if boundary {
            marks.push(i);
        }
    }

    let header = marks.first().map_or(text, |&first| &text[..first]);
    let fields = marks
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = marks.get(n + 1).copied().unwrap_or(text.len());
            (&text[start + 1..start + 3], &text[start + 3..end])
        })
        .collect();
    (header, fields)
}

fn parse_hhmm(value: &str) -> Option<(u32, u32)> {
    let v = value.trim_end_matches('Z');
    if v.len() != 4 || !v.bytes().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((v[..2].parse().ok()?, v[2..].parse().ok()?))
}

/// `080` is FL080 (8000 ft). `UNKN`, `DURC`, `DURD` carry no level.
fn parse_flight_level(value: &str) -> Option<u32> {
    let digits = value.trim_start_matches("FL");
    if digits.len() == 3 && digits.bytes().all(|c| c.is_ascii_digit()) {
        digits.parse::<u32>().ok().map(|fl| fl * 100)
    } else {
        None
    }
}

/// `5SM`, `03SM`, `3KM`, `800M`, or bare meters.
fn parse_flight_visibility(value: &str) -> Option<u32> {
    let value = value.trim();
    if value.ends_with("SM") {
        return parse_statute_miles(value);
    }
    if let Some(km) = value.strip_suffix("KM") {
        let km: f64 = km.parse().ok()?;
        return Some(((km * 1000.0).round() as u32).min(VISIBILITY_UNLIMITED_M));
    }
    let meters: u32 = value.strip_suffix('M').unwrap_or(value).parse().ok()?;
    Some(meters.min(VISIBILITY_UNLIMITED_M))
}

fn parse_air_temperature(value: &str) -> Option<i16> {
    let v = value.split_whitespace().next()?;
    if let Some(neg) = v.strip_prefix('M').or_else(|| v.strip_prefix('-')) {
        return neg.parse::<i16>().ok().map(|t| -t);
    }
    v.trim_start_matches('+').parse().ok()
}

fn mentions_cb(text: &str) -> bool {
    text.split(|c: char| c.is_whitespace() || c == '/')
        .any(|tok| tok == "CB" || tok == "CBS" || tok.ends_with("CB") && parse_cloud(tok).is_some())
        || text
            .split_whitespace()
            .filter_map(Phenomenon::parse)
            .any(|p| p.is_thunderstorm())
        || text.contains("THUNDERSTORM")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
