//! TAF parsing: a base period followed by BECMG/TEMPO/PROB/FM change groups.
//!
//! Each period is a sparse overlay. Fields it does not mention stay `None`
//! and fall through to earlier periods when elements are resolved.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::{resolve_day_time, two_digit_fields, ParseContext};
use crate::metar::{
    is_station, parse_cloud, parse_statute_miles, parse_visibility_meters, parse_wind,
    VISIBILITY_UNLIMITED_M,
};
use crate::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Base,
    Becmg,
    Tempo,
    /// PROB30/PROB40, with or without TEMPO.
    Prob(u8),
    /// FMddhhmm: replaces everything from its start time.
    From,
}

impl ChangeKind {
    /// Temporary fluctuations never supersede the prevailing forecast.
    pub fn is_temporary(self) -> bool {
        matches!(self, ChangeKind::Tempo | ChangeKind::Prob(_))
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Base => write!(f, "BASE"),
            ChangeKind::Becmg => write!(f, "BECMG"),
            ChangeKind::Tempo => write!(f, "TEMPO"),
            ChangeKind::Prob(p) => write!(f, "PROB{p}"),
            ChangeKind::From => write!(f, "FM"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TafPeriod {
    pub kind: ChangeKind,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub wind: Option<Wind>,
    pub visibility_m: Option<u32>,
    /// `Some(vec![])` means sky explicitly cleared (NSC/SKC/CAVOK).
    pub clouds: Option<Vec<CloudLayer>>,
    /// `Some(vec![])` means NSW.
    pub weather: Option<Vec<Phenomenon>>,
    pub cavok: bool,
    /// Bare `CB` group in the period.
    pub cb_mentioned: bool,
}

impl TafPeriod {
    fn new(kind: ChangeKind, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        TafPeriod {
            kind,
            from,
            to,
            wind: None,
            visibility_m: None,
            clouds: None,
            weather: None,
            cavok: false,
            cb_mentioned: false,
        }
    }

    pub fn has_cb(&self) -> bool {
        self.cb_mentioned
            || self.clouds.iter().flatten().any(|c| c.is_cb())
            || self.weather.iter().flatten().any(|w| w.is_thunderstorm())
    }

    fn is_empty(&self) -> bool {
        self.wind.is_none()
            && self.visibility_m.is_none()
            && self.clouds.is_none()
            && self.weather.is_none()
            && !self.cb_mentioned
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TafForecast {
    pub station: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub amended: bool,
    /// Base period first, change groups in report order.
    pub periods: Vec<TafPeriod>,
    pub issues: Vec<ParseIssue>,
}

impl TafForecast {
    pub fn parse(text: &str, ctx: &ParseContext) -> std::result::Result<Self, ParseError> {
        let upper = text.trim().to_ascii_uppercase();
        if upper.is_empty() {
            return Err(ParseError::Empty);
        }
        // Remarks are not forecast content.
        let body = upper.split(" RMK").next().unwrap_or_default();
        let tokens: Vec<&str> = body.split_whitespace().collect();

        let mut station = None;
        let mut issued_at = None;
        let mut amended = false;
        let mut validity = None;
        let mut issues = Vec::new();
        let mut i = 0;

        // Header: everything up to and including the validity period.
        while i < tokens.len() && validity.is_none() {
            let tok = tokens[i];
            let pos = i + 1;
            i += 1;
            match tok {
                "TAF" => {}
                "AMD" | "COR" => amended = true,
                _ if tok.len() == 7 && tok.ends_with('Z') && tok.is_ascii() => {
                    issued_at = two_digit_fields(&tok[..6])
                        .and_then(|f| resolve_day_time(ctx.now, f[0], f[1], f[2]));
                    if issued_at.is_none() {
                        issues.push(ParseIssue::invalid(ReportKind::Taf, tok, pos, "impossible issue time"));
                    }
                }
                _ if station.is_none() && is_station(tok) => station = Some(tok.to_string()),
                _ => {
                    let reference = issued_at.unwrap_or(ctx.now);
                    match parse_range(tok, reference) {
                        Some(range) => validity = Some(range),
                        None if is_change_indicator(tok) => {
                            return Err(ParseError::MissingField {
                                report: ReportKind::Taf,
                                field: "validity period",
                            })
                        }
                        None => issues.push(ParseIssue::unrecognized(ReportKind::Taf, tok, pos)),
                    }
                }
            }
        }

        let (valid_from, valid_to) = validity.ok_or(ParseError::MissingField {
            report: ReportKind::Taf,
            field: "validity period",
        })?;

        let mut periods = vec![TafPeriod::new(ChangeKind::Base, valid_from, valid_to)];
        // None while skipping a change group whose time could not be read.
        let mut current: Option<usize> = Some(0);

        while i < tokens.len() {
            let tok = tokens[i];
            let pos = i + 1;
            i += 1;

            if !tok.is_ascii() {
                issues.push(ParseIssue::unrecognized(ReportKind::Taf, tok, pos));
                continue;
            }

            if is_change_indicator(tok) {
                let opened = open_change_group(tok, &tokens, &mut i, valid_from, valid_to);
                match opened {
                    Some(period) => {
                        periods.push(period);
                        current = Some(periods.len() - 1);
                    }
                    None => {
                        issues.push(ParseIssue::invalid(
                            ReportKind::Taf,
                            tok,
                            pos,
                            "change group without a readable time",
                        ));
                        current = None;
                    }
                }
                continue;
            }

            let Some(idx) = current else { continue };
            if !apply_group(&mut periods[idx], tok) {
                issues.push(ParseIssue::unrecognized(ReportKind::Taf, tok, pos));
            }
        }

        close_from_groups(&mut periods, valid_to);
        periods.retain(|p| p.kind == ChangeKind::Base || !p.is_empty());

        Ok(TafForecast {
            station: station.unwrap_or_else(|| ctx.home_icao.clone()),
            issued_at,
            valid_from,
            valid_to,
            amended,
            periods,
            issues,
        })
    }

    pub fn has_cb(&self) -> bool {
        self.periods.iter().any(TafPeriod::has_cb)
    }

    pub fn base(&self) -> Option<&TafPeriod> {
        self.periods.first()
    }
}

fn is_change_indicator(tok: &str) -> bool {
    matches!(tok, "BECMG" | "TEMPO" | "FM")
        || tok.starts_with("PROB")
        || (tok.len() == 8 && tok.starts_with("FM") && tok[2..].bytes().all(|c| c.is_ascii_digit()))
}

/// `ddhh/ddhh`, end resolved relative to start.
fn parse_range(tok: &str, reference: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let (a, b) = tok.split_once('/')?;
    if a.len() != 4 || b.len() != 4 {
        return None;
    }
    let start = two_digit_fields(a)?;
    let end = two_digit_fields(b)?;
    let from = resolve_day_time(reference, start[0], start[1], 0)?;
    let to = resolve_day_time(from, end[0], end[1], 0)?;
    (to > from).then_some((from, to))
}

/// Consume the change indicator's time group(s) and open a period.
fn open_change_group(
    tok: &str,
    tokens: &[&str],
    i: &mut usize,
    valid_from: DateTime<Utc>,
    valid_to: DateTime<Utc>,
) -> Option<TafPeriod> {
    let take_range = |i: &mut usize| {
        let range = tokens.get(*i).and_then(|t| parse_range(t, valid_from));
        if range.is_some() {
            *i += 1;
        }
        range
    };

    match tok {
        "BECMG" => take_range(i).map(|(f, t)| TafPeriod::new(ChangeKind::Becmg, f, t)),
        "TEMPO" => take_range(i).map(|(f, t)| TafPeriod::new(ChangeKind::Tempo, f, t)),
        _ if tok.starts_with("PROB") => {
            let pct: u8 = tok[4..].parse().ok()?;
            if tokens.get(*i) == Some(&"TEMPO") {
                *i += 1;
            }
            take_range(i).map(|(f, t)| TafPeriod::new(ChangeKind::Prob(pct), f, t))
        }
        _ => {
            // FMddhhmm, or FM followed by ddhhmm
            let digits = if tok == "FM" {
                let next = tokens.get(*i)?;
                *i += 1;
                next.to_string()
            } else {
                tok[2..].to_string()
            };
            let f = two_digit_fields(&digits).filter(|f| f.len() == 3)?;
            let from = resolve_day_time(valid_from, f[0], f[1], f[2])?;
            Some(TafPeriod::new(ChangeKind::From, from, valid_to))
        }
    }
}

/// Apply one weather group to a period. Returns false if unrecognized.
fn apply_group(period: &mut TafPeriod, tok: &str) -> bool {
    if let Some(wind) = parse_wind(tok) {
        period.wind = Some(wind);
    } else if tok == "CAVOK" {
        period.cavok = true;
        period.visibility_m = Some(VISIBILITY_UNLIMITED_M);
        period.clouds = Some(Vec::new());
        period.weather = Some(Vec::new());
    } else if let Some(m) = parse_visibility_meters(tok).or_else(|| parse_statute_miles(tok)) {
        period.visibility_m = Some(period.visibility_m.map_or(m, |v| v.min(m)));
    } else if let Some(layer) = parse_cloud(tok) {
        period.clouds.get_or_insert_with(Vec::new).push(layer);
    } else if matches!(tok, "NSC" | "SKC" | "CLR") {
        period.clouds = Some(Vec::new());
    } else if tok == "NSW" {
        period.weather = Some(Vec::new());
    } else if let Some(p) = Phenomenon::parse(tok) {
        period.weather.get_or_insert_with(Vec::new).push(p);
    } else if tok == "CB" {
        period.cb_mentioned = true;
    } else if is_temperature_forecast(tok) || tok.starts_with("QNH") {
        // TXnn/ddhhZ, TNnn/ddhhZ: not used by any decision
    } else {
        return false;
    }
    true
}

fn is_temperature_forecast(tok: &str) -> bool {
    (tok.starts_with("TX") || tok.starts_with("TN")) && tok.ends_with('Z') && tok.contains('/')
}

/// FM periods run until the next FM or the end of the forecast.
fn close_from_groups(periods: &mut [TafPeriod], valid_to: DateTime<Utc>) {
    let starts: Vec<(usize, DateTime<Utc>)> = periods
        .iter()
        .enumerate()
        .filter(|(_, p)| p.kind == ChangeKind::From)
        .map(|(i, p)| (i, p.from))
        .collect();
    for (n, (idx, _)) in starts.iter().enumerate() {
        periods[*idx].to = starts.get(n + 1).map_or(valid_to, |(_, next)| *next);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> ParseContext {
        ParseContext::new(Utc.with_ymd_and_hms(2026, 3, 31, 5, 0, 0).unwrap(), "OEKF")
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, m, 0).unwrap()
    }

    fn parse(text: &str) -> TafForecast {
        TafForecast::parse(text, &ctx()).unwrap()
    }

    #[test]
    fn test_base_period() {
        let taf = parse("TAF OERK 310500Z 3106/0112 33012KT 9999 SCT040");
        assert_eq!(taf.station, "OERK");
        assert_eq!(taf.issued_at, Some(at(31, 5, 0)));
        assert_eq!(taf.valid_from, at(31, 6, 0));
        assert_eq!(taf.valid_to, Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap());
        let base = taf.base().unwrap();
        assert_eq!(base.kind, ChangeKind::Base);
        assert_eq!(base.wind, Some(Wind::new(330, 12, None)));
        assert_eq!(base.visibility_m, Some(10_000));
        assert!(taf.issues.is_empty());
    }

    #[test]
    fn test_becmg_period() {
        let taf = parse("TAF OERK 310500Z 3106/0112 33012KT 9999 SCT040 BECMG 3110/3112 28020G30KT");
        assert_eq!(taf.periods.len(), 2);
        let becmg = &taf.periods[1];
        assert_eq!(becmg.kind, ChangeKind::Becmg);
        assert_eq!((becmg.from, becmg.to), (at(31, 10, 0), at(31, 12, 0)));
        assert_eq!(becmg.wind.unwrap().effective_kt(), 30);
        assert!(becmg.visibility_m.is_none());
    }

    #[test]
    fn test_tempo_and_prob() {
        let taf = parse(
            "TAF OERK 310500Z 3106/0112 33012KT 9999 SCT040 TEMPO 3112/3116 3000 TSRA BKN030CB PROB30 TEMPO 3118/3120 1500 DU",
        );
        assert_eq!(taf.periods[1].kind, ChangeKind::Tempo);
        assert!(taf.periods[1].has_cb());
        assert_eq!(taf.periods[2].kind, ChangeKind::Prob(30));
        assert!(taf.periods[2].kind.is_temporary());
        assert_eq!(taf.periods[2].visibility_m, Some(1500));
        assert!(taf.has_cb());
    }

    #[test]
    fn test_fm_periods_chain() {
        let taf = parse("TAF OERK 310500Z 3106/0112 33012KT 9999 SCT040 FM311400 18015KT 8000 FM010200 VRB03KT CAVOK");
        let fm1 = &taf.periods[1];
        let fm2 = &taf.periods[2];
        assert_eq!(fm1.kind, ChangeKind::From);
        assert_eq!(fm1.from, at(31, 14, 0));
        assert_eq!(fm1.to, fm2.from);
        assert_eq!(fm2.to, taf.valid_to);
        assert_eq!(fm2.clouds, Some(vec![]));
    }

    #[test]
    fn test_validity_hour_24() {
        let taf = parse("TAF OEKF 310500Z 3106/3124 33012KT 9999 NSC");
        assert_eq!(taf.valid_to, Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_station_defaults_home() {
        let taf = parse("3106/0112 33012KT 9999 SCT040 BECMG 3110/3112 4000 BR");
        assert_eq!(taf.station, "OEKF");
        assert_eq!(taf.periods[1].visibility_m, Some(4000));
    }

    #[test]
    fn test_missing_validity_is_field_error() {
        let err = TafForecast::parse("TAF OERK 310500Z 33012KT 9999 SCT040", &ctx()).unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingField {
                report: ReportKind::Taf,
                field: "validity period"
            }
        );
    }

    #[test]
    fn test_nsw_and_temperature_groups() {
        let taf = parse("TAF OERK 310500Z 3106/0112 33012KT 9999 -RA SCT040 TX35/3112Z TN20/0103Z BECMG 3110/3112 NSW");
        assert!(taf.issues.is_empty());
        assert_eq!(taf.periods[1].weather, Some(vec![]));
    }

    #[test]
    fn test_unknown_group_reported() {
        let taf = parse("TAF OERK 310500Z 3106/0112 33012KT 9999 ZZZZZZ SCT040");
        assert_eq!(taf.issues.len(), 1);
        assert_eq!(taf.issues[0].token, "ZZZZZZ");
    }

    #[test]
    fn test_change_group_without_time_is_skipped() {
        let taf = parse("TAF OERK 310500Z 3106/0112 33012KT 9999 SCT040 BECMG 0800 FG");
        assert_eq!(taf.periods.len(), 1);
        assert_eq!(taf.issues.len(), 1);
        assert_eq!(taf.issues[0].token, "BECMG");
    }
}
