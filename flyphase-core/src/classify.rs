//! Report type detection by structural signature.

use serde::Serialize;

use crate::clock::ParseContext;
use crate::metar::{parse_cloud, parse_visibility_meters, parse_wind, MetarObservation};
use crate::pirep::Pirep;
use crate::taf::TafForecast;
use crate::types::{ParseError, ParseIssue, ReportKind};

/// A parsed report of any supported kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Report {
    Metar(MetarObservation),
    Taf(TafForecast),
    Pirep(Pirep),
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        match self {
            Report::Metar(_) => ReportKind::Metar,
            Report::Taf(_) => ReportKind::Taf,
            Report::Pirep(_) => ReportKind::Pirep,
        }
    }

    pub fn issues(&self) -> &[ParseIssue] {
        match self {
            Report::Metar(m) => &m.issues,
            Report::Taf(t) => &t.issues,
            Report::Pirep(p) => &p.issues,
        }
    }
}

/// Classify unlabeled report text.
///
/// - `UA`/`UUA` header, or `/OV` with `/SK`, `/WX` or `/FV`: PIREP
/// - `TAF` prefix, `BECMG ddhh/ddhh`, `FMddhhmm`, `PROBnn`, or `TEMPO ddhh/ddhh`
///   without a METAR observation time: TAF
/// - anything else: METAR
pub fn classify(text: &str) -> ReportKind {
    let upper = text.trim().to_ascii_uppercase();
    let tokens: Vec<&str> = upper.split_whitespace().collect();

    let header_ua = tokens
        .iter()
        .take(2)
        .any(|t| matches!(*t, "UA" | "UUA") || t.starts_with("UA/") || t.starts_with("UUA/"));
    let has_ov = upper.contains("/OV");
    if header_ua || (has_ov && (upper.contains("/SK") || upper.contains("/WX") || upper.contains("/FV"))) {
        return ReportKind::Pirep;
    }

    match tokens.first() {
        Some(&"TAF") => return ReportKind::Taf,
        Some(&"METAR") | Some(&"SPECI") => return ReportKind::Metar,
        _ => {}
    }

    let has_obs_time = tokens
        .iter()
        .any(|t| t.len() == 7 && t.is_ascii() && t.ends_with('Z') && t[..6].bytes().all(|c| c.is_ascii_digit()));
    let followed_by_range = |word: &str| {
        tokens
            .windows(2)
            .any(|w| w[0] == word && is_day_hour_range(w[1]))
    };
    let has_fm = tokens
        .iter()
        .any(|t| t.len() == 8 && t.starts_with("FM") && t[2..].bytes().all(|c| c.is_ascii_digit()));
    let has_prob = tokens
        .iter()
        .any(|t| t.len() == 6 && t.starts_with("PROB") && t[4..].bytes().all(|c| c.is_ascii_digit()));

    if followed_by_range("BECMG")
        || has_fm
        || has_prob
        || (followed_by_range("TEMPO") && !has_obs_time)
    {
        return ReportKind::Taf;
    }
    ReportKind::Metar
}

fn is_day_hour_range(tok: &str) -> bool {
    tok.len() == 9
        && tok.as_bytes()[4] == b'/'
        && tok[..4].bytes().all(|c| c.is_ascii_digit())
        && tok[5..].bytes().all(|c| c.is_ascii_digit())
}

/// Classify and parse. Input that fails METAR parsing and carries no
/// recognizable METAR group at all is reported as unclassifiable.
pub fn parse_report(text: &str, ctx: &ParseContext) -> Result<Report, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    match classify(text) {
        ReportKind::Pirep => Pirep::parse(text, ctx).map(Report::Pirep),
        ReportKind::Taf => TafForecast::parse(text, ctx).map(Report::Taf),
        ReportKind::Metar => match MetarObservation::parse(text, ctx) {
            Ok(m) => Ok(Report::Metar(m)),
            Err(err) if looks_like_metar(text) => Err(err),
            Err(_) => Err(ParseError::Unclassifiable {
                input: text.trim().chars().take(40).collect(),
            }),
        },
    }
}

/// Parse with an explicit type, skipping detection.
pub fn parse_as(kind: ReportKind, text: &str, ctx: &ParseContext) -> Result<Report, ParseError> {
    match kind {
        ReportKind::Metar => MetarObservation::parse(text, ctx).map(Report::Metar),
        ReportKind::Taf => TafForecast::parse(text, ctx).map(Report::Taf),
        ReportKind::Pirep => Pirep::parse(text, ctx).map(Report::Pirep),
    }
}

/// Split an optional `METAR:`, `TAF:` or `PIREP:` label off the front.
pub fn split_type_hint(text: &str) -> (Option<ReportKind>, &str) {
    let trimmed = text.trim_start();
    let Some((label, rest)) = trimmed.split_once(':') else {
        return (None, text);
    };
    let kind = match label.trim().to_ascii_uppercase().as_str() {
        "METAR" | "SPECI" => ReportKind::Metar,
        "TAF" => ReportKind::Taf,
        "PIREP" => ReportKind::Pirep,
        _ => return (None, text),
    };
    (Some(kind), rest)
}

/// Parse input that may carry a type label; unlabeled input is classified.
pub fn parse_labeled(text: &str, ctx: &ParseContext) -> Result<Report, ParseError> {
    match split_type_hint(text) {
        (Some(kind), rest) => parse_as(kind, rest, ctx),
        (None, _) => parse_report(text, ctx),
    }
}

fn looks_like_metar(text: &str) -> bool {
    let upper = text.trim().to_ascii_uppercase();
    upper.split_whitespace().any(|t| {
        matches!(t, "METAR" | "SPECI" | "CAVOK" | "NSC" | "SKC")
            || parse_wind(t).is_some()
            || parse_visibility_meters(t).is_some()
            || parse_cloud(t).is_some()
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ctx() -> ParseContext {
        ParseContext::new(Utc.with_ymd_and_hms(2026, 3, 31, 7, 0, 0).unwrap(), "OEKF")
    }

    #[test]
    fn test_classify_pirep() {
        assert_eq!(classify("UA /OV OEKF /FL080 /SK BKN040"), ReportKind::Pirep);
        assert_eq!(classify("UUA /OV OEKF /WX +TSRA"), ReportKind::Pirep);
        assert_eq!(classify("OEKF UA /OV OEKF /SK OVC010"), ReportKind::Pirep);
        assert_eq!(classify("/OV OEKF /SK BKN040"), ReportKind::Pirep);
    }

    #[test]
    fn test_classify_taf() {
        assert_eq!(classify("TAF OERK 310500Z 3106/0112 33012KT 9999 SCT040"), ReportKind::Taf);
        assert_eq!(classify("OERK 3106/0112 33012KT 9999 BECMG 3110/3112 4000"), ReportKind::Taf);
        assert_eq!(classify("3106/0112 33012KT 9999 FM311400 18015KT"), ReportKind::Taf);
        assert_eq!(classify("3106/0112 33012KT 9999 TEMPO 3112/3116 3000"), ReportKind::Taf);
    }

    #[test]
    fn test_classify_metar() {
        assert_eq!(classify("OEKF 310600Z 33012KT 9999 FEW080 22/10 Q1018"), ReportKind::Metar);
        assert_eq!(classify("33012KT 3000 BKN012 18/12 Q1012"), ReportKind::Metar);
        // METAR trend, not a TAF change group
        assert_eq!(
            classify("OEKF 310600Z 33012KT 9999 FEW080 22/10 Q1018 TEMPO 3112/3116 3000"),
            ReportKind::Metar
        );
        assert_eq!(classify("METAR OEKF 310600Z 33012KT 9999 NSC"), ReportKind::Metar);
    }

    #[test]
    fn test_parse_report_dispatches() {
        let r = parse_report("33012KT 3000 BKN012 18/12 Q1012", &ctx()).unwrap();
        assert_eq!(r.kind(), ReportKind::Metar);
        let r = parse_report("UA /OV OEKF /FL080 /SK BKN040", &ctx()).unwrap();
        assert_eq!(r.kind(), ReportKind::Pirep);
    }

    #[test]
    fn test_gibberish_is_unclassifiable() {
        let err = parse_report("hello tower how are you", &ctx()).unwrap_err();
        assert!(matches!(err, ParseError::Unclassifiable { .. }));
    }

    #[test]
    fn test_non_ascii_tokens_do_not_panic() {
        let err = parse_report("28°018KT 9999", &ctx()).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { .. }));
        let err = parse_report("123é FEW010", &ctx()).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { .. }));
        assert!(parse_report("ÉÉÉ°° ñññ", &ctx()).is_err());
        assert!(!looks_like_metar("28°018KT 12é4 FEW0é1 BKNé10"));
    }

    #[test]
    fn test_partial_metar_keeps_field_error() {
        let err = parse_report("33012KT FEW080", &ctx()).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { field: "visibility", .. }));
    }

    #[test]
    fn test_type_hint() {
        assert_eq!(split_type_hint("taf: 3106/0112 33012KT 9999").0, Some(ReportKind::Taf));
        assert_eq!(split_type_hint("METAR:33012KT 9999 NSC").1, "33012KT 9999 NSC");
        assert_eq!(split_type_hint("33012KT 9999 NSC").0, None);
        let r = parse_labeled("TAF: 3106/0112 33012KT 9999 SCT040", &ctx()).unwrap();
        assert_eq!(r.kind(), ReportKind::Taf);
    }

    #[test]
    fn test_parse_as_forces_kind() {
        let r = parse_as(ReportKind::Taf, "3106/0112 33012KT 9999 SCT040", &ctx()).unwrap();
        assert_eq!(r.kind(), ReportKind::Taf);
    }
}
