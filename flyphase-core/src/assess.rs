//! End-to-end assessment: reports in, phase and alternate out.
//!
//! parse → normalize → resolve → runway → phase → bird cap → service
//! impacts → alternate requirement → selection → fuel.
//! Failures on home-field reports abort; failures confined to one alternate
//! candidate are absorbed into that candidate's rejection.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::airfield::{Airfield, AirfieldDataset};
use crate::alternate::{select, AlternateDecision, CandidateInput, ForecastStatus, NotamImpact, SelectionContext};
use crate::classify::{parse_labeled, Report};
use crate::clock::ParseContext;
use crate::config::Config;
use crate::element::{bird_element, normalize, normalize_warning, NormalizeOptions, WeatherElement};
use crate::fuel::FuelOptions;
use crate::phase::{apply_bird_cap, IfrMinima, PhaseResult, PhaseTable};
use crate::pipeline::{resolve_with_radius, ResolvedConditions, TimeWindow};
use crate::services::{apply_service_impacts, classify_notes};
use crate::types::*;
use crate::wind::resolve_runway;

/// Visibility below which an alternate is required.
pub const ALTERNATE_VISIBILITY_M: u32 = 5000;
/// Ceiling below which an alternate is required.
pub const ALTERNATE_CEILING_FT: u32 = 1500;

/// Operator inputs for one assessment.
#[derive(Debug, Clone, Default)]
pub struct AssessmentInput {
    /// Home-field reports, optionally labeled `METAR:`/`TAF:`/`PIREP:`.
    pub reports: Vec<String>,
    pub warning: Option<String>,
    /// Validity of the warning; None is indefinite.
    pub warning_window: Option<TimeWindow>,
    pub notes: Option<String>,
    pub bird: BirdLevel,
    pub runway: Option<String>,
    pub fuel: FuelOptions,
    pub sortie_time: Option<DateTime<Utc>>,
    /// Pre-fetched alternate forecasts by ICAO. Missing means unavailable.
    pub forecasts: HashMap<String, ForecastStatus>,
    /// Pre-classified NOTAM impacts by ICAO.
    pub notams: HashMap<String, NotamImpact>,
    pub always_alternate: bool,
    /// Reject any report with unrecognized groups.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortieOutlook {
    pub sortie_time: DateTime<Utc>,
    pub window: TimeWindow,
    /// Phase for the current window, for comparison.
    pub current_phase: Phase,
    pub sortie_phase: Phase,
    pub deteriorating: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assessment {
    pub generated_at: DateTime<Utc>,
    pub home: String,
    pub phase: PhaseResult,
    pub alternate_required: bool,
    pub alternate_reasons: Vec<String>,
    pub alternate: Option<AlternateDecision>,
    pub sortie: Option<SortieOutlook>,
    pub advisories: Vec<String>,
    pub parse_issues: Vec<ParseIssue>,
}

/// Run a full assessment at `now`.
pub fn assess(
    input: &AssessmentInput,
    dataset: &AirfieldDataset,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<Assessment> {
    let home = dataset.home_airfield()?;
    let ctx = ParseContext::new(now, &home.icao);

    let reports = parse_home_reports(&input.reports, &ctx, input.strict)?;
    let mut advisories = Vec::new();
    let mut parse_issues = Vec::new();
    for r in &reports {
        parse_issues.extend(r.issues().iter().cloned());
        if let Report::Metar(m) = r {
            if !home.matches(&m.station) {
                warn!(station = %m.station, home = %home.icao, "METAR is not for the home field");
                advisories.push(format!("METAR is for {}, expected {}", m.station, home.icao));
            }
            advisories.extend(m.validate().into_iter().map(|w| format!("METAR: {w}")));
        }
    }
    for issue in &parse_issues {
        warn!(issue = %issue, "parse issue");
    }

    let elements = home_elements(&reports, input, home, config, now);
    let windows = &config.windows;
    let limits = &config.limits;
    let local_window = TimeWindow::around(now, windows.local_lookahead());

    let manual_end = match &input.runway {
        Some(id) => Some(home.runway_end(id).ok_or_else(|| DataError::UnknownRunway {
            icao: home.icao.clone(),
            runway: id.clone(),
        })?),
        None => None,
    };
    let table = PhaseTable::new(limits, IfrMinima::from_approaches(&home.approaches, limits));
    let home_ends = home.runway_ends();

    let decide = |conditions: &ResolvedConditions| -> PhaseResult {
        let runway = resolve_runway(&conditions.winds, &home_ends, manual_end);
        let result = table.evaluate(conditions, runway.as_ref());
        let result = apply_bird_cap(result, conditions.bird_level);
        let notes = input.notes.as_deref().map(classify_notes).unwrap_or_default();
        apply_service_impacts(result, &notes)
    };

    let current = resolve_with_radius(&elements, local_window, PHASE_SOURCES, limits.cb_radius_nm);
    let current_phase = decide(&current);

    let (phase, sortie) = match input.sortie_time {
        Some(sortie_time) => {
            // observations cannot cover the future, so the forecast is eligible
            let window = TimeWindow::around(sortie_time, windows.sortie_half_width());
            let conditions = resolve_with_radius(&elements, window, ALL_SOURCES, limits.cb_radius_nm);
            let sortie_phase = decide(&conditions);
            let outlook = SortieOutlook {
                sortie_time,
                window,
                current_phase: current_phase.phase,
                sortie_phase: sortie_phase.phase,
                deteriorating: sortie_phase.phase > current_phase.phase,
            };
            debug!(sortie = %sortie_time, phase = %outlook.sortie_phase, "sortie outlook");
            (sortie_phase, Some(outlook))
        }
        None => (current_phase, None),
    };
    advisories.extend(phase.advisories.iter().cloned());
    if let Some(w) = &input.warning {
        advisories.push(format!("weather warning: {w}"));
    }

    let full = resolve_with_radius(&elements, local_window, ALL_SOURCES, limits.cb_radius_nm);
    let alternate_reasons = alternate_reasons(&full);
    let alternate_required = !alternate_reasons.is_empty();

    let alternate = (alternate_required || input.always_alternate).then(|| {
        let candidates: Vec<CandidateInput> = dataset
            .alternate_priority
            .iter()
            .map(|icao| {
                let key = icao.to_ascii_uppercase();
                let forecast = input
                    .forecasts
                    .get(&key)
                    .cloned()
                    .unwrap_or(ForecastStatus::Unavailable);
                let notam = input.notams.get(&key).cloned().unwrap_or_default();
                CandidateInput::new(icao, forecast).with_notam(notam)
            })
            .collect();
        let sel = SelectionContext {
            dataset,
            config,
            now,
            window: TimeWindow::ahead(now, windows.alternate_lookahead()),
            fuel: input.fuel,
            home_winds: &current.winds,
        };
        select(&candidates, &sel)
    });

    info!(
        home = %home.icao,
        phase = %phase.phase,
        alternate_required,
        alternate = ?alternate.as_ref().and_then(|d| d.selected()).map(|c| c.icao.as_str()),
        "assessment complete"
    );

    Ok(Assessment {
        generated_at: now,
        home: home.icao.clone(),
        phase,
        alternate_required,
        alternate_reasons,
        alternate,
        sortie,
        advisories,
        parse_issues,
    })
}

fn parse_home_reports(texts: &[String], ctx: &ParseContext, strict: bool) -> Result<Vec<Report>> {
    let mut reports = Vec::with_capacity(texts.len());
    for text in texts {
        let report = parse_labeled(text, ctx)?;
        if strict {
            if let Some(issue) = report.issues().first() {
                return Err(issue.clone().into_error().into());
            }
        }
        debug!(kind = %report.kind(), "parsed home report");
        reports.push(report);
    }
    if !reports.iter().any(|r| matches!(r, Report::Metar(_))) {
        return Err(ParseError::MissingField {
            report: ReportKind::Metar,
            field: "home observation",
        }
        .into());
    }
    Ok(reports)
}

fn home_elements(
    reports: &[Report],
    input: &AssessmentInput,
    home: &Airfield,
    config: &Config,
    now: DateTime<Utc>,
) -> Vec<WeatherElement> {
    let opts = NormalizeOptions {
        metar_staleness: config.windows.metar_staleness(),
        pirep_horizon: config.windows.pirep_horizon(),
        elevation_ft: home.elevation_ft,
    };
    let mut elements: Vec<WeatherElement> = reports.iter().flat_map(|r| normalize(r, &opts)).collect();
    if let Some(text) = &input.warning {
        let (from, to) = input
            .warning_window
            .map_or((None, None), |w| (Some(w.start), Some(w.end)));
        elements.extend(normalize_warning(text, from, to, now));
    }
    elements.push(bird_element(input.bird, now));
    elements
}

/// Why the full-source local picture requires an alternate.
pub fn alternate_reasons(full: &ResolvedConditions) -> Vec<String> {
    let mut reasons = Vec::new();
    if let Some(v) = full.visibility_m.filter(|v| *v < ALTERNATE_VISIBILITY_M) {
        reasons.push(format!("visibility {v} m below {ALTERNATE_VISIBILITY_M} m"));
    }
    if let Some(c) = full.ceiling_ft.filter(|c| *c < ALTERNATE_CEILING_FT) {
        reasons.push(format!("ceiling {c} ft below {ALTERNATE_CEILING_FT} ft"));
    }
    if full.cb_within_radius {
        reasons.push("CB forecast or reported".into());
    }
    reasons
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alternate::AlternateOutcome;
    use chrono::{Duration, TimeZone};

    const DATA: &str = r#"{
        "home": "OEKF",
        "alternate_priority": ["OERK", "OEPS"],
        "airfields": [
            {"icao": "OEKF", "elevation_ft": 2070,
             "runways": [{"ends": [{"id": "15", "heading": 150}, {"id": "33", "heading": 330}]}],
             "approaches": [{"kind": "ILS", "runway": "33", "ceiling_ft": 200, "visibility_m": 800}]},
            {"icao": "OERK", "elevation_ft": 2049,
             "runways": [{"ends": [{"id": "15L", "heading": 150}, {"id": "33R", "heading": 330}]}],
             "approaches": [{"kind": "ILS", "ceiling_ft": 200, "visibility_m": 800}],
             "distance_nm": 38, "base_fuel_lbs": 1200},
            {"icao": "OEPS", "elevation_ft": 1651,
             "runways": [{"ends": [{"id": "17", "heading": 170}, {"id": "35", "heading": 350}]}],
             "distance_nm": 60, "base_fuel_lbs": 1500}
        ]
    }"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 31, 6, 0, 0).unwrap()
    }

    fn run(input: &AssessmentInput) -> Result<Assessment> {
        let dataset = AirfieldDataset::from_json(DATA).unwrap();
        assess(input, &dataset, &Config::default(), now())
    }

    fn with_reports(reports: &[&str]) -> AssessmentInput {
        AssessmentInput {
            reports: reports.iter().map(|s| s.to_string()).collect(),
            ..AssessmentInput::default()
        }
    }

    #[test]
    fn test_good_day_no_alternate() {
        let a = run(&with_reports(&["OEKF 310600Z 33012KT 9999 FEW080 22/10 Q1018"])).unwrap();
        assert_eq!(a.phase.phase, Phase::Unrestricted);
        assert!(!a.alternate_required);
        assert!(a.alternate.is_none());
        assert_eq!(a.home, "OEKF");
    }

    #[test]
    fn test_low_visibility_requires_alternate() {
        let mut input = with_reports(&["33012KT 3000 BKN012 18/12 Q1012"]);
        input.forecasts.insert(
            "OERK".into(),
            ForecastStatus::Provided("TAF OERK 310500Z 3106/0112 33010KT 9999 SCT040".into()),
        );
        let a = run(&input).unwrap();
        assert_eq!(a.phase.phase, Phase::Ifr);
        assert!(a.alternate_required);
        assert_eq!(a.alternate_reasons.len(), 2);
        let d = a.alternate.unwrap();
        assert_eq!(d.selected().unwrap().icao, "OERK");
    }

    #[test]
    fn test_home_taf_triggers_alternate_but_not_phase() {
        let a = run(&with_reports(&[
            "OEKF 310600Z 33012KT 9999 FEW080 22/10 Q1018",
            "TAF OEKF 310500Z 3106/0112 33012KT 9999 SCT040 TEMPO 3106/3109 3000 TSRA",
        ]))
        .unwrap();
        assert_eq!(a.phase.phase, Phase::Unrestricted);
        assert!(a.alternate_required);
        // no forecasts supplied: everything unassessed, first taken provisionally
        let d = a.alternate.unwrap();
        assert_eq!(
            d.outcome,
            AlternateOutcome::Selected {
                icao: "OERK".into(),
                provisional: true
            }
        );
    }

    #[test]
    fn test_missing_metar_is_fatal() {
        let err = run(&with_reports(&["UA /OV OEKF /TM 0600 /FL080 /SK BKN040"])).unwrap_err();
        assert!(err.to_string().contains("home observation"));
    }

    #[test]
    fn test_corrupt_home_report_is_fatal() {
        assert!(run(&with_reports(&["33012KT FEW080"])).is_err());
    }

    #[test]
    fn test_strict_rejects_unknown_group() {
        let mut input = with_reports(&["33012KT 9999 ZZZZZZ FEW080"]);
        assert!(run(&input).is_ok());
        input.strict = true;
        let err = run(&input).unwrap_err();
        assert!(matches!(err, PhaseError::Parse(ParseError::UnrecognizedGroup { .. })));
    }

    #[test]
    fn test_unknown_manual_runway_is_data_error() {
        let mut input = with_reports(&["33012KT 9999 FEW080"]);
        input.runway = Some("09".into());
        assert!(matches!(
            run(&input).unwrap_err(),
            PhaseError::Data(DataError::UnknownRunway { .. })
        ));
    }

    #[test]
    fn test_warning_forces_recall() {
        let mut input = with_reports(&["33012KT 9999 FEW080 22/10 Q1018"]);
        input.warning = Some("TS EXPECTED WITHIN 20NM".into());
        let a = run(&input).unwrap();
        assert_eq!(a.phase.phase, Phase::Recall);
        assert!(a.alternate_required);
    }

    #[test]
    fn test_bird_and_notes_stack() {
        let mut input = with_reports(&["33012KT 9999 FEW080 22/10 Q1018"]);
        input.bird = BirdLevel::Moderate;
        input.notes = Some("no ATC".into());
        let a = run(&input).unwrap();
        assert_eq!(a.phase.phase, Phase::Hold);
        assert!(a.phase.advisories.iter().any(|x| x.contains("formation")));
    }

    #[test]
    fn test_sortie_outlook_uses_forecast() {
        let mut input = with_reports(&[
            "OEKF 310600Z 33012KT 9999 FEW080 22/10 Q1018",
            "TAF OEKF 310500Z 3106/0112 33012KT 9999 SCT040 BECMG 3110/3111 4000 DU BKN010",
        ]);
        input.sortie_time = Some(now() + Duration::hours(6));
        let a = run(&input).unwrap();
        let s = a.sortie.unwrap();
        assert_eq!(s.current_phase, Phase::Unrestricted);
        // 4000 m under BKN010: below VFR, above the ILS minima
        assert_eq!(s.sortie_phase, Phase::Ifr);
        assert!(s.deteriorating);
        assert_eq!(a.phase.phase, Phase::Ifr);
    }
}
