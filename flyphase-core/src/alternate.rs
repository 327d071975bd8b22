//! Alternate airfield selection.
//!
//! Candidates are walked in the fixed priority order. Each one is checked
//! against its NOTAM impact, its forecast is resolved over the alternate
//! window, and the phase table (built from its own usable approaches) decides
//! suitability. The first suitable candidate wins. Candidates without a
//! forecast are deferred behind every assessed one and only ever selected
//! provisionally.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::airfield::{Airfield, AirfieldDataset, Approach, Navaid, RunwayEnd};
use crate::classify::parse_report;
use crate::clock::ParseContext;
use crate::config::Config;
use crate::element::{normalize, NormalizeOptions};
use crate::fuel::{divert_fuel, FuelBreakdown, FuelOptions};
use crate::phase::{IfrMinima, PhaseTable};
use crate::pipeline::{resolve_with_radius, ResolvedConditions, TimeWindow};
use crate::types::*;
use crate::wind::{resolve_runway, RunwayWind};

/// Forecast text as delivered by the fetch collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForecastStatus {
    Provided(String),
    Unavailable,
    TimedOut,
}

/// Pre-classified NOTAM flags for one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotamImpact {
    pub aerodrome_closed: bool,
    pub closed_runways: Vec<String>,
    pub navaids_unserviceable: Vec<Navaid>,
}

impl NotamImpact {
    fn runway_closed(&self, id: &str) -> bool {
        self.closed_runways.iter().any(|r| r.eq_ignore_ascii_case(id))
    }

    fn approach_usable(&self, approach: &Approach) -> bool {
        let navaid_ok = approach
            .navaid()
            .map_or(true, |n| !self.navaids_unserviceable.contains(&n));
        let runway_ok = approach.runway.as_deref().map_or(true, |r| !self.runway_closed(r));
        navaid_ok && runway_ok
    }
}

/// One alternate candidate with its collaborator data.
#[derive(Debug, Clone)]
pub struct CandidateInput {
    pub icao: String,
    pub forecast: ForecastStatus,
    pub notam: NotamImpact,
}

impl CandidateInput {
    pub fn new(icao: &str, forecast: ForecastStatus) -> Self {
        CandidateInput {
            icao: icao.to_string(),
            forecast,
            notam: NotamImpact::default(),
        }
    }

    pub fn with_notam(mut self, notam: NotamImpact) -> Self {
        self.notam = notam;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    UnknownAirfield { detail: String },
    AerodromeClosed,
    AllRunwaysClosed,
    ForecastUnreadable { detail: String },
    NoUsableApproach,
    BelowMinima { phase: Phase },
    Recall { detail: String },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::UnknownAirfield { detail } => write!(f, "{detail}"),
            RejectionReason::AerodromeClosed => write!(f, "aerodrome closed (NOTAM)"),
            RejectionReason::AllRunwaysClosed => write!(f, "all runways closed (NOTAM)"),
            RejectionReason::ForecastUnreadable { detail } => write!(f, "forecast unreadable: {detail}"),
            RejectionReason::NoUsableApproach => write!(f, "no usable instrument approach"),
            RejectionReason::BelowMinima { phase } => write!(f, "forecast {phase}: below alternate minima"),
            RejectionReason::Recall { detail } => write!(f, "forecast RECALL: {detail}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Suitable,
    Rejected,
    Unassessed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateAssessment {
    pub icao: String,
    pub name: String,
    pub distance_nm: u32,
    pub status: CandidateStatus,
    pub phase: Option<Phase>,
    pub conditions: Option<ResolvedConditions>,
    pub runway: Option<RunwayWind>,
    pub rejection: Option<RejectionReason>,
    pub fuel: Option<FuelBreakdown>,
    pub warnings: Vec<String>,
}

impl CandidateAssessment {
    fn new(icao: &str, airfield: Option<&Airfield>) -> Self {
        CandidateAssessment {
            icao: airfield.map_or_else(|| icao.to_string(), |a| a.icao.clone()),
            name: airfield.map(|a| a.name.clone()).unwrap_or_default(),
            distance_nm: airfield.map_or(0, |a| a.distance_nm),
            status: CandidateStatus::Rejected,
            phase: None,
            conditions: None,
            runway: None,
            rejection: None,
            fuel: None,
            warnings: Vec::new(),
        }
    }

    fn rejected(mut self, reason: RejectionReason) -> Self {
        warn!(icao = %self.icao, reason = %reason, "alternate rejected");
        self.status = CandidateStatus::Rejected;
        self.rejection = Some(reason);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AlternateOutcome {
    Selected { icao: String, provisional: bool },
    NoSuitableAlternate,
}

/// The selection with every candidate looked at, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlternateDecision {
    pub outcome: AlternateOutcome,
    pub window: TimeWindow,
    pub candidates: Vec<CandidateAssessment>,
}

impl AlternateDecision {
    pub fn selected(&self) -> Option<&CandidateAssessment> {
        match &self.outcome {
            AlternateOutcome::Selected { icao, .. } => self.candidates.iter().find(|c| &c.icao == icao),
            AlternateOutcome::NoSuitableAlternate => None,
        }
    }

    pub fn is_none(&self) -> bool {
        self.outcome == AlternateOutcome::NoSuitableAlternate
    }
}

/// Everything the selector needs besides the candidates.
#[derive(Debug, Clone)]
pub struct SelectionContext<'a> {
    pub dataset: &'a AirfieldDataset,
    pub config: &'a Config,
    pub now: DateTime<Utc>,
    pub window: TimeWindow,
    pub fuel: FuelOptions,
    /// Home-field winds, used to estimate an unassessed candidate.
    pub home_winds: &'a [Wind],
}

/// Walk the candidates and pick the first suitable one.
pub fn select(candidates: &[CandidateInput], ctx: &SelectionContext<'_>) -> AlternateDecision {
    let mut assessed = Vec::new();
    let mut deferred: Vec<(CandidateAssessment, Vec<RunwayEnd>, u32)> = Vec::new();

    for input in candidates {
        match assess_candidate(input, ctx) {
            Verdict::Done(c) => {
                let suitable = c.status == CandidateStatus::Suitable;
                let icao = c.icao.clone();
                assessed.push(c);
                if suitable {
                    info!(icao = %icao, "alternate selected");
                    assessed.extend(deferred.into_iter().map(|(c, _, _)| c));
                    return AlternateDecision {
                        outcome: AlternateOutcome::Selected {
                            icao,
                            provisional: false,
                        },
                        window: ctx.window,
                        candidates: assessed,
                    };
                }
            }
            Verdict::Deferred(c, ends, base_fuel) => deferred.push((c, ends, base_fuel)),
        }
    }

    let mut deferred = deferred.into_iter();
    if let Some((mut c, ends, base_fuel)) = deferred.next() {
        let runway = resolve_runway(ctx.home_winds, &ends, None);
        let headwind = runway.as_ref().map_or(0.0, |r| r.headwind_kt);
        c.fuel = Some(divert_fuel(base_fuel, headwind, ctx.fuel, &ctx.config.fuel));
        c.runway = runway;
        c.warnings
            .push("forecast unassessed: provisional selection, runway and fuel estimated from home wind".into());
        let icao = c.icao.clone();
        warn!(icao = %icao, "no assessed alternate suitable, provisional selection");
        assessed.push(c);
        assessed.extend(deferred.map(|(c, _, _)| c));
        return AlternateDecision {
            outcome: AlternateOutcome::Selected {
                icao,
                provisional: true,
            },
            window: ctx.window,
            candidates: assessed,
        };
    }

    info!(candidates = assessed.len(), "no suitable alternate");
    AlternateDecision {
        outcome: AlternateOutcome::NoSuitableAlternate,
        window: ctx.window,
        candidates: assessed,
    }
}

enum Verdict {
    Done(CandidateAssessment),
    Deferred(CandidateAssessment, Vec<RunwayEnd>, u32),
}

fn assess_candidate(input: &CandidateInput, ctx: &SelectionContext<'_>) -> Verdict {
    let airfield = match ctx.dataset.get(&input.icao) {
        Ok(a) => a,
        Err(e) => {
            let c = CandidateAssessment::new(&input.icao, None);
            return Verdict::Done(c.rejected(RejectionReason::UnknownAirfield { detail: e.to_string() }));
        }
    };
    let mut c = CandidateAssessment::new(&input.icao, Some(airfield));
    let notam = &input.notam;

    if notam.aerodrome_closed {
        return Verdict::Done(c.rejected(RejectionReason::AerodromeClosed));
    }
    let open_ends: Vec<RunwayEnd> = airfield
        .runway_ends()
        .into_iter()
        .filter(|e| !notam.runway_closed(&e.id))
        .collect();
    if open_ends.is_empty() && !airfield.runways.is_empty() {
        return Verdict::Done(c.rejected(RejectionReason::AllRunwaysClosed));
    }
    for n in &notam.navaids_unserviceable {
        c.warnings.push(format!("{n} unserviceable (NOTAM)"));
    }

    let text = match &input.forecast {
        ForecastStatus::Provided(text) if !text.trim().is_empty() => text,
        ForecastStatus::TimedOut => {
            let err = PhaseError::CollaboratorTimeout {
                icao: airfield.icao.clone(),
            };
            warn!(icao = %airfield.icao, error = %err, "alternate deferred");
            c.status = CandidateStatus::Unassessed;
            c.warnings.push(err.to_string());
            return Verdict::Deferred(c, open_ends, airfield.base_fuel_lbs);
        }
        _ => {
            warn!(icao = %airfield.icao, "no forecast, alternate deferred");
            c.status = CandidateStatus::Unassessed;
            c.warnings.push("forecast unavailable".into());
            return Verdict::Deferred(c, open_ends, airfield.base_fuel_lbs);
        }
    };

    let parse_ctx = ParseContext::new(ctx.now, &airfield.icao);
    let report = match parse_report(text, &parse_ctx) {
        Ok(r) => r,
        Err(e) => return Verdict::Done(c.rejected(RejectionReason::ForecastUnreadable { detail: e.to_string() })),
    };
    for issue in report.issues() {
        c.warnings.push(issue.to_string());
    }
    let opts = NormalizeOptions {
        metar_staleness: ctx.config.windows.metar_staleness(),
        pirep_horizon: ctx.config.windows.pirep_horizon(),
        elevation_ft: airfield.elevation_ft,
    };
    let elements = normalize(&report, &opts);
    let conditions = resolve_with_radius(&elements, ctx.window, ALL_SOURCES, ctx.config.limits.cb_radius_nm);

    let usable: Vec<&Approach> = airfield
        .approaches
        .iter()
        .filter(|a| notam.approach_usable(a))
        .collect();
    let limits = &ctx.config.limits;
    let table = PhaseTable::new(limits, IfrMinima::from_approaches(usable.iter().copied(), limits));
    let runway = resolve_runway(&conditions.winds, &open_ends, None);
    let result = table.evaluate(&conditions, runway.as_ref());
    debug!(icao = %airfield.icao, phase = %result.phase, usable_approaches = usable.len(), "alternate evaluated");

    c.phase = Some(result.phase);
    c.conditions = Some(conditions);
    c.runway = runway;

    let rejection = match result.phase {
        Phase::Recall => Some(RejectionReason::Recall {
            detail: result.reasons.join("; "),
        }),
        p if p > Phase::Vfr && usable.is_empty() => Some(RejectionReason::NoUsableApproach),
        Phase::Hold => Some(RejectionReason::BelowMinima { phase: Phase::Hold }),
        _ => None,
    };
    if let Some(reason) = rejection {
        return Verdict::Done(c.rejected(reason));
    }

    let headwind = c.runway.as_ref().map_or(0.0, |r| r.headwind_kt);
    c.fuel = Some(divert_fuel(airfield.base_fuel_lbs, headwind, ctx.fuel, &ctx.config.fuel));
    c.status = CandidateStatus::Suitable;
    Verdict::Done(c)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const DATA: &str = r#"{
        "home": "OEKF",
        "alternate_priority": ["OERK", "OEPS", "OEGS"],
        "airfields": [
            {"icao": "OEKF", "elevation_ft": 2070,
             "runways": [{"ends": [{"id": "15", "heading": 150}, {"id": "33", "heading": 330}]}]},
            {"icao": "OERK", "name": "King Khalid", "elevation_ft": 2049,
             "runways": [{"ends": [{"id": "15L", "heading": 150}, {"id": "33R", "heading": 330}]}],
             "approaches": [{"kind": "ILS", "runway": "33R", "ceiling_ft": 200, "visibility_m": 800}],
             "distance_nm": 38, "base_fuel_lbs": 1200},
            {"icao": "OEPS", "name": "Prince Sultan", "elevation_ft": 1651,
             "runways": [{"ends": [{"id": "17", "heading": 170}, {"id": "35", "heading": 350}]}],
             "approaches": [{"kind": "TACAN", "runway": "35", "ceiling_ft": 400, "visibility_m": 1600}],
             "distance_nm": 60, "base_fuel_lbs": 1500},
            {"icao": "OEGS", "name": "Gassim", "elevation_ft": 2126,
             "runways": [{"ends": [{"id": "15", "heading": 150}, {"id": "33", "heading": 330}]}],
             "approaches": [{"kind": "RNAV", "runway": "33", "ceiling_ft": 400, "visibility_m": 1600}],
             "distance_nm": 170, "base_fuel_lbs": 2600}
        ]
    }"#;

    const GOOD_TAF: &str = "TAF 310500Z 3106/0112 33020KT 9999 SCT040";
    const BAD_TAF: &str = "TAF 310500Z 3106/0112 33012KT 0800 FG OVC002";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 31, 6, 0, 0).unwrap()
    }

    fn run(candidates: &[CandidateInput]) -> AlternateDecision {
        let dataset = AirfieldDataset::from_json(DATA).unwrap();
        let config = Config::default();
        let winds = [Wind::new(330, 20, None)];
        let ctx = SelectionContext {
            dataset: &dataset,
            config: &config,
            now: now(),
            window: TimeWindow::ahead(now(), Duration::minutes(180)),
            fuel: FuelOptions::default(),
            home_winds: &winds,
        };
        select(candidates, &ctx)
    }

    fn provided(icao: &str, taf: &str) -> CandidateInput {
        CandidateInput::new(icao, ForecastStatus::Provided(taf.into()))
    }

    #[test]
    fn test_first_suitable_selected() {
        let d = run(&[provided("OERK", GOOD_TAF), provided("OEPS", GOOD_TAF)]);
        assert_eq!(
            d.outcome,
            AlternateOutcome::Selected {
                icao: "OERK".into(),
                provisional: false
            }
        );
        let sel = d.selected().unwrap();
        assert_eq!(sel.runway.as_ref().unwrap().runway, "33R");
        // 20 kt straight down 33R: +10%
        assert_eq!(sel.fuel.as_ref().unwrap().total_lbs, 1320);
        assert_eq!(d.candidates.len(), 1);
    }

    #[test]
    fn test_bad_forecast_skipped() {
        let d = run(&[provided("OERK", BAD_TAF), provided("OEPS", GOOD_TAF)]);
        assert_eq!(d.selected().unwrap().icao, "OEPS");
        assert_eq!(
            d.candidates[0].rejection,
            Some(RejectionReason::BelowMinima { phase: Phase::Hold })
        );
    }

    #[test]
    fn test_all_closed_is_no_suitable_alternate() {
        let closed = NotamImpact {
            aerodrome_closed: true,
            ..NotamImpact::default()
        };
        let d = run(&[
            provided("OERK", GOOD_TAF).with_notam(closed.clone()),
            provided("OEPS", GOOD_TAF).with_notam(closed.clone()),
            provided("OEGS", GOOD_TAF).with_notam(closed),
        ]);
        assert!(d.is_none());
        assert_eq!(d.candidates.len(), 3);
        assert!(d
            .candidates
            .iter()
            .all(|c| c.rejection == Some(RejectionReason::AerodromeClosed)));
    }

    #[test]
    fn test_all_runways_closed() {
        let notam = NotamImpact {
            closed_runways: vec!["15L".into(), "33R".into()],
            ..NotamImpact::default()
        };
        let d = run(&[provided("OERK", GOOD_TAF).with_notam(notam)]);
        assert_eq!(d.candidates[0].rejection, Some(RejectionReason::AllRunwaysClosed));
    }

    #[test]
    fn test_navaid_outage_removes_approach() {
        // IFR-only weather at OEPS, whose only approach needs the TACAN
        let ifr_taf = "TAF 310500Z 3106/0112 35010KT 3000 BR BKN012";
        let notam = NotamImpact {
            navaids_unserviceable: vec![Navaid::Tacan],
            ..NotamImpact::default()
        };
        let d = run(&[provided("OEPS", ifr_taf).with_notam(notam.clone())]);
        assert_eq!(d.candidates[0].rejection, Some(RejectionReason::NoUsableApproach));

        let d = run(&[provided("OEPS", ifr_taf)]);
        assert_eq!(d.candidates[0].phase, Some(Phase::Ifr));
        assert_eq!(d.candidates[0].status, CandidateStatus::Suitable);
    }

    #[test]
    fn test_unassessed_deferred_behind_assessed() {
        let d = run(&[
            CandidateInput::new("OERK", ForecastStatus::TimedOut),
            provided("OEPS", GOOD_TAF),
        ]);
        assert_eq!(d.selected().unwrap().icao, "OEPS");
        assert_eq!(d.candidates.last().unwrap().status, CandidateStatus::Unassessed);
    }

    #[test]
    fn test_provisional_selection_when_nothing_assessed_suitable() {
        let d = run(&[
            provided("OERK", BAD_TAF),
            CandidateInput::new("OEPS", ForecastStatus::Unavailable),
        ]);
        assert_eq!(
            d.outcome,
            AlternateOutcome::Selected {
                icao: "OEPS".into(),
                provisional: true
            }
        );
        let sel = d.selected().unwrap();
        assert!(sel.fuel.is_some());
        assert!(sel.warnings.iter().any(|w| w.contains("provisional")));
    }

    #[test]
    fn test_unknown_airfield_absorbed() {
        let d = run(&[provided("OXXX", GOOD_TAF), provided("OERK", GOOD_TAF)]);
        assert!(matches!(
            d.candidates[0].rejection,
            Some(RejectionReason::UnknownAirfield { .. })
        ));
        assert_eq!(d.selected().unwrap().icao, "OERK");
    }

    #[test]
    fn test_unreadable_forecast_absorbed() {
        let d = run(&[provided("OERK", "forecast server says hello"), provided("OEPS", GOOD_TAF)]);
        assert!(matches!(
            d.candidates[0].rejection,
            Some(RejectionReason::ForecastUnreadable { .. })
        ));
        assert_eq!(d.selected().unwrap().icao, "OEPS");
    }

    #[test]
    fn test_tempo_thunderstorm_rejects() {
        let taf = "TAF 310500Z 3106/0112 33012KT 9999 SCT040 TEMPO 3107/3110 4000 TSRA BKN030CB";
        let d = run(&[provided("OERK", taf)]);
        assert!(matches!(d.candidates[0].rejection, Some(RejectionReason::Recall { .. })));
    }
}
