//! Flying-phase determination.
//!
//! The five weather phases are rows of a rule table, each with a visibility,
//! cloud and wind predicate. Every row is evaluated and the most permissive
//! passing row is declared. RECALL is an override checked before the table;
//! HOLD is the complement of passing IFR.

use serde::Serialize;
use tracing::{debug, info};

use crate::airfield::Approach;
use crate::config::LimitsConfig;
use crate::pipeline::ResolvedConditions;
use crate::types::*;
use crate::wind::{total_wind_kt, RunwayWind};

/// Margin added to a published approach ceiling for the IFR phase.
pub const IFR_CEILING_MARGIN_FT: u32 = 300;

// ---------------------------------------------------------------------------
// Rule table
// ---------------------------------------------------------------------------

/// Who may fly solo in a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SoloFlags {
    pub solo_cadets: bool,
    pub first_solo: bool,
    pub note: &'static str,
}

impl SoloFlags {
    const fn new(solo_cadets: bool, first_solo: bool, note: &'static str) -> Self {
        SoloFlags {
            solo_cadets,
            first_solo,
            note,
        }
    }

    pub fn none(note: &'static str) -> Self {
        SoloFlags::new(false, false, note)
    }

    pub fn any(&self) -> bool {
        self.solo_cadets || self.first_solo
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum CloudRule {
    /// No layer below `height_ft` worse than `allowed`; None allows nothing.
    NoLayerBelow { height_ft: u32, allowed: Option<CloudCover> },
    /// Ceiling, if any, at or above this height.
    MinCeiling { height_ft: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindLimits {
    pub max_total_kt: u16,
    pub max_crosswind_kt: u16,
    pub max_tailwind_kt: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRule {
    pub phase: Phase,
    pub min_visibility_m: u32,
    pub cloud: CloudRule,
    pub wind: WindLimits,
    pub solo: SoloFlags,
}

const SOLO_WIND: WindLimits = WindLimits {
    max_total_kt: 25,
    max_crosswind_kt: 15,
    max_tailwind_kt: 5,
};

const DUAL_WIND: WindLimits = WindLimits {
    max_total_kt: 30,
    max_crosswind_kt: 24,
    max_tailwind_kt: 10,
};

/// IFR visibility and ceiling thresholds for one airfield.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IfrMinima {
    pub visibility_m: u32,
    /// Approach ceiling plus margin.
    pub ceiling_ft: u32,
    /// Which approach set the minima, or `default`.
    pub basis: String,
}

impl IfrMinima {
    /// The most demanding of the usable approaches sets each minimum. With
    /// none, the configured defaults apply.
    pub fn from_approaches<'a, I>(approaches: I, limits: &LimitsConfig) -> Self
    where
        I: IntoIterator<Item = &'a Approach>,
    {
        let usable: Vec<&Approach> = approaches.into_iter().collect();
        let visibility = usable.iter().map(|a| a.visibility_m).max();
        let ceiling = usable.iter().map(|a| a.ceiling_ft + IFR_CEILING_MARGIN_FT).max();
        match (visibility, ceiling) {
            (Some(visibility_m), Some(ceiling_ft)) => IfrMinima {
                visibility_m,
                ceiling_ft,
                basis: usable.iter().map(|a| a.kind.as_str()).collect::<Vec<_>>().join(", "),
            },
            _ => IfrMinima::defaults(limits),
        }
    }

    pub fn defaults(limits: &LimitsConfig) -> Self {
        IfrMinima {
            visibility_m: limits.default_ifr_visibility_m,
            ceiling_ft: limits.default_ifr_ceiling_ft,
            basis: "default".into(),
        }
    }
}

/// The rule table for one airfield plus its override limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseTable {
    pub rules: Vec<PhaseRule>,
    pub recall_wind_kt: u16,
    pub hold_temperature_c: i16,
    pub ifr: IfrMinima,
}

impl PhaseTable {
    pub fn new(limits: &LimitsConfig, ifr: IfrMinima) -> Self {
        let rules = vec![
            PhaseRule {
                phase: Phase::Unrestricted,
                min_visibility_m: 8000,
                cloud: CloudRule::NoLayerBelow {
                    height_ft: 8000,
                    allowed: Some(CloudCover::Few),
                },
                wind: SOLO_WIND,
                solo: SoloFlags::new(true, true, "solo cadets authorized"),
            },
            PhaseRule {
                phase: Phase::Restricted,
                min_visibility_m: 8000,
                cloud: CloudRule::NoLayerBelow {
                    height_ft: 6000,
                    allowed: Some(CloudCover::Sct),
                },
                wind: SOLO_WIND,
                solo: SoloFlags::new(true, true, "post-IIC solo only"),
            },
            PhaseRule {
                phase: Phase::FsVfr,
                min_visibility_m: 5000,
                cloud: CloudRule::NoLayerBelow {
                    height_ft: 5000,
                    allowed: None,
                },
                wind: SOLO_WIND,
                solo: SoloFlags::new(false, true, "first solo only"),
            },
            PhaseRule {
                phase: Phase::Vfr,
                min_visibility_m: 5000,
                cloud: CloudRule::MinCeiling { height_ft: 1500 },
                wind: DUAL_WIND,
                solo: SoloFlags::none("no solo"),
            },
            PhaseRule {
                phase: Phase::Ifr,
                min_visibility_m: ifr.visibility_m,
                cloud: CloudRule::MinCeiling {
                    height_ft: ifr.ceiling_ft,
                },
                wind: DUAL_WIND,
                solo: SoloFlags::none("no solo"),
            },
        ];
        PhaseTable {
            rules,
            recall_wind_kt: limits.recall_wind_kt,
            hold_temperature_c: limits.hold_temperature_c,
            ifr,
        }
    }

    pub fn rule(&self, phase: Phase) -> Option<&PhaseRule> {
        self.rules.iter().find(|r| r.phase == phase)
    }

    /// Evaluate every row and declare the most permissive passing phase.
    pub fn evaluate(&self, conditions: &ResolvedConditions, runway: Option<&RunwayWind>) -> PhaseResult {
        let wind = WindState::from_inputs(conditions, runway);
        let mut checks: Vec<PhaseCheck> = self
            .rules
            .iter()
            .map(|rule| check_rule(rule, conditions, &wind))
            .collect();

        let too_hot = conditions
            .temperature_c
            .is_some_and(|t| t > self.hold_temperature_c);
        let hold = hold_check(checks.last(), too_hot, conditions, self.hold_temperature_c);
        let recall = recall_check(conditions, &wind, self.recall_wind_kt);
        let recalled = recall.passed;
        let rows = checks.len();
        checks.push(hold);
        checks.push(recall);

        let mut reasons = Vec::new();
        let phase = if recalled {
            reasons.extend(recall_reasons(conditions, &wind, self.recall_wind_kt));
            Phase::Recall
        } else if too_hot {
            reasons.push(format!(
                "temperature {}°C exceeds {}°C",
                conditions.temperature_c.unwrap_or_default(),
                self.hold_temperature_c
            ));
            Phase::Hold
        } else if let Some(best) = checks[..rows].iter().find(|c| c.passed) {
            best.phase
        } else {
            reasons.push("conditions below IFR limits".into());
            Phase::Hold
        };
        let solo = match phase {
            Phase::Hold => SoloFlags::none("recovery only, no take-offs"),
            Phase::Recall => SoloFlags::none("return to base"),
            p => self.rule(p).map_or(SoloFlags::none("no solo"), |r| r.solo),
        };

        for c in checks[..rows].iter().filter(|c| !c.passed) {
            debug!(phase = %c.phase, failed = ?c.failed(), "phase not met");
        }
        info!(phase = %phase, "declared phase");

        PhaseResult {
            phase,
            weather_phase: phase,
            checks,
            reasons,
            conditions: conditions.clone(),
            runway: runway.cloned(),
            total_wind_kt: wind.total_kt,
            ifr_minima: self.ifr.clone(),
            solo,
            bird_cap_applied: false,
            takeoffs_forbidden: phase == Phase::Hold || phase == Phase::Recall,
            advisories: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

/// Outcome of one predicate, with the observed value and limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Check {
    pub passed: bool,
    pub detail: String,
}

impl Check {
    fn new(passed: bool, detail: String) -> Self {
        Check { passed, detail }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseCheck {
    pub phase: Phase,
    pub visibility: Check,
    pub cloud: Check,
    pub wind: Check,
    pub passed: bool,
}

impl PhaseCheck {
    fn all(phase: Phase, visibility: Check, cloud: Check, wind: Check) -> Self {
        let passed = visibility.passed && cloud.passed && wind.passed;
        PhaseCheck {
            phase,
            visibility,
            cloud,
            wind,
            passed,
        }
    }

    /// Names of the predicates that did not pass.
    pub fn failed(&self) -> Vec<&'static str> {
        [
            ("visibility", &self.visibility),
            ("cloud", &self.cloud),
            ("wind", &self.wind),
        ]
        .into_iter()
        .filter(|(_, c)| !c.passed)
        .map(|(name, _)| name)
        .collect()
    }
}

struct WindState {
    total_kt: u16,
    crosswind_kt: f64,
    tailwind_kt: f64,
}

impl WindState {
    fn from_inputs(conditions: &ResolvedConditions, runway: Option<&RunwayWind>) -> Self {
        let total_kt = total_wind_kt(&conditions.winds);
        match runway {
            Some(r) => WindState {
                total_kt,
                crosswind_kt: r.crosswind_kt,
                tailwind_kt: r.tailwind_kt,
            },
            // no runway data: an unknown-direction wind is still all crosswind
            None => WindState {
                total_kt,
                crosswind_kt: conditions
                    .winds
                    .iter()
                    .filter(|w| w.direction == WindDirection::Unknown)
                    .map(|w| f64::from(w.effective_kt()))
                    .fold(0.0, f64::max),
                tailwind_kt: 0.0,
            },
        }
    }
}

fn check_rule(rule: &PhaseRule, conditions: &ResolvedConditions, wind: &WindState) -> PhaseCheck {
    let visibility = match conditions.visibility_m {
        Some(v) => Check::new(
            v >= rule.min_visibility_m,
            format!("{v} m (min {} m)", rule.min_visibility_m),
        ),
        None => Check::new(false, "no visibility reported".into()),
    };

    let cloud = match rule.cloud {
        CloudRule::NoLayerBelow { height_ft, allowed } => {
            match conditions.layer_below_worse_than(height_ft, allowed) {
                Some(layer) => Check::new(false, format!("{layer} below {height_ft} ft")),
                None => {
                    let what = allowed.map_or("no cloud".to_string(), |a| format!("max {}", a.code()));
                    Check::new(true, format!("{what} below {height_ft} ft"))
                }
            }
        }
        CloudRule::MinCeiling { height_ft } => match conditions.ceiling_ft {
            Some(c) => Check::new(c >= height_ft, format!("ceiling {c} ft (min {height_ft} ft)")),
            None => Check::new(true, format!("no ceiling (min {height_ft} ft)")),
        },
    };

    let limits = rule.wind;
    let wind_ok = wind.total_kt <= limits.max_total_kt
        && wind.crosswind_kt <= f64::from(limits.max_crosswind_kt)
        && wind.tailwind_kt <= f64::from(limits.max_tailwind_kt);
    let wind = Check::new(
        wind_ok,
        format!(
            "total {} kt/{} | xwind {:.1} kt/{} | tail {:.1} kt/{}",
            wind.total_kt,
            limits.max_total_kt,
            wind.crosswind_kt,
            limits.max_crosswind_kt,
            wind.tailwind_kt,
            limits.max_tailwind_kt
        ),
    );

    PhaseCheck::all(rule.phase, visibility, cloud, wind)
}

/// HOLD holds whenever IFR fails on any predicate, or it is too hot.
fn hold_check(ifr: Option<&PhaseCheck>, too_hot: bool, conditions: &ResolvedConditions, limit_c: i16) -> PhaseCheck {
    let below = |c: Option<&Check>, what: &str| {
        let failed = c.map_or(true, |c| !c.passed);
        Check::new(
            failed,
            if failed {
                format!("{what} below IFR limits")
            } else {
                format!("{what} within IFR limits")
            },
        )
    };
    let visibility = below(ifr.map(|c| &c.visibility), "visibility");
    let cloud = below(ifr.map(|c| &c.cloud), "ceiling");
    let mut wind = below(ifr.map(|c| &c.wind), "wind");
    if too_hot {
        wind = Check::new(
            true,
            format!("temperature {}°C > {limit_c}°C", conditions.temperature_c.unwrap_or_default()),
        );
    }
    let passed = visibility.passed || cloud.passed || wind.passed;
    PhaseCheck {
        phase: Phase::Hold,
        visibility,
        cloud,
        wind,
        passed,
    }
}

fn recall_check(conditions: &ResolvedConditions, wind: &WindState, recall_kt: u16) -> PhaseCheck {
    let rapid = Check::new(
        conditions.rapid_deterioration,
        if conditions.rapid_deterioration {
            "rapid deterioration reported".into()
        } else {
            "no rapid deterioration".into()
        },
    );
    let cb = Check::new(
        conditions.cb_within_radius,
        if conditions.cb_within_radius {
            "CB within radius".into()
        } else {
            "no CB within radius".into()
        },
    );
    let strong = Check::new(
        wind.total_kt > recall_kt,
        format!("total {} kt (recall > {recall_kt} kt)", wind.total_kt),
    );
    let passed = rapid.passed || cb.passed || strong.passed;
    PhaseCheck {
        phase: Phase::Recall,
        visibility: rapid,
        cloud: cb,
        wind: strong,
        passed,
    }
}

fn recall_reasons(conditions: &ResolvedConditions, wind: &WindState, recall_kt: u16) -> Vec<String> {
    let mut reasons = Vec::new();
    if conditions.cb_within_radius {
        let by: Vec<String> = conditions.cb_sources.iter().map(|s| s.to_string()).collect();
        reasons.push(format!("CB reported within radius ({})", by.join(", ")));
    }
    if wind.total_kt > recall_kt {
        reasons.push(format!("wind {} kt exceeds {recall_kt} kt", wind.total_kt));
    }
    if conditions.rapid_deterioration {
        reasons.push("rapid deterioration reported".into());
    }
    reasons
}

// ---------------------------------------------------------------------------
// Result and caps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseResult {
    /// Declared phase after caps and service impacts.
    pub phase: Phase,
    /// Phase the weather alone supports.
    pub weather_phase: Phase,
    /// All seven rows, most permissive first.
    pub checks: Vec<PhaseCheck>,
    pub reasons: Vec<String>,
    pub conditions: ResolvedConditions,
    pub runway: Option<RunwayWind>,
    pub total_wind_kt: u16,
    pub ifr_minima: IfrMinima,
    pub solo: SoloFlags,
    pub bird_cap_applied: bool,
    pub takeoffs_forbidden: bool,
    pub advisories: Vec<String>,
}

impl PhaseResult {
    pub fn check(&self, phase: Phase) -> Option<&PhaseCheck> {
        self.checks.iter().find(|c| c.phase == phase)
    }

    pub(crate) fn advise(&mut self, text: &str) {
        if !self.advisories.iter().any(|a| a == text) {
            self.advisories.push(text.to_string());
        }
    }

    /// Cap the declared phase at `cap` (never relaxes) and withdraw solo.
    pub(crate) fn cap_at(&mut self, cap: Phase, note: &'static str) -> bool {
        if self.solo.any() {
            self.solo = SoloFlags::none(note);
        }
        if self.phase < cap {
            self.phase = cap;
            return true;
        }
        false
    }
}

const BIRD_MODERATE_ADVISORIES: &[&str] = &["no formation wing take-offs", "no solo cadet take-offs"];

const BIRD_SEVERE_ADVISORIES: &[&str] = &[
    "no further take-offs",
    "straight-in or instrument recovery only",
    "consider changing runway",
    "divert as required",
];

/// Apply the bird-strike cap. MODERATE and SEVERE cap at VFR and withdraw
/// solo; SEVERE also forbids take-offs. LOW changes nothing. Idempotent.
pub fn apply_bird_cap(mut result: PhaseResult, level: BirdLevel) -> PhaseResult {
    if level == BirdLevel::Low {
        return result;
    }

    if result.cap_at(Phase::Vfr, "no solo: bird-strike risk") {
        result.bird_cap_applied = true;
        result.reasons.push(format!("bird-strike risk {level}: capped at VFR"));
    }
    for a in BIRD_MODERATE_ADVISORIES {
        result.advise(a);
    }
    if level == BirdLevel::Severe {
        result.takeoffs_forbidden = true;
        for a in BIRD_SEVERE_ADVISORIES {
            result.advise(a);
        }
    }
    debug!(level = %level, phase = %result.phase, capped = result.bird_cap_applied, "bird cap");
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
