//! Divert fuel: base figure plus headwind, solo and opposite-side additions.

use std::fmt;

use serde::Serialize;

use crate::config::FuelConfig;

/// Crew and routing adjustments requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuelOptions {
    pub solo: bool,
    pub opposite_side: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuelAddition {
    pub lbs: u32,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuelBreakdown {
    pub base_lbs: u32,
    pub headwind_kt: f64,
    pub additions: Vec<FuelAddition>,
    pub total_lbs: u32,
    pub explanation: String,
}

impl fmt::Display for FuelBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.explanation)
    }
}

/// `base × (headwind / 10) × pct%`, truncated. Zero without a headwind.
pub fn headwind_adjustment(base_lbs: u32, headwind_kt: f64, pct_per_10kt: f64) -> u32 {
    if headwind_kt <= 0.0 || pct_per_10kt <= 0.0 {
        return 0;
    }
    (f64::from(base_lbs) * (headwind_kt / 10.0) * (pct_per_10kt / 100.0)).floor() as u32
}

pub fn divert_fuel(base_lbs: u32, headwind_kt: f64, opts: FuelOptions, cfg: &FuelConfig) -> FuelBreakdown {
    let mut additions = Vec::new();

    let hw = headwind_adjustment(base_lbs, headwind_kt, cfg.headwind_pct_per_10kt);
    if hw > 0 {
        additions.push(FuelAddition {
            lbs: hw,
            reason: format!("{headwind_kt:.0}kt headwind"),
        });
    }
    if opts.solo {
        additions.push(FuelAddition {
            lbs: cfg.solo_lbs,
            reason: "solo".into(),
        });
    }
    if opts.opposite_side {
        additions.push(FuelAddition {
            lbs: cfg.opposite_side_lbs,
            reason: "opposite side".into(),
        });
    }

    let total_lbs = additions.iter().fold(base_lbs, |acc, a| acc.saturating_add(a.lbs));
    let mut explanation = format!("{base_lbs} lbs base");
    for a in &additions {
        explanation.push_str(&format!(" | +{} lbs ({})", a.lbs, a.reason));
    }
    explanation.push_str(&format!(" = {total_lbs} lbs"));

    FuelBreakdown {
        base_lbs,
        headwind_kt: headwind_kt.max(0.0),
        additions,
        total_lbs,
        explanation,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
