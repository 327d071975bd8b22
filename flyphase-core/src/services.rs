//! Operational notes: airfield services that change what may fly.
//!
//! Notes are free text, comma separated (`NO ATC, radar u/s`). Each note is
//! matched on words, so `NO ATC` and `ATC DOWN` read the same.

use serde::Serialize;
use tracing::debug;

use crate::phase::PhaseResult;
use crate::types::Phase;

const OUTAGE_WORDS: &[&str] = &["DOWN", "FAIL", "FAILED", "FAILURE", "U/S", "US", "UNAVAIL", "UNAVAILABLE", "OUT", "INOP"];

/// Services whose absence stops flying.
const HOLD_SERVICES: &[(&str, &[&str])] = &[
    ("ATC", &["ATC", "TOWER"]),
    ("SAR", &["SAR"]),
    ("MEDICAL", &["MEDICAL", "DOCTOR", "AMBULANCE"]),
    ("FIRE/CRASH", &["FIRE", "CRASH", "CFR"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceImpact {
    /// Stop flying; recover only.
    ForceHold,
    /// Return to base.
    ForceRecall,
    /// Cap at VFR with no solo.
    CapVfrNoSolo,
    /// Operational restriction only.
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceNote {
    pub note: String,
    pub service: &'static str,
    pub impact: ServiceImpact,
    pub action: &'static str,
}

/// Classify every note. Notes that match no known service are dropped.
pub fn classify_notes(notes: &str) -> Vec<ServiceNote> {
    notes
        .split(|c: char| c == ',' || c == ';')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .flat_map(classify_note)
        .collect()
}

fn classify_note(note: &str) -> Vec<ServiceNote> {
    let upper = note.to_ascii_uppercase();
    let words: Vec<&str> = upper.split_whitespace().collect();
    let mut out = Vec::new();
    let mut push = |service, impact, action| {
        out.push(ServiceNote {
            note: note.to_string(),
            service,
            impact,
            action,
        })
    };

    // checked first: "no comms with radar" must not read as a radar outage
    let comms_lost = has_word(&words, "RADAR")
        && words.iter().any(|w| matches!(*w, "COMM" | "COMMS" | "COMMUNICATION" | "COMMUNICATIONS"))
        && words.first() == Some(&"NO");
    if comms_lost {
        push("RADAR COMMS", ServiceImpact::ForceRecall, "stop solo cadet flying, use no-radar procedures");
        return out;
    }

    for (service, names) in HOLD_SERVICES {
        if names.iter().any(|n| is_out(&words, n)) {
            push(*service, ServiceImpact::ForceHold, "stop flying");
        }
    }
    let radar_down = is_out(&words, "RADAR") || (has_word(&words, "RADAR") && has_word(&words, "WITHOUT"));
    if radar_down {
        push("RADAR", ServiceImpact::CapVfrNoSolo, "no solo cadets, use no-radar procedures");
    }
    if ["DVORTAC", "GUARD"].iter().any(|n| is_out(&words, n)) {
        push("DVORTAC/GUARD", ServiceImpact::CapVfrNoSolo, "stop solo cadet flying in training areas");
    }
    if is_out(&words, "MOCO") || (has_word(&words, "MOCO") && has_word(&words, "NOT")) {
        push("MoCO", ServiceImpact::Advisory, "no T-21 take-offs or landings until MoCO in position");
    }
    out
}

fn has_word(words: &[&str], word: &str) -> bool {
    words.contains(&word)
}

/// `NO <name>` or `<name> <outage>`.
fn is_out(words: &[&str], name: &str) -> bool {
    words.windows(2).any(|w| {
        (w[0] == "NO" && w[1] == name) || (w[0] == name && OUTAGE_WORDS.contains(&w[1]))
    })
}

/// Apply service impacts after the bird cap. Never relaxes the phase.
pub fn apply_service_impacts(mut result: PhaseResult, notes: &[ServiceNote]) -> PhaseResult {
    for n in notes {
        let advisory = format!("{}: {}", n.service, n.action);
        match n.impact {
            ServiceImpact::ForceRecall | ServiceImpact::ForceHold => {
                let forced = if n.impact == ServiceImpact::ForceRecall {
                    Phase::Recall
                } else {
                    Phase::Hold
                };
                result.cap_at(forced, "no solo: service unavailable");
                if result.phase == forced {
                    result.takeoffs_forbidden = true;
                    let reason = format!("{} unavailable: {}", n.service, n.action);
                    if !result.reasons.contains(&reason) {
                        result.reasons.push(reason);
                    }
                }
            }
            ServiceImpact::CapVfrNoSolo => {
                result.cap_at(Phase::Vfr, "no solo: service unavailable");
            }
            ServiceImpact::Advisory => {}
        }
        result.advise(&advisory);
        debug!(service = n.service, impact = ?n.impact, phase = %result.phase, "service impact");
    }
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
