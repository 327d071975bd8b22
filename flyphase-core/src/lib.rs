//! flyphase-core: flying phase determination for a training airfield.
//!
//! No network, no async. Reports and forecasts come in as text, decisions
//! come out as plain data. This crate is shared by the `flyphase` CLI and
//! anything else that wants to embed the rule table.

pub mod airfield;
pub mod alternate;
pub mod assess;
pub mod classify;
pub mod clock;
pub mod config;
pub mod element;
pub mod fuel;
pub mod metar;
pub mod phase;
pub mod pipeline;
pub mod pirep;
pub mod services;
pub mod taf;
pub mod types;
pub mod wind;

// Re-export commonly used types at crate root
pub use airfield::{Airfield, AirfieldDataset};
pub use alternate::{AlternateDecision, AlternateOutcome, ForecastStatus, NotamImpact};
pub use assess::{assess, Assessment, AssessmentInput};
pub use classify::{classify, parse_labeled, parse_report, Report};
pub use clock::ParseContext;
pub use phase::{apply_bird_cap, PhaseResult, PhaseTable};
pub use pipeline::{resolve, ResolvedConditions, TimeWindow};
pub use types::*;
