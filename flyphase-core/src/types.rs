//! Core types shared across the flying-phase pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Report grammar a parse error or issue belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportKind {
    Metar,
    Taf,
    Pirep,
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportKind::Metar => write!(f, "METAR"),
            ReportKind::Taf => write!(f, "TAF"),
            ReportKind::Pirep => write!(f, "PIREP"),
        }
    }
}

/// Malformed or ambiguous report. Positions are 1-based group indices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty report")]
    Empty,

    #[error("{report}: unrecognized group '{token}' at position {position}")]
    UnrecognizedGroup {
        report: ReportKind,
        token: String,
        position: usize,
    },

    #[error("{report}: invalid group '{token}' at position {position}: {reason}")]
    InvalidGroup {
        report: ReportKind,
        token: String,
        position: usize,
        reason: String,
    },

    #[error("{report}: missing required {field}")]
    MissingField {
        report: ReportKind,
        field: &'static str,
    },

    #[error("unclassifiable report '{input}': not a METAR, TAF or PIREP")]
    Unclassifiable { input: String },
}

/// Airfield reference data problems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("no airfield data for {0}")]
    UnknownAirfield(String),

    #[error("{icao}: no runway '{runway}'")]
    UnknownRunway { icao: String, runway: String },

    #[error("invalid airfield data: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum PhaseError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error("forecast fetch for {icao} timed out")]
    CollaboratorTimeout { icao: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PhaseError>;

/// A group the parser skipped. Collected instead of aborting so the caller
/// decides whether partial data is acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseIssue {
    pub report: ReportKind,
    pub token: String,
    pub position: usize,
    pub reason: String,
}

const UNRECOGNIZED: &str = "unrecognized group";

impl ParseIssue {
    pub fn unrecognized(report: ReportKind, token: &str, position: usize) -> Self {
        ParseIssue {
            report,
            token: token.to_string(),
            position,
            reason: UNRECOGNIZED.into(),
        }
    }

    pub fn invalid(report: ReportKind, token: &str, position: usize, reason: &str) -> Self {
        ParseIssue {
            report,
            token: token.to_string(),
            position,
            reason: reason.to_string(),
        }
    }

    pub fn into_error(self) -> ParseError {
        if self.reason == UNRECOGNIZED {
            ParseError::UnrecognizedGroup {
                report: self.report,
                token: self.token,
                position: self.position,
            }
        } else {
            ParseError::InvalidGroup {
                report: self.report,
                token: self.token,
                position: self.position,
                reason: self.reason,
            }
        }
    }
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} '{}' at position {}",
            self.report, self.reason, self.token, self.position
        )
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Where a weather element came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Source {
    Metar,
    Pirep,
    Warning,
    Taf,
}

/// Sources eligible for the local phase decision.
pub const PHASE_SOURCES: &[Source] = &[Source::Metar, Source::Warning, Source::Pirep];

/// Sources eligible for alternate assessment and the alternate-required check.
pub const ALL_SOURCES: &[Source] = &[Source::Metar, Source::Pirep, Source::Warning, Source::Taf];

impl Source {
    /// Tie-break rank, lower wins. Observations outrank reports outrank forecasts.
    pub fn precedence(self) -> u8 {
        match self {
            Source::Metar => 0,
            Source::Pirep => 1,
            Source::Warning => 2,
            Source::Taf => 3,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Metar => write!(f, "METAR"),
            Source::Pirep => write!(f, "PIREP"),
            Source::Warning => write!(f, "WARNING"),
            Source::Taf => write!(f, "TAF"),
        }
    }
}

// ---------------------------------------------------------------------------
// Wind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindDirection {
    /// True direction the wind blows from.
    Degrees(u16),
    /// Reported VRB.
    Variable,
    /// Speed known but not direction (free-text warnings). Treated as full crosswind.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wind {
    pub direction: WindDirection,
    pub speed_kt: u16,
    pub gust_kt: Option<u16>,
    /// Variable sector `dddVddd`, if reported.
    pub variable_from: Option<(u16, u16)>,
}

impl Wind {
    pub fn new(direction: u16, speed_kt: u16, gust_kt: Option<u16>) -> Self {
        Wind {
            direction: WindDirection::Degrees(direction % 360),
            speed_kt,
            gust_kt,
            variable_from: None,
        }
    }

    pub fn calm() -> Self {
        Wind::new(0, 0, None)
    }

    /// Limiting speed: gust when present, else mean.
    pub fn effective_kt(&self) -> u16 {
        match self.gust_kt {
            Some(g) if g > self.speed_kt => g,
            _ => self.speed_kt,
        }
    }

    pub fn is_calm(&self) -> bool {
        self.effective_kt() == 0
    }

    /// Calm or VRB: no components, never fails a wind predicate.
    pub fn is_directionless(&self) -> bool {
        self.is_calm() || self.direction == WindDirection::Variable
    }
}

impl fmt::Display for Wind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            WindDirection::Degrees(d) => write!(f, "{d:03}")?,
            WindDirection::Variable => write!(f, "VRB")?,
            WindDirection::Unknown => write!(f, "///")?,
        }
        write!(f, "{:02}", self.speed_kt)?;
        if let Some(g) = self.gust_kt {
            write!(f, "G{g:02}")?;
        }
        write!(f, "KT")
    }
}

// ---------------------------------------------------------------------------
// Clouds
// ---------------------------------------------------------------------------

/// Sky cover amount, ordered least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloudCover {
    Few,
    Sct,
    Bkn,
    Ovc,
    /// Vertical visibility into an obscured sky.
    Vv,
}

impl CloudCover {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "FEW" => Some(CloudCover::Few),
            "SCT" => Some(CloudCover::Sct),
            "BKN" => Some(CloudCover::Bkn),
            "OVC" => Some(CloudCover::Ovc),
            "VV" => Some(CloudCover::Vv),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            CloudCover::Few => "FEW",
            CloudCover::Sct => "SCT",
            CloudCover::Bkn => "BKN",
            CloudCover::Ovc => "OVC",
            CloudCover::Vv => "VV",
        }
    }

    /// Broken or worse counts as a ceiling.
    pub fn is_ceiling(self) -> bool {
        self >= CloudCover::Bkn
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Convective {
    Tcu,
    Cb,
}

/// One cloud layer, height above ground level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudLayer {
    pub cover: CloudCover,
    pub height_ft: u32,
    pub convective: Option<Convective>,
}

impl CloudLayer {
    pub fn new(cover: CloudCover, height_ft: u32) -> Self {
        CloudLayer {
            cover,
            height_ft,
            convective: None,
        }
    }

    pub fn is_cb(&self) -> bool {
        self.convective == Some(Convective::Cb)
    }
}

impl fmt::Display for CloudLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.cover.code(), self.height_ft / 100)?;
        match self.convective {
            Some(Convective::Cb) => write!(f, "CB"),
            Some(Convective::Tcu) => write!(f, "TCU"),
            None => Ok(()),
        }
    }
}

/// Lowest broken-or-worse layer.
pub fn ceiling_of(layers: &[CloudLayer]) -> Option<u32> {
    layers
        .iter()
        .filter(|l| l.cover.is_ceiling())
        .map(|l| l.height_ft)
        .min()
}

// ---------------------------------------------------------------------------
// Present weather
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Light,
    Moderate,
    Heavy,
}

/// Two-letter descriptor and phenomenon codes accepted in weather groups.
pub const WEATHER_CODES: &[&str] = &[
    "MI", "BC", "PR", "DR", "BL", "SH", "TS", "FZ", "DZ", "RA", "SN", "SG", "IC", "PL", "GR",
    "GS", "UP", "BR", "FG", "FU", "VA", "DU", "SA", "HZ", "PO", "SQ", "FC", "SS", "DS",
];

/// A present-weather group such as `+TSRA` or `VCSH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phenomenon {
    pub intensity: Intensity,
    pub vicinity: bool,
    /// Concatenated codes without intensity or VC, e.g. `TSRA`.
    pub codes: String,
}

impl Phenomenon {
    /// Parse a weather group. Returns None unless every pair is a known code.
    pub fn parse(token: &str) -> Option<Self> {
        let (intensity, rest) = match token.as_bytes().first() {
            Some(b'+') => (Intensity::Heavy, &token[1..]),
            Some(b'-') => (Intensity::Light, &token[1..]),
            _ => (Intensity::Moderate, token),
        };
        let (vicinity, rest) = match rest.strip_prefix("VC") {
            Some(r) => (true, r),
            None => (false, rest),
        };
        if rest.is_empty() || rest.len() % 2 != 0 || !rest.is_ascii() {
            return None;
        }
        let all_known = (0..rest.len())
            .step_by(2)
            .all(|i| WEATHER_CODES.contains(&&rest[i..i + 2]));
        if !all_known {
            return None;
        }
        Some(Phenomenon {
            intensity,
            vicinity,
            codes: rest.to_string(),
        })
    }

    pub fn has_code(&self, code: &str) -> bool {
        (0..self.codes.len())
            .step_by(2)
            .any(|i| self.codes.get(i..i + 2) == Some(code))
    }

    pub fn is_thunderstorm(&self) -> bool {
        self.has_code("TS")
    }
}

impl fmt::Display for Phenomenon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.intensity {
            Intensity::Light => write!(f, "-")?,
            Intensity::Heavy => write!(f, "+")?,
            Intensity::Moderate => {}
        }
        if self.vicinity {
            write!(f, "VC")?;
        }
        write!(f, "{}", self.codes)
    }
}

// ---------------------------------------------------------------------------
// Bird strike risk
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BirdLevel {
    #[default]
    Low,
    Moderate,
    Severe,
}

impl FromStr for BirdLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(BirdLevel::Low),
            "moderate" | "mod" => Ok(BirdLevel::Moderate),
            "severe" | "sev" => Ok(BirdLevel::Severe),
            other => Err(format!("unknown bird level '{other}' (low|moderate|severe)")),
        }
    }
}

impl fmt::Display for BirdLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BirdLevel::Low => write!(f, "LOW"),
            BirdLevel::Moderate => write!(f, "MODERATE"),
            BirdLevel::Severe => write!(f, "SEVERE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// Flying phase, ordered most to least permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "UNRESTRICTED")]
    Unrestricted,
    #[serde(rename = "RESTRICTED")]
    Restricted,
    #[serde(rename = "FS VFR")]
    FsVfr,
    #[serde(rename = "VFR")]
    Vfr,
    #[serde(rename = "IFR")]
    Ifr,
    #[serde(rename = "HOLD")]
    Hold,
    #[serde(rename = "RECALL")]
    Recall,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Unrestricted,
        Phase::Restricted,
        Phase::FsVfr,
        Phase::Vfr,
        Phase::Ifr,
        Phase::Hold,
        Phase::Recall,
    ];

    /// True if `self` allows strictly less than `other`.
    pub fn is_stricter_than(self, other: Phase) -> bool {
        self > other
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Unrestricted => "UNRESTRICTED",
            Phase::Restricted => "RESTRICTED",
            Phase::FsVfr => "FS VFR",
            Phase::Vfr => "VFR",
            Phase::Ifr => "IFR",
            Phase::Hold => "HOLD",
            Phase::Recall => "RECALL",
        };
        write!(f, "{name}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
