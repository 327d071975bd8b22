//! Airfield reference dataset: runways, approaches, divert distances.
//!
//! Loaded once from JSON and never mutated. Lookup accepts ICAO codes and
//! aliases case-insensitively.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{DataError, PhaseError};

/// Maximum deviation from 180° between the two ends of one runway.
const RECIPROCAL_TOLERANCE_DEG: u16 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunwayEnd {
    /// Designator such as `33` or `15L`.
    pub id: String,
    /// Magnetic/true heading in degrees.
    pub heading: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runway {
    pub ends: Vec<RunwayEnd>,
}

/// Ground navaid an approach depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Navaid {
    Ils,
    Vor,
    Tacan,
    Ndb,
}

impl fmt::Display for Navaid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Navaid::Ils => "ILS",
            Navaid::Vor => "VOR",
            Navaid::Tacan => "TACAN",
            Navaid::Ndb => "NDB",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approach {
    /// Free-form type, e.g. `ILS`, `VOR/DME`, `RNAV (GNSS)`.
    pub kind: String,
    #[serde(default)]
    pub runway: Option<String>,
    pub ceiling_ft: u32,
    pub visibility_m: u32,
}

impl Approach {
    /// The ground navaid this approach needs. Satellite approaches need none.
    pub fn navaid(&self) -> Option<Navaid> {
        let kind = self.kind.to_ascii_uppercase();
        if ["RNAV", "RNP", "GPS", "GNSS"].iter().any(|k| kind.contains(k)) {
            return None;
        }
        if kind.contains("ILS") {
            Some(Navaid::Ils)
        } else if kind.contains("VOR") {
            Some(Navaid::Vor)
        } else if kind.contains("TACAN") {
            Some(Navaid::Tacan)
        } else if kind.contains("NDB") {
            Some(Navaid::Ndb)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airfield {
    pub icao: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub elevation_ft: i32,
    #[serde(default)]
    pub runways: Vec<Runway>,
    #[serde(default)]
    pub approaches: Vec<Approach>,
    /// Distance from the home field.
    #[serde(default)]
    pub distance_nm: u32,
    /// Base divert fuel from the home field.
    #[serde(default)]
    pub base_fuel_lbs: u32,
}

impl Airfield {
    pub fn matches(&self, ident: &str) -> bool {
        self.icao.eq_ignore_ascii_case(ident) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(ident))
    }

    pub fn runway_ends(&self) -> Vec<RunwayEnd> {
        self.runways.iter().flat_map(|r| r.ends.iter().cloned()).collect()
    }

    /// Find a runway end by designator. Accepts `RWY33`, `33`, `033`.
    pub fn runway_end(&self, designator: &str) -> Option<&RunwayEnd> {
        let wanted = normalize_designator(designator);
        self.runways
            .iter()
            .flat_map(|r| r.ends.iter())
            .find(|e| normalize_designator(&e.id) == wanted)
    }
}

fn normalize_designator(text: &str) -> String {
    let upper = text.trim().to_ascii_uppercase();
    let stripped = upper.strip_prefix("RWY").unwrap_or(&upper).trim();
    stripped.trim_start_matches('0').to_string()
}

/// The full reference dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirfieldDataset {
    pub home: String,
    #[serde(default)]
    pub alternate_priority: Vec<String>,
    pub airfields: Vec<Airfield>,
}

impl AirfieldDataset {
    /// Read and validate a JSON dataset.
    pub fn load(path: &Path) -> Result<Self, PhaseError> {
        let text = std::fs::read_to_string(path)?;
        let dataset = Self::from_json(&text)?;
        debug!(path = %path.display(), airfields = dataset.airfields.len(), "loaded airfield dataset");
        Ok(dataset)
    }

    pub fn from_json(text: &str) -> Result<Self, PhaseError> {
        let dataset: AirfieldDataset = serde_json::from_str(text)?;
        let problems = dataset.validate();
        for p in &problems {
            warn!(problem = %p, "airfield dataset");
        }
        // unknown priority entries are absorbed per candidate at selection time
        match problems
            .into_iter()
            .find(|p| !matches!(p, DataError::UnknownAirfield(_)))
        {
            Some(fatal) => Err(fatal.into()),
            None => {
                dataset.get(&dataset.home)?;
                Ok(dataset)
            }
        }
    }

    /// Every consistency problem in the dataset.
    pub fn validate(&self) -> Vec<DataError> {
        let mut problems = Vec::new();

        let mut seen: Vec<String> = Vec::new();
        for a in &self.airfields {
            for ident in std::iter::once(&a.icao).chain(a.aliases.iter()) {
                let ident = ident.to_ascii_uppercase();
                if seen.contains(&ident) {
                    problems.push(DataError::Invalid(format!("duplicate airfield identifier {ident}")));
                } else {
                    seen.push(ident);
                }
            }

            for r in &a.runways {
                if let Some(reason) = runway_problem(r) {
                    problems.push(DataError::Invalid(format!("{}: {reason}", a.icao)));
                }
            }
        }

        for ident in &self.alternate_priority {
            if self.find(ident).is_none() {
                problems.push(DataError::UnknownAirfield(ident.clone()));
            }
        }
        problems
    }

    pub fn find(&self, ident: &str) -> Option<&Airfield> {
        self.airfields.iter().find(|a| a.matches(ident))
    }

    pub fn get(&self, ident: &str) -> Result<&Airfield, DataError> {
        self.find(ident).ok_or_else(|| DataError::UnknownAirfield(ident.to_string()))
    }

    pub fn home_airfield(&self) -> Result<&Airfield, DataError> {
        self.get(&self.home)
    }
}

fn runway_problem(r: &Runway) -> Option<String> {
    match r.ends.as_slice() {
        [a, b] => {
            if a.heading >= 360 || b.heading >= 360 {
                return Some(format!("runway {}/{} heading out of range", a.id, b.id));
            }
            let diff = (i32::from(a.heading) - i32::from(b.heading)).rem_euclid(360);
            let off = (diff - 180).unsigned_abs();
            (off > u32::from(RECIPROCAL_TOLERANCE_DEG))
                .then(|| format!("runway {}/{} ends are not reciprocal", a.id, b.id))
        }
        ends => Some(format!("runway must have two ends, found {}", ends.len())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
