//! Wind components against runway headings and runway selection.
//!
//! Components use the effective speed (gust when present). Calm and VRB
//! winds resolve to zero; a wind of unknown direction is all crosswind.

use serde::Serialize;
use tracing::debug;

use crate::airfield::RunwayEnd;
use crate::types::{Wind, WindDirection};

const EPSILON: f64 = 1e-6;

/// Components of one wind against one heading. `along` is signed: positive
/// is headwind, negative tailwind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindComponents {
    pub crosswind_kt: f64,
    pub along_kt: f64,
}

impl WindComponents {
    pub fn headwind_kt(&self) -> f64 {
        self.along_kt.max(0.0)
    }

    pub fn tailwind_kt(&self) -> f64 {
        (-self.along_kt).max(0.0)
    }
}

pub fn components(wind: &Wind, heading: u16) -> WindComponents {
    if wind.is_directionless() {
        return WindComponents {
            crosswind_kt: 0.0,
            along_kt: 0.0,
        };
    }
    let speed = f64::from(wind.effective_kt());
    match wind.direction {
        WindDirection::Degrees(dir) => {
            let delta = (f64::from(dir) - f64::from(heading)).to_radians();
            WindComponents {
                crosswind_kt: (speed * delta.sin()).abs(),
                along_kt: speed * delta.cos(),
            }
        }
        WindDirection::Unknown => WindComponents {
            crosswind_kt: speed,
            along_kt: 0.0,
        },
        WindDirection::Variable => WindComponents {
            crosswind_kt: 0.0,
            along_kt: 0.0,
        },
    }
}

/// The chosen runway end and its worst-case components across every wind
/// in the window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunwayWind {
    pub runway: String,
    pub heading: u16,
    pub crosswind_kt: f64,
    pub headwind_kt: f64,
    pub tailwind_kt: f64,
    /// Strongest effective wind speed considered.
    pub effective_kt: u16,
    pub manual: bool,
}

impl RunwayWind {
    fn for_end(end: &RunwayEnd, winds: &[Wind], manual: bool) -> Self {
        let (cross, along) = worst_components(winds, end.heading);
        RunwayWind {
            runway: end.id.clone(),
            heading: end.heading,
            crosswind_kt: cross,
            headwind_kt: along.max(0.0),
            tailwind_kt: (-along).max(0.0),
            effective_kt: total_wind_kt(winds),
            manual,
        }
    }
}

/// Strongest effective speed among winds with a direction. Calm and VRB
/// winds never count against a limit.
pub fn total_wind_kt(winds: &[Wind]) -> u16 {
    winds
        .iter()
        .filter(|w| !w.is_directionless())
        .map(Wind::effective_kt)
        .max()
        .unwrap_or(0)
}

/// Highest crosswind and lowest signed along-track component.
fn worst_components(winds: &[Wind], heading: u16) -> (f64, f64) {
    let mut cross: f64 = 0.0;
    let mut along: Option<f64> = None;
    for w in winds {
        let c = components(w, heading);
        cross = cross.max(c.crosswind_kt);
        along = Some(along.map_or(c.along_kt, |a| a.min(c.along_kt)));
    }
    (cross, along.unwrap_or(0.0))
}

/// Resolve the runway in use. A manual end is taken as given. Otherwise pick
/// the end with least crosswind among those without a tailwind, preferring
/// more headwind on ties; only if every end has a tailwind is one chosen
/// from all ends. Returns None when there are no runway ends.
pub fn resolve_runway(winds: &[Wind], ends: &[RunwayEnd], manual: Option<&RunwayEnd>) -> Option<RunwayWind> {
    if let Some(end) = manual {
        return Some(RunwayWind::for_end(end, winds, true));
    }

    let candidates: Vec<RunwayWind> = ends.iter().map(|e| RunwayWind::for_end(e, winds, false)).collect();
    let into_wind: Vec<&RunwayWind> = candidates.iter().filter(|c| c.tailwind_kt <= EPSILON).collect();
    let pool: Vec<&RunwayWind> = if into_wind.is_empty() {
        candidates.iter().collect()
    } else {
        into_wind
    };

    let best = pool.into_iter().fold(None::<&RunwayWind>, |best, c| match best {
        None => Some(c),
        Some(b) if better(c, b) => Some(c),
        keep => keep,
    })?;

    debug!(
        runway = %best.runway,
        crosswind = best.crosswind_kt,
        headwind = best.headwind_kt,
        tailwind = best.tailwind_kt,
        "selected runway"
    );
    Some(best.clone())
}

fn better(c: &RunwayWind, b: &RunwayWind) -> bool {
    if (c.crosswind_kt - b.crosswind_kt).abs() > EPSILON {
        return c.crosswind_kt < b.crosswind_kt;
    }
    let (ca, ba) = (c.headwind_kt - c.tailwind_kt, b.headwind_kt - b.tailwind_kt);
    ca > ba + EPSILON
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
