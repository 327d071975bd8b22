//! Time-windowed worst-case merge of weather elements.
//!
//! `resolve` is a pure fold: filter by window and source, then combine each
//! kind by its most restrictive value. Nothing here can make the picture
//! better by adding input.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::element::{ElementValue, WeatherElement};
use crate::types::*;

/// Default radius inside which a reported CB forces a recall.
pub const DEFAULT_CB_RADIUS_NM: u32 = 30;

/// Half-open decision window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        TimeWindow { start, end }
    }

    /// `center ± half_width`.
    pub fn around(center: DateTime<Utc>, half_width: Duration) -> Self {
        TimeWindow::new(center - half_width, center + half_width)
    }

    /// `start → start + length`.
    pub fn ahead(start: DateTime<Utc>, length: Duration) -> Self {
        TimeWindow::new(start, start + length)
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Worst-case conditions for one window and source set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedConditions {
    /// Lowest visibility; None when no source reported one.
    pub visibility_m: Option<u32>,
    pub visibility_source: Option<Source>,
    /// Lowest broken-or-worse layer across all sources.
    pub ceiling_ft: Option<u32>,
    pub ceiling_source: Option<Source>,
    /// Worst cover per height, lowest first.
    pub clouds: Vec<CloudLayer>,
    /// Every wind in the window, for runway resolution.
    pub winds: Vec<Wind>,
    /// The strongest wind by effective speed.
    pub effective_wind: Option<Wind>,
    pub wind_source: Option<Source>,
    pub temperature_c: Option<i16>,
    pub qnh_hpa: Option<u16>,
    pub phenomena: Vec<Phenomenon>,
    pub cb_within_radius: bool,
    pub cb_sources: Vec<Source>,
    pub rapid_deterioration: bool,
    pub bird_level: BirdLevel,
    pub sources: Vec<Source>,
    pub element_count: usize,
}

impl ResolvedConditions {
    pub fn has_thunderstorm(&self) -> bool {
        self.phenomena.iter().any(|p| p.is_thunderstorm())
    }

    /// Any layer below `height_ft` that is worse than `allowed`.
    pub fn layer_below_worse_than(&self, height_ft: u32, allowed: Option<CloudCover>) -> Option<&CloudLayer> {
        self.clouds
            .iter()
            .find(|l| l.height_ft < height_ft && allowed.map_or(true, |a| l.cover > a))
    }

    fn absorb(mut self, e: &WeatherElement, cb_radius_nm: u32) -> Self {
        let source = e.source();
        self.element_count += 1;
        if !self.sources.contains(&source) {
            self.sources.push(source);
        }

        match e.value() {
            ElementValue::Visibility(v) => {
                if keep_lower(self.visibility_m, self.visibility_source, *v, source) {
                    self.visibility_m = Some(*v);
                    self.visibility_source = Some(source);
                }
            }
            ElementValue::Cloud(layer) => {
                self.merge_cloud(*layer);
                if layer.is_cb() {
                    self.assert_cb(source);
                }
                if layer.cover.is_ceiling()
                    && keep_lower(self.ceiling_ft, self.ceiling_source, layer.height_ft, source)
                {
                    self.ceiling_ft = Some(layer.height_ft);
                    self.ceiling_source = Some(source);
                }
            }
            ElementValue::Wind(w) => {
                self.winds.push(*w);
                let stronger = match (self.effective_wind, self.wind_source) {
                    (Some(cur), Some(cur_src)) => {
                        w.effective_kt() > cur.effective_kt()
                            || (w.effective_kt() == cur.effective_kt()
                                && source.precedence() < cur_src.precedence())
                    }
                    _ => true,
                };
                if stronger {
                    self.effective_wind = Some(*w);
                    self.wind_source = Some(source);
                }
            }
            ElementValue::Temperature(t) => {
                self.temperature_c = Some(self.temperature_c.map_or(*t, |cur| cur.max(*t)));
            }
            ElementValue::Pressure(q) => {
                self.qnh_hpa = Some(self.qnh_hpa.map_or(*q, |cur| cur.min(*q)));
            }
            ElementValue::Phenomenon(p) => {
                if p.is_thunderstorm() {
                    self.assert_cb(source);
                }
                if !self.phenomena.contains(p) {
                    self.phenomena.push(p.clone());
                }
            }
            ElementValue::Cb { distance_nm } => {
                if distance_nm.map_or(true, |d| d <= cb_radius_nm) {
                    self.assert_cb(source);
                }
            }
            ElementValue::RapidDeterioration => self.rapid_deterioration = true,
            ElementValue::Bird(level) => self.bird_level = self.bird_level.max(*level),
        }
        self
    }

    fn assert_cb(&mut self, source: Source) {
        self.cb_within_radius = true;
        if !self.cb_sources.contains(&source) {
            self.cb_sources.push(source);
        }
    }

    fn merge_cloud(&mut self, layer: CloudLayer) {
        match self.clouds.iter_mut().find(|l| l.height_ft == layer.height_ft) {
            Some(existing) => {
                existing.cover = existing.cover.max(layer.cover);
                // presence of a convective type wins over silence
                if existing.convective.is_none() || layer.is_cb() {
                    existing.convective = layer.convective.or(existing.convective);
                }
            }
            None => {
                let at = self.clouds.partition_point(|l| l.height_ft < layer.height_ft);
                self.clouds.insert(at, layer);
            }
        }
    }
}

/// True when `candidate` should replace the current minimum: strictly lower,
/// or equal and from a higher-precedence source.
fn keep_lower(current: Option<u32>, current_src: Option<Source>, candidate: u32, source: Source) -> bool {
    match (current, current_src) {
        (Some(cur), Some(src)) => candidate < cur || (candidate == cur && source.precedence() < src.precedence()),
        _ => true,
    }
}

/// Merge every element that overlaps `window` and comes from `sources`.
pub fn resolve(elements: &[WeatherElement], window: TimeWindow, sources: &[Source]) -> ResolvedConditions {
    resolve_with_radius(elements, window, sources, DEFAULT_CB_RADIUS_NM)
}

pub fn resolve_with_radius(
    elements: &[WeatherElement],
    window: TimeWindow,
    sources: &[Source],
    cb_radius_nm: u32,
) -> ResolvedConditions {
    let resolved = elements
        .iter()
        .filter(|e| sources.contains(&e.source()))
        .filter(|e| e.overlaps(window.start, window.end))
        .fold(ResolvedConditions::default(), |acc, e| acc.absorb(e, cb_radius_nm));
    debug!(
        start = %window.start,
        end = %window.end,
        elements = resolved.element_count,
        visibility = ?resolved.visibility_m,
        ceiling = ?resolved.ceiling_ft,
        cb = resolved.cb_within_radius,
        "resolved window"
    );
    resolved
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 31, 6, 0, 0).unwrap()
    }

    fn window() -> TimeWindow {
        TimeWindow::around(now(), Duration::minutes(60))
    }

    fn el(source: Source, value: ElementValue) -> WeatherElement {
        WeatherElement::new(source, value, Some(now()), Some(now() + Duration::minutes(90)), now())
    }

    fn timed(source: Source, value: ElementValue, from_min: i64, to_min: i64) -> WeatherElement {
        WeatherElement::new(
            source,
            value,
            Some(now() + Duration::minutes(from_min)),
            Some(now() + Duration::minutes(to_min)),
            now(),
        )
    }

    #[test]
    fn test_lowest_visibility_wins() {
        let els = vec![
            el(Source::Metar, ElementValue::Visibility(9000)),
            el(Source::Pirep, ElementValue::Visibility(4000)),
            el(Source::Warning, ElementValue::Visibility(6000)),
        ];
        let r = resolve(&els, window(), ALL_SOURCES);
        assert_eq!(r.visibility_m, Some(4000));
        assert_eq!(r.visibility_source, Some(Source::Pirep));
    }

    #[test]
    fn test_equal_visibility_tie_breaks_on_precedence() {
        let els = vec![
            el(Source::Warning, ElementValue::Visibility(4000)),
            el(Source::Metar, ElementValue::Visibility(4000)),
        ];
        let r = resolve(&els, window(), ALL_SOURCES);
        assert_eq!(r.visibility_source, Some(Source::Metar));
    }

    #[test]
    fn test_source_filter_excludes_taf() {
        let els = vec![
            el(Source::Metar, ElementValue::Visibility(9000)),
            el(Source::Taf, ElementValue::Visibility(2000)),
        ];
        assert_eq!(resolve(&els, window(), PHASE_SOURCES).visibility_m, Some(9000));
        assert_eq!(resolve(&els, window(), ALL_SOURCES).visibility_m, Some(2000));
    }

    #[test]
    fn test_window_filter_is_half_open() {
        let els = vec![
            timed(Source::Taf, ElementValue::Visibility(2000), 60, 120),
            timed(Source::Taf, ElementValue::Visibility(3000), 30, 60),
        ];
        let r = resolve(&els, window(), ALL_SOURCES);
        assert_eq!(r.visibility_m, Some(3000));
    }

    #[test]
    fn test_ceiling_is_lowest_broken_layer() {
        let els = vec![
            el(Source::Metar, ElementValue::Cloud(CloudLayer::new(CloudCover::Sct, 800))),
            el(Source::Metar, ElementValue::Cloud(CloudLayer::new(CloudCover::Bkn, 2500))),
            el(Source::Pirep, ElementValue::Cloud(CloudLayer::new(CloudCover::Ovc, 1800))),
        ];
        let r = resolve(&els, window(), ALL_SOURCES);
        assert_eq!(r.ceiling_ft, Some(1800));
        assert_eq!(r.ceiling_source, Some(Source::Pirep));
        assert_eq!(r.clouds.len(), 3);
        assert_eq!(r.clouds[0].height_ft, 800);
    }

    #[test]
    fn test_same_height_merges_to_worst_cover() {
        let mut cb = CloudLayer::new(CloudCover::Sct, 3000);
        cb.convective = Some(Convective::Cb);
        let els = vec![
            el(Source::Metar, ElementValue::Cloud(CloudLayer::new(CloudCover::Bkn, 3000))),
            el(Source::Pirep, ElementValue::Cloud(cb)),
        ];
        let r = resolve(&els, window(), ALL_SOURCES);
        assert_eq!(r.clouds.len(), 1);
        assert_eq!(r.clouds[0].cover, CloudCover::Bkn);
        assert!(r.clouds[0].is_cb());
        assert!(r.cb_within_radius);
    }

    #[test]
    fn test_cb_presence_beats_silence() {
        let els = vec![
            el(Source::Metar, ElementValue::Visibility(9999)),
            el(Source::Warning, ElementValue::Cb { distance_nm: None }),
        ];
        let r = resolve(&els, window(), PHASE_SOURCES);
        assert!(r.cb_within_radius);
        assert_eq!(r.cb_sources, vec![Source::Warning]);
    }

    #[test]
    fn test_distant_cb_outside_radius_ignored() {
        let els = vec![el(Source::Metar, ElementValue::Cb { distance_nm: Some(40) })];
        assert!(!resolve(&els, window(), ALL_SOURCES).cb_within_radius);
        assert!(resolve_with_radius(&els, window(), ALL_SOURCES, 50).cb_within_radius);
    }

    #[test]
    fn test_thunderstorm_asserts_cb() {
        let ts = Phenomenon::parse("+TSRA").unwrap();
        let els = vec![el(Source::Metar, ElementValue::Phenomenon(ts))];
        let r = resolve(&els, window(), ALL_SOURCES);
        assert!(r.cb_within_radius);
        assert!(r.has_thunderstorm());
    }

    #[test]
    fn test_strongest_wind_is_effective() {
        let els = vec![
            el(Source::Metar, ElementValue::Wind(Wind::new(330, 12, None))),
            el(Source::Pirep, ElementValue::Wind(Wind::new(300, 18, Some(28)))),
        ];
        let r = resolve(&els, window(), ALL_SOURCES);
        assert_eq!(r.winds.len(), 2);
        assert_eq!(r.effective_wind.map(|w| w.effective_kt()), Some(28));
        assert_eq!(r.wind_source, Some(Source::Pirep));
    }

    #[test]
    fn test_bird_level_is_maximum_and_defaults_low() {
        let r = resolve(&[], window(), ALL_SOURCES);
        assert_eq!(r.bird_level, BirdLevel::Low);
        let els = vec![
            crate::element::bird_element(BirdLevel::Moderate, now()),
            crate::element::bird_element(BirdLevel::Low, now()),
        ];
        assert_eq!(resolve(&els, window(), PHASE_SOURCES).bird_level, BirdLevel::Moderate);
    }

    #[test]
    fn test_temperature_max_and_qnh_min() {
        let els = vec![
            el(Source::Metar, ElementValue::Temperature(38)),
            el(Source::Pirep, ElementValue::Temperature(41)),
            el(Source::Metar, ElementValue::Pressure(1008)),
            el(Source::Metar, ElementValue::Pressure(1012)),
        ];
        let r = resolve(&els, window(), ALL_SOURCES);
        assert_eq!(r.temperature_c, Some(41));
        assert_eq!(r.qnh_hpa, Some(1008));
    }

    #[test]
    fn test_layer_below_worse_than() {
        let els = vec![
            el(Source::Metar, ElementValue::Cloud(CloudLayer::new(CloudCover::Few, 3000))),
            el(Source::Metar, ElementValue::Cloud(CloudLayer::new(CloudCover::Sct, 7000))),
        ];
        let r = resolve(&els, window(), ALL_SOURCES);
        assert!(r.layer_below_worse_than(8000, Some(CloudCover::Few)).is_some());
        assert!(r.layer_below_worse_than(6000, Some(CloudCover::Sct)).is_none());
        assert!(r.layer_below_worse_than(5000, None).is_some());
    }
}
