//! Property tests for the decision pipeline.
//!
//! - Adding weather never makes the declared phase more permissive
//! - Worse visibility or ceiling never improves the phase
//! - The bird cap is idempotent and never relaxes
//! - METAR text survives a format/parse round trip
//! - Runway wind components are symmetric between reciprocal ends

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use flyphase_core::clock::ParseContext;
use flyphase_core::config::Config;
use flyphase_core::element::{ElementValue, WeatherElement};
use flyphase_core::metar::MetarObservation;
use flyphase_core::phase::{apply_bird_cap, IfrMinima, PhaseTable};
use flyphase_core::pipeline::{resolve, ResolvedConditions, TimeWindow};
use flyphase_core::wind::components;
use flyphase_core::*;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 31, 6, 0, 0).unwrap()
}

fn table() -> PhaseTable {
    let limits = Config::default().limits;
    PhaseTable::new(&limits, IfrMinima::defaults(&limits))
}

fn window() -> TimeWindow {
    TimeWindow::around(now(), Duration::minutes(60))
}

fn cover() -> impl Strategy<Value = CloudCover> {
    prop_oneof![
        Just(CloudCover::Few),
        Just(CloudCover::Sct),
        Just(CloudCover::Bkn),
        Just(CloudCover::Ovc),
    ]
}

fn bird() -> impl Strategy<Value = BirdLevel> {
    prop_oneof![Just(BirdLevel::Low), Just(BirdLevel::Moderate), Just(BirdLevel::Severe)]
}

/// One element of any kind the phase table looks at.
fn element() -> impl Strategy<Value = ElementValue> {
    prop_oneof![
        (0u32..12000).prop_map(ElementValue::Visibility),
        (cover(), 0u32..250).prop_map(|(c, h)| ElementValue::Cloud(CloudLayer::new(c, h * 100))),
        (0u16..36, 0u16..50).prop_map(|(d, s)| ElementValue::Wind(Wind::new(d * 10, s, None))),
        (-10i16..55).prop_map(ElementValue::Temperature),
        prop::option::of(0u32..60).prop_map(|distance_nm| ElementValue::Cb { distance_nm }),
    ]
}

fn elements() -> impl Strategy<Value = Vec<WeatherElement>> {
    prop::collection::vec(element(), 0..8).prop_map(|values| {
        values
            .into_iter()
            .map(|v| WeatherElement::new(Source::Metar, v, None, None, now()))
            .collect()
    })
}

fn phase_of(conditions: &ResolvedConditions) -> Phase {
    table().evaluate(conditions, None).phase
}

proptest! {
    /// Property: the union of two element sets is never more permissive than either.
    #[test]
    fn prop_adding_elements_never_relaxes(a in elements(), b in elements()) {
        // a missing visibility fails closed, so both sides start with one
        let mut a = a;
        a.push(WeatherElement::new(Source::Metar, ElementValue::Visibility(9999), None, None, now()));
        let alone = resolve(&a, window(), PHASE_SOURCES);
        let mut both = a.clone();
        both.extend(b);
        let merged = resolve(&both, window(), PHASE_SOURCES);
        prop_assert!(phase_of(&merged) >= phase_of(&alone));
    }

    /// Property: lowering visibility never improves the phase.
    #[test]
    fn prop_visibility_monotonic(hi in 0u32..12000, drop in 0u32..12000, ceiling in 0u32..100) {
        let lo = hi.saturating_sub(drop);
        let base = |v| ResolvedConditions {
            visibility_m: Some(v),
            ceiling_ft: Some(ceiling * 100),
            clouds: vec![CloudLayer::new(CloudCover::Bkn, ceiling * 100)],
            winds: vec![Wind::calm()],
            ..ResolvedConditions::default()
        };
        prop_assert!(phase_of(&base(lo)) >= phase_of(&base(hi)));
    }

    /// Property: lowering the ceiling never improves the phase.
    #[test]
    fn prop_ceiling_monotonic(hi in 0u32..250, drop in 0u32..250, vis in 0u32..12000) {
        let lo = hi.saturating_sub(drop);
        let base = |c: u32| ResolvedConditions {
            visibility_m: Some(vis),
            ceiling_ft: Some(c * 100),
            clouds: vec![CloudLayer::new(CloudCover::Ovc, c * 100)],
            winds: vec![Wind::calm()],
            ..ResolvedConditions::default()
        };
        prop_assert!(phase_of(&base(lo)) >= phase_of(&base(hi)));
    }

    /// Property: applying the bird cap twice equals applying it once.
    #[test]
    fn prop_bird_cap_idempotent(els in elements(), level in bird()) {
        let result = table().evaluate(&resolve(&els, window(), PHASE_SOURCES), None);
        let before = result.phase;
        let once = apply_bird_cap(result, level);
        let twice = apply_bird_cap(once.clone(), level);
        prop_assert_eq!(&once, &twice);
        prop_assert!(once.phase >= before);
        if level != BirdLevel::Low {
            prop_assert!(once.phase >= Phase::Vfr);
            prop_assert!(!once.solo.any());
        }
    }

    /// Property: a formatted observation parses back to the same values.
    #[test]
    fn prop_metar_round_trip(
        dir in 0u16..36,
        speed in 1u16..60,
        gust in prop::option::of(5u16..30),
        vis in 1u32..10,
        layers in prop::collection::vec((cover(), 1u32..250), 1..4),
        temp in 0i16..50,
        qnh in 950u16..1050,
    ) {
        let wind = Wind::new(dir * 10, speed, gust.map(|g| speed + g));
        let clouds: Vec<String> = layers
            .iter()
            .map(|(c, h)| CloudLayer::new(*c, h * 100).to_string())
            .collect();
        let text = format!(
            "OEKF 310600Z {wind} {:04} {} {temp:02}/00 Q{qnh:04}",
            vis * 1000,
            clouds.join(" "),
        );
        let ctx = ParseContext::new(now(), "OEKF");
        let first = MetarObservation::parse(&text, &ctx).unwrap();
        let second = MetarObservation::parse(&first.to_report(), &ctx).unwrap();
        prop_assert_eq!(first.wind, second.wind);
        prop_assert_eq!(first.visibility_m, second.visibility_m);
        prop_assert_eq!(&first.clouds, &second.clouds);
        prop_assert_eq!(first.temperature_c, second.temperature_c);
        prop_assert_eq!(first.qnh_hpa, second.qnh_hpa);
        prop_assert!(first.issues.is_empty());
    }

    /// Property: reciprocal runway ends see the same crosswind and opposite along-components.
    #[test]
    fn prop_wind_components_symmetric(dir in 0u16..360, speed in 0u16..60, heading in 0u16..180) {
        let wind = Wind::new(dir, speed, None);
        let a = components(&wind, heading);
        let b = components(&wind, heading + 180);
        prop_assert!((a.crosswind_kt - b.crosswind_kt).abs() < 1e-6);
        prop_assert!((a.along_kt + b.along_kt).abs() < 1e-6);
        prop_assert!(a.crosswind_kt <= f64::from(speed) + 1e-6);
    }
}
