use std::cell::RefCell;
use std::rc::Rc;

use engine::{CountryClick, EngineConfig, MapEngine};
use foundation::{Feature, FeatureCollection, FeatureId, FeatureRef, Geometry, LngLat};
use layers::{HeadlessRuntime, MapEvent, MapRuntime, Metric, RenderedFeature, ScreenPoint};
use pretty_assertions::assert_eq;
use streaming::{
    FetchJob, FetchKind, FetchOutcome, IndicatorPoint, IndicatorTable, LodTier, NaturalFamily,
};

fn mounted() -> MapEngine<HeadlessRuntime> {
    let mut engine = MapEngine::new(HeadlessRuntime::new(), EngineConfig::default()).unwrap();
    engine.init();
    engine
}

fn square() -> Geometry {
    Geometry::Polygon {
        coordinates: vec![vec![
            vec![10.0, 50.0],
            vec![20.0, 50.0],
            vec![20.0, 60.0],
            vec![10.0, 60.0],
            vec![10.0, 50.0],
        ]],
    }
}

fn country_feature(id: Option<u64>, code: &str, name: &str) -> RenderedFeature {
    RenderedFeature {
        layer: "countries-fill".to_string(),
        source: "countries".to_string(),
        source_layer: Some("country_boundaries".to_string()),
        feature: Feature::new(id.map(FeatureId::Number), Some(square()))
            .with_property("iso_3166_1_alpha_3", code)
            .with_property("name_en", name),
    }
}

fn country(id: u64, code: &str, name: &str) -> RenderedFeature {
    country_feature(Some(id), code, name)
}

fn country_ref(id: u64) -> FeatureRef {
    FeatureRef::new("countries", Some("country_boundaries"), FeatureId::Number(id))
}

fn click(features: Vec<RenderedFeature>) -> MapEvent {
    MapEvent::Click {
        point: ScreenPoint::new(100.0, 100.0),
        lng_lat: LngLat::new(15.0, 55.0),
        features,
    }
}

fn mouse_move(features: Vec<RenderedFeature>) -> MapEvent {
    MapEvent::MouseMove {
        point: ScreenPoint::new(100.0, 100.0),
        lng_lat: LngLat::new(15.0, 55.0),
        features,
    }
}

fn indicators(values: &[(&str, f64)]) -> IndicatorTable {
    values
        .iter()
        .map(|(code, value)| {
            (
                code.to_string(),
                IndicatorPoint {
                    value: Some(*value),
                    year: Some(2022),
                },
            )
        })
        .collect()
}

fn snapshot(owner: &str) -> FeatureCollection {
    FeatureCollection::new(vec![
        Feature::new(Some(FeatureId::Number(1)), None).with_property("NAME", owner),
    ])
}

fn single_job(engine: &mut MapEngine<HeadlessRuntime>) -> FetchJob {
    let mut jobs = engine.take_fetch_jobs();
    assert_eq!(jobs.len(), 1, "expected exactly one fetch, got {jobs:?}");
    jobs.remove(0)
}

fn visible_layers(engine: &MapEngine<HeadlessRuntime>) -> Vec<String> {
    let rt = engine.runtime();
    rt.layer_order()
        .into_iter()
        .filter(|id| rt.is_layer_visible(id))
        .collect()
}

fn click_recorder(engine: &mut MapEngine<HeadlessRuntime>) -> Rc<RefCell<Vec<CountryClick>>> {
    let clicks: Rc<RefCell<Vec<CountryClick>>> = Rc::default();
    let sink = Rc::clone(&clicks);
    engine.set_country_click_callback(Some(Box::new(move |c: &CountryClick| {
        sink.borrow_mut().push(c.clone())
    })));
    clicks
}

fn swap_style(engine: &mut MapEngine<HeadlessRuntime>, url: &str) {
    assert!(engine.set_basemap_style(url));
    engine.runtime_mut().mark_style_loaded();
    assert_eq!(engine.dispatch(MapEvent::StyleLoad), 1);
}

#[test]
fn init_installs_country_layers_and_listeners() {
    let engine = mounted();
    let rt = engine.runtime();
    assert!(rt.has_layer("countries-fill"));
    assert!(rt.has_layer("countries-line"));
    assert!(rt.has_source("countries"));
    assert_eq!(rt.listener_count(), 6);
    assert_eq!(engine.style_loads(), 1);
}

#[test]
fn init_waits_for_style_when_not_loaded() {
    let mut rt = HeadlessRuntime::new();
    rt.set_style("mapbox://styles/mapbox/dark-v11");
    let mut engine = MapEngine::new(rt, EngineConfig::default()).unwrap();
    engine.init();
    assert!(engine.is_awaiting_style());
    assert!(!engine.runtime().has_layer("countries-fill"));

    engine.runtime_mut().mark_style_loaded();
    engine.dispatch(MapEvent::StyleLoad);
    assert!(!engine.is_awaiting_style());
    assert!(engine.runtime().has_layer("countries-fill"));
    assert_eq!(engine.runtime().listener_count(), 6);
}

#[test]
fn later_year_wins_regardless_of_arrival_order() {
    let mut engine = mounted();
    engine.set_historical_mode(true);
    let first = single_job(&mut engine);
    assert_eq!(first.kind, FetchKind::History { year: 1914 });

    engine.set_year(1944);
    engine.on_animation_frame(16);
    let second = single_job(&mut engine);
    assert_eq!(second.kind, FetchKind::History { year: 1945 });

    assert!(engine.deliver(FetchOutcome::features(second, Ok(snapshot("B")))));
    assert!(!engine.deliver(FetchOutcome::features(first, Ok(snapshot("A")))));
    assert_eq!(engine.historical().timeline().displayed_year(), Some(1945));
}

#[test]
fn years_set_within_one_frame_coalesce() {
    let mut engine = mounted();
    engine.set_historical_mode(true);
    engine.take_fetch_jobs();

    engine.set_year(1920);
    engine.set_year(1938);
    engine.set_year(1994);
    assert!(engine.take_fetch_jobs().is_empty());
    engine.on_animation_frame(16);
    assert_eq!(single_job(&mut engine).kind, FetchKind::History { year: 1994 });
}

#[test]
fn choropleth_returns_after_historical_mode() {
    let mut engine = mounted();
    engine.set_active_metric(Some(Metric::Gini));
    let job = single_job(&mut engine);
    let table = indicators(&[("NOR", 25.0), ("SWE", 28.0), ("BRA", 52.0), ("ZAF", 63.0)]);
    assert!(engine.deliver(FetchOutcome::indicators(job, Ok(table))));

    let layer = Metric::Gini.layer_id();
    assert!(engine.runtime().is_layer_visible(layer));
    assert!(engine.legend().is_some());

    engine.set_historical_mode(true);
    assert!(!engine.runtime().is_layer_visible(layer));
    assert!(!engine.runtime().is_layer_visible("countries-fill"));
    assert!(engine.legend().is_none());

    engine.set_historical_mode(false);
    assert!(engine.runtime().is_layer_visible(layer));
    assert!(engine.runtime().is_layer_visible("countries-fill"));
    assert!(engine.legend().is_some());
    assert_eq!(engine.choropleth().active(), Some(Metric::Gini));
}

#[test]
fn switching_metrics_shows_one_layer_at_a_time() {
    let mut engine = mounted();
    for metric in [Metric::Gini, Metric::Inflation] {
        engine.set_active_metric(Some(metric));
        let job = single_job(&mut engine);
        let table = indicators(&[("NOR", 1.0), ("SWE", 2.0), ("FIN", 3.0)]);
        engine.deliver(FetchOutcome::indicators(job, Ok(table)));
    }
    let rt = engine.runtime();
    assert!(rt.is_layer_visible(Metric::Inflation.layer_id()));
    assert!(!rt.is_layer_visible(Metric::Gini.layer_id()));

    engine.set_active_metric(Some(Metric::Gini));
    assert!(engine.take_fetch_jobs().is_empty());
    assert!(engine.runtime().is_layer_visible(Metric::Gini.layer_id()));
}

#[test]
fn one_lod_refresh_per_tier_crossing() {
    let mut engine = mounted();
    engine.set_natural_enabled(NaturalFamily::Rivers, true);
    let job = single_job(&mut engine);
    let FetchKind::Natural { tier, .. } = job.kind else {
        panic!("expected a natural fetch");
    };
    assert_eq!(tier, LodTier::Low);
    engine.deliver(FetchOutcome::features(job, Ok(FeatureCollection::default())));

    engine.advance(1000);
    engine.dispatch(MapEvent::ZoomEnd { zoom: 4.0 });
    engine.advance(1100);
    engine.dispatch(MapEvent::ZoomEnd { zoom: 4.2 });
    engine.advance(1200);
    assert!(engine.take_fetch_jobs().is_empty());

    engine.advance(1300);
    let job = single_job(&mut engine);
    let FetchKind::Natural { tier, .. } = job.kind else {
        panic!("expected a natural fetch");
    };
    assert_eq!(tier, LodTier::Med);
    engine.deliver(FetchOutcome::features(job, Ok(FeatureCollection::default())));

    engine.dispatch(MapEvent::ZoomEnd { zoom: 4.6 });
    engine.advance(2000);
    assert!(engine.take_fetch_jobs().is_empty());

    // Back to a tier already fetched: served from cache.
    engine.dispatch(MapEvent::ZoomEnd { zoom: 1.0 });
    engine.advance(3000);
    assert!(engine.take_fetch_jobs().is_empty());
    assert_eq!(
        engine.natural().applied_tier(NaturalFamily::Rivers),
        Some(LodTier::Low)
    );
}

#[test]
fn zooming_back_discards_the_abandoned_tier() {
    let mut engine = mounted();
    engine.set_natural_enabled(NaturalFamily::Rivers, true);
    let job = single_job(&mut engine);
    engine.deliver(FetchOutcome::features(job, Ok(snapshot("low"))));

    engine.dispatch(MapEvent::ZoomEnd { zoom: 7.0 });
    engine.advance(500);
    let high = single_job(&mut engine);
    assert!(matches!(high.kind, FetchKind::Natural { tier: LodTier::High, .. }));

    engine.dispatch(MapEvent::ZoomEnd { zoom: 1.0 });
    engine.advance(1000);
    assert!(engine.take_fetch_jobs().is_empty());

    assert!(!engine.deliver(FetchOutcome::features(high, Ok(snapshot("high")))));
    assert_eq!(
        engine.natural().applied_tier(NaturalFamily::Rivers),
        Some(LodTier::Low)
    );
    assert_eq!(engine.runtime().count_calls("set_source_data", "natural-rivers"), 1);
}

#[test]
fn jumping_two_tiers_refreshes_once() {
    let mut engine = mounted();
    engine.set_natural_enabled(NaturalFamily::Peaks, true);
    let job = single_job(&mut engine);
    engine.deliver(FetchOutcome::features(job, Ok(snapshot("low"))));
    assert!(engine.runtime().has_image("natural-peak-icon"));

    engine.dispatch(MapEvent::ZoomEnd { zoom: 7.0 });
    engine.advance(500);
    let job = single_job(&mut engine);
    assert_eq!(
        job.kind,
        FetchKind::Natural {
            family: NaturalFamily::Peaks,
            tier: LodTier::High,
            limit: 150 * 12,
        }
    );
    engine.deliver(FetchOutcome::features(job, Ok(snapshot("high"))));
    assert_eq!(engine.runtime().count_calls("set_source_data", "natural-peaks"), 2);

    swap_style(&mut engine, "mapbox://styles/mapbox/dark-v11");
    assert!(engine.runtime().has_image("natural-peak-icon"));
    assert!(engine.runtime().has_layer("natural-peaks"));
    assert!(engine.take_fetch_jobs().is_empty());
}

#[test]
fn hover_is_debounced_to_the_last_feature() {
    let mut engine = mounted();
    engine.advance(0);
    engine.dispatch(mouse_move(vec![country(1, "NOR", "Norway")]));
    engine.advance(30);
    engine.dispatch(mouse_move(vec![country(2, "SWE", "Sweden")]));
    engine.advance(79);
    assert!(!engine.runtime().has_state_flag(&country_ref(2), "hover"));

    engine.advance(80);
    assert!(engine.runtime().has_state_flag(&country_ref(2), "hover"));
    assert!(!engine.runtime().has_state_flag(&country_ref(1), "hover"));

    engine.dispatch(MapEvent::MouseLeave);
    assert!(!engine.runtime().has_state_flag(&country_ref(2), "hover"));
}

#[test]
fn hover_settles_while_the_pointer_keeps_moving() {
    let mut engine = mounted();
    for t in (0..=1000).step_by(20) {
        engine.advance(t);
        engine.dispatch(mouse_move(vec![country(3, "BRA", "Brazil")]));
    }
    engine.advance(1000);
    assert!(engine.runtime().has_state_flag(&country_ref(3), "hover"));
    assert_eq!(engine.runtime().count_op("set_feature_state"), 1);
}

#[test]
fn click_selects_flies_and_reports_then_toggles_off() {
    let mut engine = mounted();
    let clicks = click_recorder(&mut engine);

    engine.dispatch(click(vec![country(7, "NOR", "Norway")]));
    assert!(engine.runtime().has_state_flag(&country_ref(7), "selected"));
    assert_eq!(engine.runtime().count_op("ease_to"), 1);
    let center = engine.runtime().camera().center;
    assert!((center.lng - 15.0).abs() < 1e-6 && (center.lat - 55.0).abs() < 1e-6);
    {
        let clicks = clicks.borrow();
        assert_eq!(clicks.len(), 1);
        assert_eq!(clicks[0].code, "NOR");
        assert_eq!(clicks[0].name, "Norway");
    }

    engine.dispatch(click(vec![country(7, "NOR", "Norway")]));
    assert!(!engine.runtime().has_state_flag(&country_ref(7), "selected"));
    assert!(engine.selection().selected().is_none());
    assert_eq!(clicks.borrow().len(), 1);
}

#[test]
fn click_on_country_without_id_still_flies_and_reports() {
    let mut engine = mounted();
    let clicks = click_recorder(&mut engine);

    engine.dispatch(click(vec![country_feature(None, "NOR", "Norway")]));
    assert_eq!(engine.runtime().count_op("ease_to"), 1);
    assert_eq!(engine.runtime().count_op("set_feature_state"), 0);
    assert!(engine.selection().selected().is_none());
    let clicks = clicks.borrow();
    assert_eq!(clicks.len(), 1);
    assert_eq!(clicks[0].code, "NOR");
    assert_eq!(clicks[0].name, "Norway");
}

#[test]
fn late_indicators_after_turning_choropleth_off_change_nothing_visible() {
    let mut engine = mounted();
    engine.set_active_metric(Some(Metric::Gini));
    let job = single_job(&mut engine);
    engine.set_active_metric(None);

    let before = visible_layers(&engine);
    let table = indicators(&[("NOR", 25.0), ("SWE", 28.0), ("BRA", 52.0)]);
    engine.deliver(FetchOutcome::indicators(job, Ok(table)));

    assert_eq!(visible_layers(&engine), before);
    assert!(!engine.runtime().is_layer_visible(Metric::Gini.layer_id()));
    assert!(engine.legend().is_none());
}

#[test]
fn listener_count_is_stable_across_style_swaps() {
    let mut engine = mounted();
    let before = engine.runtime().listener_count();
    for url in [
        "mapbox://styles/mapbox/dark-v11",
        "mapbox://styles/mapbox/satellite-v9",
        "mapbox://styles/mapbox/light-v11",
    ] {
        swap_style(&mut engine, url);
        assert_eq!(engine.runtime().listener_count(), before);
        assert_eq!(engine.lifecycle().binding_count(), before);
    }
    assert_eq!(engine.style_loads(), 4);
}

#[test]
fn custom_state_survives_style_swap() {
    let mut engine = mounted();
    engine.set_active_metric(Some(Metric::Gdp));
    let job = single_job(&mut engine);
    let table = indicators(&[("NOR", 5.0e11), ("SWE", 6.0e11), ("USA", 2.5e13)]);
    engine.deliver(FetchOutcome::indicators(job, Ok(table)));
    engine.dispatch(click(vec![country(7, "NOR", "Norway")]));
    engine.set_terrain_exaggeration(1.5);
    engine.set_minimal_mode(true);

    swap_style(&mut engine, "mapbox://styles/mapbox/dark-v11");

    let rt = engine.runtime();
    assert!(rt.has_layer("countries-fill"));
    assert!(rt.is_layer_visible(Metric::Gdp.layer_id()));
    assert!(rt.has_state_flag(&country_ref(7), "selected"));
    assert_eq!(rt.terrain().map(|t| t.exaggeration), Some(1.5));
    assert!(!rt.is_layer_visible("place-labels"));
    assert!(engine.legend().is_some());
}

#[test]
fn responses_after_dispose_are_ignored() {
    let mut engine = mounted();
    engine.set_active_metric(Some(Metric::Gini));
    let job = single_job(&mut engine);
    engine.dispose();

    assert_eq!(engine.runtime().listener_count(), 0);
    assert!(!engine.runtime().has_layer("countries-fill"));
    let table = indicators(&[("NOR", 25.0)]);
    assert!(!engine.deliver(FetchOutcome::indicators(job, Ok(table))));
    assert!(!engine.runtime().has_layer(Metric::Gini.layer_id()));
}

#[test]
fn auto_rotation_pauses_on_interaction() {
    let mut engine = mounted();
    engine.set_auto_rotate(true);
    engine.on_animation_frame(0);
    engine.on_animation_frame(1000);
    let lng = engine.runtime().camera().center.lng;
    assert!((lng - 3.0).abs() < 1e-9, "rotated to {lng}");

    engine.dispatch(MapEvent::ZoomEnd { zoom: 1.5 });
    engine.on_animation_frame(2000);
    assert_eq!(engine.runtime().camera().center.lng, lng);

    engine.set_auto_rotate(false);
    engine.on_animation_frame(9000);
    assert_eq!(engine.runtime().camera().center.lng, lng);
}
