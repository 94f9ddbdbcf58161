//! End-to-end behavior of the route line core through its public API

use geo::Coord;
use route_line_lib::expression::{traffic_expression, vanishing_expression};
use route_line_lib::{
    ClosestRouteResolver, Color, CompletionTrackerHandle, Congestion, ExpectedRender,
    GranularDistances, LegAnnotation, ProgressSnapshot, ProgressState, QueriedFeature,
    QueryGeometry, RenderBatchId, RenderedFeatureQuery, Route, RouteLeg, RouteLineApi, RouteLineConfig,
    RouteProgress, RouteStep, SourceDataLoaded, TrafficSegmenter, utils,
};
use std::collections::HashSet;
use std::future::Future;
use std::time::{Duration, Instant};

const SPACING: f64 = 0.001;

fn coord(i: f64) -> Coord<f64> {
    Coord {
        x: i * SPACING,
        y: 45.0,
    }
}

/// Route heading east along the 45th parallel, one step per leg, `points` points per leg
fn build_route(id: &str, legs: &[usize], congestion: Option<Congestion>) -> Route {
    let mut cursor = 0usize;
    let mut route_legs = Vec::new();
    let mut total = 0.0;
    for &points in legs {
        let geometry: Vec<Coord<f64>> = (0..points).map(|i| coord((cursor + i) as f64)).collect();
        cursor += points - 1;
        let intervals: Vec<f64> = geometry
            .windows(2)
            .map(|pair| utils::haversine_distance(pair[0], pair[1]))
            .collect();
        let distance: f64 = intervals.iter().sum();
        total += distance;
        route_legs.push(RouteLeg {
            annotation: congestion.map(|congestion| LegAnnotation {
                congestion: vec![congestion; intervals.len()],
                distance: intervals,
                ..Default::default()
            }),
            steps: vec![RouteStep { geometry, distance }],
            ..Default::default()
        });
    }
    Route::new(id, total, route_legs)
}

#[test]
fn test_uniform_low_congestion_is_one_segment() {
    let route = build_route("a", &[4, 6, 3], Some(Congestion::Low));
    let config = RouteLineConfig::default();
    let segments = TrafficSegmenter::from_config(&config).segments(&route, true, |c, primary| {
        config.colors.congestion_color(c, primary)
    });
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].offset, 0.0);
    assert_eq!(segments[0].congestion, Congestion::Low);
}

#[test]
fn test_promote_alternative() {
    let mut api = RouteLineApi::new(RouteLineConfig::default()).unwrap();
    api.set_routes(vec![build_route("A", &[10], None), build_route("B", &[10], None)]);
    api.set_vanishing_offset(0.3);

    let state = api.promote_to_primary("B").unwrap();
    assert_eq!(api.primary_route().map(|route| route.id.as_str()), Some("B"));
    assert_eq!(api.vanishing_offset(), 0.0);
    assert_eq!(state.primary.route_id.as_deref(), Some("B"));
    assert_eq!(state.alternatives[0].route_id.as_deref(), Some("A"));
}

#[test]
fn test_granular_distances_are_monotonic() {
    let route = build_route("a", &[5, 7, 4], None);
    let distances = GranularDistances::from_route(&route).unwrap();
    assert_eq!(distances.len(), route.flattened_point_count());
    for pair in distances.route_distances().windows(2) {
        assert!(pair[0].distance_remaining >= pair[1].distance_remaining);
    }
    assert_eq!(distances.route_distances().last().unwrap().distance_remaining, 0.0);
    assert_eq!(
        distances.complete_distance(),
        distances.route_distances()[0].distance_remaining
    );
}

#[test]
fn test_expressions_are_total() {
    let route = build_route("a", &[6], Some(Congestion::Heavy));
    let config = RouteLineConfig::default();
    let segments = TrafficSegmenter::from_config(&config).segments(&route, true, |c, primary| {
        config.colors.congestion_color(c, primary)
    });

    for offset in [0.0, 0.1, 0.5, 0.99, 1.0] {
        let traffic = traffic_expression(offset, &segments, Color::BLACK);
        let vanishing = vanishing_expression(offset, Color::TRANSPARENT, Color::BLACK);
        for step in 0..=20 {
            let progress = step as f64 / 20.0;
            assert!(traffic.color_at(progress).is_some());
            assert!(vanishing.color_at(progress).is_some());
        }
    }
}

#[test]
fn test_offset_only_increases_after_completion() {
    let mut api = RouteLineApi::new(RouteLineConfig::default()).unwrap();
    api.set_routes(vec![build_route("a", &[21], None)]);
    let route = api.primary_route().cloned().unwrap();
    let step_spacing = utils::haversine_distance(coord(0.0), coord(1.0));
    let now = Instant::now();

    let progress = |traveled: f64, state| RouteProgress {
        state,
        ..RouteProgress::tracking(ProgressSnapshot {
            step_distance_traveled: traveled,
            ..Default::default()
        })
        .for_route(route.id.clone())
    };

    api.update_with_route_progress_at(&progress(step_spacing * 10.5, ProgressState::Complete), now);
    let mut committed = 0.0;
    let positions = [10.5, 10.2, 10.8, 10.6, 10.9];
    for (tick, position) in positions.into_iter().enumerate() {
        let at = now + Duration::from_millis(tick as u64 * 10);
        api.update_traveled_route_line_at(coord(position), at);
        assert!(api.vanishing_offset() >= committed);
        committed = api.vanishing_offset();
    }
    assert!(committed > 0.5);
}

#[test]
fn test_far_position_is_ignored() {
    let mut api = RouteLineApi::new(RouteLineConfig::default()).unwrap();
    api.set_routes(vec![build_route("a", &[11], None)]);
    let step_spacing = utils::haversine_distance(coord(0.0), coord(1.0));
    let now = Instant::now();
    api.update_with_route_progress_at(
        &RouteProgress::tracking(ProgressSnapshot {
            step_distance_traveled: step_spacing * 5.5,
            ..Default::default()
        }),
        now,
    );

    let far = Coord {
        x: 5.5 * SPACING,
        y: 45.001,
    };
    assert!(api.update_traveled_route_line_at(far, now).is_none());
    assert_eq!(api.vanishing_offset(), 0.0);
}

#[tokio::test]
async fn test_completion_of_every_source() {
    let tracker = CompletionTrackerHandle::spawn();
    let mut expected = ExpectedRender::new();
    expected.add_rendered_route("s1", 1, "r1");
    expected.add_rendered_route("s2", 1, "r2");
    let receiver = tracker.submit(HashSet::new(), HashSet::new(), expected);

    tracker.source_data_loaded(SourceDataLoaded::metadata(&RenderBatchId::new("s1", 1)));
    tracker.source_data_loaded(SourceDataLoaded::metadata(&RenderBatchId::new("s2", 1)));

    let result = receiver.await.unwrap();
    assert_eq!(
        result.successfully_rendered,
        HashSet::from(["r1".to_string(), "r2".to_string()])
    );
    assert!(result.rendering_cancelled.is_empty());
    assert_eq!(tracker.pending_waiters().await, 0);
}

#[tokio::test]
async fn test_newer_batch_cancels_older() {
    let tracker = CompletionTrackerHandle::spawn();
    let mut first = ExpectedRender::new();
    first.add_rendered_route("sA", 1, "gen-1");
    let mut second = ExpectedRender::new();
    second.add_rendered_route("sA", 2, "gen-2");

    let first = tracker.submit(HashSet::new(), HashSet::new(), first);
    let second = tracker.submit(HashSet::new(), HashSet::new(), second);
    tracker.source_data_loaded(SourceDataLoaded::metadata(&RenderBatchId::new("sA", 2)));

    let first = first.await.unwrap();
    let second = second.await.unwrap();
    assert_eq!(first.rendering_cancelled, HashSet::from(["gen-1".to_string()]));
    assert!(first.successfully_rendered.is_empty());
    assert_eq!(second.successfully_rendered, HashSet::from(["gen-2".to_string()]));
}

#[tokio::test]
async fn test_render_submission_round_trip() {
    let mut api = RouteLineApi::new(RouteLineConfig::default()).unwrap();
    let state = api.set_routes(vec![build_route("A", &[5], None), build_route("B", &[5], None)]);
    let submission = api.render_submission(&state);

    let tracker = CompletionTrackerHandle::spawn();
    let receiver = tracker.submit(
        submission.rendered_ids.clone(),
        submission.cleared_ids.clone(),
        submission.expected.clone(),
    );
    for batch in &submission.batches {
        tracker.source_data_loaded(SourceDataLoaded::metadata(batch));
    }

    let result = receiver.await.unwrap();
    assert_eq!(
        result.successfully_rendered,
        HashSet::from(["A".to_string(), "B".to_string()])
    );
}

/// Hit-test surface drawing every route as a horizontal band around its index
struct BandRenderer {
    route_ids: Vec<&'static str>,
}

impl RenderedFeatureQuery for BandRenderer {
    fn query_rendered_features(
        &self,
        geometry: QueryGeometry,
        _layer_ids: &[String],
    ) -> impl Future<Output = Vec<QueriedFeature>> + Send {
        let (min_y, max_y) = match geometry {
            QueryGeometry::Point(point) => (point.y, point.y),
            QueryGeometry::Box(area) => (area.min().y, area.max().y),
        };
        let hits = self
            .route_ids
            .iter()
            .enumerate()
            .filter(|(index, _)| {
                let band = *index as f64 * 100.0;
                max_y >= band - 2.0 && min_y <= band + 2.0
            })
            .map(|(_, id)| QueriedFeature::new(*id))
            .collect();
        async move { hits }
    }
}

#[tokio::test]
async fn test_closest_route() {
    let mut api = RouteLineApi::new(RouteLineConfig::default()).unwrap();
    api.set_routes(vec![build_route("A", &[5], None), build_route("B", &[5], None)]);
    let resolver: ClosestRouteResolver = api.closest_route_resolver();
    let renderer = BandRenderer {
        route_ids: vec!["A", "B"],
    };

    let near_b = Coord { x: 0.0, y: 105.0 };
    let index = resolver.find_closest_route(&renderer, near_b, 5.0).await;
    assert_eq!(index, Some(1));
    assert_eq!(
        index.and_then(|index| api.route_for_closest(&resolver, index)).map(|r| r.id.as_str()),
        Some("B")
    );

    let nowhere = Coord { x: 0.0, y: 50.0 };
    assert_eq!(resolver.find_closest_route(&renderer, nowhere, 5.0).await, None);
}
