//! Route sources for the demo: JSON files or synthesized routes

use super::DemoError;
use geo::Coord;
use route_line_lib::{Congestion, LegAnnotation, Route, RouteLeg, RouteStep, utils};
use std::path::Path;

/// Points per synthesized step
const POINTS_PER_STEP: usize = 25;

const CONGESTION_CYCLE: [Congestion; 6] = [
    Congestion::Low,
    Congestion::Low,
    Congestion::Moderate,
    Congestion::Heavy,
    Congestion::Unknown,
    Congestion::Severe,
];

/// Load an array of routes from a JSON file
pub fn load_routes(path: &Path) -> Result<Vec<Route>, DemoError> {
    let text = std::fs::read_to_string(path)?;
    let routes: Vec<Route> = serde_json::from_str(&text)?;
    if routes.is_empty() {
        return Err(DemoError::NoRoutes);
    }
    tracing::info!(path = %path.display(), routes = routes.len(), "Loaded routes");
    Ok(routes)
}

/// Generate `count` routes starting together and drifting apart northwards
///
/// Every route carries congestion annotations; the first one also has a closure and a
/// restricted section on its first leg when the leg is long enough.
pub fn synthesize_routes(count: usize, legs: usize, points_per_leg: usize) -> Vec<Route> {
    let points_per_leg = points_per_leg.max(2);
    (0..count)
        .map(|index| synthesize_route(index, legs.max(1), points_per_leg))
        .collect()
}

fn synthesize_route(index: usize, legs: usize, points_per_leg: usize) -> Route {
    let drift = index as f64 * 0.00002;
    let mut cursor = 0usize;
    let mut total = 0.0;
    let mut route_legs = Vec::with_capacity(legs);

    for leg_index in 0..legs {
        let geometry: Vec<Coord<f64>> = (0..points_per_leg)
            .map(|i| {
                let t = (cursor + i) as f64;
                Coord {
                    x: -0.1 + t * 0.0002,
                    y: 51.5 + (t * 0.03).sin() * 0.0004 + t * drift,
                }
            })
            .collect();
        cursor += points_per_leg - 1;

        let intervals: Vec<f64> = geometry
            .windows(2)
            .map(|pair| utils::haversine_distance(pair[0], pair[1]))
            .collect();
        let congestion = (0..intervals.len())
            .map(|i| CONGESTION_CYCLE[(i / 15 + index + leg_index) % CONGESTION_CYCLE.len()])
            .collect();
        let road_class = (0..intervals.len())
            .map(|i| match i % 80 {
                0 => Some("motorway".to_string()),
                40 => Some("street".to_string()),
                _ => None,
            })
            .collect();

        let steps = split_steps(&geometry, &intervals);
        total += intervals.iter().sum::<f64>();

        let mut leg = RouteLeg {
            steps,
            annotation: Some(LegAnnotation {
                distance: intervals,
                congestion,
                road_class,
                ..Default::default()
            }),
            ..Default::default()
        };
        if index == 0 && leg_index == 0 && points_per_leg > 60 {
            leg.closures.push(20..=25);
            leg.restricted.push(40..=55);
        }
        route_legs.push(leg);
    }

    Route::new(format!("route-{index}"), total, route_legs)
}

/// Cut a leg into steps sharing their boundary points
fn split_steps(geometry: &[Coord<f64>], intervals: &[f64]) -> Vec<RouteStep> {
    let mut steps = Vec::new();
    let mut start = 0;
    while start + 1 < geometry.len() {
        let end = (start + POINTS_PER_STEP - 1).min(geometry.len() - 1);
        steps.push(RouteStep {
            geometry: geometry[start..=end].to_vec(),
            distance: intervals[start..end].iter().sum(),
        });
        start = end;
    }
    steps
}
