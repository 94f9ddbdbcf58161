//! Demo application
//!
//! Runs one simulated trip:
//! - Loads or synthesizes routes and hands them to the route line core
//! - Pushes every render state through the simulated renderer and waits for completion
//! - Walks the primary route, feeding progress and positions to the vanishing point
//! - Taps on an alternative route and resolves it back to a route

mod renderer;
mod routes;
pub mod settings;
mod simulation;

use crate::app::renderer::SimulatedRenderer;
use crate::app::settings::Settings;
use crate::app::simulation::ProgressSimulator;
use route_line_lib::{
    CompletionTrackerHandle, RenderState, Route, RouteLineApi, RouteLineConfig, RouteLineError,
    RouteLineSource, RoutesRenderedResult, RESTRICTED_SOURCE_ID, WAYPOINT_SOURCE_ID, utils,
};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Instant;
use tokio::sync::oneshot;

/// Errors that end the demo
#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    RouteLine(#[from] RouteLineError),

    #[error("No routes to show")]
    NoRoutes,

    #[error("Render completion tracker stopped")]
    TrackerStopped(#[from] oneshot::error::RecvError),
}

/// Run the demo with the given settings
pub async fn run(settings: Settings) -> Result<(), DemoError> {
    let base = match &settings.config {
        Some(path) => load_config(path)?,
        None => RouteLineConfig::default(),
    };
    let mut api = RouteLineApi::new(settings.apply_to(base))?;

    let routes = match &settings.routes {
        Some(path) => routes::load_routes(path)?,
        None => routes::synthesize_routes(
            settings.synthetic_routes,
            settings.synthetic_legs,
            settings.points_per_leg,
        ),
    };
    if routes.is_empty() {
        return Err(DemoError::NoRoutes);
    }

    let tracker = CompletionTrackerHandle::spawn();
    let renderer = SimulatedRenderer::new(
        tracker.clone(),
        api.config().layer_ids.clone(),
        settings.render_latency(),
    );

    let state = api.set_routes(routes);
    let submission = api.render_submission(&state);
    report_render("initial", renderer.apply(&state, submission).await?);

    if let Some(route_id) = &settings.promote {
        let state = api.promote_to_primary(route_id)?;
        let submission = api.render_submission(&state);
        report_render("promotion", renderer.apply(&state, submission).await?);
    }

    simulate_trip(&mut api, &settings)?;

    if let Some(alternative) = api.routes().nth(1).cloned() {
        tap_route(&api, &renderer, &alternative, settings.tap_padding).await;
    }

    if settings.json {
        let state = api.redraw();
        println!("{}", serde_json::to_string_pretty(&render_state_json(&state))?);
    }

    tracing::debug!(
        pending = tracker.pending_waiters().await,
        "Demo finished"
    );
    Ok(())
}

fn load_config(path: &Path) -> Result<RouteLineConfig, DemoError> {
    let text = std::fs::read_to_string(path)?;
    let config = serde_json::from_str(&text)?;
    tracing::info!(path = %path.display(), "Loaded route line configuration");
    Ok(config)
}

fn report_render(label: &str, result: RoutesRenderedResult) {
    tracing::info!(
        label,
        rendered = ?result.successfully_rendered,
        rendering_cancelled = ?result.rendering_cancelled,
        cleared = ?result.successfully_cleared,
        clearing_cancelled = ?result.clearing_cancelled,
        "Render batch completed"
    );
}

/// Walk the primary route on a simulated clock
fn simulate_trip(api: &mut RouteLineApi, settings: &Settings) -> Result<(), DemoError> {
    let primary = api.primary_route().cloned().ok_or(DemoError::NoRoutes)?;
    let simulator = ProgressSimulator::new(primary.clone(), settings.speed);
    tracing::info!(
        route_id = %primary.id,
        length = simulator.length(),
        ticks = settings.ticks,
        "Starting simulated trip"
    );

    let ticks = settings.ticks.max(1);
    let start = Instant::now();
    for tick in 0..=ticks {
        let fraction = tick as f64 / ticks as f64;
        let Some((progress, position)) = simulator.sample(fraction) else {
            tracing::warn!(route_id = %primary.id, "Primary route has no geometry to travel");
            break;
        };
        let now = start + settings.tick_interval() * u32::try_from(tick).unwrap_or(u32::MAX);

        if let Some(update) = api.update_with_route_progress_at(&progress, now) {
            tracing::info!(tick, offset = update.offset, "Active leg changed");
        }
        match api.update_traveled_route_line_at(position, now) {
            Some(update) => tracing::info!(
                tick,
                offset = format!("{:.4}", update.offset),
                restricted = update.restricted.is_some(),
                "Vanishing point moved"
            ),
            None => tracing::debug!(tick, "Route line unchanged"),
        }
    }
    Ok(())
}

/// Tap a little beside `route` and report which route the tap resolves to
async fn tap_route(api: &RouteLineApi, renderer: &SimulatedRenderer, route: &Route, padding: f64) {
    let geometry = route.flattened_geometry();
    let Some(point) = geometry.get(geometry.len() * 3 / 4) else {
        return;
    };
    let mut tap = utils::coord_to_mercator(*point);
    tap.y += padding / 2.0;

    let resolver = api.closest_route_resolver();
    let found = resolver
        .find_closest_route(renderer, tap, padding)
        .await
        .and_then(|index| api.route_for_closest(&resolver, index));
    match found {
        Some(found) => tracing::info!(target_route = %route.id, found = %found.id, "Tap resolved"),
        None => tracing::info!(target_route = %route.id, "Tap hit no route"),
    }
}

fn source_json(source: &RouteLineSource) -> Value {
    json!({
        "id": source.source_id,
        "route_id": source.route_id,
        "data": source.features.to_json(),
        "casing": source.expressions.casing.to_json(),
        "line": source.expressions.base.to_json(),
        "traffic": source.expressions.traffic.to_json(),
    })
}

/// Renderer-facing JSON view of a render state
fn render_state_json(state: &RenderState) -> Value {
    json!({
        "primary": source_json(&state.primary),
        "alternatives": state.alternatives.iter().map(source_json).collect::<Vec<_>>(),
        "waypoints": {
            "id": WAYPOINT_SOURCE_ID,
            "data": state.waypoints.to_json(),
        },
        "restricted": {
            "id": RESTRICTED_SOURCE_ID,
            "data": state.restricted_roads.to_json(),
            "line": state.restricted_expression.to_json(),
        },
        "widths": {
            "route": state.widths.route.to_json(),
            "casing": state.widths.casing.to_json(),
            "traffic": state.widths.traffic.to_json(),
        },
        "visibility": {
            "primary": state.visibility.primary,
            "alternatives": state.visibility.alternatives,
            "waypoints": state.visibility.waypoints,
            "restricted": state.visibility.restricted,
        },
        "vanishing_offset": state.vanishing_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[tokio::test]
    async fn test_run_with_synthesized_routes() {
        let settings = Settings::parse_from([
            "route-line-demo",
            "--points-per-leg",
            "80",
            "--render-latency-ms",
            "1",
            "--promote",
            "route-1",
        ]);
        run(settings).await.unwrap();
    }

    #[tokio::test]
    async fn test_promote_unknown_route_fails() {
        let settings = Settings::parse_from(["route-line-demo", "--render-latency-ms", "0", "--promote", "nope"]);
        assert!(matches!(
            run(settings).await,
            Err(DemoError::RouteLine(RouteLineError::UnknownRoute(_)))
        ));
    }

    #[test]
    fn test_render_state_json() {
        let mut api = RouteLineApi::new(RouteLineConfig::default()).unwrap();
        let state = api.set_routes(routes::synthesize_routes(2, 1, 10));
        let value = render_state_json(&state);
        assert_eq!(value["primary"]["route_id"], "route-0");
        assert_eq!(value["alternatives"][0]["route_id"], "route-1");
        assert_eq!(value["alternatives"][1]["route_id"], Value::Null);
        assert_eq!(value["waypoints"]["data"]["type"], "FeatureCollection");
        assert_eq!(value["primary"]["traffic"][0], "step");
    }

    #[test]
    fn test_trip_moves_vanishing_point() {
        let settings = Settings::parse_from(["route-line-demo", "--ticks", "10"]);
        let mut api = RouteLineApi::new(RouteLineConfig::default()).unwrap();
        api.set_routes(routes::synthesize_routes(1, 2, 100));
        simulate_trip(&mut api, &settings).unwrap();
        assert!(api.vanishing_offset() > 0.95, "{}", api.vanishing_offset());
    }
}
