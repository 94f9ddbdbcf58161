//! Simulated progress provider walking along a route

use geo::Coord;
use route_line_lib::{ProgressSnapshot, ProgressState, Route, RouteProgress, utils};
use std::sync::Arc;

/// Produces progress snapshots and positions at a given fraction of a route
pub struct ProgressSimulator {
    route: Arc<Route>,
    /// Total geometry length in meters
    length: f64,
    /// Travel speed in meters per second, used for durations
    speed: f64,
}

impl ProgressSimulator {
    pub fn new(route: Arc<Route>, speed: f64) -> Self {
        let length = route
            .legs
            .iter()
            .flat_map(|leg| &leg.steps)
            .map(|step| line_length(&step.geometry))
            .sum();
        Self {
            route,
            length,
            speed: speed.max(0.1),
        }
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Progress and position after traveling `fraction` of the route
    ///
    /// Returns `None` for a route without geometry.
    pub fn sample(&self, fraction: f64) -> Option<(RouteProgress, Coord<f64>)> {
        let target = self.length * fraction.clamp(0.0, 1.0);
        let state = if fraction >= 1.0 {
            ProgressState::Complete
        } else {
            ProgressState::Tracking
        };

        let mut walked = 0.0;
        let mut last = None;
        for (leg_index, leg) in self.route.legs.iter().enumerate() {
            for (step_index, step) in leg.steps.iter().enumerate() {
                let step_length = line_length(&step.geometry);
                let mut step_walked = 0.0;
                for pair in step.geometry.windows(2) {
                    let interval = utils::haversine_distance(pair[0], pair[1]);
                    if walked + interval >= target && interval > 0.0 {
                        let along = target - walked;
                        let t = along / interval;
                        let position = Coord {
                            x: pair[0].x + (pair[1].x - pair[0].x) * t,
                            y: pair[0].y + (pair[1].y - pair[0].y) * t,
                        };
                        let traveled = step_walked + along;
                        let snapshot = self.snapshot(leg_index, step_index, traveled, step_length);
                        return Some((self.progress(state, snapshot), position));
                    }
                    walked += interval;
                    step_walked += interval;
                }
                if let Some(end) = step.geometry.last() {
                    last = Some((leg_index, step_index, step_length, *end));
                }
            }
        }

        // past the end of the geometry: park on the last point
        let (leg_index, step_index, step_length, end) = last?;
        let snapshot = self.snapshot(leg_index, step_index, step_length, step_length);
        Some((self.progress(state, snapshot), end))
    }

    fn snapshot(&self, leg_index: usize, step_index: usize, traveled: f64, step_length: f64) -> ProgressSnapshot {
        let remaining = (step_length - traveled).max(0.0);
        ProgressSnapshot {
            leg_index,
            step_index,
            step_distance_traveled: traveled,
            step_distance_remaining: remaining,
            step_duration_remaining: remaining / self.speed,
        }
    }

    fn progress(&self, state: ProgressState, snapshot: ProgressSnapshot) -> RouteProgress {
        RouteProgress {
            state,
            ..RouteProgress::tracking(snapshot).for_route(self.route.id.clone())
        }
    }
}

fn line_length(points: &[Coord<f64>]) -> f64 {
    points
        .windows(2)
        .map(|pair| utils::haversine_distance(pair[0], pair[1]))
        .sum()
}
