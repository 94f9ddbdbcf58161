//! Vanishing point tracking for the primary route line
//!
//! The tracker turns live positions into the fraction of the route already traveled. The
//! progress provider supplies the index of the next unvisited geometry point; the puck
//! position refines it between points.

use crate::distances::DEFAULT_LOOKBACK_WINDOW;
use crate::{GranularDistances, ProgressSnapshot, ProgressState, Route, utils};
use geo::Coord;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How the vanishing offset may move
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum VanishingPointMode {
    /// No offset computation
    #[default]
    Disabled,
    /// Offset follows the position in both directions
    Enabled,
    /// Offset never decreases
    OnlyIncreaseProgress,
}

impl From<ProgressState> for VanishingPointMode {
    fn from(state: ProgressState) -> Self {
        match state {
            ProgressState::Tracking => VanishingPointMode::Enabled,
            ProgressState::Complete => VanishingPointMode::OnlyIncreaseProgress,
            _ => VanishingPointMode::Disabled,
        }
    }
}

/// Mutable state of the tracker
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VanishingState {
    /// Committed offset in [0, 1]
    pub offset: f64,
    pub mode: VanishingPointMode,
    /// Flattened index of the next unvisited point
    pub upcoming_index: Option<usize>,
    pub last_index_update: Option<Instant>,
}

/// Keeps the vanishing offset of the primary route in sync with progress
#[derive(Clone, Debug)]
pub struct VanishingPointTracker {
    state: VanishingState,
    route: Option<Arc<Route>>,
    distances: Option<Arc<GranularDistances>>,
    /// Flattened point count of `route`
    total_points: usize,
    max_jump_meters: f64,
    staleness_threshold: Duration,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl VanishingPointTracker {
    pub fn new(max_jump_meters: f64, staleness_threshold: Duration) -> Self {
        Self {
            state: VanishingState::default(),
            route: None,
            distances: None,
            total_points: 0,
            max_jump_meters,
            staleness_threshold,
        }
    }

    /// Replace the tracked route, rebuilding the distance index and resetting the offset
    pub fn set_route(&mut self, route: Option<Arc<Route>>) {
        self.distances = route
            .as_deref()
            .and_then(GranularDistances::from_route)
            .map(Arc::new);
        if let (Some(route), None) = (&route, &self.distances) {
            tracing::warn!(
                route_id = %route.id,
                "Primary route has no geometry, vanishing point disabled"
            );
        }
        self.total_points = route.as_deref().map_or(0, Route::flattened_point_count);
        self.route = route;
        self.state = VanishingState {
            mode: self.state.mode,
            ..VanishingState::default()
        };
    }

    /// Forget the route and all progress
    pub fn reset(&mut self) {
        self.set_route(None);
        self.state.mode = VanishingPointMode::Disabled;
    }

    pub fn update_mode(&mut self, state: ProgressState) {
        self.state.mode = state.into();
    }

    /// Recompute the index of the next unvisited point from a progress snapshot
    ///
    /// Clears the index when the snapshot is absent or does not fit the route.
    pub fn update_upcoming_index(&mut self, snapshot: Option<&ProgressSnapshot>, now: Instant) {
        self.state.upcoming_index = snapshot.and_then(|snapshot| self.upcoming_index_for(snapshot));
        self.state.last_index_update = Some(now);
    }

    fn upcoming_index_for(&self, snapshot: &ProgressSnapshot) -> Option<usize> {
        let route = self.route.as_deref()?;
        let Some(leg) = route.legs.get(snapshot.leg_index) else {
            tracing::debug!(leg_index = snapshot.leg_index, "Progress leg is not on the route");
            return None;
        };
        let Some(step) = leg.steps.get(snapshot.step_index) else {
            tracing::debug!(step_index = snapshot.step_index, "Progress step is not on the leg");
            return None;
        };

        // the step's end point counts as ahead until the next step starts
        let mut remaining = utils::count_points_beyond(&step.geometry, snapshot.step_distance_traveled);
        if step.geometry.len() > 1 {
            remaining = remaining.max(1);
        }
        remaining += leg.steps[snapshot.step_index + 1..]
            .iter()
            .map(|step| step.geometry.len().saturating_sub(1))
            .sum::<usize>();
        remaining += route.legs[snapshot.leg_index + 1..]
            .iter()
            .map(|leg| leg.point_count().saturating_sub(1))
            .sum::<usize>();

        let index = self.total_points.checked_sub(remaining)?;
        (index < self.total_points).then_some(index)
    }

    /// Compute the offset for a puck position
    ///
    /// Returns `None`, leaving the committed offset untouched, when tracking is disabled,
    /// progress is stale, the position is implausibly far from the line, or the offset would
    /// move backwards in [`VanishingPointMode::OnlyIncreaseProgress`].
    pub fn compute_offset(&mut self, position: Coord<f64>, now: Instant) -> Option<f64> {
        if self.state.mode == VanishingPointMode::Disabled {
            return None;
        }
        let fresh = self
            .state
            .last_index_update
            .is_some_and(|updated| now.saturating_duration_since(updated) <= self.staleness_threshold);
        if !fresh {
            tracing::trace!("Route progress is stale, skipping vanishing point update");
            return None;
        }

        let distances = self.distances.as_deref()?;
        let Some(upcoming) = self.state.upcoming_index else {
            tracing::trace!("No upcoming point index, skipping vanishing point update");
            return None;
        };
        let Some(entry) = distances.get(upcoming) else {
            tracing::warn!(
                upcoming,
                points = distances.len(),
                "Upcoming point index is outside the granular distances"
            );
            return None;
        };

        if upcoming > 0 {
            let off_line = distances.distance_to_window(position, upcoming, DEFAULT_LOOKBACK_WINDOW)?;
            if off_line > self.max_jump_meters {
                tracing::trace!(off_line, "Position is too far from the route line");
                return None;
            }
        }

        let complete = distances.complete_distance();
        if complete <= 0.0 {
            return None;
        }
        let remaining = entry.distance_remaining + utils::planar_distance(position, entry.point);
        let offset = if complete >= remaining {
            1.0 - remaining / complete
        } else {
            0.0
        };

        if self.state.mode == VanishingPointMode::OnlyIncreaseProgress && offset < self.state.offset {
            return None;
        }

        self.state.offset = offset;
        Some(offset)
    }

    /// Force the offset, clamped into [0, 1]
    pub fn set_offset(&mut self, offset: f64) -> f64 {
        self.state.offset = if offset.is_nan() {
            0.0
        } else {
            offset.clamp(0.0, 1.0)
        };
        self.state.offset
    }

    #[inline]
    pub fn offset(&self) -> f64 {
        self.state.offset
    }

    #[inline]
    pub fn state(&self) -> &VanishingState {
        &self.state
    }

    #[inline]
    pub fn distances(&self) -> Option<&Arc<GranularDistances>> {
        self.distances.as_ref()
    }
}
