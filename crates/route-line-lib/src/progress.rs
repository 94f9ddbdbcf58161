//! Route progress as reported by the progress provider

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Lifecycle of the progress stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ProgressState {
    #[default]
    Initialized,
    /// Actively tracking the primary route
    Tracking,
    /// Destination reached
    Complete,
    OffRoute,
    Uncertain,
}

/// A complete view of where the traveler is on the primary route
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProgressSnapshot {
    pub leg_index: usize,
    pub step_index: usize,
    /// Meters traveled along the current step
    pub step_distance_traveled: f64,
    /// Meters left on the current step
    pub step_distance_remaining: f64,
    /// Seconds left on the current step
    pub step_duration_remaining: f64,
}

/// Progress update; `snapshot` is absent until the provider has a fix on the route
#[derive(Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RouteProgress {
    /// Id of the navigated route, checked against the primary route when present
    pub route_id: Option<String>,
    pub state: ProgressState,
    pub snapshot: Option<ProgressSnapshot>,
}

impl RouteProgress {
    pub fn tracking(snapshot: ProgressSnapshot) -> Self {
        Self {
            route_id: None,
            state: ProgressState::Tracking,
            snapshot: Some(snapshot),
        }
    }

    pub fn for_route(mut self, route_id: impl Into<String>) -> Self {
        self.route_id = Some(route_id.into());
        self
    }
}
