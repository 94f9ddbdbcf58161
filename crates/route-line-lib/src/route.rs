//! Route model as delivered by the route provider
//!
//! A route is nested leg → step → geometry. The last point of a step is repeated as the
//! first point of the next step (and likewise across legs); [`Route::flattened_geometry`]
//! removes those shared points so every physical vertex appears once.

use geo::Coord;
use std::ops::RangeInclusive;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Traffic congestion category of an annotation interval
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Congestion {
    Low,
    Moderate,
    Heavy,
    Severe,
    #[default]
    Unknown,
    Closure,
    Restricted,
}

impl FromStr for Congestion {
    type Err = std::convert::Infallible;

    /// Unrecognized values resolve to [`Congestion::Unknown`]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "low" => Congestion::Low,
            "moderate" => Congestion::Moderate,
            "heavy" => Congestion::Heavy,
            "severe" => Congestion::Severe,
            "closed" | "closure" => Congestion::Closure,
            "restricted" => Congestion::Restricted,
            _ => Congestion::Unknown,
        })
    }
}

/// A single maneuver step and its geometry (lon/lat)
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RouteStep {
    pub geometry: Vec<Coord<f64>>,
    /// Step length in meters
    pub distance: f64,
}

/// Per-interval annotations of a leg; interval `i` spans leg points `i..=i+1`
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LegAnnotation {
    /// Interval lengths in meters
    pub distance: Vec<f64>,
    /// Categorical congestion, may be empty
    pub congestion: Vec<Congestion>,
    /// Numeric congestion 0..=100, preferred over `congestion` when non-empty
    pub congestion_numeric: Vec<Option<u8>>,
    /// Road class where it changes; `None` inherits the previous known class
    pub road_class: Vec<Option<String>>,
}

impl LegAnnotation {
    pub fn is_empty(&self) -> bool {
        self.distance.is_empty()
    }

    /// Road class at `index`, falling back to the closest earlier known class
    pub fn road_class_at(&self, index: usize) -> Option<&str> {
        let end = index.checked_add(1)?.min(self.road_class.len());
        self.road_class[..end]
            .iter()
            .rev()
            .find_map(|class| class.as_deref())
    }
}

/// A leg between two waypoints
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RouteLeg {
    pub steps: Vec<RouteStep>,
    pub annotation: Option<LegAnnotation>,
    /// Closed road sections as leg-geometry point ranges; `a..=b` covers intervals `a..b`
    pub closures: Vec<RangeInclusive<usize>>,
    /// Restricted road sections, same indexing as `closures`
    pub restricted: Vec<RangeInclusive<usize>>,
}

impl RouteLeg {
    /// Leg geometry with shared step boundary points removed
    pub fn geometry(&self) -> Vec<Coord<f64>> {
        let mut points: Vec<Coord<f64>> = Vec::new();
        for step in &self.steps {
            let skip = usize::from(!points.is_empty());
            points.extend(step.geometry.iter().skip(skip).copied());
        }
        points
    }

    /// Number of points in [`Self::geometry`] without building it
    pub fn point_count(&self) -> usize {
        let mut count = 0;
        for step in &self.steps {
            count += if count == 0 {
                step.geometry.len()
            } else {
                step.geometry.len().saturating_sub(1)
            };
        }
        count
    }

    /// Sum of step distances in meters
    pub fn distance(&self) -> f64 {
        self.steps.iter().map(|s| s.distance).sum()
    }

    /// Whether annotation interval `interval` lies inside a closure
    pub fn is_closed_at(&self, interval: usize) -> bool {
        self.closures
            .iter()
            .any(|range| *range.start() <= interval && interval < *range.end())
    }
}

/// Geometry point where an alternative route leaves the primary route
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForkPoint {
    pub leg_index: usize,
    /// Point index within the leg geometry, which is also the index of the interval
    /// starting there
    pub geometry_index_in_leg: usize,
}

/// How an alternative route relates to the current primary route
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlternativeRouteMetadata {
    pub route_id: String,
    pub fork: ForkPoint,
}

/// A route as handed over by the route provider
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Route {
    /// Identifier, unique within a set of routes
    pub id: String,
    /// Total distance in meters
    pub distance: f64,
    pub legs: Vec<RouteLeg>,
}

impl Route {
    pub fn new(id: impl Into<String>, distance: f64, legs: Vec<RouteLeg>) -> Self {
        Self {
            id: id.into(),
            distance,
            legs,
        }
    }

    /// Full route geometry with shared step and leg boundary points removed
    pub fn flattened_geometry(&self) -> Vec<Coord<f64>> {
        let mut points: Vec<Coord<f64>> = Vec::new();
        for leg in &self.legs {
            let skip = usize::from(!points.is_empty());
            points.extend(leg.geometry().into_iter().skip(skip));
        }
        points
    }

    /// Number of points in [`Self::flattened_geometry`]
    pub fn flattened_point_count(&self) -> usize {
        let mut count = 0;
        for leg in &self.legs {
            let leg_points = leg.point_count();
            count += if count == 0 {
                leg_points
            } else {
                leg_points.saturating_sub(1)
            };
        }
        count
    }

    /// Route origin followed by each leg's destination
    pub fn waypoints(&self) -> Vec<Coord<f64>> {
        let mut waypoints = Vec::with_capacity(self.legs.len() + 1);
        for leg in &self.legs {
            let geometry = leg.geometry();
            if waypoints.is_empty() {
                if let Some(first) = geometry.first() {
                    waypoints.push(*first);
                }
            }
            if let Some(last) = geometry.last() {
                waypoints.push(*last);
            }
        }
        waypoints
    }
}
