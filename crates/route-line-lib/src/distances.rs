//! Granular remaining-distance index over the primary route geometry
//!
//! Built with one backward pass over the flattened geometry. Distances are planar Web
//! Mercator meters so that a fraction of [`GranularDistances::complete_distance`] maps to
//! the same fraction of the line the renderer draws.

use crate::{Route, utils};
use geo::{ClosestPoint, Coord, Line, Point};
use smallvec::SmallVec;

/// Default number of points looked back when matching a position to the line
pub const DEFAULT_LOOKBACK_WINDOW: usize = 10;

/// A geometry point and the distance left to the end of the route from it
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceIndex {
    pub point: Coord<f64>,
    pub distance_remaining: f64,
}

/// Remaining-distance table indexed by flattened geometry point
#[derive(Clone, Debug, PartialEq)]
pub struct GranularDistances {
    complete_distance: f64,
    route_distances: Vec<DistanceIndex>,
    /// Global index of the first point of each leg
    leg_starts: Vec<usize>,
    leg_lengths: Vec<usize>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl GranularDistances {
    /// Index a flattened point list
    ///
    /// Returns `None` for an empty list. A single point yields one entry at distance 0.
    pub fn from_points(points: &[Coord<f64>]) -> Option<Self> {
        let route_distances = index_points(points)?;
        let len = route_distances.len();
        Some(Self {
            complete_distance: route_distances[0].distance_remaining,
            route_distances,
            leg_starts: vec![0],
            leg_lengths: vec![len],
        })
    }

    /// Index the flattened geometry of a route, remembering where each leg starts
    pub fn from_route(route: &Route) -> Option<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("distances::from_route");

        let route_distances = index_points(&route.flattened_geometry())?;

        let mut leg_starts = Vec::with_capacity(route.legs.len());
        let mut leg_lengths = Vec::with_capacity(route.legs.len());
        let mut next_start = 0usize;
        for leg in &route.legs {
            let count = leg.point_count();
            leg_starts.push(next_start);
            leg_lengths.push(count);
            // the next leg starts on this leg's last point
            next_start += count.saturating_sub(1);
        }

        Some(Self {
            complete_distance: route_distances[0].distance_remaining,
            route_distances,
            leg_starts,
            leg_lengths,
        })
    }

    /// Length of the whole line in planar meters
    #[inline]
    pub fn complete_distance(&self) -> f64 {
        self.complete_distance
    }

    #[inline]
    pub fn route_distances(&self) -> &[DistanceIndex] {
        &self.route_distances
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&DistanceIndex> {
        self.route_distances.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.route_distances.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.route_distances.is_empty()
    }

    /// Entries covering a single leg, boundary points included
    pub fn leg_distances(&self, leg_index: usize) -> &[DistanceIndex] {
        let (Some(&start), Some(&len)) = (
            self.leg_starts.get(leg_index),
            self.leg_lengths.get(leg_index),
        ) else {
            return &[];
        };
        let end = (start + len).min(self.route_distances.len());
        self.route_distances.get(start..end).unwrap_or(&[])
    }

    /// Convert a leg-local geometry index into a flattened index
    pub fn leg_index_to_global(&self, leg_index: usize, point_index: usize) -> Option<usize> {
        let start = *self.leg_starts.get(leg_index)?;
        let global = start + point_index;
        (global < self.route_distances.len()).then_some(global)
    }

    /// Fraction of the line already behind the point at `index`
    pub fn offset_at(&self, index: usize) -> Option<f64> {
        let entry = self.get(index)?;
        if self.complete_distance <= 0.0 {
            return Some(0.0);
        }
        Some((1.0 - entry.distance_remaining / self.complete_distance).clamp(0.0, 1.0))
    }

    /// Ground distance in meters from `position` to the polyline made of up to `window`
    /// points before `upcoming` and the point at `upcoming` itself
    ///
    /// The nearest point is found in Web Mercator space and measured back with the
    /// haversine formula. Returns `None` when `upcoming` is out of range.
    pub fn distance_to_window(
        &self,
        position: Coord<f64>,
        upcoming: usize,
        window: usize,
    ) -> Option<f64> {
        if upcoming >= self.route_distances.len() {
            return None;
        }
        let first = upcoming.saturating_sub(window);
        let projected: SmallVec<[Coord<f64>; DEFAULT_LOOKBACK_WINDOW + 1]> = self.route_distances
            [first..=upcoming]
            .iter()
            .map(|entry| utils::coord_to_mercator(entry.point))
            .collect();

        let target = Point::from(utils::coord_to_mercator(position));
        let mut best = f64::INFINITY;

        if projected.len() == 1 {
            return Some(utils::haversine_distance(
                position,
                self.route_distances[upcoming].point,
            ));
        }

        for pair in projected.windows(2) {
            let line = Line::new(pair[0], pair[1]);
            let closest = match line.closest_point(&target) {
                geo::Closest::Intersection(p) | geo::Closest::SinglePoint(p) => p,
                geo::Closest::Indeterminate => Point::from(pair[0]),
            };
            let meters =
                utils::haversine_distance(position, utils::mercator_to_coord(closest.into()));
            best = best.min(meters);
        }
        Some(best)
    }
}

fn index_points(points: &[Coord<f64>]) -> Option<Vec<DistanceIndex>> {
    if points.is_empty() {
        return None;
    }
    let mut distances = vec![
        DistanceIndex {
            point: Coord { x: 0.0, y: 0.0 },
            distance_remaining: 0.0,
        };
        points.len()
    ];

    let last = points.len() - 1;
    distances[last] = DistanceIndex {
        point: points[last],
        distance_remaining: 0.0,
    };
    let mut running = 0.0;
    for i in (0..last).rev() {
        running += utils::planar_distance(points[i], points[i + 1]);
        distances[i] = DistanceIndex {
            point: points[i],
            distance_remaining: running,
        };
    }
    Some(distances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::tests::create_test_route;

    fn line(n: usize) -> Vec<Coord<f64>> {
        (0..n)
            .map(|i| Coord {
                x: i as f64 * 0.001,
                y: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_empty_input_disables_index() {
        assert!(GranularDistances::from_points(&[]).is_none());
    }

    #[test]
    fn test_single_point_has_zero_distance() {
        let distances = GranularDistances::from_points(&line(1)).unwrap();
        assert_eq!(distances.len(), 1);
        assert_eq!(distances.complete_distance(), 0.0);
        assert_eq!(distances.get(0).unwrap().distance_remaining, 0.0);
    }

    #[test]
    fn test_distances_are_non_increasing() {
        let distances = GranularDistances::from_points(&line(25)).unwrap();
        let entries = distances.route_distances();
        for pair in entries.windows(2) {
            assert!(pair[0].distance_remaining >= pair[1].distance_remaining);
        }
        assert_eq!(entries.last().unwrap().distance_remaining, 0.0);
        assert_eq!(
            distances.complete_distance(),
            entries[0].distance_remaining
        );
        // ~111.3 m per 0.001 degree at the equator
        assert!((distances.complete_distance() - 24.0 * 111.32).abs() < 5.0);
    }

    #[test]
    fn test_repeated_points_keep_order() {
        let points = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 0.001, y: 0.0 },
        ];
        let distances = GranularDistances::from_points(&points).unwrap();
        assert_eq!(
            distances.get(0).unwrap().distance_remaining,
            distances.get(1).unwrap().distance_remaining
        );
    }

    #[test]
    fn test_leg_slices_share_boundary_points() {
        let route = create_test_route("a", &[&[3, 3], &[4]]);
        let distances = GranularDistances::from_route(&route).unwrap();
        assert_eq!(distances.len(), 8);
        assert_eq!(distances.leg_distances(0).len(), 5);
        assert_eq!(distances.leg_distances(1).len(), 4);
        assert_eq!(
            distances.leg_distances(0).last(),
            distances.leg_distances(1).first()
        );
        assert_eq!(distances.leg_index_to_global(1, 0), Some(4));
        assert_eq!(distances.leg_index_to_global(1, 10), None);
        assert!(distances.leg_distances(5).is_empty());
    }

    #[test]
    fn test_offset_at() {
        let distances = GranularDistances::from_points(&line(5)).unwrap();
        assert_eq!(distances.offset_at(0), Some(0.0));
        assert_eq!(distances.offset_at(4), Some(1.0));
        assert!((distances.offset_at(2).unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(distances.offset_at(5), None);
    }

    #[test]
    fn test_distance_to_window() {
        let distances = GranularDistances::from_points(&line(20)).unwrap();
        // on the line, between points 4 and 5
        let on_line = Coord { x: 0.0045, y: 0.0 };
        assert!(distances.distance_to_window(on_line, 5, 10).unwrap() < 0.01);

        // ~55 m north of the line
        let off_line = Coord { x: 0.0045, y: 0.0005 };
        let meters = distances.distance_to_window(off_line, 5, 10).unwrap();
        assert!((meters - 55.6).abs() < 1.0);

        // the window only reaches back from index 15, so point 0 is far away
        let start = Coord { x: 0.0, y: 0.0 };
        assert!(distances.distance_to_window(start, 15, 10).unwrap() > 500.0);

        assert!(distances.distance_to_window(start, 20, 10).is_none());
    }
}
