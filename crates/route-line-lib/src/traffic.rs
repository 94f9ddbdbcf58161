//! Traffic congestion segments along a route
//!
//! Annotation intervals are walked in route order and turned into color stops at their
//! fractional distance from the origin. Consecutive intervals with the same color collapse
//! into one segment.

use crate::{
    Color, Congestion, CongestionRanges, ForkPoint, GranularDistances, LegAnnotation, Route,
    RouteLeg, RouteLineConfig,
};
use std::collections::HashSet;

/// A color stop on the line: from `offset` on the line is drawn with `color`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExpressionSegment {
    /// Fraction of the route distance in [0, 1]
    pub offset: f64,
    pub color: Color,
    pub congestion: Congestion,
    pub leg_index: usize,
}

impl ExpressionSegment {
    pub fn new(offset: f64, color: Color, congestion: Congestion, leg_index: usize) -> Self {
        Self {
            offset,
            color,
            congestion,
            leg_index,
        }
    }
}

/// A restricted road section as fractions of the route distance
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RestrictedSection {
    pub start: f64,
    pub end: f64,
    pub leg_index: usize,
}

/// Turns leg annotations into coalesced [`ExpressionSegment`]s
#[derive(Debug, Clone, Default)]
pub struct TrafficSegmenter {
    ranges: CongestionRanges,
    low_congestion_road_classes: HashSet<String>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TrafficSegmenter {
    pub fn new(ranges: CongestionRanges, low_congestion_road_classes: HashSet<String>) -> Self {
        Self {
            ranges,
            low_congestion_road_classes,
        }
    }

    pub fn from_config(config: &RouteLineConfig) -> Self {
        Self::new(
            config.congestion_ranges.clone(),
            config.low_congestion_road_classes.clone(),
        )
    }

    /// Build the traffic segments of a route
    ///
    /// # Arguments
    /// * `route` - Route with optional per-leg annotations
    /// * `is_primary` - Forwarded to `color` so primary and alternatives can differ
    /// * `color` - Color lookup per congestion category
    ///
    /// Without any annotation the result is a single `Unknown` segment at offset 0.
    pub fn segments(
        &self,
        route: &Route,
        is_primary: bool,
        color: impl Fn(Congestion, bool) -> Color,
    ) -> Vec<ExpressionSegment> {
        let has_annotations = route
            .legs
            .iter()
            .any(|leg| leg.annotation.as_ref().is_some_and(|a| !a.is_empty()));
        if !has_annotations {
            return vec![ExpressionSegment::new(
                0.0,
                color(Congestion::Unknown, is_primary),
                Congestion::Unknown,
                0,
            )];
        }

        let total = total_distance(route);
        let mut segments: Vec<ExpressionSegment> = Vec::new();
        let mut running = 0.0;

        for (leg_index, leg) in route.legs.iter().enumerate() {
            match leg.annotation.as_ref().filter(|a| !a.is_empty()) {
                Some(annotation) => {
                    for (interval, distance) in annotation.distance.iter().enumerate() {
                        let congestion = self.congestion_at(leg, annotation, interval);
                        push_segment(
                            &mut segments,
                            ExpressionSegment::new(
                                fraction(running, total),
                                color(congestion, is_primary),
                                congestion,
                                leg_index,
                            ),
                        );
                        running += distance.max(0.0);
                    }
                }
                None => {
                    push_segment(
                        &mut segments,
                        ExpressionSegment::new(
                            fraction(running, total),
                            color(Congestion::Unknown, is_primary),
                            Congestion::Unknown,
                            leg_index,
                        ),
                    );
                    running += leg.distance().max(0.0);
                }
            }
        }

        segments
    }

    /// Restricted sections of a route, positioned on its granular distances
    ///
    /// Section boundaries use the same geometry fractions as the vanishing point. The
    /// result is sorted, and touching or overlapping sections of a leg are merged.
    pub fn restricted_sections(
        &self,
        route: &Route,
        distances: &GranularDistances,
    ) -> Vec<RestrictedSection> {
        let mut sections = Vec::new();

        for (leg_index, leg) in route.legs.iter().enumerate() {
            if leg.restricted.is_empty() {
                continue;
            }
            let Some(last) = distances.leg_distances(leg_index).len().checked_sub(1) else {
                tracing::debug!(
                    leg_index,
                    "Restricted sections on a leg without geometry are ignored"
                );
                continue;
            };
            let offset_at = |point: usize| {
                if point > last {
                    return None;
                }
                distances
                    .leg_index_to_global(leg_index, point)
                    .and_then(|index| distances.offset_at(index))
            };
            for range in &leg.restricted {
                if let (Some(start), Some(end)) = (offset_at(*range.start()), offset_at(*range.end())) {
                    sections.push(RestrictedSection {
                        start,
                        end,
                        leg_index,
                    });
                }
            }
        }

        merge_restricted_sections(sections)
    }

    fn congestion_at(&self, leg: &RouteLeg, annotation: &LegAnnotation, interval: usize) -> Congestion {
        if leg.is_closed_at(interval) {
            return Congestion::Closure;
        }
        let congestion = if annotation.congestion_numeric.is_empty() {
            annotation
                .congestion
                .get(interval)
                .copied()
                .unwrap_or(Congestion::Unknown)
        } else {
            annotation
                .congestion_numeric
                .get(interval)
                .copied()
                .flatten()
                .map(|value| self.ranges.resolve(value))
                .unwrap_or(Congestion::Unknown)
        };
        if congestion == Congestion::Unknown
            && annotation
                .road_class_at(interval)
                .is_some_and(|class| self.low_congestion_road_classes.contains(class))
        {
            Congestion::Low
        } else {
            congestion
        }
    }
}

/// Sort sections by start and merge the ones of a leg that touch or overlap
///
/// Empty sections are dropped and a section overlapping the previous leg's last one is
/// clipped, so boundaries come out in increasing order.
pub(crate) fn merge_restricted_sections(mut sections: Vec<RestrictedSection>) -> Vec<RestrictedSection> {
    sections.retain(|section| section.start < section.end);
    sections.sort_by(|a, b| {
        a.start
            .total_cmp(&b.start)
            .then(a.leg_index.cmp(&b.leg_index))
    });

    let mut merged: Vec<RestrictedSection> = Vec::with_capacity(sections.len());
    for mut section in sections {
        if let Some(last) = merged.last_mut() {
            if last.leg_index == section.leg_index && section.start <= last.end {
                last.end = last.end.max(section.end);
                continue;
            }
            section.start = section.start.max(last.end);
            if section.start >= section.end {
                continue;
            }
        }
        merged.push(section);
    }
    merged
}

/// Fraction of an alternative route drawn over the primary route before it forks away
///
/// Measured with the annotation distances, like traffic segments. Returns `None` when
/// the fork does not fall on an annotated interval.
pub fn fork_offset(route: &Route, fork: ForkPoint) -> Option<f64> {
    let leg = route.legs.get(fork.leg_index)?;
    let annotation = leg
        .annotation
        .as_ref()
        .filter(|annotation| fork.geometry_index_in_leg < annotation.distance.len())?;

    let before: f64 = route.legs[..fork.leg_index].iter().map(annotated_length).sum();
    let within: f64 = annotation.distance[..fork.geometry_index_in_leg]
        .iter()
        .map(|d| d.max(0.0))
        .sum();
    Some(fraction(before + within, total_distance(route)))
}

/// Route distance, or the annotated distance when the route reports none
fn total_distance(route: &Route) -> f64 {
    if route.distance > 0.0 {
        return route.distance;
    }
    route.legs.iter().map(annotated_length).sum()
}

fn annotated_length(leg: &RouteLeg) -> f64 {
    match leg.annotation.as_ref().filter(|a| !a.is_empty()) {
        Some(annotation) => annotation.distance.iter().map(|d| d.max(0.0)).sum(),
        None => leg.distance().max(0.0),
    }
}

#[inline]
fn fraction(distance: f64, total: f64) -> f64 {
    if total > 0.0 {
        (distance / total).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Append a segment, keeping offsets strictly increasing and adjacent colors distinct
fn push_segment(segments: &mut Vec<ExpressionSegment>, segment: ExpressionSegment) {
    if let Some(last) = segments.last() {
        if last.color == segment.color {
            return;
        }
        if last.offset >= segment.offset {
            // zero-length interval: the later color wins at this offset
            segments.pop();
            if segments
                .last()
                .is_some_and(|previous| previous.color == segment.color)
            {
                return;
            }
        }
    }
    segments.push(segment);
}
