//! Top-level route line façade
//!
//! [`RouteLineApi`] owns the routes currently shown, the data derived from them and the
//! vanishing point of the primary route. Every mutating call returns the data the renderer
//! needs to apply; nothing here talks to the renderer directly.

use crate::expression::{self, line_width_expression};
use crate::feature::{restricted_collection, waypoint_collection};
use crate::{
    AlternativeRouteMetadata, ClosestRouteResolver, Color, Congestion, Expression, ExpectedRender,
    ExpressionSegment, FeatureCollection, RenderBatchId, RestrictedSection, Result, Route,
    RouteFeatureData, RouteLineColors, RouteLineConfig, RouteLineError, RouteProgress,
    TrafficSegmenter, VanishingPointTracker, fork_offset,
};
use geo::Coord;
use lru::LruCache;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

pub const PRIMARY_SOURCE_ID: &str = "route-line-primary-source";
pub const WAYPOINT_SOURCE_ID: &str = "route-line-waypoint-source";
pub const RESTRICTED_SOURCE_ID: &str = "route-line-restricted-source";

/// Source id of the alternative slot `slot` (0-based)
pub fn alternative_source_id(slot: usize) -> String {
    format!("route-line-alternative-{}-source", slot + 1)
}

/// Cache key: route id and whether the segments were built for the primary route
type SegmentKey = (String, bool);

/// The three stacked line expressions of one route
#[derive(Clone, Debug, PartialEq)]
pub struct RouteLineExpressions {
    pub casing: Expression,
    pub base: Expression,
    pub traffic: Expression,
}

/// Width expressions shared by every route line
#[derive(Clone, Debug, PartialEq)]
pub struct LineWidths {
    pub route: Expression,
    pub casing: Expression,
    pub traffic: Expression,
}

/// Data of one renderer line source
#[derive(Clone, Debug, PartialEq)]
pub struct RouteLineSource {
    pub source_id: String,
    /// Route drawn by this source, `None` when the source is empty
    pub route_id: Option<String>,
    pub features: FeatureCollection,
    pub expressions: RouteLineExpressions,
}

impl RouteLineSource {
    fn empty(source_id: impl Into<String>, expressions: RouteLineExpressions) -> Self {
        Self {
            source_id: source_id.into(),
            route_id: None,
            features: FeatureCollection::empty(),
            expressions,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerVisibility {
    pub primary: bool,
    pub alternatives: bool,
    pub waypoints: bool,
    pub restricted: bool,
}

impl Default for LayerVisibility {
    fn default() -> Self {
        Self {
            primary: true,
            alternatives: true,
            waypoints: true,
            restricted: true,
        }
    }
}

/// Everything the renderer needs to draw the current routes
#[derive(Clone, Debug, PartialEq)]
pub struct RenderState {
    pub primary: RouteLineSource,
    /// One entry per alternative slot, empty sources for unused slots
    pub alternatives: Vec<RouteLineSource>,
    pub waypoints: FeatureCollection,
    pub restricted_roads: FeatureCollection,
    pub restricted_expression: Expression,
    pub widths: LineWidths,
    pub visibility: LayerVisibility,
    pub vanishing_offset: f64,
}

impl RenderState {
    /// Primary source followed by the alternative slots
    pub fn route_sources(&self) -> impl Iterator<Item = &RouteLineSource> {
        std::iter::once(&self.primary).chain(self.alternatives.iter())
    }
}

/// Expressions to re-apply after the vanishing point moved
#[derive(Clone, Debug, PartialEq)]
pub struct VanishingUpdate {
    pub offset: f64,
    pub primary: RouteLineExpressions,
    /// Present only when restricted roads are displayed and the primary route has some
    pub restricted: Option<Expression>,
}

/// Batch ids to tag a [`RenderState`] with, and what completing them means
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderSubmission {
    /// One batch per route source, in [`RenderState::route_sources`] order
    pub batches: Vec<RenderBatchId>,
    pub rendered_ids: HashSet<String>,
    pub cleared_ids: HashSet<String>,
    pub expected: ExpectedRender,
}

/// Route line façade
///
/// Index 0 of the route list is the primary route; the following ones are alternatives.
pub struct RouteLineApi {
    config: RouteLineConfig,
    segmenter: TrafficSegmenter,
    widths: LineWidths,
    routes: Vec<RouteFeatureData>,
    segment_cache: LruCache<SegmentKey, Arc<Vec<ExpressionSegment>>>,
    primary_segments: Option<Arc<Vec<ExpressionSegment>>>,
    restricted_sections: Vec<RestrictedSection>,
    /// Offset at which each alternative leaves the primary route
    fork_offsets: HashMap<String, f64>,
    /// One segment at the start of every primary leg
    leg_segments: Vec<ExpressionSegment>,
    tracker: VanishingPointTracker,
    visibility: LayerVisibility,
    /// Highest leg index reported by progress for the primary route
    active_leg: usize,
    last_position: Option<(Coord<f64>, Instant)>,
    data_ids: HashMap<String, u64>,
    last_rendered: HashMap<String, Option<String>>,
    /// Bumped whenever the route list changes
    generation: u64,
}

impl std::fmt::Debug for RouteLineApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteLineApi")
            .field("routes", &self.routes.len())
            .field("cached_segments", &self.segment_cache.len())
            .field("offset", &self.tracker.offset())
            .field("generation", &self.generation)
            .finish()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteLineApi {
    /// Create the façade, rejecting invalid configurations
    pub fn new(config: RouteLineConfig) -> Result<Self> {
        config.validate()?;
        let widths = LineWidths {
            route: line_width_expression(&config.route_scale)?,
            casing: line_width_expression(&config.casing_scale)?,
            traffic: line_width_expression(&config.traffic_scale)?,
        };
        let capacity = NonZeroUsize::new((config.max_alternatives + 1) * 4).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            segmenter: TrafficSegmenter::from_config(&config),
            tracker: VanishingPointTracker::new(config.max_jump_meters, config.staleness_threshold),
            visibility: LayerVisibility {
                restricted: config.display_restricted_roads,
                ..LayerVisibility::default()
            },
            widths,
            routes: Vec::new(),
            segment_cache: LruCache::new(capacity),
            primary_segments: None,
            restricted_sections: Vec::new(),
            fork_offsets: HashMap::new(),
            leg_segments: Vec::new(),
            active_leg: 0,
            last_position: None,
            data_ids: HashMap::new(),
            last_rendered: HashMap::new(),
            generation: 0,
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &RouteLineConfig {
        &self.config
    }

    /// Replace all routes; the first one becomes primary
    ///
    /// Routes repeating an earlier id are dropped. The vanishing offset starts over at 0.
    pub fn set_routes(&mut self, routes: Vec<Route>) -> RenderState {
        self.set_routes_with_alternatives_metadata(routes, Vec::new())
    }

    /// Replace all routes, hiding each alternative up to where it forks from the primary
    ///
    /// Metadata for the primary route or for routes not in `routes` is ignored.
    pub fn set_routes_with_alternatives_metadata(
        &mut self,
        routes: Vec<Route>,
        metadata: Vec<AlternativeRouteMetadata>,
    ) -> RenderState {
        let mut seen = HashSet::with_capacity(routes.len());
        let mut unique = Vec::with_capacity(routes.len());
        for route in routes {
            if !seen.insert(route.id.clone()) {
                tracing::warn!(route_id = %route.id, "Dropping route with duplicate id");
                continue;
            }
            // segments cached for a route that changed under the same id are stale
            let changed = self
                .routes
                .iter()
                .any(|data| data.route.id == route.id && *data.route != route);
            if changed {
                self.segment_cache.pop(&(route.id.clone(), true));
                self.segment_cache.pop(&(route.id.clone(), false));
            }
            unique.push(route);
        }

        let drawn = self.config.max_alternatives + 1;
        if unique.len() > drawn {
            tracing::debug!(
                routes = unique.len(),
                drawn,
                "More alternatives than slots, extra routes are not drawn"
            );
        }

        self.routes = unique
            .into_par_iter()
            .map(|route| RouteFeatureData::from_route(Arc::new(route)))
            .collect();
        self.fork_offsets.clear();
        for entry in metadata {
            let alternative = self.routes.iter().skip(1).find(|data| data.route.id == entry.route_id);
            match alternative.and_then(|data| fork_offset(&data.route, entry.fork)) {
                Some(offset) => {
                    self.fork_offsets.insert(entry.route_id, offset);
                }
                None => tracing::debug!(
                    route_id = %entry.route_id,
                    "Ignoring metadata without a drawable alternative fork"
                ),
            }
        }
        self.warm_segment_cache();
        self.on_primary_changed();

        tracing::info!(
            routes = self.routes.len(),
            forks = self.fork_offsets.len(),
            "Route line updated"
        );
        self.build_render_state()
    }

    /// Make `route_id` the primary route, keeping the others as alternatives
    pub fn promote_to_primary(&mut self, route_id: &str) -> Result<RenderState> {
        let Some(position) = self.routes.iter().position(|data| data.route.id == route_id) else {
            return Err(RouteLineError::UnknownRoute(route_id.to_string()));
        };
        let data = self.routes.remove(position);
        self.routes.insert(0, data);
        // fork points are relative to the previous primary
        self.fork_offsets.clear();
        self.warm_segment_cache();
        self.on_primary_changed();
        Ok(self.build_render_state())
    }

    /// Rebuild the render state from cached data
    pub fn redraw(&mut self) -> RenderState {
        self.build_render_state()
    }

    /// Remove every route
    pub fn clear(&mut self) -> RenderState {
        self.routes.clear();
        self.fork_offsets.clear();
        self.segment_cache.clear();
        self.tracker.reset();
        self.on_primary_changed();
        self.build_render_state()
    }

    /// Feed a progress update for the primary route
    ///
    /// Returns new expressions only when inactive legs are styled and the active leg
    /// advanced. Offsets themselves move through [`Self::update_traveled_route_line`].
    pub fn update_with_route_progress(&mut self, progress: &RouteProgress) -> Option<VanishingUpdate> {
        self.update_with_route_progress_at(progress, Instant::now())
    }

    pub fn update_with_route_progress_at(
        &mut self,
        progress: &RouteProgress,
        now: Instant,
    ) -> Option<VanishingUpdate> {
        let Some(primary) = self.routes.first() else {
            tracing::debug!("Progress received without a primary route");
            return None;
        };
        if let Some(route_id) = progress.route_id.as_ref().filter(|id| **id != primary.route.id) {
            tracing::warn!(
                progress_route = %route_id,
                primary_route = %primary.route.id,
                "Progress does not belong to the primary route, ignoring"
            );
            return None;
        }
        let leg_count = primary.route.legs.len();

        self.tracker.update_mode(progress.state);
        self.tracker.update_upcoming_index(progress.snapshot.as_ref(), now);

        let leg_index = progress.snapshot.as_ref()?.leg_index;
        if leg_index <= self.active_leg || leg_index >= leg_count {
            return None;
        }
        self.active_leg = leg_index;
        tracing::debug!(leg_index, "Active leg advanced");
        self.config
            .style_inactive_legs_independently
            .then(|| self.vanishing_update(self.tracker.offset()))
    }

    /// Move the vanishing point to the traveler's position
    pub fn update_traveled_route_line(&mut self, position: Coord<f64>) -> Option<VanishingUpdate> {
        self.update_traveled_route_line_at(position, Instant::now())
    }

    /// Like [`Self::update_traveled_route_line`] with an explicit clock
    ///
    /// Returns `None` when the line does not change.
    pub fn update_traveled_route_line_at(
        &mut self,
        position: Coord<f64>,
        now: Instant,
    ) -> Option<VanishingUpdate> {
        if !self.config.vanishing_route_line_enabled {
            return None;
        }
        if let Some((last_position, last_update)) = self.last_position {
            if last_position == position {
                return None;
            }
            if now.saturating_duration_since(last_update) < self.config.vanishing_update_interval {
                return None;
            }
        }

        let offset = self.tracker.compute_offset(position, now)?;
        self.last_position = Some((position, now));
        Some(self.vanishing_update(offset))
    }

    /// Force the vanishing offset, clamped into [0, 1]
    pub fn set_vanishing_offset(&mut self, offset: f64) -> VanishingUpdate {
        let offset = self.tracker.set_offset(offset);
        self.vanishing_update(offset)
    }

    #[inline]
    pub fn vanishing_offset(&self) -> f64 {
        self.tracker.offset()
    }

    pub fn primary_route(&self) -> Option<&Arc<Route>> {
        self.routes.first().map(|data| &data.route)
    }

    /// All routes, primary first
    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter().map(|data| &data.route)
    }

    pub fn show_alternatives(&mut self) -> LayerVisibility {
        self.visibility.alternatives = true;
        self.visibility
    }

    pub fn hide_alternatives(&mut self) -> LayerVisibility {
        self.visibility.alternatives = false;
        self.visibility
    }

    /// Next batch id for `source_id`; data ids start at 1 and only grow
    pub fn next_render_batch(&mut self, source_id: &str) -> RenderBatchId {
        let data_id = self.data_ids.entry(source_id.to_string()).or_insert(0);
        *data_id += 1;
        RenderBatchId::new(source_id, *data_id)
    }

    /// Allocate batch ids for `state` and describe what completing them means
    ///
    /// A source that draws a route expects it rendered. The route a source drew before is
    /// expected cleared on the same batch when no source draws it any more.
    pub fn render_submission(&mut self, state: &RenderState) -> RenderSubmission {
        let drawn: HashSet<&str> = state
            .route_sources()
            .filter_map(|source| source.route_id.as_deref())
            .collect();

        let mut submission = RenderSubmission::default();
        for source in state.route_sources() {
            let batch = self.next_render_batch(&source.source_id);
            if let Some(route_id) = &source.route_id {
                submission
                    .expected
                    .add_rendered_route(&batch.source_id, batch.data_id, route_id.clone());
                submission.rendered_ids.insert(route_id.clone());
            }

            let previous = self
                .last_rendered
                .insert(source.source_id.clone(), source.route_id.clone())
                .flatten()
                .filter(|previous| !drawn.contains(previous.as_str()));
            if let Some(previous) = previous {
                submission
                    .expected
                    .add_cleared_route(&batch.source_id, batch.data_id, previous.clone());
                submission.cleared_ids.insert(previous);
            }
            submission.batches.push(batch);
        }
        submission
    }

    /// Snapshot of the current routes for tap resolution
    pub fn closest_route_resolver(&self) -> ClosestRouteResolver {
        ClosestRouteResolver::new(
            self.routes
                .iter()
                .map(|data| data.features.first_feature_id().map(str::to_owned))
                .collect(),
            self.config.layer_ids.primary.clone(),
            self.config.layer_ids.alternatives.clone(),
            self.generation,
        )
    }

    /// Route at `index` of a resolver answer, `None` if the routes changed since the snapshot
    pub fn route_for_closest(&self, resolver: &ClosestRouteResolver, index: usize) -> Option<&Arc<Route>> {
        if resolver.generation() != self.generation {
            tracing::debug!(
                snapshot = resolver.generation(),
                current = self.generation,
                "Discarding closest route answer for outdated routes"
            );
            return None;
        }
        self.routes.get(index).map(|data| &data.route)
    }

    /// Compute segments of drawn routes missing from the cache in parallel
    fn warm_segment_cache(&mut self) {
        let drawn = self.config.max_alternatives + 1;
        let missing: Vec<(SegmentKey, Arc<Route>)> = self
            .routes
            .iter()
            .take(drawn)
            .enumerate()
            .map(|(index, data)| ((data.route.id.clone(), index == 0), Arc::clone(&data.route)))
            .filter(|(key, _)| !self.segment_cache.contains(key))
            .collect();
        if missing.is_empty() {
            return;
        }

        let segmenter = &self.segmenter;
        let colors = &self.config.colors;
        let computed: Vec<(SegmentKey, Vec<ExpressionSegment>)> = missing
            .into_par_iter()
            .map(|(key, route)| {
                let segments = build_segments(segmenter, colors, &route, key.1);
                (key, segments)
            })
            .collect();
        for (key, segments) in computed {
            self.segment_cache.put(key, Arc::new(segments));
        }
    }

    fn on_primary_changed(&mut self) {
        self.generation += 1;
        self.active_leg = 0;
        self.last_position = None;

        let primary = self.routes.first().map(|data| Arc::clone(&data.route));
        self.primary_segments = primary.as_deref().map(|route| {
            cached_segments(
                &mut self.segment_cache,
                &self.segmenter,
                &self.config.colors,
                route,
                true,
            )
        });
        self.tracker.set_route(primary.clone());
        self.restricted_sections = match (primary.as_deref(), self.tracker.distances()) {
            (Some(route), Some(distances)) => self.segmenter.restricted_sections(route, distances),
            _ => Vec::new(),
        };

        let leg_count = self.routes.first().map_or(0, |data| data.route.legs.len());
        let default = self.config.colors.primary.default;
        self.leg_segments = self
            .tracker
            .distances()
            .map(|distances| {
                (0..leg_count)
                    .filter_map(|leg| {
                        let start = distances.leg_index_to_global(leg, 0)?;
                        let offset = distances.offset_at(start)?;
                        Some(ExpressionSegment::new(offset, default, Congestion::Unknown, leg))
                    })
                    .collect()
            })
            .unwrap_or_default();
    }

    fn build_render_state(&mut self) -> RenderState {
        let offset = self.tracker.offset();
        let primary_expressions = self.primary_expressions(offset);
        let primary = match self.routes.first() {
            Some(data) => RouteLineSource {
                source_id: PRIMARY_SOURCE_ID.to_string(),
                route_id: Some(data.route.id.clone()),
                features: data.features.clone(),
                expressions: primary_expressions,
            },
            None => RouteLineSource::empty(PRIMARY_SOURCE_ID, primary_expressions),
        };

        let mut alternatives = Vec::with_capacity(self.config.max_alternatives);
        for slot in 0..self.config.max_alternatives {
            let source_id = alternative_source_id(slot);
            let source = match self.routes.get(slot + 1) {
                Some(data) => {
                    let segments = cached_segments(
                        &mut self.segment_cache,
                        &self.segmenter,
                        &self.config.colors,
                        &data.route,
                        false,
                    );
                    let offset = self.fork_offsets.get(&data.route.id).copied().unwrap_or(0.0);
                    RouteLineSource {
                        source_id,
                        route_id: Some(data.route.id.clone()),
                        features: data.features.clone(),
                        expressions: self.alternative_expressions(&segments, offset),
                    }
                }
                None => RouteLineSource::empty(source_id, self.alternative_expressions(&[], 0.0)),
            };
            alternatives.push(source);
        }

        let primary_route = self.routes.first().map(|data| &data.route);
        let waypoints = primary_route
            .map(|route| waypoint_collection(route))
            .unwrap_or_default();
        let restricted_roads = primary_route
            .filter(|_| self.config.display_restricted_roads)
            .map(|route| restricted_collection(route))
            .unwrap_or_default();

        RenderState {
            primary,
            alternatives,
            waypoints,
            restricted_roads,
            restricted_expression: self.restricted_expression(offset),
            widths: self.widths.clone(),
            visibility: self.visibility,
            vanishing_offset: offset,
        }
    }

    /// Leg to keep highlighted, when legs are styled independently
    fn styled_leg(&self) -> Option<usize> {
        self.config
            .style_inactive_legs_independently
            .then_some(self.active_leg)
    }

    fn primary_expressions(&self, offset: f64) -> RouteLineExpressions {
        let colors = &self.config.colors;
        let segments: &[ExpressionSegment] = self
            .primary_segments
            .as_deref()
            .map(Vec::as_slice)
            .unwrap_or_default();
        let route_distance = self.routes.first().map_or(0.0, |data| data.route.distance);

        let traffic = match self.config.soft_gradient_transition {
            Some(meters) if route_distance > 0.0 => expression::soft_gradient_traffic_expression(
                offset,
                segments,
                colors.primary.unknown,
                meters / route_distance,
            ),
            _ => expression::traffic_expression(offset, segments, colors.primary.unknown),
        };

        let (casing, base) = match self.styled_leg() {
            Some(active_leg) => (
                expression::route_line_expression(
                    offset,
                    &self.leg_segments,
                    colors.traveled_casing,
                    colors.primary.casing,
                    colors.inactive_legs,
                    Some(active_leg),
                ),
                expression::route_line_expression(
                    offset,
                    &self.leg_segments,
                    colors.traveled,
                    colors.primary.default,
                    colors.inactive_legs,
                    Some(active_leg),
                ),
            ),
            None => (
                expression::vanishing_expression(offset, colors.traveled_casing, colors.primary.casing),
                expression::vanishing_expression(offset, colors.traveled, colors.primary.default),
            ),
        };

        RouteLineExpressions {
            casing,
            base,
            traffic,
        }
    }

    /// Alternative line, transparent before `offset`
    fn alternative_expressions(&self, segments: &[ExpressionSegment], offset: f64) -> RouteLineExpressions {
        let colors = &self.config.colors.alternative;
        let line = |color: Color| {
            if offset > 0.0 {
                expression::vanishing_expression(offset, Color::TRANSPARENT, color)
            } else {
                Expression::Constant(color)
            }
        };
        RouteLineExpressions {
            casing: line(colors.casing),
            base: line(colors.default),
            traffic: expression::traffic_expression(offset, segments, colors.unknown),
        }
    }

    fn restricted_expression(&self, offset: f64) -> Expression {
        if !self.config.display_restricted_roads {
            return Expression::Constant(Color::TRANSPARENT);
        }
        expression::restricted_expression(
            offset,
            &self.restricted_sections,
            self.config.colors.primary.restricted,
            self.styled_leg(),
        )
    }

    fn vanishing_update(&self, offset: f64) -> VanishingUpdate {
        let restricted = (self.config.display_restricted_roads && !self.restricted_sections.is_empty())
            .then(|| self.restricted_expression(offset));
        VanishingUpdate {
            offset,
            primary: self.primary_expressions(offset),
            restricted,
        }
    }
}

fn build_segments(
    segmenter: &TrafficSegmenter,
    colors: &RouteLineColors,
    route: &Route,
    is_primary: bool,
) -> Vec<ExpressionSegment> {
    segmenter.segments(route, is_primary, |congestion, primary| {
        colors.congestion_color(congestion, primary)
    })
}

fn cached_segments(
    cache: &mut LruCache<SegmentKey, Arc<Vec<ExpressionSegment>>>,
    segmenter: &TrafficSegmenter,
    colors: &RouteLineColors,
    route: &Route,
    is_primary: bool,
) -> Arc<Vec<ExpressionSegment>> {
    let key = (route.id.clone(), is_primary);
    if let Some(segments) = cache.get(&key) {
        return Arc::clone(segments);
    }
    let segments = Arc::new(build_segments(segmenter, colors, route, is_primary));
    cache.put(key, Arc::clone(&segments));
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::tests::create_test_route;
    use crate::{ForkPoint, LegAnnotation, ProgressSnapshot, ProgressState, utils};

    fn api() -> RouteLineApi {
        RouteLineApi::new(RouteLineConfig::default()).unwrap()
    }

    fn coord(i: f64) -> Coord<f64> {
        Coord { x: i * 0.001, y: 0.0 }
    }

    fn spacing() -> f64 {
        utils::haversine_distance(coord(0.0), coord(1.0))
    }

    fn tracking(leg_index: usize, step_index: usize, traveled: f64) -> RouteProgress {
        RouteProgress::tracking(ProgressSnapshot {
            leg_index,
            step_index,
            step_distance_traveled: traveled,
            ..Default::default()
        })
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = RouteLineConfig {
            route_scale: Vec::new(),
            ..RouteLineConfig::default()
        };
        assert!(matches!(RouteLineApi::new(config), Err(RouteLineError::InvalidConfig(_))));
    }

    #[test]
    fn test_set_routes_fills_sources() {
        let mut api = api();
        let state = api.set_routes(vec![
            create_test_route("a", &[&[5]]),
            create_test_route("b", &[&[4]]),
        ]);

        assert_eq!(state.primary.source_id, PRIMARY_SOURCE_ID);
        assert_eq!(state.primary.route_id.as_deref(), Some("a"));
        assert_eq!(state.primary.features.first_feature_id(), Some("a"));
        assert_eq!(state.alternatives.len(), 2);
        assert_eq!(state.alternatives[0].route_id.as_deref(), Some("b"));
        assert_eq!(state.alternatives[1].route_id, None);
        assert!(state.alternatives[1].features.is_empty());
        // origin and one destination
        assert_eq!(state.waypoints.len(), 2);
        assert_eq!(state.vanishing_offset, 0.0);
        assert_eq!(api.primary_route().map(|r| r.id.as_str()), Some("a"));
    }

    #[test]
    fn test_empty_route_list_has_no_primary() {
        let mut api = api();
        let state = api.set_routes(Vec::new());
        assert!(api.primary_route().is_none());
        assert!(state.route_sources().all(|source| source.features.is_empty()));
        assert!(state.waypoints.is_empty());
    }

    #[test]
    fn test_route_without_geometry_is_empty() {
        let mut api = api();
        let state = api.set_routes(vec![Route::new("empty", 0.0, Vec::new())]);
        assert_eq!(state.primary.route_id.as_deref(), Some("empty"));
        assert!(state.primary.features.is_empty());
    }

    #[test]
    fn test_duplicate_ids_are_dropped() {
        let mut api = api();
        api.set_routes(vec![
            create_test_route("a", &[&[5]]),
            create_test_route("a", &[&[3]]),
            create_test_route("b", &[&[3]]),
        ]);
        let ids: Vec<&str> = api.routes().map(|route| route.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(api.primary_route().map(|r| r.flattened_point_count()), Some(5));
    }

    #[test]
    fn test_promote_to_primary_resets_offset() {
        let mut api = api();
        api.set_routes(vec![
            create_test_route("r1", &[&[5]]),
            create_test_route("r2", &[&[5]]),
            create_test_route("r3", &[&[5]]),
        ]);
        api.set_vanishing_offset(0.4);
        assert_eq!(api.vanishing_offset(), 0.4);

        let state = api.promote_to_primary("r2").unwrap();
        let ids: Vec<&str> = api.routes().map(|route| route.id.as_str()).collect();
        assert_eq!(ids, ["r2", "r1", "r3"]);
        assert_eq!(state.vanishing_offset, 0.0);
        assert_eq!(api.vanishing_offset(), 0.0);
        assert_eq!(state.alternatives[0].route_id.as_deref(), Some("r1"));
        assert_eq!(state.alternatives[1].route_id.as_deref(), Some("r3"));
    }

    #[test]
    fn test_promote_unknown_route() {
        let mut api = api();
        api.set_routes(vec![create_test_route("r1", &[&[5]])]);
        assert!(matches!(
            api.promote_to_primary("nope"),
            Err(RouteLineError::UnknownRoute(id)) if id == "nope"
        ));
    }

    #[test]
    fn test_clear() {
        let mut api = api();
        api.set_routes(vec![create_test_route("a", &[&[5]])]);
        let state = api.clear();
        assert!(api.primary_route().is_none());
        assert!(state.primary.features.is_empty());
        assert!(state.restricted_roads.is_empty());
        assert!(api.tracker.distances().is_none());
    }

    #[test]
    fn test_traveled_route_line_follows_progress() {
        let mut api = api();
        api.set_routes(vec![create_test_route("a", &[&[6, 6]])]);
        let now = Instant::now();

        // no progress yet
        assert!(api.update_traveled_route_line_at(coord(4.5), now).is_none());

        api.update_with_route_progress_at(&tracking(0, 0, spacing() * 4.5), now);
        let update = api.update_traveled_route_line_at(coord(4.5), now).unwrap();
        assert!((update.offset - 0.45).abs() < 1e-6, "{}", update.offset);
        assert_eq!(
            update.primary.base,
            expression::vanishing_expression(update.offset, Color::TRANSPARENT, api.config().colors.primary.default)
        );
        assert!(update.restricted.is_none());

        // identical position is skipped
        assert!(api.update_traveled_route_line_at(coord(4.5), now).is_none());
    }

    #[test]
    fn test_progress_for_other_route_is_ignored() {
        let mut api = api();
        api.set_routes(vec![create_test_route("a", &[&[6]])]);
        let now = Instant::now();
        api.update_with_route_progress_at(&tracking(0, 0, spacing() * 2.5).for_route("other"), now);
        assert!(api.update_traveled_route_line_at(coord(2.5), now).is_none());

        api.update_with_route_progress_at(&tracking(0, 0, spacing() * 2.5).for_route("a"), now);
        assert!(api.update_traveled_route_line_at(coord(2.5), now).is_some());
    }

    #[test]
    fn test_vanishing_disabled_by_config() {
        let mut api = RouteLineApi::new(RouteLineConfig {
            vanishing_route_line_enabled: false,
            ..RouteLineConfig::default()
        })
        .unwrap();
        api.set_routes(vec![create_test_route("a", &[&[6]])]);
        let now = Instant::now();
        api.update_with_route_progress_at(&tracking(0, 0, spacing() * 2.5), now);
        assert!(api.update_traveled_route_line_at(coord(2.5), now).is_none());
    }

    #[test]
    fn test_minimum_update_interval() {
        let mut api = RouteLineApi::new(RouteLineConfig {
            vanishing_update_interval: std::time::Duration::from_millis(100),
            ..RouteLineConfig::default()
        })
        .unwrap();
        api.set_routes(vec![create_test_route("a", &[&[11]])]);
        let now = Instant::now();
        api.update_with_route_progress_at(&tracking(0, 0, spacing() * 2.5), now);

        assert!(api.update_traveled_route_line_at(coord(2.5), now).is_some());
        let soon = now + std::time::Duration::from_millis(50);
        assert!(api.update_traveled_route_line_at(coord(2.6), soon).is_none());
        let later = now + std::time::Duration::from_millis(100);
        assert!(api.update_traveled_route_line_at(coord(2.6), later).is_some());
    }

    #[test]
    fn test_active_leg_styling() {
        let mut api = RouteLineApi::new(RouteLineConfig {
            style_inactive_legs_independently: true,
            ..RouteLineConfig::default()
        })
        .unwrap();
        api.set_routes(vec![create_test_route("a", &[&[4], &[4]])]);
        let now = Instant::now();

        assert!(api.update_with_route_progress_at(&tracking(0, 0, 0.0), now).is_none());
        let update = api.update_with_route_progress_at(&tracking(1, 0, 0.0), now).unwrap();
        // leg 0 now drawn with the inactive color
        assert_eq!(
            update.primary.base.color_at(0.25),
            Some(api.config().colors.inactive_legs)
        );
        assert_eq!(
            update.primary.base.color_at(0.75),
            Some(api.config().colors.primary.default)
        );
        // going back does not change the active leg
        assert!(api.update_with_route_progress_at(&tracking(0, 0, 0.0), now).is_none());
    }

    #[test]
    fn test_traffic_expression_uses_primary_colors() {
        let mut route = create_test_route("a", &[&[3]]);
        route.legs[0].annotation = Some(LegAnnotation {
            distance: vec![spacing(), spacing()],
            congestion: vec![Congestion::Low, Congestion::Heavy],
            ..Default::default()
        });
        let mut api = api();
        let state = api.set_routes(vec![route]);
        let colors = &api.config().colors.primary;
        assert_eq!(state.primary.expressions.traffic.color_at(0.25), Some(colors.low));
        assert_eq!(state.primary.expressions.traffic.color_at(0.75), Some(colors.heavy));
    }

    #[test]
    fn test_soft_gradient_traffic() {
        let mut api = RouteLineApi::new(RouteLineConfig {
            soft_gradient_transition: Some(10.0),
            ..RouteLineConfig::default()
        })
        .unwrap();
        let state = api.set_routes(vec![create_test_route("a", &[&[3]])]);
        assert!(matches!(state.primary.expressions.traffic, Expression::Interpolate { .. }));
    }

    #[test]
    fn test_visibility_toggles() {
        let mut api = api();
        assert!(!api.hide_alternatives().alternatives);
        assert!(!api.redraw().visibility.alternatives);
        assert!(api.show_alternatives().alternatives);
    }

    #[test]
    fn test_render_batches_increase_per_source() {
        let mut api = api();
        assert_eq!(api.next_render_batch("s").data_id, 1);
        assert_eq!(api.next_render_batch("s").data_id, 2);
        assert_eq!(api.next_render_batch("t").data_id, 1);
    }

    #[test]
    fn test_render_submission_tracks_cleared_routes() {
        let mut api = api();
        let state = api.set_routes(vec![
            create_test_route("a", &[&[3]]),
            create_test_route("b", &[&[3]]),
        ]);
        let first = api.render_submission(&state);
        assert_eq!(first.batches.len(), 3);
        assert_eq!(first.rendered_ids, HashSet::from(["a".to_string(), "b".to_string()]));
        assert!(first.cleared_ids.is_empty());
        assert_eq!(first.expected.len(), 2);

        // swapping keeps both routes drawn, nothing is cleared
        let state = api.promote_to_primary("b").unwrap();
        let swapped = api.render_submission(&state);
        assert!(swapped.cleared_ids.is_empty());
        assert!(swapped.batches.iter().all(|batch| batch.data_id == 2));

        let state = api.set_routes(vec![create_test_route("b", &[&[3]])]);
        let reduced = api.render_submission(&state);
        assert_eq!(reduced.rendered_ids, HashSet::from(["b".to_string()]));
        assert_eq!(reduced.cleared_ids, HashSet::from(["a".to_string()]));
    }

    #[test]
    fn test_restricted_overlay_spans_touching_ranges() {
        let mut api = api();
        let mut route = create_test_route("a", &[&[9]]);
        route.legs[0].restricted = vec![1..=3, 3..=5];
        let state = api.set_routes(vec![route]);

        let restricted = api.config().colors.primary.restricted;
        let expression = &state.restricted_expression;
        assert_eq!(expression.color_at(0.1), Some(Color::TRANSPARENT));
        assert_eq!(expression.color_at(0.2), Some(restricted));
        assert_eq!(expression.color_at(0.5), Some(restricted));
        assert_eq!(expression.color_at(0.7), Some(Color::TRANSPARENT));
        assert_eq!(state.restricted_roads.len(), 2);
    }

    #[test]
    fn test_replaced_alternative_is_cleared() {
        let mut api = api();
        let state = api.set_routes(vec![
            create_test_route("a", &[&[3]]),
            create_test_route("b", &[&[3]]),
        ]);
        api.render_submission(&state);

        let state = api.set_routes(vec![
            create_test_route("a", &[&[3]]),
            create_test_route("c", &[&[3]]),
        ]);
        let replaced = api.render_submission(&state);
        assert_eq!(replaced.rendered_ids, HashSet::from(["a".to_string(), "c".to_string()]));
        assert_eq!(replaced.cleared_ids, HashSet::from(["b".to_string()]));
        // c is drawn and b removed by the same alternative batch
        assert_eq!(replaced.expected.len(), 3);
        assert_eq!(replaced.batches.len(), 3);
    }

    #[test]
    fn test_alternative_hidden_until_fork() {
        let mut api = api();
        let mut alternative = create_test_route("b", &[&[5]]);
        alternative.legs[0].annotation = Some(LegAnnotation {
            distance: vec![100.0; 4],
            congestion: vec![Congestion::Heavy; 4],
            ..Default::default()
        });
        alternative.distance = 400.0;
        let fork = ForkPoint {
            leg_index: 0,
            geometry_index_in_leg: 1,
        };
        let state = api.set_routes_with_alternatives_metadata(
            vec![create_test_route("a", &[&[5]]), alternative],
            vec![
                AlternativeRouteMetadata {
                    route_id: "a".to_string(),
                    fork,
                },
                AlternativeRouteMetadata {
                    route_id: "b".to_string(),
                    fork,
                },
            ],
        );

        let colors = api.config().colors.clone();
        let alternative = &state.alternatives[0].expressions;
        assert_eq!(alternative.base.color_at(0.2), Some(Color::TRANSPARENT));
        assert_eq!(alternative.base.color_at(0.3), Some(colors.alternative.default));
        assert_eq!(alternative.casing.color_at(0.2), Some(Color::TRANSPARENT));
        assert_eq!(alternative.traffic.color_at(0.2), Some(Color::TRANSPARENT));
        assert_eq!(
            alternative.traffic.color_at(0.5),
            Some(colors.congestion_color(Congestion::Heavy, false))
        );

        let promoted = api.promote_to_primary("b").unwrap();
        assert_eq!(
            promoted.alternatives[0].expressions.base,
            Expression::Constant(colors.alternative.default)
        );
    }

    #[test]
    fn test_closest_route_snapshot_goes_stale() {
        let mut api = api();
        api.set_routes(vec![
            create_test_route("a", &[&[3]]),
            create_test_route("b", &[&[3]]),
        ]);
        let resolver = api.closest_route_resolver();
        assert_eq!(api.route_for_closest(&resolver, 1).map(|r| r.id.as_str()), Some("b"));

        api.set_routes(vec![create_test_route("c", &[&[3]])]);
        assert!(api.route_for_closest(&resolver, 0).is_none());
    }

    #[test]
    fn test_changed_route_invalidates_segments() {
        let mut api = api();
        api.set_routes(vec![create_test_route("a", &[&[3]])]);
        let before = api.primary_segments.clone().unwrap();

        let mut route = create_test_route("a", &[&[3]]);
        route.legs[0].annotation = Some(LegAnnotation {
            distance: vec![spacing(), spacing()],
            congestion: vec![Congestion::Severe, Congestion::Severe],
            ..Default::default()
        });
        api.set_routes(vec![route]);
        let after = api.primary_segments.clone().unwrap();
        assert_ne!(before, after);
        assert_eq!(after[0].congestion, Congestion::Severe);
    }

    #[test]
    fn test_progress_state_drives_mode() {
        let mut api = api();
        api.set_routes(vec![create_test_route("a", &[&[6]])]);
        let progress = RouteProgress {
            state: ProgressState::OffRoute,
            ..tracking(0, 0, spacing())
        };
        let now = Instant::now();
        api.update_with_route_progress_at(&progress, now);
        assert!(api.update_traveled_route_line_at(coord(1.0), now).is_none());
    }
}
