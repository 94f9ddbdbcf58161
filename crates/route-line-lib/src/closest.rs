//! Resolving a tap on the map to one of the drawn routes

use geo::{Coord, Rect};
use std::future::Future;

/// Hit-test area in the renderer's screen space
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum QueryGeometry {
    Point(Coord<f64>),
    Box(Rect<f64>),
}

/// A feature returned by a hit test
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueriedFeature {
    pub id: Option<String>,
    pub layer_id: Option<String>,
}

impl QueriedFeature {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            layer_id: None,
        }
    }
}

/// Renderer surface answering hit tests, topmost feature first
pub trait RenderedFeatureQuery {
    fn query_rendered_features(
        &self,
        geometry: QueryGeometry,
        layer_ids: &[String],
    ) -> impl Future<Output = Vec<QueriedFeature>> + Send;
}

/// Snapshot of the drawn routes used to answer tap queries
///
/// Taken from [`crate::RouteLineApi::closest_route_resolver`]; carries the route set
/// generation so late answers can be recognized as stale.
#[derive(Clone, Debug, PartialEq)]
pub struct ClosestRouteResolver {
    route_feature_ids: Vec<Option<String>>,
    primary_layers: Vec<String>,
    alternative_layers: Vec<String>,
    generation: u64,
}

impl ClosestRouteResolver {
    pub fn new(
        route_feature_ids: Vec<Option<String>>,
        primary_layers: Vec<String>,
        alternative_layers: Vec<String>,
        generation: u64,
    ) -> Self {
        Self {
            route_feature_ids,
            primary_layers,
            alternative_layers,
            generation,
        }
    }

    /// Route set generation this snapshot was taken from
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Find the index of the route drawn under `point`
    ///
    /// Alternative layers are queried before primary layers since the primary line
    /// usually renders below them. Each group is queried at the exact point first, then
    /// within a box of side `2 * padding` around it.
    pub async fn find_closest_route<Q: RenderedFeatureQuery + Sync>(
        &self,
        query: &Q,
        point: Coord<f64>,
        padding: f64,
    ) -> Option<usize> {
        let area = Rect::new(
            Coord {
                x: point.x - padding,
                y: point.y - padding,
            },
            Coord {
                x: point.x + padding,
                y: point.y + padding,
            },
        );

        for layers in [&self.alternative_layers, &self.primary_layers] {
            if layers.is_empty() {
                continue;
            }
            let hits = query
                .query_rendered_features(QueryGeometry::Point(point), layers)
                .await;
            if let Some(index) = self.route_index_of(&hits) {
                return Some(index);
            }
            if padding > 0.0 {
                let hits = query
                    .query_rendered_features(QueryGeometry::Box(area), layers)
                    .await;
                if let Some(index) = self.route_index_of(&hits) {
                    return Some(index);
                }
            }
        }

        tracing::debug!(?point, padding, "No route found in query area");
        None
    }

    /// Index of the route whose first feature id matches the first matching hit
    fn route_index_of(&self, hits: &[QueriedFeature]) -> Option<usize> {
        hits.iter().filter_map(|hit| hit.id.as_deref()).find_map(|id| {
            self.route_feature_ids
                .iter()
                .position(|route_id| route_id.as_deref() == Some(id))
        })
    }
}
