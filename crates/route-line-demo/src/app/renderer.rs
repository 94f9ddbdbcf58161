//! In-process stand-in for a map renderer
//!
//! Applies render states after a configurable latency, reporting each source update to
//! the completion tracker, and answers hit tests in Web Mercator meters.

use geo::{Distance, Euclidean, Intersects, LineString, Point};
use route_line_lib::{
    CompletionTrackerHandle, LayerIds, QueriedFeature, QueryGeometry, RenderState,
    RenderSubmission, RenderedFeatureQuery, RouteLineSource, RoutesRenderedResult, SourceDataLoaded,
    utils,
};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::oneshot;

/// Line half width used for point hit tests, in Mercator meters
const HIT_TOLERANCE: f64 = 2.0;

/// A drawn route line as seen by hit tests
#[derive(Clone, Debug)]
struct DrawnLine {
    route_id: String,
    layer_ids: Vec<String>,
    /// Geometry in Web Mercator meters
    line: LineString<f64>,
}

/// Simulated renderer
#[derive(Clone)]
pub struct SimulatedRenderer {
    tracker: CompletionTrackerHandle,
    layer_ids: LayerIds,
    latency: Duration,
    /// Lines in draw order, topmost last
    drawn: Arc<RwLock<Vec<DrawnLine>>>,
}

impl SimulatedRenderer {
    pub fn new(tracker: CompletionTrackerHandle, layer_ids: LayerIds, latency: Duration) -> Self {
        Self {
            tracker,
            layer_ids,
            latency,
            drawn: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Apply `state` and resolve once every source reported its batch
    ///
    /// Each source loads on its own task; later sources take a little longer.
    pub fn apply(&self, state: &RenderState, submission: RenderSubmission) -> oneshot::Receiver<RoutesRenderedResult> {
        let receiver = self.tracker.submit(
            submission.rendered_ids,
            submission.cleared_ids,
            submission.expected,
        );

        let lines = self.drawn_lines(state);
        *self.drawn.write().unwrap_or_else(PoisonError::into_inner) = lines;

        for (index, batch) in submission.batches.into_iter().enumerate() {
            let tracker = self.tracker.clone();
            let delay = self.latency * (index as u32 + 1);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                tracing::trace!(source = %batch.source_id, data_id = batch.data_id, "Source loaded");
                tracker.source_data_loaded(SourceDataLoaded::metadata(&batch));
            });
        }
        receiver
    }

    fn drawn_lines(&self, state: &RenderState) -> Vec<DrawnLine> {
        let mut lines = Vec::new();
        if state.visibility.primary {
            lines.extend(self.lines_of(&state.primary, &self.layer_ids.primary));
        }
        if state.visibility.alternatives {
            for (slot, source) in state.alternatives.iter().enumerate() {
                let slot_name = format!("alternative-{}", slot + 1);
                let layers: Vec<String> = self
                    .layer_ids
                    .alternatives
                    .iter()
                    .filter(|layer| layer.contains(&slot_name))
                    .cloned()
                    .collect();
                lines.extend(self.lines_of(source, &layers));
            }
        }
        lines
    }

    fn lines_of(&self, source: &RouteLineSource, layers: &[String]) -> Vec<DrawnLine> {
        let Some(route_id) = source.route_id.as_ref() else {
            return Vec::new();
        };
        source
            .features
            .features
            .iter()
            .filter_map(|feature| match &feature.geometry {
                geo::Geometry::LineString(line) => Some(line),
                _ => None,
            })
            .map(|line| DrawnLine {
                route_id: route_id.clone(),
                layer_ids: layers.to_vec(),
                line: line.coords().map(|c| utils::coord_to_mercator(*c)).collect(),
            })
            .collect()
    }
}

impl RenderedFeatureQuery for SimulatedRenderer {
    fn query_rendered_features(
        &self,
        geometry: QueryGeometry,
        layer_ids: &[String],
    ) -> impl Future<Output = Vec<QueriedFeature>> + Send {
        let drawn = self.drawn.read().unwrap_or_else(PoisonError::into_inner);
        let hits: Vec<QueriedFeature> = drawn
            .iter()
            .rev()
            .filter(|drawn| drawn.layer_ids.iter().any(|layer| layer_ids.contains(layer)))
            .filter(|drawn| match geometry {
                QueryGeometry::Point(point) => {
                    Euclidean.distance(&Point::from(point), &drawn.line) <= HIT_TOLERANCE
                }
                QueryGeometry::Box(area) => area.intersects(&drawn.line),
            })
            .map(|drawn| QueriedFeature {
                id: Some(drawn.route_id.clone()),
                layer_id: drawn.layer_ids.first().cloned(),
            })
            .collect();
        tracing::debug!(?geometry, hits = hits.len(), "Hit test");
        async move { hits }
    }
}
