//! Route Line Library - Core logic for drawing navigation routes on a map
//!
//! This library turns planned routes into renderer-ready line data and keeps that data in
//! sync with the traveler's live position. The renderer itself is an opaque collaborator:
//! it receives feature collections, color expressions and visibility toggles, answers
//! hit-test queries, and reports asynchronously when it finished applying an update.
//!
//! # Architecture
//!
//! - **[`GranularDistances`]**: remaining-distance table indexed by geometry point
//! - **[`TrafficSegmenter`]**: congestion annotations to coalesced color segments
//! - **[`expression`]**: step and gradient color expressions over line progress
//! - **[`VanishingPointTracker`]**: traveled-fraction state machine
//! - **[`RouteLineApi`]**: top-level façade owning routes and derived render data
//! - **[`RenderCompletionTracker`]**: correlates renderer completion events with route ids
//! - **[`ClosestRouteResolver`]**: maps a tap on the map back to a route index
//!
//! # Performance Characteristics
//!
//! - **Indexing**: O(N) per primary route, N = geometry points
//! - **Offset update**: O(1) amortized (bounded 10-point window)
//! - **Segmentation**: O(I) per route, I = annotation intervals

mod closest;
mod color;
mod completion;
mod config;
mod distances;
pub mod expression;
mod feature;
mod orchestrator;
mod progress;
mod route;
mod traffic;
pub mod utils;
mod vanishing;

// Public API exports
pub use closest::{ClosestRouteResolver, QueriedFeature, QueryGeometry, RenderedFeatureQuery};
pub use color::Color;
pub use completion::{
    CompletionTrackerHandle, ExpectedRender, RenderBatchId, RenderCompletionTracker,
    RoutesRenderedResult, SourceDataLoaded, SourceDataType,
};
pub use config::{
    CongestionColors, CongestionRanges, LayerIds, RouteLineColors, RouteLineConfig, ScaleStop,
};
pub use distances::{DistanceIndex, GranularDistances};
pub use expression::Expression;
pub use feature::{Feature, FeatureCollection, PropertyValue, RouteFeatureData};
pub use orchestrator::{
    LayerVisibility, LineWidths, PRIMARY_SOURCE_ID, RESTRICTED_SOURCE_ID, RenderState,
    RenderSubmission, RouteLineApi, RouteLineExpressions, RouteLineSource, VanishingUpdate,
    WAYPOINT_SOURCE_ID, alternative_source_id,
};
pub use progress::{ProgressSnapshot, ProgressState, RouteProgress};
pub use route::{
    AlternativeRouteMetadata, Congestion, ForkPoint, LegAnnotation, Route, RouteLeg, RouteStep,
};
pub use traffic::{ExpressionSegment, RestrictedSection, TrafficSegmenter, fork_offset};
pub use vanishing::{VanishingPointMode, VanishingPointTracker, VanishingState};

/// Error types for the route line core
#[derive(Debug, thiserror::Error)]
pub enum RouteLineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown route: {0}")]
    UnknownRoute(String),
}

pub type Result<T> = std::result::Result<T, RouteLineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that all public types are accessible
        let _: fn(RouteLineConfig) -> Result<RouteLineApi> = RouteLineApi::new;
        let _: fn() -> RouteLineConfig = RouteLineConfig::default;
        let _: fn() -> RenderCompletionTracker = RenderCompletionTracker::new;
    }
}
