//! Feature collections pushed to renderer sources

use crate::Route;
use geo::{Geometry, LineString, Point};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Property key carrying the id of the route a feature belongs to
pub const ROUTE_ID_PROPERTY: &str = "route_id";
/// Property key distinguishing origin and destination waypoints
pub const WAYPOINT_PROPERTY: &str = "waypoint";
pub const WAYPOINT_ORIGIN: &str = "origin";
pub const WAYPOINT_DESTINATION: &str = "destination";

/// A feature property value
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

/// A geometry with an optional id and a property map
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub id: Option<String>,
    pub geometry: Geometry<f64>,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Feature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            id: None,
            geometry: geometry.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, key: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

/// An ordered list of features
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Id of the first feature, used to match rendered features back to a route
    pub fn first_feature_id(&self) -> Option<&str> {
        self.features.first().and_then(|f| f.id.as_deref())
    }

    /// Render as a GeoJSON `FeatureCollection`
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{Map, Value, json};

        let features: Vec<Value> = self
            .features
            .iter()
            .map(|feature| {
                let properties: Map<String, Value> = feature
                    .properties
                    .iter()
                    .map(|(key, value)| {
                        let value = match value {
                            PropertyValue::Bool(b) => json!(b),
                            PropertyValue::Number(n) => json!(n),
                            PropertyValue::String(s) => json!(s),
                        };
                        (key.clone(), value)
                    })
                    .collect();
                let mut object = json!({
                    "type": "Feature",
                    "geometry": geometry_json(&feature.geometry),
                    "properties": properties,
                });
                if let (Some(id), Some(map)) = (&feature.id, object.as_object_mut()) {
                    map.insert("id".into(), json!(id));
                }
                object
            })
            .collect();

        json!({ "type": "FeatureCollection", "features": features })
    }
}

#[cfg(feature = "serde")]
fn geometry_json(geometry: &Geometry<f64>) -> serde_json::Value {
    use serde_json::json;
    let positions = |line: &LineString<f64>| -> Vec<[f64; 2]> {
        line.coords().map(|c| [c.x, c.y]).collect()
    };
    match geometry {
        Geometry::Point(p) => json!({ "type": "Point", "coordinates": [p.x(), p.y()] }),
        Geometry::LineString(line) => {
            json!({ "type": "LineString", "coordinates": positions(line) })
        }
        Geometry::MultiLineString(lines) => json!({
            "type": "MultiLineString",
            "coordinates": lines.0.iter().map(positions).collect::<Vec<_>>(),
        }),
        other => {
            tracing::warn!(?other, "Geometry kind is not emitted to the renderer");
            serde_json::Value::Null
        }
    }
}

/// A route together with the features derived from it
#[derive(Clone, Debug)]
pub struct RouteFeatureData {
    pub route: Arc<Route>,
    pub features: FeatureCollection,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteFeatureData {
    /// Build the line feature of a route
    ///
    /// A route without geometry yields an empty collection and a warning.
    pub fn from_route(route: Arc<Route>) -> Self {
        let geometry = route.flattened_geometry();
        if geometry.len() < 2 {
            tracing::warn!(
                route_id = %route.id,
                points = geometry.len(),
                "Route has no drawable geometry, using an empty feature collection"
            );
            return Self {
                route,
                features: FeatureCollection::empty(),
            };
        }

        let feature = Feature::new(LineString::new(geometry))
            .with_id(route.id.clone())
            .with_property(ROUTE_ID_PROPERTY, route.id.clone());
        Self {
            route,
            features: FeatureCollection::new(vec![feature]),
        }
    }
}

/// Origin and leg destination points of a route
pub fn waypoint_collection(route: &Route) -> FeatureCollection {
    let features = route
        .waypoints()
        .into_iter()
        .enumerate()
        .map(|(index, coord)| {
            let kind = if index == 0 {
                WAYPOINT_ORIGIN
            } else {
                WAYPOINT_DESTINATION
            };
            Feature::new(Point::from(coord))
                .with_id(format!("{}-waypoint-{index}", route.id))
                .with_property(WAYPOINT_PROPERTY, kind)
                .with_property(ROUTE_ID_PROPERTY, route.id.clone())
        })
        .collect();
    FeatureCollection::new(features)
}

/// Line features covering the restricted sections of a route
pub fn restricted_collection(route: &Route) -> FeatureCollection {
    let mut features = Vec::new();
    for (leg_index, leg) in route.legs.iter().enumerate() {
        if leg.restricted.is_empty() {
            continue;
        }
        let geometry = leg.geometry();
        for range in &leg.restricted {
            let Some(points) = geometry.get(*range.start()..=*range.end()) else {
                tracing::warn!(
                    route_id = %route.id,
                    leg_index,
                    ?range,
                    "Restricted section is outside the leg geometry"
                );
                continue;
            };
            if points.len() < 2 {
                continue;
            }
            features.push(
                Feature::new(LineString::new(points.to_vec()))
                    .with_property(ROUTE_ID_PROPERTY, route.id.clone())
                    .with_property("leg_index", leg_index as f64),
            );
        }
    }
    FeatureCollection::new(features)
}
