//! Styling and threshold configuration
//!
//! Supplied once when building a [`crate::RouteLineApi`] and never mutated afterwards.
//! [`RouteLineConfig::validate`] rejects combinations that are programming errors.

use crate::{Color, Congestion, Result, RouteLineError};
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Colors for one kind of route line, keyed by congestion
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CongestionColors {
    pub low: Color,
    pub moderate: Color,
    pub heavy: Color,
    pub severe: Color,
    pub unknown: Color,
    pub closure: Color,
    pub restricted: Color,
    /// Line color where traffic is not shown
    pub default: Color,
    pub casing: Color,
}

impl CongestionColors {
    pub fn for_congestion(&self, congestion: Congestion) -> Color {
        match congestion {
            Congestion::Low => self.low,
            Congestion::Moderate => self.moderate,
            Congestion::Heavy => self.heavy,
            Congestion::Severe => self.severe,
            Congestion::Unknown => self.unknown,
            Congestion::Closure => self.closure,
            Congestion::Restricted => self.restricted,
        }
    }
}

/// All colors used by the route line
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RouteLineColors {
    pub primary: CongestionColors,
    pub alternative: CongestionColors,
    /// Color of the line behind the vanishing point
    pub traveled: Color,
    pub traveled_casing: Color,
    /// Color for legs other than the one being traveled
    pub inactive_legs: Color,
}

impl RouteLineColors {
    /// Color lookup handed to the traffic segmenter
    pub fn congestion_color(&self, congestion: Congestion, is_primary: bool) -> Color {
        if is_primary {
            self.primary.for_congestion(congestion)
        } else {
            self.alternative.for_congestion(congestion)
        }
    }
}

impl Default for RouteLineColors {
    fn default() -> Self {
        const BLUE: Color = Color::rgb(0x56, 0xA8, 0xFB);
        const GRAY: Color = Color::rgb(0x86, 0x94, 0xA5);
        Self {
            primary: CongestionColors {
                low: BLUE,
                moderate: Color::rgb(0xFF, 0x95, 0x00),
                heavy: Color::rgb(0xFF, 0x4D, 0x4D),
                severe: Color::rgb(0x8F, 0x24, 0x47),
                unknown: BLUE,
                closure: Color::rgb(0x33, 0x33, 0x33),
                restricted: Color::BLACK,
                default: BLUE,
                casing: Color::rgb(0x2F, 0x7A, 0xC6),
            },
            alternative: CongestionColors {
                low: GRAY,
                moderate: Color::rgb(0xBE, 0xA0, 0x87),
                heavy: Color::rgb(0xB5, 0x82, 0x8F),
                severe: Color::rgb(0xB5, 0x82, 0x8F),
                unknown: GRAY,
                closure: Color::rgb(0x33, 0x33, 0x33),
                restricted: Color::rgb(0x33, 0x33, 0x33),
                default: GRAY,
                casing: Color::rgb(0x72, 0x7E, 0x8D),
            },
            traveled: Color::TRANSPARENT,
            traveled_casing: Color::TRANSPARENT,
            inactive_legs: Color::TRANSPARENT,
        }
    }
}

/// Numeric congestion (0..=100) ranges mapped onto categories
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CongestionRanges {
    pub low: RangeInclusive<u8>,
    pub moderate: RangeInclusive<u8>,
    pub heavy: RangeInclusive<u8>,
    pub severe: RangeInclusive<u8>,
}

impl Default for CongestionRanges {
    fn default() -> Self {
        Self {
            low: 0..=39,
            moderate: 40..=59,
            heavy: 60..=79,
            severe: 80..=100,
        }
    }
}

impl CongestionRanges {
    /// Category for a numeric value; values outside every range are `Unknown`
    pub fn resolve(&self, value: u8) -> Congestion {
        if self.low.contains(&value) {
            Congestion::Low
        } else if self.moderate.contains(&value) {
            Congestion::Moderate
        } else if self.heavy.contains(&value) {
            Congestion::Heavy
        } else if self.severe.contains(&value) {
            Congestion::Severe
        } else {
            Congestion::Unknown
        }
    }

    fn validate(&self) -> Result<()> {
        let ranges = [
            ("low", &self.low),
            ("moderate", &self.moderate),
            ("heavy", &self.heavy),
            ("severe", &self.severe),
        ];
        for (name, range) in ranges {
            if range.is_empty() || *range.end() > 100 {
                return Err(RouteLineError::InvalidConfig(format!(
                    "{name} congestion range {range:?} must be non-empty and within 0..=100"
                )));
            }
        }
        for (i, (name_a, a)) in ranges.iter().enumerate() {
            for (name_b, b) in &ranges[i + 1..] {
                if a.start() <= b.end() && b.start() <= a.end() {
                    return Err(RouteLineError::InvalidConfig(format!(
                        "congestion ranges {name_a} {a:?} and {name_b} {b:?} overlap"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A zoom level and the line width scale used at it
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScaleStop {
    pub zoom: f64,
    pub multiplier: f64,
    pub scale: f64,
}

impl ScaleStop {
    pub const fn new(zoom: f64, scale: f64) -> Self {
        Self {
            zoom,
            multiplier: 1.0,
            scale,
        }
    }
}

/// Renderer layer ids queried when resolving a tapped route
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerIds {
    pub primary: Vec<String>,
    pub alternatives: Vec<String>,
}

impl Default for LayerIds {
    fn default() -> Self {
        Self {
            primary: vec![
                "route-line-primary-traffic".into(),
                "route-line-primary".into(),
                "route-line-primary-casing".into(),
            ],
            alternatives: vec![
                "route-line-alternative-1".into(),
                "route-line-alternative-1-casing".into(),
                "route-line-alternative-2".into(),
                "route-line-alternative-2-casing".into(),
            ],
        }
    }
}

/// Configuration for the route line
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RouteLineConfig {
    pub colors: RouteLineColors,
    pub congestion_ranges: CongestionRanges,
    /// Road classes whose unknown congestion is shown as low
    pub low_congestion_road_classes: HashSet<String>,
    /// Width stops of the route line
    pub route_scale: Vec<ScaleStop>,
    /// Width stops of the casing line
    pub casing_scale: Vec<ScaleStop>,
    /// Width stops of the traffic line
    pub traffic_scale: Vec<ScaleStop>,
    /// Whether the traveled part of the primary line is recolored
    pub vanishing_route_line_enabled: bool,
    /// Positions farther than this from the line window are rejected (meters)
    pub max_jump_meters: f64,
    /// Progress older than this stops offset updates
    pub staleness_threshold: Duration,
    /// Minimum time between two accepted position updates
    pub vanishing_update_interval: Duration,
    /// Length of the color transition between traffic segments in meters, `None` for hard steps
    pub soft_gradient_transition: Option<f64>,
    /// Whether restricted road sections get their own overlay
    pub display_restricted_roads: bool,
    /// Draw legs other than the current one with `colors.inactive_legs`
    pub style_inactive_legs_independently: bool,
    pub layer_ids: LayerIds,
    /// Number of alternative route slots
    pub max_alternatives: usize,
}

impl Default for RouteLineConfig {
    fn default() -> Self {
        Self {
            colors: RouteLineColors::default(),
            congestion_ranges: CongestionRanges::default(),
            low_congestion_road_classes: HashSet::new(),
            route_scale: vec![
                ScaleStop::new(4.0, 3.0),
                ScaleStop::new(10.0, 4.0),
                ScaleStop::new(13.0, 6.0),
                ScaleStop::new(16.0, 10.0),
                ScaleStop::new(19.0, 14.0),
                ScaleStop::new(22.0, 18.0),
            ],
            casing_scale: vec![
                ScaleStop::new(10.0, 7.0),
                ScaleStop::new(14.0, 10.5),
                ScaleStop::new(16.5, 15.5),
                ScaleStop::new(19.0, 24.0),
                ScaleStop::new(22.0, 29.0),
            ],
            traffic_scale: vec![
                ScaleStop::new(4.0, 3.0),
                ScaleStop::new(10.0, 4.0),
                ScaleStop::new(13.0, 6.0),
                ScaleStop::new(16.0, 10.0),
                ScaleStop::new(19.0, 14.0),
                ScaleStop::new(22.0, 18.0),
            ],
            vanishing_route_line_enabled: true,
            max_jump_meters: 3.0,
            staleness_threshold: Duration::from_millis(1500),
            vanishing_update_interval: Duration::ZERO,
            soft_gradient_transition: None,
            display_restricted_roads: true,
            style_inactive_legs_independently: false,
            layer_ids: LayerIds::default(),
            max_alternatives: 2,
        }
    }
}

impl RouteLineConfig {
    /// Check the configuration for programming errors
    pub fn validate(&self) -> Result<()> {
        for (name, stops) in [
            ("route_scale", &self.route_scale),
            ("casing_scale", &self.casing_scale),
            ("traffic_scale", &self.traffic_scale),
        ] {
            if stops.is_empty() {
                return Err(RouteLineError::InvalidConfig(format!(
                    "{name} needs at least one stop"
                )));
            }
            if stops.windows(2).any(|pair| pair[0].zoom >= pair[1].zoom) {
                return Err(RouteLineError::InvalidConfig(format!(
                    "{name} zoom levels must be strictly increasing"
                )));
            }
        }
        if !(self.max_jump_meters.is_finite() && self.max_jump_meters >= 0.0) {
            return Err(RouteLineError::InvalidConfig(format!(
                "max_jump_meters must be a non-negative number, got {}",
                self.max_jump_meters
            )));
        }
        if let Some(meters) = self
            .soft_gradient_transition
            .filter(|meters| !(meters.is_finite() && *meters > 0.0))
        {
            return Err(RouteLineError::InvalidConfig(format!(
                "soft_gradient_transition must be positive, got {meters}"
            )));
        }
        if self.layer_ids.primary.is_empty() {
            return Err(RouteLineError::InvalidConfig(
                "at least one primary layer id is required".into(),
            ));
        }
        self.congestion_ranges.validate()
    }
}
