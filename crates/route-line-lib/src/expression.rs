//! Color and width expressions for the route line layers
//!
//! Color expressions are functions of line progress in [0, 1]. Every builder here returns
//! an expression that is defined over the whole range: step expressions carry a default
//! below their first stop, and interpolations clamp to their end stops.

use crate::traffic::{ExpressionSegment, RestrictedSection, merge_restricted_sections};
use crate::{Color, Congestion, Result, RouteLineError, ScaleStop};

/// Stop gap inserted right before the vanishing point in gradient expressions
pub const VANISH_POINT_STOP_GAP: f64 = 1e-11;

/// Exponential base used when scaling line width with zoom
pub const WIDTH_INTERPOLATION_BASE: f64 = 1.5;

/// A renderer style expression
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// `default` below the first stop, then the color of the last stop reached
    Step {
        default: Color,
        stops: Vec<(f64, Color)>,
    },
    /// Linear color interpolation over line progress
    Interpolate { stops: Vec<(f64, Color)> },
    Constant(Color),
    /// Exponential interpolation of `scale * multiplier` over zoom
    ZoomScale { base: f64, stops: Vec<ScaleStop> },
}

impl Expression {
    /// Evaluate a color expression at `progress`; `None` for width expressions
    pub fn color_at(&self, progress: f64) -> Option<Color> {
        match self {
            Expression::Constant(color) => Some(*color),
            Expression::Step { default, stops } => Some(
                stops
                    .iter()
                    .take_while(|(offset, _)| progress >= *offset)
                    .last()
                    .map_or(*default, |(_, color)| *color),
            ),
            Expression::Interpolate { stops } => {
                let (first, last) = (stops.first()?, stops.last()?);
                if progress <= first.0 {
                    return Some(first.1);
                }
                if progress >= last.0 {
                    return Some(last.1);
                }
                stops.windows(2).find_map(|pair| {
                    let ((a, from), (b, to)) = (pair[0], pair[1]);
                    (progress >= a && progress <= b)
                        .then(|| lerp_color(from, to, (progress - a) / (b - a)))
                })
            }
            Expression::ZoomScale { .. } => None,
        }
    }

    /// Evaluate a width expression at `zoom`; `None` for color expressions
    pub fn width_at(&self, zoom: f64) -> Option<f64> {
        let Expression::ZoomScale { base, stops } = self else {
            return None;
        };
        let value = |stop: &ScaleStop| stop.scale * stop.multiplier;
        let (first, last) = (stops.first()?, stops.last()?);
        if zoom <= first.zoom {
            return Some(value(first));
        }
        if zoom >= last.zoom {
            return Some(value(last));
        }
        stops.windows(2).find_map(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            (zoom >= a.zoom && zoom <= b.zoom).then(|| {
                let t = if (*base - 1.0).abs() < f64::EPSILON {
                    (zoom - a.zoom) / (b.zoom - a.zoom)
                } else {
                    (base.powf(zoom - a.zoom) - 1.0) / (base.powf(b.zoom - a.zoom) - 1.0)
                };
                value(a) + t * (value(b) - value(a))
            })
        })
    }

    /// Stop offsets of a color expression
    pub fn stop_offsets(&self) -> Vec<f64> {
        match self {
            Expression::Step { stops, .. } | Expression::Interpolate { stops } => {
                stops.iter().map(|(offset, _)| *offset).collect()
            }
            Expression::ZoomScale { stops, .. } => stops.iter().map(|s| s.zoom).collect(),
            Expression::Constant(_) => Vec::new(),
        }
    }

    /// Render as the JSON array form style expressions use
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{Value, json};
        let color = |c: &Color| Value::String(c.to_string());
        match self {
            Expression::Constant(c) => color(c),
            Expression::Step { default, stops } => {
                let mut out = vec![json!("step"), json!(["line-progress"]), color(default)];
                for (offset, c) in stops {
                    out.push(json!(offset));
                    out.push(color(c));
                }
                Value::Array(out)
            }
            Expression::Interpolate { stops } => {
                let mut out = vec![
                    json!("interpolate"),
                    json!(["linear"]),
                    json!(["line-progress"]),
                ];
                for (offset, c) in stops {
                    out.push(json!(offset));
                    out.push(color(c));
                }
                Value::Array(out)
            }
            Expression::ZoomScale { base, stops } => {
                let mut out = vec![
                    json!("interpolate"),
                    json!(["exponential", base]),
                    json!(["zoom"]),
                ];
                for stop in stops {
                    out.push(json!(stop.zoom));
                    out.push(json!(["*", stop.multiplier, stop.scale]));
                }
                Value::Array(out)
            }
        }
    }
}

fn lerp_color(from: Color, to: Color, t: f64) -> Color {
    let channel = |a: u8, b: u8| (f64::from(a) + (f64::from(b) - f64::from(a)) * t).round() as u8;
    Color::rgba(
        channel(from.r, to.r),
        channel(from.g, to.g),
        channel(from.b, to.b),
        channel(from.a, to.a),
    )
}

/// Segments visible from `offset` on, led by one filler segment placed exactly at `offset`
///
/// The filler takes the color of the last segment at or before the cut, or `fallback` when
/// no segment starts that early. Of segments sharing an offset the last one wins.
pub(crate) fn filter_after_cut(
    offset: f64,
    segments: &[ExpressionSegment],
    fallback: Color,
) -> Vec<ExpressionSegment> {
    let filler = segments
        .iter()
        .take_while(|segment| segment.offset <= offset)
        .last()
        .map(|segment| ExpressionSegment { offset, ..*segment })
        .unwrap_or_else(|| ExpressionSegment::new(offset, fallback, Congestion::Unknown, 0));

    let mut filtered = Vec::with_capacity(segments.len() + 1);
    filtered.push(filler);
    for segment in segments.iter().filter(|segment| segment.offset > offset) {
        match filtered.last_mut() {
            Some(last) if last.offset == segment.offset => *last = *segment,
            _ => filtered.push(*segment),
        }
    }
    filtered
}

/// Traffic line: transparent behind `offset`, traffic colors from `offset` on
pub fn traffic_expression(offset: f64, segments: &[ExpressionSegment], fallback: Color) -> Expression {
    let mut stops: Vec<(f64, Color)> = Vec::with_capacity(segments.len() + 1);
    for segment in filter_after_cut(offset, segments, fallback) {
        push_distinct(&mut stops, segment.offset, segment.color);
    }
    Expression::Step {
        default: Color::TRANSPARENT,
        stops,
    }
}

/// Two-stop line: `traveled` below `offset`, `base` at and above it
pub fn vanishing_expression(offset: f64, traveled: Color, base: Color) -> Expression {
    Expression::Step {
        default: traveled,
        stops: vec![(offset, base)],
    }
}

/// Base line that dims legs other than `active_leg`
///
/// With `active_leg` set to `None` this is equivalent to [`vanishing_expression`].
pub fn route_line_expression(
    offset: f64,
    segments: &[ExpressionSegment],
    traveled: Color,
    default: Color,
    inactive: Color,
    active_leg: Option<usize>,
) -> Expression {
    let mut stops: Vec<(f64, Color)> = Vec::new();
    for segment in filter_after_cut(offset, segments, default) {
        let color = match active_leg {
            Some(active) if segment.leg_index != active => inactive,
            _ => default,
        };
        push_distinct(&mut stops, segment.offset, color);
    }
    Expression::Step {
        default: traveled,
        stops,
    }
}

/// Traffic line with short linear transitions between congestion colors
///
/// An extra stop is placed `stop_gap` before each color change so that the gradient
/// spans about the same length regardless of route distance.
pub fn soft_gradient_traffic_expression(
    offset: f64,
    segments: &[ExpressionSegment],
    fallback: Color,
    stop_gap: f64,
) -> Expression {
    let filtered = filter_after_cut(offset, segments, fallback);
    let mut stops: Vec<(f64, Color)> = Vec::with_capacity(filtered.len() * 2 + 2);

    for (index, segment) in filtered.iter().enumerate() {
        if index == 0 {
            if segment.offset > 0.0 {
                push_increasing(&mut stops, 0.0, Color::TRANSPARENT);
                if segment.offset > VANISH_POINT_STOP_GAP {
                    push_increasing(
                        &mut stops,
                        segment.offset - VANISH_POINT_STOP_GAP,
                        Color::TRANSPARENT,
                    );
                }
            }
        } else {
            let previous = &filtered[index - 1];
            let gap_offset = if segment.offset - stop_gap > previous.offset {
                segment.offset - stop_gap
            } else {
                previous.offset + VANISH_POINT_STOP_GAP
            };
            if gap_offset < segment.offset {
                push_increasing(&mut stops, gap_offset, previous.color);
            }
        }
        push_increasing(&mut stops, segment.offset, segment.color);
    }

    Expression::Interpolate { stops }
}

/// Overlay coloring restricted sections at and after `offset`
///
/// Sections may come in any order and may overlap. Sections on legs other than
/// `active_leg` stay transparent when a leg is given.
pub fn restricted_expression(
    offset: f64,
    sections: &[RestrictedSection],
    restricted_color: Color,
    active_leg: Option<usize>,
) -> Expression {
    let sections = merge_restricted_sections(sections.to_vec());
    let mut boundaries: Vec<ExpressionSegment> = Vec::with_capacity(sections.len() * 2 + 1);
    boundaries.push(ExpressionSegment::new(
        0.0,
        Color::TRANSPARENT,
        Congestion::Unknown,
        sections.first().map_or(0, |s| s.leg_index),
    ));
    for section in &sections {
        boundaries.push(ExpressionSegment::new(
            section.start,
            restricted_color,
            Congestion::Restricted,
            section.leg_index,
        ));
        boundaries.push(ExpressionSegment::new(
            section.end,
            Color::TRANSPARENT,
            Congestion::Unknown,
            section.leg_index,
        ));
    }

    let mut stops: Vec<(f64, Color)> = Vec::new();
    for boundary in filter_after_cut(offset, &boundaries, Color::TRANSPARENT) {
        let color = match active_leg {
            Some(active) if boundary.leg_index != active => Color::TRANSPARENT,
            _ => boundary.color,
        };
        push_distinct(&mut stops, boundary.offset, color);
    }
    Expression::Step {
        default: Color::TRANSPARENT,
        stops,
    }
}

/// Line width interpolated exponentially over zoom
pub fn line_width_expression(stops: &[ScaleStop]) -> Result<Expression> {
    if stops.is_empty() {
        return Err(RouteLineError::InvalidConfig(
            "line width needs at least one scale stop".into(),
        ));
    }
    Ok(Expression::ZoomScale {
        base: WIDTH_INTERPOLATION_BASE,
        stops: stops.to_vec(),
    })
}

/// Append a step stop unless it repeats the previous color
fn push_distinct(stops: &mut Vec<(f64, Color)>, offset: f64, color: Color) {
    if stops.last().is_some_and(|(_, last)| *last == color) {
        return;
    }
    stops.push((offset, color));
}

/// Append an interpolation stop only if it keeps offsets strictly increasing
fn push_increasing(stops: &mut Vec<(f64, Color)>, offset: f64, color: Color) {
    if stops.last().is_some_and(|(last, _)| *last >= offset) {
        return;
    }
    stops.push((offset, color));
}
