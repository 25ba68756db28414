//! Sheet-music annotation constants, drawing tools, and validation.
//!
//! Shared by the persistence adapter (field validation), the HTTP handlers,
//! and the realtime router (turning completed strokes into SVG paths).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Stroke color used when an annotation does not carry one.
pub const DEFAULT_COLOR: &str = "#000000";

/// Decimal places kept when rendering stroke points into path data.
const POINT_PRECISION: usize = 2;

// ---------------------------------------------------------------------------
// Drawing tool types
// ---------------------------------------------------------------------------

/// Drawing tools an annotation can be authored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationTool {
    Pen,
    Highlighter,
    Eraser,
    Text,
    Shape,
}

/// All valid tool strings, in declaration order.
pub const VALID_TOOL_STRINGS: &[&str] = &["pen", "highlighter", "eraser", "text", "shape"];

impl AnnotationTool {
    /// Return the tool as a lowercase string slice.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pen => "pen",
            Self::Highlighter => "highlighter",
            Self::Eraser => "eraser",
            Self::Text => "text",
            Self::Shape => "shape",
        }
    }
}

impl FromStr for AnnotationTool {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pen" => Ok(Self::Pen),
            "highlighter" => Ok(Self::Highlighter),
            "eraser" => Ok(Self::Eraser),
            "text" => Ok(Self::Text),
            "shape" => Ok(Self::Shape),
            _ => Err(CoreError::Validation(format!(
                "Invalid annotation tool '{s}'. Must be one of: {}",
                VALID_TOOL_STRINGS.join(", ")
            ))),
        }
    }
}

/// Lets `sqlx` decode the `tool` TEXT column straight into the enum.
impl TryFrom<String> for AnnotationTool {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for AnnotationTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Validate that a required text field is present and not blank.
pub fn validate_required(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        return Err(CoreError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Validate that a stroke width is a finite, positive number.
pub fn validate_stroke_width(width: f64) -> Result<(), CoreError> {
    if !width.is_finite() {
        return Err(CoreError::Validation(
            "strokeWidth must be a finite number".to_string(),
        ));
    }
    if width <= 0.0 {
        return Err(CoreError::Validation(format!(
            "strokeWidth must be greater than 0, got {width}"
        )));
    }
    Ok(())
}

/// Validate that an opacity lies within `[0, 1]`.
pub fn validate_opacity(opacity: f64) -> Result<(), CoreError> {
    if !(0.0..=1.0).contains(&opacity) {
        return Err(CoreError::Validation(format!(
            "opacity must be between 0 and 1, got {opacity}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Stroke geometry
// ---------------------------------------------------------------------------

/// A single sampled point of a stroke, in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Render stroke points as SVG path data (`M x y L x y ...`).
///
/// Returns `None` for an empty stroke. A single point becomes a zero-length
/// segment so it still renders as a dot.
pub fn points_to_svg_path(points: &[Point]) -> Option<String> {
    let (first, rest) = points.split_first()?;

    let mut path = format!("M {} {}", fmt_coord(first.x), fmt_coord(first.y));
    if rest.is_empty() {
        path.push_str(&format!(" L {} {}", fmt_coord(first.x), fmt_coord(first.y)));
        return Some(path);
    }
    for point in rest {
        path.push_str(&format!(" L {} {}", fmt_coord(point.x), fmt_coord(point.y)));
    }
    Some(path)
}

/// Format a coordinate with fixed precision, dropping trailing zeros.
fn fmt_coord(value: f64) -> String {
    let formatted = format!("{:.*}", POINT_PRECISION, value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
