//! Scale handling
//!
//! Converts a requested text height in millimetres into the factor applied to
//! native font units. The font is drawn on an 18-unit em, so a height of 18
//! plots glyphs at their native size.

use crate::error::LayoutError;
use std::fmt;

/// Height of the stroke font em in native units
pub const NATIVE_FONT_HEIGHT: i32 = 18;

/// A validated text height in millimetres
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextHeight(i32);

impl TextHeight {
    /// Smallest accepted height
    pub const MIN: i32 = 4;
    /// Largest accepted height
    pub const MAX: i32 = 10;

    /// Validate a requested height
    pub fn new(height: i32) -> Result<Self, LayoutError> {
        if !(Self::MIN..=Self::MAX).contains(&height) {
            return Err(LayoutError::HeightOutOfRange {
                height,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        Ok(Self(height))
    }

    /// Height in millimetres
    pub fn millimetres(self) -> i32 {
        self.0
    }

    /// Scale for this height
    pub fn scale(self) -> Scale {
        Scale::from_height(self.0)
    }
}

impl fmt::Display for TextHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}mm", self.0)
    }
}

/// Ratio between device units and native font units
///
/// Stored as the exact fraction `height / 18`. Applying it multiplies first
/// and divides last, so the result is `trunc(value * scale)` with no binary
/// floating-point error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    height: i32,
}

impl Scale {
    /// Scale for an arbitrary height, unvalidated
    pub fn from_height(height: i32) -> Self {
        Self { height }
    }

    /// The unit scale (native font size)
    pub fn identity() -> Self {
        Self::from_height(NATIVE_FONT_HEIGHT)
    }

    /// Scale `value` native units to device units, truncating toward zero
    pub fn apply(self, value: i32) -> i32 {
        let scaled = i64::from(value) * i64::from(self.height) / i64::from(NATIVE_FONT_HEIGHT);
        scaled.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    /// Scale as a floating-point factor
    pub fn factor(self) -> f64 {
        f64::from(self.height) / f64::from(NATIVE_FONT_HEIGHT)
    }
}

impl Default for Scale {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.factor())
    }
}
