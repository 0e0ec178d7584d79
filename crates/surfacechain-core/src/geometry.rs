//! Surface geometry helpers.

use ash::vk;
use serde::{Deserialize, Serialize};

/// Size of a surface in logical (point) units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LogicalSize {
    /// Width in points
    pub width: f64,
    /// Height in points
    pub height: f64,
}

impl LogicalSize {
    /// Create a new logical size
    #[inline]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Scale both dimensions by a pixel factor
    #[inline]
    #[must_use]
    pub fn scaled(self, scale: f64) -> Self {
        Self {
            width: self.width * scale,
            height: self.height * scale,
        }
    }
}

/// Round to the nearest integer, ties to even.
///
/// Negative and NaN inputs saturate to 0, values past `u32::MAX` to `u32::MAX`.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn round_half_even(value: f64) -> u32 {
    value.round_ties_even() as u32
}

/// Pixel extent of a surface: logical bounds times the content scale, with
/// each dimension rounded half-to-even.
pub fn natural_extent(bounds: LogicalSize, scale: f64) -> vk::Extent2D {
    let pixels = bounds.scaled(scale);
    vk::Extent2D {
        width: round_half_even(pixels.width),
        height: round_half_even(pixels.height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ties_go_to_even() {
        assert_eq!(round_half_even(0.5), 0);
        assert_eq!(round_half_even(1.5), 2);
        assert_eq!(round_half_even(2.5), 2);
        assert_eq!(round_half_even(3.5), 4);
        assert_eq!(round_half_even(2.4999), 2);
        assert_eq!(round_half_even(2.5001), 3);
    }

    #[test]
    fn out_of_range_saturates() {
        assert_eq!(round_half_even(-3.0), 0);
        assert_eq!(round_half_even(f64::NAN), 0);
        assert_eq!(round_half_even(1e12), u32::MAX);
    }

    #[test]
    fn natural_extent_scales_then_rounds() {
        let extent = natural_extent(LogicalSize::new(800.0, 600.0), 2.0);
        assert_eq!(extent, vk::Extent2D { width: 1600, height: 1200 });

        // 100.25 * 2.0 = 200.5 -> 200, 101.25 * 2.0 = 202.5 -> 202
        let extent = natural_extent(LogicalSize::new(100.25, 101.25), 2.0);
        assert_eq!(extent, vk::Extent2D { width: 200, height: 202 });
    }

    #[test]
    fn scaled_size() {
        let size = LogicalSize::new(640.0, 480.0).scaled(1.5);
        assert_relative_eq!(size.width, 960.0);
        assert_relative_eq!(size.height, 720.0);
    }
}
