//! Position quantization against an axis-aligned bounding box.
//!
//! Positions are stored as `u16` per axis, scaled so that `0` maps to the
//! axis minimum and `65535` to the axis maximum. Decoding divides by the
//! maximum representable value (`q / 65535`), which keeps parity with assets
//! written by the exporter.

use glam::DVec3;

/// Largest quantized position value.
pub const POSITION_SCALE: f64 = 65_535.0;

/// Axis-aligned bounds used as the quantization domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: DVec3,
    pub max: DVec3,
}

impl Bounds {
    /// Create bounds from minimum and maximum corners.
    #[must_use]
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Extent per axis (`max - min`).
    #[must_use]
    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Largest extent over all three axes.
    #[must_use]
    pub fn largest_extent(&self) -> f64 {
        self.size().max_element()
    }

    /// Per-axis dequantization scale. Degenerate axes get a scale of zero.
    #[must_use]
    pub fn scale(&self) -> DVec3 {
        let size = self.size();
        DVec3::new(
            axis_scale(size.x),
            axis_scale(size.y),
            axis_scale(size.z),
        )
    }

    /// Maximum absolute error introduced by quantizing a position.
    #[must_use]
    pub fn quantization_error(&self) -> DVec3 {
        self.size() / POSITION_SCALE
    }

    /// Dequantize a packed position.
    #[must_use]
    pub fn decode(&self, q: [u16; 3]) -> DVec3 {
        DVec3::new(
            dequantize_axis(q[0], self.min.x, self.max.x),
            dequantize_axis(q[1], self.min.y, self.max.y),
            dequantize_axis(q[2], self.min.z, self.max.z),
        )
    }

    /// Quantize a position, clamping values outside the box.
    #[must_use]
    pub fn encode(&self, p: DVec3) -> [u16; 3] {
        [
            quantize_axis(p.x, self.min.x, self.max.x),
            quantize_axis(p.y, self.min.y, self.max.y),
            quantize_axis(p.z, self.min.z, self.max.z),
        ]
    }
}

fn axis_scale(size: f64) -> f64 {
    if size > 0.0 { size / POSITION_SCALE } else { 0.0 }
}

/// Decode a single quantized coordinate: `min + (q / 65535) * (max - min)`.
///
/// A degenerate axis (`max <= min`) collapses every value onto `min`.
#[must_use]
pub fn dequantize_axis(q: u16, min: f64, max: f64) -> f64 {
    min + f64::from(q) * axis_scale(max - min)
}

/// Quantize a coordinate the way the exporter does:
/// `floor((v - min) / (max - min) * 65535)`, clamped to the `u16` range.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantize_axis(value: f64, min: f64, max: f64) -> u16 {
    let size = max - min;
    if size <= 0.0 || !value.is_finite() {
        return 0;
    }
    let scaled = ((value - min) / size * POSITION_SCALE).floor();
    scaled.clamp(0.0, POSITION_SCALE) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_dequantize_endpoints() {
        assert!((dequantize_axis(0, -2.0, 6.0) - -2.0).abs() < 1e-12);
        assert!((dequantize_axis(u16::MAX, -2.0, 6.0) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_dequantize_uses_full_scale() {
        // q / 65535, not q / 65536.
        let mid = dequantize_axis(32768, 0.0, 65535.0);
        assert!((mid - 32768.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_axis_collapses_to_min() {
        let bounds = Bounds::new(DVec3::new(1.5, 0.0, 0.0), DVec3::new(1.5, 1.0, 1.0));
        assert_eq!(bounds.scale().x, 0.0);

        for q in [0, 1, 1000, u16::MAX] {
            let p = bounds.decode([q, 0, 0]);
            assert_eq!(p.x, 1.5);
            assert!(p.x.is_finite());
        }
        assert_eq!(bounds.encode(DVec3::new(1.5, 0.0, 0.0))[0], 0);
    }

    #[test]
    fn test_quantize_clamps_outside_values() {
        assert_eq!(quantize_axis(-10.0, 0.0, 1.0), 0);
        assert_eq!(quantize_axis(10.0, 0.0, 1.0), u16::MAX);
        assert_eq!(quantize_axis(f64::NAN, 0.0, 1.0), 0);
    }

    #[test]
    fn test_bounds_helpers() {
        let bounds = Bounds::new(DVec3::new(-1.0, 0.0, 2.0), DVec3::new(1.0, 4.0, 3.0));
        assert_eq!(bounds.size(), DVec3::new(2.0, 4.0, 1.0));
        assert_eq!(bounds.center(), DVec3::new(0.0, 2.0, 2.5));
        assert!((bounds.largest_extent() - 4.0).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn prop_round_trip_within_one_step(
            min in -1000.0f64..1000.0,
            size in 0.001f64..500.0,
            t in 0.0f64..=1.0,
        ) {
            let max = min + size;
            let value = min + t * size;
            let decoded = dequantize_axis(quantize_axis(value, min, max), min, max);
            let tolerance = size / POSITION_SCALE;
            prop_assert!((decoded - value).abs() <= tolerance + 1e-9);
        }

        #[test]
        fn prop_bounds_round_trip(
            x in 0.0f64..=1.0,
            y in 0.0f64..=1.0,
            z in 0.0f64..=1.0,
        ) {
            let bounds = Bounds::new(
                DVec3::new(-0.495_867, 0.172_747, -0.324_017),
                DVec3::new(0.319_489, 0.980_953, 0.307_919),
            );
            let p = bounds.min + bounds.size() * DVec3::new(x, y, z);
            let error = (bounds.decode(bounds.encode(p)) - p).abs();
            let tolerance = bounds.quantization_error() + DVec3::splat(1e-12);
            prop_assert!(error.cmple(tolerance).all());
        }
    }
}
