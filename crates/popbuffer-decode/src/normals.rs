//! Normal vector unpacking.
//!
//! Normals are stored as two unsigned components of an octahedral
//! projection. Each component first maps back onto `[-1, 1]` with
//! `(q / max_quant - 0.5) * 2`, then the octahedron is unfolded to recover
//! the third component without a cross product.

use glam::{Vec2, Vec3};

/// Largest value of an 8-bit normal component.
pub const NORMAL_SCALE_U8: u32 = 255;

/// Largest value of a 16-bit normal component.
pub const NORMAL_SCALE_U16: u32 = 65_535;

/// Decode one quantized normal component onto `[-1, 1]`.
///
/// The divisor is the largest representable value (`255` for 8-bit,
/// `65535` for 16-bit), never `max_quant - 1`. A `max_quant` of zero yields
/// `-1.0` rather than dividing by zero.
#[must_use]
pub fn dequantize_normal_component(q: u32, max_quant: u32) -> f64 {
    if max_quant == 0 {
        return -1.0;
    }
    (f64::from(q) / f64::from(max_quant) - 0.5) * 2.0
}

/// Encode a component in `[-1, 1]` into `[0, max_quant]`, matching the
/// exporter's `floor((c * 0.5 + 0.5) * max_quant)` rule.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantize_normal_component(c: f64, max_quant: u32) -> u32 {
    let unit = (c * 0.5 + 0.5).clamp(0.0, 1.0);
    (unit * f64::from(max_quant)).floor() as u32
}

/// Unfold an octahedral projection in `[-1, 1]²` onto the unit sphere.
#[must_use]
pub fn octahedral_decode(e: Vec2) -> Vec3 {
    let z = 1.0 - e.x.abs() - e.y.abs();
    let (x, y) = if z < 0.0 {
        (
            (1.0 - e.y.abs()) * sign_not_zero(e.x),
            (1.0 - e.x.abs()) * sign_not_zero(e.y),
        )
    } else {
        (e.x, e.y)
    };
    Vec3::new(x, y, z).normalize_or_zero()
}

/// Project a unit normal onto the octahedron, returning `[-1, 1]²`.
#[must_use]
pub fn octahedral_encode(n: Vec3) -> Vec2 {
    let sum = n.x.abs() + n.y.abs() + n.z.abs();
    if sum == 0.0 {
        return Vec2::ZERO;
    }
    let x = n.x / sum;
    let y = n.y / sum;
    if n.z < 0.0 {
        Vec2::new(
            (1.0 - y.abs()) * sign_not_zero(x),
            (1.0 - x.abs()) * sign_not_zero(y),
        )
    } else {
        Vec2::new(x, y)
    }
}

/// Decode a pair of 8-bit octahedral components into a unit normal.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn unpack_normal(u: u8, v: u8) -> Vec3 {
    let e = Vec2::new(
        dequantize_normal_component(u32::from(u), NORMAL_SCALE_U8) as f32,
        dequantize_normal_component(u32::from(v), NORMAL_SCALE_U8) as f32,
    );
    octahedral_decode(e)
}

/// Encode a unit normal into a pair of 8-bit octahedral components.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn pack_normal(n: Vec3) -> (u8, u8) {
    let e = octahedral_encode(n);
    (
        quantize_normal_component(f64::from(e.x), NORMAL_SCALE_U8) as u8,
        quantize_normal_component(f64::from(e.y), NORMAL_SCALE_U8) as u8,
    )
}

fn sign_not_zero(v: f32) -> f32 {
    if v >= 0.0 { 1.0 } else { -1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_component_endpoints() {
        assert!((dequantize_normal_component(0, NORMAL_SCALE_U8) + 1.0).abs() < 1e-12);
        assert!((dequantize_normal_component(255, NORMAL_SCALE_U8) - 1.0).abs() < 1e-12);
        assert!((dequantize_normal_component(65535, NORMAL_SCALE_U16) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_component_divides_by_max_value() {
        // 51 / 255 = 0.2, so (0.2 - 0.5) * 2 = -0.6.
        let c = dequantize_normal_component(51, NORMAL_SCALE_U8);
        assert!((c + 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_zero_scale_is_finite() {
        assert!(dequantize_normal_component(10, 0).is_finite());
    }

    #[test]
    fn test_octahedral_axes() {
        let cases = [
            (Vec3::X, Vec3::X),
            (Vec3::NEG_X, Vec3::NEG_X),
            (Vec3::Y, Vec3::Y),
            (Vec3::Z, Vec3::Z),
            (Vec3::NEG_Z, Vec3::NEG_Z),
        ];
        for (input, expected) in cases {
            let decoded = octahedral_decode(octahedral_encode(input));
            assert!(
                decoded.distance(expected) < 1e-5,
                "{input:?} decoded to {decoded:?}"
            );
        }
    }

    #[test]
    fn test_unpack_normal_is_unit_length() {
        for (u, v) in [(0, 0), (127, 127), (255, 0), (12, 200), (255, 255)] {
            let n = unpack_normal(u, v);
            assert!((n.length() - 1.0).abs() < 1e-5, "({u}, {v}) -> {n:?}");
        }
    }

    #[test]
    fn test_center_decodes_to_positive_z() {
        // The center of the octahedron map is the +Z pole.
        let n = octahedral_decode(Vec2::ZERO);
        assert!(n.distance(Vec3::Z) < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_pack_unpack_stays_close(
            x in -1.0f32..1.0,
            y in -1.0f32..1.0,
            z in -1.0f32..1.0,
        ) {
            let n = Vec3::new(x, y, z);
            prop_assume!(n.length() > 0.1);
            let n = n.normalize();
            let (u, v) = pack_normal(n);
            let decoded = unpack_normal(u, v);
            // 8-bit octahedral encoding is accurate to a few degrees.
            prop_assert!(decoded.dot(n) > 0.99, "{:?} -> {:?}", n, decoded);
        }
    }
}
