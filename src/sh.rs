//! L1 Spherical Harmonics for grid radiance
//!
//! Per-cell directional radiance is encoded in a first-order SH basis
//! (4 coefficients per color channel). L1 keeps propagation cheap while
//! still capturing the dominant flow direction of the light.
//!
//! Two projections are provided:
//! - **Directional**: project a plain directional sample (used when
//!   evaluating transported flux).
//! - **Clamped cosine lobe**: project a surfel that re-emits light over
//!   the hemisphere around its normal (used for injection and for
//!   re-emission through cell faces during propagation).
//!
//! Author: Moroya Sakamoto

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// L0 band constant: 1 / (2 * sqrt(pi))
pub const SH_C0: f32 = 0.282_095;
/// L1 band constant: sqrt(3) / (2 * sqrt(pi))
pub const SH_C1: f32 = 0.488_603;

/// Clamped cosine lobe L0 coefficient: sqrt(pi) / 2
pub const SH_COS_LOBE_C0: f32 = 0.886_227;
/// Clamped cosine lobe L1 coefficient: sqrt(pi / 3)
pub const SH_COS_LOBE_C1: f32 = 1.023_327;

/// Solid angle of one of the 4 side faces of a neighbor cell, as seen
/// from the center of the adjacent cell (steradians).
pub const SIDE_FACE_SOLID_ANGLE: f32 = 0.423_431_34;
/// Solid angle of the far face of a neighbor cell, as seen from the
/// center of the adjacent cell (steradians).
pub const DIRECT_FACE_SOLID_ANGLE: f32 = 0.400_669_66;

/// L1 Spherical Harmonics coefficients for one color channel
///
/// Coefficient order: [DC, X, Y, Z].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sh1 {
    /// Coefficients: [DC, X, Y, Z]
    pub coeffs: [f32; 4],
}

impl Sh1 {
    /// All-zero coefficients
    pub const ZERO: Sh1 = Sh1 { coeffs: [0.0; 4] };

    /// Evaluate SH in a direction
    ///
    /// The result is signed. Callers that need radiance clamp to zero.
    #[inline]
    pub fn evaluate(&self, dir: Vec3) -> f32 {
        let c = &self.coeffs;
        c[0] * SH_C0 + SH_C1 * (c[1] * dir.x + c[2] * dir.y + c[3] * dir.z)
    }

    /// Project a directional sample into SH
    #[inline]
    pub fn project(dir: Vec3, value: f32) -> Self {
        Sh1 {
            coeffs: [
                value * SH_C0,
                value * SH_C1 * dir.x,
                value * SH_C1 * dir.y,
                value * SH_C1 * dir.z,
            ],
        }
    }

    /// Project a clamped cosine lobe oriented along `dir` into SH
    ///
    /// Evaluating the result in direction `d` approximates
    /// `value * max(0, dot(dir, d))`.
    #[inline]
    pub fn project_cos_lobe(dir: Vec3, value: f32) -> Self {
        Sh1 {
            coeffs: [
                value * SH_COS_LOBE_C0,
                value * SH_COS_LOBE_C1 * dir.x,
                value * SH_COS_LOBE_C1 * dir.y,
                value * SH_COS_LOBE_C1 * dir.z,
            ],
        }
    }

    /// Add another SH
    #[inline]
    pub fn add(&mut self, other: &Sh1) {
        for i in 0..4 {
            self.coeffs[i] += other.coeffs[i];
        }
    }

    /// Scale all coefficients
    #[inline]
    pub fn scale(&mut self, s: f32) {
        for c in &mut self.coeffs {
            *c *= s;
        }
    }
}

/// L1 SH for all three color channels of one grid cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sh1Rgb {
    /// Red channel SH
    pub r: Sh1,
    /// Green channel SH
    pub g: Sh1,
    /// Blue channel SH
    pub b: Sh1,
}

impl Sh1Rgb {
    /// All-zero cell
    pub const ZERO: Sh1Rgb = Sh1Rgb {
        r: Sh1::ZERO,
        g: Sh1::ZERO,
        b: Sh1::ZERO,
    };

    /// Evaluate all three channels in a direction (signed)
    #[inline]
    pub fn evaluate(&self, dir: Vec3) -> Vec3 {
        Vec3::new(
            self.r.evaluate(dir),
            self.g.evaluate(dir),
            self.b.evaluate(dir),
        )
    }

    /// Evaluate as radiance (clamped to non-negative)
    #[inline]
    pub fn radiance(&self, dir: Vec3) -> Vec3 {
        self.evaluate(dir).max(Vec3::ZERO)
    }

    /// Add a clamped cosine lobe of `color` oriented along `dir`
    #[inline]
    pub fn add_cos_lobe(&mut self, dir: Vec3, color: Vec3) {
        self.r.add(&Sh1::project_cos_lobe(dir, color.x));
        self.g.add(&Sh1::project_cos_lobe(dir, color.y));
        self.b.add(&Sh1::project_cos_lobe(dir, color.z));
    }

    /// Add another cell's coefficients
    #[inline]
    pub fn add(&mut self, other: &Sh1Rgb) {
        self.r.add(&other.r);
        self.g.add(&other.g);
        self.b.add(&other.b);
    }

    /// Scale all channels
    #[inline]
    pub fn scale(&mut self, s: f32) {
        self.r.scale(s);
        self.g.scale(s);
        self.b.scale(s);
    }

    /// Sum of absolute DC magnitudes across channels
    ///
    /// A cheap "is there any energy here" metric for tests and debug
    /// inspection.
    #[inline]
    pub fn dc_magnitude(&self) -> f32 {
        self.r.coeffs[0].abs() + self.g.coeffs[0].abs() + self.b.coeffs[0].abs()
    }
}
