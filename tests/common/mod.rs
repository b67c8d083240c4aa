//! Shared helpers for integration tests
//!
//! Author: Moroya Sakamoto

use alice_lpv::prelude::*;

/// A 1x1 RSM holding a single upward-facing surfel at the ndc origin
pub fn single_surfel_rsm(flux: Vec3) -> RsmFrame {
    RsmFrame::new(
        1,
        1,
        Mat4::IDENTITY,
        1.0,
        vec![0.5],
        vec![Vec3::Y],
        vec![flux],
    )
    .unwrap()
}

/// Build a volume with one origin-centered cascade
pub fn single_cascade_volume(params: LpvParams, resolution: usize) -> Lpv {
    let mut lpv = Lpv::new(
        params,
        &[CascadeDesc {
            grid_span: resolution as f32,
            grid_intensity: 1.0,
            flags: CascadeFlags::NONE,
        }],
        resolution,
        2,
    )
    .unwrap();
    lpv.set_cascade_center(0, Vec3::ZERO).unwrap();
    lpv
}

/// Assert two grids hold the same SH coefficients within tolerance
pub fn assert_grids_match(a: &LightGrid, b: &LightGrid, tolerance: f32) {
    assert_eq!(a.resolution(), b.resolution());
    for (i, (ca, cb)) in a.cells().iter().zip(b.cells().iter()).enumerate() {
        for (sa, sb) in [(ca.r, cb.r), (ca.g, cb.g), (ca.b, cb.b)] {
            for c in 0..4 {
                assert!(
                    (sa.coeffs[c] - sb.coeffs[c]).abs() <= tolerance,
                    "Coefficient mismatch at cell {}: {} vs {}",
                    i,
                    sa.coeffs[c],
                    sb.coeffs[c]
                );
            }
        }
    }
}
