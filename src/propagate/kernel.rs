//! One propagation hop (Deep Fried Edition)
//!
//! Each step moves radiance exactly one cell outward. For every
//! destination cell, light is gathered from the 6 axis neighbors:
//! radiance leaving a neighbor enters the destination through the 5
//! faces visible from that neighbor's center (the far face plus 4 side
//! faces), weighted by each face's subtended solid angle, and is
//! re-emitted inside the destination as a clamped cosine lobe around
//! the face direction.
//!
//! Gathering (instead of scattering from sources) keeps every
//! destination cell independent, so Z-slabs parallelize with no write
//! hazards.
//!
//! # Deep Fried Optimizations
//! - **Precomputed face table**: 30 (eval dir, reproject dir, weight)
//!   triples built once per step, not per cell.
//! - **Z-Slab Parallelism**: `par_chunks_mut` over destination slabs,
//!   source grid shared read-only.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;
use rayon::prelude::*;

use crate::grid::LightGrid;
use crate::sh::{Sh1Rgb, DIRECT_FACE_SOLID_ANGLE, SIDE_FACE_SOLID_ANGLE};

use super::MtMode;

/// Unit offsets to the 6 axis neighbors
const AXES: [(i32, i32, i32); 6] = [
    (1, 0, 0),
    (-1, 0, 0),
    (0, 1, 0),
    (0, -1, 0),
    (0, 0, 1),
    (0, 0, -1),
];

/// Components of the normalized direction from a cell center to a
/// neighbor's side-face center: (1, 0.5) / |(1, 0.5)|.
const SIDE_MAJOR: f32 = 0.894_427_2;
const SIDE_MINOR: f32 = 0.447_213_6;

const FOUR_PI: f32 = 4.0 * std::f32::consts::PI;

/// One receiving face of a destination cell
#[derive(Clone, Copy)]
struct Face {
    /// Direction the source radiance is evaluated in
    eval_dir: Vec3,
    /// Lobe direction the received flux is re-emitted around
    reproj_dir: Vec3,
    /// Subtended solid angle over the full sphere
    weight: f32,
}

/// The 5 receiving faces for each of the 6 propagation directions
fn face_table() -> [[Face; 5]; 6] {
    let mut table = [[Face {
        eval_dir: Vec3::ZERO,
        reproj_dir: Vec3::ZERO,
        weight: 0.0,
    }; 5]; 6];

    for (a, &(dx, dy, dz)) in AXES.iter().enumerate() {
        let dir = Vec3::new(dx as f32, dy as f32, dz as f32);
        let (u, v) = perpendicular_axes(dir);

        table[a][0] = Face {
            eval_dir: dir,
            reproj_dir: dir,
            weight: DIRECT_FACE_SOLID_ANGLE / FOUR_PI,
        };
        for (i, side) in [u, -u, v, -v].into_iter().enumerate() {
            table[a][1 + i] = Face {
                eval_dir: dir * SIDE_MAJOR + side * SIDE_MINOR,
                reproj_dir: side,
                weight: SIDE_FACE_SOLID_ANGLE / FOUR_PI,
            };
        }
    }
    table
}

fn perpendicular_axes(dir: Vec3) -> (Vec3, Vec3) {
    if dir.x != 0.0 {
        (Vec3::Y, Vec3::Z)
    } else if dir.y != 0.0 {
        (Vec3::X, Vec3::Z)
    } else {
        (Vec3::X, Vec3::Y)
    }
}

/// Compute one propagation hop from `src` into `dst`
///
/// Every destination cell is overwritten with the flux arriving this
/// hop; `dst` does not need to be cleared first. Cells outside the grid
/// contribute nothing (light leaving the volume is lost).
pub fn propagation_step(src: &LightGrid, dst: &mut LightGrid, scale: f32, mode: MtMode) {
    debug_assert_eq!(src.resolution(), dst.resolution());

    let r = dst.resolution();
    let slab = r * r;
    let faces = face_table();

    match mode {
        MtMode::Parallel => {
            dst.cells_mut()
                .par_chunks_mut(slab)
                .enumerate()
                .for_each(|(z, cells)| propagate_slab(src, cells, z, r, scale, &faces));
        }
        MtMode::Single => {
            for (z, cells) in dst.cells_mut().chunks_mut(slab).enumerate() {
                propagate_slab(src, cells, z, r, scale, &faces);
            }
        }
    }
}

fn propagate_slab(
    src: &LightGrid,
    cells: &mut [Sh1Rgb],
    z: usize,
    r: usize,
    scale: f32,
    faces: &[[Face; 5]; 6],
) {
    for y in 0..r {
        let row = y * r;
        for x in 0..r {
            let mut out = Sh1Rgb::ZERO;

            for (a, &(dx, dy, dz)) in AXES.iter().enumerate() {
                let neighbor = src.get_clamped(x as i32 - dx, y as i32 - dy, z as i32 - dz);

                for face in &faces[a] {
                    let flux = neighbor.radiance(face.eval_dir) * (face.weight * scale);
                    out.add_cos_lobe(face.reproj_dir, flux);
                }
            }

            cells[row + x] = out;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sh::Sh1;

    fn dc_source(value: f32) -> Sh1Rgb {
        // Isotropic cell: equal radiance in every direction
        let mut cell = Sh1Rgb::ZERO;
        cell.r = Sh1 {
            coeffs: [value, 0.0, 0.0, 0.0],
        };
        cell
    }

    #[test]
    fn test_one_hop_reaches_axis_neighbors_only() {
        let mut src = LightGrid::new(8);
        let mut dst = LightGrid::new(8);
        src.set(4, 4, 4, dc_source(1.0));

        propagation_step(&src, &mut dst, 1.0, MtMode::Single);

        for z in 0..8i32 {
            for y in 0..8i32 {
                for x in 0..8i32 {
                    let manhattan = (x - 4).abs() + (y - 4).abs() + (z - 4).abs();
                    let energy = dst.get(x as usize, y as usize, z as usize).dc_magnitude();
                    if manhattan == 1 {
                        assert!(energy > 0.0, "Axis neighbor ({x},{y},{z}) should receive light");
                    } else {
                        assert_eq!(energy, 0.0, "Cell ({x},{y},{z}) at distance {manhattan} should be dark");
                    }
                }
            }
        }
    }

    #[test]
    fn test_isotropic_source_spreads_evenly() {
        let mut src = LightGrid::new(8);
        let mut dst = LightGrid::new(8);
        src.set(4, 4, 4, dc_source(1.0));

        propagation_step(&src, &mut dst, 1.0, MtMode::Single);

        let reference = dst.get(5, 4, 4).dc_magnitude();
        assert!(reference > 0.0);
        for (x, y, z) in [(3, 4, 4), (4, 5, 4), (4, 3, 4), (4, 4, 5), (4, 4, 3)] {
            let energy = dst.get(x, y, z).dc_magnitude();
            assert!(
                (energy - reference).abs() < 1e-5,
                "Isotropic spread should be symmetric, {energy} vs {reference}"
            );
        }
    }

    #[test]
    fn test_directional_source_favors_lobe_direction() {
        let mut src = LightGrid::new(8);
        let mut dst = LightGrid::new(8);

        let mut cell = Sh1Rgb::ZERO;
        cell.add_cos_lobe(Vec3::X, Vec3::splat(1.0));
        src.set(4, 4, 4, cell);

        propagation_step(&src, &mut dst, 1.0, MtMode::Single);

        let forward = dst.get(5, 4, 4).dc_magnitude();
        let backward = dst.get(3, 4, 4).dc_magnitude();
        assert!(forward > 0.0);
        assert_eq!(backward, 0.0, "Nothing shines out the back of a cosine lobe");
    }

    #[test]
    fn test_scale_is_linear() {
        let mut src = LightGrid::new(4);
        src.set(1, 1, 1, dc_source(1.0));

        let mut once = LightGrid::new(4);
        let mut twice = LightGrid::new(4);
        propagation_step(&src, &mut once, 1.0, MtMode::Single);
        propagation_step(&src, &mut twice, 2.0, MtMode::Single);

        for (a, b) in once.cells().iter().zip(twice.cells().iter()) {
            assert!((b.dc_magnitude() - 2.0 * a.dc_magnitude()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_single_and_parallel_agree() {
        let mut src = LightGrid::new(8);
        for i in 0..8 {
            let mut cell = Sh1Rgb::ZERO;
            cell.add_cos_lobe(Vec3::new(1.0, 0.5, -0.25).normalize(), Vec3::splat(0.5 + i as f32));
            src.set(i, (i * 3) % 8, (i * 5) % 8, cell);
        }

        let mut serial = LightGrid::new(8);
        let mut parallel = LightGrid::new(8);
        propagation_step(&src, &mut serial, 1.0, MtMode::Single);
        propagation_step(&src, &mut parallel, 1.0, MtMode::Parallel);

        for (a, b) in serial.cells().iter().zip(parallel.cells().iter()) {
            for (ca, cb) in [(a.r, b.r), (a.g, b.g), (a.b, b.b)] {
                for i in 0..4 {
                    assert!((ca.coeffs[i] - cb.coeffs[i]).abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_light_leaves_at_the_border() {
        let mut src = LightGrid::new(4);
        let mut dst = LightGrid::new(4);
        src.set(0, 0, 0, dc_source(1.0));

        propagation_step(&src, &mut dst, 1.0, MtMode::Single);

        // Three of six neighbors are outside: that light is gone, the
        // three in-grid neighbors still get their share.
        let lit: usize = dst.cells().iter().filter(|c| c.dc_magnitude() > 0.0).count();
        assert_eq!(lit, 3);
    }
}
