//! RSM light injection
//!
//! A reflective shadow map is the light-injection source: a buffer
//! rendered from the light's viewpoint where every texel carries depth,
//! a world-space normal, and the flux the lit surface reflects. Each
//! texel is treated as a small emitting surfel; its flux is projected
//! into the SH cell it lands in, with additive blending.
//!
//! Surfel potential is scaled by the ratio of grid cell area to the
//! area one RSM texel covers at unit depth, so injection intensity
//! stays consistent across RSM resolutions and cascade spans.
//!
//! Author: Moroya Sakamoto

use glam::{Mat4, Vec3};

use crate::cascade::Cascade;
use crate::grid::AccessState;
use crate::sh::Sh1Rgb;
use crate::volume::LpvError;

/// One reflective-shadow-map frame
///
/// Planes are row-major, `width * height` texels each. World positions
/// are reconstructed from `depth` with `inv_view_proj`, the same way
/// the lighting pass that rendered the RSM would consume it.
#[derive(Debug, Clone)]
pub struct RsmFrame {
    width: u32,
    height: u32,
    /// Inverse of the light's view-projection matrix
    pub inv_view_proj: Mat4,
    /// View area covered by the full RSM at unit depth
    pub view_area_for_unit_depth: f32,
    /// Normalized device depth per texel, 1.0 where nothing was hit
    pub depth: Vec<f32>,
    /// World-space surface normal per texel
    pub normal: Vec<Vec3>,
    /// Reflected flux per texel
    pub flux: Vec<Vec3>,
}

impl RsmFrame {
    /// Create a frame, validating that every plane is `width * height`
    pub fn new(
        width: u32,
        height: u32,
        inv_view_proj: Mat4,
        view_area_for_unit_depth: f32,
        depth: Vec<f32>,
        normal: Vec<Vec3>,
        flux: Vec<Vec3>,
    ) -> Result<Self, LpvError> {
        let expected = width as usize * height as usize;
        for actual in [depth.len(), normal.len(), flux.len()] {
            if actual != expected {
                return Err(LpvError::RsmPlaneSize {
                    width,
                    height,
                    actual,
                });
            }
        }
        Ok(RsmFrame {
            width,
            height,
            inv_view_proj,
            view_area_for_unit_depth,
            depth,
            normal,
            flux,
        })
    }

    /// RSM width in texels
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// RSM height in texels
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// View area one texel covers at unit depth
    #[inline]
    pub fn surfel_area_scale(&self) -> f32 {
        self.view_area_for_unit_depth / (self.width as f32 * self.height as f32)
    }

    /// Reconstruct the world position of a texel from its depth
    #[inline]
    pub fn world_position(&self, x: u32, y: u32) -> Vec3 {
        let ndc = Vec3::new(
            (x as f32 + 0.5) / self.width as f32 * 2.0 - 1.0,
            1.0 - (y as f32 + 0.5) / self.height as f32 * 2.0,
            self.depth[(x + y * self.width) as usize],
        );
        self.inv_view_proj.project_point3(ndc)
    }
}

/// Injection scale for a surfel of `rsm` landing in `cascade`
///
/// Corrects for the mismatch between the surfel footprint and the grid
/// cell footprint, pre-multiplied by the cascade's intensity so the
/// stored SH already carries its weight.
pub fn injection_scale(cascade: &Cascade, rsm: &RsmFrame) -> f32 {
    let resolution = cascade.grid.resolution() as f32;
    let grid_area = cascade.desc.grid_span * cascade.desc.grid_span;
    let grid_cell_area = grid_area / (resolution * resolution);
    rsm.surfel_area_scale() / grid_cell_area * cascade.desc.grid_intensity
}

/// Inject an RSM frame into a cascade's grid
///
/// The grid is cleared first (injection starts a fresh frame of light),
/// then every occupied texel adds a clamped cosine lobe of its flux to
/// the cell its surfel lands in. Surfels are displaced half a cell
/// along their normal so a lit wall illuminates the cell in front of
/// itself rather than its own geometry.
pub fn inject_rsm(cascade: &mut Cascade, rsm: &RsmFrame) {
    let resolution = cascade.grid.resolution();
    let scale = injection_scale(cascade, rsm);
    let half_cell = cascade.cell_size() * 0.5;
    let placement = cascade.inject_state;

    cascade
        .grid
        .transition(AccessState::ShaderRead, AccessState::RenderTarget);
    cascade.grid.clear();

    for y in 0..rsm.height() {
        for x in 0..rsm.width() {
            let idx = (x + y * rsm.width()) as usize;
            if rsm.depth[idx] >= 1.0 {
                continue;
            }
            let flux = rsm.flux[idx];
            if flux.max_element() <= 0.0 {
                continue;
            }

            let normal = rsm.normal[idx];
            let pos = rsm.world_position(x, y) + normal * half_cell;
            let uv = placement.world_to_grid_scale * pos + placement.world_to_grid_translate;

            let cx = (uv.x * resolution as f32).floor() as i32;
            let cy = (uv.y * resolution as f32).floor() as i32;
            let cz = (uv.z * resolution as f32).floor() as i32;
            let r = resolution as i32;
            if cx < 0 || cy < 0 || cz < 0 || cx >= r || cy >= r || cz >= r {
                continue;
            }

            let cell_idx =
                cascade
                    .grid
                    .index(cx as usize, cy as usize, cz as usize);
            let mut lobe = Sh1Rgb::ZERO;
            lobe.add_cos_lobe(normal, flux * scale);
            cascade.grid.cell_mut(cell_idx).add(&lobe);
        }
    }

    cascade
        .grid
        .transition(AccessState::RenderTarget, AccessState::ShaderRead);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{CascadeDesc, CascadeFlags};
    use glam::Vec3;

    fn test_cascade() -> Cascade {
        let mut cascade = Cascade::new(
            CascadeDesc {
                grid_span: 32.0,
                grid_intensity: 1.0,
                flags: CascadeFlags::NONE,
            },
            32,
        );
        cascade.set_center(Vec3::ZERO);
        cascade
    }

    fn single_surfel_rsm(depth: f32, normal: Vec3, flux: Vec3) -> RsmFrame {
        RsmFrame::new(
            1,
            1,
            Mat4::IDENTITY,
            1.0,
            vec![depth],
            vec![normal],
            vec![flux],
        )
        .unwrap()
    }

    #[test]
    fn test_plane_size_validation() {
        let err = RsmFrame::new(2, 2, Mat4::IDENTITY, 1.0, vec![1.0; 3], vec![Vec3::Y; 4], vec![Vec3::ONE; 4]);
        assert!(err.is_err());
    }

    #[test]
    fn test_world_position_identity() {
        let rsm = single_surfel_rsm(0.5, Vec3::Y, Vec3::ONE);
        let p = rsm.world_position(0, 0);
        // Texel center of a 1x1 RSM sits at ndc origin
        assert!((p - Vec3::new(0.0, 0.0, 0.5)).length() < 1e-6);
    }

    #[test]
    fn test_injection_lands_in_expected_cell() {
        let mut cascade = test_cascade();
        let rsm = single_surfel_rsm(0.5, Vec3::Y, Vec3::new(1.0, 0.0, 0.0));

        inject_rsm(&mut cascade, &rsm);

        // Surfel at (0, 0, 0.5) displaced half a cell up lands in cell
        // (16, 16, 16) of the origin-centered grid.
        let cell = cascade.grid.get(16, 16, 16);
        assert!(cell.dc_magnitude() > 0.0, "Injected cell should hold energy");
        assert_eq!(cell.g.coeffs[0], 0.0, "Green flux was zero");

        // Expected scale: (1 / (1*1)) / (32*32 / 32^2) = 1
        let expected_dc = 1.0 * crate::sh::SH_COS_LOBE_C0;
        assert!((cell.r.coeffs[0] - expected_dc).abs() < 1e-4);

        // Everything else is untouched
        let lit: usize = cascade
            .grid
            .cells()
            .iter()
            .filter(|c| c.dc_magnitude() > 0.0)
            .count();
        assert_eq!(lit, 1);
    }

    #[test]
    fn test_injection_clears_previous_frame() {
        let mut cascade = test_cascade();
        let bright = single_surfel_rsm(0.5, Vec3::Y, Vec3::splat(8.0));
        let dim = single_surfel_rsm(0.5, Vec3::Y, Vec3::splat(1.0));

        inject_rsm(&mut cascade, &bright);
        let first = cascade.grid.get(16, 16, 16).dc_magnitude();
        inject_rsm(&mut cascade, &dim);
        let second = cascade.grid.get(16, 16, 16).dc_magnitude();

        assert!(second < first, "Reinjection should replace, not accumulate across frames");
    }

    #[test]
    fn test_far_plane_texels_skipped() {
        let mut cascade = test_cascade();
        let rsm = single_surfel_rsm(1.0, Vec3::Y, Vec3::ONE);

        inject_rsm(&mut cascade, &rsm);
        assert!(cascade.grid.total_dc() == 0.0, "Empty depth should inject nothing");
    }

    #[test]
    fn test_intensity_prescales_injection() {
        let mut plain = test_cascade();
        let mut boosted = Cascade::new(
            CascadeDesc {
                grid_span: 32.0,
                grid_intensity: 4.0,
                flags: CascadeFlags::NONE,
            },
            32,
        );
        boosted.set_center(Vec3::ZERO);

        let rsm = single_surfel_rsm(0.5, Vec3::Y, Vec3::ONE);
        inject_rsm(&mut plain, &rsm);
        inject_rsm(&mut boosted, &rsm);

        let a = plain.grid.get(16, 16, 16).dc_magnitude();
        let b = boosted.grid.get(16, 16, 16).dc_magnitude();
        assert!((b - 4.0 * a).abs() < 1e-4);
    }
}
