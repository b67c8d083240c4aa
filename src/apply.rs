//! Light application data and reference sampling
//!
//! The lighting pass that consumes the propagated grids needs, per
//! cascade, the world-to-grid mapping the light was stored with plus
//! the falloff and scale tuning. `LightApplyData` packs exactly that,
//! built from each cascade's *apply* placement so a cascade whose
//! propagation lags a frame is still read with matching transforms.
//!
//! `sample_indirect` is the CPU reference for that lookup: it is what
//! a debug probe or a software lighting path would do per shaded point.
//!
//! Author: Moroya Sakamoto

use glam::{Mat4, Vec3, Vec4};

use crate::volume::Lpv;

/// Cells of border fade at the edge of a cascade grid
const BORDER_FADE_CELLS: f32 = 2.0;

/// Per-cascade data for the lighting pass
#[derive(Debug, Clone, Copy)]
pub struct CascadeApplyData {
    /// Diagonal of the world-to-grid mapping (apply placement)
    pub world_to_grid_scale: Vec3,
    /// Translation of the world-to-grid mapping (apply placement)
    pub world_to_grid_translate: Vec3,
    /// Sub-cell offset for smooth blending across grid snaps
    pub smooth_offset: Vec3,
    /// Four falloff radii tuned so near cells contribute sharply and
    /// far cells fade smoothly
    pub cell_falloff: Vec4,
    /// Per-cascade light weight
    pub light_scale: f32,
}

/// Everything the lighting pass needs to apply the propagated light
#[derive(Debug, Clone)]
pub struct LightApplyData {
    /// Camera position
    pub cam_pos: Vec3,
    /// Inverse view-projection of the consuming pass
    pub inv_view_proj: Mat4,
    /// Packed (fresnel, specular scale, specular power)
    pub lum_scale: Vec3,
    /// Reciprocal grid resolution per axis
    pub normal_scale: Vec3,
    /// Global indirect-light strength
    pub gi_strength: f32,
    /// Per-cascade application data, finest first
    pub cascades: Vec<CascadeApplyData>,
}

/// Build the apply data snapshot for the current frame
pub fn build_light_apply_data(lpv: &Lpv, inv_view_proj: Mat4, cam_pos: Vec3) -> LightApplyData {
    let params = lpv.params();
    let resolution = lpv.resolution() as f32;

    let cascades = lpv
        .cascades()
        .iter()
        .zip(params.light_scale.iter())
        .map(|(cascade, &light_scale)| {
            let cell = cascade.cell_size();
            CascadeApplyData {
                world_to_grid_scale: cascade.apply_state.world_to_grid_scale,
                world_to_grid_translate: cascade.apply_state.world_to_grid_translate,
                smooth_offset: cascade.apply_state.smooth_offset,
                cell_falloff: Vec4::new(
                    1.0 / (cell * 0.5).powi(2),
                    1.0 / (cell * 0.75).powi(2),
                    1.0 / cell,
                    1.0 / (cell * 1.5).powi(2),
                ),
                light_scale,
            }
        })
        .collect();

    LightApplyData {
        cam_pos,
        inv_view_proj,
        lum_scale: Vec3::new(params.fresnel, params.spec_scale, params.spec_pow),
        normal_scale: Vec3::splat(1.0 / resolution),
        gi_strength: params.gi_strength,
        cascades,
    }
}

/// Sample the indirect light arriving at a surface point
///
/// Transforms the point into each cascade's grid space (apply
/// placement), fades out over the outermost cells, and blends cascades
/// finest-first so detail wins where cascades overlap. The result is
/// the radiance arriving against `normal`, weighted by each cascade's
/// light scale and the global strength.
pub fn sample_indirect(lpv: &Lpv, position: Vec3, normal: Vec3) -> Vec3 {
    let params = lpv.params();
    let margin = BORDER_FADE_CELLS / lpv.resolution() as f32;

    let mut result = Vec3::ZERO;
    let mut remaining = 1.0f32;

    for (cascade, &light_scale) in lpv.cascades().iter().zip(params.light_scale.iter()) {
        let placement = &cascade.apply_state;
        let uv = placement.world_to_grid_scale * position + placement.world_to_grid_translate;
        let uv_smooth = uv + placement.smooth_offset;

        let edge = uv_smooth.min(Vec3::ONE - uv_smooth).min_element();
        if edge <= 0.0 {
            continue;
        }
        let weight = (edge / margin).clamp(0.0, 1.0) * remaining;
        if weight <= 0.0 {
            continue;
        }

        let sh = cascade.grid.sample_trilinear(uv);
        result += sh.radiance(-normal) * light_scale * weight;

        remaining -= weight;
        if remaining <= 0.0 {
            break;
        }
    }

    result * params.gi_strength
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::CascadeDesc;
    use crate::inject::{inject_rsm, RsmFrame};
    use crate::volume::{Lpv, LpvParams};

    fn lit_volume() -> Lpv {
        let mut lpv = Lpv::new(
            LpvParams {
                propagation_steps: 4,
                ..LpvParams::default()
            },
            &[CascadeDesc {
                grid_span: 32.0,
                ..CascadeDesc::default()
            }],
            32,
            2,
        )
        .unwrap();
        lpv.set_cascade_center(0, Vec3::ZERO).unwrap();

        // One upward-facing surfel at the origin
        let rsm = RsmFrame::new(
            1,
            1,
            Mat4::IDENTITY,
            1.0,
            vec![0.5],
            vec![Vec3::Y],
            vec![Vec3::new(1.0, 0.8, 0.6)],
        )
        .unwrap();
        inject_rsm(lpv.cascade_mut(0), &rsm);
        lpv.propagate();
        lpv
    }

    #[test]
    fn test_falloff_constants() {
        let lpv = lit_volume();
        let data = build_light_apply_data(&lpv, Mat4::IDENTITY, Vec3::ZERO);

        // 32 world units over 32 cells: cell size 1
        let falloff = data.cascades[0].cell_falloff;
        assert!((falloff.x - 4.0).abs() < 1e-4);
        assert!((falloff.y - 1.0 / 0.5625).abs() < 1e-3);
        assert!((falloff.z - 1.0).abs() < 1e-4);
        assert!((falloff.w - 1.0 / 2.25).abs() < 1e-3);

        assert_eq!(data.cascades.len(), 1);
        assert!((data.normal_scale.x - 1.0 / 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_apply_data_uses_apply_placement() {
        let mut lpv = lit_volume();
        // Move the injection placement without propagating
        lpv.set_cascade_center(0, Vec3::new(8.0, 0.0, 0.0)).unwrap();

        let data = build_light_apply_data(&lpv, Mat4::IDENTITY, Vec3::ZERO);
        let committed = lpv.cascade(0).apply_state;
        assert_eq!(
            data.cascades[0].world_to_grid_translate,
            committed.world_to_grid_translate
        );
        assert_ne!(
            committed.world_to_grid_translate,
            lpv.cascade(0).inject_state.world_to_grid_translate
        );
    }

    #[test]
    fn test_sample_sees_propagated_light() {
        let lpv = lit_volume();

        // A ceiling just above the surfel, facing down
        let at_source = sample_indirect(&lpv, Vec3::new(0.5, 0.5, 0.5), Vec3::NEG_Y);
        assert!(at_source.x > 0.0, "Surface above the surfel should receive light");
        // Channel ordering follows the injected flux
        assert!(at_source.x > at_source.y && at_source.y > at_source.z);

        let far = sample_indirect(&lpv, Vec3::new(12.5, 0.5, 0.5), Vec3::NEG_Y);
        assert!(
            far.max_element() < at_source.x,
            "Light should fall off away from the source"
        );
    }

    #[test]
    fn test_sample_outside_grid_is_dark() {
        let lpv = lit_volume();
        let outside = sample_indirect(&lpv, Vec3::splat(100.0), Vec3::NEG_Y);
        assert_eq!(outside, Vec3::ZERO);
    }

    #[test]
    fn test_gi_strength_scales_result() {
        let mut lpv = lit_volume();
        let base = sample_indirect(&lpv, Vec3::new(0.5, 0.5, 0.5), Vec3::NEG_Y);

        lpv.params_mut().gi_strength = 2.0;
        let doubled = sample_indirect(&lpv, Vec3::new(0.5, 0.5, 0.5), Vec3::NEG_Y);
        assert!((doubled - base * 2.0).length() < 1e-5);
    }
}
