//! Cascade placement and tracking
//!
//! A cascade is one nested grid level of the propagation volume: a
//! cubic region of a fixed physical span that either follows the camera
//! or stays put. Nearby cascades use a small span for detail, far
//! cascades a large span for coverage.
//!
//! Placement is snapped to whole cells so that cell contents stay
//! stable as the camera moves; the sub-cell remainder is kept as a
//! smoothing offset so consumers can blend across the snap. Two
//! placement snapshots are tracked per cascade: the one light was
//! injected with, and the one the stored light should be read with
//! (these differ whenever propagation lags injection).
//!
//! Author: Moroya Sakamoto

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::grid::LightGrid;

/// How many cells of margin stay behind the camera when a cascade
/// recenters ahead of it.
const CAMERA_MARGIN_CELLS: f32 = 4.0;

/// Behavior flags for one cascade
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeFlags(u32);

impl CascadeFlags {
    /// No flags: the cascade recenters on the camera every frame
    pub const NONE: CascadeFlags = CascadeFlags(0);
    /// The cascade keeps its placement until recentered explicitly
    pub const STATIC: CascadeFlags = CascadeFlags(1);

    /// Whether all bits of `flag` are set
    #[inline]
    pub fn contains(self, flag: CascadeFlags) -> bool {
        self.0 & flag.0 == flag.0
    }
}

impl std::ops::BitOr for CascadeFlags {
    type Output = CascadeFlags;
    fn bitor(self, rhs: CascadeFlags) -> CascadeFlags {
        CascadeFlags(self.0 | rhs.0)
    }
}

/// Static description of one cascade
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CascadeDesc {
    /// World-space edge length of the cubic grid
    pub grid_span: f32,
    /// Injection pre-scale for this cascade
    pub grid_intensity: f32,
    /// Behavior flags
    pub flags: CascadeFlags,
}

impl Default for CascadeDesc {
    fn default() -> Self {
        CascadeDesc {
            grid_span: 50.0,
            grid_intensity: 1.0,
            flags: CascadeFlags::NONE,
        }
    }
}

/// One placement of a cascade grid in the world
///
/// `grid_to_world` maps grid texture space ([0, 1] per axis) to world
/// space; `world_to_grid` is its inverse. Because the mapping is a pure
/// scale + translate, the diagonal and translation column are kept
/// split out for cheap per-sample evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridPlacement {
    /// Grid texture space to world space
    pub grid_to_world: Mat4,
    /// World space to grid texture space
    pub world_to_grid: Mat4,
    /// Diagonal of `world_to_grid`
    pub world_to_grid_scale: Vec3,
    /// Translation of `world_to_grid`
    pub world_to_grid_translate: Vec3,
    /// Texture-space delta between the snapped grid center and the
    /// true (unsnapped) follow position. Used to blend smoothly while
    /// the grid steps between discrete cells.
    pub smooth_offset: Vec3,
}

impl Default for GridPlacement {
    fn default() -> Self {
        GridPlacement {
            grid_to_world: Mat4::IDENTITY,
            world_to_grid: Mat4::IDENTITY,
            world_to_grid_scale: Vec3::ONE,
            world_to_grid_translate: Vec3::ZERO,
            smooth_offset: Vec3::ZERO,
        }
    }
}

/// Axis-aligned bounds of a cascade grid in some target space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBounds {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

/// One cascade: description, placement tracking, and its SH grid
#[derive(Debug)]
pub struct Cascade {
    /// Static description
    pub desc: CascadeDesc,
    /// Placement light was last injected with
    pub inject_state: GridPlacement,
    /// Placement consumers should read the stored light with.
    /// Committed from `inject_state` only when propagation for that
    /// injection has finished.
    pub apply_state: GridPlacement,
    /// Persistent SH radiance grid
    pub grid: LightGrid,
}

impl Cascade {
    /// Create a cascade with a cleared grid at identity placement
    pub fn new(desc: CascadeDesc, resolution: usize) -> Self {
        Cascade {
            desc,
            inject_state: GridPlacement::default(),
            apply_state: GridPlacement::default(),
            grid: LightGrid::new(resolution),
        }
    }

    /// World-space size of one cell
    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.desc.grid_span / self.grid.resolution() as f32
    }

    /// Half the grid span
    #[inline]
    pub fn side_half(&self) -> f32 {
        self.desc.grid_span / 2.0
    }

    /// Recenter the grid on `center`, snapping to whole cells
    ///
    /// The center is rounded to the nearest cell-size multiple before
    /// transforms are derived, which keeps cell contents temporally
    /// stable while the true center moves. The sub-cell remainder is
    /// stored as `smooth_offset` in texture units. Recentering at an
    /// already snapped position is a no-op apart from zeroing the
    /// offset.
    pub fn set_center(&mut self, center: Vec3) {
        let cell_size = self.cell_size();
        let side_half = self.side_half();

        let smooth_center = center;
        let snapped = (center / cell_size).round() * cell_size;

        // [0,1] texture space -> [-1,1] local -> world
        let unit_to_local = Mat4::from_translation(Vec3::splat(-1.0))
            * Mat4::from_scale(Vec3::splat(2.0));
        let grid_to_world = Mat4::from_translation(snapped)
            * Mat4::from_scale(Vec3::splat(side_half))
            * unit_to_local;
        let world_to_grid = grid_to_world.inverse();

        self.inject_state.grid_to_world = grid_to_world;
        self.inject_state.world_to_grid = world_to_grid;
        self.inject_state.world_to_grid_scale = Vec3::new(
            world_to_grid.x_axis.x,
            world_to_grid.y_axis.y,
            world_to_grid.z_axis.z,
        );
        self.inject_state.world_to_grid_translate = world_to_grid.w_axis.truncate();

        self.inject_state.smooth_offset = world_to_grid.transform_point3(snapped)
            - world_to_grid.transform_point3(smooth_center);
    }

    /// Per-frame recentering for camera-following cascades
    ///
    /// The grid is pushed ahead of the camera so most of it covers
    /// visible space, while a few cells stay behind the camera so light
    /// there can still propagate forward.
    pub fn begin_frame(&mut self, cam_pos: Vec3, cam_dir: Vec3) {
        if self.desc.flags.contains(CascadeFlags::STATIC) {
            return;
        }

        let cell_size = self.cell_size();
        let side_half = self.side_half();

        let max_comp = cam_dir
            .x
            .abs()
            .max(cam_dir.y.abs())
            .max(cam_dir.z.abs())
            .max(1e-6);
        let offset = cam_dir / max_comp * (side_half - CAMERA_MARGIN_CELLS * cell_size);
        self.set_center(cam_pos + offset);
    }

    /// Bounds of the injected grid in a caller-provided space
    pub fn grid_bounds(&self, world_to_local: &Mat4) -> GridBounds {
        let grid_to_local = *world_to_local * self.inject_state.grid_to_world;

        let mut min = grid_to_local.transform_point3(Vec3::ZERO);
        let mut max = min;
        for i in 1..8u32 {
            let corner = Vec3::new(
                if i & 1 != 0 { 1.0 } else { 0.0 },
                if i & 2 != 0 { 1.0 } else { 0.0 },
                if i & 4 != 0 { 1.0 } else { 0.0 },
            );
            let p = grid_to_local.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        GridBounds { min, max }
    }

    /// Publish the injection placement as the read placement
    pub(crate) fn commit_apply_state(&mut self) {
        self.apply_state = self.inject_state;
    }
}
