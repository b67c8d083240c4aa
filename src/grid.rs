//! SH radiance grids and the propagation working set (Deep Fried Edition)
//!
//! A `LightGrid` is one cubic volume of L1 SH cells stored as a flat
//! X-major array. Cascades own one persistent grid each; propagation
//! additionally uses a shared `WorkingSet` of two grids that ping-pong
//! as read-source and write-destination so no step ever reads and
//! writes the same buffer.
//!
//! Every grid carries an `AccessState` and passes move grids between
//! states with explicit `transition` calls, mirroring the
//! shader-resource / render-target hazard tracking a GPU backend would
//! need. Transitions are debug-asserted so a missequenced pass fails
//! fast in test builds.
//!
//! # Deep Fried Optimizations
//! - **Flat X-major storage**: `x + y*R + z*R*R`, contiguous Z-slabs
//!   for cache-friendly parallel iteration.
//! - **Border clamp-to-black**: out-of-grid taps return zero instead of
//!   branching into wrap/clamp logic.
//!
//! Author: Moroya Sakamoto

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::sh::Sh1Rgb;

/// Default cascade grid resolution (cells per axis)
pub const GRID_RES: usize = 32;

/// Access state of a grid buffer
///
/// The CPU solver enforces the same read/write exclusivity a GPU
/// backend would express with resource barriers: a pass may only read a
/// grid in `ShaderRead` state and only write one in `RenderTarget`
/// state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessState {
    /// Readable by passes
    #[default]
    ShaderRead,
    /// Writable by exactly one pass
    RenderTarget,
}

/// One cubic grid of L1 SH radiance cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightGrid {
    cells: Vec<Sh1Rgb>,
    resolution: usize,
    #[serde(skip)]
    state: AccessState,
}

impl LightGrid {
    /// Create a cleared grid
    pub fn new(resolution: usize) -> Self {
        LightGrid {
            cells: vec![Sh1Rgb::ZERO; resolution * resolution * resolution],
            resolution,
            state: AccessState::ShaderRead,
        }
    }

    /// Cells per axis
    #[inline(always)]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Current access state
    #[inline(always)]
    pub fn state(&self) -> AccessState {
        self.state
    }

    /// Move the grid from one access state to another
    ///
    /// The `from` state must match the grid's current state. This is
    /// the CPU-visible analogue of a resource barrier.
    #[inline]
    pub fn transition(&mut self, from: AccessState, to: AccessState) {
        debug_assert_eq!(
            self.state, from,
            "grid access transition out of order: in {:?}, expected {:?}",
            self.state, from
        );
        self.state = to;
    }

    /// Flat index from cell coordinates (bounds-unchecked)
    #[inline(always)]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + y * self.resolution + z * self.resolution * self.resolution
    }

    /// Cell at coordinates
    #[inline(always)]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Sh1Rgb {
        self.cells[self.index(x, y, z)]
    }

    /// Cell at signed coordinates, zero outside the grid
    #[inline(always)]
    pub fn get_clamped(&self, x: i32, y: i32, z: i32) -> Sh1Rgb {
        let r = self.resolution as i32;
        if x < 0 || y < 0 || z < 0 || x >= r || y >= r || z >= r {
            Sh1Rgb::ZERO
        } else {
            self.cells[self.index(x as usize, y as usize, z as usize)]
        }
    }

    /// Set cell at coordinates
    #[inline(always)]
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: Sh1Rgb) {
        let idx = self.index(x, y, z);
        self.cells[idx] = value;
    }

    /// Mutable cell reference at a flat index
    #[inline(always)]
    pub fn cell_mut(&mut self, idx: usize) -> &mut Sh1Rgb {
        &mut self.cells[idx]
    }

    /// All cells, X-major
    #[inline(always)]
    pub fn cells(&self) -> &[Sh1Rgb] {
        &self.cells
    }

    /// All cells, mutable
    #[inline(always)]
    pub fn cells_mut(&mut self) -> &mut [Sh1Rgb] {
        &mut self.cells
    }

    /// Zero every cell
    pub fn clear(&mut self) {
        self.cells.fill(Sh1Rgb::ZERO);
    }

    /// Additively blend another grid into this one
    ///
    /// This is the copy/accumulate pass of the propagation loop: newly
    /// computed working-buffer flux is added into the persistent grid.
    pub fn accumulate(&mut self, src: &LightGrid) {
        debug_assert_eq!(self.resolution, src.resolution);
        debug_assert_eq!(self.state, AccessState::RenderTarget);
        debug_assert_eq!(src.state, AccessState::ShaderRead);
        for (dst, s) in self.cells.iter_mut().zip(src.cells.iter()) {
            dst.add(s);
        }
    }

    /// Replace this grid's contents with another grid's
    pub fn copy_from(&mut self, src: &LightGrid) {
        debug_assert_eq!(self.resolution, src.resolution);
        self.cells.copy_from_slice(&src.cells);
    }

    /// Trilinearly sample the grid at normalized coordinates
    ///
    /// `uv` is in grid texture space: [0, 1] covers the volume and cell
    /// centers sit at `(i + 0.5) / R`. Taps outside the grid read as
    /// black (border clamp).
    pub fn sample_trilinear(&self, uv: Vec3) -> Sh1Rgb {
        let r = self.resolution as f32;
        let fx = uv.x * r - 0.5;
        let fy = uv.y * r - 0.5;
        let fz = uv.z * r - 0.5;

        let x0 = fx.floor() as i32;
        let y0 = fy.floor() as i32;
        let z0 = fz.floor() as i32;

        let tx = fx - x0 as f32;
        let ty = fy - y0 as f32;
        let tz = fz - z0 as f32;

        let mut out = Sh1Rgb::ZERO;
        for (dx, dy, dz) in CORNERS {
            let w = (if dx == 0 { 1.0 - tx } else { tx })
                * (if dy == 0 { 1.0 - ty } else { ty })
                * (if dz == 0 { 1.0 - tz } else { tz });
            if w <= 0.0 {
                continue;
            }
            let mut c = self.get_clamped(x0 + dx, y0 + dy, z0 + dz);
            c.scale(w);
            out.add(&c);
        }
        out
    }

    /// Total energy proxy: sum of DC magnitudes over all cells
    pub fn total_dc(&self) -> f32 {
        self.cells.iter().map(|c| c.dc_magnitude()).sum()
    }
}

const CORNERS: [(i32, i32, i32); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (0, 1, 0),
    (1, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (0, 1, 1),
    (1, 1, 1),
];

/// Double-buffered working grids for the propagation ping-pong
///
/// One set is shared by all cascades: only one (or a few) cascades
/// propagate in a given frame, so the working memory is sized for a
/// single cascade's resolution.
#[derive(Debug)]
pub struct WorkingSet {
    /// First working buffer
    pub ping: LightGrid,
    /// Second working buffer
    pub pong: LightGrid,
}

impl WorkingSet {
    /// Allocate both working buffers at the cascade resolution
    pub fn new(resolution: usize) -> Self {
        WorkingSet {
            ping: LightGrid::new(resolution),
            pong: LightGrid::new(resolution),
        }
    }
}
