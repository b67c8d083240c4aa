//! Light propagation volume orchestration
//!
//! `Lpv` owns the cascades, the shared working set, and the per-frame
//! schedule: recenter the grids on the camera, inject RSM light,
//! propagate, and hand the lighting pass its apply data. Two
//! propagation drivers are available:
//!
//! - **Immediate**: the pass sequence runs inside `propagate()` and
//!   results are visible the same frame.
//! - **Deferred CPU**: injections are captured into staging contexts
//!   and processed a full in-flight frame count later, modeling the
//!   readback latency of a grid that lives on the GPU.
//!
//! With `alternate_updates` set, only one cascade is recentered,
//! injected, and propagated per frame, round-robin, bounding per-frame
//! cost; consumers tolerate the other cascades' apply state lagging a
//! few frames.
//!
//! Author: Moroya Sakamoto

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::apply::{build_light_apply_data, LightApplyData};
use crate::cascade::{Cascade, CascadeDesc, GridBounds};
use crate::cpu::CpuContextRing;
use crate::grid::WorkingSet;
use crate::inject::{inject_rsm, RsmFrame};
use crate::propagate::{propagate_cascade, MtMode};

/// Configuration and validation errors
#[derive(Error, Debug)]
pub enum LpvError {
    /// No cascades were supplied
    #[error("at least one cascade is required")]
    NoCascades,

    /// Zero propagation steps
    #[error("propagation step count must be at least 1")]
    NoPropagationSteps,

    /// Grid resolution too small for neighbor propagation
    #[error("grid resolution must be at least 2, got {0}")]
    InvalidResolution(usize),

    /// Zero in-flight frames
    #[error("in-flight frame count must be at least 1")]
    InvalidInFlightFrames,

    /// Per-cascade light scales do not line up with the cascades
    #[error("light scale count {actual} does not match cascade count {expected}")]
    LightScaleCount {
        /// Number of cascades
        expected: usize,
        /// Number of light scales supplied
        actual: usize,
    },

    /// An RSM plane does not match the frame dimensions
    #[error("RSM plane holds {actual} texels, expected {width}x{height}")]
    RsmPlaneSize {
        /// Frame width
        width: u32,
        /// Frame height
        height: u32,
        /// Actual plane length
        actual: usize,
    },

    /// Cascade index out of range
    #[error("cascade index {index} out of range ({count} cascades)")]
    CascadeIndex {
        /// Requested index
        index: usize,
        /// Cascade count
        count: usize,
    },

    /// Restored snapshot does not match this volume's shape
    #[error("snapshot shape mismatch: {0}")]
    SnapshotShape(String),
}

/// Tunable parameters of the propagation volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpvParams {
    /// Number of propagation hops per update (each hop moves light one
    /// cell further)
    pub propagation_steps: u32,
    /// Flux multiplier applied at every hop
    pub propagation_scale: f32,
    /// Global indirect-light strength
    pub gi_strength: f32,
    /// Fresnel coefficient handed to the lighting pass
    pub fresnel: f32,
    /// Specular scale handed to the lighting pass
    pub spec_scale: f32,
    /// Specular power handed to the lighting pass
    pub spec_pow: f32,
    /// Per-cascade light weight; empty means 1.0 everywhere
    pub light_scale: Vec<f32>,
    /// Use the deferred CPU propagation pipeline
    pub use_cpu_propagation: bool,
    /// Update one cascade per frame, round-robin
    pub alternate_updates: bool,
    /// Threading of grid passes
    pub mt_mode: MtMode,
}

impl Default for LpvParams {
    fn default() -> Self {
        LpvParams {
            propagation_steps: 8,
            propagation_scale: 1.0,
            gi_strength: 1.0,
            fresnel: 1.0,
            spec_scale: 1.0,
            spec_pow: 8.0,
            light_scale: Vec::new(),
            use_cpu_propagation: false,
            alternate_updates: false,
            mt_mode: MtMode::default(),
        }
    }
}

/// The cascaded light propagation volume
#[derive(Debug)]
pub struct Lpv {
    params: LpvParams,
    cascades: Vec<Cascade>,
    working: WorkingSet,
    contexts: Vec<CpuContextRing>,
    resolution: usize,
    in_flight_frames: usize,
    frame_idx: u64,
    current_cascade: usize,
    cpu_propagation_active: bool,
}

impl Lpv {
    /// Create a volume from parameters and cascade descriptions
    ///
    /// # Arguments
    /// * `params` - Tunables; an empty `light_scale` is filled with 1.0
    /// * `descs` - One entry per cascade, finest first
    /// * `resolution` - Cells per grid axis (see [`crate::grid::GRID_RES`])
    /// * `in_flight_frames` - Readback latency of the deferred pipeline
    pub fn new(
        mut params: LpvParams,
        descs: &[CascadeDesc],
        resolution: usize,
        in_flight_frames: usize,
    ) -> Result<Self, LpvError> {
        if descs.is_empty() {
            return Err(LpvError::NoCascades);
        }
        if params.propagation_steps == 0 {
            return Err(LpvError::NoPropagationSteps);
        }
        if resolution < 2 {
            return Err(LpvError::InvalidResolution(resolution));
        }
        if in_flight_frames == 0 {
            return Err(LpvError::InvalidInFlightFrames);
        }
        if params.light_scale.is_empty() {
            params.light_scale = vec![1.0; descs.len()];
        } else if params.light_scale.len() != descs.len() {
            return Err(LpvError::LightScaleCount {
                expected: descs.len(),
                actual: params.light_scale.len(),
            });
        }

        let cascades = descs
            .iter()
            .map(|desc| Cascade::new(*desc, resolution))
            .collect();
        let contexts = descs
            .iter()
            .map(|_| CpuContextRing::new(resolution, in_flight_frames))
            .collect();

        let cpu_propagation_active = params.use_cpu_propagation;
        Ok(Lpv {
            params,
            cascades,
            working: WorkingSet::new(resolution),
            contexts,
            resolution,
            in_flight_frames,
            frame_idx: 0,
            current_cascade: 0,
            cpu_propagation_active,
        })
    }

    /// Current parameters
    #[inline]
    pub fn params(&self) -> &LpvParams {
        &self.params
    }

    /// Mutable parameters (runtime tuning)
    #[inline]
    pub fn params_mut(&mut self) -> &mut LpvParams {
        &mut self.params
    }

    /// Cells per grid axis
    #[inline]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// Number of cascades
    #[inline]
    pub fn cascade_count(&self) -> usize {
        self.cascades.len()
    }

    /// All cascades, finest first
    #[inline]
    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }

    /// One cascade by index
    #[inline]
    pub fn cascade(&self, index: usize) -> &Cascade {
        &self.cascades[index]
    }

    /// One cascade by index, mutable
    #[inline]
    pub fn cascade_mut(&mut self, index: usize) -> &mut Cascade {
        &mut self.cascades[index]
    }

    pub(crate) fn cascades_mut(&mut self) -> &mut [Cascade] {
        &mut self.cascades
    }

    /// Frames elapsed since creation
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_idx
    }

    /// Readback latency of the deferred pipeline, in frames
    #[inline]
    pub fn in_flight_frames(&self) -> usize {
        self.in_flight_frames
    }

    /// Cascade selected by the alternate-update rotation
    #[inline]
    pub fn current_cascade(&self) -> usize {
        self.current_cascade
    }

    /// Whether this frame runs the one-cascade-per-frame schedule.
    /// Deferred CPU propagation already amortizes its cost, so the two
    /// modes are mutually exclusive.
    fn alternate_updates(&self) -> bool {
        self.params.alternate_updates && !self.params.use_cpu_propagation
    }

    /// Recenter camera-following cascades for this frame
    pub fn begin_frame(&mut self, cam_pos: Vec3, cam_dir: Vec3) {
        if self.alternate_updates() {
            self.current_cascade = (self.current_cascade + 1) % self.cascades.len();
            self.cascades[self.current_cascade].begin_frame(cam_pos, cam_dir);
        } else {
            for cascade in &mut self.cascades {
                cascade.begin_frame(cam_pos, cam_dir);
            }
        }
    }

    /// Explicitly recenter one cascade
    pub fn set_cascade_center(&mut self, index: usize, center: Vec3) -> Result<(), LpvError> {
        let count = self.cascades.len();
        let cascade = self
            .cascades
            .get_mut(index)
            .ok_or(LpvError::CascadeIndex { index, count })?;
        cascade.set_center(center);
        Ok(())
    }

    /// Bitmask of cascades that propagate this frame
    pub fn cascades_to_update_mask(&self) -> u32 {
        if self.alternate_updates() {
            1 << self.current_cascade
        } else {
            (1u32 << self.cascades.len()) - 1
        }
    }

    /// Inject an RSM frame into one cascade
    ///
    /// Under alternate updates, injection into a cascade that is not
    /// scheduled this frame is a no-op.
    pub fn inject_rsm(&mut self, index: usize, rsm: &RsmFrame) -> Result<(), LpvError> {
        let count = self.cascades.len();
        if index >= count {
            return Err(LpvError::CascadeIndex { index, count });
        }
        if self.alternate_updates() && index != self.current_cascade {
            return Ok(());
        }
        inject_rsm(&mut self.cascades[index], rsm);
        Ok(())
    }

    /// Run propagation for this frame
    pub fn propagate(&mut self) {
        if self.params.use_cpu_propagation != self.cpu_propagation_active {
            // Pipeline toggled: pending captures belong to the other
            // driver and are dropped.
            for ring in &mut self.contexts {
                ring.reset();
            }
            self.cpu_propagation_active = self.params.use_cpu_propagation;
        }

        let steps = self.params.propagation_steps;
        let scale = self.params.propagation_scale;
        let mode = self.params.mt_mode;

        if self.params.use_cpu_propagation {
            let frame = self.frame_idx;
            for (cascade, ring) in self.cascades.iter_mut().zip(self.contexts.iter_mut()) {
                ring.capture_slot(frame)
                    .capture(&cascade.grid, cascade.inject_state, frame);
                if let Some(ctx) = ring.due_slot(frame) {
                    ctx.process(&mut self.working, steps, scale, mode);
                    cascade.apply_state = ctx.apply(&mut cascade.grid);
                }
            }
        } else if self.alternate_updates() {
            let index = self.current_cascade;
            propagate_cascade(&mut self.cascades[index], &mut self.working, steps, scale, mode);
        } else {
            for cascade in &mut self.cascades {
                propagate_cascade(cascade, &mut self.working, steps, scale, mode);
            }
        }
    }

    /// Advance the frame counter
    pub fn end_frame(&mut self) {
        self.frame_idx += 1;
    }

    /// Bounds of every cascade grid in a caller-provided space
    pub fn grid_bounds(&self, world_to_local: &Mat4) -> Vec<GridBounds> {
        self.cascades
            .iter()
            .map(|cascade| cascade.grid_bounds(world_to_local))
            .collect()
    }

    /// Apply data for the consuming lighting pass
    pub fn light_apply_data(&self, inv_view_proj: Mat4, cam_pos: Vec3) -> LightApplyData {
        build_light_apply_data(self, inv_view_proj, cam_pos)
    }
}
