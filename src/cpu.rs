//! Deferred CPU propagation contexts
//!
//! When CPU propagation is active, a cascade's injected grid is first
//! captured into a staging slot (the readback of a GPU-resident grid),
//! processed a full in-flight frame count later, and only then written
//! back and published. The `CAPTURED -> PROPAGATED -> APPLIED` state
//! machine guarantees a half-read capture is never applied, and the
//! placement snapshot taken at capture time travels with the data so
//! consumers always read the result with the transforms the light was
//! injected at.
//!
//! The slot ring holds one more entry than the in-flight frame count,
//! so the capture from N frames ago is still intact when this frame's
//! capture lands.
//!
//! Author: Moroya Sakamoto

use crate::cascade::GridPlacement;
use crate::grid::{LightGrid, WorkingSet};
use crate::propagate::{run_passes, MtMode};

/// Lifecycle of one staged propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextState {
    /// Slot holds no pending work
    #[default]
    Idle,
    /// Injected light captured, waiting out the readback latency
    Captured,
    /// Diffusion finished, result not yet written back
    Propagated,
    /// Result written back and placement published
    Applied,
}

/// One staging slot for a cascade's deferred propagation
#[derive(Debug)]
pub struct CpuContext {
    state: ContextState,
    data: LightGrid,
    placement: GridPlacement,
    captured_frame: u64,
}

impl CpuContext {
    /// Create an idle slot
    pub fn new(resolution: usize) -> Self {
        CpuContext {
            state: ContextState::Idle,
            data: LightGrid::new(resolution),
            placement: GridPlacement::default(),
            captured_frame: 0,
        }
    }

    /// Current lifecycle state
    #[inline]
    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Frame index the current capture was taken at
    #[inline]
    pub fn captured_frame(&self) -> u64 {
        self.captured_frame
    }

    /// Snapshot a freshly injected grid and its placement
    pub fn capture(&mut self, grid: &LightGrid, placement: GridPlacement, frame: u64) {
        self.data.copy_from(grid);
        self.placement = placement;
        self.captured_frame = frame;
        self.state = ContextState::Captured;
    }

    /// Run the diffusion passes over the captured data
    ///
    /// Identical math to the immediate path; only the timing differs.
    pub fn process(&mut self, working: &mut WorkingSet, steps: u32, scale: f32, mode: MtMode) {
        debug_assert_eq!(self.state, ContextState::Captured);
        run_passes(&mut self.data, working, steps, scale, mode);
        self.state = ContextState::Propagated;
    }

    /// Write the propagated result back and hand out its placement
    ///
    /// The returned placement is the one captured alongside the data;
    /// the caller publishes it as the cascade's apply state.
    pub fn apply(&mut self, grid: &mut LightGrid) -> GridPlacement {
        debug_assert_eq!(self.state, ContextState::Propagated);
        grid.copy_from(&self.data);
        self.state = ContextState::Applied;
        self.placement
    }
}

/// Staging ring for one cascade
///
/// `in_flight + 1` slots: captures land round-robin, and a slot is due
/// for processing once its capture is a full in-flight frame count old.
#[derive(Debug)]
pub struct CpuContextRing {
    slots: Vec<CpuContext>,
    in_flight: usize,
}

impl CpuContextRing {
    /// Create an idle ring
    pub fn new(resolution: usize, in_flight: usize) -> Self {
        CpuContextRing {
            slots: (0..in_flight + 1).map(|_| CpuContext::new(resolution)).collect(),
            in_flight,
        }
    }

    /// Slot that receives this frame's capture
    pub fn capture_slot(&mut self, frame: u64) -> &mut CpuContext {
        let idx = (frame % self.slots.len() as u64) as usize;
        &mut self.slots[idx]
    }

    /// Oldest capture that has waited out the readback latency, if any
    pub fn due_slot(&mut self, frame: u64) -> Option<&mut CpuContext> {
        let in_flight = self.in_flight as u64;
        self.slots
            .iter_mut()
            .filter(|slot| {
                slot.state() == ContextState::Captured
                    && frame >= slot.captured_frame() + in_flight
            })
            .min_by_key(|slot| slot.captured_frame())
    }

    /// Drop all pending work (used when CPU propagation is toggled)
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.state = ContextState::Idle;
        }
    }
}
