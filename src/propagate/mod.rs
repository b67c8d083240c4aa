//! Iterative flux propagation
//!
//! Propagation runs as a fixed sequence of passes over a cascade's
//! grid and the shared working set, mirroring how a GPU backend would
//! queue them:
//!
//! 1. The first hop reads the freshly injected grid and writes into
//!    one working buffer.
//! 2. A copy/accumulate pass adds that hop into the persistent grid.
//! 3. Every further hop ping-pongs between the two working buffers
//!    (reading the previous hop's output only), and is likewise
//!    accumulated into the grid.
//!
//! Each role change is an explicit access-state transition, so a pass
//! can never read a buffer something else is still writing. When the
//! sequence finishes, the cascade's apply state is committed so
//! consumers read the grid with the placement the light was actually
//! injected at.
//!
//! Author: Moroya Sakamoto

mod kernel;

pub use kernel::propagation_step;

use serde::{Deserialize, Serialize};

use crate::cascade::Cascade;
use crate::grid::{AccessState, LightGrid, WorkingSet};

/// Threading mode for CPU-side grid passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MtMode {
    /// Single-threaded reference path
    Single,
    /// Rayon Z-slab parallelism
    #[default]
    Parallel,
}

/// Run the full propagation pass sequence over `grid`
///
/// On return the grid holds the injected light plus every hop's
/// contribution, and both working buffers are back in readable state.
pub fn run_passes(
    grid: &mut LightGrid,
    working: &mut WorkingSet,
    steps: u32,
    scale: f32,
    mode: MtMode,
) {
    debug_assert!(steps >= 1);
    debug_assert_eq!(grid.state(), AccessState::ShaderRead);

    // First hop: injected grid into the ping buffer.
    working
        .ping
        .transition(AccessState::ShaderRead, AccessState::RenderTarget);
    propagation_step(grid, &mut working.ping, scale, mode);
    working
        .ping
        .transition(AccessState::RenderTarget, AccessState::ShaderRead);

    grid.transition(AccessState::ShaderRead, AccessState::RenderTarget);
    grid.accumulate(&working.ping);
    grid.transition(AccessState::RenderTarget, AccessState::ShaderRead);

    // Remaining hops ping-pong between the working buffers so each hop
    // only ever sees the previous hop's output.
    let mut src_is_ping = true;
    for _ in 1..steps {
        if src_is_ping {
            working
                .pong
                .transition(AccessState::ShaderRead, AccessState::RenderTarget);
            propagation_step(&working.ping, &mut working.pong, scale, mode);
            working
                .pong
                .transition(AccessState::RenderTarget, AccessState::ShaderRead);

            grid.transition(AccessState::ShaderRead, AccessState::RenderTarget);
            grid.accumulate(&working.pong);
            grid.transition(AccessState::RenderTarget, AccessState::ShaderRead);
        } else {
            working
                .ping
                .transition(AccessState::ShaderRead, AccessState::RenderTarget);
            propagation_step(&working.pong, &mut working.ping, scale, mode);
            working
                .ping
                .transition(AccessState::RenderTarget, AccessState::ShaderRead);

            grid.transition(AccessState::ShaderRead, AccessState::RenderTarget);
            grid.accumulate(&working.ping);
            grid.transition(AccessState::RenderTarget, AccessState::ShaderRead);
        }
        src_is_ping = !src_is_ping;
    }
}

/// Propagate one cascade and commit its apply state
pub fn propagate_cascade(
    cascade: &mut Cascade,
    working: &mut WorkingSet,
    steps: u32,
    scale: f32,
    mode: MtMode,
) {
    run_passes(&mut cascade.grid, working, steps, scale, mode);
    cascade.commit_apply_state();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{CascadeDesc, CascadeFlags};
    use crate::sh::{Sh1, Sh1Rgb};
    use glam::Vec3;

    fn dc_source(value: f32) -> Sh1Rgb {
        let mut cell = Sh1Rgb::ZERO;
        cell.r = Sh1 {
            coeffs: [value, 0.0, 0.0, 0.0],
        };
        cell
    }

    /// Hop the raw wavefront K times without accumulation, tracking the
    /// per-hop peak.
    fn wavefront_peaks(resolution: usize, hops: usize) -> Vec<f32> {
        let mut wave = LightGrid::new(resolution);
        let c = resolution / 2;
        wave.set(c, c, c, dc_source(1.0));

        let mut peaks = vec![1.0];
        let mut next = LightGrid::new(resolution);
        for _ in 0..hops {
            propagation_step(&wave, &mut next, 1.0, MtMode::Single);
            std::mem::swap(&mut wave, &mut next);
            let peak = wave
                .cells()
                .iter()
                .map(|cell| cell.dc_magnitude())
                .fold(0.0f32, f32::max);
            peaks.push(peak);
        }
        peaks
    }

    #[test]
    fn test_wavefront_peak_never_grows() {
        let peaks = wavefront_peaks(16, 5);
        for pair in peaks.windows(2) {
            assert!(
                pair[1] <= pair[0] + 1e-6,
                "Hop peak should be non-increasing, got {:?}",
                peaks
            );
        }
    }

    #[test]
    fn test_footprint_bounded_by_step_count() {
        let resolution = 16usize;
        let steps = 3u32;
        let c = (resolution / 2) as i32;

        let mut grid = LightGrid::new(resolution);
        grid.set(c as usize, c as usize, c as usize, dc_source(1.0));
        let mut working = WorkingSet::new(resolution);

        run_passes(&mut grid, &mut working, steps, 1.0, MtMode::Single);

        for z in 0..resolution as i32 {
            for y in 0..resolution as i32 {
                for x in 0..resolution as i32 {
                    let manhattan = (x - c).abs() + (y - c).abs() + (z - c).abs();
                    if manhattan > steps as i32 {
                        let energy = grid.get(x as usize, y as usize, z as usize).dc_magnitude();
                        assert_eq!(
                            energy, 0.0,
                            "Cell ({x},{y},{z}) is {manhattan} cells out but lit after {steps} steps"
                        );
                    }
                }
            }
        }

        // And light did travel the full distance along an axis
        let reached = grid
            .get((c + steps as i32) as usize, c as usize, c as usize)
            .dc_magnitude();
        assert!(reached > 0.0, "Light should reach {steps} cells along an axis");
    }

    #[test]
    fn test_grid_keeps_injected_light() {
        let mut grid = LightGrid::new(8);
        grid.set(4, 4, 4, dc_source(1.0));
        let injected = grid.get(4, 4, 4);

        let mut working = WorkingSet::new(8);
        run_passes(&mut grid, &mut working, 4, 1.0, MtMode::Single);

        // Accumulation adds hops on top of the injected energy; the
        // source cell still holds at least what was injected.
        assert!(grid.get(4, 4, 4).dc_magnitude() >= injected.dc_magnitude());
        assert!(grid.total_dc() > injected.dc_magnitude());
    }

    #[test]
    fn test_single_step_equals_one_hop_plus_injection() {
        let mut grid = LightGrid::new(8);
        let mut cell = Sh1Rgb::ZERO;
        cell.add_cos_lobe(Vec3::Y, Vec3::ONE);
        grid.set(4, 4, 4, cell);

        let mut expected = LightGrid::new(8);
        propagation_step(&grid, &mut expected, 1.0, MtMode::Single);
        expected.transition(AccessState::ShaderRead, AccessState::RenderTarget);
        expected.accumulate(&grid);
        expected.transition(AccessState::RenderTarget, AccessState::ShaderRead);

        let mut working = WorkingSet::new(8);
        run_passes(&mut grid, &mut working, 1, 1.0, MtMode::Single);

        for (a, b) in grid.cells().iter().zip(expected.cells().iter()) {
            assert!((a.dc_magnitude() - b.dc_magnitude()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_propagate_cascade_commits_apply_state() {
        let mut cascade = Cascade::new(
            CascadeDesc {
                grid_span: 16.0,
                grid_intensity: 1.0,
                flags: CascadeFlags::NONE,
            },
            8,
        );
        cascade.set_center(Vec3::new(3.0, 4.0, 5.0));
        assert_ne!(cascade.apply_state, cascade.inject_state, "Apply state must not move before propagation finishes");

        let mut working = WorkingSet::new(8);
        propagate_cascade(&mut cascade, &mut working, 2, 1.0, MtMode::Single);
        assert_eq!(cascade.apply_state, cascade.inject_state);
    }

    #[test]
    fn test_working_buffers_end_readable() {
        let mut grid = LightGrid::new(8);
        grid.set(4, 4, 4, dc_source(1.0));
        let mut working = WorkingSet::new(8);

        for steps in 1..=4 {
            run_passes(&mut grid, &mut working, steps, 1.0, MtMode::Single);
            assert_eq!(working.ping.state(), AccessState::ShaderRead);
            assert_eq!(working.pong.state(), AccessState::ShaderRead);
            assert_eq!(grid.state(), AccessState::ShaderRead);
        }
    }
}
