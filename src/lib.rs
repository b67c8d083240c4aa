//! # ALICE-LPV
//!
//! **A.L.I.C.E. Light Propagation Volumes**
//!
//! Cascaded-grid indirect lighting: scene radiance is injected from a
//! reflective shadow map into nested 3D grids of L1 spherical
//! harmonics and diffused outward cell by cell, giving one soft bounce
//! of indirect light over large scenes at a fixed cost.
//!
//! ## Features
//!
//! - **Cascades**: nested grids, fine near the camera, coarse far out,
//!   snapped to whole cells for temporal stability
//! - **RSM Injection**: surfel flux accumulated into SH with
//!   footprint-corrected scaling
//! - **Propagation**: iterative 6-neighbor flux transport, ping-pong
//!   buffered, single-threaded or Rayon-parallel
//! - **Deferred CPU pipeline**: capture / process / apply staging with
//!   in-flight-frame readback latency
//! - **Apply data**: per-cascade transforms and falloffs for the
//!   consuming lighting pass, plus a CPU reference sampler
//! - **File I/O**: CRC-checked binary grid snapshots (.lpv) and JSON
//!   parameter files
//!
//! ## Example
//!
//! ```rust
//! use alice_lpv::prelude::*;
//! use glam::{Mat4, Vec3};
//!
//! let mut lpv = Lpv::new(
//!     LpvParams::default(),
//!     &[
//!         CascadeDesc { grid_span: 50.0, ..Default::default() },
//!         CascadeDesc { grid_span: 110.0, ..Default::default() },
//!     ],
//!     GRID_RES,
//!     2,
//! ).unwrap();
//!
//! // Per frame: recenter, inject, propagate, read
//! lpv.begin_frame(Vec3::ZERO, Vec3::Z);
//! # let rsm = RsmFrame::new(1, 1, Mat4::IDENTITY, 1.0,
//! #     vec![0.5], vec![Vec3::Y], vec![Vec3::ONE]).unwrap();
//! lpv.inject_rsm(0, &rsm).unwrap();
//! lpv.propagate();
//! let apply = lpv.light_apply_data(Mat4::IDENTITY, Vec3::ZERO);
//! lpv.end_frame();
//! # assert_eq!(apply.cascades.len(), 2);
//! ```
//!
//! ## Author
//!
//! Moroya Sakamoto

#![warn(missing_docs)]

pub mod apply;
pub mod cascade;
pub mod cpu;
pub mod grid;
pub mod inject;
pub mod io;
pub mod propagate;
pub mod sh;
pub mod volume;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::apply::{build_light_apply_data, sample_indirect, CascadeApplyData, LightApplyData};
    pub use crate::cascade::{Cascade, CascadeDesc, CascadeFlags, GridBounds, GridPlacement};
    pub use crate::cpu::{ContextState, CpuContext, CpuContextRing};
    pub use crate::grid::{AccessState, LightGrid, WorkingSet, GRID_RES};
    pub use crate::inject::{inject_rsm, injection_scale, RsmFrame};
    pub use crate::io::{load_params, load_snapshot, save_params, save_snapshot, GridSnapshot};
    pub use crate::propagate::{propagate_cascade, propagation_step, run_passes, MtMode};
    pub use crate::sh::{Sh1, Sh1Rgb};
    pub use crate::volume::{Lpv, LpvError, LpvParams};
    pub use glam::{Mat4, Vec3};
}

// Re-exports for convenience
pub use cascade::CascadeDesc;
pub use grid::GRID_RES;
pub use volume::{Lpv, LpvError, LpvParams};
