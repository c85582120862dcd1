//! Patchbay Core - the module contract and parameter smoother shared by
//! every DSP unit in a patch.
//!
//! # Core Abstractions
//!
//! - [`Module`] - the uniform, object-safe capability set every patch
//!   module implements (§4.2): `process_audio`, `process_control`,
//!   `draw_ui`, `handle_input`, `set_param`, `destroy`.
//! - [`ModuleIo`] - the audio/CV buffers handed to a module for one block.
//! - [`SmoothedParam`] / [`LinearSmoothedParam`] - parameter smoothers
//!   (§4.1) applied to user-facing parameters before they reach DSP.
//!
//! Everything else — oscillator waveforms, filter topologies, envelope
//! state machines, spectral processing — lives in `patchbay-modules`,
//! one file per module kind, each reaching for `libm` directly rather
//! than a shared effect-chain abstraction. This crate stays to the
//! module contract and the one piece of DSP state every module shares
//! regardless of kernel.
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature
//! to build without an allocator-backed standard library:
//!
//! ```toml
//! [dependencies]
//! patchbay-core = { version = "0.1", default-features = false }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod module;
pub mod param;

pub use module::{
    ControlInput, InputKey, MAX_BLOCK_SIZE, MAX_INPUTS, Module, ModuleHandle, ModuleIo,
};
pub use param::{LinearSmoothedParam, SmoothedParam};
