//! Uniform module contract shared by every DSP unit in a patch.
//!
//! Mirrors the function-table polymorphism of the original `Module`
//! struct (a name, a state pointer, and a handful of optional function
//! pointers) as a Rust trait object: every capability is a method with a
//! no-op default, so a concrete module implements only what it needs.
//!
//! The trait is object-safe — patch graphs store `Box<dyn Module + Send>`
//! — matching how `patchbay-core`'s `Effect` trait is kept object-safe for
//! `Box<dyn Effect>` chains.

#[cfg(not(feature = "std"))]
use alloc::string::String;

/// Upper bound on samples processed per audio callback.
///
/// Buffers inside modules and the scheduler are sized to this constant so
/// no allocation is ever needed on the audio thread.
pub const MAX_BLOCK_SIZE: usize = 4096;

/// Maximum number of audio connections fanning into a single input port.
pub const MAX_INPUTS: usize = 32;

/// A control (CV) input: a handle to the source module's control-output
/// buffer, paired with the name of the parameter it modulates.
#[derive(Clone)]
pub struct ControlInput {
    /// Name of the parameter this CV signal modulates on the owning module.
    pub param: String,
    /// Index of the source module's control-output buffer in the
    /// scheduler's buffer pool.
    pub source: ModuleHandle,
}

/// Opaque handle identifying a module's position in a compiled schedule.
///
/// Stable for the lifetime of a patch (modules are never reordered or
/// removed after compilation — see the patch graph's Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle(pub usize);

/// A single keystroke delivered to a module's `handle_input`.
///
/// Printable ASCII is carried as `Char`; control keys relevant to the
/// command-entry mini-language (§4.2/§6) get their own variants so
/// modules don't need to special-case raw key codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKey {
    /// A printable character key.
    Char(char),
    /// Enter / newline — ends command entry.
    Enter,
    /// Escape — aborts command entry.
    Escape,
    /// Backspace — edits the command buffer.
    Backspace,
}

/// The audio/CV buffers a module reads and writes for one callback.
///
/// Passed to `process_audio`/`process_control` instead of raw slices so
/// every module sees the same shape regardless of how many inputs it
/// declared in the patch text.
pub struct ModuleIo<'a> {
    /// Pre-mixed audio input for this block (silence if the module has
    /// no audio inputs), `frames` samples long — see the scheduler's
    /// uniform-gain fan-in rule.
    pub audio_in: &'a [f32],
    /// This module's audio output buffer, to be fully filled for
    /// `frames` samples if the module implements `process_audio`.
    pub audio_out: &'a mut [f32],
    /// This module's declared control (CV) inputs: raw buffers plus the
    /// parameter name each one targets. Modules combine same-named
    /// targets additively before clamping (§4.5).
    pub control_in: &'a [(&'a [f32], &'a str)],
    /// This module's control-output buffer, to be fully filled for
    /// `frames` samples if the module implements `process_control`.
    pub control_out: &'a mut [f32],
    /// Number of valid samples in this block.
    pub frames: usize,
}

/// The uniform capability set every patch module implements.
///
/// A module implements only the capabilities relevant to it; every
/// method has a no-op default. Exactly one of `process_audio` /
/// `process_control` is normally a module's primary work function
/// (§4.2), though hybrid modules (sample-and-hold) may fill a control
/// output from inside `process_audio`.
pub trait Module: Send {
    /// Advance the module's audio-rate processing for one block.
    ///
    /// Implementations MUST fully fill `io.audio_out[..io.frames]` when
    /// this capability is present. Default: no-op (leaves output silent).
    fn process_audio(&mut self, _io: &mut ModuleIo<'_>) {}

    /// Advance the module's control-rate processing for one block.
    ///
    /// Implementations MUST fully fill `io.control_out[..io.frames]` when
    /// this capability is present. Default: no-op.
    fn process_control(&mut self, _io: &mut ModuleIo<'_>) {}

    /// Render this module's portion of the terminal UI at `(y, x)`.
    ///
    /// Default: no-op — not every module has a UI representation.
    fn draw_ui(&self, _y: u16, _x: u16) {}

    /// Handle one keystroke from the UI thread's broadcast (§4.6).
    ///
    /// Default: ignore. Modules that accept keyboard control implement a
    /// two-state machine (normal / command-entry) as described in §4.2.
    fn handle_input(&mut self, _key: InputKey) {}

    /// Set a named parameter to a new value — the uniform OSC/scripted
    /// entry point (§4.2). MUST be lock-safe and non-blocking on the
    /// audio thread; implementations take only their own internal lock.
    ///
    /// Default: ignore unknown parameters (the target module is the
    /// ultimate authority on which names it accepts, per §4.4/§6).
    fn set_param(&mut self, _name: &str, _value: f32) {}

    /// Read a named parameter's current authoritative value, if known.
    ///
    /// Used by the OSC/UI layers to echo state; not part of the audio
    /// path. Default: unsupported.
    fn get_param(&self, _name: &str) -> Option<f32> {
        None
    }

    /// Tear down module-specific resources (join writer threads, etc.).
    ///
    /// Called once, in the reverse of instantiation order, during engine
    /// shutdown (§5). Default: no-op — `Drop` handles plain deallocation.
    fn destroy(&mut self) {}

    /// Whether this module has an audio output (used by the scheduler to
    /// find the final module in chain whose buffer becomes the driver's
    /// output, §4.5 step 3).
    fn produces_audio(&self) -> bool {
        false
    }

    /// Whether this module has a control output (used when wiring `cv=`
    /// edges and validating `cv:param` targets for a secondary clock).
    fn produces_control(&self) -> bool {
        false
    }
}
