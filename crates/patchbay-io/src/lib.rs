//! Audio device enumeration and full-duplex streaming via cpal.
//!
//! This crate owns device I/O only. Turning a patch into samples is
//! `patchbay_patch::process_block`'s job; the binary wires the two
//! together by handing [`stream::AudioStream::run`] a closure that calls
//! `process_block` each callback.

mod stream;

pub use stream::{AudioDevice, AudioStream, StreamConfig, default_device, list_devices};

/// Failure opening or running an audio stream.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying cpal stream reported an error.
    #[error("audio stream error: {0}")]
    Stream(String),

    /// No input or output device was available to open.
    #[error("no audio device available")]
    NoDevice,

    /// A device name filter (§10.3's device filter config) matched nothing.
    #[error("device not found: {0}")]
    DeviceNotFound(String),
}

/// Result alias for this crate's fallible operations.
pub type Result<T> = std::result::Result<T, Error>;
