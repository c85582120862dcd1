//! Built-in module implementations, registered into a
//! [`patchbay_registry::ModuleRegistry`] by [`register_builtins`].
//!
//! Every module here implements `patchbay_core::Module` and exposes a
//! crate-private `descriptor()`/`create()` pair; `register_builtins`
//! wires those into the shared registry the patch loader reads from
//! (§4.3).

mod bark_bank;
mod clock_s;
mod clock_u;
mod envelope;
mod lfo;
mod midi_to_cv;
mod moog_filter;
mod noise;
mod random;
mod recorder;
mod ring_mod;
mod sample_hold;
mod spec_tilt;
mod spectral;
mod util;
mod vco;
mod vocoder;
mod wav_player;

use patchbay_registry::ModuleRegistry;

/// Registers every built-in module type under its `id` (§4.3's "loader
/// queries a process-wide registry keyed by type string").
pub fn register_builtins(registry: &mut ModuleRegistry) {
    registry.register(vco::descriptor(), vco::create);
    registry.register(moog_filter::descriptor(), moog_filter::create);
    registry.register(envelope::descriptor(), envelope::create);
    registry.register(lfo::descriptor(), lfo::create);
    registry.register(random::descriptor(), random::create);
    registry.register(noise::descriptor(), noise::create);
    registry.register(sample_hold::descriptor(), sample_hold::create);
    registry.register(clock_s::descriptor(), clock_s::create);
    registry.register(clock_u::descriptor(), clock_u::create);
    registry.register(wav_player::descriptor(), wav_player::create);
    registry.register(recorder::descriptor(), recorder::create);
    registry.register(midi_to_cv::descriptor(), midi_to_cv::create);
    registry.register(spec_tilt::descriptor(), spec_tilt::create);
    registry.register(ring_mod::descriptor(), ring_mod::create);
    registry.register(vocoder::descriptor(), vocoder::create);
    registry.register(bark_bank::descriptor(), bark_bank::create);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_registers_without_panicking() {
        let mut registry = ModuleRegistry::new();
        register_builtins(&mut registry);
        assert!(registry.len() >= 16);
    }

    #[test]
    fn every_builtin_type_instantiates_with_defaults() {
        // wav_player's default config names a file on disk (`file=sample.wav`)
        // and has no silence fallback (a missing sample file is a patch-load
        // configuration error, per the registry's fail-fast contract) — it
        // gets its own file-backed coverage in wav_player's test module.
        let mut registry = ModuleRegistry::new();
        register_builtins(&mut registry);
        for descriptor in registry.all() {
            if descriptor.id == "wav_player" {
                continue;
            }
            let result = registry.create(descriptor.id, &[], 48000.0);
            assert!(result.is_ok(), "failed to create default {}", descriptor.id);
        }
    }
}
