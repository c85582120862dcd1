//! Spectral tilt: a gentle high/low balance filter applied in the
//! frequency domain rather than with a shelving biquad.
//!
//! Grounded on `original_source/modules/spec_tilt/spec_tilt.c`: each
//! bin's gain is `10^(tilt * 3 * log2(bin_hz / pivot_hz) / 20)` — flat
//! at `pivot_hz`, tilting up or down by 3 dB per octave scaled by
//! `tilt`, skipped entirely when `tilt` is near zero to save the trig
//! calls on a silent control.

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32};

use crate::spectral::StftEngine;
use crate::util::{CommandEntry, CommandOutcome};

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = FFT_SIZE / 2;

pub struct SpecTiltModule {
    tilt: f32,
    pivot_hz: f32,
    sample_rate: f32,
    smooth_tilt: SmoothedParam,
    smooth_pivot: SmoothedParam,
    engine: StftEngine,
    cmd: CommandEntry,
}

impl SpecTiltModule {
    fn new(tilt: f32, pivot_hz: f32, sample_rate: f32) -> Self {
        let mut m = Self {
            tilt,
            pivot_hz,
            sample_rate,
            smooth_tilt: SmoothedParam::with_config(tilt, sample_rate, 8.0),
            smooth_pivot: SmoothedParam::with_config(pivot_hz, sample_rate, 8.0),
            engine: StftEngine::new(FFT_SIZE, HOP_SIZE),
            cmd: CommandEntry::default(),
        };
        m.smooth_tilt.set_immediate(tilt);
        m.smooth_pivot.set_immediate(pivot_hz);
        m.clamp_params();
        m
    }

    fn clamp_params(&mut self) {
        self.tilt = self.tilt.clamp(-1.0, 1.0);
        self.pivot_hz = self.pivot_hz.clamp(1.0, 20_000.0);
    }
}

impl Module for SpecTiltModule {
    fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
        self.smooth_tilt.set_target(self.tilt);
        self.smooth_pivot.set_target(self.pivot_hz);

        for i in 0..io.frames {
            let tilt = self.smooth_tilt.advance();
            let pivot_hz = self.smooth_pivot.advance();

            if self.engine.push(io.audio_in[i]) {
                if tilt.abs() >= 1e-4 {
                    let sample_rate = self.sample_rate;
                    for (b, bin) in self.engine.freq_bins_mut().iter_mut().enumerate() {
                        let bin_hz = self.engine.bin_hz(b, sample_rate).max(1.0);
                        let gain_db = tilt * 3.0 * libm::log2f(bin_hz / pivot_hz);
                        let gain = libm::powf(10.0, gain_db / 20.0);
                        *bin *= gain;
                    }
                }
                self.engine.finish_frame();
            }
        }

        self.engine.drain(io.audio_out, io.frames);
        for s in io.audio_out[..io.frames].iter_mut() {
            *s = crate::util::sanitize(*s);
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => {
                match tag {
                    '1' => self.tilt = value,
                    '2' => self.pivot_hz = value,
                    _ => {}
                }
                self.clamp_params();
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => match key {
                InputKey::Char('=') => {
                    self.tilt += 0.01;
                    self.clamp_params();
                }
                InputKey::Char('-') => {
                    self.tilt -= 0.01;
                    self.clamp_params();
                }
                InputKey::Char('+') => {
                    self.pivot_hz += 1.0;
                    self.clamp_params();
                }
                InputKey::Char('_') => {
                    self.pivot_hz -= 1.0;
                    self.clamp_params();
                }
                _ => {}
            },
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "tilt" => self.tilt = value,
            "pivot_hz" => self.pivot_hz = value,
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "tilt" => Some(self.tilt),
            "pivot_hz" => Some(self.pivot_hz),
            _ => None,
        }
    }

    fn produces_audio(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "spec_tilt",
        name: "Spectral Tilt",
        description: "Frequency-domain high/low balance pivoting around a configurable frequency",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let tilt = config_f32("spec_tilt", config, "tilt", 0.0)?;
    let pivot_hz = config_f32("spec_tilt", config, "pivot_hz", 1000.0)?;
    Ok(Box::new(SpecTiltModule::new(tilt, pivot_hz, sample_rate)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_silence(module: &mut SpecTiltModule, frames: usize, blocks: usize) -> Vec<f32> {
        let audio_in = vec![0.0f32; frames];
        let mut audio_out = vec![0.0f32; frames];
        let mut control_out = vec![0.0f32; frames];
        let mut last = Vec::new();
        for _ in 0..blocks {
            let mut io = ModuleIo {
                audio_in: &audio_in,
                audio_out: &mut audio_out,
                control_in: &[],
                control_out: &mut control_out,
                frames,
            };
            module.process_audio(&mut io);
            last = io.audio_out.to_vec();
        }
        last
    }

    #[test]
    fn flat_tilt_is_near_pass_through_on_silence() {
        let mut m = SpecTiltModule::new(0.0, 1000.0, 48000.0);
        let out = run_silence(&mut m, 64, 40);
        assert!(out.iter().all(|&s| s.abs() < 1e-3));
    }

    #[test]
    fn output_always_finite_and_bounded() {
        let mut m = SpecTiltModule::new(0.8, 400.0, 48000.0);
        let frames = 64;
        let audio_in: Vec<f32> = (0..frames).map(|i| libm::sinf(i as f32 * 0.3)).collect();
        let mut audio_out = vec![0.0f32; frames];
        let mut control_out = vec![0.0f32; frames];
        for _ in 0..60 {
            let mut io = ModuleIo {
                audio_in: &audio_in,
                audio_out: &mut audio_out,
                control_in: &[],
                control_out: &mut control_out,
                frames,
            };
            m.process_audio(&mut io);
            assert!(io.audio_out.iter().all(|&s| s.is_finite() && (-1.0..=1.0).contains(&s)));
        }
    }

    #[test]
    fn command_entry_sets_pivot() {
        let mut m = SpecTiltModule::new(0.0, 1000.0, 48000.0);
        for c in ":2 500".chars() {
            m.handle_input(InputKey::Char(c));
        }
        m.handle_input(InputKey::Enter);
        assert!((m.pivot_hz - 500.0).abs() < 1e-6);
    }
}
