//! Spectral ring modulator: multiplies the carrier's per-bin magnitude
//! by a modulator signal's magnitude within a configurable frequency
//! band, leaving bins outside the band untouched.
//!
//! Grounded on `original_source/modules/spec_ringmod/spec_ringmod.c`'s
//! `SPEC_OP_RING` case (the original's other five `SpecRingOp` variants
//! are cross-synthesis/spectral-AM variations not named by §4.8's
//! abbreviated contract, so only the ring case is carried over). The
//! modulator reaches this module as a `cv="mod"` control input rather
//! than a second audio port — `ModuleIo` carries one pre-mixed audio
//! input per module (§4.5), so a second audio-rate signal can only
//! arrive over the control plane, same sample rate, read per-sample out
//! of `control_in` like any other CV.

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32};

use crate::spectral::StftEngine;
use crate::util::{CommandEntry, CommandOutcome};

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = FFT_SIZE / 2;

pub struct RingModModule {
    mix: f32,
    band_low: f32,
    band_high: f32,
    sample_rate: f32,
    smooth_mix: SmoothedParam,
    carrier: StftEngine,
    modulator: StftEngine,
    dry: [f32; FFT_SIZE],
    dry_write: usize,
    cmd: CommandEntry,
}

impl RingModModule {
    fn new(mix: f32, band_low: f32, band_high: f32, sample_rate: f32) -> Self {
        let mut m = Self {
            mix,
            band_low,
            band_high,
            sample_rate,
            smooth_mix: SmoothedParam::with_config(mix, sample_rate, 10.0),
            carrier: StftEngine::new(FFT_SIZE, HOP_SIZE),
            modulator: StftEngine::new(FFT_SIZE, HOP_SIZE),
            dry: [0.0; FFT_SIZE],
            dry_write: 0,
            cmd: CommandEntry::default(),
        };
        m.smooth_mix.set_immediate(mix);
        m.clamp_params();
        m
    }

    fn clamp_params(&mut self) {
        let nyquist = self.sample_rate * 0.45;
        self.mix = self.mix.clamp(0.0, 1.0);
        self.band_low = self.band_low.clamp(20.0, nyquist);
        self.band_high = self.band_high.clamp(self.band_low, nyquist);
    }
}

impl Module for RingModModule {
    fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
        self.smooth_mix.set_target(self.mix);

        let mod_buf = io
            .control_in
            .iter()
            .find(|(_, name)| *name == "mod")
            .map(|(buf, _)| *buf);

        for i in 0..io.frames {
            let mix = self.smooth_mix.advance();
            let carrier_sample = io.audio_in[i];
            let mod_sample = mod_buf.and_then(|b| b.get(i)).copied().unwrap_or(0.0);

            self.dry[self.dry_write] = carrier_sample;
            self.dry_write = (self.dry_write + 1) % FFT_SIZE;

            let carrier_ready = self.carrier.push(carrier_sample);
            let mod_ready = self.modulator.push(mod_sample);

            if carrier_ready && mod_ready {
                let bins = self.carrier.bins();
                let nyquist = self.sample_rate * 0.5;
                let bin_low = ((self.band_low / nyquist) * (bins - 1) as f32) as usize;
                let bin_high = ((self.band_high / nyquist) * (bins - 1) as f32) as usize;
                let mod_freq = self.modulator.freq_bins_mut().to_vec();
                for (b, car_bin) in self.carrier.freq_bins_mut().iter_mut().enumerate() {
                    if b < bin_low || b > bin_high {
                        continue;
                    }
                    let mod_mag = mod_freq[b].norm().min(1.0);
                    let phase = car_bin.arg();
                    *car_bin = rustfft::num_complex::Complex::from_polar(mod_mag, phase);
                }
                self.carrier.finish_frame();
                self.modulator.finish_frame();
            }
        }

        self.carrier.drain(io.audio_out, io.frames);
        // The modulator's resynthesized audio is never used — only its
        // analysis spectrum feeds the carrier's magnitude multiply — but
        // its output ring must still be drained each block or it would
        // keep accumulating overlap-add energy forever.
        let mut mod_scratch = [0.0f32; patchbay_core::MAX_BLOCK_SIZE];
        self.modulator.drain(&mut mod_scratch[..io.frames], io.frames);

        let mix = self.smooth_mix.get();
        for i in 0..io.frames {
            let dry_index = (self.dry_write + FFT_SIZE - io.frames + i) % FFT_SIZE;
            let dry = self.dry[dry_index];
            let wet = io.audio_out[i];
            io.audio_out[i] = crate::util::sanitize(wet * mix + dry * (1.0 - mix));
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => {
                match tag {
                    '1' => self.band_low = value,
                    '2' => self.band_high = value,
                    '3' => self.mix = value,
                    _ => {}
                }
                self.clamp_params();
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => match key {
                InputKey::Char('=') => {
                    self.band_low += 0.5;
                    self.clamp_params();
                }
                InputKey::Char('-') => {
                    self.band_low -= 0.5;
                    self.clamp_params();
                }
                InputKey::Char('+') => {
                    self.band_high += 1.0;
                    self.clamp_params();
                }
                InputKey::Char('_') => {
                    self.band_high -= 1.0;
                    self.clamp_params();
                }
                InputKey::Char('\'') => {
                    self.mix += 0.01;
                    self.clamp_params();
                }
                InputKey::Char(';') => {
                    self.mix -= 0.01;
                    self.clamp_params();
                }
                _ => {}
            },
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "mix" => self.mix = value,
            "band_low" => self.band_low = value,
            "band_high" => self.band_high = value,
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "mix" => Some(self.mix),
            "band_low" => Some(self.band_low),
            "band_high" => Some(self.band_high),
            _ => None,
        }
    }

    fn produces_audio(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "ring_mod",
        name: "Spectral Ring Modulator",
        description: "Multiplies carrier bin magnitudes by a cv=\"mod\" signal's spectrum within a band",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let mix = config_f32("ring_mod", config, "mix", 1.0)?;
    let band_low = config_f32("ring_mod", config, "band_low", 20.0)?;
    let band_high = config_f32("ring_mod", config, "band_high", sample_rate * 0.45)?;
    Ok(Box::new(RingModModule::new(mix, band_low, band_high, sample_rate)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_inputs_produce_silence_output() {
        let mut m = RingModModule::new(1.0, 20.0, 20000.0, 48000.0);
        let frames = 64;
        let audio_in = vec![0.0f32; frames];
        let cv = vec![0.0f32; frames];
        let mut audio_out = vec![0.0f32; frames];
        let mut control_out = vec![0.0f32; frames];
        for _ in 0..40 {
            let mut io = ModuleIo {
                audio_in: &audio_in,
                audio_out: &mut audio_out,
                control_in: &[(&cv, "mod")],
                control_out: &mut control_out,
                frames,
            };
            m.process_audio(&mut io);
            assert!(io.audio_out.iter().all(|&s| s.abs() < 1e-3));
        }
    }

    #[test]
    fn output_stays_finite_and_bounded() {
        let mut m = RingModModule::new(0.5, 20.0, 20000.0, 48000.0);
        let frames = 64;
        let audio_in: Vec<f32> = (0..frames).map(|i| libm::sinf(i as f32 * 0.4)).collect();
        let cv: Vec<f32> = (0..frames).map(|i| libm::sinf(i as f32 * 0.05)).collect();
        let mut audio_out = vec![0.0f32; frames];
        let mut control_out = vec![0.0f32; frames];
        for _ in 0..60 {
            let mut io = ModuleIo {
                audio_in: &audio_in,
                audio_out: &mut audio_out,
                control_in: &[(&cv, "mod")],
                control_out: &mut control_out,
                frames,
            };
            m.process_audio(&mut io);
            assert!(io.audio_out.iter().all(|&s| s.is_finite() && (-1.0..=1.0).contains(&s)));
        }
    }
}
