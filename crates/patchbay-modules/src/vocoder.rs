//! Channel vocoder: imposes a modulator's band-energy envelope onto a
//! carrier, band by band.
//!
//! Grounded on `original_source/modules/vocoder/vocoder.c`'s band
//! layout and envelope-follower concept, reimplemented over STFT bins
//! instead of the original's per-band biquad bank plus rectify-and-
//! smooth follower (§4.8's generic "envelope-driven gain" spectral
//! contract) — grouping by [`bark_band_edges`] matches the original's
//! Bark-spaced analysis bands without carrying over its fixed
//! `VOCODER_BANDS` filter coefficient tables.

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32};

use crate::spectral::{StftEngine, bark_band_edges};
use crate::util::{CommandEntry, CommandOutcome};

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = FFT_SIZE / 2;
const NUM_BANDS: usize = 24;

pub struct VocoderModule {
    mix: f32,
    mod_gain: f32,
    sample_rate: f32,
    smooth_mix: SmoothedParam,
    smooth_mod_gain: SmoothedParam,
    band_env: [f32; NUM_BANDS],
    carrier: StftEngine,
    modulator: StftEngine,
    dry: [f32; FFT_SIZE],
    dry_write: usize,
    cmd: CommandEntry,
}

impl VocoderModule {
    fn new(mix: f32, mod_gain: f32, sample_rate: f32) -> Self {
        let mut m = Self {
            mix,
            mod_gain,
            sample_rate,
            smooth_mix: SmoothedParam::with_config(mix, sample_rate, 10.0),
            smooth_mod_gain: SmoothedParam::with_config(mod_gain, sample_rate, 10.0),
            band_env: [0.0; NUM_BANDS],
            carrier: StftEngine::new(FFT_SIZE, HOP_SIZE),
            modulator: StftEngine::new(FFT_SIZE, HOP_SIZE),
            dry: [0.0; FFT_SIZE],
            dry_write: 0,
            cmd: CommandEntry::default(),
        };
        m.smooth_mix.set_immediate(mix);
        m.smooth_mod_gain.set_immediate(mod_gain);
        m.clamp_params();
        m
    }

    fn clamp_params(&mut self) {
        self.mix = self.mix.clamp(0.0, 1.0);
        self.mod_gain = self.mod_gain.clamp(0.0, 2.0);
    }
}

impl Module for VocoderModule {
    fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
        self.smooth_mix.set_target(self.mix);
        self.smooth_mod_gain.set_target(self.mod_gain);

        let mod_buf = io
            .control_in
            .iter()
            .find(|(_, name)| *name == "mod")
            .map(|(buf, _)| *buf);

        for i in 0..io.frames {
            let mix = self.smooth_mix.advance();
            let mod_gain = self.smooth_mod_gain.advance();

            let carrier_sample = io.audio_in[i];
            let mod_sample = mod_buf.and_then(|b| b.get(i)).copied().unwrap_or(0.0) * mod_gain;

            self.dry[self.dry_write] = carrier_sample;
            self.dry_write = (self.dry_write + 1) % FFT_SIZE;

            let carrier_ready = self.carrier.push(carrier_sample);
            let mod_ready = self.modulator.push(mod_sample);

            if carrier_ready && mod_ready {
                let bins = self.carrier.bins();
                let edges = bark_band_edges(bins, self.sample_rate, NUM_BANDS);

                let mod_mags: Vec<f32> = self.modulator.freq_bins_mut().iter().map(|c| c.norm()).collect();
                for (band, &start) in edges.iter().enumerate() {
                    let end = edges.get(band + 1).copied().unwrap_or(bins);
                    let energy: f32 = mod_mags[start..end].iter().sum::<f32>() / (end - start).max(1) as f32;
                    // One-pole envelope follower: fast attack, slower release.
                    let coeff = if energy > self.band_env[band] { 0.6 } else { 0.15 };
                    self.band_env[band] += coeff * (energy - self.band_env[band]);
                }

                for (band, &start) in edges.iter().enumerate() {
                    let end = edges.get(band + 1).copied().unwrap_or(bins);
                    let env = self.band_env[band];
                    for car_bin in &mut self.carrier.freq_bins_mut()[start..end] {
                        let phase = car_bin.arg();
                        *car_bin = rustfft::num_complex::Complex::from_polar(env, phase);
                    }
                }
                self.carrier.finish_frame();
                self.modulator.finish_frame();
            }
        }

        self.carrier.drain(io.audio_out, io.frames);
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
                    '1' => self.mix = value,
                    '2' => self.mod_gain = value,
                    _ => {}
                }
                self.clamp_params();
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => match key {
                InputKey::Char('=') => {
                    self.mix += 0.01;
                    self.clamp_params();
                }
                InputKey::Char('-') => {
                    self.mix -= 0.01;
                    self.clamp_params();
                }
                InputKey::Char('+') => {
                    self.mod_gain += 0.05;
                    self.clamp_params();
                }
                InputKey::Char('_') => {
                    self.mod_gain -= 0.05;
                    self.clamp_params();
                }
                _ => {}
            },
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "mix" => self.mix = value,
            "mod_gain" => self.mod_gain = value,
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "mix" => Some(self.mix),
            "mod_gain" => Some(self.mod_gain),
            _ => None,
        }
    }

    fn produces_audio(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "vocoder",
        name: "Vocoder",
        description: "Imposes a cv=\"mod\" signal's band-energy envelope onto a carrier, band by band",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let mix = config_f32("vocoder", config, "mix", 1.0)?;
    let mod_gain = config_f32("vocoder", config, "mod_gain", 1.0)?;
    Ok(Box::new(VocoderModule::new(mix, mod_gain, sample_rate)))
}
