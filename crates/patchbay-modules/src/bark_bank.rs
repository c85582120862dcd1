//! Bark-scale graphic equalizer: a fixed number of perceptually spaced
//! bands, each independently gained, shaped by an overall Gaussian
//! `center`/`width` window and a linear `tilt`.
//!
//! Grounded on `original_source/modules/bark_bank/bark_bank.c`'s 24-band
//! layout and per-band gain concept, reimplemented as a frequency-domain
//! gain curve over STFT bins (§4.8's generic "gain curve" spectral
//! contract) rather than the original's cascaded biquad bank — the
//! per-band `b0..a2` coefficient tables are a filter-design concern this
//! crate has no use for once band shaping happens on FFT bins directly.

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32};

use crate::spectral::{StftEngine, bark_band_edges};
use crate::util::{CommandEntry, CommandOutcome};

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = FFT_SIZE / 2;
const NUM_BANDS: usize = 24;

pub struct BarkBankModule {
    center: f32,
    width: f32,
    tilt: f32,
    sample_rate: f32,
    smooth_center: SmoothedParam,
    smooth_width: SmoothedParam,
    smooth_tilt: SmoothedParam,
    band_gain: [f32; NUM_BANDS],
    engine: StftEngine,
    cmd: CommandEntry,
}

impl BarkBankModule {
    fn new(center: f32, width: f32, tilt: f32, sample_rate: f32) -> Self {
        let mut m = Self {
            center,
            width,
            tilt,
            sample_rate,
            smooth_center: SmoothedParam::with_config(center, sample_rate, 10.0),
            smooth_width: SmoothedParam::with_config(width, sample_rate, 10.0),
            smooth_tilt: SmoothedParam::with_config(tilt, sample_rate, 10.0),
            band_gain: [1.0; NUM_BANDS],
            engine: StftEngine::new(FFT_SIZE, HOP_SIZE),
            cmd: CommandEntry::default(),
        };
        m.smooth_center.set_immediate(center);
        m.smooth_width.set_immediate(width);
        m.smooth_tilt.set_immediate(tilt);
        m.clamp_params();
        m
    }

    fn clamp_params(&mut self) {
        self.center = self.center.clamp(0.0, 1.0);
        self.width = self.width.clamp(0.02, 1.0);
        self.tilt = self.tilt.clamp(-1.0, 1.0);
    }

    /// Effective gain for band `b` of `NUM_BANDS`, combining the band's
    /// own stored gain with a Gaussian `center`/`width` window and a
    /// linear `tilt` ramp across the band index.
    fn band_effective_gain(&self, b: usize, center: f32, width: f32, tilt: f32) -> f32 {
        let pos = b as f32 / (NUM_BANDS - 1) as f32;
        let d = (pos - center) / width;
        let window = libm::expf(-0.5 * d * d);
        let tilt_gain = 1.0 + tilt * (pos - 0.5) * 2.0;
        self.band_gain[b] * window.max(0.05) * tilt_gain.max(0.0)
    }
}

impl Module for BarkBankModule {
    fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
        self.smooth_center.set_target(self.center);
        self.smooth_width.set_target(self.width);
        self.smooth_tilt.set_target(self.tilt);

        for i in 0..io.frames {
            let center = self.smooth_center.advance();
            let width = self.smooth_width.advance();
            let tilt = self.smooth_tilt.advance();

            if self.engine.push(io.audio_in[i]) {
                let bins = self.engine.bins();
                let edges = bark_band_edges(bins, self.sample_rate, NUM_BANDS);
                for (band, &start) in edges.iter().enumerate() {
                    let end = edges.get(band + 1).copied().unwrap_or(bins);
                    let gain = self.band_effective_gain(band, center, width, tilt);
                    for bin in &mut self.engine.freq_bins_mut()[start..end] {
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
                    '1' => self.center = value,
                    '2' => self.width = value,
                    '3' => self.tilt = value,
                    _ => {}
                }
                self.clamp_params();
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => match key {
                InputKey::Char('=') => {
                    self.center += 0.01;
                    self.clamp_params();
                }
                InputKey::Char('-') => {
                    self.center -= 0.01;
                    self.clamp_params();
                }
                InputKey::Char('+') => {
                    self.width += 0.01;
                    self.clamp_params();
                }
                InputKey::Char('_') => {
                    self.width -= 0.01;
                    self.clamp_params();
                }
                _ => {}
            },
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "center" => self.center = value,
            "width" => self.width = value,
            "tilt" => self.tilt = value,
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "center" => Some(self.center),
            "width" => Some(self.width),
            "tilt" => Some(self.tilt),
            _ => None,
        }
    }

    fn produces_audio(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "bark_bank",
        name: "Bark Bank",
        description: "24-band Bark-scale graphic equalizer shaped by a center/width/tilt window",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let center = config_f32("bark_bank", config, "center", 0.5)?;
    let width = config_f32("bark_bank", config, "width", 0.3)?;
    let tilt = config_f32("bark_bank", config, "tilt", 0.0)?;
    Ok(Box::new(BarkBankModule::new(center, width, tilt, sample_rate)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_in_silence_out() {
        let mut m = BarkBankModule::new(0.5, 0.3, 0.0, 48000.0);
        let frames = 64;
        let audio_in = vec![0.0f32; frames];
        let mut audio_out = vec![0.0f32; frames];
        let mut control_out = vec![0.0f32; frames];
        for _ in 0..40 {
            let mut io = ModuleIo {
                audio_in: &audio_in,
                audio_out: &mut audio_out,
                control_in: &[],
                control_out: &mut control_out,
                frames,
            };
            m.process_audio(&mut io);
            assert!(io.audio_out.iter().all(|&s| s.abs() < 1e-3));
        }
    }

    #[test]
    fn band_edges_are_monotonic_and_in_range() {
        let edges = bark_band_edges(1025, 48000.0, NUM_BANDS);
        assert_eq!(edges.len(), NUM_BANDS);
        assert_eq!(edges[0], 0);
        for w in edges.windows(2) {
            assert!(w[0] <= w[1]);
        }
        assert!(*edges.last().unwrap() < 1025);
    }

    #[test]
    fn output_stays_finite_and_bounded() {
        let mut m = BarkBankModule::new(0.6, 0.2, 0.3, 48000.0);
        let frames = 64;
        let audio_in: Vec<f32> = (0..frames).map(|i| libm::sinf(i as f32 * 0.35)).collect();
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
}
