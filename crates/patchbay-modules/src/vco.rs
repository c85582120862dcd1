//! Voltage-controlled oscillator: phase-continuous audio-rate waveform
//! generator with PolyBLEP-corrected discontinuous waveforms.
//!
//! Grounded on `original_source/modules/vco/vco.c`: four waveforms
//! (sine/saw/square/triangle), an exponential `min_hz * (max_hz/min_hz)^norm`
//! frequency mapping on the OSC `freq` parameter (so a normalized `[0,1]`
//! slider spans the configured range musically rather than linearly), four
//! selectable frequency ranges, and `freq`/`amp` CV inputs that modulate the
//! base value proportional to headroom rather than flat-additively: `freq`'s
//! mod range is `frequency * mod_depth` (a full-scale CV swings the pitch
//! ±100% of its current frequency) and `amp`'s is `(1.0 - amplitude) *
//! mod_depth` (a full-scale CV can only ever reach full amplitude, never
//! overshoot it), with `mod_depth` fixed at `1.0` as in the original.
//!
//! The smoothed-base + per-sample-CV split mirrors `vco_process`: a block's
//! worth of smoothing runs once per sample on the *smoothed target*, while
//! the raw CV sample is applied fresh each sample against the unsmoothed
//! base value.

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32, config_str};

use crate::util::{CommandEntry, CommandOutcome, sanitize};

/// Oscillator waveform — selects the per-sample generator in
/// [`VcoModule::next_sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Saw,
    Square,
    Triangle,
}

impl Waveform {
    fn next(self) -> Self {
        match self {
            Waveform::Sine => Waveform::Saw,
            Waveform::Saw => Waveform::Square,
            Waveform::Square => Waveform::Triangle,
            Waveform::Triangle => Waveform::Sine,
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "sine" => Some(Waveform::Sine),
            "saw" => Some(Waveform::Saw),
            "square" => Some(Waveform::Square),
            "triangle" => Some(Waveform::Triangle),
            _ => None,
        }
    }
}

/// Frequency range preset, selected with the `r` key; bounds the
/// oscillator's clamp window and the exponential OSC mapping's ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RangeMode {
    Low,
    Mid,
    Full,
    Super,
}

impl RangeMode {
    fn next(self) -> Self {
        match self {
            RangeMode::Low => RangeMode::Mid,
            RangeMode::Mid => RangeMode::Full,
            RangeMode::Full => RangeMode::Super,
            RangeMode::Super => RangeMode::Low,
        }
    }

    fn max_hz(self, sample_rate: f32) -> f32 {
        match self {
            RangeMode::Low => 2000.0,
            RangeMode::Mid => 8000.0,
            RangeMode::Full => 20_000.0,
            RangeMode::Super => sample_rate * 0.45,
        }
    }
}

const MIN_HZ: f32 = 20.0;

/// Standard 2-sample-window PolyBLEP correction.
fn poly_blep(t: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return 0.0;
    }
    if t < dt {
        let t = t / dt;
        t + t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}

pub struct VcoModule {
    frequency: f32,
    amplitude: f32,
    waveform: Waveform,
    range: RangeMode,
    phase: f32,
    tri_state: f32,
    sample_rate: f32,
    smooth_freq: SmoothedParam,
    smooth_amp: SmoothedParam,
    cmd: CommandEntry,
}

impl VcoModule {
    fn new(frequency: f32, amplitude: f32, waveform: Waveform, sample_rate: f32) -> Self {
        let mut smooth_freq = SmoothedParam::with_config(frequency, sample_rate, 15.0);
        smooth_freq.set_immediate(frequency);
        let mut smooth_amp = SmoothedParam::with_config(amplitude, sample_rate, 3.0);
        smooth_amp.set_immediate(amplitude);
        let mut vco = Self {
            frequency,
            amplitude,
            waveform,
            range: RangeMode::Low,
            phase: 0.0,
            tri_state: 0.0,
            sample_rate,
            smooth_freq,
            smooth_amp,
            cmd: CommandEntry::default(),
        };
        vco.clamp_params();
        vco
    }

    fn clamp_params(&mut self) {
        let max_hz = self.range.max_hz(self.sample_rate);
        self.frequency = self.frequency.clamp(MIN_HZ, max_hz);
        self.amplitude = self.amplitude.clamp(0.0, 1.0);
    }

    fn next_sample(&mut self, freq: f32, amp: f32) -> f32 {
        let t = self.phase / core::f32::consts::TAU;
        let dt = freq / self.sample_rate;
        let value = match self.waveform {
            Waveform::Sine => libm::sinf(self.phase),
            Waveform::Saw => 2.0 * t - 1.0 - poly_blep(t, dt),
            Waveform::Square => {
                let naive = if t < 0.5 { 1.0 } else { -1.0 };
                naive + poly_blep(t, dt) - poly_blep((t + 0.5).fract(), dt)
            }
            Waveform::Triangle => {
                let sq = if t < 0.5 { 1.0 } else { -1.0 };
                let blep_sq = sq + poly_blep(t, dt) - poly_blep((t + 0.5).fract(), dt);
                self.tri_state += 2.0 * dt * blep_sq;
                self.tri_state *= 0.999;
                self.tri_state = self.tri_state.clamp(-1.0, 1.0);
                self.tri_state * 2.0
            }
        };
        self.phase += core::f32::consts::TAU * dt;
        if self.phase >= core::f32::consts::TAU {
            self.phase -= core::f32::consts::TAU;
        }
        sanitize(amp * value)
    }
}

impl Module for VcoModule {
    fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
        const MOD_DEPTH: f32 = 1.0;
        let max_hz = self.range.max_hz(self.sample_rate);
        for i in 0..io.frames {
            let mut freq = self.frequency;
            let mut amp = self.amplitude;
            for (buf, name) in io.control_in {
                let Some(&raw) = buf.get(i) else { continue };
                let norm = raw.clamp(-1.0, 1.0);
                match *name {
                    "freq" => {
                        let mod_range = self.frequency * MOD_DEPTH;
                        freq = self.frequency + norm * mod_range;
                    }
                    "amp" => {
                        let mod_range = (1.0 - self.amplitude) * MOD_DEPTH;
                        amp = self.amplitude + norm * mod_range;
                    }
                    _ => {}
                }
            }
            freq = freq.clamp(MIN_HZ, max_hz);
            amp = amp.clamp(0.0, 1.0);
            self.smooth_freq.set_target(freq);
            self.smooth_amp.set_target(amp);
            let smoothed_freq = self.smooth_freq.advance();
            let smoothed_amp = self.smooth_amp.advance();
            io.audio_out[i] = self.next_sample(smoothed_freq, smoothed_amp);
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => {
                match tag {
                    '1' => self.frequency = value,
                    '2' => self.amplitude = value,
                    '3' => {
                        self.waveform = match value as i32 % 4 {
                            0 => Waveform::Sine,
                            1 => Waveform::Saw,
                            2 => Waveform::Square,
                            _ => Waveform::Triangle,
                        }
                    }
                    _ => {}
                }
                self.clamp_params();
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => match key {
                InputKey::Char('=') => {
                    self.frequency += 0.5;
                    self.clamp_params();
                }
                InputKey::Char('-') => {
                    self.frequency -= 0.5;
                    self.clamp_params();
                }
                InputKey::Char('+') => {
                    self.amplitude += 0.01;
                    self.clamp_params();
                }
                InputKey::Char('_') => {
                    self.amplitude -= 0.01;
                    self.clamp_params();
                }
                InputKey::Char('w') => self.waveform = self.waveform.next(),
                InputKey::Char('r') => {
                    self.range = self.range.next();
                    self.clamp_params();
                }
                _ => {}
            },
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "freq" => {
                let max_hz = self.range.max_hz(self.sample_rate);
                let norm = value.clamp(0.0, 1.0);
                self.frequency = MIN_HZ * libm::powf(max_hz / MIN_HZ, norm);
            }
            "amp" => self.amplitude = value.clamp(0.0, 1.0),
            "wave" => {
                if value > 0.5 {
                    self.waveform = self.waveform.next();
                }
            }
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "freq" => Some(self.frequency),
            "amp" => Some(self.amplitude),
            _ => None,
        }
    }

    fn produces_audio(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "vco",
        name: "Voltage-Controlled Oscillator",
        description: "PolyBLEP-corrected audio-rate oscillator: sine/saw/square/triangle",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let freq = config_f32("vco", config, "freq", 440.0)?;
    let amp = config_f32("vco", config, "amp", 0.5)?;
    let wave_str = config_str(config, "wave", "sine");
    let waveform = Waveform::parse(wave_str).ok_or_else(|| RegistryError::InvalidConfigValue {
        module_type: "vco".to_string(),
        key: "wave".to_string(),
        value: wave_str.to_string(),
    })?;
    Ok(Box::new(VcoModule::new(freq, amp, waveform, sample_rate)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_stays_in_range_and_produces_audio() {
        let mut vco = VcoModule::new(440.0, 1.0, Waveform::Sine, 48000.0);
        let mut audio_out = [0.0f32; 256];
        let mut control_out = [0.0f32; 256];
        let mut io = ModuleIo {
            audio_in: &[0.0; 256],
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames: 256,
        };
        vco.process_audio(&mut io);
        assert!(io.audio_out.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(vco.produces_audio());
    }

    #[test]
    fn exponential_freq_mapping_spans_range() {
        let mut vco = VcoModule::new(440.0, 1.0, Waveform::Sine, 48000.0);
        vco.set_param("freq", 0.0);
        assert!((vco.frequency - MIN_HZ).abs() < 1e-3);
        vco.set_param("freq", 1.0);
        assert!((vco.frequency - RangeMode::Low.max_hz(48000.0)).abs() < 1e-2);
    }

    #[test]
    fn cv_freq_modulates_proportionally_within_bounds() {
        let mut vco = VcoModule::new(440.0, 1.0, Waveform::Sine, 48000.0);
        let mut audio_out = [0.0f32; 8];
        let mut control_out = [0.0f32; 8];
        let cv = [1.0f32; 8];
        let control_in: [(&[f32], &str); 1] = [(&cv, "freq")];
        let mut io = ModuleIo {
            audio_in: &[0.0; 8],
            audio_out: &mut audio_out,
            control_in: &control_in,
            control_out: &mut control_out,
            frames: 8,
        };
        vco.process_audio(&mut io);
        assert!(io.audio_out.iter().all(|s| s.is_finite()));
    }
}
