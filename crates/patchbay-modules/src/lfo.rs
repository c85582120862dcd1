//! Low-frequency control-rate oscillator with bipolar/unipolar output.
//!
//! Grounded on `original_source/modules/c_lfo/c_lfo.c`: four waveforms
//! (sine via a lookup table in the original, `libm::sinf` here since
//! a table buys nothing at control rate), a `freq` CV input that scales
//! *with* the smoothed base frequency rather than adding a fixed CV
//! span (`freq += control * freq_s`, unlike every other module's plain
//! additive CV), and `amp`/`depth` CV inputs that add directly. Output
//! polarity selects between `depth * amp * value` (bipolar) and
//! `depth * (0.5 + 0.5 * amp * value)` (unipolar, e.g. for driving an
//! amplitude CV that should never go negative).

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32};

use crate::util::{CommandEntry, CommandOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Waveform {
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

    fn from_index(i: i32) -> Self {
        match i.rem_euclid(4) {
            0 => Waveform::Sine,
            1 => Waveform::Saw,
            2 => Waveform::Square,
            _ => Waveform::Triangle,
        }
    }
}

const MIN_FREQ: f32 = 0.001;
const MAX_FREQ: f32 = 100.0;

pub struct LfoModule {
    frequency: f32,
    amplitude: f32,
    depth: f32,
    waveform: Waveform,
    polarity_bipolar: bool,
    phase: f32,
    tri_state: f32,
    sample_rate: f32,
    smooth_freq: SmoothedParam,
    smooth_amp: SmoothedParam,
    smooth_depth: SmoothedParam,
    cmd: CommandEntry,
}

impl LfoModule {
    fn new(frequency: f32, amplitude: f32, depth: f32, sample_rate: f32) -> Self {
        let mut smooth_freq = SmoothedParam::with_config(frequency, sample_rate, 15.0);
        smooth_freq.set_immediate(frequency);
        let mut smooth_amp = SmoothedParam::with_config(amplitude, sample_rate, 15.0);
        smooth_amp.set_immediate(amplitude);
        let mut smooth_depth = SmoothedParam::with_config(depth, sample_rate, 15.0);
        smooth_depth.set_immediate(depth);
        let mut lfo = Self {
            frequency,
            amplitude,
            depth,
            waveform: Waveform::Sine,
            polarity_bipolar: true,
            phase: 0.0,
            tri_state: 0.0,
            sample_rate,
            smooth_freq,
            smooth_amp,
            smooth_depth,
            cmd: CommandEntry::default(),
        };
        lfo.clamp_params();
        lfo
    }

    fn clamp_params(&mut self) {
        self.frequency = self.frequency.clamp(MIN_FREQ, MAX_FREQ);
        self.amplitude = self.amplitude.clamp(0.0, 1.0);
        self.depth = self.depth.clamp(0.0, 1.0);
    }
}

impl Module for LfoModule {
    fn process_control(&mut self, io: &mut ModuleIo<'_>) {
        self.smooth_freq.set_target(self.frequency);
        self.smooth_amp.set_target(self.amplitude);
        self.smooth_depth.set_target(self.depth);

        for i in 0..io.frames {
            let freq_s = self.smooth_freq.advance();
            let amp_s = self.smooth_amp.advance();
            let depth_s = self.smooth_depth.advance();

            let mut freq = freq_s;
            let mut amp = amp_s;
            let mut depth = depth_s;

            for (buf, name) in io.control_in {
                let Some(&raw) = buf.get(i) else { continue };
                let control = raw.clamp(-1.0, 1.0);
                match *name {
                    "freq" => freq += control * freq_s,
                    "amp" => amp += control,
                    "depth" => depth += control,
                    _ => {}
                }
            }

            freq = freq.clamp(MIN_FREQ, MAX_FREQ);
            amp = amp.clamp(0.0, 1.0);
            depth = depth.clamp(0.0, 1.0);

            let t = self.phase / core::f32::consts::TAU;
            let value = match self.waveform {
                Waveform::Sine => libm::sinf(self.phase),
                Waveform::Saw => 2.0 * t - 1.0,
                Waveform::Square => {
                    if t < 0.5 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                Waveform::Triangle => {
                    let sq = if t < 0.5 { 1.0 } else { -1.0 };
                    self.tri_state += 2.0 * freq / self.sample_rate * sq;
                    libm::tanhf(self.tri_state)
                }
            };

            io.control_out[i] = if self.polarity_bipolar {
                depth * amp * value
            } else {
                depth * (0.5 + 0.5 * amp * value)
            };

            self.phase += core::f32::consts::TAU * freq / self.sample_rate;
            if self.phase >= core::f32::consts::TAU {
                self.phase -= core::f32::consts::TAU;
            }
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => {
                match tag {
                    '1' => self.frequency = value,
                    '2' => self.amplitude = value,
                    '3' => self.waveform = Waveform::from_index(value as i32),
                    'd' => self.depth = value,
                    _ => {}
                }
                self.clamp_params();
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => match key {
                InputKey::Char('=') => {
                    self.frequency += 0.01;
                    self.clamp_params();
                }
                InputKey::Char('-') => {
                    self.frequency -= 0.01;
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
                InputKey::Char('D') => {
                    self.depth += 0.01;
                    self.clamp_params();
                }
                InputKey::Char('d') => {
                    self.depth -= 0.01;
                    self.clamp_params();
                }
                InputKey::Char('p') => self.polarity_bipolar = !self.polarity_bipolar,
                InputKey::Char('w') => self.waveform = self.waveform.next(),
                _ => {}
            },
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "freq" => {
                let norm = value.clamp(0.0, 1.0);
                self.frequency = MIN_FREQ.max(0.1) * libm::powf(MAX_FREQ / 0.1, norm);
            }
            "amp" => self.amplitude = value.clamp(0.0, 1.0),
            "depth" => self.depth = value.clamp(0.0, 1.0),
            "wave" => {
                if value > 0.5 {
                    self.waveform = self.waveform.next();
                }
            }
            "polarity" => self.polarity_bipolar = value > 0.5,
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "freq" => Some(self.frequency),
            "amp" => Some(self.amplitude),
            "depth" => Some(self.depth),
            _ => None,
        }
    }

    fn produces_control(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "lfo",
        name: "LFO",
        description: "Control-rate low-frequency oscillator with bipolar/unipolar output",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let freq = config_f32("lfo", config, "freq", 1.0)?;
    let amp = config_f32("lfo", config, "amp", 1.0)?;
    let depth = config_f32("lfo", config, "depth", 0.5)?;
    Ok(Box::new(LfoModule::new(freq, amp, depth, sample_rate)))
}
