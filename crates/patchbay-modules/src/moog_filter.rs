//! Four-pole ladder filter (Moog-style) with tanh saturation.
//!
//! Grounded on `original_source/modules/moog_filter/moog_filter.c`:
//! four cascaded one-pole sections (`z[0..4]`) driven by a shared gain
//! coefficient `g = wc / (wc + 1)` derived from the smoothed cutoff, with
//! a resonance feedback line tapped off the last section and tanh
//! saturation at the input, the feedback summing node, and the output.
//! Filter type selects which tap (or combination) becomes the output.

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32, config_str};

use crate::util::{CommandEntry, CommandOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
    Resonant,
}

impl FilterType {
    fn next(self) -> Self {
        match self {
            FilterType::Lowpass => FilterType::Highpass,
            FilterType::Highpass => FilterType::Bandpass,
            FilterType::Bandpass => FilterType::Notch,
            FilterType::Notch => FilterType::Resonant,
            FilterType::Resonant => FilterType::Lowpass,
        }
    }

    fn from_index(i: i32) -> Self {
        match i.rem_euclid(5) {
            0 => FilterType::Lowpass,
            1 => FilterType::Highpass,
            2 => FilterType::Bandpass,
            3 => FilterType::Notch,
            _ => FilterType::Resonant,
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "lowpass" | "lp" => Some(FilterType::Lowpass),
            "highpass" | "hp" => Some(FilterType::Highpass),
            "bandpass" | "bp" => Some(FilterType::Bandpass),
            "notch" => Some(FilterType::Notch),
            "resonant" | "res" => Some(FilterType::Resonant),
            _ => None,
        }
    }
}

pub struct MoogFilterModule {
    cutoff: f32,
    resonance: f32,
    filt_type: FilterType,
    sample_rate: f32,
    z: [f32; 4],
    smooth_cutoff: SmoothedParam,
    smooth_res: SmoothedParam,
    cmd: CommandEntry,
}

const MIN_CUTOFF: f32 = 10.0;
const MAX_RESONANCE: f32 = 4.2;

impl MoogFilterModule {
    fn new(cutoff: f32, resonance: f32, filt_type: FilterType, sample_rate: f32) -> Self {
        let mut smooth_cutoff = SmoothedParam::with_config(cutoff, sample_rate, 15.0);
        smooth_cutoff.set_immediate(cutoff);
        let mut smooth_res = SmoothedParam::with_config(resonance, sample_rate, 15.0);
        smooth_res.set_immediate(resonance);
        let mut filter = Self {
            cutoff,
            resonance,
            filt_type,
            sample_rate,
            z: [0.0; 4],
            smooth_cutoff,
            smooth_res,
            cmd: CommandEntry::default(),
        };
        filter.clamp_params();
        filter
    }

    fn max_cutoff(&self) -> f32 {
        self.sample_rate * 0.45
    }

    fn clamp_params(&mut self) {
        self.cutoff = self.cutoff.clamp(MIN_CUTOFF, self.max_cutoff());
        self.resonance = self.resonance.clamp(0.0, MAX_RESONANCE);
    }
}

impl Module for MoogFilterModule {
    fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
        for i in 0..io.frames {
            self.smooth_cutoff.set_target(self.cutoff);
            self.smooth_res.set_target(self.resonance);
            let co = self.smooth_cutoff.advance();
            let k = self.smooth_res.advance();

            let wc = core::f32::consts::TAU * co / self.sample_rate;
            let g = wc / (wc + 1.0);

            let input_sample = io.audio_in.get(i).copied().unwrap_or(0.0);
            let input_sample = if input_sample.is_finite() { input_sample } else { 0.0 };
            let mut x = libm::tanhf(input_sample);
            x -= k * self.z[3];
            x = libm::tanhf(x);

            self.z[0] += g * (x - self.z[0]);
            self.z[1] += g * (self.z[0] - self.z[1]);
            self.z[2] += g * (self.z[1] - self.z[2]);
            self.z[3] += g * (self.z[2] - self.z[3]);

            let y = match self.filt_type {
                FilterType::Lowpass => libm::tanhf(self.z[3]),
                FilterType::Highpass => libm::tanhf(x - self.z[3]),
                FilterType::Bandpass => libm::tanhf(self.z[2] - self.z[3]),
                FilterType::Notch => libm::tanhf(x - k * self.z[3]),
                FilterType::Resonant => libm::tanhf(self.z[3] + k * (self.z[3] - self.z[2])),
            };
            io.audio_out[i] = y.clamp(-1.0, 1.0);
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => {
                match tag {
                    '1' => self.cutoff = value,
                    '2' => self.resonance = value,
                    '3' => self.filt_type = FilterType::from_index(value as i32),
                    _ => {}
                }
                self.clamp_params();
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => match key {
                InputKey::Char('=') => {
                    self.cutoff += 0.5;
                    self.clamp_params();
                }
                InputKey::Char('-') => {
                    self.cutoff -= 0.5;
                    self.clamp_params();
                }
                InputKey::Char('+') => {
                    self.resonance += 0.01;
                    self.clamp_params();
                }
                InputKey::Char('_') => {
                    self.resonance -= 0.01;
                    self.clamp_params();
                }
                InputKey::Char('f') => self.filt_type = self.filt_type.next(),
                _ => {}
            },
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "cutoff" => self.cutoff = value,
            "resonance" | "res" => self.resonance = value,
            "type" => self.filt_type = FilterType::from_index(value as i32),
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "cutoff" => Some(self.cutoff),
            "resonance" | "res" => Some(self.resonance),
            _ => None,
        }
    }

    fn produces_audio(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "moog_filter",
        name: "Ladder Filter",
        description: "Four-pole tanh-saturated ladder filter (lowpass/highpass/bandpass/notch/resonant)",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let cutoff = config_f32("moog_filter", config, "cutoff", 440.0)?;
    let resonance = config_f32("moog_filter", config, "res", 0.5)?;
    let type_str = config_str(config, "type", "lowpass");
    let filt_type = FilterType::parse(type_str).ok_or_else(|| RegistryError::InvalidConfigValue {
        module_type: "moog_filter".to_string(),
        key: "type".to_string(),
        value: type_str.to_string(),
    })?;
    Ok(Box::new(MoogFilterModule::new(cutoff, resonance, filt_type, sample_rate)))
}
