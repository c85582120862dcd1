//! Plain audio-rate noise source — the simplest module in the set, a
//! single xorshift generator optionally shaped pink or brown.
//!
//! Grounded on `original_source/modules/noise/noise.c`: `amp` is the
//! only parameter, additively CV-modulated like every other audio-rate
//! module, with the sample drawn fresh every frame (no phase-gated hold
//! like `random`'s — this module writes one new sample every tick).

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32, config_str};

use crate::util::{BrownFilter, CommandEntry, CommandOutcome, PinkFilter, Xorshift32, apply_cv_additive, sanitize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoiseType {
    White,
    Pink,
    Brown,
}

impl NoiseType {
    fn next(self) -> Self {
        match self {
            NoiseType::White => NoiseType::Pink,
            NoiseType::Pink => NoiseType::Brown,
            NoiseType::Brown => NoiseType::White,
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "white" => Some(NoiseType::White),
            "pink" => Some(NoiseType::Pink),
            "brown" => Some(NoiseType::Brown),
            _ => None,
        }
    }
}

pub struct NoiseModule {
    amplitude: f32,
    noise_type: NoiseType,
    rng: Xorshift32,
    pink: PinkFilter,
    brown: BrownFilter,
    smooth_amp: SmoothedParam,
    cmd: CommandEntry,
}

impl NoiseModule {
    fn new(amplitude: f32, noise_type: NoiseType, sample_rate: f32, seed: u32) -> Self {
        let mut smooth_amp = SmoothedParam::with_config(amplitude, sample_rate, 3.0);
        smooth_amp.set_immediate(amplitude);
        let mut m = Self {
            amplitude,
            noise_type,
            rng: Xorshift32::new(seed),
            pink: PinkFilter::new(sample_rate),
            brown: BrownFilter::new(),
            smooth_amp,
            cmd: CommandEntry::default(),
        };
        m.clamp_params();
        m
    }

    fn clamp_params(&mut self) {
        self.amplitude = self.amplitude.clamp(0.0, 1.0);
    }
}

impl Module for NoiseModule {
    fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
        self.smooth_amp.set_target(self.amplitude);
        for i in 0..io.frames {
            let base_amp = self.smooth_amp.advance();
            let amp = apply_cv_additive(base_amp, io.control_in, "amp", i, 0.0, 1.0);

            let white = self.rng.next_white();
            let value = match self.noise_type {
                NoiseType::White => white,
                NoiseType::Pink => self.pink.process(white),
                NoiseType::Brown => self.brown.process(white),
            };
            io.audio_out[i] = sanitize(amp * value);
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => {
                match tag {
                    '1' => self.amplitude = value,
                    '2' => self.noise_type = match (value as i32).rem_euclid(3) {
                        0 => NoiseType::White,
                        1 => NoiseType::Pink,
                        _ => NoiseType::Brown,
                    },
                    _ => {}
                }
                self.clamp_params();
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => match key {
                InputKey::Char('=') => {
                    self.amplitude += 0.01;
                    self.clamp_params();
                }
                InputKey::Char('-') => {
                    self.amplitude -= 0.01;
                    self.clamp_params();
                }
                InputKey::Char('n') => self.noise_type = self.noise_type.next(),
                _ => {}
            },
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "amp" => self.amplitude = value.clamp(0.0, 1.0),
            "type" => {
                if value > 0.5 {
                    self.noise_type = self.noise_type.next();
                }
            }
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
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
        id: "noise",
        name: "Noise",
        description: "Audio-rate white/pink/brown noise source",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let amp = config_f32("noise", config, "amp", 0.5)?;
    let type_str = config_str(config, "type", "white");
    let noise_type = NoiseType::parse(type_str).ok_or_else(|| RegistryError::InvalidConfigValue {
        module_type: "noise".to_string(),
        key: "type".to_string(),
        value: type_str.to_string(),
    })?;
    let seed = 0x9E37_79B1 ^ (sample_rate as u32).rotate_left(11);
    Ok(Box::new(NoiseModule::new(amp, noise_type, sample_rate, seed)))
}
