//! Control-rate random/sample-and-hold-style source: fires a new value
//! at `rate_hz`, optionally coloring the underlying white noise before
//! mapping it into `[range_min, range_max]`.
//!
//! Grounded on `original_source/modules/c_random/c_random.c`: a phase
//! accumulator crosses `1.0` at `rate_hz`, draws a fresh `rand()`-style
//! sample, shapes it through the white/pink/brown path, rescales
//! `depth` around the midpoint (`0.5 + (u - 0.5) * depth`, i.e. depth
//! shrinks the excursion toward the center rather than scaling from
//! zero), maps into `[range_min, range_max]`, and holds that value
//! until the next crossing.

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32, config_str};

use crate::util::{BrownFilter, CommandEntry, CommandOutcome, PinkFilter, Xorshift32};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RandomType {
    White,
    Pink,
    Brown,
}

impl RandomType {
    fn next(self) -> Self {
        match self {
            RandomType::White => RandomType::Pink,
            RandomType::Pink => RandomType::Brown,
            RandomType::Brown => RandomType::White,
        }
    }

    fn from_index(i: i32) -> Self {
        match i.rem_euclid(3) {
            0 => RandomType::White,
            1 => RandomType::Pink,
            _ => RandomType::Brown,
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "white" => Some(RandomType::White),
            "pink" => Some(RandomType::Pink),
            "brown" => Some(RandomType::Brown),
            _ => None,
        }
    }
}

pub struct RandomModule {
    rate_hz: f32,
    depth: f32,
    range_min: f32,
    range_max: f32,
    rand_type: RandomType,
    phase: f32,
    current_val: f32,
    sample_rate: f32,
    rng: Xorshift32,
    pink: PinkFilter,
    brown: BrownFilter,
    smooth_rate: SmoothedParam,
    smooth_depth: SmoothedParam,
    cmd: CommandEntry,
}

impl RandomModule {
    fn new(rate_hz: f32, depth: f32, range_min: f32, range_max: f32, rand_type: RandomType, sample_rate: f32, seed: u32) -> Self {
        let mut smooth_rate = SmoothedParam::with_config(rate_hz, sample_rate, 15.0);
        smooth_rate.set_immediate(rate_hz);
        let mut smooth_depth = SmoothedParam::with_config(depth, sample_rate, 15.0);
        smooth_depth.set_immediate(depth);
        let mut rnd = Self {
            rate_hz,
            depth,
            range_min,
            range_max,
            rand_type,
            phase: 0.0,
            current_val: 0.0,
            sample_rate,
            rng: Xorshift32::new(seed),
            pink: PinkFilter::new(sample_rate),
            brown: BrownFilter::new(),
            smooth_rate,
            smooth_depth,
            cmd: CommandEntry::default(),
        };
        rnd.clamp_params();
        rnd
    }

    fn clamp_params(&mut self) {
        self.rate_hz = self.rate_hz.clamp(0.01, 100.0);
        self.depth = self.depth.clamp(0.0, 1.0);
    }
}

impl Module for RandomModule {
    fn process_control(&mut self, io: &mut ModuleIo<'_>) {
        self.smooth_rate.set_target(self.rate_hz);
        self.smooth_depth.set_target(self.depth);

        let dt = 1.0 / self.sample_rate;

        for i in 0..io.frames {
            let rate = self.smooth_rate.advance().clamp(0.01, 100.0);
            let depth = self.smooth_depth.advance().clamp(0.0, 1.0);

            self.phase += dt * rate;
            if self.phase >= 1.0 {
                self.phase -= 1.0;

                let base = self.rng.next_white();
                let shaped = match self.rand_type {
                    RandomType::White => base,
                    RandomType::Pink => self.pink.process(base),
                    RandomType::Brown => self.brown.process(base),
                }
                .clamp(-1.0, 1.0);

                let u = (shaped + 1.0) * 0.5;
                let u_depth = 0.5 + (u - 0.5) * depth;
                let u_range = self.range_min + u_depth * (self.range_max - self.range_min);
                self.current_val = u_range.clamp(0.0, 1.0);
            }

            io.control_out[i] = self.current_val;
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => {
                match tag {
                    '1' => self.rate_hz = value,
                    '2' => self.range_min = value,
                    '3' => self.range_max = value,
                    '4' => self.rand_type = RandomType::from_index(value as i32),
                    'd' => self.depth = value,
                    _ => {}
                }
                self.clamp_params();
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => match key {
                InputKey::Char('=') => {
                    self.rate_hz += 0.1;
                    self.clamp_params();
                }
                InputKey::Char('-') => {
                    self.rate_hz -= 0.1;
                    self.clamp_params();
                }
                InputKey::Char('[') => self.range_min -= 0.01,
                InputKey::Char(']') => self.range_min += 0.01,
                InputKey::Char('{') => self.range_max -= 0.01,
                InputKey::Char('}') => self.range_max += 0.01,
                InputKey::Char('n') => self.rand_type = self.rand_type.next(),
                InputKey::Char('D') => {
                    self.depth += 0.01;
                    self.clamp_params();
                }
                InputKey::Char('d') => {
                    self.depth -= 0.01;
                    self.clamp_params();
                }
                _ => {}
            },
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "rate" => self.rate_hz = value,
            "depth" => self.depth = value,
            "type" => self.rand_type = RandomType::from_index(value as i32),
            "rmin" => self.range_min = value,
            "rmax" => self.range_max = value,
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "rate" => Some(self.rate_hz),
            "depth" => Some(self.depth),
            "rmin" => Some(self.range_min),
            "rmax" => Some(self.range_max),
            _ => None,
        }
    }

    fn produces_control(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "random",
        name: "Random Source",
        description: "Phase-clocked random/sample-hold source with white/pink/brown coloring",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let rate = config_f32("random", config, "rate", 1.0)?;
    let depth = config_f32("random", config, "depth", 1.0)?;
    let rmin = config_f32("random", config, "rmin", 0.0)?;
    let rmax = config_f32("random", config, "rmax", 1.0)?;
    let type_str = config_str(config, "type", "white");
    let rand_type = RandomType::parse(type_str).ok_or_else(|| RegistryError::InvalidConfigValue {
        module_type: "random".to_string(),
        key: "type".to_string(),
        value: type_str.to_string(),
    })?;
    let seed = 0x1234_5678 ^ (sample_rate as u32).rotate_left(7);
    Ok(Box::new(RandomModule::new(rate, depth, rmin, rmax, rand_type, sample_rate, seed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_stays_within_range() {
        let mut rnd = RandomModule::new(50.0, 1.0, 0.2, 0.8, RandomType::White, 48000.0, 42);
        let frames = 4800;
        let mut control_out = vec![0.0f32; frames];
        let mut audio_out = vec![0.0f32; frames];
        let mut io = ModuleIo {
            audio_in: &[],
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames,
        };
        rnd.process_control(&mut io);
        assert!(io.control_out.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn zero_depth_collapses_to_midpoint() {
        let mut rnd = RandomModule::new(50.0, 0.0, 0.0, 1.0, RandomType::White, 48000.0, 7);
        let frames = 4800;
        let mut control_out = vec![0.0f32; frames];
        let mut audio_out = vec![0.0f32; frames];
        let mut io = ModuleIo {
            audio_in: &[],
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames,
        };
        rnd.process_control(&mut io);
        assert!(io.control_out.iter().all(|v| (*v - 0.5).abs() < 1e-5));
    }

    #[test]
    fn type_cycles_through_three_variants() {
        let mut rnd = RandomModule::new(1.0, 1.0, 0.0, 1.0, RandomType::White, 48000.0, 1);
        assert_eq!(rnd.rand_type, RandomType::White);
        rnd.handle_input(InputKey::Char('n'));
        assert_eq!(rnd.rand_type, RandomType::Pink);
        rnd.handle_input(InputKey::Char('n'));
        assert_eq!(rnd.rand_type, RandomType::Brown);
        rnd.handle_input(InputKey::Char('n'));
        assert_eq!(rnd.rand_type, RandomType::White);
    }
}
