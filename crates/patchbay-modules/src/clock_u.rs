//! Unsynchronized clock: a free-running pulse-width gate generator with
//! no relationship to the shared-clock registry.
//!
//! Grounded on `original_source/modules/c_clock_u/c_clock_u.c`: a
//! `bpm * mult / 60` frequency drives a `f64` phase accumulator (kept
//! `f64` here too — at very low `bpm * mult` the phase increment is
//! small enough that `f32` accumulation visibly drifts over a long
//! session), comparing phase against `pw` each sample to produce a
//! gate. `running = false` emits silence and resets phase tracking but
//! does not zero `bpm`/`mult`/`pw`, so toggling `running` back on
//! resumes at the configured tempo.

use patchbay_core::{InputKey, Module, ModuleIo};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32};

use crate::util::{CommandEntry, CommandOutcome};

pub struct ClockUModule {
    bpm: f32,
    mult: f32,
    pw: f32,
    running: bool,
    phase: f64,
    last_gate: f32,
    sample_rate: f32,
    cmd: CommandEntry,
}

impl ClockUModule {
    fn new(bpm: f32, mult: f32, pw: f32, sample_rate: f32) -> Self {
        let mut m = Self {
            bpm,
            mult,
            pw,
            running: true,
            phase: 0.0,
            last_gate: 0.0,
            sample_rate,
            cmd: CommandEntry::default(),
        };
        m.clamp_params();
        m
    }

    fn clamp_params(&mut self) {
        self.bpm = self.bpm.clamp(1.0, 1000.0);
        self.mult = self.mult.clamp(0.0001, 128.0);
        self.pw = self.pw.clamp(0.001, 0.999);
    }
}

impl Module for ClockUModule {
    fn process_control(&mut self, io: &mut ModuleIo<'_>) {
        if !self.running {
            for v in io.control_out[..io.frames].iter_mut() {
                *v = 0.0;
            }
            self.last_gate = 0.0;
            return;
        }

        let freq = self.bpm as f64 * self.mult as f64 / 60.0;
        let phase_inc = freq / self.sample_rate as f64;

        for i in 0..io.frames {
            self.phase += phase_inc;
            if self.phase >= 1.0 {
                self.phase -= self.phase.floor();
            }
            let gate = if self.phase < self.pw as f64 { 1.0 } else { 0.0 };
            io.control_out[i] = gate;
            self.last_gate = gate;
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => {
                match tag {
                    '1' => self.bpm = value,
                    '2' => self.mult = value,
                    '3' => self.pw = value,
                    _ => {}
                }
                self.clamp_params();
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => match key {
                InputKey::Char('-') => {
                    self.bpm -= 1.0;
                    self.clamp_params();
                }
                InputKey::Char('=') => {
                    self.bpm += 1.0;
                    self.clamp_params();
                }
                InputKey::Char('_') => {
                    self.mult *= 0.5;
                    self.clamp_params();
                }
                InputKey::Char('+') => {
                    self.mult *= 2.0;
                    self.clamp_params();
                }
                InputKey::Char('[') => {
                    self.pw -= 0.01;
                    self.clamp_params();
                }
                InputKey::Char(']') => {
                    self.pw += 0.01;
                    self.clamp_params();
                }
                InputKey::Char(' ') => self.running = !self.running,
                _ => {}
            },
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "bpm" => self.bpm = value,
            "mult" => self.mult = value,
            "pw" => self.pw = value,
            "run" => self.running = value > 0.5,
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "bpm" => Some(self.bpm),
            "mult" => Some(self.mult),
            "pw" => Some(self.pw),
            "run" => Some(if self.running { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn produces_control(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "clock_u",
        name: "Unsynchronized Clock",
        description: "Free-running bpm/mult/pw pulse-width gate generator",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let bpm = config_f32("clock_u", config, "bpm", 120.0)?;
    let mult = config_f32("clock_u", config, "mult", 1.0)?;
    let pw = config_f32("clock_u", config, "pw", 0.5)?;
    Ok(Box::new(ClockUModule::new(bpm, mult, pw, sample_rate)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_duty_cycle_matches_pulse_width() {
        let mut clk = ClockUModule::new(600.0, 1.0, 0.25, 48000.0);
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
        clk.process_control(&mut io);
        let high = io.control_out.iter().filter(|v| **v > 0.5).count();
        let ratio = high as f32 / frames as f32;
        assert!((ratio - 0.25).abs() < 0.05, "expected ~25% duty cycle, got {ratio}");
    }

    #[test]
    fn stopped_clock_emits_silence() {
        let mut clk = ClockUModule::new(120.0, 1.0, 0.5, 48000.0);
        clk.set_param("run", 0.0);
        let frames = 100;
        let mut control_out = vec![1.0f32; frames];
        let mut audio_out = vec![0.0f32; frames];
        let mut io = ModuleIo {
            audio_in: &[],
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames,
        };
        clk.process_control(&mut io);
        assert!(io.control_out.iter().all(|v| *v == 0.0));
    }
}
