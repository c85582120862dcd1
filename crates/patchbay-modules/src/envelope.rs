//! Attack/release function generator with an optional free-running
//! "cycle" mode — an LFO built from the same envelope core.
//!
//! Grounded on `original_source/modules/c_function/c_function.c`:
//! a two-state `{attack, release}` machine (there is no separate sustain
//! stage — reaching `1.0` in attack falls straight into release, matching
//! the AR envelope variant called out in §4.3's state table) fired by the
//! rising edge of a `gate` or `trig` CV input, plus a `cycle` flag that,
//! once set, re-enters attack after every release instead of settling to
//! idle. A `cycle` CV input's rising edge sets the flag and its falling
//! edge requests a stop *after* the in-flight release completes (so a
//! cycling envelope never produces a truncated cycle).
//!
//! `short_mode` (on by default) clamps attack/release to `[0.01, 10]`
//! seconds for fast modulation envelopes; disabling it allows long,
//! unbounded-above times for slow swells. OSC `att`/`rel` values arrive
//! in seconds and are converted `*1000` on the way in, matching the C
//! code's millisecond-denominated `attack_time`/`release_time` fields
//! (the smoother and DSP loop below work directly in seconds instead,
//! since Rust callers have no reason to carry the same unit confusion —
//! the constructor and `set_param` both store seconds).

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32};

use crate::util::{CommandEntry, CommandOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Release,
}

pub struct EnvelopeModule {
    attack_s: f32,
    release_s: f32,
    depth: f32,
    short_mode: bool,
    threshold_gate: f32,
    threshold_trig: f32,
    threshold_cycle: f32,

    stage: Stage,
    envelope_out: f32,
    cycle: bool,
    cycle_stop_requested: bool,
    gate_prev: bool,
    trig_prev: bool,
    cycle_prev_cv: bool,

    sample_rate: f32,
    smooth_att: SmoothedParam,
    smooth_rel: SmoothedParam,
    smooth_depth: SmoothedParam,
    cmd: CommandEntry,
}

impl EnvelopeModule {
    fn new(attack_s: f32, release_s: f32, depth: f32, sample_rate: f32) -> Self {
        let mut smooth_att = SmoothedParam::with_config(attack_s, sample_rate, 5.0);
        smooth_att.set_immediate(attack_s);
        let mut smooth_rel = SmoothedParam::with_config(release_s, sample_rate, 5.0);
        smooth_rel.set_immediate(release_s);
        let mut smooth_depth = SmoothedParam::with_config(depth, sample_rate, 5.0);
        smooth_depth.set_immediate(depth);
        let mut env = Self {
            attack_s,
            release_s,
            depth,
            short_mode: true,
            threshold_gate: 0.5,
            threshold_trig: 0.5,
            threshold_cycle: 0.5,
            stage: Stage::Idle,
            envelope_out: 0.0,
            cycle: false,
            cycle_stop_requested: false,
            gate_prev: false,
            trig_prev: false,
            cycle_prev_cv: false,
            sample_rate,
            smooth_att,
            smooth_rel,
            smooth_depth,
            cmd: CommandEntry::default(),
        };
        env.clamp_params();
        env
    }

    fn clamp_params(&mut self) {
        if self.short_mode {
            self.attack_s = self.attack_s.clamp(0.01, 10.0);
            self.release_s = self.release_s.clamp(0.01, 10.0);
        } else {
            self.attack_s = self.attack_s.max(0.01);
            self.release_s = self.release_s.max(0.01);
        }
        self.depth = self.depth.clamp(0.0, 1.0);
        self.threshold_gate = self.threshold_gate.clamp(0.0, 1.0);
        self.threshold_trig = self.threshold_trig.clamp(0.0, 1.0);
        self.threshold_cycle = self.threshold_cycle.clamp(0.0, 1.0);
    }
}

impl Module for EnvelopeModule {
    fn process_control(&mut self, io: &mut ModuleIo<'_>) {
        self.smooth_att.set_target(self.attack_s);
        self.smooth_rel.set_target(self.release_s);
        self.smooth_depth.set_target(self.depth);

        let gate_buf = io.control_in.iter().find(|(_, name)| *name == "gate").map(|(b, _)| *b);
        let trig_buf = io.control_in.iter().find(|(_, name)| *name == "trig").map(|(b, _)| *b);
        let cycle_buf = io.control_in.iter().find(|(_, name)| *name == "cycle").map(|(b, _)| *b);

        let step = 1.0 / self.sample_rate;

        for i in 0..io.frames {
            let att = self.smooth_att.advance();
            let rel = self.smooth_rel.advance();
            let depth = self.smooth_depth.advance();

            let gate_now = gate_buf.and_then(|b| b.get(i)).is_some_and(|v| *v > self.threshold_gate);
            let trig_now = trig_buf.and_then(|b| b.get(i)).is_some_and(|v| *v > self.threshold_trig);

            if let Some(buf) = cycle_buf {
                if let Some(&v) = buf.get(i) {
                    let cyc_now = v > self.threshold_cycle;
                    if cyc_now && !self.cycle_prev_cv {
                        self.cycle = true;
                        self.cycle_stop_requested = false;
                    } else if !cyc_now && self.cycle_prev_cv && self.cycle {
                        self.cycle_stop_requested = true;
                    }
                    self.cycle_prev_cv = cyc_now;
                }
            }

            let fire = (trig_now && !self.trig_prev) || (gate_now && !self.gate_prev);
            if fire && self.stage == Stage::Idle {
                self.stage = Stage::Attack;
            }

            match self.stage {
                Stage::Attack => {
                    self.envelope_out += step / att.max(0.001);
                    if self.envelope_out >= 1.0 {
                        self.envelope_out = 1.0;
                        self.stage = Stage::Release;
                    }
                }
                Stage::Release => {
                    self.envelope_out -= step / rel.max(0.001);
                    if self.envelope_out <= 0.0 {
                        self.envelope_out = 0.0;
                        if self.cycle && !self.cycle_stop_requested {
                            self.stage = Stage::Attack;
                        } else {
                            self.cycle = false;
                            self.cycle_stop_requested = false;
                            self.stage = Stage::Idle;
                        }
                    }
                }
                Stage::Idle => {
                    if self.cycle && !self.cycle_stop_requested {
                        self.stage = Stage::Attack;
                    } else {
                        self.envelope_out = 0.0;
                    }
                }
            }

            io.control_out[i] = self.envelope_out * depth;
            self.gate_prev = gate_now;
            self.trig_prev = trig_now;
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => {
                match tag {
                    '1' => self.attack_s = value,
                    '2' => self.release_s = value,
                    '3' => self.threshold_gate = value,
                    'd' => self.depth = value,
                    _ => {}
                }
                self.clamp_params();
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => match key {
                InputKey::Char('f') => {
                    if self.cycle {
                        self.cycle_stop_requested = true;
                    } else {
                        self.trig_prev = false;
                    }
                }
                InputKey::Char('c') => {
                    if !self.cycle {
                        self.cycle = true;
                        self.cycle_stop_requested = false;
                    } else {
                        self.cycle_stop_requested = true;
                    }
                }
                InputKey::Char('m') => self.short_mode = !self.short_mode,
                InputKey::Char('-') => {
                    self.attack_s -= 0.1;
                    self.clamp_params();
                }
                InputKey::Char('=') => {
                    self.attack_s += 0.1;
                    self.clamp_params();
                }
                InputKey::Char('_') => {
                    self.release_s -= 0.1;
                    self.clamp_params();
                }
                InputKey::Char('+') => {
                    self.release_s += 0.1;
                    self.clamp_params();
                }
                InputKey::Char('[') => {
                    self.threshold_gate -= 0.05;
                    self.clamp_params();
                }
                InputKey::Char(']') => {
                    self.threshold_gate += 0.05;
                    self.clamp_params();
                }
                InputKey::Char('d') => {
                    self.depth -= 0.01;
                    self.clamp_params();
                }
                InputKey::Char('D') => {
                    self.depth += 0.01;
                    self.clamp_params();
                }
                _ => {}
            },
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "att" => self.attack_s = value,
            "rel" => self.release_s = value,
            "depth" => self.depth = value,
            "gate" => self.threshold_gate = value,
            "cycle" => {
                if value > 0.5 {
                    self.cycle = true;
                    self.cycle_stop_requested = false;
                } else {
                    self.cycle_stop_requested = true;
                }
            }
            "trig" => {
                if value > self.threshold_trig {
                    self.trig_prev = false;
                }
            }
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "att" => Some(self.attack_s),
            "rel" => Some(self.release_s),
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
        id: "envelope",
        name: "Envelope / Function Generator",
        description: "Gate/trig-fired attack-release envelope with optional free-running cycle mode",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let attack = config_f32("envelope", config, "att", 1.0)?;
    let release = config_f32("envelope", config, "rel", 1.0)?;
    let depth = config_f32("envelope", config, "depth", 0.5)?;
    Ok(Box::new(EnvelopeModule::new(attack, release, depth, sample_rate)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(env: &mut EnvelopeModule, gate: &[f32]) -> Vec<f32> {
        let frames = gate.len();
        let mut control_out = vec![0.0f32; frames];
        let control_in: [(&[f32], &str); 1] = [(gate, "gate")];
        let mut io = ModuleIo {
            audio_in: &[],
            audio_out: &mut [],
            control_in: &control_in,
            control_out: &mut control_out,
            frames,
        };
        env.process_control(&mut io);
        control_out
    }

    #[test]
    fn rising_gate_enters_attack_and_reaches_peak() {
        let mut env = EnvelopeModule::new(0.01, 0.01, 1.0, 48000.0);
        let gate = vec![1.0f32; 48000 / 50];
        let out = drive(&mut env, &gate);
        let peak = out.iter().cloned().fold(0.0f32, f32::max);
        assert!(peak > 0.9, "expected envelope to reach near 1.0, got {peak}");
    }

    #[test]
    fn idle_without_trigger_stays_at_zero() {
        let mut env = EnvelopeModule::new(0.1, 0.1, 1.0, 48000.0);
        let gate = vec![0.0f32; 100];
        let out = drive(&mut env, &gate);
        assert!(out.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn cycle_mode_free_runs_after_enabling() {
        let mut env = EnvelopeModule::new(0.01, 0.01, 1.0, 48000.0);
        env.handle_input(InputKey::Char('c'));
        assert!(env.cycle);
        let gate = vec![0.0f32; 48000 / 10];
        let out = drive(&mut env, &gate);
        // a free-running cycle should produce more than one rise above zero
        let rises = out.windows(2).filter(|w| w[0] < 0.01 && w[1] > 0.01).count();
        assert!(rises >= 2, "expected multiple cycle rises, got {rises}");
    }
}
