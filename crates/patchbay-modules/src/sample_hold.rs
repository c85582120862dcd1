//! Sample-and-hold: latches the audio input at each trigger and holds
//! it as a control-rate output until the next trigger.
//!
//! Grounded on `original_source/modules/c_sh/c_sh.c`: a hybrid module
//! whose primary work function reads audio input and writes a control
//! output (the original's `process`, not `process_control`, despite the
//! control-rate buffer — the same hybrid shape this crate expresses via
//! `process_audio` filling `io.control_out`). Triggering is either an
//! internal phase-timer at `rate_hz` or, when a `trig` CV input is
//! present, that input's rising edge — the timer is then ignored
//! entirely rather than running alongside it.

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32};

use crate::util::{CommandEntry, CommandOutcome};

pub struct SampleHoldModule {
    rate_hz: f32,
    depth: f32,
    phase: f32,
    last_trig: f32,
    current_val: f32,
    sample_rate: f32,
    smooth_rate: SmoothedParam,
    smooth_depth: SmoothedParam,
    cmd: CommandEntry,
}

impl SampleHoldModule {
    fn new(rate_hz: f32, depth: f32, sample_rate: f32) -> Self {
        let mut smooth_rate = SmoothedParam::with_config(rate_hz, sample_rate, 15.0);
        smooth_rate.set_immediate(rate_hz);
        let mut smooth_depth = SmoothedParam::with_config(depth, sample_rate, 15.0);
        smooth_depth.set_immediate(depth);
        let mut m = Self {
            rate_hz,
            depth,
            phase: 0.0,
            last_trig: 0.0,
            current_val: 0.0,
            sample_rate,
            smooth_rate,
            smooth_depth,
            cmd: CommandEntry::default(),
        };
        m.clamp_params();
        m
    }

    fn clamp_params(&mut self) {
        self.rate_hz = self.rate_hz.clamp(0.01, 100.0);
        self.depth = self.depth.clamp(0.0, 1.0);
    }
}

impl Module for SampleHoldModule {
    fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
        self.smooth_rate.set_target(self.rate_hz);
        self.smooth_depth.set_target(self.depth);

        let trig_buf = io.control_in.iter().find(|(_, name)| *name == "trig").map(|(b, _)| *b);
        let dt = 1.0 / self.sample_rate;

        for i in 0..io.frames {
            let mut rate = self.smooth_rate.advance();
            let mut depth = self.smooth_depth.advance();

            for (buf, name) in io.control_in {
                let Some(&raw) = buf.get(i) else { continue };
                let control = raw.clamp(-1.0, 1.0);
                match *name {
                    "rate" => rate += control * 20.0,
                    "depth" => depth += control,
                    _ => {}
                }
            }
            rate = rate.clamp(0.01, 100.0);
            depth = depth.clamp(0.0, 1.0);

            let mut triggered = false;
            if let Some(buf) = trig_buf {
                let x = buf.get(i).copied().unwrap_or(0.0);
                if self.last_trig < 0.5 && x >= 0.5 {
                    triggered = true;
                }
                self.last_trig = x;
            } else {
                self.phase += dt * rate;
                if self.phase >= 1.0 {
                    self.phase -= 1.0;
                    triggered = true;
                }
            }

            if triggered {
                let sample = io.audio_in.get(i).copied().unwrap_or(0.0);
                self.current_val = sample * depth;
            }

            io.control_out[i] = self.current_val;
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => {
                match tag {
                    '1' => self.rate_hz = value,
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
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "rate" => Some(self.rate_hz),
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
        id: "sample_hold",
        name: "Sample & Hold",
        description: "Latches audio input to a control-rate output on trigger or internal timer",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let rate = config_f32("sample_hold", config, "rate", 1.0)?;
    let depth = config_f32("sample_hold", config, "depth", 1.0)?;
    Ok(Box::new(SampleHoldModule::new(rate, depth, sample_rate)))
}
