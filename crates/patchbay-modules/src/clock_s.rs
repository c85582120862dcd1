//! Synchronized clock: registers with the process-wide shared-clock
//! registry so a primary's bpm/run changes propagate to every secondary.
//!
//! Grounded on `original_source/modules/c_clock_s/c_clock_s.c`. A clock
//! becomes a *secondary* simply by having any control input wired to
//! it (`has_sync = num_control_inputs > 0`) — the wired signal is read
//! as a raw sync pulse regardless of its declared parameter name. A
//! secondary's own bpm/run keys are locked out (`bpm`/`run` changes on a
//! primary are the only ones that propagate); its `user_enable` flag
//! (toggled by Space) instead mutes its own gate output independently
//! of the shared run state, and a secondary whose mult/pw just changed
//! sets `pending_resync` so its phase re-locks to the primary's next
//! rising edge rather than jumping immediately (avoiding an audible
//! click from a phase discontinuity).

use std::sync::{Arc, Mutex};

use patchbay_clock::{ClockId, ClockTarget};
use patchbay_core::{InputKey, Module, ModuleIo};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32};

use crate::util::{CommandEntry, CommandOutcome};

struct Inner {
    bpm: f32,
    mult: f32,
    pw: f32,
    running: bool,
    user_enable: bool,
    phase: f64,
    last_gate: f32,
    pending_resync: bool,
    last_sync_in: f32,
    sample_rate: f32,
}

impl Inner {
    fn clamp(&mut self) {
        self.bpm = self.bpm.clamp(1.0, 1000.0);
        self.mult = self.mult.clamp(0.0001, 128.0);
        self.pw = self.pw.clamp(0.001, 0.999);
    }
}

struct TargetHandle(Arc<Mutex<Inner>>);

impl ClockTarget for TargetHandle {
    fn apply_bpm(&self, bpm: f32) {
        let mut inner = self.0.lock().unwrap_or_else(|e| e.into_inner());
        inner.bpm = bpm;
        inner.phase = 0.0;
        inner.last_gate = 0.0;
    }

    fn apply_run(&self, running: bool) {
        let mut inner = self.0.lock().unwrap_or_else(|e| e.into_inner());
        inner.running = running;
        inner.phase = 0.0;
        inner.last_gate = 0.0;
    }
}

pub struct ClockSModule {
    inner: Arc<Mutex<Inner>>,
    clock_id: Option<ClockId>,
    has_sync: bool,
    cmd: CommandEntry,
}

impl ClockSModule {
    fn new(bpm: f32, mult: f32, pw: f32, sample_rate: f32) -> Self {
        let mut inner = Inner {
            bpm,
            mult,
            pw,
            running: true,
            user_enable: true,
            phase: 0.0,
            last_gate: 0.0,
            pending_resync: false,
            last_sync_in: 0.0,
            sample_rate,
        };
        inner.clamp();
        let inner = Arc::new(Mutex::new(inner));
        let clock_id = patchbay_clock::register(Arc::new(TargetHandle(inner.clone())) as Arc<dyn ClockTarget>);
        Self {
            inner,
            clock_id,
            has_sync: false,
            cmd: CommandEntry::default(),
        }
    }
}

impl Module for ClockSModule {
    fn process_control(&mut self, io: &mut ModuleIo<'_>) {
        self.has_sync = !io.control_in.is_empty();
        let sync_buf = io.control_in.first().map(|(buf, _)| *buf);

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if !inner.running {
            for v in io.control_out[..io.frames].iter_mut() {
                *v = 0.0;
            }
            inner.last_gate = 0.0;
            return;
        }

        if self.has_sync && !inner.user_enable {
            let freq = inner.bpm as f64 / 60.0 * inner.mult as f64;
            let phase_inc = freq / inner.sample_rate as f64;
            for i in 0..io.frames {
                if let Some(buf) = sync_buf {
                    if let Some(&s_in) = buf.get(i) {
                        if inner.pending_resync && inner.last_sync_in <= 0.5 && s_in > 0.5 {
                            inner.phase = 0.0;
                            inner.pending_resync = false;
                        }
                        inner.last_sync_in = s_in;
                    }
                }
                inner.phase += phase_inc;
                if inner.phase >= 1.0 {
                    inner.phase -= inner.phase.floor();
                }
                io.control_out[i] = 0.0;
            }
            inner.last_gate = 0.0;
            return;
        }

        let freq = inner.bpm as f64 / 60.0 * inner.mult as f64;
        if freq <= 0.0 {
            for v in io.control_out[..io.frames].iter_mut() {
                *v = 0.0;
            }
            inner.last_gate = 0.0;
            return;
        }
        let phase_inc = freq / inner.sample_rate as f64;

        for i in 0..io.frames {
            if self.has_sync {
                if let Some(buf) = sync_buf {
                    if let Some(&s_in) = buf.get(i) {
                        if inner.pending_resync && inner.last_sync_in <= 0.5 && s_in > 0.5 {
                            inner.phase = 0.0;
                            inner.pending_resync = false;
                        }
                        inner.last_sync_in = s_in;
                    }
                }
            }
            inner.phase += phase_inc;
            if inner.phase >= 1.0 {
                inner.phase -= inner.phase.floor();
            }
            let gate = if inner.phase < inner.pw as f64 { 1.0 } else { 0.0 };
            io.control_out[i] = gate;
            inner.last_gate = gate;
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                let mut propagate_bpm = None;
                match tag {
                    '1' if !self.has_sync => {
                        inner.bpm = value;
                        propagate_bpm = Some(inner.bpm);
                    }
                    '2' => {
                        inner.mult = value;
                        if self.has_sync {
                            inner.pending_resync = true;
                        }
                    }
                    '3' => inner.pw = value,
                    _ => {}
                }
                inner.clamp();
                drop(inner);
                if let Some(bpm) = propagate_bpm {
                    patchbay_clock::propagate_bpm(bpm);
                }
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => {
                let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
                let mut propagate_bpm = None;
                let mut propagate_run = None;
                match key {
                    InputKey::Char('-') if !self.has_sync => {
                        inner.bpm -= 1.0;
                        propagate_bpm = Some(inner.bpm);
                    }
                    InputKey::Char('=') if !self.has_sync => {
                        inner.bpm += 1.0;
                        propagate_bpm = Some(inner.bpm);
                    }
                    InputKey::Char('_') => {
                        inner.mult *= 0.5;
                        if self.has_sync {
                            inner.pending_resync = true;
                        }
                    }
                    InputKey::Char('+') => {
                        inner.mult *= 2.0;
                        if self.has_sync {
                            inner.pending_resync = true;
                        }
                    }
                    InputKey::Char('[') => inner.pw -= 0.01,
                    InputKey::Char(']') => inner.pw += 0.01,
                    InputKey::Char(' ') => {
                        if self.has_sync {
                            inner.user_enable = !inner.user_enable;
                        } else {
                            inner.running = !inner.running;
                            propagate_run = Some(inner.running);
                        }
                    }
                    _ => {}
                }
                inner.clamp();
                drop(inner);
                if let Some(bpm) = propagate_bpm {
                    patchbay_clock::propagate_bpm(bpm);
                }
                if let Some(running) = propagate_run {
                    patchbay_clock::propagate_run(running);
                }
            }
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut propagate_bpm = None;
        let mut propagate_run = None;
        match name {
            "bpm" if !self.has_sync => {
                inner.bpm = value;
                propagate_bpm = Some(inner.bpm);
            }
            "mult" => {
                inner.mult = value;
                if self.has_sync {
                    inner.pending_resync = true;
                }
            }
            "pw" => inner.pw = value,
            "run" => {
                if self.has_sync {
                    inner.user_enable = value > 0.5;
                } else {
                    inner.running = value > 0.5;
                    propagate_run = Some(inner.running);
                }
            }
            _ => {}
        }
        inner.clamp();
        drop(inner);
        if let Some(bpm) = propagate_bpm {
            patchbay_clock::propagate_bpm(bpm);
        }
        if let Some(running) = propagate_run {
            patchbay_clock::propagate_run(running);
        }
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        match name {
            "bpm" => Some(inner.bpm),
            "mult" => Some(inner.mult),
            "pw" => Some(inner.pw),
            "run" => Some(if inner.running { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    fn destroy(&mut self) {
        patchbay_clock::unregister(self.clock_id.take());
    }

    fn produces_control(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "clock_s",
        name: "Synchronized Clock",
        description: "Shared-clock-registry clock: primary broadcasts bpm/run, secondaries resync to it",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let bpm = config_f32("clock_s", config, "bpm", 120.0)?;
    let mult = config_f32("clock_s", config, "mult", 1.0)?;
    let pw = config_f32("clock_s", config, "pw", 0.5)?;
    Ok(Box::new(ClockSModule::new(bpm, mult, pw, sample_rate)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_without_sync_input_produces_gate() {
        let mut clk = ClockSModule::new(600.0, 1.0, 0.5, 48000.0);
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
        assert!(io.control_out.iter().any(|v| *v > 0.5));
        clk.destroy();
    }

    #[test]
    fn secondary_with_user_enable_off_mutes_output() {
        let mut clk = ClockSModule::new(600.0, 1.0, 0.5, 48000.0);
        let sync = vec![0.0f32; 480];
        let control_in: [(&[f32], &str); 1] = [(&sync, "sync")];
        let mut control_out = vec![1.0f32; 480];
        let mut audio_out = vec![0.0f32; 480];
        let mut io = ModuleIo {
            audio_in: &[],
            audio_out: &mut audio_out,
            control_in: &control_in,
            control_out: &mut control_out,
            frames: 480,
        };
        // first block establishes has_sync = true from the wired control input
        clk.process_control(&mut io);
        clk.set_param("run", 0.0); // now routed to user_enable, not global running
        clk.process_control(&mut io);
        assert!(io.control_out.iter().all(|v| *v == 0.0));
        clk.destroy();
    }
}
