//! MIDI CC-to-CV bridge: reads one Control Change number from the
//! process-wide MIDI table and exposes it as a smoothed control signal.
//!
//! Grounded on `original_source/modules/c_midi_to_cv/c_midi_to_cv.c`:
//! `cc < 32` reads the 14-bit MSB/LSB-paired mode (`cc` is the MSB,
//! `cc + 32` the LSB), `cc >= 32` reads the legacy 7-bit mode directly;
//! a `chan` of `0` accepts any channel, otherwise only CCs whose most
//! recent message arrived on that channel pass through — and since the
//! table only tracks the single most recent channel, a non-matching
//! channel holds the smoother at its last value rather than snapping to
//! zero (matching the original's `v = 0.0f` fallthrough, which the
//! smoother then approaches gradually).

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32};

use crate::util::{CommandEntry, CommandOutcome};

pub struct MidiToCvModule {
    cc: u8,
    channel: u8,
    smooth: SmoothedParam,
    last_val: f32,
    cmd: CommandEntry,
}

impl MidiToCvModule {
    fn new(cc: u8, channel: u8, sample_rate: f32) -> Self {
        Self {
            cc: cc.min(127),
            channel: channel.min(16),
            smooth: SmoothedParam::with_config(0.0, sample_rate, 40.0),
            last_val: 0.0,
            cmd: CommandEntry::default(),
        }
    }
}

impl Module for MidiToCvModule {
    fn process_control(&mut self, io: &mut ModuleIo<'_>) {
        let channel_ok = self.channel == 0 || patchbay_midi::last_channel() == Some(self.channel);
        let target = if channel_ok {
            if self.cc < 32 {
                patchbay_midi::cc14_norm(self.cc)
            } else {
                patchbay_midi::cc_norm(self.cc)
            }
        } else {
            0.0
        };
        self.smooth.set_target(target);

        for v in io.control_out[..io.frames].iter_mut() {
            self.last_val = self.smooth.advance();
            *v = self.last_val;
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => match tag {
                '1' => self.channel = (value as i32).clamp(0, 16) as u8,
                '2' => self.cc = (value as i32).clamp(0, 127) as u8,
                _ => {}
            },
            CommandOutcome::Pending | CommandOutcome::NotHandled => {}
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "chan" => self.channel = (value as i32).clamp(0, 16) as u8,
            "cc" => self.cc = (value as i32).clamp(0, 127) as u8,
            _ => {}
        }
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "chan" => Some(self.channel as f32),
            "cc" => Some(self.cc as f32),
            "value" => Some(self.last_val),
            _ => None,
        }
    }

    fn produces_control(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "midi_to_cv",
        name: "MIDI to CV",
        description: "Reads a MIDI CC (7- or 14-bit) from the process-wide MIDI table as a smoothed CV",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let cc = config_f32("midi_to_cv", config, "cc", 1.0)?.clamp(0.0, 127.0) as u8;
    let chan = config_f32("midi_to_cv", config, "chan", 0.0)?.clamp(0.0, 16.0) as u8;
    Ok(Box::new(MidiToCvModule::new(cc, chan, sample_rate)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests share the process-wide MIDI table; serialize so one test's
    // reset()/record_cc() calls can't interleave with another's.
    static TEST_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn seven_bit_cc_tracks_table_value() {
        let _guard = TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        patchbay_midi::reset();
        patchbay_midi::record_cc(1, 64, 127);
        let mut m = MidiToCvModule::new(64, 0, 1000.0);
        let frames = 2000;
        let mut control_out = vec![0.0f32; frames];
        let mut audio_out = vec![0.0f32; frames];
        let mut io = ModuleIo {
            audio_in: &[],
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames,
        };
        m.process_control(&mut io);
        assert!((io.control_out[frames - 1] - 1.0).abs() < 0.05);
    }

    #[test]
    fn mismatched_channel_holds_at_last_value() {
        let _guard = TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner());
        patchbay_midi::reset();
        patchbay_midi::record_cc(2, 64, 127);
        let mut m = MidiToCvModule::new(64, 5, 1000.0);
        let frames = 2000;
        let mut control_out = vec![0.0f32; frames];
        let mut audio_out = vec![0.0f32; frames];
        let mut io = ModuleIo {
            audio_in: &[],
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames,
        };
        m.process_control(&mut io);
        assert!(io.control_out[frames - 1].abs() < 0.01);
    }
}
