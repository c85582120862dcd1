//! WAV sample playback with a separate play/scrub position, linear
//! interpolation between samples, and CV-modulated speed/amp/scrub.
//!
//! Grounded on `original_source/modules/wav_player/wav_player.c`: the
//! file is loaded once at construction and summed to mono across
//! channels (`libsndfile` in the original, `hound` here). While
//! `playing`, position advances by `speed * file_rate / sample_rate`
//! each sample and wraps to `0.0` at end-of-file; while stopped, the
//! *scrub* target (itself CV-modulatable) becomes the read position
//! directly, so scrubbing shows instantly without waiting for playback
//! to resume. `speed`'s CV span is `±4.0`, `scrub`'s is `±10%` of the
//! file length per unit CV — both wider than the plain `±1` used
//! elsewhere, matching the original's per-parameter CV scale factors.

use patchbay_core::{InputKey, Module, ModuleIo, SmoothedParam};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_f32, config_str};

use crate::util::{CommandEntry, CommandOutcome};

pub struct WavPlayerModule {
    data: Vec<f32>,
    file_rate: f32,
    sample_rate: f32,
    play_pos: f32,
    external_play_pos: f32,
    scrub_target: f32,
    playback_speed: f32,
    amp: f32,
    playing: bool,
    smooth_speed: SmoothedParam,
    smooth_amp: SmoothedParam,
    cmd: CommandEntry,
}

impl WavPlayerModule {
    fn new(data: Vec<f32>, file_rate: f32, sample_rate: f32, playback_speed: f32, amp: f32) -> Self {
        let mut smooth_speed = SmoothedParam::with_config(playback_speed, sample_rate, 15.0);
        smooth_speed.set_immediate(playback_speed);
        let mut smooth_amp = SmoothedParam::with_config(amp, sample_rate, 15.0);
        smooth_amp.set_immediate(amp);
        let mut m = Self {
            data,
            file_rate,
            sample_rate,
            play_pos: 0.0,
            external_play_pos: 0.0,
            scrub_target: 0.0,
            playback_speed,
            amp,
            playing: true,
            smooth_speed,
            smooth_amp,
            cmd: CommandEntry::default(),
        };
        m.clamp_params();
        m
    }

    fn max_frames(&self) -> usize {
        self.data.len()
    }

    fn clamp_params(&mut self) {
        let top = (self.max_frames().saturating_sub(1)) as f32;
        self.scrub_target = self.scrub_target.clamp(0.0, top);
        self.play_pos = self.play_pos.clamp(0.0, top);
        self.playback_speed = self.playback_speed.clamp(0.1, 4.0);
        self.amp = self.amp.clamp(0.0, 1.0);
    }
}

impl Module for WavPlayerModule {
    fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
        let max_frames = self.max_frames();
        if max_frames < 2 {
            for v in io.audio_out[..io.frames].iter_mut() {
                *v = 0.0;
            }
            return;
        }

        self.smooth_speed.set_target(self.playback_speed);
        self.smooth_amp.set_target(self.amp);

        let mut pos = if self.playing { self.play_pos } else { self.external_play_pos };
        let mut scrub_target = self.scrub_target.clamp(0.0, (max_frames - 1) as f32);
        pos = pos.clamp(0.0, (max_frames - 1) as f32);

        for i in 0..io.frames {
            let mut speed = self.smooth_speed.advance();
            let mut amp = self.smooth_amp.advance();

            for (buf, name) in io.control_in {
                let Some(&raw) = buf.get(i) else { continue };
                let control = raw.clamp(-1.0, 1.0);
                match *name {
                    "speed" => speed += control * 4.0,
                    "amp" => amp += control,
                    "scrub" => scrub_target += control * (0.1 * max_frames as f32),
                    _ => {}
                }
            }
            speed = speed.clamp(0.1, 4.0);
            amp = amp.clamp(0.0, 1.0);
            scrub_target = scrub_target.clamp(0.0, (max_frames - 1) as f32);

            if !self.playing {
                pos = scrub_target;
            }
            pos = pos.clamp(0.0, (max_frames - 2) as f32);

            let i1 = pos as usize;
            let i2 = i1 + 1;
            let frac = pos - i1 as f32;
            let s1 = self.data[i1];
            let s2 = self.data[i2];
            io.audio_out[i] = ((1.0 - frac) * s1 + frac * s2) * amp;

            if self.playing {
                pos += speed * (self.file_rate / self.sample_rate);
                if pos >= (max_frames - 1) as f32 {
                    pos = 0.0;
                }
            }
        }

        self.scrub_target = scrub_target;
        if self.playing {
            self.play_pos = pos;
            self.external_play_pos = pos;
        } else {
            self.external_play_pos = pos;
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        match self.cmd.handle(key) {
            CommandOutcome::Submitted(tag, value) => {
                match tag {
                    '1' => {
                        let new_pos = (value * self.sample_rate).clamp(0.0, (self.max_frames().saturating_sub(1)) as f32);
                        self.play_pos = new_pos;
                        self.external_play_pos = new_pos;
                    }
                    '2' => self.playback_speed = value,
                    '3' => self.amp = value,
                    _ => {}
                }
                self.clamp_params();
            }
            CommandOutcome::Pending => {}
            CommandOutcome::NotHandled => match key {
                InputKey::Char('-') => {
                    self.play_pos -= self.sample_rate * 0.1;
                    self.clamp_params();
                }
                InputKey::Char('=') => {
                    self.play_pos += self.sample_rate * 0.1;
                    self.clamp_params();
                }
                InputKey::Char('_') => {
                    self.playback_speed -= 0.01;
                    self.clamp_params();
                }
                InputKey::Char('+') => {
                    self.playback_speed += 0.01;
                    self.clamp_params();
                }
                InputKey::Char('[') => {
                    self.amp -= 0.01;
                    self.clamp_params();
                }
                InputKey::Char(']') => {
                    self.amp += 0.01;
                    self.clamp_params();
                }
                InputKey::Char('p') => self.playing = true,
                InputKey::Char('s') => self.playing = false,
                _ => {}
            },
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        match name {
            "speed" => self.playback_speed = value,
            "amp" => self.amp = value,
            _ => {}
        }
        self.clamp_params();
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "speed" => Some(self.playback_speed),
            "amp" => Some(self.amp),
            _ => None,
        }
    }

    fn produces_audio(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "wav_player",
        name: "WAV Player",
        description: "Mono-summed WAV sample playback with scrub position and speed/amp CV",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let file = config_str(config, "file", "sample.wav");
    let speed = config_f32("wav_player", config, "speed", 1.0)?;
    let amp = config_f32("wav_player", config, "amp", 1.0)?;

    let mut reader = hound::WavReader::open(file).map_err(|e| RegistryError::InvalidConfigValue {
        module_type: "wav_player".to_string(),
        key: "file".to_string(),
        value: format!("{file}: {e}"),
    })?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let file_rate = spec.sample_rate as f32;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>(),
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<Vec<_>, _>>()
        }
    }
    .map_err(|e| RegistryError::InvalidConfigValue {
        module_type: "wav_player".to_string(),
        key: "file".to_string(),
        value: format!("{file}: {e}"),
    })?;

    let data: Vec<f32> = if channels <= 1 {
        samples
    } else {
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(Box::new(WavPlayerModule::new(data, file_rate, sample_rate, speed, amp)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_player(data: Vec<f32>) -> WavPlayerModule {
        WavPlayerModule::new(data, 48000.0, 48000.0, 1.0, 1.0)
    }

    #[test]
    fn linear_interpolation_between_samples() {
        let mut player = test_player(vec![0.0, 1.0, 0.0, -1.0]);
        player.playing = false;
        player.scrub_target = 0.5;
        let frames = 1;
        let mut audio_out = vec![0.0f32; frames];
        let mut control_out = vec![0.0f32; frames];
        let mut io = ModuleIo {
            audio_in: &[],
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames,
        };
        player.process_audio(&mut io);
        assert!((io.audio_out[0] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn playback_wraps_at_end_of_file() {
        let mut player = test_player(vec![0.0; 10]);
        player.play_pos = 8.9;
        let frames = 4;
        let mut audio_out = vec![0.0f32; frames];
        let mut control_out = vec![0.0f32; frames];
        let mut io = ModuleIo {
            audio_in: &[],
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames,
        };
        player.process_audio(&mut io);
        assert!(player.play_pos < 9.0);
    }

    #[test]
    fn create_loads_a_real_file_and_sums_channels_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..16 {
            writer.write_sample(0.5f32).unwrap();
            writer.write_sample(-0.5f32).unwrap();
        }
        writer.finalize().unwrap();

        let config = vec![("file".to_string(), path.display().to_string())];
        let mut module = create(&config, 48_000.0).expect("should load the file it just wrote");
        assert!(module.produces_audio());

        // Stereo 0.5/-0.5 sums to 0.0 mono; playback of silence is silence.
        let frames = 4;
        let mut audio_out = vec![9.0f32; frames];
        let mut control_out = vec![0.0f32; frames];
        let mut io = ModuleIo {
            audio_in: &[],
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames,
        };
        module.process_audio(&mut io);
        assert!(io.audio_out.iter().all(|&s| s.abs() < 1e-5));
        module.destroy();
    }

    #[test]
    fn missing_file_is_a_registry_error() {
        let config = vec![("file".to_string(), "/no/such/patchbay-test-file.wav".to_string())];
        assert!(create(&config, 48_000.0).is_err());
    }

    #[test]
    fn too_short_file_outputs_silence() {
        let mut player = test_player(vec![0.5]);
        let frames = 4;
        let mut audio_out = vec![9.0f32; frames];
        let mut control_out = vec![0.0f32; frames];
        let mut io = ModuleIo {
            audio_in: &[],
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames,
        };
        player.process_audio(&mut io);
        assert!(io.audio_out.iter().all(|v| *v == 0.0));
    }
}
