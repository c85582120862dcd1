//! Mix recorder: passes its audio input through unchanged while copying
//! it into a growable buffer, and hands completed takes off to a
//! dedicated writer thread so WAV encoding never touches the audio
//! thread.
//!
//! Grounded on `original_source/modules/e_recorder/e_recorder.c`. The
//! original records each of a module's several raw input channels as
//! separate stems plus their mix; here the scheduler already sums every
//! wired audio connection into the single `audio_in` buffer a module
//! sees (the uniform-gain fan-in rule), so there is only one stem to
//! capture and it doubles as the mix — one WAV file per take rather
//! than the original's per-channel set. The producer/consumer handoff
//! (mutex + condvar, one pending job at a time, a superseded pending
//! job is dropped rather than queued) and the growable take buffer are
//! carried over directly; `Vec::push`'s amortized doubling replaces the
//! original's manual `realloc`-and-double.

use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use patchbay_core::{InputKey, Module, ModuleIo};
use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError, config_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecState {
    Idle,
    Recording,
}

struct Job {
    take_id: u32,
    sample_rate: f32,
    data: Vec<f32>,
    dir: PathBuf,
}

struct WriterShared {
    lock: Mutex<WriterState>,
    cv: Condvar,
}

struct WriterState {
    running: bool,
    job: Option<Job>,
}

fn writer_main(shared: Arc<WriterShared>) {
    let mut guard = shared.lock.lock().unwrap_or_else(|e| e.into_inner());
    loop {
        while guard.running && guard.job.is_none() {
            guard = shared.cv.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
        if !guard.running {
            return;
        }
        let job = guard.job.take().expect("woken with a pending job");
        drop(guard);

        write_take(&job);

        guard = shared.lock.lock().unwrap_or_else(|e| e.into_inner());
    }
}

fn write_take(job: &Job) {
    if let Err(e) = std::fs::create_dir_all(&job.dir) {
        tracing::warn!(dir = %job.dir.display(), error = %e, "recorder: failed to create output directory");
        return;
    }
    let path = job.dir.join(format!("sc_take_{:03}_mix.wav", job.take_id));
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: job.sample_rate as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = match hound::WavWriter::create(&path, spec) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "recorder: failed to open take for writing");
            return;
        }
    };
    for &sample in &job.data {
        if writer.write_sample(sample).is_err() {
            tracing::warn!(path = %path.display(), "recorder: write failed mid-take, dropping take");
            return;
        }
    }
    if let Err(e) = writer.finalize() {
        tracing::warn!(path = %path.display(), error = %e, "recorder: failed to finalize take");
    }
}

pub struct RecorderModule {
    sample_rate: f32,
    state: RecState,
    buffer: Vec<f32>,
    take_id: u32,
    output_dir: PathBuf,
    shared: Arc<WriterShared>,
    writer_thread: Option<JoinHandle<()>>,
}

impl RecorderModule {
    fn new(sample_rate: f32, output_dir: PathBuf) -> Self {
        let shared = Arc::new(WriterShared {
            lock: Mutex::new(WriterState { running: true, job: None }),
            cv: Condvar::new(),
        });
        let thread_shared = shared.clone();
        let writer_thread = std::thread::Builder::new()
            .name("recorder-writer".to_string())
            .spawn(move || writer_main(thread_shared))
            .ok();
        Self {
            sample_rate,
            state: RecState::Idle,
            buffer: Vec::new(),
            take_id: 0,
            output_dir,
            shared,
            writer_thread,
        }
    }

    fn start(&mut self) {
        self.state = RecState::Recording;
        self.buffer.clear();
    }

    fn stop_and_submit(&mut self) {
        self.state = RecState::Idle;
        if self.buffer.is_empty() {
            return;
        }
        let job = Job {
            take_id: self.take_id,
            sample_rate: self.sample_rate,
            data: std::mem::take(&mut self.buffer),
            dir: self.output_dir.clone(),
        };
        let mut guard = self.shared.lock.lock().unwrap_or_else(|e| e.into_inner());
        guard.job = Some(job);
        self.shared.cv.notify_one();
        drop(guard);
        self.take_id += 1;
    }
}

impl Module for RecorderModule {
    fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
        io.audio_out[..io.frames].copy_from_slice(&io.audio_in[..io.frames]);
        if self.state == RecState::Recording {
            self.buffer.extend_from_slice(&io.audio_in[..io.frames]);
        }
    }

    fn handle_input(&mut self, key: InputKey) {
        if key == InputKey::Char(' ') {
            match self.state {
                RecState::Idle => self.start(),
                RecState::Recording => self.stop_and_submit(),
            }
        }
    }

    fn set_param(&mut self, name: &str, value: f32) {
        if name != "rec" {
            return;
        }
        match self.state {
            RecState::Idle if value >= 0.5 => self.start(),
            RecState::Recording if value < 0.5 => self.stop_and_submit(),
            _ => {}
        }
    }

    fn get_param(&self, name: &str) -> Option<f32> {
        match name {
            "rec" => Some(if self.state == RecState::Recording { 1.0 } else { 0.0 }),
            "take" => Some(self.take_id as f32),
            _ => None,
        }
    }

    fn destroy(&mut self) {
        let mut guard = self.shared.lock.lock().unwrap_or_else(|e| e.into_inner());
        guard.running = false;
        self.shared.cv.notify_one();
        drop(guard);
        if let Some(handle) = self.writer_thread.take() {
            let _ = handle.join();
        }
    }

    fn produces_audio(&self) -> bool {
        true
    }
}

pub(crate) fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor {
        id: "recorder",
        name: "Recorder",
        description: "Passes audio through while recording it to WAV on a background writer thread",
    }
}

pub(crate) fn create(config: &[ConfigPair], sample_rate: f32) -> Result<Box<dyn Module>, RegistryError> {
    let dir = config_str(config, "dir", "e_output_files/recordings");
    Ok(Box::new(RecorderModule::new(sample_rate, PathBuf::from(dir))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_recorder() -> RecorderModule {
        RecorderModule::new(48000.0, std::env::temp_dir().join("patchbay-recorder-test"))
    }

    #[test]
    fn passthrough_always_mirrors_input() {
        let mut rec = test_recorder();
        let frames = 8;
        let audio_in = vec![0.25f32; frames];
        let mut audio_out = vec![0.0f32; frames];
        let mut control_out = vec![0.0f32; frames];
        let mut io = ModuleIo {
            audio_in: &audio_in,
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames,
        };
        rec.process_audio(&mut io);
        assert!(io.audio_out.iter().all(|&v| (v - 0.25).abs() < 1e-6));
        rec.destroy();
    }

    #[test]
    fn recording_accumulates_only_while_active() {
        let mut rec = test_recorder();
        let frames = 4;
        let audio_in = vec![1.0f32; frames];
        let mut audio_out = vec![0.0f32; frames];
        let mut control_out = vec![0.0f32; frames];
        let mut io = ModuleIo {
            audio_in: &audio_in,
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames,
        };
        rec.process_audio(&mut io);
        assert!(rec.buffer.is_empty());

        rec.handle_input(InputKey::Char(' '));
        rec.process_audio(&mut io);
        assert_eq!(rec.buffer.len(), frames);

        rec.handle_input(InputKey::Char(' '));
        assert!(rec.buffer.is_empty());
        assert_eq!(rec.take_id, 1);
        rec.destroy();
    }

    #[test]
    fn set_param_toggles_same_as_spacebar() {
        let mut rec = test_recorder();
        rec.set_param("rec", 1.0);
        assert_eq!(rec.state, RecState::Recording);
        rec.set_param("rec", 0.0);
        assert_eq!(rec.state, RecState::Idle);
        rec.destroy();
    }
}
