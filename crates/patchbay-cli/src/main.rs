//! Patchbay engine binary (§6): loads a patch, wires up the control
//! plane and audio device, and runs until interrupted.
//!
//! Invocation mirrors `original_source/main.c`'s argv handling: zero
//! arguments reads the patch from standard input until a blank line;
//! one argument treats it as a patch file path. Anything else is a
//! usage error.

use std::io::{BufRead, IsTerminal};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use patchbay_core::{InputKey, MAX_BLOCK_SIZE};
use patchbay_io::{AudioStream, StreamConfig};
use patchbay_patch::{Graph, process_block};
use thiserror::Error;

/// Failures this binary's own argument handling can report, separate
/// from the library-level `thiserror` enums each crate defines (§10.2).
#[derive(Debug, Error)]
enum CliError {
    #[error("usage: patchbay [patch-file]")]
    Usage,
    #[error("failed to read patch from standard input: {0}")]
    Stdin(#[source] std::io::Error),
    #[error("failed to read patch file {path:?}: {source}")]
    PatchFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Exit codes per §6: 0 on clean shutdown; non-zero if patch parse
/// fails, no audio-producing module is present, or the audio stream
/// cannot open.
const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(()) => std::process::exit(EXIT_OK),
        Err(err) => {
            eprintln!("patchbay: {err:#}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}

fn run() -> anyhow::Result<()> {
    let patch_text = read_patch_source()?;

    let config = patchbay_config::EngineConfig::load_or_default(&patchbay_config::paths::default_settings_path());

    let mut registry = patchbay_registry::ModuleRegistry::new();
    patchbay_modules::register_builtins(&mut registry);

    let graph = Graph::build(&patch_text, &registry, config.sample_rate as f32)?;
    if !graph.produces_audio() {
        anyhow::bail!("patch contains no audio-producing module");
    }
    let graph = Arc::new(Mutex::new(graph));

    let stream_config = StreamConfig {
        sample_rate: config.sample_rate,
        buffer_size: config.block_size as u32,
        input_device: config.input_device.clone(),
        output_device: config.output_device.clone(),
    };
    let mut audio_stream = AudioStream::new(stream_config)?;
    let stop_handle = audio_stream.stop_handle();

    let control_plane =
        patchbay_control::ControlPlane::start(Arc::clone(&graph), config.osc_base_port, config.midi_device.as_deref())?;
    tracing::info!(
        osc_port = control_plane.osc_port(),
        midi_connected = control_plane.midi_connected(),
        "patchbay engine started"
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        let stop_handle = Arc::clone(&stop_handle);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::SeqCst);
            stop_handle.store(false, Ordering::SeqCst);
        })
        .ok();
    }

    let audio_thread = {
        let graph = Arc::clone(&graph);
        std::thread::spawn(move || {
            let result = audio_stream.run(move |input: &[f32], output: &mut [f32]| {
                run_block(&graph, input, output);
            });
            if let Err(err) = result {
                tracing::error!(%err, "audio stream terminated");
            }
        })
    };

    ui_loop(&control_plane, running.as_ref(), stop_handle.as_ref());

    stop_handle.store(false, Ordering::SeqCst);
    let _ = audio_thread.join();

    drop(control_plane);
    graph.lock().unwrap_or_else(|e| e.into_inner()).destroy_all();

    Ok(())
}

/// Splits one audio callback into `MAX_BLOCK_SIZE`-sized chunks and runs
/// each through the scheduler, holding the graph lock for the shortest
/// span that covers a single chunk's worth of work.
fn run_block(graph: &Mutex<Graph>, input: &[f32], output: &mut [f32]) {
    let mut offset = 0;
    while offset < output.len() {
        let frames = (output.len() - offset).min(MAX_BLOCK_SIZE);
        let in_slice = if offset < input.len() {
            &input[offset..(offset + frames).min(input.len())]
        } else {
            &[][..]
        };
        let mut g = graph.lock().unwrap_or_else(|e| e.into_inner());
        process_block(&mut g, in_slice, &mut output[offset..offset + frames], frames);
        drop(g);
        offset += frames;
    }
}

/// Polls keystrokes at a ~100 ms cadence and broadcasts each to every
/// module's `handle_input` (§4.6, §5's "UI thread"). Ctrl+C and Ctrl+D
/// are intercepted here rather than forwarded, since the broadcast
/// model gives every module equal claim on a plain character key.
///
/// Falls back to sleeping on `running` if standard input isn't a
/// terminal (headless invocation) — raw-mode key polling has nothing
/// to read in that case.
fn ui_loop(control_plane: &patchbay_control::ControlPlane, running: &AtomicBool, stop_handle: &AtomicBool) {
    if !std::io::stdin().is_terminal() || crossterm::terminal::enable_raw_mode().is_err() {
        while running.load(Ordering::SeqCst) && stop_handle.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(100));
        }
        return;
    }

    while running.load(Ordering::SeqCst) && stop_handle.load(Ordering::SeqCst) {
        match crossterm::event::poll(Duration::from_millis(100)) {
            Ok(true) => {
                if let Ok(crossterm::event::Event::Key(key_event)) = crossterm::event::read() {
                    if is_quit_combo(&key_event) {
                        break;
                    }
                    if let Some(key) = to_input_key(key_event) {
                        control_plane.dispatch_key(key);
                    }
                }
            }
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(%err, "keyboard poll failed, stopping UI thread");
                break;
            }
        }
    }

    let _ = crossterm::terminal::disable_raw_mode();
}

fn is_quit_combo(event: &crossterm::event::KeyEvent) -> bool {
    use crossterm::event::{KeyCode, KeyModifiers};
    event.modifiers.contains(KeyModifiers::CONTROL)
        && matches!(event.code, KeyCode::Char('c') | KeyCode::Char('d'))
}

fn to_input_key(event: crossterm::event::KeyEvent) -> Option<InputKey> {
    use crossterm::event::KeyCode;
    match event.code {
        KeyCode::Char(c) => Some(InputKey::Char(c)),
        KeyCode::Enter => Some(InputKey::Enter),
        KeyCode::Esc => Some(InputKey::Escape),
        KeyCode::Backspace => Some(InputKey::Backspace),
        _ => None,
    }
}

/// Reads the patch text per §6: stdin (until a blank line) with no
/// arguments, or the named file with exactly one.
fn read_patch_source() -> Result<String, CliError> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => read_patch_from_stdin(),
        [path] => std::fs::read_to_string(path).map_err(|source| CliError::PatchFile {
            path: path.clone(),
            source,
        }),
        _ => Err(CliError::Usage),
    }
}

fn read_patch_from_stdin() -> Result<String, CliError> {
    let stdin = std::io::stdin();
    let mut text = String::new();
    for line in stdin.lock().lines() {
        let line = line.map_err(CliError::Stdin)?;
        if line.trim().is_empty() {
            break;
        }
        text.push_str(&line);
        text.push('\n');
    }
    Ok(text)
}
