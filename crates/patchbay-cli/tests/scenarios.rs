//! End-to-end scenario tests (§8): each builds a patch from text and
//! drives it through the same `Graph`/`process_block` path the engine
//! binary uses, asserting on the resulting audio or control output.

use std::sync::Mutex;

use patchbay_core::{InputKey, MAX_BLOCK_SIZE};
use patchbay_patch::{process_block, Graph};
use patchbay_registry::ModuleRegistry;
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

fn registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    patchbay_modules::register_builtins(&mut registry);
    registry
}

/// Renders `total_frames` of silence-driven output from `text`, chunked
/// to the scheduler's block-size limit, and tears the graph down.
fn render(text: &str, sample_rate: f32, total_frames: usize) -> Vec<f32> {
    let registry = registry();
    let mut graph = Graph::build(text, &registry, sample_rate).expect("patch should build");
    let mut out = vec![0.0f32; total_frames];
    let mut offset = 0;
    while offset < total_frames {
        let frames = (total_frames - offset).min(MAX_BLOCK_SIZE);
        process_block(&mut graph, &[], &mut out[offset..offset + frames], frames);
        offset += frames;
    }
    graph.destroy_all();
    out
}

/// Hann-windowed FFT magnitude at the bin nearest `target_freq`.
fn magnitude_at(samples: &[f32], sample_rate: f32, target_freq: f32) -> f32 {
    let n = samples.len();
    let mut buf: Vec<Complex<f32>> = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let w = 0.5 - 0.5 * (std::f32::consts::TAU * i as f32 / (n - 1) as f32).cos();
            Complex::new(s * w, 0.0)
        })
        .collect();
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buf);
    let bin = (target_freq * n as f32 / sample_rate).round() as usize;
    buf[bin].norm()
}

// S1: a bare noise source's output is nonzero white noise whose RMS
// matches the uniform-distribution prediction for its configured amp.
#[test]
fn s1_noise_source_rms_matches_uniform_prediction() {
    let sample_rate = 48000.0;
    let frames = 48_000; // 1s - enough samples for the RMS estimate to converge
    let out = render("noise:n amp=0.5\n", sample_rate, frames);

    assert!(out.iter().any(|&s| s != 0.0), "noise source produced silence");

    let mean_sq: f32 = out.iter().map(|&s| s * s).sum::<f32>() / out.len() as f32;
    let rms = mean_sq.sqrt();
    let expected = 0.5 / 3f32.sqrt();
    assert!(
        (rms - expected).abs() < 0.02,
        "rms {rms} not close to uniform-noise prediction {expected}"
    );
}

// S2: a VCO feeding a low-cutoff Moog filter attenuates the VCO's
// fundamental by at least 3dB relative to the unfiltered signal.
#[test]
fn s2_moog_filter_attenuates_fundamental_above_cutoff() {
    let sample_rate = 48000.0;
    let settle = 4096;
    let window = 9600; // exactly 200 cycles of 1000Hz at 48kHz - no spectral leakage
    let total = settle + window;

    let dry = render("vco:v1 freq=1000,wave=sine,amp=1.0\n", sample_rate, total);
    let wet = render(
        "vco:v1 freq=1000,wave=sine,amp=1.0\nmoog_filter:mf in=v1 cutoff=150,res=0.1\n",
        sample_rate,
        total,
    );

    let dry_mag = magnitude_at(&dry[settle..], sample_rate, 1000.0);
    let wet_mag = magnitude_at(&wet[settle..], sample_rate, 1000.0);

    assert!(dry_mag > 0.0, "dry fundamental measured zero magnitude");
    let attenuation_db = 20.0 * (wet_mag / dry_mag).log10();
    assert!(
        attenuation_db <= -3.0,
        "expected at least 3dB attenuation at the fundamental, got {attenuation_db}dB"
    );
}

// S3: setting bpm on a primary clock (the OSC-dispatch path's
// underlying `set_param` call) propagates to every secondary clock
// wired to it and resets both clocks' phase.
//
// `patchbay_clock`'s registry is process-global, so this is the only
// test in the binary that registers clocks; the guard just documents
// that constraint for anyone adding a second one later.
static CLOCK_REGISTRY_GUARD: Mutex<()> = Mutex::new(());

#[test]
fn s3_primary_bpm_change_propagates_to_secondary() {
    let _guard = CLOCK_REGISTRY_GUARD.lock().unwrap_or_else(|e| e.into_inner());

    let sample_rate = 48000.0;
    let registry = registry();
    let mut graph = Graph::build(
        "clock_s:clk1 bpm=120,mult=1,pw=0.5\nclock_s:clk2 bpm=60,mult=2,pw=0.25 cv=clk1:sync\n",
        &registry,
        sample_rate,
    )
    .expect("clock patch should build");

    // One block establishes clk2's `has_sync` (set from `control_in`
    // inside `process_control`, not at construction) before propagation
    // is exercised.
    let mut out = vec![0.0f32; 64];
    process_block(&mut graph, &[], &mut out, 64);

    graph
        .module_mut("clk1")
        .expect("clk1 should exist")
        .set_param("bpm", 180.0);

    let clk1_bpm = graph.module_mut("clk1").unwrap().get_param("bpm").unwrap();
    let clk2_bpm = graph.module_mut("clk2").unwrap().get_param("bpm").unwrap();
    assert_eq!(clk1_bpm, 180.0);
    assert_eq!(clk2_bpm, 180.0, "secondary did not adopt the primary's new bpm");

    graph.destroy_all();
}

// S4: an LFO modulating a VCO's `freq` CV produces FM sidebands at
// carrier +/- modulator frequency, absent from the unmodulated carrier
// alone, and the sideband's magnitude scales with the carrier frequency
// the way `vco.c`'s proportional `mod_range = frequency * mod_depth`
// predicts — a flat ±1Hz CV span (independent of carrier) would leave
// the sideband magnitude the same at both carriers instead of doubling.
#[test]
fn s4_lfo_modulated_vco_produces_sidebands_at_mod_frequency() {
    let sample_rate = 48000.0;
    let settle = 8192;
    let window = 9600; // bin resolution 48000/9600=5Hz - every probed freq lands on an exact bin
    let total = settle + window;

    let carrier_only = render("vco:v1 freq=500,wave=sine,amp=1.0\n", sample_rate, total);
    let modulated_500 = render(
        "lfo:lfo freq=50,amp=1.0,depth=0.02\nvco:v2 freq=500,wave=sine,amp=1.0 cv=lfo:freq\n",
        sample_rate,
        total,
    );
    let modulated_1000 = render(
        "lfo:lfo freq=50,amp=1.0,depth=0.02\nvco:v2 freq=1000,wave=sine,amp=1.0 cv=lfo:freq\n",
        sample_rate,
        total,
    );

    // The sideband sits 10 bins from the carrier's own bin, well outside
    // a Hann window's mainlobe, so leakage from the unmodulated tone
    // alone stays near the noise floor.
    let carrier_sideband = magnitude_at(&carrier_only[settle..], sample_rate, 450.0);
    let sideband_500 = magnitude_at(&modulated_500[settle..], sample_rate, 450.0);
    let sideband_1000 = magnitude_at(&modulated_1000[settle..], sample_rate, 950.0);

    assert!(
        sideband_500 > carrier_sideband * 4.0,
        "expected a modulation sideband near 450Hz: unmodulated={carrier_sideband} modulated={sideband_500}"
    );

    // Peak deviation is `depth * amp * frequency * mod_depth`, so at a
    // fixed lfo depth/amp the 1000Hz carrier's deviation (and, in this
    // narrowband regime, its sideband magnitude) should be about double
    // the 500Hz carrier's.
    let ratio = sideband_1000 / sideband_500;
    assert!(
        (1.4..3.0).contains(&ratio),
        "expected the sideband at 2x carrier frequency to be ~2x as strong \
         (proportional freq-CV scaling), got ratio {ratio}: 500Hz={sideband_500} 1000Hz={sideband_1000}"
    );
}

// S5: two spacebar keystrokes bracket a take; the WAV the recorder
// writes to disk matches the recorded input sample-for-sample.
#[test]
fn s5_recorder_take_matches_input_frame_count() {
    let sample_rate = 48000.0;
    let dir = tempfile::tempdir().expect("tempdir");

    let registry = registry();
    let mut graph = Graph::build(
        &format!("noise:n amp=0.5\nrecorder:rec in=n dir={}\n", dir.path().display()),
        &registry,
        sample_rate,
    )
    .expect("recorder patch should build");

    let frames = 2_400usize;
    graph.for_each_module_mut(|alias, m| {
        if alias == "rec" {
            m.handle_input(InputKey::Char(' ')); // start
        }
    });

    let mut out = vec![0.0f32; frames];
    process_block(&mut graph, &[], &mut out, frames);

    graph.for_each_module_mut(|alias, m| {
        if alias == "rec" {
            m.handle_input(InputKey::Char(' ')); // stop, hands the take to the writer thread
        }
    });
    graph.destroy_all(); // joins the writer thread before the WAV is read back

    let path = dir.path().join("sc_take_000_mix.wav");
    let mut reader = hound::WavReader::open(&path).expect("take file should exist");
    assert_eq!(reader.spec().sample_rate, sample_rate as u32);
    let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();

    assert_eq!(samples.len(), frames, "take frame count should match the recorded span");
    assert!(
        samples.iter().zip(out.iter()).all(|(&a, &b)| (a - b).abs() < 1e-5),
        "recorded take should match the mixed audio output sample-for-sample"
    );
}

// S6: a patch referencing an undeclared alias fails fast with a
// nonzero exit and a diagnostic naming the offending alias.
#[test]
fn s6_forward_reference_fails_with_diagnostic_naming_the_alias() {
    let output = std::process::Command::new(env!("CARGO_BIN_EXE_patchbay"))
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .and_then(|mut child| {
            use std::io::Write;
            child
                .stdin
                .take()
                .unwrap()
                .write_all(b"moog_filter:mf in=foo\n\n")?;
            child.wait_with_output()
        })
        .expect("failed to run patchbay binary");

    assert!(!output.status.success(), "expected a nonzero exit for an unknown alias");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("foo"),
        "expected the diagnostic to name the undeclared alias 'foo', got: {stderr}"
    );
}
