//! Shared helpers used by most builtin modules: the `:<tag> <value>`
//! command-entry mini-language and the additive-CV-then-clamp pattern.
//!
//! Grounded on the repeated `entering_command`/`command_buffer`/
//! `command_index` fields and handling seen identically across every
//! `original_source/modules/*/\*.c handle_input` function (e.g.
//! `vco.c`'s `vco_handle_input`, `c_clock_s.c`, `c_lfo.c`): normal mode
//! dispatches single keystrokes, `:` enters command mode, `Enter` parses
//! `sscanf(buf, "%c %f", &type, &val)` and dispatches on `type`, `Escape`
//! aborts, `Backspace` edits.

use patchbay_core::InputKey;

/// Line-editing state for a module's `:<tag> <value>` command mode.
#[derive(Debug, Clone, Default)]
pub struct CommandEntry {
    active: bool,
    buffer: String,
}

/// Result of feeding one keystroke to a [`CommandEntry`].
pub enum CommandOutcome {
    /// The key was consumed by the command-entry state machine and
    /// produced no completed command (still typing, or entered/left
    /// command mode).
    Pending,
    /// A complete `<tag> <value>` command was parsed on `Enter`.
    Submitted(char, f32),
    /// The key was not related to command entry; the caller should
    /// handle it as a normal-mode keystroke.
    NotHandled,
}

impl CommandEntry {
    /// Whether command entry is currently active (consumes all keys).
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feeds one keystroke through the command mini-language.
    ///
    /// When not active, only `:` is handled (enters command mode); every
    /// other key returns [`CommandOutcome::NotHandled`] so the caller's
    /// normal-mode keymap runs instead.
    pub fn handle(&mut self, key: InputKey) -> CommandOutcome {
        if !self.active {
            if key == InputKey::Char(':') {
                self.active = true;
                self.buffer.clear();
                return CommandOutcome::Pending;
            }
            return CommandOutcome::NotHandled;
        }

        match key {
            InputKey::Enter => {
                self.active = false;
                let parsed = parse_tag_value(&self.buffer);
                self.buffer.clear();
                match parsed {
                    Some((tag, value)) => CommandOutcome::Submitted(tag, value),
                    None => CommandOutcome::Pending,
                }
            }
            InputKey::Escape => {
                self.active = false;
                self.buffer.clear();
                CommandOutcome::Pending
            }
            InputKey::Backspace => {
                self.buffer.pop();
                CommandOutcome::Pending
            }
            InputKey::Char(c) if c.is_ascii_graphic() || c == ' ' => {
                if self.buffer.len() < 63 {
                    self.buffer.push(c);
                }
                CommandOutcome::Pending
            }
            _ => CommandOutcome::Pending,
        }
    }
}

/// Parses a `<tag> <value>` command buffer — `sscanf("%c %f", ...)`'s
/// Rust equivalent: one tag character, whitespace, then a float.
fn parse_tag_value(buffer: &str) -> Option<(char, f32)> {
    let trimmed = buffer.trim_start();
    let mut chars = trimmed.chars();
    let tag = chars.next()?;
    let rest = chars.as_str().trim();
    let value: f32 = rest.parse().ok()?;
    Some((tag, value))
}

/// Combines a module's declared CV inputs matching `param_name` with a
/// smoothed base value, additively, then clamps to `[lo, hi]`.
///
/// Grounded on the flat-additive params in `original_source/`
/// (`noise.c`'s `amp`, `c_lfo.c`'s `amp`/`depth`, `c_sh.c`'s `depth`,
/// `wav_player.c`'s `amp`): each CV sample is itself clamped to
/// `[-1, 1]` before being added, so one wildly out-of-range patch input
/// cannot blow past the target parameter's own range. Not every
/// parameter uses this shape — `vco.c`'s `freq`/`amp`, `c_lfo.c`'s
/// `freq`, `c_sh.c`'s `rate`, and `wav_player.c`'s `speed`/`scrub` scale
/// the CV by a parameter-specific range instead of adding it flat; those
/// are hand-rolled at the call site rather than routed through here.
pub fn apply_cv_additive(
    base: f32,
    control_in: &[(&[f32], &str)],
    param_name: &str,
    frame: usize,
    lo: f32,
    hi: f32,
) -> f32 {
    let mut value = base;
    for (buf, name) in control_in {
        if *name == param_name {
            if let Some(&raw) = buf.get(frame) {
                value += raw.clamp(-1.0, 1.0);
            }
        }
    }
    value.clamp(lo, hi)
}

/// Substitutes zero for non-finite samples and clamps to `[-1, 1]`,
/// the per-module output hygiene every module applies before writing a
/// sample (spec's DSP-hygiene policy).
#[inline]
pub fn sanitize(sample: f32) -> f32 {
    if sample.is_finite() {
        sample.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Paul Kellet's pink-noise filter, sample-rate-adapted via the `a`
/// coefficients' `44100/sr` power scaling.
///
/// Grounded on `original_source/modules/noise_source/pink_filter.h`,
/// shared by the `random` and `noise` modules (the C original repeats
/// this header verbatim in both).
#[derive(Debug, Clone, Copy)]
pub struct PinkFilter {
    b: [f32; 7],
    a: [f32; 6],
    g: [f32; 7],
}

impl PinkFilter {
    pub fn new(sample_rate: f32) -> Self {
        const A44: [f32; 6] = [0.99886, 0.99332, 0.96900, 0.86650, 0.55000, -0.7616];
        const G44: [f32; 7] = [
            0.0555179, 0.0750759, 0.1538520, 0.3104856, 0.5329522, 0.0168980, 0.115926,
        ];
        let fs_ratio = 44100.0 / sample_rate;
        let mut a = [0.0f32; 6];
        let mut g = [0.0f32; 7];
        for i in 0..6 {
            a[i] = libm::powf(A44[i].abs(), fs_ratio);
            g[i] = G44[i] * (1.0 - a[i]);
            if A44[i] < 0.0 {
                g[i] *= -1.0;
            }
        }
        g[6] = G44[6];
        Self { b: [0.0; 7], a, g }
    }

    pub fn process(&mut self, white: f32) -> f32 {
        self.b[0] = self.a[0] * self.b[0] + white * self.g[0];
        self.b[1] = self.a[1] * self.b[1] + white * self.g[1];
        self.b[2] = self.a[2] * self.b[2] + white * self.g[2];
        self.b[3] = self.a[3] * self.b[3] + white * self.g[3];
        self.b[4] = self.a[4] * self.b[4] + white * self.g[4];
        self.b[5] = self.a[5] * self.b[5] - white * self.g[5];
        let pink = self.b[0] + self.b[1] + self.b[2] + self.b[3] + self.b[4] + self.b[5] + self.b[6] + white * 0.5362;
        self.b[6] = white * self.g[6];
        pink
    }
}

/// Leaky-integrator brown-noise shaper with runaway-accumulation clamp.
///
/// Grounded on `original_source/modules/noise_source/brown_noise.h`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrownFilter {
    last: f32,
}

impl BrownFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, white: f32) -> f32 {
        self.last += 0.02 * white;
        self.last = self.last.clamp(-1.0, 1.0);
        3.0 * self.last
    }
}

/// xorshift32 PRNG, seeded per-instance — the C original seeds from
/// `time(NULL) ^ (uintptr_t)state`; here the caller supplies a seed
/// (e.g. derived from a `std::time` read at construction) since this
/// crate has no business reaching for wall-clock time itself.
#[derive(Debug, Clone, Copy)]
pub struct Xorshift32 {
    state: u32,
}

impl Xorshift32 {
    pub fn new(seed: u32) -> Self {
        Self { state: if seed == 0 { 0x9E3779B9 } else { seed } }
    }

    /// Next sample in `[-1, 1)`.
    pub fn next_white(&mut self) -> f32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        (x as f32 / 4294967296.0) * 2.0 - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_entry_round_trip() {
        let mut cmd = CommandEntry::default();
        assert!(matches!(cmd.handle(InputKey::Char('x')), CommandOutcome::NotHandled));
        assert!(matches!(cmd.handle(InputKey::Char(':')), CommandOutcome::Pending));
        assert!(cmd.is_active());
        for c in "1 440.5".chars() {
            cmd.handle(InputKey::Char(c));
        }
        match cmd.handle(InputKey::Enter) {
            CommandOutcome::Submitted(tag, value) => {
                assert_eq!(tag, '1');
                assert!((value - 440.5).abs() < 1e-6);
            }
            _ => panic!("expected a submitted command"),
        }
        assert!(!cmd.is_active());
    }

    #[test]
    fn escape_aborts_without_submitting() {
        let mut cmd = CommandEntry::default();
        cmd.handle(InputKey::Char(':'));
        cmd.handle(InputKey::Char('1'));
        assert!(matches!(cmd.handle(InputKey::Escape), CommandOutcome::Pending));
        assert!(!cmd.is_active());
    }

    #[test]
    fn cv_additive_then_clamp() {
        let buf = [1.5f32, -2.0, 0.0];
        let control_in: Vec<(&[f32], &str)> = vec![(&buf, "freq")];
        let out = apply_cv_additive(100.0, &control_in, "freq", 0, 0.0, 100.5);
        // raw 1.5 clamps to 1.0 before adding -> 101.0, then clamped to 100.5
        assert_eq!(out, 100.5);
    }

    #[test]
    fn sanitize_replaces_non_finite() {
        assert_eq!(sanitize(f32::NAN), 0.0);
        assert_eq!(sanitize(f32::INFINITY), 0.0);
        assert_eq!(sanitize(2.0), 1.0);
        assert_eq!(sanitize(-2.0), -1.0);
    }
}
