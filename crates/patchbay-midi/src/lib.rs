//! Process-wide MIDI CC table.
//!
//! Grounded on `original_source/midi.c`: a lock-protected table of the
//! 128 raw 7-bit CC values plus a separate MSB/LSB pair for 14-bit mode
//! (CC 0-31 paired with CC 32-63), and the channel/CC number of the
//! most recently received message. The control plane's MIDI input
//! thread (`midir`-driven, in `patchbay-control`) is the sole writer;
//! any number of `midi_to_cv` modules on the audio thread read from it
//! without blocking the writer — mirroring the lock discipline
//! `patchbay-clock`'s shared-clock registry already uses.

use std::sync::{Mutex, OnceLock};

struct MidiTable {
    cc: [u8; 128],
    cc_msb: [u8; 32],
    cc_lsb: [u8; 32],
    last_channel: Option<u8>,
    last_cc: Option<u8>,
}

impl MidiTable {
    fn new() -> Self {
        Self {
            cc: [0; 128],
            cc_msb: [0; 32],
            cc_lsb: [0; 32],
            last_channel: None,
            last_cc: None,
        }
    }
}

fn table() -> &'static Mutex<MidiTable> {
    static TABLE: OnceLock<Mutex<MidiTable>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(MidiTable::new()))
}

/// Records one incoming Control Change message. `channel` is 1-based
/// (matching the original's `(status & 0x0F) + 1`); `cc`/`value` are
/// 7-bit (0..=127).
pub fn record_cc(channel: u8, cc: u8, value: u8) {
    if cc > 127 {
        return;
    }
    let mut t = table().lock().unwrap_or_else(|e| e.into_inner());
    t.cc[cc as usize] = value;
    if cc < 32 {
        t.cc_msb[cc as usize] = value;
    } else if cc < 64 {
        t.cc_lsb[(cc - 32) as usize] = value;
    }
    t.last_channel = Some(channel);
    t.last_cc = Some(cc);
}

/// Clears all recorded state — called when the MIDI input thread
/// (re)starts, matching `midi_start`'s table reset.
pub fn reset() {
    let mut t = table().lock().unwrap_or_else(|e| e.into_inner());
    *t = MidiTable::new();
}

/// Raw 7-bit value of `cc` (0 if never seen or out of range).
pub fn cc_raw(cc: u8) -> u8 {
    if cc > 127 {
        return 0;
    }
    table().lock().unwrap_or_else(|e| e.into_inner()).cc[cc as usize]
}

/// Normalized `[0, 1]` value of a legacy 7-bit CC.
pub fn cc_norm(cc: u8) -> f32 {
    cc_raw(cc) as f32 / 127.0
}

/// Raw 14-bit value (`0..=16383`) formed from `cc` (MSB, 0..=31) and
/// `cc + 32` (LSB).
pub fn cc14_raw(cc: u8) -> u16 {
    if cc > 31 {
        return 0;
    }
    let t = table().lock().unwrap_or_else(|e| e.into_inner());
    ((t.cc_msb[cc as usize] as u16) << 7) | (t.cc_lsb[cc as usize] as u16)
}

/// Normalized `[0, 1]` value of a 14-bit CC pair.
pub fn cc14_norm(cc: u8) -> f32 {
    cc14_raw(cc) as f32 / 16383.0
}

/// Channel (1-based) of the most recently received CC, if any.
pub fn last_channel() -> Option<u8> {
    table().lock().unwrap_or_else(|e| e.into_inner()).last_channel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_bit_cc_normalizes() {
        reset();
        record_cc(1, 7, 127);
        assert!((cc_norm(7) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn fourteen_bit_cc_combines_msb_lsb() {
        reset();
        record_cc(1, 1, 0x7F);
        record_cc(1, 33, 0x7F);
        assert_eq!(cc14_raw(1), 0x3FFF);
    }

    #[test]
    fn last_channel_tracks_most_recent_message() {
        reset();
        record_cc(3, 10, 64);
        assert_eq!(last_channel(), Some(3));
    }
}
