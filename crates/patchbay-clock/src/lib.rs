//! Process-wide shared-clock registry (§4.7).
//!
//! Grounded on `original_source/modules/c_clock_s/c_clock_s.c`'s
//! `g_clocks`/`g_clocks_lock` pair: a fixed-capacity array of registered
//! clocks guarded by one mutex, with `propagate_bpm_and_reset`/
//! `propagate_run_and_reset` walking it to push a primary's state to every
//! secondary. The C original lazily has no init step (static array); here
//! the registry is lazily built on first registration via `OnceLock`,
//! which is the idiomatic Rust rendition of the same "avoid
//! initialization-order pitfalls" goal called out in the distilled
//! spec's design notes.
//!
//! A clock module registers an `Arc<dyn ClockTarget>` (its own
//! thread-safe handle) and gets back a [`ClockId`] to deregister with on
//! `destroy`. Propagation takes the registry lock first, then each
//! target's own lock, in that order — matching the C code's nesting and
//! the ordering guarantee in §5 ("the registry lock, then each clock's
//! lock").

use std::sync::{Mutex, OnceLock};

/// Registry capacity — the spec requires `>= 64`; matches `MAX_CLOCKS` in
/// the C original exactly.
pub const MAX_CLOCKS: usize = 64;

/// Applied by the registry to every registered clock when a primary's
/// BPM or run state changes.
///
/// Implemented by each clock module on its own shared, lockable state;
/// `apply_bpm`/`apply_run` take `&self` because the registry only ever
/// holds a shared handle — the module's own lock provides the exclusion.
pub trait ClockTarget: Send + Sync {
    /// Adopt a new BPM and reset phase to zero / clear the last gate.
    fn apply_bpm(&self, bpm: f32);
    /// Adopt a new run/stop state and reset phase to zero / clear the
    /// last gate, identically to `apply_bpm`.
    fn apply_run(&self, running: bool);
}

/// Opaque registration token, returned by [`register`] and consumed by
/// [`unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockId(usize);

struct Registry {
    clocks: Vec<(ClockId, std::sync::Arc<dyn ClockTarget>)>,
    next_id: usize,
}

static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

fn registry() -> &'static Mutex<Registry> {
    REGISTRY.get_or_init(|| {
        Mutex::new(Registry {
            clocks: Vec::with_capacity(MAX_CLOCKS),
            next_id: 0,
        })
    })
}

/// Registers a clock in the shared registry.
///
/// Returns `None` and logs a diagnostic when the registry is already at
/// [`MAX_CLOCKS`] capacity (§4.7's failure mode: "silently rejects
/// further clocks"). The caller (the clock module's constructor) treats
/// a `None` result as "this instance never receives propagated state" —
/// it keeps working as an unsynchronized clock.
pub fn register(target: std::sync::Arc<dyn ClockTarget>) -> Option<ClockId> {
    let mut reg = registry().lock().unwrap();
    if reg.clocks.len() >= MAX_CLOCKS {
        tracing::warn!(capacity = MAX_CLOCKS, "clock registry full, rejecting new clock");
        return None;
    }
    let id = ClockId(reg.next_id);
    reg.next_id += 1;
    reg.clocks.push((id, target));
    Some(id)
}

/// Removes a previously registered clock. A no-op if `id` is `None` or
/// already removed.
pub fn unregister(id: Option<ClockId>) {
    let Some(id) = id else { return };
    let mut reg = registry().lock().unwrap();
    reg.clocks.retain(|(existing, _)| *existing != id);
}

/// Propagates a new primary BPM to every registered clock (including the
/// primary itself, which is harmless — it is setting its own value).
///
/// Takes the registry lock for the duration of the walk, then each
/// target's own lock one at a time inside `apply_bpm` — never both at
/// once from the caller's perspective, matching §5's ordering guarantee.
pub fn propagate_bpm(new_bpm: f32) {
    let reg = registry().lock().unwrap();
    for (_, clock) in &reg.clocks {
        clock.apply_bpm(new_bpm);
    }
}

/// Propagates a new primary run/stop state to every registered clock.
pub fn propagate_run(running: bool) {
    let reg = registry().lock().unwrap();
    for (_, clock) in &reg.clocks {
        clock.apply_run(running);
    }
}

/// Number of currently registered clocks — exposed for diagnostics/tests.
pub fn registered_count() -> usize {
    registry().lock().unwrap().clocks.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Arc;

    struct Probe {
        bpm: AtomicU32,
        running: AtomicBool,
    }

    impl ClockTarget for Probe {
        fn apply_bpm(&self, bpm: f32) {
            self.bpm.store(bpm.to_bits(), Ordering::SeqCst);
        }
        fn apply_run(&self, running: bool) {
            self.running.store(running, Ordering::SeqCst);
        }
    }

    // Tests share one process-wide registry; serialize via a lock so
    // counts from one test don't leak into another's assertions.
    static TEST_GUARD: Mutex<()> = Mutex::new(());

    #[test]
    fn propagates_bpm_to_all_registered() {
        let _guard = TEST_GUARD.lock().unwrap();
        let before = registered_count();

        let a = Arc::new(Probe {
            bpm: AtomicU32::new(0),
            running: AtomicBool::new(false),
        });
        let b = Arc::new(Probe {
            bpm: AtomicU32::new(0),
            running: AtomicBool::new(false),
        });
        let id_a = register(a.clone() as Arc<dyn ClockTarget>).unwrap();
        let id_b = register(b.clone() as Arc<dyn ClockTarget>).unwrap();
        assert_eq!(registered_count(), before + 2);

        propagate_bpm(180.0);
        assert_eq!(f32::from_bits(a.bpm.load(Ordering::SeqCst)), 180.0);
        assert_eq!(f32::from_bits(b.bpm.load(Ordering::SeqCst)), 180.0);

        propagate_run(false);
        assert!(!a.running.load(Ordering::SeqCst));
        assert!(!b.running.load(Ordering::SeqCst));

        unregister(Some(id_a));
        unregister(Some(id_b));
        assert_eq!(registered_count(), before);
    }

    #[test]
    fn unregister_missing_is_a_no_op() {
        let _guard = TEST_GUARD.lock().unwrap();
        let before = registered_count();
        unregister(Some(ClockId(usize::MAX)));
        assert_eq!(registered_count(), before);
        unregister(None);
        assert_eq!(registered_count(), before);
    }
}
