//! The block-rate scheduler (§4.5): the per-callback driver that walks
//! a [`Graph`] in declared order, mixes fan-in audio connections with
//! the uniform-gain rule, invokes each module's audio/control work
//! functions, and hands the final module's output to the driver.
//!
//! Grounded on `original_source/engine.c`'s `process_chain`: clear the
//! output buffer, mix connected inputs (or pass the driver's raw input
//! through to the first unconnected module), scale by `1/num_inputs`,
//! call `process`, then copy the last module's buffer out. The control
//! (CV) side is unmixed here exactly as §4.5 specifies — each module
//! reads its own `control_in` pairs directly inside its inner loop.
//!
//! No allocation happens per block: every scratch buffer the scheduler
//! touches (`mix_scratch`, the per-module `control_in` array) is either
//! a fixed-size stack array or a [`Graph`]-owned `Vec` sized once at
//! construction to [`MAX_BLOCK_SIZE`]/[`MAX_INPUTS`].

use patchbay_core::{ModuleIo, MAX_BLOCK_SIZE, MAX_INPUTS};

use crate::graph::Graph;

/// Drives a [`Graph`] through one audio callback.
///
/// `driver_in` may be empty (silence) when the engine has no audio
/// input device; `driver_out` receives the final module's output, or
/// silence if no module in the patch produces audio (§4.5 step 3).
///
/// # Panics
///
/// Panics if `frames` exceeds [`MAX_BLOCK_SIZE`] — the driver is
/// responsible for never requesting a larger block than the compile-
/// time bound (§3's invariant).
pub fn process_block(graph: &mut Graph, driver_in: &[f32], driver_out: &mut [f32], frames: usize) {
    assert!(
        frames <= MAX_BLOCK_SIZE,
        "block of {frames} frames exceeds MAX_BLOCK_SIZE ({MAX_BLOCK_SIZE})"
    );

    let mut mix_scratch = [0.0f32; MAX_BLOCK_SIZE];

    for i in 0..graph.slots.len() {
        // `audio_out`/`control_out` are split before use: `in=`/`cv=`
        // can only reference earlier declarations (no forward
        // references, §3), so every source index this module's wiring
        // names falls in `earlier_*`, leaving `rest_*[0]` — slot `i`'s
        // own buffer — as the only thing mutably borrowed going into
        // `ModuleIo`. `wiring` lives as a sibling `Graph` field rather
        // than inside `Slot` (see `Wiring`'s doc comment) so reading it
        // here doesn't conflict with the `&mut graph.slots[i].module`
        // call at the end of the loop body.
        let (earlier_audio, rest_audio) = graph.audio_out.split_at_mut(i);
        let (earlier_control, rest_control) = graph.control_out.split_at_mut(i);

        let sources = &graph.wiring[i].audio_sources;
        if !sources.is_empty() {
            mix_scratch[..frames].fill(0.0);
            for &src in sources {
                for k in 0..frames {
                    mix_scratch[k] += earlier_audio[src][k];
                }
            }
            let scale = 1.0 / sources.len() as f32;
            for k in 0..frames {
                mix_scratch[k] *= scale;
            }
        } else if i == 0 && !driver_in.is_empty() {
            let n = frames.min(driver_in.len());
            mix_scratch[..n].copy_from_slice(&driver_in[..n]);
            mix_scratch[n..frames].fill(0.0);
        } else {
            mix_scratch[..frames].fill(0.0);
        }

        // Stack array of (buffer, param) pairs — no heap allocation even
        // though the module sees a slice (§5's allocation discipline).
        let mut control_in_buf: [(&[f32], &str); MAX_INPUTS] = [(&[], ""); MAX_INPUTS];
        let control_sources = &graph.wiring[i].control_sources;
        let cv_count = control_sources.len().min(MAX_INPUTS);
        for (slot, (src, param)) in control_in_buf.iter_mut().zip(control_sources.iter()).take(cv_count) {
            *slot = (&earlier_control[*src][..frames], param.as_str());
        }

        let mut io = ModuleIo {
            audio_in: &mix_scratch[..frames],
            audio_out: &mut rest_audio[0][..frames],
            control_in: &control_in_buf[..cv_count],
            control_out: &mut rest_control[0][..frames],
            frames,
        };

        graph.slots[i].module.process_audio(&mut io);
        graph.slots[i].module.process_control(&mut io);
    }

    match graph.final_audio {
        Some(idx) => {
            let n = frames.min(driver_out.len());
            driver_out[..n].copy_from_slice(&graph.audio_out[idx][..n]);
            driver_out[n..].fill(0.0);
        }
        None => driver_out.fill(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_core::Module;
    use patchbay_registry::{ModuleDescriptor, ModuleRegistry};

    struct ConstAudio(f32);
    impl Module for ConstAudio {
        fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
            io.audio_out[..io.frames].fill(self.0);
        }
        fn produces_audio(&self) -> bool {
            true
        }
    }

    struct SumInputs;
    impl Module for SumInputs {
        fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
            io.audio_out[..io.frames].copy_from_slice(&io.audio_in[..io.frames]);
        }
        fn produces_audio(&self) -> bool {
            true
        }
    }

    fn registry_with_const_and_sum() -> ModuleRegistry {
        let mut r = ModuleRegistry::new();
        r.register(
            ModuleDescriptor { id: "const", name: "Const", description: "" },
            |config, _sr| {
                let v = config
                    .iter()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.parse().unwrap())
                    .unwrap_or(0.0);
                Ok(Box::new(ConstAudio(v)) as Box<dyn patchbay_core::Module>)
            },
        );
        r.register(
            ModuleDescriptor { id: "sum", name: "Sum", description: "" },
            |_c, _sr| Ok(Box::new(SumInputs) as Box<dyn patchbay_core::Module>),
        );
        r
    }

    #[test]
    fn fan_in_normalizes_regardless_of_source_count() {
        for n in [1usize, 2, 4, 8] {
            let registry = registry_with_const_and_sum();
            let mut text = String::new();
            for i in 0..n {
                text.push_str(&format!("const:c{i} v=1.0\n"));
            }
            text.push_str("sum:s in=");
            text.push_str(&(0..n).map(|i| format!("c{i}")).collect::<Vec<_>>().join(","));
            text.push('\n');

            let mut graph = Graph::build(&text, &registry, 48000.0).unwrap();
            let mut out = vec![0.0f32; 8];
            process_block(&mut graph, &[], &mut out, 8);
            for &sample in &out {
                assert!((sample - 1.0).abs() < 1e-5, "n={n} sample={sample}");
            }
        }
    }

    #[test]
    fn modules_process_in_declared_order() {
        static LOG: std::sync::OnceLock<std::sync::Mutex<Vec<&'static str>>> = std::sync::OnceLock::new();
        fn log() -> &'static std::sync::Mutex<Vec<&'static str>> {
            LOG.get_or_init(|| std::sync::Mutex::new(Vec::new()))
        }

        let mut registry = ModuleRegistry::new();
        registry.register(
            ModuleDescriptor { id: "olog", name: "OrderLog", description: "" },
            |config, _sr| {
                let tag: &'static str = match config.iter().find(|(k, _)| k == "tag").map(|(_, v)| v.as_str()) {
                    Some("a") => "a",
                    Some("b") => "b",
                    _ => "c",
                };
                Ok(Box::new(OrderLog(log(), tag)) as Box<dyn patchbay_core::Module>)
            },
        );

        struct OrderLog(&'static std::sync::Mutex<Vec<&'static str>>, &'static str);
        impl Module for OrderLog {
            fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
                self.0.lock().unwrap().push(self.1);
                io.audio_out[..io.frames].fill(0.0);
            }
            fn produces_audio(&self) -> bool {
                true
            }
        }

        log().lock().unwrap().clear();
        let mut graph = Graph::build("olog:x tag=a\nolog:y tag=b\nolog:z tag=c\n", &registry, 48000.0).unwrap();
        let mut out = vec![0.0f32; 4];
        process_block(&mut graph, &[], &mut out, 4);
        assert_eq!(*log().lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn silence_when_no_module_produces_audio() {
        let mut registry = ModuleRegistry::new();
        registry.register(
            ModuleDescriptor { id: "mute", name: "Mute", description: "" },
            |_c, _sr| Ok(Box::new(Mute) as Box<dyn patchbay_core::Module>),
        );
        struct Mute;
        impl Module for Mute {}

        let mut graph = Graph::build("mute:m\n", &registry, 48000.0).unwrap();
        let mut out = vec![1.0f32; 4];
        process_block(&mut graph, &[], &mut out, 4);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
