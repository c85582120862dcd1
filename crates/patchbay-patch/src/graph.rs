//! Resolves parsed [`Declaration`](crate::parser::Declaration)s into a
//! runnable [`Graph`]: one registry-instantiated module per line, audio
//! and control edges resolved to buffer indices instead of alias
//! strings, and the declared order preserved verbatim as execution
//! order (§4.4's "implicit topological sort").
//!
//! Grounded on `original_source/module_loader.c`/`engine.c`'s `chain`
//! array: a flat, insertion-ordered list of modules plus each module's
//! own `inputs[]`/`control_inputs[]` pointer arrays, populated once at
//! patch-load time and never mutated afterward (§1's "no dynamic graph
//! edits after startup").

use patchbay_core::{Module, MAX_BLOCK_SIZE};
use patchbay_registry::ModuleRegistry;
use std::collections::HashMap;

use crate::error::PatchError;
use crate::parser::{self, Declaration};

/// One compiled module slot: just the alias and the live instance.
///
/// Wiring lives in a separate parallel [`Wiring`] array on [`Graph`]
/// rather than inside `Slot` itself — the scheduler needs to read one
/// slot's wiring (an immutable borrow of `Graph::wiring`) at the same
/// time as it mutably borrows *another* slot's `module` field
/// (`Graph::slots`). Keeping them as sibling `Graph` fields lets the
/// borrow checker see the two accesses as disjoint; folding wiring
/// into `Slot` would tie both borrows to the same `Vec<Slot>` element
/// and the compiler cannot split a single trait-indexed element into
/// independently-borrowable fields.
pub(crate) struct Slot {
    pub alias: String,
    pub module: Box<dyn Module>,
}

/// A module's resolved wiring: buffer indices instead of alias strings.
#[derive(Default)]
pub(crate) struct Wiring {
    /// Indices of modules whose audio output feeds this module's input
    /// (uniform-gain mixed by the scheduler, §4.5).
    pub audio_sources: Vec<usize>,
    /// `(source index, target parameter name)` pairs feeding this
    /// module's control inputs, read directly by the module (§4.5/§4.6).
    pub control_sources: Vec<(usize, String)>,
}

/// A fully wired patch graph, ready to be driven block-by-block by the
/// scheduler.
///
/// Owns every module's audio and control output buffers in parallel
/// arrays (rather than inside each `Slot`) so the scheduler can hold a
/// module mutably while reading an *earlier* module's output
/// immutably — `in=`/`cv=` can only reference earlier declarations
/// (§3's "no forward references"), so `buffers.split_at_mut(i)` always
/// gives the scheduler read access to every valid source before it
/// needs `&mut` access to slot `i`'s own buffers.
pub struct Graph {
    pub(crate) slots: Vec<Slot>,
    pub(crate) wiring: Vec<Wiring>,
    pub(crate) audio_out: Vec<Vec<f32>>,
    pub(crate) control_out: Vec<Vec<f32>>,
    /// Index of the last module whose `produces_audio()` is true — its
    /// output buffer becomes the driver's output (§4.5 step 3). `None`
    /// if no module in the patch produces audio.
    pub(crate) final_audio: Option<usize>,
}

impl Graph {
    /// Parses `text` and instantiates every declared module via
    /// `registry`, wiring `in=`/`cv=` edges to buffer indices.
    pub fn build(text: &str, registry: &ModuleRegistry, sample_rate: f32) -> Result<Self, PatchError> {
        let declarations = parser::parse(text)?;
        Self::from_declarations(&declarations, registry, sample_rate)
    }

    fn from_declarations(
        declarations: &[Declaration],
        registry: &ModuleRegistry,
        sample_rate: f32,
    ) -> Result<Self, PatchError> {
        let mut alias_index: HashMap<&str, usize> = HashMap::with_capacity(declarations.len());
        let mut slots = Vec::with_capacity(declarations.len());
        let mut wiring = Vec::with_capacity(declarations.len());
        let mut audio_out = Vec::with_capacity(declarations.len());
        let mut control_out = Vec::with_capacity(declarations.len());

        for decl in declarations {
            let module = registry
                .create(&decl.module_type, &decl.config, sample_rate)
                .map_err(|source| PatchError::Registry {
                    line_no: decl.line_no,
                    source,
                })?;

            let audio_sources: Vec<usize> = decl
                .audio_inputs
                .iter()
                .map(|alias| alias_index[alias.as_str()])
                .collect();

            let control_sources: Vec<(usize, String)> = decl
                .cv_inputs
                .iter()
                .map(|(alias, param)| {
                    let src = alias_index[alias.as_str()];
                    if !slots[src].module.produces_control() {
                        tracing::warn!(
                            alias = %alias,
                            param = %param,
                            "cv= source has no control output; modulation will read silence"
                        );
                    }
                    (src, param.clone())
                })
                .collect();

            let index = slots.len();
            slots.push(Slot {
                alias: decl.alias.clone(),
                module,
            });
            wiring.push(Wiring {
                audio_sources,
                control_sources,
            });
            audio_out.push(vec![0.0f32; MAX_BLOCK_SIZE]);
            control_out.push(vec![0.0f32; MAX_BLOCK_SIZE]);
            alias_index.insert(decl.alias.as_str(), index);
        }

        let final_audio = slots
            .iter()
            .enumerate()
            .rev()
            .find(|(_, slot)| slot.module.produces_audio())
            .map(|(i, _)| i);

        Ok(Self {
            slots,
            wiring,
            audio_out,
            control_out,
            final_audio,
        })
    }

    /// Number of modules in the graph.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the graph has no modules (never true for a graph built
    /// from [`Graph::build`] — `parser::parse` rejects empty patches).
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether any module in the patch produces audio output (§6: a
    /// patch with no audio-producing module is a fatal startup error).
    pub fn produces_audio(&self) -> bool {
        self.final_audio.is_some()
    }

    /// Alias of the module at `index`, if any.
    pub fn alias_at(&self, index: usize) -> Option<&str> {
        self.slots.get(index).map(|s| s.alias.as_str())
    }

    /// Index of `alias` in declared order, if present.
    pub fn index_of(&self, alias: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.alias == alias)
    }

    /// Mutable access to a module by alias, for the control plane
    /// (`set_param`, `handle_input`) and UI broadcast.
    pub fn module_mut(&mut self, alias: &str) -> Option<&mut (dyn Module + 'static)> {
        self.slots
            .iter_mut()
            .find(|s| s.alias == alias)
            .map(|s| s.module.as_mut())
    }

    /// Runs `f` over every module in declared order, for the UI
    /// keystroke broadcast (§4.6) and shutdown teardown (§5).
    pub fn for_each_module_mut(&mut self, mut f: impl FnMut(&str, &mut dyn Module)) {
        for slot in &mut self.slots {
            f(&slot.alias, slot.module.as_mut());
        }
    }

    /// Tears down every module in the reverse of instantiation order
    /// (§5: "modules' destroy in the reverse of instantiation order").
    pub fn destroy_all(&mut self) {
        for slot in self.slots.iter_mut().rev() {
            slot.module.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_core::{InputKey, ModuleIo};
    use patchbay_registry::{ConfigPair, ModuleDescriptor, RegistryError};

    struct ConstAudio(f32);
    impl Module for ConstAudio {
        fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
            for s in io.audio_out[..io.frames].iter_mut() {
                *s = self.0;
            }
        }
        fn produces_audio(&self) -> bool {
            true
        }
    }

    struct PassThroughAudio;
    impl Module for PassThroughAudio {
        fn process_audio(&mut self, io: &mut ModuleIo<'_>) {
            io.audio_out[..io.frames].copy_from_slice(&io.audio_in[..io.frames]);
        }
        fn produces_audio(&self) -> bool {
            true
        }
    }

    fn test_registry() -> ModuleRegistry {
        let mut r = ModuleRegistry::new();
        r.register(
            ModuleDescriptor {
                id: "const",
                name: "Const",
                description: "emits a constant value",
            },
            |config, _sr| {
                let v = config
                    .iter()
                    .find(|(k, _)| k == "v")
                    .map(|(_, v)| v.parse::<f32>().unwrap())
                    .unwrap_or(0.0);
                Ok(Box::new(ConstAudio(v)) as Box<dyn Module>)
            },
        );
        r.register(
            ModuleDescriptor {
                id: "pass",
                name: "Passthrough",
                description: "mirrors its audio input",
            },
            |_config, _sr| Ok(Box::new(PassThroughAudio) as Box<dyn Module>),
        );
        r.register(
            ModuleDescriptor {
                id: "fails",
                name: "Fails",
                description: "always errors",
            },
            |_config, _sr| {
                Err(RegistryError::InvalidConfigValue {
                    module_type: "fails".into(),
                    key: "x".into(),
                    value: "y".into(),
                })
            },
        );
        r
    }

    #[test]
    fn builds_chain_in_declared_order() {
        let registry = test_registry();
        let graph = Graph::build("const:a v=1\npass:b in=a\n", &registry, 48000.0).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.alias_at(0), Some("a"));
        assert_eq!(graph.wiring[1].audio_sources, vec![0]);
        assert_eq!(graph.final_audio, Some(1));
    }

    #[test]
    fn registry_failure_reports_line_number() {
        let registry = test_registry();
        let err = Graph::build("fails:f\n", &registry, 48000.0).unwrap_err();
        match err {
            PatchError::Registry { line_no, .. } => assert_eq!(line_no, 1),
            other => panic!("expected Registry error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_module_type_reports_fatal_error() {
        let registry = test_registry();
        let err = Graph::build("nope:n\n", &registry, 48000.0).unwrap_err();
        assert!(matches!(err, PatchError::Registry { .. }));
    }

    #[test]
    fn destroy_runs_in_reverse_declared_order() {
        use std::sync::{Arc, Mutex};

        struct Logged(Arc<Mutex<Vec<&'static str>>>, &'static str);
        impl Module for Logged {
            fn destroy(&mut self) {
                self.0.lock().unwrap().push(self.1);
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let a: Box<dyn Module> = Box::new(Logged(log.clone(), "a"));
        let b: Box<dyn Module> = Box::new(Logged(log.clone(), "b"));
        let mut graph = Graph {
            slots: vec![
                Slot { alias: "a".into(), module: a },
                Slot { alias: "b".into(), module: b },
            ],
            wiring: vec![Wiring::default(), Wiring::default()],
            audio_out: vec![vec![0.0; MAX_BLOCK_SIZE], vec![0.0; MAX_BLOCK_SIZE]],
            control_out: vec![vec![0.0; MAX_BLOCK_SIZE], vec![0.0; MAX_BLOCK_SIZE]],
            final_audio: None,
        };
        graph.destroy_all();
        assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn handle_input_is_ignored_outside_normal_mode_by_default() {
        let registry = test_registry();
        let mut graph = Graph::build("const:a v=1\n", &registry, 48000.0).unwrap();
        // Default Module::handle_input is a no-op; just exercise the broadcast path.
        graph.for_each_module_mut(|_alias, m| m.handle_input(InputKey::Char('x')));
    }
}
