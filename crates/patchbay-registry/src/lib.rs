//! Static, link-time registry of module types.
//!
//! Mirrors the factory-table pattern this workspace already uses for its
//! effect registry (`EffectDescriptor` + `fn(f32) -> Box<dyn Trait>`
//! entries, looked up by name) but keyed by module type name, taking the
//! patch line's raw `key=value` configuration pairs instead of only a
//! sample rate, and producing `Box<dyn Module>` instead of
//! `Box<dyn EffectWithParams>`. There is no dynamic loading (`dlopen`) —
//! every type a patch can reference must be compiled into this table.
//!
//! # Example
//!
//! ```rust
//! use patchbay_registry::{ModuleDescriptor, ModuleRegistry};
//!
//! fn make_silence(_config: &[(String, String)], _sr: f32)
//!     -> Result<Box<dyn patchbay_core::Module>, patchbay_registry::RegistryError>
//! {
//!     struct Silence;
//!     impl patchbay_core::Module for Silence {}
//!     Ok(Box::new(Silence))
//! }
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register(
//!     ModuleDescriptor { id: "silence", name: "Silence", description: "produces nothing" },
//!     make_silence,
//! );
//! assert!(registry.get("silence").is_some());
//! assert!(registry.get("no-such-type").is_none());
//! ```
//!
//! The builtin module set lives in a separate crate (which depends on
//! this one) to avoid a cycle; it exposes a `register_builtins` function
//! with this same shape that populates a registry in one call.

use std::collections::HashMap;

use patchbay_core::Module;
use thiserror::Error;

/// A single `key=value` configuration pair as parsed from patch text.
pub type ConfigPair = (String, String);

/// Constructs a module instance from its patch-line configuration and
/// the engine's sample rate.
pub type ModuleFactory = fn(&[ConfigPair], f32) -> Result<Box<dyn Module>, RegistryError>;

/// Failure instantiating a module from the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No registered factory matches the requested type name.
    #[error("unknown module type {0:?}")]
    UnknownType(String),
    /// A `key=value` pair's value failed to parse as the type the
    /// factory expected (almost always a float).
    #[error("module {module_type:?}: invalid value for {key:?}: {value:?}")]
    InvalidConfigValue {
        /// Module type being constructed.
        module_type: String,
        /// Offending configuration key.
        key: String,
        /// Offending configuration value.
        value: String,
    },
}

/// Metadata describing a registered module type, for UI listings and
/// diagnostics — analogous to `EffectDescriptor` in the effect registry.
#[derive(Debug, Clone, Copy)]
pub struct ModuleDescriptor {
    /// Type name as used in patch text (e.g. `"osc"`).
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// One-line description for listings.
    pub description: &'static str,
}

struct RegistryEntry {
    descriptor: ModuleDescriptor,
    factory: ModuleFactory,
}

/// Looks up module factories by type name.
///
/// Construct with [`ModuleRegistry::new`] then call
/// `patchbay_modules::register_builtins` to get every module type this
/// workspace ships, or register a custom subset directly via
/// [`ModuleRegistry::register`] (used by tests that only want a couple
/// of trivial stand-ins).
pub struct ModuleRegistry {
    entries: HashMap<&'static str, RegistryEntry>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Registers a module type under `descriptor.id`.
    ///
    /// Re-registering the same id overwrites the previous entry — used
    /// by tests that swap in stub factories.
    pub fn register(&mut self, descriptor: ModuleDescriptor, factory: ModuleFactory) {
        self.entries.insert(
            descriptor.id,
            RegistryEntry { descriptor, factory },
        );
    }

    /// Returns the descriptor for a registered type, if any.
    pub fn get(&self, id: &str) -> Option<&ModuleDescriptor> {
        self.entries.get(id).map(|e| &e.descriptor)
    }

    /// Lists every registered module type's descriptor.
    pub fn all(&self) -> Vec<&ModuleDescriptor> {
        self.entries.values().map(|e| &e.descriptor).collect()
    }

    /// Instantiates a module by type name.
    pub fn create(
        &self,
        id: &str,
        config: &[ConfigPair],
        sample_rate: f32,
    ) -> Result<Box<dyn Module>, RegistryError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| RegistryError::UnknownType(id.to_string()))?;
        (entry.factory)(config, sample_rate)
    }

    /// Number of registered module types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry has no registered types.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a `key=value` config list for a float-valued key, returning
/// `default` when the key is absent and an error when it is present but
/// unparsable.
///
/// Shared by every builtin factory so a malformed patch line (`freq=abc`)
/// fails the same way regardless of which module type it targets.
pub fn config_f32(
    module_type: &str,
    config: &[ConfigPair],
    key: &str,
    default: f32,
) -> Result<f32, RegistryError> {
    match config.iter().find(|(k, _)| k == key) {
        Some((_, v)) => v.parse::<f32>().map_err(|_| RegistryError::InvalidConfigValue {
            module_type: module_type.to_string(),
            key: key.to_string(),
            value: v.clone(),
        }),
        None => Ok(default),
    }
}

/// Reads a `key=value` config list for a string-valued key.
pub fn config_str<'a>(config: &'a [ConfigPair], key: &str, default: &'a str) -> &'a str {
    config
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchbay_core::ModuleIo;

    struct Silence;
    impl Module for Silence {}

    fn make_silence(_config: &[ConfigPair], _sr: f32) -> Result<Box<dyn Module>, RegistryError> {
        Ok(Box::new(Silence))
    }

    #[test]
    fn registers_and_creates() {
        let mut registry = ModuleRegistry::new();
        registry.register(
            ModuleDescriptor {
                id: "silence",
                name: "Silence",
                description: "produces nothing, for tests",
            },
            make_silence,
        );
        assert!(registry.get("silence").is_some());
        let module = registry.create("silence", &[], 48000.0).unwrap();
        assert!(!module.produces_audio());
    }

    #[test]
    fn unknown_type_errors() {
        let registry = ModuleRegistry::new();
        let err = registry.create("nope", &[], 48000.0).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownType(_)));
    }

    #[test]
    fn config_f32_falls_back_to_default() {
        let config = vec![("freq".to_string(), "440".to_string())];
        assert_eq!(config_f32("osc", &config, "freq", 0.0).unwrap(), 440.0);
        assert_eq!(config_f32("osc", &config, "missing", 1.0).unwrap(), 1.0);
        let bad = vec![("freq".to_string(), "abc".to_string())];
        assert!(config_f32("osc", &bad, "freq", 0.0).is_err());
    }

    #[test]
    fn io_smoke() {
        let mut audio_out = [0.0f32; 4];
        let mut control_out = [0.0f32; 4];
        let io = ModuleIo {
            audio_in: &[0.0; 4],
            audio_out: &mut audio_out,
            control_in: &[],
            control_out: &mut control_out,
            frames: 4,
        };
        assert_eq!(io.frames, 4);
    }
}
