//! Error types spanning parse, registry and wiring failures.

use patchbay_registry::RegistryError;
use thiserror::Error;

use crate::parser::ParseError;

/// Failure building a runnable patch from text.
#[derive(Debug, Error)]
pub enum PatchError {
    /// Patch text failed to parse.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// A declared module type could not be instantiated.
    #[error("line {line_no}: {source}")]
    Registry {
        /// 1-based source line of the failing declaration.
        line_no: usize,
        /// Underlying registry failure.
        #[source]
        source: RegistryError,
    },
}
