//! Line-oriented patch-text parser.
//!
//! Grammar, one module declaration per line:
//!
//! ```text
//! <type>[:alias] [key=value,...] [in=alias[,alias...]] [cv=alias:param[,alias:param...]]
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Parsing is a
//! single left-to-right scan per line (no lookahead across lines) — the
//! hand-rolled, byte-indexed scanning style follows the same shape as the
//! chain-DSL parser this workspace already carries, simplified down to
//! this flatter grammar (no split/merge sub-expressions).

use std::collections::HashMap;

use thiserror::Error;

/// One module declaration parsed from a single patch-text line.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Registered module type name (first token on the line).
    pub module_type: String,
    /// Alias used to refer to this instance from later lines.
    ///
    /// Defaults to `module_type` (disambiguated with a numeric suffix on
    /// collision) when no `:alias` is given.
    pub alias: String,
    /// `key=value` configuration pairs, passed to the registry factory
    /// verbatim and in declaration order.
    pub config: Vec<(String, String)>,
    /// Aliases feeding this module's audio input, in `in=` order.
    pub audio_inputs: Vec<String>,
    /// `(source_alias, target_param)` pairs feeding this module's CV
    /// inputs, in `cv=` order.
    pub cv_inputs: Vec<(String, String)>,
    /// 1-based source line number, for diagnostics.
    pub line_no: usize,
}

/// Failure parsing or validating patch text.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ParseError {
    /// A line could not be tokenized at all.
    #[error("line {line_no}: malformed declaration: {text:?}")]
    Malformed {
        /// 1-based line number.
        line_no: usize,
        /// Offending line text.
        text: String,
    },
    /// `in=`/`cv=` referenced an alias not yet declared on an earlier
    /// line — the patch graph has no forward references, only a
    /// declared execution order.
    #[error("line {line_no}: '{reference}' referenced before it is declared")]
    ForwardReference {
        /// 1-based line number of the referencing declaration.
        line_no: usize,
        /// The undeclared alias that was referenced.
        reference: String,
    },
    /// The patch text contained no module declarations.
    #[error("patch is empty: no module declarations found")]
    Empty,
}

/// Parses patch text into an ordered list of declarations.
///
/// Declaration order IS execution order (§4.4/§4.5): this function does
/// not reorder lines. It does reject `in=`/`cv=` references to aliases
/// that have not appeared on an earlier line, and disambiguates
/// colliding default aliases (`osc`, `osc2`, `osc3`, ...) the same way
/// repeated bare module names would collide without an explicit
/// `:alias`.
pub fn parse(text: &str) -> Result<Vec<Declaration>, ParseError> {
    let mut declarations = Vec::new();
    let mut seen_aliases: HashMap<String, usize> = HashMap::new();

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let decl = parse_line(line, line_no)?;

        for alias in decl.audio_inputs.iter().chain(decl.cv_inputs.iter().map(|(a, _)| a)) {
            if !seen_aliases.contains_key(alias) {
                return Err(ParseError::ForwardReference {
                    line_no,
                    reference: alias.clone(),
                });
            }
        }

        let alias = disambiguate(&decl.alias, &mut seen_aliases);
        let mut decl = decl;
        decl.alias = alias;
        declarations.push(decl);
    }

    if declarations.is_empty() {
        return Err(ParseError::Empty);
    }

    Ok(declarations)
}

/// Gives `base` a numeric suffix (`base2`, `base3`, ...) if it has
/// already been used, then records the (possibly suffixed) alias as
/// seen. Matches the original default-naming collision behavior: the
/// first unsuffixed use wins, subsequent collisions count up.
fn disambiguate(base: &str, seen: &mut HashMap<String, usize>) -> String {
    let count = seen.entry(base.to_string()).or_insert(0);
    *count += 1;
    let name = if *count == 1 {
        base.to_string()
    } else {
        format!("{base}{count}")
    };
    seen.insert(name.clone(), 1);
    name
}

fn parse_line(line: &str, line_no: usize) -> Result<Declaration, ParseError> {
    let malformed = || ParseError::Malformed {
        line_no,
        text: line.to_string(),
    };

    let mut tokens = line.split_whitespace();
    let head = tokens.next().ok_or_else(malformed)?;

    let (module_type, alias) = match head.split_once(':') {
        Some((ty, alias)) => {
            if ty.is_empty() || alias.is_empty() {
                return Err(malformed());
            }
            (ty.to_string(), alias.to_string())
        }
        None => (head.to_string(), head.to_string()),
    };

    let mut config = Vec::new();
    let mut audio_inputs = Vec::new();
    let mut cv_inputs = Vec::new();

    for token in tokens {
        let (key, value) = token.split_once('=').ok_or_else(malformed)?;
        match key {
            "in" => {
                for alias in value.split(',') {
                    if alias.is_empty() {
                        return Err(malformed());
                    }
                    audio_inputs.push(alias.to_string());
                }
            }
            "cv" => {
                for entry in value.split(',') {
                    let (src, param) = entry.split_once(':').ok_or_else(malformed)?;
                    if src.is_empty() || param.is_empty() {
                        return Err(malformed());
                    }
                    cv_inputs.push((src.to_string(), param.to_string()));
                }
            }
            _ => {
                if key.is_empty() || value.is_empty() {
                    return Err(malformed());
                }
                config.push((key.to_string(), value.to_string()));
            }
        }
    }

    Ok(Declaration {
        module_type,
        alias,
        config,
        audio_inputs,
        cv_inputs,
        line_no,
    })
}
