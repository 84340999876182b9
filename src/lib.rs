//! shellsense - spec-driven command line completion
//!
//! Given the text of a partially typed command line, produce ranked
//! suggestions for the next token from declarative command specs.
//!
//! Modules:
//! - tokenizer: Split a command line into tokens with completion state
//! - shell: Shell dialects (bash, zsh, fish, powershell, ...)
//! - exec: Subprocess execution with timeouts
//! - alias: Shell alias table and expansion
//! - spec: Spec tree model, registries and the built-in catalogue
//! - suggestion: Suggestion types, filtering and ranking
//! - generator: Dynamic suggestion producers
//! - template: Filesystem and history suggestion sets
//! - engine: Recursive walk over the spec tree
//! - manager: Latest-wins recomputation for interactive callers
//! - config: Config file and environment overrides
//! - logging: JSON-lines log backend

pub mod alias;
pub mod config;
pub mod engine;
pub mod error;
pub mod exec;
pub mod generator;
pub mod logging;
pub mod manager;
pub mod shell;
pub mod spec;
pub mod suggestion;
pub mod template;
pub mod tokenizer;

pub use alias::AliasTable;
pub use config::Config;
pub use engine::CompletionEngine;
pub use error::{Error, Result};
pub use manager::{SuggestionManager, SuggestionUpdate};
pub use shell::ShellType;
pub use suggestion::{Suggestion, SuggestionBlob, SuggestionKind};
pub use tokenizer::{parse_command, CommandToken};
