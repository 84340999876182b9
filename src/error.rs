use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by spec loading, configuration and the CLI.
///
/// Completion itself never fails: unknown commands, unmatched tokens and
/// failing generators all degrade to "no suggestions".
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error with `{}`: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Error parsing JSON: {}", .0)]
    Json(#[from] serde_json::Error),

    #[error("Error parsing YAML: {}", .0)]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid spec at `{}`: {}", .path.display(), .reason)]
    InvalidSpec { path: PathBuf, reason: String },

    #[error("Invalid configuration: {}", .0)]
    Config(String),

    #[error("Unsupported shell: `{}`", .0)]
    UnsupportedShell(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_spec(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidSpec {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
