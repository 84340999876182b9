//! Configuration
//!
//! Layered, later layers win:
//! 1. `~/.shellsense/config.json`
//! 2. environment (`SHELLSENSE_SPECS_PATH`, `SHELLSENSE_SHELL`, `SHELLSENSE_LOG`)
//! 3. command line flags (applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::exec::DEFAULT_TIMEOUT_MS;
use crate::logging::LogLevel;
use crate::shell::ShellType;

pub const CONFIG_DIR: &str = ".shellsense";
pub const CONFIG_FILE: &str = "config.json";

pub const ENV_SPECS_PATH: &str = "SHELLSENSE_SPECS_PATH";
pub const ENV_SHELL: &str = "SHELLSENSE_SHELL";
pub const ENV_LOG: &str = "SHELLSENSE_LOG";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Config {
    /// Directories holding `<command>.json|yaml` specs, searched in order
    pub specs_paths: Vec<PathBuf>,
    /// Shell dialect; inferred from the environment when unset
    pub shell: Option<ShellType>,
    pub script_timeout_ms: u64,
    pub alias_timeout_ms: u64,
    pub log_file: Option<PathBuf>,
    /// Logging is off when unset
    pub log_level: Option<LogLevel>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            specs_paths: vec![],
            shell: None,
            script_timeout_ms: DEFAULT_TIMEOUT_MS,
            alias_timeout_ms: DEFAULT_TIMEOUT_MS,
            log_file: None,
            log_level: None,
        }
    }
}

impl Config {
    /// Default config file location
    pub fn path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Config file (if any) overlaid with the process environment
    pub fn load() -> Result<Self> {
        let config = match Self::path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.with_env(|key| std::env::var(key).ok())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Overlay environment variables read through `lookup`
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(paths) = lookup(ENV_SPECS_PATH).filter(|p| !p.is_empty()) {
            self.specs_paths = std::env::split_paths(&paths).collect();
        }
        if let Some(shell) = lookup(ENV_SHELL).filter(|s| !s.is_empty()) {
            self.shell = Some(shell.parse()?);
        }
        if let Some(level) = lookup(ENV_LOG).filter(|l| !l.is_empty()) {
            self.log_level = Some(level.parse()?);
        }
        Ok(self)
    }

    pub fn resolved_shell(&self) -> ShellType {
        self.shell.or_else(ShellType::infer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.specs_paths.is_empty());
        assert_eq!(config.script_timeout_ms, 5_000);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"specsPaths": ["/opt/specs"], "shell": "zsh", "scriptTimeoutMs": 250}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.specs_paths, vec![PathBuf::from("/opt/specs")]);
        assert_eq!(config.shell, Some(ShellType::Zsh));
        assert_eq!(config.script_timeout_ms, 250);
        assert_eq!(config.alias_timeout_ms, 5_000);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"specPath": "/typo"}"#).unwrap();
        assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let config = Config {
            shell: Some(ShellType::Bash),
            ..Default::default()
        }
        .with_env(env(&[
            (ENV_SPECS_PATH, "/a:/b"),
            (ENV_SHELL, "zsh"),
            (ENV_LOG, "debug"),
        ]))
        .unwrap();
        assert_eq!(config.specs_paths, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(config.shell, Some(ShellType::Zsh));
        assert_eq!(config.log_level, Some(LogLevel::Debug));
    }

    #[test]
    fn test_invalid_env_shell() {
        let result = Config::default().with_env(env(&[(ENV_SHELL, "tcsh")]));
        assert!(matches!(result, Err(Error::UnsupportedShell(_))));
    }
}
