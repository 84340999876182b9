//! Shell dialects understood by the tokenizer and alias loader
//!
//! The dialect decides how whitespace is escaped, which path separator
//! marks a token as a path, and how (if at all) aliases can be listed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Supported shell types
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ShellType {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Pwsh,
    Cmd,
    Xonsh,
    #[serde(rename = "nu")]
    Nushell,
}

/// Shells whose aliases can be listed with `<shell> -i -c alias`
pub const ALIAS_SUPPORTED_SHELLS: [ShellType; 2] = [ShellType::Bash, ShellType::Zsh];

impl ShellType {
    pub const ALL: [ShellType; 8] = [
        ShellType::Bash,
        ShellType::Zsh,
        ShellType::Fish,
        ShellType::PowerShell,
        ShellType::Pwsh,
        ShellType::Cmd,
        ShellType::Xonsh,
        ShellType::Nushell,
    ];

    /// Detect shell type from shell path or name
    pub fn detect(shell: &str) -> Option<Self> {
        let name = std::path::Path::new(shell)
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.contains("bash") {
            Some(ShellType::Bash)
        } else if name.contains("zsh") {
            Some(ShellType::Zsh)
        } else if name.contains("fish") {
            Some(ShellType::Fish)
        } else if name.contains("pwsh") {
            Some(ShellType::Pwsh)
        } else if name.contains("powershell") {
            Some(ShellType::PowerShell)
        } else if name.contains("xonsh") {
            Some(ShellType::Xonsh)
        } else if name == "nu" || name.contains("nushell") {
            Some(ShellType::Nushell)
        } else if name == "cmd" {
            Some(ShellType::Cmd)
        } else {
            None
        }
    }

    /// Infer the running shell from shell specific variables, then `$SHELL`
    pub fn infer() -> Option<Self> {
        let set = |key: &str| std::env::var_os(key).is_some();
        if set("NU_VERSION") {
            Some(ShellType::Nushell)
        } else if set("XONSHRC") {
            Some(ShellType::Xonsh)
        } else if set("FISH_VERSION") {
            Some(ShellType::Fish)
        } else if set("ZSH_VERSION") {
            Some(ShellType::Zsh)
        } else if set("BASH_VERSION") {
            Some(ShellType::Bash)
        } else {
            std::env::var("SHELL").ok().and_then(|s| Self::detect(&s))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShellType::Bash => "bash",
            ShellType::Zsh => "zsh",
            ShellType::Fish => "fish",
            ShellType::PowerShell => "powershell",
            ShellType::Pwsh => "pwsh",
            ShellType::Cmd => "cmd",
            ShellType::Xonsh => "xonsh",
            ShellType::Nushell => "nu",
        }
    }

    /// Character used to escape a literal space outside of quotes
    pub fn whitespace_escape_char(&self) -> char {
        match self {
            ShellType::Bash
            | ShellType::Zsh
            | ShellType::Fish
            | ShellType::Xonsh
            | ShellType::Nushell => '\\',
            ShellType::PowerShell | ShellType::Pwsh => '`',
            ShellType::Cmd => '^',
        }
    }

    /// Separator that marks a token as a filesystem path
    pub fn path_separator(&self) -> char {
        match self {
            ShellType::Bash
            | ShellType::Zsh
            | ShellType::Fish
            | ShellType::Xonsh
            | ShellType::Nushell => '/',
            ShellType::PowerShell | ShellType::Pwsh | ShellType::Cmd => {
                std::path::MAIN_SEPARATOR
            }
        }
    }

    /// Interactive command listing the user's aliases, if the dialect has one
    pub fn alias_command(&self) -> Option<(String, Vec<String>)> {
        match self {
            ShellType::Bash | ShellType::Zsh => Some((
                self.as_str().to_string(),
                vec!["-i".to_string(), "-c".to_string(), "alias".to_string()],
            )),
            _ => None,
        }
    }

    /// Location of the shell's history file
    pub fn history_file(&self) -> Option<std::path::PathBuf> {
        if let Some(path) = std::env::var_os("HISTFILE") {
            return Some(path.into());
        }
        let home = dirs::home_dir()?;
        match self {
            ShellType::Bash => Some(home.join(".bash_history")),
            ShellType::Zsh => Some(home.join(".zsh_history")),
            ShellType::Fish => Some(home.join(".local/share/fish/fish_history")),
            _ => None,
        }
    }
}

impl Default for ShellType {
    fn default() -> Self {
        if cfg!(windows) {
            ShellType::Cmd
        } else {
            ShellType::Bash
        }
    }
}

impl fmt::Display for ShellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShellType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShellType::ALL
            .into_iter()
            .find(|shell| shell.as_str() == s.to_lowercase())
            .ok_or_else(|| Error::UnsupportedShell(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_detection() {
        assert_eq!(ShellType::detect("/bin/bash"), Some(ShellType::Bash));
        assert_eq!(ShellType::detect("/usr/bin/zsh"), Some(ShellType::Zsh));
        assert_eq!(ShellType::detect("/usr/bin/fish"), Some(ShellType::Fish));
        assert_eq!(ShellType::detect("pwsh"), Some(ShellType::Pwsh));
        assert_eq!(ShellType::detect("/usr/local/bin/nu"), Some(ShellType::Nushell));
        assert_eq!(ShellType::detect("/bin/sh"), None);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("zsh".parse::<ShellType>().unwrap(), ShellType::Zsh);
        assert_eq!("NU".parse::<ShellType>().unwrap(), ShellType::Nushell);
        assert!("tcsh".parse::<ShellType>().is_err());
    }

    #[test]
    fn test_escape_chars() {
        assert_eq!(ShellType::Bash.whitespace_escape_char(), '\\');
        assert_eq!(ShellType::Pwsh.whitespace_escape_char(), '`');
        assert_eq!(ShellType::Cmd.whitespace_escape_char(), '^');
    }

    #[test]
    fn test_alias_command_only_for_posix_shells() {
        let (program, args) = ShellType::Zsh.alias_command().unwrap();
        assert_eq!(program, "zsh");
        assert_eq!(args, vec!["-i", "-c", "alias"]);
        assert!(ShellType::Fish.alias_command().is_none());
    }
}
