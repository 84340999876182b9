//! Filesystem and history backed suggestion templates

use std::collections::HashSet;
use std::path::Path;

use crate::shell::ShellType;
use crate::spec::{SuggestionSpec, Template};
use crate::suggestion::{SuggestionKind, TEMPLATE_PRIORITY};

/// Most history entries offered by the `history` template
const HISTORY_LIMIT: usize = 500;

/// Expand every template into raw suggestions, in order
pub async fn run_templates(templates: &[Template], cwd: &Path, shell: ShellType) -> Vec<SuggestionSpec> {
    let mut suggestions = vec![];
    for template in templates {
        match template {
            Template::Filepaths => suggestions.extend(list_dir(cwd, shell, false).await),
            Template::Folders => suggestions.extend(list_dir(cwd, shell, true).await),
            Template::History => suggestions.extend(history(shell).await),
            Template::Help => {}
        }
    }
    suggestions
}

async fn list_dir(dir: &Path, shell: ShellType, folders_only: bool) -> Vec<SuggestionSpec> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            log::debug!("cannot list {}: {}", dir.display(), e);
            return vec![];
        }
    };

    let mut found = vec![];
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().to_string();
        // Follows symlinks so linked folders complete as folders
        let is_dir = tokio::fs::metadata(entry.path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if folders_only && !is_dir {
            continue;
        }
        found.push((name, is_dir));
    }
    found.sort();

    found
        .into_iter()
        .map(|(name, is_dir)| {
            let spec = if is_dir {
                SuggestionSpec::new(format!("{}{}", name, shell.path_separator()))
                    .kind(SuggestionKind::Folder)
            } else {
                SuggestionSpec::new(name).kind(SuggestionKind::File)
            };
            spec.priority(TEMPLATE_PRIORITY)
        })
        .collect()
}

async fn history(shell: ShellType) -> Vec<SuggestionSpec> {
    let Some(path) = shell.history_file() else {
        return vec![];
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => parse_history(&String::from_utf8_lossy(&bytes))
            .into_iter()
            .map(|cmd| SuggestionSpec::new(cmd).priority(TEMPLATE_PRIORITY))
            .collect(),
        Err(e) => {
            log::debug!("cannot read history {}: {}", path.display(), e);
            vec![]
        }
    }
}

/// Distinct commands, newest first.
///
/// Understands plain (bash), extended zsh (`: <ts>:<d>;cmd`) and fish
/// (`- cmd: ...`) history lines.
pub fn parse_history(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .rev()
        .filter_map(|line| {
            let line = line.trim_end();
            if let Some(rest) = line.strip_prefix(": ") {
                rest.split_once(';').map(|(_, cmd)| cmd)
            } else if let Some(cmd) = line.strip_prefix("- cmd: ") {
                Some(cmd)
            } else if line.starts_with("  when:") || line.starts_with('#') {
                None
            } else {
                Some(line)
            }
        })
        .map(str::trim)
        .filter(|cmd| !cmd.is_empty())
        .filter(|cmd| seen.insert(cmd.to_string()))
        .take(HISTORY_LIMIT)
        .map(str::to_string)
        .collect()
}
