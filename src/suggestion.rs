//! Suggestions, filtering and ranking
//!
//! Every source (generators, static suggestions, templates, tree names)
//! produces [`SuggestionSpec`]s. They are filtered against the text being
//! typed, merged, then ranked by [`rank`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::spec::{FilterStrategy, OptionSpec, Subcommand, SuggestionSpec};
use crate::tokenizer::CommandToken;

/// Default priority of suggestions that do not declare one
pub const DEFAULT_PRIORITY: i32 = 50;
pub const GENERATOR_PRIORITY: i32 = 60;
pub const TEMPLATE_PRIORITY: i32 = 90;
pub const SPEC_NAME_PRIORITY: i32 = 40;
pub const ALIAS_PRIORITY: i32 = 100;

/// Suggestion category, drives the icon
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Arg,
    File,
    Folder,
    Option,
    Subcommand,
    Mixin,
    Shortcut,
    Special,
    #[default]
    #[serde(other)]
    Default,
}

impl SuggestionKind {
    pub fn icon(&self) -> &'static str {
        match self {
            SuggestionKind::Arg => "💲",
            SuggestionKind::File => "📄",
            SuggestionKind::Folder => "📁",
            SuggestionKind::Option => "🔗",
            SuggestionKind::Subcommand => "📦",
            SuggestionKind::Mixin => "🏝️",
            SuggestionKind::Shortcut => "🔥",
            SuggestionKind::Special => "⭐",
            SuggestionKind::Default => "📀",
        }
    }
}

/// A ranked, displayable completion candidate
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Alias matching the typed text
    pub name: String,
    pub all_names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub icon: String,
    #[serde(rename = "type")]
    pub kind: SuggestionKind,
    pub priority: i32,
    /// Text inserted when the suggestion is accepted
    pub insert_value: String,
}

impl Suggestion {
    pub fn new(name: impl Into<String>, kind: SuggestionKind, priority: i32) -> Self {
        let name = name.into();
        Self {
            insert_value: default_insert_value(&name, kind),
            all_names: vec![name.clone()],
            name,
            description: None,
            icon: kind.icon().to_string(),
            kind,
            priority,
        }
    }
}

/// Result of one completion request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionBlob {
    pub suggestions: Vec<Suggestion>,
    /// Shown when the argument position has nothing to offer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub argument_description: Option<String>,
    /// Terminal columns to erase before inserting a suggestion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characters_to_drop: Option<usize>,
}

impl SuggestionBlob {
    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty() && self.argument_description.is_none()
    }
}

fn default_insert_value(name: &str, kind: SuggestionKind) -> String {
    if kind == SuggestionKind::Folder && (name.ends_with('/') || name.ends_with('\\')) {
        name.to_string()
    } else {
        format!("{name} ")
    }
}

fn matches(name: &str, strategy: FilterStrategy, partial: &str) -> bool {
    let name = name.to_lowercase();
    match strategy {
        FilterStrategy::Fuzzy => name.contains(partial),
        FilterStrategy::Default | FilterStrategy::Prefix => name.starts_with(partial),
    }
}

/// Filter raw suggestions against the text being typed.
///
/// The displayed name is the first alias matching `partial`, or the
/// longest alias when there is nothing to match. Suggestions without a
/// name are dropped.
pub fn filter(
    specs: Vec<SuggestionSpec>,
    strategy: FilterStrategy,
    partial: Option<&str>,
    default_kind: SuggestionKind,
    default_priority: i32,
) -> Vec<Suggestion> {
    let partial = partial.filter(|p| !p.is_empty()).map(str::to_lowercase);
    specs
        .into_iter()
        .filter_map(|spec| {
            let names = spec.names?;
            let name = match &partial {
                None => names.longest().to_string(),
                Some(partial) => names.iter().find(|n| matches(n, strategy, partial))?.clone(),
            };
            let kind = spec.kind.unwrap_or(default_kind);
            Some(Suggestion {
                insert_value: spec
                    .insert_value
                    .unwrap_or_else(|| default_insert_value(&name, kind)),
                all_names: names.to_vec(),
                name,
                description: spec.description,
                icon: spec.icon.unwrap_or_else(|| kind.icon().to_string()),
                kind,
                priority: spec.priority.unwrap_or(default_priority),
            })
        })
        .collect()
}

/// Child subcommand names as suggestions
pub fn subcommand_suggestions(
    subcommands: &[Subcommand],
    strategy: FilterStrategy,
    partial: Option<&str>,
) -> Vec<Suggestion> {
    let specs = subcommands
        .iter()
        .map(|sub| SuggestionSpec {
            names: Some(sub.names.clone()),
            description: sub.description.clone(),
            priority: sub.priority,
            insert_value: sub.insert_value.clone(),
            kind: Some(SuggestionKind::Subcommand),
            icon: sub.icon.clone(),
        })
        .collect();
    filter(specs, strategy, partial, SuggestionKind::Subcommand, DEFAULT_PRIORITY)
}

/// Option suggestions, minus options excluded by an accepted option
pub fn option_suggestions(
    options: &[OptionSpec],
    accepted: &[CommandToken],
    strategy: FilterStrategy,
    partial: Option<&str>,
) -> Vec<Suggestion> {
    let used: HashSet<&str> = accepted
        .iter()
        .filter(|t| t.is_option)
        .map(|t| t.text.as_str())
        .collect();
    // An accepted option may also exclude others through its own exclusiveOn
    let excluded_by_used: HashSet<&str> = options
        .iter()
        .filter(|o| o.names.iter().any(|n| used.contains(n.as_str())))
        .flat_map(|o| o.exclusive_on.iter().map(String::as_str))
        .collect();

    let specs = options
        .iter()
        .filter(|o| !o.exclusive_on.iter().any(|e| used.contains(e.as_str())))
        .filter(|o| !o.names.iter().any(|n| excluded_by_used.contains(n.as_str())))
        .map(|o| SuggestionSpec {
            names: Some(o.names.clone()),
            description: o.description.clone(),
            priority: o.priority,
            insert_value: o.insert_value.clone(),
            kind: Some(SuggestionKind::Option),
            icon: None,
        })
        .collect();
    filter(specs, strategy, partial, SuggestionKind::Option, DEFAULT_PRIORITY)
}

/// Sort by priority and drop accepted, empty and duplicate names
pub fn rank(mut suggestions: Vec<Suggestion>, accepted: &[CommandToken]) -> Vec<Suggestion> {
    // sort_by is stable: ties keep source order
    suggestions.sort_by(|a, b| b.priority.cmp(&a.priority));

    let typed: HashSet<&str> = accepted.iter().map(|t| t.text.as_str()).collect();
    let mut seen = HashSet::new();
    suggestions
        .into_iter()
        .filter(|s| !s.all_names.iter().any(|n| typed.contains(n.as_str())))
        .filter(|s| !s.name.is_empty())
        .filter(|s| seen.insert(s.name.clone()))
        .collect()
}
