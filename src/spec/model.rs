//! Specification tree types
//!
//! Compatible with the Fig/Warp completion spec format (camelCase JSON or
//! YAML). Single-or-array fields are normalized while deserializing, and
//! malformed child nodes are dropped instead of failing the whole tree.

use futures_util::future::BoxFuture;
use serde::Deserialize;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::exec::ShellExecutor;
use crate::generator::GeneratorContext;
use crate::suggestion::SuggestionKind;

/// Shared closure attached to a spec node.
///
/// Function-valued fields cannot come from JSON/YAML; they are only set when
/// a spec is built in Rust.
pub struct Hook<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized> Clone for Hook<T> {
    fn clone(&self) -> Self {
        Hook(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

impl<T: ?Sized> Deref for Hook<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

pub type DynamicScriptFn = dyn Fn(&[String]) -> Vec<String> + Send + Sync;
pub type PostProcessFn = dyn Fn(&str, &[String]) -> Vec<SuggestionSpec> + Send + Sync;
pub type TemplateFilterFn = dyn Fn(Vec<SuggestionSpec>) -> Vec<SuggestionSpec> + Send + Sync;
pub type CustomGeneratorFn = dyn Fn(
        Vec<String>,
        Arc<dyn ShellExecutor>,
        GeneratorContext,
    ) -> BoxFuture<'static, anyhow::Result<Vec<SuggestionSpec>>>
    + Send
    + Sync;

/// Non-empty ordered list of aliases for a node
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "de::OneOrMany<String>")]
pub struct Names(Vec<String>);

impl Names {
    pub fn new<I, S>(names: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        (!names.is_empty()).then_some(Names(names))
    }

    pub fn single(name: impl Into<String>) -> Self {
        Names(vec![name.into()])
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn primary(&self) -> &str {
        &self.0[0]
    }

    /// Longest alias, shown when no typed text selects one
    pub fn longest(&self) -> &str {
        self.0
            .iter()
            .reduce(|a, b| if b.len() > a.len() { b } else { a })
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

impl TryFrom<de::OneOrMany<String>> for Names {
    type Error = String;

    fn try_from(value: de::OneOrMany<String>) -> Result<Self, Self::Error> {
        Names::new(value.into_vec()).ok_or_else(|| "name list is empty".to_string())
    }
}

impl From<&str> for Names {
    fn from(name: &str) -> Self {
        Names::single(name)
    }
}

impl<const N: usize> From<[&str; N]> for Names {
    fn from(names: [&str; N]) -> Self {
        Names::new(names).unwrap_or_else(|| Names::single(""))
    }
}

/// Text-matching policy applied to typed text before ranking
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterStrategy {
    #[default]
    Default,
    Prefix,
    Fuzzy,
}

/// Declarative, filesystem-derived suggestion sets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    Filepaths,
    Folders,
    History,
    Help,
}

/// A raw suggestion as written in a spec or returned by a generator
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionSpec {
    #[serde(rename = "name")]
    pub names: Option<Names>,
    pub description: Option<String>,
    pub priority: Option<i32>,
    pub insert_value: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<SuggestionKind>,
    pub icon: Option<String>,
}

impl SuggestionSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            names: Some(Names::single(name)),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn kind(mut self, kind: SuggestionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn insert_value(mut self, insert_value: impl Into<String>) -> Self {
        self.insert_value = Some(insert_value.into());
        self
    }
}

/// Command run by a generator script
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Script {
    /// Program followed by its arguments
    Command(Vec<String>),
    /// Command string run through `sh -c`
    Shell(String),
    /// Pure function of the accepted token texts producing an argv
    #[serde(skip_deserializing)]
    Dynamic(Hook<DynamicScriptFn>),
}

/// Dynamic suggestion producer attached to an argument
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generator {
    pub script: Option<Script>,
    pub split_on: Option<String>,
    #[serde(skip)]
    pub post_process: Option<Hook<PostProcessFn>>,
    #[serde(skip)]
    pub custom: Option<Hook<CustomGeneratorFn>>,
    #[serde(rename = "template", default, deserialize_with = "de::one_or_many")]
    pub templates: Vec<Template>,
    #[serde(skip)]
    pub filter_template_suggestions: Option<Hook<TemplateFilterFn>>,
    #[serde(rename = "scriptTimeout")]
    pub script_timeout_ms: Option<u64>,
}

impl Generator {
    pub fn script(argv: &[&str]) -> Self {
        Self {
            script: Some(Script::Command(argv.iter().map(|s| s.to_string()).collect())),
            ..Default::default()
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            script: Some(Script::Shell(command.into())),
            ..Default::default()
        }
    }

    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&[String]) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            script: Some(Script::Dynamic(Hook(Arc::new(f)))),
            ..Default::default()
        }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(
                Vec<String>,
                Arc<dyn ShellExecutor>,
                GeneratorContext,
            ) -> BoxFuture<'static, anyhow::Result<Vec<SuggestionSpec>>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            custom: Some(Hook(Arc::new(f))),
            ..Default::default()
        }
    }

    pub fn template(template: Template) -> Self {
        Self {
            templates: vec![template],
            ..Default::default()
        }
    }

    pub fn split_on(mut self, delimiter: impl Into<String>) -> Self {
        self.split_on = Some(delimiter.into());
        self
    }

    pub fn post_process<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[String]) -> Vec<SuggestionSpec> + Send + Sync + 'static,
    {
        self.post_process = Some(Hook(Arc::new(f)));
        self
    }

    pub fn filter_templates<F>(mut self, f: F) -> Self
    where
        F: Fn(Vec<SuggestionSpec>) -> Vec<SuggestionSpec> + Send + Sync + 'static,
    {
        self.filter_template_suggestions = Some(Hook(Arc::new(f)));
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.script_timeout_ms = Some(timeout_ms);
        self
    }
}

/// Positional argument of a subcommand or option
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgSpec {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub is_variadic: bool,
    /// Remaining tokens form a new command line (e.g. `sudo <cmd>`)
    #[serde(default)]
    pub is_command: bool,
    #[serde(default, deserialize_with = "de::lenient_one_or_many")]
    pub generators: Vec<Generator>,
    #[serde(default, deserialize_with = "de::suggestions")]
    pub suggestions: Vec<SuggestionSpec>,
    #[serde(rename = "template", default, deserialize_with = "de::one_or_many")]
    pub templates: Vec<Template>,
    #[serde(default)]
    pub filter_strategy: FilterStrategy,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    pub fn variadic(mut self) -> Self {
        self.is_variadic = true;
        self
    }

    pub fn command(mut self) -> Self {
        self.is_command = true;
        self
    }

    pub fn generator(mut self, generator: Generator) -> Self {
        self.generators.push(generator);
        self
    }

    pub fn suggestions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions
            .extend(names.into_iter().map(SuggestionSpec::new));
        self
    }

    pub fn suggestion(mut self, suggestion: SuggestionSpec) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    pub fn template(mut self, template: Template) -> Self {
        self.templates.push(template);
        self
    }

    pub fn filter_strategy(mut self, filter_strategy: FilterStrategy) -> Self {
        self.filter_strategy = filter_strategy;
        self
    }

    /// Text shown when the argument position has no suggestions
    pub fn display_description(&self) -> Option<String> {
        self.description.clone().or_else(|| self.name.clone())
    }
}

/// Command option / flag
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSpec {
    #[serde(rename = "name")]
    pub names: Names,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_one_or_many")]
    pub args: Vec<ArgSpec>,
    /// Usable from every descendant subcommand
    #[serde(default)]
    pub is_persistent: bool,
    /// Names of options that hide this one once used
    #[serde(default)]
    pub exclusive_on: Vec<String>,
    pub priority: Option<i32>,
    pub insert_value: Option<String>,
}

impl OptionSpec {
    pub fn new(names: impl Into<Names>) -> Self {
        Self {
            names: names.into(),
            description: None,
            args: vec![],
            is_persistent: false,
            exclusive_on: vec![],
            priority: None,
            insert_value: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn persistent(mut self) -> Self {
        self.is_persistent = true;
        self
    }

    pub fn exclusive_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusive_on.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Command or subcommand node
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subcommand {
    #[serde(rename = "name")]
    pub names: Names,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "de::lenient_vec")]
    pub subcommands: Vec<Subcommand>,
    #[serde(default, deserialize_with = "de::lenient_vec")]
    pub options: Vec<OptionSpec>,
    #[serde(default, deserialize_with = "de::lenient_one_or_many")]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub filter_strategy: FilterStrategy,
    pub priority: Option<i32>,
    pub icon: Option<String>,
    pub insert_value: Option<String>,
    /// Registry entry whose tree is merged in when this subcommand is entered
    pub load_spec: Option<String>,
}

impl Subcommand {
    pub fn new(names: impl Into<Names>) -> Self {
        Self {
            names: names.into(),
            description: None,
            subcommands: vec![],
            options: vec![],
            args: vec![],
            filter_strategy: FilterStrategy::Default,
            priority: None,
            icon: None,
            insert_value: None,
            load_spec: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn subcommand(mut self, subcommand: Subcommand) -> Self {
        self.subcommands.push(subcommand);
        self
    }

    pub fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn filter_strategy(mut self, filter_strategy: FilterStrategy) -> Self {
        self.filter_strategy = filter_strategy;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn load_spec(mut self, name: impl Into<String>) -> Self {
        self.load_spec = Some(name.into());
        self
    }

    /// Child subcommand matching `name` exactly
    pub fn find_subcommand(&self, name: &str) -> Option<&Subcommand> {
        self.subcommands.iter().find(|s| s.names.contains(name))
    }

    /// Fill the parts of `self` that a lazily loaded spec provides.
    /// Fields declared on `self` win over the loaded ones.
    pub fn merge_loaded(&self, loaded: &Subcommand) -> Subcommand {
        fn pick<T: Clone>(own: &[T], other: &[T]) -> Vec<T> {
            if own.is_empty() {
                other.to_vec()
            } else {
                own.to_vec()
            }
        }

        Subcommand {
            names: self.names.clone(),
            description: self.description.clone().or_else(|| loaded.description.clone()),
            subcommands: pick(&self.subcommands, &loaded.subcommands),
            options: pick(&self.options, &loaded.options),
            args: pick(&self.args, &loaded.args),
            filter_strategy: self.filter_strategy,
            priority: self.priority.or(loaded.priority),
            icon: self.icon.clone().or_else(|| loaded.icon.clone()),
            insert_value: self.insert_value.clone(),
            load_spec: None,
        }
    }
}

mod de {
    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer};

    use super::SuggestionSpec;

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub enum OneOrMany<T> {
        One(T),
        Many(Vec<T>),
    }

    impl<T> OneOrMany<T> {
        pub fn into_vec(self) -> Vec<T> {
            match self {
                OneOrMany::One(value) => vec![value],
                OneOrMany::Many(values) => values,
            }
        }
    }

    /// Element that failed to deserialize is kept as `Invalid` and dropped
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient<T> {
        Valid(T),
        Invalid(IgnoredAny),
    }

    fn keep_valid<T>(items: Vec<Lenient<T>>) -> Vec<T> {
        let total = items.len();
        let valid: Vec<T> = items
            .into_iter()
            .filter_map(|item| match item {
                Lenient::Valid(value) => Some(value),
                Lenient::Invalid(_) => None,
            })
            .collect();
        if valid.len() != total {
            log::debug!(
                "dropped {} malformed {} node(s)",
                total - valid.len(),
                std::any::type_name::<T>().rsplit("::").next().unwrap_or("spec")
            );
        }
        valid
    }

    pub fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<OneOrMany<T>>::deserialize(deserializer)?
            .map(OneOrMany::into_vec)
            .unwrap_or_default())
    }

    pub fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(keep_valid(
            Option::<Vec<Lenient<T>>>::deserialize(deserializer)?.unwrap_or_default(),
        ))
    }

    pub fn lenient_one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape<T> {
            Many(Vec<Lenient<T>>),
            One(Lenient<T>),
        }

        let items = match Option::<Shape<T>>::deserialize(deserializer)? {
            Some(Shape::Many(items)) => items,
            Some(Shape::One(item)) => vec![item],
            None => vec![],
        };
        Ok(keep_valid(items))
    }

    pub fn suggestions<'de, D>(deserializer: D) -> Result<Vec<SuggestionSpec>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Entry {
            Name(String),
            Full(SuggestionSpec),
        }

        let entries: Vec<Entry> = lenient_vec(deserializer)?;
        Ok(entries
            .into_iter()
            .map(|entry| match entry {
                Entry::Name(name) => SuggestionSpec::new(name),
                Entry::Full(spec) => spec,
            })
            .collect())
    }
}
