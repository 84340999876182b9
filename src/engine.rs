//! Completion engine
//!
//! Walks the spec tree of the command being typed, token by token, and
//! builds the suggestions for the last position. The walk is a recursive
//! descent over three mutually recursive steps (subcommand, option and
//! argument) with the traversal state passed by value.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use crate::alias::AliasTable;
use crate::config::Config;
use crate::exec::{ProcessExecutor, ShellExecutor, DEFAULT_TIMEOUT_MS};
use crate::generator::run_generator;
use crate::shell::ShellType;
use crate::spec::{
    builtin, ArgSpec, ChainRegistry, DirectoryRegistry, OptionSpec, SpecLoader, SpecRegistry,
    Subcommand, SuggestionSpec,
};
use crate::suggestion::{
    filter, option_suggestions, rank, subcommand_suggestions, Suggestion, SuggestionBlob,
    SuggestionKind, ALIAS_PRIORITY, DEFAULT_PRIORITY, GENERATOR_PRIORITY, SPEC_NAME_PRIORITY,
    TEMPLATE_PRIORITY,
};
use crate::template::run_templates;
use crate::tokenizer::{parse_command, CommandToken};
use unicode_width::UnicodeWidthStr;

/// Traversal state threaded through the walk
#[derive(Clone, Debug, Default)]
struct Walk {
    /// Persistent options inherited from ancestors
    persistent_options: Vec<OptionSpec>,
    /// Tokens consumed at the current level
    accepted: Vec<CommandToken>,
    args_depleted: bool,
    args_used_by_subcommand: bool,
    /// Subcommand argument definitions consumed so far
    arg_cursor: usize,
}

impl Walk {
    /// State for entering child subcommand `token` of `parent`
    fn descend(self, parent: &Subcommand, token: &CommandToken) -> Walk {
        let mut persistent_options = self.persistent_options;
        for option in parent.options.iter().filter(|o| o.is_persistent) {
            // Inherited unless every one of its names is already inherited
            let adds_name = option
                .names
                .iter()
                .any(|n| !persistent_options.iter().any(|p| p.names.contains(n)));
            if adds_name {
                persistent_options.push(option.clone());
            }
        }

        let mut accepted: Vec<CommandToken> =
            self.accepted.into_iter().filter(|t| t.is_persistent).collect();
        accepted.push(token.clone());

        Walk {
            persistent_options,
            accepted,
            ..Default::default()
        }
    }

    fn all_options(&self, subcommand: &Subcommand) -> Vec<OptionSpec> {
        self.persistent_options
            .iter()
            .chain(subcommand.options.iter())
            .cloned()
            .collect()
    }

    /// Option named `name`, and whether it is persistent here
    fn find_option(&self, subcommand: &Subcommand, name: &str) -> Option<(OptionSpec, bool)> {
        if let Some(option) = self.persistent_options.iter().find(|o| o.names.contains(name)) {
            return Some((option.clone(), true));
        }
        subcommand
            .options
            .iter()
            .find(|o| o.names.contains(name))
            .map(|o| (o.clone(), o.is_persistent))
    }
}

/// Completion context: spec cache, alias table, executor and shell dialect.
///
/// Methods take `&self`; one engine serves concurrent requests.
pub struct CompletionEngine {
    loader: SpecLoader,
    aliases: OnceLock<AliasTable>,
    executor: Arc<dyn ShellExecutor>,
    shell: ShellType,
    script_timeout_ms: u64,
    alias_timeout_ms: u64,
}

impl CompletionEngine {
    pub fn new(registry: Arc<dyn SpecRegistry>, shell: ShellType) -> Self {
        Self {
            loader: SpecLoader::new(registry),
            aliases: OnceLock::new(),
            executor: Arc::new(ProcessExecutor),
            shell,
            script_timeout_ms: DEFAULT_TIMEOUT_MS,
            alias_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    /// Engine over the configured spec directories, falling back to the
    /// built-in catalogue
    pub fn from_config(config: &Config) -> Self {
        let registry = ChainRegistry::new()
            .with(DirectoryRegistry::new(&config.specs_paths))
            .with(builtin::registry());
        let mut engine = Self::new(Arc::new(registry), config.resolved_shell());
        engine.script_timeout_ms = config.script_timeout_ms;
        engine.alias_timeout_ms = config.alias_timeout_ms;
        engine
    }

    pub fn with_executor(mut self, executor: Arc<dyn ShellExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Use a fixed alias table instead of asking the shell
    pub fn with_aliases(self, aliases: AliasTable) -> Self {
        let _ = self.aliases.set(aliases);
        self
    }

    pub fn shell(&self) -> ShellType {
        self.shell
    }

    /// Load the shell's aliases once; later calls are no-ops
    pub async fn load_aliases(&self) {
        if self.aliases.get().is_some() {
            return;
        }
        let table = AliasTable::load(self.shell, self.executor.as_ref(), self.alias_timeout_ms).await;
        // A concurrent load may have won; the first table stays
        let _ = self.aliases.set(table);
    }

    pub fn aliases(&self) -> &AliasTable {
        static EMPTY: OnceLock<AliasTable> = OnceLock::new();
        self.aliases
            .get()
            .unwrap_or_else(|| EMPTY.get_or_init(AliasTable::new))
    }

    pub fn spec_names(&self) -> Vec<String> {
        self.loader.names()
    }

    pub fn resolve_spec(&self, name: &str) -> Option<Arc<Subcommand>> {
        self.loader.resolve(name)
    }

    /// Suggestions for the command being typed in `text`, with relative
    /// paths resolved against `cwd`. `None` when there is nothing to offer.
    pub async fn suggest(&self, text: &str, cwd: &Path) -> Option<SuggestionBlob> {
        let tokens = parse_command(text, self.shell);
        let root = tokens.first()?;
        if !root.complete {
            return self.recommend_command(root);
        }

        let mut tokens = self.aliases().expand(tokens);
        let spec = self.loader.resolve(&tokens.first()?.text)?;

        let (cwd, last) = match tokens.pop() {
            Some(last) => {
                let (cwd, last) = self.resolve_path(last, cwd).await;
                (cwd, Some(last))
            }
            None => (cwd.to_path_buf(), None),
        };
        tokens.extend(last);

        let blob = self
            .run_subcommand(&tokens[1..], &spec, Walk::default(), &cwd)
            .await?;
        if blob.is_empty() {
            return None;
        }

        let characters_to_drop = match tokens.last() {
            Some(last) if !last.complete => self.active_text(Some(last)).map_or(0, |t| {
                if last.is_path {
                    t.width()
                } else {
                    last.display_width
                }
            }),
            _ => 0,
        };
        Some(SuggestionBlob {
            characters_to_drop: Some(characters_to_drop),
            ..blob
        })
    }

    /// Alias and spec names for a partially typed command name
    fn recommend_command(&self, token: &CommandToken) -> Option<SuggestionBlob> {
        let matching = |names: Vec<String>| {
            let mut names: Vec<String> = names
                .into_iter()
                .filter(|n| n.starts_with(&token.text))
                .collect();
            names.sort();
            names
        };

        let suggestions: Vec<Suggestion> = matching(self.aliases().names())
            .into_iter()
            .map(|name| Suggestion::new(name, SuggestionKind::Shortcut, ALIAS_PRIORITY))
            .chain(
                matching(self.loader.names())
                    .into_iter()
                    .map(|name| Suggestion::new(name, SuggestionKind::Subcommand, SPEC_NAME_PRIORITY)),
            )
            .collect();
        if suggestions.is_empty() {
            return None;
        }
        Some(SuggestionBlob {
            suggestions,
            argument_description: None,
            characters_to_drop: Some(token.display_width),
        })
    }

    /// Mark `token` as a path when it names a readable directory (or its
    /// parent does) and return the directory to complete in
    async fn resolve_path(&self, token: CommandToken, cwd: &Path) -> (PathBuf, CommandToken) {
        let sep = self.shell.path_separator();
        if !token.text.contains(sep) {
            return (cwd.to_path_buf(), token);
        }

        let expanded = match token.text.strip_prefix('~') {
            Some(rest) if rest.starts_with(sep) => dirs::home_dir()
                .map(|home| home.join(rest.trim_start_matches(sep)))
                .unwrap_or_else(|| PathBuf::from(&token.text)),
            _ => PathBuf::from(&token.text),
        };
        let resolved = cwd.join(expanded);
        let complete = token.text.ends_with(sep);

        if is_dir(&resolved).await {
            return (resolved, token.with_path(complete));
        }
        match resolved.parent() {
            Some(parent) if is_dir(parent).await => (parent.to_path_buf(), token.with_path(complete)),
            _ => (cwd.to_path_buf(), token),
        }
    }

    /// Text the suggestions are filtered against
    fn active_text<'t>(&self, token: Option<&'t CommandToken>) -> Option<&'t str> {
        let token = token?;
        if !token.is_path {
            return Some(&token.text);
        }
        if token.is_path_complete {
            return Some("");
        }
        token.text.rsplit(self.shell.path_separator()).next()
    }

    fn run_subcommand<'a>(
        &'a self,
        tokens: &'a [CommandToken],
        subcommand: &'a Subcommand,
        walk: Walk,
        cwd: &'a Path,
    ) -> BoxFuture<'a, Option<SuggestionBlob>> {
        async move {
            let Some(token) = tokens.first().filter(|t| t.complete) else {
                return self
                    .recommend_position(subcommand, tokens.first(), &walk, cwd)
                    .await;
            };

            if token.is_option {
                let (option, is_persistent) = walk.find_option(subcommand, &token.text)?;
                return self
                    .run_option(tokens, &option, is_persistent, subcommand, walk, cwd)
                    .await;
            }

            if let Some(child) = subcommand.find_subcommand(&token.text) {
                let child = self.enter(child);
                let walk = walk.descend(subcommand, token);
                return self.run_subcommand(&tokens[1..], &child, walk, cwd).await;
            }

            match subcommand.args.get(walk.arg_cursor..) {
                Some(args) if !args.is_empty() => {
                    self.run_arg(tokens, args, subcommand, walk, false, false, cwd)
                        .await
                }
                // Positional token with no argument left to bind it
                _ => None,
            }
        }
        .boxed()
    }

    fn run_option<'a>(
        &'a self,
        tokens: &'a [CommandToken],
        option: &'a OptionSpec,
        is_persistent: bool,
        subcommand: &'a Subcommand,
        mut walk: Walk,
        cwd: &'a Path,
    ) -> BoxFuture<'a, Option<SuggestionBlob>> {
        async move {
            let Some(token) = tokens.first() else {
                unreachable!("option handling reached without an option token");
            };
            walk.accepted.push(token.with_persistent(is_persistent));

            if option.args.is_empty() {
                self.run_subcommand(&tokens[1..], subcommand, walk, cwd).await
            } else {
                self.run_arg(&tokens[1..], &option.args, subcommand, walk, true, false, cwd)
                    .await
            }
        }
        .boxed()
    }

    #[allow(clippy::too_many_arguments)]
    fn run_arg<'a>(
        &'a self,
        tokens: &'a [CommandToken],
        args: &'a [ArgSpec],
        subcommand: &'a Subcommand,
        mut walk: Walk,
        from_option: bool,
        variadic_bound: bool,
        cwd: &'a Path,
    ) -> BoxFuture<'a, Option<SuggestionBlob>> {
        async move {
            let Some(arg) = args.first() else {
                walk.args_depleted = true;
                walk.args_used_by_subcommand = !from_option;
                return self.run_subcommand(tokens, subcommand, walk, cwd).await;
            };

            let Some(token) = tokens.first().filter(|t| t.complete) else {
                return self
                    .recommend_argument(arg, subcommand, tokens.first(), &walk, variadic_bound, cwd)
                    .await;
            };

            // Optional arguments may be skipped by an option or a subcommand
            if args.iter().all(|a| a.is_optional) {
                if token.is_option {
                    let (option, is_persistent) = walk.find_option(subcommand, &token.text)?;
                    return self
                        .run_option(tokens, &option, is_persistent, subcommand, walk, cwd)
                        .await;
                }
                if let Some(child) = subcommand.find_subcommand(&token.text) {
                    let child = self.enter(child);
                    let walk = walk.descend(subcommand, token);
                    return self.run_subcommand(&tokens[1..], &child, walk, cwd).await;
                }
            }

            if arg.is_variadic {
                walk.accepted.push(token.clone());
                return self
                    .run_arg(&tokens[1..], args, subcommand, walk, from_option, true, cwd)
                    .await;
            }

            if arg.is_command {
                // The rest of the line is a command of its own
                let spec = self.loader.resolve(&token.text)?;
                return self
                    .run_subcommand(&tokens[1..], &spec, Walk::default(), cwd)
                    .await;
            }

            walk.accepted.push(token.clone());
            if !from_option {
                walk.arg_cursor += 1;
            }
            self.run_arg(&tokens[1..], &args[1..], subcommand, walk, from_option, false, cwd)
                .await
        }
        .boxed()
    }

    /// Child subcommand with its lazily loaded spec merged in
    fn enter<'s>(&self, child: &'s Subcommand) -> Cow<'s, Subcommand> {
        let Some(name) = &child.load_spec else {
            return Cow::Borrowed(child);
        };
        match self.loader.resolve(name) {
            Some(loaded) => Cow::Owned(child.merge_loaded(&loaded)),
            None => {
                log::debug!("load spec `{}` for `{}` not found", name, child.names.primary());
                Cow::Borrowed(child)
            }
        }
    }

    async fn recommend_position(
        &self,
        subcommand: &Subcommand,
        token: Option<&CommandToken>,
        walk: &Walk,
        cwd: &Path,
    ) -> Option<SuggestionBlob> {
        if walk.args_depleted && walk.args_used_by_subcommand {
            return None;
        }
        let partial = self.active_text(token);
        let strategy = subcommand.filter_strategy;

        let mut suggestions = subcommand_suggestions(&subcommand.subcommands, strategy, partial);
        suggestions.extend(option_suggestions(
            &walk.all_options(subcommand),
            &walk.accepted,
            strategy,
            partial,
        ));
        if let Some(arg) = subcommand.args.get(walk.arg_cursor) {
            suggestions.extend(self.arg_suggestions(arg, &walk.accepted, partial, cwd).await);
        }

        Some(SuggestionBlob {
            suggestions: rank(suggestions, &walk.accepted),
            argument_description: None,
            characters_to_drop: None,
        })
    }

    async fn recommend_argument(
        &self,
        arg: &ArgSpec,
        subcommand: &Subcommand,
        token: Option<&CommandToken>,
        walk: &Walk,
        variadic_bound: bool,
        cwd: &Path,
    ) -> Option<SuggestionBlob> {
        let partial = self.active_text(token);
        let mut suggestions = self.arg_suggestions(arg, &walk.accepted, partial, cwd).await;

        if arg.is_optional || (arg.is_variadic && variadic_bound) {
            suggestions.extend(subcommand_suggestions(
                &subcommand.subcommands,
                arg.filter_strategy,
                partial,
            ));
            suggestions.extend(option_suggestions(
                &walk.all_options(subcommand),
                &walk.accepted,
                arg.filter_strategy,
                partial,
            ));
        }

        Some(SuggestionBlob {
            suggestions: rank(suggestions, &walk.accepted),
            argument_description: arg.display_description(),
            characters_to_drop: None,
        })
    }

    /// Generator, static and template suggestions of one argument
    async fn arg_suggestions(
        &self,
        arg: &ArgSpec,
        accepted: &[CommandToken],
        partial: Option<&str>,
        cwd: &Path,
    ) -> Vec<Suggestion> {
        let mut tokens: Vec<String> = accepted.iter().map(|t| t.text.clone()).collect();
        tokens.extend(partial.filter(|p| !p.is_empty()).map(str::to_string));

        let mut generated: Vec<SuggestionSpec> = vec![];
        for generator in &arg.generators {
            generated.extend(
                run_generator(
                    generator,
                    &tokens,
                    cwd,
                    self.shell,
                    Arc::clone(&self.executor),
                    self.script_timeout_ms,
                )
                .await,
            );
        }

        let mut suggestions = filter(
            generated,
            arg.filter_strategy,
            partial,
            SuggestionKind::Default,
            GENERATOR_PRIORITY,
        );
        suggestions.extend(filter(
            arg.suggestions.clone(),
            arg.filter_strategy,
            partial,
            SuggestionKind::Default,
            DEFAULT_PRIORITY,
        ));
        if !arg.templates.is_empty() {
            suggestions.extend(filter(
                run_templates(&arg.templates, cwd, self.shell).await,
                arg.filter_strategy,
                partial,
                SuggestionKind::File,
                TEMPLATE_PRIORITY,
            ));
        }
        suggestions
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{FilterStrategy, StaticRegistry};

    fn engine_with(specs: Vec<Subcommand>, aliases: AliasTable) -> CompletionEngine {
        let registry = specs
            .into_iter()
            .fold(StaticRegistry::new(), |registry, spec| registry.with_spec(spec));
        CompletionEngine::new(Arc::new(registry), ShellType::Bash).with_aliases(aliases)
    }

    fn engine(specs: Vec<Subcommand>) -> CompletionEngine {
        engine_with(specs, AliasTable::new())
    }

    fn names(blob: &Option<SuggestionBlob>) -> Vec<String> {
        blob.as_ref()
            .map(|b| b.suggestions.iter().map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }

    fn tool() -> Subcommand {
        Subcommand::new("tool")
            .option(OptionSpec::new(["-h", "--help"]).persistent())
            .option(OptionSpec::new("--local"))
            .subcommand(
                Subcommand::new("remote")
                    .option(OptionSpec::new("--verbose").persistent())
                    .subcommand(Subcommand::new("add").option(OptionSpec::new("--track")))
                    .subcommand(Subcommand::new("show")),
            )
            .subcommand(
                Subcommand::new("copy")
                    .arg(ArgSpec::new("src"))
                    .arg(ArgSpec::new("dst").description("destination")),
            )
    }

    #[tokio::test]
    async fn test_unknown_command_has_no_suggestions() {
        let engine = engine(vec![tool()]);
        assert!(engine.suggest("nope ", Path::new(".")).await.is_none());
        assert!(engine.suggest("", Path::new(".")).await.is_none());
    }

    #[tokio::test]
    async fn test_root_command_recommendation() {
        let mut aliases = AliasTable::new();
        aliases.insert("tl", parse_command("tool ", ShellType::Bash));
        let engine = engine_with(vec![tool(), Subcommand::new("top")], aliases);

        let blob = engine.suggest("t", Path::new(".")).await;
        assert_eq!(names(&blob), vec!["tl", "tool", "top"]);
        let blob = blob.unwrap();
        assert_eq!(blob.suggestions[0].kind, SuggestionKind::Shortcut);
        assert_eq!(blob.suggestions[0].priority, ALIAS_PRIORITY);
        assert_eq!(blob.suggestions[1].kind, SuggestionKind::Subcommand);
        assert_eq!(blob.characters_to_drop, Some(1));

        assert_eq!(names(&engine.suggest("to", Path::new(".")).await), vec!["tool", "top"]);
    }

    #[tokio::test]
    async fn test_persistent_options_reach_descendants() {
        let engine = engine(vec![tool()]);
        let blob = engine.suggest("tool remote add --", Path::new(".")).await;
        let names = names(&blob);
        assert!(names.contains(&"--help".to_string()));
        assert!(names.contains(&"--verbose".to_string()));
        assert!(names.contains(&"--track".to_string()));
        assert!(!names.contains(&"--local".to_string()));
    }

    #[test]
    fn test_persistent_option_with_new_name_is_inherited() {
        let walk = Walk {
            persistent_options: vec![OptionSpec::new("-v").persistent()],
            ..Default::default()
        };
        let parent = Subcommand::new("remote")
            .option(OptionSpec::new(["-v", "--verbose"]).persistent())
            .option(OptionSpec::new("-v").persistent());

        let child = walk.descend(&parent, &CommandToken::new("add", true));
        let inherited: Vec<&str> = child
            .persistent_options
            .iter()
            .map(|o| o.names.longest())
            .collect();
        assert_eq!(inherited, vec!["-v", "--verbose"]);
    }

    #[tokio::test]
    async fn test_typed_persistent_option_not_resuggested() {
        let engine = engine(vec![tool()]);
        let blob = engine.suggest("tool --help remote add --", Path::new(".")).await;
        let names = names(&blob);
        assert!(!names.contains(&"--help".to_string()));
        assert!(names.contains(&"--track".to_string()));
    }

    #[tokio::test]
    async fn test_unmatched_option_fails_closed() {
        let engine = engine(vec![tool()]);
        assert!(engine.suggest("tool --bogus ", Path::new(".")).await.is_none());
    }

    #[tokio::test]
    async fn test_positional_without_args_fails_closed() {
        let engine = engine(vec![tool()]);
        assert!(engine.suggest("tool remote stray ", Path::new(".")).await.is_none());
    }

    #[tokio::test]
    async fn test_argument_description_and_depletion() {
        let engine = engine(vec![tool()]);
        let blob = engine.suggest("tool copy a ", Path::new(".")).await.unwrap();
        assert_eq!(blob.argument_description.as_deref(), Some("destination"));
        assert_eq!(blob.characters_to_drop, Some(0));

        assert!(engine.suggest("tool copy a b ", Path::new(".")).await.is_none());
    }

    #[tokio::test]
    async fn test_fuzzy_strategy() {
        let spec = Subcommand::new("pkg")
            .filter_strategy(FilterStrategy::Fuzzy)
            .subcommand(Subcommand::new("install"))
            .subcommand(Subcommand::new("uninstall"))
            .subcommand(Subcommand::new("list"));
        let engine = engine(vec![spec]);
        let blob = engine.suggest("pkg stal", Path::new(".")).await;
        assert_eq!(names(&blob), vec!["install", "uninstall"]);
        assert_eq!(blob.unwrap().characters_to_drop, Some(4));
    }

    #[tokio::test]
    async fn test_load_spec_is_merged_on_entry() {
        let plugin = Subcommand::new("plugin-spec").subcommand(Subcommand::new("run"));
        let host = Subcommand::new("host").subcommand(Subcommand::new("plugin").load_spec("plugin-spec"));
        let engine = engine(vec![host, plugin]);
        let blob = engine.suggest("host plugin r", Path::new(".")).await;
        assert_eq!(names(&blob), vec!["run"]);
    }

    #[tokio::test]
    async fn test_path_token_completes_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("shell/nested")).unwrap();
        std::fs::write(dir.path().join("shell/integration.sh"), "").unwrap();
        std::fs::write(dir.path().join("shell/other.txt"), "").unwrap();

        let spec = Subcommand::new("source").arg(ArgSpec::new("file").template(crate::spec::Template::Filepaths));
        let engine = engine(vec![spec]);

        let blob = engine.suggest("source shell/", dir.path()).await.unwrap();
        assert_eq!(
            blob.suggestions.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["integration.sh", "nested/", "other.txt"]
        );
        assert_eq!(blob.characters_to_drop, Some(0));

        let blob = engine.suggest("source shell/int", dir.path()).await.unwrap();
        assert_eq!(names(&Some(blob.clone())), vec!["integration.sh"]);
        assert_eq!(blob.characters_to_drop, Some(3));
    }
}
