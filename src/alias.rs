//! Shell alias table
//!
//! Aliases are listed once per process by running the user's interactive
//! shell (`bash -i -c alias`, `zsh -i -c alias`) and reparsing each value
//! with the tokenizer.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::exec::{ExecuteRequest, ShellExecutor};
use crate::shell::ShellType;
use crate::tokenizer::{parse_command, CommandToken};

fn bash_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^alias\s+([^=\s]+)=(.*)$").expect("valid alias regex"))
}

fn zsh_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([^=\s]+)=(.*)$").expect("valid alias regex"))
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AliasTable {
    aliases: BTreeMap<String, Vec<CommandToken>>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// List aliases through `executor`. Never fails: unsupported shells and
    /// failing listings give an empty (or partial) table.
    pub async fn load(shell: ShellType, executor: &dyn ShellExecutor, timeout_ms: u64) -> Self {
        let Some((program, args)) = shell.alias_command() else {
            log::debug!("alias loading not supported for {}", shell);
            return Self::new();
        };
        let output = executor
            .execute(ExecuteRequest::new(program, args).timeout_ms(timeout_ms))
            .await;
        if !output.success() {
            log::debug!(
                "failed to load aliases, status {}: {}",
                output.status,
                output.stderr.trim()
            );
        }
        let table = Self::parse(&output.stdout, shell);
        log::debug!("loaded {} alias(es) for {}", table.aliases.len(), shell);
        table
    }

    /// Parse `alias` builtin output.
    ///
    /// Bash prints `alias NAME='VALUE'`, zsh prints `NAME='VALUE'` (or
    /// `NAME=VALUE` when no quoting is needed).
    pub fn parse(output: &str, shell: ShellType) -> Self {
        let re = match shell {
            ShellType::Bash => bash_line(),
            ShellType::Zsh => zsh_line(),
            _ => return Self::new(),
        };

        let aliases = output
            .lines()
            .filter_map(|line| {
                let caps = re.captures(line.trim())?;
                let value = caps[2].replace(r"'\''", "'");
                let value = value
                    .strip_prefix('\'')
                    .and_then(|v| v.strip_suffix('\''))
                    .unwrap_or(&value);
                Some((caps[1].to_string(), parse_command(&format!("{value} "), shell)))
            })
            .collect();
        Self { aliases }
    }

    pub fn insert(&mut self, name: impl Into<String>, tokens: Vec<CommandToken>) {
        self.aliases.insert(name.into(), tokens);
    }

    pub fn get(&self, name: &str) -> Option<&[CommandToken]> {
        self.aliases.get(name).map(Vec::as_slice)
    }

    /// Replace a complete first token naming an alias by its tokens.
    /// Expansion is not transitive.
    pub fn expand(&self, tokens: Vec<CommandToken>) -> Vec<CommandToken> {
        let Some(first) = tokens.first().filter(|t| t.complete) else {
            return tokens;
        };
        match self.aliases.get(&first.text) {
            Some(expansion) => expansion
                .iter()
                .cloned()
                .chain(tokens.into_iter().skip(1))
                .collect(),
            None => tokens,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.aliases.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecuteOutput;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use std::sync::Mutex;

    const BASH_OUTPUT: &str = "alias glo='git log --oneline'\n\
                               alias la='echo '\\''lo'\\'' '\\''la'\\'''\n\
                               alias ls='ls --color=auto'\n";

    const ZSH_OUTPUT: &str = "glo='git log --oneline'\n\
                              la='echo '\\''lo'\\'' '\\''la'\\'''\n\
                              ls='ls --color=auto'\n\
                              g=git\n";

    fn texts(tokens: &[CommandToken]) -> Vec<&str> {
        tokens.iter().map(|t| t.text.as_str()).collect()
    }

    #[derive(Default)]
    struct Recorder {
        requests: Mutex<Vec<ExecuteRequest>>,
        stdout: String,
    }

    impl ShellExecutor for Recorder {
        fn execute(&self, request: ExecuteRequest) -> BoxFuture<'_, ExecuteOutput> {
            self.requests.lock().unwrap().push(request);
            let stdout = self.stdout.clone();
            async move {
                ExecuteOutput {
                    stdout,
                    stderr: String::new(),
                    status: 0,
                }
            }
            .boxed()
        }
    }

    #[test]
    fn test_parse_bash_aliases() {
        let table = AliasTable::parse(BASH_OUTPUT, ShellType::Bash);
        assert_eq!(table.names(), vec!["glo", "la", "ls"]);
        assert_eq!(texts(table.get("glo").unwrap()), vec!["git", "log", "--oneline"]);

        let la = table.get("la").unwrap();
        assert_eq!(texts(la), vec!["echo", "lo", "la"]);
        assert!(la[1].is_quoted && la.iter().all(|t| t.complete));
    }

    #[test]
    fn test_parse_zsh_aliases() {
        let table = AliasTable::parse(ZSH_OUTPUT, ShellType::Zsh);
        assert_eq!(table.len(), 4);
        assert_eq!(texts(table.get("ls").unwrap()), vec!["ls", "--color", "auto"]);
        assert_eq!(texts(table.get("g").unwrap()), vec!["git"]);
    }

    #[test]
    fn test_unsupported_shell_parses_nothing() {
        assert!(AliasTable::parse(BASH_OUTPUT, ShellType::Fish).is_empty());
    }

    #[test]
    fn test_expand_only_complete_first_token() {
        let table = AliasTable::parse(BASH_OUTPUT, ShellType::Bash);

        let partial = vec![CommandToken::new("glo", false)];
        assert_eq!(table.expand(partial.clone()), partial);

        let expanded = table.expand(vec![CommandToken::new("glo", true), CommandToken::new("-p", false)]);
        assert_eq!(texts(&expanded), vec!["git", "log", "--oneline", "-p"]);

        let plain = vec![CommandToken::new("git", true)];
        assert_eq!(table.expand(plain.clone()), plain);
    }

    #[test]
    fn test_expand_is_not_transitive() {
        let table = AliasTable::parse(BASH_OUTPUT, ShellType::Bash);
        let expanded = table.expand(vec![CommandToken::new("ls", true)]);
        assert_eq!(texts(&expanded), vec!["ls", "--color", "auto"]);
    }

    #[tokio::test]
    async fn test_load_runs_interactive_shell() {
        let executor = Recorder {
            stdout: ZSH_OUTPUT.to_string(),
            ..Default::default()
        };
        let table = AliasTable::load(ShellType::Zsh, &executor, 5_000).await;
        assert_eq!(table.len(), 4);

        let requests = executor.requests.lock().unwrap();
        assert_eq!(requests[0].command, "zsh");
        assert_eq!(requests[0].args, vec!["-i", "-c", "alias"]);
    }

    #[tokio::test]
    async fn test_load_skips_unsupported_shell() {
        let executor = Recorder::default();
        let table = AliasTable::load(ShellType::Fish, &executor, 5_000).await;
        assert!(table.is_empty());
        assert!(executor.requests.lock().unwrap().is_empty());
    }
}
