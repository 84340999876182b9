//! Generator execution
//!
//! A generator combines up to three sources (script, custom closure,
//! templates) and concatenates their output. A script that exits non-zero
//! without output contributes nothing. Errors from a custom closure and
//! panics produce an empty list for that generator only.

use futures_util::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::exec::{ExecuteRequest, ShellExecutor};
use crate::shell::ShellType;
use crate::spec::{Generator, Script, SuggestionSpec};
use crate::template::run_templates;

/// Environment handed to custom generators
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorContext {
    pub environment_variables: HashMap<String, String>,
    pub current_working_directory: PathBuf,
}

impl GeneratorContext {
    pub fn new(cwd: &Path) -> Self {
        Self {
            environment_variables: std::env::vars().collect(),
            current_working_directory: cwd.to_path_buf(),
        }
    }
}

/// Run one generator. `tokens` are the accepted token texts followed by
/// the text being typed, if any. Scripts without their own timeout get
/// `default_timeout_ms`.
pub async fn run_generator(
    generator: &Generator,
    tokens: &[String],
    cwd: &Path,
    shell: ShellType,
    executor: Arc<dyn ShellExecutor>,
    default_timeout_ms: u64,
) -> Vec<SuggestionSpec> {
    let run = AssertUnwindSafe(generate(generator, tokens, cwd, shell, executor, default_timeout_ms))
        .catch_unwind();
    match run.await {
        Ok(Ok(suggestions)) => suggestions,
        Ok(Err(e)) => {
            log::debug!("generator failed: {:#}", e);
            vec![]
        }
        Err(_) => {
            log::debug!("generator panicked, script: {:?}", generator.script);
            vec![]
        }
    }
}

async fn generate(
    generator: &Generator,
    tokens: &[String],
    cwd: &Path,
    shell: ShellType,
    executor: Arc<dyn ShellExecutor>,
    default_timeout_ms: u64,
) -> anyhow::Result<Vec<SuggestionSpec>> {
    let mut suggestions = vec![];

    if let Some(script) = &generator.script {
        let argv = match script {
            Script::Command(argv) => argv.clone(),
            Script::Shell(command) => vec!["sh".to_string(), "-c".to_string(), command.clone()],
            Script::Dynamic(build) => build(tokens),
        };
        if let Some((program, args)) = argv.split_first() {
            let output = executor
                .execute(
                    ExecuteRequest::new(program.clone(), args.to_vec())
                        .cwd(cwd)
                        .timeout_ms(generator.script_timeout_ms.unwrap_or(default_timeout_ms)),
                )
                .await;
            let stdout = output.stdout.trim();
            if !output.success() && stdout.is_empty() {
                // Only the script's share is lost; custom and templates still run
                log::debug!(
                    "generator script `{}` exited with {}: {}",
                    program,
                    output.status,
                    output.stderr.trim()
                );
            } else if let Some(post_process) = &generator.post_process {
                suggestions.extend(post_process(stdout, tokens));
            } else if let Some(split_on) = &generator.split_on {
                suggestions.extend(
                    stdout
                        .split(split_on.as_str())
                        .map(SuggestionSpec::new),
                );
            }
        }
    }

    if let Some(custom) = &generator.custom {
        let context = GeneratorContext::new(cwd);
        suggestions.extend(custom(tokens.to_vec(), Arc::clone(&executor), context).await?);
    }

    if !generator.templates.is_empty() {
        let generated = run_templates(&generator.templates, cwd, shell).await;
        match &generator.filter_template_suggestions {
            Some(keep) => suggestions.extend(keep(generated)),
            None => suggestions.extend(generated),
        }
    }

    Ok(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExecuteOutput, ProcessExecutor, DEFAULT_TIMEOUT_MS};
    use crate::spec::Template;
    use futures_util::future::BoxFuture;

    struct FixedOutput(ExecuteOutput);

    impl ShellExecutor for FixedOutput {
        fn execute(&self, _request: ExecuteRequest) -> BoxFuture<'_, ExecuteOutput> {
            let output = self.0.clone();
            async move { output }.boxed()
        }
    }

    fn fixed(stdout: &str, status: i32) -> Arc<dyn ShellExecutor> {
        Arc::new(FixedOutput(ExecuteOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            status,
        }))
    }

    fn names(suggestions: &[SuggestionSpec]) -> Vec<String> {
        suggestions
            .iter()
            .filter_map(|s| s.names.as_ref().map(|n| n.primary().to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_split_on() {
        let gen = Generator::script(&["git", "branch"]).split_on("\n");
        let out = run_generator(&gen, &[], Path::new("."), ShellType::Bash, fixed("main\ndev\n", 0), DEFAULT_TIMEOUT_MS).await;
        assert_eq!(names(&out), vec!["main", "dev"]);
    }

    #[tokio::test]
    async fn test_post_process_receives_tokens() {
        let gen = Generator::script(&["x"]).post_process(|out, tokens| {
            vec![SuggestionSpec::new(format!("{}:{}", out, tokens.join(",")))]
        });
        let tokens = vec!["cmd".to_string(), "pa".to_string()];
        let out = run_generator(&gen, &tokens, Path::new("."), ShellType::Bash, fixed(" out \n", 0), DEFAULT_TIMEOUT_MS).await;
        assert_eq!(names(&out), vec!["out:cmd,pa"]);
    }

    #[tokio::test]
    async fn test_real_shell_script() {
        let gen = Generator::shell("printf 'a b c'").split_on(" ");
        let out = run_generator(
            &gen,
            &[],
            Path::new("."),
            ShellType::Bash,
            Arc::new(ProcessExecutor),
            DEFAULT_TIMEOUT_MS,
        )
        .await;
        assert_eq!(names(&out), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failed_script_yields_nothing() {
        let gen = Generator::script(&["broken"]).split_on("\n");
        let out = run_generator(&gen, &[], Path::new("."), ShellType::Bash, fixed("", 2), DEFAULT_TIMEOUT_MS).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_failed_script_keeps_custom_and_templates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();

        let mut gen = Generator::custom(|_, _, _| {
            async { Ok::<_, anyhow::Error>(vec![SuggestionSpec::new("c")]) }.boxed()
        })
        .split_on("\n");
        gen.script = Some(Script::Command(vec!["broken".to_string()]));
        gen.templates.push(Template::Filepaths);

        let out = run_generator(&gen, &[], dir.path(), ShellType::Bash, fixed("", 1), DEFAULT_TIMEOUT_MS).await;
        assert_eq!(names(&out), vec!["c", "a.txt"]);
    }

    #[tokio::test]
    async fn test_panicking_post_process_is_isolated() {
        let gen = Generator::script(&["x"]).post_process(|_, _| panic!("bad spec"));
        let out = run_generator(&gen, &[], Path::new("."), ShellType::Bash, fixed("data", 0), DEFAULT_TIMEOUT_MS).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_dynamic_script_builds_argv() {
        let gen = Generator::dynamic(|tokens| vec!["echo".to_string(), tokens.join("-")]).split_on("\n");
        let tokens = vec!["a".to_string(), "b".to_string()];
        let out = run_generator(&gen, &tokens, Path::new("."), ShellType::Bash, Arc::new(ProcessExecutor), DEFAULT_TIMEOUT_MS).await;
        assert_eq!(names(&out), vec!["a-b"]);
    }

    #[tokio::test]
    async fn test_custom_and_templates_concatenate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::write(dir.path().join("b.log"), "").unwrap();

        let mut gen = Generator::custom(|tokens, _executor, context| {
            async move {
                assert!(context.current_working_directory.is_dir());
                Ok::<_, anyhow::Error>(vec![SuggestionSpec::new(format!("custom-{}", tokens.len()))])
            }
            .boxed()
        })
        .filter_templates(|specs| {
            specs
                .into_iter()
                .filter(|s| s.names.as_ref().is_some_and(|n| n.primary().ends_with(".txt")))
                .collect()
        });
        gen.templates.push(Template::Filepaths);

        let out = run_generator(&gen, &["x".to_string()], dir.path(), ShellType::Bash, fixed("", 0), DEFAULT_TIMEOUT_MS).await;
        assert_eq!(names(&out), vec!["custom-1", "a.txt"]);
    }

    #[tokio::test]
    async fn test_custom_error_is_isolated() {
        let gen = Generator::custom(|_, _, _| async { Err::<Vec<SuggestionSpec>, _>(anyhow::anyhow!("nope")) }.boxed());
        let out = run_generator(&gen, &[], Path::new("."), ShellType::Bash, fixed("", 0), DEFAULT_TIMEOUT_MS).await;
        assert!(out.is_empty());
    }
}
