/*!
 * shellsense CLI - command line completion
 *
 * Prints ranked suggestions for a partially typed command line as JSON,
 * for shell plugins and editor integrations to render.
 */

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use shellsense::config::Config;
use shellsense::logging::{self, LogConfig, LogLevel};
use shellsense::shell::ALIAS_SUPPORTED_SHELLS;
use shellsense::{CompletionEngine, ShellType};

#[derive(Parser)]
#[command(name = "shellsense")]
#[command(about = "Spec-driven command line completion", long_about = None)]
#[command(version)]
struct Cli {
    /// Shell dialect (default: config, then $SHELL)
    #[arg(long)]
    shell: Option<ShellType>,

    /// Directory of `<command>.json|yaml` specs, searched before built-ins
    #[arg(long = "specs-dir")]
    specs_dirs: Vec<PathBuf>,

    /// Directory relative paths resolve against (default: current directory)
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Generator script timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Append JSON log lines to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Do not ask the shell for its aliases
    #[arg(long)]
    no_aliases: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Suggest the next token for a command line.
    ///
    /// Words are joined with single spaces; pass an empty last word to
    /// complete after a trailing space (`complete git ''`).
    Complete {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },

    /// List alias names then spec names as a JSON array
    List {
        /// Shell to list aliases of (bash or zsh)
        #[arg(long)]
        shell: Option<ShellType>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run(Cli::parse()).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load().unwrap_or_else(|e| {
        eprintln!("shellsense: ignoring configuration: {}", e);
        Config::default()
    });
    if cli.shell.is_some() {
        config.shell = cli.shell;
    }
    if !cli.specs_dirs.is_empty() {
        config.specs_paths = cli.specs_dirs.clone();
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.script_timeout_ms = timeout_ms;
    }
    if cli.log_file.is_some() {
        config.log_file = cli.log_file.clone();
    }
    if cli.verbose {
        config.log_level = Some(LogLevel::Debug);
    }
    if let Err(e) = init_logging(&config, cli.verbose) {
        eprintln!("shellsense: logging disabled: {:#}", e);
    }

    match cli.command {
        Commands::Complete { words } => {
            if words.len() < 2 {
                eprintln!("usage: shellsense complete <command> <word>...");
                eprintln!("at least a command and one more word are required");
                std::process::exit(1);
            }
            let cwd = cli
                .cwd
                .or_else(|| std::env::current_dir().ok())
                .unwrap_or_else(|| PathBuf::from("."));

            let engine = CompletionEngine::from_config(&config);
            if !cli.no_aliases {
                engine.load_aliases().await;
            }
            let blob = engine
                .suggest(&words.join(" "), &cwd)
                .await
                .unwrap_or_default();
            println!("{}", serde_json::to_string(&blob)?);
        }
        Commands::List { shell } => {
            if let Some(shell) = shell {
                if !ALIAS_SUPPORTED_SHELLS.contains(&shell) {
                    bail!("listing aliases is not supported for {}", shell);
                }
                config.shell = Some(shell);
            }

            let engine = CompletionEngine::from_config(&config);
            if !cli.no_aliases && ALIAS_SUPPORTED_SHELLS.contains(&config.resolved_shell()) {
                engine.load_aliases().await;
            }
            let names: Vec<String> = engine
                .aliases()
                .names()
                .into_iter()
                .chain(engine.spec_names())
                .collect();
            println!("{}", serde_json::to_string(&names)?);
        }
    }
    Ok(())
}

/// Logging stays off unless asked for; stdout carries the results
fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<()> {
    if config.log_file.is_none() && config.log_level.is_none() {
        return Ok(());
    }
    logging::init(LogConfig {
        file_path: config.log_file.clone(),
        stderr: verbose || config.log_file.is_none(),
        min_level: config.log_level.unwrap_or(LogLevel::Info),
    })?;
    log::debug!("shellsense {} ({})", env!("CARGO_PKG_VERSION"), config.resolved_shell());
    Ok(())
}
