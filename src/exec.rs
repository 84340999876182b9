//! exec - bounded-timeout subprocess invocation
//! - used by alias loading and generator scripts
//! - never fails and never hangs: on timeout the child is killed and
//!   whatever output was captured so far is returned

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::{timeout, Duration};

/// Default generator / alias listing timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Exit status reported when the child was killed on timeout
pub const TIMEOUT_STATUS: i32 = 124;

/// Exit status reported when the child could not be spawned
pub const SPAWN_FAILURE_STATUS: i32 = 127;

/// Time allowed for pipe readers to drain after the child exits or is killed
const READER_GRACE: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    pub timeout_ms: u64,
}

impl ExecuteRequest {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
            env: HashMap::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl ExecuteOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs external commands on behalf of generators and the alias loader
pub trait ShellExecutor: Send + Sync {
    fn execute(&self, request: ExecuteRequest) -> BoxFuture<'_, ExecuteOutput>;
}

/// [`ShellExecutor`] backed by `tokio::process`
#[derive(Clone, Debug, Default)]
pub struct ProcessExecutor;

impl ShellExecutor for ProcessExecutor {
    fn execute(&self, request: ExecuteRequest) -> BoxFuture<'_, ExecuteOutput> {
        run_command(request).boxed()
    }
}

/// Run a command with a hard timeout
pub async fn run_command(request: ExecuteRequest) -> ExecuteOutput {
    let cwd = request
        .cwd
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    let mut cmd = Command::new(&request.command);
    cmd.args(&request.args)
        .current_dir(cwd)
        .envs(&request.env)
        .env("SHELLSENSE", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            log::debug!("failed to spawn `{}`: {}", request.command, e);
            return ExecuteOutput {
                stdout: String::new(),
                stderr: e.to_string(),
                status: SPAWN_FAILURE_STATUS,
            };
        }
    };

    let stdout_reader = tokio::spawn(read_to_string(child.stdout.take()));
    let stderr_reader = tokio::spawn(read_to_string(child.stderr.take()));

    let status = match timeout(Duration::from_millis(request.timeout_ms), child.wait()).await {
        Ok(Ok(status)) => status.code().unwrap_or(1),
        Ok(Err(e)) => {
            log::debug!("failed waiting on `{}`: {}", request.command, e);
            1
        }
        Err(_) => {
            log::debug!(
                "`{}` timed out after {}ms, killing",
                request.command,
                request.timeout_ms
            );
            if let Err(e) = child.kill().await {
                log::debug!("failed to kill `{}`: {}", request.command, e);
            }
            TIMEOUT_STATUS
        }
    };

    ExecuteOutput {
        stdout: collect(stdout_reader).await,
        stderr: collect(stderr_reader).await,
        status,
    }
}

async fn read_to_string<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    // Partial output is still useful when the read is cut short.
    let _ = pipe.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).to_string()
}

async fn collect(reader: tokio::task::JoinHandle<String>) -> String {
    let abort = reader.abort_handle();
    match timeout(READER_GRACE, reader).await {
        Ok(Ok(output)) => output,
        Ok(Err(_)) => String::new(),
        Err(_) => {
            abort.abort();
            String::new()
        }
    }
}
