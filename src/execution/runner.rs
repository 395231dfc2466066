//! Command runner - spawns step commands as subprocesses

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// A command to run for a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; the current directory when `None`
    pub cwd: Option<PathBuf>,
    /// Environment added on top of the runner's own
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Program and arguments as one line, for logs
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `-1` when the process was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let mut out = self.stdout.clone();
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&self.stderr);
                out
            }
        }
    }
}

/// Output of running commands, shared so it survives a dropped future
///
/// Lines from stdout and stderr are appended in the order they are read.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    inner: Arc<Mutex<String>>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, text: &str) {
        self.lock().push_str(text);
    }

    /// Everything captured so far
    pub fn snapshot(&self) -> String {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Errors from the command runner
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The program could not be started
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Any other runner failure
    #[error("Runner error: {0}")]
    Internal(String),
}

/// Runs commands - allows a scripted runner in tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, RunnerError>;

    /// Like `run`, also appending output to `sink` as it is produced
    async fn run_captured(
        &self,
        command: &CommandSpec,
        sink: &OutputBuffer,
    ) -> Result<CommandOutput, RunnerError> {
        let output = self.run(command).await?;
        sink.push(&output.combined());
        Ok(output)
    }
}

/// Runs commands as local subprocesses
///
/// The child is killed when the returned future is dropped, so timeouts and
/// cancellation stop the process as well.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        self.run_captured(command, &OutputBuffer::new()).await
    }

    async fn run_captured(
        &self,
        command: &CommandSpec,
        sink: &OutputBuffer,
    ) -> Result<CommandOutput, RunnerError> {
        debug!("Spawning: {}", command.display());

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(&command.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            program: command.program.clone(),
            source,
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Internal("stdout pipe not available".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Internal("stderr pipe not available".to_string()))?;

        let (status, stdout, stderr) = tokio::join!(
            child.wait(),
            read_lines(stdout, sink),
            read_lines(stderr, sink)
        );
        let status = status.map_err(|e| {
            RunnerError::Internal(format!("waiting for '{}' failed: {}", command.program, e))
        })?;

        let exit_code = status.code().unwrap_or(-1);
        if exit_code != 0 {
            warn!("'{}' exited with code {}", command.program, exit_code);
        }

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

/// Read a pipe to EOF, mirroring each line into `sink`
async fn read_lines<T: AsyncRead + Unpin>(pipe: T, sink: &OutputBuffer) -> String {
    let mut reader = BufReader::new(pipe);
    let mut line = Vec::new();
    let mut collected = String::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                sink.push(&text);
                collected.push_str(&text);
            }
            Err(e) => {
                warn!("error reading command output: {}", e);
                break;
            }
        }
    }
    collected
}

#[async_trait]
impl<R: CommandRunner + ?Sized> CommandRunner for std::sync::Arc<R> {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        (**self).run(command).await
    }

    async fn run_captured(
        &self,
        command: &CommandSpec,
        sink: &OutputBuffer,
    ) -> Result<CommandOutput, RunnerError> {
        (**self).run_captured(command, sink).await
    }
}
