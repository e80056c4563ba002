//! Execution of external `git` commands.
//!
//! Every interaction with a repository goes through a [`Runner`], so the
//! pipeline can be driven against a stub in tests.
use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

/// A single `git` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Arguments passed to the git binary.
    pub args: Vec<String>,
    /// Working directory of the process.
    pub dir: PathBuf,
    /// Environment variables set on top of the inherited environment.
    pub env: Vec<(String, OsString)>,
    /// Data written to the process' standard input.
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// The git subcommand, ie. the first argument that isn't a `-c` option.
    pub fn subcommand(&self) -> Option<&str> {
        let mut args = self.args.iter();

        while let Some(arg) = args.next() {
            if arg == "-c" {
                args.next();
            } else if !arg.starts_with('-') {
                return Some(arg);
            }
        }
        None
    }

    /// Value of an environment variable set on this invocation.
    pub fn var(&self, key: &str) -> Option<&OsString> {
        self.env.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The process could not be started.
    #[error("failed to spawn git: {0}")]
    Spawn(#[from] io::Error),

    /// The process exited unsuccessfully.
    #[error("{}", exit_message(.code, .stderr))]
    Failed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

fn exit_message(code: &Option<i32>, stderr: &str) -> String {
    match code {
        Some(code) => format!("git exited with code {}: {}", code, stderr.trim_end()),
        None => format!("git terminated by signal: {}", stderr.trim_end()),
    }
}

impl RunError {
    /// Diagnostic text of the failure, as reported by git.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Spawn(err) => err.to_string(),
            Self::Failed { stdout, stderr, .. } => {
                if stderr.trim().is_empty() {
                    stdout.trim_end().to_owned()
                } else {
                    stderr.trim_end().to_owned()
                }
            }
        }
    }
}

/// Runs git commands.
pub trait Runner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> Result<Output, RunError>;
}

/// Runs the real git binary.
#[derive(Debug, Clone)]
pub struct Git {
    program: PathBuf,
}

impl Default for Git {
    fn default() -> Self {
        Self::new("git")
    }
}

impl Git {
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }

    /// Output of `git version`.
    pub fn version(&self) -> Result<String, RunError> {
        let output = self.run(&Invocation::new(".").arg("version"))?;

        Ok(output.stdout.trim().to_owned())
    }
}

impl Runner for Git {
    fn run(&self, invocation: &Invocation) -> Result<Output, RunError> {
        let started = Instant::now();
        let mut cmd = Command::new(&self.program);

        cmd.args(&invocation.args)
            .current_dir(&invocation.dir)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = cmd.spawn()?;

        if let Some(input) = &invocation.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                // A broken pipe means git exited early; its status tells us why.
                match stdin.write_all(input.as_bytes()) {
                    Err(err) if err.kind() != io::ErrorKind::BrokenPipe => return Err(err.into()),
                    _ => {}
                }
            }
        }
        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            tracing::debug!(
                "ran successfully {:?} ({:?})\nOUT: {}",
                invocation.args,
                started.elapsed(),
                stdout.trim_end()
            );
            Ok(Output { stdout, stderr })
        } else {
            tracing::warn!(
                "command {:?} failed ({:?}): {}\nOUT: {}",
                invocation.args,
                started.elapsed(),
                output.status,
                stderr.trim_end()
            );
            Err(RunError::Failed {
                code: output.status.code(),
                stdout,
                stderr,
            })
        }
    }
}
