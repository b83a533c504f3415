/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/exec.rs
 *
 * Every external process the tool starts (kubeadm, kubectl, curl, tar,
 * systemctl, ssh) goes through the `CommandRunner` trait. `HostRunner` runs
 * the command on this machine; `SshRunner` (see ssh.rs) wraps another runner
 * to run it on the control plane instead.
 *
 * stderr is always inherited so tool errors reach the terminal verbatim.
 * stdout is inherited as well unless the caller asks to capture it.
 *
 * SPDX-License-Identifier: Apache-2.0 */

use crate::error::{LifecycleError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment variables. Never logged.
    pub env: Vec<(String, String)>,
    /// Data written to the child's stdin. Never logged.
    pub stdin: Option<String>,
    /// Capture stdout instead of streaming it to the terminal.
    pub capture: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        CommandSpec {
            program: program.into(),
            ..Default::default()
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// The command line as a shell would read it. Environment and stdin are
    /// left out so secrets never end up in logs or error messages.
    pub fn display(&self) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 1);
        words.push(self.program.as_str());
        words.extend(self.args.iter().map(String::as_str));
        shell_words::join(words)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Captured stdout. Empty when the command streamed to the terminal.
    pub stdout: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs the command to completion. A non-zero exit is an error.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

#[async_trait]
impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        (**self).run(spec).await
    }
}

/// Runs commands on the local machine with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostRunner;

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(command = %spec.display(), "running external command");

        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        command.stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        command.stdout(if spec.capture {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });
        command.stderr(Stdio::inherit());

        let mut child = command.spawn().map_err(|source| LifecycleError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        if let (Some(input), Some(mut pipe)) = (spec.stdin.as_deref(), child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|source| LifecycleError::Spawn {
                    program: spec.program.clone(),
                    source,
                })?;
            // Dropping the handle closes stdin so the child sees EOF.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| LifecycleError::Spawn {
                program: spec.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(LifecycleError::ExternalCommandFailure {
                command: spec.display(),
                status: output.status,
            });
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}
