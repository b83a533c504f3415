/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/ssh.rs
 *
 * The remote shell transport to the control-plane host. `SshRunner` wraps
 * another `CommandRunner` and rewrites every command into an `sshpass`/`ssh`
 * invocation that runs it under `sudo` on the remote side.
 *
 * The credential travels in the SSHPASS environment variable (for ssh) and
 * on stdin (for `sudo -S`); it never appears in argv or in a log line.
 *
 * SPDX-License-Identifier: Apache-2.0 */

use crate::error::{LifecycleError, Result};
use crate::exec::{CommandOutput, CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::fmt;
use tracing::debug;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Where the control plane lives and how to log in to it.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    host: String,
    port: u16,
    username: String,
    credential: String,
}

impl RemoteEndpoint {
    /// Host, username and credential must all be non-empty.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<Self> {
        let endpoint = RemoteEndpoint {
            host: host.into().trim().to_string(),
            port,
            username: username.into().trim().to_string(),
            credential: credential.into(),
        };

        let mut missing = Vec::new();
        if endpoint.host.is_empty() {
            missing.push("host (-h)");
        }
        if endpoint.username.is_empty() {
            missing.push("username (-u)");
        }
        if endpoint.credential.is_empty() {
            missing.push("credential (-s)");
        }
        if !missing.is_empty() {
            return Err(LifecycleError::InvalidParameters(format!(
                "worker role requires {}",
                missing.join(", ")
            )));
        }
        if port == 0 {
            return Err(LifecycleError::InvalidParameters(
                "ssh port must be between 1 and 65535".to_string(),
            ));
        }

        Ok(endpoint)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// `user@host`, as ssh expects it.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

impl fmt::Debug for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("credential", &"<redacted>")
            .finish()
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.destination(), self.port)
    }
}

/// Runs commands on the control-plane host through `sshpass` + `ssh`.
pub struct SshRunner<R> {
    endpoint: RemoteEndpoint,
    inner: R,
}

impl<R: CommandRunner> SshRunner<R> {
    pub fn new(endpoint: RemoteEndpoint, inner: R) -> Self {
        SshRunner { endpoint, inner }
    }

    /// Like `new`, but first makes sure `sshpass` and `ssh` are installed so
    /// a worker fails before provisioning rather than after.
    pub fn connect(endpoint: RemoteEndpoint, inner: R) -> Result<Self> {
        for tool in ["sshpass", "ssh"] {
            which::which(tool).map_err(|_| LifecycleError::ToolMissing(tool))?;
        }
        Ok(Self::new(endpoint, inner))
    }

    /// Rewrites `spec` into the local command that runs it remotely.
    pub fn wrap(&self, spec: &CommandSpec) -> CommandSpec {
        let mut remote: Vec<&str> = vec!["sudo", "-S", "-p", ""];
        if !spec.env.is_empty() {
            remote.push("env");
        }
        let assignments: Vec<String> = spec
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        remote.extend(assignments.iter().map(String::as_str));
        remote.push(&spec.program);
        remote.extend(spec.args.iter().map(String::as_str));
        let remote_command = shell_words::join(remote);

        let mut stdin = format!("{}\n", self.endpoint.credential);
        if let Some(input) = &spec.stdin {
            stdin.push_str(input);
        }

        let port = self.endpoint.port.to_string();
        let wrapped = CommandSpec::new("sshpass")
            .args(["-e", "ssh", "-p", port.as_str()])
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "LogLevel=ERROR"])
            .arg(self.endpoint.destination())
            .arg("--")
            .arg(remote_command)
            .env("SSHPASS", self.endpoint.credential.as_str())
            .stdin(stdin);
        if spec.capture {
            wrapped.capture()
        } else {
            wrapped
        }
    }
}

#[async_trait]
impl<R: CommandRunner> CommandRunner for SshRunner<R> {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!(endpoint = %self.endpoint, command = %spec.display(), "running remote command");
        self.inner.run(&self.wrap(spec)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::RecordingRunner;

    fn endpoint() -> RemoteEndpoint {
        RemoteEndpoint::new("10.0.0.5", 22, "ubuntu", "pw").unwrap()
    }

    #[test]
    fn rejects_missing_worker_fields() {
        let err = RemoteEndpoint::new("", 22, "ubuntu", "").unwrap_err();
        match err {
            LifecycleError::InvalidParameters(msg) => {
                assert!(msg.contains("host"));
                assert!(msg.contains("credential"));
                assert!(!msg.contains("username"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_whitespace_host_and_port_zero() {
        assert!(RemoteEndpoint::new("   ", 22, "ubuntu", "pw").is_err());
        assert!(RemoteEndpoint::new("10.0.0.5", 0, "ubuntu", "pw").is_err());
    }

    #[test]
    fn debug_output_redacts_the_credential() {
        let printed = format!("{:?}", RemoteEndpoint::new("cp", 2222, "admin", "s3cret").unwrap());
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("2222"));
    }

    #[test]
    fn wrap_runs_command_under_sudo_without_credential_in_argv() {
        let ssh = SshRunner::new(endpoint(), RecordingRunner::new());
        let wrapped = ssh.wrap(
            &CommandSpec::new("kubeadm")
                .args(["token", "create", "--print-join-command"])
                .capture(),
        );

        assert_eq!(wrapped.program, "sshpass");
        assert_eq!(wrapped.args[0], "-e");
        assert!(wrapped.args.contains(&"ubuntu@10.0.0.5".to_string()));
        assert_eq!(
            wrapped.args.last().unwrap(),
            "sudo -S -p '' kubeadm token create --print-join-command"
        );
        assert!(wrapped.capture);
        assert!(wrapped.args.iter().all(|arg| !arg.contains("pw")));
        assert_eq!(wrapped.env, vec![("SSHPASS".to_string(), "pw".to_string())]);
        assert_eq!(wrapped.stdin.as_deref(), Some("pw\n"));
    }

    #[test]
    fn wrap_forwards_env_and_custom_port() {
        let endpoint = RemoteEndpoint::new("cp.internal", 2222, "ops", "pw").unwrap();
        let ssh = SshRunner::new(endpoint, RecordingRunner::new());
        let wrapped = ssh.wrap(
            &CommandSpec::new("cilium")
                .arg("status")
                .env("KUBECONFIG", "/etc/kubernetes/admin.conf"),
        );

        let port_at = wrapped.args.iter().position(|a| a == "-p").unwrap();
        assert_eq!(wrapped.args[port_at + 1], "2222");
        let remote = wrapped.args.last().unwrap();
        assert!(remote.starts_with("sudo -S -p '' env "));
        assert!(remote.contains("KUBECONFIG=/etc/kubernetes/admin.conf"));
        assert!(remote.ends_with("cilium status"));
    }

    #[tokio::test]
    async fn run_delegates_the_wrapped_command() {
        let ssh = SshRunner::new(endpoint(), RecordingRunner::new().reply("hostname", "cp-1\n"));
        let out = ssh
            .run(&CommandSpec::new("hostname").capture())
            .await
            .unwrap();
        assert_eq!(out.stdout, "cp-1\n");
        let calls = ssh.inner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "sshpass");
    }
}
