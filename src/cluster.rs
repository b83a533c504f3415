/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/cluster.rs
 *
 * Privileged operations against a running control plane: issuing join
 * tokens, deleting node records and toggling the control-plane scheduling
 * taint. `ClusterAdmin` drives `kubeadm`/`kubectl` through any
 * `CommandRunner`, so the same code serves the local control plane (right
 * after `kubeadm init`) and a remote one reached over SSH.
 *
 * Both mutations are idempotent by construction: the node is read first and
 * the mutating command is only issued when the desired state differs.
 *
 * SPDX-License-Identifier: Apache-2.0 */

use crate::error::{LifecycleError, Result};
use crate::exec::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use std::fmt;
use tracing::{debug, info};

pub const ADMIN_KUBECONFIG: &str = "/etc/kubernetes/admin.conf";
pub const CONTROL_PLANE_TAINT_KEY: &str = "node-role.kubernetes.io/control-plane";
pub const CONTROL_PLANE_TAINT_EFFECT: &str = "NoSchedule";
pub const JOIN_TOKEN_TTL: &str = "24h";

/// A parsed `kubeadm join` command. Not `Clone`: a token is fetched for one
/// join and consumed by it.
#[derive(PartialEq, Eq)]
pub struct JoinToken {
    api_server: String,
    token: String,
    ca_cert_hash: String,
}

impl JoinToken {
    /// Parses the output of `kubeadm token create --print-join-command`.
    /// Anything printed before the join line (warnings) is ignored.
    pub fn parse(output: &str) -> Result<Self> {
        let line = output
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| line.starts_with("kubeadm join"))
            .ok_or_else(|| {
                LifecycleError::UnexpectedOutput("no `kubeadm join` command in output".to_string())
            })?;

        let words = shell_words::split(line)
            .map_err(|e| LifecycleError::UnexpectedOutput(format!("malformed join command: {e}")))?;

        let mut api_server = None;
        let mut token = None;
        let mut ca_cert_hash = None;
        let mut rest = words.iter().skip(2);
        while let Some(word) = rest.next() {
            let (flag, inline) = match word.split_once('=') {
                Some((flag, value)) if word.starts_with("--") => (flag, Some(value.to_string())),
                _ => (word.as_str(), None),
            };
            match flag {
                "--token" => token = inline.or_else(|| rest.next().cloned()),
                "--discovery-token-ca-cert-hash" => {
                    ca_cert_hash = inline.or_else(|| rest.next().cloned())
                }
                flag if flag.starts_with("--") => {}
                positional => {
                    if api_server.is_none() {
                        api_server = Some(positional.to_string());
                    }
                }
            }
        }

        let missing = |what: &str| {
            LifecycleError::UnexpectedOutput(format!("join command is missing the {what}"))
        };
        let api_server = api_server.ok_or_else(|| missing("API server endpoint"))?;
        let token = token.filter(|t| !t.is_empty()).ok_or_else(|| missing("token"))?;
        let ca_cert_hash = ca_cert_hash
            .filter(|h| h.starts_with("sha256:"))
            .ok_or_else(|| missing("sha256 CA certificate hash"))?;

        Ok(JoinToken {
            api_server,
            token,
            ca_cert_hash,
        })
    }

    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    /// The arguments for the local `kubeadm` invocation. Consumes the token.
    pub fn into_join_args(self) -> Vec<String> {
        vec![
            "join".to_string(),
            self.api_server,
            "--token".to_string(),
            self.token,
            "--discovery-token-ca-cert-hash".to_string(),
            self.ca_cert_hash,
        ]
    }
}

impl fmt::Debug for JoinToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinToken")
            .field("api_server", &self.api_server)
            .field("token", &"<redacted>")
            .field("ca_cert_hash", &self.ca_cert_hash)
            .finish()
    }
}

/// The operations a worker needs from the control-plane node.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Kubernetes node name of the host this client talks to. Workers taint
    /// and untaint this node, not themselves: the taint keeps workloads off
    /// the control plane once a worker exists.
    async fn node_name(&self) -> Result<String>;

    /// A freshly generated join command, valid for 24 hours.
    async fn get_join_token(&self) -> Result<JoinToken>;

    /// Postcondition: no node named `hostname` is registered. Succeeds when it
    /// is already gone.
    async fn delete_node(&self, hostname: &str) -> Result<()>;

    /// Postcondition: the control-plane `NoSchedule` taint on `hostname` is
    /// present iff `present`. Repeating a call changes nothing.
    async fn set_taint(&self, hostname: &str, present: bool) -> Result<()>;
}

/// `kubeadm`/`kubectl` against the admin kubeconfig of a control-plane host.
pub struct ClusterAdmin<R> {
    runner: R,
    kubeconfig: String,
}

impl<R: CommandRunner> ClusterAdmin<R> {
    pub fn new(runner: R) -> Self {
        ClusterAdmin {
            runner,
            kubeconfig: ADMIN_KUBECONFIG.to_string(),
        }
    }

    fn kubectl(&self) -> CommandSpec {
        CommandSpec::new("kubectl").args(["--kubeconfig", self.kubeconfig.as_str()])
    }

    /// The node object, or `None` if no such node is registered.
    pub async fn get_node(&self, name: &str) -> Result<Option<Node>> {
        let output = self
            .runner
            .run(
                &self
                    .kubectl()
                    .args(["get", "node", name, "--ignore-not-found", "-o", "json"])
                    .capture(),
            )
            .await?;
        if output.stdout.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&output.stdout).map(Some).map_err(|e| {
            LifecycleError::UnexpectedOutput(format!("cannot parse node {name}: {e}"))
        })
    }
}

/// Whether the node carries the control-plane taint with the given effect,
/// or with any effect when `effect` is `None`.
pub fn has_control_plane_taint(node: &Node, effect: Option<&str>) -> bool {
    node.spec
        .as_ref()
        .and_then(|spec| spec.taints.as_ref())
        .map_or(false, |taints| {
            taints.iter().any(|taint| {
                taint.key == CONTROL_PLANE_TAINT_KEY && effect.map_or(true, |e| taint.effect == e)
            })
        })
}

#[async_trait]
impl<R: CommandRunner> ControlPlaneClient for ClusterAdmin<R> {
    async fn node_name(&self) -> Result<String> {
        let output = self
            .runner
            .run(&CommandSpec::new("hostname").capture())
            .await?;
        let name = output.stdout.trim().to_lowercase();
        if name.is_empty() {
            return Err(LifecycleError::UnexpectedOutput(
                "`hostname` printed nothing".to_string(),
            ));
        }
        Ok(name)
    }

    async fn get_join_token(&self) -> Result<JoinToken> {
        let output = self
            .runner
            .run(
                &CommandSpec::new("kubeadm")
                    .args(["token", "create", "--print-join-command", "--ttl", JOIN_TOKEN_TTL])
                    .capture(),
            )
            .await?;
        let token = JoinToken::parse(&output.stdout)?;
        info!(api_server = %token.api_server(), "obtained join token");
        Ok(token)
    }

    async fn delete_node(&self, hostname: &str) -> Result<()> {
        if self.get_node(hostname).await?.is_none() {
            info!(node = hostname, "node is not registered, nothing to delete");
            return Ok(());
        }
        self.runner
            .run(&self.kubectl().args(["delete", "node", hostname]))
            .await?;
        info!(node = hostname, "deleted node from the cluster");
        Ok(())
    }

    async fn set_taint(&self, hostname: &str, present: bool) -> Result<()> {
        let node = match self.get_node(hostname).await? {
            Some(node) => node,
            None if present => {
                return Err(LifecycleError::UnexpectedOutput(format!(
                    "cannot taint node {hostname}: it is not registered"
                )))
            }
            None => {
                debug!(node = hostname, "node is not registered, no taint to remove");
                return Ok(());
            }
        };

        let taint = if present {
            if has_control_plane_taint(&node, Some(CONTROL_PLANE_TAINT_EFFECT)) {
                debug!(node = hostname, "control-plane taint already present");
                return Ok(());
            }
            format!("{CONTROL_PLANE_TAINT_KEY}:{CONTROL_PLANE_TAINT_EFFECT}")
        } else {
            if !has_control_plane_taint(&node, None) {
                debug!(node = hostname, "control-plane taint already absent");
                return Ok(());
            }
            format!("{CONTROL_PLANE_TAINT_KEY}-")
        };

        let mut spec = self.kubectl().args(["taint", "nodes", hostname, taint.as_str()]);
        if present {
            spec = spec.arg("--overwrite");
        }
        self.runner.run(&spec).await?;
        info!(node = hostname, present, "updated control-plane taint");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::{exit_failure, RecordingRunner};
    use crate::exec::CommandOutput;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const JOIN_OUTPUT: &str = "kubeadm join 10.0.0.5:6443 --token abcdef.0123456789abcdef \
        --discovery-token-ca-cert-hash sha256:1234abcd \n";

    #[test]
    fn parses_printed_join_command() {
        let token = JoinToken::parse(JOIN_OUTPUT).unwrap();
        assert_eq!(token.api_server(), "10.0.0.5:6443");
        assert_eq!(
            token.into_join_args(),
            vec![
                "join",
                "10.0.0.5:6443",
                "--token",
                "abcdef.0123456789abcdef",
                "--discovery-token-ca-cert-hash",
                "sha256:1234abcd",
            ]
        );
    }

    #[test]
    fn parses_inline_flag_values_after_warnings() {
        let output = "W0101 12:00:00 some warning\n\
            kubeadm join cp.local:6443 --token=t.1 --discovery-token-ca-cert-hash=sha256:ff\n";
        let token = JoinToken::parse(output).unwrap();
        assert_eq!(token.api_server(), "cp.local:6443");
        assert_eq!(token.into_join_args()[3], "t.1");
    }

    #[test]
    fn rejects_join_commands_without_token_or_hash() {
        assert!(JoinToken::parse("").is_err());
        assert!(JoinToken::parse("kubeadm join 10.0.0.5:6443 --token abc").is_err());
        assert!(JoinToken::parse(
            "kubeadm join 10.0.0.5:6443 --discovery-token-ca-cert-hash sha256:aa"
        )
        .is_err());
        assert!(JoinToken::parse(
            "kubeadm join 10.0.0.5:6443 --token abc --discovery-token-ca-cert-hash md5:aa"
        )
        .is_err());
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let token = JoinToken::parse(JOIN_OUTPUT).unwrap();
        assert!(!format!("{token:?}").contains("abcdef.0123456789abcdef"));
    }

    /// A tiny stand-in for the API server: interprets the kubectl commands
    /// `ClusterAdmin` issues and keeps node taints in memory.
    #[derive(Default)]
    struct FakeApiServer {
        nodes: Mutex<BTreeMap<String, Vec<(String, String)>>>,
        mutations: Mutex<Vec<String>>,
    }

    impl FakeApiServer {
        fn with_node(name: &str, taints: &[(&str, &str)]) -> Self {
            let server = FakeApiServer::default();
            server.nodes.lock().unwrap().insert(
                name.to_string(),
                taints
                    .iter()
                    .map(|(k, e)| (k.to_string(), e.to_string()))
                    .collect(),
            );
            server
        }

        fn taints(&self, name: &str) -> Option<Vec<(String, String)>> {
            self.nodes.lock().unwrap().get(name).cloned()
        }

        fn mutations(&self) -> Vec<String> {
            self.mutations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeApiServer {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            assert_eq!(spec.program, "kubectl");
            assert_eq!(&spec.args[..2], ["--kubeconfig", ADMIN_KUBECONFIG]);
            let args: Vec<&str> = spec.args[2..].iter().map(String::as_str).collect();
            let mut nodes = self.nodes.lock().unwrap();
            match args.as_slice() {
                ["get", "node", name, ..] => {
                    let stdout = match nodes.get(*name) {
                        None => String::new(),
                        Some(taints) => {
                            let taints: Vec<_> = taints
                                .iter()
                                .map(|(key, effect)| json!({"key": key, "effect": effect}))
                                .collect();
                            json!({
                                "apiVersion": "v1",
                                "kind": "Node",
                                "metadata": {"name": name},
                                "spec": {"taints": taints},
                            })
                            .to_string()
                        }
                    };
                    Ok(CommandOutput { stdout })
                }
                ["delete", "node", name] => {
                    self.mutations.lock().unwrap().push(spec.display());
                    match nodes.remove(*name) {
                        Some(_) => Ok(CommandOutput::default()),
                        None => Err(LifecycleError::ExternalCommandFailure {
                            command: spec.display(),
                            status: exit_failure(),
                        }),
                    }
                }
                ["taint", "nodes", name, taint, rest @ ..] => {
                    self.mutations.lock().unwrap().push(spec.display());
                    let taints = nodes.get_mut(*name).expect("taint on unknown node");
                    if let Some(key) = taint.strip_suffix('-') {
                        taints.retain(|(k, _)| k != key);
                    } else {
                        let (key, effect) = taint.split_once(':').unwrap();
                        if rest.contains(&"--overwrite") {
                            taints.retain(|(k, e)| !(k == key && e == effect));
                        }
                        taints.push((key.to_string(), effect.to_string()));
                    }
                    Ok(CommandOutput::default())
                }
                other => panic!("unexpected kubectl call: {other:?}"),
            }
        }
    }

    fn tainted(server: &FakeApiServer, node: &str) -> bool {
        server
            .taints(node)
            .unwrap()
            .iter()
            .any(|(k, _)| k == CONTROL_PLANE_TAINT_KEY)
    }

    #[tokio::test]
    async fn add_then_remove_taint_leaves_no_taint() {
        let admin = ClusterAdmin::new(FakeApiServer::with_node("cp-1", &[]));

        admin.set_taint("cp-1", true).await.unwrap();
        assert!(tainted(&admin.runner, "cp-1"));

        admin.set_taint("cp-1", false).await.unwrap();
        assert!(!tainted(&admin.runner, "cp-1"));
        assert_eq!(admin.runner.mutations().len(), 2);
    }

    #[tokio::test]
    async fn repeated_taint_calls_are_no_ops() {
        let admin = ClusterAdmin::new(FakeApiServer::with_node("cp-1", &[]));

        admin.set_taint("cp-1", true).await.unwrap();
        admin.set_taint("cp-1", true).await.unwrap();
        assert_eq!(admin.runner.mutations().len(), 1);
        assert_eq!(admin.runner.taints("cp-1").unwrap().len(), 1);

        admin.set_taint("cp-1", false).await.unwrap();
        admin.set_taint("cp-1", false).await.unwrap();
        assert_eq!(admin.runner.mutations().len(), 2);
    }

    #[tokio::test]
    async fn taint_add_uses_overwrite_and_removal_strips_every_effect() {
        let admin = ClusterAdmin::new(FakeApiServer::with_node(
            "cp-1",
            &[(CONTROL_PLANE_TAINT_KEY, "PreferNoSchedule")],
        ));

        admin.set_taint("cp-1", true).await.unwrap();
        assert!(admin.runner.mutations()[0].ends_with(
            "taint nodes cp-1 node-role.kubernetes.io/control-plane:NoSchedule --overwrite"
        ));

        admin.set_taint("cp-1", false).await.unwrap();
        assert!(admin.runner.taints("cp-1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn removing_taint_from_unknown_node_succeeds_but_adding_fails() {
        let admin = ClusterAdmin::new(FakeApiServer::default());
        admin.set_taint("ghost", false).await.unwrap();
        assert!(admin.set_taint("ghost", true).await.is_err());
        assert!(admin.runner.mutations().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_missing_node_succeeds_without_mutation() {
        let admin = ClusterAdmin::new(FakeApiServer::default());
        admin.delete_node("worker-1").await.unwrap();
        assert!(admin.runner.mutations().is_empty());
    }

    #[tokio::test]
    async fn deleting_an_existing_node_removes_it_once() {
        let admin = ClusterAdmin::new(FakeApiServer::with_node("worker-1", &[]));
        admin.delete_node("worker-1").await.unwrap();
        admin.delete_node("worker-1").await.unwrap();
        assert!(admin.runner.taints("worker-1").is_none());
        assert_eq!(admin.runner.mutations().len(), 1);
    }

    #[tokio::test]
    async fn join_token_is_requested_with_24h_ttl() {
        let admin =
            ClusterAdmin::new(RecordingRunner::new().reply("kubeadm token create", JOIN_OUTPUT));
        let token = admin.get_join_token().await.unwrap();
        assert_eq!(token.api_server(), "10.0.0.5:6443");
        assert_eq!(
            admin.runner.commands(),
            vec!["kubeadm token create --print-join-command --ttl 24h"]
        );
        assert!(admin.runner.calls()[0].capture);
    }

    #[tokio::test]
    async fn node_name_is_lowercased_hostname() {
        let admin = ClusterAdmin::new(RecordingRunner::new().reply("hostname", "CP-One\n"));
        assert_eq!(admin.node_name().await.unwrap(), "cp-one");

        let silent = ClusterAdmin::new(RecordingRunner::new());
        assert!(silent.node_name().await.is_err());
    }

    #[tokio::test]
    async fn unparseable_node_json_is_reported() {
        let admin = ClusterAdmin::new(RecordingRunner::new().reply("get node", "not json"));
        assert!(matches!(
            admin.get_node("cp-1").await,
            Err(LifecycleError::UnexpectedOutput(_))
        ));
    }
}
