/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/mod.rs
 *
 * Defines the `Provisioner` trait and the ordered set of installers that make
 * a bare host ready for kubeadm. Each installer is idempotent: running it on
 * an already provisioned host rewrites the same files and restarts the same
 * units.
 *
 * SPDX-License-Identifier: Apache-2.0 */

pub mod cilium;
pub mod cni;
pub mod common;
pub mod containerd;
pub mod crictl;
pub mod host_prep;
pub mod kubernetes;

use crate::config::BootstrapConfig;
use crate::error::{LifecycleError, Result};
use crate::exec::{CommandRunner, CommandSpec};
use crate::layout::HostLayout;
use async_trait::async_trait;
use std::sync::Arc;

/// An installer for one piece of node software.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Short name used in logs, e.g. `containerd`.
    fn name(&self) -> &'static str;

    async fn install(&self) -> Result<()>;
}

/// Everything an installer needs, shared by all of them.
pub struct ProvisionContext {
    pub runner: Arc<dyn CommandRunner>,
    pub layout: HostLayout,
    pub config: BootstrapConfig,
    /// Debian architecture name, e.g. `amd64` or `arm64`.
    pub arch: String,
}

/// All installers in the order they must run.
pub fn default_provisioners(ctx: Arc<ProvisionContext>) -> Vec<Box<dyn Provisioner>> {
    vec![
        Box::new(host_prep::HostPrepProvisioner::new(ctx.clone())),
        Box::new(containerd::ContainerdProvisioner::new(ctx.clone())),
        Box::new(cni::CniPluginsProvisioner::new(ctx.clone())),
        Box::new(crictl::CrictlProvisioner::new(ctx.clone())),
        Box::new(kubernetes::KubernetesProvisioner::new(ctx.clone())),
        Box::new(cilium::CiliumCliProvisioner::new(ctx)),
    ]
}

/// Asks dpkg for the machine architecture.
pub async fn detect_architecture(runner: &dyn CommandRunner) -> Result<String> {
    let output = runner
        .run(&CommandSpec::new("dpkg").arg("--print-architecture").capture())
        .await?;
    let arch = output.stdout.trim().to_string();
    if arch.is_empty() || arch.contains(char::is_whitespace) {
        return Err(LifecycleError::UnexpectedOutput(format!(
            "dpkg reported an unusable architecture: {:?}",
            output.stdout
        )));
    }
    Ok(arch)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::exec::testing::RecordingRunner;
    use tempfile::TempDir;

    pub(crate) fn context(runner: Arc<RecordingRunner>, dir: &TempDir) -> Arc<ProvisionContext> {
        Arc::new(ProvisionContext {
            runner,
            layout: HostLayout::new(dir.path()),
            config: sample_config(),
            arch: "amd64".to_string(),
        })
    }

    #[test]
    fn provisioners_run_runtime_before_kube_tooling() {
        let dir = TempDir::new().unwrap();
        let names: Vec<_> = default_provisioners(context(Arc::new(RecordingRunner::new()), &dir))
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(
            names,
            vec!["host-prep", "containerd", "cni-plugins", "crictl", "kubernetes", "cilium-cli"]
        );
    }

    #[tokio::test]
    async fn architecture_comes_from_dpkg() {
        let runner = RecordingRunner::new().reply("dpkg --print-architecture", "arm64\n");
        assert_eq!(detect_architecture(&runner).await.unwrap(), "arm64");
    }

    #[tokio::test]
    async fn empty_architecture_is_rejected() {
        let runner = RecordingRunner::new();
        assert!(detect_architecture(&runner).await.is_err());
    }
}
