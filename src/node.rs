/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/node.rs
 *
 * Cluster actions performed on this host: `kubeadm init`, `kubeadm join`,
 * `kubeadm reset`, installing the cilium CNI and handing out the admin
 * kubeconfig. The lifecycle controller only sees the `LocalNode` trait.
 *
 * SPDX-License-Identifier: Apache-2.0 */

use crate::cluster::{ClusterAdmin, ControlPlaneClient, JoinToken, ADMIN_KUBECONFIG};
use crate::config::BootstrapConfig;
use crate::error::{LifecycleError, Result};
use crate::exec::{CommandRunner, CommandSpec};
use crate::kubeconfig;
use crate::layout::HostLayout;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

pub const CNI_CONFIG_DIR: &str = "/etc/cni/net.d";

#[async_trait]
pub trait LocalNode: Send + Sync {
    /// The name this host registers under in the cluster.
    async fn hostname(&self) -> Result<String>;
    async fn init_control_plane(&self) -> Result<()>;
    async fn install_admin_kubeconfig(&self) -> Result<Vec<PathBuf>>;
    async fn install_cni(&self) -> Result<()>;
    /// Taint management against the control plane running on this host.
    async fn set_taint(&self, hostname: &str, present: bool) -> Result<()>;
    async fn join(&self, token: JoinToken) -> Result<()>;
    async fn reset(&self) -> Result<()>;
}

/// Flags for `kubeadm init`, taken from the bootstrap config when present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitOptions {
    pub kubernetes_version: Option<String>,
    pub pod_network_cidr: Option<String>,
}

impl From<&BootstrapConfig> for InitOptions {
    fn from(config: &BootstrapConfig) -> Self {
        InitOptions {
            kubernetes_version: Some(config.kubernetes_version.clone()),
            pod_network_cidr: config.pod_network_cidr.clone(),
        }
    }
}

/// `LocalNode` backed by the real host.
pub struct HostNode<R> {
    admin: ClusterAdmin<R>,
    runner: R,
    layout: HostLayout,
    init: InitOptions,
}

impl<R: CommandRunner + Clone> HostNode<R> {
    pub fn new(runner: R, layout: HostLayout) -> Self {
        HostNode {
            admin: ClusterAdmin::new(runner.clone()),
            runner,
            layout,
            init: InitOptions::default(),
        }
    }

    pub fn with_init_options(mut self, init: InitOptions) -> Self {
        self.init = init;
        self
    }

    fn init_command(&self) -> CommandSpec {
        let mut spec = CommandSpec::new("kubeadm").arg("init");
        if let Some(version) = &self.init.kubernetes_version {
            spec = spec.args(["--kubernetes-version", version.as_str()]);
        }
        if let Some(cidr) = &self.init.pod_network_cidr {
            spec = spec.args(["--pod-network-cidr", cidr.as_str()]);
        }
        spec
    }
}

#[async_trait]
impl<R: CommandRunner + Clone> LocalNode for HostNode<R> {
    async fn hostname(&self) -> Result<String> {
        self.admin.node_name().await
    }

    async fn init_control_plane(&self) -> Result<()> {
        info!("initialising control plane with kubeadm");
        self.runner.run(&self.init_command()).await?;
        Ok(())
    }

    async fn install_admin_kubeconfig(&self) -> Result<Vec<PathBuf>> {
        kubeconfig::distribute_admin_kubeconfig(&self.layout).await
    }

    async fn install_cni(&self) -> Result<()> {
        info!("installing cilium");
        self.runner
            .run(&CommandSpec::new("cilium").arg("install").env("KUBECONFIG", ADMIN_KUBECONFIG))
            .await?;
        self.runner
            .run(
                &CommandSpec::new("cilium")
                    .args(["status", "--wait"])
                    .env("KUBECONFIG", ADMIN_KUBECONFIG),
            )
            .await?;
        Ok(())
    }

    async fn set_taint(&self, hostname: &str, present: bool) -> Result<()> {
        self.admin.set_taint(hostname, present).await
    }

    async fn join(&self, token: JoinToken) -> Result<()> {
        info!(api_server = %token.api_server(), "joining cluster");
        self.runner
            .run(&CommandSpec::new("kubeadm").args(token.into_join_args()))
            .await?;
        Ok(())
    }

    async fn reset(&self) -> Result<()> {
        info!("resetting node with kubeadm");
        self.runner
            .run(&CommandSpec::new("kubeadm").args(["reset", "-f"]))
            .await?;

        let cni_dir = self.layout.path(CNI_CONFIG_DIR);
        match tokio::fs::remove_dir_all(&cni_dir).await {
            Ok(()) => info!(path = %cni_dir.display(), "removed CNI configuration"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(LifecycleError::io(&cni_dir, e)),
        }
        Ok(())
    }
}
