/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/lifecycle.rs
 *
 * The node lifecycle controller. A run is described by a role
 * (control plane or worker) and a desired count (1 = provisioned and
 * joined, 0 = removed and reset). `Transition::plan` validates those inputs
 * without touching anything; `NodeLifecycle::execute` then performs exactly
 * one of four transitions:
 *
 *   control plane, 1  provision, kubeadm init, kubeconfigs, CNI, untaint
 *   control plane, 0  local reset
 *   worker, 1         provision, fetch join token, join, taint control plane
 *   worker, 0         delete node record, untaint control plane, local reset
 *
 * The first failing step aborts the run. Nothing is rolled back; every step
 * is safe to repeat, so the remedy is to fix the cause and run again.
 *
 * The control-plane taint is only lifted while the control plane is the
 * sole node, so user workloads move off it once a worker joins.
 *
 * SPDX-License-Identifier: Apache-2.0 */

use crate::cluster::ControlPlaneClient;
use crate::error::{LifecycleError, Result};
use crate::node::LocalNode;
use crate::provisioners::Provisioner;
use crate::ssh::RemoteEndpoint;
use std::fmt;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

impl FromStr for NodeRole {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "controlplane" => Ok(NodeRole::ControlPlane),
            "worker" => Ok(NodeRole::Worker),
            other => Err(LifecycleError::InvalidParameters(format!(
                "unknown node type {other:?}, expected controlplane or worker"
            ))),
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeRole::ControlPlane => "controlplane",
            NodeRole::Worker => "worker",
        })
    }
}

/// How many instances of this node should exist: 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredCount {
    Absent,
    Present,
}

impl TryFrom<i64> for DesiredCount {
    type Error = LifecycleError;

    fn try_from(count: i64) -> Result<Self> {
        match count {
            0 => Ok(DesiredCount::Absent),
            1 => Ok(DesiredCount::Present),
            other => Err(LifecycleError::InvalidParameters(format!(
                "count must be 0 or 1, got {other}"
            ))),
        }
    }
}

impl FromStr for DesiredCount {
    type Err = LifecycleError;

    /// Only the literal spellings `0` and `1` are accepted.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "0" => Ok(DesiredCount::Absent),
            "1" => Ok(DesiredCount::Present),
            other => Err(LifecycleError::InvalidParameters(format!(
                "count must be 0 or 1, got {other:?}"
            ))),
        }
    }
}

/// A validated plan for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    InitControlPlane,
    ResetControlPlane,
    JoinWorker(RemoteEndpoint),
    RemoveWorker(RemoteEndpoint),
}

impl Transition {
    /// Pure validation: never touches the host. Workers must name the
    /// control plane they talk to; a control plane ignores any endpoint.
    pub fn plan(
        role: NodeRole,
        count: DesiredCount,
        endpoint: Option<RemoteEndpoint>,
    ) -> Result<Self> {
        match (role, count) {
            (NodeRole::ControlPlane, DesiredCount::Present) => Ok(Transition::InitControlPlane),
            (NodeRole::ControlPlane, DesiredCount::Absent) => Ok(Transition::ResetControlPlane),
            (NodeRole::Worker, count) => {
                let endpoint = endpoint.ok_or_else(|| {
                    LifecycleError::InvalidParameters(format!(
                        "{role} role requires host (-h), username (-u), credential (-s)"
                    ))
                })?;
                Ok(match count {
                    DesiredCount::Present => Transition::JoinWorker(endpoint),
                    DesiredCount::Absent => Transition::RemoveWorker(endpoint),
                })
            }
        }
    }

    /// Whether this transition runs the provisioners (and so needs the
    /// bootstrap configuration).
    pub fn provisions(&self) -> bool {
        matches!(self, Transition::InitControlPlane | Transition::JoinWorker(_))
    }
}

pub type Connector =
    Box<dyn Fn(&RemoteEndpoint) -> Result<Box<dyn ControlPlaneClient>> + Send + Sync>;

pub struct NodeLifecycle<L> {
    local: L,
    provisioners: Vec<Box<dyn Provisioner>>,
    connect: Connector,
}

impl<L: LocalNode> NodeLifecycle<L> {
    pub fn new(local: L, provisioners: Vec<Box<dyn Provisioner>>, connect: Connector) -> Self {
        NodeLifecycle {
            local,
            provisioners,
            connect,
        }
    }

    /// Validates the raw inputs, then executes the resulting transition.
    /// Invalid input fails before any provisioner or command runs.
    pub async fn apply(
        &self,
        role: NodeRole,
        count: i64,
        endpoint: Option<RemoteEndpoint>,
    ) -> Result<()> {
        let count = DesiredCount::try_from(count)?;
        self.execute(Transition::plan(role, count, endpoint)?).await
    }

    pub async fn execute(&self, transition: Transition) -> Result<()> {
        match transition {
            Transition::InitControlPlane => {
                self.provision().await?;
                self.local.init_control_plane().await?;
                self.local.install_admin_kubeconfig().await?;
                self.local.install_cni().await?;
                let hostname = self.local.hostname().await?;
                self.local.set_taint(&hostname, false).await?;
                info!(node = %hostname, "control plane ready and schedulable");
            }
            Transition::ResetControlPlane => {
                self.local.reset().await?;
                info!("control plane reset");
            }
            Transition::JoinWorker(endpoint) => {
                let remote = (self.connect)(&endpoint)?;
                self.provision().await?;
                let token = remote.get_join_token().await?;
                self.local.join(token).await?;
                let control_plane = remote.node_name().await?;
                remote.set_taint(&control_plane, true).await?;
                info!(control_plane = %endpoint, "worker joined");
            }
            Transition::RemoveWorker(endpoint) => {
                let remote = (self.connect)(&endpoint)?;
                let hostname = self.local.hostname().await?;
                remote.delete_node(&hostname).await?;
                let control_plane = remote.node_name().await?;
                remote.set_taint(&control_plane, false).await?;
                self.local.reset().await?;
                info!(node = %hostname, control_plane = %endpoint, "worker removed");
            }
        }
        Ok(())
    }

    async fn provision(&self) -> Result<()> {
        for provisioner in &self.provisioners {
            info!(provisioner = provisioner.name(), "installing");
            provisioner.install().await?;
        }
        Ok(())
    }
}
