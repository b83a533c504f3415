/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/lib.rs
 *
 * Library half of the `bootstrap` tool. The binary in main.rs only parses
 * arguments, configures logging and wires the concrete collaborators into
 * the `NodeLifecycle` controller defined here.
 *
 * Module map:
 * - `lifecycle`: roles, counts, the validated `Transition` and the controller.
 * - `provisioners`: idempotent installers for containerd, CNI, kube tooling.
 * - `cluster`: kubectl/kubeadm operations against a control plane.
 * - `ssh`: the remote shell transport used to reach the control plane.
 * - `node`: kubeadm init/join/reset on the local host.
 * - `exec`: the single seam through which external processes are launched.
 *
 * SPDX-License-Identifier: Apache-2.0 */

pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod exec;
pub mod kubeconfig;
pub mod layout;
pub mod lifecycle;
pub mod node;
pub mod provisioners;
pub mod ssh;

pub use cluster::{ClusterAdmin, ControlPlaneClient, JoinToken};
pub use config::BootstrapConfig;
pub use error::{LifecycleError, Result};
pub use exec::{CommandRunner, CommandSpec, HostRunner};
pub use layout::HostLayout;
pub use lifecycle::{DesiredCount, NodeLifecycle, NodeRole, Transition};
pub use node::{HostNode, LocalNode};
pub use provisioners::Provisioner;
pub use ssh::{RemoteEndpoint, SshRunner};
