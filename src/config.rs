/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/config.rs
 *
 * The versions and download locations used while provisioning a node. They
 * are read from the environment exactly once at startup into a typed struct
 * that is then handed to every provisioner; nothing else in the crate reads
 * the environment.
 *
 * Required: CONTAINERD_URL, CRICTL_VERSION, KUBERNETES_VERSION,
 * KUBERNETES_RELEASE_VERSION. The remaining variables fall back to pinned
 * defaults.
 *
 * SPDX-License-Identifier: Apache-2.0 */

use crate::error::{LifecycleError, Result};
use serde::Serialize;

pub const CONTAINERD_URL: &str = "CONTAINERD_URL";
pub const CRICTL_VERSION: &str = "CRICTL_VERSION";
pub const KUBERNETES_VERSION: &str = "KUBERNETES_VERSION";
pub const KUBERNETES_RELEASE_VERSION: &str = "KUBERNETES_RELEASE_VERSION";
pub const RUNC_VERSION: &str = "RUNC_VERSION";
pub const CNI_PLUGINS_VERSION: &str = "CNI_PLUGINS_VERSION";
pub const CILIUM_CLI_VERSION: &str = "CILIUM_CLI_VERSION";
pub const POD_NETWORK_CIDR: &str = "POD_NETWORK_CIDR";

const DEFAULT_RUNC_VERSION: &str = "v1.1.12";
const DEFAULT_CNI_PLUGINS_VERSION: &str = "v1.5.1";
const DEFAULT_CILIUM_CLI_VERSION: &str = "v0.16.16";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapConfig {
    /// Full URL of the containerd release archive.
    pub containerd_url: String,
    pub crictl_version: String,
    pub kubernetes_version: String,
    /// Tag of kubernetes/release the kubelet systemd templates are fetched from.
    pub kubernetes_release_version: String,
    pub runc_version: String,
    pub cni_plugins_version: String,
    pub cilium_cli_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_network_cidr: Option<String>,
}

impl BootstrapConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(LifecycleError::PreconditionUnset(key));
        let optional = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        Ok(BootstrapConfig {
            containerd_url: required(CONTAINERD_URL)?,
            crictl_version: required(CRICTL_VERSION)?,
            kubernetes_version: required(KUBERNETES_VERSION)?,
            kubernetes_release_version: required(KUBERNETES_RELEASE_VERSION)?,
            runc_version: optional(RUNC_VERSION, DEFAULT_RUNC_VERSION),
            cni_plugins_version: optional(CNI_PLUGINS_VERSION, DEFAULT_CNI_PLUGINS_VERSION),
            cilium_cli_version: optional(CILIUM_CLI_VERSION, DEFAULT_CILIUM_CLI_VERSION),
            pod_network_cidr: get(POD_NETWORK_CIDR),
        })
    }
}
