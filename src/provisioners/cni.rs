/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/cni.rs
 * Installs the reference CNI plugins (bridge, loopback, portmap, ...) into
 * /opt/cni/bin, where cilium and kubelet expect them.
 * SPDX-License-Identifier: Apache-2.0 */

use super::common::{download, extract, make_dir, run_all, staged};
use super::{ProvisionContext, Provisioner};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub const CNI_BIN_DIR: &str = "/opt/cni/bin";

pub struct CniPluginsProvisioner {
    ctx: Arc<ProvisionContext>,
}

impl CniPluginsProvisioner {
    pub fn new(ctx: Arc<ProvisionContext>) -> Self {
        CniPluginsProvisioner { ctx }
    }

    fn archive_url(&self) -> String {
        let version = &self.ctx.config.cni_plugins_version;
        let arch = &self.ctx.arch;
        format!(
            "https://github.com/containernetworking/plugins/releases/download/{version}/cni-plugins-linux-{arch}-{version}.tgz"
        )
    }
}

#[async_trait]
impl Provisioner for CniPluginsProvisioner {
    fn name(&self) -> &'static str {
        "cni-plugins"
    }

    async fn install(&self) -> Result<()> {
        let archive = staged("cni-plugins.tgz");
        run_all(
            self.ctx.runner.as_ref(),
            &[
                download(&self.archive_url(), &archive),
                make_dir(CNI_BIN_DIR),
                extract(&archive, CNI_BIN_DIR),
            ],
        )
        .await
    }
}
