/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/cilium.rs
 * Installs the cilium CLI. The CNI itself is deployed later, once the
 * control plane is up (see `LocalNode::install_cni`).
 * SPDX-License-Identifier: Apache-2.0 */

use super::common::{download, extract, run_all, staged};
use super::{ProvisionContext, Provisioner};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub struct CiliumCliProvisioner {
    ctx: Arc<ProvisionContext>,
}

impl CiliumCliProvisioner {
    pub fn new(ctx: Arc<ProvisionContext>) -> Self {
        CiliumCliProvisioner { ctx }
    }

    fn archive_url(&self) -> String {
        let version = &self.ctx.config.cilium_cli_version;
        let arch = &self.ctx.arch;
        format!("https://github.com/cilium/cilium-cli/releases/download/{version}/cilium-linux-{arch}.tar.gz")
    }
}

#[async_trait]
impl Provisioner for CiliumCliProvisioner {
    fn name(&self) -> &'static str {
        "cilium-cli"
    }

    async fn install(&self) -> Result<()> {
        let archive = staged("cilium-cli.tar.gz");
        run_all(
            self.ctx.runner.as_ref(),
            &[
                download(&self.archive_url(), &archive),
                extract(&archive, "/usr/local/bin"),
            ],
        )
        .await
    }
}
