/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/crictl.rs
 * Installs crictl, which kubeadm uses to talk to the CRI socket.
 * SPDX-License-Identifier: Apache-2.0 */

use super::common::{download, extract, run_all, staged};
use super::{ProvisionContext, Provisioner};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub struct CrictlProvisioner {
    ctx: Arc<ProvisionContext>,
}

impl CrictlProvisioner {
    pub fn new(ctx: Arc<ProvisionContext>) -> Self {
        CrictlProvisioner { ctx }
    }

    fn archive_url(&self) -> String {
        let version = &self.ctx.config.crictl_version;
        let arch = &self.ctx.arch;
        format!(
            "https://github.com/kubernetes-sigs/cri-tools/releases/download/{version}/crictl-{version}-linux-{arch}.tar.gz"
        )
    }
}

#[async_trait]
impl Provisioner for CrictlProvisioner {
    fn name(&self) -> &'static str {
        "crictl"
    }

    async fn install(&self) -> Result<()> {
        let archive = staged("crictl.tar.gz");
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
