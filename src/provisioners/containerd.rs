/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/containerd.rs
 * Installs containerd from its release archive together with runc, writes
 * a default config switched to the systemd cgroup driver and enables the
 * systemd unit.
 * SPDX-License-Identifier: Apache-2.0 */

use super::common::{
    download, extract, fetch, install_binary, run_all, staged, systemctl, write_file,
};
use super::{ProvisionContext, Provisioner};
use crate::error::Result;
use crate::exec::CommandSpec;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub const CONFIG_PATH: &str = "/etc/containerd/config.toml";
pub const UNIT_PATH: &str = "/etc/systemd/system/containerd.service";
const UNIT_URL: &str = "https://raw.githubusercontent.com/containerd/containerd/main/containerd.service";

pub struct ContainerdProvisioner {
    ctx: Arc<ProvisionContext>,
}

impl ContainerdProvisioner {
    pub fn new(ctx: Arc<ProvisionContext>) -> Self {
        ContainerdProvisioner { ctx }
    }

    fn runc_url(&self) -> String {
        let version = &self.ctx.config.runc_version;
        format!(
            "https://github.com/opencontainers/runc/releases/download/{version}/runc.{}",
            self.ctx.arch
        )
    }
}

/// Flips `SystemdCgroup = false` to `true`, keeping indentation. Already
/// patched configs come back unchanged.
pub fn enable_systemd_cgroup(config: &str) -> String {
    let mut out = String::with_capacity(config.len());
    for line in config.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("SystemdCgroup") && trimmed.contains("false") {
            out.push_str(&line.replacen("false", "true", 1));
        } else {
            out.push_str(line);
        }
    }
    out
}

#[async_trait]
impl Provisioner for ContainerdProvisioner {
    fn name(&self) -> &'static str {
        "containerd"
    }

    async fn install(&self) -> Result<()> {
        let runner = self.ctx.runner.as_ref();
        let archive = staged("containerd.tar.gz");
        let runc = staged("runc");

        run_all(
            runner,
            &[
                download(&self.ctx.config.containerd_url, &archive),
                extract(&archive, "/usr/local"),
                download(&self.runc_url(), &runc),
                install_binary(&runc, "/usr/local/sbin/runc"),
            ],
        )
        .await?;

        let defaults = runner
            .run(&CommandSpec::new("containerd").args(["config", "default"]).capture())
            .await?;
        write_file(
            &self.ctx.layout,
            CONFIG_PATH,
            &enable_systemd_cgroup(&defaults.stdout),
            0o644,
        )
        .await?;

        let unit = runner.run(&fetch(UNIT_URL)).await?;
        write_file(&self.ctx.layout, UNIT_PATH, &unit.stdout, 0o644).await?;

        run_all(
            runner,
            &[
                systemctl(["daemon-reload"]),
                systemctl(["enable", "--now", "containerd"]),
                systemctl(["restart", "containerd"]),
            ],
        )
        .await?;
        info!("containerd installed");
        Ok(())
    }
}
