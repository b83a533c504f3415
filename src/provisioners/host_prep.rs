/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/host_prep.rs
 * Kernel and OS prerequisites for kubelet: swap off, bridge netfilter
 * modules, IP forwarding, and the conntrack/socat packages kubeadm's
 * preflight checks insist on.
 * SPDX-License-Identifier: Apache-2.0 */

use super::common::{run_all, write_file};
use super::{ProvisionContext, Provisioner};
use crate::error::{LifecycleError, Result};
use crate::exec::CommandSpec;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub const MODULES_FILE: &str = "/etc/modules-load.d/k8s.conf";
pub const SYSCTL_FILE: &str = "/etc/sysctl.d/k8s.conf";
pub const FSTAB: &str = "/etc/fstab";

const KERNEL_MODULES: [&str; 2] = ["overlay", "br_netfilter"];
const SYSCTL_SETTINGS: &str = "net.bridge.bridge-nf-call-iptables  = 1\n\
net.bridge.bridge-nf-call-ip6tables = 1\n\
net.ipv4.ip_forward                 = 1\n";

pub struct HostPrepProvisioner {
    ctx: Arc<ProvisionContext>,
}

impl HostPrepProvisioner {
    pub fn new(ctx: Arc<ProvisionContext>) -> Self {
        HostPrepProvisioner { ctx }
    }

    async fn disable_swap_in_fstab(&self) -> Result<()> {
        let path = self.ctx.layout.path(FSTAB);
        let fstab = match tokio::fs::read_to_string(&path).await {
            Ok(fstab) => fstab,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(LifecycleError::io(&path, e)),
        };
        let patched = comment_out_swap(&fstab);
        if patched != fstab {
            tokio::fs::write(&path, patched)
                .await
                .map_err(|e| LifecycleError::io(&path, e))?;
            info!("commented out swap entries in /etc/fstab");
        }
        Ok(())
    }
}

fn apt_get<'a>(args: impl IntoIterator<Item = &'a str>) -> CommandSpec {
    CommandSpec::new("apt-get")
        .args(args)
        .env("DEBIAN_FRONTEND", "noninteractive")
}

/// Comments out every active fstab entry whose filesystem type is `swap`.
pub fn comment_out_swap(fstab: &str) -> String {
    let mut out = String::with_capacity(fstab.len());
    for line in fstab.lines() {
        let trimmed = line.trim_start();
        let is_swap = !trimmed.starts_with('#')
            && trimmed.split_whitespace().nth(2) == Some("swap");
        if is_swap {
            out.push('#');
        }
        out.push_str(line);
        out.push('\n');
    }
    if !fstab.ends_with('\n') && out.ends_with('\n') {
        out.pop();
    }
    out
}

#[async_trait]
impl Provisioner for HostPrepProvisioner {
    fn name(&self) -> &'static str {
        "host-prep"
    }

    async fn install(&self) -> Result<()> {
        let runner = self.ctx.runner.as_ref();

        runner.run(&CommandSpec::new("swapoff").arg("-a")).await?;
        self.disable_swap_in_fstab().await?;

        let mut modules = KERNEL_MODULES.join("\n");
        modules.push('\n');
        write_file(&self.ctx.layout, MODULES_FILE, &modules, 0o644).await?;
        write_file(&self.ctx.layout, SYSCTL_FILE, SYSCTL_SETTINGS, 0o644).await?;

        let mut steps: Vec<CommandSpec> = KERNEL_MODULES
            .iter()
            .map(|module| CommandSpec::new("modprobe").arg(*module))
            .collect();
        steps.push(CommandSpec::new("sysctl").arg("--system"));
        // Fresh images ship with empty package lists.
        steps.push(apt_get(["update"]));
        steps.push(apt_get(["install", "-y", "conntrack", "socat"]));
        run_all(runner, &steps).await
    }
}
