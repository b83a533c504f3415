/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/kubernetes.rs
 *
 * Installs kubeadm, kubelet and kubectl from dl.k8s.io, plus the kubelet
 * systemd unit and its kubeadm drop-in. The unit files come from the
 * kubernetes/release repository at KUBERNETES_RELEASE_VERSION; they assume
 * binaries in /usr/bin, so the paths are rewritten to /usr/local/bin.
 *
 * SPDX-License-Identifier: Apache-2.0 */

use super::common::{download, fetch, install_binary, run_all, staged, systemctl, write_file};
use super::{ProvisionContext, Provisioner};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub const BINARIES: [&str; 3] = ["kubeadm", "kubelet", "kubectl"];
pub const KUBELET_UNIT: &str = "/etc/systemd/system/kubelet.service";
pub const KUBEADM_DROP_IN: &str = "/etc/systemd/system/kubelet.service.d/10-kubeadm.conf";
const INSTALL_DIR: &str = "/usr/local/bin";

pub struct KubernetesProvisioner {
    ctx: Arc<ProvisionContext>,
}

impl KubernetesProvisioner {
    pub fn new(ctx: Arc<ProvisionContext>) -> Self {
        KubernetesProvisioner { ctx }
    }

    fn binary_url(&self, binary: &str) -> String {
        format!(
            "https://dl.k8s.io/release/{}/bin/linux/{}/{binary}",
            self.ctx.config.kubernetes_version, self.ctx.arch
        )
    }

    fn template_url(&self, template: &str) -> String {
        format!(
            "https://raw.githubusercontent.com/kubernetes/release/{}/cmd/krel/templates/latest/{template}",
            self.ctx.config.kubernetes_release_version
        )
    }
}

/// Points the upstream unit templates at the binaries we install.
pub fn relocate_binaries(template: &str) -> String {
    template.replace("/usr/bin", INSTALL_DIR)
}

#[async_trait]
impl Provisioner for KubernetesProvisioner {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn install(&self) -> Result<()> {
        let runner = self.ctx.runner.as_ref();

        let mut steps = Vec::with_capacity(BINARIES.len() * 2);
        for binary in BINARIES {
            let staged_binary = staged(binary);
            steps.push(download(&self.binary_url(binary), &staged_binary));
            steps.push(install_binary(
                &staged_binary,
                &format!("{INSTALL_DIR}/{binary}"),
            ));
        }
        run_all(runner, &steps).await?;

        for (template, target) in [
            ("kubelet/kubelet.service", KUBELET_UNIT),
            ("kubeadm/10-kubeadm.conf", KUBEADM_DROP_IN),
        ] {
            let body = runner.run(&fetch(&self.template_url(template))).await?;
            write_file(&self.ctx.layout, target, &relocate_binaries(&body.stdout), 0o644).await?;
        }

        run_all(
            runner,
            &[
                systemctl(["daemon-reload"]),
                systemctl(["enable", "--now", "kubelet"]),
            ],
        )
        .await?;
        info!(version = %self.ctx.config.kubernetes_version, "kubernetes tooling installed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::RecordingRunner;
    use crate::provisioners::tests::context;
    use tempfile::TempDir;

    #[test]
    fn templates_are_rewritten_to_local_bin() {
        assert_eq!(
            relocate_binaries("ExecStart=/usr/bin/kubelet $KUBELET_ARGS\n"),
            "ExecStart=/usr/local/bin/kubelet $KUBELET_ARGS\n"
        );
    }

    #[tokio::test]
    async fn installs_binaries_then_units_then_enables_kubelet() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(
            RecordingRunner::new()
                .reply("kubelet/kubelet.service", "ExecStart=/usr/bin/kubelet\n")
                .reply(
                    "kubeadm/10-kubeadm.conf",
                    "ExecStart=/usr/bin/kubelet $KUBELET_KUBEADM_ARGS\n",
                ),
        );
        let ctx = context(runner.clone(), &dir);

        KubernetesProvisioner::new(ctx.clone()).install().await.unwrap();

        let commands = runner.commands();
        assert!(commands[0].ends_with("https://dl.k8s.io/release/v1.30.2/bin/linux/amd64/kubeadm"));
        assert_eq!(
            commands[5],
            "install -m 0755 /var/tmp/kube-node-bootstrap/kubectl /usr/local/bin/kubectl"
        );
        assert!(commands[6].contains(
            "kubernetes/release/v0.16.2/cmd/krel/templates/latest/kubelet/kubelet.service"
        ));
        assert_eq!(commands.last().unwrap(), "systemctl enable --now kubelet");

        let unit = tokio::fs::read_to_string(ctx.layout.path(KUBELET_UNIT)).await.unwrap();
        assert_eq!(unit, "ExecStart=/usr/local/bin/kubelet\n");
        let drop_in = tokio::fs::read_to_string(ctx.layout.path(KUBEADM_DROP_IN)).await.unwrap();
        assert!(drop_in.contains("/usr/local/bin/kubelet"));
    }
}
