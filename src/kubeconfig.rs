/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/kubeconfig.rs
 * Copies the admin kubeconfig produced by `kubeadm init` to root and to
 * every account under /home, so `kubectl` works for all local users.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::cluster::ADMIN_KUBECONFIG;
use crate::error::{LifecycleError, Result};
use crate::layout::HostLayout;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

const ROOT_HOME: &str = "/root";
const HOMES: &str = "/home";

/// Installs `<home>/.kube/config` for root and every directory in /home.
/// Each copy is mode 0600 and owned by whoever owns the home directory.
/// Returns the written paths, root first, the rest sorted.
pub async fn distribute_admin_kubeconfig(layout: &HostLayout) -> Result<Vec<PathBuf>> {
    let admin = layout.path(ADMIN_KUBECONFIG);
    let contents = fs::read(&admin)
        .await
        .map_err(|e| LifecycleError::io(&admin, e))?;

    let mut written = vec![install_for(&layout.path(ROOT_HOME), &contents).await?];
    for home in user_homes(&layout.path(HOMES)).await? {
        written.push(install_for(&home, &contents).await?);
    }

    info!(count = written.len(), "installed admin kubeconfig");
    Ok(written)
}

async fn user_homes(base: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(base).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(LifecycleError::io(base, e)),
    };

    let mut homes = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LifecycleError::io(base, e))?
    {
        if entry.file_name() == "lost+found" {
            continue;
        }
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| LifecycleError::io(entry.path(), e))?;
        if file_type.is_dir() {
            homes.push(entry.path());
        }
    }
    homes.sort();
    Ok(homes)
}

async fn install_for(home: &Path, contents: &[u8]) -> Result<PathBuf> {
    let owner = fs::metadata(home)
        .await
        .map_err(|e| LifecycleError::io(home, e))?;
    let (uid, gid) = (owner.uid(), owner.gid());

    let kube_dir = home.join(".kube");
    let config = kube_dir.join("config");
    fs::create_dir_all(&kube_dir)
        .await
        .map_err(|e| LifecycleError::io(&kube_dir, e))?;
    fs::write(&config, contents)
        .await
        .map_err(|e| LifecycleError::io(&config, e))?;
    fs::set_permissions(&config, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| LifecycleError::io(&config, e))?;

    for path in [&kube_dir, &config] {
        std::os::unix::fs::chown(path, Some(uid), Some(gid))
            .map_err(|e| LifecycleError::io(path, e))?;
    }

    debug!(path = %config.display(), uid, gid, "wrote kubeconfig");
    Ok(config)
}
