/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/provisioners/common.rs
 * Command builders and file helpers shared by the installers.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::error::{LifecycleError, Result};
use crate::exec::{CommandRunner, CommandSpec};
use crate::layout::HostLayout;
use std::os::unix::fs::PermissionsExt;
use tokio::fs;
use tracing::debug;

/// Scratch directory for downloaded archives.
pub const WORK_DIR: &str = "/var/tmp/kube-node-bootstrap";

pub fn staged(file: &str) -> String {
    format!("{WORK_DIR}/{file}")
}

/// `curl` the URL into `dest`, creating parent directories.
pub fn download(url: &str, dest: &str) -> CommandSpec {
    CommandSpec::new("curl").args(["-fsSL", "--retry", "3", "--create-dirs", "-o", dest, url])
}

/// `curl` the URL and capture the body.
pub fn fetch(url: &str) -> CommandSpec {
    CommandSpec::new("curl")
        .args(["-fsSL", "--retry", "3", url])
        .capture()
}

pub fn make_dir(dir: &str) -> CommandSpec {
    CommandSpec::new("mkdir").args(["-p", dir])
}

pub fn extract(archive: &str, dir: &str) -> CommandSpec {
    CommandSpec::new("tar").args(["-C", dir, "-xzf", archive])
}

pub fn install_binary(src: &str, dest: &str) -> CommandSpec {
    CommandSpec::new("install").args(["-m", "0755", src, dest])
}

pub fn systemctl<'a>(args: impl IntoIterator<Item = &'a str>) -> CommandSpec {
    CommandSpec::new("systemctl").args(args)
}

/// Runs the commands in order, stopping at the first failure.
pub async fn run_all(runner: &dyn CommandRunner, specs: &[CommandSpec]) -> Result<()> {
    for spec in specs {
        runner.run(spec).await?;
    }
    Ok(())
}

/// Writes `contents` to the absolute host `path` (resolved through the
/// layout) with the given mode, creating parent directories.
pub async fn write_file(layout: &HostLayout, path: &str, contents: &str, mode: u32) -> Result<()> {
    let target = layout.path(path);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| LifecycleError::io(parent, e))?;
    }
    fs::write(&target, contents)
        .await
        .map_err(|e| LifecycleError::io(&target, e))?;
    fs::set_permissions(&target, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| LifecycleError::io(&target, e))?;
    debug!(path = %target.display(), "wrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn download_goes_to_the_staging_dir() {
        let spec = download("https://example.test/a.tgz", &staged("a.tgz"));
        assert_eq!(
            spec.display(),
            "curl -fsSL --retry 3 --create-dirs -o /var/tmp/kube-node-bootstrap/a.tgz https://example.test/a.tgz"
        );
        assert!(fetch("https://example.test/unit").capture);
    }

    #[tokio::test]
    async fn write_file_creates_parents_and_sets_mode() {
        let dir = TempDir::new().unwrap();
        let layout = HostLayout::new(dir.path());
        write_file(&layout, "/etc/sysctl.d/k8s.conf", "x=1\n", 0o644)
            .await
            .unwrap();

        let path = dir.path().join("etc/sysctl.d/k8s.conf");
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "x=1\n");
        let mode = fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
