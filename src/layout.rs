/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/layout.rs
 * Resolves the absolute host paths the tool writes to against a root
 * directory, so file edits can be pointed at a scratch tree.
 * SPDX-License-Identifier: Apache-2.0 */

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    root: PathBuf,
}

impl HostLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        HostLayout { root: root.into() }
    }

    /// Maps an absolute host path such as `/etc/containerd/config.toml`
    /// below the layout root.
    pub fn path(&self, absolute: &str) -> PathBuf {
        self.root.join(absolute.trim_start_matches('/'))
    }
}

impl Default for HostLayout {
    fn default() -> Self {
        HostLayout::new("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_the_real_filesystem() {
        assert_eq!(
            HostLayout::default().path("/etc/cni/net.d"),
            PathBuf::from("/etc/cni/net.d")
        );
    }

    #[test]
    fn paths_are_rebased_under_the_root() {
        let layout = HostLayout::new("/tmp/scratch");
        assert_eq!(
            layout.path("/home/ubuntu/.kube/config"),
            PathBuf::from("/tmp/scratch/home/ubuntu/.kube/config")
        );
    }
}
