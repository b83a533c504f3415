/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/error.rs
 * The error taxonomy of the bootstrap tool. Every failure aborts the whole
 * run; nothing here is retried or rolled back.
 * SPDX-License-Identifier: Apache-2.0 */

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Bad role, count or missing worker credentials. Raised before any side effect.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// A required environment variable is absent or empty.
    #[error("required environment variable {0} is not set")]
    PreconditionUnset(&'static str),

    #[error("command `{command}` failed with {status}")]
    ExternalCommandFailure { command: String, status: ExitStatus },

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("required tool `{0}` was not found in PATH")]
    ToolMissing(&'static str),

    #[error("unexpected output: {0}")]
    UnexpectedOutput(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LifecycleError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LifecycleError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
