/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 * File: src/cli.rs
 * This file defines the command-line interface of the `bootstrap` tool using
 * the `clap` crate. The short flags are fixed: `-h` names the control-plane
 * host, so the help flag lives on `--help` only. Role and count are kept as
 * raw strings here and validated by the lifecycle types, so a bad value is
 * reported the same way whether it comes from the CLI or the library API.
 * Every rejected invocation exits with status 1 and ends with a timestamped
 * error line on stderr; `--help` and `--version` exit 0.
 * SPDX-License-Identifier: Apache-2.0 */

use crate::error::Result;
use crate::lifecycle::{DesiredCount, NodeRole, Transition};
use crate::ssh::{RemoteEndpoint, DEFAULT_SSH_PORT};
use clap::{ArgAction, CommandFactory, Parser};
use std::ffi::OsString;
use std::fmt;
use std::io::Write;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Provision, join or reset a kubeadm control-plane or worker node.
#[derive(Parser)]
#[command(name = "bootstrap", author, version, about, long_about = None, disable_help_flag = true)]
pub struct Cli {
    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,

    /// Log every external command before it runs.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Node type: `controlplane` or `worker`.
    #[arg(short = 't', long = "type", value_name = "TYPE", default_value = "controlplane")]
    pub node_type: String,

    /// Desired node count: 1 provisions and joins, 0 resets.
    #[arg(short = 'c', long, default_value = "1", allow_hyphen_values = true)]
    pub count: String,

    /// Control-plane host (worker only).
    #[arg(short = 'h', long)]
    pub host: Option<String>,

    /// Control-plane SSH port (worker only).
    #[arg(short = 'p', long, default_value_t = DEFAULT_SSH_PORT)]
    pub port: u16,

    /// Control-plane SSH username (worker only).
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Control-plane SSH password, also used for sudo (worker only).
    #[arg(short = 's', long)]
    pub credential: Option<String>,
}

/// What the binary should do after reading its arguments.
pub enum Invocation {
    Run { cli: Cli, transition: Transition },
    Exit(u8),
}

impl Cli {
    /// Parses and validates `args`. Rejections are written to `stderr` as
    /// the usage text followed by a timestamped error line.
    pub fn invoke<I, T>(args: I, stderr: &mut dyn Write) -> Invocation
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = match Cli::try_parse_from(args) {
            Ok(cli) => cli,
            Err(e) if !e.use_stderr() => {
                let _ = e.print();
                return Invocation::Exit(0);
            }
            Err(e) => {
                let _ = writeln!(stderr, "{}", e.render().to_string().trim_end());
                report(stderr, e.kind());
                return Invocation::Exit(1);
            }
        };

        match cli.transition() {
            Ok(transition) => Invocation::Run { cli, transition },
            Err(e) => {
                let _ = writeln!(stderr, "{}", Cli::command().render_usage());
                report(stderr, &e);
                Invocation::Exit(1)
            }
        }
    }

    /// Validates the flags into a transition. Fails with
    /// `InvalidParameters` before anything touches the host.
    pub fn transition(&self) -> Result<Transition> {
        let role: NodeRole = self.node_type.parse()?;
        let count: DesiredCount = self.count.parse()?;
        let endpoint = match role {
            NodeRole::Worker => Some(RemoteEndpoint::new(
                self.host.clone().unwrap_or_default(),
                self.port,
                self.username.clone().unwrap_or_default(),
                self.credential.clone().unwrap_or_default(),
            )?),
            NodeRole::ControlPlane => None,
        };
        Transition::plan(role, count, endpoint)
    }
}

/// Writes `error` as a single timestamped line.
pub fn report(out: &mut dyn Write, error: impl fmt::Display) {
    let _ = writeln!(
        out,
        "{} ❌ {error}",
        chrono::Local::now().format(TIMESTAMP_FORMAT)
    );
}
