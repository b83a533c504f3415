/*
 * Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: src/main.rs
 *
 * Entrypoint of the `bootstrap` binary.
 * Reads args via `Cli::invoke` (from cli.rs), sets up tracing, wires the host runner,
 * the provisioners and the SSH-backed control-plane client into a
 * `NodeLifecycle`, and executes the requested transition on a Tokio runtime.
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use anyhow::{Context, Result};
use kube_node_bootstrap::cli::{report, Cli, Invocation};
use kube_node_bootstrap::node::InitOptions;
use kube_node_bootstrap::provisioners::{self, ProvisionContext};
use kube_node_bootstrap::{
    BootstrapConfig, ClusterAdmin, CommandRunner, ControlPlaneClient, HostLayout, HostNode,
    HostRunner, NodeLifecycle, Provisioner, RemoteEndpoint, Result as LifecycleResult, SshRunner,
    Transition,
};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logs go to stderr so stdout stays with the tools being run. `RUST_LOG`
/// overrides the level chosen by `-v`.
fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

/// Executes one validated transition against this host.
async fn run(transition: Transition) -> Result<()> {
    let runner: Arc<dyn CommandRunner> = Arc::new(HostRunner);
    let layout = HostLayout::default();

    let mut local = HostNode::new(runner.clone(), layout.clone());
    let mut installers: Vec<Box<dyn Provisioner>> = Vec::new();

    if transition.provisions() {
        let config = BootstrapConfig::from_env().context("Cannot provision this node")?;
        debug!(
            config = %serde_json::to_string(&config).unwrap_or_default(),
            "loaded bootstrap configuration"
        );
        let arch = provisioners::detect_architecture(runner.as_ref())
            .await
            .context("Failed to detect the host architecture")?;
        info!(%arch, "provisioning node");

        local = local.with_init_options(InitOptions::from(&config));
        installers = provisioners::default_provisioners(Arc::new(ProvisionContext {
            runner: runner.clone(),
            layout,
            config,
            arch,
        }));
    }

    let ssh_transport = runner.clone();
    let lifecycle = NodeLifecycle::new(
        local,
        installers,
        Box::new(
            move |endpoint: &RemoteEndpoint| -> LifecycleResult<Box<dyn ControlPlaneClient>> {
                let ssh = SshRunner::connect(endpoint.clone(), ssh_transport.clone())?;
                info!(control_plane = %endpoint, "connected to control plane");
                Ok(Box::new(ClusterAdmin::new(ssh)))
            },
        ),
    );

    let description = format!("{transition:?}");
    lifecycle
        .execute(transition)
        .await
        .with_context(|| format!("Failed to execute {description}"))?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let (cli, transition) = match Cli::invoke(std::env::args_os(), &mut std::io::stderr()) {
        Invocation::Run { cli, transition } => (cli, transition),
        Invocation::Exit(code) => return ExitCode::from(code),
    };

    if let Err(e) = init_tracing(cli.verbose) {
        report(&mut std::io::stderr(), format!("Failed to initialise logging: {e:#}"));
        return ExitCode::FAILURE;
    }

    match run(transition).await {
        Ok(()) => {
            info!("done");
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&mut std::io::stderr(), format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
