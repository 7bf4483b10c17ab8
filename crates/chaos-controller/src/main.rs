// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use chaos_controller::{
    build_registry,
    config::ControllerConfig,
    driver::Driver,
    logging,
    reconciler::Reconciler,
};
use chaos_store::{K8sStore, MemoryStore, ObjectStore};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tracing::info;

#[derive(Parser, Debug)]
#[clap(name = "chaos-controller", about = "Runs chaos experiments against a cluster")]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile experiments until interrupted
    Run {
        /// Path to the controller config
        #[clap(long)]
        config: Option<PathBuf>,
        /// Only target this namespace, overriding the config
        #[clap(long)]
        namespace: Option<String>,
        /// Run against an in-memory store instead of the cluster
        #[clap(long)]
        dry_run: bool,
    },
    /// List the experiment kinds this controller handles
    Kinds,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Run {
            config,
            namespace,
            dry_run,
        } => run(config, namespace, dry_run).await,
        Command::Kinds => {
            let registry = build_registry(
                &ControllerConfig::default(),
                Arc::new(MemoryStore::new()),
            )?;
            for entry in registry.kinds() {
                let endpoints = entry
                    .endpoints()
                    .iter()
                    .map(|endpoint| endpoint.name())
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("{}\t{}", entry.kind().kind(), endpoints);
            }
            Ok(())
        },
    }
}

async fn run(config: Option<PathBuf>, namespace: Option<String>, dry_run: bool) -> Result<()> {
    let mut config = match &config {
        Some(path) => ControllerConfig::load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ControllerConfig::default(),
    };
    if let Some(namespace) = namespace {
        config.cluster_scoped = false;
        config.target_namespace = namespace;
    }
    config.sanitize().context("invalid controller config")?;
    logging::init(&config.logger)?;

    let store: Arc<dyn ObjectStore> = if dry_run {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(
            K8sStore::try_default()
                .await
                .context("failed to connect to the cluster")?,
        )
    };
    let registry = Arc::new(build_registry(&config, store)?);
    info!(
        kinds = registry.kinds().count(),
        cluster_scoped = config.cluster_scoped,
        target_namespace = %config.target_namespace,
        dry_run = dry_run,
        "starting chaos controller"
    );

    let driver = Driver::new(
        Arc::new(Reconciler::new(registry)),
        config.reconcile_interval(),
        config.max_concurrent_reconciles,
    );
    driver
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await;
    Ok(())
}
