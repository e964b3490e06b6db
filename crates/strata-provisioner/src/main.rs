// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Strata provisioner host binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use strata_provisioner::Registry;
use strata_provisioner_core::{CancellationToken, CapacityStore, InMemoryCapacityStore};
use strata_server_config::ServerConfig;
use strata_server_db::{create_pool, StaticRuntimeRepository};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Strata provisioner - builds and checks the configured runtime provisioners.
#[derive(Parser, Debug)]
#[command(
	name = "strata-provisioner",
	about = "Strata runtime provisioner host",
	version
)]
struct Args {
	/// TOML config file (default: /etc/strata/provisioner.toml)
	#[arg(long, global = true, env = "STRATA_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the fleet health check on every configured provisioner
	Check,
	/// Build the provisioner set and list it
	Validate,
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Command::Version = args.command {
		println!("strata-provisioner {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	let config =
		strata_server_config::load_config(args.config).context("failed to load configuration")?;

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	match args.command {
		Command::Check => check(&config).await,
		Command::Validate => validate(&config).await,
		Command::Version => Ok(()),
	}
}

async fn validate(config: &ServerConfig) -> anyhow::Result<()> {
	let descriptor = config.provisioners.read_set()?;
	let store: Arc<dyn CapacityStore> = Arc::new(InMemoryCapacityStore::new());
	let set = Registry::builtin()?.new_set(&descriptor, store).await?;

	for (name, provisioner) in set.iter() {
		println!("{name}\t{}", provisioner.kind());
	}
	tracing::info!(
		count = set.len(),
		platform_version = %config.provisioners.platform_version,
		"provisioner set is valid"
	);
	Ok(())
}

async fn check(config: &ServerConfig) -> anyhow::Result<()> {
	if config.database.is_in_memory() {
		tracing::warn!(url = %config.database.url, "capacity store is in memory; allocations are lost on exit");
	}
	let pool = create_pool(&config.database.url)
		.await
		.context("failed to open capacity database")?;
	let repo = StaticRuntimeRepository::new(pool);
	repo.ensure_schema().await?;
	let store: Arc<dyn CapacityStore> = Arc::new(repo);

	let descriptor = config.provisioners.read_set()?;
	let set = Registry::builtin()?.new_set(&descriptor, store).await?;

	let cancel = CancellationToken::new();
	let trigger = cancel.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			tracing::info!("interrupt received, cancelling checks");
			trigger.cancel();
		}
	});

	let failures = set.check_all(&cancel).await;
	if !failures.is_empty() {
		let names: Vec<_> = failures.iter().map(|(name, _)| name.as_str()).collect();
		anyhow::bail!("{} provisioner(s) failed: {}", failures.len(), names.join(", "));
	}
	Ok(())
}
