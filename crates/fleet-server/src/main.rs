// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fleet server binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fleet_server::jobs::{CacheJanitorJob, JobHistoryCleanupJob, NamespaceSyncJob};
use fleet_server::{create_app_state, create_router};
use fleet_server_jobs::{JobRepository, JobScheduler};
use fleet_server_k8s::KubeClientFactory;
use tower_http::{
	cors::{Any, CorsLayer},
	trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fleet server - cluster and application management over HTTP.
#[derive(Parser, Debug)]
#[command(name = "fleet-server", about = "Fleet cluster management server", version)]
struct Args {
	/// Config file to load instead of /etc/fleet/server.toml
	#[arg(long, env = "FLEET_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("fleet-server version: {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => fleet_server_config::load_config_with_file(path)?,
		None => fleet_server_config::load_config()?,
	};

	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| config.logging.level.clone().into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		"starting fleet-server"
	);

	let pool = fleet_server_db::create_pool(&config.database.url).await?;
	fleet_server_db::run_migrations(&pool).await?;

	let factory = Arc::new(KubeClientFactory::new(config.clusters.client_timeout()));
	let mut state = create_app_state(pool.clone(), &config, factory);

	let job_repo = Arc::new(JobRepository::new(pool.clone()));
	let mut scheduler = JobScheduler::new(Arc::clone(&job_repo));

	scheduler.register_periodic_with_delay(
		Arc::new(NamespaceSyncJob::new(Arc::clone(&state.namespaces))),
		config.namespaces.sync_interval(),
		config.namespaces.sync_initial_delay(),
	);
	scheduler.register_periodic(
		Arc::new(CacheJanitorJob::new(
			Arc::clone(&state.namespaces),
			Arc::clone(&state.queries),
			config.queries.janitor_max_age(),
		)),
		config.queries.janitor_interval(),
	);
	scheduler.register_periodic(
		Arc::new(JobHistoryCleanupJob::new(
			Arc::clone(&job_repo),
			config.jobs.history_retention_days,
		)),
		Duration::from_secs(config.jobs.history_cleanup_interval_secs),
	);

	let scheduler = Arc::new(scheduler);
	state.job_scheduler = Some(Arc::clone(&scheduler));

	if let Err(e) = scheduler.start().await {
		tracing::error!(error = %e, "Failed to start job scheduler");
	}

	let app = create_router(state)
		.layer(TraceLayer::new_for_http())
		.layer(
			CorsLayer::new()
				.allow_origin(Any)
				.allow_methods(Any)
				.allow_headers(Any),
		);

	let addr = config.socket_addr();
	tracing::info!("listening on {}", addr);
	let listener = tokio::net::TcpListener::bind(&addr).await?;

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "Server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Received shutdown signal, stopping job scheduler");
			scheduler.shutdown().await;
		}
	}

	tracing::info!("Server shutdown complete");
	Ok(())
}
