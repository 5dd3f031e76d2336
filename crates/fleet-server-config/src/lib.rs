// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the fleet server.
//!
//! Values are layered from built-in defaults, an optional TOML file and
//! `FLEET_SERVER_*` environment variables, in that order of precedence.
//!
//! ```ignore
//! use fleet_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub clusters: ClustersConfig,
	pub namespaces: NamespacesConfig,
	pub queries: QueriesConfig,
	pub deploy: DeployConfig,
	pub jobs: JobsConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`FLEET_SERVER_*`)
/// 2. Config file (`/etc/fleet/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		http: layer.http.unwrap_or_default().finalize(),
		database: layer.database.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		clusters: layer.clusters.unwrap_or_default().finalize(),
		namespaces: layer.namespaces.unwrap_or_default().finalize(),
		queries: layer.queries.unwrap_or_default().finalize(),
		deploy: layer.deploy.unwrap_or_default().finalize(),
		jobs: layer.jobs.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		client_timeout_secs = config.clusters.client_timeout_secs,
		namespace_ttl_secs = config.namespaces.cache_ttl_secs,
		worker_pool_size = config.deploy.worker_pool_size,
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	if config.deploy.worker_pool_size == 0 {
		return Err(ConfigError::Validation(
			"deploy.worker_pool_size must be at least 1".to_string(),
		));
	}

	if config.clusters.client_timeout_secs == 0 || config.clusters.ping_timeout_secs == 0 {
		return Err(ConfigError::Validation(
			"cluster timeouts must be greater than zero".to_string(),
		));
	}

	if config.namespaces.sync_interval_secs == 0 || config.queries.janitor_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"background job intervals must be greater than zero".to_string(),
		));
	}

	if !(1..=65535).contains(&config.deploy.default_port) {
		return Err(ConfigError::Validation(format!(
			"deploy.default_port {} is not a valid container port",
			config.deploy.default_port
		)));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_finalize_defaults() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert_eq!(config.socket_addr(), "0.0.0.0:8080");
		assert_eq!(config.database.url, "sqlite:./fleet.db");
		assert_eq!(config.deploy.worker_pool_size, 8);
		assert_eq!(config.namespaces.sync_initial_delay_secs, 15);
	}

	#[test]
	fn test_zero_worker_pool_rejected() {
		let layer = ServerConfigLayer {
			deploy: Some(DeployConfigLayer {
				worker_pool_size: Some(0),
				..Default::default()
			}),
			..Default::default()
		};
		let err = finalize(layer).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_invalid_default_port_rejected() {
		let layer = ServerConfigLayer {
			deploy: Some(DeployConfigLayer {
				default_port: Some(70000),
				..Default::default()
			}),
			..Default::default()
		};
		assert!(finalize(layer).is_err());
	}

	#[test]
	fn test_socket_addr() {
		let config = ServerConfig {
			http: HttpConfig {
				host: "127.0.0.1".to_string(),
				port: 9000,
			},
			..Default::default()
		};
		assert_eq!(config.socket_addr(), "127.0.0.1:9000");
	}

	#[test]
	fn test_load_config_with_file_applies_file_values() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("server.toml");
		std::fs::write(&path, "[queries]\nresult_ttl_secs = 42\n").unwrap();

		let config = load_config_with_file(&path).unwrap();
		assert_eq!(config.queries.result_ttl_secs, 42);
	}

	mod proptests {
		use super::*;
		use proptest::prelude::*;

		proptest! {
			#[test]
			fn later_layer_wins_for_every_set_field(base in proptest::option::of(1u64..10_000), overlay in proptest::option::of(1u64..10_000)) {
				let mut layer = ServerConfigLayer {
					queries: Some(QueriesConfigLayer { result_ttl_secs: base, ..Default::default() }),
					..Default::default()
				};
				layer.merge(ServerConfigLayer {
					queries: Some(QueriesConfigLayer { result_ttl_secs: overlay, ..Default::default() }),
					..Default::default()
				});
				let config = finalize(layer).unwrap();
				prop_assert_eq!(config.queries.result_ttl_secs, overlay.or(base).unwrap_or(300));
			}
		}
	}
}
