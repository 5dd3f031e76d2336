// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	ClustersConfigLayer, DatabaseConfigLayer, DeployConfigLayer, HttpConfigLayer, JobsConfigLayer,
	LoggingConfigLayer, NamespacesConfigLayer, QueriesConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/fleet/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: FLEET_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			database: Some(load_database_from_env()?),
			logging: Some(load_logging_from_env()?),
			clusters: Some(load_clusters_from_env()?),
			namespaces: Some(load_namespaces_from_env()?),
			queries: Some(load_queries_from_env()?),
			deploy: Some(load_deploy_from_env()?),
			jobs: Some(load_jobs_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_list(name: &str) -> Option<Vec<String>> {
	env_var(name).map(|s| {
		s.split(',')
			.map(|s| s.trim().to_string())
			.filter(|s| !s.is_empty())
			.collect()
	})
}

fn env_parse<T: std::str::FromStr>(name: &str, type_name: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {type_name} value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	env_parse(name, "u16")
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	env_parse(name, "u32")
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	env_parse(name, "u64")
}

fn env_i32(name: &str) -> Result<Option<i32>, ConfigError> {
	env_parse(name, "i32")
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
	env_parse(name, "usize")
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("FLEET_SERVER_HTTP_HOST"),
		port: env_u16("FLEET_SERVER_HTTP_PORT")?,
	})
}

fn load_database_from_env() -> Result<DatabaseConfigLayer, ConfigError> {
	Ok(DatabaseConfigLayer {
		url: env_var("FLEET_SERVER_DATABASE_URL"),
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	Ok(LoggingConfigLayer {
		level: env_var("FLEET_SERVER_LOGGING_LEVEL"),
	})
}

fn load_clusters_from_env() -> Result<ClustersConfigLayer, ConfigError> {
	Ok(ClustersConfigLayer {
		client_timeout_secs: env_u64("FLEET_SERVER_CLUSTERS_CLIENT_TIMEOUT_SECS")?,
		ping_timeout_secs: env_u64("FLEET_SERVER_CLUSTERS_PING_TIMEOUT_SECS")?,
	})
}

fn load_namespaces_from_env() -> Result<NamespacesConfigLayer, ConfigError> {
	Ok(NamespacesConfigLayer {
		cache_ttl_secs: env_u64("FLEET_SERVER_NAMESPACES_CACHE_TTL_SECS")?,
		sync_interval_secs: env_u64("FLEET_SERVER_NAMESPACES_SYNC_INTERVAL_SECS")?,
		sync_initial_delay_secs: env_u64("FLEET_SERVER_NAMESPACES_SYNC_INITIAL_DELAY_SECS")?,
		fallback: env_list("FLEET_SERVER_NAMESPACES_FALLBACK"),
	})
}

fn load_queries_from_env() -> Result<QueriesConfigLayer, ConfigError> {
	Ok(QueriesConfigLayer {
		result_ttl_secs: env_u64("FLEET_SERVER_QUERIES_RESULT_TTL_SECS")?,
		janitor_interval_secs: env_u64("FLEET_SERVER_QUERIES_JANITOR_INTERVAL_SECS")?,
		janitor_max_age_secs: env_u64("FLEET_SERVER_QUERIES_JANITOR_MAX_AGE_SECS")?,
	})
}

fn load_deploy_from_env() -> Result<DeployConfigLayer, ConfigError> {
	Ok(DeployConfigLayer {
		default_image: env_var("FLEET_SERVER_DEPLOY_DEFAULT_IMAGE"),
		default_port: env_i32("FLEET_SERVER_DEPLOY_DEFAULT_PORT")?,
		default_service_type: env_var("FLEET_SERVER_DEPLOY_DEFAULT_SERVICE_TYPE"),
		image_pull_policy: env_var("FLEET_SERVER_DEPLOY_IMAGE_PULL_POLICY"),
		cpu_request: env_var("FLEET_SERVER_DEPLOY_CPU_REQUEST"),
		memory_request: env_var("FLEET_SERVER_DEPLOY_MEMORY_REQUEST"),
		cpu_limit: env_var("FLEET_SERVER_DEPLOY_CPU_LIMIT"),
		memory_limit: env_var("FLEET_SERVER_DEPLOY_MEMORY_LIMIT"),
		worker_pool_size: env_usize("FLEET_SERVER_DEPLOY_WORKER_POOL_SIZE")?,
		managed_by: env_var("FLEET_SERVER_DEPLOY_MANAGED_BY"),
	})
}

fn load_jobs_from_env() -> Result<JobsConfigLayer, ConfigError> {
	Ok(JobsConfigLayer {
		history_retention_days: env_u32("FLEET_SERVER_JOBS_HISTORY_RETENTION_DAYS")?,
		history_cleanup_interval_secs: env_u64("FLEET_SERVER_JOBS_HISTORY_CLEANUP_INTERVAL_SECS")?,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.http.is_none());
		assert!(layer.database.is_none());
	}

	#[test]
	fn test_toml_source_missing_file_returns_empty() {
		let layer = TomlSource::new("/nonexistent/config.toml").load().unwrap();
		assert!(layer.http.is_none());
	}

	#[test]
	fn test_toml_source_reads_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[clusters]\nclient_timeout_secs = 4").unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(layer.clusters.unwrap().client_timeout_secs, Some(4));
	}

	#[test]
	fn test_toml_source_reports_parse_errors() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "[http\nport = ").unwrap();

		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn test_env_parse_rejects_garbage() {
		std::env::set_var("FLEET_SERVER_TEST_ENV_PARSE_GARBAGE", "not-a-number");
		let err = env_u64("FLEET_SERVER_TEST_ENV_PARSE_GARBAGE").unwrap_err();
		std::env::remove_var("FLEET_SERVER_TEST_ENV_PARSE_GARBAGE");
		assert!(err.to_string().contains("FLEET_SERVER_TEST_ENV_PARSE_GARBAGE"));
	}

	#[test]
	fn test_env_list_trims_and_drops_empty() {
		std::env::set_var("FLEET_SERVER_TEST_ENV_LIST", " default, ,kube-system ");
		let list = env_list("FLEET_SERVER_TEST_ENV_LIST");
		std::env::remove_var("FLEET_SERVER_TEST_ENV_LIST");
		assert_eq!(
			list,
			Some(vec!["default".to_string(), "kube-system".to_string()])
		);
	}
}
