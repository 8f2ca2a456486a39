// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration management for spare-keys.
//!
//! This crate provides:
//! - XDG Base Directory compliant path resolution
//! - Layered configuration (defaults, TOML file, environment, command line)
//! - Consistent environment variable naming (`SPARE_KEYS_*`)

pub mod error;
pub mod layer;
pub mod paths;
pub mod sources;

pub use error::ConfigError;
pub use layer::ConfigLayer;
pub use paths::{resolve_xdg_paths, PathsConfig};
pub use sources::{
	CliOverrides, CliSource, ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource,
};

use std::path::PathBuf;

use spare_keys::{ScopeOptions, DEFAULT_KEYCHAIN_PREFIX};
use spare_keys_security::{Domain, KeychainRole, DEFAULT_SECURITY_PROGRAM};
use tracing::debug;

/// Log filter used when neither `RUST_LOG` nor any config layer sets one.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SpareKeysConfig {
	/// `security` executable; a bare name is looked up on `PATH`.
	pub security_program: PathBuf,
	pub clear_list: bool,
	pub role: Option<KeychainRole>,
	pub domain: Option<Domain>,
	/// File name prefix for temporary keychains.
	pub temporary_prefix: String,
	pub log_level: String,
	/// Holds the `enter`/`exit` scope stack.
	pub state_dir: PathBuf,
}

impl SpareKeysConfig {
	/// Scope options from config, before per-command flags are applied.
	pub fn scope_options(&self) -> ScopeOptions {
		ScopeOptions::new()
			.clear_list(self.clear_list)
			.role(self.role)
			.domain(self.domain)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Command-line flags
/// 2. Environment variables (`SPARE_KEYS_*`)
/// 3. Config file (`--config`, else `$XDG_CONFIG_HOME/spare-keys/config.toml`)
/// 4. Built-in defaults
pub fn load_config(cli: CliOverrides) -> Result<SpareKeysConfig, ConfigError> {
	let paths = resolve_xdg_paths()?;
	let config_file = cli
		.config_file
		.clone()
		.unwrap_or_else(|| paths.user_config_file.clone());

	let sources: Vec<Box<dyn ConfigSource>> = vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_file)),
		Box::new(EnvSource::process()),
		Box::new(CliSource::new(cli)),
	];

	load_from_sources(sources, &paths)
}

/// Merge `sources` in precedence order and resolve the result against `paths`.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
	paths: &PathsConfig,
) -> Result<SpareKeysConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged, paths)
}

fn finalize(layer: ConfigLayer, paths: &PathsConfig) -> Result<SpareKeysConfig, ConfigError> {
	let security = layer.security.unwrap_or_default();
	let scope = layer.scope.unwrap_or_default();
	let temporary = layer.temporary.unwrap_or_default();
	let logging = layer.logging.unwrap_or_default();
	let state = layer.state.unwrap_or_default();

	let temporary_prefix = temporary
		.prefix
		.unwrap_or_else(|| DEFAULT_KEYCHAIN_PREFIX.to_string());
	validate_prefix(&temporary_prefix)?;

	let config = SpareKeysConfig {
		security_program: security
			.program
			.unwrap_or_else(|| PathBuf::from(DEFAULT_SECURITY_PROGRAM)),
		clear_list: scope.clear_list.unwrap_or(false),
		role: scope.role,
		domain: scope.domain,
		temporary_prefix,
		log_level: logging.level.unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
		state_dir: state.dir.unwrap_or_else(|| paths.state_dir.clone()),
	};

	debug!(
		security = %config.security_program.display(),
		clear_list = config.clear_list,
		role = ?config.role,
		domain = ?config.domain,
		state_dir = %config.state_dir.display(),
		"configuration loaded"
	);

	Ok(config)
}

fn validate_prefix(prefix: &str) -> Result<(), ConfigError> {
	if prefix.is_empty() {
		return Err(ConfigError::invalid_value("temporary.prefix", "must not be empty"));
	}
	if prefix.contains(std::path::is_separator) {
		return Err(ConfigError::invalid_value(
			"temporary.prefix",
			"must not contain a path separator",
		));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn paths() -> PathsConfig {
		PathsConfig {
			user_config_file: PathBuf::from("/home/ci/.config/spare-keys/config.toml"),
			state_dir: PathBuf::from("/home/ci/.local/state/spare-keys"),
		}
	}

	fn write_config(dir: &tempfile::TempDir, content: &str) -> PathBuf {
		let path = dir.path().join("config.toml");
		std::fs::write(&path, content).unwrap();
		path
	}

	#[test]
	fn test_defaults() {
		let config = load_from_sources(vec![Box::new(DefaultsSource)], &paths()).unwrap();

		assert_eq!(config.security_program, PathBuf::from("security"));
		assert!(!config.clear_list);
		assert_eq!(config.role, None);
		assert_eq!(config.domain, None);
		assert_eq!(config.temporary_prefix, "spare-keys");
		assert_eq!(config.log_level, "warn");
		assert_eq!(config.state_dir, paths().state_dir);
	}

	/// Test: each layer overrides the one below it, regardless of the order
	/// sources are registered in.
	///
	/// Why this test is important: a CI job that sets `SPARE_KEYS_DOMAIN`
	/// must beat the user's config file, and `--domain` must beat both.
	#[test]
	fn test_precedence() {
		let dir = tempfile::tempdir().unwrap();
		let file = write_config(
			&dir,
			r#"
[scope]
domain = "user"
role = "default"
clear_list = true

[logging]
level = "info"
"#,
		);

		let config = load_from_sources(
			vec![
				Box::new(CliSource::new(CliOverrides {
					domain: Some(Domain::Common),
					..Default::default()
				})),
				Box::new(EnvSource::from_vars([
					("SPARE_KEYS_DOMAIN", "system"),
					("SPARE_KEYS_LOG_LEVEL", "debug"),
				])),
				Box::new(TomlSource::new(file)),
				Box::new(DefaultsSource),
			],
			&paths(),
		)
		.unwrap();

		assert_eq!(config.domain, Some(Domain::Common));
		assert_eq!(config.log_level, "debug");
		assert_eq!(config.role, Some(KeychainRole::Default));
		assert!(config.clear_list);
	}

	#[test]
	fn test_state_dir_from_file() {
		let dir = tempfile::tempdir().unwrap();
		let file = write_config(&dir, "[state]\ndir = \"/var/run/keys\"\n");

		let config = load_from_sources(vec![Box::new(TomlSource::new(file))], &paths()).unwrap();
		assert_eq!(config.state_dir, PathBuf::from("/var/run/keys"));
	}

	#[test]
	fn test_invalid_prefix_rejected() {
		let dir = tempfile::tempdir().unwrap();
		let file = write_config(&dir, "[temporary]\nprefix = \"a/b\"\n");

		let err = load_from_sources(vec![Box::new(TomlSource::new(file))], &paths()).unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { .. }));
	}

	#[test]
	fn test_scope_options_from_config() {
		let config = SpareKeysConfig {
			clear_list: true,
			role: Some(KeychainRole::Login),
			domain: Some(Domain::User),
			..load_from_sources(vec![Box::new(DefaultsSource)], &paths()).unwrap()
		};
		let options = config.scope_options();
		assert!(options.clear_list);
		assert_eq!(options.role, Some(KeychainRole::Login));
		assert_eq!(options.domain, Some(Domain::User));
	}

	proptest! {
			#[test]
			fn prop_plain_prefixes_accepted(prefix in "[a-zA-Z0-9_.-]{1,24}") {
					prop_assert!(validate_prefix(&prefix).is_ok());
			}
	}
}
