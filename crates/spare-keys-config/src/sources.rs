// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML file, environment, command line.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use spare_keys_security::{Domain, KeychainRole};
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::{
	ConfigLayer, LoggingConfigLayer, ScopeConfigLayer, SecurityConfigLayer, StateConfigLayer,
};

pub const ENV_SECURITY_PROGRAM: &str = "SPARE_KEYS_SECURITY_PROGRAM";
pub const ENV_DOMAIN: &str = "SPARE_KEYS_DOMAIN";
pub const ENV_ROLE: &str = "SPARE_KEYS_ROLE";
pub const ENV_LOG_LEVEL: &str = "SPARE_KEYS_LOG_LEVEL";
pub const ENV_STATE_DIR: &str = "SPARE_KEYS_STATE_DIR";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
	CommandLine = 100,
}

/// Trait for configuration sources.
pub trait ConfigSource {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ConfigLayer, ConfigError>;
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

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file yields an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ConfigLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `SPARE_KEYS_<FIELD>`. Empty values count as unset.
pub struct EnvSource {
	vars: HashMap<String, String>,
}

impl EnvSource {
	/// Snapshot of the current process environment.
	pub fn process() -> Self {
		Self::from_vars(std::env::vars())
	}

	pub fn from_vars<K, V>(vars: impl IntoIterator<Item = (K, V)>) -> Self
	where
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			vars: vars
				.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		self.vars.get(name).filter(|v| !v.is_empty()).cloned()
	}

	fn parsed<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
	where
		T: FromStr<Err = String>,
	{
		match self.var(name) {
			Some(v) => v
				.parse()
				.map(Some)
				.map_err(|message| ConfigError::invalid_value(name, message)),
			None => Ok(None),
		}
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ConfigLayer {
			security: Some(SecurityConfigLayer {
				program: self.var(ENV_SECURITY_PROGRAM).map(PathBuf::from),
			}),
			scope: Some(ScopeConfigLayer {
				clear_list: None,
				role: self.parsed::<KeychainRole>(ENV_ROLE)?,
				domain: self.parsed::<Domain>(ENV_DOMAIN)?,
			}),
			temporary: None,
			logging: Some(LoggingConfigLayer {
				level: self.var(ENV_LOG_LEVEL),
			}),
			state: Some(StateConfigLayer {
				dir: self.var(ENV_STATE_DIR).map(PathBuf::from),
			}),
		})
	}
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
	pub config_file: Option<PathBuf>,
	pub security_program: Option<PathBuf>,
	pub domain: Option<Domain>,
	pub log_level: Option<String>,
}

/// Command-line source; always wins.
pub struct CliSource {
	overrides: CliOverrides,
}

impl CliSource {
	pub fn new(overrides: CliOverrides) -> Self {
		Self { overrides }
	}
}

impl ConfigSource for CliSource {
	fn name(&self) -> &'static str {
		"command-line"
	}

	fn precedence(&self) -> Precedence {
		Precedence::CommandLine
	}

	fn load(&self) -> Result<ConfigLayer, ConfigError> {
		Ok(ConfigLayer {
			security: Some(SecurityConfigLayer {
				program: self.overrides.security_program.clone(),
			}),
			scope: Some(ScopeConfigLayer {
				domain: self.overrides.domain,
				..Default::default()
			}),
			logging: Some(LoggingConfigLayer {
				level: self.overrides.log_level.clone(),
			}),
			..Default::default()
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::CommandLine > Precedence::Environment);
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_toml_source_missing_file_returns_empty() {
		let source = TomlSource::new("/nonexistent/spare-keys/config.toml");
		assert_eq!(source.load().unwrap(), ConfigLayer::default());
	}

	#[test]
	fn test_toml_source_malformed_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, "[scope\nclear_list = true").unwrap();

		let err = TomlSource::new(&path).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn test_toml_source_unknown_domain_is_parse_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.toml");
		std::fs::write(&path, "[scope]\ndomain = \"galaxy\"\n").unwrap();

		assert!(matches!(
			TomlSource::new(&path).load(),
			Err(ConfigError::TomlParse { .. })
		));
	}

	#[test]
	fn test_env_source_reads_known_vars() {
		let source = EnvSource::from_vars([
			(ENV_SECURITY_PROGRAM, "/opt/security"),
			(ENV_DOMAIN, "system"),
			(ENV_ROLE, "default"),
			(ENV_LOG_LEVEL, "debug"),
			(ENV_STATE_DIR, "/var/lib/spare-keys"),
		]);
		let layer = source.load().unwrap();

		assert_eq!(
			layer.security.unwrap().program,
			Some(PathBuf::from("/opt/security"))
		);
		let scope = layer.scope.unwrap();
		assert_eq!(scope.domain, Some(Domain::System));
		assert_eq!(scope.role, Some(KeychainRole::Default));
		assert_eq!(layer.logging.unwrap().level.as_deref(), Some("debug"));
		assert_eq!(layer.state.unwrap().dir, Some(PathBuf::from("/var/lib/spare-keys")));
	}

	#[test]
	fn test_env_source_empty_values_are_unset() {
		let layer = EnvSource::from_vars([(ENV_DOMAIN, ""), (ENV_LOG_LEVEL, "")])
			.load()
			.unwrap();
		assert_eq!(layer.scope.unwrap().domain, None);
		assert_eq!(layer.logging.unwrap().level, None);
	}

	#[test]
	fn test_env_source_invalid_role() {
		let err = EnvSource::from_vars([(ENV_ROLE, "keyring")]).load().unwrap_err();
		match err {
			ConfigError::InvalidValue { key, .. } => assert_eq!(key, ENV_ROLE),
			other => panic!("unexpected error: {other}"),
		}
	}
}
