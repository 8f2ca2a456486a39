// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! XDG Base Directory compliant path resolution.

use std::path::{Path, PathBuf};

use crate::ConfigError;

const APP_DIR: &str = "spare-keys";

/// Resolved XDG paths for spare-keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
	/// User config file: ~/.config/spare-keys/config.toml
	pub user_config_file: PathBuf,
	/// State directory: ~/.local/state/spare-keys/
	pub state_dir: PathBuf,
}

/// Resolve XDG paths according to the Base Directory Specification.
///
/// Uses `XDG_CONFIG_HOME` and `XDG_STATE_HOME` when set, otherwise
/// `~/.config` and `~/.local/state`.
pub fn resolve_xdg_paths() -> Result<PathsConfig, ConfigError> {
	let home = dirs::home_dir().ok_or(ConfigError::HomeDirNotFound)?;
	let paths = paths_from(
		&home,
		std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
		std::env::var_os("XDG_STATE_HOME").map(PathBuf::from),
	);

	tracing::debug!(
		config_file = %paths.user_config_file.display(),
		state_dir = %paths.state_dir.display(),
		"resolved XDG paths"
	);

	Ok(paths)
}

fn paths_from(home: &Path, config_home: Option<PathBuf>, state_home: Option<PathBuf>) -> PathsConfig {
	// Relative XDG values are ignored.
	let config_home = config_home
		.filter(|p| p.is_absolute())
		.unwrap_or_else(|| home.join(".config"));
	let state_home = state_home
		.filter(|p| p.is_absolute())
		.unwrap_or_else(|| home.join(".local/state"));

	PathsConfig {
		user_config_file: config_home.join(APP_DIR).join("config.toml"),
		state_dir: state_home.join(APP_DIR),
	}
}
