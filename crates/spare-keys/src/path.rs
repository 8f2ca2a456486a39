// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Keychain path expansion.

use std::path::{Component, Path, PathBuf};

use crate::error::KeychainError;

/// Per-user keychain directory, relative to the home directory.
pub const USER_KEYCHAINS_DIR: &str = "Library/Keychains";

/// Turns a keychain argument into the identifier `security` reports.
///
/// - A bare file name (`build.keychain`) lives in `~/Library/Keychains`.
/// - `~` and `~/...` are expanded against the home directory.
/// - Anything else is made absolute against the current directory.
///
/// `.` and `..` are resolved lexically; symlinks are left alone.
pub fn expand_keychain_path(path: impl AsRef<Path>) -> Result<PathBuf, KeychainError> {
	resolve(path.as_ref(), dirs::home_dir, std::env::current_dir)
}

fn resolve(
	path: &Path,
	home: impl FnOnce() -> Option<PathBuf>,
	cwd: impl FnOnce() -> std::io::Result<PathBuf>,
) -> Result<PathBuf, KeychainError> {
	if is_bare_name(path) {
		let home = home().ok_or(KeychainError::HomeDirNotFound)?;
		return Ok(home.join(USER_KEYCHAINS_DIR).join(path));
	}

	let mut components = path.components();
	let expanded = match components.next() {
		Some(Component::Normal(first)) if first == "~" => {
			let home = home().ok_or(KeychainError::HomeDirNotFound)?;
			home.join(components.as_path())
		}
		_ => path.to_path_buf(),
	};

	let absolute = if expanded.is_absolute() {
		expanded
	} else {
		cwd()?.join(expanded)
	};

	Ok(normalize(&absolute))
}

fn is_bare_name(path: &Path) -> bool {
	let mut components = path.components();
	matches!(
		(components.next(), components.next()),
		(Some(Component::Normal(name)), None) if name != "~"
	)
}

fn normalize(path: &Path) -> PathBuf {
	let mut normalized = PathBuf::new();
	for component in path.components() {
		match component {
			Component::CurDir => {}
			Component::ParentDir => {
				normalized.pop();
			}
			other => normalized.push(other.as_os_str()),
		}
	}
	normalized
}

#[cfg(test)]
mod tests {
	use super::*;

	fn home() -> Option<PathBuf> {
		Some(PathBuf::from("/Users/dev"))
	}

	fn cwd() -> std::io::Result<PathBuf> {
		Ok(PathBuf::from("/work/project"))
	}

	fn resolved(path: &str) -> PathBuf {
		resolve(Path::new(path), home, cwd).unwrap()
	}

	/// Test: a bare name resolves into the user's keychain directory.
	///
	/// Why this test is important: the identifier put on the search list must
	/// be the same string the tool reports later, or the exact-match removal
	/// at scope exit would miss it.
	#[test]
	fn test_bare_name_goes_to_user_keychains() {
		assert_eq!(
			resolved("build.keychain"),
			PathBuf::from("/Users/dev/Library/Keychains/build.keychain")
		);
	}

	#[test]
	fn test_absolute_path_is_kept() {
		assert_eq!(
			resolved("/tmp/example.keychain"),
			PathBuf::from("/tmp/example.keychain")
		);
	}

	#[test]
	fn test_relative_path_uses_cwd() {
		assert_eq!(
			resolved("keys/ci.keychain"),
			PathBuf::from("/work/project/keys/ci.keychain")
		);
		assert_eq!(
			resolved("./ci.keychain"),
			PathBuf::from("/work/project/ci.keychain")
		);
	}

	#[test]
	fn test_tilde_and_dots() {
		assert_eq!(
			resolved("~/keys/../ci.keychain"),
			PathBuf::from("/Users/dev/ci.keychain")
		);
		assert_eq!(resolved("~"), PathBuf::from("/Users/dev"));
		assert_eq!(
			resolved("/tmp/./a/../b.keychain"),
			PathBuf::from("/tmp/b.keychain")
		);
	}

	#[test]
	fn test_absolute_path_needs_no_home_or_cwd() {
		let path = resolve(
			Path::new("/tmp/x.keychain"),
			|| None,
			|| Err(std::io::Error::from(std::io::ErrorKind::NotFound)),
		)
		.unwrap();
		assert_eq!(path, PathBuf::from("/tmp/x.keychain"));
	}

	#[test]
	fn test_missing_home_is_reported() {
		let err = resolve(Path::new("x.keychain"), || None, cwd).unwrap_err();
		assert!(matches!(err, KeychainError::HomeDirNotFound));
	}
}
