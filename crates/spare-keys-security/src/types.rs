// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Preference domain passed to `security -d`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
	User,
	System,
	Common,
	Dynamic,
}

impl Domain {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::User => "user",
			Self::System => "system",
			Self::Common => "common",
			Self::Dynamic => "dynamic",
		}
	}
}

impl fmt::Display for Domain {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Domain {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"user" => Ok(Self::User),
			"system" => Ok(Self::System),
			"common" => Ok(Self::Common),
			"dynamic" => Ok(Self::Dynamic),
			other => Err(format!(
				"unknown domain '{other}' (expected user, system, common or dynamic)"
			)),
		}
	}
}

/// A named slot pointing at a single keychain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeychainRole {
	Default,
	Login,
}

impl KeychainRole {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Default => "default",
			Self::Login => "login",
		}
	}

	/// The `security` subcommand that reads and writes this role.
	pub fn subcommand(&self) -> &'static str {
		match self {
			Self::Default => "default-keychain",
			Self::Login => "login-keychain",
		}
	}
}

impl fmt::Display for KeychainRole {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for KeychainRole {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"default" => Ok(Self::Default),
			"login" => Ok(Self::Login),
			other => Err(format!(
				"unknown keychain role '{other}' (expected default or login)"
			)),
		}
	}
}

/// Ordered list of keychains consulted on lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchList(Vec<PathBuf>);

impl SearchList {
	pub fn new(entries: Vec<PathBuf>) -> Self {
		Self(entries)
	}

	/// A list holding only `keychain`.
	pub fn single(keychain: impl Into<PathBuf>) -> Self {
		Self(vec![keychain.into()])
	}

	/// A new list with `keychain` in front of the current entries.
	pub fn prepend(&self, keychain: impl Into<PathBuf>) -> Self {
		let mut entries = Vec::with_capacity(self.0.len() + 1);
		entries.push(keychain.into());
		entries.extend(self.0.iter().cloned());
		Self(entries)
	}

	/// A new list with every entry equal to `keychain` removed.
	pub fn without(&self, keychain: &Path) -> Self {
		Self(
			self
				.0
				.iter()
				.filter(|entry| entry.as_path() != keychain)
				.cloned()
				.collect(),
		)
	}

	pub fn contains(&self, keychain: &Path) -> bool {
		self.0.iter().any(|entry| entry.as_path() == keychain)
	}

	pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
		self.0.iter()
	}

	pub fn as_slice(&self) -> &[PathBuf] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn into_inner(self) -> Vec<PathBuf> {
		self.0
	}
}

impl fmt::Display for SearchList {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, entry) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str(" ")?;
			}
			write!(f, "\"{}\"", entry.display())?;
		}
		Ok(())
	}
}

impl<P: Into<PathBuf>> FromIterator<P> for SearchList {
	fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
		Self(iter.into_iter().map(Into::into).collect())
	}
}

/// Lock behaviour of a keychain as reported by `show-keychain-info`.
///
/// The default value is "never auto-lock".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeychainSettings {
	pub lock_on_sleep: bool,
	pub timeout: Option<Duration>,
}

impl KeychainSettings {
	/// No timeout and no lock on sleep.
	pub fn no_timeout() -> Self {
		Self::default()
	}

	pub fn has_timeout(&self) -> bool {
		self.timeout.is_some()
	}

	/// Flags for `set-keychain-settings`. An empty list means no auto-lock.
	pub fn to_args(&self) -> Vec<String> {
		let mut args = Vec::new();
		if self.lock_on_sleep {
			args.push("-l".to_string());
		}
		if let Some(timeout) = self.timeout {
			args.push("-u".to_string());
			args.push("-t".to_string());
			args.push(timeout.as_secs().to_string());
		}
		args
	}
}

/// On-disk keychain format, which decides the file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeychainFormat {
	/// `.keychain`, used before macOS 10.12.
	Legacy,
	/// `.keychain-db`, introduced with macOS 10.12 (Darwin 16).
	Database,
}

/// First Darwin major release that writes `.keychain-db` files.
pub const DATABASE_FORMAT_DARWIN_MAJOR: u32 = 16;

impl KeychainFormat {
	pub fn extension(&self) -> &'static str {
		match self {
			Self::Legacy => ".keychain",
			Self::Database => ".keychain-db",
		}
	}

	pub fn for_darwin_major(major: u32) -> Self {
		if major >= DATABASE_FORMAT_DARWIN_MAJOR {
			Self::Database
		} else {
			Self::Legacy
		}
	}
}
