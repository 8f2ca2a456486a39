// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! On-disk stack of scopes opened with `enter` and not yet closed with `exit`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use spare_keys::ScopeState;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const STACK_FILE: &str = "scopes.json";
const LOCK_FILE: &str = "scopes.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
	/// An existing keychain; left on disk when the scope closes.
	Existing,
	/// Created by `enter`; deleted when the scope closes.
	Temporary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackEntry {
	pub kind: ScopeKind,
	pub scope: ScopeState,
	pub entered_at: DateTime<Utc>,
	pub pid: u32,
}

impl StackEntry {
	pub fn new(kind: ScopeKind, scope: ScopeState) -> Self {
		Self {
			kind,
			scope,
			entered_at: Utc::now(),
			pid: std::process::id(),
		}
	}
}

/// LIFO stack persisted as JSON under the state directory.
///
/// Every modification holds an exclusive lock on `scopes.lock` for the whole
/// read-modify-write, so concurrent `enter`/`exit` processes never lose
/// records.
#[derive(Debug, Clone)]
pub struct ScopeStack {
	path: PathBuf,
}

impl ScopeStack {
	pub fn in_dir(state_dir: &Path) -> Self {
		Self {
			path: state_dir.join(STACK_FILE),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	fn dir(&self) -> &Path {
		self.path.parent().unwrap_or_else(|| Path::new("."))
	}

	/// Reads the stack without locking. The file is only ever replaced
	/// whole, so this never sees a partial write.
	pub fn load(&self) -> Result<Vec<StackEntry>> {
		if !self.path.exists() {
			return Ok(Vec::new());
		}
		let content = fs::read_to_string(&self.path)
			.with_context(|| format!("failed to read {}", self.path.display()))?;
		if content.trim().is_empty() {
			return Ok(Vec::new());
		}
		serde_json::from_str(&content)
			.with_context(|| format!("failed to parse {}", self.path.display()))
	}

	/// Pushes `entry` and returns the new depth.
	pub fn push(&self, entry: StackEntry) -> Result<usize> {
		self.update(|entries| {
			entries.push(entry);
			Ok(entries.len())
		})
	}

	/// Removes and returns the most recent entry with the remaining depth.
	///
	/// With `expected`, the top entry must be for that keychain; otherwise
	/// nothing is removed. The check and the removal happen under one lock.
	pub fn pop(&self, expected: Option<&Path>) -> Result<Option<(StackEntry, usize)>> {
		self.update(|entries| {
			let Some(top) = entries.last() else {
				return Ok(None);
			};
			if let Some(expected) = expected {
				if expected != top.scope.keychain {
					bail!(
						"most recent scope is for {}, not {}; exit scopes in reverse order",
						top.scope.keychain.display(),
						expected.display()
					);
				}
			}
			Ok(entries.pop().map(|top| (top, entries.len())))
		})
	}

	/// Runs `f` on the current entries under the stack lock and saves the
	/// result if `f` succeeds.
	fn update<T>(&self, f: impl FnOnce(&mut Vec<StackEntry>) -> Result<T>) -> Result<T> {
		let _lock = self.lock()?;
		let mut entries = self.load()?;
		let before = entries.clone();
		let value = f(&mut entries)?;
		if entries != before {
			self.save(&entries)?;
		}
		Ok(value)
	}

	fn lock(&self) -> Result<StackLock> {
		let dir = self.dir();
		fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

		let lock_path = dir.join(LOCK_FILE);
		let file = OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(false)
			.open(&lock_path)
			.with_context(|| format!("failed to open {}", lock_path.display()))?;
		file.lock_exclusive()
			.with_context(|| format!("failed to lock {}", lock_path.display()))?;
		Ok(StackLock { file })
	}

	fn save(&self, entries: &[StackEntry]) -> Result<()> {
		let mut tmp = NamedTempFile::new_in(self.dir())
			.with_context(|| format!("failed to create temp file in {}", self.dir().display()))?;
		serde_json::to_writer_pretty(&mut tmp, entries)?;
		tmp.write_all(b"\n")?;
		tmp.persist(&self.path)
			.with_context(|| format!("failed to replace {}", self.path.display()))?;

		debug!(path = %self.path.display(), depth = entries.len(), "saved scope stack");
		Ok(())
	}
}

/// Held for the duration of a stack update.
struct StackLock {
	file: File,
}

impl Drop for StackLock {
	fn drop(&mut self) {
		if let Err(e) = self.file.unlock() {
			warn!(error = %e, "failed to unlock scope stack");
		}
	}
}
