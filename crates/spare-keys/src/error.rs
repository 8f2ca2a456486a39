// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Error types for keychain scopes.
//!
//! Failures fall into three groups:
//!
//! - [`KeychainError`]: activating a configuration failed. Activation is a
//!   sequence of separate tool calls and is not rolled back, so a failure
//!   part-way through leaves the earlier steps applied.
//! - [`CleanupError`]: one or more teardown steps failed. Every step is
//!   attempted; each failure is recorded.
//! - [`ScopeError`]: the outcome of a scoped unit of work, keeping the work's
//!   own error separate from any cleanup failure.

use std::fmt;
use std::path::PathBuf;

use spare_keys_security::SecurityError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeychainError {
	#[error(transparent)]
	Security(#[from] SecurityError),

	#[error("could not determine home directory")]
	HomeDirNotFound,

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

/// A teardown step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CleanupStep {
	RestoreRole,
	RestoreSearchList,
	DeleteKeychain,
}

impl fmt::Display for CleanupStep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::RestoreRole => "restore keychain role",
			Self::RestoreSearchList => "restore search list",
			Self::DeleteKeychain => "delete temporary keychain",
		})
	}
}

#[derive(Debug, Error)]
#[error("{step} failed for {}: {source}", .keychain.display())]
pub struct CleanupFailure {
	pub step: CleanupStep,
	pub keychain: PathBuf,
	#[source]
	pub source: SecurityError,
}

/// Every teardown step that failed, in the order they were attempted.
#[derive(Debug, Default)]
pub struct CleanupError {
	pub failures: Vec<CleanupFailure>,
}

impl CleanupError {
	pub fn push(&mut self, step: CleanupStep, keychain: impl Into<PathBuf>, source: SecurityError) {
		self.failures.push(CleanupFailure {
			step,
			keychain: keychain.into(),
			source,
		});
	}

	pub fn extend(&mut self, other: CleanupError) {
		self.failures.extend(other.failures);
	}

	pub fn is_empty(&self) -> bool {
		self.failures.is_empty()
	}

	pub fn has_step(&self, step: CleanupStep) -> bool {
		self.failures.iter().any(|f| f.step == step)
	}

	/// `Ok` when nothing failed.
	pub fn into_result(self) -> Result<(), CleanupError> {
		if self.is_empty() {
			Ok(())
		} else {
			Err(self)
		}
	}
}

impl fmt::Display for CleanupError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("keychain cleanup failed")?;
		for (i, failure) in self.failures.iter().enumerate() {
			f.write_str(if i == 0 { ": " } else { "; " })?;
			write!(f, "{failure}")?;
		}
		Ok(())
	}
}

impl std::error::Error for CleanupError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self.failures.first().map(|f| f as &(dyn std::error::Error + 'static))
	}
}

/// Activation failed. `cleanup` holds failures from undoing whatever had
/// already been created, such as a temporary keychain.
#[derive(Debug, Error)]
#[error("failed to activate keychain configuration: {source}{}", describe_cleanup(.cleanup))]
pub struct SetupError {
	#[source]
	pub source: KeychainError,
	pub cleanup: Option<CleanupError>,
}

fn describe_cleanup(cleanup: &Option<CleanupError>) -> String {
	match cleanup {
		Some(cleanup) => format!(" (and {cleanup})"),
		None => String::new(),
	}
}

impl From<KeychainError> for SetupError {
	fn from(source: KeychainError) -> Self {
		Self {
			source,
			cleanup: None,
		}
	}
}

impl From<SecurityError> for SetupError {
	fn from(source: SecurityError) -> Self {
		KeychainError::from(source).into()
	}
}

/// Outcome of running a unit of work inside a scope.
///
/// `Work` carries the caller's own error unchanged when teardown succeeded.
#[derive(Debug)]
pub enum ScopeError<E> {
	Setup(SetupError),
	Work(E),
	Cleanup(CleanupError),
	WorkAndCleanup { work: E, cleanup: CleanupError },
}

impl<E: fmt::Display> fmt::Display for ScopeError<E> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Setup(setup) => write!(f, "{setup}"),
			Self::Work(work) => write!(f, "{work}"),
			Self::Cleanup(cleanup) => write!(f, "{cleanup}"),
			Self::WorkAndCleanup { work, cleanup } => write!(f, "{work} (and {cleanup})"),
		}
	}
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for ScopeError<E> {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Self::Setup(setup) => Some(setup),
			Self::Cleanup(cleanup) | Self::WorkAndCleanup { cleanup, .. } => Some(cleanup),
			Self::Work(_) => None,
		}
	}
}

impl<E> ScopeError<E> {
	/// Combine the work outcome with the teardown outcome.
	pub fn settle<T>(outcome: Result<T, E>, cleanup: Result<(), CleanupError>) -> Result<T, Self> {
		match (outcome, cleanup) {
			(Ok(value), Ok(())) => Ok(value),
			(Ok(_), Err(cleanup)) => Err(Self::Cleanup(cleanup)),
			(Err(work), Ok(())) => Err(Self::Work(work)),
			(Err(work), Err(cleanup)) => Err(Self::WorkAndCleanup { work, cleanup }),
		}
	}

	/// Fold a later teardown failure into an existing outcome.
	pub fn merge_cleanup<T>(result: Result<T, Self>, cleanup: Result<(), CleanupError>) -> Result<T, Self> {
		match cleanup {
			Ok(()) => result,
			Err(later) => Err(match result {
				Ok(_) => Self::Cleanup(later),
				Err(err) => err.with_cleanup(later),
			}),
		}
	}

	fn with_cleanup(self, later: CleanupError) -> Self {
		match self {
			Self::Setup(mut setup) => {
				match setup.cleanup.as_mut() {
					Some(existing) => existing.extend(later),
					None => setup.cleanup = Some(later),
				}
				Self::Setup(setup)
			}
			Self::Work(work) => Self::WorkAndCleanup {
				work,
				cleanup: later,
			},
			Self::Cleanup(mut cleanup) => {
				cleanup.extend(later);
				Self::Cleanup(cleanup)
			}
			Self::WorkAndCleanup { work, mut cleanup } => {
				cleanup.extend(later);
				Self::WorkAndCleanup { work, cleanup }
			}
		}
	}

	/// The caller's error, if the work itself failed.
	pub fn work_error(&self) -> Option<&E> {
		match self {
			Self::Work(work) | Self::WorkAndCleanup { work, .. } => Some(work),
			_ => None,
		}
	}

	pub fn into_work_error(self) -> Option<E> {
		match self {
			Self::Work(work) | Self::WorkAndCleanup { work, .. } => Some(work),
			_ => None,
		}
	}

	/// Teardown failures, from either the scope or an aborted setup.
	pub fn cleanup_error(&self) -> Option<&CleanupError> {
		match self {
			Self::Cleanup(cleanup) | Self::WorkAndCleanup { cleanup, .. } => Some(cleanup),
			Self::Setup(setup) => setup.cleanup.as_ref(),
			Self::Work(_) => None,
		}
	}
}

impl<E> From<SetupError> for ScopeError<E> {
	fn from(err: SetupError) -> Self {
		Self::Setup(err)
	}
}
