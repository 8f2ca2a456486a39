// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while talking to the `security` tool.
///
/// None of the variants carry the full argument list, so keychain passwords
/// passed with `-p` never end up in an error message.
#[derive(Debug, Error)]
pub enum SecurityError {
	#[error("security tool not found: {}", .0.display())]
	NotInstalled(PathBuf),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("security {subcommand} failed ({status}): {stderr}")]
	CommandFailed {
		subcommand: String,
		status: String,
		stderr: String,
	},

	#[error("unexpected output from {subcommand}: {output:?}")]
	UnexpectedOutput { subcommand: String, output: String },

	#[error("keychain not found: {}", .0.display())]
	KeychainNotFound(PathBuf),
}

impl SecurityError {
	pub fn unexpected_output(subcommand: impl Into<String>, output: impl Into<String>) -> Self {
		Self::UnexpectedOutput {
			subcommand: subcommand.into(),
			output: output.into(),
		}
	}
}
