// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! `enter` and `exit`: keychain scopes that span several processes.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use spare_keys::{
	enter_scope, enter_temporary_keychain, expand_keychain_path, release_temporary_keychain,
	ScopeOptions, ScopeState, TemporaryKeychainOptions,
};
use spare_keys_security::SecurityClient;
use tracing::{error, info};

use crate::stack::{ScopeKind, ScopeStack, StackEntry};

/// Printed by `enter` as a single JSON object.
#[derive(Debug, Serialize)]
pub struct EnterOutput {
	pub keychain: PathBuf,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub password: Option<String>,
	pub depth: usize,
}

/// Activate `keychain` and record the scope so a later `exit` can undo it.
pub fn enter_existing<C>(
	client: &C,
	stack: &ScopeStack,
	keychain: &Path,
	options: &ScopeOptions,
) -> Result<EnterOutput>
where
	C: SecurityClient + ?Sized,
{
	let state = enter_scope(client, keychain, options)
		.with_context(|| format!("failed to activate {}", keychain.display()))?
		.detach();
	let keychain = state.keychain.clone();
	let depth = record(client, stack, ScopeKind::Existing, state)?;

	info!(keychain = %keychain.display(), depth, "entered keychain scope");
	Ok(EnterOutput {
		keychain,
		password: None,
		depth,
	})
}

/// Create and activate a temporary keychain and record it for `exit`.
pub fn enter_temporary<C>(
	client: &C,
	stack: &ScopeStack,
	options: &TemporaryKeychainOptions,
) -> Result<EnterOutput>
where
	C: SecurityClient + ?Sized,
{
	let detached = enter_temporary_keychain(client, options)
		.context("failed to set up temporary keychain")?;
	let keychain = detached.path.clone();
	let password = detached.password.expose().clone();
	let depth = record(client, stack, ScopeKind::Temporary, detached.scope)?;

	info!(keychain = %keychain.display(), depth, "entered temporary keychain scope");
	Ok(EnterOutput {
		keychain,
		password: Some(password),
		depth,
	})
}

/// Push `state`; if that fails, undo the activation so nothing is left
/// untracked.
fn record<C>(client: &C, stack: &ScopeStack, kind: ScopeKind, state: ScopeState) -> Result<usize>
where
	C: SecurityClient + ?Sized,
{
	match stack.push(StackEntry::new(kind, state.clone())) {
		Ok(depth) => Ok(depth),
		Err(e) => {
			if let Err(cleanup) = release(client, kind, &state) {
				error!(error = %cleanup, "failed to undo keychain activation");
			}
			Err(e)
		}
	}
}

/// Printed by `exit` as a single JSON object.
#[derive(Debug, Serialize)]
pub struct ExitOutput {
	pub keychain: PathBuf,
	pub deleted: bool,
	pub depth: usize,
}

/// Pop the most recent scope and restore what it changed.
///
/// With `expected`, refuses to pop unless the top scope is for that
/// keychain; the check and the removal are one locked update. The record
/// is removed before restoring, so a failed restore is reported once and
/// not retried.
pub fn exit<C>(client: &C, stack: &ScopeStack, expected: Option<&Path>) -> Result<ExitOutput>
where
	C: SecurityClient + ?Sized,
{
	let expected = expected.map(|p| expand_keychain_path(p)).transpose()?;
	let Some((top, depth)) = stack.pop(expected.as_deref())? else {
		bail!("no keychain scope to exit");
	};

	release(client, top.kind, &top.scope)
		.with_context(|| format!("failed to restore after {}", top.scope.keychain.display()))?;

	info!(keychain = %top.scope.keychain.display(), depth, "exited keychain scope");
	Ok(ExitOutput {
		keychain: top.scope.keychain,
		deleted: top.kind == ScopeKind::Temporary,
		depth,
	})
}

fn release<C>(client: &C, kind: ScopeKind, state: &ScopeState) -> Result<(), spare_keys::CleanupError>
where
	C: SecurityClient + ?Sized,
{
	match kind {
		ScopeKind::Existing => state.restore(client),
		ScopeKind::Temporary => release_temporary_keychain(client, state),
	}
}
