// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! `use` and `temp`: run a command with a keychain active.

use std::ffi::OsStr;
use std::path::Path;

use anyhow::Result;
use spare_keys::{with_scope, with_temporary_keychain, ScopeOptions, TemporaryKeychainOptions};
use spare_keys_security::SecurityClient;
use tracing::instrument;

use crate::child::{exit_code, run_child};

/// Environment variable holding the temporary keychain's path.
pub const ENV_KEYCHAIN: &str = "SPARE_KEYS_KEYCHAIN";
/// Environment variable holding the temporary keychain's password.
pub const ENV_KEYCHAIN_PASSWORD: &str = "SPARE_KEYS_KEYCHAIN_PASSWORD";

/// Runs `argv` with `keychain` active and returns the child's exit code.
#[instrument(skip(client, argv), fields(keychain = %keychain.display()))]
pub fn use_keychain<C>(client: &C, keychain: &Path, options: &ScopeOptions, argv: &[String]) -> Result<i32>
where
	C: SecurityClient + ?Sized,
{
	let status = with_scope(client, keychain, options, |_| {
		run_child(argv, std::iter::empty::<(&str, &str)>())
	})?;
	Ok(exit_code(status))
}

/// Runs `argv` with a fresh temporary keychain active and returns the
/// child's exit code. The keychain is gone by the time this returns.
#[instrument(skip_all)]
pub fn temporary<C>(client: &C, options: &TemporaryKeychainOptions, argv: &[String]) -> Result<i32>
where
	C: SecurityClient + ?Sized,
{
	let status = with_temporary_keychain(client, options, |path, password| {
		run_child(
			argv,
			[
				(ENV_KEYCHAIN, path.as_os_str()),
				(ENV_KEYCHAIN_PASSWORD, OsStr::new(password.expose())),
			],
		)
	})?;
	Ok(exit_code(status))
}
