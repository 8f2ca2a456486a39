// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Parsers for the textual output of `security`.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::SecurityError;
use crate::types::{KeychainSettings, SearchList};

/// Splits tool output into keychain identifiers.
///
/// `security` prints one double-quoted path per line. Quoted tokens are taken
/// verbatim, so paths containing spaces survive. Output without any quote is
/// split on whitespace.
pub fn parse_keychain_list(subcommand: &str, output: &str) -> Result<SearchList, SecurityError> {
	if !output.contains('"') {
		return Ok(output.split_whitespace().collect());
	}

	let mut entries = Vec::new();
	let mut rest = output;
	while let Some(start) = rest.find('"') {
		let after = &rest[start + 1..];
		let end = after
			.find('"')
			.ok_or_else(|| SecurityError::unexpected_output(subcommand, output))?;
		entries.push(PathBuf::from(&after[..end]));
		rest = &after[end + 1..];
	}
	Ok(SearchList::new(entries))
}

/// Parses the holder of a keychain role. Empty output means no holder.
pub fn parse_single_keychain(
	subcommand: &str,
	output: &str,
) -> Result<Option<PathBuf>, SecurityError> {
	let list = parse_keychain_list(subcommand, output)?;
	match list.len() {
		0 => Ok(None),
		1 => Ok(list.into_inner().into_iter().next()),
		_ => Err(SecurityError::unexpected_output(subcommand, output)),
	}
}

/// Parses `show-keychain-info` output, e.g.
/// `Keychain "/path/x.keychain-db" lock-sleep timeout=300s`.
pub fn parse_keychain_settings(output: &str) -> Result<KeychainSettings, SecurityError> {
	let unexpected = || SecurityError::unexpected_output("show-keychain-info", output);

	// Skip the quoted path so a keychain named "no-timeout" cannot confuse us.
	let flags = match output.rfind('"') {
		Some(idx) => &output[idx + 1..],
		None => output,
	};

	let mut settings = KeychainSettings::default();
	let mut saw_timeout = false;
	for token in flags.split_whitespace() {
		match token {
			"lock-sleep" => settings.lock_on_sleep = true,
			"no-timeout" => saw_timeout = true,
			_ => {
				if let Some(value) = token.strip_prefix("timeout=") {
					let secs: u64 = value
						.trim_end_matches('s')
						.parse()
						.map_err(|_| unexpected())?;
					settings.timeout = Some(Duration::from_secs(secs));
					saw_timeout = true;
				}
			}
		}
	}

	if saw_timeout {
		Ok(settings)
	} else {
		Err(unexpected())
	}
}

/// Extracts the Darwin major version from `sysctl -n kern.osrelease`.
pub fn parse_darwin_major(output: &str) -> Result<u32, SecurityError> {
	output
		.trim()
		.split('.')
		.next()
		.and_then(|major| major.parse().ok())
		.ok_or_else(|| SecurityError::unexpected_output("sysctl kern.osrelease", output))
}
