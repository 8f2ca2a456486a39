// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

pub mod run;
pub mod session;
pub mod show;

use clap::Args;
use spare_keys::ScopeOptions;
use spare_keys_security::KeychainRole;

/// Flags shared by every command that activates a keychain.
#[derive(Debug, Clone, Default, Args)]
pub struct ScopeArgs {
	/// Make the keychain the only entry on the search list
	#[arg(long)]
	pub clear_list: bool,

	/// Also make the keychain the default or login keychain
	#[arg(long, value_name = "ROLE")]
	pub role: Option<KeychainRole>,
}

impl ScopeArgs {
	/// Layers these flags over the configured defaults.
	pub fn apply(&self, base: ScopeOptions) -> ScopeOptions {
		let mut options = base;
		if self.clear_list {
			options.clear_list = true;
		}
		if let Some(role) = self.role {
			options.role = Some(role);
		}
		options
	}
}
