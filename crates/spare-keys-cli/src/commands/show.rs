// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! `show`: current keychain configuration.

use std::fmt;
use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use spare_keys_security::{Domain, KeychainRole, SearchList, SecurityClient};

use crate::stack::ScopeStack;

#[derive(Debug, Serialize)]
pub struct Snapshot {
	pub domain: Option<Domain>,
	pub search_list: SearchList,
	pub default_keychain: Option<PathBuf>,
	pub login_keychain: Option<PathBuf>,
	/// Scopes opened with `enter` and not yet exited.
	pub open_scopes: usize,
}

pub fn snapshot<C>(client: &C, stack: &ScopeStack, domain: Option<Domain>) -> Result<Snapshot>
where
	C: SecurityClient + ?Sized,
{
	Ok(Snapshot {
		domain,
		search_list: client.list_keychains(domain)?,
		default_keychain: client.role_keychain(KeychainRole::Default, domain)?,
		login_keychain: client.role_keychain(KeychainRole::Login, domain)?,
		open_scopes: stack.load()?.len(),
	})
}

impl fmt::Display for Snapshot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fn holder(path: &Option<PathBuf>) -> String {
			path.as_ref()
				.map(|p| p.display().to_string())
				.unwrap_or_else(|| "(none)".to_string())
		}

		if let Some(domain) = self.domain {
			writeln!(f, "domain: {domain}")?;
		}
		writeln!(f, "search list:")?;
		if self.search_list.is_empty() {
			writeln!(f, "    (empty)")?;
		}
		for keychain in self.search_list.iter() {
			writeln!(f, "    {}", keychain.display())?;
		}
		writeln!(f, "default keychain: {}", holder(&self.default_keychain))?;
		writeln!(f, "login keychain: {}", holder(&self.login_keychain))?;
		write!(f, "open scopes: {}", self.open_scopes)
	}
}
