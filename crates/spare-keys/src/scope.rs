// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Scoped keychain activation.
//!
//! [`enter_scope`] captures the search list (and optionally a role holder),
//! puts the requested keychain in front, and returns a [`KeychainScope`]
//! guard. [`KeychainScope::exit`] undoes the change and reports failures;
//! dropping the guard without calling `exit` restores as well and logs any
//! failure. [`with_scope`] wraps a unit of work in both.
//!
//! The search list is shared by every process of the user. When the list was
//! not cleared, exit re-reads it and only removes the keychain this scope
//! added, so entries other processes added in the meantime survive. Scopes
//! nest, but must be exited in the reverse order they were entered.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use spare_keys_security::{Domain, KeychainRole, SearchList, SecurityClient};
use tracing::{debug, error, instrument, warn};

use crate::error::{CleanupError, CleanupStep, KeychainError, ScopeError, SetupError};
use crate::path::expand_keychain_path;

/// How a keychain is activated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeOptions {
	/// Make the keychain the only search list entry instead of prepending it.
	pub clear_list: bool,
	/// Also point this role at the keychain.
	pub role: Option<KeychainRole>,
	pub domain: Option<Domain>,
}

impl ScopeOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn clear_list(mut self, clear_list: bool) -> Self {
		self.clear_list = clear_list;
		self
	}

	pub fn role(mut self, role: impl Into<Option<KeychainRole>>) -> Self {
		self.role = role.into();
		self
	}

	pub fn domain(mut self, domain: impl Into<Option<Domain>>) -> Self {
		self.domain = domain.into();
		self
	}
}

/// Everything needed to undo one activation.
///
/// Plain data so that it can be persisted when teardown happens in a later
/// process (see [`KeychainScope::detach`]).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeState {
	pub keychain: PathBuf,
	pub original_list: SearchList,
	/// Holder of `role` before activation. Only meaningful when `role` is set.
	pub original_role_holder: Option<PathBuf>,
	pub role: Option<KeychainRole>,
	pub domain: Option<Domain>,
	pub clear_list: bool,
}

impl ScopeState {
	/// The search list to write back, given the list as it is now.
	///
	/// A cleared list is replaced by the snapshot: nothing could have used it
	/// meaningfully while it held a single entry. Otherwise only this scope's
	/// keychain is removed from the current list.
	pub fn restored_list(&self, current: &SearchList) -> SearchList {
		if self.clear_list {
			self.original_list.clone()
		} else {
			current.without(&self.keychain)
		}
	}

	/// Undo the activation.
	///
	/// The role and the search list are restored independently: a failure
	/// restoring one does not stop the other from being attempted.
	#[instrument(skip_all, fields(keychain = %self.keychain.display()))]
	pub fn restore<C>(&self, client: &C) -> Result<(), CleanupError>
	where
		C: SecurityClient + ?Sized,
	{
		let mut cleanup = CleanupError::default();

		if let Some(role) = self.role {
			match &self.original_role_holder {
				Some(holder) => {
					if let Err(e) = client.set_role_keychain(role, self.domain, holder) {
						warn!(role = %role, error = %e, "failed to restore keychain role");
						cleanup.push(CleanupStep::RestoreRole, &self.keychain, e);
					}
				}
				None => {
					warn!(role = %role, "no keychain held the role before activation; leaving it as is");
				}
			}
		}

		let list = if self.clear_list {
			Ok(self.original_list.clone())
		} else {
			client
				.list_keychains(self.domain)
				.map(|current| self.restored_list(&current))
		};
		match list.and_then(|list| client.set_keychains(self.domain, &list).map(|()| list)) {
			Ok(list) => debug!(list = %list, "restored keychain search list"),
			Err(e) => {
				warn!(error = %e, "failed to restore keychain search list");
				cleanup.push(CleanupStep::RestoreSearchList, &self.keychain, e);
			}
		}

		cleanup.into_result()
	}
}

/// An active keychain scope. Restores the previous configuration when exited
/// or dropped.
#[must_use = "dropping the scope immediately restores the previous configuration"]
pub struct KeychainScope<'a, C>
where
	C: SecurityClient + ?Sized,
{
	client: &'a C,
	state: ScopeState,
	armed: bool,
}

impl<'a, C> KeychainScope<'a, C>
where
	C: SecurityClient + ?Sized,
{
	/// The activated keychain, after path expansion.
	pub fn keychain(&self) -> &Path {
		&self.state.keychain
	}

	pub fn state(&self) -> &ScopeState {
		&self.state
	}

	/// Restore the previous configuration.
	pub fn exit(mut self) -> Result<(), CleanupError> {
		self.armed = false;
		self.state.restore(self.client)
	}

	/// Leave the configuration active and hand back what is needed to restore
	/// it later with [`ScopeState::restore`]. Restoring becomes the caller's
	/// job, in reverse order of activation.
	pub fn detach(mut self) -> ScopeState {
		self.armed = false;
		self.state.clone()
	}
}

impl<C> Drop for KeychainScope<'_, C>
where
	C: SecurityClient + ?Sized,
{
	fn drop(&mut self) {
		if !self.armed {
			return;
		}
		if let Err(e) = self.state.restore(self.client) {
			error!(
				keychain = %self.state.keychain.display(),
				error = %e,
				"failed to restore keychain configuration"
			);
		}
	}
}

/// Activate `keychain` and return a guard that restores the previous
/// configuration.
///
/// The steps are separate tool calls and are not rolled back if a later one
/// fails: an error after the role was switched leaves the role switched.
#[instrument(skip(client, keychain), fields(keychain = %keychain.as_ref().display()))]
pub fn enter_scope<'a, C>(
	client: &'a C,
	keychain: impl AsRef<Path>,
	options: &ScopeOptions,
) -> Result<KeychainScope<'a, C>, KeychainError>
where
	C: SecurityClient + ?Sized,
{
	let keychain = expand_keychain_path(keychain)?;
	let original_list = client.list_keychains(options.domain)?;

	let original_role_holder = match options.role {
		Some(role) => {
			let holder = client.role_keychain(role, options.domain)?;
			client.set_role_keychain(role, options.domain, &keychain)?;
			holder
		}
		None => None,
	};

	let list = if options.clear_list {
		SearchList::single(&keychain)
	} else {
		original_list.prepend(&keychain)
	};
	client.set_keychains(options.domain, &list)?;

	debug!(
		list = %list,
		role = ?options.role,
		domain = ?options.domain,
		"activated keychain"
	);

	Ok(KeychainScope {
		client,
		state: ScopeState {
			keychain,
			original_list,
			original_role_holder,
			role: options.role,
			domain: options.domain,
			clear_list: options.clear_list,
		},
		armed: true,
	})
}

/// Run `work` with `keychain` active, restoring the previous configuration
/// afterwards whether `work` succeeds, fails or panics.
///
/// `work` receives the expanded keychain path.
pub fn with_scope<C, T, E, F>(
	client: &C,
	keychain: impl AsRef<Path>,
	options: &ScopeOptions,
	work: F,
) -> Result<T, ScopeError<E>>
where
	C: SecurityClient + ?Sized,
	F: FnOnce(&Path) -> Result<T, E>,
{
	let scope = enter_scope(client, keychain, options).map_err(SetupError::from)?;
	let outcome = work(scope.keychain());
	ScopeError::settle(outcome, scope.exit())
}
