// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use spare_keys_secret::SecretString;

use crate::client::SecurityClient;
use crate::error::SecurityError;
use crate::types::{Domain, KeychainRole, KeychainSettings, SearchList};

/// Operation names accepted by [`MockSecurityClient::fail_on`].
pub mod op {
	pub const LIST_KEYCHAINS: &str = "list-keychains";
	pub const SET_KEYCHAINS: &str = "set-keychains";
	pub const ROLE_KEYCHAIN: &str = "role-keychain";
	pub const SET_ROLE_KEYCHAIN: &str = "set-role-keychain";
	pub const CREATE_KEYCHAIN: &str = "create-keychain";
	pub const DELETE_KEYCHAIN: &str = "delete-keychain";
	pub const UNLOCK_KEYCHAIN: &str = "unlock-keychain";
	pub const SET_KEYCHAIN_SETTINGS: &str = "set-keychain-settings";
	pub const KEYCHAIN_SETTINGS: &str = "show-keychain-info";
}

#[derive(Debug)]
struct MockKeychain {
	password: String,
	settings: KeychainSettings,
	locked: bool,
}

#[derive(Debug, Default)]
struct MockState {
	lists: HashMap<Option<Domain>, SearchList>,
	roles: HashMap<(KeychainRole, Option<Domain>), PathBuf>,
	keychains: HashMap<PathBuf, MockKeychain>,
	failing: HashSet<&'static str>,
	calls: Vec<String>,
}

/// An in-memory keychain configuration for exercising scope logic without
/// touching the real user keychains.
///
/// Search lists and role holders are tracked per domain. Clones share state,
/// so a test can play a concurrent actor by mutating the list through a clone
/// while a scope is active.
#[derive(Clone, Debug, Default)]
pub struct MockSecurityClient {
	state: Arc<Mutex<MockState>>,
}

impl MockSecurityClient {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, MockState> {
		// A panic inside a test scope must not hide the restore that follows.
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	/// Seed the search list for `domain`.
	pub fn with_search_list(self, domain: Option<Domain>, list: SearchList) -> Self {
		self.state().lists.insert(domain, list);
		self
	}

	/// Seed the holder of `role` for `domain`.
	pub fn with_role(self, role: KeychainRole, domain: Option<Domain>, keychain: impl Into<PathBuf>) -> Self {
		self.state().roles.insert((role, domain), keychain.into());
		self
	}

	/// Register an existing keychain with `password`.
	pub fn with_keychain(self, keychain: impl Into<PathBuf>, password: &str) -> Self {
		self.state().keychains.insert(
			keychain.into(),
			MockKeychain {
				password: password.to_string(),
				settings: KeychainSettings {
					lock_on_sleep: true,
					timeout: Some(std::time::Duration::from_secs(300)),
				},
				locked: true,
			},
		);
		self
	}

	/// Make every later call to `operation` fail. See [`op`].
	pub fn fail_on(&self, operation: &'static str) {
		self.state().failing.insert(operation);
	}

	pub fn clear_failures(&self) {
		self.state().failing.clear();
	}

	/// Current search list, as another process would see it.
	pub fn search_list(&self, domain: Option<Domain>) -> SearchList {
		self.state().lists.get(&domain).cloned().unwrap_or_default()
	}

	/// Overwrite the search list, as an unrelated process would.
	pub fn set_search_list(&self, domain: Option<Domain>, list: SearchList) {
		self.state().lists.insert(domain, list);
	}

	pub fn role(&self, role: KeychainRole, domain: Option<Domain>) -> Option<PathBuf> {
		self.state().roles.get(&(role, domain)).cloned()
	}

	pub fn keychain_exists(&self, keychain: &Path) -> bool {
		self.state().keychains.contains_key(keychain)
	}

	pub fn is_unlocked(&self, keychain: &Path) -> bool {
		self
			.state()
			.keychains
			.get(keychain)
			.is_some_and(|k| !k.locked)
	}

	/// Names of the operations performed so far, in order.
	pub fn calls(&self) -> Vec<String> {
		self.state().calls.clone()
	}

	fn begin(&self, operation: &'static str) -> Result<MutexGuard<'_, MockState>, SecurityError> {
		let mut state = self.state();
		state.calls.push(operation.to_string());
		if state.failing.contains(operation) {
			return Err(SecurityError::CommandFailed {
				subcommand: operation.to_string(),
				status: "exit code 1".to_string(),
				stderr: "injected failure".to_string(),
			});
		}
		Ok(state)
	}
}

impl SecurityClient for MockSecurityClient {
	fn list_keychains(&self, domain: Option<Domain>) -> Result<SearchList, SecurityError> {
		let state = self.begin(op::LIST_KEYCHAINS)?;
		Ok(state.lists.get(&domain).cloned().unwrap_or_default())
	}

	fn set_keychains(&self, domain: Option<Domain>, list: &SearchList) -> Result<(), SecurityError> {
		let mut state = self.begin(op::SET_KEYCHAINS)?;
		state.lists.insert(domain, list.clone());
		Ok(())
	}

	fn role_keychain(
		&self,
		role: KeychainRole,
		domain: Option<Domain>,
	) -> Result<Option<PathBuf>, SecurityError> {
		let state = self.begin(op::ROLE_KEYCHAIN)?;
		Ok(state.roles.get(&(role, domain)).cloned())
	}

	fn set_role_keychain(
		&self,
		role: KeychainRole,
		domain: Option<Domain>,
		keychain: &Path,
	) -> Result<(), SecurityError> {
		let mut state = self.begin(op::SET_ROLE_KEYCHAIN)?;
		state.roles.insert((role, domain), keychain.to_path_buf());
		Ok(())
	}

	fn create_keychain(&self, keychain: &Path, password: &SecretString) -> Result<(), SecurityError> {
		let mut state = self.begin(op::CREATE_KEYCHAIN)?;
		if state.keychains.contains_key(keychain) {
			return Err(SecurityError::CommandFailed {
				subcommand: op::CREATE_KEYCHAIN.to_string(),
				status: "exit code 48".to_string(),
				stderr: "A keychain with the same name already exists.".to_string(),
			});
		}
		state.keychains.insert(
			keychain.to_path_buf(),
			MockKeychain {
				password: password.expose().clone(),
				settings: KeychainSettings {
					lock_on_sleep: true,
					timeout: Some(std::time::Duration::from_secs(300)),
				},
				locked: false,
			},
		);
		Ok(())
	}

	fn delete_keychain(&self, keychain: &Path) -> Result<(), SecurityError> {
		let mut state = self.begin(op::DELETE_KEYCHAIN)?;
		if state.keychains.remove(keychain).is_none() {
			return Err(SecurityError::KeychainNotFound(keychain.to_path_buf()));
		}
		for list in state.lists.values_mut() {
			*list = list.without(keychain);
		}
		Ok(())
	}

	fn unlock_keychain(&self, keychain: &Path, password: &SecretString) -> Result<(), SecurityError> {
		let mut state = self.begin(op::UNLOCK_KEYCHAIN)?;
		let entry = state
			.keychains
			.get_mut(keychain)
			.ok_or_else(|| SecurityError::KeychainNotFound(keychain.to_path_buf()))?;
		if entry.password != *password.expose() {
			return Err(SecurityError::CommandFailed {
				subcommand: op::UNLOCK_KEYCHAIN.to_string(),
				status: "exit code 51".to_string(),
				stderr: "The user name or passphrase you entered is not correct.".to_string(),
			});
		}
		entry.locked = false;
		Ok(())
	}

	fn set_keychain_settings(
		&self,
		keychain: &Path,
		settings: &KeychainSettings,
	) -> Result<(), SecurityError> {
		let mut state = self.begin(op::SET_KEYCHAIN_SETTINGS)?;
		let entry = state
			.keychains
			.get_mut(keychain)
			.ok_or_else(|| SecurityError::KeychainNotFound(keychain.to_path_buf()))?;
		entry.settings = *settings;
		Ok(())
	}

	fn keychain_settings(&self, keychain: &Path) -> Result<KeychainSettings, SecurityError> {
		let state = self.begin(op::KEYCHAIN_SETTINGS)?;
		state
			.keychains
			.get(keychain)
			.map(|k| k.settings)
			.ok_or_else(|| SecurityError::KeychainNotFound(keychain.to_path_buf()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_clones_share_state() {
		let client = MockSecurityClient::new();
		let other = client.clone();
		other.set_search_list(None, SearchList::single("/a.keychain"));
		assert_eq!(client.list_keychains(None).unwrap(), SearchList::single("/a.keychain"));
	}

	#[test]
	fn test_domains_are_independent() {
		let client = MockSecurityClient::new()
			.with_search_list(None, SearchList::single("/a"))
			.with_search_list(Some(Domain::System), SearchList::single("/s"));
		client
			.set_keychains(Some(Domain::System), &SearchList::default())
			.unwrap();
		assert_eq!(client.search_list(None), SearchList::single("/a"));
		assert!(client.search_list(Some(Domain::System)).is_empty());
	}

	#[test]
	fn test_fail_on_injects_failure() {
		let client = MockSecurityClient::new();
		client.fail_on(op::LIST_KEYCHAINS);
		assert!(client.list_keychains(None).is_err());
		client.clear_failures();
		assert!(client.list_keychains(None).is_ok());
		assert_eq!(client.calls(), vec!["list-keychains", "list-keychains"]);
	}

	#[test]
	fn test_delete_removes_from_lists() {
		let path = Path::new("/tmp/x.keychain");
		let client = MockSecurityClient::new()
			.with_keychain(path, "pw")
			.with_search_list(None, SearchList::new(vec![path.to_path_buf(), "/a".into()]));
		client.delete_keychain(path).unwrap();
		assert!(!client.keychain_exists(path));
		assert_eq!(client.search_list(None), SearchList::single("/a"));
		assert!(matches!(
			client.keychain_settings(path),
			Err(SecurityError::KeychainNotFound(_))
		));
	}

	#[test]
	fn test_unlock_checks_password() {
		let path = Path::new("/tmp/x.keychain");
		let client = MockSecurityClient::new().with_keychain(path, "pw");
		assert!(client
			.unlock_keychain(path, &SecretString::new("nope".to_string()))
			.is_err());
		assert!(!client.is_unlocked(path));
		client
			.unlock_keychain(path, &SecretString::new("pw".to_string()))
			.unwrap();
		assert!(client.is_unlocked(path));
	}
}
