// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::path::{Path, PathBuf};

use spare_keys_secret::SecretString;

use crate::error::SecurityError;
use crate::types::{Domain, KeychainRole, KeychainSettings, SearchList};

/// Trait abstracting keychain configuration operations for testability.
///
/// Every call blocks until the operation has completed. `domain: None` means
/// the tool's implicit domain.
pub trait SecurityClient {
	/// Read the keychain search list.
	fn list_keychains(&self, domain: Option<Domain>) -> Result<SearchList, SecurityError>;

	/// Replace the keychain search list. An empty list is allowed.
	fn set_keychains(&self, domain: Option<Domain>, list: &SearchList) -> Result<(), SecurityError>;

	/// Read the keychain currently holding `role`, if any.
	fn role_keychain(
		&self,
		role: KeychainRole,
		domain: Option<Domain>,
	) -> Result<Option<PathBuf>, SecurityError>;

	/// Point `role` at `keychain`.
	fn set_role_keychain(
		&self,
		role: KeychainRole,
		domain: Option<Domain>,
		keychain: &Path,
	) -> Result<(), SecurityError>;

	/// Create a new keychain protected by `password`.
	fn create_keychain(&self, keychain: &Path, password: &SecretString) -> Result<(), SecurityError>;

	/// Delete a keychain file and drop it from the search list.
	fn delete_keychain(&self, keychain: &Path) -> Result<(), SecurityError>;

	fn unlock_keychain(&self, keychain: &Path, password: &SecretString) -> Result<(), SecurityError>;

	/// Apply lock settings. `KeychainSettings::no_timeout()` disables auto-lock.
	fn set_keychain_settings(
		&self,
		keychain: &Path,
		settings: &KeychainSettings,
	) -> Result<(), SecurityError>;

	/// Read lock settings. Fails if the keychain does not exist.
	fn keychain_settings(&self, keychain: &Path) -> Result<KeychainSettings, SecurityError>;
}
