// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Throwaway keychains.
//!
//! A temporary keychain gets a random 256-bit password, is set to never
//! auto-lock, is unlocked once, and is activated with a keychain scope for
//! the duration of the caller's work. It is deleted afterwards, and a failed
//! deletion is always reported since it leaves a keychain file on disk.

use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use rand::RngCore;
use spare_keys_secret::SecretString;
use spare_keys_security::{
	detect_keychain_format, KeychainFormat, KeychainSettings, SecurityClient, SecurityError,
};
use tracing::{debug, error, info, instrument};
use zeroize::Zeroizing;

use crate::error::{CleanupError, CleanupStep, ScopeError, SetupError};
use crate::path::expand_keychain_path;
use crate::scope::{enter_scope, with_scope, ScopeOptions, ScopeState};

pub const DEFAULT_KEYCHAIN_PREFIX: &str = "spare-keys";

/// Random bytes behind each password (hex-encoded, so 64 characters).
pub const PASSWORD_BYTES: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemporaryKeychainOptions {
	pub scope: ScopeOptions,
	/// File name prefix.
	pub prefix: String,
	/// File format; probed from the OS release when unset.
	pub format: Option<KeychainFormat>,
	/// Directory for the file; `~/Library/Keychains` when unset.
	pub directory: Option<PathBuf>,
}

impl Default for TemporaryKeychainOptions {
	fn default() -> Self {
		Self {
			scope: ScopeOptions::default(),
			prefix: DEFAULT_KEYCHAIN_PREFIX.to_string(),
			format: None,
			directory: None,
		}
	}
}

impl TemporaryKeychainOptions {
	pub fn new(scope: ScopeOptions) -> Self {
		Self {
			scope,
			..Self::default()
		}
	}
}

/// A freshly created keychain that is deleted when dropped.
#[must_use = "dropping the keychain immediately deletes it"]
pub struct TemporaryKeychain<'a, C>
where
	C: SecurityClient + ?Sized,
{
	client: &'a C,
	path: PathBuf,
	password: SecretString,
	armed: bool,
}

impl<'a, C> TemporaryKeychain<'a, C>
where
	C: SecurityClient + ?Sized,
{
	/// Create, configure and unlock a new keychain.
	///
	/// If configuring fails the keychain is deleted again; a failure to delete
	/// is attached to the returned error.
	#[instrument(skip(client), fields(prefix = %options.prefix))]
	pub fn create(client: &'a C, options: &TemporaryKeychainOptions) -> Result<Self, SetupError> {
		let format = match options.format {
			Some(format) => format,
			None => detect_keychain_format()?,
		};
		let name = generate_keychain_name(&options.prefix, format);
		let path = match &options.directory {
			Some(directory) => expand_keychain_path(directory.join(&name))?,
			None => expand_keychain_path(&name)?,
		};
		let password = generate_password();

		client.create_keychain(&path, &password)?;
		let keychain = Self {
			client,
			path,
			password,
			armed: true,
		};

		if let Err(e) = keychain.configure() {
			let cleanup = keychain.delete().err();
			return Err(SetupError {
				source: e.into(),
				cleanup,
			});
		}

		info!(keychain = %keychain.path.display(), "created temporary keychain");
		Ok(keychain)
	}

	fn configure(&self) -> Result<(), SecurityError> {
		self
			.client
			.set_keychain_settings(&self.path, &KeychainSettings::no_timeout())?;
		self.client.unlock_keychain(&self.path, &self.password)
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn password(&self) -> &SecretString {
		&self.password
	}

	/// Delete the keychain, reporting failure.
	pub fn delete(mut self) -> Result<(), CleanupError> {
		self.armed = false;
		delete_keychain(self.client, &self.path)
	}

	/// Keep the keychain. Deleting it becomes the caller's job.
	pub fn detach(mut self) -> (PathBuf, SecretString) {
		self.armed = false;
		(self.path.clone(), self.password.clone())
	}
}

impl<C> Drop for TemporaryKeychain<'_, C>
where
	C: SecurityClient + ?Sized,
{
	fn drop(&mut self) {
		if !self.armed {
			return;
		}
		if let Err(e) = delete_keychain(self.client, &self.path) {
			error!(error = %e, "temporary keychain left on disk");
		}
	}
}

/// Run `work` with a new temporary keychain active, then restore the
/// previous configuration and delete the keychain.
///
/// `work` receives the keychain path and password. The keychain is deleted
/// whether `work` succeeds, fails or panics.
pub fn with_temporary_keychain<C, T, E, F>(
	client: &C,
	options: &TemporaryKeychainOptions,
	work: F,
) -> Result<T, ScopeError<E>>
where
	C: SecurityClient + ?Sized,
	F: FnOnce(&Path, &SecretString) -> Result<T, E>,
{
	let keychain = TemporaryKeychain::create(client, options)?;
	let result = with_scope(client, keychain.path(), &options.scope, |path| {
		work(path, keychain.password())
	});
	ScopeError::merge_cleanup(result, keychain.delete())
}

/// A temporary keychain left active for later manual teardown.
#[derive(Debug)]
pub struct DetachedTemporaryKeychain {
	pub path: PathBuf,
	pub password: SecretString,
	pub scope: ScopeState,
}

/// Create and activate a temporary keychain without tearing it down.
///
/// For callers that need the keychain to outlive this call, such as a
/// later process in the same build. The caller must eventually pass
/// `scope` to [`release_temporary_keychain`], after releasing any scope
/// entered later; otherwise the keychain stays on the search list and on
/// disk.
pub fn enter_temporary_keychain<C>(
	client: &C,
	options: &TemporaryKeychainOptions,
) -> Result<DetachedTemporaryKeychain, SetupError>
where
	C: SecurityClient + ?Sized,
{
	let keychain = TemporaryKeychain::create(client, options)?;
	let scope = match enter_scope(client, keychain.path(), &options.scope) {
		Ok(scope) => scope.detach(),
		Err(source) => {
			let cleanup = keychain.delete().err();
			return Err(SetupError { source, cleanup });
		}
	};
	let (path, password) = keychain.detach();
	Ok(DetachedTemporaryKeychain {
		path,
		password,
		scope,
	})
}

/// Tear down a keychain from [`enter_temporary_keychain`]: restore the
/// configuration, then delete the keychain. Deletion is attempted even if
/// restoring fails.
pub fn release_temporary_keychain<C>(client: &C, scope: &ScopeState) -> Result<(), CleanupError>
where
	C: SecurityClient + ?Sized,
{
	let mut cleanup = scope.restore(client).err().unwrap_or_default();
	if let Err(e) = delete_keychain(client, &scope.keychain) {
		cleanup.extend(e);
	}
	cleanup.into_result()
}

fn delete_keychain<C>(client: &C, path: &Path) -> Result<(), CleanupError>
where
	C: SecurityClient + ?Sized,
{
	match client.delete_keychain(path) {
		Ok(()) => {
			debug!(keychain = %path.display(), "deleted temporary keychain");
			Ok(())
		}
		Err(e) => {
			let mut cleanup = CleanupError::default();
			cleanup.push(CleanupStep::DeleteKeychain, path, e);
			Err(cleanup)
		}
	}
}

/// A hex password from the OS random number generator.
pub fn generate_password() -> SecretString {
	let mut bytes = Zeroizing::new([0u8; PASSWORD_BYTES]);
	OsRng.fill_bytes(&mut bytes[..]);
	SecretString::new(hex::encode(&bytes[..]))
}

/// `<prefix>-<YYYYMMDD>-<pid>-<random base36><extension>`.
pub fn generate_keychain_name(prefix: &str, format: KeychainFormat) -> String {
	let date = chrono::Local::now().format("%Y%m%d").to_string();
	format_keychain_name(prefix, &date, std::process::id(), rand::random(), format)
}

fn format_keychain_name(
	prefix: &str,
	date: &str,
	pid: u32,
	nonce: u32,
	format: KeychainFormat,
) -> String {
	format!(
		"{prefix}-{date}-{pid}-{}{}",
		to_base36(nonce),
		format.extension()
	)
}

fn to_base36(mut value: u32) -> String {
	const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
	if value == 0 {
		return "0".to_string();
	}
	let mut out = Vec::new();
	while value > 0 {
		out.push(DIGITS[(value % 36) as usize]);
		value /= 36;
	}
	out.reverse();
	String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use spare_keys_security::mock::op;
	use spare_keys_security::{MockSecurityClient, SearchList};

	fn options() -> TemporaryKeychainOptions {
		TemporaryKeychainOptions {
			format: Some(KeychainFormat::Database),
			directory: Some(PathBuf::from("/tmp/spare-keys-test")),
			..TemporaryKeychainOptions::default()
		}
	}

	fn client() -> MockSecurityClient {
		MockSecurityClient::new().with_search_list(None, SearchList::single("/k/login.keychain"))
	}

	#[test]
	fn test_password_is_random_hex() {
		let a = generate_password();
		let b = generate_password();
		assert_eq!(a.len(), PASSWORD_BYTES * 2);
		assert!(a.expose().chars().all(|c| c.is_ascii_hexdigit()));
		assert_ne!(a, b);
	}

	#[test]
	fn test_keychain_name_layout() {
		let name = format_keychain_name("spare-keys", "20240102", 4242, 35, KeychainFormat::Legacy);
		assert_eq!(name, "spare-keys-20240102-4242-z.keychain");

		let name = format_keychain_name("ci", "20240102", 1, u32::MAX, KeychainFormat::Database);
		assert_eq!(name, "ci-20240102-1-1z141z3.keychain-db");
	}

	#[test]
	fn test_generated_names_differ() {
		let a = generate_keychain_name("spare-keys", KeychainFormat::Database);
		let b = generate_keychain_name("spare-keys", KeychainFormat::Database);
		assert!(a.starts_with("spare-keys-"));
		assert!(a.ends_with(".keychain-db"));
		assert!(a.contains(&format!("-{}-", std::process::id())));
		assert_ne!(a, b);
	}

	/// Test: the work sees a usable keychain that is on the search list,
	/// unlocked and without auto-lock, and it is gone afterwards.
	///
	/// Why this test is important: this is the whole lifecycle contract. A
	/// keychain that auto-locks mid-build or survives the call would break
	/// code signing on the next run.
	#[test]
	fn test_with_temporary_keychain_lifecycle() {
		let client = client();

		let (path, password) = with_temporary_keychain(&client, &options(), |path, password| {
			assert!(client.search_list(None).contains(path));
			assert!(client.is_unlocked(path));
			assert_eq!(
				client.keychain_settings(path).unwrap(),
				KeychainSettings::no_timeout()
			);
			Ok::<_, ()>((path.to_path_buf(), password.clone()))
		})
		.unwrap();

		assert!(path.starts_with("/tmp/spare-keys-test"));
		assert!(!password.is_empty());
		assert!(!client.keychain_exists(&path));
		assert!(client.keychain_settings(&path).is_err());
		assert_eq!(client.search_list(None), SearchList::single("/k/login.keychain"));
	}

	#[test]
	fn test_deleted_after_work_error() {
		let client = client();
		let mut seen = None;

		let err = with_temporary_keychain(&client, &options(), |path, _| {
			seen = Some(path.to_path_buf());
			Err::<(), _>("signing failed")
		})
		.unwrap_err();

		assert!(matches!(err, ScopeError::Work("signing failed")));
		let path = seen.unwrap();
		assert!(!client.keychain_exists(&path));
		assert_eq!(client.search_list(None), SearchList::single("/k/login.keychain"));
	}

	#[test]
	fn test_deleted_after_panic() {
		let client = client();
		let seen = std::cell::RefCell::new(None);

		let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
			let _ = with_temporary_keychain(&client, &options(), |path, _| -> Result<(), ()> {
				*seen.borrow_mut() = Some(path.to_path_buf());
				panic!("work panicked")
			});
		}));

		assert!(result.is_err());
		let path = seen.into_inner().unwrap();
		assert!(!client.keychain_exists(&path));
		assert_eq!(client.search_list(None), SearchList::single("/k/login.keychain"));
	}

	/// Test: a failed deletion is reported even when the work succeeded.
	///
	/// Why this test is important: a silently leaked keychain file keeps a
	/// credential store on disk with nobody tracking it.
	#[test]
	fn test_delete_failure_is_surfaced() {
		let client = client();

		let err = with_temporary_keychain(&client, &options(), |_, _| {
			client.fail_on(op::DELETE_KEYCHAIN);
			Ok::<_, ()>(())
		})
		.unwrap_err();

		assert!(matches!(err, ScopeError::Cleanup(_)));
		assert!(err
			.cleanup_error()
			.unwrap()
			.has_step(CleanupStep::DeleteKeychain));
		assert_eq!(client.search_list(None), SearchList::single("/k/login.keychain"));
	}

	#[test]
	fn test_delete_failure_alongside_work_error() {
		let client = client();

		let err = with_temporary_keychain(&client, &options(), |_, _| {
			client.fail_on(op::DELETE_KEYCHAIN);
			Err::<(), _>("work")
		})
		.unwrap_err();

		assert_eq!(err.work_error(), Some(&"work"));
		assert!(err
			.cleanup_error()
			.unwrap()
			.has_step(CleanupStep::DeleteKeychain));
	}

	/// Test: if unlocking fails the new keychain is deleted again.
	#[test]
	fn test_configure_failure_deletes_keychain() {
		let client = client();
		client.fail_on(op::UNLOCK_KEYCHAIN);

		let err = with_temporary_keychain(&client, &options(), |_, _| Ok::<_, ()>(()))
			.unwrap_err();

		match err {
			ScopeError::Setup(setup) => assert!(setup.cleanup.is_none()),
			other => panic!("unexpected error: {other:?}"),
		}
		assert!(client.calls().contains(&op::DELETE_KEYCHAIN.to_string()));
		assert_eq!(client.search_list(None), SearchList::single("/k/login.keychain"));
	}

	#[test]
	fn test_create_failure_runs_nothing_else() {
		let client = client();
		client.fail_on(op::CREATE_KEYCHAIN);

		let err = with_temporary_keychain(&client, &options(), |_, _| Ok::<_, ()>(()))
			.unwrap_err();

		assert!(matches!(err, ScopeError::Setup(_)));
		assert_eq!(client.calls(), vec![op::CREATE_KEYCHAIN.to_string()]);
	}

	#[test]
	fn test_scope_options_pass_through() {
		use spare_keys_security::{Domain, KeychainRole};

		let client = MockSecurityClient::new()
			.with_search_list(Some(Domain::User), SearchList::single("/k/login.keychain"))
			.with_role(KeychainRole::Default, Some(Domain::User), "/k/login.keychain");
		let mut opts = options();
		opts.scope = ScopeOptions::new()
			.clear_list(true)
			.role(KeychainRole::Default)
			.domain(Domain::User);

		with_temporary_keychain(&client, &opts, |path, _| {
			assert_eq!(client.search_list(Some(Domain::User)), SearchList::single(path));
			assert_eq!(
				client.role(KeychainRole::Default, Some(Domain::User)).as_deref(),
				Some(path)
			);
			Ok::<_, ()>(())
		})
		.unwrap();

		assert_eq!(
			client.role(KeychainRole::Default, Some(Domain::User)),
			Some(PathBuf::from("/k/login.keychain"))
		);
	}

	/// Test: a detached keychain stays active until released by hand.
	#[test]
	fn test_enter_and_release() {
		let client = client();

		let detached = enter_temporary_keychain(&client, &options()).unwrap();
		assert!(client.keychain_exists(&detached.path));
		assert!(client.search_list(None).contains(&detached.path));
		assert_eq!(detached.scope.keychain, detached.path);

		release_temporary_keychain(&client, &detached.scope).unwrap();
		assert!(!client.keychain_exists(&detached.path));
		assert_eq!(client.search_list(None), SearchList::single("/k/login.keychain"));
	}

	#[test]
	fn test_release_deletes_even_if_restore_fails() {
		let client = client();
		let detached = enter_temporary_keychain(&client, &options()).unwrap();
		client.fail_on(op::SET_KEYCHAINS);

		let err = release_temporary_keychain(&client, &detached.scope).unwrap_err();

		assert!(err.has_step(CleanupStep::RestoreSearchList));
		assert!(!err.has_step(CleanupStep::DeleteKeychain));
		assert!(!client.keychain_exists(&detached.path));
	}

	#[test]
	fn test_enter_failure_deletes_keychain() {
		let client = client();
		client.fail_on(op::LIST_KEYCHAINS);

		let err = enter_temporary_keychain(&client, &options()).unwrap_err();

		assert!(err.cleanup.is_none());
		assert!(client.calls().contains(&op::DELETE_KEYCHAIN.to_string()));
	}

	proptest! {
			#[test]
			fn prop_base36_roundtrips(value in any::<u32>()) {
					let encoded = to_base36(value);
					prop_assert_eq!(u32::from_str_radix(&encoded, 36).unwrap(), value);
			}
	}
}
