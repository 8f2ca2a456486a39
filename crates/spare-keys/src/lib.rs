// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Temporarily reconfigure the keychain search list, then put it back.
//!
//! - [`with_scope`] activates an existing keychain around a unit of work.
//! - [`with_temporary_keychain`] does the same with a throwaway keychain that
//!   is deleted afterwards.
//!
//! ```no_run
//! use spare_keys::{with_scope, ScopeOptions};
//! use spare_keys_security::CommandSecurityClient;
//!
//! let client = CommandSecurityClient::new();
//! let options = ScopeOptions::new().clear_list(true);
//! with_scope(&client, "build.keychain", &options, |keychain| {
//!     println!("signing with {}", keychain.display());
//!     Ok::<_, std::io::Error>(())
//! })?;
//! # Ok::<_, Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod path;
pub mod scope;
pub mod temporary;

pub use error::{
	CleanupError, CleanupFailure, CleanupStep, KeychainError, ScopeError, SetupError,
};
pub use path::expand_keychain_path;
pub use scope::{enter_scope, with_scope, KeychainScope, ScopeOptions, ScopeState};
pub use temporary::{
	enter_temporary_keychain, generate_keychain_name, generate_password,
	release_temporary_keychain, with_temporary_keychain, DetachedTemporaryKeychain,
	TemporaryKeychain, TemporaryKeychainOptions, DEFAULT_KEYCHAIN_PREFIX,
};
