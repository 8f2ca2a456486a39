// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Keychain configuration through the macOS `security` tool.
//!
//! [`SecurityClient`] is the seam: [`CommandSecurityClient`] shells out to
//! `security`, [`MockSecurityClient`] keeps the same state in memory.

pub mod client;
pub mod command_client;
pub mod error;
pub mod mock;
pub mod parse;
pub mod types;

pub use client::SecurityClient;
pub use command_client::{detect_keychain_format, CommandSecurityClient, DEFAULT_SECURITY_PROGRAM};
pub use error::SecurityError;
pub use mock::MockSecurityClient;
pub use types::{
	Domain, KeychainFormat, KeychainRole, KeychainSettings, SearchList, DATABASE_FORMAT_DARWIN_MAJOR,
};
