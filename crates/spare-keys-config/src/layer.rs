// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration layers, one per source.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use spare_keys_security::{Domain, KeychainRole};

/// One source's view of the configuration. Unset fields defer to lower layers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigLayer {
	pub security: Option<SecurityConfigLayer>,
	pub scope: Option<ScopeConfigLayer>,
	pub temporary: Option<TemporaryConfigLayer>,
	pub logging: Option<LoggingConfigLayer>,
	pub state: Option<StateConfigLayer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SecurityConfigLayer {
	pub program: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScopeConfigLayer {
	pub clear_list: Option<bool>,
	pub role: Option<KeychainRole>,
	pub domain: Option<Domain>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TemporaryConfigLayer {
	pub prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfigLayer {
	pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StateConfigLayer {
	pub dir: Option<PathBuf>,
}

fn take<T>(target: &mut Option<T>, other: Option<T>) {
	if other.is_some() {
		*target = other;
	}
}

fn merge_section<T: Default>(target: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	if let Some(other) = other {
		merge(target.get_or_insert_with(T::default), other);
	}
}

impl ConfigLayer {
	/// Overlays `other` on top of `self`; fields set in `other` win.
	pub fn merge(&mut self, other: Self) {
		merge_section(&mut self.security, other.security, SecurityConfigLayer::merge);
		merge_section(&mut self.scope, other.scope, ScopeConfigLayer::merge);
		merge_section(&mut self.temporary, other.temporary, TemporaryConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_section(&mut self.state, other.state, StateConfigLayer::merge);
	}
}

impl SecurityConfigLayer {
	pub fn merge(&mut self, other: Self) {
		take(&mut self.program, other.program);
	}
}

impl ScopeConfigLayer {
	pub fn merge(&mut self, other: Self) {
		take(&mut self.clear_list, other.clear_list);
		take(&mut self.role, other.role);
		take(&mut self.domain, other.domain);
	}
}

impl TemporaryConfigLayer {
	pub fn merge(&mut self, other: Self) {
		take(&mut self.prefix, other.prefix);
	}
}

impl LoggingConfigLayer {
	pub fn merge(&mut self, other: Self) {
		take(&mut self.level, other.level);
	}
}

impl StateConfigLayer {
	pub fn merge(&mut self, other: Self) {
		take(&mut self.dir, other.dir);
	}
}
