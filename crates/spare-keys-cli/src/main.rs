// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! spare-keys: run commands with a macOS keychain temporarily active.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spare_keys::TemporaryKeychainOptions;
use spare_keys_config::{load_config, CliOverrides, SpareKeysConfig};
use spare_keys_security::{CommandSecurityClient, Domain};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod child;
mod commands;
mod stack;
mod version;

use commands::ScopeArgs;
use stack::ScopeStack;

/// spare-keys - make a keychain available for the duration of a command
#[derive(Parser, Debug)]
#[command(name = "spare-keys", version, about, long_about = None)]
struct Args {
	/// Path to custom configuration file
	#[arg(short, long, global = true)]
	config: Option<PathBuf>,

	/// Path to the security(1) executable
	#[arg(long, global = true, value_name = "PATH")]
	security: Option<PathBuf>,

	/// Preference domain (user, system, common or dynamic)
	#[arg(long, global = true)]
	domain: Option<Domain>,

	/// Log level (overrides config)
	#[arg(short, long, global = true)]
	log_level: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run a command with an existing keychain on the search list
	Use {
		/// Keychain path, or a file name in ~/Library/Keychains
		keychain: PathBuf,

		#[command(flatten)]
		scope: ScopeArgs,

		/// Command to run, after `--`
		#[arg(last = true, required = true, value_name = "COMMAND")]
		argv: Vec<String>,
	},
	/// Run a command with a new, unlocked keychain that is deleted afterwards
	Temp {
		#[command(flatten)]
		scope: ScopeArgs,

		#[command(flatten)]
		temporary: TemporaryArgs,

		/// Command to run, after `--`
		#[arg(last = true, required = true, value_name = "COMMAND")]
		argv: Vec<String>,
	},
	/// Activate a keychain until a matching `exit`
	Enter {
		/// Keychain to activate; a temporary one is created when omitted
		keychain: Option<PathBuf>,

		#[command(flatten)]
		scope: ScopeArgs,

		#[command(flatten)]
		temporary: TemporaryArgs,
	},
	/// Undo the most recent `enter`
	Exit {
		/// Fail unless the most recent scope is for this keychain
		#[arg(long, value_name = "KEYCHAIN")]
		expect: Option<PathBuf>,
	},
	/// Show the search list and default/login keychains
	Show {
		/// Output as JSON
		#[arg(long)]
		json: bool,
	},
	/// Show version and build information
	Version,
}

#[derive(Debug, Clone, Default, clap::Args)]
struct TemporaryArgs {
	/// File name prefix for the temporary keychain
	#[arg(long)]
	prefix: Option<String>,

	/// Directory for the temporary keychain (default: ~/Library/Keychains)
	#[arg(long, value_name = "DIR")]
	directory: Option<PathBuf>,
}

impl TemporaryArgs {
	fn options(&self, scope: &ScopeArgs, config: &SpareKeysConfig) -> TemporaryKeychainOptions {
		TemporaryKeychainOptions {
			scope: scope.apply(config.scope_options()),
			prefix: self
				.prefix
				.clone()
				.unwrap_or_else(|| config.temporary_prefix.clone()),
			format: None,
			directory: self.directory.clone(),
		}
	}
}

impl From<&Args> for CliOverrides {
	fn from(args: &Args) -> Self {
		CliOverrides {
			config_file: args.config.clone(),
			security_program: args.security.clone(),
			domain: args.domain,
			log_level: args.log_level.clone(),
		}
	}
}

fn init_tracing(level: &str) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_writer(std::io::stderr))
		.init();
}

/// Runs `f` with interrupts held off and returns the child's exit code.
fn run_guarded(f: impl FnOnce() -> Result<i32>) -> Result<i32> {
	let interrupted = child::install_signal_guard()?;
	let code = f()?;
	if interrupted.load(Ordering::SeqCst) {
		warn!(code, "command was interrupted; keychain configuration restored");
	}
	Ok(code)
}

fn main() -> Result<()> {
	let args = Args::parse();

	if let Command::Version = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	let config = load_config(CliOverrides::from(&args)).context("failed to load configuration")?;
	init_tracing(&config.log_level);

	debug!(
		security = %config.security_program.display(),
		state_dir = %config.state_dir.display(),
		"starting spare-keys"
	);

	let client = CommandSecurityClient::with_program(config.security_program.clone());
	let stack = ScopeStack::in_dir(&config.state_dir);

	match args.command {
		Command::Use {
			keychain,
			scope,
			argv,
		} => {
			let options = scope.apply(config.scope_options());
			let code =
				run_guarded(|| commands::run::use_keychain(&client, &keychain, &options, &argv))?;
			std::process::exit(code)
		}
		Command::Temp {
			scope,
			temporary,
			argv,
		} => {
			let options = temporary.options(&scope, &config);
			let code = run_guarded(|| commands::run::temporary(&client, &options, &argv))?;
			std::process::exit(code)
		}
		Command::Enter {
			keychain,
			scope,
			temporary,
		} => {
			let output = match keychain {
				Some(keychain) => commands::session::enter_existing(
					&client,
					&stack,
					&keychain,
					&scope.apply(config.scope_options()),
				)?,
				None => commands::session::enter_temporary(
					&client,
					&stack,
					&temporary.options(&scope, &config),
				)?,
			};
			println!("{}", serde_json::to_string_pretty(&output)?);
		}
		Command::Exit { expect } => {
			let output = commands::session::exit(&client, &stack, expect.as_deref())?;
			println!("{}", serde_json::to_string_pretty(&output)?);
		}
		Command::Show { json } => {
			let snapshot = commands::show::snapshot(&client, &stack, config.domain)?;
			if json {
				println!("{}", serde_json::to_string_pretty(&snapshot)?);
			} else {
				println!("{snapshot}");
			}
		}
		// Printed before configuration is loaded.
		Command::Version => {}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use spare_keys_security::KeychainRole;

	#[test]
	fn test_use_parses_trailing_command() {
		let args = Args::try_parse_from([
			"spare-keys",
			"--domain",
			"user",
			"use",
			"ci.keychain",
			"--clear-list",
			"--role",
			"default",
			"--",
			"codesign",
			"-s",
			"Developer ID",
			"App.app",
		])
		.unwrap();

		assert_eq!(args.domain, Some(Domain::User));
		match args.command {
			Command::Use {
				keychain,
				scope,
				argv,
			} => {
				assert_eq!(keychain, PathBuf::from("ci.keychain"));
				assert!(scope.clear_list);
				assert_eq!(scope.role, Some(KeychainRole::Default));
				assert_eq!(argv, ["codesign", "-s", "Developer ID", "App.app"]);
			}
			other => panic!("unexpected command: {other:?}"),
		}
	}

	#[test]
	fn test_use_requires_command() {
		assert!(Args::try_parse_from(["spare-keys", "use", "ci.keychain"]).is_err());
	}

	#[test]
	fn test_invalid_role_rejected() {
		assert!(Args::try_parse_from([
			"spare-keys",
			"use",
			"ci.keychain",
			"--role",
			"keyring",
			"--",
			"true"
		])
		.is_err());
	}

	#[test]
	fn test_global_flags_after_subcommand() {
		let args = Args::try_parse_from([
			"spare-keys",
			"show",
			"--json",
			"--security",
			"/opt/bin/security",
		])
		.unwrap();

		let overrides = CliOverrides::from(&args);
		assert_eq!(overrides.security_program, Some(PathBuf::from("/opt/bin/security")));
		assert!(matches!(args.command, Command::Show { json: true }));
	}

	#[test]
	fn test_enter_without_keychain_is_temporary() {
		let args = Args::try_parse_from(["spare-keys", "enter", "--prefix", "ci"]).unwrap();
		match args.command {
			Command::Enter {
				keychain,
				temporary,
				..
			} => {
				assert!(keychain.is_none());
				assert_eq!(temporary.prefix.as_deref(), Some("ci"));
			}
			other => panic!("unexpected command: {other:?}"),
		}
	}

	#[test]
	fn test_temporary_args_fall_back_to_config() {
		let config = SpareKeysConfig {
			security_program: PathBuf::from("security"),
			clear_list: true,
			role: None,
			domain: Some(Domain::User),
			temporary_prefix: "build".to_string(),
			log_level: "warn".to_string(),
			state_dir: PathBuf::from("/tmp/state"),
		};
		let options = TemporaryArgs::default().options(
			&ScopeArgs {
				clear_list: false,
				role: Some(KeychainRole::Login),
			},
			&config,
		);

		assert_eq!(options.prefix, "build");
		assert!(options.scope.clear_list);
		assert_eq!(options.scope.role, Some(KeychainRole::Login));
		assert_eq!(options.scope.domain, Some(Domain::User));
		assert_eq!(options.format, None);
	}

	#[test]
	fn test_cli_definition_is_valid() {
		use clap::CommandFactory;
		Args::command().debug_assert();
	}
}
