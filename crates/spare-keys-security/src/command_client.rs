// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use spare_keys_secret::{SecretString, REDACTED};
use tracing::{debug, trace, warn};

use crate::client::SecurityClient;
use crate::error::SecurityError;
use crate::parse::{
	parse_darwin_major, parse_keychain_list, parse_keychain_settings, parse_single_keychain,
};
use crate::types::{Domain, KeychainFormat, KeychainRole, KeychainSettings, SearchList};

/// Default name of the tool, resolved through `PATH`.
pub const DEFAULT_SECURITY_PROGRAM: &str = "security";

/// Keychain client implementation using the `security` CLI.
#[derive(Clone, Debug)]
pub struct CommandSecurityClient {
	program: PathBuf,
}

impl CommandSecurityClient {
	pub fn new() -> Self {
		Self::with_program(DEFAULT_SECURITY_PROGRAM)
	}

	/// Use a specific binary instead of `security` from `PATH`.
	pub fn with_program(program: impl Into<PathBuf>) -> Self {
		Self {
			program: program.into(),
		}
	}

	pub fn program(&self) -> &Path {
		&self.program
	}

	fn run(&self, subcommand: &str, args: Vec<OsString>) -> Result<CommandOutput, SecurityError> {
		run_command(&self.program, subcommand, args)
	}
}

impl Default for CommandSecurityClient {
	fn default() -> Self {
		Self::new()
	}
}

impl SecurityClient for CommandSecurityClient {
	fn list_keychains(&self, domain: Option<Domain>) -> Result<SearchList, SecurityError> {
		let output = self.run("list-keychains", domain_args(domain))?;
		let list = parse_keychain_list("list-keychains", &output.stdout)?;
		debug!(domain = ?domain, entries = list.len(), "read keychain search list");
		Ok(list)
	}

	fn set_keychains(&self, domain: Option<Domain>, list: &SearchList) -> Result<(), SecurityError> {
		let mut args = domain_args(domain);
		args.push("-s".into());
		args.extend(list.iter().map(|entry| entry.clone().into_os_string()));
		self.run("list-keychains", args)?;
		debug!(domain = ?domain, list = %list, "set keychain search list");
		Ok(())
	}

	fn role_keychain(
		&self,
		role: KeychainRole,
		domain: Option<Domain>,
	) -> Result<Option<PathBuf>, SecurityError> {
		let subcommand = role.subcommand();
		let output = match self.run(subcommand, domain_args(domain)) {
			Ok(output) => output,
			Err(e) if is_missing_role_holder(&e) => {
				debug!(role = %role, domain = ?domain, "no keychain holds the role");
				return Ok(None);
			}
			Err(e) => return Err(e),
		};
		parse_single_keychain(subcommand, &output.stdout)
	}

	fn set_role_keychain(
		&self,
		role: KeychainRole,
		domain: Option<Domain>,
		keychain: &Path,
	) -> Result<(), SecurityError> {
		let mut args = domain_args(domain);
		args.push("-s".into());
		args.push(keychain.as_os_str().to_owned());
		self.run(role.subcommand(), args)?;
		debug!(role = %role, domain = ?domain, keychain = %keychain.display(), "set role keychain");
		Ok(())
	}

	fn create_keychain(&self, keychain: &Path, password: &SecretString) -> Result<(), SecurityError> {
		let args = vec![
			"-p".into(),
			password.expose().into(),
			keychain.as_os_str().to_owned(),
		];
		self.run("create-keychain", args)?;
		debug!(keychain = %keychain.display(), "created keychain");
		Ok(())
	}

	fn delete_keychain(&self, keychain: &Path) -> Result<(), SecurityError> {
		self.run("delete-keychain", vec![keychain.as_os_str().to_owned()])?;
		debug!(keychain = %keychain.display(), "deleted keychain");
		Ok(())
	}

	fn unlock_keychain(&self, keychain: &Path, password: &SecretString) -> Result<(), SecurityError> {
		let args = vec![
			"-p".into(),
			password.expose().into(),
			keychain.as_os_str().to_owned(),
		];
		self.run("unlock-keychain", args)?;
		Ok(())
	}

	fn set_keychain_settings(
		&self,
		keychain: &Path,
		settings: &KeychainSettings,
	) -> Result<(), SecurityError> {
		let mut args: Vec<OsString> = settings.to_args().into_iter().map(Into::into).collect();
		args.push(keychain.as_os_str().to_owned());
		self.run("set-keychain-settings", args)?;
		debug!(keychain = %keychain.display(), settings = ?settings, "applied keychain settings");
		Ok(())
	}

	fn keychain_settings(&self, keychain: &Path) -> Result<KeychainSettings, SecurityError> {
		let output = self.run("show-keychain-info", vec![keychain.as_os_str().to_owned()])?;
		// security prints the info line on stderr
		let text = if output.stdout.trim().is_empty() {
			&output.stderr
		} else {
			&output.stdout
		};
		parse_keychain_settings(text)
	}
}

/// Picks the keychain file format for this machine from the Darwin release.
pub fn detect_keychain_format() -> Result<KeychainFormat, SecurityError> {
	let output = run_command(
		Path::new("sysctl"),
		"-n",
		vec![OsString::from("kern.osrelease")],
	)?;
	let major = parse_darwin_major(&output.stdout)?;
	let format = KeychainFormat::for_darwin_major(major);
	debug!(darwin_major = major, format = ?format, "detected keychain format");
	Ok(format)
}

struct CommandOutput {
	stdout: String,
	stderr: String,
}

fn domain_args(domain: Option<Domain>) -> Vec<OsString> {
	match domain {
		Some(domain) => vec!["-d".into(), domain.as_str().into()],
		None => Vec::new(),
	}
}

/// Runs `program subcommand args...` and returns its output on success.
fn run_command(
	program: &Path,
	subcommand: &str,
	args: Vec<OsString>,
) -> Result<CommandOutput, SecurityError> {
	let mut cmd = Command::new(program);
	cmd
		.arg(subcommand)
		.args(&args)
		.stdin(Stdio::null())
		.stdout(Stdio::piped())
		.stderr(Stdio::piped());

	trace!(
			cmd = %display_command(program, subcommand, &args),
			"running security command"
	);

	let output = cmd.output().map_err(|e| {
		if e.kind() == std::io::ErrorKind::NotFound {
			warn!(program = %program.display(), "program not found");
			SecurityError::NotInstalled(program.to_path_buf())
		} else {
			SecurityError::Io(e)
		}
	})?;

	let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
	let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

	if output.status.success() {
		Ok(CommandOutput { stdout, stderr })
	} else {
		let status = match output.status.code() {
			Some(code) => format!("exit code {code}"),
			None => "terminated by signal".to_string(),
		};
		Err(SecurityError::CommandFailed {
			subcommand: subcommand.to_string(),
			status,
			stderr: stderr.trim().to_string(),
		})
	}
}

/// `security default-keychain` and `login-keychain` exit non-zero with
/// "A default keychain could not be found." when the role has no holder.
fn is_missing_role_holder(err: &SecurityError) -> bool {
	match err {
		SecurityError::CommandFailed { stderr, .. } => stderr.contains("could not be found"),
		_ => false,
	}
}

/// Renders a command line for logging with any `-p` value redacted.
fn display_command(program: &Path, subcommand: &str, args: &[OsString]) -> String {
	let mut parts = vec![program.display().to_string(), subcommand.to_string()];
	let mut redact_next = false;
	for arg in args {
		if redact_next {
			parts.push(REDACTED.to_string());
			redact_next = false;
			continue;
		}
		redact_next = arg == "-p";
		parts.push(arg.to_string_lossy().into_owned());
	}
	parts.join(" ")
}
