// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Running the wrapped command.

use std::ffi::OsStr;
use std::io;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// Keeps Ctrl+C and SIGTERM from killing this process while a child runs.
///
/// The child shares our process group and receives the terminal's signal
/// itself; we wait for it and restore the keychain configuration after.
pub fn install_signal_guard() -> Result<Arc<AtomicBool>> {
	let interrupted = Arc::new(AtomicBool::new(false));
	let flag = Arc::clone(&interrupted);
	ctrlc::set_handler(move || {
		flag.store(true, Ordering::SeqCst);
		info!("received interrupt, waiting for child before restoring keychains");
	})
	.context("failed to set Ctrl+C handler")?;
	Ok(interrupted)
}

/// Runs `argv` with inherited stdio and the extra environment `envs`.
pub fn run_child<K, V>(argv: &[String], envs: impl IntoIterator<Item = (K, V)>) -> io::Result<ExitStatus>
where
	K: AsRef<OsStr>,
	V: AsRef<OsStr>,
{
	let (program, args) = argv
		.split_first()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no command given"))?;

	let mut cmd = Command::new(program);
	cmd.args(args)
		.envs(envs)
		.stdin(Stdio::inherit())
		.stdout(Stdio::inherit())
		.stderr(Stdio::inherit());

	info!(program = %program, "spawning command");
	let status = cmd.status().map_err(|e| {
		warn!(program = %program, error = %e, "failed to spawn command");
		io::Error::new(e.kind(), format!("failed to run {program}: {e}"))
	})?;
	debug!(status = ?status.code(), "command exited");

	Ok(status)
}

/// Shell-style exit code: the child's code, or 128 + signal if it was killed.
pub fn exit_code(status: ExitStatus) -> i32 {
	if let Some(code) = status.code() {
		return code;
	}
	#[cfg(unix)]
	{
		use std::os::unix::process::ExitStatusExt;
		if let Some(signal) = status.signal() {
			return 128 + signal;
		}
	}
	1
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;

	fn sh(script: &str) -> Vec<String> {
		vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
	}

	#[test]
	fn test_exit_code_passthrough() {
		let status = run_child(&sh("exit 7"), std::iter::empty::<(&str, &str)>()).unwrap();
		assert_eq!(exit_code(status), 7);
	}

	#[test]
	fn test_env_is_passed_to_child() {
		let status = run_child(
			&sh("test \"$SPARE_KEYS_KEYCHAIN\" = /tmp/x.keychain"),
			[("SPARE_KEYS_KEYCHAIN", "/tmp/x.keychain")],
		)
		.unwrap();
		assert!(status.success());
	}

	#[test]
	fn test_killed_child_maps_to_signal_code() {
		let status = run_child(&sh("kill -9 $$"), std::iter::empty::<(&str, &str)>()).unwrap();
		assert_eq!(exit_code(status), 137);
	}

	#[test]
	fn test_empty_command_rejected() {
		let err = run_child(&[], std::iter::empty::<(&str, &str)>()).unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
	}

	#[test]
	fn test_missing_program() {
		let argv = vec!["/nonexistent/spare-keys-test-binary".to_string()];
		let err = run_child(&argv, std::iter::empty::<(&str, &str)>()).unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::NotFound);
	}
}
