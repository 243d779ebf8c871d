//! Command execution for the `pw` binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use pw_protocol::{Command, action};
use tracing::info;

use crate::browser::chromium::ChromiumEngine;
use crate::channel::CommandChannel;
use crate::cli::{Cli, Commands, DaemonArgs};
use crate::client::DaemonClient;
use crate::daemon::Daemon;
use crate::error::{PwError, Result};
use crate::output::{ResultBuilder, print_result};

/// What a parsed command line asks this process to be.
#[derive(Debug)]
pub enum Invocation {
	Daemon(DaemonArgs),
	Client(Command),
}

impl From<Commands> for Invocation {
	fn from(command: Commands) -> Self {
		match command {
			Commands::Daemon(args) => Invocation::Daemon(args),
			Commands::Navigate { url } => Invocation::Client(Command::Navigate { url }),
			Commands::Exec { code } => Invocation::Client(Command::Exec { code }),
			Commands::Console => Invocation::Client(Command::Console),
			Commands::ConsoleClear => Invocation::Client(Command::ConsoleClear),
			Commands::Status => Invocation::Client(Command::Status),
			Commands::Resize { width, height } => Invocation::Client(Command::Resize { width, height }),
		}
	}
}

/// Name used for `command` in result envelopes.
pub fn command_name(command: &Commands) -> &'static str {
	match command {
		Commands::Daemon(_) => "daemon",
		Commands::Navigate { .. } => action::NAVIGATE,
		Commands::Exec { .. } => action::EXEC,
		Commands::Console => action::CONSOLE,
		Commands::ConsoleClear => action::CONSOLE_CLEAR,
		Commands::Status => action::STATUS,
		Commands::Resize { .. } => action::RESIZE,
	}
}

pub async fn dispatch(cli: Cli) -> Result<()> {
	let format = cli.format;
	let dir = cli.channel_dir()?;
	let client_config = cli.client_config()?;

	match Invocation::from(cli.command) {
		Invocation::Daemon(args) => run_daemon(args, dir).await,
		Invocation::Client(command) => {
			let builder = ResultBuilder::new(command.name());
			let data = DaemonClient::new(client_config).send(&command).await?;
			print_result(&builder.data(data).build(), format);
			Ok(())
		}
	}
}

async fn run_daemon(args: DaemonArgs, dir: PathBuf) -> Result<()> {
	std::fs::create_dir_all(&dir).with_context(|| format!("failed to create channel directory {}", dir.display()))?;

	let channel = CommandChannel::new(&dir);
	if let Some(pid) = channel.ready_pid().filter(|&pid| pid != std::process::id()) {
		let probe = DaemonClient::new(crate::config::ClientConfig::new(&dir));
		if probe.ensure_running().is_ok() {
			return Err(PwError::DaemonAlreadyRunning { dir, pid });
		}
		info!(target = "pw.daemon", pid, "replacing stale ready marker");
	}

	let config = args.into_config(dir);
	Daemon::new(config, Arc::new(ChromiumEngine::new())).run().await
}

#[cfg(test)]
mod tests {
	use clap::Parser;

	use super::*;

	#[test]
	fn subcommands_map_to_wire_commands() {
		let cli = Cli::try_parse_from(["pw", "navigate", "https://example.com/"]).unwrap();
		assert_eq!(command_name(&cli.command), "navigate");
		match Invocation::from(cli.command) {
			Invocation::Client(command) => assert_eq!(
				command,
				Command::Navigate {
					url: "https://example.com/".into()
				}
			),
			other => panic!("unexpected invocation: {other:?}"),
		}

		let cli = Cli::try_parse_from(["pw", "resize", "640", "480"]).unwrap();
		match Invocation::from(cli.command) {
			Invocation::Client(command) => assert_eq!(command.name(), "resize"),
			other => panic!("unexpected invocation: {other:?}"),
		}

		let cli = Cli::try_parse_from(["pw", "console-clear"]).unwrap();
		assert_eq!(command_name(&cli.command), "console-clear");

		let cli = Cli::try_parse_from(["pw", "daemon"]).unwrap();
		assert_eq!(command_name(&cli.command), "daemon");
		assert!(matches!(Invocation::from(cli.command), Invocation::Daemon(_)));
	}

	#[tokio::test]
	async fn client_command_without_daemon_fails_fast() {
		let tmp = tempfile::TempDir::new().unwrap();
		let dir = tmp.path().to_str().unwrap();
		let cli = Cli::try_parse_from(["pw", "--dir", dir, "status"]).unwrap();

		let err = dispatch(cli).await.unwrap_err();
		assert!(matches!(err, PwError::DaemonNotRunning { stale: false, .. }));
	}

	#[tokio::test]
	async fn daemon_refuses_to_start_over_a_live_one() {
		let tmp = tempfile::TempDir::new().unwrap();
		let channel = CommandChannel::new(tmp.path());
		// pid 1 is always alive on unix.
		channel.mark_ready(1).unwrap();

		let dir = tmp.path().to_str().unwrap();
		let cli = Cli::try_parse_from(["pw", "--dir", dir, "daemon", "--headless"]).unwrap();
		let err = dispatch(cli).await.unwrap_err();
		assert!(matches!(err, PwError::DaemonAlreadyRunning { pid: 1, .. }));
	}
}
