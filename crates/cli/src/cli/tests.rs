use std::path::PathBuf;

use clap::Parser;

use super::*;
use crate::browser::Viewport;

#[test]
fn parse_resize_command() {
	let cli = Cli::try_parse_from(["pw", "resize", "800", "600"]).unwrap();
	match cli.command {
		Commands::Resize { width, height } => assert_eq!((width, height), (800, 600)),
		_ => panic!("Expected Resize command"),
	}
}

#[test]
fn resize_rejects_zero() {
	assert!(Cli::try_parse_from(["pw", "resize", "0", "600"]).is_err());
	assert!(Cli::try_parse_from(["pw", "resize", "800", "-1"]).is_err());
}

#[test]
fn console_clear_uses_kebab_name() {
	let cli = Cli::try_parse_from(["pw", "console-clear"]).unwrap();
	assert!(matches!(cli.command, Commands::ConsoleClear));
}

#[test]
fn global_flags_after_subcommand() {
	let cli = Cli::try_parse_from(["pw", "exec", "document.title", "--dir", "/tmp/work", "-f", "text", "--timeout-ms", "500"]).unwrap();

	assert_eq!(cli.dir, Some(PathBuf::from("/tmp/work")));
	assert_eq!(cli.format, OutputFormat::Text);
	let client = cli.client_config().unwrap();
	assert_eq!(client.response_timeout, Duration::from_millis(500));
	match cli.command {
		Commands::Exec { code } => assert_eq!(code, "document.title"),
		_ => panic!("Expected Exec command"),
	}
}

#[test]
fn daemon_defaults_to_headful_native_viewport() {
	let cli = Cli::try_parse_from(["pw", "daemon"]).unwrap();
	let Commands::Daemon(args) = cli.command else {
		panic!("Expected Daemon command");
	};
	let config = args.into_config(PathBuf::from("/tmp/work"));

	assert!(!config.launch.headless);
	assert_eq!(config.launch.viewport, None);
	assert_eq!(config.poll_interval, Duration::from_millis(100));
	assert_eq!(config.navigation_timeout, Duration::from_secs(30));
	assert_eq!(config.restore_timeout, Duration::from_secs(10));
	assert_eq!(config.console_limit, None);
}

#[test]
fn daemon_flags_resolve_into_config() {
	let cli = Cli::try_parse_from([
		"pw",
		"daemon",
		"--headless",
		"--executable",
		"/usr/bin/chromium",
		"--viewport",
		"1280x720",
		"--browser-arg",
		"--disable-gpu",
		"--poll-interval-ms",
		"50",
		"--restore-timeout-ms",
		"2500",
		"--console-limit",
		"500",
	])
	.unwrap();
	let Commands::Daemon(args) = cli.command else {
		panic!("Expected Daemon command");
	};
	let config = args.into_config(PathBuf::from("/tmp/work"));

	assert!(config.launch.headless);
	assert_eq!(config.launch.executable, Some(PathBuf::from("/usr/bin/chromium")));
	assert_eq!(config.launch.viewport, Some(Viewport { width: 1280, height: 720 }));
	assert_eq!(config.launch.args, ["--disable-gpu"]);
	assert_eq!(config.poll_interval, Duration::from_millis(50));
	assert_eq!(config.restore_timeout, Duration::from_millis(2500));
	assert_eq!(config.console_limit, Some(500));
}

#[test]
fn headless_conflicts_with_headful() {
	assert!(Cli::try_parse_from(["pw", "daemon", "--headless", "--headful"]).is_err());
}

#[test]
fn zero_console_limit_means_unbounded() {
	let cli = Cli::try_parse_from(["pw", "daemon", "--console-limit", "0"]).unwrap();
	let Commands::Daemon(args) = cli.command else {
		panic!("Expected Daemon command");
	};
	assert_eq!(args.into_config(PathBuf::from(".")).console_limit, None);
}
