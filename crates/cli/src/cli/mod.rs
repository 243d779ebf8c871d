#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand};

use crate::browser::LaunchConfig;
use crate::config::{
	ClientConfig, DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_POLL_INTERVAL, DEFAULT_RESPONSE_TIMEOUT, DEFAULT_RESTORE_TIMEOUT, DaemonConfig,
};
use crate::output::OutputFormat;

/// Cargo-like help colors.
fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
}

/// Drive a long-lived browser session from the command line.
#[derive(Parser, Debug)]
#[command(name = "pw")]
#[command(about = "Browser session daemon with a file-based command channel")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: json (default) or text
	#[arg(short = 'f', long, global = true, value_enum, default_value = "json")]
	pub format: OutputFormat,

	/// Directory holding the channel files (defaults to the current directory)
	#[arg(long, global = true, value_name = "DIR")]
	pub dir: Option<PathBuf>,

	/// How long a client waits for the daemon's response, in milliseconds
	#[arg(long, global = true, value_name = "MS", default_value_t = DEFAULT_RESPONSE_TIMEOUT.as_millis() as u64)]
	pub timeout_ms: u64,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run the daemon in the foreground until SIGINT or SIGTERM.
	Daemon(DaemonArgs),
	/// Navigate the page and report the final URL and title.
	#[command(alias = "nav")]
	Navigate {
		#[arg(value_name = "URL")]
		url: String,
	},
	/// Evaluate JavaScript in the page and print the result.
	Exec {
		#[arg(value_name = "CODE")]
		code: String,
	},
	/// Print captured console messages and page errors.
	Console,
	/// Discard captured console messages.
	#[command(name = "console-clear")]
	ConsoleClear,
	/// Show the current URL, title and console entry count.
	Status,
	/// Set the page viewport.
	Resize {
		#[arg(value_name = "WIDTH", value_parser = clap::value_parser!(u32).range(1..))]
		width: u32,
		#[arg(value_name = "HEIGHT", value_parser = clap::value_parser!(u32).range(1..))]
		height: u32,
	},
}

#[derive(Args, Debug, Clone)]
pub struct DaemonArgs {
	/// Run the browser without a window
	#[arg(long, conflicts_with = "headful")]
	pub headless: bool,

	/// Run the browser with a window (the default)
	#[arg(long)]
	pub headful: bool,

	/// Browser binary to launch
	#[arg(long, value_name = "PATH")]
	pub executable: Option<PathBuf>,

	/// Fixed initial viewport, as WIDTHxHEIGHT (native window size when omitted)
	#[arg(long, value_name = "WxH", value_parser = parse_viewport)]
	pub viewport: Option<crate::browser::Viewport>,

	/// Extra argument passed to the browser (repeatable)
	#[arg(long = "browser-arg", value_name = "ARG", allow_hyphen_values = true)]
	pub browser_args: Vec<String>,

	/// Channel poll interval in milliseconds
	#[arg(long, value_name = "MS", default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
	pub poll_interval_ms: u64,

	/// Navigation timeout in milliseconds
	#[arg(long, value_name = "MS", default_value_t = DEFAULT_NAVIGATION_TIMEOUT.as_millis() as u64)]
	pub navigation_timeout_ms: u64,

	/// Timeout for reopening the last page after a restart, in milliseconds
	#[arg(long, value_name = "MS", default_value_t = DEFAULT_RESTORE_TIMEOUT.as_millis() as u64)]
	pub restore_timeout_ms: u64,

	/// Keep only the newest N console entries (0 keeps everything)
	#[arg(long, value_name = "N")]
	pub console_limit: Option<usize>,
}

fn parse_viewport(s: &str) -> Result<crate::browser::Viewport, String> {
	let (w, h) = s
		.split_once(['x', 'X'])
		.ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
	let parse = |v: &str| match v.trim().parse::<u32>() {
		Ok(n) if n > 0 => Ok(n),
		_ => Err(format!("invalid viewport dimension '{v}'")),
	};
	Ok(crate::browser::Viewport {
		width: parse(w)?,
		height: parse(h)?,
	})
}

impl Cli {
	/// The channel directory, defaulting to the current directory.
	pub fn channel_dir(&self) -> std::io::Result<PathBuf> {
		match &self.dir {
			Some(dir) => Ok(dir.clone()),
			None => std::env::current_dir(),
		}
	}

	pub fn client_config(&self) -> std::io::Result<ClientConfig> {
		let mut config = ClientConfig::new(self.channel_dir()?);
		config.response_timeout = Duration::from_millis(self.timeout_ms);
		Ok(config)
	}
}

impl DaemonArgs {
	pub fn into_config(self, dir: PathBuf) -> DaemonConfig {
		let mut config = DaemonConfig::new(dir);
		config.poll_interval = Duration::from_millis(self.poll_interval_ms.max(1));
		config.navigation_timeout = Duration::from_millis(self.navigation_timeout_ms);
		config.restore_timeout = Duration::from_millis(self.restore_timeout_ms);
		config.console_limit = self.console_limit.filter(|&n| n > 0);
		config.launch = LaunchConfig {
			headless: self.headless,
			executable: self.executable,
			viewport: self.viewport,
			args: self.browser_args,
		};
		config
	}
}
