use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Which side of the channel this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Daemon,
	Client,
}

/// Default filter for `role` at `verbosity` when `RUST_LOG` is unset.
pub fn default_filter(role: Role, verbosity: u8) -> &'static str {
	// Clients stay quiet so stdout/stderr carry only the result.
	// The daemon logs its lifecycle at info without any -v.
	// chromiumoxide is noisy below warn even at -vv.
	match (role, verbosity) {
		(Role::Client, 0) => "error",
		(Role::Client, 1) | (Role::Daemon, 0) => "warn,pw=info,chromiumoxide=off",
		(_, 1) => "info,chromiumoxide=warn",
		_ => "debug,chromiumoxide=warn",
	}
}

pub fn init_logging(role: Role, verbosity: u8) {
	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(role, verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
