use clap::Parser;
use pw_cli::cli::{Cli, Commands};
use pw_cli::commands;
use pw_cli::error::PwError;
use pw_cli::logging::{self, Role};
use pw_cli::output::{self, OutputFormat, ResultBuilder};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	let role = match cli.command {
		Commands::Daemon(_) => Role::Daemon,
		_ => Role::Client,
	};
	logging::init_logging(role, cli.verbose);

	let format = cli.format;
	let name = commands::command_name(&cli.command);

	if let Err(err) = commands::dispatch(cli).await {
		handle_error(err, name, format, role);
		std::process::exit(1);
	}
}

fn handle_error(err: PwError, command: &str, format: OutputFormat, role: Role) {
	let cmd_error = err.to_command_error();

	// Always print to stderr for humans
	output::print_error_stderr(&cmd_error);

	// Clients also emit the ok=false envelope on stdout for scripts
	if role == Role::Client && format == OutputFormat::Json {
		let result = ResultBuilder::new(command).error(cmd_error).build();
		output::print_result(&result, format);
	}
}
