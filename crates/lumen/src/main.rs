#[cfg(test)]
mod assets;
mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config and profile listing never touch a device
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),
        Command::Devices => {
            let cfg = commands::load_config(&cli.global)?;
            commands::devices::list(&cfg, &cli.global)
        }

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "lumen", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let cfg = commands::load_config(&cli.global)?;
            let window = match &cmd {
                Command::Scan(args) => args.window,
                _ => None,
            };
            let target = commands::build_target(&cli.global, &cfg, window)?;

            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &target, &cli.global).await
        }
    }
}
