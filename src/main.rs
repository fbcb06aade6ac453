//! LineDupe - Adaptive Duplicate-Record Finder
//!
//! Entry point for the LineDupe CLI application.

use clap::Parser;
use linedupe::{
    cli::Cli,
    error::StructuredError,
    logging, signal,
};

fn main() {
    let cli = Cli::parse();
    let json_errors = cli.json_errors;

    logging::init_logging(cli.verbose, cli.quiet);

    let shutdown = match signal::install_handler() {
        Ok(handler) => handler,
        Err(e) => {
            log::warn!("Continuing without signal handling: {e}");
            signal::ShutdownHandler::new()
        }
    };

    match linedupe::run_app(cli, &shutdown) {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            let exit_code = linedupe::exit_code_for(&err);

            if json_errors {
                let structured = StructuredError::new(&err, exit_code);
                if let Ok(json) = serde_json::to_string_pretty(&structured) {
                    eprintln!("{json}");
                } else {
                    eprintln!("[{}] Error: {err}", exit_code.code_prefix());
                }
            } else {
                eprintln!("[{}] Error: {err}", exit_code.code_prefix());
            }

            std::process::exit(exit_code.as_i32());
        }
    }
}
