mod cli;
mod logging;

use crate::cli::CliCommand;

fn main() {
    if logging::init_logging().is_err() {
        logging::init_logging_stderr();
    }

    if let Err(err) = CliCommand::run_from_args() {
        eprintln!("ddm error: {err:#}");
        std::process::exit(1);
    }
}
