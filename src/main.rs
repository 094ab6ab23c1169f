mod cli;

use std::process::ExitCode;

use aiimageeditor::logger::{self, LogOptions};
use clap::Parser;

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();
    logger::init(LogOptions {
        verbose: args.verbose,
        file: args.log_file.clone(),
    });
    cli::run(args)
}
