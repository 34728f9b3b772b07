use calendar_autotag::Cli;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    calendar_autotag::run(Cli::parse()).await
}
