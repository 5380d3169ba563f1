use cellmaps_hierarchyeval::Runner;
use cellmaps_hierarchyeval::cli::Args;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");

    let result = match args.into_config() {
        Ok(mut config) => {
            config.command_line = command_line;
            Runner::new(config).run().await
        }
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(2)
        }
    }
}
