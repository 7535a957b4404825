//! Vigil - command line entry point

use anyhow::Context;
use clap::Parser;

use vigil::cli::{Cli, Command, report, reporter_name, summary_line};
use vigil::{Config, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Command::Report(args) => {
            args.apply(&mut config);
            init_tracing(&config.logging).context("failed to initialize logging")?;

            let run = report(config, reporter_name()).await?;
            for result in &run.results {
                println!("{}", summary_line(result));
            }
        }
    }
    Ok(())
}
