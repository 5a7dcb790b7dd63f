mod app;
mod cli;

use app::App;
use choicerig_experiment::TaskParameters;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Run(args) => App::new(args)?.run()?,
        Command::Defaults => {
            println!("{}", serde_json::to_string_pretty(&TaskParameters::default())?)
        }
    }

    Ok(())
}
