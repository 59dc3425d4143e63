mod cli;
mod demo;
mod logging;

use anyhow::{Context, Result};
use bobbin_core::config::SchedulerConfig;

use crate::cli::Command;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;

    let config = match &args.config {
        Some(path) => SchedulerConfig::load_from_path(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    config.validate()?;

    match args.command {
        Command::Demo {
            flaky_fetches,
            fail_branch,
        } => demo::run(config, flaky_fetches, fail_branch).await,
        Command::CheckConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
