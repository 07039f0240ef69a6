//! timber-forecast entry point

use clap::Parser;
use timber_forecast::cli::{cmd_forecast, cmd_inspect, cmd_run, load_config, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timber_forecast=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Run { overrides } => {
            cmd_run(load_config(config_path, overrides)?)?;
        }
        Commands::Forecast { file, column, model, overrides } => {
            cmd_forecast(
                load_config(config_path, overrides)?,
                file,
                column.as_deref(),
                model.as_deref(),
            )?;
        }
        Commands::Inspect { file } => {
            cmd_inspect(file)?;
        }
    }

    Ok(())
}
