use anyhow::Result;
use clap::Parser;

use mobile_provisioner::cli::{commands, Cli};
use mobile_provisioner::config::{config, ProvisionerConfig};
use mobile_provisioner::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            ProvisionerConfig::load_env_file()?;
            ProvisionerConfig::load(Some(path))?
        }
        None => config()?.clone(),
    };
    init_telemetry(&config.observability)?;

    commands::run(cli.command, config).await
}
