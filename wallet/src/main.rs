use std::{fs::File, io::Write, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use pos_common::{logger::init_logger, network::Network, tokio::select};
use pos_wallet::{config::Config, simulator::Simulation};

// Only used when no password is given, devnet keystores are throwaway
const DEVNET_DEFAULT_PASSWORD: &str = "devnet";

#[tokio::main]
async fn main() -> Result<()> {
    let mut config: Config = Config::parse();
    if let Some(path) = config.config_file.as_ref() {
        if config.generate_config_template {
            if Path::new(path).exists() {
                eprintln!("Config file already exists at {}", path);
                return Ok(());
            }

            let mut file = File::create(path).context("Error while creating config file")?;
            let json = serde_json::to_string_pretty(&config)
                .context("Error while serializing config file")?;
            file.write_all(json.as_bytes())
                .context("Error while writing config file")?;
            println!("Config file template generated at {}", path);
            return Ok(());
        }

        let file = File::open(path).context("Error while opening config file")?;
        config = serde_json::from_reader(file).context("Error while reading config file")?;
    } else if config.generate_config_template {
        eprintln!(
            "Provided config file path is required to generate the template with --config-file"
        );
        return Ok(());
    }

    init_logger(&(&config.log).into()).context("Error while initializing logger")?;

    if config.network != Network::Devnet {
        anyhow::bail!(
            "Only the devnet is supported, no chain backend is available for {}",
            config.network
        );
    }

    let password = match config.password.as_deref() {
        Some(password) => password.to_owned(),
        None => {
            warn!("No password provided, using the default devnet password");
            DEVNET_DEFAULT_PASSWORD.to_owned()
        }
    };

    let simulation = Simulation::new(
        config.network,
        &password,
        &config.staking,
        &config.simulator,
    )
    .await?;

    let stats = select! {
        res = simulation.run(config.simulator.blocks) => res?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl+c, stopping");
            if let Err(e) = simulation.get_staker().stop().await {
                warn!("Error while stopping the staker: {}", e);
            }
            simulation.get_staker().get_stats()
        }
    };

    for delegation in simulation.get_delegations().list_delegations().await {
        info!(
            "Delegation {} from {}: {} ({:?})",
            delegation.outpoint, delegation.owner, delegation.amount, delegation.state
        );
    }

    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
