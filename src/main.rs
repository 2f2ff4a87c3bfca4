use clap::Parser;
use passhook::cli::{Cli, Commands, ConfigAction};
use passhook::config::Config;
use passhook::gateway::GatewayServer;
use passhook::logging;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!("starting passhook {}", env!("CARGO_PKG_VERSION"));
            let config = Config::from_env()?;
            let server = GatewayServer::start(config).await?;
            server.run_until_shutdown().await?;
        }
        Commands::Config(opts) => {
            let config = Config::from_env()?;
            match opts.action {
                ConfigAction::Show => {
                    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
                }
                ConfigAction::Validate => {
                    info!("Configuration is valid");
                }
            }
        }
        Commands::Version => {
            println!("passhook {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
