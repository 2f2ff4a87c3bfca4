use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "passhook",
    version,
    about = "Webhook-triggered HTTP gateway for gopass secret stores"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    Serve,
    Config(ConfigOpts),
    Version,
}

#[derive(clap::Args)]
pub struct ConfigOpts {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Validate,
}
