//! Claudecord binary: loads config, connects to Discord, and bridges channel
//! messages to the claude CLI.

use anyhow::Context as _;
use clap::Parser;
use serenity::all::GatewayIntents;
use serenity::Client;
use tracing::info;
use tracing_subscriber::EnvFilter;

use claudecord::bot::Bridge;
use claudecord::config::Config;

/// Claudecord - bridges Discord channels to the claude CLI
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "claudecord.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("claudecord=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::load(&args.config)?;
    config.apply_env_overrides();

    let token = std::env::var("DISCORD_BOT_TOKEN")
        .map_err(|_| anyhow::anyhow!("DISCORD_BOT_TOKEN environment variable not set"))?;

    info!(
        command = %config.claude.command,
        work_dir = %config.claude.work_dir.display(),
        "Starting claudecord"
    );

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&token, intents)
        .event_handler(Bridge::new(&config))
        .await
        .context("failed to create Discord client")?;

    client.start().await.context("Discord client error")?;
    Ok(())
}
