use {
    std::sync::Arc,
    clap::Parser as _,
    serenity::{
        Client,
        gateway::ActivityData,
        prelude::GatewayIntents,
    },
    crate::prelude::*,
};

mod config;
mod discord_bot;
mod prelude;
mod roster;
mod scheduler;
mod sheets;
mod stage;
mod team;

#[derive(clap::Parser)]
#[clap(version)]
struct Args {
    /// Path to the config file (defaults to tourney-house.json in the XDG
    /// config directories).
    #[clap(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)] Config(#[from] config::Error),
    #[error(transparent)] Reqwest(#[from] reqwest::Error),
    #[error(transparent)] Serenity(#[from] serenity::Error),
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let Args { config } = Args::parse();
    // Initialize logging to systemd journal via stderr
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    let default_panic_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        error!("Thread panic: {panic_info:?}");
        default_panic_hook(panic_info)
    }));
    let config = Config::load(config).await?;
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("TourneyHouse/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(30))
        .use_rustls_tls()
        .https_only(true)
        .build()?;
    info!("starting up, watching {} guild(s)", config.discord.guilds.len());
    let mut client = Client::builder(config.discord.bot_token.clone(), GatewayIntents::GUILDS | GatewayIntents::GUILD_MEMBERS)
        .event_handler(discord_bot::Handler::new(config, http_client))
        .type_map_insert::<discord_bot::PendingReschedules>(Arc::default())
        .activity(ActivityData::watching("your reschedules"))
        .await?;
    client.start().await?;
    Ok(())
}
