use std::sync::Arc;

use dealwatch::config::Config;
use dealwatch::database::retry::RetryPolicy;
use dealwatch::database::{Database, Persistence};
use dealwatch::notifier::TelegramNotifier;
use dealwatch::scrapers::{CommunityScraper, PriceDropScraper};
use dealwatch::subscribers::SubscriberStore;
use dealwatch::watcher::Watcher;
use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;

fn exit_with(msg: &str, e: impl std::fmt::Display) -> ! {
    log::error!("{msg}: {e}");
    std::process::exit(1)
}

#[tokio::main]
async fn main() {
    env_logger::init();
    log::info!("Starting bot...");

    let config = Config::from_env().unwrap_or_else(|e| exit_with("Invalid configuration", e));

    let database = Database::new(&config.database_url)
        .await
        .unwrap_or_else(|e| exit_with("Cannot open database", e));
    if let Err(e) = database.ping().await {
        exit_with("Database is not reachable", e);
    }
    let database = Arc::new(database);

    let store = SubscriberStore::new(database.clone(), RetryPolicy::default());
    match store.reload().await {
        Ok(count) => log::info!("Loaded {count} subscribers"),
        Err(e) => exit_with("Cannot load subscribers", e),
    }

    let bot = Bot::new(&config.telegram_token).throttle(Limits::default());
    let notifier = Arc::new(TelegramNotifier::new(bot));

    let community = CommunityScraper::new(&config.community_url, config.community)
        .unwrap_or_else(|e| exit_with("Cannot set up community scraper", e));
    let price_drop = PriceDropScraper::new(
        config.price_drop_urls.clone(),
        config.price_drop_target,
        config.price_drop,
    )
    .unwrap_or_else(|e| exit_with("Cannot set up price drop scraper", e));

    let (community, community_task) = Watcher::spawn(
        community,
        store.clone(),
        notifier.clone(),
        config.delivery_policy,
    );
    let (price_drop, price_drop_task) =
        Watcher::spawn(price_drop, store, notifier, config.delivery_policy);

    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Cannot listen for shutdown signal: {e}");
    }
    log::info!("Shutting down...");

    community.shutdown();
    price_drop.shutdown();
    for task in [community_task, price_drop_task] {
        if let Err(e) = task.await {
            log::error!("Watcher task failed: {e}");
        }
    }

    if let Err(e) = database.close().await {
        log::warn!("Closing database failed: {e}");
    }
}
