pub mod config;
pub mod database;
pub mod matcher;
pub mod messages;
pub mod model;
pub mod notifier;
pub mod scrapers;
pub mod sent_log;
pub mod subscribers;
pub mod watcher;
