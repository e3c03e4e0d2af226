use std::str::FromStr;

use thiserror::Error;

use crate::matcher::DeliveryPolicy;
use crate::scrapers::PollSettings;

pub const DEFAULT_COMMUNITY_URL: &str = "https://www.ozbargain.com.au/";
pub const DEFAULT_PRICE_DROP_URLS: [&str; 2] = [
    "https://au.camelcamelcamel.com/top_drops/feed?t=daily&",
    "https://au.camelcamelcamel.com/top_drops/feed?t=weekly&",
];

#[derive(Debug, Error)]
pub enum Error {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),
    #[error("environment variable {name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub telegram_token: String,
    pub community_url: String,
    pub community: PollSettings,
    pub price_drop_urls: Vec<String>,
    pub price_drop: PollSettings,
    /// Minimum drop in percent for a price-drop subscription alert.
    pub price_drop_target: u32,
    pub delivery_policy: DeliveryPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let var = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        fn parsed<T: FromStr>(name: &'static str, value: Option<String>, default: T) -> Result<T, Error> {
            match value {
                None => Ok(default),
                Some(value) => value.trim().parse().map_err(|_| Error::Invalid { name, value }),
            }
        }

        let database_url = var("DATABASE_URL").ok_or(Error::Missing("DATABASE_URL"))?;
        let telegram_token = var("TELOXIDE_TOKEN").ok_or(Error::Missing("TELOXIDE_TOKEN"))?;

        let price_drop_urls = match var("PRICE_DROP_URLS") {
            Some(urls) => urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_PRICE_DROP_URLS.iter().map(|u| u.to_string()).collect(),
        };

        Ok(Self {
            database_url,
            telegram_token: telegram_token.trim().to_string(),
            community_url: var("COMMUNITY_URL").unwrap_or_else(|| DEFAULT_COMMUNITY_URL.to_string()),
            community: PollSettings {
                interval_minutes: parsed("COMMUNITY_SCRAPE_INTERVAL", var("COMMUNITY_SCRAPE_INTERVAL"), 5)?,
                max_deals: parsed("COMMUNITY_MAX_DEALS", var("COMMUNITY_MAX_DEALS"), 250)?,
            },
            price_drop_urls,
            price_drop: PollSettings {
                interval_minutes: parsed("PRICE_DROP_SCRAPE_INTERVAL", var("PRICE_DROP_SCRAPE_INTERVAL"), 30)?,
                max_deals: parsed("PRICE_DROP_MAX_DEALS", var("PRICE_DROP_MAX_DEALS"), 250)?,
            },
            price_drop_target: parsed("PRICE_DROP_TARGET", var("PRICE_DROP_TARGET"), 20)?,
            delivery_policy: parsed("DELIVERY_POLICY", var("DELIVERY_POLICY"), DeliveryPolicy::default())?,
        })
    }
}
