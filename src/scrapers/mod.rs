pub mod community;
pub mod price_drop;

use std::borrow::Cow;
use std::time::Duration;

use futures_core::future::BoxFuture;
use thiserror::Error;

use crate::matcher::Category;
use crate::model::Source;

pub use community::CommunityScraper;
pub use price_drop::PriceDropScraper;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to retrieve website: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("failed to parse feed: {0}")]
    Feed(#[from] rss::Error),
    #[error("invalid website content: {0}")]
    ParseError(Cow<'static, str>),
    #[error("scraper not configured correctly: {0}")]
    Config(Cow<'static, str>),
}

/// Community deal classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Regular,
    Good,
    Super,
}

/// Which price-drop feed a deal came from, derived from the feed URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedType {
    Daily,
    Weekly,
    Unknown,
}

/// What a subscriber's tier/feed flags are checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealClass {
    Community(Tier),
    PriceDrop { feed: FeedType, target_met: bool },
}

pub trait Deal: Clone + Send + Sync + 'static {
    /// Source-scoped unique key.
    fn id(&self) -> &str;
    fn title(&self) -> &str;
}

/// A deal together with the order it was scraped in. Later scrapes carry
/// higher sequence numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scraped<D> {
    pub seq: u64,
    pub deal: D,
}

/// A deal source driven by a watcher task.
pub trait DealSource: Send + Sync + 'static {
    type Deal: Deal;

    const SOURCE: Source;

    fn interval(&self) -> Duration;

    /// Fetch new deals into the buffer. Returns how many were added.
    fn scrape(&mut self) -> BoxFuture<'_, Result<usize, Error>>;

    fn data(&self) -> &[Scraped<Self::Deal>];

    fn classify(&self, deal: &Self::Deal) -> DealClass;

    fn render(&self, deal: &Self::Deal, class: &DealClass, category: &Category) -> String;
}

/// Polling settings shared by both scrapers. Both values must be non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval_minutes: u64,
    pub max_deals: usize,
}

impl PollSettings {
    fn validate(&self) -> Result<(), Error> {
        if self.interval_minutes == 0 {
            return Err(Error::Config("scrape interval must be at least one minute".into()));
        }
        if self.interval_minutes.checked_mul(60).is_none() {
            return Err(Error::Config(format!(
                "scrape interval of {} minutes is too long",
                self.interval_minutes
            )
            .into()));
        }
        if self.max_deals == 0 {
            return Err(Error::Config("maximum number of stored deals must be positive".into()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

fn http_client() -> Result<reqwest::Client, Error> {
    Ok(reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?)
}

/// Bounded in-memory deal store. Once more than `max` deals are held, the
/// oldest ones are evicted.
#[derive(Debug)]
pub struct DealBuffer<D> {
    deals: Vec<Scraped<D>>,
    max: usize,
    next_seq: u64,
}

impl<D> DealBuffer<D> {
    pub fn new(max: usize) -> Self {
        Self {
            deals: Vec::new(),
            max,
            next_seq: 0,
        }
    }

    pub fn extend(&mut self, deals: impl IntoIterator<Item = D>) -> usize {
        let before = self.next_seq;
        for deal in deals {
            self.deals.push(Scraped {
                seq: self.next_seq,
                deal,
            });
            self.next_seq += 1;
        }

        if self.deals.len() > self.max {
            let excess = self.deals.len() - self.max;
            self.deals.drain(..excess);
        }

        (self.next_seq - before) as usize
    }

    pub fn as_slice(&self) -> &[Scraped<D>] {
        &self.deals
    }
}
