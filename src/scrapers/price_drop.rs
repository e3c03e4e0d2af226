use futures_core::future::BoxFuture;
use lazy_static::lazy_static;
use regex::Regex;

use super::{http_client, Deal, DealBuffer, DealClass, DealSource, Error, FeedType, PollSettings, Scraped};
use crate::matcher::Category;
use crate::messages;
use crate::model::Source;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceDropDeal {
    pub id: String,
    /// Carries the drop, e.g. `Router - down 23.57% ($76.78) to $249.00 from $325.78`.
    pub title: String,
    pub url: String,
    pub published: String,
    pub image: Option<String>,
    pub feed: FeedType,
}

impl Deal for PriceDropDeal {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

lazy_static! {
    // trailing `- down X% ($Y) to $Z from $W`; group 1 is the clause, group 2 the percentage
    static ref DROP_REGEX: Regex = Regex::new(
        r"-\s+(down\s+(\d+(?:\.\d+)?)%\s+\(\$[\d.,]+\)\s+to\s+\$[\d.,]+\s+from\s+\$[\d.,]+)\s*$"
    )
    .unwrap();
}

pub fn feed_type_from_url(url: &str) -> FeedType {
    if url.contains("daily") {
        FeedType::Daily
    } else if url.contains("weekly") {
        FeedType::Weekly
    } else {
        FeedType::Unknown
    }
}

/// Percentage drop embedded in the title, if there is one.
pub fn drop_percent(deal: &PriceDropDeal) -> Option<f64> {
    DROP_REGEX
        .captures(&deal.title)
        .and_then(|c| c[2].parse().ok())
}

/// Whether the drop is at least `target` percent. Titles without a readable
/// drop never meet the target.
pub fn is_target_drop_greater(deal: &PriceDropDeal, target: u32) -> bool {
    match drop_percent(deal) {
        Some(percent) => percent >= f64::from(target),
        None => {
            log::warn!("No price drop in title of deal {}: {:?}", deal.id, deal.title);
            false
        }
    }
}

/// The `down X% ($Y) to $Z from $W` clause of the title.
pub fn drop_string(deal: &PriceDropDeal) -> Option<&str> {
    DROP_REGEX
        .captures(&deal.title)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn image_url(item: &rss::Item) -> Option<String> {
    item.enclosure()
        .filter(|e| e.mime_type().starts_with("image/"))
        .map(|e| e.url().to_string())
}

/// Turn a parsed feed into deals. Items with neither guid nor link are dropped.
pub fn parse_channel(channel: &rss::Channel, feed: FeedType) -> Vec<PriceDropDeal> {
    channel
        .items()
        .iter()
        .filter_map(|item| {
            let id = item
                .guid()
                .map(|g| g.value().to_string())
                .or_else(|| item.link().map(String::from))?;

            Some(PriceDropDeal {
                id,
                title: item.title().unwrap_or_default().trim().to_string(),
                url: item.link().unwrap_or_default().to_string(),
                published: item.pub_date().unwrap_or_default().to_string(),
                image: image_url(item),
                feed,
            })
        })
        .collect()
}

pub struct PriceDropScraper {
    urls: Vec<String>,
    target_drop: u32,
    settings: PollSettings,
    client: reqwest::Client,
    buffer: DealBuffer<PriceDropDeal>,
}

impl PriceDropScraper {
    pub fn new(urls: Vec<String>, target_drop: u32, settings: PollSettings) -> Result<Self, Error> {
        if urls.is_empty() {
            return Err(Error::Config("no price drop feed urls".into()));
        }
        if urls.iter().any(|u| u.trim().is_empty()) {
            return Err(Error::Config("empty price drop feed url".into()));
        }
        settings.validate()?;

        Ok(Self {
            urls,
            target_drop,
            settings,
            client: http_client()?,
            buffer: DealBuffer::new(settings.max_deals),
        })
    }

    /// Read every feed. Nothing is stored unless all feeds could be read.
    pub async fn scrape(&mut self) -> Result<usize, Error> {
        let mut deals = Vec::new();

        for url in &self.urls {
            let feed = feed_type_from_url(url);
            if feed == FeedType::Unknown {
                log::warn!("Cannot tell feed type from url {url}");
            }

            log::info!("Fetch feed {url}");
            let body = self
                .client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            let channel = rss::Channel::read_from(body.as_ref())?;
            deals.extend(parse_channel(&channel, feed));
        }

        log::debug!("Got {} deals", deals.len());
        Ok(self.ingest(deals))
    }

    pub fn ingest(&mut self, deals: Vec<PriceDropDeal>) -> usize {
        self.buffer.extend(deals)
    }

    pub fn data(&self) -> &[Scraped<PriceDropDeal>] {
        self.buffer.as_slice()
    }
}

impl DealSource for PriceDropScraper {
    type Deal = PriceDropDeal;

    const SOURCE: Source = Source::PriceDrop;

    fn interval(&self) -> std::time::Duration {
        self.settings.interval()
    }

    fn scrape(&mut self) -> BoxFuture<'_, Result<usize, Error>> {
        Box::pin(PriceDropScraper::scrape(self))
    }

    fn data(&self) -> &[Scraped<PriceDropDeal>] {
        PriceDropScraper::data(self)
    }

    fn classify(&self, deal: &PriceDropDeal) -> DealClass {
        DealClass::PriceDrop {
            feed: deal.feed,
            target_met: is_target_drop_greater(deal, self.target_drop),
        }
    }

    fn render(&self, deal: &PriceDropDeal, _class: &DealClass, category: &Category) -> String {
        messages::price_drop_deal(deal, category)
    }
}
