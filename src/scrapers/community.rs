use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use chrono_tz::Australia;
use futures_core::future::BoxFuture;
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::{http_client, Deal, DealBuffer, DealClass, DealSource, Error, PollSettings, Scraped, Tier};
use crate::matcher::Category;
use crate::messages;
use crate::model::Source;

/// Upvotes a deal needs within its first hour to be a good deal.
pub const GOOD_UPVOTES: i64 = 25;
/// Upvotes a deal needs within its first day to be a super deal.
pub const SUPER_UPVOTES: i64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityDeal {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Raw "submitted" line, e.g. `Neoika on 15/05/2022 - 14:38 kogan.com`.
    pub posted_on: String,
    pub upvotes: String,
    /// Age at scrape time, `None` if `posted_on` could not be parsed.
    pub age: Option<TimeDelta>,
}

impl Deal for CommunityDeal {
    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

lazy_static! {
    static ref DEAL_SELECTOR: Selector = Selector::parse(".node.node-ozbdeal.node-teaser").unwrap();
    static ref TITLE_SELECTOR: Selector = Selector::parse(".n-right h2.title").unwrap();
    static ref LINK_SELECTOR: Selector = Selector::parse(".n-right h2 a").unwrap();
    static ref SUBMITTED_SELECTOR: Selector = Selector::parse(".n-right div.submitted").unwrap();
    static ref UPVOTES_SELECTOR: Selector = Selector::parse(".n-left .nvb.voteup").unwrap();
    static ref ID_REGEX: Regex = Regex::new(r"\d+").unwrap();
    static ref TIMESTAMP_REGEX: Regex =
        Regex::new(r"(\d{1,2}/\d{1,2}/\d{4})\s*-\s*(\d{1,2}:\d{2})").unwrap();
}

fn extract_text(e: &ElementRef) -> String {
    e.text().collect::<Vec<_>>().concat().trim().to_owned()
}

/// Time since the timestamp embedded in a "submitted" line. The site prints
/// local Sydney time without a zone.
pub fn deal_age(posted_on: &str, now: DateTime<Utc>) -> Option<TimeDelta> {
    let captures = TIMESTAMP_REGEX.captures(posted_on)?;
    let timestamp = format!("{} {}", &captures[1], &captures[2]);
    let naive = match NaiveDateTime::parse_from_str(&timestamp, "%d/%m/%Y %H:%M") {
        Ok(naive) => naive,
        Err(e) => {
            log::warn!("Invalid deal timestamp {timestamp:?}: {e}");
            return None;
        }
    };
    let posted = naive
        .and_local_timezone(Australia::Sydney)
        .earliest()?
        .with_timezone(&Utc);

    Some((now - posted).max(TimeDelta::zero()))
}

/// Classify a deal by age and upvotes. The good window is checked first, so a
/// deal that qualifies for both is good. Unparseable data yields `Regular`.
pub fn deal_type(deal: &CommunityDeal) -> Tier {
    let Some(age) = deal.age else {
        log::warn!("Deal {} has no usable timestamp: {:?}", deal.id, deal.posted_on);
        return Tier::Regular;
    };

    let upvotes: i64 = match deal.upvotes.trim().parse() {
        Ok(upvotes) => upvotes,
        Err(e) => {
            log::warn!("Deal {} has invalid upvotes {:?}: {e}", deal.id, deal.upvotes);
            return Tier::Regular;
        }
    };

    if age < TimeDelta::hours(1) && upvotes >= GOOD_UPVOTES {
        Tier::Good
    } else if age < TimeDelta::hours(24) && upvotes >= SUPER_UPVOTES {
        Tier::Super
    } else {
        Tier::Regular
    }
}

fn parse_deal(node: ElementRef, base_url: &str, now: DateTime<Utc>) -> Option<CommunityDeal> {
    let link = node.select(&LINK_SELECTOR).next()?;
    let href = link.value().attr("href")?;
    let id = ID_REGEX.find(href)?.as_str().to_string();

    let title = node
        .select(&TITLE_SELECTOR)
        .next()
        .and_then(|h2| h2.value().attr("data-title"))
        .map(|t| t.trim().to_string())
        .unwrap_or_else(|| extract_text(&link));

    let url = if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), href)
    };

    let posted_on = node
        .select(&SUBMITTED_SELECTOR)
        .next()
        .map(|e| extract_text(&e))
        .unwrap_or_default();

    let upvotes = node
        .select(&UPVOTES_SELECTOR)
        .next()
        .map(|e| extract_text(&e))
        .unwrap_or_default();

    let age = deal_age(&posted_on, now);

    Some(CommunityDeal {
        id,
        title,
        url,
        posted_on,
        upvotes,
        age,
    })
}

/// Parse the deals listing. Teasers without a deal link are skipped.
pub fn parse_deals_page(html: &str, base_url: &str, now: DateTime<Utc>) -> Vec<CommunityDeal> {
    let document = Html::parse_document(html);

    for error in &document.errors {
        log::debug!("Parser error: {error}");
    }

    document
        .select(&DEAL_SELECTOR)
        .filter_map(|node| {
            let deal = parse_deal(node, base_url, now);
            if deal.is_none() {
                log::warn!("Skipping deal teaser without a deal link");
            }
            deal
        })
        .collect()
}

pub struct CommunityScraper {
    base_url: String,
    settings: PollSettings,
    client: reqwest::Client,
    buffer: DealBuffer<CommunityDeal>,
}

impl CommunityScraper {
    pub fn new(base_url: impl Into<String>, settings: PollSettings) -> Result<Self, Error> {
        let base_url = base_url.into();
        if base_url.trim().is_empty() {
            return Err(Error::Config("community base url is empty".into()));
        }
        settings.validate()?;

        Ok(Self {
            base_url,
            settings,
            client: http_client()?,
            buffer: DealBuffer::new(settings.max_deals),
        })
    }

    pub async fn scrape(&mut self) -> Result<usize, Error> {
        let url = format!("{}/deals", self.base_url.trim_end_matches('/'));
        log::info!("Fetch url {url}");
        let html = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let deals = parse_deals_page(&html, &self.base_url, Utc::now());
        if deals.is_empty() {
            return Err(Error::ParseError("no deals on page".into()));
        }

        log::debug!("Got {} deals", deals.len());
        Ok(self.ingest(deals))
    }

    /// Add already parsed deals to the buffer.
    pub fn ingest(&mut self, deals: Vec<CommunityDeal>) -> usize {
        self.buffer.extend(deals)
    }

    pub fn data(&self) -> &[Scraped<CommunityDeal>] {
        self.buffer.as_slice()
    }
}

impl DealSource for CommunityScraper {
    type Deal = CommunityDeal;

    const SOURCE: Source = Source::Community;

    fn interval(&self) -> std::time::Duration {
        self.settings.interval()
    }

    fn scrape(&mut self) -> BoxFuture<'_, Result<usize, Error>> {
        Box::pin(CommunityScraper::scrape(self))
    }

    fn data(&self) -> &[Scraped<CommunityDeal>] {
        CommunityScraper::data(self)
    }

    fn classify(&self, deal: &CommunityDeal) -> DealClass {
        DealClass::Community(deal_type(deal))
    }

    fn render(&self, deal: &CommunityDeal, class: &DealClass, category: &Category) -> String {
        let tier = match class {
            DealClass::Community(tier) => *tier,
            DealClass::PriceDrop { .. } => Tier::Regular,
        };
        messages::community_deal(deal, tier, category)
    }
}
