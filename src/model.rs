use teloxide::types::ChatId;

use crate::scrapers::{DealClass, FeedType, Tier};

/// The two deal feeds a subscriber can be notified about. Each has its own
/// sent log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Community,
    PriceDrop,
}

impl Source {
    pub fn name(self) -> &'static str {
        match self {
            Source::Community => "community",
            Source::PriceDrop => "price-drop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub chat_id: ChatId,
    pub username: String,
    pub good_enabled: bool,
    pub super_enabled: bool,
    pub daily_enabled: bool,
    pub weekly_enabled: bool,
    /// Case-insensitive substrings matched against deal titles.
    pub keywords: Vec<String>,
    pub community_sent: Vec<String>,
    pub price_drop_sent: Vec<String>,
}

impl Subscriber {
    pub fn new(chat_id: ChatId, username: impl Into<String>) -> Self {
        Self {
            chat_id,
            username: username.into(),
            good_enabled: false,
            super_enabled: false,
            daily_enabled: false,
            weekly_enabled: false,
            keywords: Vec::new(),
            community_sent: Vec::new(),
            price_drop_sent: Vec::new(),
        }
    }

    pub fn sent_log(&self, source: Source) -> &[String] {
        match source {
            Source::Community => &self.community_sent,
            Source::PriceDrop => &self.price_drop_sent,
        }
    }

    pub fn sent_log_mut(&mut self, source: Source) -> &mut Vec<String> {
        match source {
            Source::Community => &mut self.community_sent,
            Source::PriceDrop => &mut self.price_drop_sent,
        }
    }

    /// Whether one of the tier or feed flags covers a deal of this class.
    pub fn wants(&self, class: &DealClass) -> bool {
        match *class {
            DealClass::Community(Tier::Good) => self.good_enabled,
            DealClass::Community(Tier::Super) => self.super_enabled,
            DealClass::Community(Tier::Regular) => false,
            DealClass::PriceDrop { target_met: false, .. } => false,
            DealClass::PriceDrop { feed, .. } => match feed {
                FeedType::Daily => self.daily_enabled,
                FeedType::Weekly => self.weekly_enabled,
                FeedType::Unknown => false,
            },
        }
    }

    /// Keywords that can actually match: trimmed, lowercased, empty ones dropped.
    pub fn watched_keywords(&self) -> impl Iterator<Item = String> + '_ {
        self.keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
    }
}
