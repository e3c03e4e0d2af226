use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::str::FromStr;

use teloxide::types::ChatId;
use thiserror::Error;

use crate::model::{Source, Subscriber};
use crate::scrapers::{Deal, DealClass, Scraped};
use crate::sent_log::SentIndex;

/// Why a subscriber is notified about a deal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Category {
    /// One of the tier or feed flags covers the deal.
    Subscription,
    /// The title contains this watched keyword (lowercased).
    Keyword(String),
}

/// How many notifications one deal may produce for the same subscriber in
/// one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryPolicy {
    /// At most one. The subscription check wins over keywords.
    #[default]
    OncePerDeal,
    /// Subscription and keyword matches are notified separately.
    OncePerCategory,
}

#[derive(Debug, Error)]
#[error("unknown delivery policy {0:?}")]
pub struct UnknownPolicy(String);

impl FromStr for DeliveryPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "once-per-deal" => Ok(Self::OncePerDeal),
            "once-per-category" => Ok(Self::OncePerCategory),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classified<D> {
    pub seq: u64,
    pub deal: D,
    pub class: DealClass,
}

#[derive(Debug)]
pub struct Candidate<'a, D> {
    pub chat_id: ChatId,
    pub deal: &'a Classified<D>,
    pub category: Category,
}

/// Collapse a batch to one entry per deal id, keeping the most recently
/// scraped copy.
pub fn dedup<D: Deal>(batch: &[Scraped<D>]) -> HashMap<String, Scraped<D>> {
    let mut unique: HashMap<String, Scraped<D>> = HashMap::with_capacity(batch.len());

    for scraped in batch {
        match unique.entry(scraped.deal.id().to_string()) {
            Entry::Occupied(mut entry) => {
                if scraped.seq >= entry.get().seq {
                    entry.insert(scraped.clone());
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(scraped.clone());
            }
        }
    }

    unique
}

/// Classify unique deals, oldest scrape first.
pub fn classify<D: Deal>(
    unique: HashMap<String, Scraped<D>>,
    class_of: impl Fn(&D) -> DealClass,
) -> Vec<Classified<D>> {
    let mut deals: Vec<_> = unique
        .into_values()
        .map(|Scraped { seq, deal }| Classified {
            seq,
            class: class_of(&deal),
            deal,
        })
        .collect();
    deals.sort_by_key(|d| d.seq);
    deals
}

/// Every (subscriber, deal, category) notification due for this pass. Deals
/// already in the subscriber's sent log for `source` are skipped, and at most
/// one keyword notification is produced per deal.
pub fn find_candidates<'a, D: Deal>(
    deals: &'a [Classified<D>],
    subscribers: &'a [Subscriber],
    source: Source,
    policy: DeliveryPolicy,
) -> Vec<Candidate<'a, D>> {
    let mut indexes: Vec<_> = subscribers
        .iter()
        .map(|s| SentIndex::new(s, source))
        .collect();
    let keywords: Vec<Vec<String>> = subscribers
        .iter()
        .map(|s| s.watched_keywords().collect())
        .collect();

    let mut candidates = Vec::new();

    for deal in deals {
        let id = deal.deal.id();
        let title = deal.deal.title().to_lowercase();

        for ((sub, index), keywords) in subscribers.iter().zip(&mut indexes).zip(&keywords) {
            if index.contains(id) {
                continue;
            }

            let mut fired = false;

            if sub.wants(&deal.class) {
                candidates.push(Candidate {
                    chat_id: sub.chat_id,
                    deal,
                    category: Category::Subscription,
                });
                fired = true;
            }

            if !(fired && policy == DeliveryPolicy::OncePerDeal) {
                if let Some(keyword) = keywords.iter().find(|k| title.contains(k.as_str())) {
                    candidates.push(Candidate {
                        chat_id: sub.chat_id,
                        deal,
                        category: Category::Keyword(keyword.clone()),
                    });
                    fired = true;
                }
            }

            if fired {
                index.insert(id);
            }
        }
    }

    candidates
}
