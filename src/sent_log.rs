use std::collections::HashSet;

use crate::model::{Source, Subscriber};

/// Set view of one subscriber's sent log, built once per tick so that each
/// check is a hash lookup no matter how long the log has grown.
#[derive(Debug, Default)]
pub struct SentIndex<'a> {
    ids: HashSet<&'a str>,
}

impl<'a> SentIndex<'a> {
    pub fn new(subscriber: &'a Subscriber, source: Source) -> Self {
        Self {
            ids: subscriber.sent_log(source).iter().map(String::as_str).collect(),
        }
    }

    pub fn contains(&self, deal_id: &str) -> bool {
        self.ids.contains(deal_id)
    }

    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, deal_id: &'a str) -> bool {
        self.ids.insert(deal_id)
    }
}

/// Whether `deal_id` is in the subscriber's sent log for `source`. Missing
/// data counts as not sent.
pub fn already_sent(subscriber: Option<&Subscriber>, deal_id: Option<&str>, source: Source) -> bool {
    let (Some(subscriber), Some(deal_id)) = (subscriber, deal_id) else {
        return false;
    };
    SentIndex::new(subscriber, source).contains(deal_id)
}
