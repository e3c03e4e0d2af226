use teloxide::utils::markdown::{bold, escape, italic, link};

use crate::matcher::Category;
use crate::scrapers::community::CommunityDeal;
use crate::scrapers::price_drop::{drop_string, PriceDropDeal};
use crate::scrapers::{FeedType, Tier};

pub const MAX_TITLE_CHARS: usize = 80;

/// Cut `title` to [`MAX_TITLE_CHARS`] characters, marking the cut.
pub fn shorten(title: &str) -> String {
    let title = title.trim();
    match title.char_indices().nth(MAX_TITLE_CHARS) {
        Some((end, _)) => format!("{}...", title[..end].trim_end()),
        None => title.to_string(),
    }
}

fn titled_link(url: &str, title: &str) -> String {
    link(url, &escape(&shorten(title)))
}

fn keyword_line(category: &Category) -> Option<String> {
    match category {
        Category::Keyword(keyword) => Some(format!(
            "\n{} {}",
            escape("Matched keyword:"),
            bold(&escape(keyword))
        )),
        Category::Subscription => None,
    }
}

pub fn community_deal(deal: &CommunityDeal, tier: Tier, category: &Category) -> String {
    let header = match (category, tier) {
        (Category::Keyword(_), _) => "👀 Watched deal",
        (Category::Subscription, Tier::Super) => "🔥🔥 Super deal",
        (Category::Subscription, _) => "🔥 Good deal",
    };

    let mut result = format!(
        "{}\n{} 🔺{}",
        bold(&escape(header)),
        titled_link(&deal.url, &deal.title),
        escape(&deal.upvotes),
    );

    if let Some(line) = keyword_line(category) {
        result += &line;
    }

    result
}

pub fn price_drop_deal(deal: &PriceDropDeal, category: &Category) -> String {
    let header = match (category, deal.feed) {
        (Category::Keyword(_), _) => "👀 Watched price drop",
        (Category::Subscription, FeedType::Daily) => "🛍️ Top daily price drop",
        (Category::Subscription, FeedType::Weekly) => "🛍️ Top weekly price drop",
        (Category::Subscription, FeedType::Unknown) => "🛍️ Price drop",
    };

    let mut result = format!("{}\n{}", bold(&escape(header)), titled_link(&deal.url, &deal.title));

    if let Some(clause) = drop_string(deal) {
        result += &format!("\n{}", italic(&escape(clause)));
    }

    if !deal.published.trim().is_empty() {
        result += &format!("\n{}", escape(&format!("Published {}", deal.published.trim())));
    }

    if let Some(image) = &deal.image {
        result += &format!("\n{}", link(image, "🖼 Image"));
    }

    if let Some(line) = keyword_line(category) {
        result += &line;
    }

    result
}
