use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Catalog metadata for one book.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub id: Option<i64>,
    pub title: String,
    pub release_year: Option<i32>,
    pub image_url: Option<String>,
    pub rating: Option<f64>,
    pub pages: Option<u32>,
}

/// One entry of the oracle's recommendation array.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RecommendationCandidate {
    #[serde(rename = "Title", alias = "title")]
    pub title: String,
    #[serde(rename = "ReasonForRecommendation", alias = "reason", default)]
    pub reason: String,
    #[serde(rename = "Price", alias = "price", default)]
    pub price: Value,
}

impl RecommendationCandidate {
    pub fn price_text(&self) -> String {
        match &self.price {
            Value::String(text) => text.trim().trim_start_matches('$').to_string(),
            Value::Number(number) => number.to_string(),
            _ => String::new(),
        }
    }
}

/// A catalog-enriched recommendation as rendered by the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendedBook {
    pub title: String,
    pub release_year: Option<i32>,
    pub image_url: String,
    pub rating: Option<f64>,
    pub pages: Option<u32>,
    #[serde(rename = "ReasonForRecommendation")]
    pub reason: String,
    #[serde(rename = "Price")]
    pub price: String,
}

impl RecommendedBook {
    pub fn from_catalog(
        record: BookRecord,
        candidate: &RecommendationCandidate,
        fallback_image_url: &str,
    ) -> Self {
        Self {
            title: record.title,
            release_year: record.release_year,
            image_url: record
                .image_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| fallback_image_url.to_string()),
            rating: record.rating,
            pages: record.pages,
            reason: candidate.reason.clone(),
            price: candidate.price_text(),
        }
    }
}

/// A catalog book as listed on the trending shelf.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendingBook {
    pub id: i64,
    pub title: String,
    pub release_year: Option<i32>,
    pub image_url: String,
    pub rating: Option<f64>,
    pub pages: Option<u32>,
}

impl TrendingBook {
    /// `None` for records without an id, which cannot be linked from the shelf.
    pub fn from_catalog(record: BookRecord, fallback_image_url: &str) -> Option<Self> {
        Some(Self {
            id: record.id?,
            title: record.title,
            release_year: record.release_year,
            image_url: record
                .image_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| fallback_image_url.to_string()),
            rating: record.rating,
            pages: record.pages,
        })
    }
}

/// Keeps the main title: text before the first `:`, `–` or `-`.
/// A title whose leading segment is empty is kept whole.
pub fn normalize_title(title: &str) -> String {
    let main = title.split([':', '–', '-']).next().unwrap_or_default().trim();
    if main.is_empty() {
        title.trim().to_string()
    } else {
        main.to_string()
    }
}
