//! Hardcover GraphQL catalog client.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use bookworm_agent::BookCatalog;
use bookworm_core::config::CatalogConfig;
use bookworm_core::domain::book::BookRecord;

const BOOK_BY_TITLE: &str = r#"
query BookByTitle($title: String!) {
    books(where: {title: {_ilike: $title, _is_null: false}}, limit: 1) {
        id
        title
        release_year
        images(limit: 1, where: {url: {_is_null: false}}) { url }
        image { url }
        rating
        pages
    }
}
"#;

const BOOKS_BY_IDS: &str = r#"
query BooksByIds($ids: [Int!]!) {
    books(where: {id: {_in: $ids}}, distinct_on: title) {
        id
        title
        release_year
        images(limit: 1, where: {url: {_is_null: false}}) { url }
        image { url }
        rating
        pages
    }
}
"#;

const TRENDING_BOOK_IDS: &str = r#"
query TrendingBooks {
    books_trending(from: "2010-01-01", limit: 20, offset: 10) {
        ids
    }
}
"#;

pub struct GraphqlCatalog {
    client: Client,
    api_url: String,
    api_token: Option<SecretString>,
}

impl GraphqlCatalog {
    pub fn from_config(config: &CatalogConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { client, api_url: config.api_url.clone(), api_token: config.api_token.clone() })
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let mut request =
            self.client.post(&self.api_url).json(&json!({ "query": query, "variables": variables }));
        if let Some(token) = &self.api_token {
            request = request.header("Authorization", authorization_value(token.expose_secret()));
        }

        let response = request.send().await.context("catalog request failed")?;
        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "catalog.request.rejected",
                status = status.as_u16(),
                "catalog returned a non-success status"
            );
            return Err(anyhow!("catalog returned {status}"));
        }

        let body: GraphqlResponse<T> =
            response.json().await.context("catalog response was not valid json")?;
        body.into_data()
    }

    async fn books(&self, query: &str, variables: Value) -> Result<Vec<BookRecord>> {
        self.query::<BooksData>(query, variables).await.map(BooksData::into_records)
    }
}

#[async_trait]
impl BookCatalog for GraphqlCatalog {
    async fn find_book_by_title(&self, title: &str) -> Result<Option<BookRecord>> {
        let records = self.books(BOOK_BY_TITLE, json!({ "title": title })).await?;
        debug!(event_name = "catalog.lookup.title", title, hits = records.len(), "title lookup");
        Ok(records.into_iter().next())
    }

    async fn find_books_by_ids(&self, ids: &[i64]) -> Result<Vec<BookRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.books(BOOKS_BY_IDS, json!({ "ids": ids })).await
    }

    async fn trending_book_ids(&self) -> Result<Vec<i64>> {
        let data: TrendingData = self.query(TRENDING_BOOK_IDS, json!({})).await?;
        let ids = data.books_trending.map(|trending| trending.ids).unwrap_or_default();
        debug!(event_name = "catalog.lookup.trending", hits = ids.len(), "trending lookup");
        Ok(ids)
    }
}

/// Hardcover tokens are issued as `Bearer <jwt>`; a bare token gets the scheme added.
fn authorization_value(token: &str) -> String {
    let token = token.trim();
    if token.get(..7).is_some_and(|scheme| scheme.eq_ignore_ascii_case("bearer ")) {
        token.to_string()
    } else {
        format!("Bearer {token}")
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct BooksData {
    #[serde(default)]
    books: Vec<BookNode>,
}

#[derive(Debug, Deserialize)]
struct TrendingData {
    books_trending: Option<TrendingIds>,
}

#[derive(Debug, Deserialize)]
struct TrendingIds {
    #[serde(default)]
    ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct BookNode {
    id: Option<i64>,
    title: Option<String>,
    release_year: Option<i32>,
    #[serde(default)]
    images: Vec<ImageNode>,
    image: Option<ImageNode>,
    rating: Option<f64>,
    pages: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ImageNode {
    url: Option<String>,
}

impl<T> GraphqlResponse<T> {
    fn into_data(self) -> Result<T> {
        match self.data {
            Some(data) => Ok(data),
            None => {
                let messages =
                    self.errors.into_iter().map(|error| error.message).collect::<Vec<_>>();
                Err(anyhow!("catalog query failed: {}", messages.join("; ")))
            }
        }
    }
}

impl BooksData {
    fn into_records(self) -> Vec<BookRecord> {
        self.books.into_iter().filter_map(BookNode::into_record).collect()
    }
}

impl BookNode {
    fn into_record(self) -> Option<BookRecord> {
        let title = self.title.filter(|title| !title.trim().is_empty())?;
        let image_url = self
            .images
            .into_iter()
            .find_map(|image| image.url)
            .or_else(|| self.image.and_then(|image| image.url))
            .filter(|url| !url.trim().is_empty());

        Some(BookRecord {
            id: self.id,
            title,
            release_year: self.release_year,
            image_url,
            rating: self.rating,
            pages: self.pages,
        })
    }
}
