//! Deterministic collaborators for tests and local runs without network access.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use bookworm_core::domain::book::BookRecord;
use bookworm_core::domain::conversation::Message;

use crate::catalog::BookCatalog;
use crate::llm::LlmClient;

/// Replays queued replies in order. Once the queue is empty every call fails.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self::default()
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, prompt: &str, _history: &[Message]) -> Result<String> {
        lock(&self.prompts).push(prompt.to_string());
        lock(&self.replies).pop_front().ok_or_else(|| anyhow!("scripted llm has no reply"))
    }
}

/// Title lookups against a fixed set of records, case-insensitive.
#[derive(Default)]
pub struct StaticCatalog {
    by_title: HashMap<String, BookRecord>,
    trending: Vec<i64>,
    unavailable: bool,
}

impl StaticCatalog {
    pub fn new(records: impl IntoIterator<Item = BookRecord>) -> Self {
        let by_title =
            records.into_iter().map(|record| (record.title.to_lowercase(), record)).collect();
        Self { by_title, ..Self::default() }
    }

    /// Every lookup fails.
    pub fn unavailable() -> Self {
        Self { unavailable: true, ..Self::default() }
    }

    pub fn with_trending(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.trending = ids.into_iter().collect();
        self
    }

    pub fn with_titles<'a>(titles: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(titles.into_iter().enumerate().map(|(index, title)| BookRecord {
            id: Some(index as i64 + 1),
            title: title.to_string(),
            release_year: Some(2000 + index as i32),
            image_url: None,
            rating: Some(4.0),
            pages: Some(300),
        }))
    }
}

#[async_trait]
impl BookCatalog for StaticCatalog {
    async fn find_book_by_title(&self, title: &str) -> Result<Option<BookRecord>> {
        if self.unavailable {
            return Err(anyhow!("catalog unavailable"));
        }
        Ok(self.by_title.get(&title.to_lowercase()).cloned())
    }

    async fn find_books_by_ids(&self, ids: &[i64]) -> Result<Vec<BookRecord>> {
        if self.unavailable {
            return Err(anyhow!("catalog unavailable"));
        }
        Ok(self
            .by_title
            .values()
            .filter(|record| record.id.is_some_and(|id| ids.contains(&id)))
            .cloned()
            .collect())
    }

    async fn trending_book_ids(&self) -> Result<Vec<i64>> {
        if self.unavailable {
            return Err(anyhow!("catalog unavailable"));
        }
        Ok(self.trending.clone())
    }
}
