//! Acquisition port: produces a page bundle for an identifier nobody has
//! stored yet.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{AcquiredPage, PageRecord, PostRecord};
use crate::domain::timestamps::now_utc;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("navigation to `{url}` failed: {message}")]
    Navigation { url: String, message: String },
    #[error("acquisition exceeded {0:?}")]
    Timeout(Duration),
    #[error("could not parse acquired content: {0}")]
    Parse(String),
    #[error("acquired payload is invalid: {0}")]
    Invalid(String),
    #[error("acquisition source error: {0}")]
    Upstream(String),
}

impl AcquisitionError {
    pub fn navigation(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Navigation {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
pub trait Acquirer: Send + Sync {
    async fn acquire(&self, page_id: &str) -> Result<AcquiredPage, AcquisitionError>;
}

/// Acquirer returning fixed records for any identifier.
///
/// Used for offline development (`acquisition.mode = "fixture"`) and as the
/// test double for the resolver.
#[derive(Clone, Default)]
pub struct FixtureAcquirer {
    calls: Arc<AtomicUsize>,
    latency: Option<Duration>,
    failure: Option<AcquisitionError>,
}

impl FixtureAcquirer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every acquisition, widening the window for concurrent callers.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every acquisition with `error`.
    pub fn failing(mut self, error: AcquisitionError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Number of acquisitions started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fixture(page_id: &str) -> AcquiredPage {
        let now = now_utc();
        let name = display_name(page_id);
        let url = format!("https://www.linkedin.com/company/{page_id}");

        let page = PageRecord {
            page_id: page_id.to_string(),
            name: name.clone(),
            url: url.clone(),
            linkedin_id: None,
            profile_picture: None,
            description: Some(format!("{name} builds things.")),
            website: Some(url),
            industry: Some("Technology".to_string()),
            followers: 12_345,
            head_count: 0,
            specialities: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let posts = vec![
            PostRecord {
                page_id: page_id.to_string(),
                post_id: format!("urn:li:share:{page_id}_001"),
                content: format!("We are hiring at {name}!"),
                likes: 42,
                comments_count: 5,
                media_url: None,
                created_at: Some(now - time::Duration::hours(2)),
                scraped_at: now,
            },
            PostRecord {
                page_id: page_id.to_string(),
                post_id: format!("urn:li:share:{page_id}_002"),
                content: format!("New update from {name}..."),
                likes: 100,
                comments_count: 10,
                media_url: None,
                created_at: Some(now - time::Duration::hours(1)),
                scraped_at: now,
            },
        ];

        AcquiredPage::new(page, posts, Vec::new())
    }
}

#[async_trait]
impl Acquirer for FixtureAcquirer {
    async fn acquire(&self, page_id: &str) -> Result<AcquiredPage, AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = self.failure.clone() {
            return Err(error);
        }
        Ok(Self::fixture(page_id))
    }
}

fn display_name(page_id: &str) -> String {
    page_id
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
