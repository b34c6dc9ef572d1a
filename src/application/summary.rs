//! Natural-language summaries of stored pages.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::resolver::{PageLookup, ResolveError};
use crate::domain::entities::PageRecord;

const SOURCE: &str = "application::summary";

pub const SYSTEM_PROMPT: &str = "You are a professional business analyst. \
Write a specific, concise summary of the company based on the provided details.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SummarizerError {
    #[error("summarizer request failed: {0}")]
    Request(String),
    #[error("summarizer returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("summarizer response was malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("page `{0}` has not been resolved yet")]
    NotFound(String),
    #[error(transparent)]
    Lookup(#[from] ResolveError),
    #[error(transparent)]
    Upstream(#[from] SummarizerError),
}

/// The page facts handed to a summarizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryPrompt {
    pub name: String,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub followers: u64,
    pub specialities: Vec<String>,
}

impl SummaryPrompt {
    pub fn from_page(page: &PageRecord) -> Self {
        Self {
            name: page.name.clone(),
            description: page.description.clone(),
            industry: page.industry.clone(),
            followers: page.followers,
            specialities: page.specialities.clone(),
        }
    }

    /// User message for a chat-style model.
    pub fn render(&self) -> String {
        format!(
            "Summarize this company profile:\n\
             Page Name: {}\n\
             Description: {}\n\
             Industry: {}\n\
             Followers: {}\n\
             Specialities: {}",
            self.name,
            self.description.as_deref().unwrap_or("n/a"),
            self.industry.as_deref().unwrap_or("n/a"),
            self.followers,
            self.specialities.join(", "),
        )
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &SummaryPrompt) -> Result<String, SummarizerError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub page_id: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct SummaryService {
    lookup: Arc<dyn PageLookup>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl SummaryService {
    /// Without a summarizer, summaries are generated locally and carry a
    /// note saying so.
    pub fn new(lookup: Arc<dyn PageLookup>, summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        Self { lookup, summarizer }
    }

    pub async fn summarize(&self, page_id: &str) -> Result<PageSummary, SummaryError> {
        let page = self
            .lookup
            .lookup(page_id)
            .await?
            .ok_or_else(|| SummaryError::NotFound(page_id.to_string()))?;

        let Some(summarizer) = self.summarizer.as_ref() else {
            return Ok(PageSummary {
                page_id: page.page_id.clone(),
                summary: offline_summary(&page),
                note: Some("No summarizer API key configured.".to_string()),
            });
        };

        let prompt = SummaryPrompt::from_page(&page);
        let summary = summarizer.summarize(&prompt).await.map_err(|err| {
            warn!(
                target = SOURCE,
                page_id = %page.page_id,
                error = %err,
                "summarizer call failed"
            );
            err
        })?;
        info!(target = SOURCE, page_id = %page.page_id, "summary generated");

        Ok(PageSummary {
            page_id: page.page_id,
            summary,
            note: None,
        })
    }
}

fn offline_summary(page: &PageRecord) -> String {
    format!(
        "[OFFLINE SUMMARY] {} is a company in {} with {} followers.",
        page.name,
        page.industry.as_deref().unwrap_or("an unspecified industry"),
        page.followers,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use time::macros::datetime;

    use super::*;

    struct StaticLookup(Option<PageRecord>);

    #[async_trait]
    impl PageLookup for StaticLookup {
        async fn lookup(&self, _page_id: &str) -> Result<Option<PageRecord>, ResolveError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSummarizer {
        prompts: Mutex<Vec<SummaryPrompt>>,
    }

    #[async_trait]
    impl Summarizer for RecordingSummarizer {
        async fn summarize(&self, prompt: &SummaryPrompt) -> Result<String, SummarizerError> {
            self.prompts.lock().expect("prompts").push(prompt.clone());
            Ok(format!("{} makes rockets.", prompt.name))
        }
    }

    fn acme() -> PageRecord {
        PageRecord {
            page_id: "acme".to_string(),
            name: "Acme Corp".to_string(),
            url: "https://www.linkedin.com/company/acme".to_string(),
            linkedin_id: None,
            profile_picture: None,
            description: Some("Rockets and anvils".to_string()),
            website: None,
            industry: Some("Aerospace".to_string()),
            followers: 1_200,
            head_count: 40,
            specialities: vec!["anvils".to_string(), "rockets".to_string()],
            created_at: datetime!(2024-01-01 00:00 UTC),
            updated_at: datetime!(2024-01-01 00:00 UTC),
        }
    }

    #[tokio::test]
    async fn unknown_page_is_not_found() {
        let service = SummaryService::new(Arc::new(StaticLookup(None)), None);
        let err = service.summarize("ghost").await.expect_err("missing page");
        assert!(matches!(err, SummaryError::NotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn missing_summarizer_yields_offline_summary_with_note() {
        let service = SummaryService::new(Arc::new(StaticLookup(Some(acme()))), None);
        let summary = service.summarize("acme").await.expect("summary");
        assert!(summary.summary.contains("Acme Corp"));
        assert!(summary.summary.contains("Aerospace"));
        assert!(summary.note.is_some());
    }

    #[tokio::test]
    async fn summarizer_receives_page_facts() {
        let summarizer = Arc::new(RecordingSummarizer::default());
        let service = SummaryService::new(
            Arc::new(StaticLookup(Some(acme()))),
            Some(summarizer.clone() as Arc<dyn Summarizer>),
        );

        let summary = service.summarize("acme").await.expect("summary");

        assert_eq!(summary.summary, "Acme Corp makes rockets.");
        assert!(summary.note.is_none());
        let prompts = summarizer.prompts.lock().expect("prompts");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].render().contains("Specialities: anvils, rockets"));
    }
}
