//! Domain records mirrored from persistent storage.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::timestamps::storage_precision;

/// A company profile, keyed by its page identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub linkedin_id: Option<String>,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub followers: u64,
    #[serde(default)]
    pub head_count: u64,
    #[serde(default)]
    pub specialities: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub page_id: String,
    pub post_id: String,
    pub content: String,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments_count: u64,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub scraped_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub page_id: String,
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub scraped_at: OffsetDateTime,
}

/// Everything one acquisition produces for a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredPage {
    pub page: PageRecord,
    pub posts: Vec<PostRecord>,
    pub employees: Vec<EmployeeRecord>,
}

impl AcquiredPage {
    pub fn new(page: PageRecord, posts: Vec<PostRecord>, employees: Vec<EmployeeRecord>) -> Self {
        Self {
            page,
            posts,
            employees,
        }
    }

    /// Prepare the bundle for persistence at `written_at`.
    ///
    /// Children are re-keyed to the page, specialities become a sorted set,
    /// duplicate post ids keep their first occurrence and every timestamp is
    /// truncated to what the store can hold.
    pub fn normalize(mut self, written_at: OffsetDateTime) -> Self {
        let page_id = self.page.page_id.clone();

        self.page.specialities.retain(|tag| !tag.trim().is_empty());
        for tag in &mut self.page.specialities {
            *tag = tag.trim().to_string();
        }
        self.page.specialities.sort();
        self.page.specialities.dedup();

        self.page.created_at = storage_precision(self.page.created_at);
        self.page.updated_at = storage_precision(written_at);

        let mut seen = HashSet::with_capacity(self.posts.len());
        self.posts.retain(|post| seen.insert(post.post_id.clone()));
        for post in &mut self.posts {
            post.page_id = page_id.clone();
            post.created_at = post.created_at.map(storage_precision);
            post.scraped_at = storage_precision(post.scraped_at);
        }

        for employee in &mut self.employees {
            employee.page_id = page_id.clone();
            employee.scraped_at = storage_precision(employee.scraped_at);
        }

        self
    }
}
