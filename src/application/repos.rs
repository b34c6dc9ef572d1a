//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::PageWindow;
use crate::domain::entities::{AcquiredPage, EmployeeRecord, PageRecord, PostRecord};

/// Upper bound on employees returned for a page.
pub const EMPLOYEE_LIST_CAP: u32 = 100;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Conjunctive filter over stored pages. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageListFilter {
    pub min_followers: Option<u64>,
    pub max_followers: Option<u64>,
    /// Case-insensitive substring of the industry.
    pub industry: Option<String>,
    /// Case-insensitive substring of the display name.
    pub name: Option<String>,
}

impl PageListFilter {
    /// Drop blank text filters so `?industry=` behaves like no filter.
    pub fn normalized(mut self) -> Self {
        self.industry = self.industry.and_then(non_blank);
        self.name = self.name.and_then(non_blank);
        self
    }

    pub fn matches(&self, page: &PageRecord) -> bool {
        if self.min_followers.is_some_and(|min| page.followers < min) {
            return false;
        }
        if self.max_followers.is_some_and(|max| page.followers > max) {
            return false;
        }
        if let Some(needle) = self.industry.as_deref() {
            match page.industry.as_deref() {
                Some(industry) if contains_ignore_case(industry, needle) => {}
                _ => return false,
            }
        }
        match self.name.as_deref() {
            Some(needle) => contains_ignore_case(&page.name, needle),
            None => true,
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[async_trait]
pub trait PagesRepo: Send + Sync {
    async fn find_page(&self, page_id: &str) -> Result<Option<PageRecord>, RepoError>;

    async fn list_pages(
        &self,
        filter: &PageListFilter,
        window: PageWindow,
    ) -> Result<Vec<PageRecord>, RepoError>;

    /// Posts newest first by source creation time; undated posts last.
    async fn list_posts(&self, page_id: &str, limit: u32) -> Result<Vec<PostRecord>, RepoError>;

    /// Employees in insertion order.
    async fn list_employees(
        &self,
        page_id: &str,
        limit: u32,
    ) -> Result<Vec<EmployeeRecord>, RepoError>;
}

#[async_trait]
pub trait PagesWriteRepo: Send + Sync {
    /// Insert the page, then its posts, then its employees.
    ///
    /// Empty child sequences are skipped. The three writes become visible
    /// together; a reader never sees the page without its posts.
    async fn persist_acquisition(&self, acquired: &AcquiredPage) -> Result<(), RepoError>;
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn page(name: &str, industry: Option<&str>, followers: u64) -> PageRecord {
        PageRecord {
            page_id: name.to_lowercase(),
            name: name.to_string(),
            url: String::new(),
            linkedin_id: None,
            profile_picture: None,
            description: None,
            website: None,
            industry: industry.map(str::to_string),
            followers,
            head_count: 0,
            specialities: Vec::new(),
            created_at: datetime!(2024-01-01 00:00 UTC),
            updated_at: datetime!(2024-01-01 00:00 UTC),
        }
    }

    #[test]
    fn follower_bounds_are_inclusive() {
        let filter = PageListFilter {
            min_followers: Some(100),
            max_followers: Some(200),
            ..Default::default()
        };
        assert!(filter.matches(&page("A", None, 100)));
        assert!(filter.matches(&page("B", None, 200)));
        assert!(!filter.matches(&page("C", None, 99)));
        assert!(!filter.matches(&page("D", None, 201)));
    }

    #[test]
    fn text_filters_are_case_insensitive_substrings() {
        let filter = PageListFilter {
            industry: Some("SOFT".to_string()),
            name: Some("acme".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&page("Acme Corp", Some("Computer Software"), 0)));
        assert!(!filter.matches(&page("Acme Corp", None, 0)));
        assert!(!filter.matches(&page("Globex", Some("Software"), 0)));
    }

    #[test]
    fn regex_metacharacters_match_literally() {
        let filter = PageListFilter {
            name: Some("a.c".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&page("abc", None, 0)));
        assert!(filter.matches(&page("a.c labs", None, 0)));
    }

    #[test]
    fn blank_text_filters_are_dropped() {
        let filter = PageListFilter {
            industry: Some("   ".to_string()),
            name: Some(" acme ".to_string()),
            ..Default::default()
        }
        .normalized();
        assert_eq!(filter.industry, None);
        assert_eq!(filter.name.as_deref(), Some("acme"));
    }
}
