//! Read-only projections over the durable store.
//!
//! List queries bypass the cache entirely; only point lookups go through
//! the resolver.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::pagination::{MAX_PAGE_SIZE, MIN_PAGE_SIZE, PageWindow};
use crate::application::repos::{EMPLOYEE_LIST_CAP, PageListFilter, PagesRepo, RepoError};
use crate::domain::entities::{EmployeeRecord, PageRecord, PostRecord};
use crate::domain::error::DomainError;
use crate::domain::identifier::PageId;

const SOURCE: &str = "application::query";

/// Posts returned when the caller does not ask for a specific number.
pub const DEFAULT_POST_LIMIT: u32 = 20;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("page store unavailable: {0}")]
    Store(#[from] RepoError),
}

#[derive(Clone)]
pub struct QueryService {
    pages: Arc<dyn PagesRepo>,
}

impl QueryService {
    pub fn new(pages: Arc<dyn PagesRepo>) -> Self {
        Self { pages }
    }

    /// Pages matching every present filter, ordered by creation time.
    pub async fn list(
        &self,
        filter: PageListFilter,
        window: PageWindow,
    ) -> Result<Vec<PageRecord>, QueryError> {
        let filter = filter.normalized();
        if let (Some(min), Some(max)) = (filter.min_followers, filter.max_followers) {
            if min > max {
                return Err(DomainError::validation(format!(
                    "min_followers ({min}) exceeds max_followers ({max})"
                ))
                .into());
            }
        }

        let pages = self.pages.list_pages(&filter, window).await?;
        debug!(
            target = SOURCE,
            returned = pages.len(),
            limit = window.limit(),
            offset = window.offset(),
            "listed pages"
        );
        Ok(pages)
    }

    /// Up to `limit` posts of a page, newest first, undated posts last.
    pub async fn get_posts(&self, page_id: &str, limit: u32) -> Result<Vec<PostRecord>, QueryError> {
        let page_id = PageId::parse(page_id)?;
        let limit = limit.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        Ok(self.pages.list_posts(page_id.as_str(), limit).await?)
    }

    /// Employees of a page in insertion order, at most 100.
    pub async fn get_employees(&self, page_id: &str) -> Result<Vec<EmployeeRecord>, QueryError> {
        let page_id = PageId::parse(page_id)?;
        Ok(self
            .pages
            .list_employees(page_id.as_str(), EMPLOYEE_LIST_CAP)
            .await?)
    }
}
