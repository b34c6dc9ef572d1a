//! Non-durable store used when no database is configured.

use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::application::pagination::PageWindow;
use crate::application::repos::{PageListFilter, PagesRepo, PagesWriteRepo, RepoError};
use crate::domain::entities::{AcquiredPage, EmployeeRecord, PageRecord, PostRecord};

#[derive(Default)]
struct Tables {
    pages: Vec<PageRecord>,
    posts: Vec<PostRecord>,
    employees: Vec<EmployeeRecord>,
}

/// Keeps rows in insertion order, which stands in for the serial keys of
/// the Postgres tables.
#[derive(Default)]
pub struct MemoryRepositories {
    tables: RwLock<Tables>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a page directly, bypassing acquisition. Intended for seeding.
    pub async fn seed(&self, acquired: AcquiredPage) -> Result<(), RepoError> {
        self.persist_acquisition(&acquired).await
    }

    pub async fn page_count(&self) -> usize {
        self.tables.read().await.pages.len()
    }
}

#[async_trait]
impl PagesRepo for MemoryRepositories {
    async fn find_page(&self, page_id: &str) -> Result<Option<PageRecord>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables
            .pages
            .iter()
            .find(|page| page.page_id == page_id)
            .cloned())
    }

    async fn list_pages(
        &self,
        filter: &PageListFilter,
        window: PageWindow,
    ) -> Result<Vec<PageRecord>, RepoError> {
        let tables = self.tables.read().await;
        let mut matched = tables
            .pages
            .iter()
            .filter(|page| filter.matches(page))
            .collect::<Vec<_>>();
        matched.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.page_id.cmp(&b.page_id))
        });

        let offset = usize::try_from(window.offset()).unwrap_or(usize::MAX);
        Ok(matched
            .into_iter()
            .skip(offset)
            .take(window.limit() as usize)
            .cloned()
            .collect())
    }

    async fn list_posts(&self, page_id: &str, limit: u32) -> Result<Vec<PostRecord>, RepoError> {
        let tables = self.tables.read().await;
        let mut posts = tables
            .posts
            .iter()
            .filter(|post| post.page_id == page_id)
            .collect::<Vec<_>>();
        // Stable sort keeps insertion order among equal timestamps.
        posts.sort_by(|a, b| match (a.created_at, b.created_at) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        Ok(posts.into_iter().take(limit as usize).cloned().collect())
    }

    async fn list_employees(
        &self,
        page_id: &str,
        limit: u32,
    ) -> Result<Vec<EmployeeRecord>, RepoError> {
        let tables = self.tables.read().await;
        Ok(tables
            .employees
            .iter()
            .filter(|employee| employee.page_id == page_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PagesWriteRepo for MemoryRepositories {
    async fn persist_acquisition(&self, acquired: &AcquiredPage) -> Result<(), RepoError> {
        let mut tables = self.tables.write().await;
        let page_id = acquired.page.page_id.as_str();

        if tables.pages.iter().any(|page| page.page_id == page_id) {
            return Err(RepoError::Duplicate {
                constraint: "pages_pkey".to_string(),
            });
        }

        let mut post_ids = tables
            .posts
            .iter()
            .filter(|post| post.page_id == page_id)
            .map(|post| post.post_id.as_str())
            .collect::<HashSet<_>>();
        for post in &acquired.posts {
            if post.page_id != page_id {
                return Err(RepoError::InvalidInput {
                    message: format!("post `{}` belongs to another page", post.post_id),
                });
            }
            if !post_ids.insert(post.post_id.as_str()) {
                return Err(RepoError::Duplicate {
                    constraint: "posts_page_id_post_id_key".to_string(),
                });
            }
        }
        if acquired
            .employees
            .iter()
            .any(|employee| employee.page_id != page_id)
        {
            return Err(RepoError::InvalidInput {
                message: "employee belongs to another page".to_string(),
            });
        }
        drop(post_ids);

        tables.pages.push(acquired.page.clone());
        tables.posts.extend(acquired.posts.iter().cloned());
        tables.employees.extend(acquired.employees.iter().cloned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::application::acquisition::FixtureAcquirer;

    fn post(page_id: &str, post_id: &str, created_at: Option<time::OffsetDateTime>) -> PostRecord {
        PostRecord {
            page_id: page_id.to_string(),
            post_id: post_id.to_string(),
            content: String::new(),
            likes: 0,
            comments_count: 0,
            media_url: None,
            created_at,
            scraped_at: datetime!(2024-01-01 00:00 UTC),
        }
    }

    #[tokio::test]
    async fn duplicate_page_is_rejected_without_partial_write() {
        let repo = MemoryRepositories::new();
        let bundle = FixtureAcquirer::fixture("acme");
        repo.persist_acquisition(&bundle).await.expect("first write");

        let err = repo
            .persist_acquisition(&bundle)
            .await
            .expect_err("second write");
        assert!(matches!(err, RepoError::Duplicate { .. }));
        assert_eq!(repo.page_count().await, 1);
        assert_eq!(repo.list_posts("acme", 100).await.expect("posts").len(), 2);
    }

    #[tokio::test]
    async fn posts_sort_newest_first_with_undated_last() {
        let repo = MemoryRepositories::new();
        let mut bundle = FixtureAcquirer::fixture("acme");
        bundle.posts = vec![
            post("acme", "undated", None),
            post("acme", "old", Some(datetime!(2024-01-01 00:00 UTC))),
            post("acme", "new", Some(datetime!(2024-02-01 00:00 UTC))),
        ];
        repo.seed(bundle).await.expect("seed");

        let ids = repo
            .list_posts("acme", 10)
            .await
            .expect("posts")
            .into_iter()
            .map(|post| post.post_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["new", "old", "undated"]);
    }

    #[tokio::test]
    async fn list_applies_window_after_ordering() {
        let repo = MemoryRepositories::new();
        for (id, day) in [("c", 3), ("a", 1), ("b", 2)] {
            let mut bundle = FixtureAcquirer::fixture(id);
            bundle.page.created_at = datetime!(2024-01-01 00:00 UTC) + time::Duration::days(day);
            repo.seed(bundle).await.expect("seed");
        }

        let page = repo
            .list_pages(&PageListFilter::default(), PageWindow::new(2, 1))
            .await
            .expect("list");
        let ids = page.iter().map(|p| p.page_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
