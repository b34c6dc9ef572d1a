use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::pagination::PageWindow,
    application::repos::{PageListFilter, PagesRepo, PagesWriteRepo, RepoError},
    domain::entities::{AcquiredPage, EmployeeRecord, PageRecord, PostRecord},
};

use super::util::{from_db_count, ilike_contains, to_db_count};
use super::{PostgresRepositories, map_sqlx_error};

/// Rows per multi-row insert; keeps bind parameters under the Postgres
/// limit of 65535 per statement.
const INSERT_CHUNK_ROWS: usize = 1000;

const PAGE_COLUMNS: &str = "page_id, name, url, linkedin_id, profile_picture, description, \
     website, industry, followers, head_count, specialities, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct PageRow {
    page_id: String,
    name: String,
    url: String,
    linkedin_id: Option<String>,
    profile_picture: Option<String>,
    description: Option<String>,
    website: Option<String>,
    industry: Option<String>,
    followers: i64,
    head_count: i64,
    specialities: Vec<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<PageRow> for PageRecord {
    type Error = RepoError;

    fn try_from(row: PageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            page_id: row.page_id,
            name: row.name,
            url: row.url,
            linkedin_id: row.linkedin_id,
            profile_picture: row.profile_picture,
            description: row.description,
            website: row.website,
            industry: row.industry,
            followers: from_db_count(row.followers, "followers")?,
            head_count: from_db_count(row.head_count, "head_count")?,
            specialities: row.specialities,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PostRow {
    page_id: String,
    post_id: String,
    content: String,
    likes: i64,
    comments_count: i64,
    media_url: Option<String>,
    created_at: Option<OffsetDateTime>,
    scraped_at: OffsetDateTime,
}

impl TryFrom<PostRow> for PostRecord {
    type Error = RepoError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Self {
            page_id: row.page_id,
            post_id: row.post_id,
            content: row.content,
            likes: from_db_count(row.likes, "likes")?,
            comments_count: from_db_count(row.comments_count, "comments_count")?,
            media_url: row.media_url,
            created_at: row.created_at,
            scraped_at: row.scraped_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EmployeeRow {
    page_id: String,
    name: String,
    title: Option<String>,
    profile_url: Option<String>,
    scraped_at: OffsetDateTime,
}

impl From<EmployeeRow> for EmployeeRecord {
    fn from(row: EmployeeRow) -> Self {
        Self {
            page_id: row.page_id,
            name: row.name,
            title: row.title,
            profile_url: row.profile_url,
            scraped_at: row.scraped_at,
        }
    }
}

fn push_page_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: &PageListFilter,
) -> Result<(), RepoError> {
    if let Some(min) = filter.min_followers {
        qb.push(" AND followers >= ");
        qb.push_bind(to_db_count(min, "min_followers")?);
    }
    if let Some(max) = filter.max_followers {
        // Anything above i64::MAX is unbounded in practice.
        qb.push(" AND followers <= ");
        qb.push_bind(i64::try_from(max).unwrap_or(i64::MAX));
    }
    if let Some(industry) = filter.industry.as_deref() {
        qb.push(" AND industry ILIKE ");
        qb.push_bind(ilike_contains(industry));
        qb.push(" ESCAPE '\\'");
    }
    if let Some(name) = filter.name.as_deref() {
        qb.push(" AND name ILIKE ");
        qb.push_bind(ilike_contains(name));
        qb.push(" ESCAPE '\\'");
    }
    Ok(())
}

#[async_trait]
impl PagesRepo for PostgresRepositories {
    async fn find_page(&self, page_id: &str) -> Result<Option<PageRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(PAGE_COLUMNS);
        qb.push(" FROM pages WHERE page_id = ");
        qb.push_bind(page_id.to_string());

        qb.build_query_as::<PageRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .map(PageRecord::try_from)
            .transpose()
    }

    async fn list_pages(
        &self,
        filter: &PageListFilter,
        window: PageWindow,
    ) -> Result<Vec<PageRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT ");
        qb.push(PAGE_COLUMNS);
        qb.push(" FROM pages WHERE 1=1");
        push_page_filter(&mut qb, filter)?;
        qb.push(" ORDER BY created_at, page_id LIMIT ");
        qb.push_bind(i64::from(window.limit()));
        qb.push(" OFFSET ");
        qb.push_bind(to_db_count(window.offset(), "offset")?);

        let rows = qb
            .build_query_as::<PageRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(PageRecord::try_from).collect()
    }

    async fn list_posts(&self, page_id: &str, limit: u32) -> Result<Vec<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT page_id, post_id, content, likes, comments_count, media_url, \
             created_at, scraped_at FROM posts WHERE page_id = ",
        );
        qb.push_bind(page_id.to_string());
        qb.push(" ORDER BY created_at DESC NULLS LAST, id LIMIT ");
        qb.push_bind(i64::from(limit));

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(PostRecord::try_from).collect()
    }

    async fn list_employees(
        &self,
        page_id: &str,
        limit: u32,
    ) -> Result<Vec<EmployeeRecord>, RepoError> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT page_id, name, title, profile_url, scraped_at \
             FROM employees WHERE page_id = ",
        );
        qb.push_bind(page_id.to_string());
        qb.push(" ORDER BY id LIMIT ");
        qb.push_bind(i64::from(limit));

        let rows = qb
            .build_query_as::<EmployeeRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(EmployeeRecord::from).collect())
    }
}

#[async_trait]
impl PagesWriteRepo for PostgresRepositories {
    async fn persist_acquisition(&self, acquired: &AcquiredPage) -> Result<(), RepoError> {
        let page = &acquired.page;
        let followers = to_db_count(page.followers, "followers")?;
        let head_count = to_db_count(page.head_count, "head_count")?;
        let posts = acquired
            .posts
            .iter()
            .map(|post| {
                Ok((
                    post,
                    to_db_count(post.likes, "likes")?,
                    to_db_count(post.comments_count, "comments_count")?,
                ))
            })
            .collect::<Result<Vec<_>, RepoError>>()?;

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::<Postgres>::new("INSERT INTO pages (");
        qb.push(PAGE_COLUMNS);
        qb.push(") ");
        qb.push_values(std::iter::once(page), |mut row, page| {
            row.push_bind(page.page_id.clone())
                .push_bind(page.name.clone())
                .push_bind(page.url.clone())
                .push_bind(page.linkedin_id.clone())
                .push_bind(page.profile_picture.clone())
                .push_bind(page.description.clone())
                .push_bind(page.website.clone())
                .push_bind(page.industry.clone())
                .push_bind(followers)
                .push_bind(head_count)
                .push_bind(page.specialities.clone())
                .push_bind(page.created_at)
                .push_bind(page.updated_at);
        });
        qb.build()
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        for chunk in posts.chunks(INSERT_CHUNK_ROWS) {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO posts (page_id, post_id, content, likes, comments_count, \
                 media_url, created_at, scraped_at) ",
            );
            qb.push_values(chunk, |mut row, (post, likes, comments)| {
                row.push_bind(post.page_id.clone())
                    .push_bind(post.post_id.clone())
                    .push_bind(post.content.clone())
                    .push_bind(*likes)
                    .push_bind(*comments)
                    .push_bind(post.media_url.clone())
                    .push_bind(post.created_at)
                    .push_bind(post.scraped_at);
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        for chunk in acquired.employees.chunks(INSERT_CHUNK_ROWS) {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO employees (page_id, name, title, profile_url, scraped_at) ",
            );
            qb.push_values(chunk, |mut row, employee| {
                row.push_bind(employee.page_id.clone())
                    .push_bind(employee.name.clone())
                    .push_bind(employee.title.clone())
                    .push_bind(employee.profile_url.clone())
                    .push_bind(employee.scraped_at);
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)
    }
}
