use std::collections::HashSet;

use sqlx::PgPool;
use time::macros::datetime;

use pagelens::application::acquisition::FixtureAcquirer;
use pagelens::application::pagination::PageWindow;
use pagelens::application::repos::{PageListFilter, PagesRepo, PagesWriteRepo, RepoError};
use pagelens::domain::entities::PostRecord;
use pagelens::domain::timestamps::now_utc;
use pagelens::infra::db::PostgresRepositories;

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn persisted_bundle_reads_back(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let bundle = FixtureAcquirer::fixture("acme").normalize(now_utc());

    repo.persist_acquisition(&bundle).await.expect("persist");

    let page = repo.find_page("acme").await.expect("find").expect("page");
    assert_eq!(page, bundle.page);

    let posts = repo.list_posts("acme", 20).await.expect("posts");
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].post_id, "urn:li:share:acme_002");
    assert!(repo.list_employees("acme", 100).await.expect("employees").is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn duplicate_post_rolls_back_the_page(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let mut bundle = FixtureAcquirer::fixture("acme").normalize(now_utc());
    let duplicate = bundle.posts[0].clone();
    bundle.posts.push(duplicate);

    let err = repo
        .persist_acquisition(&bundle)
        .await
        .expect_err("duplicate post");

    assert!(matches!(err, RepoError::Duplicate { .. }));
    assert!(repo.find_page("acme").await.expect("find").is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn bundles_beyond_one_statement_of_binds_persist(pool: PgPool) {
    let repo = PostgresRepositories::new(pool.clone());
    let mut bundle = FixtureAcquirer::fixture("acme");
    let scraped_at = datetime!(2024-06-01 00:00 UTC);
    // 9000 posts at 8 binds each is more than one statement may carry.
    bundle.posts = (0..9000)
        .map(|n| PostRecord {
            page_id: "acme".to_string(),
            post_id: format!("urn:li:share:{n:05}"),
            content: String::new(),
            likes: n,
            comments_count: 0,
            media_url: None,
            created_at: None,
            scraped_at,
        })
        .collect();

    repo.persist_acquisition(&bundle.normalize(now_utc()))
        .await
        .expect("persist");

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE page_id = 'acme'")
        .fetch_one(&pool)
        .await
        .expect("count posts");
    assert_eq!(stored, 9000);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn undated_posts_sort_last(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    let mut bundle = FixtureAcquirer::fixture("acme");
    let scraped_at = datetime!(2024-06-01 00:00 UTC);
    bundle.posts = ["undated", "old", "new"]
        .into_iter()
        .zip([
            None,
            Some(datetime!(2024-01-01 00:00 UTC)),
            Some(datetime!(2024-03-01 00:00 UTC)),
        ])
        .map(|(post_id, created_at)| PostRecord {
            page_id: "acme".to_string(),
            post_id: post_id.to_string(),
            content: String::new(),
            likes: 0,
            comments_count: 0,
            media_url: None,
            created_at,
            scraped_at,
        })
        .collect();
    repo.persist_acquisition(&bundle.normalize(now_utc()))
        .await
        .expect("persist");

    let ids = repo
        .list_posts("acme", 10)
        .await
        .expect("posts")
        .into_iter()
        .map(|post| post.post_id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["new", "old", "undated"]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn list_filters_escape_like_wildcards(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    for (id, industry, followers) in [
        ("acme", "100% Manufacturing", 1_200_u64),
        ("globex", "Technology", 250_000),
    ] {
        let mut bundle = FixtureAcquirer::fixture(id);
        bundle.page.industry = Some(industry.to_string());
        bundle.page.followers = followers;
        repo.persist_acquisition(&bundle.normalize(now_utc()))
            .await
            .expect("persist");
    }

    let percent = PageListFilter {
        industry: Some("%".to_string()),
        ..PageListFilter::default()
    };
    let pages = repo
        .list_pages(&percent, PageWindow::new(100, 0))
        .await
        .expect("list");
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].page_id, "acme");

    let threshold = PageListFilter {
        min_followers: Some(500_000),
        ..PageListFilter::default()
    };
    assert!(
        repo.list_pages(&threshold, PageWindow::new(100, 0))
            .await
            .expect("list")
            .is_empty()
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn lookup_indexes_exist(pool: PgPool) {
    let rows: Vec<String> = sqlx::query_scalar(
        "SELECT indexname FROM pg_indexes WHERE schemaname = 'public' \
         AND tablename IN ('pages', 'posts', 'employees')",
    )
    .fetch_all(&pool)
    .await
    .expect("fetch indexes");

    let indexes: HashSet<String> = rows.into_iter().collect();
    for expected in [
        "pages_followers_idx",
        "posts_page_created_idx",
        "employees_page_idx",
    ] {
        assert!(indexes.contains(expected), "missing {expected}");
    }
}
