//! Page resolution: cache, then store, then acquisition.
//!
//! A full miss acquires the page once per key no matter how many callers
//! ask for it concurrently. The acquisition runs on its own task, so it
//! finishes (and writes through to store and cache) even when every caller
//! has gone away.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::{counter, histogram};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::application::acquisition::{Acquirer, AcquisitionError};
use crate::application::flight::{Flight, KeyedFlights};
use crate::application::repos::{PagesRepo, PagesWriteRepo, RepoError};
use crate::cache::{PageCache, page_key};
use crate::domain::entities::PageRecord;
use crate::domain::error::DomainError;
use crate::domain::identifier::PageId;
use crate::domain::timestamps::now_utc;

const SOURCE: &str = "application::resolver";

pub const METRIC_TIER_HIT: &str = "pagelens_resolve_tier_hit_total";
pub const METRIC_CACHE_MISS: &str = "pagelens_cache_miss_total";
pub const METRIC_CACHE_ERROR: &str = "pagelens_cache_error_total";
pub const METRIC_ACQUISITION: &str = "pagelens_acquisition_total";
pub const METRIC_ACQUISITION_JOINED: &str = "pagelens_acquisition_joined_total";
pub const METRIC_ACQUISITION_MS: &str = "pagelens_acquisition_ms";

const DEFAULT_ACQUISITION_TIMEOUT: Duration = Duration::from_secs(45);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("invalid page identifier: {0}")]
    InvalidIdentifier(#[source] DomainError),
    #[error("page store unavailable: {0}")]
    StoreUnavailable(#[source] RepoError),
    #[error("acquisition of `{page_id}` failed: {source}")]
    AcquisitionFailed {
        page_id: String,
        #[source]
        source: AcquisitionError,
    },
    #[error("persisting acquired page `{page_id}` failed: {source}")]
    PersistenceFailed {
        page_id: String,
        #[source]
        source: RepoError,
    },
}

impl From<DomainError> for ResolveError {
    fn from(err: DomainError) -> Self {
        Self::InvalidIdentifier(err)
    }
}

impl ResolveError {
    fn acquisition(page_id: &PageId, source: AcquisitionError) -> Self {
        Self::AcquisitionFailed {
            page_id: page_id.to_string(),
            source,
        }
    }
}

/// Timing knobs for the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolverConfig {
    pub cache_ttl: Duration,
    pub acquisition_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            acquisition_timeout: DEFAULT_ACQUISITION_TIMEOUT,
        }
    }
}

/// Read-only page lookup by identifier: cache, then store, never
/// acquisition.
#[async_trait]
pub trait PageLookup: Send + Sync {
    async fn lookup(&self, page_id: &str) -> Result<Option<PageRecord>, ResolveError>;
}

type FlightOutcome = Result<PageRecord, ResolveError>;

#[derive(Clone)]
pub struct PageResolver {
    pages: Arc<dyn PagesRepo>,
    writer: Arc<dyn PagesWriteRepo>,
    cache: Arc<dyn PageCache>,
    acquirer: Arc<dyn Acquirer>,
    config: ResolverConfig,
    flights: KeyedFlights<FlightOutcome>,
}

impl PageResolver {
    pub fn new(
        pages: Arc<dyn PagesRepo>,
        writer: Arc<dyn PagesWriteRepo>,
        cache: Arc<dyn PageCache>,
        acquirer: Arc<dyn Acquirer>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            pages,
            writer,
            cache,
            acquirer,
            config,
            flights: KeyedFlights::new(),
        }
    }

    /// Whether an acquisition for `page_id` is currently running.
    pub fn is_acquiring(&self, page_id: &str) -> bool {
        self.flights.is_in_flight(page_id)
    }

    #[instrument(skip_all, fields(page_id = %raw_id))]
    pub async fn resolve(&self, raw_id: &str) -> Result<PageRecord, ResolveError> {
        let page_id = PageId::parse(raw_id)?;

        if let Some(page) = self.cached_page(&page_id).await {
            return Ok(page);
        }

        if let Some(page) = self.stored_page(&page_id).await? {
            self.write_through(&page).await;
            return Ok(page);
        }

        self.acquire_once(&page_id).await
    }

    async fn cached_page(&self, page_id: &PageId) -> Option<PageRecord> {
        let key = page_key(page_id.as_str());
        let bytes = match self.cache.get(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                counter!(METRIC_CACHE_MISS).increment(1);
                return None;
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR, "op" => "get").increment(1);
                warn!(
                    target = SOURCE,
                    page_id = %page_id,
                    error = %err,
                    "cache read failed; treating as miss"
                );
                return None;
            }
        };

        match serde_json::from_slice::<PageRecord>(&bytes) {
            Ok(page) => {
                counter!(METRIC_TIER_HIT, "tier" => "cache").increment(1);
                debug!(target = SOURCE, page_id = %page_id, tier = "cache", "page resolved");
                Some(page)
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR, "op" => "decode").increment(1);
                warn!(
                    target = SOURCE,
                    page_id = %page_id,
                    error = %err,
                    "cached page could not be decoded; treating as miss"
                );
                None
            }
        }
    }

    async fn stored_page(&self, page_id: &PageId) -> Result<Option<PageRecord>, ResolveError> {
        let found = self
            .pages
            .find_page(page_id.as_str())
            .await
            .map_err(ResolveError::StoreUnavailable)?;
        if found.is_some() {
            counter!(METRIC_TIER_HIT, "tier" => "store").increment(1);
            debug!(target = SOURCE, page_id = %page_id, tier = "store", "page resolved");
        }
        Ok(found)
    }

    /// Cache `page` under its key. Failures are logged, never returned.
    async fn write_through(&self, page: &PageRecord) {
        let payload = match serde_json::to_vec(page) {
            Ok(payload) => Bytes::from(payload),
            Err(err) => {
                warn!(
                    target = SOURCE,
                    page_id = %page.page_id,
                    error = %err,
                    "page could not be serialized for the cache"
                );
                return;
            }
        };

        let key = page_key(&page.page_id);
        if let Err(err) = self
            .cache
            .set_with_expiry(&key, payload, self.config.cache_ttl)
            .await
        {
            counter!(METRIC_CACHE_ERROR, "op" => "set").increment(1);
            warn!(
                target = SOURCE,
                page_id = %page.page_id,
                error = %err,
                "cache write failed"
            );
        }
    }

    async fn acquire_once(&self, page_id: &PageId) -> Result<PageRecord, ResolveError> {
        let waiter = match self.flights.join_or_lead(page_id.as_str()) {
            Flight::Follower(waiter) => {
                counter!(METRIC_ACQUISITION_JOINED).increment(1);
                debug!(target = SOURCE, page_id = %page_id, "joining in-flight acquisition");
                waiter
            }
            Flight::Leader(leader) => {
                let waiter = leader.waiter();
                let resolver = self.clone();
                let task_page_id = page_id.clone();
                tokio::spawn(async move {
                    let outcome = resolver.acquire_and_persist(&task_page_id).await;
                    leader.complete(outcome);
                });
                waiter
            }
        };

        waiter.wait().await.unwrap_or_else(|| {
            Err(ResolveError::acquisition(
                page_id,
                AcquisitionError::Upstream("acquisition task ended without a result".to_string()),
            ))
        })
    }

    async fn acquire_and_persist(&self, page_id: &PageId) -> FlightOutcome {
        // A flight that settled between our store read and now already
        // stored the page.
        if let Some(page) = self.stored_page(page_id).await? {
            self.write_through(&page).await;
            return Ok(page);
        }

        info!(target = SOURCE, page_id = %page_id, "acquiring page");
        let started = Instant::now();
        let acquired = tokio::time::timeout(
            self.config.acquisition_timeout,
            self.acquirer.acquire(page_id.as_str()),
        )
        .await
        .unwrap_or(Err(AcquisitionError::Timeout(
            self.config.acquisition_timeout,
        )));
        histogram!(METRIC_ACQUISITION_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        let acquired = match acquired {
            Ok(acquired) if acquired.page.page_id == page_id.as_str() => acquired,
            Ok(acquired) => {
                let err = AcquisitionError::Invalid(format!(
                    "acquired page identifier `{}` does not match request",
                    acquired.page.page_id
                ));
                return Err(self.acquisition_failed(page_id, err));
            }
            Err(err) => return Err(self.acquisition_failed(page_id, err)),
        };

        let acquired = acquired.normalize(now_utc());
        match self.writer.persist_acquisition(&acquired).await {
            Ok(()) => {}
            Err(RepoError::Duplicate { constraint }) => {
                warn!(
                    target = SOURCE,
                    page_id = %page_id,
                    constraint = %constraint,
                    "page was stored concurrently; using the stored record"
                );
                return self.recover_duplicate(page_id, constraint).await;
            }
            Err(err) => {
                counter!(METRIC_ACQUISITION, "outcome" => "persistence_failed").increment(1);
                error!(
                    target = SOURCE,
                    page_id = %page_id,
                    error = %err,
                    "acquired page could not be persisted"
                );
                return Err(ResolveError::PersistenceFailed {
                    page_id: page_id.to_string(),
                    source: err,
                });
            }
        }

        counter!(METRIC_ACQUISITION, "outcome" => "stored").increment(1);
        info!(
            target = SOURCE,
            page_id = %page_id,
            posts = acquired.posts.len(),
            employees = acquired.employees.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "page acquired and stored"
        );

        self.write_through(&acquired.page).await;
        Ok(acquired.page)
    }

    fn acquisition_failed(&self, page_id: &PageId, err: AcquisitionError) -> ResolveError {
        counter!(METRIC_ACQUISITION, "outcome" => "failed").increment(1);
        error!(
            target = SOURCE,
            page_id = %page_id,
            error = %err,
            "page acquisition failed"
        );
        ResolveError::acquisition(page_id, err)
    }

    async fn recover_duplicate(&self, page_id: &PageId, constraint: String) -> FlightOutcome {
        match self.stored_page(page_id).await? {
            Some(page) => {
                counter!(METRIC_ACQUISITION, "outcome" => "duplicate").increment(1);
                self.write_through(&page).await;
                Ok(page)
            }
            None => Err(ResolveError::PersistenceFailed {
                page_id: page_id.to_string(),
                source: RepoError::Duplicate { constraint },
            }),
        }
    }
}

#[async_trait]
impl PageLookup for PageResolver {
    async fn lookup(&self, page_id: &str) -> Result<Option<PageRecord>, ResolveError> {
        let page_id = PageId::parse(page_id)?;

        if let Some(page) = self.cached_page(&page_id).await {
            return Ok(Some(page));
        }

        let found = self.stored_page(&page_id).await?;
        if let Some(page) = found.as_ref() {
            self.write_through(page).await;
        }
        Ok(found)
    }
}
