//! Single-flight metadata trust cache.
//!
//! Each entity ID owns a slot in a sharded map. A slot holds the last good
//! facade and, while a refresh runs, the shared future every caller awaits.
//! The fetch itself runs on its own task so a caller going away never
//! cancels work other callers are waiting on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use sso_core::{AuditSink, Event, EventType, IssuanceConfig};

use super::{EntityCriteria, MetadataResolver, TrustFacade};
use crate::error::{SamlError, SamlResult};

type SharedFetch = Shared<BoxFuture<'static, SamlResult<Arc<TrustFacade>>>>;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_TTL: Duration = Duration::from_secs(3_600);

/// Caching front for a [`MetadataResolver`].
///
/// - Entries are refreshed after `min(cacheDuration, max_ttl)` and never
///   outlive the metadata's `validUntil`.
/// - Concurrent misses for one entity ID share a single fetch.
/// - When a refresh fails because the source is unavailable, the previous
///   entry keeps being served until its hard expiry.
#[derive(Clone)]
pub struct MetadataTrustCache {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn MetadataResolver>,
    slots: DashMap<String, Slot>,
    fetch_timeout: Duration,
    max_ttl: Duration,
    next_fetch_id: AtomicU64,
    counters: Counters,
    audit: Option<Arc<dyn AuditSink>>,
}

#[derive(Default)]
struct Slot {
    entry: Option<CachedFacade>,
    in_flight: Option<InFlight>,
}

struct InFlight {
    id: u64,
    fetch: SharedFetch,
}

struct CachedFacade {
    facade: Arc<TrustFacade>,
    refresh_at: DateTime<Utc>,
    hard_expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Freshness {
    Fresh,
    Stale,
    Expired,
}

impl CachedFacade {
    fn new(facade: TrustFacade, now: DateTime<Utc>, max_ttl: Duration) -> Self {
        let ttl = facade
            .cache_duration_secs
            .map_or(max_ttl, |secs| Duration::from_secs(secs).min(max_ttl));
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        let by_ttl = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let refresh_at = facade.valid_until.map_or(by_ttl, |until| until.min(by_ttl));
        let hard_expiry = facade.valid_until.unwrap_or(refresh_at);

        Self {
            facade: Arc::new(facade),
            refresh_at,
            hard_expiry,
        }
    }

    fn freshness(&self, now: DateTime<Utc>) -> Freshness {
        if now >= self.hard_expiry {
            Freshness::Expired
        } else if now >= self.refresh_at {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    stale_served: AtomicU64,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from a fresh entry.
    pub hits: u64,
    /// Lookups that had to wait for a fetch.
    pub misses: u64,
    /// Fetches issued to the metadata source.
    pub fetches: u64,
    /// Failed refreshes answered with the previous entry.
    pub stale_served: u64,
    /// Entity IDs currently tracked.
    pub entries: usize,
}

/// Builder for [`MetadataTrustCache`].
pub struct MetadataTrustCacheBuilder {
    source: Arc<dyn MetadataResolver>,
    fetch_timeout: Duration,
    max_ttl: Duration,
    audit: Option<Arc<dyn AuditSink>>,
}

impl MetadataTrustCacheBuilder {
    /// Bounds each fetch from the source.
    #[must_use]
    pub const fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Caps how long an entry is used before refreshing.
    #[must_use]
    pub const fn max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = ttl;
        self
    }

    /// Records refresh outcomes to an audit sink.
    #[must_use]
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Builds the cache.
    #[must_use]
    pub fn build(self) -> MetadataTrustCache {
        MetadataTrustCache {
            inner: Arc::new(Inner {
                source: self.source,
                slots: DashMap::new(),
                fetch_timeout: self.fetch_timeout,
                max_ttl: self.max_ttl,
                next_fetch_id: AtomicU64::new(0),
                counters: Counters::default(),
                audit: self.audit,
            }),
        }
    }
}

impl MetadataTrustCache {
    /// Starts building a cache in front of `source`.
    #[must_use]
    pub fn builder(source: Arc<dyn MetadataResolver>) -> MetadataTrustCacheBuilder {
        MetadataTrustCacheBuilder {
            source,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            max_ttl: DEFAULT_MAX_TTL,
            audit: None,
        }
    }

    /// Creates a cache with timeouts taken from the issuance configuration.
    #[must_use]
    pub fn from_config(source: Arc<dyn MetadataResolver>, config: &IssuanceConfig) -> Self {
        Self::builder(source)
            .fetch_timeout(config.metadata_timeout())
            .max_ttl(config.metadata_max_cache_ttl())
            .build()
    }

    /// Resolves a relying party's trust facade.
    ///
    /// # Errors
    ///
    /// - [`SamlError::NotFound`] if the source does not know the entity
    /// - [`SamlError::Resolution`] if the source failed or timed out and no
    ///   unexpired entry is cached
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn resolve(&self, entity_id: &str) -> SamlResult<Arc<TrustFacade>> {
        let fetch = {
            let now = Utc::now();
            let mut slot = self.inner.slots.entry(entity_id.to_owned()).or_default();

            let cached = slot
                .entry
                .as_ref()
                .map(|e| (e.freshness(now), Arc::clone(&e.facade)));
            match cached {
                Some((Freshness::Fresh, facade)) => {
                    self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(facade);
                }
                Some((Freshness::Expired, _)) => slot.entry = None,
                Some((Freshness::Stale, _)) | None => {}
            }

            self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
            if let Some(in_flight) = &slot.in_flight {
                in_flight.fetch.clone()
            } else {
                let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
                let fetch = Inner::spawn_fetch(&self.inner, entity_id.to_owned(), id);
                slot.in_flight = Some(InFlight {
                    id,
                    fetch: fetch.clone(),
                });
                fetch
            }
        };

        fetch.await
    }

    /// Searches the source for entities matching `criteria`.
    ///
    /// Searches are not cached but share the fetch timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Resolution`] on source failure or timeout.
    pub async fn find_entities(&self, criteria: &EntityCriteria) -> SamlResult<Vec<String>> {
        let timeout = self.inner.fetch_timeout;
        tokio::time::timeout(timeout, self.inner.source.find_entities(criteria))
            .await
            .map_err(|_| {
                SamlError::Resolution(format!("entity search timed out after {timeout:?}"))
            })?
            .map_err(|e| match e {
                SamlError::Resolution(_) => e,
                other => SamlError::Resolution(other.to_string()),
            })
    }

    /// Drops the cached entry for an entity. Returns true if one existed.
    pub fn invalidate(&self, entity_id: &str) -> bool {
        self.inner
            .slots
            .remove(entity_id)
            .is_some_and(|(_, slot)| slot.entry.is_some())
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.inner.slots.clear();
    }

    /// Returns current statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            fetches: c.fetches.load(Ordering::Relaxed),
            stale_served: c.stale_served.load(Ordering::Relaxed),
            entries: self.inner.slots.len(),
        }
    }
}

impl Inner {
    fn spawn_fetch(inner: &Arc<Self>, entity_id: String, fetch_id: u64) -> SharedFetch {
        let task = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            let outcome = task.fetch(&entity_id).await;
            task.complete(&entity_id, fetch_id, outcome)
        });

        async move {
            handle.await.unwrap_or_else(|e| {
                Err(SamlError::Resolution(format!("metadata fetch task failed: {e}")))
            })
        }
        .boxed()
        .shared()
    }

    async fn fetch(&self, entity_id: &str) -> SamlResult<TrustFacade> {
        self.counters.fetches.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(entity_id, "fetching relying party metadata");

        let resolved = tokio::time::timeout(self.fetch_timeout, self.source.resolve(entity_id))
            .await
            .map_err(|_| {
                SamlError::Resolution(format!(
                    "metadata fetch for {entity_id} timed out after {:?}",
                    self.fetch_timeout
                ))
            })?;

        match resolved {
            Ok(Some(facade)) if !facade.is_valid_at(Utc::now()) => Err(SamlError::Resolution(
                format!("metadata for {entity_id} has expired"),
            )),
            Ok(Some(facade)) => Ok(facade),
            Ok(None) | Err(SamlError::NotFound(_)) => Err(SamlError::NotFound(format!(
                "no metadata for relying party {entity_id}"
            ))),
            Err(e @ SamlError::Resolution(_)) => Err(e),
            Err(other) => Err(SamlError::Resolution(other.to_string())),
        }
    }

    fn complete(
        &self,
        entity_id: &str,
        fetch_id: u64,
        outcome: SamlResult<TrustFacade>,
    ) -> SamlResult<Arc<TrustFacade>> {
        let now = Utc::now();

        let result = {
            let Some(mut slot) = self.slots.get_mut(entity_id) else {
                // invalidated while the fetch was running
                return outcome.map(Arc::new);
            };
            if slot.in_flight.as_ref().is_none_or(|f| f.id != fetch_id) {
                return outcome.map(Arc::new);
            }
            slot.in_flight = None;

            match outcome {
                Ok(facade) => {
                    let cached = CachedFacade::new(facade, now, self.max_ttl);
                    let facade = Arc::clone(&cached.facade);
                    slot.entry = Some(cached);
                    Ok(facade)
                }
                Err(SamlError::Resolution(reason)) => {
                    match slot.entry.as_ref().filter(|e| now < e.hard_expiry) {
                        Some(stale) => {
                            self.counters.stale_served.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(
                                entity_id,
                                error = %reason,
                                hard_expiry = %stale.hard_expiry,
                                "metadata refresh failed, serving cached entry"
                            );
                            Ok(Arc::clone(&stale.facade))
                        }
                        None => {
                            slot.entry = None;
                            Err(SamlError::Resolution(reason))
                        }
                    }
                }
                Err(e) => {
                    slot.entry = None;
                    Err(e)
                }
            }
        };

        if result.is_err() {
            self.slots
                .remove_if(entity_id, |_, s| s.entry.is_none() && s.in_flight.is_none());
        }
        self.record(entity_id, &result);
        result
    }

    fn record(&self, entity_id: &str, result: &SamlResult<Arc<TrustFacade>>) {
        let Some(audit) = &self.audit else {
            return;
        };
        let event = match result {
            Ok(_) => Event::builder(EventType::MetadataRefreshed).relying_party(entity_id),
            Err(e) => Event::builder(EventType::MetadataRefreshError)
                .relying_party(entity_id)
                .failure(e.to_string()),
        };
        audit.record(&event.build());
    }
}

impl std::fmt::Debug for MetadataTrustCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataTrustCache")
            .field("fetch_timeout", &self.inner.fetch_timeout)
            .field("max_ttl", &self.inner.max_ttl)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
