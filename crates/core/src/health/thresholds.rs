//! Tiered threshold resolution with a process-local cache.
//!
//! Entries never expire on their own. Whoever edits threshold rows must
//! invalidate, either directly through [`ThresholdResolver::clear_cache`] or
//! by publishing on a [`ThresholdCacheBus`] every resolver in the process
//! subscribes to. Cross-instance deployments plug their own transport in
//! behind [`InvalidationPublisher`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::customer::{Segment, TenantId};
use crate::domain::threshold::{
    select_most_specific, ResolvedThresholds, ThresholdConfig, ThresholdRule,
};
use crate::errors::ApplicationError;

#[async_trait]
pub trait ThresholdStore: Send + Sync {
    /// All rows for `tenant_id` whose segment keys are either unset or equal to
    /// the corresponding key of `segment`. An empty result is not an error.
    async fn rules_for_segment(
        &self,
        tenant_id: &TenantId,
        segment: &Segment,
    ) -> Result<Vec<ThresholdRule>, ApplicationError>;
}

#[async_trait]
impl<T> ThresholdStore for Arc<T>
where
    T: ThresholdStore + ?Sized,
{
    async fn rules_for_segment(
        &self,
        tenant_id: &TenantId,
        segment: &Segment,
    ) -> Result<Vec<ThresholdRule>, ApplicationError> {
        (**self).rules_for_segment(tenant_id, segment).await
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "tenant_id", rename_all = "snake_case")]
pub enum CacheInvalidation {
    Tenant(TenantId),
    All,
}

impl CacheInvalidation {
    pub fn for_tenant(tenant_id: Option<TenantId>) -> Self {
        tenant_id.map(Self::Tenant).unwrap_or(Self::All)
    }
}

pub trait InvalidationPublisher: Send + Sync {
    fn publish(&self, invalidation: CacheInvalidation);
}

/// In-process fan-out of cache invalidations.
#[derive(Clone, Debug)]
pub struct ThresholdCacheBus {
    sender: broadcast::Sender<CacheInvalidation>,
}

impl ThresholdCacheBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheInvalidation> {
        self.sender.subscribe()
    }
}

impl Default for ThresholdCacheBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl InvalidationPublisher for ThresholdCacheBus {
    fn publish(&self, invalidation: CacheInvalidation) {
        // No subscribers means no caches to clear.
        let _ = self.sender.send(invalidation);
    }
}

pub struct ThresholdResolver<S> {
    store: S,
    cache: RwLock<HashMap<String, ResolvedThresholds>>,
    generation: AtomicU64,
    invalidations: Option<Mutex<broadcast::Receiver<CacheInvalidation>>>,
}

impl<S> ThresholdResolver<S>
where
    S: ThresholdStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            invalidations: None,
        }
    }

    pub fn with_bus(store: S, bus: &ThresholdCacheBus) -> Self {
        Self { invalidations: Some(Mutex::new(bus.subscribe())), ..Self::new(store) }
    }

    pub async fn resolve(
        &self,
        tenant_id: &TenantId,
        segment: &Segment,
    ) -> Result<ThresholdConfig, ApplicationError> {
        Ok(self.resolve_detailed(tenant_id, segment).await?.config)
    }

    /// Like [`resolve`](Self::resolve) but also reports which tier won.
    pub async fn resolve_detailed(
        &self,
        tenant_id: &TenantId,
        segment: &Segment,
    ) -> Result<ResolvedThresholds, ApplicationError> {
        self.drain_invalidations();

        let key = cache_key(tenant_id, segment);
        if let Some(hit) = self.read_cache().get(&key).cloned() {
            return Ok(hit);
        }

        let generation = self.generation.load(Ordering::Acquire);
        let rules = self.store.rules_for_segment(tenant_id, segment).await?;
        let resolved = select_most_specific(&rules, segment);

        // A clear that raced the store read must win over this result.
        let mut cache = self.write_cache();
        if self.generation.load(Ordering::Acquire) == generation {
            cache.insert(key, resolved.clone());
        }
        Ok(resolved)
    }

    /// Drops cached entries for one tenant, or everything when `tenant_id` is
    /// `None`.
    pub fn clear_cache(&self, tenant_id: Option<&TenantId>) {
        let mut cache = self.write_cache();
        self.generation.fetch_add(1, Ordering::AcqRel);
        match tenant_id {
            Some(tenant_id) => {
                let prefix = format!("{}:", tenant_id.0);
                cache.retain(|key, _| !key.starts_with(&prefix));
            }
            None => cache.clear(),
        }
        debug!(
            event_name = "health.thresholds.cache_cleared",
            tenant_id = tenant_id.map(|id| id.0.as_str()).unwrap_or("*"),
            remaining = cache.len(),
            "threshold cache cleared"
        );
    }

    pub fn cached_entries(&self) -> usize {
        self.read_cache().len()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn drain_invalidations(&self) {
        let Some(receiver) = &self.invalidations else {
            return;
        };
        let mut pending = Vec::new();
        {
            let mut receiver = match receiver.lock() {
                Ok(receiver) => receiver,
                Err(poisoned) => poisoned.into_inner(),
            };
            loop {
                match receiver.try_recv() {
                    Ok(invalidation) => pending.push(invalidation),
                    Err(broadcast::error::TryRecvError::Lagged(_)) => {
                        pending.push(CacheInvalidation::All)
                    }
                    Err(_) => break,
                }
            }
        }

        for invalidation in pending {
            match invalidation {
                CacheInvalidation::Tenant(tenant_id) => self.clear_cache(Some(&tenant_id)),
                CacheInvalidation::All => self.clear_cache(None),
            }
        }
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ResolvedThresholds>> {
        match self.cache.read() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ResolvedThresholds>> {
        match self.cache.write() {
            Ok(cache) => cache,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// `tenant:type:priority`, with `null` standing in for an unset key.
pub fn cache_key(tenant_id: &TenantId, segment: &Segment) -> String {
    format!(
        "{}:{}:{}",
        tenant_id.0,
        segment.account_type.map(|value| value.as_str()).unwrap_or("null"),
        segment.account_priority.map(|value| value.as_str()).unwrap_or("null"),
    )
}
