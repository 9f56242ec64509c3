//! Per-epoch committee assignments and their cache.
use std::{future::Future, num::NonZeroUsize, sync::Arc, time::Instant};

use derive_more::Debug;
use eyre::{Result, WrapErr};
use lru::LruCache;
use primitives::epoch::{AttesterKey, EpochAssignments};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::node::{BeaconNode, QueryFilter};

/// Number of epochs kept by default.
pub const DEFAULT_ASSIGNMENT_CACHE_SIZE: usize = 10;

/// LRU cache of computed assignments.
///
/// Lookup, computation and insertion all happen under one lock, so concurrent
/// callers asking for the same uncached epoch trigger a single computation and
/// the later callers reuse its result.
#[derive(Debug)]
pub struct AssignmentCache {
    #[debug(skip)]
    inner: Mutex<LruCache<u64, Arc<EpochAssignments>>>,
}

impl Default for AssignmentCache {
    fn default() -> Self {
        Self::new(DEFAULT_ASSIGNMENT_CACHE_SIZE)
    }
}

impl AssignmentCache {
    /// Cache holding up to `capacity` epochs; 0 means unbounded.
    pub fn new(capacity: usize) -> Self {
        let cache = NonZeroUsize::new(capacity).map_or_else(LruCache::unbounded, LruCache::new);
        Self { inner: Mutex::new(cache) }
    }

    /// Returns the cached assignments of `epoch`, computing them on a miss.
    ///
    /// Results missing either proposers or attesters are returned but not
    /// cached.
    pub async fn get_or_compute<F, Fut>(&self, epoch: u64, compute: F) -> Result<Arc<EpochAssignments>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<EpochAssignments>> + Send,
    {
        let mut cache = self.inner.lock().await;
        if let Some(hit) = cache.get(&epoch) {
            return Ok(Arc::clone(hit));
        }

        info!(epoch, "Caching assignments");
        let start = Instant::now();
        let assignments = Arc::new(compute().await?);
        if assignments.is_complete() {
            cache.put(epoch, Arc::clone(&assignments));
            info!(epoch, elapsed_ms = start.elapsed().as_millis(), "Cached assignments");
        } else {
            warn!(
                epoch,
                proposers = assignments.proposers.len(),
                attesters = assignments.attesters.len(),
                "Incomplete assignments, not caching"
            );
        }
        Ok(assignments)
    }

    /// Number of cached epochs.
    pub async fn cached_epochs(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Pages through the assignment listing of `epoch`.
///
/// Stops when the node returns an empty page token, reports no entries, or
/// the accumulated count reaches the reported total.
pub async fn fetch_epoch_assignments(
    node: &dyn BeaconNode,
    epoch: u64,
    page_size: u32,
) -> Result<EpochAssignments> {
    let filter = QueryFilter::epoch(epoch);
    let mut assignments = EpochAssignments::default();
    let mut token = String::new();
    let mut fetched = 0u64;

    loop {
        let page = node
            .list_assignments(filter, page_size, &token)
            .await
            .wrap_err("error retrieving validator assignment response for caching")?;
        fetched += page.assignments.len() as u64;

        for entry in page.assignments {
            for slot in entry.proposer_slots {
                assignments.proposers.insert(slot, entry.validator_index);
            }
            for (member, validator) in entry.beacon_committees.into_iter().enumerate() {
                let key = AttesterKey {
                    slot: entry.attester_slot,
                    committee_index: entry.committee_index,
                    member_index: member as u64,
                };
                assignments.attesters.insert(key, validator);
            }
        }

        if page.next_page_token.is_empty() || page.total_size == 0 || fetched >= page.total_size {
            break;
        }
        token = page.next_page_token;
    }

    Ok(assignments)
}
