//! Reference-counted cache of open event stores.

use crate::record::domain::EventUuid;
use crate::store::{
    domain::{CacheStats, PurgeReport, StoreError, StoreLocation},
    ports::StoreBackend,
};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tracing::{debug, info, warn};

/// Shared access to one event's open store.
///
/// Each handle accounts for exactly one reference in the cache and must be
/// handed back through [`EventStoreCache::release`].
#[derive(Debug)]
pub struct EventStoreHandle<D> {
    event: EventUuid,
    db: Arc<D>,
}

impl<D> EventStoreHandle<D> {
    /// Returns the event the store belongs to.
    #[must_use]
    pub const fn event(&self) -> &EventUuid {
        &self.event
    }

    /// Returns the open database.
    #[must_use]
    pub fn records(&self) -> &D {
        &self.db
    }

    /// Returns a shared pointer to the open database.
    #[must_use]
    pub fn shared(&self) -> Arc<D> {
        Arc::clone(&self.db)
    }

    /// Returns `true` when both handles refer to the same open store.
    #[must_use]
    pub fn same_store(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.db, &other.db)
    }
}

struct CacheEntry<D> {
    location: StoreLocation,
    db: Arc<D>,
    refcount: usize,
    idle_since: Option<DateTime<Utc>>,
}

/// Cache mapping event identifiers to open stores.
///
/// The cache is owned by a single event loop; every method takes `&mut self`
/// and completes without suspension, so no locking is involved.
pub struct EventStoreCache<B, C>
where
    B: StoreBackend,
    C: Clock + Send + Sync,
{
    backend: B,
    clock: Arc<C>,
    path_prefix: Utf8PathBuf,
    idle_grace: Duration,
    entries: HashMap<EventUuid, CacheEntry<B::Database>>,
}

impl<B, C> EventStoreCache<B, C>
where
    B: StoreBackend,
    C: Clock + Send + Sync,
{
    /// Creates an empty cache storing files under `path_prefix`.
    #[must_use]
    pub fn new(
        backend: B,
        clock: Arc<C>,
        path_prefix: impl Into<Utf8PathBuf>,
        idle_grace: Duration,
    ) -> Self {
        Self {
            backend,
            clock,
            path_prefix: path_prefix.into(),
            idle_grace,
            entries: HashMap::new(),
        }
    }

    /// Returns the backend driving this cache.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Derives the store location for an event.
    #[must_use]
    pub fn location_for(&self, event: &EventUuid) -> StoreLocation {
        StoreLocation::derive(&self.path_prefix, event.as_str())
    }

    /// Acquires a reference to the event's store, opening it if needed.
    ///
    /// A cached store is shared and its idle mark cleared. Otherwise the
    /// store is opened (created when `create_if_absent` is set), provisioned
    /// and cached with a single reference. A failed open or provisioning
    /// leaves nothing cached.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] or [`StoreError::Schema`].
    pub fn acquire(
        &mut self,
        event: &EventUuid,
        create_if_absent: bool,
    ) -> Result<EventStoreHandle<B::Database>, StoreError> {
        if let Some(handle) = self.reuse(event) {
            return Ok(handle);
        }
        let location = self.location_for(event);
        let db = open_provisioned(&self.backend, &location, create_if_absent)?;
        Ok(self.insert_opened(event, location, db))
    }

    /// Acquires a reference like [`Self::acquire`], opening and provisioning
    /// an uncached store on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] or [`StoreError::Schema`].
    pub async fn acquire_off_loop(
        &mut self,
        event: &EventUuid,
        create_if_absent: bool,
    ) -> Result<EventStoreHandle<B::Database>, StoreError>
    where
        B: Clone + Send + 'static,
    {
        if let Some(handle) = self.reuse(event) {
            return Ok(handle);
        }
        let location = self.location_for(event);
        let backend = self.backend.clone();
        let target = location.clone();
        let db = tokio::task::spawn_blocking(move || {
            open_provisioned(&backend, &target, create_if_absent)
        })
        .await
        .map_err(|err| StoreError::open(location.primary(), err))??;
        Ok(self.insert_opened(event, location, db))
    }

    fn reuse(&mut self, event: &EventUuid) -> Option<EventStoreHandle<B::Database>> {
        let entry = self.entries.get_mut(event)?;
        entry.refcount += 1;
        entry.idle_since = None;
        debug!(event = %event, refcount = entry.refcount, "reusing cached event store");
        Some(EventStoreHandle {
            event: event.clone(),
            db: Arc::clone(&entry.db),
        })
    }

    fn insert_opened(
        &mut self,
        event: &EventUuid,
        location: StoreLocation,
        db: Arc<B::Database>,
    ) -> EventStoreHandle<B::Database> {
        info!(event = %event, path = %location.primary(), "opened event store");
        self.entries.insert(
            event.clone(),
            CacheEntry {
                location,
                db: Arc::clone(&db),
                refcount: 1,
                idle_since: None,
            },
        );
        EventStoreHandle {
            event: event.clone(),
            db,
        }
    }

    /// Returns a reference to the cache.
    ///
    /// The last release stamps the store idle but leaves it open. A handle
    /// whose store is not cached is closed directly.
    pub fn release(&mut self, handle: EventStoreHandle<B::Database>) {
        let EventStoreHandle { event, db } = handle;
        let Some(entry) = self
            .entries
            .get_mut(&event)
            .filter(|entry| Arc::ptr_eq(&entry.db, &db))
        else {
            warn!(event = %event, "releasing uncached event store, closing it");
            self.backend.close(db);
            return;
        };

        drop(db);
        entry.refcount = entry.refcount.saturating_sub(1);
        if entry.refcount == 0 {
            entry.idle_since = Some(self.clock.utc());
        }
        debug!(event = %event, refcount = entry.refcount, "released event store");
    }

    /// Closes every unreferenced store idle for longer than the grace window.
    ///
    /// Returns the number of stores closed.
    pub fn sweep(&mut self) -> usize {
        let now = self.clock.utc();
        let grace = self.idle_grace;
        let expired: Vec<EventUuid> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.refcount == 0)
            .filter(|(_, entry)| {
                entry.idle_since.is_some_and(|since| {
                    now.signed_duration_since(since)
                        .to_std()
                        .is_ok_and(|elapsed| elapsed > grace)
                })
            })
            .map(|(event, _)| event.clone())
            .collect();

        for event in &expired {
            if let Some(entry) = self.entries.remove(event) {
                debug!(event = %event, "closing idle event store");
                self.backend.close(entry.db);
            }
        }

        let stats = self.stats();
        info!(
            in_use = stats.in_use,
            total = stats.total,
            closed = expired.len(),
            "swept event store cache"
        );
        expired.len()
    }

    /// Deletes the event's store files once nothing references them.
    ///
    /// An idle cached store is evicted and closed first. Individual file
    /// removal failures are logged and reported, not raised.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InUse`] while references are outstanding.
    pub fn purge(&mut self, event: &EventUuid) -> Result<PurgeReport, StoreError> {
        if let Some(refcount) = self.refcount(event).filter(|count| *count > 0) {
            return Err(StoreError::InUse {
                event: event.clone(),
                refcount,
            });
        }

        let location = self.entries.remove(event).map_or_else(
            || self.location_for(event),
            |entry| {
                self.backend.close(entry.db);
                entry.location
            },
        );

        let report = self.backend.remove(&location);
        for (path, reason) in &report.failed {
            warn!(event = %event, path = %path, reason = %reason, "unable to remove event store file");
        }
        info!(event = %event, removed = report.removed.len(), "purged event store");
        Ok(report)
    }

    /// Closes every cached store regardless of references.
    ///
    /// Returns the number of stores closed. Outstanding handles keep their
    /// database alive until dropped but are no longer tracked.
    pub fn close_all_now(&mut self) -> usize {
        let closed = self.entries.len();
        for (event, entry) in self.entries.drain() {
            if entry.refcount > 0 {
                warn!(event = %event, refcount = entry.refcount, "force closing referenced event store");
            }
            self.backend.close(entry.db);
        }
        info!(closed, "closed all event stores");
        closed
    }

    /// Returns the cache population.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total: self.entries.len(),
            in_use: self
                .entries
                .values()
                .filter(|entry| entry.refcount > 0)
                .count(),
        }
    }

    /// Returns the reference count of a cached store.
    #[must_use]
    pub fn refcount(&self, event: &EventUuid) -> Option<usize> {
        self.entries.get(event).map(|entry| entry.refcount)
    }

    /// Returns `true` when the event's store is cached open.
    #[must_use]
    pub fn is_cached(&self, event: &EventUuid) -> bool {
        self.entries.contains_key(event)
    }
}

fn open_provisioned<B: StoreBackend>(
    backend: &B,
    location: &StoreLocation,
    create: bool,
) -> Result<Arc<B::Database>, StoreError> {
    let db = Arc::new(backend.open(location, create)?);
    if let Err(err) = backend.provision(location, &db) {
        backend.close(db);
        return Err(err);
    }
    Ok(db)
}
