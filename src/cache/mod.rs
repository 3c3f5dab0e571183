//! Tag-invalidated cache of server-fetched query results.
//!
//! Every distinct query (endpoint + arguments) owns one entry holding the
//! last-known data, its freshness and a watch channel subscribers listen on.
//! A successful mutation marks every entry sharing one of its tags stale and
//! refetches the entries somebody is subscribed to.
//!
//! Fetches for the same key are ordered by a per-key sequence number: a
//! response never overwrites one that was issued later, and a response issued
//! before the latest invalidation is stored but stays stale.

mod tags;

pub use tags::*;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinSet;

use crate::errors::{FleetError, FleetResult};
use crate::remote::{FleetApi, Mutation, Query};

/// Identity of a cached query: endpoint name plus serialized arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    endpoint: &'static str,
    args: String,
}

impl QueryKey {
    pub fn new(endpoint: &'static str, args: impl Into<String>) -> Self {
        Self {
            endpoint,
            args: args.into(),
        }
    }

    pub fn endpoint(&self) -> &'static str {
        self.endpoint
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.endpoint, self.args)
    }
}

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    Stale,
    Fetching,
    Error,
}

/// Point-in-time view of an entry, as published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    pub data: Option<Value>,
    pub freshness: Freshness,
    pub error: Option<FleetError>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
    fn empty() -> Self {
        Self {
            data: None,
            freshness: Freshness::Stale,
            error: None,
            fetched_at: None,
        }
    }
}

/// Data returned by a read, tagged with how trustworthy it is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cached<T> {
    pub data: T,
    pub freshness: Freshness,
}

impl Cached<Value> {
    pub fn decode<T: DeserializeOwned>(self) -> FleetResult<Cached<T>> {
        Ok(Cached {
            data: serde_json::from_value(self.data)?,
            freshness: self.freshness,
        })
    }
}

impl<T> Cached<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Cached<U> {
        Cached {
            data: f(self.data),
            freshness: self.freshness,
        }
    }
}

struct CacheEntry {
    query: Query,
    snapshot: CacheSnapshot,
    /// Last sequence number handed to a fetch
    issued_seq: u64,
    /// Newest sequence number whose response has been applied
    settled_seq: u64,
    /// Responses at or below this sequence predate the latest invalidation
    stale_through: u64,
    tx: watch::Sender<CacheSnapshot>,
}

impl CacheEntry {
    fn new(query: Query) -> Self {
        let (tx, _) = watch::channel(CacheSnapshot::empty());
        Self {
            query,
            snapshot: CacheSnapshot::empty(),
            issued_seq: 0,
            settled_seq: 0,
            stale_through: 0,
            tx,
        }
    }

    fn publish(&self) {
        self.tx.send_replace(self.snapshot.clone());
    }

    fn is_subscribed(&self) -> bool {
        self.tx.receiver_count() > 0
    }

    fn current(&self) -> Option<Cached<Value>> {
        self.snapshot.data.clone().map(|data| Cached {
            data,
            freshness: self.snapshot.freshness,
        })
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<QueryKey, CacheEntry>,
    tags: TagGraph,
}

impl CacheState {
    fn entry(&mut self, query: &Query) -> &mut CacheEntry {
        let key = query.key();
        let tags = &mut self.tags;
        self.entries.entry(key.clone()).or_insert_with(|| {
            tags.register(&key, query.provided_tags(None));
            CacheEntry::new(query.clone())
        })
    }
}

/// Server cache shared by the dashboard and the assignment coordinator.
#[derive(Clone)]
pub struct ServerCache {
    api: Arc<dyn FleetApi>,
    state: Arc<RwLock<CacheState>>,
}

impl ServerCache {
    pub fn new(api: Arc<dyn FleetApi>) -> Self {
        Self {
            api,
            state: Arc::new(RwLock::new(CacheState::default())),
        }
    }

    /// Return cached data if fresh, otherwise fetch it.
    pub async fn query(&self, query: &Query) -> FleetResult<Cached<Value>> {
        {
            let state = self.state.read().await;
            if let Some(entry) = state.entries.get(&query.key()) {
                if entry.snapshot.freshness == Freshness::Fresh {
                    if let Some(hit) = entry.current() {
                        return Ok(hit);
                    }
                }
            }
        }

        self.refetch(query).await
    }

    /// Fetch unconditionally and store the result.
    pub async fn refetch(&self, query: &Query) -> FleetResult<Cached<Value>> {
        let seq = self.begin_fetch(query).await;
        let result = self.api.execute(query.request()).await;
        self.settle(query, seq, result).await
    }

    /// Current snapshot without touching the network.
    pub async fn peek(&self, query: &Query) -> Option<CacheSnapshot> {
        let state = self.state.read().await;
        state
            .entries
            .get(&query.key())
            .map(|entry| entry.snapshot.clone())
    }

    /// Register interest in a query. The entry counts as displayed, and is
    /// refetched after invalidation, while the receiver is alive.
    pub async fn subscribe(&self, query: &Query) -> watch::Receiver<CacheSnapshot> {
        let mut state = self.state.write().await;
        let entry = state.entry(query);
        let rx = entry.tx.subscribe();
        tracing::debug!(
            "Subscribed to {} ({} subscribers)",
            query.key(),
            entry.tx.receiver_count()
        );
        rx
    }

    /// Perform a remote write; on success invalidate its tags and refetch
    /// subscribed dependents before returning.
    pub async fn mutate(&self, mutation: &Mutation) -> FleetResult<Value> {
        let request = mutation.request()?;
        let data = match self.api.execute(request).await {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!("Mutation {} failed: {}", mutation.name(), e);
                return Err(e);
            }
        };

        let refetch = self.invalidate(&mutation.invalidates()).await;
        tracing::debug!(
            "Mutation {} succeeded, refetching {} subscribed queries",
            mutation.name(),
            refetch.len()
        );
        self.refetch_all(refetch).await;

        Ok(data)
    }

    /// Mark every entry depending on one of `tags` stale. Returns the
    /// subscribed queries among them.
    pub async fn invalidate(&self, tags: &[Tag]) -> Vec<Query> {
        let mut state = self.state.write().await;
        let CacheState { entries, tags: graph } = &mut *state;

        let mut subscribed = Vec::new();
        for key in graph.dependents(tags) {
            let Some(entry) = entries.get_mut(&key) else {
                continue;
            };
            entry.stale_through = entry.issued_seq;
            entry.snapshot.freshness = Freshness::Stale;
            entry.publish();
            tracing::debug!("Invalidated {}", key);

            if entry.is_subscribed() {
                subscribed.push(entry.query.clone());
            }
        }
        subscribed
    }

    async fn refetch_all(&self, queries: Vec<Query>) {
        let mut tasks = JoinSet::new();
        for query in queries {
            let cache = self.clone();
            tasks.spawn(async move {
                let result = cache.refetch(&query).await;
                (query, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((query, Err(e))) => {
                    tracing::warn!("Refetch of {} failed: {}", query.key(), e);
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Refetch task panicked: {}", e),
            }
        }
    }

    async fn begin_fetch(&self, query: &Query) -> u64 {
        let mut state = self.state.write().await;
        let entry = state.entry(query);
        entry.issued_seq += 1;
        entry.snapshot.freshness = Freshness::Fetching;
        entry.publish();
        entry.issued_seq
    }

    async fn settle(
        &self,
        query: &Query,
        seq: u64,
        result: FleetResult<Value>,
    ) -> FleetResult<Cached<Value>> {
        let key = query.key();
        let mut state = self.state.write().await;
        let CacheState { entries, tags } = &mut *state;
        let Some(entry) = entries.get_mut(&key) else {
            return result.map(|data| Cached {
                data,
                freshness: Freshness::Stale,
            });
        };

        if seq <= entry.settled_seq {
            tracing::warn!(
                "Discarding response #{} for {}: #{} already settled",
                seq,
                key,
                entry.settled_seq
            );
            return match entry.current() {
                Some(current) => Ok(current),
                None => result.map(|data| Cached {
                    data,
                    freshness: Freshness::Stale,
                }),
            };
        }
        entry.settled_seq = seq;

        match result {
            Ok(data) => {
                tags.register(&key, query.provided_tags(Some(&data)));
                entry.snapshot.freshness = if seq > entry.stale_through {
                    Freshness::Fresh
                } else if entry.issued_seq > seq {
                    Freshness::Fetching
                } else {
                    Freshness::Stale
                };
                entry.snapshot.data = Some(data.clone());
                entry.snapshot.error = None;
                entry.snapshot.fetched_at = Some(Utc::now());
                entry.publish();
                tracing::debug!("Settled {} #{} as {:?}", key, seq, entry.snapshot.freshness);

                Ok(Cached {
                    data,
                    freshness: entry.snapshot.freshness,
                })
            }
            Err(e) => {
                entry.snapshot.freshness = Freshness::Error;
                entry.snapshot.error = Some(e.clone());
                entry.publish();
                tracing::warn!("Fetch of {} #{} failed: {}", key, seq, e);
                Err(e)
            }
        }
    }
}
