//! In-process credential store
//!
//! Entries live in a `DashMap` keyed by `(namespace, account)`; DashMap's
//! per-shard locking makes every single-key operation atomic without a
//! global lock. Expiry is evaluated lazily against the injected clock, and
//! `spawn_eviction` optionally purges expired entries in the background.

use super::{ensure_counter_namespace, ensure_token_namespace, CredentialStore, Namespace, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crypto_core::{SharedClock, SystemClock};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::debug;

type SlotKey = (Namespace, String);

#[derive(Debug, Clone)]
enum Slot {
    Token {
        value: String,
        expires_at: DateTime<Utc>,
    },
    Counter(u64),
}

impl Slot {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            Slot::Token { expires_at, .. } => now >= *expires_at,
            Slot::Counter(_) => false,
        }
    }
}

#[derive(Debug)]
pub struct InMemoryCredentialStore {
    slots: DashMap<SlotKey, Slot>,
    clock: SharedClock,
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryCredentialStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            slots: DashMap::new(),
            clock,
        }
    }

    /// Drop every expired token entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.slots.len();
        self.slots.retain(|_, slot| !slot.is_expired(now));
        before.saturating_sub(self.slots.len())
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Periodically purge expired entries. The task ends once the store is dropped.
    pub fn spawn_eviction(self: &Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    debug!(purged, "Evicted expired credential entries");
                }
            }
        })
    }

    fn slot_key(namespace: Namespace, key: &str) -> SlotKey {
        (namespace, key.to_string())
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn set(
        &self,
        namespace: Namespace,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> StoreResult<()> {
        ensure_token_namespace(namespace)?;
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.slots.insert(
            Self::slot_key(namespace, key),
            Slot::Token {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, namespace: Namespace, key: &str) -> StoreResult<Option<String>> {
        ensure_token_namespace(namespace)?;
        let now = self.clock.now();
        let slot_key = Self::slot_key(namespace, key);

        // remove_if holds the shard lock, so a concurrent `set` cannot be lost
        if self
            .slots
            .remove_if(&slot_key, |_, slot| slot.is_expired(now))
            .is_some()
        {
            return Ok(None);
        }

        Ok(self.slots.get(&slot_key).and_then(|slot| match slot.value() {
            Slot::Token { value, expires_at } if now < *expires_at => Some(value.clone()),
            _ => None,
        }))
    }

    async fn delete(&self, namespace: Namespace, key: &str) -> StoreResult<bool> {
        ensure_token_namespace(namespace)?;
        let now = self.clock.now();
        Ok(self
            .slots
            .remove(&Self::slot_key(namespace, key))
            .is_some_and(|(_, slot)| !slot.is_expired(now)))
    }

    async fn increment_counter(&self, namespace: Namespace, key: &str) -> StoreResult<u64> {
        ensure_counter_namespace(namespace)?;
        let count = match self.slots.entry(Self::slot_key(namespace, key)) {
            Entry::Occupied(mut occupied) => {
                let next = match occupied.get() {
                    Slot::Counter(n) => n + 1,
                    Slot::Token { .. } => 1,
                };
                occupied.insert(Slot::Counter(next));
                next
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::Counter(1));
                1
            }
        };
        Ok(count)
    }

    async fn counter(&self, namespace: Namespace, key: &str) -> StoreResult<u64> {
        ensure_counter_namespace(namespace)?;
        Ok(self
            .slots
            .get(&Self::slot_key(namespace, key))
            .map(|slot| match slot.value() {
                Slot::Counter(n) => *n,
                Slot::Token { .. } => 0,
            })
            .unwrap_or(0))
    }

    async fn reset_counter(&self, namespace: Namespace, key: &str) -> StoreResult<()> {
        ensure_counter_namespace(namespace)?;
        self.slots.remove(&Self::slot_key(namespace, key));
        Ok(())
    }
}
