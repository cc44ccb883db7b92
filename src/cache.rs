use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::address::ServerAddress;
use crate::error::QueryError;
use crate::info::ServerStatus;
use crate::query::{execute, QueryRequest};

/// Recent statuses keyed by address, for callers that poll the same servers
/// repeatedly. Nothing in the query path uses this on its own.
///
/// Entries older than the TTL are never served; they are dropped when looked
/// up or by [`StatusCache::purge_expired`].
pub struct StatusCache {
    entries: DashMap<ServerAddress, Entry>,
    ttl: Duration,
}

struct Entry {
    status: ServerStatus,
    stored_at: Instant,
}

impl StatusCache {
    pub fn new(ttl: Duration) -> Self {
        StatusCache {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// A fresh status for `address`, if one is cached.
    pub fn get(&self, address: &ServerAddress) -> Option<ServerStatus> {
        let expired = match self.entries.get(address) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => {
                return Some(entry.status.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries
                .remove_if(address, |_, entry| entry.stored_at.elapsed() >= self.ttl);
        }
        None
    }

    pub fn insert(&self, address: ServerAddress, status: ServerStatus) {
        self.entries.insert(
            address,
            Entry {
                status,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, address: &ServerAddress) -> Option<ServerStatus> {
        self.entries.remove(address).map(|(_, entry)| entry.status)
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        self.entries
            .retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
    }

    /// Serve a fresh cached status or run `request` and remember the result.
    /// Failures are returned as-is and never cached.
    pub async fn get_or_query(&self, request: &QueryRequest) -> Result<ServerStatus, QueryError> {
        if let Some(status) = self.get(&request.address) {
            log::trace!("serving cached status for {}", request.address);
            return Ok(status);
        }
        let status = execute(request).await?;
        self.insert(request.address.clone(), status.clone());
        Ok(status)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
