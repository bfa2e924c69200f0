//! Key-value backends for session records.
//!
//! Records are grouped per principal. A group is addressed as a key component
//! in its own right, never by pattern matching over key names, so one
//! principal's name being a substring of another's has no effect.
//!
//! Redis layout:
//! - `session:{<group>}:<key>`: record value with TTL
//! - `sessions:{<group>}`: index set of the group's record keys
//!
//! The braces are a Redis hash tag, keeping a group's keys in one slot so the
//! Lua scripts below stay single-slot.

use redis::AsyncCommands;
use std::{collections::HashMap, future::Future, pin::Pin, time::Duration};
use thiserror::Error;
use tokio::{sync::Mutex, time::Instant};
use tracing::debug;

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Storage primitives the session store is built on.
///
/// `put_capped` must be atomic with respect to other calls on the same group.
pub trait KeyValueBackend: Send + Sync {
    /// Store `value` under `key` in `group` with `ttl`.
    ///
    /// If the group already holds `cap` or more live entries, all of them are
    /// deleted first. Returns the number of evicted entries.
    fn put_capped<'a>(
        &'a self,
        group: &'a str,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
        cap: usize,
    ) -> BackendFuture<'a, usize>;

    fn get<'a>(&'a self, group: &'a str, key: &'a str) -> BackendFuture<'a, Option<String>>;

    /// Returns `true` if an entry was removed.
    fn delete<'a>(&'a self, group: &'a str, key: &'a str) -> BackendFuture<'a, bool>;

    /// Remove every entry in `group`, returning how many were removed.
    fn delete_group<'a>(&'a self, group: &'a str) -> BackendFuture<'a, usize>;

    fn count_group<'a>(&'a self, group: &'a str) -> BackendFuture<'a, usize>;

    /// Confirm the backend is reachable.
    fn ping(&self) -> BackendFuture<'_, ()>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local backend for tests and single-node development.
#[derive(Default)]
pub struct MemoryBackend {
    groups: Mutex<HashMap<String, HashMap<String, Entry>>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn prune(entries: &mut HashMap<String, Entry>, now: Instant) {
    entries.retain(|_, entry| entry.expires_at > now);
}

impl KeyValueBackend for MemoryBackend {
    fn put_capped<'a>(
        &'a self,
        group: &'a str,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
        cap: usize,
    ) -> BackendFuture<'a, usize> {
        Box::pin(async move {
            let now = Instant::now();
            let mut groups = self.groups.lock().await;
            let entries = groups.entry(group.to_string()).or_default();
            prune(entries, now);

            let mut evicted = 0;
            if entries.len() >= cap {
                evicted = entries.len();
                entries.clear();
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: now + ttl,
                },
            );
            Ok(evicted)
        })
    }

    fn get<'a>(&'a self, group: &'a str, key: &'a str) -> BackendFuture<'a, Option<String>> {
        Box::pin(async move {
            let now = Instant::now();
            let groups = self.groups.lock().await;
            Ok(groups
                .get(group)
                .and_then(|entries| entries.get(key))
                .filter(|entry| entry.expires_at > now)
                .map(|entry| entry.value.clone()))
        })
    }

    fn delete<'a>(&'a self, group: &'a str, key: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            let now = Instant::now();
            let mut groups = self.groups.lock().await;
            let Some(entries) = groups.get_mut(group) else {
                return Ok(false);
            };
            let removed = entries
                .remove(key)
                .is_some_and(|entry| entry.expires_at > now);
            if entries.is_empty() {
                groups.remove(group);
            }
            Ok(removed)
        })
    }

    fn delete_group<'a>(&'a self, group: &'a str) -> BackendFuture<'a, usize> {
        Box::pin(async move {
            let now = Instant::now();
            let mut groups = self.groups.lock().await;
            Ok(groups.remove(group).map_or(0, |mut entries| {
                prune(&mut entries, now);
                entries.len()
            }))
        })
    }

    fn count_group<'a>(&'a self, group: &'a str) -> BackendFuture<'a, usize> {
        Box::pin(async move {
            let now = Instant::now();
            let groups = self.groups.lock().await;
            Ok(groups.get(group).map_or(0, |entries| {
                entries
                    .values()
                    .filter(|entry| entry.expires_at > now)
                    .count()
            }))
        })
    }

    fn ping(&self) -> BackendFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }
}

// KEYS[1] index set, KEYS[2] record key; ARGV[1] value, ARGV[2] ttl seconds, ARGV[3] cap
const PUT_CAPPED_SCRIPT: &str = r"
local members = redis.call('SMEMBERS', KEYS[1])
local live = {}
for _, member in ipairs(members) do
    if redis.call('EXISTS', member) == 1 then
        table.insert(live, member)
    else
        redis.call('SREM', KEYS[1], member)
    end
end
local evicted = 0
if #live >= tonumber(ARGV[3]) then
    for _, member in ipairs(live) do
        evicted = evicted + redis.call('DEL', member)
    end
    redis.call('DEL', KEYS[1])
end
redis.call('SET', KEYS[2], ARGV[1], 'EX', ARGV[2])
redis.call('SADD', KEYS[1], KEYS[2])
redis.call('EXPIRE', KEYS[1], ARGV[2])
return evicted
";

// KEYS[1] index set
const DELETE_GROUP_SCRIPT: &str = r"
local members = redis.call('SMEMBERS', KEYS[1])
local removed = 0
for _, member in ipairs(members) do
    removed = removed + redis.call('DEL', member)
end
redis.call('DEL', KEYS[1])
return removed
";

// KEYS[1] index set
const COUNT_GROUP_SCRIPT: &str = r"
local members = redis.call('SMEMBERS', KEYS[1])
local live = 0
for _, member in ipairs(members) do
    if redis.call('EXISTS', member) == 1 then
        live = live + 1
    else
        redis.call('SREM', KEYS[1], member)
    end
end
return live
";

/// Redis-backed session records.
#[derive(Clone)]
pub struct RedisBackend {
    client: redis::Client,
}

impl RedisBackend {
    #[must_use]
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Open a client for `url` without connecting yet.
    ///
    /// # Errors
    /// Returns an error if the URL cannot be parsed.
    pub fn open(url: &str) -> Result<Self, BackendError> {
        Ok(Self::new(redis::Client::open(url)?))
    }

    fn record_key(group: &str, key: &str) -> String {
        format!("session:{{{group}}}:{key}")
    }

    fn index_key(group: &str) -> String {
        format!("sessions:{{{group}}}")
    }
}

impl KeyValueBackend for RedisBackend {
    fn put_capped<'a>(
        &'a self,
        group: &'a str,
        key: &'a str,
        value: &'a str,
        ttl: Duration,
        cap: usize,
    ) -> BackendFuture<'a, usize> {
        Box::pin(async move {
            let mut con = self.client.get_multiplexed_async_connection().await?;
            // SET EX rejects 0, so sub-second TTLs round up.
            let ttl_secs = ttl.as_secs().max(1);
            let evicted: usize = redis::Script::new(PUT_CAPPED_SCRIPT)
                .key(Self::index_key(group))
                .key(Self::record_key(group, key))
                .arg(value)
                .arg(ttl_secs)
                .arg(cap)
                .invoke_async(&mut con)
                .await?;
            if evicted > 0 {
                debug!(evicted, "evicted session records on write");
            }
            Ok(evicted)
        })
    }

    fn get<'a>(&'a self, group: &'a str, key: &'a str) -> BackendFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut con = self.client.get_multiplexed_async_connection().await?;
            let value: Option<String> = con.get(Self::record_key(group, key)).await?;
            Ok(value)
        })
    }

    fn delete<'a>(&'a self, group: &'a str, key: &'a str) -> BackendFuture<'a, bool> {
        Box::pin(async move {
            let mut con = self.client.get_multiplexed_async_connection().await?;
            let record_key = Self::record_key(group, key);
            let (deleted, _): (i64, i64) = redis::pipe()
                .atomic()
                .del(&record_key)
                .srem(Self::index_key(group), &record_key)
                .query_async(&mut con)
                .await?;
            Ok(deleted > 0)
        })
    }

    fn delete_group<'a>(&'a self, group: &'a str) -> BackendFuture<'a, usize> {
        Box::pin(async move {
            let mut con = self.client.get_multiplexed_async_connection().await?;
            let removed: usize = redis::Script::new(DELETE_GROUP_SCRIPT)
                .key(Self::index_key(group))
                .invoke_async(&mut con)
                .await?;
            Ok(removed)
        })
    }

    fn count_group<'a>(&'a self, group: &'a str) -> BackendFuture<'a, usize> {
        Box::pin(async move {
            let mut con = self.client.get_multiplexed_async_connection().await?;
            let live: usize = redis::Script::new(COUNT_GROUP_SCRIPT)
                .key(Self::index_key(group))
                .invoke_async(&mut con)
                .await?;
            Ok(live)
        })
    }

    fn ping(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let mut con = self.client.get_multiplexed_async_connection().await?;
            let _: () = redis::cmd("PING").query_async(&mut con).await?;
            Ok(())
        })
    }
}
