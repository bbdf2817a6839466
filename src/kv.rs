//! Typed façade over the key-value store operations the engine uses.
//!
//! Only the operations the behavioral windows actually need are exposed:
//! sorted sets scored by epoch millis, plain sets, strings with TTL, lists
//! and counters. Absence is never an error — readers get an empty value.
//! Errors bubble to the caller; this layer does not retry.

use anyhow::Result;
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Store operations used by the behavioral windows and the model version
/// counter. All implementations must be safe for concurrent use.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()>;
    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>>;
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;
    async fn smembers(&self, key: &str) -> Result<HashSet<String>>;
    async fn scard(&self, key: &str) -> Result<u64>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn set_ex(&self, key: &str, ttl_seconds: u64, value: &str) -> Result<()>;
    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()>;
    async fn lpush(&self, key: &str, value: &str) -> Result<()>;
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;
    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()>;
    async fn incr(&self, key: &str) -> Result<u64>;
}

/// Redis-backed store over a multiplexed connection manager.
///
/// The manager is cheap to clone; every operation grabs its own handle so
/// concurrent window writers never serialize on a single connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Connect and build the managed connection.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrangebyscore(key, min, max).await?;
        Ok(members)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(key, member).await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>> {
        let mut conn = self.conn.clone();
        let members: HashSet<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.scard(key).await?;
        Ok(count)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, ttl_seconds: u64, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.expire(key, ttl_seconds as i64).await?;
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(key, value).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let values: Vec<String> = conn.lrange(key, start as isize, stop as isize).await?;
        Ok(values)
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.ltrim(key, start as isize, stop as isize).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let value: u64 = conn.incr(key, 1u64).await?;
        Ok(value)
    }
}

enum Value {
    Str(String),
    ZSet(Vec<(f64, String)>),
    Set(HashSet<String>),
    List(VecDeque<String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(value: Value) -> Self {
        Self { value, expires_at: None }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory store with TTL bookkeeping. Backs unit and scenario tests and
/// lets the engine run without a Redis deployment.
#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a live entry, dropping it if its TTL has lapsed.
    fn with_entry<T>(&self, key: &str, f: impl FnOnce(Option<&mut Entry>) -> T) -> T {
        let mut entries = self.entries.lock().expect("memory kv poisoned");
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        f(entries.get_mut(key))
    }

    fn upsert<T>(&self, key: &str, default: Value, f: impl FnOnce(&mut Entry) -> T) -> T {
        let mut entries = self.entries.lock().expect("memory kv poisoned");
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::live(default));
        f(entry)
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        self.upsert(key, Value::ZSet(Vec::new()), |entry| {
            if let Value::ZSet(members) = &mut entry.value {
                members.retain(|(_, m)| m != member);
                members.push((score, member.to_string()));
            }
        });
        Ok(())
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        Ok(self.with_entry(key, |entry| match entry {
            Some(Entry { value: Value::ZSet(members), .. }) => {
                let mut hits: Vec<(f64, String)> = members
                    .iter()
                    .filter(|(score, _)| *score >= min && *score <= max)
                    .cloned()
                    .collect();
                hits.sort_by(|a, b| a.0.total_cmp(&b.0));
                hits.into_iter().map(|(_, m)| m).collect()
            }
            _ => Vec::new(),
        }))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.upsert(key, Value::Set(HashSet::new()), |entry| {
            if let Value::Set(members) = &mut entry.value {
                members.insert(member.to_string());
            }
        });
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>> {
        Ok(self.with_entry(key, |entry| match entry {
            Some(Entry { value: Value::Set(members), .. }) => members.clone(),
            _ => HashSet::new(),
        }))
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        Ok(self.with_entry(key, |entry| match entry {
            Some(Entry { value: Value::Set(members), .. }) => members.len() as u64,
            _ => 0,
        }))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.with_entry(key, |entry| match entry {
            Some(Entry { value: Value::Str(s), .. }) => Some(s.clone()),
            _ => None,
        }))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("memory kv poisoned");
        entries.insert(key.to_string(), Entry::live(Value::Str(value.to_string())));
        Ok(())
    }

    async fn set_ex(&self, key: &str, ttl_seconds: u64, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("memory kv poisoned");
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_seconds)),
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        self.with_entry(key, |entry| {
            if let Some(entry) = entry {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_seconds));
            }
        });
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        self.upsert(key, Value::List(VecDeque::new()), |entry| {
            if let Value::List(items) = &mut entry.value {
                items.push_front(value.to_string());
            }
        });
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        Ok(self.with_entry(key, |entry| match entry {
            Some(Entry { value: Value::List(items), .. }) => {
                let len = items.len() as i64;
                let norm = |idx: i64| -> i64 {
                    if idx < 0 {
                        (len + idx).max(0)
                    } else {
                        idx
                    }
                };
                let from = norm(start).min(len) as usize;
                let to = (norm(stop) + 1).clamp(0, len) as usize;
                if from >= to {
                    Vec::new()
                } else {
                    items.iter().skip(from).take(to - from).cloned().collect()
                }
            }
            _ => Vec::new(),
        }))
    }

    async fn ltrim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        self.with_entry(key, |entry| {
            if let Some(Entry { value: Value::List(items), .. }) = entry {
                let len = items.len() as i64;
                let norm = |idx: i64| -> i64 {
                    if idx < 0 {
                        (len + idx).max(0)
                    } else {
                        idx
                    }
                };
                let from = norm(start).min(len) as usize;
                let to = (norm(stop) + 1).clamp(0, len) as usize;
                let kept: VecDeque<String> = if from >= to {
                    VecDeque::new()
                } else {
                    items.iter().skip(from).take(to - from).cloned().collect()
                };
                *items = kept;
            }
        });
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<u64> {
        Ok(self.upsert(key, Value::Str("0".to_string()), |entry| {
            if let Value::Str(s) = &mut entry.value {
                let next = s.parse::<u64>().unwrap_or(0) + 1;
                *s = next.to_string();
                next
            } else {
                0
            }
        }))
    }
}
