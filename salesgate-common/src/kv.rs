//! Key-value store collaborator
//!
//! The registry and the audit log share one key-value store. Lookups that fan
//! out over many keys go through [`Pipeline`]: all commands are sent, then all
//! replies are received in command order, so a batch costs one round trip.

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// One command inside a pipelined batch
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Read a string value
    Get { key: String },
    /// Read one field of a hash
    HGet { key: String, field: String },
    /// Read every field of a hash
    HGetAll { key: String },
    /// Write fields of a hash
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Remove a key of any type
    Del { key: String },
}

/// Reply to one pipelined command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Missing key or field
    Nil,
    /// String value
    Bulk(Bytes),
    /// Hash contents (empty when the key is missing)
    Map(HashMap<String, String>),
    /// Integer result (fields written, keys removed)
    Int(i64),
}

impl Reply {
    /// Hash contents; `Nil` reads as an empty map
    pub fn into_map(self) -> Result<HashMap<String, String>> {
        match self {
            Reply::Map(map) => Ok(map),
            Reply::Nil => Ok(HashMap::new()),
            other => Err(Error::KeyValue(format!("expected map reply, got {:?}", other))),
        }
    }

    /// String value, `None` for `Nil`
    pub fn into_bytes(self) -> Result<Option<Bytes>> {
        match self {
            Reply::Bulk(bytes) => Ok(Some(bytes)),
            Reply::Nil => Ok(None),
            other => Err(Error::KeyValue(format!("expected bulk reply, got {:?}", other))),
        }
    }

    /// String value decoded as UTF-8, `None` for `Nil`
    pub fn into_string(self) -> Result<Option<String>> {
        self.into_bytes()?
            .map(|bytes| {
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| Error::KeyValue(format!("reply is not UTF-8: {}", e)))
            })
            .transpose()
    }
}

/// Ordered batch of commands executed in one round trip
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    /// Empty pipeline
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a `GET`
    pub fn get(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Get { key: key.into() });
        self
    }

    /// Queue an `HGET`
    pub fn hget(&mut self, key: impl Into<String>, field: impl Into<String>) -> &mut Self {
        self.commands.push(Command::HGet {
            key: key.into(),
            field: field.into(),
        });
        self
    }

    /// Queue an `HGETALL`
    pub fn hgetall(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::HGetAll { key: key.into() });
        self
    }

    /// Queue an `HSET`
    pub fn hset(&mut self, key: impl Into<String>, fields: Vec<(String, String)>) -> &mut Self {
        self.commands.push(Command::HSet {
            key: key.into(),
            fields,
        });
        self
    }

    /// Queue a `DEL`
    pub fn del(&mut self, key: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Del { key: key.into() });
        self
    }

    /// Number of queued commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Consume the pipeline, yielding its commands in order
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// Key-value store collaborator
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Execute a pipelined batch; replies come back in command order
    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>>;

    /// Read a string value
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Write a string value with an optional time-to-live
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()>;

    /// Remove a key of any type
    async fn delete(&self, key: &str) -> Result<()>;

    /// Add or rescore `member` in the sorted set `key`
    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()>;

    /// Members with `min <= score <= max`, ordered by score then member
    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>>;

    /// Remove members with `min <= score <= max`, returning how many went
    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<usize>;
}

#[derive(Debug, Default)]
struct State {
    strings: HashMap<String, (Bytes, Option<Instant>)>,
    hashes: HashMap<String, HashMap<String, String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
}

impl State {
    fn get_string(&mut self, key: &str) -> Option<Bytes> {
        let expired = match self.strings.get(key) {
            Some((_, Some(deadline))) => Instant::now() >= *deadline,
            Some((_, None)) => false,
            None => return None,
        };
        if expired {
            self.strings.remove(key);
            return None;
        }
        self.strings.get(key).map(|(value, _)| value.clone())
    }

    fn delete(&mut self, key: &str) -> i64 {
        let removed = [
            self.strings.remove(key).is_some(),
            self.hashes.remove(key).is_some(),
            self.zsets.remove(key).is_some(),
        ];
        removed.iter().filter(|r| **r).count() as i64
    }

    fn apply(&mut self, command: Command) -> Reply {
        match command {
            Command::Get { key } => self.get_string(&key).map(Reply::Bulk).unwrap_or(Reply::Nil),
            Command::HGet { key, field } => self
                .hashes
                .get(&key)
                .and_then(|hash| hash.get(&field))
                .map(|value| Reply::Bulk(Bytes::from(value.clone())))
                .unwrap_or(Reply::Nil),
            Command::HGetAll { key } => {
                Reply::Map(self.hashes.get(&key).cloned().unwrap_or_default())
            }
            Command::HSet { key, fields } => {
                let hash = self.hashes.entry(key).or_default();
                let mut added = 0;
                for (field, value) in fields {
                    if hash.insert(field, value).is_none() {
                        added += 1;
                    }
                }
                Reply::Int(added)
            }
            Command::Del { key } => Reply::Int(self.delete(&key)),
        }
    }
}

/// In-memory key-value store with string TTLs, hashes and sorted sets
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    state: Mutex<State>,
}

impl InMemoryKeyValueStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn execute(&self, pipeline: Pipeline) -> Result<Vec<Reply>> {
        let mut state = self.state.lock().await;
        Ok(pipeline
            .into_commands()
            .into_iter()
            .map(|command| state.apply(command))
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        Ok(self.state.lock().await.get_string(key))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<()> {
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        self.state
            .lock()
            .await
            .strings
            .insert(key.to_string(), (value, deadline));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state.lock().await.delete(key);
        Ok(())
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<()> {
        if score.is_nan() {
            return Err(Error::KeyValue("sorted set score is NaN".to_string()));
        }
        self.state
            .lock()
            .await
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let Some(zset) = state.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let mut members: Vec<(f64, &String)> = zset
            .iter()
            .filter(|(_, score)| **score >= min && **score <= max)
            .map(|(member, score)| (*score, member))
            .collect();
        members.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
        Ok(members.into_iter().map(|(_, member)| member.clone()).collect())
    }

    async fn zrem_range_by_score(&self, key: &str, min: f64, max: f64) -> Result<usize> {
        let mut state = self.state.lock().await;
        let Some(zset) = state.zsets.get_mut(key) else {
            return Ok(0);
        };
        let before = zset.len();
        zset.retain(|_, score| *score < min || *score > max);
        Ok(before - zset.len())
    }
}
