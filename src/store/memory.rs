//! In-process store speaking the same command set as Redis.
//!
//! Servers are keyed by their configured address, so two router scopes that
//! point at one address observe the same data through distinct clients.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::{connector::StoreDialer, Store};
use crate::{
    config::RouterConfig,
    core::error::{StoreError, StoreResult},
};

#[derive(Debug, Clone)]
enum Value {
    List(Vec<String>),
    Hash(HashMap<String, String>),
}

type Keyspace = HashMap<String, Value>;

#[derive(Default)]
struct MemoryServer {
    dbs: Mutex<HashMap<i64, Keyspace>>,
    password: Mutex<Option<String>>,
    unreachable: AtomicBool,
}

impl MemoryServer {
    fn dbs(&self) -> MutexGuard<'_, HashMap<i64, Keyspace>> {
        self.dbs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn password(&self) -> Option<String> {
        self.password
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn wrong_type() -> StoreError {
    StoreError::Command(
        "WRONGTYPE Operation against a key holding the wrong kind of value".to_string(),
    )
}

/// Client handle on one database of a [`MemoryDialer`] server.
#[derive(Clone)]
pub struct MemoryStore {
    server: Arc<MemoryServer>,
    address: String,
    db: i64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Standalone store backed by its own private server.
    pub fn new() -> Self {
        Self {
            server: Arc::new(MemoryServer::default()),
            address: "memory".to_string(),
            db: 0,
        }
    }

    fn check(&self, ctx: &CancellationToken) -> StoreResult<()> {
        if ctx.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        if self.server.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable(format!(
                "dial tcp {}: connection refused",
                self.address
            )));
        }
        Ok(())
    }

    fn with_keyspace<T>(
        &self,
        ctx: &CancellationToken,
        f: impl FnOnce(&mut Keyspace) -> StoreResult<T>,
    ) -> StoreResult<T> {
        self.check(ctx)?;
        let mut dbs = self.server.dbs();
        f(dbs.entry(self.db).or_default())
    }
}

fn list_mut<'a>(keyspace: &'a mut Keyspace, key: &str) -> StoreResult<&'a mut Vec<String>> {
    match keyspace
        .entry(key.to_string())
        .or_insert_with(|| Value::List(Vec::new()))
    {
        Value::List(list) => Ok(list),
        Value::Hash(_) => Err(wrong_type()),
    }
}

fn list_ref<'a>(keyspace: &'a Keyspace, key: &str) -> StoreResult<Option<&'a Vec<String>>> {
    match keyspace.get(key) {
        None => Ok(None),
        Some(Value::List(list)) => Ok(Some(list)),
        Some(Value::Hash(_)) => Err(wrong_type()),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_range(&self, ctx: &CancellationToken, key: &str) -> StoreResult<Vec<String>> {
        self.with_keyspace(ctx, |ks| {
            Ok(list_ref(ks, key)?.cloned().unwrap_or_default())
        })
    }

    async fn list_len(&self, ctx: &CancellationToken, key: &str) -> StoreResult<usize> {
        self.with_keyspace(ctx, |ks| Ok(list_ref(ks, key)?.map_or(0, Vec::len)))
    }

    async fn list_push(
        &self,
        ctx: &CancellationToken,
        key: &str,
        values: &[String],
    ) -> StoreResult<()> {
        if values.is_empty() {
            return self.check(ctx);
        }
        self.with_keyspace(ctx, |ks| {
            list_mut(ks, key)?.extend(values.iter().cloned());
            Ok(())
        })
    }

    async fn list_push_missing(
        &self,
        ctx: &CancellationToken,
        key: &str,
        values: &[String],
    ) -> StoreResult<Option<usize>> {
        self.with_keyspace(ctx, |ks| {
            if list_ref(ks, key)?.is_none() {
                return Ok(None);
            }
            let list = list_mut(ks, key)?;
            let before = list.len();
            for value in values {
                if !list.contains(value) {
                    list.push(value.clone());
                }
            }
            Ok(Some(list.len() - before))
        })
    }

    async fn list_remove(
        &self,
        ctx: &CancellationToken,
        key: &str,
        value: &str,
    ) -> StoreResult<usize> {
        self.with_keyspace(ctx, |ks| {
            if list_ref(ks, key)?.is_none() {
                return Ok(0);
            }
            let list = list_mut(ks, key)?;
            let before = list.len();
            list.retain(|v| v != value);
            let removed = before - list.len();
            // Redis drops empty lists
            if list.is_empty() {
                ks.remove(key);
            }
            Ok(removed)
        })
    }

    async fn replace_lists(
        &self,
        ctx: &CancellationToken,
        lists: &[(String, Vec<String>)],
    ) -> StoreResult<()> {
        self.with_keyspace(ctx, |ks| {
            for (key, values) in lists {
                if values.is_empty() {
                    ks.remove(key);
                } else {
                    ks.insert(key.clone(), Value::List(values.clone()));
                }
            }
            Ok(())
        })
    }

    async fn delete(&self, ctx: &CancellationToken, keys: &[String]) -> StoreResult<usize> {
        self.with_keyspace(ctx, |ks| {
            Ok(keys.iter().filter(|key| ks.remove(*key).is_some()).count())
        })
    }

    async fn exists(&self, ctx: &CancellationToken, key: &str) -> StoreResult<bool> {
        self.with_keyspace(ctx, |ks| Ok(ks.contains_key(key)))
    }

    async fn hash_set(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[(&str, String)],
    ) -> StoreResult<()> {
        self.with_keyspace(ctx, |ks| {
            let hash = match ks
                .entry(key.to_string())
                .or_insert_with(|| Value::Hash(HashMap::new()))
            {
                Value::Hash(hash) => hash,
                Value::List(_) => return Err(wrong_type()),
            };
            for (field, value) in fields {
                hash.insert(field.to_string(), value.clone());
            }
            Ok(())
        })
    }

    async fn hash_get(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[&str],
    ) -> StoreResult<Vec<Option<String>>> {
        self.with_keyspace(ctx, |ks| match ks.get(key) {
            None => Ok(vec![None; fields.len()]),
            Some(Value::Hash(hash)) => Ok(fields.iter().map(|f| hash.get(*f).cloned()).collect()),
            Some(Value::List(_)) => Err(wrong_type()),
        })
    }

    async fn ping(&self, ctx: &CancellationToken) -> StoreResult<()> {
        self.check(ctx)
    }
}

/// Dialer handing out [`MemoryStore`] clients, one fresh handle per dial.
#[derive(Default)]
pub struct MemoryDialer {
    servers: DashMap<String, Arc<MemoryServer>>,
    dials: AtomicUsize,
}

impl MemoryDialer {
    pub fn new() -> Self {
        Self::default()
    }

    fn server(&self, address: &str) -> Arc<MemoryServer> {
        self.servers
            .entry(address.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Makes the server at `address` refuse (or accept again) connections and commands.
    pub fn set_unreachable(&self, address: &str, unreachable: bool) {
        self.server(address)
            .unreachable
            .store(unreachable, Ordering::SeqCst);
    }

    /// Protects the server at `address` with a password.
    pub fn require_password(&self, address: &str, password: &str) {
        *self
            .server(address)
            .password
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(password.to_string());
    }

    /// Direct client on `db` of the server at `address`, bypassing auth.
    pub fn store(&self, address: &str, db: i64) -> MemoryStore {
        MemoryStore {
            server: self.server(address),
            address: address.to_string(),
            db,
        }
    }

    /// Number of successful dials so far.
    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreDialer for MemoryDialer {
    async fn dial(
        &self,
        ctx: &CancellationToken,
        config: &RouterConfig,
    ) -> StoreResult<Arc<dyn Store>> {
        let store = self.store(&config.redis_server, config.redis_db.unwrap_or(0));
        store.check(ctx)?;

        match (store.server.password(), config.redis_password.as_deref()) {
            (None, Some(_)) => {
                return Err(StoreError::Authentication(
                    "ERR AUTH <password> called without any password configured for the default user"
                        .to_string(),
                ))
            }
            (Some(_), None) => {
                return Err(StoreError::Authentication(
                    "NOAUTH Authentication required.".to_string(),
                ))
            }
            (Some(expected), Some(given)) if expected != given => {
                return Err(StoreError::Authentication(
                    "WRONGPASS invalid username-password pair or user is disabled.".to_string(),
                ))
            }
            _ => {}
        }

        self.dials.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(store))
    }
}
