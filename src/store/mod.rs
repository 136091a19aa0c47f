//! Backing store abstraction.
//!
//! Routers talk to the shared key-value store through the [`Store`] trait,
//! which exposes exactly the list and hash commands the routing records
//! need. Every call takes the caller's [`CancellationToken`]; a fired token
//! aborts the round-trip with [`StoreError::Cancelled`].

pub mod connector;
pub mod memory;
pub mod redis_store;

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::error::{StoreError, StoreResult};

pub use connector::{ConnectorCache, StoreDialer};
pub use memory::{MemoryDialer, MemoryStore};
pub use redis_store::{RedisDialer, RedisStore};

#[async_trait]
pub trait Store: Send + Sync {
    /// Whole list stored at `key`, empty when the key is absent.
    async fn list_range(&self, ctx: &CancellationToken, key: &str) -> StoreResult<Vec<String>>;

    async fn list_len(&self, ctx: &CancellationToken, key: &str) -> StoreResult<usize>;

    /// Appends `values` to the tail of the list, creating it if needed.
    async fn list_push(&self, ctx: &CancellationToken, key: &str, values: &[String])
        -> StoreResult<()>;

    /// Appends every value the list does not hold yet, as one atomic step.
    ///
    /// Returns `None` without writing when the list does not exist, otherwise
    /// how many values were appended.
    async fn list_push_missing(
        &self,
        ctx: &CancellationToken,
        key: &str,
        values: &[String],
    ) -> StoreResult<Option<usize>>;

    /// Removes every occurrence of `value`, returning how many were removed.
    async fn list_remove(&self, ctx: &CancellationToken, key: &str, value: &str)
        -> StoreResult<usize>;

    /// Atomically rewrites each list to exactly the given contents.
    ///
    /// An empty value list deletes the key.
    async fn replace_lists(
        &self,
        ctx: &CancellationToken,
        lists: &[(String, Vec<String>)],
    ) -> StoreResult<()>;

    /// Deletes the keys, returning how many existed.
    async fn delete(&self, ctx: &CancellationToken, keys: &[String]) -> StoreResult<usize>;

    async fn exists(&self, ctx: &CancellationToken, key: &str) -> StoreResult<bool>;

    async fn hash_set(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[(&str, String)],
    ) -> StoreResult<()>;

    /// Values of `fields` in order, `None` for absent fields or keys.
    async fn hash_get(
        &self,
        ctx: &CancellationToken,
        key: &str,
        fields: &[&str],
    ) -> StoreResult<Vec<Option<String>>>;

    async fn ping(&self, ctx: &CancellationToken) -> StoreResult<()>;
}

/// Runs `fut` unless `ctx` fires first.
pub(crate) async fn cancellable<T, F>(ctx: &CancellationToken, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(StoreError::Cancelled),
        res = fut => res,
    }
}
