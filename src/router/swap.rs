use log::debug;
use tokio_util::sync::CancellationToken;

use super::{
    cname::read_cnames, cname_key, frontend_key, record_addresses, route_record, HipacheRouter,
};
use crate::core::error::{ErrorContext, Op, RouterError, RouterResult};

impl HipacheRouter {
    /// Exchanges the addresses behind `app1` and `app2` in a single transaction.
    ///
    /// Headers stay put. With `cname_only` unset every alias is rewritten to
    /// mirror its own app's new primary. With `cname_only` set the aliases keep
    /// the addresses they served and change owner along with them, so each
    /// alias list moves to the other app.
    pub(super) async fn swap_backends(
        &self,
        ctx: &CancellationToken,
        app1: &str,
        app2: &str,
        cname_only: bool,
    ) -> RouterResult<()> {
        let frontend1 = frontend_key(&self.hostname(Op::Swap, app1)?);
        let frontend2 = frontend_key(&self.hostname(Op::Swap, app2)?);
        let store = self.connect(ctx, Op::Swap).await?;

        let (record1, record2, cnames1, cnames2) = futures::try_join!(
            store.list_range(ctx, &frontend1),
            store.list_range(ctx, &frontend2),
            read_cnames(&*store, ctx, app1),
            read_cnames(&*store, ctx, app2),
        )
        .with_op(Op::Swap)?;
        if record1.is_empty() || record2.is_empty() {
            return Err(RouterError::BackendNotFound);
        }

        let swapped1 = route_record(app1, record_addresses(&record2));
        let swapped2 = route_record(app2, record_addresses(&record1));

        let mut lists = Vec::with_capacity(cnames1.len() + cnames2.len() + 4);
        if cname_only {
            lists.extend(cnames1.iter().map(|c| (frontend_key(c), swapped2.clone())));
            lists.extend(cnames2.iter().map(|c| (frontend_key(c), swapped1.clone())));
            lists.push((cname_key(app1), cnames2.clone()));
            lists.push((cname_key(app2), cnames1.clone()));
        } else {
            lists.extend(cnames1.iter().map(|c| (frontend_key(c), swapped1.clone())));
            lists.extend(cnames2.iter().map(|c| (frontend_key(c), swapped2.clone())));
        }
        lists.push((frontend1, swapped1));
        lists.push((frontend2, swapped2));

        store.replace_lists(ctx, &lists).await.with_op(Op::Swap)?;
        debug!(
            "Swapped {app1} and {app2} (cname only: {cname_only}), {} records rewritten",
            lists.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        core::traits::Router,
        router::{hipache::create_hipache_router, testutil::*},
        store::{MemoryDialer, MemoryStore, Store},
    };

    async fn setup() -> (Arc<dyn Router>, Arc<MemoryDialer>, MemoryStore) {
        let dialer = Arc::new(MemoryDialer::new());
        let router = create_hipache_router(scope("hipache", config(Some("golang.org")), &dialer));
        let raw = raw(&dialer);
        let ctx = CancellationToken::new();
        for (app, addr) in [("b1", "http://127.0.0.1"), ("b2", "http://10.10.10.10")] {
            router.add_backend(&ctx, app).await.unwrap();
            router.add_routes(&ctx, app, &[url(addr)]).await.unwrap();
        }
        (router, dialer, raw)
    }

    async fn record(raw: &MemoryStore, key: &str) -> Vec<String> {
        raw.list_range(&CancellationToken::new(), key).await.unwrap()
    }

    #[tokio::test]
    async fn test_swap() {
        let (router, _, raw) = setup().await;
        let ctx = CancellationToken::new();

        router.swap(&ctx, "b1", "b2", false).await.unwrap();
        assert_eq!(
            strings(&["b1", "http://10.10.10.10"]),
            record(&raw, "frontend:b1.golang.org").await
        );
        assert_eq!(
            strings(&["b2", "http://127.0.0.1"]),
            record(&raw, "frontend:b2.golang.org").await
        );
    }

    #[tokio::test]
    async fn test_swap_twice_restores() {
        let (router, _, raw) = setup().await;
        let ctx = CancellationToken::new();
        router.set_cname(&ctx, "one.com", "b1").await.unwrap();
        router.set_cname(&ctx, "two.com", "b2").await.unwrap();
        router.set_cname(&ctx, "three.com", "b2").await.unwrap();

        let keys = [
            "frontend:b1.golang.org",
            "frontend:b2.golang.org",
            "frontend:one.com",
            "frontend:two.com",
            "frontend:three.com",
            "cname:b1",
            "cname:b2",
        ];
        let mut before = Vec::new();
        for key in keys {
            before.push(record(&raw, key).await);
        }

        for cname_only in [false, true] {
            router.swap(&ctx, "b1", "b2", cname_only).await.unwrap();
            router.swap(&ctx, "b1", "b2", cname_only).await.unwrap();
            for (key, expected) in keys.iter().zip(&before) {
                assert_eq!(expected, &record(&raw, key).await, "{key}");
            }
        }
    }

    #[tokio::test]
    async fn test_swap_updates_aliases() {
        let (router, _, raw) = setup().await;
        let ctx = CancellationToken::new();
        router.set_cname(&ctx, "one.com", "b1").await.unwrap();
        router.set_cname(&ctx, "two.com", "b2").await.unwrap();
        router.set_cname(&ctx, "three.com", "b2").await.unwrap();

        router.swap(&ctx, "b1", "b2", false).await.unwrap();
        let primary1 = record(&raw, "frontend:b1.golang.org").await;
        let primary2 = record(&raw, "frontend:b2.golang.org").await;
        assert_eq!(primary1, record(&raw, "frontend:one.com").await);
        assert_eq!(primary2, record(&raw, "frontend:two.com").await);
        assert_eq!(primary2, record(&raw, "frontend:three.com").await);
        assert_eq!(strings(&["one.com"]), router.cnames(&ctx, "b1").await.unwrap());
    }

    #[tokio::test]
    async fn test_swap_cname_only_moves_aliases() {
        let (router, _, raw) = setup().await;
        let ctx = CancellationToken::new();
        router.set_cname(&ctx, "one.com", "b1").await.unwrap();

        router.swap(&ctx, "b1", "b2", true).await.unwrap();
        assert_eq!(
            strings(&["b1", "http://10.10.10.10"]),
            record(&raw, "frontend:b1.golang.org").await
        );
        // the alias keeps serving the same addresses, now owned by b2
        assert_eq!(
            strings(&["b2", "http://127.0.0.1"]),
            record(&raw, "frontend:one.com").await
        );
        assert!(router.cnames(&ctx, "b1").await.unwrap().is_empty());
        assert_eq!(strings(&["one.com"]), router.cnames(&ctx, "b2").await.unwrap());
        assert_eq!(
            record(&raw, "frontend:b2.golang.org").await,
            record(&raw, "frontend:one.com").await
        );
    }

    #[tokio::test]
    async fn test_swap_missing_backend() {
        let (router, _, raw) = setup().await;
        let ctx = CancellationToken::new();

        assert_eq!(
            Err(RouterError::BackendNotFound),
            router.swap(&ctx, "b1", "ghost", false).await
        );
        assert_eq!(
            strings(&["b1", "http://127.0.0.1"]),
            record(&raw, "frontend:b1.golang.org").await
        );
    }

    #[tokio::test]
    async fn test_swap_connect_failure() {
        let (router, dialer, _) = setup().await;
        dialer.set_unreachable(SERVER, true);
        let err = router
            .swap(&CancellationToken::new(), "b1", "b2", false)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Connectivity { op: Op::Swap, .. }));
    }
}
