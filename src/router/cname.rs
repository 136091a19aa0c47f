use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::{cname_key, frontend_key, HipacheRouter};
use crate::{
    core::error::{ErrorContext, Op, RouterError, RouterResult, StoreResult},
    store::Store,
};

static CNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\*\.)?[a-zA-Z0-9][\w\-.]+$").expect("CNAME pattern compiles")
});

/// Aliases recorded for `app`, empty when it has none.
pub(super) async fn read_cnames(
    store: &dyn Store,
    ctx: &CancellationToken,
    app: &str,
) -> StoreResult<Vec<String>> {
    store.list_range(ctx, &cname_key(app)).await
}

/// An alias must look like a hostname and must not live under the router's own domain.
fn valid_cname(cname: &str, domain: &str) -> bool {
    CNAME_REGEX.is_match(cname) && !cname.ends_with(domain)
}

impl HipacheRouter {
    pub(super) async fn attach_cname(
        &self,
        ctx: &CancellationToken,
        cname: &str,
        app: &str,
    ) -> RouterResult<()> {
        if !valid_cname(cname, self.domain(Op::SetCName)?) {
            return Err(RouterError::CNameNotAllowed(cname.to_string()));
        }
        let frontend = frontend_key(&self.hostname(Op::SetCName, app)?);
        let alias = frontend_key(cname);
        let store = self.connect(ctx, Op::SetCName).await?;

        let primary = store.list_range(ctx, &frontend).await.with_op(Op::SetCName)?;
        if primary.is_empty() {
            return Err(RouterError::BackendNotFound);
        }
        let (current, cnames) = futures::try_join!(
            store.list_range(ctx, &alias),
            read_cnames(&*store, ctx, app)
        )
        .with_op(Op::SetCName)?;
        let listed = cnames.iter().any(|c| c == cname);

        if current.is_empty() {
            store
                .replace_lists(ctx, &[(alias, primary)])
                .await
                .with_op(Op::SetCName)?;
            if !listed {
                store
                    .list_push(ctx, &cname_key(app), &[cname.to_string()])
                    .await
                    .with_op(Op::SetCName)?;
            }
            debug!("Set cname {cname} for {app}");
            return Ok(());
        }

        if current.first().map(String::as_str) != Some(app) && !listed {
            // owned by another app, leave it alone
            return Err(RouterError::CNameExists);
        }
        if !listed {
            store
                .list_push(ctx, &cname_key(app), &[cname.to_string()])
                .await
                .with_op(Op::SetCName)?;
        }
        self.reconcile_cname(ctx, cname, app).await?;
        Err(RouterError::CNameExists)
    }

    /// Rewrites the alias record of `cname` to equal `app`'s primary record.
    ///
    /// Returns whether anything had to be rewritten.
    pub async fn reconcile_cname(
        &self,
        ctx: &CancellationToken,
        cname: &str,
        app: &str,
    ) -> RouterResult<bool> {
        let frontend = frontend_key(&self.hostname(Op::SetCName, app)?);
        let alias = frontend_key(cname);
        let store = self.connect(ctx, Op::SetCName).await?;

        let (primary, current) = futures::try_join!(
            store.list_range(ctx, &frontend),
            store.list_range(ctx, &alias)
        )
        .with_op(Op::SetCName)?;
        if primary.is_empty() {
            return Err(RouterError::BackendNotFound);
        }
        if primary == current {
            return Ok(false);
        }

        warn!(
            "cname {cname} drifted from {app}: found {} entries, expected {}, rewriting",
            current.len(),
            primary.len()
        );
        store
            .replace_lists(ctx, &[(alias, primary)])
            .await
            .with_op(Op::SetCName)?;
        Ok(true)
    }

    pub(super) async fn detach_cname(
        &self,
        ctx: &CancellationToken,
        cname: &str,
        app: &str,
    ) -> RouterResult<()> {
        let alias = frontend_key(cname);
        let store = self.connect(ctx, Op::UnsetCName).await?;

        store
            .list_remove(ctx, &cname_key(app), cname)
            .await
            .with_op(Op::UnsetCName)?;
        let current = store.list_range(ctx, &alias).await.with_op(Op::UnsetCName)?;
        match current.first() {
            Some(owner) if owner != app => {
                debug!("cname {cname} belongs to {owner}, keeping its record");
            }
            _ => {
                store
                    .delete(ctx, &[alias])
                    .await
                    .with_op(Op::UnsetCName)?;
                debug!("Unset cname {cname} for {app}");
            }
        }
        Ok(())
    }
}
