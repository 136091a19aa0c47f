use log::debug;
use tokio_util::sync::CancellationToken;

use super::{tls_key, HipacheRouter, CERTIFICATE_FIELD, KEY_FIELD};
use crate::core::error::{ErrorContext, Op, RouterError, RouterResult};

impl HipacheRouter {
    pub(super) async fn store_certificate(
        &self,
        ctx: &CancellationToken,
        hostname: &str,
        certificate: &str,
        key: &str,
    ) -> RouterResult<()> {
        let store = self.connect(ctx, Op::Certificate).await?;
        store
            .hash_set(
                ctx,
                &tls_key(hostname),
                &[
                    (CERTIFICATE_FIELD, certificate.to_string()),
                    (KEY_FIELD, key.to_string()),
                ],
            )
            .await
            .with_op(Op::Certificate)?;
        debug!("Stored certificate for {hostname}");
        Ok(())
    }

    pub(super) async fn delete_certificate(
        &self,
        ctx: &CancellationToken,
        hostname: &str,
    ) -> RouterResult<()> {
        let store = self.connect(ctx, Op::Certificate).await?;
        store
            .delete(ctx, &[tls_key(hostname)])
            .await
            .with_op(Op::Certificate)?;
        Ok(())
    }

    pub(super) async fn load_certificate(
        &self,
        ctx: &CancellationToken,
        hostname: &str,
    ) -> RouterResult<String> {
        let store = self.connect(ctx, Op::Certificate).await?;
        store
            .hash_get(ctx, &tls_key(hostname), &[CERTIFICATE_FIELD])
            .await
            .with_op(Op::Certificate)?
            .into_iter()
            .next()
            .flatten()
            .ok_or(RouterError::CertificateNotFound)
    }
}
