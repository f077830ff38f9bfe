/// Out-of-band delivery boundary for password-reset secrets.
///
/// The core only generates and stores the token; delivery belongs to the
/// collaborator behind this trait. Delivery failure must never fail the
/// triggering operation — the service logs and moves on.
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset(
        &self,
        recipient_email: &str,
        raw_token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()>;
}

/// No-op sender for development and testing: logs that a delivery would have
/// happened and drops the token.
pub struct NoopNotifier;

#[async_trait]
impl ResetNotifier for NoopNotifier {
    async fn send_reset(
        &self,
        recipient_email: &str,
        _raw_token: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        tracing::info!(
            recipient = %recipient_email,
            expires_at = %expires_at,
            "reset notifier not configured; dropping reset token"
        );
        Ok(())
    }
}
