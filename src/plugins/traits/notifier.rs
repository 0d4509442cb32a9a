use async_trait::async_trait;

use crate::Result;
use crate::models::Notification;

/// Delivers a composed notification over some authenticated channel.
///
/// Implementations fail fast; callers do not retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}
