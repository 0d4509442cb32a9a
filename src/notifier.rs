use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::Result;
use crate::models::Decision;
use crate::plugins::traits::MailTransport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dispatch {
    Sent { recipients: usize },
    Skipped,
    /// Recorded by callers that swallow the send error.
    Failed { error: String },
}

/// Hands decided notifications to the mail transport.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn MailTransport>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }

    /// Sends the decision's message, if it has one. A failed send is logged
    /// here and returned to the caller; it is never retried.
    pub async fn dispatch(&self, decision: &Decision) -> Result<Dispatch> {
        let Some(notification) = decision.notification() else {
            tracing::debug!("No notification to send");
            return Ok(Dispatch::Skipped);
        };
        let kind = decision.kind();

        match self.transport.send(notification).await {
            Ok(()) => {
                tracing::info!(
                    kind,
                    subject = %notification.subject,
                    recipients = ?notification.recipients,
                    "Notification sent"
                );
                metrics::counter!("fuel_watcher_notifications_total", "kind" => kind, "status" => "sent")
                    .increment(1);
                Ok(Dispatch::Sent {
                    recipients: notification.recipients.len(),
                })
            }
            Err(e) => {
                tracing::error!(
                    kind,
                    subject = %notification.subject,
                    recipients = ?notification.recipients,
                    error = %e,
                    "Failed to send notification"
                );
                metrics::counter!("fuel_watcher_notifications_total", "kind" => kind, "status" => "failed")
                    .increment(1);
                Err(e)
            }
        }
    }
}
