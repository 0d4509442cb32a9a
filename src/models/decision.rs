use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A composed message ready to hand to a mail transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub recipients: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "decision", content = "notification", rename_all = "snake_case")]
pub enum Decision {
    /// Threshold crossed; goes to the configured recipients.
    Notify(Notification),
    /// Operational failure; goes to the admin address only.
    AdminAlert(Notification),
    NoAction,
}

impl Decision {
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            Decision::Notify(notification) | Decision::AdminAlert(notification) => Some(notification),
            Decision::NoAction => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Decision::Notify(_) => "notify",
            Decision::AdminAlert(_) => "admin_alert",
            Decision::NoAction => "no_action",
        }
    }
}
