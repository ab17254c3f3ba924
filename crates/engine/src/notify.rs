use std::fmt;

use scimeta_core::{EntityId, EntityKind};
use thiserror::Error;
use tracing::info;

use crate::config::EngineConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
    KeyGenerated,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::KeyGenerated => "key generated",
        })
    }
}

/// One notification for one recipient.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub recipient: String,
    pub kind: EntityKind,
    pub id: EntityId,
    pub change: ChangeKind,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl ChangeEvent {
    pub fn subject(&self) -> String {
        format!("Metadata {} {} {}", self.kind, self.id, self.change)
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery to {recipient} failed: {reason}")]
    Delivery { recipient: String, reason: String },
}

/// Delivers change notifications. Called only after a successful commit.
pub trait Notifier {
    fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError>;
}

/// Writes every notification to the `tracing` stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &ChangeEvent) -> Result<(), NotifyError> {
        info!(
            recipient = %event.recipient,
            kind = %event.kind,
            id = %event.id,
            before = event.before.as_deref().unwrap_or(""),
            after = event.after.as_deref().unwrap_or(""),
            "{}",
            event.subject()
        );
        Ok(())
    }
}

/// A change recorded by a session, not yet addressed to anyone.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PendingChange {
    pub kind: EntityKind,
    pub id: EntityId,
    pub change: ChangeKind,
    pub before: Option<String>,
    pub after: Option<String>,
    /// Address of the person the change concerns, if the entity has one.
    pub contact: Option<String>,
}

impl PendingChange {
    pub fn events(&self, config: &EngineConfig) -> Vec<ChangeEvent> {
        let mut recipients: Vec<&str> = Vec::new();
        if let Some(admin) = config.admin_address.as_deref() {
            recipients.push(admin);
        }
        if config.send_user_messages {
            if let Some(contact) = self.contact.as_deref().filter(|c| !c.is_empty()) {
                if !recipients.contains(&contact) {
                    recipients.push(contact);
                }
            }
        }
        recipients
            .into_iter()
            .map(|recipient| ChangeEvent {
                recipient: recipient.to_string(),
                kind: self.kind,
                id: self.id,
                change: self.change,
                before: self.before.clone(),
                after: self.after.clone(),
            })
            .collect()
    }
}
