//! Core enums and identifiers.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Identifier of a store (tenant-scoped).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreId(String);

impl StoreId {
    /// Creates a store id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for StoreId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Kind of local entity a queue item or article refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Spaces (shelves, desks, rooms rendered on labels).
    Spaces,
    /// People.
    People,
    /// Conference rooms.
    Conference,
}

impl EntityType {
    /// Every entity type, in wire order.
    pub const ALL: [EntityType; 3] = [EntityType::Spaces, EntityType::People, EntityType::Conference];

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Spaces => "spaces",
            EntityType::People => "people",
            EntityType::Conference => "conference",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spaces" => Ok(EntityType::Spaces),
            "people" => Ok(EntityType::People),
            "conference" => Ok(EntityType::Conference),
            other => Err(ProtocolError::UnknownValue {
                kind: "entity type",
                value: other.to_string(),
            }),
        }
    }
}

/// Mutation carried by a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    /// Entity was created locally.
    Create,
    /// Entity was updated locally.
    Update,
    /// Entity was deleted locally.
    Delete,
    /// A label was bound to the entity's article.
    Link,
    /// A label was unbound from the entity's article.
    Unlink,
}

impl SyncAction {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncAction::Create => "create",
            SyncAction::Update => "update",
            SyncAction::Delete => "delete",
            SyncAction::Link => "link",
            SyncAction::Unlink => "unlink",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(SyncAction::Create),
            "update" => Ok(SyncAction::Update),
            "delete" => Ok(SyncAction::Delete),
            "link" => Ok(SyncAction::Link),
            "unlink" => Ok(SyncAction::Unlink),
            other => Err(ProtocolError::UnknownValue {
                kind: "sync action",
                value: other.to_string(),
            }),
        }
    }
}

/// Lifecycle status of a queue item.
///
/// Items only move forward:
/// `Pending → Processing → {Completed | Pending (retry) | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Waiting to be attempted once `scheduledAt` has passed.
    Pending,
    /// Leased by exactly one worker.
    Processing,
    /// Accepted by the external system.
    Completed,
    /// Rejected permanently or out of retries.
    Failed,
}

impl QueueStatus {
    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }

    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Completed | QueueStatus::Failed)
    }

    /// Returns true if an item may move from `self` to `next`.
    pub fn can_transition_to(&self, next: QueueStatus) -> bool {
        matches!(
            (self, next),
            (QueueStatus::Pending, QueueStatus::Processing)
                | (QueueStatus::Processing, QueueStatus::Completed)
                | (QueueStatus::Processing, QueueStatus::Pending)
                | (QueueStatus::Processing, QueueStatus::Failed)
        )
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            other => Err(ProtocolError::UnknownValue {
                kind: "queue status",
                value: other.to_string(),
            }),
        }
    }
}

/// Kind of sync cycle requested by a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    /// Pull then push.
    Full,
    /// Drain the outbound queue only.
    Push,
    /// Reconcile remote articles only.
    Pull,
}

impl SyncType {
    /// Returns true if the cycle includes a pull phase.
    pub fn includes_pull(&self) -> bool {
        matches!(self, SyncType::Full | SyncType::Pull)
    }

    /// Returns true if the cycle includes a push phase.
    pub fn includes_push(&self) -> bool {
        matches!(self, SyncType::Full | SyncType::Push)
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncType::Full => "full",
            SyncType::Push => "push",
            SyncType::Pull => "pull",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_only_move_forward() {
        use QueueStatus::*;

        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Pending));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn terminal_statuses() {
        assert!(QueueStatus::Completed.is_terminal());
        assert!(QueueStatus::Failed.is_terminal());
        assert!(!QueueStatus::Pending.is_terminal());
        assert!(!QueueStatus::Processing.is_terminal());
    }

    #[test]
    fn wire_names_parse_back() {
        for ty in EntityType::ALL {
            assert_eq!(ty.as_str().parse::<EntityType>().unwrap(), ty);
        }
        assert_eq!("unlink".parse::<SyncAction>().unwrap(), SyncAction::Unlink);
        assert!("shelf".parse::<EntityType>().is_err());
    }

    #[test]
    fn serde_uses_lowercase() {
        let json = serde_json::to_string(&EntityType::Conference).unwrap();
        assert_eq!(json, "\"conference\"");
        let action: SyncAction = serde_json::from_str("\"link\"").unwrap();
        assert_eq!(action, SyncAction::Link);
    }

    #[test]
    fn sync_type_phases() {
        assert!(SyncType::Full.includes_pull() && SyncType::Full.includes_push());
        assert!(!SyncType::Push.includes_pull());
        assert!(!SyncType::Pull.includes_push());
    }

    #[test]
    fn blank_store_id() {
        assert!(StoreId::new("  ").is_blank());
        assert!(!StoreId::from("store-1").is_blank());
    }
}
