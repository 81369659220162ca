//! Collapsing of queued mutations for the same entity.
//!
//! When an entity is mutated several times before a push cycle runs, the
//! newest mutation is compared against the most recent still-pending item for
//! the same `(storeId, entityType, entityId)`. The result tells the queue
//! store whether to append, rewrite the pending item, or drop both.
//!
//! An item that has already been attempted (`retryCount > 0`) may have reached
//! the external system despite reporting a failure, so it is never cancelled;
//! at most it is rewritten.

use crate::queue::{NewQueueItem, SyncQueueItem};
use crate::types::{QueueStatus, SyncAction};

/// How a new mutation interacts with an existing pending one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Supersession {
    /// Independent mutations; append the new item.
    Append,
    /// Rewrite the pending item with this action and the new payload.
    Replace {
        /// Action the pending item carries afterwards.
        action: SyncAction,
    },
    /// The mutations cancel out; remove the pending item and drop the new one.
    Cancel,
    /// The new mutation repeats the pending one; drop it.
    Duplicate,
}

/// Decides how `incoming` combines with `pending`.
///
/// `pending` must be the newest queued item for the same entity; anything not
/// in `Pending` status yields [`Supersession::Append`].
pub fn supersede(pending: &SyncQueueItem, incoming: &NewQueueItem) -> Supersession {
    use SyncAction::*;

    if pending.status != QueueStatus::Pending
        || !pending.same_entity(&incoming.store_id, incoming.entity_type, &incoming.entity_id)
    {
        return Supersession::Append;
    }

    let untouched = pending.retry_count == 0;
    let same_payload = pending.payload == incoming.payload;

    match (pending.action, incoming.action) {
        (Create, Create) | (Create, Update) => Supersession::Replace { action: Create },
        (Create, Delete) if untouched => Supersession::Cancel,
        (Create, Delete) => Supersession::Replace { action: Delete },
        (Update, Update) => Supersession::Replace { action: Update },
        (Update, Delete) => Supersession::Replace { action: Delete },
        (Delete, Delete) => Supersession::Duplicate,
        (Link, Unlink) | (Unlink, Link) if same_payload && untouched => Supersession::Cancel,
        (Link, Link) | (Unlink, Unlink) if same_payload => Supersession::Duplicate,
        _ => Supersession::Append,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;
    use proptest::prelude::*;
    use serde_json::json;

    fn pending(action: SyncAction, payload: serde_json::Value) -> SyncQueueItem {
        SyncQueueItem::from_new(
            NewQueueItem::new("s1", EntityType::Spaces, "e1", action, payload),
            1,
            0,
        )
    }

    fn incoming(action: SyncAction, payload: serde_json::Value) -> NewQueueItem {
        NewQueueItem::new("s1", EntityType::Spaces, "e1", action, payload)
    }

    #[test]
    fn delete_cancels_unpushed_create() {
        let existing = pending(SyncAction::Create, json!({"name": "A"}));
        let next = incoming(SyncAction::Delete, json!(null));
        assert_eq!(supersede(&existing, &next), Supersession::Cancel);
    }

    #[test]
    fn delete_after_attempted_create_is_kept() {
        let mut existing = pending(SyncAction::Create, json!({"name": "A"}));
        existing.retry_count = 1;
        let next = incoming(SyncAction::Delete, json!(null));
        assert_eq!(
            supersede(&existing, &next),
            Supersession::Replace {
                action: SyncAction::Delete
            }
        );
    }

    #[test]
    fn update_folds_into_pending_create() {
        let existing = pending(SyncAction::Create, json!({"name": "A"}));
        let next = incoming(SyncAction::Update, json!({"name": "B"}));
        assert_eq!(
            supersede(&existing, &next),
            Supersession::Replace {
                action: SyncAction::Create
            }
        );
    }

    #[test]
    fn link_unlink_same_label_cancels() {
        let label = json!({"labelCode": "L-100"});
        let existing = pending(SyncAction::Link, label.clone());
        assert_eq!(
            supersede(&existing, &incoming(SyncAction::Unlink, label.clone())),
            Supersession::Cancel
        );
        assert_eq!(
            supersede(&existing, &incoming(SyncAction::Link, label)),
            Supersession::Duplicate
        );
    }

    #[test]
    fn link_unlink_different_labels_append() {
        let existing = pending(SyncAction::Link, json!({"labelCode": "L-100"}));
        let next = incoming(SyncAction::Unlink, json!({"labelCode": "L-200"}));
        assert_eq!(supersede(&existing, &next), Supersession::Append);
    }

    #[test]
    fn recreate_after_delete_appends() {
        let existing = pending(SyncAction::Delete, json!(null));
        let next = incoming(SyncAction::Create, json!({"name": "A"}));
        assert_eq!(supersede(&existing, &next), Supersession::Append);
    }

    #[test]
    fn other_entities_and_leased_items_are_untouched() {
        let existing = pending(SyncAction::Create, json!({}));
        let other = NewQueueItem::new("s1", EntityType::People, "e1", SyncAction::Delete, json!(null));
        assert_eq!(supersede(&existing, &other), Supersession::Append);

        let mut leased = pending(SyncAction::Create, json!({}));
        leased.status = QueueStatus::Processing;
        assert_eq!(
            supersede(&leased, &incoming(SyncAction::Delete, json!(null))),
            Supersession::Append
        );
    }

    fn action_strategy() -> impl Strategy<Value = SyncAction> {
        prop_oneof![
            Just(SyncAction::Create),
            Just(SyncAction::Update),
            Just(SyncAction::Delete),
            Just(SyncAction::Link),
            Just(SyncAction::Unlink),
        ]
    }

    proptest! {
        #[test]
        fn attempted_items_are_never_cancelled(
            first in action_strategy(),
            second in action_strategy(),
            retries in 1u32..10,
        ) {
            let mut existing = pending(first, json!({"labelCode": "L-1"}));
            existing.retry_count = retries;
            let next = incoming(second, json!({"labelCode": "L-1"}));
            prop_assert_ne!(supersede(&existing, &next), Supersession::Cancel);
        }
    }
}
