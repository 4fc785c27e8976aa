//! Change notifications published to an injected event bus.
//!
//! # Invariants
//! - Notifications are published only after the write they describe has
//!   been applied.
//! - Equal-value writes publish nothing.

use crate::model::data::Data;
use crate::model::item::ItemUid;
use log::debug;

/// Change notification emitted by item operations.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseEvent {
    /// An attribute changed value. `new` is `Data::Null` after removal.
    AttributeModified {
        item_uid: ItemUid,
        id: String,
        old: Data,
        new: Data,
    },
    /// The datasource was set or removed; revision 0 means removed.
    ///
    /// Subscribers must drop anything derived from the previous datasource.
    DatasourceModified { item_uid: ItemUid, revision: i64 },
    /// The item was deleted, either directly or as part of a subtree.
    ItemRemoved { item_uid: ItemUid },
}

impl CaseEvent {
    /// Bus topic the event is published under.
    pub fn topic(&self) -> &'static str {
        match self {
            Self::AttributeModified { .. } => "attribute-modified",
            Self::DatasourceModified { .. } => "datasource-modified",
            Self::ItemRemoved { .. } => "item-removed",
        }
    }

    pub fn item_uid(&self) -> ItemUid {
        match self {
            Self::AttributeModified { item_uid, .. }
            | Self::DatasourceModified { item_uid, .. }
            | Self::ItemRemoved { item_uid } => *item_uid,
        }
    }
}

/// Event bus seam. Implementations must not call back into the case.
pub trait EventPublisher {
    fn publish(&self, event: &CaseEvent);
}

/// Publisher that only logs the topic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, event: &CaseEvent) {
        debug!(
            "event=publish module=service status=dropped topic={} uid={}",
            event.topic(),
            event.item_uid()
        );
    }
}
