//! Order Events
//!
//! Events emitted by the engine after an operation has been committed. They
//! follow the observer pattern so a presentation layer can refresh only the
//! rows that changed instead of re-reading the whole list.
//!
//! # Event Flow
//!
//! 1. The engine completes an operation, including its rebalance pass
//! 2. The rank journal is committed and yields every rank change it applied
//! 3. One `OrderEvent` per operation is sent on a tokio broadcast channel
//! 4. Subscribers receive it asynchronously; nobody listening is not an error
//!
//! Rolled-back operations emit nothing.

use crate::models::{ItemId, Rank};
use serde::{Deserialize, Serialize};

/// A single committed rank change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankChange {
    pub id: ItemId,
    /// `None` when the row was created by the operation
    pub previous: Option<Rank>,
    pub rank: Rank,
}

/// Committed changes to the ordered collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OrderEvent {
    /// A new item entered the collection
    #[serde(rename_all = "camelCase")]
    ItemInserted {
        id: ItemId,
        position: usize,
        changes: Vec<RankChange>,
    },

    /// An item moved between positions
    #[serde(rename_all = "camelCase")]
    ItemMoved {
        id: ItemId,
        origin: usize,
        destination: usize,
        changes: Vec<RankChange>,
    },

    /// Items left the collection
    #[serde(rename_all = "camelCase")]
    ItemsDeleted { ids: Vec<ItemId> },

    /// A maintenance rebalance rewrote ranks without moving anything
    #[serde(rename_all = "camelCase")]
    RanksRewritten { changes: Vec<RankChange> },
}

impl OrderEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &str {
        match self {
            OrderEvent::ItemInserted { .. } => "item:inserted",
            OrderEvent::ItemMoved { .. } => "item:moved",
            OrderEvent::ItemsDeleted { .. } => "items:deleted",
            OrderEvent::RanksRewritten { .. } => "ranks:rewritten",
        }
    }

    /// Rank changes carried by the event
    pub fn changes(&self) -> &[RankChange] {
        match self {
            OrderEvent::ItemInserted { changes, .. }
            | OrderEvent::ItemMoved { changes, .. }
            | OrderEvent::RanksRewritten { changes } => changes,
            OrderEvent::ItemsDeleted { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Contract test: internally-tagged, camelCase, flat payload
    #[test]
    fn test_order_event_serialization_contract() {
        let id = ItemId::new();
        let event = OrderEvent::ItemMoved {
            id,
            origin: 3,
            destination: 0,
            changes: vec![RankChange {
                id,
                previous: Some(120),
                rank: -40,
            }],
        };

        let parsed = serde_json::to_value(&event).unwrap();

        assert_eq!(parsed.get("type").unwrap(), "itemMoved");
        assert_eq!(parsed.get("origin").unwrap(), 3);
        assert_eq!(parsed.get("destination").unwrap(), 0);
        let change = &parsed.get("changes").unwrap()[0];
        assert_eq!(change.get("previous").unwrap(), 120);
        assert_eq!(change.get("rank").unwrap(), -40);
        assert!(parsed.get("itemMoved").is_none(), "Should NOT be nested");
    }

    #[test]
    fn test_order_event_round_trip() {
        let event = OrderEvent::ItemsDeleted {
            ids: vec![ItemId::new(), ItemId::new()],
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: OrderEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(back, event);
        assert_eq!(back.event_type(), "items:deleted");
        assert!(back.changes().is_empty());
    }
}
