//! In-Memory Ordered Store
//!
//! Reference `OrderedStore` backed by a `BTreeMap` keyed on [`SortKey`], so
//! neighbor reads are range queries and the visible order is the map's
//! iteration order. A secondary index maps ids to their current key.
//!
//! Positional reads walk the map and are linear in the position; that is the
//! same cost profile as an SQL `OFFSET` query.

use crate::db::{OrderedStore, StoreError};
use crate::models::{Item, ItemId, Rank, SortKey};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound::{Excluded, Included, Unbounded};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Rows {
    by_key: BTreeMap<SortKey, Item>,
    keys: HashMap<ItemId, SortKey>,
}

impl Rows {
    fn insert(&mut self, item: Item) -> Result<(), StoreError> {
        if self.keys.contains_key(&item.id) {
            return Err(StoreError::duplicate_item(item.id));
        }
        let key = item.sort_key();
        self.keys.insert(item.id, key);
        self.by_key.insert(key, item);
        Ok(())
    }
}

/// Ordered store held entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Rows>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `items`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateItem` if two items share an id.
    pub fn seed(items: impl IntoIterator<Item = Item>) -> Result<Self, StoreError> {
        let mut rows = Rows::default();
        for item in items {
            rows.insert(item)?;
        }
        Ok(Self {
            rows: RwLock::new(rows),
        })
    }
}

#[async_trait]
impl OrderedStore for MemoryStore {
    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.rows.read().await.by_key.len())
    }

    async fn get_item(&self, id: &ItemId) -> Result<Option<Item>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .keys
            .get(id)
            .and_then(|key| rows.by_key.get(key))
            .cloned())
    }

    async fn insert_item(&self, item: Item) -> Result<(), StoreError> {
        self.rows.write().await.insert(item)
    }

    async fn delete_item(&self, id: &ItemId) -> Result<Option<Item>, StoreError> {
        let mut rows = self.rows.write().await;
        Ok(match rows.keys.remove(id) {
            Some(key) => rows.by_key.remove(&key),
            None => None,
        })
    }

    async fn write_rank(&self, id: &ItemId, rank: Rank) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        let key = rows
            .keys
            .get(id)
            .copied()
            .ok_or_else(|| StoreError::item_not_found(*id))?;
        let mut item = rows
            .by_key
            .remove(&key)
            .ok_or_else(|| StoreError::backend(format!("index out of sync for item {}", id)))?;

        item.rank = rank;
        let new_key = item.sort_key();
        rows.keys.insert(*id, new_key);
        rows.by_key.insert(new_key, item);
        Ok(())
    }

    async fn item_at_position(&self, position: usize) -> Result<Option<Item>, StoreError> {
        Ok(self.rows.read().await.by_key.values().nth(position).cloned())
    }

    async fn item_before(&self, key: &SortKey) -> Result<Option<Item>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .by_key
            .range((Unbounded, Excluded(*key)))
            .next_back()
            .map(|(_, item)| item.clone()))
    }

    async fn item_after(&self, key: &SortKey) -> Result<Option<Item>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .by_key
            .range((Excluded(*key), Unbounded))
            .next()
            .map(|(_, item)| item.clone()))
    }

    async fn items_with_rank_at_most(
        &self,
        max_rank: Rank,
        limit: usize,
    ) -> Result<Vec<Item>, StoreError> {
        let rows = self.rows.read().await;
        let upper = SortKey::highest_with_rank(max_rank);
        Ok(rows
            .by_key
            .range((Unbounded, Included(upper)))
            .rev()
            .take(limit)
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn items_with_rank(&self, rank: Rank) -> Result<Vec<Item>, StoreError> {
        let rows = self.rows.read().await;
        let lower = SortKey::lowest_with_rank(rank);
        let upper = SortKey::highest_with_rank(rank);
        Ok(rows
            .by_key
            .range((Included(lower), Included(upper)))
            .map(|(_, item)| item.clone())
            .collect())
    }

    async fn list_items(&self) -> Result<Vec<Item>, StoreError> {
        Ok(self.rows.read().await.by_key.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranks(items: &[Item]) -> Vec<Rank> {
        items.iter().map(|item| item.rank).collect()
    }

    #[tokio::test]
    async fn test_positions_follow_rank_order() {
        let store =
            MemoryStore::seed([Item::with_rank(30), Item::with_rank(-10), Item::with_rank(5)])
                .unwrap();

        assert_eq!(store.len().await.unwrap(), 3);
        assert_eq!(store.item_at_position(0).await.unwrap().unwrap().rank, -10);
        assert_eq!(store.item_at_position(2).await.unwrap().unwrap().rank, 30);
        assert!(store.item_at_position(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_rank_reorders_immediately() {
        let a = Item::with_rank(0);
        let b = Item::with_rank(100);
        let store = MemoryStore::seed([a.clone(), b.clone()]).unwrap();

        store.write_rank(&a.id, 200).await.unwrap();

        let listed = store.list_items().await.unwrap();
        assert_eq!(listed[0].id, b.id);
        assert_eq!(listed[1].id, a.id);
        assert_eq!(store.get_item(&a.id).await.unwrap().unwrap().rank, 200);
    }

    #[tokio::test]
    async fn test_write_rank_unknown_item() {
        let store = MemoryStore::new();
        let missing = ItemId::new();

        let err = store.write_rank(&missing, 1).await.unwrap_err();
        assert_eq!(err, StoreError::item_not_found(missing));
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let item = Item::with_rank(1);
        let store = MemoryStore::new();
        store.insert_item(item.clone()).await.unwrap();

        let err = store.insert_item(item.clone()).await.unwrap_err();
        assert_eq!(err, StoreError::duplicate_item(item.id));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_neighbor_reads_skip_the_key_itself() {
        let low = Item::with_rank(-1);
        let mid = Item::with_rank(4);
        let high = Item::with_rank(9);
        let store = MemoryStore::seed([low.clone(), mid.clone(), high.clone()]).unwrap();

        let before = store.item_before(&mid.sort_key()).await.unwrap().unwrap();
        let after = store.item_after(&mid.sort_key()).await.unwrap().unwrap();
        assert_eq!(before.id, low.id);
        assert_eq!(after.id, high.id);
        assert!(store.item_before(&low.sort_key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rank_neighbor_queries() {
        let store = MemoryStore::seed([
            Item::with_rank(-20),
            Item::with_rank(0),
            Item::with_rank(0),
            Item::with_rank(15),
        ])
        .unwrap();

        let at_most = store.first_item_with_rank_at_most(0).await.unwrap().unwrap();
        assert_eq!(at_most.rank, 0);
        let above = store.first_item_with_rank_above(0).await.unwrap().unwrap();
        assert_eq!(above.rank, 15);
        assert!(store.first_item_with_rank_above(15).await.unwrap().is_none());
        assert!(store.first_item_with_rank_at_most(-21).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_head_region_scan_is_descending_and_limited() {
        let store = MemoryStore::seed([
            Item::with_rank(-30),
            Item::with_rank(-20),
            Item::with_rank(-10),
            Item::with_rank(0),
            Item::with_rank(10),
        ])
        .unwrap();

        let region = store.items_with_rank_at_most(0, 3).await.unwrap();
        assert_eq!(ranks(&region), vec![0, -10, -20]);
    }

    #[tokio::test]
    async fn test_items_with_rank_finds_collisions() {
        let store = MemoryStore::seed([
            Item::with_rank(7),
            Item::with_rank(7),
            Item::with_rank(8),
        ])
        .unwrap();

        assert_eq!(store.items_with_rank(7).await.unwrap().len(), 2);
        assert_eq!(store.items_with_rank(8).await.unwrap().len(), 1);
        assert!(store.items_with_rank(6).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_item() {
        let item = Item::with_rank(3);
        let store = MemoryStore::seed([item.clone()]).unwrap();

        let removed = store.delete_item(&item.id).await.unwrap();
        assert_eq!(removed.map(|i| i.id), Some(item.id));
        assert!(store.delete_item(&item.id).await.unwrap().is_none());
        assert_eq!(store.len().await.unwrap(), 0);
    }
}
