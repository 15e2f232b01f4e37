//! Neighbor resolution
//!
//! Translates positions in the visible order into the concrete items that
//! bracket an insertion or a move. This is the only place that does index
//! arithmetic on positions; everything downstream works with items.
//!
//! # Move convention
//!
//! `destination` is the index the moved item will occupy in the post-move
//! order, exactly like `Vec::remove(origin)` followed by
//! `Vec::insert(destination, item)`. While the bounds are resolved the item
//! still sits at `origin`, so the two directions differ by one:
//!
//! - toward the head (`destination < origin`): bounds are the pre-move rows at
//!   `destination - 1` and `destination`
//! - toward the tail (`destination > origin`): bounds are the pre-move rows at
//!   `destination` and `destination + 1`
//!
//! Either way the moving item's own row is never one of its bounds.

use crate::db::{OrderedStore, StoreError};
use crate::models::{Item, ItemId, Rank, CANONICAL_RANK};
use crate::ordering::OrderError;
use std::collections::HashSet;

/// The items immediately before and after a gap in the visible order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bounds {
    pub lower: Option<Item>,
    pub upper: Option<Item>,
}

impl Bounds {
    pub fn lower_rank(&self) -> Option<Rank> {
        self.lower.as_ref().map(|item| item.rank)
    }

    pub fn upper_rank(&self) -> Option<Rank> {
        self.upper.as_ref().map(|item| item.rank)
    }

    /// The bounding items that exist, in visible order
    pub fn items(&self) -> Vec<Item> {
        self.lower.iter().chain(self.upper.iter()).cloned().collect()
    }
}

/// Resolves neighbors through an [`OrderedStore`]
pub struct NeighborResolver<'a, S: OrderedStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: OrderedStore + ?Sized> NeighborResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// First item of the visible order
    pub async fn head(&self) -> Result<Option<Item>, OrderError> {
        self.item_at(0).await
    }

    pub async fn item_at(&self, position: usize) -> Result<Option<Item>, OrderError> {
        Ok(self.store.item_at_position(position).await?)
    }

    /// Item at a position that is known to be in range
    async fn required_at(&self, position: usize) -> Result<Item, OrderError> {
        self.item_at(position)
            .await?
            .ok_or_else(|| OrderError::neighbor_resolution_failed(position))
    }

    pub async fn get(&self, id: &ItemId) -> Result<Option<Item>, OrderError> {
        Ok(self.store.get_item(id).await?)
    }

    /// Re-read an item by id after its rank may have been rewritten
    pub async fn reload(&self, item: &Item) -> Result<Item, OrderError> {
        self.store
            .get_item(&item.id)
            .await?
            .ok_or_else(|| OrderError::StoreReadFailed(StoreError::item_not_found(item.id)))
    }

    /// Re-read both bounds by id
    pub async fn reload_bounds(&self, bounds: &Bounds) -> Result<Bounds, OrderError> {
        let lower = match &bounds.lower {
            Some(item) => Some(self.reload(item).await?),
            None => None,
        };
        let upper = match &bounds.upper {
            Some(item) => Some(self.reload(item).await?),
            None => None,
        };
        Ok(Bounds { lower, upper })
    }

    /// Bounds for a new item that will occupy `position`
    ///
    /// `position` may equal the collection length (append after the tail).
    pub async fn bounds_for_insert_at(&self, position: usize) -> Result<Bounds, OrderError> {
        let lower = match position.checked_sub(1) {
            Some(before) => Some(self.required_at(before).await?),
            None => None,
        };
        let upper = self.item_at(position).await?;
        Ok(Bounds { lower, upper })
    }

    /// Bounds for moving the item at `origin` so it ends up at `destination`
    ///
    /// Both positions must be in range and different.
    pub async fn bounds_for_move_to(
        &self,
        origin: usize,
        destination: usize,
    ) -> Result<Bounds, OrderError> {
        if origin == destination {
            return Err(OrderError::invalid_request(
                "origin and destination are the same position",
            ));
        }

        if destination < origin {
            let lower = match destination.checked_sub(1) {
                Some(before) => Some(self.required_at(before).await?),
                None => None,
            };
            let upper = Some(self.required_at(destination).await?);
            Ok(Bounds { lower, upper })
        } else {
            let lower = Some(self.required_at(destination).await?);
            let upper = self.item_at(destination + 1).await?;
            Ok(Bounds { lower, upper })
        }
    }

    /// Items at or below the canonical rank, nearest to it first
    pub async fn head_region(&self, limit: usize) -> Result<Vec<Item>, OrderError> {
        Ok(self
            .store
            .items_with_rank_at_most(CANONICAL_RANK, limit)
            .await?)
    }

    /// Every item sharing `item`'s exact rank (itself included), minus `skip`
    pub async fn same_rank(
        &self,
        item: &Item,
        skip: &HashSet<ItemId>,
    ) -> Result<Vec<Item>, OrderError> {
        Ok(self
            .store
            .items_with_rank(item.rank)
            .await?
            .into_iter()
            .filter(|other| !skip.contains(&other.id))
            .collect())
    }

    /// Nearest item before `item` in visible order, stepping over `skip`
    pub async fn predecessor(
        &self,
        item: &Item,
        skip: &HashSet<ItemId>,
    ) -> Result<Option<Item>, OrderError> {
        let mut key = item.sort_key();
        loop {
            match self.store.item_before(&key).await? {
                Some(found) if skip.contains(&found.id) => key = found.sort_key(),
                other => return Ok(other),
            }
        }
    }

    /// Nearest item after `item` in visible order, stepping over `skip`
    pub async fn successor(
        &self,
        item: &Item,
        skip: &HashSet<ItemId>,
    ) -> Result<Option<Item>, OrderError> {
        let mut key = item.sort_key();
        loop {
            match self.store.item_after(&key).await? {
                Some(found) if skip.contains(&found.id) => key = found.sort_key(),
                other => return Ok(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    /// Five items ranked 0, 100, 200, 300, 400
    fn five_items() -> (MemoryStore, Vec<Item>) {
        let items: Vec<Item> = (0..5).map(|i| Item::with_rank(i * 100)).collect();
        let store = MemoryStore::seed(items.clone()).unwrap();
        (store, items)
    }

    fn ids(bounds: &Bounds) -> (Option<ItemId>, Option<ItemId>) {
        (
            bounds.lower.as_ref().map(|i| i.id),
            bounds.upper.as_ref().map(|i| i.id),
        )
    }

    #[tokio::test]
    async fn test_insert_bounds() {
        let (store, items) = five_items();
        let resolver = NeighborResolver::new(&store);

        let at_head = resolver.bounds_for_insert_at(0).await.unwrap();
        assert_eq!(ids(&at_head), (None, Some(items[0].id)));

        let middle = resolver.bounds_for_insert_at(2).await.unwrap();
        assert_eq!(ids(&middle), (Some(items[1].id), Some(items[2].id)));

        let append = resolver.bounds_for_insert_at(5).await.unwrap();
        assert_eq!(ids(&append), (Some(items[4].id), None));
    }

    #[tokio::test]
    async fn test_insert_past_end_fails() {
        let (store, _) = five_items();
        let resolver = NeighborResolver::new(&store);

        assert!(matches!(
            resolver.bounds_for_insert_at(7).await,
            Err(OrderError::NeighborResolutionFailed { position: 6 })
        ));
    }

    #[tokio::test]
    async fn test_move_toward_head_bounds() {
        let (store, items) = five_items();
        let resolver = NeighborResolver::new(&store);

        // [0 1 2 3 4] move 3 -> 1 gives [0 3 1 2 4]
        let bounds = resolver.bounds_for_move_to(3, 1).await.unwrap();
        assert_eq!(ids(&bounds), (Some(items[0].id), Some(items[1].id)));

        // move 4 -> 0 gives [4 0 1 2 3]
        let bounds = resolver.bounds_for_move_to(4, 0).await.unwrap();
        assert_eq!(ids(&bounds), (None, Some(items[0].id)));
    }

    #[tokio::test]
    async fn test_move_toward_tail_bounds() {
        let (store, items) = five_items();
        let resolver = NeighborResolver::new(&store);

        // [0 1 2 3 4] move 1 -> 3 gives [0 2 3 1 4]
        let bounds = resolver.bounds_for_move_to(1, 3).await.unwrap();
        assert_eq!(ids(&bounds), (Some(items[3].id), Some(items[4].id)));

        // move 0 -> 4 gives [1 2 3 4 0]
        let bounds = resolver.bounds_for_move_to(0, 4).await.unwrap();
        assert_eq!(ids(&bounds), (Some(items[4].id), None));
    }

    #[tokio::test]
    async fn test_adjacent_moves_never_bound_on_self() {
        let (store, items) = five_items();
        let resolver = NeighborResolver::new(&store);

        let down = resolver.bounds_for_move_to(2, 3).await.unwrap();
        assert_eq!(ids(&down), (Some(items[3].id), Some(items[4].id)));

        let up = resolver.bounds_for_move_to(2, 1).await.unwrap();
        assert_eq!(ids(&up), (Some(items[0].id), Some(items[1].id)));
    }

    #[tokio::test]
    async fn test_same_position_move_rejected() {
        let (store, _) = five_items();
        let resolver = NeighborResolver::new(&store);

        assert!(matches!(
            resolver.bounds_for_move_to(2, 2).await,
            Err(OrderError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_neighbors_step_over_skipped_items() {
        let (store, items) = five_items();
        let resolver = NeighborResolver::new(&store);
        let skip: HashSet<ItemId> = [items[1].id, items[3].id].into_iter().collect();

        let next = resolver.successor(&items[0], &skip).await.unwrap();
        assert_eq!(next.map(|i| i.id), Some(items[2].id));

        let prev = resolver.predecessor(&items[4], &skip).await.unwrap();
        assert_eq!(prev.map(|i| i.id), Some(items[2].id));

        let none = resolver.predecessor(&items[0], &skip).await.unwrap();
        assert!(none.is_none());
    }
}
