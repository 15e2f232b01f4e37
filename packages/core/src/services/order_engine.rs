//! Order-Maintenance Engine
//!
//! The facade the presentation layer calls to insert, move and delete items.
//! Each operation resolves neighbors, allocates a rank between them, writes
//! it, and repairs the neighborhood if it has become too dense, all while
//! holding one lock so the next operation never observes a half-finished
//! one.
//!
//! # Atomicity
//!
//! Stores only promise per-row atomic writes. Every write an operation makes
//! goes through a [`RankJournal`]; on failure the journal is rolled back
//! before the error is returned, so a failed operation leaves the collection
//! exactly as it was. Events are emitted only for committed operations.
//!
//! # Examples
//!
//! ```rust
//! use sortorder_core::db::MemoryStore;
//! use sortorder_core::models::Item;
//! use sortorder_core::ordering::OrderingConfig;
//! use sortorder_core::services::OrderEngine;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = OrderEngine::new(Arc::new(MemoryStore::new()), OrderingConfig::default())?;
//!
//! let a = engine.insert_at_end(Item::new()).await?;
//! let b = engine.insert_at_end(Item::new()).await?;
//! assert!(b.rank < a.rank);
//!
//! engine.move_item(&a.id, 1, 0).await?;
//! let order: Vec<_> = engine.visible_order().await?.into_iter().map(|i| i.id).collect();
//! assert_eq!(order, vec![a.id, b.id]);
//! # Ok(())
//! # }
//! ```

use crate::db::{OrderEvent, OrderedStore, RankChange};
use crate::models::{Item, ItemId, CANONICAL_RANK};
use crate::ordering::{
    Bounds, NeighborResolver, OrderError, OrderingConfig, RankAllocator, RankJournal,
    RebalanceMode, RebalanceReport, Rebalancer,
};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Subscriber capacity of the order event channel
pub const ORDER_EVENT_CHANNEL_CAPACITY: usize = 128;

/// How the placed item reaches the store
enum Placement {
    Insert(Item),
    Move(ItemId),
}

impl Placement {
    fn id(&self) -> ItemId {
        match self {
            Placement::Insert(item) => item.id,
            Placement::Move(id) => *id,
        }
    }
}

/// Keeps one ordered collection consistently ranked
pub struct OrderEngine<S: OrderedStore + ?Sized> {
    store: Arc<S>,
    config: OrderingConfig,
    /// Held for the whole of every operation
    allocator: Mutex<RankAllocator>,
    event_tx: broadcast::Sender<OrderEvent>,
}

impl<S: OrderedStore + ?Sized> OrderEngine<S> {
    /// Create an engine over `store`
    ///
    /// Fails with [`OrderError::InvalidConfig`] if `config` does not validate.
    pub fn new(store: Arc<S>, config: OrderingConfig) -> Result<Self, OrderError> {
        config.validate().map_err(OrderError::invalid_config)?;

        let (event_tx, _) = broadcast::channel(ORDER_EVENT_CHANNEL_CAPACITY);
        let allocator = Mutex::new(RankAllocator::new(&config));

        tracing::debug!(
            "Order engine ready (gap_threshold={}, widen_step={}, seeded={})",
            config.gap_threshold,
            config.widen_step,
            config.rng_seed.is_some()
        );

        Ok(Self {
            store,
            config,
            allocator,
            event_tx,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &OrderingConfig {
        &self.config
    }

    /// Subscribe to committed order events
    ///
    /// Rolled-back operations never emit.
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<OrderEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores errors if no subscribers
    fn emit_event(&self, event: OrderEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Insert a new item at the head of the visible order
    ///
    /// The first item, or any item inserted while nothing holds a rank at or
    /// below zero, takes the canonical rank. Otherwise the item is allocated
    /// below the current head. The head region is then rebalanced if dense.
    ///
    /// Returns the item as committed.
    pub async fn insert_at_end(&self, item: Item) -> Result<Item, OrderError> {
        let mut allocator = self.allocator.lock().await;
        self.ensure_absent(&item.id).await?;

        let id = item.id;
        let mut journal = RankJournal::new(self.store.as_ref());
        let result = self
            .insert_at_head(&mut allocator, &mut journal, item)
            .await;
        let (placed, changes) = self.finish(journal, result, "insert").await?;

        tracing::debug!("Inserted {} at head with rank {}", id, placed.rank);
        self.emit_event(OrderEvent::ItemInserted {
            id,
            position: 0,
            changes,
        });
        Ok(placed)
    }

    /// Insert a new item so it ends up at `position`
    ///
    /// `position` may equal the collection length to append after the tail.
    pub async fn insert_at(&self, item: Item, position: usize) -> Result<Item, OrderError> {
        let mut allocator = self.allocator.lock().await;
        self.ensure_absent(&item.id).await?;

        let len = self.store.len().await?;
        if position > len {
            return Err(OrderError::invalid_request(format!(
                "insert position {} is out of range for {} item(s)",
                position, len
            )));
        }

        let id = item.id;
        let mut journal = RankJournal::new(self.store.as_ref());
        let result = self
            .insert_at_position(&mut allocator, &mut journal, item, position)
            .await;
        let (placed, changes) = self.finish(journal, result, "insert").await?;

        tracing::debug!("Inserted {} at {} with rank {}", id, position, placed.rank);
        self.emit_event(OrderEvent::ItemInserted {
            id,
            position,
            changes,
        });
        Ok(placed)
    }

    /// Move the item at `origin` so it ends up at `destination`
    ///
    /// `destination` is the item's index after the move. Equal positions are
    /// a no-op. `id` must be the item currently at `origin`.
    pub async fn move_item(
        &self,
        id: &ItemId,
        origin: usize,
        destination: usize,
    ) -> Result<(), OrderError> {
        if origin == destination {
            return Ok(());
        }

        let mut allocator = self.allocator.lock().await;
        let store = self.store.as_ref();
        let resolver = NeighborResolver::new(store);

        let len = store.len().await?;
        if origin >= len || destination >= len {
            return Err(OrderError::invalid_request(format!(
                "move {} -> {} is out of range for {} item(s)",
                origin, destination, len
            )));
        }

        let at_origin = resolver
            .item_at(origin)
            .await?
            .ok_or_else(|| OrderError::neighbor_resolution_failed(origin))?;
        if at_origin.id != *id {
            return Err(OrderError::invalid_request(format!(
                "item {} is not at position {}",
                id, origin
            )));
        }

        let mut journal = RankJournal::new(store);
        let result = self
            .move_to(&mut allocator, &mut journal, *id, origin, destination)
            .await;
        let ((), changes) = self.finish(journal, result, "move").await?;

        tracing::debug!("Moved {} from {} to {}", id, origin, destination);
        self.emit_event(OrderEvent::ItemMoved {
            id: *id,
            origin,
            destination,
            changes,
        });
        Ok(())
    }

    /// Remove an item; never rebalances
    pub async fn delete_item(&self, id: &ItemId) -> Result<Item, OrderError> {
        let _guard = self.allocator.lock().await;

        let item = self.store.get_item(id).await?.ok_or_else(|| {
            OrderError::invalid_request(format!("item {} does not exist", id))
        })?;

        let mut journal = RankJournal::new(self.store.as_ref());
        let result = journal.delete(id).await.map(|_| ());
        self.finish(journal, result, "delete").await?;

        tracing::debug!("Deleted {}", id);
        self.emit_event(OrderEvent::ItemsDeleted { ids: vec![*id] });
        Ok(item)
    }

    /// Remove the items at the given positions of the current order
    ///
    /// Positions refer to the order before any of them is removed. All of
    /// them are removed or none is. Returns the removed ids in visible order.
    pub async fn delete_at_positions(
        &self,
        positions: &[usize],
    ) -> Result<Vec<ItemId>, OrderError> {
        let _guard = self.allocator.lock().await;
        let store = self.store.as_ref();
        let resolver = NeighborResolver::new(store);

        let len = store.len().await?;
        let positions: BTreeSet<usize> = positions.iter().copied().collect();
        if let Some(bad) = positions.iter().find(|p| **p >= len) {
            return Err(OrderError::invalid_request(format!(
                "delete position {} is out of range for {} item(s)",
                bad, len
            )));
        }

        let mut ids = Vec::with_capacity(positions.len());
        for position in &positions {
            let item = resolver
                .item_at(*position)
                .await?
                .ok_or_else(|| OrderError::neighbor_resolution_failed(*position))?;
            ids.push(item.id);
        }

        let mut journal = RankJournal::new(store);
        let mut result: Result<(), OrderError> = Ok(());
        for id in &ids {
            if let Err(e) = journal.delete(id).await {
                result = Err(e);
                break;
            }
        }
        self.finish(journal, result, "delete").await?;

        if !ids.is_empty() {
            tracing::debug!("Deleted {} item(s) by position", ids.len());
            self.emit_event(OrderEvent::ItemsDeleted { ids: ids.clone() });
        }
        Ok(ids)
    }

    /// Every item in visible order
    pub async fn visible_order(&self) -> Result<Vec<Item>, OrderError> {
        let _guard = self.allocator.lock().await;
        Ok(self.store.list_items().await?)
    }

    /// Run the rebalancer over an explicit window
    ///
    /// The window is repaired only if dense or colliding; a second call on
    /// the same window writes nothing.
    pub async fn rebalance_window(&self, ids: &[ItemId]) -> Result<RebalanceReport, OrderError> {
        let _guard = self.allocator.lock().await;
        let store = self.store.as_ref();

        let mut window = Vec::with_capacity(ids.len());
        for id in ids {
            let item = store.get_item(id).await?.ok_or_else(|| {
                OrderError::invalid_request(format!("item {} does not exist", id))
            })?;
            window.push(item);
        }

        let mut journal = RankJournal::new(store);
        let result = self.settle(&mut journal, &window, RebalanceReport::default()).await;
        let (report, changes) = self.finish(journal, result, "rebalance").await?;

        if !changes.is_empty() {
            tracing::info!("Rebalance rewrote {} rank(s)", changes.len());
            self.emit_event(OrderEvent::RanksRewritten { changes });
        }
        Ok(report)
    }

    /// Commit on success, roll back on failure
    async fn finish<T>(
        &self,
        journal: RankJournal<'_, S>,
        result: Result<T, OrderError>,
        operation: &str,
    ) -> Result<(T, Vec<RankChange>), OrderError> {
        match result {
            Ok(value) => Ok((value, journal.commit())),
            Err(e) => {
                tracing::warn!("Rolling back {}: {}", operation, e);
                journal.rollback().await;
                Err(e)
            }
        }
    }

    async fn ensure_absent(&self, id: &ItemId) -> Result<(), OrderError> {
        if self.store.get_item(id).await?.is_some() {
            return Err(OrderError::invalid_request(format!(
                "item {} already exists",
                id
            )));
        }
        Ok(())
    }

    async fn insert_at_head(
        &self,
        allocator: &mut RankAllocator,
        journal: &mut RankJournal<'_, S>,
        item: Item,
    ) -> Result<Item, OrderError> {
        let resolver = NeighborResolver::new(self.store.as_ref());
        let head_region = resolver.head_region(self.config.head_region_limit).await?;

        let (placed, report) = if head_region.is_empty() {
            let placed = Item {
                rank: CANONICAL_RANK,
                ..item
            };
            journal.insert(placed.clone()).await?;
            (placed, RebalanceReport::default())
        } else {
            let bounds = resolver.bounds_for_insert_at(0).await?;
            self.place(allocator, journal, Placement::Insert(item), bounds)
                .await?
        };

        let mut window = vec![placed.clone()];
        let mut cursor = placed;
        while window.len() < self.config.head_region_limit {
            match resolver.successor(&cursor, &HashSet::new()).await? {
                Some(next) => {
                    window.push(next.clone());
                    cursor = next;
                }
                None => break,
            }
        }

        self.settle(journal, &window, report).await?;
        resolver.reload(&window[0]).await
    }

    async fn insert_at_position(
        &self,
        allocator: &mut RankAllocator,
        journal: &mut RankJournal<'_, S>,
        item: Item,
        position: usize,
    ) -> Result<Item, OrderError> {
        let resolver = NeighborResolver::new(self.store.as_ref());
        let bounds = resolver.bounds_for_insert_at(position).await?;

        let (placed, report) = self
            .place(allocator, journal, Placement::Insert(item), bounds.clone())
            .await?;
        self.settle(journal, &Self::window(&bounds, &placed), report)
            .await?;
        resolver.reload(&placed).await
    }

    async fn move_to(
        &self,
        allocator: &mut RankAllocator,
        journal: &mut RankJournal<'_, S>,
        id: ItemId,
        origin: usize,
        destination: usize,
    ) -> Result<(), OrderError> {
        let resolver = NeighborResolver::new(self.store.as_ref());
        let bounds = resolver.bounds_for_move_to(origin, destination).await?;

        let (placed, report) = self
            .place(allocator, journal, Placement::Move(id), bounds.clone())
            .await?;
        self.settle(journal, &Self::window(&bounds, &placed), report)
            .await?;
        Ok(())
    }

    /// `[lower, placed, upper]`, skipping missing bounds
    fn window(bounds: &Bounds, placed: &Item) -> Vec<Item> {
        let mut window = Vec::with_capacity(3);
        window.extend(bounds.lower.iter().cloned());
        window.push(placed.clone());
        window.extend(bounds.upper.iter().cloned());
        window
    }

    /// Allocate a rank between `bounds` and write it
    ///
    /// On exhaustion the bounds are force-rebalanced without the placed item,
    /// re-read, and allocation is retried once.
    async fn place(
        &self,
        allocator: &mut RankAllocator,
        journal: &mut RankJournal<'_, S>,
        placement: Placement,
        bounds: Bounds,
    ) -> Result<(Item, RebalanceReport), OrderError> {
        let resolver = NeighborResolver::new(self.store.as_ref());
        let id = placement.id();
        let mut report = RebalanceReport::default();

        let rank = match allocator.allocate(bounds.lower_rank(), bounds.upper_rank()) {
            Ok(rank) => rank,
            Err(OrderError::RankExhausted { lower, upper }) => {
                tracing::debug!(
                    "No room between {:?} and {:?} for {}, forcing rebalance",
                    lower,
                    upper,
                    id
                );
                let skip: HashSet<ItemId> = [id].into_iter().collect();
                let forced = Rebalancer::new(&self.config)
                    .rebalance(
                        &resolver,
                        journal,
                        &bounds.items(),
                        &skip,
                        RebalanceMode::Force,
                    )
                    .await?;
                report.merge(forced);

                let bounds = resolver.reload_bounds(&bounds).await?;
                allocator
                    .allocate(bounds.lower_rank(), bounds.upper_rank())
                    .map_err(|e| {
                        tracing::warn!("Allocation for {} failed after rebalance: {}", id, e);
                        e
                    })?
            }
            Err(e) => return Err(e),
        };

        let placed = match placement {
            Placement::Insert(item) => {
                let placed = Item { rank, ..item };
                journal.insert(placed.clone()).await?;
                placed
            }
            Placement::Move(id) => {
                journal.write_rank(&id, rank).await?;
                resolver
                    .get(&id)
                    .await?
                    .ok_or_else(|| OrderError::invalid_request(format!("item {} vanished", id)))?
            }
        };

        Ok((placed, report))
    }

    /// Rebalance `window` if dense, then canonicalize the head if anything
    /// was rebalanced by this operation
    async fn settle(
        &self,
        journal: &mut RankJournal<'_, S>,
        window: &[Item],
        mut report: RebalanceReport,
    ) -> Result<RebalanceReport, OrderError> {
        let resolver = NeighborResolver::new(self.store.as_ref());
        let rebalancer = Rebalancer::new(&self.config);

        let local = rebalancer
            .rebalance(
                &resolver,
                journal,
                window,
                &HashSet::new(),
                RebalanceMode::IfDense,
            )
            .await?;
        report.merge(local);

        if report.rebalanced() {
            let head = rebalancer.canonicalize_head(&resolver, journal).await?;
            report.merge(head);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::Rank;

    fn engine_with(items: Vec<Item>) -> OrderEngine<MemoryStore> {
        let store = Arc::new(MemoryStore::seed(items).unwrap());
        OrderEngine::new(store, OrderingConfig::default().with_seed(11)).unwrap()
    }

    async fn ids(engine: &OrderEngine<MemoryStore>) -> Vec<ItemId> {
        engine
            .visible_order()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.id)
            .collect()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = OrderingConfig {
            gap_threshold: 1,
            ..Default::default()
        };
        let result = OrderEngine::new(Arc::new(MemoryStore::new()), config);
        assert!(matches!(result, Err(OrderError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_first_insert_takes_canonical_rank() {
        let engine = engine_with(vec![]);
        let a = engine.insert_at_end(Item::with_rank(999)).await.unwrap();
        assert_eq!(a.rank, 0);
    }

    #[tokio::test]
    async fn test_insert_when_nothing_at_or_below_zero() {
        let existing = Item::with_rank(500);
        let engine = engine_with(vec![existing.clone()]);

        let a = engine.insert_at_end(Item::new()).await.unwrap();

        assert_eq!(a.rank, 0);
        assert_eq!(ids(&engine).await, vec![a.id, existing.id]);
    }

    #[tokio::test]
    async fn test_same_position_move_is_noop() {
        let a = Item::with_rank(0);
        let engine = engine_with(vec![a.clone()]);
        let mut rx = engine.subscribe_to_events();

        engine.move_item(&a.id, 0, 0).await.unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_move_rejects_wrong_item_and_range() {
        let a = Item::with_rank(0);
        let b = Item::with_rank(100);
        let engine = engine_with(vec![a.clone(), b.clone()]);

        let wrong = engine.move_item(&b.id, 0, 1).await;
        assert!(matches!(wrong, Err(OrderError::InvalidRequest(_))));

        let out_of_range = engine.move_item(&a.id, 0, 2).await;
        assert!(matches!(out_of_range, Err(OrderError::InvalidRequest(_))));

        assert_eq!(ids(&engine).await, vec![a.id, b.id]);
    }

    #[tokio::test]
    async fn test_move_to_tail_allocates_above_last() {
        let items: Vec<Item> = [0, 100, 200].iter().map(|r| Item::with_rank(*r)).collect();
        let engine = engine_with(items.clone());

        engine.move_item(&items[0].id, 0, 2).await.unwrap();

        let order = engine.visible_order().await.unwrap();
        assert_eq!(order[2].id, items[0].id);
        assert!(order[2].rank > 200);
    }

    #[tokio::test]
    async fn test_exhausted_move_recovers_through_forced_rebalance() {
        let ranks: [Rank; 4] = [0, 100, 102, 5_000];
        let items: Vec<Item> = ranks.iter().map(|r| Item::with_rank(*r)).collect();
        let engine = engine_with(items.clone());

        // Only 101 lies between 100 and 102
        engine.move_item(&items[3].id, 3, 2).await.unwrap();

        assert_eq!(
            ids(&engine).await,
            vec![items[0].id, items[1].id, items[3].id, items[2].id]
        );
        let order = engine.visible_order().await.unwrap();
        assert_eq!(order[0].rank, 0);
        assert!(order.windows(2).all(|w| w[0].rank < w[1].rank));
    }

    #[tokio::test]
    async fn test_delete_unknown_item() {
        let engine = engine_with(vec![]);
        let result = engine.delete_item(&ItemId::new()).await;
        assert!(matches!(result, Err(OrderError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_delete_never_rebalances() {
        let items: Vec<Item> = [-3, -1, 1, 2].iter().map(|r| Item::with_rank(*r)).collect();
        let engine = engine_with(items.clone());

        engine.delete_item(&items[1].id).await.unwrap();

        let ranks: Vec<Rank> = engine
            .visible_order()
            .await
            .unwrap()
            .iter()
            .map(|item| item.rank)
            .collect();
        assert_eq!(ranks, vec![-3, 1, 2]);
    }
}
