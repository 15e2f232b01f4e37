//! Rank journal: operation-level atomicity over per-row writes
//!
//! Every write an engine operation makes goes through a [`RankJournal`]. The
//! write is applied to the store immediately, so later neighbor reads in the
//! same operation see it, and the previous value is recorded. If the
//! operation fails, [`RankJournal::rollback`] replays the undo log in reverse
//! and the collection is exactly as it was before the operation started.

use crate::db::{OrderedStore, RankChange, StoreError};
use crate::models::{Item, ItemId, Rank};
use crate::ordering::OrderError;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
enum Undo {
    Rank { id: ItemId, previous: Rank },
    Inserted { id: ItemId },
    Deleted { item: Item },
}

/// Undo log for one engine operation
pub struct RankJournal<'a, S: OrderedStore + ?Sized> {
    store: &'a S,
    undo: Vec<Undo>,
    /// Latest rank written per live row
    current: HashMap<ItemId, Rank>,
}

impl<'a, S: OrderedStore + ?Sized> RankJournal<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            undo: Vec::new(),
            current: HashMap::new(),
        }
    }

    /// Write a new rank for the item with `id`
    ///
    /// The previous rank is read back from the store, so callers may hold a
    /// stale copy of the item. Returns whether anything was written; writing
    /// an item's current rank is skipped.
    pub async fn write_rank(&mut self, id: &ItemId, rank: Rank) -> Result<bool, OrderError> {
        let existing = self
            .store
            .get_item(id)
            .await?
            .ok_or_else(|| OrderError::StoreReadFailed(StoreError::item_not_found(*id)))?;
        if existing.rank == rank {
            return Ok(false);
        }

        self.store
            .write_rank(id, rank)
            .await
            .map_err(|source| OrderError::store_write_failed(*id, rank, source))?;

        self.undo.push(Undo::Rank {
            id: *id,
            previous: existing.rank,
        });
        self.current.insert(*id, rank);
        Ok(true)
    }

    /// Insert a new row
    pub async fn insert(&mut self, item: Item) -> Result<(), OrderError> {
        let (id, rank) = (item.id, item.rank);
        self.store
            .insert_item(item)
            .await
            .map_err(|source| OrderError::store_write_failed(id, rank, source))?;

        self.undo.push(Undo::Inserted { id });
        self.current.insert(id, rank);
        Ok(())
    }

    /// Delete a row, returning whether it existed
    ///
    /// A failed delete is reported with the rank the row still holds.
    pub async fn delete(&mut self, id: &ItemId) -> Result<bool, OrderError> {
        let Some(existing) = self.store.get_item(id).await? else {
            return Ok(false);
        };
        let removed = self
            .store
            .delete_item(id)
            .await
            .map_err(|source| OrderError::store_write_failed(*id, existing.rank, source))?;

        match removed {
            Some(item) => {
                self.current.remove(id);
                self.undo.push(Undo::Deleted { item });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Finish the operation and report the net rank change of every live row
    ///
    /// The writes are already in the store; committing only drops the undo log.
    pub fn commit(self) -> Vec<RankChange> {
        let mut changes: Vec<RankChange> = Vec::new();
        let mut seen: HashSet<ItemId> = HashSet::new();

        for entry in &self.undo {
            // The earliest entry per row carries its pre-operation rank.
            let (id, previous) = match entry {
                Undo::Rank { id, previous } => (*id, Some(*previous)),
                Undo::Inserted { id } => (*id, None),
                Undo::Deleted { .. } => continue,
            };
            if !seen.insert(id) {
                continue;
            }
            if let Some(rank) = self.current.get(&id).copied() {
                if previous != Some(rank) {
                    changes.push(RankChange { id, previous, rank });
                }
            }
        }

        changes
    }

    /// Undo every applied write, newest first
    ///
    /// Undo failures are logged and skipped so as much as possible is
    /// restored; the caller still reports the error that triggered rollback.
    pub async fn rollback(self) {
        let count = self.undo.len();
        for entry in self.undo.into_iter().rev() {
            let result = match &entry {
                Undo::Rank { id, previous } => self.store.write_rank(id, *previous).await,
                Undo::Inserted { id } => self.store.delete_item(id).await.map(|_| ()),
                Undo::Deleted { item } => self.store.insert_item(item.clone()).await,
            };
            if let Err(e) = result {
                tracing::error!("Rollback step {:?} failed: {}", entry, e);
            }
        }
        if count > 0 {
            tracing::debug!("Rolled back {} journaled write(s)", count);
        }
    }
}
