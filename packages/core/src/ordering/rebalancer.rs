//! Local rank repair
//!
//! The rebalancer rewrites ranks in a small window of the visible order when
//! the window has become too dense to subdivide, or when two items share a
//! rank. It never renumbers the whole collection: the repair spans the window,
//! the neighbors it absorbs while widening, and nothing else.
//!
//! # Redistribution
//!
//! 1. The window is filled out into a contiguous run of the visible order.
//! 2. One hop outward on each side: a neighbor within `widen_step` of the run
//!    joins it, and the next neighbor out becomes the anchor. With nothing
//!    before the run, its first item is the head and is pinned to rank `0`.
//!    With nothing after it, `max_rank` is the anchor.
//! 3. While the anchors leave less than `gap_threshold` per item, the next
//!    outward neighbor is absorbed, alternating tail side then head side.
//! 4. The run is spaced evenly between the anchors.

use crate::db::OrderedStore;
use crate::models::{Item, ItemId, Rank, CANONICAL_RANK};
use crate::ordering::{NeighborResolver, OrderError, OrderingConfig, RankJournal};
use std::collections::HashSet;

/// When [`Rebalancer::rebalance`] redistributes the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceMode {
    /// Only when the window is dense
    IfDense,
    /// Unconditionally; used after allocation reported exhaustion
    Force,
}

/// What a rebalance pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebalanceReport {
    /// Whether a window redistribution ran
    pub redistributed: bool,
    /// Number of same-rank groups that were split
    pub collisions_split: usize,
    /// Every item whose rank was rewritten, in write order
    pub rewritten: Vec<ItemId>,
}

impl RebalanceReport {
    /// Nothing was written
    pub fn is_noop(&self) -> bool {
        self.rewritten.is_empty()
    }

    /// A redistribution or collision split ran, whether or not it wrote
    pub fn rebalanced(&self) -> bool {
        self.redistributed || self.collisions_split > 0
    }

    pub fn merge(&mut self, other: RebalanceReport) {
        self.redistributed |= other.redistributed;
        self.collisions_split += other.collisions_split;
        for id in other.rewritten {
            self.record(id);
        }
    }

    fn record(&mut self, id: ItemId) {
        if !self.rewritten.contains(&id) {
            self.rewritten.push(id);
        }
    }
}

/// The spacing of a run, once the anchors leave enough room
struct Spacing {
    /// Exclusive lower anchor, or the rank of the first item when pinned
    low: i128,
    step: i128,
    pinned: bool,
}

/// Detects and repairs dense or colliding windows
#[derive(Debug, Clone, Copy)]
pub struct Rebalancer<'c> {
    config: &'c OrderingConfig,
}

impl<'c> Rebalancer<'c> {
    pub fn new(config: &'c OrderingConfig) -> Self {
        Self { config }
    }

    /// A window of two or more items spanning fewer than `gap_threshold` ranks
    pub fn is_dense(&self, window: &[Item]) -> bool {
        if window.len() < 2 {
            return false;
        }
        let min = window.iter().map(|item| item.rank).min().unwrap_or_default();
        let max = window.iter().map(|item| item.rank).max().unwrap_or_default();
        i128::from(max) - i128::from(min) < i128::from(self.config.gap_threshold)
    }

    /// Repair `window`, then split any rank collisions among its members
    ///
    /// Window items may be stale copies; they are re-read by id. Items in
    /// `skip` are neither members nor neighbors for the whole pass.
    pub async fn rebalance<S: OrderedStore + ?Sized>(
        &self,
        resolver: &NeighborResolver<'_, S>,
        journal: &mut RankJournal<'_, S>,
        window: &[Item],
        skip: &HashSet<ItemId>,
        mode: RebalanceMode,
    ) -> Result<RebalanceReport, OrderError> {
        let mut report = RebalanceReport::default();
        let members = self.load_window(resolver, window, skip).await?;
        if members.is_empty() {
            return Ok(report);
        }

        if mode == RebalanceMode::Force || self.is_dense(&members) {
            tracing::debug!(
                "Rebalancing window of {} item(s) ({:?})",
                members.len(),
                mode
            );
            self.redistribute(resolver, journal, &members, skip, &mut report)
                .await?;
            report.redistributed = true;
        }

        let ids: Vec<ItemId> = members.iter().map(|item| item.id).collect();
        self.split_collisions(resolver, journal, &ids, skip, &mut report)
            .await?;

        Ok(report)
    }

    /// Give the head of the visible order the canonical rank
    ///
    /// When the head's successor does not sit above the canonical rank, the
    /// head region is redistributed with the head pinned instead.
    pub async fn canonicalize_head<S: OrderedStore + ?Sized>(
        &self,
        resolver: &NeighborResolver<'_, S>,
        journal: &mut RankJournal<'_, S>,
    ) -> Result<RebalanceReport, OrderError> {
        let mut report = RebalanceReport::default();
        let Some(head) = resolver.head().await? else {
            return Ok(report);
        };

        let next = resolver.successor(&head, &HashSet::new()).await?;
        let room_above = next
            .as_ref()
            .map_or(true, |item| item.rank > CANONICAL_RANK);

        if room_above {
            if journal.write_rank(&head.id, CANONICAL_RANK).await? {
                tracing::debug!("Head {} moved from rank {} to 0", head.id, head.rank);
                report.record(head.id);
            }
        } else {
            self.redistribute(resolver, journal, &[head], &HashSet::new(), &mut report)
                .await?;
            report.redistributed = true;
        }

        Ok(report)
    }

    /// Fresh copies of the window members, deduplicated, in visible order
    async fn load_window<S: OrderedStore + ?Sized>(
        &self,
        resolver: &NeighborResolver<'_, S>,
        window: &[Item],
        skip: &HashSet<ItemId>,
    ) -> Result<Vec<Item>, OrderError> {
        let mut seen = HashSet::new();
        let mut members = Vec::with_capacity(window.len());
        for item in window {
            if skip.contains(&item.id) || !seen.insert(item.id) {
                continue;
            }
            members.push(resolver.reload(item).await?);
        }
        members.sort_by_key(|item| item.sort_key());
        Ok(members)
    }

    /// Space `members` (sorted, non-empty) and everything between them evenly
    async fn redistribute<S: OrderedStore + ?Sized>(
        &self,
        resolver: &NeighborResolver<'_, S>,
        journal: &mut RankJournal<'_, S>,
        members: &[Item],
        skip: &HashSet<ItemId>,
        report: &mut RebalanceReport,
    ) -> Result<(), OrderError> {
        let (Some(first), Some(last)) = (members.first(), members.last()) else {
            return Ok(());
        };

        let mut run = vec![first.clone()];
        let mut cursor = first.clone();
        while cursor.id != last.id {
            match resolver.successor(&cursor, skip).await? {
                Some(next) => {
                    run.push(next.clone());
                    cursor = next;
                }
                None => break,
            }
        }

        let widen = i128::from(self.config.widen_step);

        let mut lower = resolver.predecessor(&run[0], skip).await?;
        if let Some(neighbor) = lower.take() {
            if i128::from(run[0].rank) - i128::from(neighbor.rank) < widen {
                lower = resolver.predecessor(&neighbor, skip).await?;
                run.insert(0, neighbor);
            } else {
                lower = Some(neighbor);
            }
        }

        let mut upper = resolver.successor(&cursor, skip).await?;
        if let Some(neighbor) = upper.take() {
            if i128::from(neighbor.rank) - i128::from(cursor.rank) < widen {
                upper = resolver.successor(&neighbor, skip).await?;
                run.push(neighbor);
            } else {
                upper = Some(neighbor);
            }
        }

        let spacing = self.fit(resolver, &mut run, &mut lower, &mut upper, skip).await?;

        for (i, item) in run.iter().enumerate() {
            let slot = if spacing.pinned { i } else { i + 1 };
            let rank = spacing.low + spacing.step * slot as i128;
            let rank = Rank::try_from(rank).map_err(|_| {
                OrderError::rank_exhausted(lower.as_ref().map(|a| a.rank), None)
            })?;
            if journal.write_rank(&item.id, rank).await? {
                report.record(item.id);
            }
        }

        tracing::debug!(
            "Redistributed {} item(s) from {} with step {}{}",
            run.len(),
            spacing.low,
            spacing.step,
            if spacing.pinned { " (head pinned)" } else { "" }
        );
        Ok(())
    }

    /// Absorb outward neighbors until the anchors leave room for the run
    async fn fit<S: OrderedStore + ?Sized>(
        &self,
        resolver: &NeighborResolver<'_, S>,
        run: &mut Vec<Item>,
        lower: &mut Option<Item>,
        upper: &mut Option<Item>,
        skip: &HashSet<ItemId>,
    ) -> Result<Spacing, OrderError> {
        let gap = i128::from(self.config.gap_threshold);
        let mut tail_turn = true;

        loop {
            let pinned = lower.is_none();
            let (low, slots) = match lower.as_ref() {
                Some(anchor) => (i128::from(anchor.rank), run.len() + 1),
                None => (i128::from(CANONICAL_RANK), run.len()),
            };
            let high = i128::from(upper.as_ref().map_or(self.config.max_rank, |a| a.rank));
            let step = (high - low) / slots as i128;
            if step >= gap {
                return Ok(Spacing { low, step, pinned });
            }

            let absorb_tail = match (tail_turn, upper.is_some(), lower.is_some()) {
                (_, false, false) => {
                    tracing::warn!(
                        "Cannot space {} item(s) at least {} apart",
                        run.len(),
                        gap
                    );
                    return Err(OrderError::rank_exhausted(
                        lower.as_ref().map(|a| a.rank),
                        upper.as_ref().map(|a| a.rank),
                    ));
                }
                (true, true, _) | (false, true, false) => true,
                _ => false,
            };

            if absorb_tail {
                if let Some(anchor) = upper.take() {
                    *upper = resolver.successor(&anchor, skip).await?;
                    run.push(anchor);
                }
            } else if let Some(anchor) = lower.take() {
                *lower = resolver.predecessor(&anchor, skip).await?;
                run.insert(0, anchor);
            }
            tail_turn = !tail_turn;
        }
    }

    /// Split same-rank groups touching the window, up to `collision_passes`
    async fn split_collisions<S: OrderedStore + ?Sized>(
        &self,
        resolver: &NeighborResolver<'_, S>,
        journal: &mut RankJournal<'_, S>,
        window: &[ItemId],
        skip: &HashSet<ItemId>,
        report: &mut RebalanceReport,
    ) -> Result<(), OrderError> {
        for _ in 0..self.config.collision_passes {
            match self.find_collision(resolver, window, skip).await? {
                Some(group) => {
                    tracing::debug!(
                        "Splitting {} items sharing rank {}",
                        group.len(),
                        group[0].rank
                    );
                    self.redistribute(resolver, journal, &group, skip, report)
                        .await?;
                    report.collisions_split += 1;
                }
                None => return Ok(()),
            }
        }

        match self.find_collision(resolver, window, skip).await? {
            Some(group) => {
                let rank = group[0].rank;
                tracing::warn!("Collision at rank {} survived every split pass", rank);
                Err(OrderError::rank_exhausted(Some(rank), Some(rank)))
            }
            None => Ok(()),
        }
    }

    /// The first group of two or more items sharing a window member's rank
    async fn find_collision<S: OrderedStore + ?Sized>(
        &self,
        resolver: &NeighborResolver<'_, S>,
        window: &[ItemId],
        skip: &HashSet<ItemId>,
    ) -> Result<Option<Vec<Item>>, OrderError> {
        for id in window {
            let Some(item) = resolver.get(id).await? else {
                continue;
            };
            let mut group = resolver.same_rank(&item, skip).await?;
            if group.len() >= 2 {
                group.sort_by_key(|item| item.sort_key());
                return Ok(Some(group));
            }
        }
        Ok(None)
    }
}
