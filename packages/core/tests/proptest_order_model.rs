//! Property-based tests against a reference list model.
//!
//! Random sequences of inserts, moves and deletes are replayed against both
//! the engine and a plain `Vec<ItemId>`. After every operation:
//!
//! 1. The visible order matches the model exactly (by identity).
//! 2. Ranks strictly increase along the visible order.
//! 3. Every rank stays inside the configured range.
//!
//! The rank range is kept small so rebalancing and exhaustion recovery run
//! constantly.

use proptest::prelude::*;
use sortorder_core::db::MemoryStore;
use sortorder_core::models::{Item, ItemId};
use sortorder_core::ordering::{OrderError, OrderingConfig};
use sortorder_core::services::OrderEngine;
use std::sync::Arc;

const MIN_RANK: i64 = -1_000;
const MAX_RANK: i64 = 1_000;

#[derive(Debug, Clone)]
enum Op {
    InsertAtEnd,
    InsertAt(usize),
    Move(usize, usize),
    Delete(usize),
    DeletePair(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::InsertAtEnd),
        2 => any::<usize>().prop_map(Op::InsertAt),
        4 => (any::<usize>(), any::<usize>()).prop_map(|(o, d)| Op::Move(o, d)),
        1 => any::<usize>().prop_map(Op::Delete),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::DeletePair(a, b)),
    ]
}

fn fail(e: OrderError) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

/// Apply one operation to both the engine and the model
async fn apply(
    engine: &OrderEngine<MemoryStore>,
    model: &mut Vec<ItemId>,
    op: &Op,
) -> Result<(), TestCaseError> {
    match *op {
        Op::InsertAtEnd => {
            let item = engine.insert_at_end(Item::new()).await.map_err(fail)?;
            model.insert(0, item.id);
        }
        Op::InsertAt(p) => {
            let position = p % (model.len() + 1);
            let item = engine
                .insert_at(Item::new(), position)
                .await
                .map_err(fail)?;
            model.insert(position, item.id);
        }
        Op::Move(o, d) if !model.is_empty() => {
            let (origin, destination) = (o % model.len(), d % model.len());
            let id = model[origin];
            engine
                .move_item(&id, origin, destination)
                .await
                .map_err(fail)?;
            model.remove(origin);
            model.insert(destination, id);
        }
        Op::Delete(p) if !model.is_empty() => {
            let id = model.remove(p % model.len());
            engine.delete_item(&id).await.map_err(fail)?;
        }
        Op::DeletePair(a, b) if !model.is_empty() => {
            let mut positions = vec![a % model.len(), b % model.len()];
            positions.sort_unstable();
            positions.dedup();
            engine
                .delete_at_positions(&positions)
                .await
                .map_err(fail)?;
            for position in positions.into_iter().rev() {
                model.remove(position);
            }
        }
        _ => {}
    }
    Ok(())
}

async fn check(engine: &OrderEngine<MemoryStore>, model: &[ItemId]) -> Result<(), TestCaseError> {
    let order = engine.visible_order().await.map_err(fail)?;

    let ids: Vec<ItemId> = order.iter().map(|item| item.id).collect();
    prop_assert_eq!(ids.as_slice(), model);

    for pair in order.windows(2) {
        prop_assert!(
            pair[0].rank < pair[1].rank,
            "ranks {} and {} out of order",
            pair[0].rank,
            pair[1].rank
        );
    }
    for item in &order {
        prop_assert!((MIN_RANK..=MAX_RANK).contains(&item.rank));
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn visible_order_matches_list_model(
        ops in proptest::collection::vec(op(), 1..40),
        seed in any::<u64>(),
    ) {
        let config = OrderingConfig::default()
            .with_rank_range(MIN_RANK, MAX_RANK)
            .with_seed(seed);
        let engine = OrderEngine::new(Arc::new(MemoryStore::new()), config)
            .map_err(fail)?;

        tokio_test::block_on(async {
            let mut model = Vec::new();
            for op in &ops {
                apply(&engine, &mut model, op).await?;
                check(&engine, &model).await?;
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn rebalance_window_is_idempotent(
        ranks in proptest::collection::btree_set(-500i64..500, 2..12),
        seed in any::<u64>(),
    ) {
        let items: Vec<Item> = ranks.iter().map(|rank| Item::with_rank(*rank)).collect();
        let ids: Vec<ItemId> = items.iter().map(|item| item.id).collect();
        let config = OrderingConfig::default()
            .with_rank_range(MIN_RANK, MAX_RANK)
            .with_seed(seed);
        let store = MemoryStore::seed(items)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let engine = OrderEngine::new(Arc::new(store), config).map_err(fail)?;

        tokio_test::block_on(async {
            let first = engine.rebalance_window(&ids).await.map_err(fail)?;
            let order = engine.visible_order().await.map_err(fail)?;
            if first.rebalanced() {
                prop_assert_eq!(order[0].rank, 0);
            }

            let second = engine.rebalance_window(&ids).await.map_err(fail)?;
            prop_assert!(second.is_noop());
            prop_assert_eq!(engine.visible_order().await.map_err(fail)?, order);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
