//! Services
//!
//! - `OrderEngine` - insert, move and delete against one ordered collection
//!
//! Services coordinate the ordering primitives and the store, and are the
//! only layer that commits or rolls back an operation.

pub mod order_engine;

pub use order_engine::{OrderEngine, ORDER_EVENT_CHANNEL_CAPACITY};
