//! Chain notifications.
//!
//! # Event Flow
//!
//! 1. `ChainSynchronizer` emits `block_deleted` for every orphaned block,
//!    highest first, then `block_added` for every new canonical block,
//!    lowest first.
//! 2. The daemon's listener forwards added blocks to the
//!    `BridgeTransactionPublisher` and cleans the status stores on deletes.
//! 3. The publisher offers each bridge transaction to its subscribers.
//!
//! Notifications are delivered sequentially and in registration order.

pub mod listener;
pub mod subscribers;

pub use listener::{ChainListener, ListenerError};
pub use subscribers::SubscriberList;
