// # Subscription Store Implementations
//
// This module provides implementations of the SubscriptionStore trait for
// different persistence strategies.

pub mod memory;
pub mod sqlite;

pub use memory::MemorySubscriptionStore;
pub use sqlite::SqliteSubscriptionStore;
