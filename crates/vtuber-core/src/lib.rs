//! Core types shared across the vtuber driver crates:
//! - The `Text` record and its `Priority` levels
//! - A bounded resource pool for closable items (connections, sessions)
//! - A cooldown gate for rate-limiting access to expensive backends
//! - Small text helpers for log-friendly truncation

pub mod cooldown;
pub mod ellipsis;
pub mod pool;
pub mod text;

pub use cooldown::Cooldown;
pub use pool::{Pool, PoolError, Poolable};
pub use text::{Priority, Text, TextIn, TextOut};
