//! Pipeline stages between ingress and the sayer.
//!
//! Every stage consumes a channel of [`Text`] and produces a new one,
//! running as a spawned task. Producers block when a stage falls behind
//! (bounded channels); a stage ends when its input closes.

pub mod filter;
pub mod reduce;
pub mod too_long;

pub use filter::{chinese_only, filter_text};
pub use reduce::PriorityReduceFilter;
pub use too_long::{too_long, TooLongFilter};

/// Capacity of the channels between stages.
pub const CHANNEL_BUFFER: usize = 100;
