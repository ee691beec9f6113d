//! Ingress adapters and the orchestrator glue of the vtuber driver.

pub mod dm;
pub mod http_in;
pub mod sink;

pub use dm::{text_in_from_dm, DmError};
