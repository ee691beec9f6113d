//! A bounded pool of closable items.
//!
//! The pool hands out idle entries without blocking, constructs new ones on
//! demand while under capacity, and refuses with [`PoolError::Exhausted`]
//! beyond that. Entries evicted with [`Pool::release`] are closed and stop
//! counting against the capacity.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("the pool is closed")]
    Closed,

    #[error("the pool has been exhausted")]
    Exhausted,

    #[error("failed to create a pool entry: {0}")]
    Create(String),
}

/// An item that can live in a [`Pool`].
///
/// `close` releases whatever the entry holds (server-side sessions,
/// connections). It is called at most once per entry by the pool.
#[async_trait]
pub trait Poolable: Send {
    async fn close(&mut self);
}

/// Fixed-capacity pool.
///
/// `outstanding` counts every entry the pool has created and not yet
/// released, whether idle inside the pool or checked out by a caller; it
/// never exceeds `max_len`.
pub struct Pool<T: Poolable> {
    idle: Mutex<VecDeque<T>>,
    outstanding: AtomicI64,
    max_len: i64,
    closed: AtomicBool,
    create: Box<dyn Fn() -> Result<T, PoolError> + Send + Sync>,
}

impl<T: Poolable> Pool<T> {
    pub fn new<F>(max_len: i64, create: F) -> Pool<T>
    where
        F: Fn() -> Result<T, PoolError> + Send + Sync + 'static,
    {
        Pool {
            idle: Mutex::new(VecDeque::with_capacity(max_len.max(0) as usize)),
            outstanding: AtomicI64::new(0),
            max_len,
            closed: AtomicBool::new(false),
            create: Box::new(create),
        }
    }

    /// Get an entry: an idle one if any, a fresh one if under capacity.
    pub fn get(&self) -> Result<T, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        if let Some(t) = self.idle.lock().pop_front() {
            return Ok(t);
        }

        if self.outstanding.fetch_add(1, Ordering::SeqCst) + 1 > self.max_len {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            return Err(PoolError::Exhausted);
        }
        match (self.create)() {
            Ok(t) => Ok(t),
            Err(e) => {
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Return a checked-out entry. After [`Pool::close`] the entry is closed
    /// instead of being kept.
    pub async fn put(&self, mut t: T) -> Result<(), PoolError> {
        if self.is_closed() {
            t.close().await;
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            return Err(PoolError::Closed);
        }
        self.idle.lock().push_back(t);
        Ok(())
    }

    /// Evict a checked-out entry: close it and free its capacity slot.
    pub async fn release(&self, mut t: T) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        t.close().await;
    }

    /// Entries currently alive (idle + checked out).
    pub fn len(&self) -> i64 {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the pool: further `get`s fail, idle entries are closed.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let drained: Vec<T> = {
            let mut idle = self.idle.lock();
            idle.drain(..).collect()
        };
        for mut t in drained {
            t.close().await;
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
