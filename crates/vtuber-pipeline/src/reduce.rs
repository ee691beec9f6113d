//! Priority-reducing time-window filter.
//!
//! Buffers everything arriving within a fixed window, then emits only the
//! "most important" record(s):
//!
//! - one record in the window: boost it to `HIGHEST` (few messages means we
//!   can afford the best chatbot for each)
//! - several: take the max priority; if that is `HIGHEST`, emit all of
//!   them, otherwise only the one with the longest content
//!
//! Emitted priorities are capped at `HIGHEST`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use vtuber_core::ellipsis;
use vtuber_core::{Priority, Text};

use crate::CHANNEL_BUFFER;

pub struct PriorityReduceFilter {
    duration: Duration,
}

impl PriorityReduceFilter {
    pub fn new(duration: Duration) -> PriorityReduceFilter {
        PriorityReduceFilter { duration }
    }

    pub fn spawn(self, mut rx: mpsc::Receiver<Text>) -> mpsc::Receiver<Text> {
        let (tx, out) = mpsc::channel(CHANNEL_BUFFER);
        tokio::spawn(async move {
            let mut window: Vec<Text> = Vec::with_capacity(10);
            // interval panics on a zero period
            let period = self.duration.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // the immediate first tick

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(text) => window.push(text),
                        None => return,
                    },
                    _ = ticker.tick() => {
                        for text in reduce_window(&mut window) {
                            if tx.send(text).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });
        out
    }
}

/// Reduce one window's worth of records, leaving the buffer empty.
fn reduce_window(window: &mut Vec<Text>) -> Vec<Text> {
    match window.len() {
        0 => Vec::new(),
        1 => {
            let mut only = window.drain(..).collect::<Vec<_>>();
            only[0].priority = Priority::HIGHEST;
            tracing::info!(
                author = %only[0].author,
                content = %ellipsis::centering(&only[0].content, 17),
                "reduce: solo message boosted to highest"
            );
            only
        }
        _ => {
            let max_priority = window
                .iter()
                .map(|t| t.priority)
                .max()
                .unwrap_or(Priority::LOW);

            let mut chosen: Vec<Text> = window
                .drain(..)
                .filter(|t| t.priority == max_priority)
                .collect();
            for t in &mut chosen {
                t.priority = t.priority.capped();
            }

            if max_priority == Priority::HIGHEST {
                tracing::info!(count = chosen.len(), "reduce: emitting all highest-priority messages");
                return chosen;
            }

            // otherwise a single winner: the longest content
            let longest = chosen
                .into_iter()
                .max_by_key(|t| t.content.len());
            match longest {
                Some(t) => {
                    tracing::info!(
                        author = %t.author,
                        content = %ellipsis::centering(&t.content, 17),
                        priority = t.priority.0,
                        "reduce: emitting longest of max priority"
                    );
                    vec![t]
                }
                None => Vec::new(),
            }
        }
    }
}
