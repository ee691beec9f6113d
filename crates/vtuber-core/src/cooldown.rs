//! Cooldown gate: admits at most one access per interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const DEFAULT_COOLDOWN_INTERVAL: Duration = Duration::from_secs(60);

/// Environment variable overriding the default interval, parsed as a
/// duration string (`90s`, `2m`, plain seconds).
pub const COOLDOWN_INTERVAL_ENV: &str = "COOLDOWN_INTERVAL";

/// A one-shot admission control.
///
/// `try_acquire` is atomic; the release is scheduled on the runtime, so a
/// `Cooldown` must live inside one.
pub struct Cooldown {
    interval: Duration,
    coolingdown: Arc<AtomicBool>,
    last_used: Mutex<Option<Instant>>,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Cooldown {
        Cooldown {
            interval,
            coolingdown: Arc::new(AtomicBool::new(false)),
            last_used: Mutex::new(None),
        }
    }

    /// Interval from `COOLDOWN_INTERVAL`, falling back to 60s.
    pub fn from_env() -> Cooldown {
        Cooldown::new(interval_from_env())
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` iff not currently cooling down, and starts a cooldown.
    pub fn try_acquire(&self) -> bool {
        if self.coolingdown.swap(true, Ordering::SeqCst) {
            return false;
        }

        *self.last_used.lock() = Some(Instant::now());

        let coolingdown = self.coolingdown.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            coolingdown.store(false, Ordering::SeqCst);
        });

        true
    }

    /// Approximate time left in the current cooldown.
    ///
    /// Purely informational (logging, progress hints): it may lag the actual
    /// release. Use [`Cooldown::try_acquire`] to decide availability.
    pub fn left_time(&self) -> Duration {
        if !self.coolingdown.load(Ordering::SeqCst) {
            return Duration::ZERO;
        }
        match *self.last_used.lock() {
            Some(t) => self.interval.saturating_sub(t.elapsed()),
            None => Duration::ZERO,
        }
    }
}

fn interval_from_env() -> Duration {
    if let Ok(v) = std::env::var(COOLDOWN_INTERVAL_ENV) {
        if let Some(d) = parse_duration(v.trim()) {
            tracing::info!(interval = ?d, "cooldown interval from env");
            return d;
        }
        tracing::warn!(value = %v, "bad COOLDOWN_INTERVAL, using default");
    }
    DEFAULT_COOLDOWN_INTERVAL
}

/// Parse `300ms` / `90s` / `2m` / `1h`; a bare number means seconds.
fn parse_duration(s: &str) -> Option<Duration> {
    if s.is_empty() {
        return None;
    }
    let (num, unit) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(i) => s.split_at(i),
        None => (s, "s"),
    };
    let n: f64 = num.parse().ok()?;
    let secs = match unit {
        "ms" => n / 1000.0,
        "s" => n,
        "m" => n * 60.0,
        "h" => n * 3600.0,
        _ => return None,
    };
    if secs < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(secs))
}
