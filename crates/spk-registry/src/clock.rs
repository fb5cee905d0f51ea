//! Time source for the registry. The engine never reads the clock itself.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use spk_schemas::EpochSecs;

pub trait Clock: Send + Sync {
    fn now(&self) -> EpochSecs;
}

/// Wall clock, whole seconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> EpochSecs {
        Utc::now().timestamp()
    }
}

/// Settable clock for tests and replay.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: EpochSecs) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: EpochSecs) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) -> EpochSecs {
        self.now.fetch_add(secs, Ordering::SeqCst) + secs
    }
}

impl Clock for ManualClock {
    fn now(&self) -> EpochSecs {
        self.now.load(Ordering::SeqCst)
    }
}
