//! In-process app lifecycle signal
//!
//! Tracks foreground/background state for the on-device provider gate and
//! exposes a resume signal so the scheduler can be woken when the app
//! comes back to the foreground.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::infrastructure::ports::AppStatePort;

pub struct AppLifecycle {
    foreground: AtomicBool,
    resumed: Notify,
}

impl AppLifecycle {
    pub fn new() -> Self {
        Self {
            foreground: AtomicBool::new(true),
            resumed: Notify::new(),
        }
    }

    /// Record a foreground/background transition. A background -> foreground
    /// edge fires the resume signal.
    pub fn set_foreground(&self, foreground: bool) {
        let was = self.foreground.swap(foreground, Ordering::SeqCst);
        if !was && foreground {
            self.resumed.notify_waiters();
        }
    }

    /// Completes on the next background -> foreground transition.
    pub async fn resumed(&self) {
        self.resumed.notified().await;
    }
}

impl Default for AppLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl AppStatePort for AppLifecycle {
    fn is_foreground(&self) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }
}
