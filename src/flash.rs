//! Transient success flags.
//!
//! A [`FlashFlag`] is raised by an action and reads as lowered again once its
//! window has elapsed. Expiry is evaluated when the flag is read, so no timer
//! task has to be spawned or cancelled. Raising the flag again restarts the
//! window.
//!
//! Time comes from [`tokio::time::Instant`], which honours a paused test clock.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct FlashFlag {
    window: Duration,
    raised_at: Option<Instant>,
}

impl FlashFlag {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            raised_at: None,
        }
    }

    pub fn raise(&mut self) {
        self.raised_at = Some(Instant::now());
    }

    pub fn clear(&mut self) {
        self.raised_at = None;
    }

    pub fn is_raised(&self) -> bool {
        self.raised_at.is_some_and(|at| at.elapsed() < self.window)
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
