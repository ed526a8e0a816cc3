//! Module for tracking the lifecycle of a crawler.
//!
//! Every orchestrator walks the same monotonic path:
//! `Initializing -> Running -> Ended`. Configuration may only change while
//! `Initializing`; `Running` is entered exactly once; `Ended` is terminal.
//!
//! The state lives in a single atomic cell so that it can be read and
//! transitioned from any thread without a lock. Transitions use
//! compare-and-swap and fail closed: a transition from the wrong state is
//! rejected with [`CrawlError::IllegalState`] and leaves the cell untouched.

use crate::error::{CrawlError, Result};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// The three lifecycle states of a crawler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Initializing,
    Running,
    Ended,
}

impl LifecycleState {
    fn as_u8(self) -> u8 {
        match self {
            LifecycleState::Initializing => 0,
            LifecycleState::Running => 1,
            LifecycleState::Ended => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecycleState::Initializing,
            1 => LifecycleState::Running,
            _ => LifecycleState::Ended,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Initializing => "initializing",
            LifecycleState::Running => "running",
            LifecycleState::Ended => "ended",
        };
        f.write_str(name)
    }
}

/// Atomic holder of a [`LifecycleState`].
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Creates a lifecycle in the `Initializing` state.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Initializing.as_u8()),
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Fails with `IllegalState` unless the crawler is still initializing.
    pub fn ensure_initializing(&self, action: &'static str) -> Result<()> {
        self.ensure(LifecycleState::Initializing, action)
    }

    /// Fails with `IllegalState` unless the crawler is running.
    pub fn ensure_running(&self, action: &'static str) -> Result<()> {
        self.ensure(LifecycleState::Running, action)
    }

    /// `Initializing -> Running`. Only one caller can ever win this transition.
    pub fn begin(&self) -> Result<()> {
        self.transition(LifecycleState::Initializing, LifecycleState::Running, "start the crawler")
    }

    /// `Running -> Ended`.
    pub fn finish(&self) -> Result<()> {
        self.transition(LifecycleState::Running, LifecycleState::Ended, "end the crawl")
    }

    /// Returns `true` once the crawler has left `Initializing`.
    pub fn has_started(&self) -> bool {
        self.current() != LifecycleState::Initializing
    }

    fn ensure(&self, expected: LifecycleState, action: &'static str) -> Result<()> {
        let actual = self.current();
        if actual == expected {
            Ok(())
        } else {
            Err(CrawlError::IllegalState {
                action,
                expected,
                actual,
            })
        }
    }

    fn transition(
        &self,
        from: LifecycleState,
        to: LifecycleState,
        action: &'static str,
    ) -> Result<()> {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(|raw| CrawlError::IllegalState {
                action,
                expected: from,
                actual: LifecycleState::from_u8(raw),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn walks_the_lifecycle_forward() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.current(), LifecycleState::Initializing);
        assert!(!lifecycle.has_started());
        assert!(lifecycle.ensure_initializing("configure").is_ok());

        lifecycle.begin().unwrap();
        assert_eq!(lifecycle.current(), LifecycleState::Running);
        assert!(lifecycle.has_started());
        assert!(lifecycle.ensure_running("poll").is_ok());

        lifecycle.finish().unwrap();
        assert_eq!(lifecycle.current(), LifecycleState::Ended);
    }

    #[test]
    fn rejects_double_start_without_changing_state() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin().unwrap();
        let err = lifecycle.begin().unwrap_err();
        assert!(err.is_illegal_state());
        assert_eq!(lifecycle.current(), LifecycleState::Running);
    }

    #[test]
    fn never_goes_back_from_ended() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin().unwrap();
        lifecycle.finish().unwrap();
        assert!(lifecycle.begin().is_err());
        assert!(lifecycle.finish().is_err());
        assert!(lifecycle.ensure_initializing("configure").is_err());
        assert_eq!(lifecycle.current(), LifecycleState::Ended);
    }

    #[test]
    fn finish_requires_running() {
        let lifecycle = Lifecycle::new();
        match lifecycle.finish() {
            Err(CrawlError::IllegalState { expected, actual, .. }) => {
                assert_eq!(expected, LifecycleState::Running);
                assert_eq!(actual, LifecycleState::Initializing);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn only_one_concurrent_begin_wins() {
        let lifecycle = Arc::new(Lifecycle::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lifecycle = Arc::clone(&lifecycle);
                thread::spawn(move || lifecycle.begin().is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
