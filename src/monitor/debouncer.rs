//! Delta debouncer.
//!
//! Holds a computed delta for a coalescing window so that rapid bursts of
//! filesystem activity (an unpacking archive, a compiler run) turn into one
//! reconciliation pass instead of many. Because every poll diff is computed
//! against the same un-reconciled store state, a fresh delta that differs
//! from the held one supersedes it outright and restarts the window.

use crate::index::types::Delta;
use std::time::{Duration, Instant};

pub struct DeltaDebouncer {
    window: Duration,
    held: Option<Delta>,
    since: Option<Instant>,
}

impl DeltaDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            held: None,
            since: None,
        }
    }

    /// Hold a delta and start (or restart) the window.
    pub fn offer(&mut self, delta: Delta) {
        self.held = Some(delta);
        self.since = Some(Instant::now());
    }

    /// Fold in a rescan result. Returns true when the fresh delta differed
    /// and the window was reset; false when the burst has settled and the
    /// held delta is ready to apply.
    pub fn coalesce(&mut self, fresh: Delta) -> bool {
        match &self.held {
            Some(held) if held.same_changes(&fresh) => false,
            _ => {
                self.offer(fresh);
                true
            }
        }
    }

    /// True while a non-empty delta is being held.
    pub fn has_pending(&self) -> bool {
        self.held.as_ref().is_some_and(|delta| !delta.is_empty())
    }

    /// Whether the window has elapsed since the last (re)offer.
    pub fn is_ready(&self) -> bool {
        self.since
            .is_some_and(|since| since.elapsed() >= self.window)
    }

    /// Time left in the current window, None when nothing is held.
    pub fn remaining(&self) -> Option<Duration> {
        self.since.map(|since| {
            let elapsed = since.elapsed();
            if elapsed >= self.window {
                Duration::ZERO
            } else {
                self.window - elapsed
            }
        })
    }

    /// Take the held delta. Returns None when nothing worth applying is
    /// held.
    pub fn flush(&mut self) -> Option<Delta> {
        self.since = None;
        self.held.take().filter(|delta| !delta.is_empty())
    }

    pub fn clear(&mut self) {
        self.held = None;
        self.since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::types::{Entry, EntryKind};
    use std::thread::sleep;

    fn delta_with(paths: &[&str]) -> Delta {
        Delta {
            added: paths
                .iter()
                .map(|p| Entry {
                    path: p.to_string(),
                    name: p.rsplit('/').next().unwrap().to_string(),
                    parent_path: String::new(),
                    size: 1,
                    modified: 1,
                    accessed: 1,
                    kind: EntryKind::File,
                    last_seen: 0,
                })
                .collect(),
            ..Delta::default()
        }
    }

    fn quick() -> DeltaDebouncer {
        DeltaDebouncer::new(Duration::from_millis(50))
    }

    #[test]
    fn test_not_ready_immediately() {
        let mut debouncer = quick();
        debouncer.offer(delta_with(&["/a"]));
        assert!(debouncer.has_pending());
        assert!(!debouncer.is_ready());
        assert!(debouncer.remaining().unwrap() > Duration::ZERO);
    }

    #[test]
    fn test_ready_after_window() {
        let mut debouncer = quick();
        debouncer.offer(delta_with(&["/a"]));
        sleep(Duration::from_millis(60));
        assert!(debouncer.is_ready());
        let flushed = debouncer.flush().unwrap();
        assert_eq!(flushed.added.len(), 1);
        assert!(!debouncer.has_pending());
    }

    #[test]
    fn test_identical_rescan_settles() {
        let mut debouncer = quick();
        debouncer.offer(delta_with(&["/a", "/b"]));
        assert!(!debouncer.coalesce(delta_with(&["/b", "/a"])));
    }

    #[test]
    fn test_differing_rescan_resets_window() {
        let mut debouncer = quick();
        debouncer.offer(delta_with(&["/a"]));
        sleep(Duration::from_millis(60));
        assert!(debouncer.is_ready());

        assert!(debouncer.coalesce(delta_with(&["/a", "/b"])));
        assert!(!debouncer.is_ready());
        let flushed = debouncer.flush().unwrap();
        assert_eq!(flushed.added.len(), 2);
    }

    #[test]
    fn test_empty_rescan_drops_pending() {
        let mut debouncer = quick();
        debouncer.offer(delta_with(&["/a"]));
        // Everything settled back to the stored state before the window ran
        // out; there is nothing left to apply.
        assert!(debouncer.coalesce(Delta::default()));
        assert!(!debouncer.has_pending());
        assert!(debouncer.flush().is_none());
    }

    #[test]
    fn test_clear() {
        let mut debouncer = quick();
        debouncer.offer(delta_with(&["/a"]));
        debouncer.clear();
        assert!(!debouncer.has_pending());
        assert!(debouncer.flush().is_none());
    }
}
