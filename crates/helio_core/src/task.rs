//! Progress tracking and cooperative cancellation for long running passes.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct TaskState {
    name: String,
    done: usize,
    total: usize,
    reported_decile: usize,
    canceled: bool,
}

/// Work counter and cancellation flag of the running pass.
///
/// Both live behind a single mutex: workers claim work and observe
/// cancellation in one critical section. `cancel()` may be called from any
/// thread; it is sticky until [`TaskMonitor::reset`].
#[derive(Debug, Default)]
pub struct TaskMonitor {
    state: Mutex<TaskState>,
}

impl TaskMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin a named pass of `total` work units.
    pub fn start(&self, name: &str, total: usize) {
        let mut state = self.lock();
        state.name = name.to_string();
        state.done = 0;
        state.total = total;
        state.reported_decile = 0;
        log::info!("{} ...", name);
    }

    /// Claim the next work index, or `None` when exhausted or canceled.
    pub fn next_item(&self) -> Option<usize> {
        let mut state = self.lock();
        if state.canceled || state.done >= state.total {
            return None;
        }
        let item = state.done;
        Self::advance(&mut state);
        Some(item)
    }

    /// Count one unit of work done. Returns false once the pass is canceled.
    pub fn update(&self) -> bool {
        let mut state = self.lock();
        if state.canceled {
            return false;
        }
        Self::advance(&mut state);
        true
    }

    fn advance(state: &mut TaskState) {
        state.done += 1;
        if state.total > 0 {
            let decile = state.done * 10 / state.total;
            if decile > state.reported_decile {
                state.reported_decile = decile;
                log::info!("{}: {}%", state.name, decile * 10);
            }
        }
    }

    /// End the current pass.
    pub fn stop(&self) {
        let state = self.lock();
        if state.canceled {
            log::warn!("{} canceled after {}/{}", state.name, state.done, state.total);
        }
    }

    /// Request cancellation. In-flight work units finish, no new ones start.
    pub fn cancel(&self) {
        self.lock().canceled = true;
    }

    pub fn is_canceled(&self) -> bool {
        self.lock().canceled
    }

    /// Clear the cancellation flag.
    pub fn reset(&self) {
        self.lock().canceled = false;
    }

    /// `(done, total)` of the current pass.
    pub fn progress(&self) -> (usize, usize) {
        let state = self.lock();
        (state.done, state.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_next_item_hands_out_every_index_once() {
        let monitor = TaskMonitor::new();
        monitor.start("Rendering", 100);
        let claimed = AtomicUsize::new(0);
        let seen: Vec<AtomicUsize> = (0..100).map(|_| AtomicUsize::new(0)).collect();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    while let Some(i) = monitor.next_item() {
                        seen[i].fetch_add(1, Ordering::Relaxed);
                        claimed.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        assert_eq!(claimed.load(Ordering::Relaxed), 100);
        assert!(seen.iter().all(|c| c.load(Ordering::Relaxed) == 1));
        assert_eq!(monitor.progress(), (100, 100));
    }

    #[test]
    fn test_cancel_stops_new_work() {
        let monitor = TaskMonitor::new();
        monitor.start("Tracing photons", 10);
        assert_eq!(monitor.next_item(), Some(0));
        assert!(monitor.update());
        monitor.cancel();

        assert!(monitor.is_canceled());
        assert_eq!(monitor.next_item(), None);
        assert!(!monitor.update());

        // Cancellation survives a new pass until reset
        monitor.start("Rendering", 5);
        assert_eq!(monitor.next_item(), None);
        monitor.reset();
        assert_eq!(monitor.next_item(), Some(0));
    }
}
