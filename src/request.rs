//! Request sequencing and input debouncing.
//!
//! Overlapping user actions (rapid file picks, keystrokes outrunning the
//! debounce window) are resolved last-request-wins: every asynchronous
//! stage captures a [`RequestToken`] when it starts and checks
//! [`RequestSequencer::is_current`] immediately before publishing. A stale
//! result is dropped without side effects; cancellation here is advisory,
//! since an in-flight foreign call cannot be aborted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Fixed delay for debounced free-text inputs.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(400);

/// Monotonically increasing identifier of one user-triggered request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

/// Issues strictly increasing request tokens and remembers the latest.
///
/// Process-wide state, injected where needed as an `Arc`.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    /// Create a sequencer with no requests issued yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next token, making it the current one.
    pub fn next(&self) -> RequestToken {
        RequestToken(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// True iff `token` is the most recently issued one.
    #[must_use]
    pub fn is_current(&self, token: RequestToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.0
    }
}

struct DebounceState<T> {
    pending: Option<(Instant, T)>,
    shutdown: bool,
}

struct DebounceShared<T> {
    state: Mutex<DebounceState<T>>,
    signal: Condvar,
}

/// Fixed-delay deferred callback for free-text inputs.
///
/// Each [`schedule`](Debouncer::schedule) clears and replaces the pending
/// payload and restarts the delay, so a burst of edits fires the callback
/// once, with the final content. This is batching, not cancellation: once
/// the callback has started it runs to completion.
pub struct Debouncer<T: Send + 'static> {
    shared: Arc<DebounceShared<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    /// Create a debouncer firing `callback` after `delay` of quiet.
    pub fn new<F>(delay: Duration, callback: F) -> Self
    where
        F: Fn(T) + Send + 'static,
    {
        let shared = Arc::new(DebounceShared {
            state: Mutex::new(DebounceState {
                pending: None,
                shutdown: false,
            }),
            signal: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || {
            run_debounce_loop(worker_shared, delay, callback);
        });

        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Replace the pending payload and restart the delay.
    pub fn schedule(&self, payload: T) {
        // The deadline is fixed at schedule time; the worker reads it back.
        let mut state = self.shared.state.lock();
        state.pending = Some((Instant::now(), payload));
        self.shared.signal.notify_all();
    }
}

impl<T: Send + 'static> Drop for Debouncer<T> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.pending = None;
            self.shared.signal.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_debounce_loop<T, F>(shared: Arc<DebounceShared<T>>, delay: Duration, callback: F)
where
    T: Send + 'static,
    F: Fn(T) + Send + 'static,
{
    let mut state = shared.state.lock();
    loop {
        if state.shutdown {
            return;
        }

        match &state.pending {
            None => {
                shared.signal.wait(&mut state);
            }
            Some((scheduled_at, _)) => {
                let deadline = *scheduled_at + delay;
                let now = Instant::now();
                if now < deadline {
                    let _ = shared.signal.wait_until(&mut state, deadline);
                    // Re-check: a newer schedule may have moved the deadline.
                    continue;
                }
                if let Some((_, payload)) = state.pending.take() {
                    // Run the callback without holding the lock, so it can
                    // schedule follow-up work.
                    drop(state);
                    callback(payload);
                    state = shared.state.lock();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_strictly_increase() {
        let seq = RequestSequencer::new();
        let a = seq.next();
        let b = seq.next();
        let c = seq.next();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert!(!seq.is_current(a));
        assert!(!seq.is_current(b));
        assert!(seq.is_current(c));
    }

    #[test]
    fn test_out_of_order_resolution_applies_last_only() {
        let seq = RequestSequencer::new();
        let tokens: Vec<RequestToken> = (0..5).map(|_| seq.next()).collect();

        // Resolve in scrambled order; only the last-issued token may publish.
        let mut applied = Vec::new();
        for &token in &[tokens[2], tokens[0], tokens[4], tokens[1], tokens[3]] {
            if seq.is_current(token) {
                applied.push(token);
            }
        }
        assert_eq!(applied, vec![tokens[4]]);
    }

    #[test]
    fn test_debounce_batches_rapid_edits() {
        let fired: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let debouncer = Debouncer::new(Duration::from_millis(120), move |text: String| {
            sink.lock().push(text);
        });

        // Two edits 60ms apart, inside the 120ms window.
        debouncer.schedule("first".to_string());
        std::thread::sleep(Duration::from_millis(60));
        debouncer.schedule("final".to_string());

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(*fired.lock(), vec!["final".to_string()]);
    }

    #[test]
    fn test_debounce_fires_again_after_quiet() {
        let count = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&count);
        let debouncer = Debouncer::new(Duration::from_millis(40), move |_: ()| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        debouncer.schedule(());
        std::thread::sleep(Duration::from_millis(120));
        debouncer.schedule(());
        std::thread::sleep(Duration::from_millis(120));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_discards_pending() {
        let count = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&count);
        let debouncer = Debouncer::new(Duration::from_millis(200), move |_: ()| {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        debouncer.schedule(());
        drop(debouncer);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
