//! Single-flight loader for the chip-emulator module.
//!
//! The module is loaded lazily on first need, exactly once per process.
//! Concurrent callers during the load share the same in-flight attempt;
//! after a failure the loader state resets so a later call retries from
//! scratch. This mirrors the foreign runtime's own expectations: its hook
//! object must be installed before injection, its globals persist after a
//! successful load, and cleanup runs only on failure.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::ChipModule;
use crate::{PlayerError, Result};

/// How long to wait for the module to expose its synthesis entry point.
pub const LOAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between readiness polls during initialization.
pub const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Source of the chip-emulator module.
///
/// `begin` performs the injection: install the pre-initialization hook,
/// start fetching the binary, and return a handle whose
/// [`ChipModule::is_ready`] flips once the runtime has initialized. The
/// loader polls that handle; it never calls `begin` twice for one attempt.
///
/// `cancel` is invoked on failure only (timeout or begin error) and should
/// undo the injection: remove the script element and the hook object. On
/// success the runtime's globals are left installed.
pub trait ModuleSource: Send + Sync {
    /// Start loading and return the (possibly not yet ready) handle.
    fn begin(&self) -> Result<Arc<dyn ChipModule>>;

    /// Undo a failed injection. Default is a no-op.
    fn cancel(&self) {}
}

/// Outcome of a finished load attempt, shared with concurrent waiters.
#[derive(Debug, Clone)]
enum LoadError {
    Timeout,
    Failed(String),
}

impl From<LoadError> for PlayerError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Timeout => PlayerError::LoadTimeout,
            LoadError::Failed(msg) => PlayerError::LoadFailure(msg),
        }
    }
}

enum LoadPhase {
    Unloaded,
    Loading { attempt: u64 },
    Ready(Arc<dyn ChipModule>),
}

struct LoaderState {
    phase: LoadPhase,
    attempt: u64,
    /// Error of the most recently failed attempt, keyed by attempt number
    /// so waiters report the failure of the load they actually joined.
    failure: Option<(u64, LoadError)>,
}

/// Lazily loads the chip-emulator module, collapsing concurrent callers
/// into a single load attempt.
///
/// # Example
///
/// ```ignore
/// let loader = Arc::new(ModuleLoader::new(source));
/// let module = loader.ensure_loaded()?; // blocks until ready or failed
/// ```
pub struct ModuleLoader {
    source: Arc<dyn ModuleSource>,
    state: Mutex<LoaderState>,
    ready: Condvar,
    timeout: Duration,
    poll_interval: Duration,
}

impl ModuleLoader {
    /// Create a loader with the default timeout (10 s) and poll interval (20 ms).
    pub fn new(source: Arc<dyn ModuleSource>) -> Self {
        Self::with_timings(source, LOAD_TIMEOUT, POLL_INTERVAL)
    }

    /// Create a loader with custom timings.
    pub fn with_timings(
        source: Arc<dyn ModuleSource>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            state: Mutex::new(LoaderState {
                phase: LoadPhase::Unloaded,
                attempt: 0,
                failure: None,
            }),
            ready: Condvar::new(),
            timeout,
            poll_interval,
        }
    }

    /// Non-blocking peek at the loaded handle.
    ///
    /// Returns `None` while the module is unloaded or still loading. Used
    /// by the playback controller to decide between rendering and the
    /// module-wait state without blocking the caller.
    pub fn ready_handle(&self) -> Option<Arc<dyn ChipModule>> {
        match &self.state.lock().phase {
            LoadPhase::Ready(handle) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    /// Get the module handle, loading it first if necessary.
    ///
    /// Idempotent and safe to call concurrently: all callers arriving
    /// before resolution share one in-flight load, and all of them observe
    /// that load's outcome. After a failure the loader resets, so the next
    /// call starts a fresh attempt.
    pub fn ensure_loaded(&self) -> Result<Arc<dyn ChipModule>> {
        let mut state = self.state.lock();
        loop {
            match &state.phase {
                LoadPhase::Ready(handle) => return Ok(Arc::clone(handle)),
                LoadPhase::Loading { attempt } => {
                    let joined = *attempt;
                    self.ready.wait(&mut state);
                    if let LoadPhase::Ready(handle) = &state.phase {
                        return Ok(Arc::clone(handle));
                    }
                    if let Some((failed, err)) = &state.failure {
                        if *failed == joined {
                            return Err(err.clone().into());
                        }
                    }
                    // Spurious wake or a newer attempt took over; re-check.
                }
                LoadPhase::Unloaded => {
                    state.attempt += 1;
                    let attempt = state.attempt;
                    state.phase = LoadPhase::Loading { attempt };
                    drop(state);

                    let outcome = self.drive_load();

                    state = self.state.lock();
                    match outcome {
                        Ok(handle) => {
                            state.phase = LoadPhase::Ready(Arc::clone(&handle));
                            state.failure = None;
                            self.ready.notify_all();
                            return Ok(handle);
                        }
                        Err(err) => {
                            state.phase = LoadPhase::Unloaded;
                            state.failure = Some((attempt, err.clone()));
                            self.ready.notify_all();
                            return Err(err.into());
                        }
                    }
                }
            }
        }
    }

    /// Run one load attempt: inject, then poll readiness until the timeout.
    fn drive_load(&self) -> std::result::Result<Arc<dyn ChipModule>, LoadError> {
        let handle = match self.source.begin() {
            Ok(handle) => handle,
            Err(err) => {
                self.source.cancel();
                return Err(LoadError::Failed(err.to_string()));
            }
        };

        let deadline = Instant::now() + self.timeout;
        while !handle.is_ready() {
            if Instant::now() >= deadline {
                self.source.cancel();
                return Err(LoadError::Timeout);
            }
            std::thread::sleep(self.poll_interval);
        }
        Ok(handle)
    }
}
