//! Playback state machine.
//!
//! [`PlaybackController`] owns the single live `PreparedAudio` and output
//! session. A new conversion result invalidates both; `play` renders on
//! demand and starts a looping session; `stop` keeps the rendered audio
//! cached so replay skips re-synthesis. Output sources are single-use:
//! every transition into `Playing` binds a fresh loopable source to the
//! cached buffer.

use std::sync::Arc;

use crate::events::EventSequence;
use crate::module::ModuleLoader;
use crate::render::{render, PreparedAudio};
use crate::{PlayerError, Result};

/// Playback state of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// No prepared audio (nothing rendered yet, or source invalidated).
    #[default]
    Idle,
    /// Render in progress.
    Preparing,
    /// The chip module has not finished loading; playback stays disabled
    /// until it does.
    WaitingForModule,
    /// Rendered audio cached, not playing.
    Ready,
    /// Looped output session active.
    Playing,
}

/// Destination for looping playback.
///
/// The source bound by `start_loop` is single-use: a stopped source is
/// never restarted, so every call constructs a fresh one. Implementations
/// must duplicate the mono buffer to both output channels.
pub trait OutputSink: Send {
    /// Begin looping the prepared audio. Any previous loop is stopped first.
    fn start_loop(&mut self, audio: &PreparedAudio) -> Result<()>;

    /// Disconnect and release the current output source, if any.
    fn stop(&mut self);
}

/// Output sink that discards audio. Useful headless and in tests.
#[derive(Debug, Default)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn start_loop(&mut self, _audio: &PreparedAudio) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}
}

/// Owns playback state, the cached render and the output session.
pub struct PlaybackController {
    loader: Arc<ModuleLoader>,
    sink: Box<dyn OutputSink>,
    sequence: Option<EventSequence>,
    prepared: Option<PreparedAudio>,
    state: PlaybackState,
}

impl PlaybackController {
    /// Create a controller over a module loader and an output sink.
    pub fn new(loader: Arc<ModuleLoader>, sink: Box<dyn OutputSink>) -> Self {
        Self {
            loader,
            sink,
            sequence: None,
            prepared: None,
            state: PlaybackState::Idle,
        }
    }

    /// Current playback state.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// The cached render, if any (for visualization).
    #[must_use]
    pub fn prepared(&self) -> Option<&PreparedAudio> {
        self.prepared.as_ref()
    }

    /// True if a source sequence with at least one event is installed.
    #[must_use]
    pub fn has_events(&self) -> bool {
        self.sequence.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// Install a new conversion result, or clear it with `None`.
    ///
    /// Forces `Idle` from any state: the active session stops and the
    /// cached render is discarded. The new sequence owns all derived
    /// artifacts from here on.
    pub fn set_sequence(&mut self, sequence: Option<EventSequence>) {
        self.sink.stop();
        self.prepared = None;
        self.sequence = sequence;
        self.state = PlaybackState::Idle;
    }

    /// Start playback, rendering first if nothing is cached.
    ///
    /// Toggle semantics: called while `Playing`, stops instead and returns
    /// `Ready`. On `ModuleNotReady` the controller parks in
    /// `WaitingForModule`; call `play` again once the module has loaded.
    pub fn play(&mut self) -> Result<PlaybackState> {
        if self.state == PlaybackState::Playing {
            self.sink.stop();
            self.state = PlaybackState::Ready;
            return Ok(self.state);
        }

        if self.prepared.is_none() {
            self.prepare()?;
        }

        // prepare() either cached audio or returned an error above.
        let Some(audio) = self.prepared.as_ref() else {
            return Err(PlayerError::NoEvents);
        };

        match self.sink.start_loop(audio) {
            Ok(()) => {
                self.state = PlaybackState::Playing;
                Ok(self.state)
            }
            Err(err) => {
                // The render stays cached; only the session failed.
                self.state = PlaybackState::Ready;
                Err(err)
            }
        }
    }

    /// Stop the active session, keeping the cached render for replay.
    ///
    /// A no-op unless playing.
    pub fn stop(&mut self) {
        if self.state == PlaybackState::Playing {
            self.sink.stop();
            self.state = PlaybackState::Ready;
        }
    }

    /// Render the current sequence into the cache.
    fn prepare(&mut self) -> Result<()> {
        let Some(sequence) = self.sequence.clone() else {
            return Err(PlayerError::NoEvents);
        };

        let Some(module) = self.loader.ready_handle() else {
            self.state = PlaybackState::WaitingForModule;
            return Err(PlayerError::ModuleNotReady);
        };

        self.state = PlaybackState::Preparing;
        match render(&sequence, module.as_ref()) {
            Ok(audio) => {
                self.prepared = Some(audio);
                self.state = PlaybackState::Ready;
                Ok(())
            }
            Err(err @ PlayerError::ModuleNotReady) => {
                self.state = PlaybackState::WaitingForModule;
                Err(err)
            }
            Err(err) => {
                // Derived state resets; the source sequence stays intact.
                self.prepared = None;
                self.state = PlaybackState::Idle;
                Err(err)
            }
        }
    }
}
