//! Conversion pipeline glue.
//!
//! Wires the request sequencer, the conversion and MML seams, attachment
//! normalization and the playback controller together under
//! last-request-wins semantics: every stage captures a token when it
//! starts and re-checks it immediately before publishing, so a slow early
//! request can never clobber a faster later one. Failures become status
//! messages and state resets; nothing panics across a pipeline stage, and
//! stale results vanish silently.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::attachment;
use crate::convert::{parse_conversion_result, SmfConverter};
use crate::mml::MmlCompiler;
use crate::module::ModuleLoader;
use crate::playback::{OutputSink, PlaybackController, PlaybackState};
use crate::render::PreparedAudio;
use crate::request::{Debouncer, RequestSequencer, DEBOUNCE_DELAY};
use crate::Result;

/// Destination for user-facing progress and error messages.
pub trait StatusSink: Send + Sync {
    /// Report normal progress.
    fn status(&self, message: &str);

    /// Report a user-visible failure.
    fn error(&self, message: &str);
}

/// Status sink that discards everything.
#[derive(Debug, Default)]
pub struct NullStatus;

impl StatusSink for NullStatus {
    fn status(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

struct PipelineInner {
    sequencer: Arc<RequestSequencer>,
    converter: Arc<dyn SmfConverter>,
    mml: Mutex<Option<MmlCompiler>>,
    status: Arc<dyn StatusSink>,
    controller: Mutex<PlaybackController>,
    midi: Mutex<Option<Vec<u8>>>,
    attachment: Mutex<String>,
}

impl PipelineInner {
    /// Run one conversion: normalize the attachment, call the engine,
    /// publish the result if this request is still the latest.
    fn convert_now(&self, trigger: &str) {
        let token = self.sequencer.next();

        let Some(midi) = self.midi.lock().clone() else {
            self.status.status("select an SMF file or enter MML first");
            return;
        };

        let attachment_text = self.attachment.lock().clone();
        let attachment_bytes = match attachment::attachment_bytes(&attachment_text) {
            Ok(bytes) => bytes,
            Err(err) => {
                // Rejected locally; the engine is never called.
                self.status.error(&err.to_string());
                return;
            }
        };

        self.status.status(&format!("converting ({trigger})..."));
        let outcome = self
            .converter
            .convert(&midi, &attachment_bytes)
            .and_then(|raw| parse_conversion_result(&raw));

        if !self.sequencer.is_current(token) {
            // A newer request superseded this one while the engine ran.
            return;
        }

        match outcome {
            Ok(report) => {
                let count = report
                    .event_count
                    .unwrap_or(report.sequence.len() as u64);
                self.controller.lock().set_sequence(Some(report.sequence));
                self.status
                    .status(&format!("conversion complete ({count} events)"));
            }
            Err(err) => {
                // Stale data must not stay on display.
                self.controller.lock().set_sequence(None);
                self.status.error(&err.to_string());
            }
        }
    }

    /// Compile debounced MML text into SMF bytes, then convert.
    fn compile_mml(&self, text: String) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            *self.midi.lock() = None;
            self.controller.lock().set_sequence(None);
            self.status.status("enter MML to generate an SMF");
            return;
        }

        let token = self.sequencer.next();
        let compiled = {
            let guard = self.mml.lock();
            let Some(compiler) = guard.as_ref() else {
                self.status.error("MML engine not configured");
                return;
            };
            compiler.compile(trimmed)
        };

        if !self.sequencer.is_current(token) {
            return;
        }

        match compiled {
            Ok(smf) => {
                self.status
                    .status(&format!("MML compiled ({} bytes)", smf.len()));
                *self.midi.lock() = Some(smf);
                self.convert_now("MML edit");
            }
            Err(err) => self.status.error(&err.to_string()),
        }
    }
}

/// The full conversion-to-playback pipeline.
pub struct Pipeline {
    inner: Arc<PipelineInner>,
    attachment_debounce: Debouncer<String>,
    mml_debounce: Debouncer<String>,
}

impl Pipeline {
    /// Create a pipeline with the default debounce delay.
    pub fn new(
        converter: Arc<dyn SmfConverter>,
        loader: Arc<ModuleLoader>,
        sink: Box<dyn OutputSink>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self::with_debounce(converter, loader, sink, status, DEBOUNCE_DELAY)
    }

    /// Create a pipeline with a custom debounce delay.
    pub fn with_debounce(
        converter: Arc<dyn SmfConverter>,
        loader: Arc<ModuleLoader>,
        sink: Box<dyn OutputSink>,
        status: Arc<dyn StatusSink>,
        debounce: Duration,
    ) -> Self {
        let inner = Arc::new(PipelineInner {
            sequencer: Arc::new(RequestSequencer::new()),
            converter,
            mml: Mutex::new(None),
            status,
            controller: Mutex::new(PlaybackController::new(loader, sink)),
            midi: Mutex::new(None),
            attachment: Mutex::new(String::new()),
        });

        let attachment_inner = Arc::clone(&inner);
        let attachment_debounce = Debouncer::new(debounce, move |text: String| {
            *attachment_inner.attachment.lock() = text;
            attachment_inner.convert_now("attachment edit");
        });

        let mml_inner = Arc::clone(&inner);
        let mml_debounce =
            Debouncer::new(debounce, move |text: String| mml_inner.compile_mml(text));

        Self {
            inner,
            attachment_debounce,
            mml_debounce,
        }
    }

    /// Install the MML compiler (parse + lower engines).
    pub fn set_mml_compiler(&self, compiler: MmlCompiler) {
        *self.inner.mml.lock() = Some(compiler);
    }

    /// The request sequencer shared by all pipeline stages.
    #[must_use]
    pub fn sequencer(&self) -> Arc<RequestSequencer> {
        Arc::clone(&self.inner.sequencer)
    }

    /// Install SMF bytes (from a file pick) and convert immediately.
    pub fn load_midi(&self, name: &str, bytes: Vec<u8>) {
        self.inner
            .status
            .status(&format!("loaded {name} ({} bytes)", bytes.len()));
        *self.inner.midi.lock() = Some(bytes);
        self.inner.convert_now("SMF load");
    }

    /// Drop the current SMF and everything derived from it.
    pub fn clear_midi(&self) {
        *self.inner.midi.lock() = None;
        self.inner.controller.lock().set_sequence(None);
        self.inner.status.status("select an SMF file");
    }

    /// Debounced attachment edit: stores the text now, converts after the
    /// quiet period with whatever text is latest by then.
    pub fn set_attachment_text(&self, text: &str) {
        *self.inner.attachment.lock() = text.to_string();
        self.attachment_debounce.schedule(text.to_string());
    }

    /// Debounced MML edit.
    pub fn set_mml_text(&self, text: &str) {
        self.mml_debounce.schedule(text.to_string());
    }

    /// Re-run the conversion for the current inputs.
    pub fn convert_now(&self, trigger: &str) {
        self.inner.convert_now(trigger);
    }

    /// Start (or toggle off) playback.
    pub fn play(&self) -> Result<PlaybackState> {
        self.inner.controller.lock().play()
    }

    /// Stop playback, keeping the cached render.
    pub fn stop(&self) {
        self.inner.controller.lock().stop();
    }

    /// Current playback state.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.inner.controller.lock().state()
    }

    /// True if a non-empty event sequence is installed.
    #[must_use]
    pub fn has_events(&self) -> bool {
        self.inner.controller.lock().has_events()
    }

    /// The cached render, if any (for visualization or export).
    #[must_use]
    pub fn prepared(&self) -> Option<PreparedAudio> {
        self.inner.controller.lock().prepared().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{BlockPtr, ChipModule, ModuleSource};
    use crate::playback::NullSink;
    use crate::RequestSequencer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const ONE_EVENT_LOG: &str =
        r#"{"event_count":1,"events":[{"time":0,"addr":"0x20","data":"0xC7"}]}"#;

    struct ReadyModule;

    impl ChipModule for ReadyModule {
        fn is_ready(&self) -> bool {
            true
        }
        fn allocate(&self, len: usize) -> Result<BlockPtr> {
            Ok(BlockPtr(len as u32))
        }
        fn release(&self, _ptr: BlockPtr) {}
        fn write_block(&self, _ptr: BlockPtr, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }
        fn synthesize(&self, _ptr: BlockPtr, _count: usize, budget: usize) -> Result<usize> {
            Ok(budget.min(32))
        }
        fn read_sample(&self, _index: usize) -> f32 {
            0.2
        }
        fn release_output_buffer(&self) {}
    }

    struct ReadySource;

    impl ModuleSource for ReadySource {
        fn begin(&self) -> Result<Arc<dyn ChipModule>> {
            Ok(Arc::new(ReadyModule))
        }
    }

    fn ready_loader() -> Arc<ModuleLoader> {
        let loader = Arc::new(ModuleLoader::new(Arc::new(ReadySource)));
        loader.ensure_loaded().unwrap();
        loader
    }

    #[derive(Default)]
    struct RecordingStatus {
        messages: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
    }

    impl StatusSink for RecordingStatus {
        fn status(&self, message: &str) {
            self.messages.lock().push(message.to_string());
        }
        fn error(&self, message: &str) {
            self.errors.lock().push(message.to_string());
        }
    }

    struct StaticConverter {
        output: String,
        calls: AtomicUsize,
        attachments: Mutex<Vec<Vec<u8>>>,
    }

    impl StaticConverter {
        fn new(output: &str) -> Arc<Self> {
            Arc::new(Self {
                output: output.to_string(),
                calls: AtomicUsize::new(0),
                attachments: Mutex::new(Vec::new()),
            })
        }
    }

    impl SmfConverter for StaticConverter {
        fn convert(&self, _midi: &[u8], attachment: &[u8]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.attachments.lock().push(attachment.to_vec());
            Ok(self.output.clone())
        }
    }

    fn quick_pipeline(
        converter: Arc<dyn SmfConverter>,
        status: Arc<dyn StatusSink>,
    ) -> Pipeline {
        Pipeline::with_debounce(
            converter,
            ready_loader(),
            Box::new(NullSink),
            status,
            Duration::from_millis(100),
        )
    }

    #[test]
    fn test_load_midi_installs_sequence() {
        let converter = StaticConverter::new(ONE_EVENT_LOG);
        let status = Arc::new(RecordingStatus::default());
        let pipeline = quick_pipeline(converter.clone(), status.clone());

        pipeline.load_midi("song.mid", vec![0x4D, 0x54, 0x68, 0x64]);

        assert!(pipeline.has_events());
        assert_eq!(converter.calls.load(Ordering::SeqCst), 1);
        assert!(status
            .messages
            .lock()
            .iter()
            .any(|m| m.contains("conversion complete (1 events)")));
    }

    #[test]
    fn test_engine_error_clears_state() {
        let converter = StaticConverter::new(r#"{"error":"bad SMF"}"#);
        let status = Arc::new(RecordingStatus::default());
        let pipeline = quick_pipeline(converter, status.clone());

        pipeline.load_midi("song.mid", vec![1, 2, 3]);

        assert!(!pipeline.has_events());
        assert_eq!(pipeline.state(), PlaybackState::Idle);
        assert!(status.errors.lock().iter().any(|m| m.contains("bad SMF")));
    }

    #[test]
    fn test_invalid_attachment_never_reaches_engine() {
        let converter = StaticConverter::new(ONE_EVENT_LOG);
        let status = Arc::new(RecordingStatus::default());
        let pipeline = quick_pipeline(converter.clone(), status.clone());

        *pipeline.inner.midi.lock() = Some(vec![1]);
        *pipeline.inner.attachment.lock() = "{ not json".to_string();
        pipeline.convert_now("test");

        assert_eq!(converter.calls.load(Ordering::SeqCst), 0);
        assert!(!status.errors.lock().is_empty());
    }

    #[test]
    fn test_debounced_edits_batch_to_final_text() {
        let converter = StaticConverter::new(ONE_EVENT_LOG);
        let status = Arc::new(RecordingStatus::default());
        let pipeline = quick_pipeline(converter.clone(), status);
        *pipeline.inner.midi.lock() = Some(vec![1]);

        // Two edits inside one debounce window.
        pipeline.set_attachment_text(r#"{"Tones":{"0":{"events":[]}}}"#);
        std::thread::sleep(Duration::from_millis(40));
        pipeline.set_attachment_text(r#"{"Tones":{"1":{"events":[]}}}"#);

        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(converter.calls.load(Ordering::SeqCst), 1);

        let attachments = converter.attachments.lock();
        let sent = String::from_utf8(attachments[0].clone()).unwrap();
        assert!(sent.contains("\"1\""));
    }

    /// Converter that simulates a newer request arriving while it runs.
    struct SupersededConverter {
        sequencer: Mutex<Option<Arc<RequestSequencer>>>,
    }

    impl SmfConverter for SupersededConverter {
        fn convert(&self, _midi: &[u8], _attachment: &[u8]) -> Result<String> {
            if let Some(sequencer) = self.sequencer.lock().as_ref() {
                sequencer.next();
            }
            Ok(ONE_EVENT_LOG.to_string())
        }
    }

    #[test]
    fn test_stale_result_dropped_silently() {
        let converter = Arc::new(SupersededConverter {
            sequencer: Mutex::new(None),
        });
        let status = Arc::new(RecordingStatus::default());
        let pipeline = quick_pipeline(converter.clone(), status.clone());
        *converter.sequencer.lock() = Some(pipeline.sequencer());

        pipeline.load_midi("song.mid", vec![1]);

        // The result resolved fine, but a newer token was issued mid-flight:
        // nothing is published, no error is surfaced.
        assert!(!pipeline.has_events());
        assert!(status.errors.lock().is_empty());
    }

    #[test]
    fn test_play_after_conversion() {
        let converter = StaticConverter::new(ONE_EVENT_LOG);
        let pipeline = quick_pipeline(converter, Arc::new(NullStatus));

        pipeline.load_midi("song.mid", vec![1]);
        assert_eq!(pipeline.play().unwrap(), PlaybackState::Playing);
        assert_eq!(pipeline.play().unwrap(), PlaybackState::Ready);
        assert!(pipeline.prepared().is_some());
    }

    #[test]
    fn test_blank_mml_clears_state() {
        let converter = StaticConverter::new(ONE_EVENT_LOG);
        let pipeline = quick_pipeline(converter, Arc::new(NullStatus));
        pipeline.load_midi("song.mid", vec![1]);
        assert!(pipeline.has_events());

        pipeline.inner.compile_mml("   ".to_string());
        assert!(!pipeline.has_events());
        assert!(pipeline.inner.midi.lock().is_none());
    }
}
