//! YM2151 register-log playback pipeline
//!
//! Turns timestamped YM2151 (OPM) register-write logs into playable PCM
//! audio and a waveform trace. Synthesis itself happens inside an external
//! chip-emulator module consumed through a foreign-memory contract; this
//! crate owns everything around that call: module loading, event decoding,
//! memory lifetime, playback state and request sequencing.
//!
//! # Features
//! - Lazy, single-flight loading of the chip-emulator module with timeout
//!   and retry (`module`)
//! - Permissive decoding of heterogeneous event JSON into a canonical
//!   `(time, address, value)` sequence (`events`)
//! - PCM rendering over the module's packed-struct memory contract, with
//!   scoped acquisition of all foreign resources (`render`)
//! - Looping playback with an `Idle`/`Preparing`/`Ready`/`Playing` state
//!   machine and single-use output sources (`playback`)
//! - Fixed-width waveform traces for display (`visualize`)
//! - Last-request-wins sequencing and debounced text inputs (`request`)
//! - Tone-attachment normalization and the conversion/MML seams that feed
//!   the pipeline (`attachment`, `convert`, `mml`, `pipeline`)
//!
//! # Crate feature flags
//! - `visualization` (default): Waveform trace helpers (`visualize`)
//! - `streaming` (opt-in): Looping audio output (enables optional `rodio` dep)
//! - `export-wav` (opt-in): WAV export of rendered PCM (enables `hound`)
//! - `testtone` (opt-in): Built-in non-accurate test module, so the pipeline
//!   can be exercised without the real emulator binary
//!
//! # Quick start
//! ```no_run
//! # #[cfg(feature = "testtone")]
//! # fn main() -> ym2151_player::Result<()> {
//! use std::sync::Arc;
//! use ym2151_player::module::{ModuleLoader, TestToneSource};
//! use ym2151_player::{decode, render};
//!
//! let loader = ModuleLoader::new(Arc::new(TestToneSource::new()));
//! let module = loader.ensure_loaded()?;
//!
//! let log = r#"{"events":[{"time":0,"addr":"0x20","data":"0xC7"}]}"#;
//! let sequence = decode(log);
//! let audio = render(&sequence, module.as_ref())?;
//! println!("{} frames at {} Hz", audio.len(), audio.sample_rate);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "testtone"))]
//! # fn main() {}
//! ```

#![warn(missing_docs)]

// Error handling
mod error;
pub use error::{PlayerError, Result};

// Domain modules
pub mod attachment; // Tone attachment validation and normalization
pub mod convert; // Conversion engine seam
pub mod events; // Event log decoding
pub mod mml; // MML compiler seam
pub mod module; // Foreign chip-module interface and loader
pub mod pipeline; // Conversion pipeline glue
pub mod playback; // Playback state machine
pub mod render; // PCM rendering over the foreign module
pub mod request; // Request sequencing and debouncing

#[cfg(feature = "export-wav")]
pub mod export; // WAV export
#[cfg(feature = "streaming")]
pub mod streaming; // Audio output sink
#[cfg(feature = "visualization")]
pub mod visualize; // Waveform traces

// Public API exports
pub use convert::{parse_conversion_result, ConversionReport, SmfConverter};
pub use events::{decode, decode_value, EventSequence, RegisterEvent};
pub use module::{BlockPtr, ChipModule, ModuleLoader, ModuleSource};
pub use pipeline::{NullStatus, Pipeline, StatusSink};
pub use playback::{NullSink, OutputSink, PlaybackController, PlaybackState};
pub use render::{render, PreparedAudio};
pub use request::{Debouncer, RequestSequencer, RequestToken};

#[cfg(feature = "export-wav")]
pub use export::export_to_wav;
#[cfg(feature = "streaming")]
pub use streaming::RodioSink;
#[cfg(feature = "visualization")]
pub use visualize::WaveformTrace;

// ============================================================================
// Common Constants
// ============================================================================

/// YM2151 master clock frequency on the reference hardware (in Hz).
pub const OPM_CLOCK_HZ: f64 = 3_579_545.0;

/// Clock divisor between master clock and one output frame.
pub const CLOCK_STEP: f64 = 64.0;

/// Output sample rate of the chip module (≈ 55930.4 Hz).
///
/// This is the exact derived value `OPM_CLOCK_HZ / CLOCK_STEP`, never a
/// rounded literal: it feeds both output-buffer construction and duration
/// math, and the two must agree bit-for-bit.
pub const OPM_SAMPLE_RATE: f64 = OPM_CLOCK_HZ / CLOCK_STEP;
