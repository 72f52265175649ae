//! PCM rendering over the foreign chip module.
//!
//! A decoded [`EventSequence`] is packed into the module's event-record
//! layout, handed to the synthesis entry point, and read back as a mono
//! sample buffer. All foreign resources (the input block, the module-side
//! output buffer) are held by scoped guards so they are released on every
//! exit path, including mid-render failures.

use std::sync::Arc;

use crate::events::{EventSequence, RegisterEvent};
use crate::module::{BlockPtr, ChipModule};
use crate::{PlayerError, Result, OPM_SAMPLE_RATE};

/// Decay tail appended after the last event, in seconds, so release
/// envelopes finish instead of cutting off.
pub const RELEASE_TAIL_SECONDS: f64 = 0.5;

/// Size of one packed event record in module memory.
///
/// Layout per record: 4-byte little-endian f32 time, 1-byte address,
/// 1-byte value, 2 padding bytes. The module reads the block as a packed
/// C struct array, so this layout is a bit-for-bit binary contract.
pub const EVENT_RECORD_SIZE: usize = 8;

/// Rendered PCM, ready for looping playback.
///
/// Mono: the module emits interleaved stereo but the right channel is
/// discarded during readback; the output sink duplicates the buffer to
/// both channels.
#[derive(Debug, Clone)]
pub struct PreparedAudio {
    /// Mono samples in [-1.0, 1.0].
    pub samples: Arc<[f32]>,
    /// Sample rate in Hz (the exact chip-derived rate, ≈ 55930.4).
    pub sample_rate: f64,
}

impl PreparedAudio {
    /// Number of frames in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if the buffer holds no frames.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Buffer duration in seconds.
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }
}

/// Frame budget for a sequence whose latest event is at `max_time` seconds.
#[must_use]
pub fn frame_budget(max_time: f64) -> usize {
    ((max_time + RELEASE_TAIL_SECONDS) * OPM_SAMPLE_RATE).floor() as usize
}

/// Pack events into the module's record layout, in sequence order.
#[must_use]
pub fn pack_events(events: &[RegisterEvent]) -> Vec<u8> {
    let mut block = vec![0u8; events.len() * EVENT_RECORD_SIZE];
    for (i, event) in events.iter().enumerate() {
        let base = i * EVENT_RECORD_SIZE;
        block[base..base + 4].copy_from_slice(&(event.time as f32).to_le_bytes());
        block[base + 4] = event.address;
        block[base + 5] = event.value;
        // Bytes 6 and 7 stay zero: struct padding in the module's layout.
    }
    block
}

/// Releases the input block when the render call exits.
struct BlockGuard<'a> {
    module: &'a dyn ChipModule,
    ptr: BlockPtr,
}

impl Drop for BlockGuard<'_> {
    fn drop(&mut self) {
        self.module.release(self.ptr);
    }
}

/// Releases the module-side output buffer after readback.
struct OutputGuard<'a> {
    module: &'a dyn ChipModule,
}

impl Drop for OutputGuard<'_> {
    fn drop(&mut self) {
        self.module.release_output_buffer();
    }
}

/// Synthesize PCM for a decoded event sequence.
///
/// Fails with `NoEvents` for an empty sequence (before any foreign
/// allocation), `ModuleNotReady` if the handle has not finished
/// initializing, and `Synthesis` for any foreign failure in between, in
/// which case the input block has still been released exactly once.
pub fn render(sequence: &EventSequence, module: &dyn ChipModule) -> Result<PreparedAudio> {
    if sequence.is_empty() {
        return Err(PlayerError::NoEvents);
    }
    if !module.is_ready() {
        return Err(PlayerError::ModuleNotReady);
    }

    let budget = frame_budget(sequence.max_time());
    let block = pack_events(sequence.events());

    let ptr = module
        .allocate(block.len())
        .map_err(|e| PlayerError::Synthesis(e.to_string()))?;
    let _block_guard = BlockGuard { module, ptr };

    module
        .write_block(ptr, &block)
        .map_err(|e| PlayerError::Synthesis(e.to_string()))?;

    let frames = module
        .synthesize(ptr, sequence.len(), budget)
        .map_err(|e| PlayerError::Synthesis(e.to_string()))?;

    let _output_guard = OutputGuard { module };

    // The module's output is interleaved stereo; keep the left channel only.
    let mut samples = Vec::with_capacity(frames);
    for frame in 0..frames {
        samples.push(module.read_sample(frame * 2));
    }

    Ok(PreparedAudio {
        samples: samples.into(),
        sample_rate: OPM_SAMPLE_RATE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sequence(events: Vec<RegisterEvent>) -> EventSequence {
        EventSequence::from_events(events)
    }

    fn event(time: f64, address: u8, value: u8) -> RegisterEvent {
        RegisterEvent {
            time,
            address,
            value,
        }
    }

    /// Records every foreign call for contract assertions.
    struct RecordingModule {
        ready: bool,
        fail_synthesize: bool,
        allocations: AtomicUsize,
        releases: AtomicUsize,
        output_releases: AtomicUsize,
        written: Mutex<Vec<u8>>,
        requested_budget: AtomicUsize,
        produced_frames: usize,
    }

    impl RecordingModule {
        fn new() -> Self {
            Self {
                ready: true,
                fail_synthesize: false,
                allocations: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                output_releases: AtomicUsize::new(0),
                written: Mutex::new(Vec::new()),
                requested_budget: AtomicUsize::new(0),
                produced_frames: 4,
            }
        }
    }

    impl ChipModule for RecordingModule {
        fn is_ready(&self) -> bool {
            self.ready
        }

        fn allocate(&self, len: usize) -> Result<BlockPtr> {
            self.allocations.fetch_add(1, Ordering::SeqCst);
            Ok(BlockPtr(len as u32))
        }

        fn release(&self, _ptr: BlockPtr) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn write_block(&self, _ptr: BlockPtr, bytes: &[u8]) -> Result<()> {
            *self.written.lock() = bytes.to_vec();
            Ok(())
        }

        fn synthesize(&self, _ptr: BlockPtr, _count: usize, budget: usize) -> Result<usize> {
            self.requested_budget.store(budget, Ordering::SeqCst);
            if self.fail_synthesize {
                return Err(PlayerError::Synthesis("chip exploded".into()));
            }
            Ok(self.produced_frames.min(budget))
        }

        fn read_sample(&self, index: usize) -> f32 {
            // Left channel = 0.5, right channel = -0.5, so the mono
            // readback can be told apart from an interleaved copy.
            if index % 2 == 0 {
                0.5
            } else {
                -0.5
            }
        }

        fn release_output_buffer(&self) {
            self.output_releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_empty_sequence_no_allocation() {
        let module = RecordingModule::new();
        let err = render(&sequence(vec![]), &module).unwrap_err();
        assert!(matches!(err, PlayerError::NoEvents));
        assert_eq!(module.allocations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_module_not_ready() {
        let mut module = RecordingModule::new();
        module.ready = false;
        let err = render(&sequence(vec![event(0.0, 0x20, 0xC7)]), &module).unwrap_err();
        assert!(matches!(err, PlayerError::ModuleNotReady));
        assert_eq!(module.allocations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_packed_record_layout() {
        let block = pack_events(&[event(1.5, 0x20, 0xC7), event(0.25, 0xE0, 0x0F)]);
        assert_eq!(block.len(), 16);

        // Record 0: f32 1.5 LE, addr, value, two zero padding bytes.
        assert_eq!(&block[0..4], &1.5f32.to_le_bytes());
        assert_eq!(block[4], 0x20);
        assert_eq!(block[5], 0xC7);
        assert_eq!(&block[6..8], &[0, 0]);

        // Record 1 at the fixed 8-byte stride.
        assert_eq!(&block[8..12], &0.25f32.to_le_bytes());
        assert_eq!(block[12], 0xE0);
        assert_eq!(block[13], 0x0F);
        assert_eq!(&block[14..16], &[0, 0]);
    }

    #[test]
    fn test_block_size_and_single_release() {
        let module = RecordingModule::new();
        let seq = sequence(vec![event(0.0, 0x20, 0xC7), event(0.5, 0x08, 0x78)]);
        render(&seq, &module).unwrap();

        assert_eq!(module.written.lock().len(), 2 * EVENT_RECORD_SIZE);
        assert_eq!(module.allocations.load(Ordering::SeqCst), 1);
        assert_eq!(module.releases.load(Ordering::SeqCst), 1);
        assert_eq!(module.output_releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_on_synthesis_failure() {
        let mut module = RecordingModule::new();
        module.fail_synthesize = true;
        let seq = sequence(vec![event(0.0, 0x20, 0xC7)]);

        let err = render(&seq, &module).unwrap_err();
        assert!(matches!(err, PlayerError::Synthesis(_)));
        assert_eq!(module.releases.load(Ordering::SeqCst), 1);
        // Synthesis never produced an output buffer to release.
        assert_eq!(module.output_releases.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_left_channel_only() {
        let module = RecordingModule::new();
        let seq = sequence(vec![event(0.0, 0x20, 0xC7)]);
        let audio = render(&seq, &module).unwrap();

        assert_eq!(audio.len(), 4);
        assert!(audio.samples.iter().all(|&s| s == 0.5));
        assert_relative_eq!(audio.sample_rate, OPM_SAMPLE_RATE);
    }

    #[test]
    fn test_frame_budget_exact_rate() {
        // max time 2.0s + 0.5s tail at the exact 3579545/64 Hz rate.
        assert_eq!(frame_budget(2.0), 139_825);
        let module = RecordingModule::new();
        let seq = sequence(vec![event(2.0, 0x08, 0x00)]);
        render(&seq, &module).unwrap();
        assert_eq!(module.requested_budget.load(Ordering::SeqCst), 139_825);
    }

    #[test]
    fn test_produced_frames_may_undershoot_budget() {
        let module = RecordingModule::new();
        let seq = sequence(vec![event(1.0, 0x20, 0xC7)]);
        let audio = render(&seq, &module).unwrap();
        // The module produced 4 frames despite a much larger budget.
        assert_eq!(audio.len(), 4);
        assert!(audio.duration_seconds() < 0.001);
    }
}
