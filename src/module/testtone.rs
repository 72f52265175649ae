//! Built-in test module (deliberately non-accurate).
//!
//! [`TestToneModule`] honors the full foreign-memory contract (pointer
//! allocation, packed event records, interleaved stereo output) but
//! synthesizes a plain sine instead of FM audio. It exists so the pipeline,
//! the CLI demo and the integration tests can run without the real emulator
//! binary. It sounds nothing like a YM2151 on purpose.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{BlockPtr, ChipModule, ModuleSource};
use crate::render::EVENT_RECORD_SIZE;
use crate::{PlayerError, Result, OPM_SAMPLE_RATE};

/// Test tone frequency in Hz.
const TONE_HZ: f64 = 440.0;

/// Test tone amplitude.
const TONE_LEVEL: f32 = 0.25;

struct Heap {
    next: u32,
    blocks: HashMap<u32, Vec<u8>>,
    output: Vec<f32>,
}

/// In-process stand-in for the chip-emulator module.
///
/// Synthesis reads the packed records back out of module memory, so the
/// 8-byte layout is genuinely exercised, and produces a sine from the
/// earliest event time to the end of the frame budget.
pub struct TestToneModule {
    ready_at: Instant,
    heap: Mutex<Heap>,
}

impl TestToneModule {
    /// Create a module that is ready immediately.
    pub fn new() -> Self {
        Self::with_warmup(Duration::ZERO)
    }

    /// Create a module that reports ready only after `warmup` has elapsed,
    /// for exercising the loader's poll and the playback wait state.
    pub fn with_warmup(warmup: Duration) -> Self {
        Self {
            ready_at: Instant::now() + warmup,
            heap: Mutex::new(Heap {
                next: 8,
                blocks: HashMap::new(),
                output: Vec::new(),
            }),
        }
    }
}

impl Default for TestToneModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ChipModule for TestToneModule {
    fn is_ready(&self) -> bool {
        Instant::now() >= self.ready_at
    }

    fn allocate(&self, len: usize) -> Result<BlockPtr> {
        let mut heap = self.heap.lock();
        let ptr = heap.next;
        heap.next += len.max(1) as u32;
        heap.blocks.insert(ptr, vec![0; len]);
        Ok(BlockPtr(ptr))
    }

    fn release(&self, ptr: BlockPtr) {
        self.heap.lock().blocks.remove(&ptr.0);
    }

    fn write_block(&self, ptr: BlockPtr, bytes: &[u8]) -> Result<()> {
        let mut heap = self.heap.lock();
        let block = heap
            .blocks
            .get_mut(&ptr.0)
            .ok_or_else(|| PlayerError::Synthesis("write to unallocated block".into()))?;
        if bytes.len() > block.len() {
            return Err(PlayerError::Synthesis("write past end of block".into()));
        }
        block[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn synthesize(&self, ptr: BlockPtr, event_count: usize, frame_budget: usize) -> Result<usize> {
        let mut heap = self.heap.lock();
        let block = heap
            .blocks
            .get(&ptr.0)
            .ok_or_else(|| PlayerError::Synthesis("synthesize on unallocated block".into()))?;
        if block.len() < event_count * EVENT_RECORD_SIZE {
            return Err(PlayerError::Synthesis("event block too small".into()));
        }

        // Decode the packed records the same way the real module does:
        // little-endian f32 time at offset 0 of each 8-byte record.
        let mut start_time = f64::MAX;
        for i in 0..event_count {
            let base = i * EVENT_RECORD_SIZE;
            let time = f32::from_le_bytes([
                block[base],
                block[base + 1],
                block[base + 2],
                block[base + 3],
            ]);
            start_time = start_time.min(time as f64);
        }
        if event_count == 0 {
            start_time = 0.0;
        }

        let mut output = Vec::with_capacity(frame_budget * 2);
        for frame in 0..frame_budget {
            let t = frame as f64 / OPM_SAMPLE_RATE;
            let sample = if t >= start_time {
                (TONE_LEVEL as f64 * (std::f64::consts::TAU * TONE_HZ * (t - start_time)).sin())
                    as f32
            } else {
                0.0
            };
            output.push(sample);
            output.push(sample);
        }
        heap.output = output;
        Ok(frame_budget)
    }

    fn read_sample(&self, index: usize) -> f32 {
        self.heap.lock().output.get(index).copied().unwrap_or(0.0)
    }

    fn release_output_buffer(&self) {
        self.heap.lock().output.clear();
    }
}

/// Module source serving a [`TestToneModule`].
pub struct TestToneSource {
    warmup: Duration,
}

impl TestToneSource {
    /// Source whose module is ready immediately.
    pub fn new() -> Self {
        Self {
            warmup: Duration::ZERO,
        }
    }

    /// Source whose module becomes ready after `warmup`.
    pub fn with_warmup(warmup: Duration) -> Self {
        Self { warmup }
    }
}

impl Default for TestToneSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleSource for TestToneSource {
    fn begin(&self) -> Result<Arc<dyn ChipModule>> {
        Ok(Arc::new(TestToneModule::with_warmup(self.warmup)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_write_release() {
        let module = TestToneModule::new();
        let ptr = module.allocate(16).unwrap();
        module.write_block(ptr, &[1; 16]).unwrap();
        assert!(module.write_block(ptr, &[1; 17]).is_err());
        module.release(ptr);
        assert!(module.write_block(ptr, &[1]).is_err());
    }

    #[test]
    fn test_synthesize_fills_budget() {
        let module = TestToneModule::new();
        let ptr = module.allocate(EVENT_RECORD_SIZE).unwrap();
        let mut record = [0u8; EVENT_RECORD_SIZE];
        record[..4].copy_from_slice(&0.0f32.to_le_bytes());
        module.write_block(ptr, &record).unwrap();

        let frames = module.synthesize(ptr, 1, 1000).unwrap();
        assert_eq!(frames, 1000);

        // Interleaved stereo: both channels carry the tone.
        let left = module.read_sample(100 * 2);
        let right = module.read_sample(100 * 2 + 1);
        assert_eq!(left, right);
        assert!((0..2000).any(|i| module.read_sample(i).abs() > 0.01));

        module.release_output_buffer();
        assert_eq!(module.read_sample(0), 0.0);
        module.release(ptr);
    }

    #[test]
    fn test_silence_before_first_event() {
        let module = TestToneModule::new();
        let ptr = module.allocate(EVENT_RECORD_SIZE).unwrap();
        let mut record = [0u8; EVENT_RECORD_SIZE];
        record[..4].copy_from_slice(&0.01f32.to_le_bytes());
        module.write_block(ptr, &record).unwrap();

        module.synthesize(ptr, 1, 2000).unwrap();
        // Frames before the event time are silent.
        assert_eq!(module.read_sample(0), 0.0);
        module.release_output_buffer();
        module.release(ptr);
    }

    #[test]
    fn test_warmup_readiness() {
        let module = TestToneModule::with_warmup(Duration::from_millis(30));
        assert!(!module.is_ready());
        std::thread::sleep(Duration::from_millis(40));
        assert!(module.is_ready());
    }
}
