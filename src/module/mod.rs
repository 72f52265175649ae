//! Foreign chip-emulator module interface.
//!
//! The YM2151 emulator is an external, pre-built binary consumed through a
//! small foreign-memory contract. This module defines that contract as the
//! [`ChipModule`] trait, so the real binary, mocks and the built-in test
//! tone are interchangeable, and provides the [`ModuleLoader`] that brings
//! the module up exactly once per process.

mod loader;
#[cfg(feature = "testtone")]
mod testtone;

pub use loader::{ModuleLoader, ModuleSource, LOAD_TIMEOUT, POLL_INTERVAL};
#[cfg(feature = "testtone")]
pub use testtone::{TestToneModule, TestToneSource};

use crate::Result;

/// Opaque pointer into the foreign module's memory.
///
/// Only meaningful to the module that issued it; never dereferenced on the
/// host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockPtr(pub u32);

/// Capability contract of the chip-emulator module.
///
/// Implementations use interior mutability: all methods take `&self` so the
/// handle can be shared as an `Arc<dyn ChipModule>` singleton, mutated only
/// by its own internals.
///
/// # Memory discipline
///
/// Every block obtained from [`allocate`](ChipModule::allocate) is owned by
/// exactly one render call and must be handed back to
/// [`release`](ChipModule::release) by that same call, on every exit path.
/// The synthesis output buffer lives inside the module until
/// [`release_output_buffer`](ChipModule::release_output_buffer) is called.
pub trait ChipModule: Send + Sync {
    /// True once the synthesis entry point is exposed.
    ///
    /// The loader polls this during initialization; renders against a
    /// not-ready handle fail with `ModuleNotReady`.
    fn is_ready(&self) -> bool;

    /// Allocate `len` bytes of module memory and return a pointer to it.
    fn allocate(&self, len: usize) -> Result<BlockPtr>;

    /// Free a block previously returned by [`allocate`](ChipModule::allocate).
    fn release(&self, ptr: BlockPtr);

    /// Copy `bytes` into module memory at `ptr`.
    ///
    /// The bytes are packed event records: 4-byte little-endian f32 time,
    /// 1-byte address, 1-byte value, 2 padding bytes per event. The module
    /// reads them as a packed C struct array, so the layout is a binary
    /// contract (see [`crate::render::pack_events`]).
    fn write_block(&self, ptr: BlockPtr, bytes: &[u8]) -> Result<()>;

    /// Run synthesis over `event_count` packed records at `ptr`, producing
    /// up to `frame_budget` frames into the module's output buffer.
    ///
    /// Returns the number of frames actually produced (may be less than the
    /// budget). The output buffer holds interleaved stereo samples.
    fn synthesize(&self, ptr: BlockPtr, event_count: usize, frame_budget: usize) -> Result<usize>;

    /// Read one sample from the interleaved stereo output buffer.
    ///
    /// Out-of-range indices yield silence (0.0).
    fn read_sample(&self, index: usize) -> f32;

    /// Free the module-side output buffer of the last synthesis call.
    fn release_output_buffer(&self);
}
