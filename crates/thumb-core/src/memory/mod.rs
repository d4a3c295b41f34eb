//! Word-backed memory model: regions, sub-word lanes, and the address space.

/// Sub-word lane arithmetic over little-endian word cells.
pub mod lane;
pub use lane::{
    byte_lane, extract_byte, extract_half, merge_byte, merge_half, validate_fetch_alignment,
    validate_half_alignment, validate_word_alignment, BYTE_LANES,
};

/// A single mapped region and its permission flag.
pub mod region;
pub use region::{Hook, HookFn, MemoryFlag, MemoryRegion};

/// The first-match-wins collection of regions with per-class access caches.
pub mod space;
pub use space::AddressSpace;
