//! Lazily-built decode cache over the executable region.
//!
//! The cache holds one pre-decoded slot per halfword of the executable
//! region. A 32-bit encoding occupies its first halfword's slot; the slot
//! of its second halfword is never consulted because the fetch loop
//! advances by the decoded width. Decode errors are swallowed into the
//! [`Op::Fault`] placeholder at build time so a firmware image with data
//! pools interleaved in code still caches cleanly; the fault only
//! surfaces if execution actually reaches that slot.

use crate::encoding::{Decoded, Op};
use crate::isa::InstructionSet;
use crate::memory::AddressSpace;
use crate::Fault;

/// Pre-decoded (tag, immediate) pairs covering the executable region.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExecutionCache {
    begin: u32,
    slots: Box<[Decoded]>,
}

impl ExecutionCache {
    /// Decodes every halfword of the executable region into a slot table.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnexpectedLogic`] when no executable region is
    /// mapped or the decoder yields the reserved placeholder tag, and
    /// propagates any non-decode fault (such as a memory fault while
    /// reading the second halfword of a wide encoding).
    pub fn build(space: &AddressSpace, isa: &dyn InstructionSet) -> Result<Self, Fault> {
        let region = space
            .exec_region()
            .ok_or(Fault::UnexpectedLogic { address: 0 })?;
        #[allow(clippy::cast_possible_truncation)]
        let begin = region.begin() as u32;
        let size = region.size();

        let mut slots = Vec::with_capacity((size / 2) as usize);
        for offset in (0..size).step_by(2) {
            let address = begin + offset;
            let slot = match isa.decode(space, address) {
                Ok(decoded) if decoded.op == Op::Fault => {
                    return Err(Fault::UnexpectedLogic { address });
                }
                Ok(decoded) => decoded,
                Err(fault) if fault.is_decode() => Decoded {
                    op: Op::Fault,
                    imm: 0,
                },
                Err(fault) => return Err(fault),
            };
            slots.push(slot);
        }

        Ok(Self {
            begin,
            slots: slots.into_boxed_slice(),
        })
    }

    /// First address covered by the cache.
    #[must_use]
    pub const fn begin(&self) -> u32 {
        self.begin
    }

    /// Whether `address` falls on a cached halfword slot.
    #[must_use]
    pub const fn contains(&self, address: u32) -> bool {
        address % 2 == 0
            && address >= self.begin
            && (((address - self.begin) / 2) as usize) < self.slots.len()
    }

    /// The pre-decoded slot for `address`.
    ///
    /// Callers must check [`Self::contains`] first; an out-of-range
    /// address yields `None`.
    #[must_use]
    pub fn lookup(&self, address: u32) -> Option<Decoded> {
        if address % 2 != 0 || address < self.begin {
            return None;
        }
        self.slots.get(((address - self.begin) / 2) as usize).copied()
    }

    /// Number of halfword slots in the cache.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the cache covers zero halfwords.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
