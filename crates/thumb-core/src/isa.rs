//! Instruction-set seam between the processor loop and a concrete decoder.

use crate::encoding::Decoded;
use crate::memory::AddressSpace;
use crate::state::RegisterFile;
use crate::Fault;

/// What a retired instruction did to control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Sequential instruction; the caller advances the program counter by
    /// the encoding width.
    Retired,
    /// The instruction wrote the program counter itself.
    Jumped,
    /// A software interrupt with its request argument; the caller advances
    /// past the instruction and surfaces the argument.
    Interrupt(u32),
}

/// A pluggable decoder and executor pair.
///
/// Decoding is a pure read of memory so the decode cache can be built
/// against a shared borrow; execution takes the mutable state it
/// modifies.
pub trait InstructionSet {
    /// Decodes the instruction at `address` into a (tag, immediate) pair.
    ///
    /// # Errors
    ///
    /// Returns a decode-class fault for encodings outside the supported
    /// set and propagates memory faults from fetching.
    fn decode(&self, memory: &AddressSpace, address: u32) -> Result<Decoded, Fault>;

    /// Executes one pre-decoded instruction at `address`.
    ///
    /// # Errors
    ///
    /// Propagates memory faults from load/store operands and
    /// [`Fault::UnexpectedLogic`] for a placeholder tag.
    fn execute(
        &self,
        registers: &mut RegisterFile,
        memory: &mut AddressSpace,
        address: u32,
        decoded: Decoded,
    ) -> Result<Step, Fault>;
}

/// The ARMv6-M Thumb subset this crate ships.
#[derive(Debug, Clone, Copy, Default)]
pub struct Thumb;

impl InstructionSet for Thumb {
    fn decode(&self, memory: &AddressSpace, address: u32) -> Result<Decoded, Fault> {
        crate::decoder::decode(memory, address)
    }

    fn execute(
        &self,
        registers: &mut RegisterFile,
        memory: &mut AddressSpace,
        address: u32,
        decoded: Decoded,
    ) -> Result<Step, Fault> {
        crate::execute::execute(registers, memory, address, decoded)
    }
}
