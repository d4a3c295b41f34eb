//! Thumb microcontroller core: word-backed memory model, pre-decoding
//! execution cache, and a stepped fetch-decode-execute processor.

/// Fault taxonomy shared by the memory model, decoder and processor.
pub mod fault;
pub use fault::{Fault, FaultClass};

/// Word-backed memory model: lanes, regions and the address space.
pub mod memory;
pub use memory::{AddressSpace, Hook, HookFn, MemoryFlag, MemoryRegion};

/// Architectural register file and APSR flags.
pub mod state;
pub use state::{
    RegisterFile, APSR_ACTIVE_MASK, APSR_C, APSR_N, APSR_V, APSR_Z, LR, PC, REGISTER_COUNT, SP,
};

/// Decoded instruction representation and operand packing.
pub mod encoding;
pub use encoding::{arg_imm, arg_ra, arg_rb, arg_rd, pack_args, AluOp, Decoded, Op};

/// Instruction-set seam: decoder/executor trait and the Thumb subset.
pub mod isa;
pub use isa::{InstructionSet, Step, Thumb};

/// Thumb halfword decoder.
pub mod decoder;
pub use decoder::decode;

/// Pre-decoded slot table over the executable region.
pub mod exec_cache;
pub use exec_cache::ExecutionCache;

/// Instruction executor.
pub mod execute;
pub use execute::execute as execute_instruction;

/// The processor loop.
pub mod cpu;
pub use cpu::{Control, Cpu, Event, Handler, RunOutcome};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
