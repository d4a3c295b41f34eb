//! Architectural CPU state model primitives.

/// Register file and `APSR` flag model.
pub mod registers;

pub use registers::{
    RegisterFile, APSR_ACTIVE_MASK, APSR_C, APSR_N, APSR_V, APSR_Z, LR, PC, REGISTER_COUNT, SP,
};
