//! Fault taxonomy raised by mapping, memory access, decode and execution.

use thiserror::Error;

/// Fault classes used for aggregation and handler policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Region mapping rejected at setup time.
    Config,
    /// Access outside any mapped region or against its flag policy.
    Memory,
    /// Sub-word access at an unsupported address/width combination.
    Alignment,
    /// Decoder rejected an instruction encoding.
    Decode,
    /// Core invariant violation; never recoverable.
    Internal,
}

/// Stable fault taxonomy raised by mapping, memory access, and decode paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Fault {
    /// Region byte count is not a multiple of the 4-byte word granule.
    #[error("region size {size:#x} is not a multiple of 4")]
    InvalidSize {
        /// Rejected region size in bytes.
        size: u32,
    },
    /// A second execute-read region was mapped while one is active.
    #[error("executable region already mapped at {existing:#010x}")]
    DuplicateExecutableRegion {
        /// Base address of the already-mapped executable region.
        existing: u64,
    },
    /// No mapped region covers the access, or the region flag forbids it.
    #[error("invalid memory access at {address:#010x}")]
    InvalidMemoryAccess {
        /// Faulting access address.
        address: u32,
    },
    /// Multi-byte access at an address the word-lane model cannot serve.
    #[error("misaligned {size}-byte access at {address:#010x}")]
    AlignmentFault {
        /// Faulting access address.
        address: u32,
        /// Access width in bytes.
        size: u8,
    },
    /// Halfword does not match any known instruction encoding.
    #[error("unknown instruction {halfword:#06x} at {address:#010x}")]
    UnknownInstruction {
        /// Address of the offending halfword.
        address: u32,
        /// Raw halfword that failed to decode.
        halfword: u16,
    },
    /// Recognizable encoding the core does not implement (32-bit Thumb-2
    /// other than `BL`, hint space other than `NOP`).
    #[error("unsupported instruction {halfword:#06x} at {address:#010x}")]
    UnsupportedInstruction {
        /// Address of the offending halfword.
        address: u32,
        /// Raw leading halfword of the unsupported encoding.
        halfword: u16,
    },
    /// Internal invariant violation, e.g. a reserved decode tag escaping
    /// the cache builder.
    #[error("internal decode invariant violated at {address:#010x}")]
    UnexpectedLogic {
        /// Address being processed when the invariant broke.
        address: u32,
    },
}

impl Fault {
    /// Returns the aggregation class for this fault.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::InvalidSize { .. } | Self::DuplicateExecutableRegion { .. } => FaultClass::Config,
            Self::InvalidMemoryAccess { .. } => FaultClass::Memory,
            Self::AlignmentFault { .. } => FaultClass::Alignment,
            Self::UnknownInstruction { .. } | Self::UnsupportedInstruction { .. } => {
                FaultClass::Decode
            }
            Self::UnexpectedLogic { .. } => FaultClass::Internal,
        }
    }

    /// Configuration faults abort setup and are never delivered to the
    /// interrupt handler.
    #[must_use]
    pub const fn is_config(self) -> bool {
        matches!(self.class(), FaultClass::Config)
    }

    /// Decode faults are swallowed into the reserved tag at cache-build
    /// time and only surface if the address is actually executed.
    #[must_use]
    pub const fn is_decode(self) -> bool {
        matches!(self.class(), FaultClass::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::{Fault, FaultClass};

    #[test]
    fn class_mapping_matches_fault_taxonomy() {
        assert_eq!(Fault::InvalidSize { size: 6 }.class(), FaultClass::Config);
        assert_eq!(
            Fault::DuplicateExecutableRegion { existing: 0x0800_0000 }.class(),
            FaultClass::Config
        );
        assert_eq!(
            Fault::InvalidMemoryAccess { address: 0x10 }.class(),
            FaultClass::Memory
        );
        assert_eq!(
            Fault::AlignmentFault {
                address: 0x2000_0001,
                size: 4
            }
            .class(),
            FaultClass::Alignment
        );
        assert_eq!(
            Fault::UnknownInstruction {
                address: 0,
                halfword: 0xDEAD
            }
            .class(),
            FaultClass::Decode
        );
        assert_eq!(
            Fault::UnsupportedInstruction {
                address: 0,
                halfword: 0xF7F0
            }
            .class(),
            FaultClass::Decode
        );
        assert_eq!(
            Fault::UnexpectedLogic { address: 0 }.class(),
            FaultClass::Internal
        );
    }

    #[test]
    fn only_mapping_faults_are_config() {
        assert!(Fault::InvalidSize { size: 3 }.is_config());
        assert!(Fault::DuplicateExecutableRegion { existing: 0 }.is_config());
        assert!(!Fault::InvalidMemoryAccess { address: 0 }.is_config());
        assert!(!Fault::UnexpectedLogic { address: 0 }.is_config());
    }

    #[test]
    fn decode_faults_are_the_only_swallowed_class() {
        assert!(Fault::UnknownInstruction {
            address: 2,
            halfword: 0
        }
        .is_decode());
        assert!(Fault::UnsupportedInstruction {
            address: 2,
            halfword: 0
        }
        .is_decode());
        assert!(!Fault::AlignmentFault {
            address: 1,
            size: 2
        }
        .is_decode());
    }

    #[test]
    fn display_strings_carry_the_faulting_address() {
        let text = Fault::InvalidMemoryAccess {
            address: 0x4000_0200,
        }
        .to_string();
        assert!(text.contains("0x40000200"));
    }
}
