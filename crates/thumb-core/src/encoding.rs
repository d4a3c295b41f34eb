//! Decoded instruction representation and operand packing.
//!
//! The decoder reduces every instruction to a `(tag, immediate)` pair so the
//! execution cache can store a flat array of fixed-size slots. Register-form
//! operations pack their fields into nibbles of the immediate; branch-form
//! operations store the signed byte offset directly (a `BL` offset needs 23
//! bits and would not survive nibble packing).

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)]

/// Operation tag produced by decode. One slot value per halfword in the
/// execution cache; [`Op::Fault`] is the reserved placeholder recorded when
/// decode of a cached address failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Op {
    // Shift by immediate.
    LslImm,
    LsrImm,
    AsrImm,
    // Three-register and small-immediate add/sub.
    AddReg,
    SubReg,
    AddImm3,
    SubImm3,
    // Move/compare/add/subtract immediate.
    MovImm,
    CmpImm,
    AddImm8,
    SubImm8,
    // Register-register ALU group; sub-operation in the immediate field.
    Alu,
    // High-register operations and branch-exchange.
    AddHi,
    CmpHi,
    MovHi,
    Bx,
    // PC-relative literal load.
    LdrPc,
    // Register-offset loads and stores.
    StrReg,
    StrbReg,
    LdrReg,
    LdrbReg,
    StrhReg,
    LdrhReg,
    LdsbReg,
    LdshReg,
    // Immediate-offset loads and stores.
    StrImm,
    LdrImm,
    StrbImm,
    LdrbImm,
    StrhImm,
    LdrhImm,
    // SP-relative loads and stores.
    StrSp,
    LdrSp,
    // Address generation and stack adjustment.
    AddPc,
    AddSp,
    AdjustSp,
    // Block transfers.
    Push,
    Pop,
    Stmia,
    Ldmia,
    // Control flow.
    Bcond,
    Svc,
    B,
    Bl,
    Nop,
    /// Reserved cache placeholder: the address failed to decode at cache
    /// build time and faults if executed.
    Fault = 0xFF,
}

impl Op {
    /// Instruction width in bytes: 4 for the `BL` halfword pair, else 2.
    #[must_use]
    pub const fn width(self) -> u32 {
        match self {
            Self::Bl => 4,
            _ => 2,
        }
    }
}

/// Register-register ALU sub-operation carried in the immediate field of
/// [`Op::Alu`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum AluOp {
    And,
    Eor,
    Lsl,
    Lsr,
    Asr,
    Adc,
    Sbc,
    Ror,
    Tst,
    Neg,
    Cmp,
    Cmn,
    Orr,
    Mul,
    Bic,
    Mvn,
}

impl AluOp {
    /// Decodes the 4-bit ALU sub-operation field.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::And),
            1 => Some(Self::Eor),
            2 => Some(Self::Lsl),
            3 => Some(Self::Lsr),
            4 => Some(Self::Asr),
            5 => Some(Self::Adc),
            6 => Some(Self::Sbc),
            7 => Some(Self::Ror),
            8 => Some(Self::Tst),
            9 => Some(Self::Neg),
            10 => Some(Self::Cmp),
            11 => Some(Self::Cmn),
            12 => Some(Self::Orr),
            13 => Some(Self::Mul),
            14 => Some(Self::Bic),
            15 => Some(Self::Mvn),
            _ => None,
        }
    }
}

/// One pre-decoded cache slot: operation tag plus packed immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Decoded {
    /// Operation tag.
    pub op: Op,
    /// Packed operands, layout per tag; see [`pack_args`].
    pub imm: i32,
}

/// Packs register-form operands: `rd` and `ra` and `rb` in the low nibbles,
/// the (signed) immediate shifted above them.
#[must_use]
pub const fn pack_args(rd: u32, ra: u32, rb: u32, imm: i32) -> i32 {
    (imm << 12) | ((rb as i32) << 8) | ((ra as i32) << 4) | rd as i32
}

/// Destination/primary register field of a packed immediate.
#[must_use]
pub const fn arg_rd(imm: i32) -> usize {
    (imm & 0xF) as usize
}

/// First source register field of a packed immediate.
#[must_use]
pub const fn arg_ra(imm: i32) -> usize {
    ((imm >> 4) & 0xF) as usize
}

/// Second source register field of a packed immediate.
#[must_use]
pub const fn arg_rb(imm: i32) -> usize {
    ((imm >> 8) & 0xF) as usize
}

/// Signed immediate field of a packed immediate.
#[must_use]
pub const fn arg_imm(imm: i32) -> i32 {
    imm >> 12
}
