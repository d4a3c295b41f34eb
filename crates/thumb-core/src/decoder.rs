//! Thumb halfword decoder.
//!
//! Reduces each encoding to a [`Decoded`] pair by top-bit dispatch. Only
//! the `BL` pair reads a second halfword; everything else decodes from a
//! single fetch. Encodings the architecture defines but this subset does
//! not implement decode to [`Fault::UnsupportedInstruction`]; encodings
//! the architecture leaves undefined decode to [`Fault::UnknownInstruction`].

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use crate::encoding::{pack_args, Decoded, Op};
use crate::memory::AddressSpace;
use crate::Fault;

/// Sign-extends the low `bits` bits of `value`.
const fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Decodes the instruction at `address`.
///
/// # Errors
///
/// Returns [`Fault::UnknownInstruction`] for undefined encodings,
/// [`Fault::UnsupportedInstruction`] for defined-but-unimplemented ones,
/// and propagates fetch faults for the first halfword.
pub fn decode(memory: &AddressSpace, address: u32) -> Result<Decoded, Fault> {
    let hw = u32::from(memory.fetch_code(address)?);

    match hw >> 12 {
        0x0 | 0x1 => Ok(decode_shift_add_sub(hw)),
        0x2 | 0x3 => Ok(decode_immediate(hw)),
        0x4 => decode_alu_hi_ldrpc(address, hw),
        0x5 => Ok(decode_register_offset(hw)),
        0x6 | 0x7 => Ok(decode_word_byte_immediate(hw)),
        0x8 => Ok(decode_halfword_immediate(hw)),
        0x9 => Ok(decode_sp_relative(hw)),
        0xA => Ok(decode_address_generation(hw)),
        0xB => decode_misc(address, hw),
        0xC => Ok(decode_block_transfer(hw)),
        0xD => decode_conditional(address, hw),
        0xE => decode_unconditional(address, hw),
        _ => decode_long_branch(memory, address, hw),
    }
}

/// Formats 1 and 2: shift by immediate, three-register add/sub.
const fn decode_shift_add_sub(hw: u32) -> Decoded {
    let rd = hw & 0x7;
    let rs = (hw >> 3) & 0x7;

    if (hw >> 11) & 0x3 == 0x3 {
        let field = (hw >> 6) & 0x7;
        let (op, imm) = match (hw >> 9) & 0x3 {
            0 => (Op::AddReg, pack_args(rd, rs, field, 0)),
            1 => (Op::SubReg, pack_args(rd, rs, field, 0)),
            2 => (Op::AddImm3, pack_args(rd, rs, 0, field as i32)),
            _ => (Op::SubImm3, pack_args(rd, rs, 0, field as i32)),
        };
        return Decoded { op, imm };
    }

    let imm5 = ((hw >> 6) & 0x1F) as i32;
    let op = match (hw >> 11) & 0x3 {
        0 => Op::LslImm,
        1 => Op::LsrImm,
        _ => Op::AsrImm,
    };
    Decoded {
        op,
        imm: pack_args(rd, rs, 0, imm5),
    }
}

/// Format 3: move/compare/add/subtract with an 8-bit immediate.
const fn decode_immediate(hw: u32) -> Decoded {
    let rd = (hw >> 8) & 0x7;
    let imm8 = (hw & 0xFF) as i32;
    let op = match (hw >> 11) & 0x3 {
        0 => Op::MovImm,
        1 => Op::CmpImm,
        2 => Op::AddImm8,
        _ => Op::SubImm8,
    };
    Decoded {
        op,
        imm: pack_args(rd, 0, 0, imm8),
    }
}

/// Formats 4, 5 and 6: register ALU, high-register operations, literal load.
const fn decode_alu_hi_ldrpc(address: u32, hw: u32) -> Result<Decoded, Fault> {
    if hw & 0xFC00 == 0x4000 {
        let rd = hw & 0x7;
        let rs = (hw >> 3) & 0x7;
        let bits = ((hw >> 6) & 0xF) as i32;
        return Ok(Decoded {
            op: Op::Alu,
            imm: pack_args(rd, rs, 0, bits),
        });
    }

    if hw & 0xFC00 == 0x4400 {
        let h1 = (hw >> 7) & 0x1;
        let rd = (hw & 0x7) | (h1 << 3);
        let rs = ((hw >> 3) & 0x7) | (((hw >> 6) & 0x1) << 3);
        let op = match (hw >> 8) & 0x3 {
            0 => Op::AddHi,
            1 => Op::CmpHi,
            2 => Op::MovHi,
            _ => {
                if h1 == 1 {
                    // BLX (register) needs a second pipeline stage this
                    // subset does not model.
                    return Err(Fault::UnsupportedInstruction {
                        address,
                        halfword: hw as u16,
                    });
                }
                Op::Bx
            }
        };
        return Ok(Decoded {
            op,
            imm: pack_args(rd, rs, 0, 0),
        });
    }

    // 01001: PC-relative literal load, word-scaled offset.
    let rd = (hw >> 8) & 0x7;
    let offset = ((hw & 0xFF) << 2) as i32;
    Ok(Decoded {
        op: Op::LdrPc,
        imm: pack_args(rd, 0, 0, offset),
    })
}

/// Formats 7 and 8: register-offset loads and stores.
const fn decode_register_offset(hw: u32) -> Decoded {
    let rd = hw & 0x7;
    let rb = (hw >> 3) & 0x7;
    let ro = (hw >> 6) & 0x7;

    let op = if (hw >> 9) & 0x1 == 0 {
        match (hw >> 10) & 0x3 {
            0 => Op::StrReg,
            1 => Op::StrbReg,
            2 => Op::LdrReg,
            _ => Op::LdrbReg,
        }
    } else {
        match (hw >> 10) & 0x3 {
            0 => Op::StrhReg,
            1 => Op::LdsbReg,
            2 => Op::LdrhReg,
            _ => Op::LdshReg,
        }
    };
    Decoded {
        op,
        imm: pack_args(rd, rb, ro, 0),
    }
}

/// Format 9: word and byte loads/stores with a 5-bit immediate offset.
const fn decode_word_byte_immediate(hw: u32) -> Decoded {
    let rd = hw & 0x7;
    let rb = (hw >> 3) & 0x7;
    let imm5 = (hw >> 6) & 0x1F;
    let byte = (hw >> 12) & 0x1 == 1;
    let load = (hw >> 11) & 0x1 == 1;

    let (op, offset) = match (byte, load) {
        (false, false) => (Op::StrImm, imm5 << 2),
        (false, true) => (Op::LdrImm, imm5 << 2),
        (true, false) => (Op::StrbImm, imm5),
        (true, true) => (Op::LdrbImm, imm5),
    };
    Decoded {
        op,
        imm: pack_args(rd, rb, 0, offset as i32),
    }
}

/// Format 10: halfword loads/stores with a halfword-scaled immediate.
const fn decode_halfword_immediate(hw: u32) -> Decoded {
    let rd = hw & 0x7;
    let rb = (hw >> 3) & 0x7;
    let offset = (((hw >> 6) & 0x1F) << 1) as i32;
    let op = if (hw >> 11) & 0x1 == 1 {
        Op::LdrhImm
    } else {
        Op::StrhImm
    };
    Decoded {
        op,
        imm: pack_args(rd, rb, 0, offset),
    }
}

/// Format 11: SP-relative loads and stores.
const fn decode_sp_relative(hw: u32) -> Decoded {
    let rd = (hw >> 8) & 0x7;
    let offset = ((hw & 0xFF) << 2) as i32;
    let op = if (hw >> 11) & 0x1 == 1 {
        Op::LdrSp
    } else {
        Op::StrSp
    };
    Decoded {
        op,
        imm: pack_args(rd, 0, 0, offset),
    }
}

/// Format 12: ADR and ADD (SP plus immediate).
const fn decode_address_generation(hw: u32) -> Decoded {
    let rd = (hw >> 8) & 0x7;
    let offset = ((hw & 0xFF) << 2) as i32;
    let op = if (hw >> 11) & 0x1 == 1 {
        Op::AddSp
    } else {
        Op::AddPc
    };
    Decoded {
        op,
        imm: pack_args(rd, 0, 0, offset),
    }
}

/// Format 13/14 and hints: SP adjustment, push/pop, NOP.
const fn decode_misc(address: u32, hw: u32) -> Result<Decoded, Fault> {
    if hw & 0xFF00 == 0xB000 {
        let words = ((hw & 0x7F) << 2) as i32;
        let imm = if (hw >> 7) & 0x1 == 1 { -words } else { words };
        return Ok(Decoded {
            op: Op::AdjustSp,
            imm,
        });
    }

    if hw & 0xF600 == 0xB400 {
        let rlist = (hw & 0xFF) as i32;
        let extra = (hw >> 8) & 0x1;
        let op = if (hw >> 11) & 0x1 == 1 {
            Op::Pop
        } else {
            Op::Push
        };
        return Ok(Decoded {
            op,
            imm: pack_args(extra, 0, 0, rlist),
        });
    }

    if hw == 0xBF00 {
        return Ok(Decoded { op: Op::Nop, imm: 0 });
    }

    // Remaining hints, BKPT, CPS, sign/zero extension and byte-reversal
    // live here; none are in the subset.
    if hw & 0xFF00 == 0xBF00 || hw & 0xFF00 == 0xBE00 {
        return Err(Fault::UnsupportedInstruction {
            address,
            halfword: hw as u16,
        });
    }
    Err(Fault::UnknownInstruction {
        address,
        halfword: hw as u16,
    })
}

/// Format 15: multiple loads and stores.
const fn decode_block_transfer(hw: u32) -> Decoded {
    let rb = (hw >> 8) & 0x7;
    let rlist = (hw & 0xFF) as i32;
    let op = if (hw >> 11) & 0x1 == 1 {
        Op::Ldmia
    } else {
        Op::Stmia
    };
    Decoded {
        op,
        imm: pack_args(rb, 0, 0, rlist),
    }
}

/// Formats 16 and 17: conditional branch and software interrupt.
const fn decode_conditional(address: u32, hw: u32) -> Result<Decoded, Fault> {
    let cond = (hw >> 8) & 0xF;
    match cond {
        0xF => Ok(Decoded {
            op: Op::Svc,
            imm: (hw & 0xFF) as i32,
        }),
        // Condition 1110 is permanently undefined in this position.
        0xE => Err(Fault::UnknownInstruction {
            address,
            halfword: hw as u16,
        }),
        _ => {
            let offset = sign_extend(hw & 0xFF, 8) << 1;
            Ok(Decoded {
                op: Op::Bcond,
                imm: pack_args(cond, 0, 0, offset),
            })
        }
    }
}

/// Format 18: unconditional branch.
const fn decode_unconditional(address: u32, hw: u32) -> Result<Decoded, Fault> {
    if (hw >> 11) & 0x1 == 1 {
        // 0xE800-prefixed 32-bit encodings (LDM.W, STM.W, ...).
        return Err(Fault::UnsupportedInstruction {
            address,
            halfword: hw as u16,
        });
    }
    Ok(Decoded {
        op: Op::B,
        imm: sign_extend(hw & 0x7FF, 11) << 1,
    })
}

/// Format 19: the two-halfword `BL` pair.
fn decode_long_branch(memory: &AddressSpace, address: u32, hw: u32) -> Result<Decoded, Fault> {
    if hw & 0xF800 != 0xF000 {
        // A suffix halfword reached in isolation, or another 0xF800-class
        // 32-bit prefix outside the subset.
        return Err(Fault::UnsupportedInstruction {
            address,
            halfword: hw as u16,
        });
    }

    // A prefix at the last halfword of the region has no suffix; treat it
    // as undecodable rather than surfacing the fetch fault so the cache
    // build stays total.
    let Ok(second) = memory.fetch_code(address + 2) else {
        return Err(Fault::UnknownInstruction {
            address,
            halfword: hw as u16,
        });
    };
    let second = u32::from(second);
    if second & 0xF800 != 0xF800 {
        return Err(Fault::UnsupportedInstruction {
            address,
            halfword: hw as u16,
        });
    }

    let raw = ((hw & 0x7FF) << 12) | ((second & 0x7FF) << 1);
    Ok(Decoded {
        op: Op::Bl,
        imm: sign_extend(raw, 23),
    })
}
