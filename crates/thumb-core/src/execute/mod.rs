//! Executor for the pre-decoded instruction set.
//!
//! Each tag consumes its packed operands from the [`Decoded`] immediate
//! and reports how control flow moved. Reads of the program counter see
//! the architectural pipeline value, the instruction address plus four.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::too_many_lines
)]

mod helpers;
pub use helpers::{add_with_carry, asr_c, condition_passed, lsl_c, lsr_c, ror_c};

use crate::encoding::{arg_imm, arg_ra, arg_rb, arg_rd, AluOp, Decoded, Op};
use crate::isa::Step;
use crate::memory::AddressSpace;
use crate::state::{RegisterFile, APSR_C, APSR_V, PC};
use crate::Fault;

/// Register read with the pipeline-adjusted program counter.
fn read_reg(registers: &RegisterFile, address: u32, index: usize) -> u32 {
    if index == PC {
        address.wrapping_add(4)
    } else {
        registers[index]
    }
}

const fn set_add_sub_flags(registers: &mut RegisterFile, result: u32, carry: bool, overflow: bool) {
    registers.set_nz(result);
    registers.set_flag(APSR_C, carry);
    registers.set_flag(APSR_V, overflow);
}

const fn apply_shift_carry(registers: &mut RegisterFile, result: u32, carry: Option<bool>) {
    registers.set_nz(result);
    if let Some(carry) = carry {
        registers.set_flag(APSR_C, carry);
    }
}

/// Executes one pre-decoded instruction at `address`.
///
/// # Errors
///
/// Propagates memory faults from load/store operands; a
/// [`Op::Fault`] placeholder reaching execution is
/// [`Fault::UnexpectedLogic`].
pub fn execute(
    registers: &mut RegisterFile,
    memory: &mut AddressSpace,
    address: u32,
    decoded: Decoded,
) -> Result<Step, Fault> {
    let packed = decoded.imm;
    let rd = arg_rd(packed);
    let ra = arg_ra(packed);
    let rb = arg_rb(packed);
    let imm = arg_imm(packed);

    match decoded.op {
        Op::LslImm => {
            let (result, carry) = lsl_c(registers[ra], imm as u32);
            apply_shift_carry(registers, result, carry);
            registers[rd] = result;
        }
        Op::LsrImm => {
            // A zero field encodes a shift by the full register width.
            let amount = if imm == 0 { 32 } else { imm as u32 };
            let (result, carry) = lsr_c(registers[ra], amount);
            apply_shift_carry(registers, result, carry);
            registers[rd] = result;
        }
        Op::AsrImm => {
            let amount = if imm == 0 { 32 } else { imm as u32 };
            let (result, carry) = asr_c(registers[ra], amount);
            apply_shift_carry(registers, result, carry);
            registers[rd] = result;
        }
        Op::AddReg => {
            let (result, carry, overflow) = add_with_carry(registers[ra], registers[rb], false);
            set_add_sub_flags(registers, result, carry, overflow);
            registers[rd] = result;
        }
        Op::SubReg => {
            let (result, carry, overflow) = add_with_carry(registers[ra], !registers[rb], true);
            set_add_sub_flags(registers, result, carry, overflow);
            registers[rd] = result;
        }
        Op::AddImm3 => {
            let (result, carry, overflow) = add_with_carry(registers[ra], imm as u32, false);
            set_add_sub_flags(registers, result, carry, overflow);
            registers[rd] = result;
        }
        Op::SubImm3 => {
            let (result, carry, overflow) = add_with_carry(registers[ra], !(imm as u32), true);
            set_add_sub_flags(registers, result, carry, overflow);
            registers[rd] = result;
        }
        Op::MovImm => {
            let value = imm as u32;
            registers.set_nz(value);
            registers[rd] = value;
        }
        Op::CmpImm => {
            let (result, carry, overflow) = add_with_carry(registers[rd], !(imm as u32), true);
            set_add_sub_flags(registers, result, carry, overflow);
        }
        Op::AddImm8 => {
            let (result, carry, overflow) = add_with_carry(registers[rd], imm as u32, false);
            set_add_sub_flags(registers, result, carry, overflow);
            registers[rd] = result;
        }
        Op::SubImm8 => {
            let (result, carry, overflow) = add_with_carry(registers[rd], !(imm as u32), true);
            set_add_sub_flags(registers, result, carry, overflow);
            registers[rd] = result;
        }
        Op::Alu => {
            let sub_op =
                AluOp::from_bits(imm as u32).ok_or(Fault::UnexpectedLogic { address })?;
            execute_alu(registers, sub_op, rd, ra);
        }
        Op::AddHi => {
            let result = read_reg(registers, address, rd)
                .wrapping_add(read_reg(registers, address, ra));
            if rd == PC {
                registers.set_pc(result & !1);
                return Ok(Step::Jumped);
            }
            registers[rd] = result;
        }
        Op::CmpHi => {
            let (result, carry, overflow) = add_with_carry(
                read_reg(registers, address, rd),
                !read_reg(registers, address, ra),
                true,
            );
            set_add_sub_flags(registers, result, carry, overflow);
        }
        Op::MovHi => {
            let value = read_reg(registers, address, ra);
            if rd == PC {
                registers.set_pc(value & !1);
                return Ok(Step::Jumped);
            }
            registers[rd] = value;
        }
        Op::Bx => {
            let target = read_reg(registers, address, ra);
            registers.set_pc(target & !1);
            return Ok(Step::Jumped);
        }
        Op::LdrPc => {
            let base = address.wrapping_add(4) & !2;
            registers[rd] = memory.read_u32(base.wrapping_add(imm as u32))?;
        }
        Op::StrReg => {
            let target = registers[ra].wrapping_add(registers[rb]);
            memory.write_u32(target, registers[rd])?;
        }
        Op::StrbReg => {
            let target = registers[ra].wrapping_add(registers[rb]);
            memory.write_u8(target, registers[rd] as u8)?;
        }
        Op::LdrReg => {
            let target = registers[ra].wrapping_add(registers[rb]);
            registers[rd] = memory.read_u32(target)?;
        }
        Op::LdrbReg => {
            let target = registers[ra].wrapping_add(registers[rb]);
            registers[rd] = u32::from(memory.read_u8(target)?);
        }
        Op::StrhReg => {
            let target = registers[ra].wrapping_add(registers[rb]);
            memory.write_u16(target, registers[rd] as u16)?;
        }
        Op::LdrhReg => {
            let target = registers[ra].wrapping_add(registers[rb]);
            registers[rd] = u32::from(memory.read_u16(target)?);
        }
        Op::LdsbReg => {
            let target = registers[ra].wrapping_add(registers[rb]);
            registers[rd] = i32::from(memory.read_u8(target)? as i8) as u32;
        }
        Op::LdshReg => {
            let target = registers[ra].wrapping_add(registers[rb]);
            registers[rd] = i32::from(memory.read_u16(target)? as i16) as u32;
        }
        Op::StrImm => {
            memory.write_u32(registers[ra].wrapping_add(imm as u32), registers[rd])?;
        }
        Op::LdrImm => {
            registers[rd] = memory.read_u32(registers[ra].wrapping_add(imm as u32))?;
        }
        Op::StrbImm => {
            memory.write_u8(registers[ra].wrapping_add(imm as u32), registers[rd] as u8)?;
        }
        Op::LdrbImm => {
            registers[rd] = u32::from(memory.read_u8(registers[ra].wrapping_add(imm as u32))?);
        }
        Op::StrhImm => {
            memory.write_u16(registers[ra].wrapping_add(imm as u32), registers[rd] as u16)?;
        }
        Op::LdrhImm => {
            registers[rd] = u32::from(memory.read_u16(registers[ra].wrapping_add(imm as u32))?);
        }
        Op::StrSp => {
            memory.write_u32(registers.sp().wrapping_add(imm as u32), registers[rd])?;
        }
        Op::LdrSp => {
            registers[rd] = memory.read_u32(registers.sp().wrapping_add(imm as u32))?;
        }
        Op::AddPc => {
            registers[rd] = (address.wrapping_add(4) & !2).wrapping_add(imm as u32);
        }
        Op::AddSp => {
            registers[rd] = registers.sp().wrapping_add(imm as u32);
        }
        Op::AdjustSp => {
            registers.set_sp(registers.sp().wrapping_add(packed as u32));
        }
        Op::Push => {
            let list = (imm as u32) & 0xFF;
            let with_lr = rd == 1;
            let count = list.count_ones() + u32::from(with_lr);
            let base = registers.sp().wrapping_sub(4 * count);
            let mut target = base;
            for index in 0..8 {
                if list & (1 << index) != 0 {
                    memory.write_u32(target, registers[index])?;
                    target = target.wrapping_add(4);
                }
            }
            if with_lr {
                memory.write_u32(target, registers.lr())?;
            }
            registers.set_sp(base);
        }
        Op::Pop => {
            let list = (imm as u32) & 0xFF;
            let with_pc = rd == 1;
            let mut target = registers.sp();
            for index in 0..8 {
                if list & (1 << index) != 0 {
                    registers[index] = memory.read_u32(target)?;
                    target = target.wrapping_add(4);
                }
            }
            if with_pc {
                let value = memory.read_u32(target)?;
                target = target.wrapping_add(4);
                registers.set_sp(target);
                registers.set_pc(value & !1);
                return Ok(Step::Jumped);
            }
            registers.set_sp(target);
        }
        Op::Stmia => {
            let list = (imm as u32) & 0xFF;
            let mut target = registers[rd];
            for index in 0..8 {
                if list & (1 << index) != 0 {
                    memory.write_u32(target, registers[index])?;
                    target = target.wrapping_add(4);
                }
            }
            registers[rd] = target;
        }
        Op::Ldmia => {
            let list = (imm as u32) & 0xFF;
            let mut target = registers[rd];
            for index in 0..8 {
                if list & (1 << index) != 0 {
                    registers[index] = memory.read_u32(target)?;
                    target = target.wrapping_add(4);
                }
            }
            // Base writeback only when the base is not in the list.
            if list & (1 << rd) == 0 {
                registers[rd] = target;
            }
        }
        Op::Bcond => {
            if condition_passed(registers, rd as u32) {
                registers.set_pc(address.wrapping_add(4).wrapping_add(imm as u32));
                return Ok(Step::Jumped);
            }
        }
        Op::Svc => {
            return Ok(Step::Interrupt(packed as u32));
        }
        Op::B => {
            registers.set_pc(address.wrapping_add(4).wrapping_add(packed as u32));
            return Ok(Step::Jumped);
        }
        Op::Bl => {
            let next = address.wrapping_add(4);
            registers.set_lr(next | 1);
            registers.set_pc(next.wrapping_add(packed as u32));
            return Ok(Step::Jumped);
        }
        Op::Nop => {}
        Op::Fault => {
            return Err(Fault::UnexpectedLogic { address });
        }
    }
    Ok(Step::Retired)
}

fn execute_alu(registers: &mut RegisterFile, sub_op: AluOp, rd: usize, rs: usize) {
    let lhs = registers[rd];
    let rhs = registers[rs];
    match sub_op {
        AluOp::And => {
            let result = lhs & rhs;
            registers.set_nz(result);
            registers[rd] = result;
        }
        AluOp::Eor => {
            let result = lhs ^ rhs;
            registers.set_nz(result);
            registers[rd] = result;
        }
        AluOp::Lsl => {
            let (result, carry) = lsl_c(lhs, rhs & 0xFF);
            apply_shift_carry(registers, result, carry);
            registers[rd] = result;
        }
        AluOp::Lsr => {
            let (result, carry) = lsr_c(lhs, rhs & 0xFF);
            apply_shift_carry(registers, result, carry);
            registers[rd] = result;
        }
        AluOp::Asr => {
            let (result, carry) = asr_c(lhs, rhs & 0xFF);
            apply_shift_carry(registers, result, carry);
            registers[rd] = result;
        }
        AluOp::Adc => {
            let (result, carry, overflow) = add_with_carry(lhs, rhs, registers.flag(APSR_C));
            set_add_sub_flags(registers, result, carry, overflow);
            registers[rd] = result;
        }
        AluOp::Sbc => {
            let (result, carry, overflow) = add_with_carry(lhs, !rhs, registers.flag(APSR_C));
            set_add_sub_flags(registers, result, carry, overflow);
            registers[rd] = result;
        }
        AluOp::Ror => {
            let (result, carry) = ror_c(lhs, rhs & 0xFF);
            apply_shift_carry(registers, result, carry);
            registers[rd] = result;
        }
        AluOp::Tst => {
            registers.set_nz(lhs & rhs);
        }
        AluOp::Neg => {
            let (result, carry, overflow) = add_with_carry(!rhs, 0, true);
            set_add_sub_flags(registers, result, carry, overflow);
            registers[rd] = result;
        }
        AluOp::Cmp => {
            let (result, carry, overflow) = add_with_carry(lhs, !rhs, true);
            set_add_sub_flags(registers, result, carry, overflow);
        }
        AluOp::Cmn => {
            let (result, carry, overflow) = add_with_carry(lhs, rhs, false);
            set_add_sub_flags(registers, result, carry, overflow);
        }
        AluOp::Orr => {
            let result = lhs | rhs;
            registers.set_nz(result);
            registers[rd] = result;
        }
        AluOp::Mul => {
            let result = lhs.wrapping_mul(rhs);
            registers.set_nz(result);
            registers[rd] = result;
        }
        AluOp::Bic => {
            let result = lhs & !rhs;
            registers.set_nz(result);
            registers[rd] = result;
        }
        AluOp::Mvn => {
            let result = !rhs;
            registers.set_nz(result);
            registers[rd] = result;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::execute;
    use crate::encoding::{pack_args, Decoded, Op};
    use crate::isa::Step;
    use crate::memory::{AddressSpace, MemoryFlag};
    use crate::state::{RegisterFile, APSR_C, APSR_N, APSR_V, APSR_Z, PC};
    use crate::Fault;

    const CODE: u32 = 0x0800_0000;

    fn harness() -> (RegisterFile, AddressSpace) {
        let mut space = AddressSpace::new();
        space.map(0x2000_0000, 4096, MemoryFlag::ReadWrite).unwrap();
        let mut regs = RegisterFile::default();
        regs.set_sp(0x2000_0800);
        (regs, space)
    }

    fn run(regs: &mut RegisterFile, space: &mut AddressSpace, op: Op, imm: i32) -> Step {
        execute(regs, space, CODE, Decoded { op, imm }).unwrap()
    }

    #[test]
    fn subtraction_sets_borrow_as_inverted_carry() {
        let (mut regs, mut space) = harness();
        regs[0] = 5;
        run(&mut regs, &mut space, Op::CmpImm, pack_args(0, 0, 0, 10));
        assert!(!regs.flag(APSR_C));
        assert!(regs.flag(APSR_N));

        run(&mut regs, &mut space, Op::CmpImm, pack_args(0, 0, 0, 5));
        assert!(regs.flag(APSR_C));
        assert!(regs.flag(APSR_Z));
    }

    #[test]
    fn shift_by_zero_immediate_means_full_width_for_lsr_and_asr() {
        let (mut regs, mut space) = harness();
        regs[1] = 0x8000_0000;
        run(&mut regs, &mut space, Op::LsrImm, pack_args(0, 1, 0, 0));
        assert_eq!(regs[0], 0);
        assert!(regs.flag(APSR_C));
        assert!(regs.flag(APSR_Z));

        run(&mut regs, &mut space, Op::AsrImm, pack_args(2, 1, 0, 0));
        assert_eq!(regs[2], 0xFFFF_FFFF);
        assert!(regs.flag(APSR_C));
        assert!(regs.flag(APSR_N));
    }

    #[test]
    fn adc_chains_a_64_bit_addition() {
        let (mut regs, mut space) = harness();
        regs[0] = 0xFFFF_FFFF;
        regs[1] = 1;
        run(&mut regs, &mut space, Op::AddReg, pack_args(0, 0, 1, 0));
        assert_eq!(regs[0], 0);
        assert!(regs.flag(APSR_C));

        regs[2] = 0;
        regs[3] = 0;
        run(&mut regs, &mut space, Op::Alu, pack_args(2, 3, 0, 5));
        assert_eq!(regs[2], 1);
    }

    #[test]
    fn signed_overflow_is_detected_on_add_and_sub() {
        let (mut regs, mut space) = harness();
        regs[0] = 0x7FFF_FFFF;
        regs[1] = 1;
        run(&mut regs, &mut space, Op::AddReg, pack_args(2, 0, 1, 0));
        assert!(regs.flag(APSR_V));
        assert!(regs.flag(APSR_N));

        regs[4] = 0x8000_0000;
        regs[5] = 1;
        run(&mut regs, &mut space, Op::SubReg, pack_args(6, 4, 5, 0));
        assert_eq!(regs[6], 0x7FFF_FFFF);
        assert!(regs.flag(APSR_V));
    }

    #[test]
    fn pc_reads_see_the_pipeline_value() {
        let (mut regs, mut space) = harness();
        run(&mut regs, &mut space, Op::MovHi, pack_args(0, PC as u32, 0, 0));
        assert_eq!(regs[0], CODE + 4);

        run(&mut regs, &mut space, Op::AddPc, pack_args(1, 0, 0, 8));
        assert_eq!(regs[1], (CODE + 4) + 8);
    }

    #[test]
    fn branches_report_jumped_and_untaken_conditions_retire() {
        let (mut regs, mut space) = harness();
        let step = run(&mut regs, &mut space, Op::B, -4);
        assert_eq!(step, Step::Jumped);
        assert_eq!(regs.pc(), CODE);

        // EQ with Z clear does not branch.
        let step = run(&mut regs, &mut space, Op::Bcond, pack_args(0, 0, 0, 16));
        assert_eq!(step, Step::Retired);

        regs.set_flag(APSR_Z, true);
        let step = run(&mut regs, &mut space, Op::Bcond, pack_args(0, 0, 0, 16));
        assert_eq!(step, Step::Jumped);
        assert_eq!(regs.pc(), CODE + 4 + 16);
    }

    #[test]
    fn bl_links_with_the_thumb_bit() {
        let (mut regs, mut space) = harness();
        let step = run(&mut regs, &mut space, Op::Bl, 0x100);
        assert_eq!(step, Step::Jumped);
        assert_eq!(regs.lr(), (CODE + 4) | 1);
        assert_eq!(regs.pc(), CODE + 4 + 0x100);
    }

    #[test]
    fn bx_clears_the_thumb_bit_from_the_target() {
        let (mut regs, mut space) = harness();
        regs[3] = 0x0800_0101;
        let step = run(&mut regs, &mut space, Op::Bx, pack_args(0, 3, 0, 0));
        assert_eq!(step, Step::Jumped);
        assert_eq!(regs.pc(), 0x0800_0100);
    }

    #[test]
    fn push_then_pop_restores_registers_through_the_stack() {
        let (mut regs, mut space) = harness();
        regs[0] = 0x11;
        regs[1] = 0x22;
        regs.set_lr(0x0800_0041);
        let sp_before = regs.sp();

        run(&mut regs, &mut space, Op::Push, pack_args(1, 0, 0, 0x03));
        assert_eq!(regs.sp(), sp_before - 12);

        regs[0] = 0;
        regs[1] = 0;
        let step = run(&mut regs, &mut space, Op::Pop, pack_args(1, 0, 0, 0x03));
        assert_eq!(step, Step::Jumped);
        assert_eq!(regs[0], 0x11);
        assert_eq!(regs[1], 0x22);
        assert_eq!(regs.pc(), 0x0800_0040);
        assert_eq!(regs.sp(), sp_before);
    }

    #[test]
    fn block_transfer_writes_back_the_advanced_base() {
        let (mut regs, mut space) = harness();
        regs[4] = 0x2000_0100;
        regs[0] = 0xAA;
        regs[1] = 0xBB;
        run(&mut regs, &mut space, Op::Stmia, pack_args(4, 0, 0, 0x03));
        assert_eq!(regs[4], 0x2000_0108);
        assert_eq!(space.read_u32(0x2000_0100), Ok(0xAA));
        assert_eq!(space.read_u32(0x2000_0104), Ok(0xBB));

        regs[4] = 0x2000_0100;
        regs[0] = 0;
        run(&mut regs, &mut space, Op::Ldmia, pack_args(4, 0, 0, 0x03));
        assert_eq!(regs[0], 0xAA);
        assert_eq!(regs[4], 0x2000_0108);

        // Base in the list suppresses writeback.
        regs[4] = 0x2000_0100;
        run(&mut regs, &mut space, Op::Ldmia, pack_args(4, 0, 0, 0x10));
        assert_eq!(regs[4], 0xAA);
    }

    #[test]
    fn svc_surfaces_its_request_argument() {
        let (mut regs, mut space) = harness();
        let step = run(&mut regs, &mut space, Op::Svc, 42);
        assert_eq!(step, Step::Interrupt(42));
    }

    #[test]
    fn load_faults_propagate_from_the_memory_model() {
        let (mut regs, mut space) = harness();
        regs[1] = 0xDEAD_0000;
        let result = execute(
            &mut regs,
            &mut space,
            CODE,
            Decoded {
                op: Op::LdrImm,
                imm: pack_args(0, 1, 0, 0),
            },
        );
        assert_eq!(
            result,
            Err(Fault::InvalidMemoryAccess {
                address: 0xDEAD_0000
            })
        );
    }

    #[test]
    fn placeholder_tag_is_a_logic_fault() {
        let (mut regs, mut space) = harness();
        let result = execute(
            &mut regs,
            &mut space,
            CODE,
            Decoded {
                op: Op::Fault,
                imm: 0,
            },
        );
        assert_eq!(result, Err(Fault::UnexpectedLogic { address: CODE }));
    }
}
