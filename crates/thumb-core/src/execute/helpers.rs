//! Flag arithmetic and shifter primitives shared by the executor.

#![allow(clippy::cast_possible_truncation, clippy::cast_lossless)]

use crate::state::{RegisterFile, APSR_C, APSR_N, APSR_V, APSR_Z};

/// Adds with carry-in, returning `(result, carry_out, overflow)`.
#[must_use]
pub const fn add_with_carry(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let wide = a as u64 + b as u64 + carry_in as u64;
    let result = wide as u32;
    let carry = wide > u32::MAX as u64;
    // Overflow when both operands share a sign the result does not.
    let overflow = ((a ^ result) & (b ^ result)) >> 31 == 1;
    (result, carry, overflow)
}

/// Logical shift left; `None` carry means the flag is unchanged.
#[must_use]
pub const fn lsl_c(value: u32, amount: u32) -> (u32, Option<bool>) {
    match amount {
        0 => (value, None),
        1..=31 => (value << amount, Some((value >> (32 - amount)) & 1 == 1)),
        32 => (0, Some(value & 1 == 1)),
        _ => (0, Some(false)),
    }
}

/// Logical shift right; `None` carry means the flag is unchanged.
#[must_use]
pub const fn lsr_c(value: u32, amount: u32) -> (u32, Option<bool>) {
    match amount {
        0 => (value, None),
        1..=31 => (value >> amount, Some((value >> (amount - 1)) & 1 == 1)),
        32 => (0, Some(value >> 31 == 1)),
        _ => (0, Some(false)),
    }
}

/// Arithmetic shift right; `None` carry means the flag is unchanged.
#[must_use]
pub const fn asr_c(value: u32, amount: u32) -> (u32, Option<bool>) {
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    match amount {
        0 => (value, None),
        1..=31 => (
            ((value as i32) >> amount) as u32,
            Some((value >> (amount - 1)) & 1 == 1),
        ),
        _ => (
            ((value as i32) >> 31) as u32,
            Some(value >> 31 == 1),
        ),
    }
}

/// Rotate right; `None` carry means the flag is unchanged.
#[must_use]
pub const fn ror_c(value: u32, amount: u32) -> (u32, Option<bool>) {
    if amount == 0 {
        return (value, None);
    }
    let rot = amount % 32;
    let result = value.rotate_right(rot);
    (result, Some(result >> 31 == 1))
}

/// Evaluates a 4-bit branch condition against the flags.
#[must_use]
pub const fn condition_passed(registers: &RegisterFile, condition: u32) -> bool {
    let n = registers.flag(APSR_N);
    let z = registers.flag(APSR_Z);
    let c = registers.flag(APSR_C);
    let v = registers.flag(APSR_V);
    match condition {
        0 => z,
        1 => !z,
        2 => c,
        3 => !c,
        4 => n,
        5 => !n,
        6 => v,
        7 => !v,
        8 => c && !z,
        9 => !c || z,
        10 => n == v,
        11 => n != v,
        12 => !z && n == v,
        _ => z || n != v,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{add_with_carry, asr_c, condition_passed, lsl_c, lsr_c, ror_c};
    use crate::state::{RegisterFile, APSR_C, APSR_N, APSR_V, APSR_Z};

    #[rstest]
    #[case(1, 1, false, 2, false, false)]
    #[case(u32::MAX, 1, false, 0, true, false)]
    #[case(0x7FFF_FFFF, 1, false, 0x8000_0000, false, true)]
    #[case(0x8000_0000, 0x8000_0000, false, 0, true, true)]
    #[case(5, !3, true, 2, true, false)]
    fn add_with_carry_flags(
        #[case] a: u32,
        #[case] b: u32,
        #[case] carry_in: bool,
        #[case] result: u32,
        #[case] carry: bool,
        #[case] overflow: bool,
    ) {
        assert_eq!(add_with_carry(a, b, carry_in), (result, carry, overflow));
    }

    #[test]
    fn shifts_by_zero_leave_carry_alone() {
        assert_eq!(lsl_c(0xFFFF_FFFF, 0), (0xFFFF_FFFF, None));
        assert_eq!(lsr_c(0xFFFF_FFFF, 0), (0xFFFF_FFFF, None));
        assert_eq!(asr_c(0xFFFF_FFFF, 0), (0xFFFF_FFFF, None));
        assert_eq!(ror_c(0xFFFF_FFFF, 0), (0xFFFF_FFFF, None));
    }

    #[test]
    fn shifts_at_and_past_the_register_width() {
        assert_eq!(lsl_c(1, 32), (0, Some(true)));
        assert_eq!(lsl_c(1, 33), (0, Some(false)));
        assert_eq!(lsr_c(0x8000_0000, 32), (0, Some(true)));
        assert_eq!(lsr_c(0x8000_0000, 40), (0, Some(false)));
        assert_eq!(asr_c(0x8000_0000, 40), (0xFFFF_FFFF, Some(true)));
        assert_eq!(ror_c(0x8000_0001, 33), (0xC000_0000, Some(true)));
    }

    #[test]
    fn signed_comparisons_follow_n_and_v() {
        let mut regs = RegisterFile::default();
        regs.set_flag(APSR_N, true);
        regs.set_flag(APSR_V, true);
        assert!(condition_passed(&regs, 10)); // GE
        assert!(!condition_passed(&regs, 11)); // LT

        regs.set_flag(APSR_V, false);
        assert!(!condition_passed(&regs, 10));
        assert!(condition_passed(&regs, 11));
    }

    #[test]
    fn unsigned_comparisons_follow_c_and_z() {
        let mut regs = RegisterFile::default();
        regs.set_flag(APSR_C, true);
        assert!(condition_passed(&regs, 8)); // HI
        regs.set_flag(APSR_Z, true);
        assert!(!condition_passed(&regs, 8));
        assert!(condition_passed(&regs, 9)); // LS
    }
}
