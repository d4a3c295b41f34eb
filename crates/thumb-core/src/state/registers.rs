#![allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]

use std::ops::{Index, IndexMut};

/// Number of architecturally visible registers (`R0..R12`, `SP`, `LR`, `PC`).
pub const REGISTER_COUNT: usize = 16;
/// Register index of the stack pointer.
pub const SP: usize = 13;
/// Register index of the link register.
pub const LR: usize = 14;
/// Register index of the program counter.
pub const PC: usize = 15;

/// `APSR` bit for negative result.
pub const APSR_N: u32 = 1 << 31;
/// `APSR` bit for zero result.
pub const APSR_Z: u32 = 1 << 30;
/// `APSR` bit for carry/borrow.
pub const APSR_C: u32 = 1 << 29;
/// `APSR` bit for signed overflow.
pub const APSR_V: u32 = 1 << 28;
/// Mask of architecturally active `APSR` bits.
pub const APSR_ACTIVE_MASK: u32 = APSR_N | APSR_Z | APSR_C | APSR_V;

/// Register file: sixteen general registers with a distinguished program
/// counter at index [`PC`], plus the `APSR` condition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegisterFile {
    regs: [u32; REGISTER_COUNT],
    apsr: u32,
}

impl RegisterFile {
    /// Creates a zeroed register file; the caller seeds `PC` from the
    /// firmware reset vector before the first run.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            regs: [0; REGISTER_COUNT],
            apsr: 0,
        }
    }

    /// Reads the program counter.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.regs[PC]
    }

    /// Writes the program counter.
    pub const fn set_pc(&mut self, value: u32) {
        self.regs[PC] = value;
    }

    /// Reads the stack pointer.
    #[must_use]
    pub const fn sp(&self) -> u32 {
        self.regs[SP]
    }

    /// Writes the stack pointer.
    pub const fn set_sp(&mut self, value: u32) {
        self.regs[SP] = value;
    }

    /// Reads the link register.
    #[must_use]
    pub const fn lr(&self) -> u32 {
        self.regs[LR]
    }

    /// Writes the link register.
    pub const fn set_lr(&mut self, value: u32) {
        self.regs[LR] = value;
    }

    /// Reads the `APSR` word; only the active flag bits are ever set.
    #[must_use]
    pub const fn apsr(&self) -> u32 {
        self.apsr
    }

    /// Returns `true` when a specific `APSR` bit is set.
    #[must_use]
    pub const fn flag(&self, bit: u32) -> bool {
        (self.apsr & bit) != 0
    }

    /// Sets or clears a specific active `APSR` bit.
    pub const fn set_flag(&mut self, bit: u32, enabled: bool) {
        if enabled {
            self.apsr |= bit & APSR_ACTIVE_MASK;
        } else {
            self.apsr &= !(bit & APSR_ACTIVE_MASK);
        }
    }

    /// Updates `N` and `Z` from a computed result.
    pub const fn set_nz(&mut self, value: u32) {
        self.set_flag(APSR_N, (value as i32) < 0);
        self.set_flag(APSR_Z, value == 0);
    }
}

impl Index<usize> for RegisterFile {
    type Output = u32;

    fn index(&self, index: usize) -> &u32 {
        &self.regs[index]
    }
}

impl IndexMut<usize> for RegisterFile {
    fn index_mut(&mut self, index: usize) -> &mut u32 {
        &mut self.regs[index]
    }
}

#[cfg(test)]
mod tests {
    use super::{RegisterFile, APSR_C, APSR_N, APSR_V, APSR_Z, LR, PC, REGISTER_COUNT, SP};

    #[test]
    fn registers_track_independently() {
        let mut regs = RegisterFile::new();
        for index in 0..REGISTER_COUNT {
            regs[index] = 0x100 + index as u32;
        }
        for index in 0..REGISTER_COUNT {
            assert_eq!(regs[index], 0x100 + index as u32);
        }
    }

    #[test]
    fn named_accessors_alias_the_distinguished_indices() {
        let mut regs = RegisterFile::new();
        regs.set_sp(0x2001_0000);
        regs.set_lr(0x0800_1235);
        regs.set_pc(0x0800_0040);

        assert_eq!(regs[SP], 0x2001_0000);
        assert_eq!(regs[LR], 0x0800_1235);
        assert_eq!(regs[PC], 0x0800_0040);
        assert_eq!(regs.sp(), 0x2001_0000);
        assert_eq!(regs.lr(), 0x0800_1235);
        assert_eq!(regs.pc(), 0x0800_0040);
    }

    #[test]
    fn flags_set_and_clear_individually() {
        let mut regs = RegisterFile::new();
        for bit in [APSR_N, APSR_Z, APSR_C, APSR_V] {
            regs.set_flag(bit, true);
            assert!(regs.flag(bit));
        }
        for bit in [APSR_N, APSR_Z, APSR_C, APSR_V] {
            regs.set_flag(bit, false);
            assert!(!regs.flag(bit));
        }
        assert_eq!(regs.apsr(), 0);
    }

    #[test]
    fn non_flag_bits_are_never_stored() {
        let mut regs = RegisterFile::new();
        regs.set_flag(0x0000_00FF, true);
        assert_eq!(regs.apsr(), 0);
    }

    #[test]
    fn nz_update_reflects_sign_and_zero() {
        let mut regs = RegisterFile::new();
        regs.set_nz(0);
        assert!(regs.flag(APSR_Z));
        assert!(!regs.flag(APSR_N));

        regs.set_nz(0x8000_0000);
        assert!(!regs.flag(APSR_Z));
        assert!(regs.flag(APSR_N));

        regs.set_nz(1);
        assert!(!regs.flag(APSR_Z));
        assert!(!regs.flag(APSR_N));
    }
}
