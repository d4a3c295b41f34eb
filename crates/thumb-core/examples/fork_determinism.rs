//! Fork determinism fingerprint: runs a firmware twice via fork and prints
//! a hash of the architectural state for cross-host comparison.

use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use thumb_core::{AddressSpace, Cpu, MemoryFlag, RegisterFile, Thumb, REGISTER_COUNT};

const FLASH: u64 = 0x0800_0000;
const SRAM: u64 = 0x2000_0000;

fn program() -> Vec<u8> {
    // movs r0, #0
    // movs r1, #10
    // loop: adds r0, #3
    //       lsls r2, r0, #1
    //       subs r1, #1
    //       bne loop
    //       b .
    [0x2000u16, 0x210A, 0x3003, 0x0042, 0x3901, 0xD1FB, 0xE7FE]
        .iter()
        .flat_map(|hw| hw.to_le_bytes())
        .collect()
}

fn hash_bytes(hash: &mut u64, bytes: &[u8]) {
    for byte in bytes {
        *hash ^= u64::from(*byte);
        *hash = hash.wrapping_mul(0x1000_0000_01B3);
    }
}

fn fingerprint(registers: &RegisterFile) -> u64 {
    let mut hash = 0xCBF2_9CE4_8422_2325u64;
    for index in 0..REGISTER_COUNT {
        hash_bytes(&mut hash, &registers[index].to_le_bytes());
    }
    hash_bytes(&mut hash, &registers.apsr().to_le_bytes());
    hash
}

fn boot() -> Cpu {
    let mut space = AddressSpace::new();
    space
        .flash(FLASH, 0x100, &program(), &Thumb)
        .unwrap_or_else(|fault| panic!("flash failed: {fault}"));
    space
        .map(SRAM, 0x1000, MemoryFlag::ReadWrite)
        .unwrap_or_else(|fault| panic!("map failed: {fault}"));
    let mut cpu = Cpu::new(space);
    #[allow(clippy::cast_possible_truncation)]
    cpu.registers_mut().set_pc(FLASH as u32);
    cpu
}

fn main() {
    let mut reference = boot();
    reference.run(5);

    // Fork mid-run; both sides must finish with identical state.
    let mut fork = reference.fork();
    reference.run(10_000);
    fork.run(10_000);

    let lhs = fingerprint(reference.registers());
    let rhs = fingerprint(fork.registers());
    println!("fork-determinism {lhs:016x} {rhs:016x}");
    assert_eq!(lhs, rhs, "fork diverged from its parent");
}
