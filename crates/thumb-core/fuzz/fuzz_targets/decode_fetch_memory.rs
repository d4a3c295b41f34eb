#![no_main]

use libfuzzer_sys::fuzz_target;
use thumb_core::{AddressSpace, Cpu, MemoryFlag, Thumb};

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    let probe = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    let image = &data[4..data.len().min(4 + 0x200)];

    let mut space = AddressSpace::new();
    if space.flash(0x0800_0000, 0x200, image, &Thumb).is_err() {
        return;
    }
    if space
        .map(0x2000_0000, 0x1000, MemoryFlag::ReadWrite)
        .is_err()
    {
        return;
    }

    // Arbitrary firmware must never panic the memory model or the loop;
    // every malformed input surfaces as a fault value instead.
    let _ = space.fetch_code(probe);
    let _ = space.read_u32(probe);
    let _ = space.read_u16(probe);
    let _ = space.read_u8(probe);
    let _ = space.write_u8(probe, data[4]);

    let mut cpu = Cpu::new(space);
    cpu.registers_mut().set_pc(0x0800_0000);
    cpu.registers_mut().set_sp(0x2000_1000);
    let _ = cpu.run(256);
});
