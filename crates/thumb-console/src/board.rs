//! Fixed board map and boot glue.
//!
//! The layout mirrors a small Cortex-M part: flash low, SRAM and
//! scratch RAM in the middle, a hooked peripheral window, and a plain
//! response window high up for service-call results.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thumb_core::{AddressSpace, Cpu, Fault, Hook, MemoryFlag, Thumb};

/// Flash base; firmware images are linked here.
pub const FLASH_BASE: u64 = 0x0800_0000;
/// Flash window size.
pub const FLASH_SIZE: u32 = 256 * 1024;
/// Primary SRAM base.
pub const SRAM_BASE: u64 = 0x2000_0000;
/// Primary SRAM size.
pub const SRAM_SIZE: u32 = 64 * 1024;
/// Hooked peripheral window base.
pub const PERIPHERAL_BASE: u64 = 0x4000_0000;
/// Hooked peripheral window size.
pub const PERIPHERAL_SIZE: u32 = 4 * 1024;
/// Per-read tick counter register inside the peripheral window.
pub const TICKS_REGISTER: u64 = PERIPHERAL_BASE + 0x200;
/// Scratch RAM base.
pub const RAM_BASE: u64 = 0x6000_0000;
/// Scratch RAM size.
pub const RAM_SIZE: u32 = 192 * 1024;
/// Service-call response window base.
pub const RESPONSE_BASE: u64 = 0xE000_0000;
/// Service-call response window size.
pub const RESPONSE_SIZE: u32 = 16 * 1024;

/// Shared peripheral state observed by the board hook.
#[derive(Debug, Default)]
pub struct Peripherals {
    /// Reads of [`TICKS_REGISTER`] observed so far.
    pub ticks: RefCell<u64>,
    /// Backing store for every other peripheral register.
    pub registers: RefCell<HashMap<u64, u32>>,
}

impl Peripherals {
    fn hook(self: &Rc<Self>) -> Hook {
        let state = Rc::clone(self);
        Rc::new(RefCell::new(
            move |address: u64, is_read: bool, _size: u8, value: u32| {
                if is_read {
                    if address == TICKS_REGISTER {
                        let mut ticks = state.ticks.borrow_mut();
                        *ticks += 1;
                        #[allow(clippy::cast_possible_truncation)]
                        return *ticks as u32;
                    }
                    return state.registers.borrow().get(&address).copied().unwrap_or(0);
                }
                state.registers.borrow_mut().insert(address, value);
                0
            },
        ))
    }
}

/// Maps the board regions and flashes `firmware`.
///
/// # Errors
///
/// Propagates mapping faults and a flash failure when the image does not
/// fit the flash window.
pub fn build_space(firmware: &[u8]) -> Result<(AddressSpace, Rc<Peripherals>), Fault> {
    let peripherals = Rc::new(Peripherals::default());

    let mut space = AddressSpace::new();
    space.flash(FLASH_BASE, FLASH_SIZE, firmware, &Thumb)?;
    space.map(SRAM_BASE, SRAM_SIZE, MemoryFlag::ReadWrite)?;
    space.map_hook(PERIPHERAL_BASE, PERIPHERAL_SIZE, peripherals.hook())?;
    space.map(RAM_BASE, RAM_SIZE, MemoryFlag::ReadWrite)?;
    space.map(RESPONSE_BASE, RESPONSE_SIZE, MemoryFlag::ReadWrite)?;

    Ok((space, peripherals))
}

/// Builds the board and seeds the processor from the vector table: the
/// initial stack pointer from flash word 0, the entry point from word 1.
///
/// # Errors
///
/// Propagates board construction faults and vector-table reads.
#[allow(clippy::cast_possible_truncation)]
pub fn boot(firmware: &[u8]) -> Result<(Cpu, Rc<Peripherals>), Fault> {
    let (space, peripherals) = build_space(firmware)?;

    let initial_sp = space.read_u32(FLASH_BASE as u32)?;
    let reset_vector = space.read_u32(FLASH_BASE as u32 + 4)?;

    let mut cpu = Cpu::new(space);
    cpu.registers_mut().set_pc(reset_vector & !1);
    cpu.registers_mut().set_sp(if initial_sp == 0 {
        SRAM_BASE as u32 + SRAM_SIZE
    } else {
        initial_sp
    });
    Ok((cpu, peripherals))
}
