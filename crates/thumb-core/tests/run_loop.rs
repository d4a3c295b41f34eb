//! Run-loop integration: handler routing, budgets, fault reporting and a
//! small whole-program scenario.

use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use std::cell::RefCell;
use std::rc::Rc;

use thumb_core::{
    AddressSpace, Control, Cpu, Event, Fault, MemoryFlag, RunOutcome, Thumb,
};

const FLASH: u64 = 0x0800_0000;
const FLASH32: u32 = 0x0800_0000;
const SRAM: u32 = 0x2000_0000;

fn boot(halfwords: &[u16]) -> Cpu {
    let image: Vec<u8> = halfwords.iter().flat_map(|hw| hw.to_le_bytes()).collect();
    let mut space = AddressSpace::new();
    space.flash(FLASH, 0x400, &image, &Thumb).unwrap();
    space
        .map(u64::from(SRAM), 0x1000, MemoryFlag::ReadWrite)
        .unwrap();
    let mut cpu = Cpu::new(space);
    cpu.registers_mut().set_pc(FLASH32);
    cpu.registers_mut().set_sp(SRAM + 0x1000);
    cpu
}

#[test]
fn interrupts_route_through_the_handler_in_program_order() {
    // svc #1; svc #2; svc #3; b .
    let mut cpu = boot(&[0xDF01, 0xDF02, 0xDF03, 0xE7FE]);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_in_handler = Rc::clone(&seen);
    cpu.set_handler(Box::new(move |event| {
        if let Event::Interrupt(argument) = event {
            seen_in_handler.borrow_mut().push(*argument);
        }
        Control::Continue
    }));

    assert_eq!(cpu.run(16), RunOutcome::BudgetExhausted);
    assert_eq!(*seen.borrow(), vec![1, 2, 3]);
}

#[test]
fn fault_events_carry_the_faulting_program_counter() {
    // nop; then a load from unmapped memory
    // ldr r0, [r1]  with r1 pointing nowhere
    let mut cpu = boot(&[0xBF00, 0x6808, 0xE7FE]);
    cpu.registers_mut()[1] = 0xCAFE_0000;

    let outcome = cpu.run(10);
    assert_eq!(
        outcome,
        RunOutcome::Stopped(Event::Fault {
            fault: Fault::InvalidMemoryAccess {
                address: 0xCAFE_0000
            },
            pc: FLASH32 + 2,
        })
    );
    // A faulted step never advances the program counter.
    assert_eq!(cpu.registers().pc(), FLASH32 + 2);
}

#[test]
fn handler_may_repair_a_fault_and_resume() {
    // ldr r0, [r1]; movs r2, #9; svc #0
    let mut cpu = boot(&[0x6808, 0x2209, 0xDF00]);
    cpu.registers_mut()[1] = 0xCAFE_0000;

    cpu.set_handler(Box::new(|event| match event {
        Event::Fault { .. } => Control::Continue,
        Event::Interrupt(_) => Control::Stop,
    }));

    // The fault repeats until the budget would expire, so patch the
    // source register from the handler side after the first report.
    let outcome = cpu.run(1);
    assert_eq!(cpu.registers().pc(), FLASH32);
    assert!(matches!(outcome, RunOutcome::BudgetExhausted));

    cpu.registers_mut()[1] = SRAM;
    assert_eq!(cpu.run(10), RunOutcome::Stopped(Event::Interrupt(0)));
    assert_eq!(cpu.registers()[2], 9);
}

#[test]
fn budget_counts_every_step_including_faulting_ones() {
    // b .
    let mut cpu = boot(&[0xE7FE]);
    assert_eq!(cpu.run(0), RunOutcome::BudgetExhausted);
    assert_eq!(cpu.run(5), RunOutcome::BudgetExhausted);
    assert_eq!(cpu.registers().pc(), FLASH32);
}

#[test]
fn countdown_loop_runs_to_its_service_call() {
    // movs r0, #5
    // loop: subs r0, #1
    //       bne loop
    //       svc #99
    let mut cpu = boot(&[0x2005, 0x3801, 0xD1FD, 0xDF63]);
    assert_eq!(cpu.run(100), RunOutcome::Stopped(Event::Interrupt(99)));
    assert_eq!(cpu.registers()[0], 0);
}

#[test]
fn call_and_return_through_bl_and_bx() {
    // 0x00: bl +8 (to 0x0C)
    // 0x04: svc #5
    // 0x06: b .
    // 0x08: (pad)
    // 0x0C: movs r4, #1
    // 0x0E: bx lr
    let mut cpu = boot(&[
        0xF000, 0xF804, // bl 0x0C
        0xDF05, // svc #5
        0xE7FE, // b .
        0xBF00, // pad
        0xBF00, // pad
        0x2401, // movs r4, #1
        0x4770, // bx lr
    ]);
    assert_eq!(cpu.run(100), RunOutcome::Stopped(Event::Interrupt(5)));
    assert_eq!(cpu.registers()[4], 1);
    assert_eq!(cpu.registers().lr(), (FLASH32 + 4) | 1);
}

#[test]
fn peripheral_hook_drives_a_polling_loop() {
    // loop: ldr r0, [r1]   (r1 -> ticks register behind a hook)
    //       cmp r0, #3
    //       bne loop
    //       svc #0
    let image: Vec<u8> = [0x6808u16, 0x2803, 0xD1FC, 0xDF00]
        .iter()
        .flat_map(|hw| hw.to_le_bytes())
        .collect();

    let ticks = Rc::new(RefCell::new(0u32));
    let ticks_in_hook = Rc::clone(&ticks);
    let hook: thumb_core::Hook = Rc::new(RefCell::new(
        move |_address: u64, is_read: bool, _size: u8, _value: u32| {
            if is_read {
                let mut ticks = ticks_in_hook.borrow_mut();
                *ticks += 1;
                *ticks
            } else {
                0
            }
        },
    ));

    let mut space = AddressSpace::new();
    space.flash(FLASH, 0x40, &image, &Thumb).unwrap();
    space.map_hook(0x4000_0000, 0x1000, hook).unwrap();

    let mut cpu = Cpu::new(space);
    cpu.registers_mut().set_pc(FLASH32);
    cpu.registers_mut()[1] = 0x4000_0200;

    assert_eq!(cpu.run(1000), RunOutcome::Stopped(Event::Interrupt(0)));
    assert_eq!(*ticks.borrow(), 3);
    assert_eq!(cpu.registers()[0], 3);
}
