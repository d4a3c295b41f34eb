//! Fetch-decode-execute loop with a caller-supplied event handler.

use core::fmt;

use crate::isa::{InstructionSet, Step, Thumb};
use crate::memory::{lane, AddressSpace};
use crate::state::RegisterFile;
use crate::Fault;

/// An execution event surfaced to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A fault raised during fetch, decode or execute. The program
    /// counter still addresses the faulting instruction.
    Fault {
        /// The fault itself.
        fault: Fault,
        /// Address of the instruction that faulted.
        pc: u32,
    },
    /// A software interrupt with its request argument. The program
    /// counter already addresses the following instruction.
    Interrupt(u32),
}

/// Handler verdict after an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Resume stepping.
    Continue,
    /// Leave the run loop.
    Stop,
}

/// Why [`Cpu::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The step budget ran out with no stopping event.
    BudgetExhausted,
    /// The handler stopped on this event, or no handler was installed.
    Stopped(Event),
}

/// Event handler invoked from the run loop.
pub type Handler = Box<dyn FnMut(&Event) -> Control>;

/// A processor: register file, address space, instruction set and the
/// optional event handler.
pub struct Cpu<I: InstructionSet = Thumb> {
    registers: RegisterFile,
    memory: AddressSpace,
    isa: I,
    handler: Option<Handler>,
}

impl Cpu<Thumb> {
    /// Creates a processor over `memory` with the built-in Thumb subset.
    #[must_use]
    pub const fn new(memory: AddressSpace) -> Self {
        Self::with_isa(memory, Thumb)
    }
}

impl<I: InstructionSet> Cpu<I> {
    /// Creates a processor over `memory` with a caller-supplied decoder.
    #[must_use]
    pub const fn with_isa(memory: AddressSpace, isa: I) -> Self {
        Self {
            registers: RegisterFile::new(),
            memory,
            isa,
            handler: None,
        }
    }

    /// The register file.
    #[must_use]
    pub const fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Mutable register file, for reset-vector seeding and test setup.
    pub const fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    /// The address space.
    #[must_use]
    pub const fn memory(&self) -> &AddressSpace {
        &self.memory
    }

    /// Mutable address space.
    pub const fn memory_mut(&mut self) -> &mut AddressSpace {
        &mut self.memory
    }

    /// Installs the event handler consulted by [`Self::run`].
    pub fn set_handler(&mut self, handler: Handler) {
        self.handler = Some(handler);
    }

    /// Executes one instruction.
    ///
    /// Returns `Ok(None)` for a retired or branching instruction and
    /// `Ok(Some(argument))` for a software interrupt, with the program
    /// counter already advanced past the request.
    ///
    /// # Errors
    ///
    /// Propagates fetch, decode and execute faults; the program counter
    /// is left at the faulting instruction.
    pub fn step(&mut self) -> Result<Option<u32>, Fault> {
        let pc = self.registers.pc();
        lane::validate_fetch_alignment(pc)?;

        let cached = self
            .memory
            .exec_cache()
            .filter(|cache| cache.contains(pc))
            .and_then(|cache| cache.lookup(pc));
        let decoded = match cached {
            Some(slot) if slot.op == crate::encoding::Op::Fault => {
                // The slot recorded a decode failure at cache build time;
                // decode again to surface the precise fault.
                return match self.isa.decode(&self.memory, pc) {
                    Err(fault) => Err(fault),
                    Ok(_) => Err(Fault::UnexpectedLogic { address: pc }),
                };
            }
            Some(slot) => slot,
            None => self.isa.decode(&self.memory, pc)?,
        };

        match self
            .isa
            .execute(&mut self.registers, &mut self.memory, pc, decoded)?
        {
            Step::Retired => {
                self.registers.set_pc(pc.wrapping_add(decoded.op.width()));
                Ok(None)
            }
            Step::Jumped => Ok(None),
            Step::Interrupt(argument) => {
                self.registers.set_pc(pc.wrapping_add(2));
                Ok(Some(argument))
            }
        }
    }

    /// Steps up to `max_steps` instructions, routing every fault and
    /// software interrupt through the handler. Without a handler the
    /// first event stops the loop.
    pub fn run(&mut self, max_steps: u64) -> RunOutcome {
        for _ in 0..max_steps {
            let event = match self.step() {
                Ok(None) => continue,
                Ok(Some(argument)) => Event::Interrupt(argument),
                Err(fault) => Event::Fault {
                    fault,
                    pc: self.registers.pc(),
                },
            };
            let control = match self.handler.as_mut() {
                Some(handler) => handler(&event),
                None => Control::Stop,
            };
            if control == Control::Stop {
                return RunOutcome::Stopped(event);
            }
        }
        RunOutcome::BudgetExhausted
    }

    /// A deep copy of registers and memory sharing hooks with the
    /// original. The handler is not carried over; the fork starts with
    /// none installed.
    #[must_use]
    pub fn fork(&self) -> Self
    where
        I: Clone,
    {
        Self {
            registers: self.registers,
            memory: self.memory.fork(),
            isa: self.isa.clone(),
            handler: None,
        }
    }
}

impl<I: InstructionSet + fmt::Debug> fmt::Debug for Cpu<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("registers", &self.registers)
            .field("memory", &self.memory)
            .field("isa", &self.isa)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}
