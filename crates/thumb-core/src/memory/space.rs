//! Ordered collection of mapped regions with flag policy, sub-word access
//! arithmetic, per-class region cursors, and the executable decode cache.

#![allow(clippy::cast_possible_truncation)]

use std::cell::Cell;

use crate::exec_cache::ExecutionCache;
use crate::isa::InstructionSet;
use crate::memory::lane;
use crate::memory::region::{Hook, MemoryFlag, MemoryRegion};
use crate::Fault;

/// The emulated address space: an insertion-ordered set of non-overlapping
/// regions. First structural match wins on lookup; overlapping maps are a
/// caller configuration error and are not detected.
///
/// Three independent one-region cursors remember the last region that
/// satisfied each access class (execute/read/write). A cursor hit is
/// re-validated against the requested range on every access, so the cursors
/// are purely a speed optimization and never affect which region resolves.
#[derive(Debug, Default)]
pub struct AddressSpace {
    regions: Vec<MemoryRegion>,
    exec_index: Option<usize>,
    exec_cursor: Cell<Option<usize>>,
    read_cursor: Cell<Option<usize>>,
    write_cursor: Cell<Option<usize>>,
    exec_cache: Option<ExecutionCache>,
}

impl AddressSpace {
    /// Creates an empty address space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a region to the map.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::DuplicateExecutableRegion`] when an execute-read
    /// region is already mapped; only one contiguous code image is
    /// supported.
    pub fn map_region(&mut self, region: MemoryRegion) -> Result<(), Fault> {
        if region.flag() == MemoryFlag::ExecuteRead {
            if let Some(index) = self.exec_index {
                return Err(Fault::DuplicateExecutableRegion {
                    existing: self.regions[index].begin(),
                });
            }
            self.exec_index = Some(self.regions.len());
        }
        self.regions.push(region);
        Ok(())
    }

    /// Maps a store-backed region.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidSize`] when `size` is not a multiple of 4 or
    /// the region crosses the 4 GiB boundary, or
    /// [`Fault::DuplicateExecutableRegion`] for a second code region.
    pub fn map(&mut self, address: u64, size: u32, flag: MemoryFlag) -> Result<(), Fault> {
        self.map_region(MemoryRegion::new(address, size, flag)?)
    }

    /// Maps a peripheral region served by `hook`.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidSize`] when `size` is not a multiple of 4 or
    /// the region crosses the 4 GiB boundary.
    pub fn map_hook(&mut self, address: u64, size: u32, hook: Hook) -> Result<(), Fault> {
        self.map_region(MemoryRegion::with_hook(address, size, hook)?)
    }

    /// Maps an execute-read region, writes the firmware image into it, and
    /// eagerly builds the execution cache.
    ///
    /// # Errors
    ///
    /// Propagates mapping faults, [`Fault::InvalidMemoryAccess`] when the
    /// image does not fit the region, and decode-cache build faults.
    pub fn flash(
        &mut self,
        address: u64,
        size: u32,
        firmware: &[u8],
        isa: &dyn InstructionSet,
    ) -> Result<(), Fault> {
        self.map(address, size, MemoryFlag::ExecuteRead)?;
        self.write_buffer(address as u32, firmware)?;
        self.build_exec_cache(isa)
    }

    /// The single executable region, when one is mapped.
    #[must_use]
    pub fn exec_region(&self) -> Option<&MemoryRegion> {
        self.exec_index.map(|index| &self.regions[index])
    }

    /// The per-region decode cache, once built.
    #[must_use]
    pub const fn exec_cache(&self) -> Option<&ExecutionCache> {
        self.exec_cache.as_ref()
    }

    /// Builds the execution cache over the executable region. Idempotent;
    /// the cache is never invalidated once built.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::UnexpectedLogic`] when no executable region is
    /// mapped or a decode yields the reserved placeholder tag; propagates
    /// non-decode faults from the decoder.
    pub fn build_exec_cache(&mut self, isa: &dyn InstructionSet) -> Result<(), Fault> {
        if self.exec_cache.is_none() {
            self.exec_cache = Some(ExecutionCache::build(self, isa)?);
        }
        Ok(())
    }

    /// Produces an independent copy: word stores are cloned element for
    /// element, hook handles are shared, the decode cache is carried, and
    /// the access cursors start cold.
    #[must_use]
    pub fn fork(&self) -> Self {
        Self {
            regions: self.regions.clone(),
            exec_index: self.exec_index,
            exec_cursor: Cell::new(None),
            read_cursor: Cell::new(None),
            write_cursor: Cell::new(None),
            exec_cache: self.exec_cache.clone(),
        }
    }

    /// Resolves `[address, address + access)` to a region index through a
    /// cursor, falling back to a first-match scan of the map.
    fn resolve(
        &self,
        cursor: &Cell<Option<usize>>,
        address: u64,
        access: u32,
    ) -> Result<usize, Fault> {
        if let Some(index) = cursor.get() {
            if self.regions[index].contains(address, access) {
                return Ok(index);
            }
        }
        for (index, region) in self.regions.iter().enumerate() {
            if region.contains(address, access) {
                cursor.set(Some(index));
                return Ok(index);
            }
        }
        Err(Fault::InvalidMemoryAccess {
            address: address as u32,
        })
    }

    /// Fetches the halfword at `address` from the executable region.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::AlignmentFault`] for odd addresses and
    /// [`Fault::InvalidMemoryAccess`] outside the executable region.
    pub fn fetch_code(&self, address: u32) -> Result<u16, Fault> {
        lane::validate_fetch_alignment(address)?;
        let addr = u64::from(address);
        let index = self.resolve(&self.exec_cursor, addr, 2)?;
        let region = &self.regions[index];
        if region.flag() != MemoryFlag::ExecuteRead {
            return Err(Fault::InvalidMemoryAccess { address });
        }
        Ok(lane::extract_half(
            region.word(addr),
            lane::byte_lane(address),
        ))
    }

    /// Reads one byte. Raw lane extraction, never sign-extended.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidMemoryAccess`] when no region covers the
    /// address.
    pub fn read_u8(&self, address: u32) -> Result<u8, Fault> {
        let addr = u64::from(address);
        let index = self.resolve(&self.read_cursor, addr, 1)?;
        let region = &self.regions[index];
        match region.flag() {
            MemoryFlag::Hook => Ok(call_hook(region, addr, true, 1, 0) as u8),
            MemoryFlag::ExecuteRead | MemoryFlag::ReadWrite => Ok(lane::extract_byte(
                region.word(addr),
                lane::byte_lane(address),
            )),
        }
    }

    /// Reads one halfword at word offset 0 or 2.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidMemoryAccess`] when no region covers the
    /// range, or [`Fault::AlignmentFault`] at other offsets of a
    /// store-backed region.
    pub fn read_u16(&self, address: u32) -> Result<u16, Fault> {
        let addr = u64::from(address);
        let index = self.resolve(&self.read_cursor, addr, 2)?;
        let region = &self.regions[index];
        match region.flag() {
            MemoryFlag::Hook => Ok(call_hook(region, addr, true, 2, 0) as u16),
            MemoryFlag::ExecuteRead | MemoryFlag::ReadWrite => {
                lane::validate_half_alignment(address)?;
                Ok(lane::extract_half(
                    region.word(addr),
                    lane::byte_lane(address),
                ))
            }
        }
    }

    /// Reads one word at word offset 0.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidMemoryAccess`] when no region covers the
    /// range, or [`Fault::AlignmentFault`] at non-zero word offsets of a
    /// store-backed region.
    pub fn read_u32(&self, address: u32) -> Result<u32, Fault> {
        let addr = u64::from(address);
        let index = self.resolve(&self.read_cursor, addr, 4)?;
        let region = &self.regions[index];
        match region.flag() {
            MemoryFlag::Hook => Ok(call_hook(region, addr, true, 4, 0)),
            MemoryFlag::ExecuteRead | MemoryFlag::ReadWrite => {
                lane::validate_word_alignment(address)?;
                Ok(region.word(addr))
            }
        }
    }

    /// Writes one byte into its lane of the containing word.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidMemoryAccess`] when no region covers the
    /// address or the region's flag forbids the write.
    pub fn write_u8(&mut self, address: u32, value: u8) -> Result<(), Fault> {
        let addr = u64::from(address);
        let index = self.resolve(&self.write_cursor, addr, 1)?;
        self.check_writable(index, address)?;
        if self.regions[index].flag() == MemoryFlag::Hook {
            call_hook(&self.regions[index], addr, false, 1, u32::from(value));
            return Ok(());
        }
        let region = &mut self.regions[index];
        let merged = lane::merge_byte(region.word(addr), lane::byte_lane(address), value);
        region.set_word(addr, merged);
        Ok(())
    }

    /// Writes one halfword at word offset 0 or 2.
    ///
    /// # Errors
    ///
    /// As [`Self::write_u8`], plus [`Fault::AlignmentFault`] at other
    /// offsets of a store-backed region.
    pub fn write_u16(&mut self, address: u32, value: u16) -> Result<(), Fault> {
        let addr = u64::from(address);
        let index = self.resolve(&self.write_cursor, addr, 2)?;
        self.check_writable(index, address)?;
        if self.regions[index].flag() == MemoryFlag::Hook {
            call_hook(&self.regions[index], addr, false, 2, u32::from(value));
            return Ok(());
        }
        lane::validate_half_alignment(address)?;
        let region = &mut self.regions[index];
        let merged = lane::merge_half(region.word(addr), lane::byte_lane(address), value);
        region.set_word(addr, merged);
        Ok(())
    }

    /// Writes one word at word offset 0.
    ///
    /// # Errors
    ///
    /// As [`Self::write_u8`], plus [`Fault::AlignmentFault`] at non-zero
    /// word offsets of a store-backed region.
    pub fn write_u32(&mut self, address: u32, value: u32) -> Result<(), Fault> {
        let addr = u64::from(address);
        let index = self.resolve(&self.write_cursor, addr, 4)?;
        self.check_writable(index, address)?;
        if self.regions[index].flag() == MemoryFlag::Hook {
            call_hook(&self.regions[index], addr, false, 4, value);
            return Ok(());
        }
        lane::validate_word_alignment(address)?;
        let region = &mut self.regions[index];
        region.set_word(addr, value);
        Ok(())
    }

    /// Copies `len` bytes out of a single store-backed region.
    ///
    /// Hook regions never back raw buffer copies; peripheral traffic must go
    /// through the single-value calls so each access triggers the hook.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidMemoryAccess`] when the whole range is not
    /// inside one readable store-backed region.
    pub fn read_buffer(&self, address: u32, len: u32) -> Result<Vec<u8>, Fault> {
        let addr = u64::from(address);
        let index = self.resolve(&self.read_cursor, addr, len)?;
        if self.regions[index].flag() == MemoryFlag::Hook {
            return Err(Fault::InvalidMemoryAccess { address });
        }
        let mut buffer = Vec::with_capacity(len as usize);
        for offset in 0..len {
            buffer.push(self.read_u8(address + offset)?);
        }
        Ok(buffer)
    }

    /// Copies `bytes` into a single store-backed region, byte by byte.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidMemoryAccess`] when the whole range is not
    /// inside one writable store-backed region.
    pub fn write_buffer(&mut self, address: u32, bytes: &[u8]) -> Result<(), Fault> {
        let len =
            u32::try_from(bytes.len()).map_err(|_| Fault::InvalidMemoryAccess { address })?;
        let addr = u64::from(address);
        let index = self.resolve(&self.write_cursor, addr, len)?;
        if self.regions[index].flag() == MemoryFlag::Hook {
            return Err(Fault::InvalidMemoryAccess { address });
        }
        for (offset, byte) in bytes.iter().enumerate() {
            self.write_u8(address + offset as u32, *byte)?;
        }
        Ok(())
    }

    /// Write policy: read-write and hook regions are always writable; the
    /// executable region only until its decode cache is built (the cache is
    /// never invalidated, so later code patches must fail loudly).
    fn check_writable(&self, index: usize, address: u32) -> Result<(), Fault> {
        match self.regions[index].flag() {
            MemoryFlag::ReadWrite | MemoryFlag::Hook => Ok(()),
            MemoryFlag::ExecuteRead => {
                if self.exec_cache.is_some() {
                    Err(Fault::InvalidMemoryAccess { address })
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Dispatches a single access to a hook region's peripheral callback.
fn call_hook(region: &MemoryRegion, addr: u64, is_read: bool, size: u8, value: u32) -> u32 {
    region
        .hook()
        .map_or(0, |hook| (hook.borrow_mut())(addr, is_read, size, value))
}
