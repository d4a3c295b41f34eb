//! One contiguous mapped span of the emulated address space.

#![allow(clippy::cast_lossless)]

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::Fault;

/// Access policy for a mapped region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum MemoryFlag {
    /// Code image: fetchable and readable; writable only until the
    /// execution cache is built.
    ExecuteRead,
    /// Plain RAM: readable and writable.
    ReadWrite,
    /// Memory-mapped peripheral window served by a callback.
    Hook,
}

/// Peripheral callback: `(address, is_read, size, value) -> value`.
///
/// For reads the return value is the loaded data; for writes it is ignored.
/// The single signature keeps read and write hooks in one closure, matching
/// how boards wire a peripheral window once.
pub type HookFn = dyn FnMut(u64, bool, u8, u32) -> u32;

/// Shared, reference-counted peripheral callback handle.
///
/// Forked address spaces clone the handle, not the peripheral state, so a
/// fork still observes the same external device.
pub type Hook = Rc<RefCell<HookFn>>;

/// One contiguous mapped span: address range, access flag, and either a
/// word-granular backing store or a peripheral hook.
#[derive(Clone)]
pub struct MemoryRegion {
    begin: u64,
    size: u32,
    flag: MemoryFlag,
    words: Vec<u32>,
    hook: Option<Hook>,
}

impl MemoryRegion {
    /// Creates a region backed by a freshly zeroed word store.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidSize`] when `size` is not a multiple of 4 or
    /// the region would extend past the 32-bit address space.
    pub fn new(begin: u64, size: u32, flag: MemoryFlag) -> Result<Self, Fault> {
        Self::check_bounds(begin, size)?;
        Ok(Self {
            begin,
            size,
            flag,
            words: vec![0; (size / 4) as usize],
            hook: None,
        })
    }

    /// Creates a peripheral region served by `hook`.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidSize`] when `size` is not a multiple of 4 or
    /// the region would extend past the 32-bit address space.
    pub fn with_hook(begin: u64, size: u32, hook: Hook) -> Result<Self, Fault> {
        Self::check_bounds(begin, size)?;
        Ok(Self {
            begin,
            size,
            flag: MemoryFlag::Hook,
            words: Vec::new(),
            hook: Some(hook),
        })
    }

    // Every address inside a region must be reachable through a u32
    // accessor, so the end may not cross the 4 GiB boundary.
    const fn check_bounds(begin: u64, size: u32) -> Result<(), Fault> {
        if size % 4 != 0 || begin.saturating_add(size as u64) > 1 << 32 {
            Err(Fault::InvalidSize { size })
        } else {
            Ok(())
        }
    }

    /// Base address of the region.
    #[must_use]
    pub const fn begin(&self) -> u64 {
        self.begin
    }

    /// Region length in bytes; always a multiple of 4.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// One-past-the-end address.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.begin + self.size as u64
    }

    /// Access policy of this region.
    #[must_use]
    pub const fn flag(&self) -> MemoryFlag {
        self.flag
    }

    /// Structural containment check for `[address, address + access)`.
    #[must_use]
    pub const fn contains(&self, address: u64, access: u32) -> bool {
        self.begin <= address && address + access as u64 <= self.end()
    }

    /// Translates an address inside the region to its word-store index.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn word_index(&self, address: u64) -> usize {
        ((address - self.begin) / 4) as usize
    }

    /// Reads the backing-store word containing `address`.
    #[must_use]
    pub fn word(&self, address: u64) -> u32 {
        self.words[self.word_index(address)]
    }

    /// Replaces the backing-store word containing `address`.
    pub fn set_word(&mut self, address: u64, value: u32) {
        let index = self.word_index(address);
        self.words[index] = value;
    }

    /// Peripheral callback handle, present only on hook regions.
    #[must_use]
    pub const fn hook(&self) -> Option<&Hook> {
        self.hook.as_ref()
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("begin", &format_args!("{:#010x}", self.begin))
            .field("size", &self.size)
            .field("flag", &self.flag)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{Hook, MemoryFlag, MemoryRegion};
    use crate::Fault;

    fn constant_hook(value: u32) -> Hook {
        Rc::new(RefCell::new(
            move |_addr: u64, _is_read: bool, _size: u8, _value: u32| value,
        ))
    }

    #[test]
    fn construction_zeroes_the_word_store() {
        let region = MemoryRegion::new(0x2000_0000, 16, MemoryFlag::ReadWrite).unwrap();
        for offset in (0..16).step_by(4) {
            assert_eq!(region.word(0x2000_0000 + offset), 0);
        }
    }

    #[test]
    fn non_word_multiple_size_is_rejected() {
        for size in [1u32, 2, 3, 5, 4097] {
            assert_eq!(
                MemoryRegion::new(0, size, MemoryFlag::ReadWrite).unwrap_err(),
                Fault::InvalidSize { size }
            );
        }
        assert!(MemoryRegion::with_hook(0, 6, constant_hook(0)).is_err());
    }

    #[test]
    fn regions_crossing_the_4_gib_boundary_are_rejected() {
        assert_eq!(
            MemoryRegion::new(0xFFFF_F000, 0x2000, MemoryFlag::ReadWrite).unwrap_err(),
            Fault::InvalidSize { size: 0x2000 }
        );
        assert!(MemoryRegion::new(0x1_0000_0000, 4, MemoryFlag::ReadWrite).is_err());
        assert!(MemoryRegion::with_hook(0xFFFF_F000, 0x2000, constant_hook(0)).is_err());
        // The last mappable page is still fine.
        assert!(MemoryRegion::new(0xFFFF_F000, 0x1000, MemoryFlag::ReadWrite).is_ok());
    }

    #[test]
    fn containment_is_end_exclusive_and_access_sized() {
        let region = MemoryRegion::new(0x100, 8, MemoryFlag::ReadWrite).unwrap();
        assert!(region.contains(0x100, 4));
        assert!(region.contains(0x104, 4));
        assert!(region.contains(0x107, 1));
        assert!(!region.contains(0x105, 4));
        assert!(!region.contains(0x108, 1));
        assert!(!region.contains(0xFF, 1));
    }

    #[test]
    fn word_index_is_word_granular() {
        let region = MemoryRegion::new(0x2000_0000, 4096, MemoryFlag::ReadWrite).unwrap();
        assert_eq!(region.word_index(0x2000_0000), 0);
        assert_eq!(region.word_index(0x2000_0003), 0);
        assert_eq!(region.word_index(0x2000_0004), 1);
        assert_eq!(region.word_index(0x2000_0FFF), 1023);
    }

    #[test]
    fn clone_shares_the_hook_handle() {
        let hits = Rc::new(RefCell::new(0u32));
        let hits_in_hook = Rc::clone(&hits);
        let hook: Hook = Rc::new(RefCell::new(
            move |_addr: u64, _is_read: bool, _size: u8, _value: u32| {
                *hits_in_hook.borrow_mut() += 1;
                0
            },
        ));

        let region = MemoryRegion::with_hook(0x4000_0000, 4096, hook).unwrap();
        let fork = region.clone();
        (region.hook().unwrap().borrow_mut())(0x4000_0000, true, 4, 0);
        (fork.hook().unwrap().borrow_mut())(0x4000_0000, true, 4, 0);
        assert_eq!(*hits.borrow(), 2);
    }

    #[test]
    fn clone_copies_the_word_store() {
        let mut region = MemoryRegion::new(0x2000_0000, 8, MemoryFlag::ReadWrite).unwrap();
        region.set_word(0x2000_0004, 0xDEAD_BEEF);
        let mut fork = region.clone();
        fork.set_word(0x2000_0004, 0x1111_1111);
        assert_eq!(region.word(0x2000_0004), 0xDEAD_BEEF);
        assert_eq!(fork.word(0x2000_0004), 0x1111_1111);
    }
}
