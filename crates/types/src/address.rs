use core::fmt;

/// Byte address inside the arena or inside a process heap.
///
/// Addresses are opaque: the only way to turn one into a buffer index is
/// through the owning allocator, which performs the bounds checks. The
/// value `0` is reserved as the null pointer in every address space, so
/// `Addr::NULL` never names a live allocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct Addr(u32);

impl Addr {
    pub const NULL: Addr = Addr(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, offset: u32) -> Option<Self> {
        self.0.checked_add(offset).map(Addr)
    }

    /// Distance from `base` to `self`, or `None` when `self` lies below `base`.
    pub fn offset_from(self, base: Addr) -> Option<u32> {
        self.0.checked_sub(base.0)
    }

    /// Interpret a value popped from the interpreter stack as an address.
    /// Values outside the 32-bit address space map to `None`.
    pub fn from_slot(value: i64) -> Option<Self> {
        u32::try_from(value).ok().map(Addr)
    }

    pub const fn to_slot(self) -> i64 {
        self.0 as i64
    }
}

impl From<u32> for Addr {
    fn from(value: u32) -> Self {
        Addr(value)
    }
}

impl From<Addr> for u32 {
    fn from(value: Addr) -> Self {
        value.0
    }
}

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
