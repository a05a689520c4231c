use core::fmt;

/// Kernel-assigned process identity. Ids come from a strictly increasing
/// counter and are never handed out twice by the same kernel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ProcessId(u32);

impl ProcessId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Decode a process id pushed on the interpreter stack.
    pub fn from_slot(value: i64) -> Option<Self> {
        u32::try_from(value).ok().map(ProcessId)
    }

    pub const fn to_slot(self) -> i64 {
        self.0 as i64
    }
}

impl From<u32> for ProcessId {
    fn from(value: u32) -> Self {
        ProcessId(value)
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid#{}", self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
