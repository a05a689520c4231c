/// Compile-time limits shared by the allocator, the interpreter and the
/// scheduler.
pub struct Config;

impl Config {
    /// Bytes per interpreter stack slot.
    pub const SLOT_BYTES: u32 = 8;
    /// Stack regions grow and shrink by this many bytes.
    pub const STACK_GROW_BYTES: u32 = 256;

    pub const DEFAULT_ARENA_BYTES: u32 = 64 * 1024 * 1024;
    pub const DEFAULT_HEAP_BYTES: u32 = 24 * 1024;
    pub const DEFAULT_STACK_BYTES: u32 = 12 * 1024;

    /// Register-style local slots reserved in every call frame.
    pub const FRAME_LOCALS: u32 = 16;
    /// Depth of the call-frame region.
    pub const MAX_FRAMES: u32 = 64;
    /// One frame record: return address slot followed by the locals.
    pub const FRAME_BYTES: u32 = (1 + Self::FRAME_LOCALS) * Self::SLOT_BYTES;

    /// A process this many cycles behind another is scheduled first
    /// regardless of its weight.
    pub const STARVATION_CYCLES: u64 = 20;
    /// Total processes a kernel may create over its lifetime.
    pub const MAX_PROCESSES: u32 = 65_536;

    pub const DEFAULT_WORKERS: usize = 8;
    pub const DEFAULT_PROCESS_PRIORITY: u32 = 10;
    pub const DEFAULT_PRIORITY_BUDGET: u32 = 10_000;

    /// `CALL` operands carry a type tag in the top byte and a function
    /// address in the low three bytes.
    pub const CALL_ADDRESS_MASK: u32 = 0x00ff_ffff;
}
