/// Fixed capacity of the root arena.
pub const ARENA_SIZE: usize = 100;

/// Number of object slots in each heap page.
pub const HEAP_PAGE_SIZE: usize = 10_000;

/// Number of heap pages after which allocation fails.
pub const HEAP_MAX_PAGES: usize = 65_536;

/// Capacity of the operand stack, in values.
pub const STACK_SIZE: usize = 1024;

/// Capacity of the call-frame stack.
pub const FRAME_SIZE: usize = 1024;

/// Capacity of the rescue stack.
pub const RESCUE_SIZE: usize = 30;

/// Initial capacity of the global table.
pub const GLOBALS_SIZE: usize = 1024;

/// Number of dispatch loops that may be active at once.
pub const NESTING_LIMIT: usize = 256;

/// How the interpreter selects the handler for each instruction.
///
/// Both strategies call the same handlers and behave identically.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Dispatch
{
    /// Match on the instruction at every step.
    Switch,

    /// Call the handler that was resolved when the bytecode was verified.
    Threaded,
}

impl Default for Dispatch
{
    fn default() -> Self
    {
        if cfg!(feature = "direct-threaded") {
            Self::Threaded
        } else {
            Self::Switch
        }
    }
}

/// Limits and knobs of a runtime instance.
///
/// Defaults are taken from the constants in this module
/// and from the crate features.
#[derive(Clone, Debug)]
pub struct Config
{
    /// Fixed capacity of the root arena.
    pub arena_size: usize,

    /// Number of object slots in each heap page.
    pub heap_page_size: usize,

    /// Number of heap pages after which allocation fails.
    pub heap_max_pages: usize,

    /// Capacity of the operand stack.
    pub stack_size: usize,

    /// Capacity of the call-frame stack.
    pub frame_size: usize,

    /// Capacity of the rescue stack.
    pub rescue_size: usize,

    /// Initial capacity of the global table, which grows on demand.
    pub globals_size: usize,

    /// Number of dispatch loops that may be active at once.
    pub nesting_limit: usize,

    /// Instruction dispatch strategy.
    pub dispatch: Dispatch,

    /// Whether to collect garbage before every allocation.
    pub gc_stress: bool,
}

impl Default for Config
{
    fn default() -> Self
    {
        Self{
            arena_size: ARENA_SIZE,
            heap_page_size: HEAP_PAGE_SIZE,
            heap_max_pages: HEAP_MAX_PAGES,
            stack_size: STACK_SIZE,
            frame_size: FRAME_SIZE,
            rescue_size: RESCUE_SIZE,
            globals_size: GLOBALS_SIZE,
            nesting_limit: NESTING_LIMIT,
            dispatch: Dispatch::default(),
            gc_stress: cfg!(feature = "gc-stress"),
        }
    }
}
