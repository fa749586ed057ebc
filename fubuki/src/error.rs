use {crate::{heap::ObjectRef, value::Value}, thiserror::Error};

/// Broken invariant or exhausted fixed resource.
///
/// Fatal conditions cannot be caught by rescue handlers.
/// Once one reaches [`Runtime::run`][`crate::Runtime::run`],
/// the runtime is poisoned and refuses to run anything else.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum Fatal
{
    #[error("Root arena overflow (capacity {capacity})")]
    ArenaOverflow{capacity: usize},

    #[error("Root arena restored to mark {mark} above its height {height}")]
    ArenaRestore{mark: usize, height: usize},

    #[error("Heap exhausted after {pages} pages")]
    HeapExhausted{pages: usize},

    #[error("Rescue stack overflow (capacity {capacity})")]
    RescueOverflow{capacity: usize},

    #[error("Rescue entry {handle} uninstalled at rescue depth {depth}")]
    RescueOrder{handle: usize, depth: usize},
}

/// Control transfer in flight.
///
/// Raises and continuation jumps travel up the Rust call stack
/// as the error variant of a [`Result`], through every dispatch loop
/// and native procedure between the origin and the target.
/// Code that receives an escape it does not own propagates it with `?`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Escape
{
    /// A condition travelling to the nearest rescue entry.
    Raise(Value),

    /// A continuation jump travelling to the dispatch loop that owns it.
    Resume
    {
        /// The continuation being invoked.
        continuation: ObjectRef,

        /// The value passed to the continuation.
        value: Value,

        /// Index of the target loop in the chain of active loops.
        depth: usize,
    },

    /// A fatal condition travelling to the embedder.
    Fatal(Fatal),
}

impl From<Fatal> for Escape
{
    fn from(other: Fatal) -> Self
    {
        Self::Fatal(other)
    }
}

/// Error returned to the embedder by [`Runtime::run`][`crate::Runtime::run`].
#[derive(Debug, Error)]
pub enum Error
{
    /// A condition was raised and no rescue entry caught it.
    ///
    /// The condition stays pinned in the caller's arena scope.
    /// The runtime remains usable.
    #[error("Unhandled condition: {message}")]
    Unhandled
    {
        /// The condition, printed.
        message: String,

        /// The condition itself.
        condition: Value,
    },

    /// The runtime hit a fatal condition and can no longer be used.
    #[error("{0}")]
    Fatal(#[from] Fatal),
}
