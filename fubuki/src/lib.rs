//! Execution core of a Scheme-family language runtime.
//!
//! The core consists of a paged, non-relocating heap with a mark/sweep
//! collector, a bounded root arena for pinning transient references,
//! a bytecode interpreter with an operand stack and call frames,
//! a stack of dynamic extents for `dynamic-wind`,
//! and a rescue stack for non-local error recovery.
//! All of these hang off a single [`Runtime`].
//!
//! The reader, macro expander and compiler are not part of this crate.
//! They produce [`bytecode::Irep`]s, which the runtime verifies and runs.
//!
//! # Examples
//!
//! ```
//! use fubuki::{Runtime, Value, bytecode::{Builder, Op}};
//!
//! let mut runtime = Runtime::open();
//! let mut builder = Builder::new(0);
//! builder.build(Op::PushInt(20));
//! builder.build(Op::PushInt(22));
//! builder.build(Op::Add);
//! builder.build(Op::Ret);
//! let procedure = runtime.procedure(builder.link().unwrap(), None).unwrap();
//! assert_eq!(runtime.run(procedure, &[]).unwrap(), Value::Int(42));
//! ```

#![warn(missing_docs)]

pub use self::{
    arena::{Arena, Mark},
    block::BlockHandle,
    config::{Config, Dispatch},
    error::{Error, Escape, Fatal},
    heap::{HeapStats, ObjectRef},
    rescue::RescueHandle,
    runtime::Runtime,
    symbol::Sym,
    value::Value,
};

pub mod bytecode;
pub mod heap;

mod arena;
mod block;
mod config;
mod error;
mod global;
mod library;
mod print;
mod rescue;
mod runtime;
mod symbol;
mod value;
mod vm;
