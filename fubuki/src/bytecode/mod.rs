//! Bytecode instructions and procedures.
//!
//! The interpreter is a stack machine. A call pushes the procedure and
//! its arguments onto the operand stack, after which the callee's frame
//! pointer addresses the procedure. Local slot zero is the procedure,
//! slots one through `argc` are the arguments, the next slot holds the
//! rest list if the procedure takes one, and the remaining slots are
//! the locals. Temporaries live above the locals.
//!
//! Variables captured by nested procedures are copied into a fresh
//! environment when a frame is entered. Such variables must be accessed
//! through [`Op::CRef`] and [`Op::CSet`] rather than through the
//! local slots, which keep a stale copy.

pub use self::{builder::*, verify::*};

use {crate::{symbol::Sym, value::Value}, std::rc::Rc};

mod builder;
mod display;
mod verify;

/// Bytecode procedure.
///
/// Before it can be run, a procedure must be verified by [`Verified::new`].
#[derive(Default)]
pub struct Irep
{
    /// Number of required arguments.
    pub argc: u32,

    /// Number of locals beyond the arguments.
    pub localc: u32,

    /// Whether extra arguments are collected into a rest list.
    pub varg: bool,

    /// Local slots copied into the environment on entry.
    pub captured: Vec<u32>,

    /// The instructions.
    pub code: Vec<Op>,

    /// Constants referenced by [`Op::PushConst`].
    pub pool: Vec<Value>,

    /// Nested procedures referenced by [`Op::Lambda`].
    pub ireps: Vec<Rc<Verified>>,
}

impl Irep
{
    /// Number of local slots, including the procedure itself.
    pub fn slots(&self) -> u32
    {
        1 + self.argc + self.varg as u32 + self.localc
    }
}

/// Bytecode instruction.
///
/// Jump targets are instruction indices within the same procedure.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Op
{
    /// Do nothing.
    Nop,

    /// Discard the top of the stack.
    Pop,

    PushNil,
    PushTrue,
    PushFalse,
    PushNone,
    PushInt(i64),
    PushFloat(f64),
    PushChar(char),

    /// Push a constant from the pool.
    PushConst(u32),

    /// Push the value of a global; raise if it is unbound.
    GRef(Sym),

    /// Pop a value into a global and push the unspecified value.
    GSet(Sym),

    /// Push a local slot.
    LRef(u32),

    /// Pop a value into a local slot and push the unspecified value.
    LSet(u32),

    /// Push a captured variable, `depth` environments up.
    CRef{depth: u32, index: u32},

    /// Pop a value into a captured variable and push the unspecified value.
    CSet{depth: u32, index: u32},

    /// Jump unconditionally.
    Jmp(u32),

    /// Pop a value and jump if it is not `#f`.
    JmpIf(u32),

    /// Call the procedure below the given number of arguments.
    Call(u32),

    /// Like [`Op::Call`], but replace the current frame.
    TailCall(u32),

    /// Return the top of the stack to the caller.
    Ret,

    /// Push a closure over the nested procedure with the given index.
    Lambda(u32),

    Cons,
    Car,
    Cdr,

    /// Push whether the popped value is the empty list.
    NilP,

    Add,
    Sub,
    Mul,
    Div,

    /// Negate the top of the stack.
    Minus,

    /// Numeric `=`.
    Eq,

    /// Numeric `<`.
    Lt,

    /// Numeric `<=`.
    Le,

    /// Pop a handler and install it until the matching [`Op::PopRescue`].
    ///
    /// If a condition is raised in between, the stacks are unwound,
    /// the handler's result is pushed and execution continues at the target.
    PushRescue(u32),

    /// Uninstall the handler installed by the matching [`Op::PushRescue`].
    PopRescue,
}

impl Op
{
    /// Whether control never falls through to the next instruction.
    pub fn is_terminator(&self) -> bool
    {
        matches!(self, Self::Jmp(_) | Self::TailCall(_) | Self::Ret)
    }

    /// The instruction index this instruction may transfer control to.
    pub fn target(&self) -> Option<u32>
    {
        match self {
            Self::Jmp(target)
            | Self::JmpIf(target)
            | Self::PushRescue(target) => Some(*target),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn instruction_size()
    {
        use std::mem::size_of;
        assert!(
            size_of::<Op>() <= 16,
            "Try not to make instructions too big, \
             as it affects the performance of the interpreter",
        );
    }

    #[test]
    fn slots()
    {
        let irep = Irep{argc: 2, varg: true, localc: 3, ..Irep::default()};
        assert_eq!(irep.slots(), 7);
    }
}
