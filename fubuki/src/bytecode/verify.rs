//! Verification of bytecode procedures.
//!
//! The interpreter indexes the code, the constant pool, the nested
//! procedures and the local slots without checking the bounds again,
//! and it pops operands without checking the stack depth.
//! The _bytecode verification_ algorithm checks that every such index
//! is in bounds, and that every instruction is reached with one known
//! stack depth that never drops into the local slots. A verified
//! procedure therefore never makes the interpreter panic on a malformed
//! instruction.
//!
//! Verification also resolves each instruction to its handler,
//! which the threaded dispatch strategy calls directly.

use {
    super::{Irep, Op},
    crate::vm::{Handler, resolve},
    log::trace,
    std::{fmt, ops::Deref},
    thiserror::Error,
};

/// Verified procedure.
///
/// See the [module documentation][`self`] for more information.
pub struct Verified
{
    irep: Irep,
    handlers: Box<[Handler]>,
}

/// Verification error.
#[allow(missing_docs)]
#[derive(Debug, Error, Eq, PartialEq)]
pub enum Error
{
    #[error("There are no instructions")]
    NoInstructions,

    #[error("The last instruction is not a terminator")]
    LastInstructionIsNotATerminator,

    #[error("Instruction {0} jumps to {1}, out of bounds")]
    JumpOutOfBounds(usize, u32),

    #[error("Instruction {0} references constant {1}, out of bounds")]
    ConstantOutOfBounds(usize, u32),

    #[error("Instruction {0} references procedure {1}, out of bounds")]
    ProcedureOutOfBounds(usize, u32),

    #[error("Instruction {0} references local {1}, out of bounds")]
    LocalOutOfBounds(usize, u32),

    #[error("Captured local {0} is out of bounds")]
    CapturedOutOfBounds(u32),

    #[error("Instruction {0} pops more operands than there are")]
    StackUnderflow(usize),

    #[error("Instruction {0} is reached with stack depths {1} and {2}")]
    StackMismatch(usize, u64, u64),
}

impl Verified
{
    /// Perform bytecode verification on a procedure.
    ///
    /// On success, the returned procedure can be interpreted safely.
    /// On failure, only the first encountered error is returned.
    pub fn new(irep: Irep) -> Result<Self, Error>
    {
        Self::verify_ends_with_terminator(&irep)?;
        Self::verify_operands(&irep)?;
        Self::verify_captured(&irep)?;
        Self::verify_stack_depths(&irep)?;
        let handlers = irep.code.iter().map(resolve).collect();
        let verified = Self{irep, handlers};
        trace!(target: "fubuki::bytecode", "verified procedure:\n{verified}");
        Ok(verified)
    }

    /// The handler for the instruction at the given index.
    pub(crate) fn handler(&self, pc: usize) -> Handler
    {
        self.handlers[pc]
    }

    /// Verify that there are instructions
    /// and that the last one is a terminator.
    fn verify_ends_with_terminator(irep: &Irep) -> Result<(), Error>
    {
        let last_instruction =
            irep.code.last()
            .ok_or(Error::NoInstructions)?;

        if !last_instruction.is_terminator() {
            return Err(Error::LastInstructionIsNotATerminator);
        }

        Ok(())
    }

    /// Verify that jump targets, constants,
    /// nested procedures and locals exist.
    fn verify_operands(irep: &Irep) -> Result<(), Error>
    {
        let in_bounds = |index: u32, len: usize| (index as usize) < len;

        for (i, op) in irep.code.iter().enumerate() {
            if let Some(target) = op.target() {
                if !in_bounds(target, irep.code.len()) {
                    return Err(Error::JumpOutOfBounds(i, target));
                }
            }
            match *op {
                Op::PushConst(c) if !in_bounds(c, irep.pool.len()) =>
                    return Err(Error::ConstantOutOfBounds(i, c)),
                Op::Lambda(p) if !in_bounds(p, irep.ireps.len()) =>
                    return Err(Error::ProcedureOutOfBounds(i, p)),
                Op::LRef(l) | Op::LSet(l) if l >= irep.slots() =>
                    return Err(Error::LocalOutOfBounds(i, l)),
                _ => (),
            }
        }

        Ok(())
    }

    /// Verify that captured variables are local slots.
    fn verify_captured(irep: &Irep) -> Result<(), Error>
    {
        match irep.captured.iter().find(|&&c| c >= irep.slots()) {
            Some(&c) => Err(Error::CapturedOutOfBounds(c)),
            None => Ok(()),
        }
    }

    /// Verify that no reachable instruction pops into the local slots,
    /// and that every one is reached with a single stack depth.
    ///
    /// Depths count from the frame pointer, so they start at the
    /// number of local slots.
    fn verify_stack_depths(irep: &Irep) -> Result<(), Error>
    {
        let slots = u64::from(irep.slots());
        let mut depths = vec![None; irep.code.len()];
        let mut pending = vec![(0, slots)];

        while let Some((i, depth)) = pending.pop() {
            match depths[i] {
                Some(known) if known == depth => continue,
                Some(known) => return Err(Error::StackMismatch(i, known, depth)),
                None => depths[i] = Some(depth),
            }

            let op = &irep.code[i];
            let (pops, pushes) = stack_effect(op);
            let below = depth.checked_sub(pops)
                .filter(|&below| below >= slots)
                .ok_or(Error::StackUnderflow(i))?;
            let after = below + pushes;

            if let Some(target) = op.target() {
                // The handler's result is pushed when a rescue lands.
                let landing = match op {
                    Op::PushRescue(_) => below + 1,
                    _ => after,
                };
                pending.push((target as usize, landing));
            }

            // The last instruction is a terminator, so this is in bounds.
            if !op.is_terminator() {
                pending.push((i + 1, after));
            }
        }

        Ok(())
    }
}

/// Number of operands an instruction pops and pushes.
fn stack_effect(op: &Op) -> (u64, u64)
{
    match *op {
        Op::Nop | Op::Jmp(_) | Op::PopRescue => (0, 0),

        Op::Pop | Op::JmpIf(_) | Op::PushRescue(_) | Op::Ret => (1, 0),

        Op::PushNil | Op::PushTrue | Op::PushFalse | Op::PushNone
        | Op::PushInt(_) | Op::PushFloat(_) | Op::PushChar(_)
        | Op::PushConst(_) | Op::GRef(_) | Op::LRef(_) | Op::CRef{..}
        | Op::Lambda(_) => (0, 1),

        Op::GSet(_) | Op::LSet(_) | Op::CSet{..}
        | Op::Car | Op::Cdr | Op::NilP | Op::Minus => (1, 1),

        Op::Cons | Op::Add | Op::Sub | Op::Mul | Op::Div
        | Op::Eq | Op::Lt | Op::Le => (2, 1),

        // The procedure is popped along with its arguments.
        Op::Call(argc) => (u64::from(argc) + 1, 1),
        Op::TailCall(argc) => (u64::from(argc) + 1, 0),
    }
}

impl Deref for Verified
{
    type Target = Irep;

    fn deref(&self) -> &Self::Target
    {
        &self.irep
    }
}

impl fmt::Display for Verified
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        <Irep as fmt::Display>::fmt(self, f)
    }
}
