use {
    super::{Irep, Op, Verified},
    crate::value::Value,
    std::rc::Rc,
    thiserror::Error,
};

/// Convenient utility for generating procedures.
///
/// Keeps track of instructions, constants, locals and labels,
/// with convenient methods for common patterns.
pub struct Builder
{
    irep: Irep,
    labels: Vec<Option<u32>>,
    patches: Vec<(usize, fn(u32) -> Op, Label)>,
}

/// Jump target that may be bound after it is used.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Label(u32);

/// Error returned during building.
#[allow(missing_docs)]
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BuildError
{
    #[error("Code requires too many locals")]
    TooManyLocals,

    #[error("Label {0} was used but never bound")]
    UnboundLabel(u32),

    #[error("Verification failed: {0}")]
    Verify(#[from] super::Error),
}

impl Builder
{
    /// Create a new builder for a procedure with `argc` required arguments.
    pub fn new(argc: u32) -> Self
    {
        Self{
            irep: Irep{argc, ..Irep::default()},
            labels: Vec::new(),
            patches: Vec::new(),
        }
    }

    /// Collect extra arguments into a rest list.
    ///
    /// Returns the local slot of the rest list.
    pub fn rest(&mut self) -> u32
    {
        self.irep.varg = true;
        1 + self.irep.argc
    }

    /// Allocate a local and return its slot.
    pub fn local(&mut self) -> Result<u32, BuildError>
    {
        let slot = self.irep.slots();
        self.irep.localc = self.irep.localc.checked_add(1)
            .filter(|_| slot < u32::MAX)
            .ok_or(BuildError::TooManyLocals)?;
        Ok(slot)
    }

    /// Copy a local slot into the environment on entry.
    ///
    /// Returns the index of the variable in the environment.
    pub fn capture(&mut self, slot: u32) -> u32
    {
        self.irep.captured.push(slot);
        self.irep.captured.len() as u32 - 1
    }

    /// Add a constant to the pool and return its index.
    pub fn constant(&mut self, value: Value) -> u32
    {
        self.irep.pool.push(value);
        self.irep.pool.len() as u32 - 1
    }

    /// Add a nested procedure and return its index.
    pub fn child(&mut self, irep: Verified) -> u32
    {
        self.irep.ireps.push(Rc::new(irep));
        self.irep.ireps.len() as u32 - 1
    }

    /// Create a label that is not bound yet.
    pub fn label(&mut self) -> Label
    {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    /// Bind a label to the next instruction.
    pub fn bind(&mut self, label: Label)
    {
        self.labels[label.0 as usize] = Some(self.irep.code.len() as u32);
    }

    /// Append an instruction to the procedure.
    pub fn build(&mut self, instruction: Op)
    {
        self.irep.code.push(instruction);
    }

    /// Append an instruction that refers to a label.
    ///
    /// The instruction is created once the label is bound, on linking.
    ///
    /// # Examples
    ///
    /// ```
    /// # use fubuki::bytecode::{Builder, Op};
    /// let mut builder = Builder::new(1);
    /// let done = builder.label();
    /// builder.build(Op::LRef(1));
    /// builder.build_to(Op::JmpIf, done);
    /// builder.build(Op::PushFalse);
    /// builder.build(Op::Ret);
    /// builder.bind(done);
    /// builder.build(Op::PushTrue);
    /// builder.build(Op::Ret);
    /// assert!(builder.link().is_ok());
    /// ```
    pub fn build_to(&mut self, make: fn(u32) -> Op, label: Label)
    {
        self.patches.push((self.irep.code.len(), make, label));
        self.irep.code.push(make(0));
    }

    /// Link the procedure, without verifying it.
    pub fn finish(mut self) -> Result<Irep, BuildError>
    {
        for (index, make, label) in self.patches {
            let target = self.labels[label.0 as usize]
                .ok_or(BuildError::UnboundLabel(label.0))?;
            self.irep.code[index] = make(target);
        }
        Ok(self.irep)
    }

    /// Link and verify the procedure.
    pub fn link(self) -> Result<Verified, BuildError>
    {
        Ok(Verified::new(self.finish()?)?)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn labels_are_patched()
    {
        let mut builder = Builder::new(0);
        let top = builder.label();
        let end = builder.label();
        builder.bind(top);
        builder.build(Op::PushFalse);
        builder.build_to(Op::JmpIf, end);
        builder.build_to(Op::Jmp, top);
        builder.bind(end);
        builder.build(Op::PushNone);
        builder.build(Op::Ret);

        let irep = builder.finish().unwrap();
        assert_eq!(irep.code[1], Op::JmpIf(3));
        assert_eq!(irep.code[2], Op::Jmp(0));
    }

    #[test]
    fn unbound_label()
    {
        let mut builder = Builder::new(0);
        let nowhere = builder.label();
        builder.build_to(Op::Jmp, nowhere);
        assert!(matches!(builder.finish(), Err(BuildError::UnboundLabel(0))));
    }

    #[test]
    fn locals_follow_arguments()
    {
        let mut builder = Builder::new(2);
        assert_eq!(builder.rest(), 3);
        assert_eq!(builder.local(), Ok(4));
        assert_eq!(builder.local(), Ok(5));
        assert_eq!(builder.capture(5), 0);
        builder.build(Op::LRef(5));
        builder.build(Op::Ret);
        let verified = builder.link().unwrap();
        assert_eq!(verified.slots(), 6);
        assert_eq!(verified.captured, [5]);
    }
}
