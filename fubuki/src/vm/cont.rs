//! First-class continuations.
//!
//! A continuation is a copy of the interpreter state: the operand stack
//! below the call of `call/cc`, the frames, the rescue entries, the
//! active block and the loop chain. Invoking it travels as an escape to
//! the dispatch loop at the same depth of the chain, which rewinds to the
//! captured block and installs the copies.
//!
//! Dispatch loops nested in native procedures cannot be re-entered once
//! they have returned. A continuation may therefore only be invoked while
//! every nested loop it was captured in is still active. Only the
//! outermost loop may differ, which lets a continuation captured by one
//! call of [`Runtime::run`] be resumed by a later one.

use {
    crate::{
        error::Escape,
        heap::{Continuation, Object, ObjectRef},
        runtime::Runtime,
        value::Value,
    },
    log::trace,
};

impl Runtime
{
    /// Capture the continuation of the call at `fp`.
    pub(crate) fn capture(&mut self, fp: usize) -> Result<Value, Escape>
    {
        let continuation = Continuation{
            stack: self.stack[.. fp].to_vec(),
            frames: self.frames.clone(),
            rescue: self.rescue.entries().to_vec(),
            block: self.blocks.current(),
            loops: self.loops.clone(),
        };
        let block = continuation.block;
        let object = self.allocate(Object::Continuation(Box::new(continuation)))?;
        self.blocks.retain(block);
        trace!(
            target: "fubuki::block",
            "captured {object:?} in {block:?} at {} frames",
            self.frames.len(),
        );
        Ok(object.into())
    }

    /// Invoke a continuation with the values above `fp`.
    ///
    /// The jump itself is performed by the loop that owns it.
    pub(crate) fn throw(&mut self, continuation: ObjectRef, fp: usize)
        -> Result<(), Escape>
    {
        let value = match self.stack.len() - fp - 1 {
            0 => Value::None,
            1 => self.stack[fp + 1],
            argc => {
                let irritants = [Value::Int(argc as i64)];
                let message = "continuation takes at most one value";
                return Err(self.error(message, &irritants));
            },
        };

        let loops = match self.heap.get(continuation) {
            Object::Continuation(c) => &c.loops,
            _ => unreachable!("Throw to a non-continuation"),
        };
        let depth = loops.len();
        let reachable = depth <= self.loops.len()
            && loops[1 ..] == self.loops[1 .. depth];
        if !reachable {
            return Err(self.error("continuation barrier crossed", &[]));
        }

        self.protect(continuation.into())?;
        self.protect(value)?;
        Err(Escape::Resume{continuation, value, depth: depth - 1})
    }

    /// Rewind to the extent of the continuation, install its state
    /// and deliver the value.
    pub(crate) fn resume(&mut self, continuation: ObjectRef, value: Value)
        -> Result<(), Escape>
    {
        self.protect(continuation.into())?;
        self.protect(value)?;

        let block = match self.heap.get(continuation) {
            Object::Continuation(c) => c.block,
            _ => unreachable!("Resume of a non-continuation"),
        };
        self.rewind(block)?;

        let Object::Continuation(c) = self.heap.get(continuation) else {
            unreachable!("Resume of a non-continuation");
        };
        let (from, to) = (c.loops[0], self.loops[0]);
        self.stack.clear();
        self.stack.extend_from_slice(&c.stack);
        self.frames.clear();
        self.frames.extend(c.frames.iter().map(|f| f.remapped(from, to)));
        self.rescue.restore(&c.rescue, from, to);
        trace!(
            target: "fubuki::block",
            "resumed {continuation:?} at {} frames",
            self.frames.len(),
        );

        self.push(value)
    }
}
