//! Bytecode interpreter.
//!
//! Every call of [`Runtime::apply`] runs one _dispatch loop_. A loop owns
//! the frames pushed after it started and executes instructions until
//! they have all returned. Loops nest when native procedures call back
//! into the interpreter; the serials of the active loops form the loop
//! chain, outermost first.
//!
//! Raises and continuation jumps travel as [`Escape`]s. A loop acts on an
//! escape when it owns the target: a raise aimed at a rescue entry that
//! one of its frames installed, or a jump to a continuation captured at
//! its depth of the loop chain. Any other escape makes the loop drop its
//! frames and operand stack and pass the escape on to its caller.

pub(crate) use self::dispatch::{Handler, resolve};

use {
    crate::{
        block::BlockId,
        bytecode::Verified,
        config::Dispatch,
        error::Escape,
        heap::{Env, Object, ObjectRef, Procedure},
        rescue::{RescueEntry, RescueHandle, Resume},
        runtime::Runtime,
        value::Value,
    },
    log::trace,
    smallvec::SmallVec,
    std::rc::Rc,
};

mod builtin;
mod cont;
mod dispatch;
mod ops;


/// Activation of an interpreted procedure.
#[derive(Clone)]
pub(crate) struct Frame
{
    pub irep: Rc<Verified>,

    /// Index of the next instruction.
    pub pc: usize,

    /// Operand stack index of the procedure; its arguments follow.
    pub fp: usize,

    /// Environment holding the captured variables.
    pub env: Option<ObjectRef>,

    pub epilogue: Epilogue,
}

/// What to do after a frame returns.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Epilogue
{
    None,

    /// Leave the dynamic extent entered by `dynamic-wind`.
    Leave(BlockId),

    /// Uninstall the entry installed by `rescue`.
    Uninstall(RescueHandle),
}

impl Frame
{
    /// The frame after rescue entries owned by `from` were moved to `to`.
    fn remapped(&self, from: u64, to: u64) -> Self
    {
        let epilogue = match self.epilogue {
            Epilogue::Uninstall(handle) =>
                Epilogue::Uninstall(handle.remap(from, to)),
            other => other,
        };
        Self{epilogue, ..self.clone()}
    }
}

impl Runtime
{
    /// Apply a procedure to arguments and return its result.
    ///
    /// This is how native procedures call back into the interpreter.
    /// The call runs in a dispatch loop nested in the current one;
    /// escapes that the loop does not own are returned for the caller
    /// to propagate. The result is pinned in the arena.
    pub fn apply(&mut self, procedure: Value, args: &[Value])
        -> Result<Value, Escape>
    {
        if self.loops.len() >= self.config.nesting_limit {
            return Err(self.exhausted("dispatch loops nested too deeply"));
        }

        let serial = self.serial();
        self.loops.push(serial);
        let result = self.execute(procedure, args);
        self.loops.pop();
        result
    }

    fn execute(&mut self, procedure: Value, args: &[Value])
        -> Result<Value, Escape>
    {
        let depth = self.loops.len() - 1;
        let base = self.frames.len();
        let sp = self.stack.len();
        let mark = self.arena_preserve();

        let mut result = self.push(procedure)
            .and_then(|()| args.iter().try_for_each(|&arg| self.push(arg)))
            .and_then(|()| self.call(sp));

        loop {
            while let Err(escape) = result {
                if !self.owns(escape, depth) {
                    self.frames.truncate(base);
                    self.stack.truncate(sp);
                    return Err(escape);
                }
                result = self.land(escape);
            }

            if self.frames.len() <= base {
                break;
            }

            self.arena_restore(mark)?;
            result = self.step();
        }

        let value = self.pop();
        self.arena_restore(mark)?;
        self.protect(value)?;
        Ok(value)
    }

    /// Execute the next instruction of the topmost frame.
    fn step(&mut self) -> Result<(), Escape>
    {
        let frame = self.frames.last_mut().expect("Step without a frame");
        let pc = frame.pc;
        frame.pc += 1;
        let op = frame.irep.code[pc];
        match self.config.dispatch {
            Dispatch::Switch => dispatch::switch(self, op),
            Dispatch::Threaded => {
                let handler = frame.irep.handler(pc);
                handler(self, op)
            },
        }
    }

    /// Whether the loop at the given depth of the chain acts on the escape.
    fn owns(&self, escape: Escape, depth: usize) -> bool
    {
        match escape {
            Escape::Raise(_) => self.rescue.top()
                .map_or(false, |entry| entry.owner == self.loops[depth]),
            Escape::Resume{depth: target, ..} => target == depth,
            Escape::Fatal(_) => false,
        }
    }

    /// Act on an escape owned by the current loop.
    fn land(&mut self, escape: Escape) -> Result<(), Escape>
    {
        match escape {
            Escape::Raise(condition) => {
                let label = match self.rescue.top() {
                    Some(&RescueEntry{resume: Resume::Label(label), ..}) => label,
                    _ => unreachable!("Loop owns a native rescue entry"),
                };
                let value = self.catch(condition)?;
                let frame = self.frames.last_mut()
                    .expect("Rescue entry outlived its frame");
                frame.pc = label as usize;
                if let Epilogue::Uninstall(_) = frame.epilogue {
                    frame.epilogue = Epilogue::None;
                }
                self.push(value)
            },
            Escape::Resume{continuation, value, ..} =>
                self.resume(continuation, value),
            Escape::Fatal(_) => unreachable!("Loop owns a fatal condition"),
        }
    }

    /// Serial of the innermost dispatch loop.
    pub(crate) fn current_loop(&self) -> u64
    {
        *self.loops.last().expect("Instruction outside a dispatch loop")
    }

    /* ---------------------------------------------------------------------- */
    /*                                   Calls                                */
    /* ---------------------------------------------------------------------- */

    /// Call the procedure at `fp` with the values above it as arguments.
    ///
    /// Interpreted procedures get a new frame. Everything else runs to
    /// completion and replaces the procedure and arguments by its result.
    pub(crate) fn call(&mut self, fp: usize) -> Result<(), Escape>
    {
        let procedure = self.stack[fp];
        let object = match procedure {
            Value::Object(object) => object,
            _ => return Err(self.error("invalid application", &[procedure])),
        };

        match self.heap.get(object) {
            Object::Procedure(Procedure::Native{func, ..}) => {
                let func = *func;
                let args: SmallVec<[Value; 8]> = self.stack[fp + 1 ..].into();
                let value = func(self, &args)?;
                self.stack.truncate(fp);
                self.push(value)
            },
            Object::Procedure(Procedure::Interpreted{irep, env}) => {
                let (irep, env) = (irep.clone(), *env);
                self.enter_frame(fp, irep, env, Epilogue::None)
            },
            &Object::Procedure(Procedure::Builtin(builtin)) =>
                self.builtin(builtin, fp),
            Object::Continuation(_) =>
                self.throw(object, fp),
            _ => Err(self.error("invalid application", &[procedure])),
        }
    }

    /// Check the arguments and push a frame for an interpreted procedure.
    pub(crate) fn enter_frame(
        &mut self,
        fp: usize,
        irep: Rc<Verified>,
        env: Option<ObjectRef>,
        epilogue: Epilogue,
    ) -> Result<(), Escape>
    {
        let argc = self.stack.len() - fp - 1;
        let required = irep.argc as usize;
        if argc < required || (!irep.varg && argc > required) {
            let procedure = self.stack[fp];
            let irritants = [procedure, Value::Int(argc as i64)];
            return Err(self.error("wrong number of arguments", &irritants));
        }

        if self.frames.len() >= self.config.frame_size {
            return Err(self.exhausted("call stack overflow"));
        }

        if irep.varg {
            let extra: SmallVec<[Value; 8]> =
                self.stack[fp + 1 + required ..].into();
            let rest = self.list(&extra)?;
            self.stack.truncate(fp + 1 + required);
            self.push(rest)?;
        }

        for _ in 0 .. irep.localc {
            self.push(Value::Undef)?;
        }

        let env = if irep.captured.is_empty() {
            env
        } else {
            let slots = irep.captured.iter()
                .map(|&slot| self.stack[fp + slot as usize])
                .collect();
            Some(self.allocate(Object::Env(Env{parent: env, slots}))?)
        };

        self.frames.push(Frame{irep, pc: 0, fp, env, epilogue});
        Ok(())
    }

    /// Replace the current frame by a call of the procedure below
    /// the given number of arguments.
    ///
    /// Frames with an epilogue are not replaced, so that it runs.
    fn tail_call(&mut self, argc: usize) -> Result<(), Escape>
    {
        let from = self.stack.len() - argc - 1;
        let Frame{fp, epilogue, ..} = *self.frame();
        if epilogue != Epilogue::None {
            return self.call(from);
        }

        self.stack.copy_within(from .., fp);
        self.stack.truncate(fp + argc + 1);
        self.frames.pop();
        self.call(fp)
    }

    /// Return the top of the stack from the current frame.
    fn ret(&mut self) -> Result<(), Escape>
    {
        let value = self.pop();
        let frame = self.frames.pop().expect("Return without a frame");
        self.stack.truncate(frame.fp);
        self.push(value)?;

        match frame.epilogue {
            Epilogue::None => Ok(()),
            Epilogue::Leave(block) => {
                trace!(target: "fubuki::block", "wind epilogue {block:?}");
                self.leave_block(block)
            },
            Epilogue::Uninstall(handle) => Ok(self.uninstall(handle)?),
        }
    }

    /* ---------------------------------------------------------------------- */
    /*                               Operand stack                            */
    /* ---------------------------------------------------------------------- */

    pub(crate) fn push(&mut self, value: Value) -> Result<(), Escape>
    {
        if self.stack.len() >= self.config.stack_size {
            return Err(self.exhausted("operand stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Value
    {
        self.stack.pop().expect("Operand stack underflow")
    }

    /// The current frame.
    pub(crate) fn frame(&self) -> &Frame
    {
        self.frames.last().expect("Instruction without a frame")
    }

    pub(crate) fn frame_mut(&mut self) -> &mut Frame
    {
        self.frames.last_mut().expect("Instruction without a frame")
    }
}
