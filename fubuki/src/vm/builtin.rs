//! Core procedures.
//!
//! The control primitives are [`Builtin`]s, which the interpreter runs
//! itself because they push frames, blocks or rescue entries. The rest
//! are ordinary native procedures.

use {
    super::{Epilogue, Frame},
    crate::{
        error::Escape,
        heap::{Builtin, Object, Procedure},
        rescue::Resume,
        runtime::Runtime,
        value::Value,
    },
    log::trace,
};

/// Index of the trampoline's return instruction.
const TRAMPOLINE_RETURN: u32 = 2;

impl Runtime
{
    /// Run a control primitive called with the values above `fp`.
    pub(super) fn builtin(&mut self, builtin: Builtin, fp: usize)
        -> Result<(), Escape>
    {
        let argc = self.stack.len() - fp - 1;
        let expected = match builtin {
            Builtin::Apply => 2 ..= usize::MAX,
            Builtin::CallCc => 1 ..= 1,
            Builtin::DynamicWind => 3 ..= 3,
            Builtin::Rescue => 2 ..= 2,
        };
        if !expected.contains(&argc) {
            let name = self.intern(builtin.name());
            let irritants = [Value::Sym(name), Value::Int(argc as i64)];
            return Err(self.error("wrong number of arguments", &irritants));
        }

        match builtin {
            Builtin::Apply => self.builtin_apply(fp),
            Builtin::CallCc => self.builtin_call_cc(fp),
            Builtin::DynamicWind => self.builtin_dynamic_wind(fp),
            Builtin::Rescue => self.builtin_rescue(fp),
        }
    }

    /// `(apply proc arg ... list)`
    fn builtin_apply(&mut self, fp: usize) -> Result<(), Escape>
    {
        let list = *self.stack.last().expect("Apply without arguments");
        let spread = self.list_to_vec(list)?;
        self.pop();
        self.stack.remove(fp);
        for value in spread {
            self.push(value)?;
        }
        self.call(fp)
    }

    /// `(call-with-current-continuation proc)`
    fn builtin_call_cc(&mut self, fp: usize) -> Result<(), Escape>
    {
        let continuation = self.capture(fp)?;
        self.stack[fp] = self.stack[fp + 1];
        self.stack[fp + 1] = continuation;
        self.call(fp)
    }

    /// `(dynamic-wind before thunk after)`
    ///
    /// The thunk runs in a trampoline frame whose epilogue leaves the
    /// extent, so that the extent can be re-entered by continuations.
    fn builtin_dynamic_wind(&mut self, fp: usize) -> Result<(), Escape>
    {
        self.reserve_frame()?;
        let (before, after) = (self.stack[fp + 1], self.stack[fp + 3]);
        self.apply(before, &[])?;
        self.blocks.push(before, after);
        let block = self.blocks.current();
        trace!(target: "fubuki::block", "wind {block:?}");
        self.push_trampoline(fp, Epilogue::Leave(block));
        Ok(())
    }

    /// `(rescue handler thunk)`
    ///
    /// The thunk runs in a trampoline frame under a rescue entry.
    /// The handler's result is returned by the trampoline.
    fn builtin_rescue(&mut self, fp: usize) -> Result<(), Escape>
    {
        self.reserve_frame()?;
        let handler = self.stack[fp + 1];
        let owner = self.current_loop();
        let frames = self.frames.len() + 1;
        let resume = Resume::Label(TRAMPOLINE_RETURN);
        let handle = self.install_entry(handler, frames, resume, owner)?;
        self.push_trampoline(fp, Epilogue::Uninstall(handle));
        Ok(())
    }

    fn reserve_frame(&mut self) -> Result<(), Escape>
    {
        if self.frames.len() >= self.config.frame_size {
            return Err(self.exhausted("call stack overflow"));
        }
        Ok(())
    }

    fn push_trampoline(&mut self, fp: usize, epilogue: Epilogue)
    {
        let irep = self.trampoline.clone();
        self.frames.push(Frame{irep, pc: 0, fp, env: None, epilogue});
    }

    /// Define the core procedures in `(fubuki base)`
    /// and make `(user)`, which imports them, the current library.
    pub(crate) fn define_core(&mut self) -> Result<(), Escape>
    {
        let base = self.library_name(&["fubuki", "base"])?;
        self.make_library(base)?;
        self.in_library(base)?;

        self.defun("procedure?", procedure_p)?;
        self.defun("raise", raise)?;
        self.defun("error", error)?;
        self.defun("equal?", equal_p)?;

        let builtins = [
            Builtin::Apply,
            Builtin::CallCc,
            Builtin::DynamicWind,
            Builtin::Rescue,
        ];
        for builtin in builtins {
            let object = Object::Procedure(Procedure::Builtin(builtin));
            let procedure = self.allocate(object)?;
            self.define(builtin.name(), procedure.into())?;
            if builtin == Builtin::CallCc {
                self.define("call/cc", procedure.into())?;
            }
        }

        let user = self.library_name(&["user"])?;
        self.make_library(user)?;
        self.in_library(user)?;
        self.import(base)
    }

    fn library_name(&mut self, parts: &[&str]) -> Result<Value, Escape>
    {
        let parts = parts.iter()
            .map(|part| Value::Sym(self.intern(part)))
            .collect::<Vec<_>>();
        Ok(self.list(&parts)?)
    }
}

/* -------------------------------------------------------------------------- */
/*                              Native procedures                             */
/* -------------------------------------------------------------------------- */

fn arity(rt: &mut Runtime, name: &str, args: &[Value], expected: usize)
    -> Result<(), Escape>
{
    if args.len() == expected {
        return Ok(());
    }
    let name = rt.intern(name);
    let irritants = [Value::Sym(name), Value::Int(args.len() as i64)];
    Err(rt.error("wrong number of arguments", &irritants))
}

/// `(procedure? obj)`
fn procedure_p(rt: &mut Runtime, args: &[Value]) -> Result<Value, Escape>
{
    arity(rt, "procedure?", args, 1)?;
    let is_procedure = args[0].as_object().map_or(false, |object| matches!(
        rt.object(object),
        Object::Procedure(_) | Object::Continuation(_),
    ));
    Ok(Value::Bool(is_procedure))
}

/// `(raise obj)`
fn raise(rt: &mut Runtime, args: &[Value]) -> Result<Value, Escape>
{
    arity(rt, "raise", args, 1)?;
    Err(rt.raise(args[0]))
}

/// `(error message irritant ...)`
fn error(rt: &mut Runtime, args: &[Value]) -> Result<Value, Escape>
{
    let Some((&message, irritants)) = args.split_first() else {
        return Err(rt.error("error: message required", &[]));
    };
    let message = match message.as_object().map(|object| rt.object(object)) {
        Some(Object::String(message)) => message.clone(),
        _ => return Err(rt.error("string required", &[message])),
    };
    Err(rt.error(&message, irritants))
}

/// `(equal? a b)`
fn equal_p(rt: &mut Runtime, args: &[Value]) -> Result<Value, Escape>
{
    arity(rt, "equal?", args, 2)?;
    Ok(Value::Bool(rt.equal(args[0], args[1])))
}
