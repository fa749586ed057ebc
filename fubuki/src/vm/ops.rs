//! Instruction handlers.
//!
//! Type errors raise conditions. Integer arithmetic that overflows
//! raises too, rather than wrapping or switching to flonums.

use {
    crate::{
        bytecode::Op,
        error::Escape,
        heap::{Object, ObjectRef, Procedure},
        rescue::Resume,
        runtime::Runtime,
        value::Value,
    },
};

/// Extract the operands of the instruction the handler implements.
macro_rules! operand
{
    ($op:expr, $pattern:pat => $result:expr) => {
        match $op {
            $pattern => $result,
            other => unreachable!("Handler called for {other:?}"),
        }
    };
}

type Result = std::result::Result<(), Escape>;

pub(super) fn nop(_: &mut Runtime, _: Op) -> Result
{
    Ok(())
}

pub(super) fn pop(rt: &mut Runtime, _: Op) -> Result
{
    rt.pop();
    Ok(())
}

/* -------------------------------------------------------------------------- */
/*                                  Constants                                 */
/* -------------------------------------------------------------------------- */

pub(super) fn push_nil(rt: &mut Runtime, _: Op) -> Result
{
    rt.push(Value::Nil)
}

pub(super) fn push_true(rt: &mut Runtime, _: Op) -> Result
{
    rt.push(Value::Bool(true))
}

pub(super) fn push_false(rt: &mut Runtime, _: Op) -> Result
{
    rt.push(Value::Bool(false))
}

pub(super) fn push_none(rt: &mut Runtime, _: Op) -> Result
{
    rt.push(Value::None)
}

pub(super) fn push_int(rt: &mut Runtime, op: Op) -> Result
{
    rt.push(Value::Int(operand!(op, Op::PushInt(int) => int)))
}

pub(super) fn push_float(rt: &mut Runtime, op: Op) -> Result
{
    rt.push(Value::Float(operand!(op, Op::PushFloat(float) => float)))
}

pub(super) fn push_char(rt: &mut Runtime, op: Op) -> Result
{
    rt.push(Value::Char(operand!(op, Op::PushChar(c) => c)))
}

pub(super) fn push_const(rt: &mut Runtime, op: Op) -> Result
{
    let index = operand!(op, Op::PushConst(index) => index as usize);
    let value = rt.frame().irep.pool[index];
    rt.push(value)
}

/* -------------------------------------------------------------------------- */
/*                                  Variables                                 */
/* -------------------------------------------------------------------------- */

pub(super) fn gref(rt: &mut Runtime, op: Op) -> Result
{
    let sym = operand!(op, Op::GRef(sym) => sym);
    match rt.globals.get(sym) {
        Value::Undef => Err(rt.error("unbound variable", &[Value::Sym(sym)])),
        value => rt.push(value),
    }
}

pub(super) fn gset(rt: &mut Runtime, op: Op) -> Result
{
    let sym = operand!(op, Op::GSet(sym) => sym);
    let value = rt.pop();
    rt.globals.set(sym, value);
    rt.push(Value::None)
}

pub(super) fn lref(rt: &mut Runtime, op: Op) -> Result
{
    let index = operand!(op, Op::LRef(index) => index as usize);
    let value = rt.stack[rt.frame().fp + index];
    rt.push(value)
}

pub(super) fn lset(rt: &mut Runtime, op: Op) -> Result
{
    let index = operand!(op, Op::LSet(index) => index as usize);
    let value = rt.pop();
    let fp = rt.frame().fp;
    rt.stack[fp + index] = value;
    rt.push(Value::None)
}

pub(super) fn cref(rt: &mut Runtime, op: Op) -> Result
{
    let (depth, index) = operand!(op, Op::CRef{depth, index} => (depth, index));
    let env = env(rt, depth, index)?;
    let value = match rt.heap.get(env) {
        Object::Env(env) => env.slots[index as usize],
        _ => unreachable!("Checked environment changed kind"),
    };
    rt.push(value)
}

pub(super) fn cset(rt: &mut Runtime, op: Op) -> Result
{
    let (depth, index) = operand!(op, Op::CSet{depth, index} => (depth, index));
    let env = env(rt, depth, index)?;
    let value = rt.pop();
    match rt.heap.get_mut(env) {
        Object::Env(env) => env.slots[index as usize] = value,
        _ => unreachable!("Checked environment changed kind"),
    }
    rt.push(Value::None)
}

/// The environment `depth` levels up from the current frame's,
/// which must have a slot at the index.
fn env(rt: &mut Runtime, depth: u32, index: u32)
    -> std::result::Result<ObjectRef, Escape>
{
    let parent = |rt: &Runtime, env: ObjectRef| match rt.heap.get(env) {
        Object::Env(env) => env.parent,
        _ => None,
    };

    let mut env = rt.frame().env;
    for _ in 0 .. depth {
        env = env.and_then(|env| parent(rt, env));
    }

    let valid = env.map_or(false, |env| matches!(
        rt.heap.get(env),
        Object::Env(env) if (index as usize) < env.slots.len(),
    ));
    match env {
        Some(env) if valid => Ok(env),
        _ => {
            let irritants = [Value::Int(depth.into()), Value::Int(index.into())];
            Err(rt.error("invalid captured variable access", &irritants))
        },
    }
}

/* -------------------------------------------------------------------------- */
/*                                Control flow                                */
/* -------------------------------------------------------------------------- */

pub(super) fn jmp(rt: &mut Runtime, op: Op) -> Result
{
    rt.frame_mut().pc = operand!(op, Op::Jmp(target) => target as usize);
    Ok(())
}

pub(super) fn jmp_if(rt: &mut Runtime, op: Op) -> Result
{
    let target = operand!(op, Op::JmpIf(target) => target as usize);
    if rt.pop().is_truthy() {
        rt.frame_mut().pc = target;
    }
    Ok(())
}

pub(super) fn call(rt: &mut Runtime, op: Op) -> Result
{
    let argc = operand!(op, Op::Call(argc) => argc as usize);
    let fp = rt.stack.len() - argc - 1;
    rt.call(fp)
}

pub(super) fn tail_call(rt: &mut Runtime, op: Op) -> Result
{
    rt.tail_call(operand!(op, Op::TailCall(argc) => argc as usize))
}

pub(super) fn ret(rt: &mut Runtime, _: Op) -> Result
{
    rt.ret()
}

pub(super) fn lambda(rt: &mut Runtime, op: Op) -> Result
{
    let index = operand!(op, Op::Lambda(index) => index as usize);
    let frame = rt.frame();
    let irep = frame.irep.ireps[index].clone();
    let env = frame.env;
    let procedure = rt.allocate(Object::Procedure(
        Procedure::Interpreted{irep, env}
    ))?;
    rt.push(procedure.into())
}

pub(super) fn push_rescue(rt: &mut Runtime, op: Op) -> Result
{
    let label = operand!(op, Op::PushRescue(label) => label);
    let handler = rt.pop();
    let frames = rt.frames.len();
    let owner = rt.current_loop();
    rt.install_entry(handler, frames, Resume::Label(label), owner)?;
    Ok(())
}

pub(super) fn pop_rescue(rt: &mut Runtime, _: Op) -> Result
{
    let frames = rt.frames.len();
    let owner = rt.current_loop();
    rt.rescue.pop_installed_by(frames, owner).map_err(|f| rt.fatal(f))?;
    Ok(())
}

/* -------------------------------------------------------------------------- */
/*                                    Pairs                                   */
/* -------------------------------------------------------------------------- */

pub(super) fn cons(rt: &mut Runtime, _: Op) -> Result
{
    let cdr = rt.pop();
    let car = rt.pop();
    let pair = rt.cons(car, cdr)?;
    rt.push(pair)
}

pub(super) fn car(rt: &mut Runtime, _: Op) -> Result
{
    let pair = rt.pop();
    let car = rt.car(pair)?;
    rt.push(car)
}

pub(super) fn cdr(rt: &mut Runtime, _: Op) -> Result
{
    let pair = rt.pop();
    let cdr = rt.cdr(pair)?;
    rt.push(cdr)
}

pub(super) fn nil_p(rt: &mut Runtime, _: Op) -> Result
{
    let value = rt.pop();
    rt.push(Value::Bool(value == Value::Nil))
}

/* -------------------------------------------------------------------------- */
/*                                  Arithmetic                                */
/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy)]
enum Number
{
    Int(i64),
    Float(f64),
}

impl Number
{
    fn to_f64(self) -> f64
    {
        match self {
            Self::Int(int) => int as f64,
            Self::Float(float) => float,
        }
    }
}

fn number(rt: &mut Runtime, value: Value)
    -> std::result::Result<Number, Escape>
{
    match value {
        Value::Int(int) => Ok(Number::Int(int)),
        Value::Float(float) => Ok(Number::Float(float)),
        _ => Err(rt.error("number required", &[value])),
    }
}

/// Pop the right operand, then the left one.
fn operands(rt: &mut Runtime)
    -> std::result::Result<(Number, Number), Escape>
{
    let right = rt.pop();
    let left = rt.pop();
    Ok((number(rt, left)?, number(rt, right)?))
}

fn overflow(rt: &mut Runtime, left: i64, right: i64) -> Escape
{
    rt.error("integer overflow", &[Value::Int(left), Value::Int(right)])
}

fn arithmetic(
    rt: &mut Runtime,
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Result
{
    let result = match operands(rt)? {
        (Number::Int(left), Number::Int(right)) => match int(left, right) {
            Some(result) => Value::Int(result),
            None => return Err(overflow(rt, left, right)),
        },
        (left, right) => Value::Float(float(left.to_f64(), right.to_f64())),
    };
    rt.push(result)
}

pub(super) fn add(rt: &mut Runtime, _: Op) -> Result
{
    arithmetic(rt, i64::checked_add, |a, b| a + b)
}

pub(super) fn sub(rt: &mut Runtime, _: Op) -> Result
{
    arithmetic(rt, i64::checked_sub, |a, b| a - b)
}

pub(super) fn mul(rt: &mut Runtime, _: Op) -> Result
{
    arithmetic(rt, i64::checked_mul, |a, b| a * b)
}

/// Exact quotients of fixnums stay fixnums; others become flonums.
pub(super) fn div(rt: &mut Runtime, _: Op) -> Result
{
    let result = match operands(rt)? {
        (Number::Int(left), Number::Int(0)) => {
            let irritants = [Value::Int(left), Value::Int(0)];
            return Err(rt.error("division by zero", &irritants));
        },
        (Number::Int(left), Number::Int(right)) =>
            match (left.checked_rem(right), left.checked_div(right)) {
                (Some(0), Some(quotient)) => Value::Int(quotient),
                (Some(_), _) => Value::Float(left as f64 / right as f64),
                (None, _) => return Err(overflow(rt, left, right)),
            },
        (left, right) => Value::Float(left.to_f64() / right.to_f64()),
    };
    rt.push(result)
}

pub(super) fn minus(rt: &mut Runtime, _: Op) -> Result
{
    let value = rt.pop();
    let result = match number(rt, value)? {
        Number::Int(int) => match int.checked_neg() {
            Some(negated) => Value::Int(negated),
            None => return Err(overflow(rt, 0, int)),
        },
        Number::Float(float) => Value::Float(-float),
    };
    rt.push(result)
}

fn comparison(
    rt: &mut Runtime,
    int: fn(&i64, &i64) -> bool,
    float: fn(&f64, &f64) -> bool,
) -> Result
{
    let result = match operands(rt)? {
        (Number::Int(left), Number::Int(right)) => int(&left, &right),
        (left, right) => float(&left.to_f64(), &right.to_f64()),
    };
    rt.push(Value::Bool(result))
}

pub(super) fn eq(rt: &mut Runtime, _: Op) -> Result
{
    comparison(rt, i64::eq, f64::eq)
}

pub(super) fn lt(rt: &mut Runtime, _: Op) -> Result
{
    comparison(rt, i64::lt, f64::lt)
}

pub(super) fn le(rt: &mut Runtime, _: Op) -> Result
{
    comparison(rt, i64::le, f64::le)
}
