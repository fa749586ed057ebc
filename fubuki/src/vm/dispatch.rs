//! Selection of instruction handlers.

use {
    super::ops,
    crate::{bytecode::Op, error::Escape, runtime::Runtime},
};

/// Implementation of one kind of instruction.
///
/// Handlers receive the instruction they implement,
/// with the program counter already past it.
pub(crate) type Handler = fn(&mut Runtime, Op) -> Result<(), Escape>;

/// The handler that implements the instruction.
pub(crate) fn resolve(op: &Op) -> Handler
{
    match op {
        Op::Nop           => ops::nop,
        Op::Pop           => ops::pop,
        Op::PushNil       => ops::push_nil,
        Op::PushTrue      => ops::push_true,
        Op::PushFalse     => ops::push_false,
        Op::PushNone      => ops::push_none,
        Op::PushInt(_)    => ops::push_int,
        Op::PushFloat(_)  => ops::push_float,
        Op::PushChar(_)   => ops::push_char,
        Op::PushConst(_)  => ops::push_const,
        Op::GRef(_)       => ops::gref,
        Op::GSet(_)       => ops::gset,
        Op::LRef(_)       => ops::lref,
        Op::LSet(_)       => ops::lset,
        Op::CRef{..}      => ops::cref,
        Op::CSet{..}      => ops::cset,
        Op::Jmp(_)        => ops::jmp,
        Op::JmpIf(_)      => ops::jmp_if,
        Op::Call(_)       => ops::call,
        Op::TailCall(_)   => ops::tail_call,
        Op::Ret           => ops::ret,
        Op::Lambda(_)     => ops::lambda,
        Op::Cons          => ops::cons,
        Op::Car           => ops::car,
        Op::Cdr           => ops::cdr,
        Op::NilP          => ops::nil_p,
        Op::Add           => ops::add,
        Op::Sub           => ops::sub,
        Op::Mul           => ops::mul,
        Op::Div           => ops::div,
        Op::Minus         => ops::minus,
        Op::Eq            => ops::eq,
        Op::Lt            => ops::lt,
        Op::Le            => ops::le,
        Op::PushRescue(_) => ops::push_rescue,
        Op::PopRescue     => ops::pop_rescue,
    }
}

/// Execute an instruction by matching on it.
pub(crate) fn switch(rt: &mut Runtime, op: Op) -> Result<(), Escape>
{
    match op {
        Op::Nop           => ops::nop(rt, op),
        Op::Pop           => ops::pop(rt, op),
        Op::PushNil       => ops::push_nil(rt, op),
        Op::PushTrue      => ops::push_true(rt, op),
        Op::PushFalse     => ops::push_false(rt, op),
        Op::PushNone      => ops::push_none(rt, op),
        Op::PushInt(_)    => ops::push_int(rt, op),
        Op::PushFloat(_)  => ops::push_float(rt, op),
        Op::PushChar(_)   => ops::push_char(rt, op),
        Op::PushConst(_)  => ops::push_const(rt, op),
        Op::GRef(_)       => ops::gref(rt, op),
        Op::GSet(_)       => ops::gset(rt, op),
        Op::LRef(_)       => ops::lref(rt, op),
        Op::LSet(_)       => ops::lset(rt, op),
        Op::CRef{..}      => ops::cref(rt, op),
        Op::CSet{..}      => ops::cset(rt, op),
        Op::Jmp(_)        => ops::jmp(rt, op),
        Op::JmpIf(_)      => ops::jmp_if(rt, op),
        Op::Call(_)       => ops::call(rt, op),
        Op::TailCall(_)   => ops::tail_call(rt, op),
        Op::Ret           => ops::ret(rt, op),
        Op::Lambda(_)     => ops::lambda(rt, op),
        Op::Cons          => ops::cons(rt, op),
        Op::Car           => ops::car(rt, op),
        Op::Cdr           => ops::cdr(rt, op),
        Op::NilP          => ops::nil_p(rt, op),
        Op::Add           => ops::add(rt, op),
        Op::Sub           => ops::sub(rt, op),
        Op::Mul           => ops::mul(rt, op),
        Op::Div           => ops::div(rt, op),
        Op::Minus         => ops::minus(rt, op),
        Op::Eq            => ops::eq(rt, op),
        Op::Lt            => ops::lt(rt, op),
        Op::Le            => ops::le(rt, op),
        Op::PushRescue(_) => ops::push_rescue(rt, op),
        Op::PopRescue     => ops::pop_rescue(rt, op),
    }
}

