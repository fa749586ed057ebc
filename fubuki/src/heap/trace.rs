use {
    super::{Continuation, Object, ObjectRef, Procedure},
    crate::{bytecode::Irep, rescue::RescueEntry, value::Value, vm::Frame},
};

/// Worklist of objects that were found reachable but not yet marked.
pub struct Tracer
{
    worklist: Vec<ObjectRef>,
}

/// Report the references held by a value to the tracer.
pub trait Trace
{
    /// Push every directly held reference onto the worklist.
    fn trace(&self, tracer: &mut Tracer);
}

impl Tracer
{
    pub fn new() -> Self
    {
        Self{worklist: Vec::new()}
    }

    pub fn object(&mut self, object: ObjectRef)
    {
        self.worklist.push(object);
    }

    pub fn value(&mut self, value: Value)
    {
        if let Value::Object(object) = value {
            self.worklist.push(object);
        }
    }

    pub fn values<'a, I>(&mut self, values: I)
        where I: IntoIterator<Item=&'a Value>
    {
        for &value in values {
            self.value(value);
        }
    }

    pub fn pop(&mut self) -> Option<ObjectRef>
    {
        self.worklist.pop()
    }
}

impl Trace for Object
{
    fn trace(&self, tracer: &mut Tracer)
    {
        match self {
            Self::Pair(pair) => {
                tracer.value(pair.car);
                tracer.value(pair.cdr);
            },
            Self::String(_) | Self::Port(_) => (),
            Self::Vector(elements) => tracer.values(elements),
            Self::Procedure(procedure) => procedure.trace(tracer),
            Self::Env(env) => {
                env.parent.into_iter().for_each(|p| tracer.object(p));
                tracer.values(&env.slots);
            },
            Self::Library(library) => tracer.value(library.name),
            Self::Var(var) => {
                tracer.value(var.value);
                var.conv.into_iter().for_each(|c| tracer.object(c));
            },
            Self::Continuation(continuation) => continuation.trace(tracer),
            Self::Condition(condition) => tracer.value(condition.irritants),
        }
    }
}

impl Trace for Procedure
{
    fn trace(&self, tracer: &mut Tracer)
    {
        match self {
            Self::Native{..} | Self::Builtin(_) => (),
            Self::Interpreted{irep, env} => {
                irep.trace(tracer);
                env.into_iter().for_each(|&e| tracer.object(e));
            },
        }
    }
}

impl Trace for Irep
{
    /// Constants of the procedure and of every nested procedure.
    fn trace(&self, tracer: &mut Tracer)
    {
        tracer.values(&self.pool);
        for child in &self.ireps {
            child.trace(tracer);
        }
    }
}

impl Trace for Frame
{
    fn trace(&self, tracer: &mut Tracer)
    {
        self.irep.trace(tracer);
        self.env.into_iter().for_each(|e| tracer.object(e));
    }
}

impl Trace for RescueEntry
{
    fn trace(&self, tracer: &mut Tracer)
    {
        tracer.value(self.handler);
    }
}

impl Trace for Continuation
{
    fn trace(&self, tracer: &mut Tracer)
    {
        tracer.values(&self.stack);
        self.frames.iter().for_each(|f| f.trace(tracer));
        self.rescue.iter().for_each(|r| r.trace(tracer));
    }
}
