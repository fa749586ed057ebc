//! Constructors and accessors for heap objects.
//!
//! Every constructor returns its object pinned in the arena.

use {
    super::Runtime,
    crate::{
        bytecode::Verified,
        error::{Escape, Fatal},
        heap::{Condition, ConditionKind, Object, ObjectRef, Pair, Procedure},
        value::Value,
    },
    std::rc::Rc,
};

impl Runtime
{
    /// Allocate a pair.
    pub fn cons(&mut self, car: Value, cdr: Value) -> Result<Value, Fatal>
    {
        let pair = self.allocate(Object::Pair(Pair{car, cdr}))?;
        Ok(pair.into())
    }

    /// Allocate a proper list of the values.
    ///
    /// Only the finished list stays pinned, whatever its length.
    pub fn list(&mut self, values: &[Value]) -> Result<Value, Fatal>
    {
        let mark = self.arena_preserve();
        let mut list = Value::Nil;
        for &value in values.iter().rev() {
            list = self.cons(value, list)?;
            self.arena_restore(mark)?;
            self.protect(list)?;
        }
        Ok(list)
    }

    /// Allocate a vector.
    pub fn vector(&mut self, elements: Vec<Value>) -> Result<Value, Fatal>
    {
        Ok(self.allocate(Object::Vector(elements))?.into())
    }

    /// Allocate a string.
    pub fn string(&mut self, string: &str) -> Result<Value, Fatal>
    {
        Ok(self.allocate(Object::String(string.to_owned()))?.into())
    }

    /// Allocate a closure over a verified procedure.
    pub fn procedure(&mut self, irep: Verified, env: Option<ObjectRef>)
        -> Result<Value, Fatal>
    {
        let irep = Rc::new(irep);
        let procedure = Procedure::Interpreted{irep, env};
        Ok(self.allocate(Object::Procedure(procedure))?.into())
    }

    /// Allocate a condition.
    pub fn condition(
        &mut self,
        kind: ConditionKind,
        message: &str,
        irritants: &[Value],
    ) -> Result<Value, Fatal>
    {
        let irritants = self.list(irritants)?;
        let condition = Condition{kind, message: message.to_owned(), irritants};
        Ok(self.allocate(Object::Condition(condition))?.into())
    }

    /// Create an error condition and start raising it.
    ///
    /// # Examples
    ///
    /// ```
    /// # use fubuki::{Escape, Runtime, Value};
    /// fn checked_car(rt: &mut Runtime, args: &[Value]) -> Result<Value, Escape>
    /// {
    ///     match args {
    ///         [pair] => rt.car(*pair),
    ///         _ => Err(rt.error("car: wrong number of arguments", args)),
    ///     }
    /// }
    /// ```
    pub fn error(&mut self, message: &str, irritants: &[Value]) -> Escape
    {
        match self.condition(ConditionKind::Error, message, irritants) {
            Ok(condition) => self.raise(condition),
            Err(fatal) => Escape::Fatal(fatal),
        }
    }

    /// Create a stack exhaustion condition and start raising it.
    pub(crate) fn exhausted(&mut self, message: &str) -> Escape
    {
        match self.condition(ConditionKind::StackExhausted, message, &[]) {
            Ok(condition) => self.raise(condition),
            Err(fatal) => Escape::Fatal(fatal),
        }
    }

    fn pair(&mut self, value: Value) -> Result<Pair, Escape>
    {
        match value {
            Value::Object(object) => match self.heap.get(object) {
                Object::Pair(pair) => Ok(*pair),
                _ => Err(self.error("pair required", &[value])),
            },
            _ => Err(self.error("pair required", &[value])),
        }
    }

    /// The first element of a pair; raise if it is not one.
    pub fn car(&mut self, value: Value) -> Result<Value, Escape>
    {
        Ok(self.pair(value)?.car)
    }

    /// The second element of a pair; raise if it is not one.
    pub fn cdr(&mut self, value: Value) -> Result<Value, Escape>
    {
        Ok(self.pair(value)?.cdr)
    }

    /// The elements of a proper list; raise if it is not one.
    pub fn list_to_vec(&mut self, list: Value) -> Result<Vec<Value>, Escape>
    {
        let mut elements = Vec::new();
        let mut rest = list;
        while rest != Value::Nil {
            let pair = match rest {
                Value::Object(object) => match self.heap.get(object) {
                    Object::Pair(pair) => *pair,
                    _ => return Err(self.error("proper list required", &[list])),
                },
                _ => return Err(self.error("proper list required", &[list])),
            };
            elements.push(pair.car);
            rest = pair.cdr;
        }
        Ok(elements)
    }

    /// Structural equality: `equal?`.
    ///
    /// Pairs and vectors are compared element-wise and strings by contents;
    /// everything else is compared like [`Value::eq`].
    pub fn equal(&self, mut a: Value, mut b: Value) -> bool
    {
        loop {
            if a == b {
                return true;
            }
            let (Value::Object(x), Value::Object(y)) = (a, b) else {
                return false;
            };
            match (self.heap.get(x), self.heap.get(y)) {
                (Object::Pair(p), Object::Pair(q)) => {
                    if !self.equal(p.car, q.car) {
                        return false;
                    }
                    a = p.cdr;
                    b = q.cdr;
                },
                (Object::String(s), Object::String(t)) =>
                    return s == t,
                (Object::Vector(v), Object::Vector(w)) =>
                    return v.len() == w.len()
                        && v.iter().zip(w).all(|(&x, &y)| self.equal(x, y)),
                _ => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::Error};

    #[test]
    fn long_lists_use_one_pin()
    {
        let mut runtime = Runtime::open();
        let values = (0 .. 1000).map(Value::Int).collect::<Vec<_>>();
        let mark = runtime.arena_preserve();
        let list = runtime.list(&values).unwrap();
        assert_eq!(runtime.arena_height(), mark.height() + 1);
        assert_eq!(runtime.list_to_vec(list).unwrap(), values);
    }

    #[test]
    fn equal_is_structural()
    {
        let mut runtime = Runtime::open();
        let a = runtime.list(&[Value::Int(1), Value::Char('x')]).unwrap();
        let b = runtime.list(&[Value::Int(1), Value::Char('x')]).unwrap();
        let s = runtime.string("abc").unwrap();
        let t = runtime.string("abc").unwrap();
        let v = runtime.vector(vec![a, s]).unwrap();
        let w = runtime.vector(vec![b, t]).unwrap();
        assert_ne!(a, b);
        assert!(runtime.equal(a, b));
        assert!(runtime.equal(v, w));
        assert!(!runtime.equal(a, s));
        assert!(!runtime.equal(Value::Int(1), Value::Float(1.0)));
    }

    #[test]
    fn car_of_non_pair_raises()
    {
        let mut runtime = Runtime::open();
        let escape = runtime.car(Value::Int(3)).unwrap_err();
        let Escape::Raise(condition) = escape else {
            panic!("Expected a raise, got {escape:?}");
        };
        assert_eq!(runtime.error_message(condition), "pair required 3");
    }

    #[test]
    fn unhandled_errors_carry_message()
    {
        fn fail(rt: &mut Runtime, args: &[Value]) -> Result<Value, Escape>
        {
            Err(rt.error("failed with", args))
        }

        let mut runtime = Runtime::open();
        let fail = runtime.defun("fail", fail).unwrap();
        let result = runtime.run(fail, &[Value::Int(1), Value::Bool(true)]);
        match result {
            Err(Error::Unhandled{message, ..}) =>
                assert_eq!(message, "failed with 1 #t"),
            other => panic!("Expected an unhandled error, got {other:?}"),
        }
    }
}
