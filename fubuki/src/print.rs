//! Printing values for diagnostics.

use {
    crate::{
        heap::{Condition, Object, Procedure},
        runtime::Runtime,
        value::Value,
    },
    std::fmt::Write,
};

/// Nesting depth beyond which contents are elided.
const MAX_DEPTH: usize = 64;

/// List length beyond which the remaining elements are elided.
const MAX_LENGTH: usize = 4096;

impl Runtime
{
    /// Print a value the way `write` would.
    ///
    /// Structures nested or linked beyond fixed limits,
    /// such as cyclic ones, are elided with `...`.
    pub fn write_string(&self, value: Value) -> String
    {
        let mut out = String::new();
        self.write_value(&mut out, value, 0);
        out
    }

    /// Describe a raised value for an error report.
    ///
    /// Conditions print as their message followed by their irritants;
    /// any other value prints as itself.
    pub fn error_message(&self, condition: Value) -> String
    {
        let object = condition.as_object().map(|object| self.heap.get(object));
        let Some(Object::Condition(c)) = object else {
            return format!("raised {}", self.write_string(condition));
        };

        let mut out = String::new();
        self.write_condition(&mut out, c, 0);
        out
    }

    /// Write the message of a condition followed by its irritants.
    fn write_condition(&self, out: &mut String, c: &Condition, depth: usize)
    {
        out.push_str(&c.message);
        let mut rest = c.irritants;
        for _ in 0 .. MAX_LENGTH {
            let Value::Object(pair) = rest else { return };
            let Object::Pair(pair) = self.heap.get(pair) else { return };
            out.push(' ');
            self.write_value(out, pair.car, depth + 1);
            rest = pair.cdr;
        }
        out.push_str(" ...");
    }

    fn write_value(&self, out: &mut String, value: Value, depth: usize)
    {
        if depth > MAX_DEPTH {
            out.push_str("...");
            return;
        }

        let object = match value {
            Value::Object(object) => self.heap.get(object),
            Value::Sym(sym) => {
                out.push_str(self.symbols.name(sym));
                return;
            },
            _ => {
                let _ = write!(out, "{value}");
                return;
            },
        };

        match object {
            Object::Pair(_) => self.write_list(out, value, depth),
            Object::String(string) => {
                out.push('"');
                for c in string.chars() {
                    match c {
                        '"'  => out.push_str("\\\""),
                        '\\' => out.push_str("\\\\"),
                        '\n' => out.push_str("\\n"),
                        c    => out.push(c),
                    }
                }
                out.push('"');
            },
            Object::Vector(elements) => {
                out.push_str("#(");
                for (i, &element) in elements.iter().enumerate() {
                    if i != 0 {
                        out.push(' ');
                    }
                    self.write_value(out, element, depth + 1);
                }
                out.push(')');
            },
            Object::Procedure(Procedure::Native{name, ..}) => {
                out.push_str("#<procedure ");
                out.push_str(self.symbols.name(*name));
                out.push('>');
            },
            Object::Procedure(Procedure::Builtin(builtin)) => {
                out.push_str("#<procedure ");
                out.push_str(builtin.name());
                out.push('>');
            },
            Object::Procedure(Procedure::Interpreted{..}) =>
                out.push_str("#<procedure>"),
            Object::Library(library) => {
                out.push_str("#<library ");
                self.write_value(out, library.name, depth + 1);
                out.push('>');
            },
            Object::Var(var) => {
                out.push_str("#<var ");
                self.write_value(out, var.value, depth + 1);
                out.push('>');
            },
            Object::Condition(c) => {
                out.push_str("#<condition ");
                self.write_condition(out, c, depth + 1);
                out.push('>');
            },
            other => {
                let _ = write!(out, "#<{}>", other.kind().name());
            },
        }
    }

    fn write_list(&self, out: &mut String, list: Value, depth: usize)
    {
        out.push('(');
        let mut rest = list;
        let mut length = 0;
        loop {
            let pair = match rest {
                Value::Object(object) => match self.heap.get(object) {
                    Object::Pair(pair) => *pair,
                    _ => break,
                },
                _ => break,
            };
            if length != 0 {
                out.push(' ');
            }
            if length == MAX_LENGTH {
                out.push_str("...)");
                return;
            }
            length += 1;
            self.write_value(out, pair.car, depth + 1);
            rest = pair.cdr;
        }
        if rest != Value::Nil {
            out.push_str(" . ");
            self.write_value(out, rest, depth + 1);
        }
        out.push(')');
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::error::Escape};

    #[test]
    fn immediates()
    {
        let mut runtime = Runtime::open();
        let sym = runtime.intern("foo");
        assert_eq!(runtime.write_string(Value::Nil), "()");
        assert_eq!(runtime.write_string(Value::Bool(false)), "#f");
        assert_eq!(runtime.write_string(Value::Int(-3)), "-3");
        assert_eq!(runtime.write_string(Value::Float(1.0)), "1.0");
        assert_eq!(runtime.write_string(Value::Char('a')), "#\\a");
        assert_eq!(runtime.write_string(Value::Sym(sym)), "foo");
    }

    #[test]
    fn lists_and_strings()
    {
        let mut runtime = Runtime::open();
        let s = runtime.string("a\"b").unwrap();
        let tail = runtime.cons(Value::Int(2), Value::Int(3)).unwrap();
        let list = runtime.cons(s, tail).unwrap();
        assert_eq!(runtime.write_string(list), "(\"a\\\"b\" 2 . 3)");

        let vector = runtime.vector(vec![Value::Nil, list]).unwrap();
        assert_eq!(runtime.write_string(vector), "#(() (\"a\\\"b\" 2 . 3))");
    }

    #[test]
    fn cycles_are_elided()
    {
        let mut runtime = Runtime::open();
        let list = runtime.cons(Value::Int(1), Value::Nil).unwrap();
        let object = list.as_object().unwrap();
        if let Object::Pair(pair) = runtime.object_mut(object) {
            pair.car = list;
        }
        assert!(runtime.write_string(list).contains("..."));
    }

    fn condition_with_irritant(runtime: &mut Runtime) -> (Value, Value)
    {
        let condition = match runtime.error("loop", &[Value::Int(1)]) {
            Escape::Raise(condition) => condition,
            other => panic!("Expected a raise, got {other:?}"),
        };
        let irritants = match runtime.object(condition.as_object().unwrap()) {
            Object::Condition(c) => c.irritants,
            _ => unreachable!(),
        };
        (condition, irritants)
    }

    #[test]
    fn self_referencing_conditions_are_elided()
    {
        let mut runtime = Runtime::open();
        let (condition, irritants) = condition_with_irritant(&mut runtime);
        if let Object::Pair(pair) = runtime.object_mut(irritants.as_object().unwrap()) {
            pair.car = condition;
        }

        let message = runtime.error_message(condition);
        assert!(message.starts_with("loop #<condition loop #<condition "), "{message}");
        assert!(message.contains("..."));
        assert!(runtime.write_string(condition).starts_with("#<condition loop "));
    }

    #[test]
    fn cyclic_irritants_are_elided()
    {
        let mut runtime = Runtime::open();
        let (condition, irritants) = condition_with_irritant(&mut runtime);
        if let Object::Pair(pair) = runtime.object_mut(irritants.as_object().unwrap()) {
            pair.cdr = irritants;
        }

        let message = runtime.error_message(condition);
        assert!(message.starts_with("loop 1 1 1"));
        assert!(message.ends_with(" ..."));
    }
}
