use {crate::{heap::ObjectRef, symbol::Sym}, std::fmt};

/// Runtime value.
///
/// Immediates are stored inline and compared by value.
/// References to heap objects are compared by identity,
/// which makes the derived [`PartialEq`] the `eq?` of the language.
/// Structural equality is [`Runtime::equal`][`crate::Runtime::equal`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Value
{
    /// The empty list.
    Nil,

    /// A boolean.
    Bool(bool),

    /// A fixnum.
    Int(i64),

    /// A flonum.
    Float(f64),

    /// A character.
    Char(char),

    /// A symbol, interned or generated.
    Sym(Sym),

    /// The end-of-file object.
    Eof,

    /// The unspecified value.
    None,

    /// Sentinel for unbound globals and unassigned locals.
    Undef,

    /// Reference to a heap object.
    Object(ObjectRef),
}

impl Value
{
    /// Whether the value counts as true in a conditional.
    ///
    /// Only `#f` is false.
    pub fn is_truthy(self) -> bool
    {
        self != Self::Bool(false)
    }

    /// The referenced heap object, if any.
    pub fn as_object(self) -> Option<ObjectRef>
    {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The fixnum, if this is one.
    pub fn as_int(self) -> Option<i64>
    {
        match self {
            Self::Int(int) => Some(int),
            _ => None,
        }
    }

    /// Name of the type of an immediate, for diagnostics.
    ///
    /// Heap objects report `"object"`;
    /// the runtime knows their precise kind.
    pub fn type_name(self) -> &'static str
    {
        match self {
            Self::Nil       => "null",
            Self::Bool(_)   => "boolean",
            Self::Int(_)    => "integer",
            Self::Float(_)  => "float",
            Self::Char(_)   => "char",
            Self::Sym(_)    => "symbol",
            Self::Eof       => "eof-object",
            Self::None      => "unspecified",
            Self::Undef     => "undefined",
            Self::Object(_) => "object",
        }
    }
}

impl Default for Value
{
    fn default() -> Self
    {
        Self::None
    }
}

impl From<bool> for Value
{
    fn from(other: bool) -> Self
    {
        Self::Bool(other)
    }
}

impl From<i64> for Value
{
    fn from(other: i64) -> Self
    {
        Self::Int(other)
    }
}

impl From<ObjectRef> for Value
{
    fn from(other: ObjectRef) -> Self
    {
        Self::Object(other)
    }
}

impl fmt::Display for Value
{
    /// Immediates only; use [`Runtime::write_string`] for heap objects.
    ///
    /// [`Runtime::write_string`]: crate::Runtime::write_string
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            Self::Nil         => write!(f, "()"),
            Self::Bool(true)  => write!(f, "#t"),
            Self::Bool(false) => write!(f, "#f"),
            Self::Int(int)    => write!(f, "{int}"),
            Self::Float(flo)  => write!(f, "{flo:?}"),
            Self::Char(c)     => write!(f, "#\\{c}"),
            Self::Sym(sym)    => write!(f, "{sym:?}"),
            Self::Eof         => write!(f, "#<eof-object>"),
            Self::None        => write!(f, "#<unspecified>"),
            Self::Undef       => write!(f, "#<undefined>"),
            Self::Object(obj) => write!(f, "{obj:?}"),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn value_size()
    {
        use std::mem::size_of;
        assert!(
            size_of::<Value>() <= 16,
            "Values are copied around a lot; keep them small",
        );
    }

    #[test]
    fn truthiness()
    {
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Nil.is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::None.is_truthy());
    }
}
