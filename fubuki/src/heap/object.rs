use {
    crate::{
        block::BlockId,
        bytecode::Verified,
        error::Escape,
        rescue::RescueEntry,
        runtime::Runtime,
        symbol::Sym,
        value::Value,
        vm::Frame,
    },
    bitflags::bitflags,
    smallvec::SmallVec,
    std::{collections::HashMap, fmt, rc::Rc},
};

/// Heap object.
///
/// The set of object kinds is closed;
/// the collector traces each kind by matching on it.
#[allow(missing_docs)]
#[derive(Debug)]
pub enum Object
{
    Pair(Pair),
    String(String),
    Vector(Vec<Value>),
    Procedure(Procedure),
    Env(Env),
    Port(Port),
    Library(Box<Library>),
    Var(Var),
    Continuation(Box<Continuation>),
    Condition(Condition),
}

/// Tag of an object, without its contents.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Kind
{
    Pair,
    String,
    Vector,
    Procedure,
    Env,
    Port,
    Library,
    Var,
    Continuation,
    Condition,
}

impl Object
{
    /// The tag of the object.
    pub fn kind(&self) -> Kind
    {
        match self {
            Self::Pair(_)         => Kind::Pair,
            Self::String(_)       => Kind::String,
            Self::Vector(_)       => Kind::Vector,
            Self::Procedure(_)    => Kind::Procedure,
            Self::Env(_)          => Kind::Env,
            Self::Port(_)         => Kind::Port,
            Self::Library(_)      => Kind::Library,
            Self::Var(_)          => Kind::Var,
            Self::Continuation(_) => Kind::Continuation,
            Self::Condition(_)    => Kind::Condition,
        }
    }
}

impl Kind
{
    /// Name of the kind, for diagnostics.
    pub fn name(self) -> &'static str
    {
        match self {
            Self::Pair         => "pair",
            Self::String       => "string",
            Self::Vector       => "vector",
            Self::Procedure    => "procedure",
            Self::Env          => "environment",
            Self::Port         => "port",
            Self::Library      => "library",
            Self::Var          => "var",
            Self::Continuation => "continuation",
            Self::Condition    => "condition",
        }
    }
}

/* -------------------------------------------------------------------------- */
/*                              Data structures                               */
/* -------------------------------------------------------------------------- */

/// Cons cell.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug)]
pub struct Pair
{
    pub car: Value,
    pub cdr: Value,
}

/// Frame of captured variables.
///
/// Closures refer to the environment in which they were created;
/// environments chain to the environment of the enclosing closure.
#[derive(Debug)]
pub struct Env
{
    /// Enclosing environment.
    pub parent: Option<super::ObjectRef>,

    /// Captured variables, in the order the procedure lists them.
    pub slots: Vec<Value>,
}

/// Boxed variable.
#[derive(Debug)]
pub struct Var
{
    /// Current value.
    pub value: Value,

    /// Procedure applied to values stored by [`Runtime::var_set`].
    pub conv: Option<super::ObjectRef>,
}

/// Language-level condition.
#[derive(Debug)]
pub struct Condition
{
    /// What went wrong.
    pub kind: ConditionKind,

    /// Human-readable description.
    pub message: String,

    /// List of values related to the condition.
    pub irritants: Value,
}

/// Distinguishes conditions raised by the runtime itself.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConditionKind
{
    /// Raised by `error` or by a failing primitive.
    Error,

    /// The operand stack, the frame stack or the loop chain is full.
    StackExhausted,
}

/// Namespace of exported bindings.
///
/// Library environments map names to the generated symbols
/// under which the bindings are stored in the global table.
#[derive(Debug)]
pub struct Library
{
    /// Name of the library, a list of symbols.
    pub name: Value,

    /// Names visible inside the library.
    pub env: HashMap<Sym, Sym>,

    /// Names visible to importers.
    pub exports: HashMap<Sym, Sym>,
}

/* -------------------------------------------------------------------------- */
/*                                 Procedures                                 */
/* -------------------------------------------------------------------------- */

/// Signature of procedures implemented in Rust.
///
/// The arguments stay on the operand stack for the duration of the call,
/// so they are rooted. Objects the procedure allocates are pinned
/// until the calling instruction completes.
pub type NativeFn = fn(&mut Runtime, &[Value]) -> Result<Value, Escape>;

/// Callable object.
pub enum Procedure
{
    /// Implemented in Rust.
    Native
    {
        /// Name for diagnostics.
        name: Sym,

        /// The implementation.
        func: NativeFn,
    },

    /// Compiled to bytecode.
    Interpreted
    {
        /// The code.
        irep: Rc<Verified>,

        /// Environment in effect when the closure was created.
        env: Option<super::ObjectRef>,
    },

    /// Control primitive executed by the interpreter itself.
    Builtin(Builtin),
}

impl fmt::Debug for Procedure
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            Self::Native{name, ..} =>
                f.debug_struct("Native")
                    .field("name", name)
                    .finish_non_exhaustive(),
            Self::Interpreted{irep, env} =>
                f.debug_struct("Interpreted")
                    .field("argc", &irep.argc)
                    .field("varg", &irep.varg)
                    .field("env", env)
                    .finish_non_exhaustive(),
            Self::Builtin(builtin) =>
                f.debug_tuple("Builtin").field(builtin).finish(),
        }
    }
}

/// Control primitives that manipulate frames, blocks or rescue entries.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Builtin
{
    /// `(apply proc arg ... list)`
    Apply,

    /// `(call-with-current-continuation proc)`
    CallCc,

    /// `(dynamic-wind before thunk after)`
    DynamicWind,

    /// `(rescue handler thunk)`
    Rescue,
}

impl Builtin
{
    /// Name under which the builtin is defined.
    pub fn name(self) -> &'static str
    {
        match self {
            Self::Apply       => "apply",
            Self::CallCc      => "call-with-current-continuation",
            Self::DynamicWind => "dynamic-wind",
            Self::Rescue      => "rescue",
        }
    }
}

/// Captured rest of a computation.
///
/// Holds copies of the interpreter state at capture time.
/// Every block on the path from the captured block to the root
/// is kept alive by this continuation until it is reclaimed.
pub struct Continuation
{
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) rescue: Vec<RescueEntry>,
    pub(crate) block: BlockId,
    pub(crate) loops: SmallVec<[u64; 8]>,
}

impl fmt::Debug for Continuation
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("Continuation")
            .field("stack", &self.stack.len())
            .field("frames", &self.frames.len())
            .field("rescue", &self.rescue.len())
            .field("block", &self.block)
            .field("loops", &self.loops)
            .finish()
    }
}

/* -------------------------------------------------------------------------- */
/*                                   Ports                                    */
/* -------------------------------------------------------------------------- */

bitflags!
{
    /// Direction and kind of a port.
    pub struct PortFlags: u8
    {
        /// Supports reading.
        const IN     = 1 << 0;

        /// Supports writing.
        const OUT    = 1 << 1;

        /// Carries characters.
        const TEXT   = 1 << 2;

        /// Carries bytes.
        const BINARY = 1 << 3;
    }
}

/// Whether a port can still be used.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PortStatus
{
    Open,
    Closed,
}

/// Port backed by an in-memory buffer.
#[derive(Debug)]
pub struct Port
{
    /// Direction and kind.
    pub flags: PortFlags,

    /// Open or closed.
    pub status: PortStatus,

    /// Bytes to read, or bytes written so far.
    pub buffer: Vec<u8>,

    /// Read position in the buffer.
    pub position: usize,
}
