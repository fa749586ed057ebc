//! Runtime instances.

use {
    crate::{
        arena::{Arena, Mark},
        block::{BlockId, BlockTable},
        bytecode::{Builder, Op, Verified},
        config::Config,
        error::{Error, Escape, Fatal},
        global::GlobalTable,
        heap::{Heap, ObjectRef},
        rescue::RescueStack,
        symbol::{Sym, SymbolTable},
        value::Value,
        vm::Frame,
    },
    log::{debug, error, warn},
    smallvec::SmallVec,
    std::rc::Rc,
};

mod alloc;
mod gc;
mod port;

/// State of one instance of the language.
///
/// A runtime is used from one thread at a time.
/// Native procedures receive it mutably and may call back into it.
pub struct Runtime
{
    pub(crate) config: Config,
    pub(crate) heap: Heap,
    pub(crate) arena: Arena,
    pub(crate) symbols: SymbolTable,
    pub(crate) globals: GlobalTable,
    pub(crate) libraries: Vec<ObjectRef>,
    pub(crate) library: Option<ObjectRef>,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) blocks: BlockTable,
    pub(crate) rescue: RescueStack,

    /// Serials of the active dispatch loops, outermost first.
    pub(crate) loops: SmallVec<[u64; 8]>,

    /// Calls the thunk in local slot 2 and returns its result.
    ///
    /// `dynamic-wind` and `rescue` push frames for this procedure,
    /// with epilogues that leave the extent or uninstall the handler.
    pub(crate) trampoline: Rc<Verified>,

    next_serial: u64,
    poisoned: Option<Fatal>,
}

impl Runtime
{
    /// Open a runtime with the default configuration.
    ///
    /// # Panics
    ///
    /// If the default limits do not suffice to define the core procedures,
    /// which cannot happen unless memory is exhausted.
    pub fn open() -> Self
    {
        Self::new(Config::default())
            .expect("Default limits suffice to open a runtime")
    }

    /// Open a runtime with the given configuration.
    ///
    /// The core procedures are defined in the `(fubuki base)` library,
    /// which the `(user)` library imports. `(user)` is the current library.
    pub fn new(config: Config) -> Result<Self, Error>
    {
        let mut trampoline = Builder::new(3);
        trampoline.build(Op::LRef(2));
        trampoline.build(Op::Call(0));
        trampoline.build(Op::Ret);
        let trampoline = trampoline.link()
            .expect("Trampoline procedure is valid");

        let mut runtime = Self{
            heap: Heap::new(config.heap_page_size, config.heap_max_pages),
            arena: Arena::new(config.arena_size),
            symbols: SymbolTable::new(),
            globals: GlobalTable::new(config.globals_size),
            libraries: Vec::new(),
            library: None,
            stack: Vec::with_capacity(config.stack_size),
            frames: Vec::with_capacity(config.frame_size),
            blocks: BlockTable::new(),
            rescue: RescueStack::new(config.rescue_size),
            loops: SmallVec::new(),
            trampoline: Rc::new(trampoline),
            next_serial: 0,
            poisoned: None,
            config,
        };

        let mark = runtime.arena_preserve();
        runtime.define_core()
            .map_err(|escape| runtime.report(escape, BlockTable::ROOT))?;
        runtime.arena_restore(mark)?;

        debug!(target: "fubuki", "opened runtime with {:?}", runtime.config);
        Ok(runtime)
    }

    /// Leave every active dynamic extent and close the runtime.
    ///
    /// Exit thunks of the extents still active run, innermost first.
    pub fn close(mut self) -> Result<(), Error>
    {
        if let Some(fatal) = self.poisoned {
            return Err(Error::Fatal(fatal));
        }
        self.rewind(BlockTable::ROOT)
            .map_err(|escape| self.report(escape, BlockTable::ROOT))?;
        debug!(target: "fubuki", "closed runtime");
        Ok(())
    }

    /// The configuration the runtime was opened with.
    pub fn config(&self) -> &Config
    {
        &self.config
    }

    /// The fatal condition that poisoned the runtime, if any.
    pub fn poisoned(&self) -> Option<Fatal>
    {
        self.poisoned
    }

    /// Number of values on the operand stack.
    pub fn stack_depth(&self) -> usize
    {
        self.stack.len()
    }

    /// Number of call frames.
    pub fn frame_depth(&self) -> usize
    {
        self.frames.len()
    }

    /// Number of installed rescue entries.
    pub fn rescue_depth(&self) -> usize
    {
        self.rescue.len()
    }

    /// Number of live dynamic extents, including the outermost one.
    pub fn block_count(&self) -> usize
    {
        self.blocks.len()
    }

    /// A number never returned before by this runtime.
    pub(crate) fn serial(&mut self) -> u64
    {
        self.next_serial += 1;
        self.next_serial
    }

    /// Poison the runtime.
    pub(crate) fn fatal(&mut self, fatal: Fatal) -> Fatal
    {
        if self.poisoned.is_none() {
            error!(target: "fubuki", "runtime poisoned: {fatal}");
            self.poisoned = Some(fatal);
        }
        fatal
    }

    /* ---------------------------------------------------------------------- */
    /*                             Running procedures                         */
    /* ---------------------------------------------------------------------- */

    /// Apply a procedure to arguments on behalf of the embedder.
    ///
    /// This is where raises and jumps that nothing caught end up.
    /// An unhandled condition aborts the call, unwinds everything the call
    /// did and is reported as [`Error::Unhandled`]; the runtime stays usable.
    /// A fatal condition poisons the runtime.
    ///
    /// The result and the unhandled condition are pinned in the arena,
    /// so the caller should wrap calls in an arena scope.
    pub fn run(&mut self, procedure: Value, args: &[Value]) -> Result<Value, Error>
    {
        if let Some(fatal) = self.poisoned {
            return Err(Error::Fatal(fatal));
        }

        let sp = self.stack.len();
        let frames = self.frames.len();
        let rescue = self.rescue.len();
        let block = self.blocks.current();

        let result = self.apply(procedure, args).and_then(|value| {
            self.protect(value)?;
            Ok(value)
        });

        result.map_err(|escape| {
            self.stack.truncate(sp);
            self.frames.truncate(frames);
            self.rescue.truncate(rescue);
            self.report(escape, block)
        })
    }

    /// Turn an escape that reached the embedder into an error.
    fn report(&mut self, escape: Escape, block: BlockId) -> Error
    {
        let condition = match escape {
            Escape::Fatal(fatal) => return Error::Fatal(self.fatal(fatal)),
            Escape::Raise(condition) => condition,
            Escape::Resume{..} => Value::None,
        };

        if let Err(fatal) = self.protect(condition) {
            return Error::Fatal(fatal);
        }

        match self.rewind(block) {
            Ok(()) => (),
            Err(Escape::Fatal(fatal)) => return Error::Fatal(self.fatal(fatal)),
            Err(other) => warn!(
                target: "fubuki",
                "escape while unwinding after unhandled condition: {other:?}",
            ),
        }

        let message = match escape {
            Escape::Resume{..} => "continuation invoked outside its extent".into(),
            _ => self.error_message(condition),
        };
        warn!(target: "fubuki", "unhandled condition: {message}");
        Error::Unhandled{message, condition}
    }

    /* ---------------------------------------------------------------------- */
    /*                                Root arena                              */
    /* ---------------------------------------------------------------------- */

    /// Pin a value in the arena; immediates need no pinning.
    pub fn protect(&mut self, value: Value) -> Result<(), Fatal>
    {
        if let Value::Object(object) = value {
            self.arena.push(object).map_err(|f| self.fatal(f))?;
        }
        Ok(())
    }

    /// Open an arena scope.
    pub fn arena_preserve(&self) -> Mark
    {
        self.arena.mark()
    }

    /// Close an arena scope, unpinning everything pinned since.
    pub fn arena_restore(&mut self, mark: Mark) -> Result<(), Fatal>
    {
        self.arena.restore(mark).map_err(|f| self.fatal(f))
    }

    /// Call `f` in an arena scope.
    ///
    /// Everything pinned by `f` is unpinned when it returns,
    /// so the result should be stored somewhere permanent
    /// or be pinned again by the caller.
    pub fn with_arena_scope<F, R, E>(&mut self, f: F) -> Result<R, E>
        where F: FnOnce(&mut Self) -> Result<R, E>
            , E: From<Fatal>
    {
        let mark = self.arena_preserve();
        let result = f(self);
        self.arena_restore(mark)?;
        result
    }

    /// Number of pinned references.
    pub fn arena_height(&self) -> usize
    {
        self.arena.height()
    }

    /* ---------------------------------------------------------------------- */
    /*                                  Symbols                               */
    /* ---------------------------------------------------------------------- */

    /// The symbol with the given name.
    pub fn intern(&mut self, name: &str) -> Sym
    {
        self.symbols.intern(name)
    }

    /// A new symbol distinct from every other, named after `base`.
    pub fn gensym(&mut self, base: Sym) -> Sym
    {
        self.symbols.gensym(base)
    }

    /// Whether the symbol was interned rather than generated.
    pub fn is_interned(&self, sym: Sym) -> bool
    {
        self.symbols.is_interned(sym)
    }

    /// The name of a symbol.
    pub fn symbol_name(&self, sym: Sym) -> &str
    {
        self.symbols.name(sym)
    }
}
