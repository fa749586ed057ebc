//! Global definitions and libraries.
//!
//! Every definition is stored in the global table under a generated
//! symbol. Libraries map the names visible in them to these generated
//! symbols, so that importing a binding makes the importer see the
//! same global as the exporter. Compiled code refers to globals by their
//! generated symbols; [`Runtime::resolve`] looks them up.

use {
    crate::{
        error::Escape,
        heap::{Library, NativeFn, Object, ObjectRef, Procedure, Var},
        runtime::Runtime,
        symbol::Sym,
        value::Value,
    },
    log::{debug, trace},
    std::collections::HashMap,
};

impl Runtime
{
    /// Define a global in the current library and export it.
    ///
    /// Returns the symbol under which the global is stored.
    pub fn define(&mut self, name: &str, value: Value) -> Result<Sym, Escape>
    {
        let name = self.intern(name);
        let library = self.current_library()?;
        let uid = match self.library_ref(library).env.get(&name).copied() {
            Some(uid) => uid,
            None => {
                let uid = self.gensym(name);
                self.library_mut(library).env.insert(name, uid);
                uid
            },
        };
        self.globals.set(uid, value);
        self.export(name)?;
        Ok(uid)
    }

    /// The symbol under which a name visible in the current library
    /// is stored, if it is defined or imported.
    pub fn resolve(&mut self, name: &str) -> Option<Sym>
    {
        let name = self.intern(name);
        let library = self.library?;
        self.library_ref(library).env.get(&name).copied()
    }

    /// The value of a global visible in the current library.
    pub fn global_ref(&mut self, name: &str) -> Result<Value, Escape>
    {
        let uid = self.resolve_or_raise(name)?;
        match self.globals.get(uid) {
            Value::Undef => Err(self.error("unbound variable", &[Value::Sym(uid)])),
            value => Ok(value),
        }
    }

    /// Change the value of a global visible in the current library.
    pub fn global_set(&mut self, name: &str, value: Value) -> Result<(), Escape>
    {
        let uid = self.resolve_or_raise(name)?;
        self.globals.set(uid, value);
        Ok(())
    }

    fn resolve_or_raise(&mut self, name: &str) -> Result<Sym, Escape>
    {
        match self.resolve(name) {
            Some(uid) => Ok(uid),
            None => {
                let sym = self.intern(name);
                Err(self.error("symbol not defined", &[Value::Sym(sym)]))
            },
        }
    }

    /// Define a native procedure.
    pub fn defun(&mut self, name: &str, func: NativeFn) -> Result<Value, Escape>
    {
        let sym = self.intern(name);
        let procedure = self.allocate(Object::Procedure(
            Procedure::Native{name: sym, func}
        ))?;
        self.define(name, procedure.into())?;
        Ok(procedure.into())
    }

    /// Define a boxed variable holding the value.
    pub fn defvar(&mut self, name: &str, value: Value) -> Result<Value, Escape>
    {
        let var = self.make_var(value, None)?;
        self.define(name, var)?;
        Ok(var)
    }

    /* ---------------------------------------------------------------------- */
    /*                              Boxed variables                           */
    /* ---------------------------------------------------------------------- */

    /// Create a boxed variable.
    ///
    /// If a converter is given, [`var_set`][`Self::var_set`] stores
    /// its result instead of the value it is given. The initial value
    /// is stored as is.
    pub fn make_var(&mut self, value: Value, conv: Option<Value>)
        -> Result<Value, Escape>
    {
        let conv = match conv {
            None => None,
            Some(conv) => match conv.as_object() {
                Some(object) if matches!(self.heap.get(object), Object::Procedure(_)) =>
                    Some(object),
                _ => return Err(self.error("procedure required", &[conv])),
            },
        };
        Ok(self.allocate(Object::Var(Var{value, conv}))?.into())
    }

    /// The value of a boxed variable.
    pub fn var_ref(&mut self, var: Value) -> Result<Value, Escape>
    {
        let object = self.var_object(var)?;
        match self.heap.get(object) {
            Object::Var(var) => Ok(var.value),
            _ => unreachable!("Checked variable changed kind"),
        }
    }

    /// Store the result of the variable's converter applied to the value,
    /// or the value itself if the variable has no converter.
    pub fn var_set(&mut self, var: Value, value: Value) -> Result<(), Escape>
    {
        let object = self.var_object(var)?;
        let conv = match self.heap.get(object) {
            Object::Var(var) => var.conv,
            _ => unreachable!("Checked variable changed kind"),
        };
        let value = match conv {
            Some(conv) => {
                self.protect(var)?;
                self.apply(conv.into(), &[value])?
            },
            None => value,
        };
        self.var_set_force(var, value)
    }

    /// Store the value without applying the converter.
    pub fn var_set_force(&mut self, var: Value, value: Value)
        -> Result<(), Escape>
    {
        let object = self.var_object(var)?;
        match self.heap.get_mut(object) {
            Object::Var(var) => var.value = value,
            _ => unreachable!("Checked variable changed kind"),
        }
        trace!(target: "fubuki::library", "set {object:?}");
        Ok(())
    }

    fn var_object(&mut self, var: Value) -> Result<ObjectRef, Escape>
    {
        match var.as_object() {
            Some(object) if matches!(self.heap.get(object), Object::Var(_)) =>
                Ok(object),
            _ => Err(self.error("var required", &[var])),
        }
    }

    /* ---------------------------------------------------------------------- */
    /*                                 Libraries                              */
    /* ---------------------------------------------------------------------- */

    /// Create a library; raise if one with an equal name exists.
    pub fn make_library(&mut self, name: Value) -> Result<ObjectRef, Escape>
    {
        if self.find_library(name).is_some() {
            return Err(self.error("library name already in use", &[name]));
        }
        let library = self.allocate(Object::Library(Box::new(Library{
            name,
            env: HashMap::new(),
            exports: HashMap::new(),
        })))?;
        self.libraries.push(library);
        debug!(target: "fubuki::library", "made library {}", self.write_string(name));
        Ok(library)
    }

    /// The library with a name equal to the given one.
    pub fn find_library(&self, name: Value) -> Option<ObjectRef>
    {
        self.libraries.iter().copied()
            .find(|&library| self.equal(self.library_ref(library).name, name))
    }

    /// Make the named library the current library.
    pub fn in_library(&mut self, name: Value) -> Result<(), Escape>
    {
        match self.find_library(name) {
            Some(library) => {
                self.library = Some(library);
                Ok(())
            },
            None => Err(self.error("library not found", &[name])),
        }
    }

    /// The current library.
    pub fn current_library(&mut self) -> Result<ObjectRef, Escape>
    {
        match self.library {
            Some(library) => Ok(library),
            None => Err(self.error("no current library", &[])),
        }
    }

    /// Export a name visible in the current library.
    pub fn export(&mut self, name: Sym) -> Result<(), Escape>
    {
        let library = self.current_library()?;
        let library = self.library_mut(library);
        match library.env.get(&name).copied() {
            Some(uid) => {
                library.exports.insert(name, uid);
                Ok(())
            },
            None => Err(self.error("cannot export undefined variable", &[Value::Sym(name)])),
        }
    }

    /// Make every export of the named library visible in the current one.
    pub fn import(&mut self, name: Value) -> Result<(), Escape>
    {
        let from = match self.find_library(name) {
            Some(library) => library,
            None => return Err(self.error("library not found", &[name])),
        };
        let into = self.current_library()?;
        let exports = self.library_ref(from).exports.clone();
        self.library_mut(into).env.extend(exports);
        Ok(())
    }

    fn library_ref(&self, library: ObjectRef) -> &Library
    {
        match self.heap.get(library) {
            Object::Library(library) => library,
            _ => unreachable!("Library list holds a non-library"),
        }
    }

    fn library_mut(&mut self, library: ObjectRef) -> &mut Library
    {
        match self.heap.get_mut(library) {
            Object::Library(library) => library,
            _ => unreachable!("Library list holds a non-library"),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn library_name(runtime: &mut Runtime, parts: &[&str]) -> Value
    {
        let parts = parts.iter()
            .map(|part| Value::Sym(runtime.intern(part)))
            .collect::<Vec<_>>();
        runtime.list(&parts).unwrap()
    }

    #[test]
    fn define_ref_set()
    {
        let mut runtime = Runtime::open();
        let uid = runtime.define("answer", Value::Int(41)).unwrap();
        assert_eq!(runtime.resolve("answer"), Some(uid));
        assert!(!runtime.is_interned(uid));
        assert_eq!(runtime.symbol_name(uid), "answer");

        runtime.global_set("answer", Value::Int(42)).unwrap();
        assert_eq!(runtime.global_ref("answer").unwrap(), Value::Int(42));

        // Redefinition reuses the binding.
        assert_eq!(runtime.define("answer", Value::Nil).unwrap(), uid);
    }

    #[test]
    fn undefined_names_raise()
    {
        let mut runtime = Runtime::open();
        assert!(matches!(runtime.global_ref("nope"), Err(Escape::Raise(_))));
        assert!(matches!(runtime.global_set("nope", Value::Nil), Err(Escape::Raise(_))));
    }

    #[test]
    fn import_shares_bindings()
    {
        let mut runtime = Runtime::open();
        let user = library_name(&mut runtime, &["user"]);
        let lib = library_name(&mut runtime, &["my", "lib"]);

        runtime.make_library(lib).unwrap();
        runtime.in_library(lib).unwrap();
        let uid = runtime.define("shared", Value::Int(1)).unwrap();

        runtime.in_library(user).unwrap();
        assert_eq!(runtime.resolve("shared"), None);
        runtime.import(lib).unwrap();
        assert_eq!(runtime.resolve("shared"), Some(uid));

        runtime.global_set("shared", Value::Int(2)).unwrap();
        runtime.in_library(lib).unwrap();
        assert_eq!(runtime.global_ref("shared").unwrap(), Value::Int(2));
    }

    #[test]
    fn library_names_are_unique()
    {
        let mut runtime = Runtime::open();
        let user = library_name(&mut runtime, &["user"]);
        assert!(runtime.find_library(user).is_some());
        assert!(matches!(runtime.make_library(user), Err(Escape::Raise(_))));
    }

    #[test]
    fn core_procedures_are_imported()
    {
        let mut runtime = Runtime::open();
        for name in ["procedure?", "apply", "call/cc", "dynamic-wind", "rescue", "raise", "error", "equal?"] {
            assert!(runtime.global_ref(name).is_ok(), "{name} is not visible");
        }
    }

    #[test]
    fn defvar_boxes_the_value()
    {
        let mut runtime = Runtime::open();
        let var = runtime.defvar("v", Value::Int(7)).unwrap();
        assert_eq!(runtime.global_ref("v").unwrap(), var);
        let object = var.as_object().unwrap();
        assert!(matches!(
            runtime.object(object),
            Object::Var(Var{value: Value::Int(7), conv: None}),
        ));
    }

    fn double(rt: &mut Runtime, args: &[Value]) -> Result<Value, Escape>
    {
        match args {
            [Value::Int(int)] => Ok(Value::Int(int * 2)),
            _ => Err(rt.error("integer required", args)),
        }
    }

    #[test]
    fn var_set_applies_the_converter()
    {
        let mut runtime = Runtime::open();
        let conv = runtime.defun("double", double).unwrap();
        let var = runtime.make_var(Value::Int(1), Some(conv)).unwrap();
        assert_eq!(runtime.var_ref(var).unwrap(), Value::Int(1));

        runtime.var_set(var, Value::Int(5)).unwrap();
        assert_eq!(runtime.var_ref(var).unwrap(), Value::Int(10));

        runtime.var_set_force(var, Value::Int(5)).unwrap();
        assert_eq!(runtime.var_ref(var).unwrap(), Value::Int(5));

        // A failing converter leaves the value alone.
        assert!(matches!(runtime.var_set(var, Value::Nil), Err(Escape::Raise(_))));
        assert_eq!(runtime.var_ref(var).unwrap(), Value::Int(5));
    }

    #[test]
    fn var_set_without_converter()
    {
        let mut runtime = Runtime::open();
        let var = runtime.defvar("v", Value::Int(1)).unwrap();
        runtime.var_set(var, Value::Int(2)).unwrap();
        assert_eq!(runtime.var_ref(var).unwrap(), Value::Int(2));
    }

    #[test]
    fn var_operations_check_their_arguments()
    {
        let mut runtime = Runtime::open();
        assert!(matches!(runtime.var_ref(Value::Int(1)), Err(Escape::Raise(_))));
        assert!(matches!(
            runtime.var_set_force(Value::Nil, Value::Nil),
            Err(Escape::Raise(_)),
        ));
        assert!(matches!(
            runtime.make_var(Value::Nil, Some(Value::Int(3))),
            Err(Escape::Raise(_)),
        ));
    }
}
