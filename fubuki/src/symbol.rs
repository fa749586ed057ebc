use std::{collections::HashMap, fmt, rc::Rc};

/// Symbol identifier.
///
/// Interned symbols with equal names are equal.
/// Generated symbols are distinct from every other symbol,
/// even from symbols with the same name.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Sym(u32);

/// Names of all symbols, and the index of interned ones.
pub struct SymbolTable
{
    names: Vec<Rc<str>>,
    interned: HashMap<Rc<str>, Sym>,
}

impl SymbolTable
{
    pub fn new() -> Self
    {
        Self{names: Vec::new(), interned: HashMap::new()}
    }

    /// The symbol with the given name, creating it if necessary.
    pub fn intern(&mut self, name: &str) -> Sym
    {
        if let Some(&sym) = self.interned.get(name) {
            return sym;
        }
        let sym = self.fresh(name.into());
        self.interned.insert(self.names[sym.0 as usize].clone(), sym);
        sym
    }

    /// A new uninterned symbol named after `base`.
    pub fn gensym(&mut self, base: Sym) -> Sym
    {
        let name = self.names[base.0 as usize].clone();
        self.fresh(name)
    }

    /// Whether the symbol was obtained through [`intern`][`Self::intern`].
    pub fn is_interned(&self, sym: Sym) -> bool
    {
        self.interned.get(self.name(sym)) == Some(&sym)
    }

    /// The name of the symbol.
    pub fn name(&self, sym: Sym) -> &str
    {
        &self.names[sym.0 as usize]
    }

    fn fresh(&mut self, name: Rc<str>) -> Sym
    {
        let sym = Sym(self.names.len() as u32);
        self.names.push(name);
        sym
    }
}

impl fmt::Debug for Sym
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "Sym({:?})", self.0)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn intern_is_idempotent()
    {
        let mut symbols = SymbolTable::new();
        let a = symbols.intern("car");
        let b = symbols.intern("cdr");
        assert_ne!(a, b);
        assert_eq!(symbols.intern("car"), a);
        assert_eq!(symbols.name(b), "cdr");
    }

    #[test]
    fn gensym_is_uninterned()
    {
        let mut symbols = SymbolTable::new();
        let base = symbols.intern("tmp");
        let first = symbols.gensym(base);
        let second = symbols.gensym(base);
        assert_ne!(first, base);
        assert_ne!(first, second);
        assert_eq!(symbols.name(first), "tmp");
        assert!(symbols.is_interned(base));
        assert!(!symbols.is_interned(first));
        assert_eq!(symbols.intern("tmp"), base);
    }
}
