use {crate::{symbol::Sym, value::Value}, std::collections::HashMap};

/// Growable array of global values, indexed through symbols.
pub struct GlobalTable
{
    slots: HashMap<Sym, usize>,
    values: Vec<Value>,
}

impl GlobalTable
{
    pub fn new(capacity: usize) -> Self
    {
        Self{
            slots: HashMap::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    /// The value of a global, or [`Value::Undef`] if it has none.
    pub fn get(&self, name: Sym) -> Value
    {
        self.slots.get(&name)
            .map_or(Value::Undef, |&slot| self.values[slot])
    }

    /// Set the value of a global, allocating a slot if necessary.
    pub fn set(&mut self, name: Sym, value: Value)
    {
        let values = &mut self.values;
        let slot = *self.slots.entry(name).or_insert_with(|| {
            values.push(Value::Undef);
            values.len() - 1
        });
        self.values[slot] = value;
    }

    /// Every global value, for the collector.
    pub fn values(&self) -> &[Value]
    {
        &self.values
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::symbol::SymbolTable};

    #[test]
    fn set_and_get()
    {
        let mut symbols = SymbolTable::new();
        let x = symbols.intern("x");
        let y = symbols.intern("y");

        let mut globals = GlobalTable::new(1);
        assert_eq!(globals.get(x), Value::Undef);

        globals.set(x, Value::Int(1));
        globals.set(y, Value::Int(2));
        globals.set(x, Value::Int(3));

        assert_eq!(globals.get(x), Value::Int(3));
        assert_eq!(globals.get(y), Value::Int(2));
        assert_eq!(globals.values().len(), 2);
    }
}
