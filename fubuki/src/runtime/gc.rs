use {
    super::Runtime,
    crate::{
        error::Fatal,
        heap::{HeapStats, Object, ObjectRef, Trace, Tracer},
    },
    log::debug,
};

impl Runtime
{
    /// Store an object on the heap and pin it in the arena.
    ///
    /// May collect garbage and grow the heap first.
    /// Running out of pages or arena slots is fatal.
    pub fn allocate(&mut self, object: Object) -> Result<ObjectRef, Fatal>
    {
        let handle = self.allocate_unpinned(object)?;
        self.arena.push(handle).map_err(|f| self.fatal(f))?;
        Ok(handle)
    }

    /// Store an object on the heap without pinning it.
    ///
    /// The object must be made reachable before the next allocation.
    /// References held by the object itself are safe: they are treated
    /// as roots by a collection that this allocation triggers.
    pub fn allocate_unpinned(&mut self, object: Object)
        -> Result<ObjectRef, Fatal>
    {
        if self.config.gc_stress {
            self.collect_with(Some(&object));
        }

        let object = match self.heap.try_insert(object) {
            Ok(handle) => return Ok(handle),
            Err(object) => object,
        };

        self.collect_with(Some(&object));
        if self.heap.free_slots() < self.heap.growth_threshold() {
            self.heap.grow().map_err(|f| self.fatal(f))?;
        }

        match self.heap.try_insert(object) {
            Ok(handle) => Ok(handle),
            Err(_) => unreachable!("No free slot after growing the heap"),
        }
    }

    /// Reclaim every object that is not reachable from a root.
    ///
    /// The roots are the global table, the libraries, the operand stack,
    /// the call frames and their constants, the arena, the thunks of every
    /// live block and the handlers of every rescue entry.
    pub fn collect(&mut self)
    {
        self.collect_with(None);
    }

    pub(crate) fn collect_with(&mut self, pending: Option<&Object>)
    {
        let mut tracer = Tracer::new();

        tracer.values(self.globals.values());
        self.libraries.iter().for_each(|&l| tracer.object(l));
        tracer.values(&self.stack);
        self.frames.iter().for_each(|f| f.trace(&mut tracer));
        self.arena.iter().for_each(|o| tracer.object(o));
        self.blocks.thunks().for_each(|v| tracer.value(v));
        self.rescue.entries().iter().for_each(|r| r.trace(&mut tracer));
        self.trampoline.trace(&mut tracer);
        if let Some(object) = pending {
            object.trace(&mut tracer);
        }

        self.heap.mark(&mut tracer);

        let blocks = &mut self.blocks;
        let mut retired = 0;
        let freed = self.heap.sweep(|object| {
            if let Object::Continuation(continuation) = object {
                retired += blocks.release(continuation.block);
            }
        });

        let stats = self.heap.stats();
        debug!(
            target: "fubuki::gc",
            "collection {}: freed {freed}, live {}, pages {}, retired {retired} blocks",
            stats.collections, stats.live, stats.pages,
        );
    }

    /// Snapshot of heap occupancy.
    pub fn heap_stats(&self) -> HeapStats
    {
        self.heap.stats()
    }

    /// Whether the handle names an object that was not reclaimed.
    ///
    /// Handles carry no generation, so this is only meaningful for
    /// handles that were rooted since they were created; see [`ObjectRef`].
    pub fn is_live(&self, object: ObjectRef) -> bool
    {
        self.heap.is_live(object)
    }

    /// The object named by the handle.
    ///
    /// # Panics
    ///
    /// If the object was reclaimed.
    pub fn object(&self, object: ObjectRef) -> &Object
    {
        self.heap.get(object)
    }

    /// The object named by the handle.
    ///
    /// # Panics
    ///
    /// If the object was reclaimed.
    pub fn object_mut(&mut self, object: ObjectRef) -> &mut Object
    {
        self.heap.get_mut(object)
    }
}

#[cfg(test)]
mod tests
{
    use {
        crate::{
            config::Config,
            heap::{Object, Pair},
            runtime::Runtime,
            value::Value,
        },
        proptest::{prop_assert, proptest},
    };

    fn small() -> Runtime
    {
        let config = Config{heap_page_size: 16, ..Config::default()};
        Runtime::new(config).unwrap()
    }

    fn pair(car: i64) -> Object
    {
        Object::Pair(Pair{car: Value::Int(car), cdr: Value::Nil})
    }

    #[test]
    fn unpinned_objects_are_reclaimed()
    {
        let mut runtime = small();
        let mark = runtime.arena_preserve();
        let object = runtime.allocate(pair(1)).unwrap();
        runtime.collect();
        assert!(runtime.is_live(object));

        runtime.arena_restore(mark).unwrap();
        runtime.collect();
        assert!(!runtime.is_live(object));
    }

    #[test]
    fn globals_are_not_relocated()
    {
        let mut runtime = small();
        let list = runtime.with_arena_scope(|rt| {
            let list = rt.list(&[Value::Int(1), Value::Int(2), Value::Int(3)])?;
            rt.define("xs", list)?;
            Ok::<_, crate::Escape>(list)
        }).unwrap();

        // Churn through several pages of garbage.
        for i in 0 .. 200 {
            let mark = runtime.arena_preserve();
            runtime.allocate(pair(i)).unwrap();
            runtime.arena_restore(mark).unwrap();
        }
        runtime.collect();

        assert_eq!(runtime.global_ref("xs").unwrap(), list);
        let expected = runtime.with_arena_scope(|rt| {
            rt.list(&[Value::Int(1), Value::Int(2), Value::Int(3)])
        }).unwrap();
        assert!(runtime.equal(list, expected));
    }

    #[test]
    fn pending_object_fields_are_roots()
    {
        let config = Config{gc_stress: true, ..Config::default()};
        let mut runtime = Runtime::new(config).unwrap();
        let mark = runtime.arena_preserve();
        let car = runtime.allocate_unpinned(pair(1)).unwrap();

        // The only reference to `car` is inside the object being allocated.
        let outer = runtime.allocate(Object::Pair(Pair{
            car: car.into(),
            cdr: Value::Nil,
        })).unwrap();

        assert!(runtime.is_live(car));
        runtime.collect();
        assert!(runtime.is_live(car));

        runtime.arena_restore(mark).unwrap();
        runtime.collect();
        assert!(!runtime.is_live(outer));
        assert!(!runtime.is_live(car));
    }

    #[test]
    fn heap_grows_when_collection_does_not_suffice()
    {
        let mut runtime = small();
        let before = runtime.heap_stats().pages;
        let mark = runtime.arena_preserve();
        let mut list = Value::Nil;
        for i in 0 .. 40 {
            list = runtime.cons(Value::Int(i), list).unwrap();
            runtime.arena_restore(mark).unwrap();
            runtime.protect(list).unwrap();
        }
        assert!(runtime.heap_stats().pages > before);
        assert!(runtime.heap_stats().collections > 0);
        runtime.arena_restore(mark).unwrap();
    }

    #[test]
    fn heap_exhaustion_is_fatal()
    {
        let config = Config{
            heap_page_size: 64,
            heap_max_pages: 1,
            ..Config::default()
        };
        let mut runtime = Runtime::new(config).unwrap();
        let mark = runtime.arena_preserve();
        let mut list = Value::Nil;
        let fatal = loop {
            match runtime.cons(Value::Int(0), list) {
                Ok(cons) => list = cons,
                Err(fatal) => break fatal,
            }
            runtime.arena_restore(mark).unwrap();
            runtime.protect(list).unwrap();
        };
        assert_eq!(fatal, crate::Fatal::HeapExhausted{pages: 1});
        assert_eq!(runtime.poisoned(), Some(fatal));
        assert!(matches!(
            runtime.run(Value::Nil, &[]),
            Err(crate::Error::Fatal(crate::Fatal::HeapExhausted{pages: 1})),
        ));
    }

    proptest!
    {
        #[test]
        fn pins_survive_until_restored(
            scopes in proptest::collection::vec(1usize .. 6, 1 .. 8),
        )
        {
            let mut runtime = small();
            let mut marks = Vec::new();
            let mut pinned = Vec::new();

            // Open nested scopes, each pinning a few fresh objects.
            for (i, &n) in scopes.iter().enumerate() {
                marks.push(runtime.arena_preserve());
                let objects = (0 .. n)
                    .map(|j| runtime.allocate(pair((i * 8 + j) as i64)).unwrap())
                    .collect::<Vec<_>>();
                pinned.push(objects);
                runtime.collect();
                for objects in &pinned {
                    for &object in objects {
                        prop_assert!(runtime.is_live(object));
                    }
                }
            }

            // Close them again; each scope's objects die with it.
            while let Some(mark) = marks.pop() {
                let objects = pinned.pop().unwrap();
                runtime.arena_restore(mark).unwrap();
                runtime.collect();
                for object in objects {
                    prop_assert!(!runtime.is_live(object));
                }
                for objects in &pinned {
                    for &object in objects {
                        prop_assert!(runtime.is_live(object));
                    }
                }
            }
        }
    }
}
