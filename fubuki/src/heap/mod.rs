//! Paged, non-relocating heap.
//!
//! Objects live in slots of fixed-capacity pages and are named by
//! [`ObjectRef`] handles. A collection marks every object reachable from
//! the roots handed to it and moves every other slot onto the free list.
//! Live objects never move, so handles stay valid across collections.
//! Pages are only ever added; the heap does not shrink.

pub use self::object::*;

pub(crate) use self::trace::{Trace, Tracer};

use {crate::error::Fatal, log::debug, std::fmt};

mod object;
mod trace;

/* -------------------------------------------------------------------------- */
/*                                  Handles                                   */
/* -------------------------------------------------------------------------- */

/// Handle to a heap object.
///
/// Handles are plain indices: copying one does not keep the object alive.
/// An object stays alive while it is reachable from a root;
/// use the root arena to keep a freshly allocated object alive
/// until it is stored somewhere permanent.
///
/// Unlike block handles, object handles carry no generation. Once an
/// object is reclaimed its slot may be reused, and a stale handle then
/// names the new, unrelated object.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct ObjectRef
{
    page: u32,
    slot: u32,
}

impl ObjectRef
{
    pub(crate) fn new(page: u32, slot: u32) -> Self
    {
        Self{page, slot}
    }
}

impl fmt::Debug for ObjectRef
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "#<object {}:{}>", self.page, self.slot)
    }
}

/* -------------------------------------------------------------------------- */
/*                                   Pages                                    */
/* -------------------------------------------------------------------------- */

/// Collection of pages and the free slots in them.
pub(crate) struct Heap
{
    pages: Vec<Page>,
    free: Vec<ObjectRef>,
    page_size: usize,
    max_pages: usize,
    collections: u64,
}

struct Page
{
    slots: Vec<Slot>,
}

#[derive(Default)]
struct Slot
{
    marked: bool,
    object: Option<Object>,
}

/// Snapshot of heap occupancy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HeapStats
{
    /// Number of slots holding an object.
    pub live: usize,

    /// Number of slots on the free list.
    pub free: usize,

    /// Number of pages.
    pub pages: usize,

    /// Number of collections performed so far.
    pub collections: u64,
}

impl Heap
{
    /// Create a heap without any pages.
    ///
    /// The first allocation grows the heap.
    pub fn new(page_size: usize, max_pages: usize) -> Self
    {
        Self{
            pages: Vec::new(),
            free: Vec::new(),
            page_size: page_size.max(1),
            max_pages,
            collections: 0,
        }
    }

    /// Number of free slots below which a collection should be
    /// followed by growing the heap.
    pub fn growth_threshold(&self) -> usize
    {
        (self.page_size / 8).max(1)
    }

    /// Number of slots on the free list.
    pub fn free_slots(&self) -> usize
    {
        self.free.len()
    }

    /// Whether the slot named by the handle holds an object.
    ///
    /// A stale handle whose slot was reused reports the new object
    /// as live; see [`ObjectRef`].
    pub fn is_live(&self, object: ObjectRef) -> bool
    {
        self.pages.get(object.page as usize)
            .and_then(|page| page.slots.get(object.slot as usize))
            .map_or(false, |slot| slot.object.is_some())
    }

    /// The object named by the handle.
    ///
    /// # Panics
    ///
    /// If the object was reclaimed.
    pub fn get(&self, object: ObjectRef) -> &Object
    {
        self.pages[object.page as usize].slots[object.slot as usize]
            .object.as_ref()
            .expect("Use of reclaimed object")
    }

    /// The object named by the handle.
    ///
    /// # Panics
    ///
    /// If the object was reclaimed.
    pub fn get_mut(&mut self, object: ObjectRef) -> &mut Object
    {
        self.pages[object.page as usize].slots[object.slot as usize]
            .object.as_mut()
            .expect("Use of reclaimed object")
    }

    /// Store an object in a free slot.
    ///
    /// If there is no free slot, the object is handed back.
    pub fn try_insert(&mut self, object: Object) -> Result<ObjectRef, Object>
    {
        match self.free.pop() {
            Some(handle) => {
                let slot = &mut self.pages[handle.page as usize]
                    .slots[handle.slot as usize];
                slot.object = Some(object);
                Ok(handle)
            },
            None => Err(object),
        }
    }

    /// Add one page to the heap.
    pub fn grow(&mut self) -> Result<(), Fatal>
    {
        let pages = self.pages.len();
        let exhausted = Fatal::HeapExhausted{pages};

        if pages >= self.max_pages {
            return Err(exhausted);
        }

        let mut slots = Vec::new();
        slots.try_reserve_exact(self.page_size).map_err(|_| exhausted)?;
        slots.resize_with(self.page_size, Slot::default);
        self.free.try_reserve(self.page_size).map_err(|_| exhausted)?;
        self.pages.try_reserve(1).map_err(|_| exhausted)?;

        // Reversed, so that slots are handed out in ascending order.
        let page = pages as u32;
        self.free.extend((0 .. self.page_size as u32).rev()
            .map(|slot| ObjectRef::new(page, slot)));
        self.pages.push(Page{slots});

        debug!(
            target: "fubuki::heap",
            "grew heap to {} pages of {} slots",
            self.pages.len(), self.page_size,
        );

        Ok(())
    }

    /// Mark every object reachable from the tracer's worklist.
    pub fn mark(&mut self, tracer: &mut Tracer)
    {
        while let Some(handle) = tracer.pop() {
            let slot = &mut self.pages[handle.page as usize]
                .slots[handle.slot as usize];
            if slot.marked {
                continue;
            }
            slot.marked = true;
            slot.object.as_ref()
                .expect("Reclaimed object is reachable")
                .trace(tracer);
        }
    }

    /// Reclaim every unmarked object and clear all marks.
    ///
    /// Each reclaimed object is handed to `on_free` before it is dropped.
    /// Returns the number of reclaimed objects.
    pub fn sweep<F>(&mut self, mut on_free: F) -> usize
        where F: FnMut(Object)
    {
        let mut freed = 0;
        for (p, page) in self.pages.iter_mut().enumerate() {
            for (s, slot) in page.slots.iter_mut().enumerate() {
                if slot.marked {
                    slot.marked = false;
                } else if let Some(object) = slot.object.take() {
                    self.free.push(ObjectRef::new(p as u32, s as u32));
                    on_free(object);
                    freed += 1;
                }
            }
        }
        self.collections += 1;
        freed
    }

    /// Snapshot of heap occupancy.
    pub fn stats(&self) -> HeapStats
    {
        let slots = self.pages.len() * self.page_size;
        HeapStats{
            live: slots - self.free.len(),
            free: self.free.len(),
            pages: self.pages.len(),
            collections: self.collections,
        }
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::value::Value};

    fn pair(car: Value, cdr: Value) -> Object
    {
        Object::Pair(Pair{car, cdr})
    }

    #[test]
    fn insert_requires_pages()
    {
        let mut heap = Heap::new(4, 2);
        assert!(heap.try_insert(pair(Value::Nil, Value::Nil)).is_err());

        heap.grow().unwrap();
        let handle = heap.try_insert(pair(Value::Int(1), Value::Nil)).unwrap();
        assert_eq!(handle, ObjectRef::new(0, 0));
        assert!(heap.is_live(handle));
        assert_eq!(heap.free_slots(), 3);
    }

    #[test]
    fn page_limit()
    {
        let mut heap = Heap::new(4, 2);
        heap.grow().unwrap();
        heap.grow().unwrap();
        assert_eq!(heap.grow(), Err(Fatal::HeapExhausted{pages: 2}));
        assert_eq!(heap.stats().pages, 2);
    }

    #[test]
    fn sweep_keeps_marked()
    {
        let mut heap = Heap::new(8, 1);
        heap.grow().unwrap();

        let tail = heap.try_insert(pair(Value::Int(2), Value::Nil)).unwrap();
        let head = heap.try_insert(pair(Value::Int(1), tail.into())).unwrap();
        let junk = heap.try_insert(pair(Value::Int(3), Value::Nil)).unwrap();

        let mut tracer = Tracer::new();
        tracer.object(head);
        heap.mark(&mut tracer);
        let mut reclaimed = Vec::new();
        assert_eq!(heap.sweep(|object| reclaimed.push(object.kind())), 1);

        assert_eq!(reclaimed, [Kind::Pair]);
        assert!(heap.is_live(head));
        assert!(heap.is_live(tail));
        assert!(!heap.is_live(junk));
        assert!(matches!(
            heap.get(head),
            Object::Pair(Pair{car: Value::Int(1), cdr}) if *cdr == tail.into(),
        ));

        // Marks were cleared, so nothing survives a sweep without marking.
        assert_eq!(heap.sweep(|_| ()), 2);
        assert_eq!(heap.stats(), HeapStats{live: 0, free: 8, pages: 1, collections: 2});
    }

    #[test]
    fn reclaimed_slots_are_reused()
    {
        let mut heap = Heap::new(2, 1);
        heap.grow().unwrap();
        let old = heap.try_insert(pair(Value::Int(1), Value::Nil)).unwrap();
        heap.sweep(|_| ());
        assert!(!heap.is_live(old));

        // The stale handle now names the new object.
        let new = heap.try_insert(pair(Value::Int(2), Value::Nil)).unwrap();
        assert_eq!(new, old);
        assert!(heap.is_live(old));
        assert!(matches!(
            heap.get(old),
            Object::Pair(Pair{car: Value::Int(2), ..}),
        ));
    }

    #[test]
    fn objects_are_debuggable()
    {
        let object = pair(Value::Int(1), Value::Nil);
        assert!(format!("{object:?}").starts_with("Pair("));
        let rejected = Heap::new(1, 1).try_insert(object).unwrap_err();
        assert_eq!(rejected.kind(), Kind::Pair);
    }
}
