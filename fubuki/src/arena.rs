//! Bounded stack of pinned heap references.
//!
//! Native code that allocates an object and then allocates again
//! before storing the first object somewhere permanent
//! must pin the first object, or the second allocation may collect it.
//! The runtime pins every freshly allocated object automatically,
//! so native code mostly deals with scopes: take a [`Mark`],
//! do the work, and restore the mark to unpin everything in between.

use {crate::{error::Fatal, heap::ObjectRef}, std::fmt};

/// LIFO stack of pinned references with a fixed capacity.
pub struct Arena
{
    pins: Vec<ObjectRef>,
    capacity: usize,
}

/// Height of an arena, to which it can later be restored.
#[derive(Clone, Copy, Eq, Ord, PartialEq, PartialOrd)]
pub struct Mark(usize);

impl Arena
{
    /// Create an empty arena with the given capacity.
    ///
    /// The capacity never changes.
    pub fn new(capacity: usize) -> Self
    {
        Self{pins: Vec::with_capacity(capacity), capacity}
    }

    /// Maximum number of pinned references.
    pub fn capacity(&self) -> usize
    {
        self.capacity
    }

    /// Number of pinned references.
    pub fn height(&self) -> usize
    {
        self.pins.len()
    }

    /// Pin a reference and return its slot.
    ///
    /// Pushing onto a full arena is fatal and leaves the arena unchanged.
    pub fn push(&mut self, object: ObjectRef) -> Result<usize, Fatal>
    {
        let index = self.pins.len();
        if index == self.capacity {
            return Err(Fatal::ArenaOverflow{capacity: self.capacity});
        }
        self.pins.push(object);
        Ok(index)
    }

    /// The current height.
    pub fn mark(&self) -> Mark
    {
        Mark(self.pins.len())
    }

    /// Unpin everything pushed since the mark was taken.
    ///
    /// A mark above the current height means that a scope was closed
    /// out of order; this is fatal and leaves the height untouched.
    pub fn restore(&mut self, mark: Mark) -> Result<(), Fatal>
    {
        if mark.0 > self.pins.len() {
            return Err(Fatal::ArenaRestore{mark: mark.0, height: self.pins.len()});
        }
        self.pins.truncate(mark.0);
        Ok(())
    }

    /// The pinned references, bottom first.
    pub fn iter(&self) -> impl Iterator<Item=ObjectRef> + '_
    {
        self.pins.iter().copied()
    }
}

impl Mark
{
    /// The height recorded by this mark.
    pub fn height(self) -> usize
    {
        self.0
    }
}

impl fmt::Debug for Mark
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "Mark({:?})", self.0)
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, proptest::{prop_assert, prop_assert_eq, proptest}};

    fn object(i: usize) -> ObjectRef
    {
        ObjectRef::new(0, i as u32)
    }

    #[test]
    fn overflow_is_fatal()
    {
        let mut arena = Arena::new(3);
        for i in 0 .. 3 {
            assert_eq!(arena.push(object(i)), Ok(i));
        }
        assert_eq!(arena.push(object(3)), Err(Fatal::ArenaOverflow{capacity: 3}));
        assert_eq!(arena.height(), 3);

        // Same outcome every time.
        assert_eq!(arena.push(object(4)), Err(Fatal::ArenaOverflow{capacity: 3}));
        assert_eq!(arena.height(), 3);
    }

    #[test]
    fn restore_above_height()
    {
        let mut arena = Arena::new(8);
        arena.push(object(0)).unwrap();
        let inner = {
            arena.push(object(1)).unwrap();
            arena.mark()
        };
        arena.restore(Mark(1)).unwrap();
        assert_eq!(
            arena.restore(inner),
            Err(Fatal::ArenaRestore{mark: 2, height: 1}),
        );
        assert_eq!(arena.height(), 1);
    }

    proptest!
    {
        #[test]
        fn nested_scopes(pushes in proptest::collection::vec(0usize .. 4, 0 .. 16))
        {
            let mut arena = Arena::new(64);
            let mut marks = Vec::new();
            for (i, &n) in pushes.iter().enumerate() {
                marks.push(arena.mark());
                for j in 0 .. n {
                    arena.push(object(i * 4 + j)).unwrap();
                }
            }
            while let Some(mark) = marks.pop() {
                arena.restore(mark).unwrap();
                prop_assert_eq!(arena.height(), mark.height());
                prop_assert!(arena.iter().count() == mark.height());
            }
            prop_assert_eq!(arena.height(), 0);
        }
    }
}
