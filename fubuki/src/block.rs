//! Dynamic extents.
//!
//! Blocks form a tree through their parent links. The path from the
//! active block to the root is the current dynamic extent. Continuations
//! remember the block that was active when they were captured and hold a
//! reference on every block from it to the root, so that their extent can
//! be re-entered later. A block that is neither on the active path nor
//! referenced by any continuation is retired.

use {
    crate::{error::Escape, runtime::Runtime, value::Value},
    log::{debug, trace},
    smallvec::SmallVec,
};

/// Index of a block in the block table.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct BlockId(u32);

/// Handle to a dynamic extent entered through [`Runtime::enter`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockHandle
{
    id: BlockId,
    generation: u32,
}

pub(crate) struct Block
{
    pub prev: Option<BlockId>,
    pub depth: usize,
    pub entry: Value,
    pub exit: Value,
    pub refcnt: usize,
}

struct Slot
{
    generation: u32,
    block: Option<Block>,
}

/// Every live block, and which one is active.
pub(crate) struct BlockTable
{
    slots: Vec<Slot>,
    free: Vec<u32>,
    current: BlockId,
}

impl BlockTable
{
    pub const ROOT: BlockId = BlockId(0);

    pub fn new() -> Self
    {
        let root = Block{
            prev: None,
            depth: 0,
            entry: Value::None,
            exit: Value::None,
            refcnt: 0,
        };
        Self{
            slots: vec![Slot{generation: 0, block: Some(root)}],
            free: Vec::new(),
            current: Self::ROOT,
        }
    }

    /// The active block.
    pub fn current(&self) -> BlockId
    {
        self.current
    }

    pub fn set_current(&mut self, id: BlockId)
    {
        self.current = id;
    }

    /// # Panics
    ///
    /// If the block was retired.
    pub fn get(&self, id: BlockId) -> &Block
    {
        self.slots[id.0 as usize].block.as_ref()
            .expect("Use of retired block")
    }

    fn get_mut(&mut self, id: BlockId) -> &mut Block
    {
        self.slots[id.0 as usize].block.as_mut()
            .expect("Use of retired block")
    }

    /// Number of live blocks, including the root.
    pub fn len(&self) -> usize
    {
        self.slots.len() - self.free.len()
    }

    /// Push a child of the active block and make it active.
    pub fn push(&mut self, entry: Value, exit: Value) -> BlockHandle
    {
        let block = Block{
            prev: Some(self.current),
            depth: self.get(self.current).depth + 1,
            entry,
            exit,
            refcnt: 0,
        };
        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = slot.generation.wrapping_add(1);
                slot.block = Some(block);
                index
            },
            None => {
                self.slots.push(Slot{generation: 0, block: Some(block)});
                self.slots.len() as u32 - 1
            },
        };
        self.current = BlockId(index);
        self.handle(self.current)
    }

    pub fn handle(&self, id: BlockId) -> BlockHandle
    {
        BlockHandle{id, generation: self.slots[id.0 as usize].generation}
    }

    /// The block named by the handle, unless it was retired.
    pub fn resolve(&self, handle: BlockHandle) -> Option<BlockId>
    {
        let slot = self.slots.get(handle.id.0 as usize)?;
        (slot.generation == handle.generation && slot.block.is_some())
            .then(|| handle.id)
    }

    /// Whether the block is on the path from the active block to the root.
    pub fn is_active(&self, id: BlockId) -> bool
    {
        let depth = self.get(id).depth;
        let mut block = self.current;
        loop {
            if block == id {
                return true;
            }
            match self.get(block) {
                Block{prev: Some(prev), depth: d, ..} if *d > depth =>
                    block = *prev,
                _ => return false,
            }
        }
    }

    /// The deepest block that is an ancestor of both blocks.
    pub fn common_ancestor(&self, mut a: BlockId, mut b: BlockId) -> BlockId
    {
        let parent = |id| self.get(id).prev.unwrap_or(Self::ROOT);
        while self.get(a).depth > self.get(b).depth {
            a = parent(a);
        }
        while self.get(b).depth > self.get(a).depth {
            b = parent(b);
        }
        while a != b {
            a = parent(a);
            b = parent(b);
        }
        a
    }

    /// Blocks below `ancestor` on the way to `target`, outermost first.
    pub fn path(&self, ancestor: BlockId, target: BlockId)
        -> SmallVec<[BlockId; 8]>
    {
        let mut path = SmallVec::new();
        let mut block = target;
        while block != ancestor {
            path.push(block);
            block = self.get(block).prev.unwrap_or(Self::ROOT);
        }
        path.reverse();
        path
    }

    /// Take a reference on every block from `id` to the root.
    pub fn retain(&mut self, id: BlockId)
    {
        let mut block = Some(id);
        while let Some(id) = block {
            let b = self.get_mut(id);
            b.refcnt += 1;
            block = b.prev;
        }
    }

    /// Drop a reference taken by [`retain`][`Self::retain`].
    ///
    /// Returns the number of blocks that were retired as a result.
    pub fn release(&mut self, id: BlockId) -> usize
    {
        let mut block = Some(id);
        while let Some(id) = block {
            let b = self.get_mut(id);
            b.refcnt -= 1;
            block = b.prev;
        }
        self.prune(id)
    }

    /// Retire the block and its ancestors, as long as they are
    /// unreferenced and inactive. Returns the number of retired blocks.
    pub fn prune(&mut self, mut id: BlockId) -> usize
    {
        let mut retired = 0;
        while id != Self::ROOT && self.get(id).refcnt == 0 && !self.is_active(id) {
            let slot = &mut self.slots[id.0 as usize];
            let block = slot.block.take().expect("Use of retired block");
            self.free.push(id.0);
            retired += 1;
            id = block.prev.unwrap_or(Self::ROOT);
        }
        if retired != 0 {
            debug!(target: "fubuki::block", "retired {retired} blocks");
        }
        retired
    }

    /// Entry and exit thunks of every live block.
    pub fn thunks(&self) -> impl Iterator<Item=Value> + '_
    {
        self.slots.iter()
            .filter_map(|slot| slot.block.as_ref())
            .flat_map(|block| [block.entry, block.exit])
    }
}

impl Runtime
{
    /// Run the entry thunk and enter a new dynamic extent.
    ///
    /// The extent stays active until it is left through
    /// [`leave`][`Self::leave`], a raise that unwinds past it,
    /// or a continuation jump out of it.
    pub fn enter(&mut self, entry: Value, exit: Value)
        -> Result<BlockHandle, Escape>
    {
        self.protect(entry)?;
        self.protect(exit)?;
        self.apply(entry, &[])?;
        let handle = self.blocks.push(entry, exit);
        trace!(target: "fubuki::block", "enter {:?}", handle.id);
        Ok(handle)
    }

    /// Leave the extent entered with the handle, running its exit thunk.
    ///
    /// If other extents were entered inside it and are still active,
    /// their exit thunks run first, innermost first. If the extent is
    /// not active, it is re-entered before it is left. Leaving an extent
    /// that was already retired does nothing.
    pub fn leave(&mut self, handle: BlockHandle) -> Result<(), Escape>
    {
        match self.blocks.resolve(handle) {
            Some(id) => self.leave_block(id),
            None => Ok(()),
        }
    }

    pub(crate) fn leave_block(&mut self, id: BlockId) -> Result<(), Escape>
    {
        self.rewind(id)?;
        let parent = self.blocks.get(id).prev.unwrap_or(BlockTable::ROOT);
        self.rewind(parent)
    }

    /// Make `target` the active block.
    ///
    /// Exit thunks run for every block left, innermost first, each after
    /// its parent became active. Entry thunks run for every block entered,
    /// outermost first, each before the block becomes active.
    pub(crate) fn rewind(&mut self, target: BlockId) -> Result<(), Escape>
    {
        if self.blocks.current() == target {
            return Ok(());
        }

        // The target path must survive collections triggered by thunks.
        self.blocks.retain(target);
        let result = self.rewind_retained(target);
        self.blocks.release(target);
        result
    }

    fn rewind_retained(&mut self, target: BlockId) -> Result<(), Escape>
    {
        let common = self.blocks.common_ancestor(self.blocks.current(), target);

        // Each thunk runs in its own arena scope, so that the depth of
        // the rewind is not limited by the arena.
        while self.blocks.current() != common {
            let id = self.blocks.current();
            let Block{prev, exit, ..} = *self.blocks.get(id);
            self.blocks.set_current(prev.unwrap_or(BlockTable::ROOT));
            let mark = self.arena_preserve();
            self.protect(exit)?;
            self.blocks.prune(id);
            trace!(target: "fubuki::block", "leave {id:?}");
            self.apply(exit, &[])?;
            self.arena_restore(mark)?;
        }

        for id in self.blocks.path(common, target) {
            let entry = self.blocks.get(id).entry;
            let mark = self.arena_preserve();
            self.apply(entry, &[])?;
            self.arena_restore(mark)?;
            self.blocks.set_current(id);
            trace!(target: "fubuki::block", "re-enter {id:?}");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn push_and_prune()
    {
        let mut blocks = BlockTable::new();
        let a = blocks.push(Value::Int(1), Value::Int(2));
        let b = blocks.push(Value::Int(3), Value::Int(4));
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks.get(b.id).depth, 2);
        assert!(blocks.is_active(a.id));

        // Leave both without any continuation holding them.
        blocks.set_current(BlockTable::ROOT);
        assert_eq!(blocks.prune(b.id), 2);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks.resolve(a), None);
    }

    #[test]
    fn retained_blocks_survive()
    {
        let mut blocks = BlockTable::new();
        let a = blocks.push(Value::None, Value::None);
        let b = blocks.push(Value::None, Value::None);
        blocks.retain(b.id);

        blocks.set_current(BlockTable::ROOT);
        assert_eq!(blocks.prune(b.id), 0);
        assert_eq!(blocks.resolve(b), Some(b.id));

        assert_eq!(blocks.release(b.id), 2);
        assert_eq!(blocks.resolve(a), None);
    }

    #[test]
    fn reused_slots_get_new_generations()
    {
        let mut blocks = BlockTable::new();
        let old = blocks.push(Value::None, Value::None);
        blocks.set_current(BlockTable::ROOT);
        blocks.prune(old.id);
        let new = blocks.push(Value::None, Value::None);
        assert_eq!(new.id, old.id);
        assert_eq!(blocks.resolve(old), None);
        assert_eq!(blocks.resolve(new), Some(new.id));
    }

    #[test]
    fn ancestors_and_paths()
    {
        let mut blocks = BlockTable::new();
        let a = blocks.push(Value::None, Value::None).id;
        let b = blocks.push(Value::None, Value::None).id;
        blocks.set_current(a);
        let c = blocks.push(Value::None, Value::None).id;
        let d = blocks.push(Value::None, Value::None).id;

        assert_eq!(blocks.common_ancestor(b, d), a);
        assert_eq!(blocks.common_ancestor(d, BlockTable::ROOT), BlockTable::ROOT);
        assert_eq!(blocks.path(a, d).as_slice(), [c, d]);
        assert_eq!(blocks.path(BlockTable::ROOT, b).as_slice(), [a, b]);
        assert!(!blocks.is_active(b));
        assert!(blocks.is_active(c));
    }
}
