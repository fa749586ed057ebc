//! Rescue stack for non-local error recovery.
//!
//! A rescue entry records how far the operand stack, the frame stack and
//! the dynamic extent reached when it was installed. Raising a condition
//! unwinds all three back to the topmost entry, pops it, and applies its
//! handler to the condition.
//!
//! Raises travel as [`Escape::Raise`] through every dispatch loop and
//! native procedure on the way. Each entry has an owner, either a dispatch
//! loop or a native [`Runtime::rescue`] scope, and only the owner may act
//! on a raise aimed at its entry.

use {
    crate::{
        block::BlockId,
        error::{Escape, Fatal},
        runtime::Runtime,
        value::Value,
    },
    log::trace,
};

/// Where execution continues once a handler returns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Resume
{
    /// Push the handler's result and jump within the installing frame.
    Label(u32),

    /// Return the handler's result from [`Runtime::recover`].
    Native,
}

#[derive(Clone, Copy)]
pub(crate) struct RescueEntry
{
    pub handler: Value,
    pub sp: usize,
    pub frames: usize,
    pub block: BlockId,
    pub resume: Resume,
    pub owner: u64,
}

/// Handle to an installed rescue entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RescueHandle
{
    depth: usize,
    owner: u64,
}

impl RescueHandle
{
    /// The handle after entries owned by `from` were moved to `to`.
    pub(crate) fn remap(self, from: u64, to: u64) -> Self
    {
        if self.owner == from { Self{owner: to, ..self} } else { self }
    }
}

pub(crate) struct RescueStack
{
    entries: Vec<RescueEntry>,
    capacity: usize,
}

impl RescueStack
{
    pub fn new(capacity: usize) -> Self
    {
        Self{entries: Vec::with_capacity(capacity), capacity}
    }

    pub fn push(&mut self, entry: RescueEntry) -> Result<RescueHandle, Fatal>
    {
        if self.entries.len() == self.capacity {
            return Err(Fatal::RescueOverflow{capacity: self.capacity});
        }
        let handle = RescueHandle{depth: self.entries.len(), owner: entry.owner};
        self.entries.push(entry);
        Ok(handle)
    }

    /// Pop the entry, which must be the topmost one.
    pub fn remove(&mut self, handle: RescueHandle) -> Result<(), Fatal>
    {
        if !self.is_top(handle) {
            return Err(Fatal::RescueOrder{
                handle: handle.depth,
                depth: self.entries.len(),
            });
        }
        self.entries.pop();
        Ok(())
    }

    pub fn is_top(&self, handle: RescueHandle) -> bool
    {
        self.entries.len() == handle.depth + 1
            && self.entries[handle.depth].owner == handle.owner
    }

    /// Pop the topmost entry, which must have been installed
    /// by the frame at the given depth of the given loop.
    pub fn pop_installed_by(&mut self, frames: usize, owner: u64)
        -> Result<(), Fatal>
    {
        match self.entries.last() {
            Some(entry) if entry.frames == frames && entry.owner == owner => {
                self.entries.pop();
                Ok(())
            },
            _ => Err(Fatal::RescueOrder{
                handle: frames,
                depth: self.entries.len(),
            }),
        }
    }

    pub fn top(&self) -> Option<&RescueEntry>
    {
        self.entries.last()
    }

    pub fn pop(&mut self) -> Option<RescueEntry>
    {
        self.entries.pop()
    }

    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    pub fn truncate(&mut self, len: usize)
    {
        self.entries.truncate(len);
    }

    pub fn entries(&self) -> &[RescueEntry]
    {
        &self.entries
    }

    /// Replace every entry, moving entries owned by `from` to `to`.
    pub fn restore(&mut self, entries: &[RescueEntry], from: u64, to: u64)
    {
        self.entries.clear();
        self.entries.extend(entries.iter().map(|&entry| {
            let owner = if entry.owner == from { to } else { entry.owner };
            RescueEntry{owner, ..entry}
        }));
    }
}

impl Runtime
{
    /// Install a handler for conditions raised until it is uninstalled.
    ///
    /// The entry records the current stacks and dynamic extent.
    /// A raise aimed at it is acted upon by [`recover`][`Self::recover`].
    pub fn install(&mut self, handler: Value) -> Result<RescueHandle, Fatal>
    {
        let owner = self.serial();
        self.install_entry(handler, self.frames.len(), Resume::Native, owner)
    }

    pub(crate) fn install_entry(
        &mut self,
        handler: Value,
        frames: usize,
        resume: Resume,
        owner: u64,
    ) -> Result<RescueHandle, Fatal>
    {
        let entry = RescueEntry{
            handler,
            sp: self.stack.len(),
            frames,
            block: self.blocks.current(),
            resume,
            owner,
        };
        let handle = self.rescue.push(entry).map_err(|f| self.fatal(f))?;
        trace!(target: "fubuki::rescue", "install {handle:?}");
        Ok(handle)
    }

    /// Uninstall a handler after the protected region completed.
    ///
    /// Only the topmost entry may be uninstalled;
    /// anything else is fatal.
    pub fn uninstall(&mut self, handle: RescueHandle) -> Result<(), Fatal>
    {
        self.rescue.remove(handle).map_err(|f| self.fatal(f))?;
        trace!(target: "fubuki::rescue", "uninstall {handle:?}");
        Ok(())
    }

    /// Start raising a condition.
    ///
    /// The returned escape must be propagated to unwind the stacks.
    ///
    /// # Examples
    ///
    /// ```
    /// # use fubuki::{Escape, Runtime, Value};
    /// # let mut runtime = Runtime::open();
    /// let escape = runtime.raise(Value::Int(1));
    /// assert_eq!(escape, Escape::Raise(Value::Int(1)));
    /// ```
    pub fn raise(&mut self, condition: Value) -> Escape
    {
        trace!(target: "fubuki::rescue", "raise {condition}");
        Escape::Raise(condition)
    }

    /// Act on an escape that reached the scope that installed `handle`.
    ///
    /// A raise aimed at the entry unwinds to it, pops it and applies its
    /// handler; the handler's result is returned. Any other escape is
    /// passed on after uninstalling the entry, if it is still installed.
    pub fn recover(&mut self, handle: RescueHandle, escape: Escape)
        -> Result<Value, Escape>
    {
        match escape {
            Escape::Raise(condition) if self.rescue.is_top(handle) =>
                self.catch(condition),
            other => {
                if self.rescue.is_top(handle) {
                    self.rescue.pop();
                }
                Err(other)
            },
        }
    }

    /// Run `body` with `handler` installed.
    ///
    /// If `body` raises a condition, the handler is applied to it
    /// and its result becomes the result of this call.
    pub fn rescue<F>(&mut self, handler: Value, body: F) -> Result<Value, Escape>
        where F: FnOnce(&mut Self) -> Result<Value, Escape>
    {
        self.protect(handler)?;
        let handle = self.install(handler)?;
        match body(self) {
            Ok(value) => {
                self.uninstall(handle)?;
                Ok(value)
            },
            Err(escape) => self.recover(handle, escape),
        }
    }

    /// Unwind to the topmost entry, pop it and apply its handler.
    pub(crate) fn catch(&mut self, condition: Value) -> Result<Value, Escape>
    {
        let entry = match self.rescue.pop() {
            Some(entry) => entry,
            None => return Err(Escape::Raise(condition)),
        };

        self.protect(condition)?;
        self.protect(entry.handler)?;

        self.frames.truncate(entry.frames);
        self.stack.truncate(entry.sp);
        trace!(
            target: "fubuki::rescue",
            "unwound to {} values and {} frames",
            entry.sp, entry.frames,
        );

        self.rewind(entry.block)?;
        self.apply(entry.handler, &[condition])
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, crate::block::BlockTable};

    fn entry(frames: usize, owner: u64) -> RescueEntry
    {
        RescueEntry{
            handler: Value::Nil,
            sp: 0,
            frames,
            block: BlockTable::ROOT,
            resume: Resume::Native,
            owner,
        }
    }

    #[test]
    fn remove_out_of_order()
    {
        let mut stack = RescueStack::new(4);
        let a = stack.push(entry(0, 1)).unwrap();
        let b = stack.push(entry(0, 2)).unwrap();
        assert_eq!(
            stack.remove(a),
            Err(Fatal::RescueOrder{handle: 0, depth: 2}),
        );
        stack.remove(b).unwrap();
        stack.remove(a).unwrap();
        assert_eq!(stack.len(), 0);
    }

    #[test]
    fn handles_of_popped_entries_are_stale()
    {
        let mut stack = RescueStack::new(4);
        let a = stack.push(entry(0, 1)).unwrap();
        stack.pop();
        let b = stack.push(entry(0, 2)).unwrap();
        assert!(!stack.is_top(a));
        assert!(stack.is_top(b));
    }

    #[test]
    fn push_beyond_capacity()
    {
        let mut stack = RescueStack::new(1);
        stack.push(entry(0, 1)).unwrap();
        assert_eq!(
            stack.push(entry(0, 1)).map(|_| ()),
            Err(Fatal::RescueOverflow{capacity: 1}),
        );
    }

    #[test]
    fn pop_installed_by_checks_frame_and_owner()
    {
        let mut stack = RescueStack::new(4);
        stack.push(entry(3, 7)).unwrap();
        assert!(stack.pop_installed_by(2, 7).is_err());
        assert!(stack.pop_installed_by(3, 8).is_err());
        stack.pop_installed_by(3, 7).unwrap();
        assert!(stack.pop_installed_by(3, 7).is_err());
    }

    #[test]
    fn restore_moves_outermost_owner()
    {
        let mut stack = RescueStack::new(4);
        let handle = stack.push(entry(1, 5)).unwrap();
        let saved = [entry(1, 5), entry(2, 9)];
        stack.restore(&saved, 5, 6);
        let owners = stack.entries().iter().map(|e| e.owner).collect::<Vec<_>>();
        assert_eq!(owners, [6, 9]);
        assert!(!stack.is_top(handle.remap(5, 6)));
        stack.pop();
        assert!(stack.is_top(handle.remap(5, 6)));
        assert!(!stack.is_top(handle));
    }
}
