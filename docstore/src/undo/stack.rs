//! LIFO stack of undoable commands.

/// A stack of commands, newest on top.
#[derive(Debug)]
pub struct UndoStack<T> {
    entries: Vec<T>,
}

impl<T> Default for UndoStack<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> UndoStack<T> {
    /// Create an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a command on top of the stack.
    pub fn push(&mut self, command: T) {
        self.entries.push(command);
    }

    /// Remove and return the newest command.
    pub fn pop(&mut self) -> Option<T> {
        self.entries.pop()
    }

    /// The newest command, without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.entries.last()
    }

    /// Number of commands on the stack.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Depth of the newest command matching `predicate`, counted from the top
    /// (0 is the top of the stack).
    pub fn depth_of<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&T) -> bool,
    {
        self.entries.iter().rev().position(predicate)
    }

    /// Mutable access to the command `depth` entries below the top.
    pub fn get_mut(&mut self, depth: usize) -> Option<&mut T> {
        let index = self.index_of(depth)?;
        self.entries.get_mut(index)
    }

    /// Remove the command `depth` entries below the top.
    ///
    /// Commands above and below it keep their relative order.
    pub fn remove(&mut self, depth: usize) -> Option<T> {
        let index = self.index_of(depth)?;
        Some(self.entries.remove(index))
    }

    /// Iterate from the newest command to the oldest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().rev()
    }

    fn index_of(&self, depth: usize) -> Option<usize> {
        self.entries.len().checked_sub(depth + 1)
    }
}
