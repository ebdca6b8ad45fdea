//! Undoable commands: a single keyed reversal or a group of them.

/// One reversible action on one key.
///
/// `action` is the owned state needed to reverse the change (for the store,
/// the document that was replaced or deleted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericCommand<K, A> {
    target: K,
    action: A,
}

impl<K, A> GenericCommand<K, A> {
    /// Create a command that reverses `action` on `target`.
    pub const fn new(target: K, action: A) -> Self {
        Self { target, action }
    }

    /// The key this command touches.
    pub const fn target(&self) -> &K {
        &self.target
    }

    /// Split into key and reversal state.
    pub fn into_parts(self) -> (K, A) {
        (self.target, self.action)
    }
}

/// Several commands sharing one undo boundary.
///
/// Undone together by [`Command::Group`] on a plain undo, or one at a time by
/// [`take`](Self::take) when undoing a specific key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet<K, A> {
    commands: Vec<GenericCommand<K, A>>,
}

impl<K, A> Default for CommandSet<K, A> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
        }
    }
}

impl<K: PartialEq, A> CommandSet<K, A> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command to the set.
    pub fn add(&mut self, command: GenericCommand<K, A>) {
        self.commands.push(command);
    }

    /// Whether any command in the set touches `key`.
    pub fn contains_target(&self, key: &K) -> bool {
        self.commands.iter().any(|c| c.target() == key)
    }

    /// Remove and return the command touching `key`.
    pub fn take(&mut self, key: &K) -> Option<GenericCommand<K, A>> {
        let index = self.commands.iter().position(|c| c.target() == key)?;
        Some(self.commands.remove(index))
    }

    /// Number of commands left in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether every command has been taken out of the set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Iterate over the commands in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &GenericCommand<K, A>> {
        self.commands.iter()
    }

    /// Consume the set, yielding its commands.
    pub fn into_commands(self) -> Vec<GenericCommand<K, A>> {
        self.commands
    }
}

/// An entry on the undo stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<K, A> {
    /// A single keyed reversal.
    Single(GenericCommand<K, A>),
    /// A group that undoes as a unit.
    Group(CommandSet<K, A>),
}

impl<K: PartialEq, A> Command<K, A> {
    /// Whether this command touches `key`.
    pub fn touches(&self, key: &K) -> bool {
        match self {
            Self::Single(command) => command.target() == key,
            Self::Group(set) => set.contains_target(key),
        }
    }

    /// Number of keyed reversals in this command.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Group(set) => set.len(),
        }
    }

    /// Whether this command reverses nothing (an emptied group).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
