//! Undo.
//!
//! Each command on the undo stack owns the state needed to reverse one
//! change to one key. Undoing always clears the key first and then restores
//! the captured document, if any, stamped with the time of the undo.

use tracing::info;

use crate::document::{Document, DocumentKey};
use crate::store::{DocumentStore, StoreError};
use crate::undo::{Command, GenericCommand};

/// How to reverse a change to one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reversal {
    /// Reverse a put: drop the new document and restore the one it replaced.
    RemovePut { previous: Option<Document> },
    /// Reverse a delete.
    RestoreDeleted { document: Document },
}

impl Reversal {
    fn into_restored(self) -> Option<Document> {
        match self {
            Self::RemovePut { previous } => previous,
            Self::RestoreDeleted { document } => Some(document),
        }
    }
}

impl DocumentStore {
    /// Undo the most recent command. A group undoes as a unit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NothingToUndo`] on an empty stack. If a target
    /// of the command cannot be paged in, the command stays on the stack.
    pub fn undo(&mut self) -> Result<(), StoreError> {
        let targets: Vec<DocumentKey> = match self.history.peek() {
            None => return Err(StoreError::NothingToUndo),
            Some(Command::Single(command)) => vec![command.target().clone()],
            Some(Command::Group(set)) => set.iter().map(|c| c.target().clone()).collect(),
        };
        for key in &targets {
            self.load(key)?;
        }

        let command = self.history.pop().ok_or(StoreError::NothingToUndo)?;
        let now = self.tick();
        match command {
            Command::Single(command) => self.apply(command, now)?,
            Command::Group(set) => {
                for command in set.into_commands() {
                    self.apply(command, now)?;
                }
            }
        }
        info!(keys = targets.len(), "undid last command");
        self.settle_memory();
        Ok(())
    }

    /// Undo the most recent change to `key`, leaving every other command in
    /// place. Undoing one key of a group removes it from the group, and the
    /// group once it is empty.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoUndoForKey`] if no command touches `key`.
    pub fn undo_key(&mut self, key: &DocumentKey) -> Result<(), StoreError> {
        let depth = self
            .history
            .depth_of(|command| command.touches(key))
            .ok_or_else(|| StoreError::NoUndoForKey(key.clone()))?;
        self.load(key)?;

        let command = match self.history.get_mut(depth) {
            Some(Command::Group(set)) => {
                let command = set.take(key);
                if set.is_empty() {
                    self.history.remove(depth);
                }
                command
            }
            Some(Command::Single(_)) => match self.history.remove(depth) {
                Some(Command::Single(command)) => Some(command),
                _ => None,
            },
            None => None,
        };
        let command = command.ok_or_else(|| StoreError::NoUndoForKey(key.clone()))?;

        let now = self.tick();
        self.apply(command, now)?;
        info!(%key, depth, "undid command for key");
        self.settle_memory();
        Ok(())
    }

    fn apply(
        &mut self,
        command: GenericCommand<DocumentKey, Reversal>,
        now: u64,
    ) -> Result<(), StoreError> {
        let (key, reversal) = command.into_parts();
        self.delete_one(&key)?;
        if let Some(mut document) = reversal.into_restored() {
            document.set_last_use(now);
            self.insert_document(document)?;
        }
        Ok(())
    }
}
