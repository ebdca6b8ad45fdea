//! Command-pattern undo history.
//!
//! Commands are plain data: each one names the key it touched and owns the
//! state needed to reverse it. Interpreting a reversal is left to the owner
//! of the stack, so this module has no dependency on the store.

mod command;
mod stack;

pub use command::{Command, CommandSet, GenericCommand};
pub use stack::UndoStack;
