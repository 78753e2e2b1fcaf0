//! Transaction Savepoints
//!
//! Tracks the stack of open savepoints for a session and hands out
//! sequential names (`sp_1`, `sp_2`, ...).

use crate::backends::Savepoint;
use crate::error::{FlexError, FlexResult};

/// Savepoint bookkeeping shared by the session backends
#[derive(Debug, Default)]
pub struct SavepointManager {
    created: u32,
    open: Vec<Savepoint>,
}

impl SavepointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate and push a new savepoint
    pub fn push(&mut self) -> Savepoint {
        self.created += 1;
        let savepoint = Savepoint::new(format!("sp_{}", self.created));
        self.open.push(savepoint.clone());
        savepoint
    }

    /// Pop `savepoint` and every savepoint opened after it
    ///
    /// Returns the stack depth the savepoint occupied.
    pub fn pop(&mut self, savepoint: &Savepoint) -> FlexResult<usize> {
        let depth = self
            .open
            .iter()
            .rposition(|s| s == savepoint)
            .ok_or_else(|| {
                FlexError::Storage(format!("savepoint \"{}\" does not exist", savepoint.name()))
            })?;
        self.open.truncate(depth);
        Ok(depth)
    }

    /// Forget all open savepoints (outer transaction ended)
    pub fn clear(&mut self) {
        self.open.clear();
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }
}
