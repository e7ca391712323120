//! The patch produced by applying a change: a flat log of the structural
//! edits an embedder's reactive view needs to replay.

use crate::op::{Key, ObjId, ObjType, ScalarValue};

#[derive(Debug, Clone, PartialEq)]
pub enum PatchValue {
    Scalar(ScalarValue),
    Object(ObjId, ObjType),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchEvent {
    Put {
        obj: ObjId,
        key: Key,
        value: PatchValue,
    },
    Delete {
        obj: ObjId,
        key: Key,
    },
    Insert {
        obj: ObjId,
        index: usize,
        value: PatchValue,
    },
    Remove {
        obj: ObjId,
        index: usize,
    },
    Increment {
        obj: ObjId,
        key: Key,
        delta: i64,
    },
}

/// Structural description of everything a single `apply_changes` call
/// touched, in the order operations were applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub events: Vec<PatchEvent>,
}

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: PatchEvent) {
        self.events.push(event);
    }

    pub fn extend(&mut self, other: Patch) {
        self.events.extend(other.events);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
