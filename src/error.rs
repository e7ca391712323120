use crate::op::{ChangeHash, ObjId};
use std::io;
use thiserror::Error;

/// Errors produced while decoding wire bytes: changes, sync messages, sync state,
/// or the primitive column encodings underneath them.
#[derive(Error, Debug)]
pub enum DecodingError {
    #[error("tried to read past the end of the buffer")]
    TryingToReadPastEnd,

    #[error("expected one of {expected_one_of:?}, found {found}")]
    WrongType { expected_one_of: Vec<u8>, found: u8 },

    #[error("leb128 value did not fit in the target integer width")]
    Overflow,

    #[error("not enough bytes remaining to read this value")]
    NotEnoughBytes,

    #[error("wrong magic bytes for this format")]
    WrongMagicBytes,

    #[error("columns were not in ascending order: last {last}, found {found}")]
    ColumnsNotInAscendingOrder { last: u32, found: u32 },

    #[error("checksum mismatch: found {found:x?}, calculated {calculated:x?}")]
    InvalidChecksum { found: Vec<u8>, calculated: Vec<u8> },

    #[error("invalid change: {0}")]
    InvalidChange(String),

    #[error("leb128 decode error: {0}")]
    Leb128(#[from] leb128::read::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by the op-set state machine while applying a (structurally
/// well-formed) change.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("operation referenced unknown object {0:?}")]
    UnknownObject(ObjId),

    #[error("duplicate operation id encountered while applying a change")]
    DuplicateOpId,

    #[error("change has seq {found} but actor's next expected seq is {expected}")]
    InvalidSeq { expected: u64, found: u64 },

    #[error("change has startOp {found} but expected {expected}")]
    InvalidStartOp { expected: u64, found: u64 },

    #[error("change depended on a predecessor by the same actor that was never applied")]
    MissingSameActorPredecessor,

    #[error("get_changes was called with an unknown hash in `since`: {0}")]
    UnknownHead(ChangeHash),

    #[error("list/text object has an element with no assigned index")]
    UnindexedElement,

    #[error("decoding error: {0}")]
    Decoding(#[from] DecodingError),
}

#[derive(Error, Debug)]
pub enum ParseActorIdError {
    #[error("actor ids must be valid hex, got {0:?}")]
    InvalidHex(String),
}

impl From<hex::FromHexError> for ParseActorIdError {
    fn from(_: hex::FromHexError) -> Self {
        ParseActorIdError::InvalidHex(String::new())
    }
}

#[derive(Error, Debug)]
#[error("invalid actor id bytes: expected at most {max} bytes, got {found}")]
pub struct InvalidActorId {
    pub max: usize,
    pub found: usize,
}
