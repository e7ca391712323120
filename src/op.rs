//! Operation identifiers, object/element/key addressing, and the operation
//! schema itself — the vocabulary every other module is built from.

use crate::actor::ActorId;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

/// `(counter, actor)`. Lamport-ordered: counter first, then actor.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct OpId {
    pub counter: u64,
    pub actor: Rc<ActorId>,
}

impl OpId {
    pub fn new(counter: u64, actor: Rc<ActorId>) -> Self {
        Self { counter, actor }
    }
}

impl Ord for OpId {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.counter.cmp(&other.counter) {
            Ordering::Equal => self.actor.cmp(&other.actor),
            ord => ord,
        }
    }
}

impl PartialOrd for OpId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.counter, self.actor.to_hex_string())
    }
}

/// Object addressing: the root is a distinguished sentinel that sorts before
/// every other object.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ObjId {
    Root,
    Id(OpId),
}

impl Ord for ObjId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ObjId::Root, ObjId::Root) => Ordering::Equal,
            (ObjId::Root, ObjId::Id(_)) => Ordering::Less,
            (ObjId::Id(_), ObjId::Root) => Ordering::Greater,
            (ObjId::Id(a), ObjId::Id(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for ObjId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<OpId> for ObjId {
    fn from(id: OpId) -> Self {
        ObjId::Id(id)
    }
}

/// Identifies a list/text element: either the sentinel "before everything"
/// head, or the op id of the insert that created the element.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum ElemId {
    Head,
    Id(OpId),
}

impl Ord for ElemId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ElemId::Head, ElemId::Head) => Ordering::Equal,
            (ElemId::Head, ElemId::Id(_)) => Ordering::Less,
            (ElemId::Id(_), ElemId::Head) => Ordering::Greater,
            (ElemId::Id(a), ElemId::Id(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for ElemId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The key an operation targets: a map property name, or a list/text
/// element. Comparing a `Map` key against a `Seq` key is a logic error.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Key {
    Map(String),
    Seq(ElemId),
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Map(a), Key::Map(b)) => a.cmp(b),
            (Key::Seq(a), Key::Seq(b)) => a.cmp(b),
            _ => panic!("cannot compare a map key against a sequence key"),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ObjType {
    Map,
    Table,
    List,
    Text,
}

impl ObjType {
    pub fn is_sequence(&self) -> bool {
        matches!(self, ObjType::List | ObjType::Text)
    }
}

/// A scalar value carried by a `set` operation. The tag byte described in
/// SPEC_FULL.md §4.2.1 mirrors this enum's discriminant order.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Counter(i64),
    Int(i64),
    Uint(u64),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpType {
    Make(ObjType),
    Del,
    Inc(i64),
    Set(ScalarValue),
    /// Re-parents an existing object under this op's `(obj, key)` without
    /// creating a new one; the payload is the linked object's id.
    Link(ObjId),
}

/// One CRDT operation. `pred` names the prior visible operations at this
/// `(obj, key)` that this operation supersedes.
#[derive(Debug, Clone)]
pub struct Op {
    pub id: OpId,
    pub action: OpType,
    pub obj: ObjId,
    pub key: Key,
    pub insert: bool,
    pub pred: Vec<OpId>,
    pub succ: Vec<OpId>,
}

impl Op {
    pub fn is_del(&self) -> bool {
        matches!(self.action, OpType::Del)
    }

    pub fn is_inc(&self) -> bool {
        matches!(self.action, OpType::Inc(_))
    }

    /// True if applying this op supersedes (overwrites) `other`.
    pub fn overwrites(&self, other: &OpId) -> bool {
        self.pred.contains(other)
    }

    /// The element id this op introduces, if it is an insert.
    pub fn elemid(&self) -> Option<ElemId> {
        if self.insert {
            Some(ElemId::Id(self.id.clone()))
        } else {
            None
        }
    }
}

/// A 32-byte SHA-256 change hash; the identity of a change.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ChangeHash(pub [u8; 32]);

impl fmt::Display for ChangeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ChangeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChangeHash({})", hex::encode(self.0))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ParseChangeHashError {
    #[error("change hashes must be exactly 32 bytes, got {0}")]
    WrongLength(usize),
    #[error("change hashes must be valid hex")]
    InvalidHex,
}

impl std::str::FromStr for ChangeHash {
    type Err = ParseChangeHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| ParseChangeHashError::InvalidHex)?;
        ChangeHash::try_from(bytes.as_slice())
    }
}

impl TryFrom<&[u8]> for ChangeHash {
    type Error = ParseChangeHashError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        if bytes.len() != 32 {
            return Err(ParseChangeHashError::WrongLength(bytes.len()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(ChangeHash(arr))
    }
}
