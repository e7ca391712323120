//! Actor identifiers and the generic intern table used to assign them (and
//! interned strings) compact per-change indices.

use crate::error::ParseActorIdError;
use fxhash::FxHashMap;
use std::fmt;
use std::hash::Hash;
use tinyvec::TinyVec;

/// Opaque replica identifier. Inline-stored up to 16 bytes, the common case
/// for a UUIDv4; spills to the heap for anything longer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(TinyVec<[u8; 16]>);

impl ActorId {
    pub fn random() -> Self {
        let uuid = uuid::Uuid::new_v4();
        ActorId(TinyVec::from(*uuid.as_bytes()))
    }

    pub fn to_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn to_hex_string(&self) -> String {
        hex::encode(self.0.as_slice())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

impl From<&[u8]> for ActorId {
    fn from(bytes: &[u8]) -> Self {
        let mut tv: TinyVec<[u8; 16]> = TinyVec::with_capacity(bytes.len());
        tv.extend(bytes.iter().copied());
        ActorId(tv)
    }
}

impl From<Vec<u8>> for ActorId {
    fn from(bytes: Vec<u8>) -> Self {
        ActorId::from(bytes.as_slice())
    }
}

impl TryFrom<&str> for ActorId {
    type Error = ParseActorIdError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let bytes =
            hex::decode(s).map_err(|_| ParseActorIdError::InvalidHex(s.to_string()))?;
        Ok(ActorId::from(bytes))
    }
}

/// Push-or-lookup intern table: assigns every distinct `T` a stable index on
/// first insertion and reuses it afterwards. Used to turn actor ids and
/// string map-keys into small integers for the columnar codec.
#[derive(Debug, Clone, Default)]
pub struct IndexedCache<T> {
    cache: Vec<T>,
    lookup: FxHashMap<T, usize>,
}

impl<T> IndexedCache<T>
where
    T: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            cache: Vec::new(),
            lookup: FxHashMap::default(),
        }
    }

    /// Intern `item`, returning its index (existing or newly assigned).
    pub fn cache(&mut self, item: T) -> usize {
        if let Some(idx) = self.lookup.get(&item) {
            *idx
        } else {
            let idx = self.cache.len();
            self.cache.push(item.clone());
            self.lookup.insert(item, idx);
            idx
        }
    }

    pub fn lookup(&self, item: &T) -> Option<usize> {
        self.lookup.get(item).copied()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.cache.get(index)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.cache.iter()
    }
}

impl<T> IndexedCache<T>
where
    T: Clone + Eq + Hash + Ord,
{
    /// Indices in the sorted order of the interned values, used to build a
    /// canonical (e.g. lexicographic-actor) ordering for the wire format.
    pub fn sorted(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.cache.len()).collect();
        indices.sort_by(|a, b| self.cache[*a].cmp(&self.cache[*b]));
        indices
    }
}

impl<T> std::ops::Index<usize> for IndexedCache<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.cache[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_id_hex_roundtrip() {
        let a = ActorId::random();
        let hex = a.to_hex_string();
        let b = ActorId::try_from(hex.as_str()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn indexed_cache_dedupes() {
        let mut cache: IndexedCache<String> = IndexedCache::new();
        let a = cache.cache("alpha".to_string());
        let b = cache.cache("beta".to_string());
        let a2 = cache.cache("alpha".to_string());
        assert_eq!(a, a2);
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn indexed_cache_sorted_order() {
        let mut cache: IndexedCache<String> = IndexedCache::new();
        cache.cache("zeta".to_string());
        cache.cache("alpha".to_string());
        cache.cache("mu".to_string());
        let sorted = cache.sorted();
        let values: Vec<&String> = sorted.iter().map(|i| &cache[*i]).collect();
        assert_eq!(values, vec!["alpha", "mu", "zeta"]);
    }
}
