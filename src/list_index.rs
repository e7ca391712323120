//! Order-statistics index over list/text element ids: maps element id to
//! positional index and back, backing the RGA traversal in [`crate::object`].

use crate::op::ElemId;
use fxhash::FxHashMap;

/// An ordered sequence of element ids with index <-> id lookup in both
/// directions. Implemented as a plain vector with a reverse-lookup map;
/// insert/remove are O(n) (shifting the tail and its cached indices), which
/// is adequate for the document sizes this engine targets. A production
/// implementation under heavier list-mutation load would replace this with
/// an order-statistics B-tree, the way the op-tree in a mature op-set keeps
/// per-node subtree lengths to answer `index_of` in O(log n).
#[derive(Debug, Clone, Default)]
pub struct ListIndex {
    order: Vec<ElemId>,
    positions: FxHashMap<ElemId, usize>,
}

impl ListIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn index_of(&self, elem: &ElemId) -> Option<usize> {
        self.positions.get(elem).copied()
    }

    pub fn elem_at(&self, index: usize) -> Option<&ElemId> {
        self.order.get(index)
    }

    pub fn insert_at(&mut self, index: usize, elem: ElemId) {
        self.order.insert(index, elem.clone());
        for (id, pos) in self.positions.iter_mut() {
            if *pos >= index && *id != elem {
                *pos += 1;
            }
        }
        self.positions.insert(elem, index);
    }

    pub fn remove_at(&mut self, index: usize) -> Option<ElemId> {
        if index >= self.order.len() {
            return None;
        }
        let elem = self.order.remove(index);
        self.positions.remove(&elem);
        for pos in self.positions.values_mut() {
            if *pos > index {
                *pos -= 1;
            }
        }
        Some(elem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorId;
    use crate::op::OpId;
    use std::rc::Rc;

    fn elem(counter: u64) -> ElemId {
        ElemId::Id(OpId::new(counter, Rc::new(ActorId::from(vec![1u8; 16]))))
    }

    #[test]
    fn insert_and_lookup() {
        let mut idx = ListIndex::new();
        idx.insert_at(0, elem(1));
        idx.insert_at(1, elem(2));
        idx.insert_at(1, elem(3));
        assert_eq!(idx.index_of(&elem(1)), Some(0));
        assert_eq!(idx.index_of(&elem(3)), Some(1));
        assert_eq!(idx.index_of(&elem(2)), Some(2));
        assert_eq!(idx.elem_at(1), Some(&elem(3)));
    }

    #[test]
    fn remove_shifts_later_indices() {
        let mut idx = ListIndex::new();
        idx.insert_at(0, elem(1));
        idx.insert_at(1, elem(2));
        idx.insert_at(2, elem(3));
        idx.remove_at(0);
        assert_eq!(idx.index_of(&elem(2)), Some(0));
        assert_eq!(idx.index_of(&elem(3)), Some(1));
        assert_eq!(idx.len(), 2);
    }
}
