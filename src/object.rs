//! Per-object state: the field map of visible operations, the RGA
//! insertion/following maps, and the list-order index for sequences.

use crate::list_index::ListIndex;
use crate::op::{ElemId, Key, ObjType, OpId};
use fxhash::FxHashMap;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ObjectState {
    pub obj_type: ObjType,
    fields: FxHashMap<Key, Vec<OpId>>,
    inbound: HashSet<OpId>,
    insertion_parent: FxHashMap<ElemId, ElemId>,
    following: FxHashMap<ElemId, Vec<OpId>>,
    pub index: ListIndex,
}

impl ObjectState {
    pub fn new(obj_type: ObjType) -> Self {
        Self {
            obj_type,
            fields: FxHashMap::default(),
            inbound: HashSet::new(),
            insertion_parent: FxHashMap::default(),
            following: FxHashMap::default(),
            index: ListIndex::new(),
        }
    }

    pub fn visible_ops(&self, key: &Key) -> &[OpId] {
        self.fields.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_visible_ops(&mut self, key: Key, ops: Vec<OpId>) {
        if ops.is_empty() {
            self.fields.remove(&key);
        } else {
            self.fields.insert(key, ops);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.fields.keys()
    }

    pub fn add_inbound(&mut self, op: OpId) {
        self.inbound.insert(op);
    }

    pub fn remove_inbound(&mut self, op: &OpId) {
        self.inbound.remove(op);
    }

    pub fn inbound(&self) -> &HashSet<OpId> {
        &self.inbound
    }

    /// Record that `op_id` was inserted immediately after `parent`.
    pub fn register_insert(&mut self, parent: ElemId, op_id: OpId) {
        let elem = ElemId::Id(op_id.clone());
        self.insertion_parent.insert(elem, parent.clone());
        self.following.entry(parent).or_default().push(op_id);
    }

    fn sorted_children(&self, parent: &ElemId) -> Vec<OpId> {
        let mut children = self.following.get(parent).cloned().unwrap_or_default();
        children.sort_by(|a, b| b.cmp(a));
        children
    }

    fn last_descendant(&self, elem: &ElemId) -> ElemId {
        let children = self.sorted_children(elem);
        match children.last() {
            Some(last) => self.last_descendant(&ElemId::Id(last.clone())),
            None => elem.clone(),
        }
    }

    /// First descendant of `elem` in document order, or the next sibling of
    /// the nearest ancestor that has one. `None` signals end-of-document.
    pub fn get_next(&self, elem: &ElemId) -> Option<ElemId> {
        let children = self.sorted_children(elem);
        if let Some(first) = children.first() {
            return Some(ElemId::Id(first.clone()));
        }

        let mut current = elem.clone();
        loop {
            let parent = match &current {
                ElemId::Head => return None,
                ElemId::Id(_) => self.insertion_parent.get(&current)?.clone(),
            };
            let siblings = self.sorted_children(&parent);
            let cur_id = match &current {
                ElemId::Id(id) => id.clone(),
                ElemId::Head => unreachable!(),
            };
            let pos = siblings.iter().position(|o| *o == cur_id)?;
            if pos + 1 < siblings.len() {
                return Some(ElemId::Id(siblings[pos + 1].clone()));
            }
            current = parent;
        }
    }

    /// The element immediately before `elem` in document order. `None`
    /// signals the start of the document (i.e. `elem` is the head).
    pub fn get_previous(&self, elem: &ElemId) -> Option<ElemId> {
        let parent = match elem {
            ElemId::Head => return None,
            ElemId::Id(_) => self.insertion_parent.get(elem)?.clone(),
        };
        let siblings = self.sorted_children(&parent);
        let cur_id = match elem {
            ElemId::Id(id) => id.clone(),
            ElemId::Head => unreachable!(),
        };
        let pos = siblings.iter().position(|o| *o == cur_id)?;
        if pos == 0 {
            Some(parent)
        } else {
            Some(self.last_descendant(&ElemId::Id(siblings[pos - 1].clone())))
        }
    }
}
