//! The op-set state machine: applies individual operations to per-object
//! state, resolving conflicts and maintaining the list-order index.

use crate::change::Change;
use crate::error::EngineError;
use crate::object::ObjectState;
use crate::op::{ElemId, Key, ObjId, ObjType, Op, OpId, OpType, ScalarValue};
use crate::patch::{Patch, PatchEvent, PatchValue};
use fxhash::FxHashMap;
use std::collections::HashSet;
use tracing::instrument;

#[derive(Debug, Default)]
pub struct OpSet {
    objects: FxHashMap<ObjId, ObjectState>,
    op_store: FxHashMap<OpId, Op>,
    counter_deltas: FxHashMap<OpId, i64>,
}

impl OpSet {
    pub fn new() -> Self {
        let mut objects = FxHashMap::default();
        objects.insert(ObjId::Root, ObjectState::new(ObjType::Map));
        Self {
            objects,
            op_store: FxHashMap::default(),
            counter_deltas: FxHashMap::default(),
        }
    }

    pub fn object(&self, id: &ObjId) -> Option<&ObjectState> {
        self.objects.get(id)
    }

    /// The effective value of a `set`/`inc`-target op, folding in any
    /// increments applied to it.
    pub fn effective_value(&self, op_id: &OpId) -> Option<ScalarValue> {
        let op = self.op_store.get(op_id)?;
        match &op.action {
            OpType::Set(ScalarValue::Counter(base)) => {
                let delta = self.counter_deltas.get(op_id).copied().unwrap_or(0);
                Some(ScalarValue::Counter(base + delta))
            }
            OpType::Set(v) => Some(v.clone()),
            OpType::Make(_) | OpType::Del | OpType::Inc(_) | OpType::Link(_) => None,
        }
    }

    /// The child object a `make*`/`link` op references: the op's own id for
    /// `make*` (which mints a new object), or the existing target for
    /// `link` (which re-parents one). Used to keep `ObjectState::inbound`
    /// in sync as ops are superseded and re-applied.
    fn linked_child(action: &OpType, op_id: &OpId) -> Option<ObjId> {
        match action {
            OpType::Make(_) => Some(ObjId::Id(op_id.clone())),
            OpType::Link(target) => Some(target.clone()),
            OpType::Set(_) | OpType::Del | OpType::Inc(_) => None,
        }
    }

    /// Apply every operation of `change` in order, accumulating a patch.
    #[instrument(level = "debug", skip(self, change), fields(n_ops = change.ops.len()))]
    pub fn apply_change(&mut self, change: &Change) -> Result<Patch, EngineError> {
        let mut patch = Patch::new();
        for op in &change.ops {
            self.apply_op(op.clone(), &mut patch)?;
        }
        Ok(patch)
    }

    fn find_insert_position(&self, obj: &ObjectState, elem: &ElemId) -> usize {
        let mut current = elem.clone();
        loop {
            match obj.get_previous(&current) {
                Some(prev) => {
                    if let Some(idx) = obj.index.index_of(&prev) {
                        return idx + 1;
                    }
                    current = prev;
                }
                None => return 0,
            }
        }
    }

    fn apply_op(&mut self, op: Op, patch: &mut Patch) -> Result<(), EngineError> {
        if !self.objects.contains_key(&op.obj) {
            return Err(EngineError::UnknownObject(op.obj.clone()));
        }

        if let OpType::Make(obj_type) = &op.action {
            let child_id = ObjId::Id(op.id.clone());
            self.objects
                .entry(child_id)
                .or_insert_with(|| ObjectState::new(*obj_type));
        }

        if op.insert {
            let parent_elem = match &op.key {
                Key::Seq(e) => e.clone(),
                Key::Map(_) => {
                    return Err(EngineError::Decoding(
                        crate::error::DecodingError::InvalidChange(
                            "insert op cannot target a map key".into(),
                        ),
                    ))
                }
            };
            let obj = self.objects.get_mut(&op.obj).expect("checked above");
            obj.register_insert(parent_elem, op.id.clone());
        }

        let logical_key = if op.insert {
            Key::Seq(ElemId::Id(op.id.clone()))
        } else {
            op.key.clone()
        };

        let pred_set: HashSet<OpId> = op.pred.iter().cloned().collect();

        if let OpType::Inc(delta) = &op.action {
            let obj = self.objects.get(&op.obj).expect("checked above");
            let current = obj.visible_ops(&logical_key).to_vec();
            for existing_id in &current {
                if pred_set.contains(existing_id) {
                    if let Some(existing_op) = self.op_store.get(existing_id) {
                        if matches!(existing_op.action, OpType::Set(ScalarValue::Counter(_))) {
                            *self.counter_deltas.entry(existing_id.clone()).or_insert(0) +=
                                *delta;
                            patch.push(PatchEvent::Increment {
                                obj: op.obj.clone(),
                                key: logical_key.clone(),
                                delta: *delta,
                            });
                        }
                    }
                }
            }
            self.op_store.insert(op.id.clone(), op);
            return Ok(());
        }

        let obj = self.objects.get(&op.obj).expect("checked above");
        let current = obj.visible_ops(&logical_key).to_vec();

        let (overwritten, mut remaining): (Vec<OpId>, Vec<OpId>) =
            current.into_iter().partition(|id| pred_set.contains(id));

        for overwritten_id in &overwritten {
            if let Some(overwritten_op) = self.op_store.get(overwritten_id) {
                if let Some(child) = Self::linked_child(&overwritten_op.action, overwritten_id) {
                    if let Some(child_state) = self.objects.get_mut(&child) {
                        child_state.remove_inbound(overwritten_id);
                    }
                }
            }
        }

        let appends_self = matches!(
            &op.action,
            OpType::Set(_) | OpType::Make(_) | OpType::Link(_)
        );
        if appends_self {
            if let Some(child) = Self::linked_child(&op.action, &op.id) {
                if let Some(child_state) = self.objects.get_mut(&child) {
                    child_state.add_inbound(op.id.clone());
                }
            }
            remaining.push(op.id.clone());
        }

        remaining.sort_by(|a, b| b.cmp(a));

        let patch_value = match &op.action {
            OpType::Set(v) => Some(PatchValue::Scalar(v.clone())),
            OpType::Make(obj_type) => {
                Some(PatchValue::Object(ObjId::Id(op.id.clone()), *obj_type))
            }
            OpType::Link(target) => self
                .objects
                .get(target)
                .map(|state| PatchValue::Object(target.clone(), state.obj_type)),
            _ => None,
        };

        let is_sequence = matches!(&logical_key, Key::Seq(_)) && {
            let obj = self.objects.get(&op.obj).expect("checked above");
            obj.obj_type.is_sequence()
        };

        if is_sequence {
            let elem = match &logical_key {
                Key::Seq(e) => e.clone(),
                Key::Map(_) => unreachable!(),
            };
            let was_indexed = {
                let obj = self.objects.get(&op.obj).expect("checked above");
                obj.index.index_of(&elem)
            };
            let now_visible = !remaining.is_empty();

            let obj_mut = self.objects.get_mut(&op.obj).expect("checked above");
            obj_mut.set_visible_ops(logical_key.clone(), remaining);

            match (was_indexed, now_visible) {
                (Some(idx), false) => {
                    let obj_mut = self.objects.get_mut(&op.obj).expect("checked above");
                    obj_mut.index.remove_at(idx);
                    patch.push(PatchEvent::Remove {
                        obj: op.obj.clone(),
                        index: idx,
                    });
                }
                (Some(_), true) => {
                    if let Some(value) = patch_value {
                        patch.push(PatchEvent::Put {
                            obj: op.obj.clone(),
                            key: logical_key.clone(),
                            value,
                        });
                    }
                }
                (None, true) => {
                    let obj_ref = self.objects.get(&op.obj).expect("checked above");
                    let index = self.find_insert_position(obj_ref, &elem);
                    let obj_mut = self.objects.get_mut(&op.obj).expect("checked above");
                    obj_mut.index.insert_at(index, elem);
                    if let Some(value) = patch_value {
                        patch.push(PatchEvent::Insert {
                            obj: op.obj.clone(),
                            index,
                            value,
                        });
                    }
                }
                (None, false) => {}
            }
        } else {
            let now_visible = !remaining.is_empty();
            let obj_mut = self.objects.get_mut(&op.obj).expect("checked above");
            obj_mut.set_visible_ops(logical_key.clone(), remaining);
            if now_visible {
                if let Some(value) = patch_value {
                    patch.push(PatchEvent::Put {
                        obj: op.obj.clone(),
                        key: logical_key.clone(),
                        value,
                    });
                }
            } else {
                patch.push(PatchEvent::Delete {
                    obj: op.obj.clone(),
                    key: logical_key.clone(),
                });
            }
        }

        self.op_store.insert(op.id.clone(), op);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorId;
    use test_log::test;
    use std::rc::Rc;

    fn actor() -> Rc<ActorId> {
        Rc::new(ActorId::from(vec![1u8; 16]))
    }

    fn set_op(id: u64, a: &Rc<ActorId>, key: &str, val: ScalarValue, pred: Vec<OpId>) -> Op {
        Op {
            id: OpId::new(id, a.clone()),
            action: OpType::Set(val),
            obj: ObjId::Root,
            key: Key::Map(key.to_string()),
            insert: false,
            pred,
            succ: vec![],
        }
    }

    #[test]
    fn sequential_set_overwrites_previous() {
        let a = actor();
        let mut os = OpSet::new();
        let mut patch = Patch::new();
        let op1 = set_op(1, &a, "x", ScalarValue::Uint(1), vec![]);
        os.apply_op(op1.clone(), &mut patch).unwrap();
        let op2 = set_op(2, &a, "x", ScalarValue::Uint(2), vec![op1.id.clone()]);
        os.apply_op(op2, &mut patch).unwrap();
        let root = os.object(&ObjId::Root).unwrap();
        let visible = root.visible_ops(&Key::Map("x".to_string()));
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].counter, 2);
    }

    #[test]
    fn concurrent_sets_both_remain_visible_with_largest_first() {
        let a = actor();
        let b = Rc::new(ActorId::from(vec![2u8; 16]));
        let mut os = OpSet::new();
        let mut patch = Patch::new();
        let op_a = set_op(1, &a, "x", ScalarValue::Uint(10), vec![]);
        let op_b = Op {
            id: OpId::new(1, b.clone()),
            action: OpType::Set(ScalarValue::Uint(20)),
            obj: ObjId::Root,
            key: Key::Map("x".to_string()),
            insert: false,
            pred: vec![],
            succ: vec![],
        };
        os.apply_op(op_a.clone(), &mut patch).unwrap();
        os.apply_op(op_b.clone(), &mut patch).unwrap();
        let root = os.object(&ObjId::Root).unwrap();
        let visible = root.visible_ops(&Key::Map("x".to_string()));
        assert_eq!(visible.len(), 2);
        // actor b (0x02) sorts after actor a (0x01) at equal counter, so its
        // op is the Lamport-larger one and appears first.
        assert_eq!(visible[0], op_b.id);
        assert_eq!(visible[1], op_a.id);
    }

    #[test]
    fn del_removes_the_only_writer() {
        let a = actor();
        let mut os = OpSet::new();
        let mut patch = Patch::new();
        let op1 = set_op(1, &a, "x", ScalarValue::Uint(1), vec![]);
        os.apply_op(op1.clone(), &mut patch).unwrap();
        let del = Op {
            id: OpId::new(2, a.clone()),
            action: OpType::Del,
            obj: ObjId::Root,
            key: Key::Map("x".to_string()),
            insert: false,
            pred: vec![op1.id.clone()],
            succ: vec![],
        };
        os.apply_op(del, &mut patch).unwrap();
        let root = os.object(&ObjId::Root).unwrap();
        assert!(root.visible_ops(&Key::Map("x".to_string())).is_empty());
        assert!(matches!(
            patch.events.last().unwrap(),
            PatchEvent::Delete { .. }
        ));
    }

    #[test]
    fn concurrent_increments_accumulate() {
        let a = actor();
        let b = Rc::new(ActorId::from(vec![2u8; 16]));
        let mut os = OpSet::new();
        let mut patch = Patch::new();
        let set = set_op(1, &a, "count", ScalarValue::Counter(0), vec![]);
        os.apply_op(set.clone(), &mut patch).unwrap();
        let inc_a = Op {
            id: OpId::new(2, a.clone()),
            action: OpType::Inc(1),
            obj: ObjId::Root,
            key: Key::Map("count".to_string()),
            insert: false,
            pred: vec![set.id.clone()],
            succ: vec![],
        };
        let inc_b = Op {
            id: OpId::new(2, b.clone()),
            action: OpType::Inc(1),
            obj: ObjId::Root,
            key: Key::Map("count".to_string()),
            insert: false,
            pred: vec![set.id.clone()],
            succ: vec![],
        };
        os.apply_op(inc_a, &mut patch).unwrap();
        os.apply_op(inc_b, &mut patch).unwrap();
        let value = os.effective_value(&set.id).unwrap();
        assert_eq!(value, ScalarValue::Counter(2));
    }

    #[test]
    fn list_inserts_at_head_maintain_index_order() {
        let a = actor();
        let mut os = OpSet::new();
        let mut patch = Patch::new();
        let make_text = Op {
            id: OpId::new(1, a.clone()),
            action: OpType::Make(ObjType::Text),
            obj: ObjId::Root,
            key: Key::Map("text".to_string()),
            insert: false,
            pred: vec![],
            succ: vec![],
        };
        os.apply_op(make_text.clone(), &mut patch).unwrap();
        let text_obj = ObjId::Id(make_text.id.clone());

        let insert_h = Op {
            id: OpId::new(2, a.clone()),
            action: OpType::Set(ScalarValue::Str("h".to_string())),
            obj: text_obj.clone(),
            key: Key::Seq(ElemId::Head),
            insert: true,
            pred: vec![],
            succ: vec![],
        };
        os.apply_op(insert_h.clone(), &mut patch).unwrap();

        let insert_big_h = Op {
            id: OpId::new(3, a.clone()),
            action: OpType::Set(ScalarValue::Str("H".to_string())),
            obj: text_obj.clone(),
            key: Key::Seq(ElemId::Head),
            insert: true,
            pred: vec![],
            succ: vec![],
        };
        os.apply_op(insert_big_h.clone(), &mut patch).unwrap();

        let text = os.object(&text_obj).unwrap();
        assert_eq!(text.index.len(), 2);
        assert_eq!(
            text.index.elem_at(0),
            Some(&ElemId::Id(insert_big_h.id.clone()))
        );
        assert_eq!(text.index.elem_at(1), Some(&ElemId::Id(insert_h.id.clone())));
    }

    #[test]
    fn link_reparents_an_existing_object_and_tracks_inbound() {
        let a = actor();
        let mut os = OpSet::new();
        let mut patch = Patch::new();
        let make_list = Op {
            id: OpId::new(1, a.clone()),
            action: OpType::Make(ObjType::List),
            obj: ObjId::Root,
            key: Key::Map("orig".to_string()),
            insert: false,
            pred: vec![],
            succ: vec![],
        };
        os.apply_op(make_list.clone(), &mut patch).unwrap();
        let list_obj = ObjId::Id(make_list.id.clone());
        assert!(os
            .object(&list_obj)
            .unwrap()
            .inbound()
            .contains(&make_list.id));

        let link = Op {
            id: OpId::new(2, a.clone()),
            action: OpType::Link(list_obj.clone()),
            obj: ObjId::Root,
            key: Key::Map("alias".to_string()),
            insert: false,
            pred: vec![],
            succ: vec![],
        };
        os.apply_op(link.clone(), &mut patch).unwrap();

        let root = os.object(&ObjId::Root).unwrap();
        let visible = root.visible_ops(&Key::Map("alias".to_string()));
        assert_eq!(visible, &[link.id.clone()]);
        assert!(os.object(&list_obj).unwrap().inbound().contains(&link.id));

        // Overwriting the link drops its inbound back-reference.
        let overwrite = Op {
            id: OpId::new(3, a.clone()),
            action: OpType::Del,
            obj: ObjId::Root,
            key: Key::Map("alias".to_string()),
            insert: false,
            pred: vec![link.id.clone()],
            succ: vec![],
        };
        os.apply_op(overwrite, &mut patch).unwrap();
        assert!(!os.object(&list_obj).unwrap().inbound().contains(&link.id));
    }
}
