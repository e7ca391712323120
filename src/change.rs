//! The change codec: maps a logical [`Change`] (header + operation array) to
//! and from the columnar byte layout, and computes the canonical change hash.

use crate::actor::ActorId;
use crate::bitstream::{Decoder, Encoder};
use crate::column::{DeltaDecoder, DeltaEncoder, RleDecoder, RleEncoder};
use crate::error::DecodingError;
use crate::op::{ChangeHash, ElemId, Key, ObjId, ObjType, Op, OpId, OpType, ScalarValue};
use sha2::{Digest, Sha256};
use std::rc::Rc;
use tracing::instrument;

const VERSION: u8 = 1;

// Column ids, in the fixed order they are written and must be read.
const COL_ACTION: u32 = 0;
const COL_OBJ_CTR: u32 = 1;
const COL_OBJ_ACTOR: u32 = 2;
const COL_KEY_CTR: u32 = 3;
const COL_KEY_ACTOR: u32 = 4;
const COL_KEY_STR: u32 = 5;
const COL_INSERT: u32 = 6;
const COL_VAL_LEN: u32 = 7;
const COL_VAL_RAW: u32 = 8;
const COL_PRED_NUM: u32 = 9;
const COL_PRED_CTR: u32 = 10;
const COL_PRED_ACTOR: u32 = 11;

fn action_id(action: &OpType) -> u64 {
    match action {
        OpType::Make(ObjType::Map) => 0,
        OpType::Make(ObjType::List) => 1,
        OpType::Make(ObjType::Text) => 2,
        OpType::Make(ObjType::Table) => 3,
        OpType::Set(_) => 4,
        OpType::Del => 5,
        OpType::Inc(_) => 6,
        OpType::Link(_) => 7,
    }
}

fn action_from_id(id: u64, value: Option<ScalarValue>) -> Result<OpType, DecodingError> {
    Ok(match id {
        0 => OpType::Make(ObjType::Map),
        1 => OpType::Make(ObjType::List),
        2 => OpType::Make(ObjType::Text),
        3 => OpType::Make(ObjType::Table),
        4 => OpType::Set(value.unwrap_or(ScalarValue::Null)),
        5 => OpType::Del,
        6 => match value {
            Some(ScalarValue::Counter(n)) | Some(ScalarValue::Int(n)) => OpType::Inc(n),
            _ => return Err(DecodingError::InvalidChange("inc op missing delta".into())),
        },
        7 => match value {
            Some(ScalarValue::Bytes(b)) => OpType::Link(decode_obj_id_bytes(&b)?),
            _ => return Err(DecodingError::InvalidChange("link op missing target".into())),
        },
        other => {
            return Err(DecodingError::InvalidChange(format!(
                "unknown action id {other}"
            )))
        }
    })
}

/// Link's value payload is an object-id reference, carried as a self
/// contained `(tag, [counter, actor bytes])` blob inside the existing
/// `ScalarValue::Bytes` value slot rather than a dedicated column — there is
/// no `link_ctr`/`link_actor` column in the wire layout, so the target's
/// actor is written out in full here instead of through the per-change
/// actor-index table the `obj`/`key`/`pred` columns use.
fn encode_obj_id_bytes(obj: &ObjId) -> Vec<u8> {
    let mut buf = Encoder::new();
    match obj {
        ObjId::Root => buf.append_uint(0),
        ObjId::Id(id) => {
            buf.append_uint(1);
            buf.append_uint(id.counter);
            buf.append_bytes(id.actor.to_bytes());
        }
    }
    buf.into_bytes()
}

fn decode_obj_id_bytes(bytes: &[u8]) -> Result<ObjId, DecodingError> {
    let mut d = Decoder::new(bytes);
    let tag = d.read_uint()?;
    Ok(match tag {
        0 => ObjId::Root,
        1 => {
            let ctr = d.read_uint()?;
            let actor_bytes = d.read_bytes()?.to_vec();
            ObjId::Id(OpId::new(ctr, Rc::new(ActorId::from(actor_bytes))))
        }
        other => {
            return Err(DecodingError::InvalidChange(format!(
                "unknown link target tag {other}"
            )))
        }
    })
}

fn encode_value(action: &OpType) -> Vec<u8> {
    let mut buf = Encoder::new();
    match action {
        OpType::Inc(delta) => {
            buf.append_uint(3);
            buf.append_int64(*delta);
        }
        OpType::Set(scalar) => match scalar {
            ScalarValue::Null => {
                buf.append_uint(0);
            }
            ScalarValue::Boolean(false) => {
                buf.append_uint(1);
            }
            ScalarValue::Boolean(true) => {
                buf.append_uint(2);
            }
            ScalarValue::Counter(n) => {
                buf.append_uint(3);
                buf.append_int64(*n);
            }
            ScalarValue::Int(n) => {
                buf.append_uint(4);
                buf.append_int64(*n);
            }
            ScalarValue::Uint(n) => {
                buf.append_uint(5);
                buf.append_uint64(*n);
            }
            ScalarValue::F64(f) => {
                buf.append_uint(6);
                buf.append_raw(&f.to_le_bytes());
            }
            ScalarValue::Str(s) => {
                buf.append_uint(7);
                buf.append_str(s);
            }
            ScalarValue::Bytes(b) => {
                buf.append_uint(8);
                buf.append_bytes(b);
            }
        },
        OpType::Link(target) => {
            buf.append_uint(8);
            buf.append_bytes(&encode_obj_id_bytes(target));
        }
        OpType::Make(_) | OpType::Del => {}
    }
    buf.into_bytes()
}

fn decode_value(bytes: &[u8]) -> Result<Option<ScalarValue>, DecodingError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    let mut d = Decoder::new(bytes);
    let tag = d.read_uint()?;
    Ok(Some(match tag {
        0 => ScalarValue::Null,
        1 => ScalarValue::Boolean(false),
        2 => ScalarValue::Boolean(true),
        3 => ScalarValue::Counter(d.read_int64()?),
        4 => ScalarValue::Int(d.read_int64()?),
        5 => ScalarValue::Uint(d.read_uint64()?),
        6 => {
            let raw = d.read_raw(8)?;
            let mut arr = [0u8; 8];
            arr.copy_from_slice(raw);
            ScalarValue::F64(f64::from_le_bytes(arr))
        }
        7 => ScalarValue::Str(d.read_str()?.to_string()),
        8 => ScalarValue::Bytes(d.read_bytes()?.to_vec()),
        other => {
            return Err(DecodingError::WrongType {
                expected_one_of: vec![0, 1, 2, 3, 4, 5, 6, 7, 8],
                found: other as u8,
            })
        }
    }))
}

/// A decoded, fully-owned change: header fields plus its operations.
#[derive(Debug, Clone)]
pub struct Change {
    pub actor: Rc<ActorId>,
    pub seq: u64,
    pub start_op: u64,
    pub time: i64,
    pub message: Option<String>,
    pub deps: Vec<ChangeHash>,
    pub ops: Vec<Op>,
    pub hash: ChangeHash,
}

impl Change {
    pub fn max_op(&self) -> u64 {
        self.start_op + self.ops.len() as u64 - 1
    }

    /// Actors referenced anywhere in the change (obj/key/pred), excluding the
    /// author, in canonical (sorted) order.
    fn other_actors(&self) -> Vec<ActorId> {
        let mut set: Vec<ActorId> = Vec::new();
        let mut push = |a: &ActorId| {
            if a != self.actor.as_ref() && !set.contains(a) {
                set.push(a.clone());
            }
        };
        for op in &self.ops {
            if let ObjId::Id(id) = &op.obj {
                push(&id.actor);
            }
            if let Key::Seq(ElemId::Id(id)) = &op.key {
                push(&id.actor);
            }
            for p in &op.pred {
                push(&p.actor);
            }
        }
        set.sort();
        set
    }

    /// Encode this change to the canonical columnar byte layout (§4.2) and
    /// stamp its hash.
    #[instrument(level = "debug", skip(self), fields(seq = self.seq))]
    pub fn encode(&self) -> Vec<u8> {
        let bytes = self.encode_body();
        bytes
    }

    fn encode_body(&self) -> Vec<u8> {
        let other_actors = self.other_actors();
        let actor_index = |a: &ActorId| -> u64 {
            if a == self.actor.as_ref() {
                0
            } else {
                1 + other_actors.iter().position(|x| x == a).unwrap() as u64
            }
        };

        let mut out = Encoder::new();
        out.append_raw(&[VERSION]);
        out.append_bytes(self.actor.to_bytes());
        out.append_uint(self.seq);
        out.append_uint(self.start_op);
        out.append_int64(self.time);
        out.append_str(self.message.as_deref().unwrap_or(""));

        out.append_uint(other_actors.len() as u64);
        for a in &other_actors {
            out.append_bytes(a.to_bytes());
        }

        let mut deps = self.deps.clone();
        deps.sort();
        out.append_uint(deps.len() as u64);
        for d in &deps {
            out.append_raw(&d.0);
        }

        let mut action = RleEncoder::<u64>::new();
        let mut obj_ctr = RleEncoder::<u64>::new();
        let mut obj_actor = RleEncoder::<u64>::new();
        let mut key_ctr = RleEncoder::<u64>::new();
        let mut key_actor = RleEncoder::<u64>::new();
        let mut key_str = RleEncoder::<String>::new();
        let mut insert = RleEncoder::<u64>::new();
        let mut val_len = RleEncoder::<u64>::new();
        let mut val_raw = Encoder::new();
        let mut pred_num = RleEncoder::<u64>::new();
        let mut pred_ctr = DeltaEncoder::new();
        let mut pred_actor = RleEncoder::<u64>::new();

        for op in &self.ops {
            action.append_value(action_id(&op.action));

            match &op.obj {
                ObjId::Root => {
                    obj_ctr.append_null();
                    obj_actor.append_null();
                }
                ObjId::Id(id) => {
                    obj_ctr.append_value(id.counter);
                    obj_actor.append_value(actor_index(&id.actor));
                }
            }

            match &op.key {
                Key::Map(s) => {
                    key_ctr.append_null();
                    key_actor.append_null();
                    key_str.append_value(s.clone());
                }
                Key::Seq(ElemId::Head) => {
                    key_ctr.append_value(0);
                    key_actor.append_value(0);
                    key_str.append_null();
                }
                Key::Seq(ElemId::Id(id)) => {
                    key_ctr.append_value(id.counter);
                    key_actor.append_value(actor_index(&id.actor));
                    key_str.append_null();
                }
            }

            insert.append_value(if op.insert { 1 } else { 0 });

            let value_bytes = encode_value(&op.action);
            val_len.append_value(value_bytes.len() as u64);
            val_raw.append_raw(&value_bytes);

            pred_num.append_value(op.pred.len() as u64);
            for p in &op.pred {
                pred_ctr.append_value(p.counter as i64);
                pred_actor.append_value(actor_index(&p.actor));
            }
        }

        write_column(&mut out, COL_ACTION, action.finish());
        write_column(&mut out, COL_OBJ_CTR, obj_ctr.finish());
        write_column(&mut out, COL_OBJ_ACTOR, obj_actor.finish());
        write_column(&mut out, COL_KEY_CTR, key_ctr.finish());
        write_column(&mut out, COL_KEY_ACTOR, key_actor.finish());
        write_column(&mut out, COL_KEY_STR, key_str.finish());
        write_column(&mut out, COL_INSERT, insert.finish());
        write_column(&mut out, COL_VAL_LEN, val_len.finish());
        write_column(&mut out, COL_VAL_RAW, val_raw.into_bytes());
        write_column(&mut out, COL_PRED_NUM, pred_num.finish());
        write_column(&mut out, COL_PRED_CTR, pred_ctr.finish());
        write_column(&mut out, COL_PRED_ACTOR, pred_actor.finish());

        out.into_bytes()
    }

    /// Compute the canonical SHA-256 hash of this change's encoding.
    pub fn compute_hash(&self) -> ChangeHash {
        let bytes = self.encode_body();
        let digest = Sha256::digest(&bytes);
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&digest);
        ChangeHash(arr)
    }

    /// Build a change from its logical fields, computing and stamping its
    /// hash.
    pub fn new(
        actor: Rc<ActorId>,
        seq: u64,
        start_op: u64,
        time: i64,
        message: Option<String>,
        mut deps: Vec<ChangeHash>,
        ops: Vec<Op>,
    ) -> Self {
        deps.sort();
        let mut change = Change {
            actor,
            seq,
            start_op,
            time,
            message,
            deps,
            ops,
            hash: ChangeHash([0u8; 32]),
        };
        change.hash = change.compute_hash();
        change
    }

    #[instrument(level = "debug", skip(bytes))]
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodingError> {
        let mut d = Decoder::new(bytes);
        let version = d.read_raw(1)?[0];
        if version != VERSION {
            return Err(DecodingError::WrongMagicBytes);
        }
        let author_bytes = d.read_bytes()?.to_vec();
        let author = Rc::new(ActorId::from(author_bytes));

        let seq = d.read_uint()?;
        let start_op = d.read_uint()?;
        let time = d.read_int64()?;
        let message = d.read_str()?.to_string();
        let message = if message.is_empty() {
            None
        } else {
            Some(message)
        };

        let n_other = d.read_uint()?;
        let mut actors = vec![author.clone()];
        for _ in 0..n_other {
            let bytes = d.read_bytes()?.to_vec();
            actors.push(Rc::new(ActorId::from(bytes)));
        }

        let n_deps = d.read_uint()?;
        let mut deps = Vec::with_capacity(n_deps as usize);
        for _ in 0..n_deps {
            let raw = d.read_raw(32)?;
            deps.push(ChangeHash::try_from(raw).map_err(|e| {
                DecodingError::InvalidChange(format!("bad dependency hash: {e}"))
            })?);
        }

        let mut last_col_id: Option<u32> = None;
        let mut columns: std::collections::HashMap<u32, Vec<u8>> =
            std::collections::HashMap::new();
        while !d.done() {
            let col_id = d.read_uint32()?;
            if let Some(last) = last_col_id {
                if col_id <= last {
                    return Err(DecodingError::ColumnsNotInAscendingOrder {
                        last,
                        found: col_id,
                    });
                }
            }
            last_col_id = Some(col_id);
            let body = d.read_bytes()?.to_vec();
            columns.insert(col_id, body);
        }

        let get = |id: u32| -> &[u8] { columns.get(&id).map(Vec::as_slice).unwrap_or(&[]) };

        let mut action_dec: RleDecoder<u64> = RleDecoder::new(get(COL_ACTION));
        let mut obj_ctr_dec: RleDecoder<u64> = RleDecoder::new(get(COL_OBJ_CTR));
        let mut obj_actor_dec: RleDecoder<u64> = RleDecoder::new(get(COL_OBJ_ACTOR));
        let mut key_ctr_dec: RleDecoder<u64> = RleDecoder::new(get(COL_KEY_CTR));
        let mut key_actor_dec: RleDecoder<u64> = RleDecoder::new(get(COL_KEY_ACTOR));
        let mut key_str_dec: RleDecoder<String> = RleDecoder::new(get(COL_KEY_STR));
        let mut insert_dec: RleDecoder<u64> = RleDecoder::new(get(COL_INSERT));
        let mut val_len_dec: RleDecoder<u64> = RleDecoder::new(get(COL_VAL_LEN));
        let mut val_raw_dec = Decoder::new(get(COL_VAL_RAW));
        let mut pred_num_dec: RleDecoder<u64> = RleDecoder::new(get(COL_PRED_NUM));
        let mut pred_ctr_dec = DeltaDecoder::new(get(COL_PRED_CTR));
        let mut pred_actor_dec: RleDecoder<u64> = RleDecoder::new(get(COL_PRED_ACTOR));

        let mut ops = Vec::new();
        let mut index: u64 = 0;
        loop {
            let action_id_val = match action_dec.next() {
                Some(v) => v?,
                None => break,
            };
            let action_id_val = action_id_val.ok_or_else(|| {
                DecodingError::InvalidChange("action column cannot be null".into())
            })?;

            let obj_ctr = obj_ctr_dec.next().transpose()?.flatten();
            let obj_actor = obj_actor_dec.next().transpose()?.flatten();
            let obj = match (obj_ctr, obj_actor) {
                (None, None) => ObjId::Root,
                (Some(ctr), Some(actor_idx)) => {
                    let actor = actors
                        .get(actor_idx as usize)
                        .ok_or_else(|| DecodingError::InvalidChange("bad actor index".into()))?
                        .clone();
                    ObjId::Id(OpId::new(ctr, actor))
                }
                _ => {
                    return Err(DecodingError::InvalidChange(
                        "obj_ctr/obj_actor null mismatch".into(),
                    ))
                }
            };

            let key_ctr = key_ctr_dec.next().transpose()?.flatten();
            let key_actor = key_actor_dec.next().transpose()?.flatten();
            let key_str = key_str_dec.next().transpose()?.flatten();
            let insert_flag = insert_dec
                .next()
                .transpose()?
                .flatten()
                .unwrap_or(0)
                != 0;

            let key = if let Some(s) = key_str {
                Key::Map(s)
            } else {
                match (key_ctr, key_actor) {
                    (Some(0), Some(0)) if insert_flag => Key::Seq(ElemId::Head),
                    (Some(ctr), Some(actor_idx)) => {
                        let actor = actors
                            .get(actor_idx as usize)
                            .ok_or_else(|| {
                                DecodingError::InvalidChange("bad actor index".into())
                            })?
                            .clone();
                        Key::Seq(ElemId::Id(OpId::new(ctr, actor)))
                    }
                    _ => {
                        return Err(DecodingError::InvalidChange(
                            "key columns inconsistent".into(),
                        ))
                    }
                }
            };

            let vlen = val_len_dec.next().transpose()?.flatten().unwrap_or(0);
            let value_bytes = val_raw_dec.read_raw(vlen as usize)?;
            let value = decode_value(value_bytes)?;
            let action = action_from_id(action_id_val, value)?;

            let n_pred = pred_num_dec.next().transpose()?.flatten().unwrap_or(0);
            let mut pred = Vec::with_capacity(n_pred as usize);
            for _ in 0..n_pred {
                let ctr = pred_ctr_dec
                    .next()
                    .transpose()?
                    .flatten()
                    .ok_or_else(|| DecodingError::InvalidChange("missing pred ctr".into()))?;
                let actor_idx = pred_actor_dec
                    .next()
                    .transpose()?
                    .flatten()
                    .ok_or_else(|| DecodingError::InvalidChange("missing pred actor".into()))?;
                let actor = actors
                    .get(actor_idx as usize)
                    .ok_or_else(|| DecodingError::InvalidChange("bad actor index".into()))?
                    .clone();
                pred.push(OpId::new(ctr as u64, actor));
            }

            let id = OpId::new(start_op + index, author.clone());
            ops.push(Op {
                id,
                action,
                obj,
                key,
                insert: insert_flag,
                pred,
                succ: Vec::new(),
            });
            index += 1;
        }

        let change = Change {
            actor: author,
            seq,
            start_op,
            time,
            message,
            deps,
            ops,
            hash: ChangeHash([0u8; 32]),
        };
        let hash = change.compute_hash();
        Ok(Change { hash, ..change })
    }
}

fn write_column(out: &mut Encoder, id: u32, body: Vec<u8>) {
    if body.is_empty() {
        return;
    }
    out.append_uint(id as u64);
    out.append_bytes(&body);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorId;
    use test_log::test;

    fn mk_actor(byte: u8) -> Rc<ActorId> {
        Rc::new(ActorId::from(vec![byte; 16]))
    }

    #[test]
    fn change_roundtrip_simple_set() {
        let actor = mk_actor(1);
        let op = Op {
            id: OpId::new(1, actor.clone()),
            action: OpType::Set(ScalarValue::Uint(42)),
            obj: ObjId::Root,
            key: Key::Map("x".to_string()),
            insert: false,
            pred: vec![],
            succ: vec![],
        };
        let change = Change::new(actor.clone(), 1, 1, 1000, None, vec![], vec![op]);
        let bytes = change.encode();
        let decoded = Change::decode(&bytes).unwrap();
        assert_eq!(decoded.hash, change.hash);
        assert_eq!(decoded.seq, 1);
        assert_eq!(decoded.ops.len(), 1);
        assert_eq!(decoded.ops[0].key, Key::Map("x".to_string()));
        assert_eq!(
            decoded.ops[0].action,
            OpType::Set(ScalarValue::Uint(42))
        );
    }

    #[test]
    fn change_roundtrip_with_message_and_deps() {
        let actor = mk_actor(2);
        let dep = ChangeHash([9u8; 32]);
        let op = Op {
            id: OpId::new(1, actor.clone()),
            action: OpType::Make(ObjType::Map),
            obj: ObjId::Root,
            key: Key::Map("child".to_string()),
            insert: false,
            pred: vec![],
            succ: vec![],
        };
        let change = Change::new(
            actor.clone(),
            2,
            1,
            5000,
            Some("hello".to_string()),
            vec![dep],
            vec![op],
        );
        let bytes = change.encode();
        let decoded = Change::decode(&bytes).unwrap();
        assert_eq!(decoded.message, Some("hello".to_string()));
        assert_eq!(decoded.deps, vec![dep]);
    }

    #[test]
    fn change_roundtrip_head_insert() {
        let actor = mk_actor(3);
        let op = Op {
            id: OpId::new(1, actor.clone()),
            action: OpType::Make(ObjType::Text),
            obj: ObjId::Root,
            key: Key::Map("text".to_string()),
            insert: false,
            pred: vec![],
            succ: vec![],
        };
        let text_obj = ObjId::Id(op.id.clone());
        let insert_op = Op {
            id: OpId::new(2, actor.clone()),
            action: OpType::Set(ScalarValue::Str("h".to_string())),
            obj: text_obj,
            key: Key::Seq(ElemId::Head),
            insert: true,
            pred: vec![],
            succ: vec![],
        };
        let change = Change::new(actor, 1, 1, 0, None, vec![], vec![op, insert_op]);
        let bytes = change.encode();
        let decoded = Change::decode(&bytes).unwrap();
        assert_eq!(decoded.ops[1].key, Key::Seq(ElemId::Head));
        assert!(decoded.ops[1].insert);
    }

    #[test]
    fn change_with_pred_roundtrips() {
        let actor = mk_actor(4);
        let first = OpId::new(1, actor.clone());
        let del = Op {
            id: OpId::new(2, actor.clone()),
            action: OpType::Del,
            obj: ObjId::Root,
            key: Key::Map("x".to_string()),
            insert: false,
            pred: vec![first.clone()],
            succ: vec![],
        };
        let change = Change::new(actor, 1, 2, 0, None, vec![], vec![del]);
        let bytes = change.encode();
        let decoded = Change::decode(&bytes).unwrap();
        assert_eq!(decoded.ops[0].pred, vec![first]);
    }

    #[test]
    fn change_roundtrip_link_to_existing_object() {
        let actor = mk_actor(6);
        let make = Op {
            id: OpId::new(1, actor.clone()),
            action: OpType::Make(ObjType::List),
            obj: ObjId::Root,
            key: Key::Map("orig".to_string()),
            insert: false,
            pred: vec![],
            succ: vec![],
        };
        let target = ObjId::Id(make.id.clone());
        let link = Op {
            id: OpId::new(2, actor.clone()),
            action: OpType::Link(target.clone()),
            obj: ObjId::Root,
            key: Key::Map("alias".to_string()),
            insert: false,
            pred: vec![],
            succ: vec![],
        };
        let change = Change::new(actor, 1, 1, 0, None, vec![], vec![make, link]);
        let bytes = change.encode();
        let decoded = Change::decode(&bytes).unwrap();
        assert_eq!(decoded.ops[1].action, OpType::Link(target));
    }

    #[test]
    fn change_roundtrip_link_to_root() {
        let actor = mk_actor(7);
        let link = Op {
            id: OpId::new(1, actor.clone()),
            action: OpType::Link(ObjId::Root),
            obj: ObjId::Root,
            key: Key::Map("alias".to_string()),
            insert: false,
            pred: vec![],
            succ: vec![],
        };
        let change = Change::new(actor, 1, 1, 0, None, vec![], vec![link]);
        let bytes = change.encode();
        let decoded = Change::decode(&bytes).unwrap();
        assert_eq!(decoded.ops[0].action, OpType::Link(ObjId::Root));
    }

    #[test]
    fn hash_depends_only_on_logical_fields() {
        let actor = mk_actor(5);
        let op = Op {
            id: OpId::new(1, actor.clone()),
            action: OpType::Set(ScalarValue::Boolean(true)),
            obj: ObjId::Root,
            key: Key::Map("flag".to_string()),
            insert: false,
            pred: vec![],
            succ: vec![],
        };
        let a = Change::new(actor.clone(), 1, 1, 1, None, vec![], vec![op.clone()]);
        let b = Change::new(actor, 1, 1, 1, None, vec![], vec![op]);
        assert_eq!(a.hash, b.hash);
    }
}
