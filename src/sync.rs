//! The anti-entropy sync protocol: message wire codec and the pure
//! reconciliation algorithms (`get_changes_to_send`, `advance_heads`) that
//! the engine's `generate_sync_message` / `receive_sync_message` drive.

pub mod state;

pub use state::{Have, SyncState};

use crate::bitstream::{Decoder, Encoder};
use crate::change::Change;
use crate::change_graph::ChangeGraph;
use crate::error::DecodingError;
use crate::op::ChangeHash;
use itertools::Itertools;
use std::collections::HashSet;

pub const MESSAGE_TYPE_SYNC: u8 = 0x42;

pub(crate) fn encode_hashes(out: &mut Encoder, hashes: &[ChangeHash]) {
    debug_assert!(
        hashes.windows(2).all(|w| w[0] <= w[1]),
        "hashes must be sorted before encoding"
    );
    out.append_uint(hashes.len() as u64);
    for h in hashes {
        out.append_raw(&h.0);
    }
}

pub(crate) fn decode_hashes(d: &mut Decoder) -> Result<Vec<ChangeHash>, DecodingError> {
    let n = d.read_uint()?;
    let mut out = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let raw = d.read_raw(32)?;
        out.push(
            ChangeHash::try_from(raw)
                .map_err(|_| DecodingError::InvalidChange("malformed change hash".into()))?,
        );
    }
    Ok(out)
}

fn encode_have(out: &mut Encoder, have: &Have) {
    let mut last_sync = have.last_sync.clone();
    last_sync.sort();
    encode_hashes(out, &last_sync);
    out.append_bytes(&have.bloom.to_bytes());
}

fn decode_have(d: &mut Decoder) -> Result<Have, DecodingError> {
    let last_sync = decode_hashes(d)?;
    let bloom_bytes = d.read_bytes()?;
    let bloom = crate::bloom::BloomFilter::parse(bloom_bytes)?;
    Ok(Have { last_sync, bloom })
}

/// One exchange in the sync protocol: our heads, what we explicitly need,
/// zero or more bloom snapshots of what we have, and the raw changes we are
/// sending unconditionally.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub heads: Vec<ChangeHash>,
    pub need: Vec<ChangeHash>,
    pub have: Vec<Have>,
    pub changes: Vec<Change>,
}

impl Message {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Encoder::new();
        out.append_raw(&[MESSAGE_TYPE_SYNC]);

        let mut heads = self.heads.clone();
        heads.sort();
        encode_hashes(&mut out, &heads);

        let mut need = self.need.clone();
        need.sort();
        encode_hashes(&mut out, &need);

        out.append_uint(self.have.len() as u64);
        for have in &self.have {
            encode_have(&mut out, have);
        }

        out.append_uint(self.changes.len() as u64);
        for change in &self.changes {
            out.append_bytes(&change.encode());
        }

        out.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodingError> {
        let mut d = Decoder::new(bytes);
        let marker = d.read_raw(1)?[0];
        if marker != MESSAGE_TYPE_SYNC {
            return Err(DecodingError::WrongType {
                expected_one_of: vec![MESSAGE_TYPE_SYNC],
                found: marker,
            });
        }
        let heads = decode_hashes(&mut d)?;
        let need = decode_hashes(&mut d)?;

        let n_have = d.read_uint()?;
        let mut have = Vec::with_capacity(n_have as usize);
        for _ in 0..n_have {
            have.push(decode_have(&mut d)?);
        }

        let n_changes = d.read_uint()?;
        let mut changes = Vec::with_capacity(n_changes as usize);
        for _ in 0..n_changes {
            let bytes = d.read_bytes()?;
            changes.push(Change::decode(bytes)?);
        }

        Ok(Message {
            heads,
            need,
            have,
            changes,
        })
    }
}

/// Which of our changes the peer still needs, given what they've told us
/// they have (`their_have`) and what they've explicitly asked for
/// (`their_need`). Pure function of the graph and these two inputs.
pub fn get_changes_to_send(
    graph: &ChangeGraph,
    their_have: &[Have],
    their_need: &[ChangeHash],
) -> Vec<ChangeHash> {
    if their_have.is_empty() {
        return their_need
            .iter()
            .filter(|h| graph.contains(h))
            .copied()
            .collect();
    }

    let last_syncs: Vec<ChangeHash> = their_have
        .iter()
        .flat_map(|h| h.last_sync.iter().copied())
        .filter(|h| graph.contains(h))
        .sorted()
        .dedup()
        .collect();

    let candidates = match graph.get_changes(&last_syncs) {
        Ok(c) => c,
        Err(_) => Vec::new(),
    };
    let candidate_hashes: HashSet<ChangeHash> = candidates.iter().map(|c| c.hash).collect();

    let mut to_send: HashSet<ChangeHash> = candidates
        .iter()
        .filter(|c| their_have.iter().all(|bf| !bf.bloom.contains_hash(&c.hash)))
        .map(|c| c.hash)
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for c in &candidates {
            if to_send.contains(&c.hash) {
                continue;
            }
            if c.deps
                .iter()
                .any(|d| candidate_hashes.contains(d) && to_send.contains(d))
            {
                to_send.insert(c.hash);
                changed = true;
            }
        }
    }

    for h in their_need {
        if graph.contains(h) {
            to_send.insert(*h);
        }
    }

    graph
        .get_changes(&[])
        .unwrap_or_default()
        .into_iter()
        .map(|c| c.hash)
        .filter(|h| to_send.contains(h))
        .collect()
}

/// Recompute the shared-heads set after applying a batch of changes:
/// heads we reached for the first time, plus previously-shared heads that
/// are still heads now.
pub fn advance_heads(
    old_heads: &HashSet<ChangeHash>,
    new_heads: &HashSet<ChangeHash>,
    old_shared_heads: &HashSet<ChangeHash>,
) -> HashSet<ChangeHash> {
    let newly_reached: HashSet<ChangeHash> =
        new_heads.difference(old_heads).copied().collect();
    let still_common: HashSet<ChangeHash> =
        old_shared_heads.intersection(new_heads).copied().collect();
    newly_reached.union(&still_common).copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_roundtrips_empty() {
        let msg = Message::default();
        let bytes = msg.encode();
        let decoded = Message::decode(&bytes).unwrap();
        assert!(decoded.heads.is_empty());
        assert!(decoded.need.is_empty());
        assert!(decoded.have.is_empty());
        assert!(decoded.changes.is_empty());
    }

    #[test]
    fn message_roundtrips_heads_and_need() {
        let msg = Message {
            heads: vec![ChangeHash([1u8; 32])],
            need: vec![ChangeHash([2u8; 32])],
            have: vec![],
            changes: vec![],
        };
        let bytes = msg.encode();
        let decoded = Message::decode(&bytes).unwrap();
        assert_eq!(decoded.heads, msg.heads);
        assert_eq!(decoded.need, msg.need);
    }

    #[test]
    fn decode_rejects_wrong_marker() {
        let bytes = [0x00u8];
        assert!(matches!(
            Message::decode(&bytes),
            Err(DecodingError::WrongType { .. })
        ));
    }

    #[test]
    fn advance_heads_keeps_common_and_adds_new() {
        let old_heads: HashSet<ChangeHash> = [ChangeHash([1; 32])].into_iter().collect();
        let new_heads: HashSet<ChangeHash> =
            [ChangeHash([1; 32]), ChangeHash([2; 32])].into_iter().collect();
        let old_shared: HashSet<ChangeHash> = [ChangeHash([1; 32])].into_iter().collect();
        let shared = advance_heads(&old_heads, &new_heads, &old_shared);
        assert!(shared.contains(&ChangeHash([1; 32])));
        assert!(shared.contains(&ChangeHash([2; 32])));
    }
}
