//! Persisted per-peer sync state and the `Have` bloom snapshot it carries.

use crate::bitstream::{Decoder, Encoder};
use crate::bloom::BloomFilter;
use crate::error::DecodingError;
use crate::op::ChangeHash;
use std::collections::BTreeSet;

pub const SYNC_STATE_TYPE: u8 = 0x43;

/// One peer's claim: "I have every change that is not an ancestor of
/// `last_sync`, modulo false positives in `bloom`."
#[derive(Debug, Clone, Default)]
pub struct Have {
    pub last_sync: Vec<ChangeHash>,
    pub bloom: BloomFilter,
}

/// Sync state for one peer. Only `shared_heads` is persisted; everything
/// else is rebuilt during a live session.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    pub shared_heads: Vec<ChangeHash>,
    pub last_sent_heads: Vec<ChangeHash>,
    pub their_heads: Option<Vec<ChangeHash>>,
    pub their_need: Option<Vec<ChangeHash>>,
    pub their_have: Option<Vec<Have>>,
    pub sent_hashes: BTreeSet<ChangeHash>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Encoder::new();
        out.append_raw(&[SYNC_STATE_TYPE]);
        let mut heads = self.shared_heads.clone();
        heads.sort();
        super::encode_hashes(&mut out, &heads);
        out.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodingError> {
        if bytes.is_empty() {
            return Err(DecodingError::NotEnoughBytes);
        }
        let mut d = Decoder::new(bytes);
        let marker = d.read_raw(1)?[0];
        if marker != SYNC_STATE_TYPE {
            return Err(DecodingError::WrongType {
                expected_one_of: vec![SYNC_STATE_TYPE],
                found: marker,
            });
        }
        let shared_heads = super::decode_hashes(&mut d)?;
        Ok(SyncState {
            shared_heads,
            last_sent_heads: Vec::new(),
            their_heads: None,
            their_need: None,
            their_have: Some(Vec::new()),
            sent_hashes: BTreeSet::new(),
        })
    }
}
