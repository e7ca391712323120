//! A content-addressed, operation-based CRDT engine for collaborative
//! JSON-like documents: a hash-linked change graph, a columnar binary wire
//! format, and a Bloom-filter-based anti-entropy sync protocol.

pub mod actor;
pub mod bitstream;
pub mod bloom;
pub mod change;
pub mod change_graph;
pub mod column;
pub mod error;
pub mod list_index;
pub mod object;
pub mod op;
pub mod op_set;
pub mod patch;
pub mod sync;

pub use actor::ActorId;
pub use change::Change;
pub use error::EngineError;
pub use op::{ChangeHash, ObjId, ObjType, Op, OpId, OpType, ScalarValue};
pub use patch::{Patch, PatchEvent, PatchValue};
pub use sync::{Have, Message, SyncState};

use change_graph::ChangeGraph;
use op_set::OpSet;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::{instrument, warn};

/// A single document replica: the change graph plus the materialized
/// op-set it replays to. Cloning an `Engine` is intentionally not
/// supported — callers share one via `Rc`/`RefCell` at the embedding layer.
#[derive(Debug)]
pub struct Engine {
    actor: Rc<ActorId>,
    graph: ChangeGraph,
    op_set: OpSet,
}

impl Engine {
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor: Rc::new(actor),
            graph: ChangeGraph::new(),
            op_set: OpSet::new(),
        }
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.actor
    }

    pub fn get_heads(&self) -> Vec<ChangeHash> {
        self.graph.heads()
    }

    pub fn get_missing_deps(&self) -> Vec<ChangeHash> {
        self.graph.missing_deps()
    }

    /// The op counter a caller building ops for the next `apply_local_change`
    /// must start from: ops are numbered `next_op_counter() + index` in the
    /// order they appear in that call, so multi-op changes that reference an
    /// earlier op in the same batch (e.g. inserting into a list they just
    /// created) can compute those ids up front.
    pub fn next_op_counter(&self) -> u64 {
        self.graph.max_op() + 1
    }

    pub fn get_change_by_hash(&self, hash: &ChangeHash) -> Option<Vec<u8>> {
        self.graph.get_change(hash).map(Change::encode)
    }

    pub fn get_changes(&self, since: &[ChangeHash]) -> Result<Vec<Vec<u8>>, EngineError> {
        Ok(self
            .graph
            .get_changes(since)?
            .into_iter()
            .map(Change::encode)
            .collect())
    }

    /// Decode and apply a batch of changes, queuing any whose dependencies
    /// are not yet satisfied and draining the queue as they become ready.
    /// Each change either applies in full (graph + op-set both updated) or
    /// not at all; an error from a later change in the batch never rolls
    /// back the earlier ones already recorded.
    #[instrument(level = "debug", skip(self, changes), fields(n = changes.len()))]
    pub fn apply_changes(&mut self, changes: Vec<Vec<u8>>) -> Result<Patch, EngineError> {
        let mut patch = Patch::new();
        for bytes in changes {
            let change = Change::decode(&bytes).map_err(|e| {
                warn!(error = %e, "failed to decode change");
                EngineError::Decoding(e)
            })?;
            self.apply_one(change, &mut patch)?;
        }
        self.drain_queue(&mut patch)?;
        Ok(patch)
    }

    /// Build and apply a locally-authored change from already-constructed
    /// ops, stamping `seq`/`start_op`/`deps` from the current graph state.
    pub fn apply_local_change(
        &mut self,
        time: i64,
        message: Option<String>,
        ops: Vec<Op>,
    ) -> Result<(ChangeHash, Patch), EngineError> {
        let seq = self
            .graph
            .get_changes(&[])
            .map(|cs| {
                cs.iter()
                    .filter(|c| *c.actor == *self.actor)
                    .count() as u64
                    + 1
            })
            .unwrap_or(1);
        let start_op = self.graph.max_op() + 1;
        let deps = self.graph.heads();
        let change = Change::new(self.actor.clone(), seq, start_op, time, message, deps, ops);
        let hash = change.hash;
        let mut patch = Patch::new();
        self.apply_one(change, &mut patch)?;
        self.drain_queue(&mut patch)?;
        Ok((hash, patch))
    }

    /// Validate, apply to the op-set, then record in the graph — in that
    /// order, so a change is never recorded as part of history unless its
    /// operations applied successfully. Causally-not-ready changes are
    /// queued rather than rejected.
    fn apply_one(&mut self, change: Change, patch: &mut Patch) -> Result<(), EngineError> {
        let deps_satisfied = change.deps.iter().all(|d| self.graph.contains(d));
        if !deps_satisfied {
            self.graph.enqueue(change);
            return Ok(());
        }

        if !self.graph.validate(&change)? {
            // Already applied; idempotent no-op.
            return Ok(());
        }

        let change_patch = self.op_set.apply_change(&change)?;
        self.graph.record(change);
        patch.extend(change_patch);
        Ok(())
    }

    fn drain_queue(&mut self, patch: &mut Patch) -> Result<(), EngineError> {
        loop {
            let ready = self.graph.take_ready();
            if ready.is_empty() {
                return Ok(());
            }
            for change in ready {
                self.apply_one(change, patch)?;
            }
        }
    }

    fn heads_set(&self) -> HashSet<ChangeHash> {
        self.graph.heads().into_iter().collect()
    }

    /// Produce the next message to send a peer, or `None` if we have
    /// nothing new to tell them (a fixed point has been reached).
    #[instrument(level = "debug", skip(self, state))]
    pub fn generate_sync_message(&self, state: &mut SyncState) -> Option<Vec<u8>> {
        let our_heads = self.graph.heads();

        let their_heads_known = state
            .their_heads
            .as_ref()
            .map(|h| h.iter().all(|hash| self.graph.contains(hash)))
            .unwrap_or(true);

        let mut need: Vec<ChangeHash> = self.graph.missing_deps();
        if let Some(their_heads) = &state.their_heads {
            for h in their_heads {
                if !self.graph.contains(h) && !need.contains(h) {
                    need.push(*h);
                }
            }
        }
        need.sort();

        let our_need = if their_heads_known { Vec::new() } else { need.clone() };

        let reset_needed = state
            .their_have
            .as_ref()
            .map(|haves| {
                haves
                    .iter()
                    .any(|h| h.last_sync.iter().any(|hash| !self.graph.contains(hash)))
            })
            .unwrap_or(false);

        let shared_heads = if reset_needed {
            Vec::new()
        } else {
            state.shared_heads.clone()
        };

        let have = vec![Have {
            last_sync: shared_heads.clone(),
            bloom: bloom::BloomFilter::from_hashes(
                self.graph
                    .get_changes(&shared_heads)
                    .unwrap_or_default()
                    .iter()
                    .map(|c| &c.hash),
            ),
        }];

        let their_have = state.their_have.clone().unwrap_or_default();
        let their_need = state.their_need.clone().unwrap_or_default();
        let changes_to_send: Vec<ChangeHash> = sync::get_changes_to_send(
            &self.graph,
            &their_have,
            &their_need,
        )
        .into_iter()
        .filter(|h| !state.sent_hashes.contains(h))
        .collect();

        let heads_unchanged = state.last_sent_heads == our_heads;
        let nothing_new = changes_to_send.is_empty() && our_need.is_empty() && heads_unchanged;
        if nothing_new && !reset_needed {
            return None;
        }

        let changes: Vec<Change> = changes_to_send
            .iter()
            .filter_map(|h| self.graph.get_change(h).cloned())
            .collect();

        for h in &changes_to_send {
            state.sent_hashes.insert(*h);
        }
        state.last_sent_heads = our_heads.clone();

        let message = Message {
            heads: our_heads,
            need: our_need,
            have,
            changes,
        };
        Some(message.encode())
    }

    /// Apply a peer's sync message: absorb any changes it carries, advance
    /// `shared_heads`, and record what they say they have/need for the next
    /// `generate_sync_message` call.
    #[instrument(level = "debug", skip(self, state, bytes))]
    pub fn receive_sync_message(
        &mut self,
        state: &mut SyncState,
        bytes: &[u8],
    ) -> Result<Patch, EngineError> {
        let message = Message::decode(bytes).map_err(|e| {
            warn!(error = %e, "failed to decode sync message");
            EngineError::Decoding(e)
        })?;

        let old_heads = self.heads_set();
        let before_heads: Vec<ChangeHash> = {
            let mut v: Vec<ChangeHash> = old_heads.iter().copied().collect();
            v.sort();
            v
        };

        let changes_is_empty = message.changes.is_empty();
        let patch = if changes_is_empty {
            Patch::new()
        } else {
            let encoded: Vec<Vec<u8>> = message.changes.iter().map(Change::encode).collect();
            let patch = self.apply_changes(encoded)?;

            let new_heads = self.heads_set();
            let old_shared: HashSet<ChangeHash> = state.shared_heads.iter().copied().collect();
            let shared = sync::advance_heads(&old_heads, &new_heads, &old_shared);
            let mut shared: Vec<ChangeHash> = shared.into_iter().collect();
            shared.sort();
            state.shared_heads = shared;
            patch
        };

        let mut their_heads = message.heads.clone();
        their_heads.sort();

        if changes_is_empty && their_heads == before_heads {
            state.last_sent_heads = their_heads.clone();
        }

        let known_heads: Vec<ChangeHash> = their_heads
            .iter()
            .filter(|h| self.graph.contains(h))
            .copied()
            .collect();
        if known_heads.len() == their_heads.len() {
            state.shared_heads = their_heads.clone();
            if their_heads.is_empty() {
                state.last_sent_heads = Vec::new();
                state.sent_hashes = Default::default();
            }
        } else {
            let mut shared: Vec<ChangeHash> = state
                .shared_heads
                .iter()
                .chain(known_heads.iter())
                .copied()
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            shared.sort();
            state.shared_heads = shared;
        }

        state.their_heads = Some(message.heads);
        state.their_need = Some(message.need);
        state.their_have = Some(message.have);

        Ok(patch)
    }

    pub fn encode_sync_state(state: &SyncState) -> Vec<u8> {
        state.encode()
    }

    pub fn decode_sync_state(bytes: &[u8]) -> Result<SyncState, error::DecodingError> {
        SyncState::decode(bytes)
    }
}
