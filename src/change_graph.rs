//! The hash-linked DAG of applied changes: causal-readiness queuing, heads
//! tracking, and the graph queries the sync protocol depends on.

use crate::actor::ActorId;
use crate::change::Change;
use crate::error::EngineError;
use crate::op::ChangeHash;
use fxhash::FxHashMap;
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Default)]
pub struct ChangeGraph {
    changes: FxHashMap<ChangeHash, Change>,
    history: Vec<ChangeHash>,
    states: FxHashMap<ActorId, Vec<ChangeHash>>,
    heads: BTreeSet<ChangeHash>,
    queue: Vec<Change>,
    max_op: u64,
}

impl ChangeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heads(&self) -> Vec<ChangeHash> {
        self.heads.iter().copied().collect()
    }

    pub fn contains(&self, hash: &ChangeHash) -> bool {
        self.changes.contains_key(hash)
    }

    pub fn get_change(&self, hash: &ChangeHash) -> Option<&Change> {
        self.changes.get(hash)
    }

    pub fn max_op(&self) -> u64 {
        self.max_op
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn next_seq(&self, actor: &ActorId) -> u64 {
        self.states.get(actor).map(|s| s.len() as u64 + 1).unwrap_or(1)
    }

    /// Queue a change whose dependencies are not all present yet.
    pub fn enqueue(&mut self, change: Change) {
        self.queue.push(change);
    }

    /// One pass over the queue: every change whose deps are now fully
    /// present is removed and returned. Callers should keep calling this
    /// (applying returned changes in between) until it yields nothing.
    pub fn take_ready(&mut self) -> Vec<Change> {
        let mut ready = Vec::new();
        let mut remaining = Vec::new();
        for change in self.queue.drain(..) {
            if change.deps.iter().all(|d| self.changes.contains_key(d)) {
                ready.push(change);
            } else {
                remaining.push(change);
            }
        }
        self.queue = remaining;
        ready
    }

    /// Every dependency referenced by a queued change that is neither
    /// applied nor itself queued.
    pub fn missing_deps(&self) -> Vec<ChangeHash> {
        let queued_hashes: HashSet<ChangeHash> = self.queue.iter().map(|c| c.hash).collect();
        let mut missing = BTreeSet::new();
        for change in &self.queue {
            for dep in &change.deps {
                if !self.changes.contains_key(dep) && !queued_hashes.contains(dep) {
                    missing.insert(*dep);
                }
            }
        }
        missing.into_iter().collect()
    }

    /// All ancestors of `heads` (inclusive), computed by walking `deps`
    /// backward. Errors if any head is unknown.
    fn ancestors(&self, heads: &[ChangeHash]) -> Result<HashSet<ChangeHash>, EngineError> {
        let mut visited = HashSet::new();
        let mut stack: Vec<ChangeHash> = Vec::new();
        for h in heads {
            if !self.changes.contains_key(h) {
                return Err(EngineError::UnknownHead(*h));
            }
            stack.push(*h);
        }
        while let Some(h) = stack.pop() {
            if visited.insert(h) {
                if let Some(change) = self.changes.get(&h) {
                    for dep in &change.deps {
                        stack.push(*dep);
                    }
                }
            }
        }
        Ok(visited)
    }

    /// Changes applied here but not reachable from `since`, in application
    /// order.
    pub fn get_changes(&self, since: &[ChangeHash]) -> Result<Vec<&Change>, EngineError> {
        let known_ancestors = self.ancestors(since)?;
        Ok(self
            .history
            .iter()
            .filter(|h| !known_ancestors.contains(*h))
            .map(|h| &self.changes[h])
            .collect())
    }

    /// Validate a causally-ready change (all deps already applied) against
    /// the per-actor sequencing invariants, without mutating the graph.
    /// Returns `Ok(false)` if the change was already applied (idempotent, the
    /// caller should skip re-applying its ops); `Ok(true)` if it is new and
    /// safe to pass to the op-set before calling `record`.
    pub fn validate(&self, change: &Change) -> Result<bool, EngineError> {
        if self.changes.contains_key(&change.hash) {
            return Ok(false);
        }

        let expected_seq = self.next_seq(&change.actor);
        if change.seq != expected_seq {
            return Err(EngineError::InvalidSeq {
                expected: expected_seq,
                found: change.seq,
            });
        }

        let expected_start_op = if change.deps.is_empty() {
            1
        } else {
            let mut max_op = 0;
            for dep_hash in &change.deps {
                let dep = self
                    .changes
                    .get(dep_hash)
                    .ok_or(EngineError::MissingSameActorPredecessor)?;
                max_op = max_op.max(dep.max_op());
            }
            max_op + 1
        };
        if change.start_op != expected_start_op {
            return Err(EngineError::InvalidStartOp {
                expected: expected_start_op,
                found: change.start_op,
            });
        }

        if change.seq > 1 {
            let prev_hash = self
                .states
                .get(change.actor.as_ref())
                .and_then(|s| s.last())
                .copied();
            match prev_hash {
                Some(prev) => {
                    let ancestors = self.ancestors(&change.deps)?;
                    if !ancestors.contains(&prev) {
                        return Err(EngineError::MissingSameActorPredecessor);
                    }
                }
                None => return Err(EngineError::MissingSameActorPredecessor),
            }
        }

        Ok(true)
    }

    /// Record a change that has already passed `validate`. Mutates heads,
    /// `max_op`, per-actor state and history. Does not re-check invariants.
    pub fn record(&mut self, change: Change) {
        let hash = change.hash;
        for dep in &change.deps {
            self.heads.remove(dep);
        }
        self.heads.insert(hash);
        self.max_op = self.max_op.max(change.max_op());
        self.states
            .entry((*change.actor).clone())
            .or_default()
            .push(hash);
        self.history.push(hash);
        self.changes.insert(hash, change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{Key, ObjId, OpId, OpType, ScalarValue};
    use std::rc::Rc;

    fn actor(byte: u8) -> Rc<ActorId> {
        Rc::new(ActorId::from(vec![byte; 16]))
    }

    fn change_with(actor: Rc<ActorId>, seq: u64, start_op: u64, deps: Vec<ChangeHash>) -> Change {
        let op = crate::op::Op {
            id: OpId::new(start_op, actor.clone()),
            action: OpType::Set(ScalarValue::Uint(seq)),
            obj: ObjId::Root,
            key: Key::Map("x".to_string()),
            insert: false,
            pred: vec![],
            succ: vec![],
        };
        Change::new(actor, seq, start_op, 0, None, deps, vec![op])
    }

    #[test]
    fn sequential_changes_form_a_single_head() {
        let a = actor(1);
        let mut graph = ChangeGraph::new();
        let c1 = change_with(a.clone(), 1, 1, vec![]);
        let h1 = c1.hash;
        assert!(graph.validate(&c1).unwrap());
        graph.record(c1);
        let c2 = change_with(a, 2, 2, vec![h1]);
        let h2 = c2.hash;
        assert!(graph.validate(&c2).unwrap());
        graph.record(c2);
        assert_eq!(graph.heads(), vec![h2]);
    }

    #[test]
    fn wrong_seq_is_rejected() {
        let a = actor(2);
        let graph = ChangeGraph::new();
        let c2 = change_with(a, 2, 1, vec![]);
        assert!(matches!(
            graph.validate(&c2),
            Err(EngineError::InvalidSeq { .. })
        ));
    }

    #[test]
    fn duplicate_change_is_idempotent() {
        let a = actor(3);
        let mut graph = ChangeGraph::new();
        let c1 = change_with(a, 1, 1, vec![]);
        let c1_again = c1.clone();
        assert!(graph.validate(&c1).unwrap());
        graph.record(c1);
        assert!(!graph.validate(&c1_again).unwrap());
    }

    #[test]
    fn queue_drains_once_dep_arrives() {
        let a = actor(4);
        let mut graph = ChangeGraph::new();
        let c1 = change_with(a.clone(), 1, 1, vec![]);
        let h1 = c1.hash;
        let c2 = change_with(a, 2, 2, vec![h1]);
        graph.enqueue(c2);
        assert!(graph.take_ready().is_empty());
        assert_eq!(graph.missing_deps(), vec![h1]);
        graph.validate(&c1).unwrap();
        graph.record(c1);
        let ready = graph.take_ready();
        assert_eq!(ready.len(), 1);
    }

    #[test]
    fn get_changes_since_excludes_ancestors() {
        let a = actor(5);
        let mut graph = ChangeGraph::new();
        let c1 = change_with(a.clone(), 1, 1, vec![]);
        let h1 = c1.hash;
        graph.validate(&c1).unwrap();
        graph.record(c1);
        let c2 = change_with(a, 2, 2, vec![h1]);
        let h2 = c2.hash;
        graph.validate(&c2).unwrap();
        graph.record(c2);
        let since = graph.get_changes(&[]).unwrap();
        assert_eq!(since.len(), 2);
        let since_h1 = graph.get_changes(&[h1]).unwrap();
        assert_eq!(since_h1.len(), 1);
        assert_eq!(since_h1[0].hash, h2);
    }
}
