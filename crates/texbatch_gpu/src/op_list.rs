//! Draw op recording
//!
//! [`DrawOpList`] owns every recorded [`TextureDrawOp`] in a slot arena and
//! arranges them into chains. Each chain is flushed as one submission.
//!
//! When an op is recorded it is offered to the most recent chains, newest
//! first:
//!
//! - a chain member that merges the op ends the search
//! - a chain whose every member answers may-chain gets the op at its tail
//! - a chain that overlaps the op but cannot absorb it ends the search, since
//!   the op may not be drawn before it
//! - a finalized chain ends the search
//!
//! Flushing drains every chain and frees the consumed ops.

use slotmap::{new_key_type, SlotMap};
use smallvec::{smallvec, SmallVec};
use texbatch_core::Rect;

use crate::config::BatchConfig;
use crate::op::{CombineResult, OpState, TextureDrawOp};
use crate::target::{FlushStats, FlushTarget};

new_key_type! {
    /// Handle to a recorded draw op
    pub struct DrawOpId;
}

/// Where a recorded op ended up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Folded into an existing op, which now draws its quads
    Merged(DrawOpId),
    /// Appended to the tail of an existing chain
    Chained(DrawOpId),
    /// Started a new chain
    Added(DrawOpId),
}

impl RecordOutcome {
    /// The op that holds the recorded quads
    pub fn id(self) -> DrawOpId {
        match self {
            RecordOutcome::Merged(id) | RecordOutcome::Chained(id) | RecordOutcome::Added(id) => id,
        }
    }
}

#[derive(Debug)]
struct OpChain {
    members: SmallVec<[DrawOpId; 4]>,
    /// Union of the members' AA-bloated bounds
    bounds: Rect,
}

enum Absorb {
    Merged(DrawOpId),
    Appendable,
    Refused,
}

/// Arena of recorded draw ops, grouped into chains in paint order
#[derive(Debug)]
pub struct DrawOpList {
    ops: SlotMap<DrawOpId, TextureDrawOp>,
    chains: Vec<OpChain>,
    config: BatchConfig,
}

impl Default for DrawOpList {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}

impl DrawOpList {
    pub fn new(config: BatchConfig) -> Self {
        Self {
            ops: SlotMap::with_key(),
            chains: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Record an open op, combining it with earlier ops where possible
    pub fn record(&mut self, mut op: TextureDrawOp) -> RecordOutcome {
        debug_assert!(op.state() == OpState::Open, "recording a finalized op");
        let op_bounds = op.bloated_bounds();

        let first_candidate = self.chains.len().saturating_sub(self.config.max_op_lookback);
        for index in (first_candidate..self.chains.len()).rev() {
            // Finalized chains are sealed, and so is everything recorded
            // before them.
            if !self.chain_is_open(index) {
                break;
            }
            match self.try_absorb(index, &mut op, op_bounds) {
                Absorb::Merged(id) => {
                    tracing::debug!("merged op into {:?} (chain {})", id, index);
                    return RecordOutcome::Merged(id);
                }
                Absorb::Appendable => {
                    let id = self.ops.insert(op);
                    let chain = &mut self.chains[index];
                    for member in chain.members.iter().copied().chain(std::iter::once(id)) {
                        if let Some(member) = self.ops.get_mut(member) {
                            member.set_chained();
                        }
                    }
                    chain.members.push(id);
                    chain.bounds = chain.bounds.join(&op_bounds);
                    tracing::debug!("chained {:?} onto chain {} ({} ops)", id, index, chain.members.len());
                    return RecordOutcome::Chained(id);
                }
                Absorb::Refused => {
                    if self.chains[index].bounds.touches(&op_bounds) {
                        break;
                    }
                }
            }
        }

        let id = self.ops.insert(op);
        self.chains.push(OpChain {
            members: smallvec![id],
            bounds: op_bounds,
        });
        RecordOutcome::Added(id)
    }

    fn chain_is_open(&self, index: usize) -> bool {
        self.chains[index]
            .members
            .iter()
            .all(|&id| self.ops.get(id).is_some_and(|op| op.state() == OpState::Open))
    }

    fn try_absorb(&mut self, index: usize, op: &mut TextureDrawOp, op_bounds: Rect) -> Absorb {
        let caps = self.config.caps;
        let chain = &mut self.chains[index];
        let mut later_bounds = Rect::ZERO;
        let mut may_chain = true;

        for &id in chain.members.iter().rev() {
            // Merging into an older member draws the op before the later
            // ones, which is only allowed when they do not overlap.
            if later_bounds.touches(&op_bounds) && !later_bounds.is_empty() {
                may_chain = false;
                break;
            }
            let Some(member) = self.ops.get_mut(id) else {
                continue;
            };
            match member.combine(op, &caps) {
                CombineResult::Merged => {
                    chain.bounds = chain.bounds.join(&member.bloated_bounds());
                    return Absorb::Merged(id);
                }
                CombineResult::MayChain => {}
                CombineResult::CannotCombine => may_chain = false,
            }
            later_bounds = later_bounds.join(&member.bloated_bounds());
        }

        if may_chain {
            Absorb::Appendable
        } else {
            Absorb::Refused
        }
    }

    pub fn get(&self, id: DrawOpId) -> Option<&TextureDrawOp> {
        self.ops.get(id)
    }

    /// Number of live ops
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Chains in paint order, each listed head first
    pub fn chains(&self) -> impl Iterator<Item = &[DrawOpId]> + '_ {
        self.chains.iter().map(|chain| chain.members.as_slice())
    }

    /// Finalize every op that is still open
    pub fn finalize_all(&mut self) {
        for (_, op) in self.ops.iter_mut() {
            if op.state() == OpState::Open {
                op.finalize();
            }
        }
    }

    /// Tessellate and submit every chain, in recording order, then free the
    /// consumed ops.
    ///
    /// A chain whose resources cannot be acquired is skipped; the remaining
    /// chains still flush.
    pub fn flush(&mut self, target: &mut dyn FlushTarget) -> FlushStats {
        self.finalize_all();
        let mut stats = FlushStats::default();
        for chain in std::mem::take(&mut self.chains) {
            let members: SmallVec<[&TextureDrawOp; 4]> = chain
                .members
                .iter()
                .filter_map(|&id| self.ops.get(id))
                .filter(|op| op.state() == OpState::Finalized)
                .collect();
            if members.is_empty() {
                continue;
            }
            stats += TextureDrawOp::prepare_chain(&members, target, self.config.max_quads_per_draw);
        }
        for (_, op) in self.ops.iter_mut() {
            if op.state() == OpState::Finalized {
                op.mark_consumed();
            }
        }
        // Dropping a consumed op completes its pending reads.
        self.ops.clear();
        tracing::debug!(
            "flushed {} draws ({} meshes, {} quads), skipped {} batches",
            stats.draws,
            stats.meshes,
            stats.quads,
            stats.skipped_batches
        );
        stats
    }

    /// Free every op at once, releasing their texture references
    pub fn clear(&mut self) {
        self.chains.clear();
        self.ops.clear();
    }

    /// Dump of every op, chain by chain
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (index, chain) in self.chains.iter().enumerate() {
            out.push_str(&format!("Chain {} ({} ops)\n", index, chain.members.len()));
            for op in chain.members.iter().filter_map(|&id| self.ops.get(id)) {
                out.push_str(&op.dump());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Caps;
    use crate::op::{AaType, DrawParams, SrcRectConstraint};
    use crate::texture::{LazyTextureProxy, ProxyRef};
    use texbatch_core::QuadAaFlags;

    fn op(proxy: &ProxyRef, dst: Rect) -> TextureDrawOp {
        TextureDrawOp::single(
            proxy.clone(),
            Rect::new(0.0, 0.0, 4.0, 4.0),
            dst,
            QuadAaFlags::NONE,
            SrcRectConstraint::Fast,
            &DrawParams::new(),
        )
    }

    #[test]
    fn test_same_texture_merges() {
        let (_, a) = LazyTextureProxy::new(4, 4).shared();
        let mut list = DrawOpList::default();
        let first = list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        let second = list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        assert_eq!(first, RecordOutcome::Added(first.id()));
        assert_eq!(second, RecordOutcome::Merged(first.id()));
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(first.id()).unwrap().entries().len(), 2);
    }

    #[test]
    fn test_different_textures_chain() {
        let (_, a) = LazyTextureProxy::new(4, 4).shared();
        let (_, b) = LazyTextureProxy::new(4, 4).shared();
        let mut list = DrawOpList::default();
        let first = list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        let second = list.record(op(&b, Rect::new(0.0, 0.0, 4.0, 4.0)));
        assert!(matches!(second, RecordOutcome::Chained(_)));
        let chains: Vec<Vec<DrawOpId>> = list.chains().map(|c| c.to_vec()).collect();
        assert_eq!(chains, vec![vec![first.id(), second.id()]]);
        assert!(list.get(first.id()).unwrap().is_chained());
        assert!(list.get(second.id()).unwrap().is_chained());
    }

    #[test]
    fn test_no_dynamic_binding_starts_new_chain() {
        let (_, a) = LazyTextureProxy::new(4, 4).shared();
        let (_, b) = LazyTextureProxy::new(4, 4).shared();
        let config = BatchConfig::default().with_caps(Caps {
            dynamic_texture_binding: false,
        });
        let mut list = DrawOpList::new(config);
        list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        let second = list.record(op(&b, Rect::new(20.0, 0.0, 4.0, 4.0)));
        assert!(matches!(second, RecordOutcome::Added(_)));
        assert_eq!(list.chains().count(), 2);
    }

    #[test]
    fn test_overlap_blocks_merge_past_barrier() {
        let (_, a) = LazyTextureProxy::new(4, 4).shared();
        let (_, c) = LazyTextureProxy::new(4, 4)
            .with_format(wgpu::TextureFormat::R8Unorm)
            .shared();
        let mut list = DrawOpList::default();
        list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        // Different format: cannot chain, overlaps the first op.
        list.record(op(&c, Rect::new(2.0, 2.0, 4.0, 4.0)));
        // Same texture as the first op, but overlapping the barrier.
        let third = list.record(op(&a, Rect::new(3.0, 3.0, 4.0, 4.0)));
        assert!(matches!(third, RecordOutcome::Added(_)));
        assert_eq!(list.chains().count(), 3);
    }

    #[test]
    fn test_disjoint_barrier_allows_merge() {
        let (_, a) = LazyTextureProxy::new(4, 4).shared();
        let (_, c) = LazyTextureProxy::new(4, 4)
            .with_format(wgpu::TextureFormat::R8Unorm)
            .shared();
        let mut list = DrawOpList::default();
        let first = list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        list.record(op(&c, Rect::new(50.0, 50.0, 4.0, 4.0)));
        let third = list.record(op(&a, Rect::new(10.0, 0.0, 4.0, 4.0)));
        assert_eq!(third, RecordOutcome::Merged(first.id()));
    }

    #[test]
    fn test_merge_skips_overlapping_later_chain_member() {
        let (_, a) = LazyTextureProxy::new(4, 4).shared();
        let (_, b) = LazyTextureProxy::new(4, 4).shared();
        let mut list = DrawOpList::default();
        list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        list.record(op(&b, Rect::new(10.0, 0.0, 4.0, 4.0)));
        // Would merge with the head, but the tail is in the way.
        let third = list.record(op(&a, Rect::new(11.0, 0.0, 4.0, 4.0)));
        assert!(matches!(third, RecordOutcome::Added(_)));
        assert_eq!(list.chains().count(), 2);
    }

    #[test]
    fn test_lookback_limit() {
        let (_, a) = LazyTextureProxy::new(4, 4).shared();
        let mut list = DrawOpList::new(BatchConfig::default().with_max_op_lookback(1));
        let first = list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        // Different filter mode: never combines, never overlaps.
        let blocker = TextureDrawOp::single(
            a.clone(),
            Rect::new(0.0, 0.0, 4.0, 4.0),
            Rect::new(100.0, 0.0, 8.0, 8.0),
            QuadAaFlags::NONE,
            SrcRectConstraint::Fast,
            &DrawParams::new().with_filter(crate::texture::Filter::Bilinear),
        );
        list.record(blocker);
        let third = list.record(op(&a, Rect::new(10.0, 0.0, 4.0, 4.0)));
        assert!(matches!(third, RecordOutcome::Added(_)));
        assert_ne!(third.id(), first.id());
    }

    #[test]
    fn test_aa_bloat_counts_as_overlap() {
        let (_, a) = LazyTextureProxy::new(4, 4).shared();
        let (_, c) = LazyTextureProxy::new(4, 4)
            .with_format(wgpu::TextureFormat::R8Unorm)
            .shared();
        let mut list = DrawOpList::default();
        list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        // Ends at 9.75; the AA ramp reaches 10.25.
        let barrier = TextureDrawOp::single(
            c,
            Rect::new(0.0, 0.0, 4.0, 4.0),
            Rect::new(5.75, 0.0, 4.0, 4.0),
            QuadAaFlags::ALL,
            SrcRectConstraint::Fast,
            &DrawParams::new().with_aa(AaType::Coverage),
        );
        list.record(barrier);
        let third = list.record(op(&a, Rect::new(10.0, 0.0, 4.0, 4.0)));
        assert!(matches!(third, RecordOutcome::Added(_)));
    }

    #[test]
    fn test_record_after_flush_draws_in_next_flush() {
        let (probe, a) = LazyTextureProxy::new(4, 4).shared();
        let mut list = DrawOpList::default();
        let mut target = crate::target::RecordingTarget::new(16);
        list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        assert_eq!(list.flush(&mut target).quads, 1);
        assert!(list.is_empty());
        assert_eq!(list.chains().count(), 0);
        assert_eq!(probe.pending_reads(), 0);

        let second = list.record(op(&a, Rect::new(8.0, 0.0, 4.0, 4.0)));
        assert!(matches!(second, RecordOutcome::Added(_)));
        let stats = list.flush(&mut target);
        assert_eq!(stats.draws, 1);
        assert_eq!(stats.quads, 1);
        assert_eq!(target.submissions().len(), 2);
    }

    #[test]
    fn test_record_after_finalize_starts_new_chain() {
        let (_, a) = LazyTextureProxy::new(4, 4).shared();
        let mut list = DrawOpList::default();
        let first = list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        list.finalize_all();
        let second = list.record(op(&a, Rect::new(4.0, 0.0, 4.0, 4.0)));
        assert!(matches!(second, RecordOutcome::Added(_)));
        assert_eq!(list.get(first.id()).unwrap().entries().len(), 1);

        let mut target = crate::target::RecordingTarget::new(16);
        let stats = list.flush(&mut target);
        assert_eq!(stats.draws, 2);
        assert_eq!(stats.quads, 2);
    }

    #[test]
    fn test_clear_releases_refs() {
        let (probe, a) = LazyTextureProxy::new(4, 4).shared();
        let mut list = DrawOpList::default();
        list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        list.record(op(&a, Rect::new(0.0, 0.0, 4.0, 4.0)));
        // The merged-away op already released its ref.
        assert_eq!(probe.ref_count(), 1);
        list.finalize_all();
        assert_eq!(probe.ref_count(), 0);
        assert_eq!(probe.pending_reads(), 1);
        list.clear();
        assert!(list.is_empty());
        assert_eq!(probe.pending_reads(), 0);
    }
}
