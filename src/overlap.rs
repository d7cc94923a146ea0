/*!
Pairwise overlap detection.

Candidate overlaps are seeded by exact k-mer matches against a
[`KmerIndex`], grouped by diagonal, chained colinearly, and verified by
aligning the gaps between consecutive anchors. Candidates shorter than
the minimum overlap, more divergent than the threshold, or violating
the [`MatchMode`] end constraints are discarded.

The detector is a pure function of its inputs and the shared index.
*/

use std::cmp::Ordering;

use fnv::FnvHashMap;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::config::{MatchMode, Parameters};
use crate::handle::SeqId;
use crate::sequence::SequenceStore;

pub mod align;
pub mod container;
pub mod kmer_index;

pub use self::container::OverlapContainer;
pub use self::kmer_index::{KmerIndex, KmerIter, KmerPos};

/// Aligned pair of intervals, `[begin, end)` in the coordinates of
/// the respective strand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlap {
    pub cur: SeqId,
    pub cur_begin: usize,
    pub cur_end: usize,
    pub cur_len: usize,

    pub ext: SeqId,
    pub ext_begin: usize,
    pub ext_end: usize,
    pub ext_len: usize,

    /// Fraction of edited bases in the aligned region.
    pub divergence: f32,
    pub score: i64,
}

impl Overlap {
    #[inline]
    pub fn cur_range(&self) -> usize {
        self.cur_end - self.cur_begin
    }

    #[inline]
    pub fn ext_range(&self) -> usize {
        self.ext_end - self.ext_begin
    }

    /// The shorter of the two aligned ranges.
    #[inline]
    pub fn length(&self) -> usize {
        self.cur_range().min(self.ext_range())
    }

    /// `true` when both intervals are on the same strand of their
    /// respective sequences.
    #[inline]
    pub fn same_strand(&self) -> bool {
        self.cur.is_reverse() == self.ext.is_reverse()
    }

    /// The same overlap seen from the other sequence.
    pub fn reverse(&self) -> Self {
        Overlap {
            cur: self.ext,
            cur_begin: self.ext_begin,
            cur_end: self.ext_end,
            cur_len: self.ext_len,
            ext: self.cur,
            ext_begin: self.cur_begin,
            ext_end: self.cur_end,
            ext_len: self.cur_len,
            divergence: self.divergence,
            score: self.score,
        }
    }

    /// Linear projection of a position inside the `cur` interval onto
    /// the `ext` interval.
    pub fn project(&self, cur_pos: usize) -> usize {
        let cur_range = self.cur_range().max(1) as f64;
        let frac = (cur_pos.saturating_sub(self.cur_begin)) as f64 / cur_range;
        let projected = self.ext_begin as f64 + frac * self.ext_range() as f64;
        (projected.round() as usize).clamp(self.ext_begin, self.ext_end)
    }

    /// Deterministic preference order: lower divergence, then longer,
    /// then smaller sequence ids and coordinates.
    pub fn preference_cmp(&self, other: &Self) -> Ordering {
        self.divergence
            .total_cmp(&other.divergence)
            .then_with(|| other.length().cmp(&self.length()))
            .then_with(|| self.cur.cmp(&other.cur))
            .then_with(|| self.ext.cmp(&other.ext))
            .then_with(|| self.cur_begin.cmp(&other.cur_begin))
            .then_with(|| self.ext_begin.cmp(&other.ext_begin))
            .then_with(|| self.cur_end.cmp(&other.cur_end))
            .then_with(|| self.ext_end.cmp(&other.ext_end))
    }
}

#[derive(Debug, Clone, Copy)]
struct Hit {
    qpos: usize,
    tpos: usize,
}

impl Hit {
    #[inline]
    fn diagonal(&self) -> isize {
        self.tpos as isize - self.qpos as isize
    }
}

/// Largest diagonal shift between two hits that are still grouped
/// into the same chain candidate.
const DIAGONAL_TOLERANCE: isize = 50;

/// Finds overlaps of query sequences against an indexed target set.
#[derive(Debug, Clone)]
pub struct OverlapDetector<'a> {
    index: &'a KmerIndex,
    targets: &'a SequenceStore,
    min_overlap: usize,
    max_divergence: f32,
    match_mode: MatchMode,
    max_overhang: usize,
    max_jump: usize,
}

impl<'a> OverlapDetector<'a> {
    /// `index` must have been built over strands of `targets`.
    pub fn new(
        index: &'a KmerIndex,
        targets: &'a SequenceStore,
        params: &Parameters,
        match_mode: MatchMode,
        max_divergence: f32,
    ) -> Self {
        OverlapDetector {
            index,
            targets,
            min_overlap: params.minimum_overlap,
            max_divergence,
            match_mode,
            max_overhang: params.max_separation,
            max_jump: params.max_jump,
        }
    }

    pub fn with_min_overlap(mut self, min_overlap: usize) -> Self {
        self.min_overlap = min_overlap;
        self
    }

    /// Length, divergence and match-mode filter. A divergence exactly
    /// at the threshold is accepted.
    pub fn accepts(&self, ovlp: &Overlap) -> bool {
        if ovlp.length() < self.min_overlap {
            return false;
        }
        if ovlp.divergence > self.max_divergence {
            return false;
        }

        let oh = self.max_overhang;
        let left_cur = ovlp.cur_begin <= oh;
        let left_ext = ovlp.ext_begin <= oh;
        let right_cur = ovlp.cur_len - ovlp.cur_end <= oh;
        let right_ext = ovlp.ext_len - ovlp.ext_end <= oh;

        match self.match_mode {
            MatchMode::Local => true,
            MatchMode::Semi => left_cur || left_ext || right_cur || right_ext,
            MatchMode::Dovetail => (left_cur || left_ext) && (right_cur || right_ext),
        }
    }

    /// All accepted overlaps of `query` against the index, excluding
    /// targets for which `skip` returns `true`. Results are ordered by
    /// target and position.
    pub fn overlaps<F>(&self, query: SeqId, query_seq: &[u8], skip: F) -> Vec<Overlap>
    where
        F: Fn(SeqId) -> bool,
    {
        let k = self.index.k();

        let mut by_target: FnvHashMap<SeqId, Vec<Hit>> = FnvHashMap::default();
        for (qpos, code) in KmerIter::new(query_seq, k) {
            for kpos in self.index.get(code) {
                if skip(kpos.seq) {
                    continue;
                }
                by_target.entry(kpos.seq).or_default().push(Hit {
                    qpos,
                    tpos: kpos.pos as usize,
                });
            }
        }

        let mut targets = by_target.into_iter().collect::<Vec<_>>();
        targets.sort_by_key(|(id, _)| *id);

        let mut result = Vec::new();
        for (target, hits) in targets {
            let target_seq = self.targets.seq(target);
            for chain in self.chain_hits(hits) {
                let ovlp = self.verify_chain(query, query_seq, target, target_seq, &chain);
                if self.accepts(&ovlp) {
                    result.push(ovlp);
                }
            }
        }

        result.sort_by(|a, b| {
            a.ext
                .cmp(&b.ext)
                .then(a.cur_begin.cmp(&b.cur_begin))
                .then(a.ext_begin.cmp(&b.ext_begin))
        });
        result
    }

    /// Split one target's hits into colinear chains: single-linkage
    /// clustering on the diagonal, then splitting on long gaps.
    fn chain_hits(&self, mut hits: Vec<Hit>) -> Vec<Vec<Hit>> {
        hits.sort_by_key(|h| (h.diagonal(), h.qpos));

        let mut clusters: Vec<Vec<Hit>> = Vec::new();
        let mut current: Vec<Hit> = Vec::new();
        for hit in hits {
            if let Some(last) = current.last() {
                if hit.diagonal() - last.diagonal() > DIAGONAL_TOLERANCE {
                    clusters.push(std::mem::take(&mut current));
                }
            }
            current.push(hit);
        }
        if !current.is_empty() {
            clusters.push(current);
        }

        let mut chains = Vec::new();
        for mut cluster in clusters {
            cluster.sort_by_key(|h| (h.qpos, h.tpos));

            let mut chain: Vec<Hit> = Vec::new();
            for hit in cluster {
                match chain.last() {
                    Some(last) if hit.qpos <= last.qpos || hit.tpos <= last.tpos => {
                        continue;
                    }
                    Some(last)
                        if hit.qpos - last.qpos > self.max_jump
                            || hit.tpos - last.tpos > self.max_jump =>
                    {
                        chains.push(std::mem::take(&mut chain));
                    }
                    _ => (),
                }
                chain.push(hit);
            }
            chains.push(chain);
        }

        chains.retain(|c| c.len() >= 2);
        chains
    }

    fn verify_chain(
        &self,
        query: SeqId,
        query_seq: &[u8],
        target: SeqId,
        target_seq: &[u8],
        chain: &[Hit],
    ) -> Overlap {
        let k = self.index.k();
        // chains have at least two hits
        let first = chain[0];
        let last = chain[chain.len() - 1];

        let edits: usize = chain
            .windows(2)
            .map(|w| {
                align::anchor_gap_edits(
                    query_seq,
                    target_seq,
                    k,
                    (w[0].qpos, w[0].tpos),
                    (w[1].qpos, w[1].tpos),
                )
            })
            .sum();

        let cur_end = last.qpos + k;
        let ext_end = last.tpos + k;
        let span = (cur_end - first.qpos).max(ext_end - first.tpos);
        let divergence = (edits as f64 / span as f64) as f32;

        Overlap {
            cur: query,
            cur_begin: first.qpos,
            cur_end,
            cur_len: query_seq.len(),
            ext: target,
            ext_begin: first.tpos,
            ext_end,
            ext_len: target_seq.len(),
            divergence,
            score: span as i64 - edits as i64,
        }
    }
}
