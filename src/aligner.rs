/*!
Alignment of raw reads to the edges of the repeat graph.

The forward sequence of every edge pair is indexed once; each read is
then matched against the edge sequences with the same seeding and
verification as the assembly overlaps, and the resulting per-edge hits
are chained into the best scoring path through the graph. Consecutive
hits must meet at a node, possibly across one short edge that is too
short to be hit on its own.

Reads are aligned in parallel; the graph and the index are only read.
A read without any chainable hit is left out of the [`AlignmentSet`].
*/

use std::cmp::Ordering;

use rayon::prelude::*;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::config::{MatchMode, Parameters};
use crate::graph::{EdgeGraph, RepeatGraph};
use crate::handle::{EdgeId, SeqId};
use crate::overlap::{KmerIndex, Overlap, OverlapDetector};
use crate::sequence::SequenceStore;

/// A read interval aligned to an edge interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeAlignment {
    pub edge: EdgeId,
    pub read_start: usize,
    pub read_end: usize,
    pub edge_start: usize,
    pub edge_end: usize,
}

impl EdgeAlignment {
    #[inline]
    pub fn read_span(&self) -> usize {
        self.read_end.saturating_sub(self.read_start)
    }

    #[inline]
    pub fn edge_span(&self) -> usize {
        self.edge_end.saturating_sub(self.edge_start)
    }

    /// The same step seen from the complementary read strand.
    pub fn complement(&self, complement_edge: EdgeId, read_len: usize, edge_len: usize) -> Self {
        EdgeAlignment {
            edge: complement_edge,
            read_start: read_len.saturating_sub(self.read_end),
            read_end: read_len.saturating_sub(self.read_start),
            edge_start: edge_len.saturating_sub(self.edge_end),
            edge_end: edge_len.saturating_sub(self.edge_start),
        }
    }
}

/// The path of one read through the graph, ordered by read
/// coordinate. Consecutive steps meet at a node.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadAlignment {
    pub read: SeqId,
    pub read_len: usize,
    pub steps: Vec<EdgeAlignment>,
    pub divergence: f32,
    pub score: i64,
}

impl ReadAlignment {
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.steps.iter().map(|s| s.edge)
    }

    /// The alignment of the reverse complement of the read: steps in
    /// reverse order, on the complementary edges.
    pub fn complement(&self, graph: &RepeatGraph) -> Self {
        let steps = self
            .steps
            .iter()
            .rev()
            .map(|s| {
                s.complement(
                    graph.complement_edge(s.edge),
                    self.read_len,
                    graph.edge_length(s.edge),
                )
            })
            .collect();
        ReadAlignment {
            read: self.read.flip(),
            read_len: self.read_len,
            steps,
            divergence: self.divergence,
            score: self.score,
        }
    }
}

/// Alignments of a read set, owned independently of the graph and
/// referring to edges by id only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignmentSet {
    alignments: Vec<ReadAlignment>,
}

impl AlignmentSet {
    pub fn new(alignments: Vec<ReadAlignment>) -> Self {
        AlignmentSet { alignments }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.alignments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.alignments.is_empty()
    }

    pub fn as_slice(&self) -> &[ReadAlignment] {
        &self.alignments
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ReadAlignment> {
        self.alignments.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ReadAlignment> {
        self.alignments.iter_mut()
    }

    pub fn push(&mut self, aln: ReadAlignment) {
        self.alignments.push(aln);
    }

    /// Every alignment followed by its complement.
    pub fn both_strands<'a>(
        &'a self,
        graph: &'a RepeatGraph,
    ) -> impl Iterator<Item = ReadAlignment> + 'a {
        self.alignments
            .iter()
            .flat_map(move |aln| [aln.clone(), aln.complement(graph)])
    }

    /// Drop steps on edges that no longer exist and split alignments
    /// where consecutive steps are no longer connected. Returns the
    /// number of alignments that were changed.
    pub fn retain_valid(&mut self, graph: &RepeatGraph) -> usize {
        let mut changed = 0;
        let mut result = Vec::with_capacity(self.alignments.len());

        for aln in self.alignments.drain(..) {
            let mut runs: Vec<Vec<EdgeAlignment>> = Vec::new();
            let mut current: Vec<EdgeAlignment> = Vec::new();
            for step in aln.steps.iter() {
                if !graph.has_edge(step.edge) {
                    if !current.is_empty() {
                        runs.push(std::mem::take(&mut current));
                    }
                    continue;
                }
                if let Some(prev) = current.last() {
                    if graph.target(prev.edge) != graph.source(step.edge) {
                        runs.push(std::mem::take(&mut current));
                    }
                }
                current.push(*step);
            }
            if !current.is_empty() {
                runs.push(current);
            }

            if runs.len() == 1 && runs[0].len() == aln.steps.len() {
                result.push(aln);
                continue;
            }

            changed += 1;
            trace!(
                "alignment of read {} split into {} valid parts",
                aln.read,
                runs.len()
            );
            for steps in runs {
                result.push(ReadAlignment {
                    steps,
                    ..aln.clone()
                });
            }
        }

        self.alignments = result;
        changed
    }
}

/// Chain of edge hits considered for one read.
#[derive(Debug, Clone)]
struct Chain {
    score: i64,
    transitions: usize,
    edges: Vec<EdgeId>,
    steps: Vec<EdgeAlignment>,
    members: Vec<usize>,
}

impl Chain {
    /// Higher score first, then fewer transitions, then the
    /// lexicographically smaller edge sequence.
    fn better_than(&self, other: &Chain) -> bool {
        let ord = other
            .score
            .cmp(&self.score)
            .then(self.transitions.cmp(&other.transitions))
            .then_with(|| self.edges.cmp(&other.edges));
        ord == Ordering::Less
    }
}

pub struct ReadAligner<'a> {
    graph: &'a RepeatGraph,
    params: &'a Parameters,
    edge_store: SequenceStore,
    edge_ids: Vec<EdgeId>,
    index: KmerIndex,
}

impl<'a> ReadAligner<'a> {
    /// Index the current edge sequences of `graph`, which must have
    /// been materialized.
    pub fn new(graph: &'a RepeatGraph, params: &'a Parameters) -> Self {
        let mut edge_store = SequenceStore::new();
        let mut edge_ids = Vec::new();
        for id in graph.forward_edge_ids() {
            let seq = graph.edge_sequence(id);
            if seq.is_empty() {
                continue;
            }
            edge_store.add_sequence(&id.signed().to_string(), seq);
            edge_ids.push(id);
        }

        let ids = edge_store.all_ids().collect::<Vec<_>>();
        let index = KmerIndex::build(
            &edge_store,
            &ids,
            params.kmer_size,
            params.max_kmer_occurrences,
        );

        ReadAligner {
            graph,
            params,
            edge_store,
            edge_ids,
            index,
        }
    }

    fn edge_of(&self, id: SeqId) -> EdgeId {
        let forward = self.edge_ids[id.index()];
        if id.is_reverse() {
            self.graph.complement_edge(forward)
        } else {
            forward
        }
    }

    fn detector(&self) -> OverlapDetector<'_> {
        OverlapDetector::new(
            &self.index,
            &self.edge_store,
            self.params,
            MatchMode::Local,
            self.params.max_overlap_divergence,
        )
        .with_min_overlap(self.params.min_read_alignment)
    }

    fn hit(&self, ovlp: &Overlap) -> EdgeAlignment {
        EdgeAlignment {
            edge: self.edge_of(ovlp.ext),
            read_start: ovlp.cur_begin,
            read_end: ovlp.cur_end,
            edge_start: ovlp.ext_begin,
            edge_end: ovlp.ext_end,
        }
    }

    /// How `next` can follow `prev` on the read: directly, or across
    /// one short edge. Returns the bridging edge, if any, and the
    /// difference between the read gap and the graph distance.
    fn connect(&self, prev: &EdgeAlignment, next: &EdgeAlignment) -> Option<(Option<EdgeId>, i64)> {
        if next.read_start < prev.read_start || next.read_end <= prev.read_end {
            return None;
        }
        let max_jump = self.params.max_jump as i64;
        let gap = next.read_start as i64 - prev.read_end as i64;
        let tail = self.graph.edge_length(prev.edge) as i64 - prev.edge_end as i64;
        let head = next.edge_start as i64;
        if tail > max_jump || head > max_jump {
            return None;
        }

        let junction = self.graph.target(prev.edge);
        let entry = self.graph.source(next.edge);

        let mut best: Option<(Option<EdgeId>, i64)> = None;
        if junction == entry {
            best = Some((None, (gap - tail - head).abs()));
        }

        let mut bridges = self.graph.edges_between(junction, entry);
        bridges.retain(|&x| self.graph.edge_length(x) as i64 <= max_jump);
        bridges.sort();
        for x in bridges {
            let len = self.graph.edge_length(x) as i64;
            let penalty = (gap - tail - len - head).abs();
            if best.map_or(true, |(_, p)| penalty < p) {
                best = Some((Some(x), penalty));
            }
        }

        best.filter(|&(_, penalty)| penalty <= max_jump)
    }

    /// Best scoring path of a read through the graph.
    pub fn align_read(&self, read: SeqId, seq: &[u8]) -> Option<ReadAlignment> {
        let overlaps = self.detector().overlaps(read, seq, |_| false);
        if overlaps.is_empty() {
            return None;
        }

        let mut hits = overlaps
            .iter()
            .enumerate()
            .map(|(i, o)| (self.hit(o), i))
            .collect::<Vec<_>>();
        hits.sort_by_key(|(h, _)| (h.read_start, h.read_end, h.edge));

        let mut chains: Vec<Chain> = Vec::with_capacity(hits.len());
        for (j, (hit, _)) in hits.iter().enumerate() {
            let mut best = Chain {
                score: hit.read_span() as i64,
                transitions: 0,
                edges: vec![hit.edge],
                steps: vec![*hit],
                members: vec![j],
            };

            for (i, (prev, _)) in hits[..j].iter().enumerate() {
                let (bridge, penalty) = match self.connect(prev, hit) {
                    Some(c) => c,
                    None => continue,
                };
                let base = &chains[i];
                let mut cand = base.clone();
                cand.score = base.score + hit.read_span() as i64 - penalty;
                cand.transitions += 1;
                if let Some(x) = bridge {
                    cand.transitions += 1;
                    cand.edges.push(x);
                    cand.steps.push(EdgeAlignment {
                        edge: x,
                        read_start: prev.read_end,
                        read_end: hit.read_start.max(prev.read_end),
                        edge_start: 0,
                        edge_end: self.graph.edge_length(x),
                    });
                }
                cand.edges.push(hit.edge);
                cand.steps.push(*hit);
                cand.members.push(j);

                if cand.better_than(&best) {
                    best = cand;
                }
            }
            chains.push(best);
        }

        let mut best: Option<&Chain> = None;
        for chain in chains.iter() {
            if best.map_or(true, |b| chain.better_than(b)) {
                best = Some(chain);
            }
        }
        let best = best?;

        let (weighted, span) = best.members.iter().fold((0.0, 0usize), |(w, s), &m| {
            let ovlp = &overlaps[hits[m].1];
            let len = hits[m].0.read_span();
            (w + ovlp.divergence as f64 * len as f64, s + len)
        });

        Some(ReadAlignment {
            read,
            read_len: seq.len(),
            steps: best.steps.clone(),
            divergence: if span > 0 { (weighted / span as f64) as f32 } else { 0.0 },
            score: best.score,
        })
    }

    /// Align every read of `reads`, in parallel. The result is ordered
    /// by read.
    pub fn align_all(&self, reads: &SequenceStore) -> AlignmentSet {
        let t = std::time::Instant::now();

        let ids = reads.forward_ids().collect::<Vec<_>>();
        let results: Vec<(SeqId, Option<ReadAlignment>)> = ids
            .par_iter()
            .map(|&id| (id, self.align_read(id, reads.seq(id))))
            .collect();

        let mut alignments = Vec::with_capacity(results.len());
        let mut unaligned = 0;
        for (id, aln) in results {
            match aln {
                Some(aln) => alignments.push(aln),
                None => {
                    unaligned += 1;
                    debug!("read {} is unaligned", reads.strand_name(id));
                }
            }
        }

        info!(
            "Aligned {} of {} reads to the graph ({} unaligned) in {:.3} ms",
            alignments.len(),
            ids.len(),
            unaligned,
            t.elapsed().as_secs_f64() * 1000.0
        );

        AlignmentSet::new(alignments)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use crate::graph::tests::seg;
    use crate::graph::validate::validate_alignments;
    use crate::handle::NodeId;
    use crate::overlap::tests::random_dna;
    use crate::util::dna;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Linear graph over the given sequences, one edge each, joined
    /// end to end.
    pub(crate) fn chain_graph(seqs: &[Vec<u8>]) -> (RepeatGraph, Vec<EdgeId>) {
        let mut graph = RepeatGraph::new();
        let mut node = graph.add_node_pair();
        let mut edges = Vec::new();
        for (i, seq) in seqs.iter().enumerate() {
            let next = graph.add_node_pair();
            let e = graph.add_edge_pair(node, next, vec![seg(i, 0, seq.len(), seq.len())]);
            graph.set_edge_sequence(e, seq.clone());
            edges.push(e);
            node = next;
        }
        (graph, edges)
    }

    #[test]
    fn read_spanning_three_edges() {
        let mut rng = StdRng::seed_from_u64(5);
        let seqs = vec![
            random_dna(&mut rng, 3000),
            random_dna(&mut rng, 2000),
            random_dna(&mut rng, 3000),
        ];
        let (graph, edges) = chain_graph(&seqs);
        let params = Parameters::default();
        let aligner = ReadAligner::new(&graph, &params);

        let mut read = seqs[0][1500..].to_vec();
        read.extend_from_slice(&seqs[1]);
        read.extend_from_slice(&seqs[2][..1500]);

        let mut reads = SequenceStore::new();
        let fwd = reads.add_sequence("fwd", &read);
        let rev = reads.add_sequence("rev", &dna::rev_comp(&read));
        reads.add_sequence("junk", &random_dna(&mut rng, 2000));

        let set = aligner.align_all(&reads);
        assert_eq!(set.len(), 2);

        let aln = set.iter().find(|a| a.read == fwd).unwrap();
        assert_eq!(aln.edges().collect::<Vec<_>>(), edges);
        assert_eq!(aln.steps[0].edge_start, 1500);
        assert_eq!(aln.steps[1].read_start, 1500);
        assert_eq!(aln.divergence, 0.0);

        let comp_path = set
            .iter()
            .find(|a| a.read == rev)
            .unwrap()
            .edges()
            .collect::<Vec<_>>();
        let expected = edges
            .iter()
            .rev()
            .map(|&e| graph.complement_edge(e))
            .collect::<Vec<_>>();
        assert_eq!(comp_path, expected);

        let back = aln.complement(&graph).complement(&graph);
        assert_eq!(&back, aln);

        validate_alignments(&graph, &set);
    }

    #[test]
    fn short_edges_are_bridged() {
        let mut rng = StdRng::seed_from_u64(6);
        let seqs = vec![
            random_dna(&mut rng, 2000),
            random_dna(&mut rng, 200),
            random_dna(&mut rng, 2000),
        ];
        let (graph, edges) = chain_graph(&seqs);
        let params = Parameters::default();
        let aligner = ReadAligner::new(&graph, &params);

        let read = seqs.concat();
        let aln = aligner.align_read(SeqId::forward_of(0), &read).unwrap();
        assert_eq!(aln.edges().collect::<Vec<_>>(), edges);
        assert_eq!(aln.steps[1].edge_end, 200);
    }

    #[test]
    fn chain_preference_order() {
        let chain = |score: i64, transitions: usize, edges: &[u64]| Chain {
            score,
            transitions,
            edges: edges.iter().map(|&e| EdgeId(e)).collect(),
            steps: Vec::new(),
            members: Vec::new(),
        };

        // score decides first
        assert!(chain(900, 4, &[6, 8]).better_than(&chain(800, 0, &[0])));
        // then the direct path wins over one bridged through a short edge
        let direct = chain(800, 1, &[0, 4]);
        let bridged = chain(800, 2, &[0, 2, 4]);
        assert!(direct.better_than(&bridged));
        assert!(!bridged.better_than(&direct));
        // then the lower edge ids
        let low = chain(800, 2, &[0, 2, 6]);
        let high = chain(800, 2, &[0, 4, 6]);
        assert!(low.better_than(&high));
        assert!(!high.better_than(&low));
        // a chain is never better than itself
        assert!(!low.better_than(&low.clone()));
    }

    #[test]
    fn equal_parallel_edges_pick_lower_id() {
        let mut rng = StdRng::seed_from_u64(9);
        let left = random_dna(&mut rng, 2000);
        let middle = random_dna(&mut rng, 800);
        let right = random_dna(&mut rng, 2000);

        let mut graph = RepeatGraph::new();
        let a = graph.add_node_pair();
        let b = graph.add_node_pair();
        let c = graph.add_node_pair();
        let d = graph.add_node_pair();
        let add = |graph: &mut RepeatGraph, from: NodeId, to: NodeId, i: usize, seq: &Vec<u8>| {
            let e = graph.add_edge_pair(from, to, vec![seg(i, 0, seq.len(), seq.len())]);
            graph.set_edge_sequence(e, seq.clone());
            e
        };
        let e_left = add(&mut graph, a, b, 0, &left);
        let e_low = add(&mut graph, b, c, 1, &middle);
        let e_high = add(&mut graph, b, c, 2, &middle);
        let e_right = add(&mut graph, c, d, 3, &right);
        assert!(e_low < e_high);

        let params = Parameters::default();
        let aligner = ReadAligner::new(&graph, &params);
        let read = [left, middle, right].concat();
        let aln = aligner.align_read(SeqId::forward_of(0), &read).unwrap();

        assert_eq!(aln.edges().collect::<Vec<_>>(), vec![e_left, e_low, e_right]);
    }

    #[test]
    fn stale_steps_are_invalidated() {
        let mut rng = StdRng::seed_from_u64(8);
        let seqs = vec![
            random_dna(&mut rng, 1000),
            random_dna(&mut rng, 1000),
            random_dna(&mut rng, 1000),
        ];
        let (mut graph, edges) = chain_graph(&seqs);

        let step = |e: EdgeId| EdgeAlignment {
            edge: e,
            read_start: 0,
            read_end: 1000,
            edge_start: 0,
            edge_end: 1000,
        };
        let mut set = AlignmentSet::new(vec![ReadAlignment {
            read: SeqId::forward_of(0),
            read_len: 3000,
            steps: edges.iter().map(|&e| step(e)).collect(),
            divergence: 0.0,
            score: 3000,
        }]);

        assert_eq!(set.retain_valid(&graph), 0);

        graph.remove_edge_pair(edges[1]);
        assert_eq!(set.retain_valid(&graph), 1);
        assert_eq!(set.len(), 2);
        assert!(set.iter().all(|a| a.steps.len() == 1));
        validate_alignments(&graph, &set);
    }
}
