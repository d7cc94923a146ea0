/*!
Repeat graph construction from pairwise overlaps.

Every sequence is cut at a set of *glue points*: its two ends, the
ends of every overlap it takes part in, and the projections of all
points that fall inside an overlap onto the other sequence of that
overlap. Projection is iterated until no new point appears. Points
closer than `max_separation` on one sequence are snapped together.

Points joined by an overlap are united into junctions, and the
intervals between consecutive points are united into edges when their
endpoints are joined on both sides. Each junction class becomes a node
and each interval class an edge, with complementary classes giving the
complementary nodes and edges.
*/

use fnv::{FnvHashMap, FnvHashSet};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::config::Parameters;
use crate::handle::{NodeId, SeqId};
use crate::overlap::{Overlap, OverlapContainer};
use crate::sequence::SequenceStore;
use crate::util::DisjointSets;

use super::{EdgeGraph, EdgeSegment, RepeatGraph};

/// Position on the forward strand of `strand`'s sequence, given a
/// position on `strand` itself. Its own inverse.
#[inline]
fn strand_pos(strand: SeqId, pos: usize, seq_len: usize) -> usize {
    if strand.is_reverse() {
        seq_len - pos
    } else {
        pos
    }
}

/// Index of the point closest to `pos`; the lower one on a tie.
fn nearest(positions: &[usize], pos: usize) -> Option<usize> {
    let i = positions.partition_point(|&p| p < pos);
    let below = i.checked_sub(1);
    let above = if i < positions.len() { Some(i) } else { None };
    match (below, above) {
        (Some(b), Some(a)) => {
            if pos - positions[b] <= positions[a] - pos {
                Some(b)
            } else {
                Some(a)
            }
        }
        (Some(b), None) => Some(b),
        (None, a) => a,
    }
}

/// Sorted glue point positions of every sequence, on the forward
/// strand.
struct GluePoints {
    positions: Vec<Vec<usize>>,
    seq_lens: Vec<usize>,
    max_separation: usize,
    point_offsets: Vec<usize>,
    segment_offsets: Vec<usize>,
}

impl GluePoints {
    fn new(store: &SequenceStore, max_separation: usize) -> Self {
        let seq_lens = store
            .forward_ids()
            .map(|id| store.seq_len(id))
            .collect::<Vec<_>>();
        let positions = seq_lens.iter().map(|&len| vec![0, len]).collect();
        GluePoints {
            positions,
            seq_lens,
            max_separation,
            point_offsets: Vec::new(),
            segment_offsets: Vec::new(),
        }
    }

    /// Insert a point unless one already exists within the
    /// separation distance. Returns `true` if a point was added.
    fn insert(&mut self, seq: usize, pos: usize) -> bool {
        let points = &mut self.positions[seq];
        if let Some(ix) = nearest(points, pos) {
            if points[ix].abs_diff(pos) <= self.max_separation {
                return false;
            }
        }
        let at = points.partition_point(|&p| p < pos);
        points.insert(at, pos);
        true
    }

    fn insert_on_strand(&mut self, strand: SeqId, pos: usize) -> bool {
        let len = self.seq_lens[strand.index()];
        self.insert(strand.index(), strand_pos(strand, pos, len))
    }

    /// Positions on `strand` strictly inside `[begin, end)`, in
    /// ascending strand coordinates.
    fn interior(&self, strand: SeqId, begin: usize, end: usize) -> Vec<usize> {
        let len = self.seq_lens[strand.index()];
        let mut res = self.positions[strand.index()]
            .iter()
            .map(|&p| strand_pos(strand, p, len))
            .filter(|&p| begin < p && p < end)
            .collect::<Vec<_>>();
        res.sort_unstable();
        res
    }

    /// Fix the point set and assign dense point and segment ids.
    fn finalize(&mut self) {
        let mut points = 0;
        let mut segments = 0;
        for pos in self.positions.iter() {
            self.point_offsets.push(points);
            self.segment_offsets.push(segments);
            points += pos.len();
            segments += pos.len() - 1;
        }
        self.point_offsets.push(points);
        self.segment_offsets.push(segments);
    }

    fn point_count(&self) -> usize {
        self.point_offsets.last().copied().unwrap_or(0)
    }

    fn segment_count(&self) -> usize {
        self.segment_offsets.last().copied().unwrap_or(0)
    }

    /// Forward-strand index of the point closest to a strand
    /// position.
    fn point_index(&self, strand: SeqId, pos: usize) -> usize {
        let len = self.seq_lens[strand.index()];
        let points = &self.positions[strand.index()];
        // every sequence has at least its two end points
        nearest(points, strand_pos(strand, pos, len)).unwrap_or(0)
    }

    /// Union-find element of a junction as seen from `strand`.
    fn point_view(&self, strand: SeqId, ix: usize) -> u64 {
        let pid = self.point_offsets[strand.index()] + ix;
        2 * pid as u64 + strand.is_reverse() as u64
    }

    /// Union-find element of the interval between two consecutive
    /// points, traversed along `strand` from point `a` to point `b`.
    fn segment_view(&self, strand: SeqId, a: usize, b: usize) -> Option<u64> {
        let offset = self.segment_offsets[strand.index()];
        if !strand.is_reverse() && b == a + 1 {
            Some(2 * (offset + a) as u64)
        } else if strand.is_reverse() && a == b + 1 {
            Some(2 * (offset + b) as u64 + 1)
        } else {
            None
        }
    }

    fn segment(&self, seq: usize, ix: usize) -> EdgeSegment {
        EdgeSegment {
            seq: SeqId::forward_of(seq),
            start: self.positions[seq][ix],
            end: self.positions[seq][ix + 1],
            seq_len: self.seq_lens[seq],
        }
    }
}

/// Both directions of every canonical overlap. The complementary
/// directions carry no extra information, as glue points are shared
/// by both strands.
fn overlap_views(overlaps: &OverlapContainer) -> Vec<Overlap> {
    overlaps
        .canonical()
        .iter()
        .flat_map(|o| [*o, o.reverse()])
        .collect()
}

fn project_points(points: &mut GluePoints, views: &[Overlap]) {
    for ovlp in views {
        points.insert_on_strand(ovlp.cur, ovlp.cur_begin);
        points.insert_on_strand(ovlp.cur, ovlp.cur_end);
    }

    let mut rounds = 0;
    loop {
        rounds += 1;
        let mut added = 0;
        for ovlp in views {
            for pos in points.interior(ovlp.cur, ovlp.cur_begin, ovlp.cur_end) {
                let projected = ovlp.project(pos);
                if points.insert_on_strand(ovlp.ext, projected) {
                    added += 1;
                }
            }
        }
        trace!("projection round {}: {} new points", rounds, added);
        if added == 0 {
            break;
        }
    }

    debug!(
        "glue points converged after {} rounds, {} points",
        rounds,
        points.positions.iter().map(|p| p.len()).sum::<usize>()
    );
}

/// Unite junctions and intervals joined by the overlaps.
fn glue(points: &GluePoints, views: &[Overlap]) -> (DisjointSets, DisjointSets) {
    let junctions = DisjointSets::new(2 * points.point_count());
    let intervals = DisjointSets::new(2 * points.segment_count());

    for ovlp in views {
        let cur_len = points.seq_lens[ovlp.cur.index()];

        let mut along = points
            .interior(ovlp.cur, ovlp.cur_begin, ovlp.cur_end)
            .into_iter()
            .map(|p| points.point_index(ovlp.cur, p))
            .collect::<Vec<_>>();
        along.insert(0, points.point_index(ovlp.cur, ovlp.cur_begin));
        along.push(points.point_index(ovlp.cur, ovlp.cur_end));
        along.dedup();

        let mut prev: Option<(usize, usize)> = None;
        for &cur_ix in along.iter() {
            let cur_fwd = points.positions[ovlp.cur.index()][cur_ix];
            let cur_pos = strand_pos(ovlp.cur, cur_fwd, cur_len);
            let ext_ix = points.point_index(ovlp.ext, ovlp.project(cur_pos));

            let a = points.point_view(ovlp.cur, cur_ix);
            let b = points.point_view(ovlp.ext, ext_ix);
            junctions.unite(a, b);
            junctions.unite(a ^ 1, b ^ 1);

            if let Some((prev_cur, prev_ext)) = prev {
                let cur_seg = points.segment_view(ovlp.cur, prev_cur, cur_ix);
                let ext_seg = points.segment_view(ovlp.ext, prev_ext, ext_ix);
                if let (Some(a), Some(b)) = (cur_seg, ext_seg) {
                    intervals.unite(a, b);
                    intervals.unite(a ^ 1, b ^ 1);
                }
            }
            prev = Some((cur_ix, ext_ix));
        }
    }

    (junctions, intervals)
}

impl RepeatGraph {
    /// Detect all overlaps between the sequences of `store` with the
    /// configured match mode and divergence bound, glue the sequences
    /// along them and condense the result.
    pub fn build(store: &SequenceStore, params: &Parameters) -> Self {
        let overlaps = OverlapContainer::detect(store, params);
        let mut graph = Self::from_overlaps(store, &overlaps, params.max_separation);
        graph.condense(store);
        graph
    }

    /// The raw, uncondensed graph of `store` glued along `overlaps`.
    pub fn from_overlaps(
        store: &SequenceStore,
        overlaps: &OverlapContainer,
        max_separation: usize,
    ) -> Self {
        let t = std::time::Instant::now();

        let views = overlap_views(overlaps);
        let mut points = GluePoints::new(store, max_separation);
        project_points(&mut points, &views);
        points.finalize();

        let (junctions, intervals) = glue(&points, &views);

        let mut graph = RepeatGraph::new();

        let mut node_of: FnvHashMap<u64, NodeId> = FnvHashMap::default();
        for seq in 0..points.positions.len() {
            let strand = SeqId::forward_of(seq);
            for ix in 0..points.positions[seq].len() {
                let view = points.point_view(strand, ix);
                let root = junctions.find(view);
                if node_of.contains_key(&root) {
                    continue;
                }
                let comp_root = junctions.find(view ^ 1);
                if root == comp_root {
                    node_of.insert(root, graph.add_self_complement_node());
                } else {
                    let node = graph.add_node_pair();
                    node_of.insert(root, node);
                    node_of.insert(comp_root, graph.complement_node(node));
                }
            }
        }

        let mut members: FnvHashMap<u64, Vec<EdgeSegment>> = FnvHashMap::default();
        for seq in 0..points.positions.len() {
            let strand = SeqId::forward_of(seq);
            for ix in 0..points.positions[seq].len() - 1 {
                let segment = points.segment(seq, ix);
                let fwd = points.segment_view(strand, ix, ix + 1).unwrap_or_default();
                members.entry(intervals.find(fwd)).or_default().push(segment);
                members
                    .entry(intervals.find(fwd ^ 1))
                    .or_default()
                    .push(segment.complement());
            }
        }

        let mut done: FnvHashSet<u64> = FnvHashSet::default();
        for seq in 0..points.positions.len() {
            let strand = SeqId::forward_of(seq);
            for ix in 0..points.positions[seq].len() - 1 {
                let fwd = points.segment_view(strand, ix, ix + 1).unwrap_or_default();
                let root = intervals.find(fwd);
                if done.contains(&root) {
                    continue;
                }
                let comp_root = intervals.find(fwd ^ 1);
                done.insert(root);
                done.insert(comp_root);

                let source = node_of[&junctions.find(points.point_view(strand, ix))];
                let target = node_of[&junctions.find(points.point_view(strand, ix + 1))];
                let segments = members.remove(&root).unwrap_or_default();

                if root == comp_root {
                    if graph.complement_node(source) != target {
                        error!(
                            "self-complementary interval {} [{}, {}) joins unrelated junctions",
                            strand,
                            points.positions[seq][ix],
                            points.positions[seq][ix + 1]
                        );
                    }
                    graph.add_self_complement_edge(source, segments);
                } else {
                    graph.add_edge_pair(source, target, segments);
                }
            }
        }

        info!(
            "Built raw repeat graph: {} nodes, {} edges from {} overlaps in {:.3} ms",
            graph.node_count(),
            graph.edge_count(),
            overlaps.len(),
            t.elapsed().as_secs_f64() * 1000.0
        );

        graph
    }
}
