/*!
Detection and collapsing of haplotype bubbles.

A bubble is a set of edge-disjoint branches that leave one node and
meet again at another, each branch a chain of edges through nodes of
in- and out-degree 1. The branches must have similar lengths and
similar sequences; a branch containing a repetitive edge disqualifies
the bubble.

Collapsing keeps the branch with the most aligned read bases and
removes the others. The read support of the removed branches is added
to the kept one, and alignments that traverse a removed branch are
moved onto the kept branch. With `keep_haplotypes` the branches are
only tagged with a shared alternative group.

The graph is not condensed again after collapsing, so the start and
end nodes of a collapsed bubble may be left with a single in-edge and
a single out-edge.
*/

use fnv::{FnvHashMap, FnvHashSet};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::aligner::{AlignmentSet, EdgeAlignment};
use crate::config::Parameters;
use crate::graph::{EdgeGraph, RepeatGraph};
use crate::handle::{EdgeId, NodeId};
use crate::overlap::align::sequence_divergence;

/// A chain of edges through nodes of in- and out-degree 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub edges: Vec<EdgeId>,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    pub start: NodeId,
    pub end: NodeId,
    /// Ordered by first edge id.
    pub branches: Vec<Branch>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HaplotypeReport {
    pub bubbles: usize,
    pub collapsed: usize,
    pub marked: usize,
    pub edges_removed: usize,
}

pub struct HaplotypeResolver<'a> {
    params: &'a Parameters,
}

impl<'a> HaplotypeResolver<'a> {
    pub fn new(params: &'a Parameters) -> Self {
        HaplotypeResolver { params }
    }

    fn trace_branch(&self, graph: &RepeatGraph, first: EdgeId) -> Option<(Branch, NodeId)> {
        let mut edges = vec![first];
        let mut seen = FnvHashSet::default();
        seen.insert(first);
        seen.insert(graph.complement_edge(first));
        let mut length = graph.edge_length(first);
        let mut node = graph.target(first);

        while graph.in_edges(node).len() == 1 && graph.out_edges(node).len() == 1 {
            let next = graph.out_edges(node)[0];
            if seen.contains(&next) || length > self.params.max_bubble_length {
                return None;
            }
            seen.insert(next);
            seen.insert(graph.complement_edge(next));
            edges.push(next);
            length += graph.edge_length(next);
            node = graph.target(next);
        }

        let usable = edges.iter().all(|&e| {
            graph
                .edge(e)
                .map_or(false, |edge| !edge.repetitive && !edge.self_complement)
        });
        usable.then(|| (Branch { edges, length }, node))
    }

    fn branch_sequence(graph: &RepeatGraph, branch: &Branch) -> Option<Vec<u8>> {
        let mut seq = Vec::with_capacity(branch.length);
        for &e in branch.edges.iter() {
            let part = graph.edge_sequence(e);
            if part.is_empty() {
                return None;
            }
            seq.extend_from_slice(part);
        }
        Some(seq)
    }

    fn similar(&self, graph: &RepeatGraph, branches: &[Branch]) -> bool {
        let longest = branches.iter().map(|b| b.length).max().unwrap_or(0);
        let shortest = branches.iter().map(|b| b.length).min().unwrap_or(0);
        if longest == 0 || longest > self.params.max_bubble_length {
            return false;
        }
        if (longest - shortest) as f64 > self.params.bubble_length_tolerance * longest as f64 {
            return false;
        }

        let seqs = branches
            .iter()
            .map(|b| Self::branch_sequence(graph, b))
            .collect::<Option<Vec<_>>>();
        let seqs = match seqs {
            Some(seqs) => seqs,
            // before materialization only lengths can be compared
            None => return true,
        };

        let band = (self.params.bubble_max_divergence * longest as f64).ceil() as usize + 1;
        seqs[1..].iter().all(|other| {
            sequence_divergence(&seqs[0], other, band) <= self.params.bubble_max_divergence
        })
    }

    /// All bubbles of the graph. Bubbles share no edges, and of a
    /// bubble and its reverse complement only the first found is kept.
    pub fn find_bubbles(&self, graph: &RepeatGraph) -> Vec<Bubble> {
        let mut used: FnvHashSet<EdgeId> = FnvHashSet::default();
        let mut bubbles = Vec::new();

        for start in graph.node_ids().collect::<Vec<_>>() {
            if graph.out_edges(start).len() < 2 {
                continue;
            }
            let mut out = graph.out_edges(start).to_vec();
            out.sort();

            let mut by_end: FnvHashMap<NodeId, Vec<Branch>> = FnvHashMap::default();
            for e in out {
                if let Some((branch, end)) = self.trace_branch(graph, e) {
                    by_end.entry(end).or_default().push(branch);
                }
            }

            let mut ends = by_end.into_iter().collect::<Vec<_>>();
            ends.sort_by_key(|(end, _)| *end);

            for (end, branches) in ends {
                if branches.len() < 2 || end == start {
                    continue;
                }
                let mut edges = FnvHashSet::default();
                let disjoint = branches.iter().flat_map(|b| b.edges.iter()).all(|&e| {
                    edges.insert(e) && edges.insert(graph.complement_edge(e))
                });
                if !disjoint || edges.iter().any(|e| used.contains(e)) {
                    continue;
                }
                if !self.similar(graph, &branches) {
                    trace!(
                        "branches from {} to {} are too different for a bubble",
                        start,
                        end
                    );
                    continue;
                }

                used.extend(edges);
                bubbles.push(Bubble {
                    start,
                    end,
                    branches,
                });
            }
        }

        bubbles
    }

    fn support(graph: &RepeatGraph, branch: &Branch) -> u64 {
        branch
            .edges
            .iter()
            .filter_map(|&e| graph.edge(e))
            .map(|e| e.aligned_bases)
            .sum()
    }

    /// Index of the branch to keep: most aligned bases, then lowest
    /// first edge.
    fn representative(graph: &RepeatGraph, bubble: &Bubble) -> usize {
        let mut best = 0;
        for (i, branch) in bubble.branches.iter().enumerate().skip(1) {
            let (s, b) = (
                Self::support(graph, branch),
                Self::support(graph, &bubble.branches[best]),
            );
            if s > b || (s == b && branch.edges[0] < bubble.branches[best].edges[0]) {
                best = i;
            }
        }
        best
    }

    /// Add `bases` to the kept branch, split by edge length with the
    /// remainder on the first edge.
    fn add_support(graph: &mut RepeatGraph, kept: &Branch, bases: u64) {
        let total = kept.length.max(1) as u64;
        let shares = kept
            .edges
            .iter()
            .map(|&e| bases * graph.edge_length(e) as u64 / total)
            .collect::<Vec<_>>();
        let remainder = bases - shares.iter().sum::<u64>();

        for (i, (&e, share)) in kept.edges.iter().zip(shares).enumerate() {
            let extra = if i == 0 { share + remainder } else { share };
            let len = graph.edge_length(e).max(1) as f64;
            graph.update_pair(e, |edge| {
                edge.aligned_bases += extra;
                edge.mean_coverage = edge.aligned_bases as f64 / len;
            });
        }
    }

    fn remove_branch(graph: &mut RepeatGraph, branch: &Branch) {
        let inner = branch
            .edges
            .iter()
            .skip(1)
            .map(|&e| graph.source(e))
            .collect::<Vec<_>>();
        for &e in branch.edges.iter() {
            graph.remove_edge_pair(e);
        }
        for node in inner {
            if graph.node(node).map_or(false, |n| n.is_isolated()) {
                graph.remove_node_pair(node);
            }
        }
    }

    /// Replacement steps for a full traversal of a removed branch: the
    /// read interval is split over the kept edges by length.
    fn replacement(graph: &RepeatGraph, run: &[EdgeAlignment], kept: &[EdgeId]) -> Vec<EdgeAlignment> {
        let read_start = run[0].read_start;
        let read_end = run[run.len() - 1].read_end;
        let span = read_end.saturating_sub(read_start);
        let total: usize = kept.iter().map(|&e| graph.edge_length(e)).sum::<usize>().max(1);

        let mut pos = read_start;
        let mut walked = 0;
        kept.iter()
            .map(|&e| {
                let len = graph.edge_length(e);
                walked += len;
                let end = read_start + span * walked / total;
                let step = EdgeAlignment {
                    edge: e,
                    read_start: pos,
                    read_end: end,
                    edge_start: 0,
                    edge_end: len,
                };
                pos = end;
                step
            })
            .collect()
    }

    /// Move full traversals of removed branches, on either strand, to
    /// the kept branch. Must run while the removed edges still exist.
    fn remap(graph: &RepeatGraph, alignments: &mut AlignmentSet, moves: &[(Vec<EdgeId>, Vec<EdgeId>)]) {
        let comp_path = |path: &[EdgeId]| {
            path.iter()
                .rev()
                .map(|&e| graph.complement_edge(e))
                .collect::<Vec<_>>()
        };
        let patterns = moves
            .iter()
            .flat_map(|(from, to)| [(from.clone(), to.clone()), (comp_path(from), comp_path(to))])
            .collect::<Vec<_>>();

        for aln in alignments.iter_mut() {
            let mut steps = Vec::with_capacity(aln.steps.len());
            let mut i = 0;
            'steps: while i < aln.steps.len() {
                for (from, to) in patterns.iter() {
                    let end = i + from.len();
                    if end <= aln.steps.len()
                        && aln.steps[i..end].iter().map(|s| s.edge).eq(from.iter().copied())
                    {
                        steps.extend(Self::replacement(graph, &aln.steps[i..end], to));
                        i = end;
                        continue 'steps;
                    }
                }
                steps.push(aln.steps[i]);
                i += 1;
            }
            aln.steps = steps;
        }
    }

    /// Find all bubbles and collapse them, or with `keep_haplotypes`
    /// only mark their branches as alternatives.
    pub fn resolve(&self, graph: &mut RepeatGraph, alignments: &mut AlignmentSet) -> HaplotypeReport {
        let t = std::time::Instant::now();
        let bubbles = self.find_bubbles(graph);
        let mut report = HaplotypeReport {
            bubbles: bubbles.len(),
            ..Default::default()
        };

        for (group, bubble) in bubbles.iter().enumerate() {
            if self.params.keep_haplotypes {
                for branch in bubble.branches.iter() {
                    for &e in branch.edges.iter() {
                        graph.update_pair(e, |edge| edge.alt_group = Some(group as u32));
                    }
                }
                report.marked += 1;
                continue;
            }

            let keep = Self::representative(graph, bubble);
            let kept = &bubble.branches[keep];
            let removed = bubble
                .branches
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != keep)
                .map(|(_, b)| b)
                .collect::<Vec<_>>();

            let moved: u64 = removed.iter().map(|b| Self::support(graph, b)).sum();
            let moves = removed
                .iter()
                .map(|b| (b.edges.clone(), kept.edges.clone()))
                .collect::<Vec<_>>();
            Self::remap(graph, alignments, &moves);

            Self::add_support(graph, kept, moved);
            for branch in removed {
                report.edges_removed += branch.edges.len();
                Self::remove_branch(graph, branch);
            }

            debug!(
                "collapsed bubble {} -> {} onto edge {}, moved {} aligned bases",
                bubble.start,
                bubble.end,
                kept.edges[0].signed(),
                moved
            );
            report.collapsed += 1;
        }

        if report.collapsed > 0 {
            alignments.retain_valid(graph);
        }

        info!(
            "Found {} haplotype bubbles, {} collapsed, {} kept as alternatives",
            report.bubbles, report.collapsed, report.marked
        );
        debug!(
            "haplotype resolution in {:.3} ms",
            t.elapsed().as_secs_f64() * 1000.0
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::aligner::ReadAlignment;
    use crate::graph::tests::seg;
    use crate::graph::validate::{validate, validate_alignments};
    use crate::handle::SeqId;
    use crate::overlap::tests::random_dna;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn mutate(rng: &mut StdRng, seq: &[u8], rate: f64) -> Vec<u8> {
        seq.iter()
            .map(|&b| {
                if rng.gen_bool(rate) {
                    match b {
                        b'A' => b'C',
                        b'C' => b'G',
                        b'G' => b'T',
                        _ => b'A',
                    }
                } else {
                    b
                }
            })
            .collect()
    }

    struct BubbleGraph {
        graph: RepeatGraph,
        left: EdgeId,
        /// One edge.
        first: Vec<EdgeId>,
        /// Two edges through a sequence boundary.
        second: Vec<EdgeId>,
        right: EdgeId,
    }

    /// ```text
    ///                 first
    ///           /------------\
    ///  --left-> u             v --right->
    ///           \--s0--w--s1-/
    ///               second
    /// ```
    fn bubble_graph(second_seq: impl FnOnce(&[u8]) -> Vec<u8>) -> BubbleGraph {
        let mut rng = StdRng::seed_from_u64(21);
        let hap = random_dna(&mut rng, 1000);
        let alt = second_seq(&hap);

        let mut graph = RepeatGraph::new();
        let a = graph.add_node_pair();
        let u = graph.add_node_pair();
        let v = graph.add_node_pair();
        let b = graph.add_node_pair();
        let w = graph.add_node_pair();

        let edge = |graph: &mut RepeatGraph,
                    from: NodeId,
                    to: NodeId,
                    index: usize,
                    seq: Vec<u8>| {
            let len = seq.len();
            let e = graph.add_edge_pair(from, to, vec![seg(index, 0, len, len)]);
            graph.set_edge_sequence(e, seq);
            e
        };

        let left = edge(&mut graph, a, u, 0, random_dna(&mut rng, 2000));
        let first = edge(&mut graph, u, v, 1, hap);
        let split = alt.len() / 2;
        let s0 = edge(&mut graph, u, w, 2, alt[..split].to_vec());
        let s1 = edge(&mut graph, w, v, 3, alt[split..].to_vec());
        let right = edge(&mut graph, v, b, 4, random_dna(&mut rng, 2000));

        BubbleGraph {
            graph,
            left,
            first: vec![first],
            second: vec![s0, s1],
            right,
        }
    }

    fn set_bases(graph: &mut RepeatGraph, e: EdgeId, bases: u64) {
        let len = graph.edge_length(e) as f64;
        graph.update_pair(e, |edge| {
            edge.aligned_bases = bases;
            edge.mean_coverage = bases as f64 / len;
        });
    }

    fn total_bases(graph: &RepeatGraph) -> u64 {
        graph
            .forward_edge_ids()
            .map(|e| graph.edge(e).unwrap().aligned_bases)
            .sum()
    }

    fn through(graph: &RepeatGraph, path: &[EdgeId]) -> ReadAlignment {
        let mut pos = 0;
        let steps = path
            .iter()
            .map(|&e| {
                let len = graph.edge_length(e);
                let step = EdgeAlignment {
                    edge: e,
                    read_start: pos,
                    read_end: pos + len,
                    edge_start: 0,
                    edge_end: len,
                };
                pos += len;
                step
            })
            .collect();
        ReadAlignment {
            read: SeqId::forward_of(0),
            read_len: pos,
            steps,
            divergence: 0.0,
            score: pos as i64,
        }
    }

    #[test]
    fn similar_branches_form_a_bubble() {
        let mut rng = StdRng::seed_from_u64(3);
        let bg = bubble_graph(|hap| mutate(&mut rng, hap, 0.03));
        let params = Parameters::default();
        let bubbles = HaplotypeResolver::new(&params).find_bubbles(&bg.graph);

        assert_eq!(bubbles.len(), 1);
        let bubble = &bubbles[0];
        assert_eq!(bubble.start, bg.graph.source(bg.first[0]));
        assert_eq!(bubble.branches[0].edges, bg.first);
        assert_eq!(bubble.branches[1].edges, bg.second);
    }

    #[test]
    fn unrelated_or_uneven_branches_are_not_bubbles() {
        let params = Parameters::default();
        let resolver = HaplotypeResolver::new(&params);

        let mut rng = StdRng::seed_from_u64(4);
        let bg = bubble_graph(|hap| random_dna(&mut rng, hap.len()));
        assert!(resolver.find_bubbles(&bg.graph).is_empty());

        let bg = bubble_graph(|hap| hap[..600].to_vec());
        assert!(resolver.find_bubbles(&bg.graph).is_empty());
    }

    #[test]
    fn collapse_conserves_support() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut bg = bubble_graph(|hap| mutate(&mut rng, hap, 0.02));
        let graph = &mut bg.graph;
        set_bases(graph, bg.left, 30_000);
        set_bases(graph, bg.first[0], 9_000);
        set_bases(graph, bg.second[0], 3_001);
        set_bases(graph, bg.second[1], 2_999);
        set_bases(graph, bg.right, 30_000);

        let mut path = vec![bg.left];
        path.extend(bg.second.iter().copied());
        path.push(bg.right);
        let via_second = through(graph, &path);
        let via_second_rc = via_second.complement(graph);
        let mut alignments = AlignmentSet::new(vec![via_second, via_second_rc]);

        let before = total_bases(graph);
        let params = Parameters::default();
        let report = HaplotypeResolver::new(&params).resolve(graph, &mut alignments);

        assert_eq!(report.collapsed, 1);
        assert_eq!(report.edges_removed, 2);
        assert_eq!(total_bases(graph), before);
        assert_eq!(graph.edge(bg.first[0]).unwrap().aligned_bases, 15_000);
        assert!(!graph.has_edge(bg.second[0]));
        validate(graph);

        assert_eq!(alignments.len(), 2);
        assert_eq!(
            alignments.as_slice()[0].edges().collect::<Vec<_>>(),
            vec![bg.left, bg.first[0], bg.right]
        );
        validate_alignments(graph, &alignments);
    }

    #[test]
    fn ties_keep_the_lower_edge() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut bg = bubble_graph(|hap| mutate(&mut rng, hap, 0.01));
        set_bases(&mut bg.graph, bg.first[0], 500);
        set_bases(&mut bg.graph, bg.second[0], 250);
        set_bases(&mut bg.graph, bg.second[1], 250);

        let params = Parameters::default();
        HaplotypeResolver::new(&params).resolve(&mut bg.graph, &mut AlignmentSet::default());
        assert!(bg.graph.has_edge(bg.first[0]));
        assert!(!bg.graph.has_edge(bg.second[1]));
    }

    #[test]
    fn kept_haplotypes_are_marked() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut bg = bubble_graph(|hap| mutate(&mut rng, hap, 0.02));
        let params = Parameters {
            keep_haplotypes: true,
            ..Parameters::default()
        };
        let edges = bg.graph.edge_count();
        let report =
            HaplotypeResolver::new(&params).resolve(&mut bg.graph, &mut AlignmentSet::default());

        assert_eq!(report.marked, 1);
        assert_eq!(bg.graph.edge_count(), edges);
        for &e in bg.first.iter().chain(bg.second.iter()) {
            assert_eq!(bg.graph.edge(e).unwrap().alt_group, Some(0));
            let comp = bg.graph.complement_edge(e);
            assert_eq!(bg.graph.edge(comp).unwrap().alt_group, Some(0));
        }
        assert_eq!(bg.graph.edge(bg.left).unwrap().alt_group, None);
    }
}
