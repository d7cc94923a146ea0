/*!
Resolution of repeats with reads that span them.

Connected repetitive edges form a repeat cluster. A cluster of
multiplicity `m` is a candidate when exactly `m` unique flank edges
enter its nodes and exactly `m` leave them. Every read that enters
through a flank `X`, crosses the cluster along some path `P` and
leaves through a flank `Y` votes for the copy `(X, P, Y)`. The cluster
is split only when the votes with enough support pair the `m` incoming
flanks with the `m` outgoing flanks one to one, agree on the path
between every pair and together cover every edge of the cluster;
anything less leaves the repeat as it is.

Each cluster goes through [`RepeatState::Evaluating`] exactly once per
resolver, ending either [`RepeatState::Resolved`] or
[`RepeatState::UnresolvedFinal`].
*/

use fnv::{FnvHashMap, FnvHashSet};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::aligner::AlignmentSet;
use crate::config::Parameters;
use crate::graph::{EdgeGraph, EdgeSegment, RepeatGraph};
use crate::handle::{EdgeId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepeatState {
    Unresolved,
    Evaluating,
    Resolved,
    UnresolvedFinal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverReport {
    pub resolved: usize,
    pub unresolved: usize,
    pub copies: usize,
    /// Alignments that lost steps which could not be assigned to a copy.
    pub alignments_changed: usize,
}

/// A maximal set of connected repetitive edges, one strand only, in
/// ascending id order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatCluster {
    pub edges: Vec<EdgeId>,
}

impl RepeatCluster {
    fn name(&self) -> String {
        self.edges
            .iter()
            .map(|e| e.signed().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// The flank edges around a candidate cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Flanks {
    incoming: Vec<EdgeId>,
    outgoing: Vec<EdgeId>,
}

/// One genomic copy of a cluster: the path from an incoming flank to
/// an outgoing flank.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct RepeatCopy {
    entry: EdgeId,
    path: Vec<EdgeId>,
    exit: EdgeId,
}

pub struct RepeatResolver<'a> {
    params: &'a Parameters,
    clusters: Vec<RepeatCluster>,
    states: Vec<RepeatState>,
    cluster_of: FnvHashMap<EdgeId, usize>,
}

impl<'a> RepeatResolver<'a> {
    pub fn new(params: &'a Parameters) -> Self {
        RepeatResolver {
            params,
            clusters: Vec::new(),
            states: Vec::new(),
            cluster_of: FnvHashMap::default(),
        }
    }

    pub fn clusters(&self) -> &[RepeatCluster] {
        &self.clusters
    }

    /// State of the cluster containing `edge`, on either strand, or
    /// `None` if it never was part of a candidate.
    pub fn state(&self, edge: EdgeId) -> Option<RepeatState> {
        self.cluster_of.get(&edge).map(|&ix| self.states[ix])
    }

    /// Group the repetitive edges into clusters connected through
    /// shared nodes. The complement of a cluster is not reported
    /// separately.
    fn find_clusters(graph: &RepeatGraph) -> Vec<Vec<EdgeId>> {
        let repeat = |e: EdgeId| {
            graph
                .edge(e)
                .map_or(false, |edge| edge.repetitive && !edge.self_complement)
        };

        let mut assigned: FnvHashSet<EdgeId> = FnvHashSet::default();
        let mut clusters = Vec::new();
        for start in graph.forward_edge_ids() {
            if !repeat(start) || assigned.contains(&start) {
                continue;
            }
            assigned.insert(start);
            assigned.insert(graph.complement_edge(start));

            let mut edges = Vec::new();
            let mut stack = vec![start];
            while let Some(e) = stack.pop() {
                edges.push(e);
                for node in [graph.source(e), graph.target(e)] {
                    let incident = graph.in_edges(node).iter().chain(graph.out_edges(node));
                    for &next in incident {
                        if repeat(next) && assigned.insert(next) {
                            assigned.insert(graph.complement_edge(next));
                            stack.push(next);
                        }
                    }
                }
            }
            edges.sort();
            clusters.push(edges);
        }
        clusters
    }

    fn flanks(graph: &RepeatGraph, cluster: &[EdgeId]) -> Result<Flanks, &'static str> {
        let mut m = 0;
        let mut nodes = Vec::with_capacity(cluster.len() * 2);
        for &e in cluster.iter() {
            let edge = match graph.edge(e) {
                Some(edge) => edge,
                None => return Err("edge was removed"),
            };
            if edge.is_looped() {
                return Err("repeat is a loop or a hairpin");
            }
            m = m.max(edge.multiplicity as usize);
            nodes.push(edge.source);
            nodes.push(edge.target);
        }
        if m < 2 {
            return Err("multiplicity below 2");
        }
        nodes.sort();
        nodes.dedup();
        if nodes
            .iter()
            .any(|&n| nodes.binary_search(&graph.complement_node(n)).is_ok())
        {
            return Err("repeat is a loop or a hairpin");
        }

        let members = cluster.iter().copied().collect::<FnvHashSet<_>>();
        let mut incoming = Vec::new();
        let mut outgoing = Vec::new();
        for &n in nodes.iter() {
            incoming.extend(graph.in_edges(n).iter().filter(|e| !members.contains(*e)));
            outgoing.extend(graph.out_edges(n).iter().filter(|e| !members.contains(*e)));
        }
        incoming.sort();
        outgoing.sort();
        if incoming.len() != m || outgoing.len() != m {
            return Err("flank count differs from multiplicity");
        }

        let mut seen = FnvHashSet::default();
        for &x in incoming.iter().chain(outgoing.iter()) {
            let flank = match graph.edge(x) {
                Some(flank) => flank,
                None => return Err("flank was removed"),
            };
            if flank.self_complement || flank.is_looped() {
                return Err("flank is looped");
            }
            if flank.repetitive {
                return Err("flank is repetitive");
            }
            if !seen.insert(x) || seen.contains(&flank.complement) {
                return Err("flanks are shared");
            }
        }

        Ok(Flanks { incoming, outgoing })
    }

    /// Number of read paths `X, P, Y` through the cluster for every
    /// flank pair and inner path, counting reads of either strand
    /// once.
    fn spanning_copies(
        graph: &RepeatGraph,
        alignments: &AlignmentSet,
        cluster: &[EdgeId],
        flanks: &Flanks,
    ) -> FnvHashMap<RepeatCopy, usize> {
        let members = cluster.iter().copied().collect::<FnvHashSet<_>>();
        let mut copies: FnvHashMap<RepeatCopy, usize> = FnvHashMap::default();
        for aln in alignments.both_strands(graph) {
            let edges = aln.edges().collect::<Vec<_>>();
            for (i, &x) in edges.iter().enumerate() {
                if !flanks.incoming.contains(&x) {
                    continue;
                }
                let mut j = i + 1;
                while j < edges.len() && members.contains(&edges[j]) {
                    j += 1;
                }
                if j == i + 1 || j >= edges.len() || !flanks.outgoing.contains(&edges[j]) {
                    continue;
                }
                let copy = RepeatCopy {
                    entry: x,
                    path: edges[i + 1..j].to_vec(),
                    exit: edges[j],
                };
                *copies.entry(copy).or_default() += 1;
            }
        }
        copies
    }

    /// The supported copies, if they pair the flanks one to one and
    /// cover the whole cluster.
    fn matching(
        &self,
        votes: &FnvHashMap<RepeatCopy, usize>,
        cluster: &[EdgeId],
        flanks: &Flanks,
    ) -> Result<Vec<RepeatCopy>, &'static str> {
        let mut supported = votes
            .iter()
            .filter(|(_, &count)| count >= self.params.min_spanning_reads)
            .map(|(copy, _)| copy.clone())
            .collect::<Vec<_>>();
        supported.sort();

        if supported
            .windows(2)
            .any(|w| w[0].entry == w[1].entry && w[0].exit == w[1].exit)
        {
            return Err("reads disagree on the path through the repeat");
        }
        if supported.len() != flanks.incoming.len() {
            return Err("supported flank pairs do not match the multiplicity");
        }

        let mut used_in = FnvHashSet::default();
        let mut used_out = FnvHashSet::default();
        for copy in supported.iter() {
            if !used_in.insert(copy.entry) || !used_out.insert(copy.exit) {
                return Err("flank pairs are ambiguous");
            }
        }

        let covered = supported
            .iter()
            .flat_map(|c| c.path.iter().copied())
            .collect::<FnvHashSet<_>>();
        if cluster.iter().any(|e| !covered.contains(e)) {
            return Err("repeat edge is not part of any copy");
        }
        Ok(supported)
    }

    /// Decide whether `cluster` can be split, and how.
    fn evaluate(
        &self,
        graph: &RepeatGraph,
        alignments: &AlignmentSet,
        cluster: &[EdgeId],
    ) -> Result<Vec<RepeatCopy>, &'static str> {
        let flanks = Self::flanks(graph, cluster)?;
        let votes = Self::spanning_copies(graph, alignments, cluster, &flanks);
        self.matching(&votes, cluster, &flanks)
    }

    /// For every edge on the path of `copy`, the segment that continues
    /// the sequence of the incoming flank, or failing that the one
    /// continued by the outgoing flank.
    fn copy_segments(graph: &RepeatGraph, copy: &RepeatCopy) -> Vec<Vec<EdgeSegment>> {
        let segments_of = |e: EdgeId| graph.edge(e).map(|e| e.segments.as_slice()).unwrap_or(&[]);

        let mut chosen: Vec<Option<EdgeSegment>> = vec![None; copy.path.len()];
        let mut prev = segments_of(copy.entry).to_vec();
        for (k, &e) in copy.path.iter().enumerate() {
            chosen[k] = segments_of(e)
                .iter()
                .find(|s| prev.iter().any(|p| p.continues_into(s)))
                .copied();
            prev = chosen[k].into_iter().collect();
        }

        let mut next = segments_of(copy.exit).to_vec();
        for (k, &e) in copy.path.iter().enumerate().rev() {
            if chosen[k].is_none() {
                chosen[k] = segments_of(e)
                    .iter()
                    .find(|s| next.iter().any(|n| s.continues_into(n)))
                    .or_else(|| segments_of(e).first())
                    .copied();
            }
            next = chosen[k].into_iter().collect();
        }

        chosen.into_iter().map(|s| s.into_iter().collect()).collect()
    }

    fn remove_if_isolated(graph: &mut RepeatGraph, node: NodeId) {
        let isolated = |n: NodeId| graph.node(n).map_or(false, |n| n.is_isolated());
        if isolated(node) && isolated(graph.complement_node(node)) {
            graph.remove_node_pair(node);
        }
    }

    /// Replace the cluster by one chain of new edges per copy. Returns
    /// the new edges of every copy, in the order of `copies`.
    fn split(graph: &mut RepeatGraph, cluster: &[EdgeId], copies: &[RepeatCopy]) -> Vec<Vec<EdgeId>> {
        let original = cluster
            .iter()
            .filter_map(|&e| graph.edge(e).map(|edge| (e, edge.clone())))
            .collect::<FnvHashMap<_, _>>();
        let mut nodes = original
            .values()
            .flat_map(|edge| [edge.source, edge.target])
            .collect::<Vec<_>>();
        nodes.sort();
        nodes.dedup();

        let mut result = Vec::with_capacity(copies.len());
        for copy in copies.iter() {
            let segments = Self::copy_segments(graph, copy);

            let mut from = graph.add_node_pair();
            graph.set_target(copy.entry, from);

            let mut chain = Vec::with_capacity(copy.path.len());
            for (k, e) in copy.path.iter().enumerate() {
                let to = graph.add_node_pair();
                let id = graph.add_edge_pair(from, to, segments[k].clone());
                if let Some(old) = original.get(e) {
                    if !old.sequence.is_empty() {
                        graph.set_edge_sequence(id, old.sequence.clone());
                    }
                    let m = old.multiplicity.max(1);
                    let (aligned, coverage) = (old.aligned_bases, old.mean_coverage);
                    graph.update_pair(id, |edge| {
                        edge.multiplicity = 1;
                        edge.repetitive = false;
                        edge.resolved = true;
                        edge.aligned_bases = aligned / m as u64;
                        edge.mean_coverage = coverage / m as f64;
                    });
                }
                chain.push(id);
                from = to;
            }
            graph.set_source(copy.exit, from);
            result.push(chain);
        }

        for &e in cluster.iter() {
            graph.remove_edge_pair(e);
        }
        for node in nodes {
            Self::remove_if_isolated(graph, node);
        }

        result
    }

    /// Move alignment steps on the removed cluster, or its complement,
    /// onto the copy their neighbouring flanks select. A run of steps
    /// inside the cluster is moved only if exactly one copy contains
    /// it next to the flank it was entered or left through.
    fn remap(
        graph: &RepeatGraph,
        alignments: &mut AlignmentSet,
        comp_of: &FnvHashMap<EdgeId, EdgeId>,
        copies: &[RepeatCopy],
        chains: &[Vec<EdgeId>],
    ) {
        let comp = |e: EdgeId| comp_of.get(&e).copied().unwrap_or_else(|| graph.complement_edge(e));

        // both strands of every copy, with the new edges along the path
        let mut oriented: Vec<(RepeatCopy, Vec<EdgeId>, bool)> = Vec::with_capacity(copies.len() * 2);
        for (copy, chain) in copies.iter().zip(chains.iter()) {
            oriented.push((copy.clone(), chain.clone(), true));
            let reverse = RepeatCopy {
                entry: comp(copy.exit),
                path: copy.path.iter().rev().map(|&e| comp(e)).collect(),
                exit: comp(copy.entry),
            };
            let chain = chain.iter().rev().map(|&e| comp(e)).collect();
            oriented.push((reverse, chain, false));
        }
        let forward = comp_of.keys().copied().collect::<FnvHashSet<_>>();
        let reverse = comp_of.values().copied().collect::<FnvHashSet<_>>();

        for aln in alignments.iter_mut() {
            let mut i = 0;
            while i < aln.steps.len() {
                let edge = aln.steps[i].edge;
                let is_forward = forward.contains(&edge);
                if !is_forward && !reverse.contains(&edge) {
                    i += 1;
                    continue;
                }
                let strand = if is_forward { &forward } else { &reverse };
                let mut j = i + 1;
                while j < aln.steps.len() && strand.contains(&aln.steps[j].edge) {
                    j += 1;
                }

                let run = aln.steps[i..j].iter().map(|s| s.edge).collect::<Vec<_>>();
                let prev = i.checked_sub(1).map(|p| aln.steps[p].edge);
                let next = aln.steps.get(j).map(|s| s.edge);

                let fits = oriented
                    .iter()
                    .filter(|(_, _, fwd)| *fwd == is_forward)
                    .filter_map(|(copy, chain, _)| {
                        if run.len() > copy.path.len() {
                            return None;
                        }
                        let by_prev = prev == Some(copy.entry);
                        let by_next = next == Some(copy.exit);
                        let offset = if by_prev {
                            0
                        } else if by_next {
                            copy.path.len() - run.len()
                        } else {
                            return None;
                        };
                        if by_prev && by_next && run.len() != copy.path.len() {
                            return None;
                        }
                        (copy.path[offset..offset + run.len()] == run[..])
                            .then(|| &chain[offset..offset + run.len()])
                    })
                    .collect::<Vec<_>>();

                if let [chain] = fits.as_slice() {
                    for (step, &e) in aln.steps[i..j].iter_mut().zip(chain.iter()) {
                        step.edge = e;
                    }
                }
                i = j;
            }
        }
    }

    /// Resolve every cluster the alignments allow to, in ascending
    /// order of their lowest edge id. Alignments are remapped onto the
    /// new copies.
    pub fn resolve(&mut self, graph: &mut RepeatGraph, alignments: &mut AlignmentSet) -> ResolverReport {
        let t = std::time::Instant::now();
        let mut report = ResolverReport::default();

        let first = self.clusters.len();
        for edges in Self::find_clusters(graph) {
            if edges.iter().any(|e| self.cluster_of.contains_key(e)) {
                continue;
            }
            let ix = self.clusters.len();
            for &e in edges.iter() {
                self.cluster_of.insert(e, ix);
                self.cluster_of.insert(graph.complement_edge(e), ix);
            }
            self.clusters.push(RepeatCluster { edges });
            self.states.push(RepeatState::Unresolved);
        }

        for ix in first..self.clusters.len() {
            if self.states[ix] != RepeatState::Unresolved {
                continue;
            }
            self.states[ix] = RepeatState::Evaluating;
            let cluster = &self.clusters[ix];

            let state = match self.evaluate(graph, alignments, &cluster.edges) {
                Ok(copies) => {
                    let comp_of = cluster
                        .edges
                        .iter()
                        .map(|&e| (e, graph.complement_edge(e)))
                        .collect::<FnvHashMap<_, _>>();
                    let chains = Self::split(graph, &cluster.edges, &copies);
                    Self::remap(graph, alignments, &comp_of, &copies, &chains);
                    report.alignments_changed += alignments.retain_valid(graph);

                    debug!(
                        "repeat {} resolved into {} copies: {}",
                        cluster.name(),
                        chains.len(),
                        chains
                            .iter()
                            .map(|c| c
                                .iter()
                                .map(|e| e.signed().to_string())
                                .collect::<Vec<_>>()
                                .join(","))
                            .collect::<Vec<_>>()
                            .join(" ")
                    );
                    report.resolved += 1;
                    report.copies += chains.len();
                    RepeatState::Resolved
                }
                Err(reason) => {
                    debug!("repeat {} left unresolved: {}", cluster.name(), reason);
                    report.unresolved += 1;
                    RepeatState::UnresolvedFinal
                }
            };
            self.states[ix] = state;
        }

        info!(
            "Resolved {} repeats into {} copies, {} left unresolved",
            report.resolved, report.copies, report.unresolved
        );
        debug!(
            "repeat resolution in {:.3} ms",
            t.elapsed().as_secs_f64() * 1000.0
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::aligner::{EdgeAlignment, ReadAlignment};
    use crate::graph::tests::seg;
    use crate::graph::validate::{validate, validate_alignments};
    use crate::handle::SeqId;

    use quickcheck::{Arbitrary, Gen, QuickCheck};

    struct Star {
        graph: RepeatGraph,
        incoming: Vec<EdgeId>,
        repeat: EdgeId,
        outgoing: Vec<EdgeId>,
    }

    /// `m` sequences `X_i R Y_i` of length 2500 sharing the middle
    /// 500 bases.
    fn repeat_star(m: usize) -> Star {
        let mut graph = RepeatGraph::new();
        let s = graph.add_node_pair();
        let t = graph.add_node_pair();

        let incoming = (0..m)
            .map(|i| {
                let n = graph.add_node_pair();
                graph.add_edge_pair(n, s, vec![seg(i, 0, 1000, 2500)])
            })
            .collect::<Vec<_>>();
        let repeat = graph.add_edge_pair(s, t, (0..m).map(|i| seg(i, 1000, 1500, 2500)).collect());
        let outgoing = (0..m)
            .map(|i| {
                let n = graph.add_node_pair();
                graph.add_edge_pair(t, n, vec![seg(i, 1500, 2500, 2500)])
            })
            .collect::<Vec<_>>();

        Star {
            graph,
            incoming,
            repeat,
            outgoing,
        }
    }

    fn spanning(read: usize, x: EdgeId, r: EdgeId, y: EdgeId) -> ReadAlignment {
        let step = |edge, read_start, edge_start, len| EdgeAlignment {
            edge,
            read_start,
            read_end: read_start + len,
            edge_start,
            edge_end: edge_start + len,
        };
        ReadAlignment {
            read: SeqId::forward_of(read),
            read_len: 1500,
            steps: vec![step(x, 0, 500, 500), step(r, 500, 0, 500), step(y, 1000, 0, 500)],
            divergence: 0.0,
            score: 1500,
        }
    }

    #[test]
    fn supported_repeat_is_split() {
        let Star {
            mut graph,
            incoming,
            repeat,
            outgoing,
        } = repeat_star(3);
        assert_eq!(graph.edge(repeat).unwrap().multiplicity, 3);

        let mut alns = (0..3)
            .map(|i| spanning(i, incoming[i], repeat, outgoing[i]))
            .collect::<Vec<_>>();
        // the third read comes from the other strand
        alns[2] = alns[2].complement(&graph);
        let mut alignments = AlignmentSet::new(alns);

        let params = Parameters::default();
        let mut resolver = RepeatResolver::new(&params);
        let report = resolver.resolve(&mut graph, &mut alignments);

        assert_eq!(report.resolved, 1);
        assert_eq!(report.copies, 3);
        assert_eq!(report.alignments_changed, 0);
        assert_eq!(resolver.state(repeat), Some(RepeatState::Resolved));
        assert!(!graph.has_edge(repeat));
        validate(&graph);
        validate_alignments(&graph, &alignments);

        for i in 0..3 {
            let copy = graph.out_edges(graph.target(incoming[i]))[0];
            let edge = graph.edge(copy).unwrap();
            assert!(edge.resolved);
            assert_eq!(edge.multiplicity, 1);
            assert_eq!(edge.segments, vec![seg(i, 1000, 1500, 2500)]);
            assert_eq!(graph.out_edges(edge.target), &[outgoing[i]]);
        }

        for (i, aln) in alignments.iter().enumerate() {
            let aln = if i == 2 { aln.complement(&graph) } else { aln.clone() };
            let edges = aln.edges().collect::<Vec<_>>();
            assert_eq!(edges[0], incoming[i]);
            assert!(graph.edge(edges[1]).unwrap().resolved);
            assert_eq!(edges[2], outgoing[i]);
        }
    }

    #[test]
    fn conflicting_flanks_stay_unresolved() {
        let Star {
            mut graph,
            incoming,
            repeat,
            outgoing,
        } = repeat_star(3);
        let mut alignments = AlignmentSet::new(vec![
            spanning(0, incoming[0], repeat, outgoing[0]),
            spanning(1, incoming[0], repeat, outgoing[1]),
            spanning(2, incoming[1], repeat, outgoing[1]),
            spanning(3, incoming[2], repeat, outgoing[2]),
        ]);
        let before = graph.clone();

        let params = Parameters::default();
        let mut resolver = RepeatResolver::new(&params);
        let report = resolver.resolve(&mut graph, &mut alignments);

        assert_eq!(report.resolved, 0);
        assert_eq!(report.unresolved, 1);
        assert_eq!(resolver.state(repeat), Some(RepeatState::UnresolvedFinal));
        assert_eq!(graph.edge_count(), before.edge_count());
        assert!(graph.has_edge(repeat));
    }

    #[test]
    fn repetitive_flank_stays_unresolved() {
        let Star {
            mut graph,
            incoming,
            repeat,
            outgoing,
        } = repeat_star(2);
        graph.update_pair(incoming[0], |e| e.repetitive = true);
        let mut alignments = AlignmentSet::new(vec![
            spanning(0, incoming[0], repeat, outgoing[0]),
            spanning(1, incoming[1], repeat, outgoing[1]),
        ]);

        let params = Parameters::default();
        let mut resolver = RepeatResolver::new(&params);
        resolver.resolve(&mut graph, &mut alignments);
        assert_eq!(resolver.state(repeat), Some(RepeatState::UnresolvedFinal));
        assert!(graph.has_edge(repeat));
    }

    #[test]
    fn support_threshold() {
        let Star {
            mut graph,
            incoming,
            repeat,
            outgoing,
        } = repeat_star(2);
        let mut alignments = AlignmentSet::new(vec![
            spanning(0, incoming[0], repeat, outgoing[0]),
            spanning(1, incoming[0], repeat, outgoing[0]),
            spanning(2, incoming[1], repeat, outgoing[1]),
        ]);

        let params = Parameters {
            min_spanning_reads: 2,
            ..Parameters::default()
        };
        let report = RepeatResolver::new(&params).resolve(&mut graph, &mut alignments);
        assert_eq!(report.resolved, 0);
    }

    fn read_through(read: usize, path: &[EdgeId]) -> ReadAlignment {
        let steps = path
            .iter()
            .enumerate()
            .map(|(k, &edge)| EdgeAlignment {
                edge,
                read_start: k * 500,
                read_end: (k + 1) * 500,
                edge_start: 0,
                edge_end: 500,
            })
            .collect::<Vec<_>>();
        ReadAlignment {
            read: SeqId::forward_of(read),
            read_len: path.len() * 500,
            steps,
            divergence: 0.0,
            score: (path.len() * 500) as i64,
        }
    }

    /// Two sequences `X_i R1 R2 Y_i` of length 3000 whose shared
    /// middle is cut in two by a node.
    fn two_edge_repeat() -> (RepeatGraph, Vec<EdgeId>, [EdgeId; 2], Vec<EdgeId>) {
        let mut graph = RepeatGraph::new();
        let s = graph.add_node_pair();
        let mid = graph.add_node_pair();
        let t = graph.add_node_pair();

        let incoming = (0..2)
            .map(|i| {
                let n = graph.add_node_pair();
                graph.add_edge_pair(n, s, vec![seg(i, 0, 1000, 3000)])
            })
            .collect::<Vec<_>>();
        let r1 = graph.add_edge_pair(s, mid, (0..2).map(|i| seg(i, 1000, 1500, 3000)).collect());
        let r2 = graph.add_edge_pair(mid, t, (0..2).map(|i| seg(i, 1500, 2000, 3000)).collect());
        let outgoing = (0..2)
            .map(|i| {
                let n = graph.add_node_pair();
                graph.add_edge_pair(t, n, vec![seg(i, 2000, 3000, 3000)])
            })
            .collect::<Vec<_>>();
        (graph, incoming, [r1, r2], outgoing)
    }

    #[test]
    fn chained_repeat_edges_are_split_together() {
        let (mut graph, incoming, [r1, r2], outgoing) = two_edge_repeat();
        let comp_r2 = graph.complement_edge(r2);

        let mut alignments = AlignmentSet::new(vec![
            read_through(0, &[incoming[0], r1, r2, outgoing[0]]),
            read_through(1, &[incoming[1], r1, r2, outgoing[1]]),
            // reads ending inside the repeat follow the flank they touch
            read_through(2, &[incoming[0], r1]),
            read_through(3, &[r2, outgoing[1]]).complement(&graph),
        ]);

        let params = Parameters::default();
        let mut resolver = RepeatResolver::new(&params);
        let report = resolver.resolve(&mut graph, &mut alignments);

        assert_eq!(report.resolved, 1);
        assert_eq!(report.copies, 2);
        assert_eq!(report.alignments_changed, 0);
        assert_eq!(resolver.clusters().len(), 1);
        assert_eq!(resolver.clusters()[0].edges, vec![r1, r2]);
        assert_eq!(resolver.state(r1), Some(RepeatState::Resolved));
        assert_eq!(resolver.state(comp_r2), Some(RepeatState::Resolved));
        assert!(!graph.has_edge(r1) && !graph.has_edge(r2));
        validate(&graph);
        validate_alignments(&graph, &alignments);

        let mut copies = Vec::new();
        for i in 0..2 {
            let c1 = graph.out_edges(graph.target(incoming[i]))[0];
            let c2 = graph.out_edges(graph.target(c1))[0];
            assert_eq!(graph.out_edges(graph.target(c2)), &[outgoing[i]]);
            assert_eq!(graph.edge(c1).unwrap().segments, vec![seg(i, 1000, 1500, 3000)]);
            assert_eq!(graph.edge(c2).unwrap().segments, vec![seg(i, 1500, 2000, 3000)]);
            for c in [c1, c2] {
                let edge = graph.edge(c).unwrap();
                assert!(edge.resolved && !edge.repetitive);
                assert_eq!(edge.multiplicity, 1);
            }
            copies.push((c1, c2));
        }

        let paths = alignments
            .iter()
            .map(|aln| aln.edges().collect::<Vec<_>>())
            .collect::<Vec<_>>();
        assert_eq!(paths[0], vec![incoming[0], copies[0].0, copies[0].1, outgoing[0]]);
        assert_eq!(paths[1], vec![incoming[1], copies[1].0, copies[1].1, outgoing[1]]);
        assert_eq!(paths[2], vec![incoming[0], copies[0].0]);
        assert_eq!(
            paths[3],
            vec![
                graph.complement_edge(outgoing[1]),
                graph.complement_edge(copies[1].1)
            ]
        );
    }

    #[test]
    fn chained_repeat_needs_reads_across_the_whole_cluster() {
        let (mut graph, incoming, [r1, r2], outgoing) = two_edge_repeat();
        let mut alignments = AlignmentSet::new(
            (0..2)
                .flat_map(|i| {
                    [
                        read_through(2 * i, &[incoming[i], r1]),
                        read_through(2 * i + 1, &[r2, outgoing[i]]),
                    ]
                })
                .collect(),
        );
        let before = graph.clone();

        let params = Parameters::default();
        let mut resolver = RepeatResolver::new(&params);
        let report = resolver.resolve(&mut graph, &mut alignments);

        assert_eq!(report.resolved, 0);
        assert_eq!(report.unresolved, 1);
        assert_eq!(resolver.state(r1), Some(RepeatState::UnresolvedFinal));
        assert_eq!(resolver.state(r2), Some(RepeatState::UnresolvedFinal));
        assert_eq!(graph.edge_count(), before.edge_count());
        assert!(graph.has_edge(r1) && graph.has_edge(r2));
    }

    #[derive(Debug, Clone)]
    struct Support {
        /// Bit `i` set if the pair `(X_i, Y_i)` is spanned by a read.
        mask: u8,
        /// Extra read joining `X_a` with `Y_b`, a != b.
        cross: Option<(usize, usize)>,
    }

    impl Arbitrary for Support {
        fn arbitrary(g: &mut Gen) -> Self {
            let mask = u8::arbitrary(g) & 0b111;
            let cross = if bool::arbitrary(g) {
                let a = usize::arbitrary(g) % 3;
                let b = (a + 1 + usize::arbitrary(g) % 2) % 3;
                Some((a, b))
            } else {
                None
            };
            Support { mask, cross }
        }
    }

    fn split_only_when_fully_supported(support: Support) -> bool {
        let Star {
            mut graph,
            incoming,
            repeat,
            outgoing,
        } = repeat_star(3);

        let mut alns = (0..3)
            .filter(|i| support.mask & (1 << i) != 0)
            .map(|i| spanning(i, incoming[i], repeat, outgoing[i]))
            .collect::<Vec<_>>();
        if let Some((a, b)) = support.cross {
            alns.push(spanning(9, incoming[a], repeat, outgoing[b]));
        }
        let mut alignments = AlignmentSet::new(alns);

        let params = Parameters::default();
        let report = RepeatResolver::new(&params).resolve(&mut graph, &mut alignments);

        let expected = support.mask == 0b111 && support.cross.is_none();
        validate(&graph);
        (report.resolved == 1) == expected && graph.has_edge(repeat) != expected
    }

    #[test]
    fn insufficient_flank_support_never_splits() {
        QuickCheck::new()
            .tests(200)
            .quickcheck(split_only_when_fully_supported as fn(Support) -> bool);
    }
}
