/*!
The repeat graph.

Nodes and edges live in dense arenas indexed by [`NodeId`] and
[`EdgeId`]; removed entries leave a hole, so ids are stable for the
lifetime of the graph and are never reused. Every cross-reference
(incident node, complementary edge or node) is an id that is resolved
through the arena.

Edges come in complementary pairs. [`RepeatGraph::add_edge_pair`]
creates both halves, [`RepeatGraph::remove_edge_pair`] destroys both,
and the endpoint setters keep the complement's endpoints consistent.
A self-complementary edge is its own complement.

Each edge carries the [`EdgeSegment`]s of the input sequences it was
glued from. The base sequence of an edge is only materialized by
[`RepeatGraph::update_edge_sequences`], once the topology is final.
*/

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::handle::{Direction, EdgeId, NodeId, SeqId};
use crate::sequence::SequenceStore;
use crate::util::dna;

pub mod condense;
pub mod construction;
pub mod traits;
pub mod validate;

pub use self::traits::EdgeGraph;

/// A half-open interval `[start, end)` of one strand of an input
/// sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeSegment {
    pub seq: SeqId,
    pub start: usize,
    pub end: usize,
    pub seq_len: usize,
}

impl EdgeSegment {
    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// The same interval on the opposite strand.
    #[inline]
    pub fn complement(&self) -> Self {
        EdgeSegment {
            seq: self.seq.flip(),
            start: self.seq_len - self.end,
            end: self.seq_len - self.start,
            seq_len: self.seq_len,
        }
    }

    /// `true` if `next` starts exactly where `self` ends on the same
    /// strand.
    #[inline]
    pub fn continues_into(&self, next: &EdgeSegment) -> bool {
        self.seq == next.seq && self.end == next.start
    }

    pub fn sequence<'a>(&self, store: &'a SequenceStore) -> &'a [u8] {
        store.subsequence(self.seq, self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub complement: NodeId,
    pub in_edges: Vec<EdgeId>,
    pub out_edges: Vec<EdgeId>,
}

impl Node {
    fn new(id: NodeId, complement: NodeId) -> Self {
        Node {
            id,
            complement,
            in_edges: Vec::new(),
            out_edges: Vec::new(),
        }
    }

    #[inline]
    pub fn in_degree(&self) -> usize {
        self.in_edges.len()
    }

    #[inline]
    pub fn out_degree(&self) -> usize {
        self.out_edges.len()
    }

    #[inline]
    pub fn is_isolated(&self) -> bool {
        self.in_edges.is_empty() && self.out_edges.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub complement: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Sorted input intervals this edge was glued from.
    pub segments: Vec<EdgeSegment>,
    /// Empty until materialized.
    pub sequence: Vec<u8>,
    pub multiplicity: u32,
    pub mean_coverage: f64,
    /// Read bases aligned to this edge, over both strands.
    pub aligned_bases: u64,
    pub repetitive: bool,
    pub self_complement: bool,
    /// Created as one copy of a resolved repeat.
    pub resolved: bool,
    /// Bubble this edge is an alternative haplotype of.
    pub alt_group: Option<u32>,
}

impl Edge {
    /// Length of the materialized sequence, or the mean length of
    /// the segments before materialization.
    pub fn length(&self) -> usize {
        if !self.sequence.is_empty() {
            return self.sequence.len();
        }
        if self.segments.is_empty() {
            return 0;
        }
        let total: usize = self.segments.iter().map(|s| s.len()).sum();
        total / self.segments.len()
    }

    #[inline]
    pub fn is_looped(&self) -> bool {
        self.source == self.target
    }

    /// Number of input loci collapsed into this edge.
    #[inline]
    pub fn copies(&self) -> usize {
        self.segments.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RepeatGraph {
    nodes: Vec<Option<Node>>,
    edges: Vec<Option<Edge>>,
    node_count: usize,
    edge_count: usize,
}

fn sorted_segments<I: IntoIterator<Item = EdgeSegment>>(segments: I) -> Vec<EdgeSegment> {
    let mut segments = segments.into_iter().collect::<Vec<_>>();
    segments.sort();
    segments.dedup();
    segments
}

impl RepeatGraph {
    pub fn new() -> Self {
        Default::default()
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(|n| n.as_ref())
    }

    #[inline]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index()).and_then(|e| e.as_ref())
    }

    #[inline]
    pub fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(id.index()).and_then(|e| e.as_mut())
    }

    #[inline]
    fn node_ref(&self, id: NodeId) -> &Node {
        match self.node(id) {
            Some(node) => node,
            None => panic!("node {} does not exist", id),
        }
    }

    #[inline]
    fn edge_ref(&self, id: EdgeId) -> &Edge {
        match self.edge(id) {
            Some(edge) => edge,
            None => panic!("edge {} does not exist", id.signed()),
        }
    }

    #[inline]
    fn node_entry(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.index()).and_then(|n| n.as_mut()) {
            Some(node) => node,
            None => panic!("node {} does not exist", id),
        }
    }

    #[inline]
    fn edge_entry(&mut self, id: EdgeId) -> &mut Edge {
        match self.edges.get_mut(id.index()).and_then(|e| e.as_mut()) {
            Some(edge) => edge,
            None => panic!("edge {} does not exist", id.signed()),
        }
    }

    /// Ids of all live nodes, ascending.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().flatten().map(|n| n.id)
    }

    /// Ids of all live edges, ascending.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges.iter().flatten().map(|e| e.id)
    }

    /// The even id of every live edge pair, ascending.
    pub fn forward_edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edge_ids().filter(|e| e.is_forward())
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().flatten()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().flatten()
    }

    /// Upper bound on edge ids, for id-indexed side tables.
    #[inline]
    pub fn edge_id_bound(&self) -> usize {
        self.edges.len()
    }

    #[inline]
    pub fn node_id_bound(&self) -> usize {
        self.nodes.len()
    }

    /// Create a pair of complementary nodes and return the first.
    pub fn add_node_pair(&mut self) -> NodeId {
        let id = NodeId::from(self.nodes.len());
        let comp = NodeId::from(self.nodes.len() + 1);
        self.nodes.push(Some(Node::new(id, comp)));
        self.nodes.push(Some(Node::new(comp, id)));
        self.node_count += 2;
        id
    }

    /// Create a node that is its own complement.
    pub fn add_self_complement_node(&mut self) -> NodeId {
        let id = NodeId::from(self.nodes.len());
        self.nodes.push(Some(Node::new(id, id)));
        self.node_count += 1;
        id
    }

    /// Remove a node and its complement. Both must have no incident
    /// edges.
    pub fn remove_node_pair(&mut self, id: NodeId) {
        let comp = self.node_ref(id).complement;
        for n in [id, comp] {
            if let Some(node) = self.nodes[n.index()].take() {
                assert!(
                    node.is_isolated(),
                    "removed node {} still has incident edges",
                    n
                );
                self.node_count -= 1;
            }
        }
    }

    fn push_edge(&mut self, edge: Edge) {
        let id = edge.id;
        self.node_entry(edge.source).out_edges.push(id);
        self.node_entry(edge.target).in_edges.push(id);
        if self.edges.len() <= id.index() {
            self.edges.resize(id.index() + 1, None);
        }
        self.edges[id.index()] = Some(edge);
        self.edge_count += 1;
    }

    fn blank_edge(
        id: EdgeId,
        complement: EdgeId,
        source: NodeId,
        target: NodeId,
        segments: Vec<EdgeSegment>,
    ) -> Edge {
        let multiplicity = segments.len().max(1) as u32;
        Edge {
            id,
            complement,
            source,
            target,
            repetitive: segments.len() > 1,
            segments,
            sequence: Vec::new(),
            multiplicity,
            mean_coverage: 0.0,
            aligned_bases: 0,
            self_complement: id == complement,
            resolved: false,
            alt_group: None,
        }
    }

    fn next_edge_pair(&self) -> (EdgeId, EdgeId) {
        let mut next = self.edges.len();
        if next % 2 == 1 {
            next += 1;
        }
        (EdgeId(next as u64), EdgeId(next as u64 + 1))
    }

    /// Add an edge from `source` to `target`, and its complement
    /// between the complements of the two nodes. Returns the id of the
    /// first.
    pub fn add_edge_pair(
        &mut self,
        source: NodeId,
        target: NodeId,
        segments: Vec<EdgeSegment>,
    ) -> EdgeId {
        let (id, comp) = self.next_edge_pair();
        let comp_source = self.node_ref(target).complement;
        let comp_target = self.node_ref(source).complement;

        let comp_segments = sorted_segments(segments.iter().map(|s| s.complement()));
        let segments = sorted_segments(segments);

        self.push_edge(Self::blank_edge(id, comp, source, target, segments));
        self.push_edge(Self::blank_edge(comp, id, comp_source, comp_target, comp_segments));
        id
    }

    /// Add an edge that is its own reverse complement. The target
    /// must be the complement of the source.
    pub fn add_self_complement_edge(
        &mut self,
        source: NodeId,
        segments: Vec<EdgeSegment>,
    ) -> EdgeId {
        let (id, comp) = self.next_edge_pair();
        let target = self.node_ref(source).complement;
        let segments = sorted_segments(
            segments
                .iter()
                .copied()
                .chain(segments.iter().map(|s| s.complement())),
        );
        self.push_edge(Self::blank_edge(id, id, source, target, segments));
        // the odd id of the pair stays unused
        self.edges.resize(comp.index() + 1, None);
        id
    }

    fn detach_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.get_mut(id.index())?.take()?;
        self.node_entry(edge.source).out_edges.retain(|&e| e != id);
        self.node_entry(edge.target).in_edges.retain(|&e| e != id);
        self.edge_count -= 1;
        Some(edge)
    }

    /// Remove an edge together with its complement. Returns the
    /// removed edge.
    pub fn remove_edge_pair(&mut self, id: EdgeId) -> Edge {
        let edge = match self.detach_edge(id) {
            Some(edge) => edge,
            None => panic!("edge {} does not exist", id.signed()),
        };
        if edge.complement != id {
            self.detach_edge(edge.complement);
        }
        edge
    }

    fn set_endpoint_raw(&mut self, id: EdgeId, dir: Direction, node: NodeId) {
        let old = {
            let edge = self.edge_entry(id);
            match dir {
                Direction::In => std::mem::replace(&mut edge.source, node),
                Direction::Out => std::mem::replace(&mut edge.target, node),
            }
        };
        match dir {
            Direction::In => {
                self.node_entry(old).out_edges.retain(|&e| e != id);
                self.node_entry(node).out_edges.push(id);
            }
            Direction::Out => {
                self.node_entry(old).in_edges.retain(|&e| e != id);
                self.node_entry(node).in_edges.push(id);
            }
        }
    }

    /// Move the source of an edge to `node`. The complement's target
    /// moves to the complement of `node`.
    pub fn set_source(&mut self, id: EdgeId, node: NodeId) {
        let comp = self.edge_ref(id).complement;
        let comp_node = self.node_ref(node).complement;
        self.set_endpoint_raw(id, Direction::In, node);
        self.set_endpoint_raw(comp, Direction::Out, comp_node);
    }

    /// Move the target of an edge to `node`. The complement's source
    /// moves to the complement of `node`.
    pub fn set_target(&mut self, id: EdgeId, node: NodeId) {
        let comp = self.edge_ref(id).complement;
        let comp_node = self.node_ref(node).complement;
        self.set_endpoint_raw(id, Direction::Out, node);
        self.set_endpoint_raw(comp, Direction::In, comp_node);
    }

    /// Set the sequence of an edge, and the reverse complement on its
    /// complement.
    pub fn set_edge_sequence(&mut self, id: EdgeId, sequence: Vec<u8>) {
        let comp = self.edge_ref(id).complement;
        if comp != id {
            self.edge_entry(comp).sequence = dna::rev_comp(&sequence);
        }
        self.edge_entry(id).sequence = sequence;
    }

    /// Apply `f` to an edge and, unless it is self-complementary, to
    /// its complement.
    pub fn update_pair<F>(&mut self, id: EdgeId, mut f: F)
    where
        F: FnMut(&mut Edge),
    {
        let comp = self.edge_ref(id).complement;
        f(self.edge_entry(id));
        if comp != id {
            f(self.edge_entry(comp));
        }
    }

    #[inline]
    pub fn complement_edge(&self, id: EdgeId) -> EdgeId {
        self.edge_ref(id).complement
    }

    #[inline]
    pub fn complement_node(&self, id: NodeId) -> NodeId {
        self.node_ref(id).complement
    }

    #[inline]
    pub fn source(&self, id: EdgeId) -> NodeId {
        self.edge_ref(id).source
    }

    #[inline]
    pub fn target(&self, id: EdgeId) -> NodeId {
        self.edge_ref(id).target
    }

    #[inline]
    pub fn in_edges(&self, id: NodeId) -> &[EdgeId] {
        &self.node_ref(id).in_edges
    }

    #[inline]
    pub fn out_edges(&self, id: NodeId) -> &[EdgeId] {
        &self.node_ref(id).out_edges
    }

    #[inline]
    pub fn edge_length(&self, id: EdgeId) -> usize {
        self.edge_ref(id).length()
    }

    /// Materialize the sequence of every edge from its first segment.
    /// The complement of an edge receives the reverse complement, so
    /// both halves of a pair always agree.
    pub fn update_edge_sequences(&mut self, store: &SequenceStore) {
        let t = std::time::Instant::now();

        let forward = self.forward_edge_ids().collect::<Vec<_>>();
        for id in forward {
            let sequence = match self.edge_ref(id).segments.first() {
                Some(segment) => segment.sequence(store).to_vec(),
                None => Vec::new(),
            };
            self.set_edge_sequence(id, sequence);
        }

        debug!(
            "materialized {} edge sequences in {:.3} ms",
            self.edge_count,
            t.elapsed().as_secs_f64() * 1000.0
        );
    }

    /// Edges from `from` to `to`.
    pub fn edges_between(&self, from: NodeId, to: NodeId) -> Vec<EdgeId> {
        self.out_edges(from)
            .iter()
            .copied()
            .filter(|&e| self.target(e) == to)
            .collect()
    }

    /// Number of edge pairs flagged repetitive.
    pub fn repeat_edge_count(&self) -> usize {
        self.forward_edge_ids()
            .filter(|&e| self.edge_ref(e).repetitive)
            .count()
    }
}

impl EdgeGraph for RepeatGraph {
    #[inline]
    fn has_node(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    #[inline]
    fn has_edge(&self, id: EdgeId) -> bool {
        self.edge(id).is_some()
    }

    #[inline]
    fn node_count(&self) -> usize {
        self.node_count
    }

    #[inline]
    fn edge_count(&self) -> usize {
        self.edge_count
    }

    #[inline]
    fn edge_source(&self, id: EdgeId) -> NodeId {
        self.source(id)
    }

    #[inline]
    fn edge_target(&self, id: EdgeId) -> NodeId {
        self.target(id)
    }

    #[inline]
    fn edge_complement(&self, id: EdgeId) -> EdgeId {
        self.complement_edge(id)
    }

    #[inline]
    fn node_complement(&self, id: NodeId) -> NodeId {
        self.complement_node(id)
    }

    #[inline]
    fn incident_edges(&self, id: NodeId, dir: Direction) -> &[EdgeId] {
        match dir {
            Direction::In => self.in_edges(id),
            Direction::Out => self.out_edges(id),
        }
    }

    #[inline]
    fn edge_len(&self, id: EdgeId) -> usize {
        self.edge_length(id)
    }

    #[inline]
    fn edge_sequence(&self, id: EdgeId) -> &[u8] {
        &self.edge_ref(id).sequence
    }

    #[inline]
    fn multiplicity(&self, id: EdgeId) -> u32 {
        self.edge_ref(id).multiplicity
    }

    #[inline]
    fn mean_coverage(&self, id: EdgeId) -> f64 {
        self.edge_ref(id).mean_coverage
    }

    #[inline]
    fn is_repetitive(&self, id: EdgeId) -> bool {
        self.edge_ref(id).repetitive
    }

    fn all_edge_ids(&self) -> Vec<EdgeId> {
        self.edge_ids().collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn seg(index: usize, start: usize, end: usize, seq_len: usize) -> EdgeSegment {
        EdgeSegment {
            seq: SeqId::forward_of(index),
            start,
            end,
            seq_len,
        }
    }

    /// A -> B -> C with a second edge A -> C
    ///
    /// ```text
    ///      e0       e2
    ///  a -----> b -----> c
    ///   \________________/
    ///          e4
    /// ```
    pub(crate) fn test_graph_1() -> (RepeatGraph, Vec<NodeId>, Vec<EdgeId>) {
        let mut graph = RepeatGraph::new();
        let a = graph.add_node_pair();
        let b = graph.add_node_pair();
        let c = graph.add_node_pair();
        let e0 = graph.add_edge_pair(a, b, vec![seg(0, 0, 100, 300)]);
        let e2 = graph.add_edge_pair(b, c, vec![seg(0, 100, 300, 300)]);
        let e4 = graph.add_edge_pair(a, c, vec![seg(1, 0, 250, 250)]);
        (graph, vec![a, b, c], vec![e0, e2, e4])
    }

    #[test]
    fn edge_pairs_are_complementary() {
        let (graph, nodes, edges) = test_graph_1();
        let (a, b) = (nodes[0], nodes[1]);

        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.edge_count(), 6);

        for &e in edges.iter() {
            let comp = graph.complement_edge(e);
            assert_ne!(comp, e);
            assert_eq!(graph.complement_edge(comp), e);
            assert_eq!(comp, e.paired());
        }

        let e0 = edges[0];
        let c0 = graph.complement_edge(e0);
        assert_eq!(graph.source(c0), graph.complement_node(b));
        assert_eq!(graph.target(c0), graph.complement_node(a));

        let comp_seg = graph.edge(c0).unwrap().segments[0];
        assert_eq!(comp_seg.seq, SeqId::forward_of(0).flip());
        assert_eq!((comp_seg.start, comp_seg.end), (200, 300));

        assert_eq!(graph.out_edges(a), &[e0, edges[2]]);
        assert_eq!(graph.edge_length(edges[1]), 200);
    }

    #[test]
    fn removing_an_edge_removes_its_complement() {
        let (mut graph, nodes, edges) = test_graph_1();
        let comp = graph.complement_edge(edges[2]);
        graph.remove_edge_pair(edges[2]);

        assert!(!graph.has_edge(edges[2]));
        assert!(!graph.has_edge(comp));
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.out_edges(nodes[0]), &[edges[0]]);

        // ids are never reused
        let n = graph.add_node_pair();
        let e = graph.add_edge_pair(nodes[2], n, vec![seg(2, 0, 10, 10)]);
        assert!(e.0 > edges[2].0);
    }

    #[test]
    fn endpoint_redirection_moves_complement() {
        let (mut graph, nodes, edges) = test_graph_1();
        let d = graph.add_node_pair();
        graph.set_target(edges[0], d);

        assert_eq!(graph.target(edges[0]), d);
        assert!(graph.in_edges(nodes[1]).is_empty());
        let comp = graph.complement_edge(edges[0]);
        assert_eq!(graph.source(comp), graph.complement_node(d));
        assert_eq!(graph.out_edges(graph.complement_node(d)), &[comp]);
        assert!(graph.out_edges(graph.complement_node(nodes[1])).is_empty());
    }

    #[test]
    fn self_complement_edge() {
        let mut graph = RepeatGraph::new();
        let a = graph.add_node_pair();
        let e = graph.add_self_complement_edge(a, vec![seg(0, 100, 200, 300)]);
        let edge = graph.edge(e).unwrap();
        assert!(edge.self_complement);
        assert_eq!(edge.complement, e);
        assert_eq!(edge.target, graph.complement_node(a));
        assert_eq!(edge.segments.len(), 2);

        graph.remove_edge_pair(e);
        assert_eq!(graph.edge_count(), 0);
        graph.remove_node_pair(a);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn sequences_are_materialized_on_both_strands() {
        let mut store = SequenceStore::new();
        store.add_sequence("s0", b"AAAACCCCGG");

        let mut graph = RepeatGraph::new();
        let a = graph.add_node_pair();
        let b = graph.add_node_pair();
        let e = graph.add_edge_pair(a, b, vec![seg(0, 2, 8, 10)]);
        assert!(graph.edge(e).unwrap().sequence.is_empty());

        graph.update_edge_sequences(&store);
        assert_eq!(graph.edge_sequence(e), b"AACCCC");
        assert_eq!(graph.edge_sequence(graph.complement_edge(e)), b"GGGGTT");
    }
}
