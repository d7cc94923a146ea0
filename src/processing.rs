/*!
Read-only traversals that turn the final graph into paths for output.

[`GraphProcessor::edges_paths`] reports every edge as a path of its
own; [`GraphProcessor::unbranching_paths`] joins edges through nodes
of in- and out-degree 1 into maximal unbranching paths. Both are
deterministic and can be called any number of times.

Path ids are signed: a path gets `+n` and its reverse complement `-n`.
A path that is its own reverse complement has `complement_id == id`.
*/

use fnv::FnvHashSet;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::graph::{EdgeGraph, RepeatGraph};
use crate::handle::{EdgeId, NodeId};

#[derive(Debug, Clone, PartialEq)]
pub struct UnbranchingPath {
    pub id: i64,
    pub edges: Vec<EdgeId>,
    pub circular: bool,
    pub length: usize,
    pub mean_coverage: f64,
    pub repetitive: bool,
    pub complement_id: i64,
}

impl UnbranchingPath {
    fn new<G: EdgeGraph>(graph: &G, id: i64, edges: Vec<EdgeId>, circular: bool) -> Self {
        let length: usize = edges.iter().map(|&e| graph.edge_len(e)).sum();
        let weighted: f64 = edges
            .iter()
            .map(|&e| graph.mean_coverage(e) * graph.edge_len(e) as f64)
            .sum();
        let repetitive = edges.iter().any(|&e| graph.is_repetitive(e));
        UnbranchingPath {
            id,
            edges,
            circular,
            length,
            mean_coverage: if length > 0 { weighted / length as f64 } else { 0.0 },
            repetitive,
            complement_id: -id,
        }
    }

    #[inline]
    pub fn node_left<G: EdgeGraph>(&self, graph: &G) -> NodeId {
        graph.edge_source(self.edges[0])
    }

    #[inline]
    pub fn node_right<G: EdgeGraph>(&self, graph: &G) -> NodeId {
        graph.edge_target(self.edges[self.edges.len() - 1])
    }

    pub fn sequence<G: EdgeGraph>(&self, graph: &G) -> Vec<u8> {
        let mut seq = Vec::with_capacity(self.length);
        for &e in self.edges.iter() {
            seq.extend_from_slice(graph.edge_sequence(e));
        }
        seq
    }

    /// Signed edge ids, comma separated.
    pub fn edges_str(&self) -> String {
        self.edges
            .iter()
            .map(|e| e.signed().to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Name used for the path in the sequence and graph exports.
    pub fn name(&self) -> String {
        if self.repetitive {
            format!("repeat_{}", self.id.abs())
        } else {
            format!("edge_{}", self.id.abs())
        }
    }
}

pub struct GraphProcessor<'a> {
    graph: &'a RepeatGraph,
}

impl<'a> GraphProcessor<'a> {
    pub fn new(graph: &'a RepeatGraph) -> Self {
        GraphProcessor { graph }
    }

    /// Every edge as its own path, ids taken from the edges.
    pub fn edges_paths(&self) -> Vec<UnbranchingPath> {
        self.graph
            .edge_ids()
            .map(|e| {
                let mut path = UnbranchingPath::new(self.graph, e.signed(), vec![e], false);
                path.complement_id = self.graph.complement_edge(e).signed();
                path
            })
            .collect()
    }

    #[inline]
    fn is_junction_free(&self, node: NodeId) -> bool {
        self.graph.in_edges(node).len() == 1 && self.graph.out_edges(node).len() == 1
    }

    /// The maximal unbranching path through `edge`, and whether it
    /// closes into a cycle.
    fn extend(&self, edge: EdgeId) -> (Vec<EdgeId>, bool) {
        let graph = self.graph;
        let mut seen = FnvHashSet::default();
        seen.insert(edge);

        let mut back = Vec::new();
        let mut node = graph.source(edge);
        while self.is_junction_free(node) {
            let prev = graph.in_edges(node)[0];
            if prev == edge {
                let mut cycle = vec![edge];
                cycle.extend(back.into_iter().rev());
                return (cycle, true);
            }
            if seen.contains(&prev) || seen.contains(&graph.complement_edge(prev)) {
                break;
            }
            seen.insert(prev);
            back.push(prev);
            node = graph.source(prev);
        }
        back.reverse();
        back.push(edge);

        let mut node = graph.target(edge);
        while self.is_junction_free(node) {
            let next = graph.out_edges(node)[0];
            if seen.contains(&next) || seen.contains(&graph.complement_edge(next)) {
                break;
            }
            seen.insert(next);
            back.push(next);
            node = graph.target(next);
        }

        (back, false)
    }

    /// All maximal unbranching paths, in order of their lowest
    /// starting edge, each followed by its reverse complement.
    pub fn unbranching_paths(&self) -> Vec<UnbranchingPath> {
        let t = std::time::Instant::now();
        let graph = self.graph;

        let mut visited: FnvHashSet<EdgeId> = FnvHashSet::default();
        let mut paths = Vec::new();
        let mut next_id = 1;

        for edge in graph.edge_ids().collect::<Vec<_>>() {
            if visited.contains(&edge) {
                continue;
            }
            let (edges, circular) = self.extend(edge);
            visited.extend(edges.iter().copied());

            let comp_edges = edges
                .iter()
                .rev()
                .map(|&e| graph.complement_edge(e))
                .collect::<Vec<_>>();
            let self_complement = comp_edges.iter().all(|e| edges.contains(e));

            let id = next_id;
            next_id += 1;
            let mut path = UnbranchingPath::new(graph, id, edges, circular);

            if self_complement {
                path.complement_id = id;
                paths.push(path);
                continue;
            }

            visited.extend(comp_edges.iter().copied());
            paths.push(path);
            paths.push(UnbranchingPath::new(graph, -id, comp_edges, circular));
        }

        debug!(
            "{} unbranching paths in {:.3} ms",
            paths.len(),
            t.elapsed().as_secs_f64() * 1000.0
        );
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::graph::tests::{seg, test_graph_1};

    #[test]
    fn edges_as_paths() {
        let (graph, _, edges) = test_graph_1();
        let paths = GraphProcessor::new(&graph).edges_paths();
        assert_eq!(paths.len(), 6);
        assert_eq!(paths[0].id, 1);
        assert_eq!(paths[0].complement_id, -1);
        assert_eq!(paths[0].edges, vec![edges[0]]);
        assert_eq!(paths[1].id, -1);
    }

    #[test]
    fn chains_join_through_simple_nodes() {
        // e0 and e2 meet at b, which has in- and out-degree 1, but a
        // also branches into e4
        let (graph, nodes, edges) = test_graph_1();
        let paths = GraphProcessor::new(&graph).unbranching_paths();

        assert_eq!(paths.len(), 4);
        assert_eq!(paths[0].id, 1);
        assert_eq!(paths[0].edges, vec![edges[0], edges[1]]);
        assert_eq!(paths[0].length, 300);
        assert_eq!(paths[0].node_left(&graph), nodes[0]);
        assert_eq!(paths[0].node_right(&graph), nodes[2]);
        assert_eq!(paths[1].id, -1);
        assert_eq!(
            paths[1].edges,
            vec![graph.complement_edge(edges[1]), graph.complement_edge(edges[0])]
        );
        assert_eq!(paths[2].edges, vec![edges[2]]);
        assert!(paths.iter().all(|p| !p.circular));
    }

    #[test]
    fn cycles_are_circular() {
        let mut graph = RepeatGraph::new();
        let a = graph.add_node_pair();
        let b = graph.add_node_pair();
        let e0 = graph.add_edge_pair(a, b, vec![seg(0, 0, 100, 200)]);
        let e1 = graph.add_edge_pair(b, a, vec![seg(0, 100, 200, 200)]);

        let processor = GraphProcessor::new(&graph);
        let paths = processor.unbranching_paths();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].circular);
        assert_eq!(paths[0].edges, vec![e0, e1]);
        assert_eq!(paths[0].length, 200);

        // restartable
        assert_eq!(processor.unbranching_paths(), paths);
    }

    #[test]
    fn self_complementary_path() {
        let mut graph = RepeatGraph::new();
        let a = graph.add_node_pair();
        let e = graph.add_self_complement_edge(a, vec![seg(0, 0, 100, 100)]);

        let paths = GraphProcessor::new(&graph).unbranching_paths();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].edges, vec![e]);
        assert_eq!(paths[0].complement_id, paths[0].id);
    }
}
