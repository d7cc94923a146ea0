use crate::handle::{Direction, EdgeId, NodeId};

/// Read-only view of a repeat graph, as needed by the path
/// extraction and output code.
pub trait EdgeGraph {
    fn has_node(&self, id: NodeId) -> bool;

    fn has_edge(&self, id: EdgeId) -> bool;

    /// Return the total number of nodes in the graph
    fn node_count(&self) -> usize;

    /// Return the total number of edges in the graph, counting both
    /// halves of every complementary pair
    fn edge_count(&self) -> usize;

    fn edge_source(&self, id: EdgeId) -> NodeId;

    fn edge_target(&self, id: EdgeId) -> NodeId;

    fn edge_complement(&self, id: EdgeId) -> EdgeId;

    fn node_complement(&self, id: NodeId) -> NodeId;

    /// The edges entering (`In`) or leaving (`Out`) a node.
    fn incident_edges(&self, id: NodeId, dir: Direction) -> &[EdgeId];

    fn degree(&self, id: NodeId, dir: Direction) -> usize {
        self.incident_edges(id, dir).len()
    }

    fn edge_len(&self, id: EdgeId) -> usize;

    /// The materialized sequence; empty before
    /// [`update_edge_sequences`](super::RepeatGraph::update_edge_sequences).
    fn edge_sequence(&self, id: EdgeId) -> &[u8];

    fn multiplicity(&self, id: EdgeId) -> u32;

    fn mean_coverage(&self, id: EdgeId) -> f64;

    fn is_repetitive(&self, id: EdgeId) -> bool;

    /// All edge ids in ascending order.
    fn all_edge_ids(&self) -> Vec<EdgeId>;

    /// Sum up the lengths of all edges
    fn total_length(&self) -> usize {
        self.all_edge_ids().into_iter().map(|e| self.edge_len(e)).sum()
    }

    /// `true` if the node has exactly one incoming and one outgoing
    /// edge.
    fn is_bridge_node(&self, id: NodeId) -> bool {
        self.degree(id, Direction::In) == 1 && self.degree(id, Direction::Out) == 1
    }
}
