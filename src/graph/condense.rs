/*!
Condensation of the repeat graph: pass-through nodes are spliced out
by concatenating their two edges, and parallel edges with identical
sequence are merged. Both steps are repeated until neither applies,
so condensing a condensed graph changes nothing.
*/

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::handle::{EdgeId, NodeId};
use crate::sequence::SequenceStore;

use super::{EdgeGraph, EdgeSegment, RepeatGraph};

/// The edges and the continued segments of a node that can be
/// spliced out.
#[derive(Debug, Clone)]
pub struct PassThrough {
    pub in_edge: EdgeId,
    pub out_edge: EdgeId,
    pub joined: Vec<EdgeSegment>,
}

impl RepeatGraph {
    /// A node is pass-through if it has exactly one incoming and one
    /// outgoing edge, the two are distinct, not complements of each
    /// other, not self-complementary, and every segment of the
    /// incoming edge continues into exactly one segment of the
    /// outgoing edge.
    pub fn pass_through(&self, node: NodeId) -> Option<PassThrough> {
        let node = self.node(node)?;
        if node.in_degree() != 1 || node.out_degree() != 1 {
            return None;
        }
        let in_edge = self.edge(node.in_edges[0])?;
        let out_edge = self.edge(node.out_edges[0])?;

        if in_edge.id == out_edge.id
            || in_edge.complement == out_edge.id
            || in_edge.self_complement
            || out_edge.self_complement
        {
            return None;
        }
        if in_edge.segments.len() != out_edge.segments.len() {
            return None;
        }

        let mut used = vec![false; out_edge.segments.len()];
        let mut joined = Vec::with_capacity(in_edge.segments.len());
        for seg in in_edge.segments.iter() {
            let next = out_edge
                .segments
                .iter()
                .position(|next| seg.continues_into(next))?;
            if used[next] {
                return None;
            }
            used[next] = true;
            joined.push(EdgeSegment {
                end: out_edge.segments[next].end,
                ..*seg
            });
        }

        Some(PassThrough {
            in_edge: in_edge.id,
            out_edge: out_edge.id,
            joined,
        })
    }

    fn splice(&mut self, node: NodeId, pass: PassThrough) -> EdgeId {
        let source = self.source(pass.in_edge);
        let target = self.target(pass.out_edge);

        let in_edge = self.remove_edge_pair(pass.in_edge);
        let out_edge = self.remove_edge_pair(pass.out_edge);
        self.remove_node_pair(node);

        let id = self.add_edge_pair(source, target, pass.joined);
        let aligned = in_edge.aligned_bases + out_edge.aligned_bases;
        let resolved = in_edge.resolved && out_edge.resolved;
        self.update_pair(id, |edge| {
            edge.aligned_bases = aligned;
            edge.resolved = resolved;
        });

        trace!(
            "spliced node {}: {} + {} -> {}",
            node,
            in_edge.id.signed(),
            out_edge.id.signed(),
            id.signed()
        );
        id
    }

    fn bases<'a>(&'a self, id: EdgeId, store: &'a SequenceStore) -> &'a [u8] {
        let edge = match self.edge(id) {
            Some(edge) => edge,
            None => return &[],
        };
        if !edge.sequence.is_empty() {
            &edge.sequence
        } else {
            edge.segments
                .first()
                .map(|s| s.sequence(store))
                .unwrap_or(&[])
        }
    }

    /// Find a pair of distinct parallel edges leaving `node` with
    /// identical sequence. The lower id is returned first.
    fn duplicate_parallel(&self, node: NodeId, store: &SequenceStore) -> Option<(EdgeId, EdgeId)> {
        let mut out = self.out_edges(node).to_vec();
        out.sort();
        for (i, &keep) in out.iter().enumerate() {
            for &other in out[i + 1..].iter() {
                let (a, b) = (self.edge(keep)?, self.edge(other)?);
                if a.target != b.target
                    || a.self_complement
                    || b.self_complement
                    || a.complement == b.id
                {
                    continue;
                }
                if self.bases(keep, store) == self.bases(other, store) {
                    return Some((keep, other));
                }
            }
        }
        None
    }

    fn merge_parallel(&mut self, keep: EdgeId, dup: EdgeId) {
        let removed = self.remove_edge_pair(dup);
        let comp = self.complement_edge(keep);

        for (id, segments) in [
            (keep, removed.segments.clone()),
            (comp, removed.segments.iter().map(|s| s.complement()).collect()),
        ] {
            if let Some(edge) = self.edge_mut(id) {
                edge.segments.extend(segments);
                edge.segments.sort();
                edge.segments.dedup();
                edge.aligned_bases += removed.aligned_bases;
                edge.multiplicity = edge.segments.len() as u32;
                edge.repetitive = edge.segments.len() > 1;
            }
        }

        trace!("merged parallel edge {} into {}", dup.signed(), keep.signed());
    }

    /// Condense the graph in place. Returns the number of splices and
    /// merges performed; zero if the graph already was condensed.
    pub fn condense(&mut self, store: &SequenceStore) -> usize {
        let t = std::time::Instant::now();
        let mut total = 0;

        loop {
            let mut changes = 0;

            let nodes = self.node_ids().collect::<Vec<_>>();
            for &node in nodes.iter() {
                if let Some(pass) = self.pass_through(node) {
                    self.splice(node, pass);
                    changes += 1;
                }
            }

            let nodes = self.node_ids().collect::<Vec<_>>();
            for &node in nodes.iter() {
                while let Some((keep, dup)) = self.duplicate_parallel(node, store) {
                    self.merge_parallel(keep, dup);
                    changes += 1;
                }
            }

            total += changes;
            if changes == 0 {
                break;
            }
        }

        debug!(
            "condensed graph with {} changes to {} nodes, {} edges in {:.3} ms",
            total,
            self.node_count(),
            self.edge_count(),
            t.elapsed().as_secs_f64() * 1000.0
        );
        total
    }
}
