/*!
Consistency checks for the repeat graph and the read alignments that
refer to it. An inconsistent graph is a bug, not a recoverable
condition: every problem found is logged and then the check panics
with the full list.
*/

use crate::aligner::AlignmentSet;
use crate::handle::EdgeId;

use super::{EdgeGraph, RepeatGraph};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

/// Every problem found in the graph, in a deterministic order.
pub fn graph_problems(graph: &RepeatGraph) -> Vec<String> {
    let mut problems = Vec::new();

    let mut node_count = 0;
    for node in graph.nodes() {
        node_count += 1;
        match graph.node(node.complement) {
            None => problems.push(format!(
                "node {}'s complement {} does not exist",
                node.id, node.complement
            )),
            Some(comp) if comp.complement != node.id => problems.push(format!(
                "node {}'s complement {} points back to {}",
                node.id, comp.id, comp.complement
            )),
            Some(_) => (),
        }

        for &e in node.in_edges.iter() {
            match graph.edge(e) {
                None => problems.push(format!(
                    "node {}'s in-edge {} does not exist",
                    node.id,
                    e.signed()
                )),
                Some(edge) if edge.target != node.id => problems.push(format!(
                    "node {} lists in-edge {} whose target is {}",
                    node.id,
                    e.signed(),
                    edge.target
                )),
                Some(_) => (),
            }
        }
        for &e in node.out_edges.iter() {
            match graph.edge(e) {
                None => problems.push(format!(
                    "node {}'s out-edge {} does not exist",
                    node.id,
                    e.signed()
                )),
                Some(edge) if edge.source != node.id => problems.push(format!(
                    "node {} lists out-edge {} whose source is {}",
                    node.id,
                    e.signed(),
                    edge.source
                )),
                Some(_) => (),
            }
        }
    }
    if node_count != graph.node_count() {
        problems.push(format!(
            "node count is {} but {} nodes exist",
            graph.node_count(),
            node_count
        ));
    }

    let mut edge_count = 0;
    for edge in graph.edges() {
        edge_count += 1;
        let id = edge.id.signed();

        let source = graph.node(edge.source);
        let target = graph.node(edge.target);
        match source {
            None => problems.push(format!("edge {}'s source {} does not exist", id, edge.source)),
            Some(node) if !node.out_edges.contains(&edge.id) => problems.push(format!(
                "edge {} is missing from the out-edges of {}",
                id, edge.source
            )),
            Some(_) => (),
        }
        match target {
            None => problems.push(format!("edge {}'s target {} does not exist", id, edge.target)),
            Some(node) if !node.in_edges.contains(&edge.id) => problems.push(format!(
                "edge {} is missing from the in-edges of {}",
                id, edge.target
            )),
            Some(_) => (),
        }

        match graph.edge(edge.complement) {
            None => problems.push(format!(
                "edge {}'s complement {} does not exist",
                id,
                edge.complement.signed()
            )),
            Some(comp) => {
                if comp.complement != edge.id {
                    problems.push(format!(
                        "edge {}'s complement {} points back to {}",
                        id,
                        comp.id.signed(),
                        comp.complement.signed()
                    ));
                }
                if (edge.complement == edge.id) != edge.self_complement {
                    problems.push(format!("edge {} has an inconsistent self-complement flag", id));
                }
                if source.is_some() && target.is_some() {
                    let expected = graph.complement_node(edge.target);
                    if comp.source != expected {
                        problems.push(format!(
                            "edge {}'s complement starts at {} instead of {}",
                            id, comp.source, expected
                        ));
                    }
                }
                if comp.sequence.len() != edge.sequence.len() {
                    problems.push(format!(
                        "edge {} and its complement have sequences of different length",
                        id
                    ));
                }
            }
        }

        if edge.segments.is_empty() {
            problems.push(format!("edge {} has no segments", id));
        }
        if edge.length() == 0 {
            problems.push(format!("edge {} has length 0", id));
        }
    }
    if edge_count != graph.edge_count() {
        problems.push(format!(
            "edge count is {} but {} edges exist",
            graph.edge_count(),
            edge_count
        ));
    }

    problems
}

/// Every alignment step that refers to a missing edge, and every pair
/// of consecutive steps that is not incident in the graph.
pub fn alignment_problems(graph: &RepeatGraph, alignments: &AlignmentSet) -> Vec<String> {
    let mut problems = Vec::new();

    let exists = |e: EdgeId| graph.has_edge(e);

    for aln in alignments.iter() {
        for step in aln.steps.iter() {
            if !exists(step.edge) {
                problems.push(format!(
                    "alignment of read {} refers to missing edge {}",
                    aln.read,
                    step.edge.signed()
                ));
            }
        }
        for pair in aln.steps.windows(2) {
            let (prev, next) = (pair[0].edge, pair[1].edge);
            if exists(prev) && exists(next) && graph.target(prev) != graph.source(next) {
                problems.push(format!(
                    "alignment of read {} jumps from edge {} to unconnected edge {}",
                    aln.read,
                    prev.signed(),
                    next.signed()
                ));
            }
        }
    }

    problems
}

fn report(what: &str, problems: Vec<String>) {
    if problems.is_empty() {
        debug!("{} successfully validated", what);
        return;
    }
    for problem in problems.iter() {
        error!("{}", problem);
    }
    panic!(
        "{} is inconsistent, {} problems:\n{}",
        what,
        problems.len(),
        problems.join("\n")
    );
}

/// Panics with a diagnostic listing if the graph is inconsistent.
pub fn validate(graph: &RepeatGraph) {
    report("repeat graph", graph_problems(graph));
}

/// Panics with a diagnostic listing if any alignment refers to a
/// missing edge or is disconnected.
pub fn validate_alignments(graph: &RepeatGraph, alignments: &AlignmentSet) {
    report("read alignments", alignment_problems(graph, alignments));
}
