/*!
Copy number inference from read coverage.

Aligned read bases are accumulated per edge in parallel, each worker
folding into its own table and the tables summed afterwards. The
commit into the graph is single-threaded.

Multiplicity is the edge coverage divided by the single-copy coverage,
rounded. The single-copy coverage is the length-weighted median
coverage of long, single-copy-looking edges, estimated either over the
whole graph or, in uneven coverage mode, per connected component.
*/

use fnv::FnvHashMap;

use rayon::prelude::*;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::aligner::AlignmentSet;
use crate::config::Parameters;
use crate::graph::{EdgeGraph, RepeatGraph};
use crate::handle::EdgeId;
use crate::util::DisjointSets;

/// Copy number of an edge with `coverage`, given the single-copy
/// coverage `baseline`. Any covered edge has at least one copy.
pub fn estimate_multiplicity(coverage: f64, baseline: f64) -> u32 {
    if coverage <= 0.0 || baseline <= 0.0 {
        return 0;
    }
    ((coverage / baseline).round() as u32).max(1)
}

/// Length-weighted median of `(coverage, length)` pairs.
pub fn weighted_median(mut values: Vec<(f64, usize)>) -> Option<f64> {
    let total: usize = values.iter().map(|(_, len)| len).sum();
    if total == 0 {
        return None;
    }
    values.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut seen = 0;
    for (cov, len) in values {
        seen += len;
        if 2 * seen >= total {
            return Some(cov);
        }
    }
    None
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiplicityReport {
    /// Global single-copy coverage, if any edge was covered.
    pub baseline: Option<f64>,
    /// Components with their own baseline in uneven coverage mode.
    pub component_baselines: usize,
    pub repetitive_edges: usize,
    pub uncovered_edges: usize,
}

pub struct MultiplicityInferer<'a> {
    params: &'a Parameters,
}

impl<'a> MultiplicityInferer<'a> {
    pub fn new(params: &'a Parameters) -> Self {
        MultiplicityInferer { params }
    }

    /// Aligned read bases per edge id, over both strands: a step on an
    /// edge counts for the edge and for its complement.
    pub fn accumulate(&self, graph: &RepeatGraph, alignments: &AlignmentSet) -> Vec<u64> {
        let bound = graph.edge_id_bound();
        alignments
            .as_slice()
            .par_iter()
            .fold(
                || vec![0u64; bound],
                |mut acc, aln| {
                    for step in aln.steps.iter() {
                        if let Some(edge) = graph.edge(step.edge) {
                            let bases = step.edge_span() as u64;
                            acc[edge.id.index()] += bases;
                            acc[edge.complement.index()] += bases;
                        }
                    }
                    acc
                },
            )
            .reduce(
                || vec![0u64; bound],
                |mut a, b| {
                    for (x, y) in a.iter_mut().zip(b) {
                        *x += y;
                    }
                    a
                },
            )
    }

    /// Coverage values that inform the single-copy estimate.
    fn informative(&self, graph: &RepeatGraph, edges: &[EdgeId]) -> Vec<(f64, usize)> {
        let covered = edges
            .iter()
            .filter_map(|&e| graph.edge(e))
            .filter(|e| e.aligned_bases > 0)
            .collect::<Vec<_>>();

        let strict = covered
            .iter()
            .filter(|e| {
                e.segments.len() == 1
                    && !e.self_complement
                    && e.length() >= self.params.min_informative_length
            })
            .map(|e| (e.mean_coverage, e.length()))
            .collect::<Vec<_>>();

        if !strict.is_empty() {
            strict
        } else {
            covered.iter().map(|e| (e.mean_coverage, e.length())).collect()
        }
    }

    /// Single-copy coverage over the given forward edges.
    pub fn estimate_baseline(&self, graph: &RepeatGraph, edges: &[EdgeId]) -> Option<f64> {
        weighted_median(self.informative(graph, edges))
    }

    /// Group forward edges by weakly connected component, with both
    /// strands of a component in the same group.
    fn components(&self, graph: &RepeatGraph) -> Vec<Vec<EdgeId>> {
        let sets = DisjointSets::new(graph.node_id_bound());
        let edges = graph.forward_edge_ids().collect::<Vec<_>>();

        edges.par_iter().for_each(|&e| {
            let source = graph.source(e).0;
            let target = graph.target(e).0;
            sets.unite(source, target);
            sets.unite(source, graph.complement_node(graph.source(e)).0);
        });

        let mut groups: FnvHashMap<u64, Vec<EdgeId>> = FnvHashMap::default();
        for &e in edges.iter() {
            groups.entry(sets.find(graph.source(e).0)).or_default().push(e);
        }
        let mut groups = groups.into_values().collect::<Vec<_>>();
        groups.sort_by_key(|g| g[0]);
        groups
    }

    /// Commit per-edge aligned bases into the graph and assign
    /// coverage, multiplicity and the repetitive flag.
    pub fn assign(&self, graph: &mut RepeatGraph, bases: &[u64]) -> MultiplicityReport {
        let forward = graph.forward_edge_ids().collect::<Vec<_>>();

        for &id in forward.iter() {
            let aligned = bases.get(id.index()).copied().unwrap_or(0);
            let len = graph.edge_length(id).max(1) as f64;
            graph.update_pair(id, |edge| {
                edge.aligned_bases = aligned;
                edge.mean_coverage = aligned as f64 / len;
            });
        }

        let global = self.estimate_baseline(graph, &forward);
        let mut report = MultiplicityReport {
            baseline: global,
            ..Default::default()
        };

        let mut baseline_of: FnvHashMap<EdgeId, f64> = FnvHashMap::default();
        if let Some(global) = global {
            if self.params.uneven_coverage {
                for component in self.components(graph) {
                    let local = self.estimate_baseline(graph, &component);
                    if local.is_some() {
                        report.component_baselines += 1;
                    }
                    let baseline = local.unwrap_or(global);
                    debug!(
                        "component of edge {} ({} edges): single-copy coverage {:.2}",
                        component[0].signed(),
                        component.len(),
                        baseline
                    );
                    for e in component {
                        baseline_of.insert(e, baseline);
                    }
                }
            } else {
                for &e in forward.iter() {
                    baseline_of.insert(e, global);
                }
            }
        }

        for &id in forward.iter() {
            let edge = match graph.edge(id) {
                Some(edge) => edge,
                None => continue,
            };
            let copies = edge.segments.len();

            let multiplicity = match baseline_of.get(&id) {
                Some(&baseline) if edge.aligned_bases > 0 => {
                    estimate_multiplicity(edge.mean_coverage, baseline)
                }
                Some(_) => 0,
                None => edge.multiplicity,
            };
            let repetitive = multiplicity >= 2 || copies >= 2;

            if multiplicity == 0 {
                report.uncovered_edges += 1;
            }
            if repetitive {
                report.repetitive_edges += 1;
            }

            graph.update_pair(id, |edge| {
                edge.multiplicity = multiplicity;
                edge.repetitive = repetitive;
            });
        }

        report
    }

    /// Estimate coverage and multiplicity of every edge from the read
    /// alignments.
    pub fn estimate(&self, graph: &mut RepeatGraph, alignments: &AlignmentSet) -> MultiplicityReport {
        let t = std::time::Instant::now();
        let bases = self.accumulate(graph, alignments);
        let report = self.assign(graph, &bases);

        match report.baseline {
            Some(baseline) => info!(
                "Single-copy coverage {:.2}, {} repetitive and {} uncovered edges",
                baseline, report.repetitive_edges, report.uncovered_edges
            ),
            None => info!("No edge is covered by reads, multiplicities left unchanged"),
        }
        debug!(
            "multiplicity inference in {:.3} ms",
            t.elapsed().as_secs_f64() * 1000.0
        );
        report
    }
}
