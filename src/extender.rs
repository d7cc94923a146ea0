/*!
Contigs from unbranching paths and read bridges.

Every read alignment is translated to the sequence of unbranching
paths it visits. A unique path `U` followed by a run of repetitive
paths and then a unique path `V` is a bridge. When enough reads agree
that `U` continues to `V`, and to nothing else, and `V` is entered only
from `U`, the two are joined into one contig through the repeat run.
Paths that are not part of any joined contig are reported on their
own, except repeats that were used as a bridge.
*/

use fnv::{FnvHashMap, FnvHashSet};

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::aligner::AlignmentSet;
use crate::config::Parameters;
use crate::graph::{EdgeGraph, RepeatGraph};
use crate::handle::EdgeId;
use crate::processing::{GraphProcessor, UnbranchingPath};

#[derive(Debug, Clone, PartialEq)]
pub struct Contig {
    pub id: usize,
    /// Signed ids of the unbranching paths, in order.
    pub paths: Vec<i64>,
    pub edges: Vec<EdgeId>,
    pub length: usize,
    pub circular: bool,
    pub mean_coverage: f64,
}

impl Contig {
    pub fn name(&self) -> String {
        format!("contig_{}", self.id)
    }

    pub fn sequence<G: EdgeGraph>(&self, graph: &G) -> Vec<u8> {
        let mut seq = Vec::with_capacity(self.length);
        for &e in self.edges.iter() {
            seq.extend_from_slice(graph.edge_sequence(e));
        }
        seq
    }
}

/// A join of two unique paths through a run of repeats, by index into
/// the unbranching paths.
type Bridge = (usize, Vec<usize>, usize);

pub struct ContigExtender<'a> {
    graph: &'a RepeatGraph,
    params: &'a Parameters,
    unbranching: Vec<UnbranchingPath>,
    contigs: Vec<Contig>,
}

impl<'a> ContigExtender<'a> {
    pub fn new(graph: &'a RepeatGraph, params: &'a Parameters) -> Self {
        ContigExtender {
            graph,
            params,
            unbranching: Vec::new(),
            contigs: Vec::new(),
        }
    }

    pub fn generate_unbranching_paths(&mut self) {
        self.unbranching = GraphProcessor::new(self.graph).unbranching_paths();
    }

    pub fn unbranching_paths(&self) -> &[UnbranchingPath] {
        &self.unbranching
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    fn complement_index(&self, by_id: &FnvHashMap<i64, usize>, ix: usize) -> usize {
        by_id
            .get(&self.unbranching[ix].complement_id)
            .copied()
            .unwrap_or(ix)
    }

    /// The unbranching paths visited by every alignment, on both
    /// strands, with repeated visits to the same path collapsed.
    fn read_paths(&self, alignments: &AlignmentSet) -> Vec<Vec<usize>> {
        let mut path_of: FnvHashMap<EdgeId, usize> = FnvHashMap::default();
        for (ix, path) in self.unbranching.iter().enumerate() {
            for &e in path.edges.iter() {
                path_of.insert(e, ix);
            }
        }

        alignments
            .both_strands(self.graph)
            .map(|aln| {
                let mut visited: Vec<usize> = Vec::new();
                for ix in aln.edges().filter_map(|e| path_of.get(&e).copied()) {
                    if visited.last() != Some(&ix) {
                        visited.push(ix);
                    }
                }
                visited
            })
            .collect()
    }

    fn count_bridges(
        &self,
        read_paths: &[Vec<usize>],
        by_id: &FnvHashMap<i64, usize>,
    ) -> FnvHashMap<Bridge, usize> {
        let unique = |ix: usize| !self.unbranching[ix].repetitive;

        let mut counts: FnvHashMap<Bridge, usize> = FnvHashMap::default();
        for visited in read_paths.iter() {
            for (i, &u) in visited.iter().enumerate() {
                if !unique(u) {
                    continue;
                }
                let mut j = i + 1;
                while j < visited.len() && !unique(visited[j]) {
                    j += 1;
                }
                if j >= visited.len() {
                    continue;
                }
                let v = visited[j];
                if v == u || v == self.complement_index(by_id, u) {
                    continue;
                }
                *counts.entry((u, visited[i + 1..j].to_vec(), v)).or_default() += 1;
            }
        }
        counts
    }

    /// Bridges that are supported by enough reads and are the only
    /// supported way out of their start and into their end.
    fn accepted_bridges(&self, counts: &FnvHashMap<Bridge, usize>) -> FnvHashMap<usize, (Vec<usize>, usize)> {
        let mut supported = counts
            .iter()
            .filter(|(_, &n)| n >= self.params.min_bridging_reads)
            .map(|(bridge, &n)| (bridge.clone(), n))
            .collect::<Vec<_>>();
        // most support first, then lowest indices
        supported.sort_by(|(a, n), (b, m)| m.cmp(n).then_with(|| a.cmp(b)));

        let mut targets: FnvHashMap<usize, FnvHashSet<usize>> = FnvHashMap::default();
        let mut sources: FnvHashMap<usize, FnvHashSet<usize>> = FnvHashMap::default();
        let mut best: FnvHashMap<usize, (Vec<usize>, usize)> = FnvHashMap::default();
        for ((u, middle, v), _) in supported {
            targets.entry(u).or_default().insert(v);
            sources.entry(v).or_default().insert(u);
            best.entry(u).or_insert((middle, v));
        }

        best.retain(|u, (_, v)| {
            let ok = targets[u].len() == 1 && sources[&*v].len() == 1;
            if !ok {
                trace!("unbranching path {} has ambiguous read bridges", u);
            }
            ok
        });
        best
    }

    fn contig(&self, id: usize, chain: &[usize], circular: bool) -> Contig {
        let paths = chain
            .iter()
            .map(|&ix| &self.unbranching[ix])
            .collect::<Vec<_>>();
        let length: usize = paths.iter().map(|p| p.length).sum();
        let weighted: f64 = paths
            .iter()
            .map(|p| p.mean_coverage * p.length as f64)
            .sum();
        Contig {
            id,
            paths: paths.iter().map(|p| p.id).collect(),
            edges: paths.iter().flat_map(|p| p.edges.iter().copied()).collect(),
            length,
            circular,
            mean_coverage: if length > 0 { weighted / length as f64 } else { 0.0 },
        }
    }

    /// Join unbranching paths into contigs using the read bridges in
    /// `alignments`. The unbranching paths are generated first if
    /// needed.
    pub fn generate_contigs(&mut self, alignments: &AlignmentSet) -> &[Contig] {
        let t = std::time::Instant::now();
        if self.unbranching.is_empty() {
            self.generate_unbranching_paths();
        }

        let by_id = self
            .unbranching
            .iter()
            .enumerate()
            .map(|(ix, p)| (p.id, ix))
            .collect::<FnvHashMap<_, _>>();

        let read_paths = self.read_paths(alignments);
        let counts = self.count_bridges(&read_paths, &by_id);
        let next = self.accepted_bridges(&counts);
        let prev = next
            .iter()
            .map(|(&u, (_, v))| (*v, u))
            .collect::<FnvHashMap<_, _>>();

        let mut bridged: FnvHashSet<usize> = FnvHashSet::default();
        for (middle, _) in next.values() {
            for &ix in middle.iter() {
                bridged.insert(ix);
                bridged.insert(self.complement_index(&by_id, ix));
            }
        }

        let mut visited: FnvHashSet<usize> = FnvHashSet::default();
        let mut contigs = Vec::new();
        let mut joined = 0;

        for ix in 0..self.unbranching.len() {
            if visited.contains(&ix) {
                continue;
            }
            if self.unbranching[ix].repetitive {
                if bridged.contains(&ix) {
                    continue;
                }
                visited.insert(ix);
                visited.insert(self.complement_index(&by_id, ix));
                let circular = self.unbranching[ix].circular;
                contigs.push(self.contig(contigs.len() + 1, &[ix], circular));
                continue;
            }

            let mut first = ix;
            let mut circular = false;
            while let Some(&p) = prev.get(&first) {
                if p == ix {
                    circular = true;
                    first = ix;
                    break;
                }
                first = p;
            }

            let mut chain = vec![first];
            let mut in_chain: FnvHashSet<usize> = FnvHashSet::default();
            in_chain.insert(first);
            in_chain.insert(self.complement_index(&by_id, first));
            let mut cur = first;
            while let Some((middle, v)) = next.get(&cur) {
                if *v == first && circular {
                    chain.extend(middle.iter().copied());
                    break;
                }
                if in_chain.contains(v) || visited.contains(v) {
                    break;
                }
                chain.extend(middle.iter().copied());
                chain.push(*v);
                in_chain.insert(*v);
                in_chain.insert(self.complement_index(&by_id, *v));
                cur = *v;
            }

            for &p in chain.iter() {
                if !self.unbranching[p].repetitive {
                    visited.insert(p);
                    visited.insert(self.complement_index(&by_id, p));
                }
            }
            if chain.len() > 1 {
                joined += 1;
            }
            let circular = circular || (chain.len() == 1 && self.unbranching[first].circular);
            contigs.push(self.contig(contigs.len() + 1, &chain, circular));
        }

        info!(
            "Generated {} contigs from {} unbranching paths, {} extended over repeats",
            contigs.len(),
            self.unbranching.len(),
            joined
        );
        debug!(
            "contig extension in {:.3} ms",
            t.elapsed().as_secs_f64() * 1000.0
        );

        self.contigs = contigs;
        &self.contigs
    }
}
