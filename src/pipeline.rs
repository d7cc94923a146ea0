/*!
The full run, phase by phase.

Every phase runs to completion before the next starts. Parallel work
happens inside a dedicated rayon pool of `num_threads` workers;
structural changes to the graph are made by the calling thread only,
and the graph is validated after each of them.
*/

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use rayon::ThreadPoolBuilder;

#[allow(unused_imports)]
use log::{debug, error, info, trace};

use crate::aligner::{AlignmentSet, ReadAligner};
use crate::config::Parameters;
use crate::error::{Error, Result};
use crate::extender::{Contig, ContigExtender};
use crate::graph::validate::{validate, validate_alignments};
use crate::graph::{EdgeGraph, RepeatGraph};
use crate::haplotype::HaplotypeResolver;
use crate::multiplicity::MultiplicityInferer;
use crate::output;
use crate::overlap::OverlapContainer;
use crate::processing::{GraphProcessor, UnbranchingPath};
use crate::resolver::RepeatResolver;
use crate::sequence::SequenceStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub overlaps: usize,
    pub nodes: usize,
    pub edges: usize,
    pub aligned_reads: usize,
    pub unaligned_reads: usize,
    pub baseline_coverage: Option<f64>,
    pub repeats_resolved: usize,
    pub repeats_unresolved: usize,
    pub bubbles_found: usize,
    pub bubbles_collapsed: usize,
    pub unitigs: usize,
    pub contigs: usize,
}

impl PipelineStats {
    pub fn log_summary(&self) {
        info!("Overlaps: {}", self.overlaps);
        info!("Graph after construction: {} nodes, {} edges", self.nodes, self.edges);
        info!(
            "Reads aligned: {}, unaligned: {}",
            self.aligned_reads, self.unaligned_reads
        );
        if let Some(baseline) = self.baseline_coverage {
            info!("Single-copy coverage: {:.2}", baseline);
        }
        info!(
            "Repeats resolved: {}, unresolved: {}",
            self.repeats_resolved, self.repeats_unresolved
        );
        info!(
            "Bubbles found: {}, collapsed: {}",
            self.bubbles_found, self.bubbles_collapsed
        );
        info!("Unitigs: {}, contigs: {}", self.unitigs, self.contigs);
    }
}

pub struct PipelineOutput {
    pub graph: RepeatGraph,
    pub alignments: AlignmentSet,
    /// Unbranching paths of the final graph, with their complements.
    pub unbranching: Vec<UnbranchingPath>,
    pub contigs: Vec<Contig>,
    pub stats: PipelineStats,
}

fn create(dir: &Path, name: &str) -> Result<(BufWriter<File>, std::path::PathBuf)> {
    let path = dir.join(name);
    let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
    Ok((BufWriter::new(file), path))
}

impl PipelineOutput {
    /// Write the graph exports, the contigs and, if requested, the
    /// edge sequences to `dir`.
    pub fn write_outputs<P: AsRef<Path>>(&self, dir: P, params: &Parameters) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

        let edges = GraphProcessor::new(&self.graph).edges_paths();

        let (out, path) = create(dir, "repeat_graph.gv")?;
        output::write_dot(&self.graph, &edges, out).map_err(|e| Error::io(&path, e))?;
        let (out, path) = create(dir, "repeat_graph.gfa")?;
        output::write_gfa(&self.graph, &edges, out).map_err(|e| Error::io(&path, e))?;

        let (out, path) = create(dir, "repeat_graph_compact.gv")?;
        output::write_dot(&self.graph, &self.unbranching, out).map_err(|e| Error::io(&path, e))?;
        let (out, path) = create(dir, "repeat_graph_compact.gfa")?;
        output::write_gfa(&self.graph, &self.unbranching, out).map_err(|e| Error::io(&path, e))?;

        let (out, path) = create(dir, "contigs.fasta")?;
        output::write_contigs_fasta(&self.graph, &self.contigs, out)
            .map_err(|e| Error::io(&path, e))?;

        if params.output_edge_sequences {
            let (out, path) = create(dir, "graph_edges.fasta")?;
            output::write_paths_fasta(&self.graph, &edges, out).map_err(|e| Error::io(&path, e))?;
        }

        info!("Wrote results to {}", dir.display());
        Ok(())
    }
}

pub struct RepeatPipeline<'a> {
    params: &'a Parameters,
}

impl<'a> RepeatPipeline<'a> {
    pub fn new(params: &'a Parameters) -> Self {
        RepeatPipeline { params }
    }

    /// Build the repeat graph of `assembly` and, when `reads` are
    /// given, resolve its repeats and haplotypes with them.
    pub fn run(&self, assembly: &SequenceStore, reads: Option<&SequenceStore>) -> Result<PipelineOutput> {
        self.params.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.params.num_threads)
            .build()?;
        info!("Running with {} threads", self.params.num_threads);

        Ok(pool.install(|| self.run_phases(assembly, reads)))
    }

    fn run_phases(&self, assembly: &SequenceStore, reads: Option<&SequenceStore>) -> PipelineOutput {
        let params = self.params;
        let t = std::time::Instant::now();
        let mut stats = PipelineStats::default();

        info!("Building repeat graph");
        let overlaps = OverlapContainer::detect(assembly, params);
        stats.overlaps = overlaps.len();
        let mut graph = RepeatGraph::from_overlaps(assembly, &overlaps, params.max_separation);
        graph.condense(assembly);
        graph.update_edge_sequences(assembly);
        validate(&graph);
        stats.nodes = graph.node_count();
        stats.edges = graph.edge_count();
        debug!("{} repeat edge pairs before read alignment", graph.repeat_edge_count());

        let mut alignments = AlignmentSet::default();
        match reads {
            Some(reads) => {
                info!("Aligning reads to the graph");
                alignments = ReadAligner::new(&graph, params).align_all(reads);
                validate_alignments(&graph, &alignments);
                stats.aligned_reads = alignments.len();
                stats.unaligned_reads = reads.len() - alignments.len();

                info!("Inferring multiplicity from coverage");
                let inferer = MultiplicityInferer::new(params);
                let report = inferer.estimate(&mut graph, &alignments);
                stats.baseline_coverage = report.baseline;

                info!("Resolving repeats");
                let resolved = RepeatResolver::new(params).resolve(&mut graph, &mut alignments);
                validate(&graph);
                validate_alignments(&graph, &alignments);
                stats.repeats_resolved = resolved.resolved;
                stats.repeats_unresolved = resolved.unresolved;
                if resolved.resolved > 0 {
                    inferer.estimate(&mut graph, &alignments);
                }

                info!("Resolving haplotypes");
                let haplotypes = HaplotypeResolver::new(params).resolve(&mut graph, &mut alignments);
                validate(&graph);
                validate_alignments(&graph, &alignments);
                stats.bubbles_found = haplotypes.bubbles;
                stats.bubbles_collapsed = haplotypes.collapsed;
            }
            None => info!("No reads given, repeats are left unresolved"),
        }

        info!("Generating contigs");
        let (unbranching, contigs) = {
            let mut extender = ContigExtender::new(&graph, params);
            extender.generate_unbranching_paths();
            extender.generate_contigs(&alignments);
            (
                extender.unbranching_paths().to_vec(),
                extender.contigs().to_vec(),
            )
        };
        stats.unitigs = unbranching.iter().filter(|p| p.id > 0).count();
        stats.contigs = contigs.len();

        debug!(
            "pipeline finished in {:.3} ms",
            t.elapsed().as_secs_f64() * 1000.0
        );

        PipelineOutput {
            graph,
            alignments,
            unbranching,
            contigs,
            stats,
        }
    }
}
