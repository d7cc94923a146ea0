/*!
Rendering of graph paths to Graphviz dot, GFA 1 and FASTA.

All three work on a list of [`UnbranchingPath`]s, so the same code
exports the graph edge by edge ([`GraphProcessor::edges_paths`]) and
in its compacted form ([`GraphProcessor::unbranching_paths`]).

[`GraphProcessor::edges_paths`]: crate::processing::GraphProcessor::edges_paths
[`GraphProcessor::unbranching_paths`]: crate::processing::GraphProcessor::unbranching_paths
*/

use std::io::{self, Write};

use bio::io::fasta;
use bstr::BString;
use fnv::{FnvHashMap, FnvHashSet};
use gfa::gfa::{Link, Orientation, Segment, GFA};

use crate::extender::Contig;
use crate::graph::{EdgeGraph, RepeatGraph};
use crate::handle::NodeId;
use crate::processing::UnbranchingPath;

const REPEAT_COLORS: [&str; 10] = [
    "red",
    "darkgreen",
    "blue",
    "goldenrod",
    "cadetblue1",
    "darkorchid",
    "aquamarine1",
    "darkgoldenrod1",
    "deepskyblue1",
    "darkolivegreen3",
];

fn kilobases(len: usize) -> String {
    if len >= 1000 {
        format!("{:.1}k", len as f64 / 1000.0)
    } else {
        format!("{}", len)
    }
}

/// Paths written once per complementary pair: the positive one, or a
/// path that is its own complement.
fn canonical(paths: &[UnbranchingPath]) -> impl Iterator<Item = &UnbranchingPath> + '_ {
    paths.iter().filter(|p| p.id > 0)
}

pub fn write_dot<W: Write>(
    graph: &RepeatGraph,
    paths: &[UnbranchingPath],
    mut out: W,
) -> io::Result<()> {
    writeln!(out, "digraph {{")?;
    writeln!(out, "nodesep = 0.5;")?;
    writeln!(out, "node [shape = circle, label = \"\", height = 0.3];")?;

    for path in paths.iter() {
        let left = path.node_left(graph);
        let right = path.node_right(graph);
        let label = format!(
            "id {}\\l{} {:.0}x",
            path.id,
            kilobases(path.length),
            path.mean_coverage
        );
        let color = if path.repetitive {
            REPEAT_COLORS[path.id.unsigned_abs() as usize % REPEAT_COLORS.len()]
        } else {
            "black"
        };
        let alternative = path
            .edges
            .iter()
            .any(|&e| graph.edge(e).map_or(false, |e| e.alt_group.is_some()));
        let style = if alternative { ", style = \"dashed\"" } else { "" };

        writeln!(
            out,
            "\"{}\" -> \"{}\" [label = \"{}\", color = \"{}\", penwidth = {}{}];",
            left,
            right,
            label,
            color,
            if path.repetitive { 5 } else { 3 },
            style
        )?;
    }

    writeln!(out, "}}")
}

/// GFA of the paths: one segment per complementary pair of paths, one
/// link per pair of consecutive paths, up to reverse complement.
pub fn to_gfa(graph: &RepeatGraph, paths: &[UnbranchingPath]) -> GFA<usize, ()> {
    let mut gfa = GFA::new();

    for path in canonical(paths) {
        gfa.segments.push(Segment {
            name: path.id as usize,
            sequence: BString::from(path.sequence(graph)).into(),
            optional: (),
        });
    }

    let orient = |id: i64| {
        if id > 0 {
            Orientation::Forward
        } else {
            Orientation::Backward
        }
    };

    let mut starting_at: FnvHashMap<NodeId, Vec<&UnbranchingPath>> = FnvHashMap::default();
    for path in paths.iter() {
        starting_at.entry(path.node_left(graph)).or_default().push(path);
    }

    // the complement of a link (a, b) is (comp b, comp a)
    let mut written: FnvHashSet<(i64, i64)> = FnvHashSet::default();
    for from in paths.iter() {
        let next = match starting_at.get(&from.node_right(graph)) {
            Some(next) => next,
            None => continue,
        };
        for to in next.iter() {
            let key = (from.id, to.id);
            let comp_key = (to.complement_id, from.complement_id);
            if written.contains(&key) || written.contains(&comp_key) {
                continue;
            }
            written.insert(key);

            gfa.links.push(Link {
                from_segment: from.id.unsigned_abs() as usize,
                from_orient: orient(from.id),
                to_segment: to.id.unsigned_abs() as usize,
                to_orient: orient(to.id),
                overlap: BString::from("0M").into(),
                optional: (),
            });
        }
    }

    gfa
}

pub fn write_gfa<W: Write>(
    graph: &RepeatGraph,
    paths: &[UnbranchingPath],
    mut out: W,
) -> io::Result<()> {
    let gfa = to_gfa(graph, paths);
    let mut text = String::new();
    gfa::writer::write_gfa(&gfa, &mut text);
    out.write_all(text.as_bytes())
}

/// Sequences of the paths, one record per complementary pair.
pub fn write_paths_fasta<W: Write>(
    graph: &RepeatGraph,
    paths: &[UnbranchingPath],
    out: W,
) -> io::Result<()> {
    let mut writer = fasta::Writer::new(out);
    for path in canonical(paths) {
        let desc = format!(
            "len={} cov={:.1} edges={}",
            path.length,
            path.mean_coverage,
            path.edges_str()
        );
        writer.write(&path.name(), Some(&desc), &path.sequence(graph))?;
    }
    writer.flush()
}

pub fn write_contigs_fasta<W: Write>(
    graph: &RepeatGraph,
    contigs: &[Contig],
    out: W,
) -> io::Result<()> {
    let mut writer = fasta::Writer::new(out);
    for contig in contigs.iter() {
        let desc = format!(
            "len={} cov={:.1} circular={}",
            contig.length,
            contig.mean_coverage,
            if contig.circular { "yes" } else { "no" }
        );
        writer.write(&contig.name(), Some(&desc), &contig.sequence(graph))?;
    }
    writer.flush()
}
