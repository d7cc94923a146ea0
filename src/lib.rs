/*!
Repeat graph construction and long-read repeat resolution.

# Overview

A repeat graph represents a set of assembled sequences with every
repeated segment collapsed into a single edge: edges are maximal
unique or repeated segments, nodes are the junctions where they meet.
Long reads aligned to the graph then tell the copies of a repeat
apart, and the graph is simplified accordingly.

The pipeline, leaf to root:

* [`overlap`] finds pairwise overlaps between the input sequences
  with a shared k-mer index.
* [`graph`] glues the sequences along the overlaps into a
  [`RepeatGraph`](graph::RepeatGraph) and condenses it.
* [`aligner`] maps reads onto paths through the graph.
* [`multiplicity`] estimates the copy number of every edge from the
  read coverage.
* [`resolver`] splits repeats whose copies are told apart by reads
  spanning them with unique flanks.
* [`haplotype`] collapses bubbles of alternative haplotypes.
* [`processing`] and [`extender`] turn the final graph into
  unbranching paths and contigs, which [`output`] renders.

[`pipeline`] runs all of these in order.

# Ids

The core types, used all over the crate, are defined in [`handle`]:

* [`SeqId`](handle::SeqId) is one strand of an input sequence
* [`NodeId`](handle::NodeId) and [`EdgeId`](handle::EdgeId) are stable
  indices into the graph arena; edges come in complementary pairs

*/

pub mod handle;

pub mod config;
pub mod error;
pub mod sequence;
pub mod util;

pub mod overlap;

pub mod graph;

pub mod aligner;
pub mod haplotype;
pub mod multiplicity;
pub mod resolver;

pub mod extender;
pub mod processing;

pub mod output;
pub mod pipeline;

pub use self::config::Parameters;
pub use self::error::{Error, Result};
