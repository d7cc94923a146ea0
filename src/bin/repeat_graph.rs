use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use log::{error, info};

use repeatgraph::config::{MatchMode, Overrides, Parameters};
use repeatgraph::pipeline::RepeatPipeline;
use repeatgraph::sequence::SequenceStore;

/// Build a repeat graph of an assembly and resolve its repeats with
/// long reads.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Assembly to build the graph from (FASTA or FASTQ, optionally gzipped)
    #[arg(long)]
    input_seq: PathBuf,

    /// Directory the graph and contigs are written to
    #[arg(long)]
    out_dir: PathBuf,

    /// TOML file with the run parameters
    #[arg(long)]
    config: PathBuf,

    /// Comma-separated list of read files
    #[arg(long, value_delimiter = ',')]
    reads: Vec<PathBuf>,

    /// Write the log to this file instead of stderr
    #[arg(long)]
    log: Option<PathBuf>,

    /// Number of worker threads [default: 1]
    #[arg(long)]
    threads: Option<usize>,

    /// K-mer size used for overlap seeding [default: 15]
    #[arg(long)]
    kmer: Option<usize>,

    /// Minimum overlap length [default: 1000]
    #[arg(long)]
    min_ovlp: Option<usize>,

    /// Overlap end constraint: local, semi or dovetail [default: local]
    #[arg(long, value_parser = parse_match_mode)]
    match_mode: Option<MatchMode>,

    /// Maximum overlap divergence [default: 0.05]
    #[arg(long)]
    max_divergence: Option<f32>,

    /// Estimate coverage per connected component (uneven coverage data)
    #[arg(long)]
    meta: bool,

    /// Mark alternative haplotypes instead of collapsing them
    #[arg(long)]
    keep_haplotypes: bool,

    /// Debug output
    #[arg(long)]
    debug: bool,
}

fn parse_match_mode(s: &str) -> std::result::Result<MatchMode, String> {
    s.parse().map_err(|e: repeatgraph::Error| e.to_string())
}

fn init_logger(args: &Args) -> Result<()> {
    let level = if args.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if let Some(path) = &args.log {
        let file = File::create(path)
            .with_context(|| format!("could not create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn parameters(args: &Args) -> Result<Parameters> {
    let overrides = Overrides {
        num_threads: args.threads,
        kmer_size: args.kmer,
        minimum_overlap: args.min_ovlp,
        match_mode: args.match_mode,
        max_overlap_divergence: args.max_divergence,
        uneven_coverage: args.meta.then_some(true),
        keep_haplotypes: args.keep_haplotypes.then_some(true),
    };
    let params = Parameters::from_file(&args.config)?.apply(&overrides);
    params.validate()?;
    Ok(params)
}

fn run(args: &Args) -> Result<()> {
    let params = parameters(args)?;

    let mut assembly = SequenceStore::new();
    let loaded = assembly.load_from_file(&args.input_seq)?;
    if loaded == 0 {
        bail!("no sequences in {}", args.input_seq.display());
    }
    info!(
        "Loaded {} sequences, {} bp",
        assembly.len(),
        assembly.total_length()
    );

    let reads = if args.reads.is_empty() {
        None
    } else {
        let mut reads = SequenceStore::new();
        for path in args.reads.iter() {
            reads.load_from_file(path)?;
        }
        info!("Loaded {} reads, {} bp", reads.len(), reads.total_length());
        Some(reads)
    };

    let output = RepeatPipeline::new(&params).run(&assembly, reads.as_ref())?;
    output.write_outputs(&args.out_dir, &params)?;
    output.stats.log_summary();

    Ok(())
}

/// Exit status for a command line that could not be parsed. Help and
/// version requests succeed; every other kind is an argument error.
fn parse_error_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => 1,
    }
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = parse_error_code(err.kind());
            let _ = err.print();
            std::process::exit(code);
        }
    };

    if let Err(err) = init_logger(&args) {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }

    info!("Starting repeat graph construction");
    if let Err(err) = run(&args) {
        error!("{:#}", err);
        if args.log.is_some() {
            eprintln!("Error: {:#}", err);
        }
        std::process::exit(1);
    }
    info!("Done");
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    const REQUIRED: [&str; 7] = [
        "repeat-graph",
        "--input-seq",
        "assembly.fasta",
        "--out-dir",
        "out",
        "--config",
        "params.toml",
    ];

    #[test]
    fn command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn arguments_are_parsed() {
        let mut argv = REQUIRED.to_vec();
        argv.extend(["--reads", "a.fq,b.fq.gz", "--match-mode", "semi", "--meta"]);
        let args = Args::try_parse_from(argv).unwrap();
        assert_eq!(args.reads.len(), 2);
        assert_eq!(args.match_mode, Some(MatchMode::Semi));
        assert!(args.meta);
        assert_eq!(args.threads, None);
    }

    #[test]
    fn argument_errors_exit_with_one() {
        let err = Args::try_parse_from(REQUIRED[..5].iter().copied()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        assert_eq!(parse_error_code(err.kind()), 1);

        let mut argv = REQUIRED.to_vec();
        argv.extend(["--threads", "many"]);
        let err = Args::try_parse_from(argv).unwrap_err();
        assert_eq!(parse_error_code(err.kind()), 1);

        let mut argv = REQUIRED.to_vec();
        argv.extend(["--match-mode", "global"]);
        let err = Args::try_parse_from(argv).unwrap_err();
        assert_eq!(parse_error_code(err.kind()), 1);

        let err = Args::try_parse_from(["repeat-graph", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert_eq!(parse_error_code(err.kind()), 0);

        let err = Args::try_parse_from(["repeat-graph", "--version"]).unwrap_err();
        assert_eq!(parse_error_code(err.kind()), 0);
    }
}
