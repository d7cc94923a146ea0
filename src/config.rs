/*!
Run configuration.

[`Parameters`] is constructed once, either from defaults or from a
TOML key/value file, optionally overridden by command line values,
validated, and then passed by reference into every component. Nothing
in the crate reads configuration from global state.
*/

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{Error, Result};

/// How the ends of two sequences must participate in an overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Unconstrained local alignment.
    Local,
    /// At least one sequence end must be part of the overlap.
    #[serde(alias = "semidovetail")]
    Semi,
    /// Suffix-prefix (or containment) overlaps only.
    Dovetail,
}

impl Default for MatchMode {
    fn default() -> Self {
        MatchMode::Local
    }
}

impl FromStr for MatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(MatchMode::Local),
            "semi" | "semidovetail" => Ok(MatchMode::Semi),
            "dovetail" => Ok(MatchMode::Dovetail),
            other => Err(Error::InvalidParameter(format!(
                "unknown match mode '{}', expected one of local, semi, dovetail",
                other
            ))),
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchMode::Local => "local",
            MatchMode::Semi => "semi",
            MatchMode::Dovetail => "dovetail",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Parameters {
    pub num_threads: usize,
    pub kmer_size: usize,
    pub minimum_overlap: usize,
    pub match_mode: MatchMode,
    pub max_overlap_divergence: f32,
    pub uneven_coverage: bool,
    pub keep_haplotypes: bool,

    /// Positions closer than this on one sequence are glued into the
    /// same junction; also the end overhang tolerated by the semi and
    /// dovetail match modes.
    pub max_separation: usize,
    /// Largest gap between chained k-mer anchors, or between chained
    /// edge alignments of a read.
    pub max_jump: usize,
    /// K-mers seen more often than this are not used as seeds.
    pub max_kmer_occurrences: usize,

    pub min_read_alignment: usize,
    pub min_informative_length: usize,
    pub min_spanning_reads: usize,

    pub bubble_length_tolerance: f64,
    pub bubble_max_divergence: f64,
    pub max_bubble_length: usize,

    pub min_bridging_reads: usize,
    pub output_edge_sequences: bool,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            num_threads: 1,
            kmer_size: 15,
            minimum_overlap: 1000,
            match_mode: MatchMode::Local,
            max_overlap_divergence: 0.05,
            uneven_coverage: false,
            keep_haplotypes: false,
            max_separation: 500,
            max_jump: 1500,
            max_kmer_occurrences: 500,
            min_read_alignment: 500,
            min_informative_length: 1000,
            min_spanning_reads: 1,
            bubble_length_tolerance: 0.2,
            bubble_max_divergence: 0.1,
            max_bubble_length: 50_000,
            min_bridging_reads: 2,
            output_edge_sequences: false,
        }
    }
}

/// Values given on the command line; `None` keeps the value from the
/// config file (or the default).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub num_threads: Option<usize>,
    pub kmer_size: Option<usize>,
    pub minimum_overlap: Option<usize>,
    pub match_mode: Option<MatchMode>,
    pub max_overlap_divergence: Option<f32>,
    pub uneven_coverage: Option<bool>,
    pub keep_haplotypes: Option<bool>,
}

impl Parameters {
    pub fn from_toml_str(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml_str(&text).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn apply(mut self, overrides: &Overrides) -> Self {
        if let Some(v) = overrides.num_threads {
            self.num_threads = v;
        }
        if let Some(v) = overrides.kmer_size {
            self.kmer_size = v;
        }
        if let Some(v) = overrides.minimum_overlap {
            self.minimum_overlap = v;
        }
        if let Some(v) = overrides.match_mode {
            self.match_mode = v;
        }
        if let Some(v) = overrides.max_overlap_divergence {
            self.max_overlap_divergence = v;
        }
        if let Some(v) = overrides.uneven_coverage {
            self.uneven_coverage = v;
        }
        if let Some(v) = overrides.keep_haplotypes {
            self.keep_haplotypes = v;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::InvalidParameter(msg));

        if self.num_threads == 0 {
            return fail("thread count must be positive".into());
        }
        if !(4..=31).contains(&self.kmer_size) {
            return fail(format!(
                "k-mer size must be between 4 and 31, was {}",
                self.kmer_size
            ));
        }
        if self.minimum_overlap < self.kmer_size {
            return fail(format!(
                "minimum overlap {} is shorter than the k-mer size",
                self.minimum_overlap
            ));
        }
        if !(0.0..=1.0).contains(&self.max_overlap_divergence) {
            return fail(format!(
                "overlap divergence must be in [0, 1], was {}",
                self.max_overlap_divergence
            ));
        }
        if !(0.0..=1.0).contains(&self.bubble_max_divergence)
            || !(0.0..=1.0).contains(&self.bubble_length_tolerance)
        {
            return fail("bubble tolerances must be in [0, 1]".into());
        }
        if self.max_separation == 0 || self.max_jump == 0 {
            return fail("max_separation and max_jump must be positive".into());
        }
        if self.min_spanning_reads == 0 {
            return fail("min_spanning_reads must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = Parameters::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.kmer_size, 15);
        assert_eq!(params.minimum_overlap, 1000);
        assert_eq!(params.match_mode, MatchMode::Local);
    }

    #[test]
    fn toml_values_and_overrides() {
        let text = "num_threads = 4\nkmer_size = 17\nuneven_coverage = true\nmatch_mode = \"dovetail\"\n";
        let params = Parameters::from_toml_str(text).unwrap();
        assert_eq!(params.num_threads, 4);
        assert_eq!(params.kmer_size, 17);
        assert!(params.uneven_coverage);
        assert_eq!(params.match_mode, MatchMode::Dovetail);
        assert_eq!(params.minimum_overlap, 1000);

        let overrides = Overrides {
            kmer_size: Some(13),
            minimum_overlap: Some(3000),
            ..Default::default()
        };
        let params = params.apply(&overrides);
        assert_eq!(params.kmer_size, 13);
        assert_eq!(params.minimum_overlap, 3000);
        assert_eq!(params.num_threads, 4);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Parameters::from_toml_str("kmer = 15\n").is_err());
    }

    #[test]
    fn invalid_values() {
        let mut params = Parameters::default();
        params.kmer_size = 40;
        assert!(params.validate().is_err());

        let mut params = Parameters::default();
        params.max_overlap_divergence = 1.5;
        assert!(params.validate().is_err());

        assert!("semi".parse::<MatchMode>().is_ok());
        assert!("global".parse::<MatchMode>().is_err());
    }
}
