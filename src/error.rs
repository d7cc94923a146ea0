use std::path::PathBuf;

use thiserror::Error;

/// Failures that can be reported to the user. Structural
/// inconsistencies of the graph are not represented here: they are
/// programming errors and abort through [`crate::graph::validate`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error parsing sequence file {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("error loading config file {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("could not start worker threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn parse<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Error::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
