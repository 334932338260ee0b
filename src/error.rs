use std::path::PathBuf;

use thiserror::Error;

use crate::datasets::PickleError;

pub type Result<T> = std::result::Result<T, PlanetoidError>;

#[derive(Error, Debug)]
pub enum PlanetoidError {
    #[error("malformed index file {path:?}: line {line} is not an integer: {content:?}")]
    MalformedIndex {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("index {index} out of range for {len} nodes")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unsupported split {0:?} (expected \"public\" or \"full\")")]
    UnsupportedSplit(String),

    #[error("dataset has a single graph, got index {0}")]
    InvalidIndexAccess(usize),

    #[error("unknown planetoid dataset {0:?}")]
    UnknownDataset(String),

    #[error("raw files missing and downloads are disabled: {0:?}")]
    MissingRawFiles(Vec<PathBuf>),

    #[error("dataset is not processed yet (state: {0})")]
    NotReady(&'static str),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("processed artifact has no entry {0:?}")]
    MissingArtifactEntry(&'static str),

    #[error(transparent)]
    Pickle(#[from] PickleError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}
