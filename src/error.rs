use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single file job. None of them abort the batch.
#[derive(Debug, Error)]
pub enum DocError {
    #[error("failed to segment {} near line {line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("translation failed for {} ({}): {source:#}", path.display(), section_ids.join(", "))]
    Translate {
        path: PathBuf,
        section_ids: Vec<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unusable persisted data at {}: {message}", path.display())]
    CacheCorruption { path: PathBuf, message: String },
}

impl DocError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DocError::Parse { .. } => "parse",
            DocError::Translate { .. } => "translate",
            DocError::Io { .. } => "io",
            DocError::CacheCorruption { .. } => "cache",
        }
    }
}
