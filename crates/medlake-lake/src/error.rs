use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LakeError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse partition {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize partition {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("partition {path} is neither a JSON array nor an object")]
    UnexpectedShape { path: PathBuf },

    #[error("refusing to write an empty partition at {path}")]
    EmptyPartition { path: PathBuf },
}

impl LakeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
