use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("input file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("input file {} is empty (no header row)", path.display())]
    EmptyFile { path: PathBuf },

    #[error("input file {} is missing required columns: {}", path.display(), columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed row in {} at line {line}: {source}", path.display())]
    MalformedRow {
        path: PathBuf,
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("node id {node_id} is assigned to both `{first}` and `{second}`")]
    DuplicateNodeId {
        node_id: String,
        first: String,
        second: String,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to encode manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, EtlError>;
