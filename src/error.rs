//! Error taxonomy shared by the catalog, the engine clients and the orchestrator.

use crate::backends::BackendKind;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to fetch or decode a speaker list.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{backend}: speaker list request failed: {source}")]
    Request {
        backend: BackendKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("{backend}: speaker list returned HTTP {status}")]
    Status {
        backend: BackendKind,
        status: reqwest::StatusCode,
    },

    #[error("{backend}: could not decode speaker list: {source}")]
    Decode {
        backend: BackendKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("no speech engine answered the speaker list request")]
    AllBackendsFailed,
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("prosody estimation failed: {0}")]
    ProsodyEstimationFailed(String),

    #[error("audio query failed: {0}")]
    QueryBuildFailed(String),

    #[error("synthesis failed: {0}")]
    SynthesisFailed(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything `speak` can report back to the caller.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("no voice named \"{0}\"; refresh the voice list and try again")]
    LabelNotFound(String),

    #[error("a synthesis is already running")]
    Busy,

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("storage write failed: {0}")]
    StorageWriteFailed(#[from] StorageError),
}
