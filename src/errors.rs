use std::io;

use thiserror::Error;

use crate::types::{RawModelName, SourceId};

/// Error type for pipeline configuration, normalization, and source failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unrecognized drive model '{raw}': {reason}")]
    UnrecognizedModel { raw: RawModelName, reason: String },
    #[error("pipeline protocol violation: {0}")]
    Protocol(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("row source '{source_id}' read failed: {reason}")]
    SourceRead { source_id: SourceId, reason: String },
    #[error("row source '{source_id}' returned inconsistent data: {details}")]
    SourceInconsistent { source_id: SourceId, details: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}
