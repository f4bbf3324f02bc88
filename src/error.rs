//! Error types shared by the pipeline stages.
//!
//! The two coordinate-mapping failures (`ReferenceNotFound`, `CoordinateNotFound`)
//! are kept distinct from external-command failures (`PipelineStep`) so callers
//! can tell a bad annotation/alignment pairing apart from a tool that crashed.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A GTF row references a chromosome with no entry in the alignment JSON.
    #[error("reference '{0}' not found among alignment keys")]
    ReferenceNotFound(String),

    /// Two alignment entries derive the same reference id.
    #[error("reference '{0}' maps to more than one alignment entry")]
    AmbiguousReference(String),

    /// A reference coordinate could not be resolved to a consensus coordinate.
    #[error("reference position {pos} not found in alignment for '{chrom}'")]
    CoordinateNotFound { chrom: String, pos: i64 },

    /// The alignment JSON does not carry the requested slot.
    #[error("slot '{slot}' not found in {path}")]
    SlotNotFound { path: PathBuf, slot: String },

    /// An alignment column did not match the expected 4-tuple shape.
    #[error("malformed alignment column: {0}")]
    MalformedAlignment(String),

    /// A required external program is not on PATH.
    #[error("missing dependency: '{0}' not found on PATH")]
    MissingDependency(String),

    /// An external command exited nonzero.
    #[error("stage '{stage}' failed: command exited with {status}")]
    PipelineStep { stage: String, status: i32 },
}
