//! Error type for the simulation core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PcrError>;

/// Errors raised by sequence validation, alignment and snapshot handling
#[derive(Error, Debug)]
pub enum PcrError {
    /// Strand name other than "top" or "bottom"
    #[error("invalid strand \"{0}\" (expected \"top\" or \"bottom\")")]
    InvalidStrand(String),
    /// Symbol outside the IUPAC nucleotide alphabet
    #[error("invalid sequence: {0}")]
    InvalidSequence(String),
    #[error("empty {0} sequence")]
    EmptySequence(&'static str),
    /// Aligned strings handed to the energy model differ in length
    #[error("aligned sequences differ in length ({left} vs {right})")]
    LengthMismatch { left: usize, right: usize },
    /// Aligned strings share no matching column, so no duplex exists
    #[error("aligned sequences have no matching column")]
    NoMatchingColumn,
    #[error("unknown template \"{0}\"")]
    UnknownTemplate(String),
    #[error("invalid cache snapshot: {0}")]
    Snapshot(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
