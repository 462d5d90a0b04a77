//! Per-file failure taxonomy shared by the codecs.
//!
//! A degraded decode (bytes rendered as hex) is deliberately absent here: it is
//! a value, not a fault. Everything below is reported for one file only and
//! never aborts a batch.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unsupported tag: {0}")]
    UnsupportedTag(String),
    #[error("Unsupported XMP property: {0}")]
    UnsupportedProperty(String),
    #[error("Unsupported file format for this operation: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("Malformed XMP document {path}: {message}")]
    MalformedDocument { path: PathBuf, message: String },
    #[error("Malformed EXIF data: {0}")]
    MalformedExif(String),
    #[error("Cannot encode {tag}: {reason}")]
    Encoding { tag: String, reason: String },
    #[error("Could not move new contents into place at {path}: {source}")]
    WriteAtomicity {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, MetaError>;
