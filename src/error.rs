//! Error types.
//!
//! Library code returns [`ProvError`]; the binary wraps it with `anyhow` context.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvError {
    /// The image could not be opened, stat'ed or mapped.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A structural field points outside the image.
    #[error("malformed image: {reason}")]
    MalformedImage { reason: String },

    /// The image targets a machine other than the one the analysis is built for.
    #[error("unsupported architecture in {path}: machine {machine}, expected {expected}")]
    UnsupportedMachine {
        path: PathBuf,
        machine: u16,
        expected: u16,
    },

    /// Symlink chain revisits a path or is deeper than the configured bound.
    #[error("symlink loop while resolving {path}")]
    SymlinkLoop { path: PathBuf },
}

impl ProvError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedImage {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvError>;
