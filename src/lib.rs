//! Shared-library provenance heuristics.
//!
//! This library decides, for each shared library a memory capture saw mapped into a
//! process, whether the process's executable explains it or whether it was injected.
//! It is organized into several modules:
//! - `image`: Bounds-checked ELF image view.
//! - `resolver`: Library name to file resolution.
//! - `needed`: Declared (`DT_NEEDED`) dependency extraction.
//! - `strings`: Library-name string evidence.
//! - `dlopen`: Dynamic-load usage detection.
//! - `classify`: Provenance classification.
//! - `analyzer`: Per-process orchestration.
//! - `config`: Analysis configuration and CLI.
//! - `arch`: Architecture-specific constants.

pub mod analyzer;
pub mod arch;
pub mod classify;
pub mod config;
pub mod dlopen;
pub mod error;
pub mod image;
pub mod logging;
pub mod needed;
pub mod resolver;
pub mod strings;
pub mod utils;

pub use analyzer::{Analysis, Analyzer};
pub use classify::{classify, classify_with_evidence, MappedLibrary, ProvenanceVerdict};
pub use error::{ProvError, Result};
