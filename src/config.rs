//! Configuration module.
//!
//! This module defines the fixed analysis configuration (library search directories,
//! symlink depth bound, classification policy) and the command-line interface (CLI)
//! of the `libprov` binary using `clap`.

use clap::Parser;
use std::path::PathBuf;

use crate::arch::x86_64::X86_64;
use crate::arch::Architecture;

/// Maximum number of symlinks followed before a chain is considered a loop.
pub const DEFAULT_MAX_SYMLINK_DEPTH: usize = 40;

/// Loader entry points whose import counts as dynamic-loading usage.
pub const DEFAULT_LOADER_SYMBOLS: &[&str] = &["dlopen"];

/// Where and how deep the path resolver looks for declared libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Probed in order; the first existing candidate wins.
    pub search_dirs: Vec<PathBuf>,
    pub max_symlink_depth: usize,
}

impl ResolverConfig {
    pub fn for_arch(arch: &dyn Architecture) -> Self {
        Self {
            search_dirs: arch.search_dirs(),
            max_symlink_depth: DEFAULT_MAX_SYMLINK_DEPTH,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self::for_arch(&X86_64)
    }
}

/// How much evidence the classifier accepts as an explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassifierPolicy {
    /// Only declared dependencies (and the `ld-` exemption) explain a mapping.
    #[default]
    Strict,
    /// Additionally accept library names found in `.rodata` when the image imports a
    /// loader entry point.
    DlopenEvidence,
}

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub resolver: ResolverConfig,
    pub policy: ClassifierPolicy,
    pub loader_symbols: Vec<String>,
    /// `e_machine` the executable must carry; `None` accepts any.
    pub expected_machine: Option<u16>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            policy: ClassifierPolicy::default(),
            loader_symbols: DEFAULT_LOADER_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            expected_machine: Some(X86_64.machine()),
        }
    }
}

/// Flags shared libraries mapped into a process that its executable never asked for.
///
/// The mapped-library record comes from the caller's memory capture, either as
/// repeated `--lib` arguments or as a file listing one library name per line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Executable image of the captured process
    pub executable: PathBuf,

    /// Name of a library observed mapped into the process
    #[arg(long = "lib", value_name = "NAME")]
    pub libs: Vec<String>,

    /// File with one mapped library name per line ('#' starts a comment)
    #[arg(long, value_name = "FILE")]
    pub lib_list: Option<PathBuf>,

    /// Library search directory, replaces the built-in list when given
    #[arg(long = "search-dir", value_name = "DIR")]
    pub search_dirs: Vec<PathBuf>,

    /// Symlink chain length treated as a loop
    #[arg(long, default_value_t = DEFAULT_MAX_SYMLINK_DEPTH)]
    pub max_symlink_depth: usize,

    /// Accept .rodata library names as explained when dlopen is imported
    #[arg(long)]
    pub dlopen_evidence: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

impl Cli {
    /// Builds the analyzer configuration selected by the flags.
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        let mut resolver = ResolverConfig::default();
        if !self.search_dirs.is_empty() {
            resolver.search_dirs = self.search_dirs.clone();
        }
        resolver.max_symlink_depth = self.max_symlink_depth;
        AnalyzerConfig {
            resolver,
            policy: if self.dlopen_evidence {
                ClassifierPolicy::DlopenEvidence
            } else {
                ClassifierPolicy::Strict
            },
            ..AnalyzerConfig::default()
        }
    }
}
