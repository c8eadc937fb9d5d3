//! Architecture abstraction.
//!
//! This module defines the `Architecture` trait, which encapsulates the architecture-specific
//! facts the analysis depends on: the ELF machine number an image must carry, and the
//! multiarch directory the dynamic linker searches first.

use std::path::PathBuf;

pub mod x86_64;

/// A trait representing a target architecture (e.g., x86_64, AArch64).
pub trait Architecture {
    /// Human readable name, used in diagnostics.
    fn name(&self) -> &'static str;

    /// The `e_machine` value of images built for this architecture.
    fn machine(&self) -> u16;

    /// The architecture-specific library directory (e.g. `/lib/x86_64-linux-gnu`).
    fn library_dir(&self) -> &'static str;

    /// Ordered library search directories: the architecture directory first,
    /// then `/usr/lib`, then `/lib`.
    fn search_dirs(&self) -> Vec<PathBuf> {
        vec![
            PathBuf::from(self.library_dir()),
            PathBuf::from("/usr/lib"),
            PathBuf::from("/lib"),
        ]
    }
}
