//! x86_64 Architecture backend.
//!
//! Implements the `Architecture` trait for 64-bit x86 Linux systems.

use super::Architecture;

/// The x86_64 architecture backend.
pub struct X86_64;

impl Architecture for X86_64 {
    fn name(&self) -> &'static str {
        "x86_64"
    }

    fn machine(&self) -> u16 {
        object::elf::EM_X86_64
    }

    fn library_dir(&self) -> &'static str {
        "/lib/x86_64-linux-gnu"
    }
}
