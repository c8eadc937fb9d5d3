//! Library provenance classification.
//!
//! Cross-references the libraries a memory capture saw mapped into a process against
//! the executable's declared dependencies and flags the ones nothing explains.

use crate::dlopen::DlopenEvidence;
use crate::needed::NeededLibrary;

/// Name prefix of the dynamic linker (`ld-linux-x86-64.so.2`).
///
/// Matching is by name only, so a library named to look like the linker is exempt too.
pub const DYNAMIC_LINKER_PREFIX: &str = "ld-";

/// A library observed mapped into the process, as recorded by the capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedLibrary {
    pub name: String,
    pub injected: bool,
}

impl MappedLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            injected: false,
        }
    }
}

/// Why a mapped library was (or was not) accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvenanceVerdict {
    /// Named like the dynamic linker.
    Exempt,
    /// Matches a resolved declared dependency.
    Declared,
    /// Matches a `.rodata` library name of an image that imports the loader.
    DynamicallyLoaded,
    /// Unexplained.
    Injected,
}

impl ProvenanceVerdict {
    pub fn is_injected(self) -> bool {
        self == ProvenanceVerdict::Injected
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProvenanceVerdict::Exempt => "exempt",
            ProvenanceVerdict::Declared => "declared",
            ProvenanceVerdict::DynamicallyLoaded => "dlopen",
            ProvenanceVerdict::Injected => "INJECTED",
        }
    }
}

/// Marks each mapped library injected unless it is exempt or declared.
///
/// Returns one verdict per mapped library, in the same order.
pub fn classify(mapped: &mut [MappedLibrary], needed: &[NeededLibrary]) -> Vec<ProvenanceVerdict> {
    classify_inner(mapped, needed, None)
}

/// Like [`classify`], additionally accepting library names found as dlopen evidence.
pub fn classify_with_evidence(
    mapped: &mut [MappedLibrary],
    needed: &[NeededLibrary],
    evidence: &DlopenEvidence,
) -> Vec<ProvenanceVerdict> {
    classify_inner(mapped, needed, Some(evidence))
}

fn classify_inner(
    mapped: &mut [MappedLibrary],
    needed: &[NeededLibrary],
    evidence: Option<&DlopenEvidence>,
) -> Vec<ProvenanceVerdict> {
    mapped
        .iter_mut()
        .map(|lib| {
            let verdict = verdict_for(&lib.name, needed, evidence);
            lib.injected = verdict.is_injected();
            if lib.injected {
                tracing::info!("injected library found: {}", lib.name);
            } else {
                tracing::debug!("{}: {}", lib.name, verdict.as_str());
            }
            verdict
        })
        .collect()
}

fn verdict_for(
    name: &str,
    needed: &[NeededLibrary],
    evidence: Option<&DlopenEvidence>,
) -> ProvenanceVerdict {
    if name.starts_with(DYNAMIC_LINKER_PREFIX) {
        return ProvenanceVerdict::Exempt;
    }
    if needed
        .iter()
        .any(|lib| lib.resolved_file_name() == Some(name))
    {
        return ProvenanceVerdict::Declared;
    }
    let loaded = evidence.is_some_and(|ev| {
        ev.usage_detected()
            && ev
                .candidate_names
                .iter()
                .any(|candidate| candidate_file_name(candidate) == name)
    });
    if loaded {
        ProvenanceVerdict::DynamicallyLoaded
    } else {
        ProvenanceVerdict::Injected
    }
}

/// Final `/`-separated component of a `.rodata` string such as `plugins/libfoo.so`.
fn candidate_file_name(candidate: &str) -> &str {
    candidate.rsplit('/').next().unwrap_or(candidate)
}
