//! Per-process analysis.
//!
//! Ties the pieces together for one captured process:
//! 1. Open the executable image, check its machine and validate its tables.
//! 2. Extract its declared dependencies (resolving each on disk).
//! 3. Detect dlopen usage, when the policy consumes it.
//! 4. Release the image and classify the mapped libraries.

use std::path::Path;

use crate::classify::{classify, classify_with_evidence, MappedLibrary, ProvenanceVerdict};
use crate::config::{AnalyzerConfig, ClassifierPolicy};
use crate::dlopen::{DlopenDetector, DlopenEvidence};
use crate::error::{ProvError, Result};
use crate::image::BinaryImage;
use crate::needed::{DependencyExtractor, NeededLibrary};
use crate::resolver::LibraryResolver;

/// Everything learned about one process.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub needed: Vec<NeededLibrary>,
    /// Present when the policy consulted it.
    pub evidence: Option<DlopenEvidence>,
    /// One entry per mapped library, in input order.
    pub verdicts: Vec<ProvenanceVerdict>,
}

impl Analysis {
    pub fn injected_count(&self) -> usize {
        self.verdicts.iter().filter(|v| v.is_injected()).count()
    }
}

pub struct Analyzer {
    config: AnalyzerConfig,
    resolver: LibraryResolver,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let resolver = LibraryResolver::new(config.resolver.clone());
        Self { config, resolver }
    }

    /// Classifies `mapped` against the executable at `exe`, setting each `injected` flag.
    ///
    /// Fails only if the executable cannot be read, targets an unexpected machine, or has
    /// malformed header tables.
    pub fn analyze(&self, exe: &Path, mapped: &mut [MappedLibrary]) -> Result<Analysis> {
        let _span = tracing::info_span!("analyze", exe = %exe.display()).entered();

        let (needed, evidence) = {
            let image = BinaryImage::open(exe)?;
            self.check_machine(&image)?;
            image.validate()?;
            self.inspect(&image)?
        };
        tracing::info!("{} declared dependencies", needed.len());

        let verdicts = match &evidence {
            Some(evidence) => classify_with_evidence(mapped, &needed, evidence),
            None => classify(mapped, &needed),
        };
        Ok(Analysis {
            needed,
            evidence,
            verdicts,
        })
    }

    fn check_machine(&self, image: &BinaryImage) -> Result<()> {
        match self.config.expected_machine {
            Some(expected) if image.machine() != expected => Err(ProvError::UnsupportedMachine {
                path: image.path().to_path_buf(),
                machine: image.machine(),
                expected,
            }),
            _ => Ok(()),
        }
    }

    fn inspect(
        &self,
        image: &BinaryImage,
    ) -> Result<(Vec<NeededLibrary>, Option<DlopenEvidence>)> {
        let needed = DependencyExtractor::new(&self.resolver).extract(image)?;
        let evidence = match self.config.policy {
            ClassifierPolicy::Strict => None,
            ClassifierPolicy::DlopenEvidence => {
                Some(DlopenDetector::new(&self.config.loader_symbols).detect(image))
            }
        };
        Ok((needed, evidence))
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}
