//! Declared dependency extraction.
//!
//! Walks the `PT_DYNAMIC` segment of an image and collects its `DT_NEEDED` entries,
//! resolving each name to a file with the [`LibraryResolver`].

use object::elf::{Dyn64, DT_NEEDED, DT_NULL, PT_DYNAMIC};
use object::Endianness;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::image::{records, BinaryImage};
use crate::resolver::LibraryResolver;
use crate::utils::file_name_str;

/// A library the image declares it needs at load time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeededLibrary {
    pub declared_name: String,
    /// Final target of the resolved path, `None` when no candidate was found.
    pub resolved_path: Option<PathBuf>,
}

impl NeededLibrary {
    /// Final path component of the resolved file, used for matching mapped libraries.
    pub fn resolved_file_name(&self) -> Option<&str> {
        self.resolved_path.as_deref().and_then(file_name_str)
    }
}

/// One `(tag, value)` pair of the dynamic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicEntry {
    pub tag: u64,
    pub value: u64,
}

pub struct DependencyExtractor<'r> {
    resolver: &'r LibraryResolver,
}

impl<'r> DependencyExtractor<'r> {
    pub fn new(resolver: &'r LibraryResolver) -> Self {
        Self { resolver }
    }

    /// Declared dependencies of `image`, in dynamic segment order, duplicates kept.
    ///
    /// An image without a dynamic segment or `.dynstr` (a static binary) has none. An
    /// out-of-range dynamic segment or string table is logged and treated the same way.
    pub fn extract(&self, image: &BinaryImage) -> Result<Vec<NeededLibrary>> {
        let Some(dynamic) = image.segment_by_type(PT_DYNAMIC)? else {
            tracing::debug!("{}: no dynamic segment", image.path().display());
            return Ok(Vec::new());
        };
        let dynstr = match image.section_by_name(".dynstr") {
            Ok(Some(section)) => section,
            Ok(None) => {
                tracing::debug!("{}: no .dynstr section", image.path().display());
                return Ok(Vec::new());
            }
            Err(e) => {
                tracing::warn!("{}: section lookup failed: {}", image.path().display(), e);
                return Ok(Vec::new());
            }
        };
        let strings = match image.string_table(&dynstr) {
            Ok(strings) => strings,
            Err(e) => {
                tracing::warn!("{}: .dynstr unusable: {}", image.path().display(), e);
                return Ok(Vec::new());
            }
        };
        let entries = match image
            .segment_data(&dynamic)
            .and_then(|data| dynamic_entries(data, image.endian()))
        {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("{}: dynamic segment unusable: {}", image.path().display(), e);
                return Ok(Vec::new());
            }
        };

        let mut needed = Vec::new();
        for entry in entries {
            if entry.tag != u64::from(DT_NEEDED) {
                tracing::trace!("DT tag {:#x}", entry.tag);
                continue;
            }
            let name = u32::try_from(entry.value)
                .ok()
                .and_then(|offset| strings.get(offset).ok());
            let Some(name) = name else {
                tracing::warn!(
                    "{}: DT_NEEDED name offset {:#x} outside .dynstr",
                    image.path().display(),
                    entry.value
                );
                continue;
            };
            let declared_name = String::from_utf8_lossy(name).into_owned();
            let resolved_path = self.resolver.resolve(&declared_name);
            tracing::debug!("needed {} -> {:?}", declared_name, resolved_path);
            needed.push(NeededLibrary {
                declared_name,
                resolved_path,
            });
        }
        Ok(needed)
    }

    /// Opens `path`, extracts its declared dependencies and releases the image.
    pub fn extract_path(&self, path: &Path) -> Result<Vec<NeededLibrary>> {
        let image = BinaryImage::open(path)?;
        image.validate()?;
        self.extract(&image)
    }
}

/// Decodes dynamic entries up to, not including, the terminating `DT_NULL`.
///
/// A segment with no terminator yields every whole entry it holds.
pub fn dynamic_entries(data: &[u8], endian: Endianness) -> Result<Vec<DynamicEntry>> {
    let raw: &[Dyn64<Endianness>] = records(data)?;
    Ok(raw
        .iter()
        .map(|d| DynamicEntry {
            tag: d.d_tag.get(endian),
            value: d.d_val.get(endian),
        })
        .take_while(|entry| entry.tag != u64::from(DT_NULL))
        .collect())
}
