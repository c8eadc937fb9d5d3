//! Dynamic-load usage detection.
//!
//! Decides whether an image imports a loader entry point (`dlopen`) through its PLT and,
//! if it does, collects library-like string literals from `.rodata` as weak evidence of
//! what it may load. Call sites are not disassembled.

use object::elf::{Rela64, Sym64, SHN_UNDEF};
use object::endian::U64;
use object::pod;
use object::read::StringTable;
use object::Endianness;

use crate::error::Result;
use crate::image::{BinaryImage, SectionInfo, SegmentInfo};
use crate::strings;

/// What the PLT says about the loader entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderUsage {
    /// A PLT relocation targets the entry point.
    Imported,
    /// The required tables exist and no relocation targets the entry point.
    NotImported,
    /// The image defines the entry point itself, so imports say nothing; the heuristic abstains.
    StaticallyResolved,
    /// `.text`, `.rela.plt` or its symbol table is missing or malformed.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlopenEvidence {
    pub usage: LoaderUsage,
    /// `.rodata` tokens containing `.so`; only collected for [`LoaderUsage::Imported`].
    pub candidate_names: Vec<String>,
    /// GOT slot address (`r_offset`) of the matching PLT relocation.
    pub plt_slot: Option<u64>,
    /// Address stored in that slot, read through the writable load segment. Before lazy
    /// binding this is the loader's PLT stub.
    pub got_entry: Option<u64>,
}

impl DlopenEvidence {
    fn without_candidates(usage: LoaderUsage) -> Self {
        Self {
            usage,
            candidate_names: Vec::new(),
            plt_slot: None,
            got_entry: None,
        }
    }

    pub fn usage_detected(&self) -> bool {
        self.usage == LoaderUsage::Imported
    }
}

pub struct DlopenDetector<'a> {
    loader_symbols: &'a [String],
}

impl<'a> DlopenDetector<'a> {
    pub fn new(loader_symbols: &'a [String]) -> Self {
        Self { loader_symbols }
    }

    fn is_loader_symbol(&self, name: &[u8]) -> bool {
        self.loader_symbols.iter().any(|s| s.as_bytes() == name)
    }

    pub fn detect(&self, image: &BinaryImage) -> DlopenEvidence {
        match self.try_detect(image) {
            Ok(evidence) => evidence,
            Err(e) => {
                tracing::warn!("{}: dlopen detection abandoned: {}", image.path().display(), e);
                DlopenEvidence::without_candidates(LoaderUsage::Unavailable)
            }
        }
    }

    fn try_detect(&self, image: &BinaryImage) -> Result<DlopenEvidence> {
        let e = image.endian();
        let (Some(_text), Some(rela_plt)) = (
            image.section_by_name(".text")?,
            image.section_by_name(".rela.plt")?,
        ) else {
            tracing::debug!("{}: no .text or .rela.plt", image.path().display());
            return Ok(DlopenEvidence::without_candidates(LoaderUsage::Unavailable));
        };
        let symtab = match rela_plt.link {
            0 => None,
            link => image.section_by_index(link as usize)?,
        };
        let Some(symtab) = symtab else {
            tracing::debug!("{}: .rela.plt has no symbol table", image.path().display());
            return Ok(DlopenEvidence::without_candidates(LoaderUsage::Unavailable));
        };
        let Some(names) = symbol_strings(image, &symtab)? else {
            tracing::debug!("{}: symbol table has no strings", image.path().display());
            return Ok(DlopenEvidence::without_candidates(LoaderUsage::Unavailable));
        };
        let symbols: &[Sym64<Endianness>] = image.section_records(&symtab)?;

        let defined = symbols.iter().any(|sym| {
            sym.st_shndx.get(e) != SHN_UNDEF
                && names
                    .get(sym.st_name.get(e))
                    .is_ok_and(|name| self.is_loader_symbol(name))
        });
        if defined {
            tracing::debug!("{}: loader entry point defined locally", image.path().display());
            return Ok(DlopenEvidence::without_candidates(
                LoaderUsage::StaticallyResolved,
            ));
        }

        let relocations: &[Rela64<Endianness>] = image.section_records(&rela_plt)?;
        let mut plt_slot = None;
        for rela in relocations {
            let index = (rela.r_info.get(e) >> 32) as usize;
            let Some(sym) = symbols.get(index) else {
                tracing::debug!("PLT relocation references symbol {} past table end", index);
                continue;
            };
            if names
                .get(sym.st_name.get(e))
                .is_ok_and(|name| self.is_loader_symbol(name))
            {
                plt_slot = Some(rela.r_offset.get(e));
                break;
            }
        }
        let Some(slot) = plt_slot else {
            return Ok(DlopenEvidence::without_candidates(LoaderUsage::NotImported));
        };
        let got_entry = match image.load_segments() {
            Ok(load) => load.data.and_then(|data| read_got_slot(image, &data, slot)),
            Err(e) => {
                tracing::debug!("load segments unreadable: {}", e);
                None
            }
        };
        match got_entry {
            Some(entry) => tracing::debug!("loader GOT slot {:#x} holds {:#x}", slot, entry),
            None => tracing::debug!("loader GOT slot {:#x} not in the file", slot),
        }

        let candidate_names = match image.section_by_name(".rodata") {
            Ok(Some(rodata)) => match image.section_data(&rodata) {
                Ok(data) => strings::scan(data),
                Err(e) => {
                    tracing::warn!("{}: .rodata unusable: {}", image.path().display(), e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("{}: .rodata lookup failed: {}", image.path().display(), e);
                Vec::new()
            }
        };
        tracing::debug!("dlopen candidates: {:?}", candidate_names);
        Ok(DlopenEvidence {
            usage: LoaderUsage::Imported,
            candidate_names,
            plt_slot: Some(slot),
            got_entry,
        })
    }
}

/// String table of `symtab`: the section it links to, else `.dynstr`.
fn symbol_strings<'i>(
    image: &'i BinaryImage,
    symtab: &SectionInfo,
) -> Result<Option<StringTable<'i>>> {
    let section = match symtab.link {
        0 => image.section_by_name(".dynstr")?,
        link => image.section_by_index(link as usize)?,
    };
    section.map(|s| image.string_table(&s)).transpose()
}

/// The 8-byte value at virtual address `slot`, if `segment` holds it in the file.
fn read_got_slot(image: &BinaryImage, segment: &SegmentInfo, slot: u64) -> Option<u64> {
    let start = usize::try_from(slot.checked_sub(segment.virtual_address)?).ok()?;
    let bytes = image
        .segment_data(segment)
        .ok()?
        .get(start..start.checked_add(8)?)?;
    let (value, _) = pod::from_bytes::<U64<Endianness>>(bytes).ok()?;
    Some(value.get(image.endian()))
}
