//! Bounds-checked binary image view.
//!
//! A [`BinaryImage`] is a read-only view over a 64-bit ELF file. The primary header is
//! decoded when the view is created; segment and section tables are decoded on demand.
//! Every structural offset read from the file is checked against the backing buffer
//! before it is dereferenced, and a violation surfaces as [`ProvError::MalformedImage`].
//!
//! Extended section numbering is understood: when `e_shnum` is 0 or `e_shstrndx` is
//! `SHN_XINDEX`, the real values come from section 0's `sh_size` and `sh_link`.

use memmap2::Mmap;
use object::elf::{FileHeader64, ProgramHeader64, SectionHeader64};
use object::read::elf::FileHeader;
use object::read::StringTable;
use object::pod::{self, Pod};
use object::Endianness;
use std::fs::File;
use std::mem;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use crate::error::{ProvError, Result};
use crate::utils::{checked_range, table_size};

/// Bytes behind an image: a private read-only mapping, or an owned buffer.
enum Backing {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Backing {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Backing::Mapped(map) => &map[..],
            Backing::Owned(buf) => &buf[..],
        }
    }
}

/// Fields of the primary ELF header the analysis relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    /// `EI_CLASS`; always `ELFCLASS64` for an accepted image.
    pub class: u8,
    pub endian: Endianness,
    pub e_type: u16,
    pub machine: u16,
    pub phoff: u64,
    pub phentsize: u16,
    pub phnum: u16,
    pub shoff: u64,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

/// A program header, reduced to what lookups return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    pub p_type: u32,
    pub offset: u64,
    /// Size in the file (`p_filesz`).
    pub size: u64,
    pub virtual_address: u64,
    pub flags: u32,
}

/// A section header, reduced to what lookups return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionInfo {
    pub index: usize,
    /// Offset of the name in the section name table.
    pub name_offset: u32,
    pub sh_type: u32,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub entsize: u64,
}

/// The executable and writable `PT_LOAD` segments of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSegments {
    /// Loadable segment at file offset 0 with `PF_X`.
    pub text: Option<SegmentInfo>,
    /// First loadable segment past offset 0 with `PF_W`.
    pub data: Option<SegmentInfo>,
}

/// Read-only view over one ELF file.
pub struct BinaryImage {
    path: PathBuf,
    bytes: Backing,
    header: ImageHeader,
}

impl BinaryImage {
    /// Maps `path` read-only and decodes its primary header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let io_err = |source| ProvError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();
        let bytes = if len == 0 {
            // Zero-length mappings are rejected on some platforms.
            Backing::Owned(Vec::new())
        } else {
            Backing::Mapped(unsafe { Mmap::map(&file) }.map_err(io_err)?)
        };
        let header = Self::parse_header(&bytes)?;
        tracing::debug!(
            "opened {} ({} bytes, machine {}, type {})",
            path.display(),
            bytes.len(),
            header.machine,
            header.e_type
        );
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            header,
        })
    }

    /// Wraps an in-memory image.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let header = Self::parse_header(&bytes)?;
        Ok(Self {
            path: PathBuf::from("<memory>"),
            bytes: Backing::Owned(bytes),
            header,
        })
    }

    fn parse_header(data: &[u8]) -> Result<ImageHeader> {
        let raw = FileHeader64::<Endianness>::parse(data)
            .map_err(|e| ProvError::malformed(format!("primary header: {e}")))?;
        let endian = raw
            .endian()
            .map_err(|e| ProvError::malformed(format!("primary header: {e}")))?;
        Ok(ImageHeader {
            class: raw.e_ident.class,
            endian,
            e_type: raw.e_type.get(endian),
            machine: raw.e_machine.get(endian),
            phoff: raw.e_phoff.get(endian),
            phentsize: raw.e_phentsize.get(endian),
            phnum: raw.e_phnum.get(endian),
            shoff: raw.e_shoff.get(endian),
            shentsize: raw.e_shentsize.get(endian),
            shnum: raw.e_shnum.get(endian),
            shstrndx: raw.e_shstrndx.get(endian),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn endian(&self) -> Endianness {
        self.header.endian
    }

    pub fn machine(&self) -> u16 {
        self.header.machine
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Checks that the segment table, section table and section name table all lie
    /// inside the file.
    pub fn validate(&self) -> Result<()> {
        let h = &self.header;
        self.check_table(
            "program header table",
            h.phoff,
            h.phnum as u64,
            h.phentsize,
            mem::size_of::<ProgramHeader64<Endianness>>(),
        )?;
        let count = self.section_count()?;
        self.check_table(
            "section header table",
            h.shoff,
            count as u64,
            h.shentsize,
            mem::size_of::<SectionHeader64<Endianness>>(),
        )?;

        if count == 0 {
            return Ok(());
        }
        let Some(index) = self.names_index()? else {
            return Ok(());
        };
        if index >= count {
            return Err(ProvError::malformed(format!(
                "section name table index {index} out of range ({count} sections)"
            )));
        }
        let names = self.raw_section(index)?;
        self.section_data(&names)?;
        Ok(())
    }

    fn check_table(
        &self,
        what: &str,
        offset: u64,
        count: u64,
        entsize: u16,
        min_entsize: usize,
    ) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        if (entsize as usize) < min_entsize {
            return Err(ProvError::malformed(format!(
                "{what}: entry size {entsize} below {min_entsize}"
            )));
        }
        let size = table_size(count, entsize as u64)
            .ok_or_else(|| ProvError::malformed(format!("{what}: size overflows")))?;
        if checked_range(offset, size, self.len()).is_none() {
            return Err(ProvError::malformed(format!(
                "{what} at {offset:#x}+{size:#x} exceeds file length {:#x}",
                self.len()
            )));
        }
        Ok(())
    }

    /// Returns `size` bytes at `offset`, if they lie inside the image.
    pub fn data(&self, offset: u64, size: u64) -> Result<&[u8]> {
        checked_range(offset, size, self.len())
            .map(|range| &self.bytes[range])
            .ok_or_else(|| {
                ProvError::malformed(format!(
                    "range {offset:#x}+{size:#x} exceeds file length {:#x}",
                    self.len()
                ))
            })
    }

    /// Decodes entry `index` of a table whose records are spaced `entsize` bytes apart.
    fn table_entry<T: Pod>(&self, offset: u64, entsize: u16, index: usize) -> Result<&T> {
        let entry_off = (index as u64)
            .checked_mul(entsize as u64)
            .and_then(|rel| rel.checked_add(offset))
            .ok_or_else(|| ProvError::malformed("table entry offset overflows"))?;
        let bytes = self.data(entry_off, mem::size_of::<T>() as u64)?;
        pod::from_bytes::<T>(bytes)
            .map(|(entry, _)| entry)
            .map_err(|()| ProvError::malformed(format!("unreadable table entry at {entry_off:#x}")))
    }

    /// All program headers, in table order.
    pub fn segments(&self) -> Result<Vec<SegmentInfo>> {
        let (e, h) = (self.endian(), &self.header);
        if h.phnum > 0 && (h.phentsize as usize) < mem::size_of::<ProgramHeader64<Endianness>>() {
            return Err(ProvError::malformed("program header entry size too small"));
        }
        (0..h.phnum as usize)
            .map(|i| {
                let ph: &ProgramHeader64<Endianness> = self.table_entry(h.phoff, h.phentsize, i)?;
                Ok(SegmentInfo {
                    p_type: ph.p_type.get(e),
                    offset: ph.p_offset.get(e),
                    size: ph.p_filesz.get(e),
                    virtual_address: ph.p_vaddr.get(e),
                    flags: ph.p_flags.get(e),
                })
            })
            .collect()
    }

    /// First segment of type `p_type` (e.g. `PT_DYNAMIC`).
    pub fn segment_by_type(&self, p_type: u32) -> Result<Option<SegmentInfo>> {
        Ok(self.segments()?.into_iter().find(|s| s.p_type == p_type))
    }

    /// Splits the `PT_LOAD` segments into the executable and writable ones.
    pub fn load_segments(&self) -> Result<LoadSegments> {
        use object::elf::{PF_W, PF_X, PT_LOAD};

        let mut load = LoadSegments::default();
        for seg in self.segments()? {
            if seg.p_type != PT_LOAD {
                continue;
            }
            if seg.offset == 0 && seg.flags & PF_X != 0 {
                load.text = Some(seg);
            } else if seg.offset != 0 && seg.flags & PF_W != 0 {
                load.data = Some(seg);
                break;
            }
        }
        Ok(load)
    }

    fn raw_section(&self, index: usize) -> Result<SectionInfo> {
        let (e, h) = (self.endian(), &self.header);
        if (h.shentsize as usize) < mem::size_of::<SectionHeader64<Endianness>>() {
            return Err(ProvError::malformed("section header entry size too small"));
        }
        let sh: &SectionHeader64<Endianness> = self.table_entry(h.shoff, h.shentsize, index)?;
        Ok(SectionInfo {
            index,
            name_offset: sh.sh_name.get(e),
            sh_type: sh.sh_type.get(e),
            offset: sh.sh_offset.get(e),
            size: sh.sh_size.get(e),
            link: sh.sh_link.get(e),
            entsize: sh.sh_entsize.get(e),
        })
    }

    /// Number of section headers.
    pub fn section_count(&self) -> Result<usize> {
        let h = &self.header;
        if h.shnum != 0 || h.shoff == 0 {
            return Ok(h.shnum as usize);
        }
        let zero = self.raw_section(0)?;
        usize::try_from(zero.size)
            .map_err(|_| ProvError::malformed(format!("section count {:#x} too large", zero.size)))
    }

    /// Index of the section name table, if the image has one.
    fn names_index(&self) -> Result<Option<usize>> {
        let index = match self.header.shstrndx {
            object::elf::SHN_UNDEF => return Ok(None),
            object::elf::SHN_XINDEX => self.raw_section(0)?.link as usize,
            index => index as usize,
        };
        Ok(Some(index).filter(|&i| i != 0))
    }

    /// Section `index`, or `None` past the end of the table.
    pub fn section_by_index(&self, index: usize) -> Result<Option<SectionInfo>> {
        if index >= self.section_count()? {
            return Ok(None);
        }
        self.raw_section(index).map(Some)
    }

    /// First section called `name` (e.g. `.dynstr`).
    ///
    /// Sections whose own name is unreadable are skipped rather than failing the lookup.
    pub fn section_by_name(&self, name: &str) -> Result<Option<SectionInfo>> {
        let count = self.section_count()?;
        let Some(names) = self.names_index()?.filter(|&i| i < count) else {
            return Ok(None);
        };
        let names = self.raw_section(names)?;
        let names = self.string_table(&names)?;
        for index in 0..count {
            let section = self.raw_section(index)?;
            match names.get(section.name_offset) {
                Ok(section_name) if section_name == name.as_bytes() => return Ok(Some(section)),
                Ok(_) => {}
                Err(()) => tracing::trace!(
                    "section {}: name offset {:#x} out of range",
                    index,
                    section.name_offset
                ),
            }
        }
        Ok(None)
    }

    /// File contents of `section`; `SHT_NOBITS` sections have none.
    pub fn section_data(&self, section: &SectionInfo) -> Result<&[u8]> {
        if section.sh_type == object::elf::SHT_NOBITS {
            return Ok(&[]);
        }
        self.data(section.offset, section.size)
    }

    /// File contents of `segment`.
    pub fn segment_data(&self, segment: &SegmentInfo) -> Result<&[u8]> {
        self.data(segment.offset, segment.size)
    }

    /// A NUL-terminated string table over `section`'s contents.
    pub fn string_table(&self, section: &SectionInfo) -> Result<StringTable<'_>> {
        let range = checked_range(section.offset, section.size, self.len()).ok_or_else(|| {
            ProvError::malformed(format!("string table section {} out of range", section.index))
        })?;
        Ok(StringTable::new(
            &self.bytes[..],
            range.start as u64,
            range.end as u64,
        ))
    }

    /// Reinterprets `section` as an array of fixed-size records.
    pub fn section_records<T: Pod>(&self, section: &SectionInfo) -> Result<&[T]> {
        let data = self.section_data(section)?;
        records(data)
    }
}

/// Reinterprets `data` as whole records of `T`; a trailing partial record is ignored.
pub fn records<T: Pod>(data: &[u8]) -> Result<&[T]> {
    let count = data.len() / mem::size_of::<T>();
    pod::slice_from_bytes::<T>(data, count)
        .map(|(slice, _)| slice)
        .map_err(|()| ProvError::malformed("unreadable record array"))
}
