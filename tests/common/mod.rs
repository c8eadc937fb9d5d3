//! Synthetic ELF images for integration tests.
//!
//! Builds small little-endian x86_64 images with just the tables the analysis reads:
//! `.dynstr`, `.dynsym`, `.rela.plt`, `.text`, `.rodata`, `.got.plt`, `.dynamic` and
//! `.shstrtab`. The writable load segment starts at `.got.plt` and is mapped at [`GOT_BASE`].

#![allow(dead_code)]

use object::endian::{I64, U16, U32, U64};
use object::pod::bytes_of;
use object::Endianness;
use std::collections::HashMap;
use std::io::Write;
use tempfile::NamedTempFile;

const EHDR_SIZE: u64 = 64;
const PHDR_SIZE: u64 = 56;
const SHDR_SIZE: u64 = 64;

/// Base of the GOT slots assigned to PLT relocations.
pub const GOT_BASE: u64 = 0x4000;

/// Unbound GOT contents for import `i`: the address of its PLT stub.
pub fn plt_stub(i: usize) -> u64 {
    0x1020 + 16 * i as u64 + 6
}

fn u16(v: u16) -> U16<Endianness> {
    U16::new(Endianness::Little, v)
}
fn u32(v: u32) -> U32<Endianness> {
    U32::new(Endianness::Little, v)
}
fn u64(v: u64) -> U64<Endianness> {
    U64::new(Endianness::Little, v)
}

fn align8(v: u64) -> u64 {
    (v + 7) & !7
}

/// Describes the image to build.
pub struct ElfFixture {
    pub needed: Vec<String>,
    /// Undefined dynamic symbols, each with a PLT relocation.
    pub imports: Vec<String>,
    /// Dynamic symbols defined in `.text`.
    pub exports: Vec<String>,
    pub rodata: Option<Vec<u8>>,
    /// Raw `(tag, value)` entries placed before `DT_NULL`.
    pub extra_dynamic: Vec<(u64, u64)>,
    pub dynamic: bool,
    pub plt: bool,
    pub text: bool,
}

impl Default for ElfFixture {
    fn default() -> Self {
        Self {
            needed: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
            rodata: None,
            extra_dynamic: Vec::new(),
            dynamic: true,
            plt: true,
            text: true,
        }
    }
}

/// A built image plus where its section headers ended up.
pub struct BuiltElf {
    pub bytes: Vec<u8>,
    pub shoff: u64,
    pub section_index: HashMap<String, usize>,
}

impl BuiltElf {
    /// File offset of the header of section `name`.
    pub fn section_header_offset(&self, name: &str) -> usize {
        (self.shoff + self.section_index[name] as u64 * SHDR_SIZE) as usize
    }

    /// Points section `name` at `offset`.
    pub fn set_section_offset(&mut self, name: &str, offset: u64) {
        let at = self.section_header_offset(name) + 24;
        patch_u64(&mut self.bytes, at, offset);
    }

    pub fn write_temp(&self) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&self.bytes).unwrap();
        file.flush().unwrap();
        file
    }
}

pub fn patch_u16(bytes: &mut [u8], at: usize, value: u16) {
    bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn patch_u32(bytes: &mut [u8], at: usize, value: u32) {
    bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn patch_u64(bytes: &mut [u8], at: usize, value: u64) {
    bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

struct Section {
    name: &'static str,
    sh_type: u32,
    data: Vec<u8>,
    link: Option<&'static str>,
    entsize: u64,
}

/// Appends `s` and its NUL to a string table, returning its offset.
fn push_str(table: &mut Vec<u8>, s: &str) -> u32 {
    let off = table.len() as u32;
    table.extend_from_slice(s.as_bytes());
    table.push(0);
    off
}

impl ElfFixture {
    pub fn needing(names: &[&str]) -> Self {
        Self {
            needed: names.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn build(&self) -> BuiltElf {
        use object::elf::{
            Dyn64, FileHeader64, Ident, ProgramHeader64, Rela64, SectionHeader64, Sym64, DT_NEEDED,
            DT_NULL, DT_STRTAB, ELFCLASS64, ELFDATA2LSB, ELFMAG, ELFOSABI_SYSV, EM_X86_64, ET_DYN,
            EV_CURRENT, PF_R, PF_W, PF_X, PT_DYNAMIC, PT_LOAD, R_X86_64_JUMP_SLOT, SHN_ABS,
            SHN_UNDEF, SHT_DYNAMIC, SHT_DYNSYM, SHT_PROGBITS, SHT_RELA, SHT_STRTAB, STB_GLOBAL,
            STT_FUNC,
        };

        let mut dynstr = vec![0u8];
        let needed_offsets: Vec<u32> = self.needed.iter().map(|n| push_str(&mut dynstr, n)).collect();
        let import_offsets: Vec<u32> = self.imports.iter().map(|n| push_str(&mut dynstr, n)).collect();
        let export_offsets: Vec<u32> = self.exports.iter().map(|n| push_str(&mut dynstr, n)).collect();

        // Section order is fixed so indices can be computed up front.
        let mut names: Vec<&'static str> = vec!["", ".dynstr", ".dynsym"];
        if self.plt {
            names.push(".rela.plt");
        }
        if self.text {
            names.push(".text");
        }
        if self.rodata.is_some() {
            names.push(".rodata");
        }
        if self.plt {
            names.push(".got.plt");
        }
        if self.dynamic {
            names.push(".dynamic");
        }
        names.push(".shstrtab");
        let index_of = |name: &str| names.iter().position(|n| *n == name);

        let text_index = index_of(".text").map(|i| i as u16).unwrap_or(SHN_ABS);
        let mut dynsym = vec![0u8; 24];
        for off in &import_offsets {
            let sym = Sym64::<Endianness> {
                st_name: u32(*off),
                st_info: (STB_GLOBAL << 4) | STT_FUNC,
                st_other: 0,
                st_shndx: u16(SHN_UNDEF),
                st_value: u64(0),
                st_size: u64(0),
            };
            dynsym.extend_from_slice(bytes_of(&sym));
        }
        for off in &export_offsets {
            let sym = Sym64::<Endianness> {
                st_name: u32(*off),
                st_info: (STB_GLOBAL << 4) | STT_FUNC,
                st_other: 0,
                st_shndx: u16(text_index),
                st_value: u64(0x1000),
                st_size: u64(16),
            };
            dynsym.extend_from_slice(bytes_of(&sym));
        }

        let mut rela_plt = Vec::new();
        for i in 0..self.imports.len() as u64 {
            let rela = Rela64::<Endianness> {
                r_offset: u64(GOT_BASE + 8 * i),
                r_info: u64(((i + 1) << 32) | R_X86_64_JUMP_SLOT as u64),
                r_addend: I64::new(Endianness::Little, 0),
            };
            rela_plt.extend_from_slice(bytes_of(&rela));
        }

        let got_plt: Vec<u8> = (0..self.imports.len())
            .flat_map(|i| plt_stub(i).to_le_bytes())
            .collect();

        let mut dynamic = Vec::new();
        let mut push_dyn = |tag: u64, val: u64| {
            let entry = Dyn64::<Endianness> {
                d_tag: u64(tag),
                d_val: u64(val),
            };
            dynamic.extend_from_slice(bytes_of(&entry));
        };
        for off in &needed_offsets {
            push_dyn(DT_NEEDED as u64, *off as u64);
        }
        push_dyn(DT_STRTAB as u64, 0);
        for (tag, val) in &self.extra_dynamic {
            push_dyn(*tag, *val);
        }
        push_dyn(DT_NULL as u64, 0);

        let mut shstrtab = vec![0u8];
        let name_offsets: Vec<u32> = names
            .iter()
            .map(|n| if n.is_empty() { 0 } else { push_str(&mut shstrtab, n) })
            .collect();

        let mut sections = Vec::new();
        for &name in &names[1..] {
            let section = match name {
                ".dynstr" => Section { name, sh_type: SHT_STRTAB, data: dynstr.clone(), link: None, entsize: 0 },
                ".dynsym" => Section { name, sh_type: SHT_DYNSYM, data: dynsym.clone(), link: Some(".dynstr"), entsize: 24 },
                ".rela.plt" => Section { name, sh_type: SHT_RELA, data: rela_plt.clone(), link: Some(".dynsym"), entsize: 24 },
                ".text" => Section { name, sh_type: SHT_PROGBITS, data: vec![0xC3; 16], link: None, entsize: 0 },
                ".rodata" => Section { name, sh_type: SHT_PROGBITS, data: self.rodata.clone().unwrap_or_default(), link: None, entsize: 0 },
                ".got.plt" => Section { name, sh_type: SHT_PROGBITS, data: got_plt.clone(), link: None, entsize: 8 },
                ".dynamic" => Section { name, sh_type: SHT_DYNAMIC, data: dynamic.clone(), link: Some(".dynstr"), entsize: 16 },
                _ => Section { name, sh_type: SHT_STRTAB, data: shstrtab.clone(), link: None, entsize: 0 },
            };
            sections.push(section);
        }

        // Layout: header, program headers, section contents, section headers.
        let phnum: u64 = if self.dynamic { 3 } else { 2 };
        let mut cursor = align8(EHDR_SIZE + phnum * PHDR_SIZE);
        let mut offsets = Vec::new();
        for section in &sections {
            offsets.push(cursor);
            cursor = align8(cursor + section.data.len() as u64);
        }
        let shoff = cursor;
        let total = shoff + names.len() as u64 * SHDR_SIZE;

        let mut buffer = Vec::with_capacity(total as usize);
        let file_header = FileHeader64::<Endianness> {
            e_ident: Ident {
                magic: ELFMAG,
                class: ELFCLASS64,
                data: ELFDATA2LSB,
                version: EV_CURRENT,
                os_abi: ELFOSABI_SYSV,
                abi_version: 0,
                padding: [0; 7],
            },
            e_type: u16(ET_DYN),
            e_machine: u16(EM_X86_64),
            e_version: u32(EV_CURRENT as u32),
            e_entry: u64(0x1000),
            e_phoff: u64(EHDR_SIZE),
            e_shoff: u64(shoff),
            e_flags: u32(0),
            e_ehsize: u16(EHDR_SIZE as u16),
            e_phentsize: u16(PHDR_SIZE as u16),
            e_phnum: u16(phnum as u16),
            e_shentsize: u16(SHDR_SIZE as u16),
            e_shnum: u16(names.len() as u16),
            e_shstrndx: u16((names.len() - 1) as u16),
        };
        buffer.extend_from_slice(bytes_of(&file_header));

        // File extent of a section; absent sections are empty at `shoff`.
        let extent = |name: &str| match index_of(name) {
            Some(i) => (offsets[i - 1], offsets[i - 1] + sections[i - 1].data.len() as u64),
            None => (shoff, shoff),
        };
        let (dyn_off, dyn_end) = extent(".dynamic");
        let (rw_off, rw_vaddr) = match index_of(".got.plt") {
            Some(_) => (extent(".got.plt").0, GOT_BASE),
            None => (dyn_off, dyn_off),
        };
        let rw_end = dyn_end.max(extent(".got.plt").1).max(rw_off);
        let phdr = |p_type: u32, p_flags: u32, offset: u64, vaddr: u64, size: u64| ProgramHeader64::<Endianness> {
            p_type: u32(p_type),
            p_flags: u32(p_flags),
            p_offset: u64(offset),
            p_vaddr: u64(vaddr),
            p_paddr: u64(vaddr),
            p_filesz: u64(size),
            p_memsz: u64(size),
            p_align: u64(8),
        };
        buffer.extend_from_slice(bytes_of(&phdr(PT_LOAD, PF_R | PF_X, 0, 0, rw_off)));
        buffer.extend_from_slice(bytes_of(&phdr(PT_LOAD, PF_R | PF_W, rw_off, rw_vaddr, rw_end - rw_off)));
        if self.dynamic {
            let dyn_vaddr = rw_vaddr + (dyn_off - rw_off);
            buffer.extend_from_slice(bytes_of(&phdr(PT_DYNAMIC, PF_R | PF_W, dyn_off, dyn_vaddr, dyn_end - dyn_off)));
        }

        for (section, offset) in sections.iter().zip(&offsets) {
            buffer.resize(*offset as usize, 0);
            buffer.extend_from_slice(&section.data);
        }
        buffer.resize(shoff as usize, 0);

        buffer.extend_from_slice(&[0u8; SHDR_SIZE as usize]);
        for (i, section) in sections.iter().enumerate() {
            let link = section.link.and_then(|l| index_of(l)).unwrap_or(0) as u32;
            let header = SectionHeader64::<Endianness> {
                sh_name: u32(name_offsets[i + 1]),
                sh_type: u32(section.sh_type),
                sh_flags: u64(0),
                sh_addr: u64(offsets[i]),
                sh_offset: u64(offsets[i]),
                sh_size: u64(section.data.len() as u64),
                sh_link: u32(link),
                sh_info: u32(0),
                sh_addralign: u64(8),
                sh_entsize: u64(section.entsize),
            };
            buffer.extend_from_slice(bytes_of(&header));
        }

        let section_index = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_string(), i))
            .collect();
        BuiltElf {
            bytes: buffer,
            shoff,
            section_index,
        }
    }
}
