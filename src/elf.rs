//! Reading just enough of an ELF file to fingerprint it for FatELF
//! purposes, and walking its program/section header tables to find
//! where its data ends.

use std::io::Read;
use std::path::Path;

use crate::endian::Endian;
use crate::error::{FatElfError, Result};
use crate::machine::WordSize;

/// ELF magic: 0x7F 'E' 'L' 'F'.
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;

const PT_NULL: u32 = 0;
const SHT_NULL: u32 = 0;
const SHT_NOBITS: u32 = 8;

/// The handful of ELF header fields a FatELF record needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfIdentity {
    pub wordsize: WordSize,
    pub endian: Endian,
    pub osabi: u8,
    pub osabi_version: u8,
    pub machine: u16,
}

/// Read the ELF identity prefix (e_ident plus e_type/e_machine) from an
/// already-open file, without disturbing callers that need to re-read
/// from the start afterward themselves.
pub fn read_identity(path: &Path, file: &mut std::fs::File) -> Result<ElfIdentity> {
    use std::io::Seek;

    file.seek(std::io::SeekFrom::Start(0))?;
    let mut prefix = [0u8; 20];
    file.read_exact(&mut prefix).map_err(|_| FatElfError::NotElf {
        path: path.to_path_buf(),
    })?;

    if prefix[0..4] != ELF_MAGIC {
        return Err(FatElfError::NotElf {
            path: path.to_path_buf(),
        });
    }

    let wordsize = WordSize::from_ei_class(prefix[EI_CLASS]).ok_or_else(|| FatElfError::MalformedElf {
        path: path.to_path_buf(),
        reason: format!("invalid EI_CLASS byte {}", prefix[EI_CLASS]),
    })?;

    let endian = Endian::from_ei_data(prefix[EI_DATA]).ok_or_else(|| FatElfError::MalformedElf {
        path: path.to_path_buf(),
        reason: format!("invalid EI_DATA byte {}", prefix[EI_DATA]),
    })?;

    // osabi/osabi_version live at e_ident[7] and e_ident[8].
    let osabi = prefix[7];
    let osabi_version = prefix[8];
    let machine = endian.read_u16(&prefix, 18)?;

    Ok(ElfIdentity {
        wordsize,
        endian,
        osabi,
        osabi_version,
        machine,
    })
}

/// Where an ELF file's structured data ends, and the largest segment
/// alignment it declares. Used by the Haiku resource detector to find
/// trailing non-ELF data appended after the file's real content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfLayout {
    pub post_elf_end: u64,
    pub max_pheader_align: u64,
}

struct HeaderTable {
    offset: u64,
    entry_size: u16,
    count: u16,
}

fn read_ehdr_tables(
    path: &Path,
    file: &mut std::fs::File,
    identity: &ElfIdentity,
) -> Result<(u64, HeaderTable, HeaderTable)> {
    use std::io::Seek;

    file.seek(std::io::SeekFrom::Start(0))?;
    let bad = |reason: &str| FatElfError::MalformedElf {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    match identity.wordsize {
        WordSize::Bits32 => {
            let mut buf = [0u8; 52];
            file.read_exact(&mut buf).map_err(|_| bad("truncated Elf32_Ehdr"))?;
            let e = identity.endian;
            let phoff = e.read_u32(&buf, 28)? as u64;
            let shoff = e.read_u32(&buf, 32)? as u64;
            let ehsize = e.read_u16(&buf, 40)? as u64;
            let phentsize = e.read_u16(&buf, 42)?;
            let phnum = e.read_u16(&buf, 44)?;
            let shentsize = e.read_u16(&buf, 46)?;
            let shnum = e.read_u16(&buf, 48)?;
            Ok((
                ehsize,
                HeaderTable { offset: phoff, entry_size: phentsize, count: phnum },
                HeaderTable { offset: shoff, entry_size: shentsize, count: shnum },
            ))
        }
        WordSize::Bits64 => {
            let mut buf = [0u8; 64];
            file.read_exact(&mut buf).map_err(|_| bad("truncated Elf64_Ehdr"))?;
            let e = identity.endian;
            let phoff = e.read_u64(&buf, 32)?;
            let shoff = e.read_u64(&buf, 40)?;
            let ehsize = e.read_u16(&buf, 52)? as u64;
            let phentsize = e.read_u16(&buf, 54)?;
            let phnum = e.read_u16(&buf, 56)?;
            let shentsize = e.read_u16(&buf, 58)?;
            let shnum = e.read_u16(&buf, 60)?;
            Ok((
                ehsize,
                HeaderTable { offset: phoff, entry_size: phentsize, count: phnum },
                HeaderTable { offset: shoff, entry_size: shentsize, count: shnum },
            ))
        }
    }
}

/// Walk the program and section header tables to find the offset past
/// which no ELF-structured data lives, plus the largest `p_align` any
/// program header declares.
pub fn scan_boundary(path: &Path, file: &mut std::fs::File, identity: &ElfIdentity) -> Result<ElfLayout> {
    use std::io::Seek;

    let (ehsize, prog, sect) = read_ehdr_tables(path, file, identity)?;
    let e = identity.endian;

    let mut post_elf_end: u64 = ehsize;
    let mut max_align: u64 = 0;

    if prog.offset != 0 && prog.count != 0 {
        let table_size = prog.entry_size as u64 * prog.count as u64;
        post_elf_end = post_elf_end.max(prog.offset + table_size);

        file.seek(std::io::SeekFrom::Start(prog.offset))?;
        let mut table = vec![0u8; table_size as usize];
        file.read_exact(&mut table).map_err(|_| FatElfError::MalformedElf {
            path: path.to_path_buf(),
            reason: "truncated program header table".to_string(),
        })?;

        for i in 0..prog.count as usize {
            let base = i * prog.entry_size as usize;
            let (ptype, poffset, pfilesz, palign) = match identity.wordsize {
                WordSize::Bits32 => (
                    e.read_u32(&table, base)?,
                    e.read_u32(&table, base + 4)? as u64,
                    e.read_u32(&table, base + 16)? as u64,
                    e.read_u32(&table, base + 28)? as u64,
                ),
                WordSize::Bits64 => (
                    e.read_u32(&table, base)?,
                    e.read_u64(&table, base + 8)?,
                    e.read_u64(&table, base + 32)?,
                    e.read_u64(&table, base + 48)?,
                ),
            };

            if ptype == PT_NULL {
                continue;
            }
            post_elf_end = post_elf_end.max(poffset + pfilesz);
            max_align = max_align.max(palign);
        }
    }

    if sect.offset != 0 && sect.count != 0 {
        let table_size = sect.entry_size as u64 * sect.count as u64;
        post_elf_end = post_elf_end.max(sect.offset + table_size);

        file.seek(std::io::SeekFrom::Start(sect.offset))?;
        let mut table = vec![0u8; table_size as usize];
        file.read_exact(&mut table).map_err(|_| FatElfError::MalformedElf {
            path: path.to_path_buf(),
            reason: "truncated section header table".to_string(),
        })?;

        for i in 0..sect.count as usize {
            let base = i * sect.entry_size as usize;
            let (stype, soffset, ssize) = match identity.wordsize {
                WordSize::Bits32 => (
                    e.read_u32(&table, base + 4)?,
                    e.read_u32(&table, base + 16)? as u64,
                    e.read_u32(&table, base + 20)? as u64,
                ),
                WordSize::Bits64 => (
                    e.read_u32(&table, base + 4)?,
                    e.read_u64(&table, base + 24)?,
                    e.read_u64(&table, base + 32)?,
                ),
            };

            if stype == SHT_NULL || stype == SHT_NOBITS {
                continue;
            }
            post_elf_end = post_elf_end.max(soffset + ssize);
        }
    }

    Ok(ElfLayout {
        post_elf_end,
        max_pheader_align: max_align,
    })
}

/// Placeholder kept for call sites that only need a path, not an
/// already-open file handle.
pub fn open_and_read_identity(path: &Path) -> Result<(std::fs::File, ElfIdentity)> {
    let mut file = std::fs::File::open(path)?;
    let identity = read_identity(path, &mut file)?;
    Ok((file, identity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_minimal_elf64(path: &Path, machine: u16) {
        let mut data = vec![0u8; 64];
        data[0..4].copy_from_slice(&ELF_MAGIC);
        data[EI_CLASS] = 2; // 64-bit
        data[EI_DATA] = 1; // little endian
        data[7] = 0; // osabi
        data[16..18].copy_from_slice(&2u16.to_le_bytes()); // e_type
        data[18..20].copy_from_slice(&machine.to_le_bytes());
        data[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
        // e_phoff/e_shoff left zero: no tables.
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(&data).unwrap();
    }

    #[test]
    fn test_read_identity_basic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.elf");
        write_minimal_elf64(&path, 0x3E);

        let mut file = std::fs::File::open(&path).unwrap();
        let identity = read_identity(&path, &mut file).unwrap();
        assert_eq!(identity.wordsize, WordSize::Bits64);
        assert_eq!(identity.endian, Endian::Little);
        assert_eq!(identity.machine, 0x3E);
    }

    #[test]
    fn test_read_identity_rejects_non_elf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"not an elf file at all").unwrap();

        let mut file = std::fs::File::open(&path).unwrap();
        assert!(matches!(
            read_identity(&path, &mut file),
            Err(FatElfError::NotElf { .. })
        ));
    }

    #[test]
    fn test_scan_boundary_no_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.elf");
        write_minimal_elf64(&path, 0x3E);

        let mut file = std::fs::File::open(&path).unwrap();
        let identity = read_identity(&path, &mut file).unwrap();
        let layout = scan_boundary(&path, &mut file, &identity).unwrap();
        assert_eq!(layout.post_elf_end, 64); // just e_ehsize, no ph/sh tables
        assert_eq!(layout.max_pheader_align, 0);
    }
}
