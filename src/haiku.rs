//! Detecting and locating Haiku/BeOS resource data appended after an
//! ELF file's structured content, and the matching slot for such data
//! inside a FatELF container.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::elf::{self, ELF_MAGIC};
use crate::endian::Endian;
use crate::error::{FatElfError, Result};
use crate::fatelf::FatElfHeader;
use crate::machine::WordSize;

const HAIKU_RSRC_HEADER_MAGIC: u32 = 0x444f_1000;

const HAIKU_ELF32_RSRC_ALIGN_MIN: u64 = 32;
const HAIKU_ELF64_RSRC_ALIGN: u64 = 8;
const HAIKU_FAT_RSRC_ALIGN: u64 = 8;

fn align(v: u64, a: u64) -> u64 {
    (v + a - 1) / a * a
}

/// The file position at which Haiku resources would begin, for an
/// already-positioned ELF file. May point past EOF if no resources
/// are present.
fn elf_rsrc_offset(path: &Path, file: &mut std::fs::File) -> Result<u64> {
    let identity = elf::read_identity(path, file)?;
    let layout = elf::scan_boundary(path, file, &identity)?;

    let align_value = match identity.wordsize {
        WordSize::Bits64 => HAIKU_ELF64_RSRC_ALIGN,
        WordSize::Bits32 => layout.max_pheader_align.max(HAIKU_ELF32_RSRC_ALIGN_MIN),
    };

    Ok(align(layout.post_elf_end, align_value))
}

/// The file position at which Haiku resources would begin within a
/// FatELF container, computed from the record that extends furthest.
pub fn fat_rsrc_offset(header: &FatElfHeader) -> Option<u64> {
    let furthest = header.furthest_record()?;
    Some(align(furthest.offset + furthest.size, HAIKU_FAT_RSRC_ALIGN))
}

/// Dispatch on file magic to compute the resource offset for either an
/// ELF file or a FatELF container. Returns `None` for anything else.
pub fn rsrc_offset(path: &Path, file: &mut std::fs::File) -> Result<Option<u64>> {
    file.seek(SeekFrom::Start(0))?;
    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() {
        return Ok(None);
    }

    if magic == ELF_MAGIC {
        return Ok(Some(elf_rsrc_offset(path, file)?));
    }

    if Endian::Little.read_u32(&magic, 0)? == crate::fatelf::FATELF_MAGIC {
        file.seek(SeekFrom::Start(0))?;
        let mut whole = Vec::new();
        file.read_to_end(&mut whole)?;
        let header = FatElfHeader::parse(&whole)?;
        return Ok(fat_rsrc_offset(&header));
    }

    Ok(None)
}

/// Validate a candidate resource header and report its size. A parse
/// failure here is never fatal to the caller; it just means "no
/// resource blob was actually present at this offset."
fn parse_rsrc_header(file: &mut std::fs::File, offset: u64) -> Result<Option<u64>> {
    let file_size = file.metadata()?.len();
    if file_size <= offset {
        return Ok(None);
    }

    file.seek(SeekFrom::Start(offset))?;
    let mut magic_bytes = [0u8; 4];
    if file.read_exact(&mut magic_bytes).is_err() {
        return Ok(None);
    }

    let magic_le = Endian::Little.read_u32(&magic_bytes, 0)?;
    let magic_be = Endian::Big.read_u32(&magic_bytes, 0)?;
    if magic_le != HAIKU_RSRC_HEADER_MAGIC && magic_be != HAIKU_RSRC_HEADER_MAGIC {
        return Ok(None);
    }

    Ok(Some(file_size - offset))
}

/// Find a trailing Haiku resource blob in `path`, returning its
/// `(offset, size)` within the file if present.
pub fn find_resource(path: &Path, file: &mut std::fs::File) -> Result<Option<(u64, u64)>> {
    let offset = match rsrc_offset(path, file)? {
        Some(o) => o,
        None => return Ok(None),
    };

    match parse_rsrc_header(file, offset) {
        Ok(Some(size)) => Ok(Some((offset, size))),
        Ok(None) => Ok(None),
        Err(FatElfError::ResourceParseFailure { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_elf_with_trailer(path: &std::path::Path, trailer: &[u8]) {
        let mut data = vec![0u8; 64];
        data[0..4].copy_from_slice(&ELF_MAGIC);
        data[4] = 2; // EI_CLASS 64
        data[5] = 1; // EI_DATA LE
        data[16..18].copy_from_slice(&2u16.to_le_bytes());
        data[18..20].copy_from_slice(&0x3Eu16.to_le_bytes());
        data[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
        data.extend_from_slice(trailer);
        std::fs::File::create(path).unwrap().write_all(&data).unwrap();
    }

    #[test]
    fn test_no_resource_in_plain_elf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.elf");
        write_elf_with_trailer(&path, &[]);

        let mut file = std::fs::File::open(&path).unwrap();
        assert!(find_resource(&path, &mut file).unwrap().is_none());
    }

    #[test]
    fn test_resource_detected_after_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.elf");

        let mut trailer = vec![0u8; 8 - (64 % 8)];
        trailer.extend_from_slice(&HAIKU_RSRC_HEADER_MAGIC.to_le_bytes());
        trailer.extend_from_slice(&[0xAB; 16]);
        write_elf_with_trailer(&path, &trailer);

        let mut file = std::fs::File::open(&path).unwrap();
        let found = find_resource(&path, &mut file).unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn test_align_helper() {
        assert_eq!(align(0, 8), 0);
        assert_eq!(align(1, 8), 8);
        assert_eq!(align(8, 8), 8);
        assert_eq!(align(9, 8), 16);
    }
}
