//! Assembling a FatELF container from a list of per-architecture ELF
//! binaries.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::elf;
use crate::error::{FatElfError, Result};
use crate::fatelf::{self, FatElfHeader, FatElfRecord};
use crate::haiku;

/// Unlinks its path on drop unless disarmed, so a failed container
/// build doesn't leave a truncated output file behind. Mirrors the
/// original tool's process-global `unlink_on_xfail`, scoped instead to
/// the lifetime of one `write_container` call.
struct OutputGuard {
    path: PathBuf,
    armed: bool,
}

impl OutputGuard {
    fn new(path: PathBuf) -> OutputGuard {
        OutputGuard { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn copy_range(src: &mut File, dst: &mut File, offset: u64, len: u64) -> Result<()> {
    src.seek(SeekFrom::Start(offset))?;
    let mut remaining = len;
    let mut buf = [0u8; 64 * 1024];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        src.read_exact(&mut buf[..chunk])?;
        dst.write_all(&buf[..chunk])?;
        remaining -= chunk as u64;
    }
    Ok(())
}

fn write_zeros(dst: &mut File, count: u64) -> Result<()> {
    let mut remaining = count;
    let buf = [0u8; 64 * 1024];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        dst.write_all(&buf[..chunk])?;
        remaining -= chunk as u64;
    }
    Ok(())
}

/// Write a FatELF container at `out` packing each of `inputs` as its
/// own architecture slot. Implements the six steps spec'd for the
/// container writer: preflight, per-input identity read and duplicate
/// check, page-aligned append (truncated ahead of any Haiku resource
/// blob), header write, donor resource copy, close.
pub fn write_container(out: &Path, inputs: &[PathBuf]) -> Result<()> {
    if inputs.is_empty() {
        return Err(FatElfError::NothingToDo);
    }
    if inputs.len() > 0xFF {
        return Err(FatElfError::TooManyRecords { count: inputs.len() });
    }

    let mut out_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(out)?;
    let mut guard = OutputGuard::new(out.to_path_buf());

    let mut header = FatElfHeader::new();
    let initial_offset = fatelf::disk_format_size(inputs.len());
    write_zeros(&mut out_file, initial_offset)?;

    let mut offset = initial_offset;
    let mut resource_donor: Option<(usize, u64, u64)> = None;

    for (i, path) in inputs.iter().enumerate() {
        let binary_offset = fatelf::align_to_page(offset);
        let mut in_file = File::open(path)?;

        let identity = elf::read_identity(path, &mut in_file)?;
        let mut record = FatElfRecord {
            machine: identity.machine,
            osabi: identity.osabi,
            osabi_version: identity.osabi_version,
            wordsize: identity.wordsize.to_ei_class(),
            endian: identity.endian.to_ei_data(),
            offset: binary_offset,
            size: 0,
        };

        for (earlier_idx, earlier) in header.records.iter().enumerate() {
            if record.matches(earlier) {
                return Err(FatElfError::DuplicateTarget {
                    first: inputs[earlier_idx].clone(),
                    second: path.clone(),
                });
            }
        }

        tracing::debug!(path = %path.display(), machine = identity.machine, "packing input");

        write_zeros(&mut out_file, binary_offset - offset)?;

        let file_size = in_file.metadata()?.len();
        let resource = haiku::find_resource(path, &mut in_file)?;

        let payload_size = match resource {
            Some((rsrc_offset, rsrc_size)) => {
                if resource_donor.is_none() {
                    resource_donor = Some((i, rsrc_offset, rsrc_size));
                }
                file_size - rsrc_size
            }
            None => file_size,
        };

        copy_range(&mut in_file, &mut out_file, 0, payload_size)?;
        record.size = payload_size;
        offset = binary_offset + payload_size;

        header.records.push(record);
    }

    let encoded = header.encode();
    out_file.seek(SeekFrom::Start(0))?;
    out_file.write_all(&encoded)?;

    // Rather than merge resources from every input, the first donor
    // found wins; the original tool does the same.
    if let Some((idx, rsrc_offset, rsrc_size)) = resource_donor {
        out_file.seek(SeekFrom::Start(0))?;
        let mut whole = Vec::new();
        out_file.read_to_end(&mut whole)?;
        let written_header = FatElfHeader::parse(&whole)?;

        if let Some(target_offset) = haiku::fat_rsrc_offset(&written_header) {
            let donor_path = &inputs[idx];
            let mut donor_file = File::open(donor_path)?;
            write_zeros_to_target(&mut out_file, target_offset)?;
            copy_range(&mut donor_file, &mut out_file, rsrc_offset, rsrc_size)?;
        }
    }

    out_file.sync_all()?;
    guard.disarm();
    Ok(())
}

fn write_zeros_to_target(out_file: &mut File, target_offset: u64) -> Result<()> {
    let current_len = out_file.metadata()?.len();
    if target_offset > current_len {
        out_file.seek(SeekFrom::Start(current_len))?;
        write_zeros(out_file, target_offset - current_len)?;
    }
    out_file.seek(SeekFrom::Start(target_offset))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_minimal_elf(path: &Path, machine: u16, endian: u8, payload_tail: &[u8]) {
        let mut data = vec![0u8; 64];
        data[0..4].copy_from_slice(&elf::ELF_MAGIC);
        data[4] = 2; // 64-bit
        data[5] = endian;
        data[16..18].copy_from_slice(&2u16.to_le_bytes());
        data[18..20].copy_from_slice(&machine.to_le_bytes());
        data[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
        data.extend_from_slice(payload_tail);
        File::create(path).unwrap().write_all(&data).unwrap();
    }

    fn write_elf_with_resource(path: &Path, machine: u16, resource: &[u8]) {
        let mut data = vec![0u8; 64];
        data[0..4].copy_from_slice(&elf::ELF_MAGIC);
        data[4] = 2; // 64-bit
        data[5] = 1; // little endian
        data[16..18].copy_from_slice(&2u16.to_le_bytes());
        data[18..20].copy_from_slice(&machine.to_le_bytes());
        data[52..54].copy_from_slice(&64u16.to_le_bytes()); // e_ehsize
        data.extend_from_slice(resource);
        File::create(path).unwrap().write_all(&data).unwrap();
    }

    fn haiku_resource_blob(body: &[u8]) -> Vec<u8> {
        let mut blob = 0x444f_1000u32.to_le_bytes().to_vec();
        blob.extend_from_slice(body);
        blob
    }

    #[test]
    fn test_write_container_two_archs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.elf");
        let b = dir.path().join("b.elf");
        write_minimal_elf(&a, 0x3E, 1, b"AAAA");
        write_minimal_elf(&b, 0xB7, 1, b"BBBB");

        let out = dir.path().join("fat.bin");
        write_container(&out, &[a, b]).unwrap();

        let bytes = std::fs::read(&out).unwrap();
        assert!(FatElfHeader::detect(&bytes));
        let header = FatElfHeader::parse(&bytes).unwrap();
        assert_eq!(header.records.len(), 2);
        assert_eq!(header.records[0].machine, 0x3E);
        assert_eq!(header.records[1].machine, 0xB7);
        assert_eq!(header.records[0].offset % fatelf::FATELF_PAGE_SIZE, 0);
        assert_eq!(header.records[1].offset % fatelf::FATELF_PAGE_SIZE, 0);
        // No overlap between the two embedded binaries' byte ranges.
        assert!(header.records[1].offset >= header.records[0].offset + header.records[0].size);
    }

    #[test]
    fn test_rejects_duplicate_targets() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.elf");
        let b = dir.path().join("b.elf");
        write_minimal_elf(&a, 0x3E, 1, b"AAAA");
        write_minimal_elf(&b, 0x3E, 1, b"BBBB");

        let out = dir.path().join("fat.bin");
        let err = write_container(&out, &[a, b]).unwrap_err();
        assert!(matches!(err, FatElfError::DuplicateTarget { .. }));
        // The partial output must not survive a failed build.
        assert!(!out.exists());
    }

    #[test]
    fn test_rejects_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("fat.bin");
        assert!(matches!(write_container(&out, &[]), Err(FatElfError::NothingToDo)));
    }

    #[test]
    fn test_rejects_too_many_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = Vec::new();
        for i in 0..256 {
            let path = dir.path().join(format!("e{i}.elf"));
            write_minimal_elf(&path, 0x3E, 1, &[]);
            inputs.push(path);
        }

        let out = dir.path().join("fat.bin");
        let err = write_container(&out, &inputs).unwrap_err();
        assert!(matches!(err, FatElfError::TooManyRecords { count: 256 }));
    }

    #[test]
    fn test_resource_passthrough_single_input() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.elf");
        let resource = haiku_resource_blob(&[0xAB; 16]);
        write_elf_with_resource(&a, 0x3E, &resource);

        let out = dir.path().join("fat.bin");
        write_container(&out, &[a]).unwrap();

        let bytes = std::fs::read(&out).unwrap();
        assert!(bytes.ends_with(&resource));
    }

    #[test]
    fn test_resource_donor_is_lowest_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.elf");
        let b = dir.path().join("b.elf");
        let resource_a = haiku_resource_blob(&[0x11; 8]);
        let resource_b = haiku_resource_blob(&[0x22; 8]);
        write_elf_with_resource(&a, 0x3E, &resource_a);
        write_elf_with_resource(&b, 0xB7, &resource_b);

        let out = dir.path().join("fat.bin");
        write_container(&out, &[a, b]).unwrap();

        let bytes = std::fs::read(&out).unwrap();
        assert!(bytes.ends_with(&resource_a));
        assert!(!bytes.ends_with(&resource_b));
    }
}
