//! The FatELF container format: header, per-architecture records, and
//! the byte layout rules that tie them together.

use crate::endian::Endian;
use crate::error::Result;

/// FatELF magic, always stored little-endian on disk.
pub const FATELF_MAGIC: u32 = 0x1F0E_70FA;

/// Format version this crate writes and expects to read.
pub const FATELF_FORMAT_VERSION: u16 = 1;

/// Fixed header size: magic(4) + version(2) + num_records(1) + reserved(1).
pub const FATELF_HEADER_SIZE: usize = 8;

/// Size of one on-disk record.
pub const FATELF_RECORD_SIZE: usize = 24;

/// Binaries are packed on 4096-byte boundaries regardless of the host's
/// actual page size, matching the original format's fixed constant.
pub const FATELF_PAGE_SIZE: u64 = 4096;

/// A single architecture's slot within a FatELF container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FatElfRecord {
    pub machine: u16,
    pub osabi: u8,
    pub osabi_version: u8,
    pub wordsize: u8,
    pub endian: u8,
    pub offset: u64,
    pub size: u64,
}

impl FatElfRecord {
    /// Two records target the same (machine, osabi, osabi_version,
    /// wordsize, endian) tuple, and therefore can't coexist in one
    /// container.
    pub fn matches(&self, other: &FatElfRecord) -> bool {
        self.machine == other.machine
            && self.osabi == other.osabi
            && self.osabi_version == other.osabi_version
            && self.wordsize == other.wordsize
            && self.endian == other.endian
    }

    fn decode(data: &[u8], offset: usize) -> Result<FatElfRecord> {
        Ok(FatElfRecord {
            machine: Endian::Little.read_u16(data, offset)?,
            osabi: data[offset + 2],
            osabi_version: data[offset + 3],
            wordsize: data[offset + 4],
            endian: data[offset + 5],
            // bytes offset+6..offset+8 are reserved padding.
            offset: Endian::Little.read_u64(data, offset + 8)?,
            size: Endian::Little.read_u64(data, offset + 16)?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&Endian::Little.write_u16(self.machine));
        out.push(self.osabi);
        out.push(self.osabi_version);
        out.push(self.wordsize);
        out.push(self.endian);
        out.extend_from_slice(&[0u8; 2]); // reserved
        out.extend_from_slice(&Endian::Little.write_u64(self.offset));
        out.extend_from_slice(&Endian::Little.write_u64(self.size));
    }
}

/// A fully parsed (or about-to-be-written) FatELF header.
#[derive(Debug, Clone)]
pub struct FatElfHeader {
    pub version: u16,
    pub records: Vec<FatElfRecord>,
}

impl FatElfHeader {
    pub fn new() -> FatElfHeader {
        FatElfHeader {
            version: FATELF_FORMAT_VERSION,
            records: Vec::new(),
        }
    }

    /// `true` if the first four bytes are the FatELF magic.
    pub fn detect(data: &[u8]) -> bool {
        data.len() >= 4 && Endian::Little.read_u32(data, 0).unwrap_or(0) == FATELF_MAGIC
    }

    pub fn parse(data: &[u8]) -> Result<FatElfHeader> {
        if data.len() < FATELF_HEADER_SIZE {
            return Err(crate::error::FatElfError::Configuration {
                message: format!(
                    "truncated FatELF header: need {FATELF_HEADER_SIZE} bytes, have {}",
                    data.len()
                ),
            });
        }

        let magic = Endian::Little.read_u32(data, 0)?;
        if magic != FATELF_MAGIC {
            return Err(crate::error::FatElfError::NotFatElf {
                path: std::path::PathBuf::new(),
            });
        }

        let version = Endian::Little.read_u16(data, 4)?;
        let num_records = data[6] as usize;

        let records_size = num_records * FATELF_RECORD_SIZE;
        if data.len() < FATELF_HEADER_SIZE + records_size {
            return Err(crate::error::FatElfError::Configuration {
                message: format!(
                    "truncated FatELF record table: need {records_size} bytes at offset {FATELF_HEADER_SIZE}"
                ),
            });
        }

        let mut records = Vec::with_capacity(num_records);
        for i in 0..num_records {
            records.push(FatElfRecord::decode(
                data,
                FATELF_HEADER_SIZE + i * FATELF_RECORD_SIZE,
            )?);
        }

        Ok(FatElfHeader { version, records })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(header_size(self.records.len()));
        out.extend_from_slice(&Endian::Little.write_u32(FATELF_MAGIC));
        out.extend_from_slice(&Endian::Little.write_u16(self.version));
        out.push(self.records.len() as u8);
        out.push(0); // reserved
        for rec in &self.records {
            rec.encode(&mut out);
        }
        out
    }

    /// The record whose payload ends at the highest file offset, if any.
    pub fn furthest_record(&self) -> Option<&FatElfRecord> {
        self.records.iter().max_by_key(|r| r.offset + r.size)
    }
}

impl Default for FatElfHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// On-disk size of a header with `num_records` entries.
pub fn header_size(num_records: usize) -> usize {
    FATELF_HEADER_SIZE + num_records * FATELF_RECORD_SIZE
}

/// Alias kept for symmetry with the original's `FATELF_DISK_FORMAT_SIZE`
/// macro: the space the header itself occupies before any binary data.
pub fn disk_format_size(num_records: usize) -> u64 {
    header_size(num_records) as u64
}

/// Round `offset` up to the next page boundary.
pub fn align_to_page(offset: u64) -> u64 {
    (offset + (FATELF_PAGE_SIZE - 1)) / FATELF_PAGE_SIZE * FATELF_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_record(machine: u16, offset: u64, size: u64) -> FatElfRecord {
        FatElfRecord {
            machine,
            osabi: 0,
            osabi_version: 0,
            wordsize: 2,
            endian: 1,
            offset,
            size,
        }
    }

    #[test]
    fn test_align_to_page() {
        assert_eq!(align_to_page(0), 0);
        assert_eq!(align_to_page(1), 4096);
        assert_eq!(align_to_page(4096), 4096);
        assert_eq!(align_to_page(4097), 8192);
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = FatElfHeader::new();
        header.records.push(sample_record(0x3E, 4096, 100));
        header.records.push(sample_record(0xB7, 8192, 200));

        let bytes = header.encode();
        assert!(FatElfHeader::detect(&bytes));

        let parsed = FatElfHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0], header.records[0]);
        assert_eq!(parsed.records[1], header.records[1]);
    }

    #[test]
    fn test_records_match() {
        let a = sample_record(0x3E, 0, 0);
        let b = sample_record(0x3E, 9999, 9999);
        assert!(a.matches(&b));

        let c = sample_record(0xB7, 0, 0);
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_furthest_record() {
        let mut header = FatElfHeader::new();
        header.records.push(sample_record(0x3E, 4096, 100));
        header.records.push(sample_record(0xB7, 8192, 1_000_000));
        let furthest = header.furthest_record().unwrap();
        assert_eq!(furthest.machine, 0xB7);
    }

    #[test]
    fn test_detect_rejects_non_fatelf() {
        let data = [0x7F, b'E', b'L', b'F'];
        assert!(!FatElfHeader::detect(&data));
    }

    #[test]
    fn test_parse_truncated() {
        let data = [0u8; 4];
        assert!(FatElfHeader::parse(&data).is_err());
    }
}
