//! Reading `ar` archive member headers. This crate only needs to
//! enumerate members (name, size, data offset) for classification and
//! diagnostics; it never rewrites an archive's internal structure.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{FatElfError, Result};

/// ar archive magic: `"!<arch>\n"`.
pub const AR_MAGIC: [u8; 8] = *b"!<arch>\n";

const MEMBER_HEADER_SIZE: usize = 60;
const NAME_SIZE: usize = 16;
const SIZE_OFFSET: usize = 48;
const SIZE_SIZE: usize = 10;
const FMAG_OFFSET: usize = 58;
const FMAG: [u8; 2] = [b'`', b'\n'];

/// BSD extended filename marker: `"#1/"`.
const AR_EFMT1: &str = "#1/";

/// One member's resolved metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArMember {
    pub name: String,
    /// Absolute file offset where this member's data begins.
    pub data_offset: u64,
    pub size: u64,
}

/// A sequential reader over an ar archive's members.
pub struct ArReader<'a> {
    file: &'a mut std::fs::File,
    pos: u64,
    string_table: Option<Vec<u8>>,
}

impl<'a> ArReader<'a> {
    /// Open `file` as an ar archive, validating the magic.
    pub fn new(file: &'a mut std::fs::File) -> Result<ArReader<'a>> {
        file.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; 8];
        file.read_exact(&mut magic).map_err(|_| FatElfError::Configuration {
            message: "truncated ar archive magic".to_string(),
        })?;
        if magic != AR_MAGIC {
            return Err(FatElfError::Configuration {
                message: "not an ar archive".to_string(),
            });
        }
        Ok(ArReader {
            file,
            pos: 8,
            string_table: None,
        })
    }

    fn resolve_name(&mut self, raw: &[u8; NAME_SIZE]) -> Result<String> {
        // Names are right-padded with spaces; GNU uses a trailing '/'
        // terminator (but not for the special "/" and "//" entries).
        let mut end = NAME_SIZE;
        while end > 0 && raw[end - 1] == b' ' {
            end -= 1;
        }
        let mut name = String::from_utf8_lossy(&raw[..end]).into_owned();

        if name.ends_with('/') && name != "/" && name != "//" {
            name.pop();
        }

        if let Some(rest) = name.strip_prefix(AR_EFMT1) {
            // BSD long name: the real name follows the header inline.
            let name_len: usize = rest.trim().parse().map_err(|_| FatElfError::Configuration {
                message: format!("malformed BSD long-name length in '{name}'"),
            })?;
            let mut buf = vec![0u8; name_len];
            self.file.read_exact(&mut buf)?;
            self.pos += name_len as u64;
            let real = String::from_utf8_lossy(&buf).trim_end_matches('\0').to_string();
            return Ok(real);
        }

        if let Some(rest) = name.strip_prefix('/') {
            if let Ok(table_offset) = rest.parse::<usize>() {
                if let Some(table) = &self.string_table {
                    if table_offset < table.len() {
                        let slice = &table[table_offset..];
                        let end = slice.iter().position(|&b| b == b'/').unwrap_or(slice.len());
                        return Ok(String::from_utf8_lossy(&slice[..end]).into_owned());
                    }
                    return Err(FatElfError::Configuration {
                        message: format!("invalid GNU string table offset {table_offset}"),
                    });
                }
            }
        }

        Ok(name)
    }

    /// Read the next member header, transparently consuming (and
    /// skipping over) the GNU `//` string table entry if present.
    pub fn next_member(&mut self) -> Result<Option<ArMember>> {
        loop {
            self.file.seek(SeekFrom::Start(self.pos))?;
            let mut header = [0u8; MEMBER_HEADER_SIZE];
            match self.file.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            }

            if header[FMAG_OFFSET..FMAG_OFFSET + 2] != FMAG {
                return Err(FatElfError::Configuration {
                    message: "malformed ar member header terminator".to_string(),
                });
            }

            let mut name_raw = [0u8; NAME_SIZE];
            name_raw.copy_from_slice(&header[0..NAME_SIZE]);

            let size_str = String::from_utf8_lossy(&header[SIZE_OFFSET..SIZE_OFFSET + SIZE_SIZE]);
            let size: u64 = size_str.trim().parse().map_err(|_| FatElfError::Configuration {
                message: "malformed ar member size field".to_string(),
            })?;

            self.pos += MEMBER_HEADER_SIZE as u64;
            let header_end = self.pos;

            let name = self.resolve_name(&name_raw)?;
            let data_offset = self.pos;
            let consumed = data_offset - header_end;
            let remaining_size = size - consumed;

            // Members are padded to an even byte boundary.
            let mut next_pos = data_offset + remaining_size;
            if next_pos % 2 != 0 {
                next_pos += 1;
            }

            if name == "//" {
                let mut table = vec![0u8; remaining_size as usize];
                self.file.seek(SeekFrom::Start(data_offset))?;
                self.file.read_exact(&mut table)?;
                self.string_table = Some(table);
                self.pos = next_pos;
                continue;
            }

            self.pos = next_pos;

            if name == "/" {
                // GNU symbol table; nothing for this crate to do with it.
                continue;
            }

            return Ok(Some(ArMember {
                name,
                data_offset,
                size: remaining_size,
            }));
        }
    }
}
