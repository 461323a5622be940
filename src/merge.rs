//! Merging one leaf path (a file, directory, or symlink) that appears
//! under the same relative location in every input root.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::ar::ArReader;
use crate::classify::{self, Kind};
use crate::container;
use crate::error::{FatElfError, Result};

/// The kind of filesystem entry a merge input resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeafType {
    Dir,
    Regular,
    Symlink,
}

fn leaf_type(meta: &fs::Metadata) -> Option<LeafType> {
    let ft = meta.file_type();
    if ft.is_dir() {
        Some(LeafType::Dir)
    } else if ft.is_file() {
        Some(LeafType::Regular)
    } else if ft.is_symlink() {
        Some(LeafType::Symlink)
    } else {
        None
    }
}

fn leading_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; 8];
    let n = file.read(&mut buf)?;
    Ok(buf[..n].to_vec())
}

/// Copy filesystem attributes (permission bits, mtime) from `src` onto
/// `dst`, matching the original tool's `xcopyfile_attr`.
fn copy_attrs(src: &Path, dst: &Path) -> Result<()> {
    let meta = fs::symlink_metadata(src)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if !meta.file_type().is_symlink() {
            fs::set_permissions(dst, fs::Permissions::from_mode(meta.permissions().mode()))?;
        }
    }

    if !meta.file_type().is_symlink() {
        let mtime = FileTime::from_last_modification_time(&meta);
        filetime::set_file_mtime(dst, mtime)?;
    }

    Ok(())
}

/// Log each archive member's classification without rewriting the
/// archive itself. Matches the original tool's `ar_dostuff`, which
/// only ever reports what it sees.
fn log_ar_members(path: &Path) -> Result<()> {
    let mut file = File::open(path)?;
    let mut reader = match ArReader::new(&mut file) {
        Ok(r) => r,
        Err(_) => return Ok(()),
    };

    while let Some(member) = reader.next_member()? {
        tracing::debug!(archive = %path.display(), member = %member.name, "ar member");
    }

    Ok(())
}

/// Byte-for-byte copy `inputs[0]` to `out`, verifying every other
/// input matches it exactly. Mismatches are logged and the mismatched
/// input is skipped, matching the original's recoverable behavior.
fn merge_equal_files(out: &Path, inputs: &[PathBuf]) -> Result<()> {
    let mut readers: Vec<Option<File>> = Vec::with_capacity(inputs.len());
    for path in inputs {
        readers.push(Some(File::open(path)?));
    }

    let mut out_file = File::create(out)?;
    let mut buffers: Vec<Vec<u8>> = vec![vec![0u8; 64 * 1024]; inputs.len()];

    loop {
        let mut first_n = 0usize;
        let mut done = false;

        for i in 0..inputs.len() {
            let reader = match readers[i].as_mut() {
                Some(r) => r,
                None => continue,
            };

            let n = reader.read(&mut buffers[i])?;

            if i == 0 {
                first_n = n;
                if n == 0 {
                    done = true;
                }
                out_file.write_all(&buffers[0][..n])?;
            } else if n != first_n || buffers[i][..n] != buffers[0][..first_n] {
                tracing::warn!(
                    a = %inputs[0].display(),
                    b = %inputs[i].display(),
                    "inputs differ during merge"
                );
                eprintln!(
                    "fatelf-glue: '{}' and '{}' differ; keeping '{}'",
                    inputs[0].display(),
                    inputs[i].display(),
                    inputs[0].display()
                );
                readers[i] = None;
            }
        }

        if done {
            break;
        }
    }

    Ok(())
}

/// Merge one leaf path across all of `inputs`, writing the result to
/// `out`. `inputs` are pre-verified to share the same [`LeafType`].
pub fn merge_leaf(out: &Path, inputs: &[PathBuf]) -> Result<()> {
    if inputs.is_empty() {
        return Ok(());
    }

    let first = &inputs[0];
    let meta = fs::symlink_metadata(first)?;
    let kind = leaf_type(&meta).ok_or_else(|| FatElfError::UnsupportedFileType {
        path: first.clone(),
    })?;

    match kind {
        LeafType::Dir => {
            match fs::create_dir(out) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let existing = fs::symlink_metadata(out)?;
                    if !existing.file_type().is_dir() {
                        return Err(FatElfError::UnsupportedFileType { path: out.to_path_buf() });
                    }
                }
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }

        LeafType::Symlink => {
            let target = fs::read_link(first)?;
            match std::os::unix::fs::symlink(&target, out) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let existing = fs::symlink_metadata(out)?;
                    if !existing.file_type().is_symlink() {
                        return Err(FatElfError::UnsupportedFileType { path: out.to_path_buf() });
                    }
                }
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }

        LeafType::Regular => {
            let magic = leading_bytes(first)?;
            match classify::classify(&magic) {
                Kind::Elf if inputs.len() > 1 => {
                    container::write_container(out, inputs)?;
                }
                Kind::Elf => {
                    // Nothing to pack a lone ELF input against; copy it
                    // through the same equality-merge path as a plain file.
                    merge_equal_files(out, inputs)?;
                }
                Kind::FatElf => {
                    return Err(FatElfError::UnsupportedMerge {
                        path: first.clone(),
                        reason: "merging of FatELF inputs is not supported".to_string(),
                    });
                }
                Kind::Ar => {
                    log_ar_members(first)?;
                    merge_equal_files(out, inputs)?;
                }
                Kind::Other => {
                    merge_equal_files(out, inputs)?;
                }
            }
        }
    }

    copy_attrs(first, out)?;
    Ok(())
}
