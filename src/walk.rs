//! Recursively merging one or more input directory trees into an
//! output tree, one relative path at a time.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{FatElfError, Result};
use crate::merge;

fn leaf_type_matches(a: &Path, b: &Path) -> Result<bool> {
    let ma = fs::symlink_metadata(a)?;
    let mb = fs::symlink_metadata(b)?;
    Ok(ma.file_type().is_dir() == mb.file_type().is_dir()
        && ma.file_type().is_symlink() == mb.file_type().is_symlink()
        && ma.file_type().is_file() == mb.file_type().is_file())
}

/// The deduplicated, ordered set of relative paths to merge across
/// `roots`: every path visited under any root, in first-sighting order,
/// with later sightings of a path already seen (through an earlier root)
/// dropped. Computing this up front, rather than re-`lstat`-ing every
/// earlier root's copy on each later root's matching entry, also makes
/// the "merge happens exactly once per path" property directly
/// checkable without needing to observe merge side effects.
fn collect_merge_plan(roots: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut plan = Vec::new();

    for root in roots {
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| FatElfError::Configuration {
                message: format!("failed to walk '{}': {e}", root.display()),
            })?;

            let relpath = entry
                .path()
                .strip_prefix(root)
                .expect("walkdir entries are always under their root")
                .to_path_buf();

            if relpath.as_os_str().is_empty() {
                // The root directory itself; the output root already exists.
                continue;
            }

            if seen.insert(relpath.clone()) {
                plan.push(relpath);
            }
        }
    }

    Ok(plan)
}

/// Merge each of `roots` into `outdir`, matching files by their path
/// relative to each root. A path already merged during an earlier
/// root's walk is skipped on subsequent roots.
pub fn merge_trees(outdir: &Path, roots: &[PathBuf]) -> Result<()> {
    for root in roots {
        let meta = fs::symlink_metadata(root)?;
        if !meta.is_dir() {
            return Err(FatElfError::Configuration {
                message: format!("input path '{}' is not a directory", root.display()),
            });
        }
    }

    fs::create_dir_all(outdir)?;

    let plan = collect_merge_plan(roots)?;

    for relpath in plan {
        let mut inputs = Vec::new();
        for other_root in roots {
            let candidate = other_root.join(&relpath);
            if fs::symlink_metadata(&candidate).is_ok() {
                if let Some(first) = inputs.first() {
                    if !leaf_type_matches(&candidate, first)? {
                        return Err(FatElfError::UnsupportedFileType { path: candidate });
                    }
                }
                inputs.push(candidate);
            }
        }

        let target = outdir.join(&relpath);
        merge::merge_leaf(&target, &inputs)?;
    }

    Ok(())
}
