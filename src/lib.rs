//! FatELF multi-architecture binary composition core.
//!
//! This crate packs one ELF binary per supported architecture into a
//! single FatELF container, and can recursively merge entire directory
//! trees of such binaries (plus the ordinary files and symlinks that
//! live alongside them). It also understands Haiku/BeOS resource data
//! appended after an ELF binary's structured content, relocating it
//! into the composed container rather than discarding it.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod ar;
pub mod classify;
pub mod container;
pub mod elf;
pub mod endian;
pub mod error;
pub mod fatelf;
pub mod haiku;
pub mod machine;
pub mod merge;
pub mod walk;

use std::path::PathBuf;

pub use error::{FatElfError, Result};

/// Pack `inputs` into a single FatELF container at `out`. Corresponds
/// to the plain (non-recursive) CLI invocation.
pub fn glue(out: &std::path::Path, inputs: &[PathBuf]) -> Result<()> {
    container::write_container(out, inputs)
}

/// Recursively merge every input directory in `roots` into `outdir`.
/// Corresponds to the `-r` CLI invocation.
pub fn glue_recursive(outdir: &std::path::Path, roots: &[PathBuf]) -> Result<()> {
    walk::merge_trees(outdir, roots)
}
