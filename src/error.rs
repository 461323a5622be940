//! Error types for FatELF composition.
//!
//! This module defines all error types used throughout the crate,
//! providing detailed error information for debugging and user feedback.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for FatELF operations.
#[derive(Debug, Error)]
pub enum FatElfError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unsupported invocation.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The file does not begin with the ELF magic.
    #[error("'{path}' is not an ELF binary")]
    NotElf { path: PathBuf },

    /// The file claims to be ELF but its header is inconsistent.
    #[error("'{path}' has a malformed ELF header: {reason}")]
    MalformedElf { path: PathBuf, reason: String },

    /// The file does not begin with the FatELF magic.
    #[error("'{path}' is not a FatELF container")]
    NotFatElf { path: PathBuf },

    /// Two inputs resolve to the same machine/osabi/wordsize/endian target.
    #[error("'{first}' and '{second}' are for the same target")]
    DuplicateTarget { first: PathBuf, second: PathBuf },

    /// More than 255 binaries were supplied.
    #[error("too many binaries (max is 255), got {count}")]
    TooManyRecords { count: usize },

    /// No binaries were supplied.
    #[error("nothing to do")]
    NothingToDo,

    /// An input's file type (other than regular file, directory, or
    /// symlink) cannot be merged.
    #[error("unsupported input file type for '{path}'")]
    UnsupportedFileType { path: PathBuf },

    /// An operation was attempted that this crate does not support,
    /// such as merging nested FatELF containers.
    #[error("unsupported merge of '{path}': {reason}")]
    UnsupportedMerge { path: PathBuf, reason: String },

    /// Two non-ELF regular files that should be identical across
    /// inputs differ in length or content. Recoverable: the walker
    /// logs this and continues.
    #[error("'{first}' and '{second}' differ")]
    FileMismatch { first: PathBuf, second: PathBuf },

    /// A Haiku resource blob's header failed to parse. Never fatal;
    /// callers treat this as "no resource present."
    #[error("failed to parse Haiku resource header in '{path}': {reason}")]
    ResourceParseFailure { path: PathBuf, reason: String },
}

/// Result type alias for FatELF operations.
pub type Result<T> = std::result::Result<T, FatElfError>;
