// Crate-wide error type.
//
// Every failure the core can report is a distinct variant so the CLI can
// map it to a distinguishable exit status. Nothing here is retried or
// swallowed inside the library.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::codec::CodecError;
use crate::config::CompressionConfig;
use crate::header::{CODEC_PREFIX_LEN, HEADER_LEN};

pub type Result<T> = std::result::Result<T, Error>;

/// Which codec entry point failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Diff,
    Apply,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Diff => f.write_str("diff"),
            Self::Apply => f.write_str("apply"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("codec {operation} failed ({config}): {source}")]
    CodecFailure {
        operation: Operation,
        config: CompressionConfig,
        #[source]
        source: CodecError,
    },

    #[error("codec output is {len} bytes, shorter than the {}-byte codec prefix", CODEC_PREFIX_LEN)]
    MalformedCodecOutput { len: usize },

    #[error("patch is {len} bytes, shorter than the {}-byte patch header", HEADER_LEN)]
    TruncatedPatch { len: usize },

    #[error("patch is {size} bytes, exceeds the {max}-byte budget")]
    PatchTooBig { size: u64, max: u64 },

    #[error(
        "no configuration up to window_exp={max_window_exp} produced a patch smaller than the {target_size}-byte target"
    )]
    NoViableConfiguration { max_window_exp: u8, target_size: u64 },

    #[error("patch header records {found} but the patch was expected to use {expected}")]
    ConfigMismatch {
        found: CompressionConfig,
        expected: CompressionConfig,
    },

    #[error(
        "reconstructed image differs from the target at byte {offset} (expected {expected_len} bytes, reconstructed {actual_len} bytes)"
    )]
    IntegrityMismatch {
        offset: u64,
        expected_len: u64,
        actual_len: u64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Error {
    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this failure. 2 is left to clap usage errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io { .. } => 1,
            Self::CodecFailure { .. } => 3,
            Self::MalformedCodecOutput { .. } => 4,
            Self::PatchTooBig { .. } => 5,
            Self::NoViableConfiguration { .. } => 6,
            Self::ConfigMismatch { .. } => 7,
            Self::IntegrityMismatch { .. } => 8,
            Self::TruncatedPatch { .. } => 9,
            Self::InvalidConfig(_) => 10,
        }
    }
}
