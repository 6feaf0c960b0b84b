//! fwpatch: size-optimal firmware delta patches for constrained devices.
//!
//! A patch is a bsdiff record stream compressed with heatshrink (LZSS).
//! The heatshrink window and lookahead exponents are recorded in the patch
//! header so the device-side applier can configure its decompressor.
//!
//! The crate provides:
//! - A configuration search over every (window, lookahead) pair (`search`)
//! - Patch construction with a size budget (`builder`)
//! - Round-trip verification of a built patch (`verify`)
//! - The header layout shared with the device (`header`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use fwpatch::codec::BsdiffHeatshrink;
//! use fwpatch::report::NullReporter;
//! use fwpatch::search::{self, SearchOptions};
//! use fwpatch::{builder, verify};
//!
//! let source = std::fs::read("fw_v1.bin").unwrap();
//! let target = std::fs::read("fw_v2.bin").unwrap();
//!
//! let outcome = search::search(
//!     &BsdiffHeatshrink,
//!     &source,
//!     &target,
//!     &SearchOptions::default(),
//!     &mut NullReporter,
//! )
//! .unwrap()
//! .expect("no configuration beats shipping the full image");
//!
//! let config = outcome.best.config;
//! let patch = builder::build(&BsdiffHeatshrink, &source, &target, config, 256 * 1024).unwrap();
//! verify::verify(&BsdiffHeatshrink, &source, &target, patch.as_bytes(), config).unwrap();
//! ```

pub mod builder;
pub mod codec;
pub mod config;
pub mod error;
pub mod header;
pub mod image;
pub mod io;
pub mod report;
pub mod search;
pub mod verify;

#[cfg(feature = "cli")]
pub mod cli;

pub use codec::{BsdiffHeatshrink, CodecError, DeltaCodec};
pub use config::CompressionConfig;
pub use error::{Error, Result};
pub use header::PatchArtifact;
