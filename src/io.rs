// File-level pipeline used by the CLI.
//
// `search_files()` benchmarks two images on disk, `build_and_verify_files()`
// produces, checks and then persists a patch, `apply_file()` reconstructs a
// target from a patch using the configuration in its header. Images are
// read fully into memory and released when each call returns.

use std::path::Path;

use log::info;

use crate::builder;
use crate::codec::DeltaCodec;
use crate::config::CompressionConfig;
use crate::error::{Error, Result};
use crate::header::PatchArtifact;
use crate::image::FirmwareImage;
use crate::report::Reporter;
use crate::search::{self, BenchmarkResult, SearchOptions, SearchOutcome};
use crate::verify;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `build_and_verify_files()`.
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub config: CompressionConfig,
    /// Source image size in bytes.
    pub source_size: u64,
    /// Target image size in bytes.
    pub target_size: u64,
    /// Final patch size in bytes, header included.
    pub patch_size: u64,
    /// Patch size as a percentage of the target.
    pub ratio_percent: f64,
    /// SHA-256 of the target image (if `file-io` feature is enabled).
    pub target_sha256: Option<[u8; 32]>,
    /// SHA-256 of the reconstructed image (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `apply_file()`.
#[derive(Debug, Clone)]
pub struct ApplyStats {
    pub config: CompressionConfig,
    pub source_size: u64,
    pub patch_size: u64,
    pub output_size: u64,
    /// SHA-256 of the reconstructed image (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

#[cfg(feature = "file-io")]
fn digest(image: &FirmwareImage) -> Option<[u8; 32]> {
    Some(image.sha256())
}

#[cfg(not(feature = "file-io"))]
fn digest(_image: &FirmwareImage) -> Option<[u8; 32]> {
    None
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Load both images and run the configuration search on them.
pub fn search_files<C: DeltaCodec + ?Sized>(
    codec: &C,
    source_path: &Path,
    target_path: &Path,
    options: &SearchOptions,
    reporter: &mut dyn Reporter,
) -> Result<Option<SearchOutcome>> {
    let source = FirmwareImage::load(source_path)?;
    let target = FirmwareImage::load(target_path)?;
    info!(
        "search: source '{}' ({} bytes), target '{}' ({} bytes)",
        source_path.display(),
        source.len(),
        target_path.display(),
        target.len()
    );
    search::search(codec, source.as_bytes(), target.as_bytes(), options, reporter)
}

/// Build a patch, reconstruct into `new_file` and check it against the
/// target on disk. The patch is written to `patch_path` only once that
/// check passes.
pub fn build_and_verify_files<C: DeltaCodec + ?Sized>(
    codec: &C,
    source_path: &Path,
    target_path: &Path,
    patch_path: &Path,
    new_file: &Path,
    config: CompressionConfig,
    max_patch_size: u64,
) -> Result<PipelineStats> {
    info!(
        "build: source '{}', target '{}', {config}, budget {max_patch_size} bytes",
        source_path.display(),
        target_path.display()
    );
    let source = FirmwareImage::load(source_path)?;
    let target = FirmwareImage::load(target_path)?;

    let artifact = builder::build(
        codec,
        source.as_bytes(),
        target.as_bytes(),
        config,
        max_patch_size,
    )?;
    let reconstructed = verify::verify_to_file(
        codec,
        source.as_bytes(),
        artifact.as_bytes(),
        config,
        new_file,
        target_path,
    )?;
    // Only a verified patch reaches `patch_path`.
    builder::write_atomic(patch_path, artifact.as_bytes())?;
    let output = FirmwareImage::from_bytes(reconstructed);

    let patch_size = artifact.len() as u64;
    info!(
        "patch '{}' generated ok (size = {patch_size})",
        patch_path.display()
    );
    Ok(PipelineStats {
        config,
        source_size: source.len() as u64,
        target_size: target.len() as u64,
        patch_size,
        ratio_percent: BenchmarkResult::measure(config, patch_size, target.len() as u64)
            .ratio_percent,
        target_sha256: digest(&target),
        output_sha256: digest(&output),
    })
}

/// Reconstruct a target from `source_path` and `patch_path` into
/// `output_path`, using the configuration recorded in the patch header.
pub fn apply_file<C: DeltaCodec + ?Sized>(
    codec: &C,
    source_path: &Path,
    patch_path: &Path,
    output_path: &Path,
) -> Result<ApplyStats> {
    let source = FirmwareImage::load(source_path)?;
    let bytes = std::fs::read(patch_path).map_err(|e| Error::io(patch_path, e))?;
    let artifact = PatchArtifact::from_bytes(bytes)?;
    let config = artifact.config();

    let output = verify::reconstruct(codec, source.as_bytes(), artifact.as_bytes(), None)?;
    builder::write_atomic(output_path, &output)?;
    let output = FirmwareImage::from_bytes(output);
    info!(
        "applied '{}' ({config}): {} bytes written to '{}'",
        patch_path.display(),
        output.len(),
        output_path.display()
    );
    Ok(ApplyStats {
        config,
        source_size: source.len() as u64,
        patch_size: artifact.len() as u64,
        output_size: output.len() as u64,
        output_sha256: digest(&output),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
