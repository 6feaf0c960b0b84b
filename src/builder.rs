// Patch construction: codec diff, header injection, size budget.

use std::io::Write;
use std::path::Path;

use log::{info, warn};
use tempfile::NamedTempFile;

use crate::codec::DeltaCodec;
use crate::config::CompressionConfig;
use crate::error::{Error, Operation, Result};
use crate::header::{self, PatchArtifact};

/// Build a patch for `config` and enforce `max_patch_size` on its final size.
///
/// The budget is inclusive: a patch of exactly `max_patch_size` bytes is
/// accepted.
pub fn build<C: DeltaCodec + ?Sized>(
    codec: &C,
    source: &[u8],
    target: &[u8],
    config: CompressionConfig,
    max_patch_size: u64,
) -> Result<PatchArtifact> {
    config.validate()?;

    let raw = codec
        .diff(source, target, config)
        .map_err(|source| Error::CodecFailure {
            operation: Operation::Diff,
            config,
            source,
        })?;
    let artifact = header::inject(&raw, config)?;

    let size = artifact.len() as u64;
    if size > max_patch_size {
        warn!("patch for {config} is {size} bytes, budget is {max_patch_size}");
        return Err(Error::PatchTooBig {
            size,
            max: max_patch_size,
        });
    }
    info!("built patch for {config}: {size} bytes");
    Ok(artifact)
}

/// [`build`], then persist the artifact at `path`.
///
/// Nothing is left at `path` when any step fails.
pub fn build_to_file<C: DeltaCodec + ?Sized>(
    codec: &C,
    source: &[u8],
    target: &[u8],
    config: CompressionConfig,
    max_patch_size: u64,
    path: &Path,
) -> Result<PatchArtifact> {
    let artifact = build(codec, source, target, config, max_patch_size)?;
    write_atomic(path, artifact.as_bytes())?;
    Ok(artifact)
}

/// Write `bytes` to a temporary file next to `path` and rename it into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::io(dir, e))?;
    tmp.write_all(bytes).map_err(|e| Error::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
