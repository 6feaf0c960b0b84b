// Patch verification: reconstruct the target from the artifact and
// compare it with the expected image.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use log::{error, info};

use crate::builder::write_atomic;
use crate::codec::DeltaCodec;
use crate::config::CompressionConfig;
use crate::error::{Error, Operation, Result};
use crate::header;

/// Comparison granularity.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// A successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    /// The reconstructed image, byte-identical to the expected target.
    pub reconstructed: Vec<u8>,
    pub config: CompressionConfig,
}

/// Apply `artifact` to `source` with `config` and check the result equals
/// `expected`.
///
/// The configuration recorded in the artifact header must match `config`.
pub fn verify<C: DeltaCodec + ?Sized>(
    codec: &C,
    source: &[u8],
    expected: &[u8],
    artifact: &[u8],
    config: CompressionConfig,
) -> Result<Verified> {
    let reconstructed = reconstruct(codec, source, artifact, Some(config))?;
    compare_slices(expected, &reconstructed)?;
    info!("patch verified: {} bytes reconstructed", reconstructed.len());
    Ok(Verified {
        reconstructed,
        config,
    })
}

/// Rebuild the target from `source` and `artifact`.
///
/// With `expected_config` set, the header's configuration must match it;
/// otherwise the header's configuration is used as is.
pub fn reconstruct<C: DeltaCodec + ?Sized>(
    codec: &C,
    source: &[u8],
    artifact: &[u8],
    expected_config: Option<CompressionConfig>,
) -> Result<Vec<u8>> {
    let parts = header::extract(artifact)?;
    let config = match expected_config {
        Some(expected) if expected != parts.config => {
            error!(
                "patch header records {}, caller supplied {expected}",
                parts.config
            );
            return Err(Error::ConfigMismatch {
                found: parts.config,
                expected,
            });
        }
        Some(expected) => expected,
        None => parts.config,
    };
    codec
        .apply(source, &parts.codec_payload(), config)
        .map_err(|source| Error::CodecFailure {
            operation: Operation::Apply,
            config,
            source,
        })
}

fn mismatch(offset: u64, expected_len: u64, actual_len: u64) -> Error {
    error!("reconstruction differs from target at byte {offset}");
    Error::IntegrityMismatch {
        offset,
        expected_len,
        actual_len,
    }
}

/// Chunked equality check; the error carries the first differing offset.
fn compare_slices(expected: &[u8], actual: &[u8]) -> Result<()> {
    let (elen, alen) = (expected.len() as u64, actual.len() as u64);
    for (i, (e, a)) in expected
        .chunks(CHUNK_SIZE)
        .zip(actual.chunks(CHUNK_SIZE))
        .enumerate()
    {
        if e != a {
            let within = e
                .iter()
                .zip(a)
                .position(|(x, y)| x != y)
                .unwrap_or(e.len().min(a.len()));
            return Err(mismatch((i * CHUNK_SIZE + within) as u64, elen, alen));
        }
    }
    if elen != alen {
        return Err(mismatch(elen.min(alen), elen, alen));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Fill `buf` as far as the reader allows; returns the number of bytes read.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Compare two readers chunk by chunk.
///
/// Returns `Ok(None)` when both streams are identical, otherwise the
/// offset of the first difference (a length difference counts as one at
/// the end of the shorter stream).
pub fn compare_streams<A: Read, B: Read>(mut a: A, mut b: B) -> std::io::Result<Option<u64>> {
    let mut buf_a = vec![0u8; CHUNK_SIZE];
    let mut buf_b = vec![0u8; CHUNK_SIZE];
    let mut offset = 0u64;
    loop {
        let na = fill(&mut a, &mut buf_a)?;
        let nb = fill(&mut b, &mut buf_b)?;
        let common = na.min(nb);
        if let Some(i) = buf_a[..common]
            .iter()
            .zip(&buf_b[..common])
            .position(|(x, y)| x != y)
        {
            return Ok(Some(offset + i as u64));
        }
        if na != nb {
            return Ok(Some(offset + common as u64));
        }
        if na == 0 {
            return Ok(None);
        }
        offset += na as u64;
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Reconstruct into `new_file` and compare it with `expected_path` on disk.
pub fn verify_to_file<C: DeltaCodec + ?Sized>(
    codec: &C,
    source: &[u8],
    artifact: &[u8],
    config: CompressionConfig,
    new_file: &Path,
    expected_path: &Path,
) -> Result<Vec<u8>> {
    let reconstructed = reconstruct(codec, source, artifact, Some(config))?;
    write_atomic(new_file, &reconstructed)?;

    let open = |p: &Path| File::open(p).map(BufReader::new).map_err(|e| Error::io(p, e));
    let expected_len = std::fs::metadata(expected_path)
        .map_err(|e| Error::io(expected_path, e))?
        .len();
    let diff = compare_streams(open(expected_path)?, open(new_file)?)
        .map_err(|e| Error::io(new_file, e))?;
    if let Some(offset) = diff {
        return Err(mismatch(offset, expected_len, reconstructed.len() as u64));
    }
    info!(
        "'{}' matches '{}'",
        new_file.display(),
        expected_path.display()
    );
    Ok(reconstructed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::codec::{BsdiffHeatshrink, CodecError};

    fn images() -> (Vec<u8>, Vec<u8>) {
        let source: Vec<u8> = (0..20_000u32).map(|i| (i ^ (i >> 3)) as u8).collect();
        let mut target = source[..15_000].to_vec();
        target[4000..4010].copy_from_slice(b"0123456789");
        target.extend((0..500u32).map(|i| (i * 13) as u8));
        (source, target)
    }

    #[test]
    fn built_patch_verifies() {
        let (source, target) = images();
        let cfg = CompressionConfig::new(11, 5);
        let artifact = build(&BsdiffHeatshrink, &source, &target, cfg, u64::MAX).unwrap();
        let verified =
            verify(&BsdiffHeatshrink, &source, &target, artifact.as_bytes(), cfg).unwrap();
        assert_eq!(verified.reconstructed, target);
    }

    #[test]
    fn caller_config_must_match_header() {
        let (source, target) = images();
        let cfg = CompressionConfig::new(8, 4);
        let artifact = build(&BsdiffHeatshrink, &source, &target, cfg, u64::MAX).unwrap();
        let other = CompressionConfig::new(9, 4);
        let err =
            verify(&BsdiffHeatshrink, &source, &target, artifact.as_bytes(), other).unwrap_err();
        assert!(matches!(
            err,
            Error::ConfigMismatch { found, expected } if found == cfg && expected == other
        ));
    }

    #[test]
    fn wrong_expected_target_is_an_integrity_mismatch() {
        let (source, target) = images();
        let cfg = CompressionConfig::new(10, 4);
        let artifact = build(&BsdiffHeatshrink, &source, &target, cfg, u64::MAX).unwrap();
        let mut other = target.clone();
        other[7777] ^= 1;
        let err = verify(&BsdiffHeatshrink, &source, &other, artifact.as_bytes(), cfg).unwrap_err();
        assert!(matches!(err, Error::IntegrityMismatch { offset: 7777, .. }));
    }

    #[test]
    fn short_artifact_is_truncated() {
        let cfg = CompressionConfig::new(8, 4);
        let err = verify(&BsdiffHeatshrink, b"", b"", &[0; 5], cfg).unwrap_err();
        assert!(matches!(err, Error::TruncatedPatch { len: 5 }));
    }

    #[test]
    fn tampered_stream_fails() {
        let (source, target) = images();
        let cfg = CompressionConfig::new(12, 4);
        let mut bytes = build(&BsdiffHeatshrink, &source, &target, cfg, u64::MAX)
            .unwrap()
            .into_bytes();
        let last = bytes.len() - 1;
        bytes[last / 2] ^= 0x5A;
        bytes[last] ^= 0xFF;
        let err = verify(&BsdiffHeatshrink, &source, &target, &bytes, cfg).unwrap_err();
        assert!(matches!(
            err,
            Error::CodecFailure {
                operation: Operation::Apply,
                ..
            } | Error::IntegrityMismatch { .. }
        ));
    }

    #[test]
    fn apply_failure_names_operation() {
        type CodecResult = std::result::Result<Vec<u8>, CodecError>;
        struct Refuse;
        impl DeltaCodec for Refuse {
            fn diff(&self, _: &[u8], _: &[u8], _: CompressionConfig) -> CodecResult {
                Ok(vec![0; 16])
            }
            fn apply(&self, _: &[u8], _: &[u8], _: CompressionConfig) -> CodecResult {
                Err(CodecError::Corrupt("refused".into()))
            }
        }
        let cfg = CompressionConfig::new(6, 3);
        let artifact = build(&Refuse, b"", b"x", cfg, 100).unwrap();
        let err = verify(&Refuse, b"", b"x", artifact.as_bytes(), cfg).unwrap_err();
        assert!(err.to_string().contains("apply"));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn slices_differing_only_in_length() {
        let err = compare_slices(b"abc", b"abcd").unwrap_err();
        assert!(matches!(
            err,
            Error::IntegrityMismatch {
                offset: 3,
                expected_len: 3,
                actual_len: 4
            }
        ));
        assert!(compare_slices(b"", b"").is_ok());
    }

    #[test]
    fn streams_across_chunk_boundaries() {
        let a = vec![7u8; CHUNK_SIZE * 2 + 10];
        let mut b = a.clone();
        assert_eq!(compare_streams(&a[..], &b[..]).unwrap(), None);
        b[CHUNK_SIZE + 3] = 0;
        assert_eq!(
            compare_streams(&a[..], &b[..]).unwrap(),
            Some(CHUNK_SIZE as u64 + 3)
        );
        assert_eq!(
            compare_streams(&a[..], &a[..CHUNK_SIZE]).unwrap(),
            Some(CHUNK_SIZE as u64)
        );
    }

    #[test]
    fn verify_writes_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let (source, target) = images();
        let expected_path = dir.path().join("target.bin");
        let new_file = dir.path().join("new.bin");
        std::fs::write(&expected_path, &target).unwrap();
        let cfg = CompressionConfig::new(9, 5);
        let artifact = build(&BsdiffHeatshrink, &source, &target, cfg, u64::MAX).unwrap();
        verify_to_file(
            &BsdiffHeatshrink,
            &source,
            artifact.as_bytes(),
            cfg,
            &new_file,
            &expected_path,
        )
        .unwrap();
        assert_eq!(std::fs::read(&new_file).unwrap(), target);
    }
}
