// Patch header: the codec prefix with the heatshrink configuration spliced in.
//
// On-disk layout consumed by the device-side applier:
//   [0..16)  codec prefix (magic + target size), passed through unchanged
//   [16]     window_exp
//   [17]     lookahead_exp
//   [18..)   codec diff stream, unchanged

use crate::config::CompressionConfig;
use crate::error::{Error, Result};

/// Length of the opaque codec prefix.
pub const CODEC_PREFIX_LEN: usize = 16;

/// Length of the full patch header (prefix + two configuration bytes).
pub const HEADER_LEN: usize = CODEC_PREFIX_LEN + 2;

const WINDOW_OFFSET: usize = CODEC_PREFIX_LEN;
const LOOKAHEAD_OFFSET: usize = CODEC_PREFIX_LEN + 1;

// ---------------------------------------------------------------------------
// PatchArtifact
// ---------------------------------------------------------------------------

/// A complete patch file: header followed by the diff stream.
///
/// Always at least [`HEADER_LEN`] bytes long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchArtifact {
    bytes: Vec<u8>,
}

impl PatchArtifact {
    /// Wrap bytes read back from storage.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::TruncatedPatch { len: bytes.len() });
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Total size in bytes, header included.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The opaque codec prefix (always [`CODEC_PREFIX_LEN`] bytes).
    pub fn prefix(&self) -> &[u8] {
        &self.bytes[..CODEC_PREFIX_LEN]
    }

    pub fn config(&self) -> CompressionConfig {
        CompressionConfig::new(self.bytes[WINDOW_OFFSET], self.bytes[LOOKAHEAD_OFFSET])
    }

    pub fn diff_stream(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..]
    }

    /// The codec output this artifact was built from (prefix + stream),
    /// i.e. what `DeltaCodec::apply` expects.
    pub fn codec_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.bytes.len() - 2);
        payload.extend_from_slice(self.prefix());
        payload.extend_from_slice(self.diff_stream());
        payload
    }
}

// ---------------------------------------------------------------------------
// inject / extract
// ---------------------------------------------------------------------------

/// Borrowed view of a patch split into its three parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractedPatch<'a> {
    pub prefix: &'a [u8; CODEC_PREFIX_LEN],
    pub config: CompressionConfig,
    pub diff_stream: &'a [u8],
}

impl ExtractedPatch<'_> {
    /// Reassemble the codec payload (prefix + stream).
    pub fn codec_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(CODEC_PREFIX_LEN + self.diff_stream.len());
        payload.extend_from_slice(self.prefix);
        payload.extend_from_slice(self.diff_stream);
        payload
    }
}

/// Splice `config` into raw codec output after its 16-byte prefix.
pub fn inject(raw_codec_output: &[u8], config: CompressionConfig) -> Result<PatchArtifact> {
    if raw_codec_output.len() < CODEC_PREFIX_LEN {
        return Err(Error::MalformedCodecOutput {
            len: raw_codec_output.len(),
        });
    }
    let (prefix, stream) = raw_codec_output.split_at(CODEC_PREFIX_LEN);

    let mut bytes = Vec::with_capacity(raw_codec_output.len() + 2);
    bytes.extend_from_slice(prefix);
    bytes.push(config.window_exp);
    bytes.push(config.lookahead_exp);
    bytes.extend_from_slice(stream);
    Ok(PatchArtifact { bytes })
}

/// Split a patch into prefix, recorded configuration and diff stream.
pub fn extract(artifact: &[u8]) -> Result<ExtractedPatch<'_>> {
    if artifact.len() < HEADER_LEN {
        return Err(Error::TruncatedPatch {
            len: artifact.len(),
        });
    }
    let (prefix, rest) = artifact.split_at(CODEC_PREFIX_LEN);
    let prefix: &[u8; CODEC_PREFIX_LEN] = prefix
        .try_into()
        .map_err(|_| Error::TruncatedPatch { len: artifact.len() })?;
    Ok(ExtractedPatch {
        prefix,
        config: CompressionConfig::new(rest[0], rest[1]),
        diff_stream: &rest[2..],
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
