// Delta codec seam.
//
// The search engine, builder and verifier only ever talk to a codec
// through `DeltaCodec`. The bundled implementation is bsdiff-style
// differencing followed by heatshrink (LZSS) compression, which is what
// the device-side applier understands:
//
// - `heatshrink`: bit-level LZSS encoder/decoder parameterised by
//   window/lookahead exponents
// - `bsdiff`: control/diff/extra record differ and patcher, plus the
//   16-byte `BSDIFFHS` codec prefix

pub mod bsdiff;
pub mod heatshrink;

pub use bsdiff::{BSDIFF_MAGIC, BsdiffHeatshrink, BsdiffPrefix};

use crate::config::CompressionConfig;

/// Errors reported by a delta codec. Callers do not distinguish between
/// them beyond "the codec failed"; the variants exist for diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unsupported parameters window_sz2={window_exp} lookahead_sz2={lookahead_exp}")]
    InvalidParameters { window_exp: u8, lookahead_exp: u8 },

    #[error("bad codec magic (expected {:?})", String::from_utf8_lossy(BSDIFF_MAGIC))]
    BadMagic,

    #[error("corrupt patch: {0}")]
    Corrupt(String),

    #[error(transparent)]
    External(Box<dyn std::error::Error + Send + Sync>),
}

/// A binary delta codec parameterised by a [`CompressionConfig`].
///
/// `diff` returns the codec's complete output: a 16-byte codec prefix
/// followed by the diff stream. `apply` consumes exactly that payload.
/// Both must be deterministic and free of side effects so that search
/// trials can run concurrently.
///
/// # Implementing a custom codec
///
/// ```no_run
/// use fwpatch::codec::{CodecError, DeltaCodec};
/// use fwpatch::config::CompressionConfig;
///
/// struct Store;
///
/// impl DeltaCodec for Store {
///     fn diff(&self, _source: &[u8], target: &[u8], _config: CompressionConfig)
///         -> Result<Vec<u8>, CodecError> {
///         let mut out = vec![0u8; 16];
///         out.extend_from_slice(target);
///         Ok(out)
///     }
///     fn apply(&self, _source: &[u8], payload: &[u8], _config: CompressionConfig)
///         -> Result<Vec<u8>, CodecError> {
///         Ok(payload[16..].to_vec())
///     }
/// }
/// ```
pub trait DeltaCodec: Send + Sync {
    /// Produce the codec output turning `source` into `target`.
    fn diff(
        &self,
        source: &[u8],
        target: &[u8],
        config: CompressionConfig,
    ) -> Result<Vec<u8>, CodecError>;

    /// Reconstruct the target from `source` and a payload produced by `diff`.
    fn apply(
        &self,
        source: &[u8],
        payload: &[u8],
        config: CompressionConfig,
    ) -> Result<Vec<u8>, CodecError>;
}
