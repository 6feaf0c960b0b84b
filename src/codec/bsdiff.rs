// bsdiff-style differencing with heatshrink-compressed records.
//
// Codec output layout:
//   [0..8)   magic "BSDIFFHS"
//   [8..16)  target size, offtout-encoded
//   [16..)   heatshrink stream of records
//
// Each decompressed record is three offtout integers
// (diff_len, extra_len, seek) followed by `diff_len` bytes that are
// added to the source and `extra_len` bytes copied verbatim. After the
// record the source cursor moves by `seek`. The applier runs records
// until the declared target size has been produced.
//
// The differ indexes every 8-byte block of the source, takes exact block
// matches as anchors and extends them forward across short mismatching
// runs, so relocated code with patched addresses still lands in the
// (highly compressible) diff section.

use super::heatshrink;
use super::{CodecError, DeltaCodec};
use crate::config::CompressionConfig;

pub const BSDIFF_MAGIC: &[u8; 8] = b"BSDIFFHS";

/// Magic plus target size.
pub const PREFIX_LEN: usize = 16;

const CONTROL_LEN: usize = 3 * 8;

/// Anchor block length and minimum exact match.
const BLOCK: usize = 8;

/// Consecutive mismatching bytes tolerated while extending a match.
const MAX_MISMATCH_RUN: usize = 8;

// ---------------------------------------------------------------------------
// Integer encoding (bsdiff sign-magnitude little-endian)
// ---------------------------------------------------------------------------

pub fn offtout(value: i64) -> [u8; 8] {
    let mut buf = value.unsigned_abs().to_le_bytes();
    if value < 0 {
        buf[7] |= 0x80;
    }
    buf
}

pub fn offtin(buf: [u8; 8]) -> i64 {
    let mut raw = buf;
    let negative = raw[7] & 0x80 != 0;
    raw[7] &= 0x7F;
    let magnitude = u64::from_le_bytes(raw) as i64;
    if negative { -magnitude } else { magnitude }
}

fn read_off(stream: &[u8], pos: usize) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&stream[pos..pos + 8]);
    offtin(buf)
}

// ---------------------------------------------------------------------------
// Codec prefix
// ---------------------------------------------------------------------------

/// The 16-byte prefix this codec writes in front of its stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BsdiffPrefix {
    pub target_size: u64,
}

impl BsdiffPrefix {
    pub fn encode(&self) -> [u8; PREFIX_LEN] {
        let mut out = [0u8; PREFIX_LEN];
        out[..8].copy_from_slice(BSDIFF_MAGIC);
        out[8..].copy_from_slice(&offtout(self.target_size as i64));
        out
    }

    /// Parse and validate a codec prefix.
    pub fn parse(prefix: &[u8]) -> Result<Self, CodecError> {
        if prefix.len() < PREFIX_LEN {
            return Err(CodecError::Corrupt(format!(
                "codec prefix is {} bytes, expected {PREFIX_LEN}",
                prefix.len()
            )));
        }
        if &prefix[..8] != BSDIFF_MAGIC {
            return Err(CodecError::BadMagic);
        }
        let size = read_off(prefix, 8);
        if size < 0 {
            return Err(CodecError::Corrupt(format!("negative target size {size}")));
        }
        Ok(Self {
            target_size: size as u64,
        })
    }
}

// ---------------------------------------------------------------------------
// Source index
// ---------------------------------------------------------------------------

/// Block hash table over the source. Stored value 0 means empty; earlier
/// source positions win collisions.
struct SourceIndex {
    table: Vec<u32>,
    mask: usize,
}

impl SourceIndex {
    fn new(source: &[u8]) -> Self {
        if source.len() < BLOCK {
            return Self {
                table: Vec::new(),
                mask: 0,
            };
        }
        let size = source.len().next_power_of_two().max(1 << 10);
        let mut table = vec![0u32; size];
        let mask = size - 1;
        for pos in (0..=source.len() - BLOCK).rev() {
            table[Self::bucket(&source[pos..pos + BLOCK], mask)] = pos as u32 + 1;
        }
        Self { table, mask }
    }

    #[inline]
    fn bucket(block: &[u8], mask: usize) -> usize {
        let mut word = [0u8; 8];
        word.copy_from_slice(&block[..BLOCK]);
        let h = u64::from_le_bytes(word).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        (h >> 32) as usize & mask
    }

    fn lookup(&self, block: &[u8]) -> Option<usize> {
        if self.table.is_empty() {
            return None;
        }
        match self.table[Self::bucket(block, self.mask)] {
            0 => None,
            v => Some(v as usize - 1),
        }
    }
}

// ---------------------------------------------------------------------------
// Differ
// ---------------------------------------------------------------------------

/// A target range encoded as additions against a source range.
#[derive(Debug, Clone, Copy)]
struct Segment {
    target_pos: usize,
    source_pos: usize,
    len: usize,
}

fn exact_len(source: &[u8], s: usize, target: &[u8], t: usize) -> usize {
    if s >= source.len() {
        return 0;
    }
    source[s..]
        .iter()
        .zip(&target[t..])
        .take_while(|(a, b)| a == b)
        .count()
}

/// Extend a match forward past isolated mismatches; ends on a matching byte.
fn fuzzy_len(source: &[u8], s: usize, target: &[u8], t: usize) -> usize {
    let mut last_match_end = 0;
    let mut run = 0;
    for (i, (a, b)) in source[s..].iter().zip(&target[t..]).enumerate() {
        if a == b {
            last_match_end = i + 1;
            run = 0;
        } else {
            run += 1;
            if run > MAX_MISMATCH_RUN {
                break;
            }
        }
    }
    last_match_end
}

fn find_segments(source: &[u8], target: &[u8]) -> Vec<Segment> {
    let index = SourceIndex::new(source);
    let mut segments = Vec::new();
    // Source offset that keeps the displacement of the previous segment.
    let mut expected: Option<usize> = None;
    let mut t = 0;

    while t + BLOCK <= target.len() {
        let anchor = expected
            .filter(|&s| exact_len(source, s, target, t) >= BLOCK)
            .or_else(|| {
                index
                    .lookup(&target[t..t + BLOCK])
                    .filter(|&s| exact_len(source, s, target, t) >= BLOCK)
            });

        match anchor {
            Some(s) => {
                let len = fuzzy_len(source, s, target, t);
                segments.push(Segment {
                    target_pos: t,
                    source_pos: s,
                    len,
                });
                t += len;
                expected = Some(s + len);
            }
            None => {
                t += 1;
                expected = expected.map(|s| s + 1);
            }
        }
    }

    segments
}

fn push_control(out: &mut Vec<u8>, diff_len: usize, extra_len: usize, seek: i64) {
    out.extend_from_slice(&offtout(diff_len as i64));
    out.extend_from_slice(&offtout(extra_len as i64));
    out.extend_from_slice(&offtout(seek));
}

/// Build the uncompressed record stream turning `source` into `target`.
pub fn encode_records(source: &[u8], target: &[u8]) -> Vec<u8> {
    if target.is_empty() {
        return Vec::new();
    }
    let segments = find_segments(source, target);
    let mut out = Vec::with_capacity(target.len() + CONTROL_LEN * (segments.len() + 1));

    let (first_t, first_s) = segments
        .first()
        .map_or((target.len(), 0), |seg| (seg.target_pos, seg.source_pos));
    if first_t > 0 || first_s > 0 {
        push_control(&mut out, 0, first_t, first_s as i64);
        out.extend_from_slice(&target[..first_t]);
    }

    for (i, seg) in segments.iter().enumerate() {
        let diff_end = seg.target_pos + seg.len;
        let next = segments.get(i + 1);
        let gap_end = next.map_or(target.len(), |n| n.target_pos);
        let seek = next.map_or(0, |n| n.source_pos as i64 - (seg.source_pos + seg.len) as i64);

        push_control(&mut out, seg.len, gap_end - diff_end, seek);
        out.extend(
            target[seg.target_pos..diff_end]
                .iter()
                .zip(&source[seg.source_pos..seg.source_pos + seg.len])
                .map(|(t, s)| t.wrapping_sub(*s)),
        );
        out.extend_from_slice(&target[diff_end..gap_end]);
    }

    out
}

/// Largest record stream that can describe a `target_size`-byte image.
///
/// Every record but the first carries at least one payload byte, so there
/// are at most `target_size + 1` control blocks.
pub fn max_records_len(target_size: usize) -> usize {
    target_size.saturating_add(CONTROL_LEN.saturating_mul(target_size.saturating_add(1)))
}

/// Run the record stream against `source` until `target_size` bytes exist.
pub fn apply_records(
    source: &[u8],
    records: &[u8],
    target_size: usize,
) -> Result<Vec<u8>, CodecError> {
    // The declared size is untrusted until the records back it up.
    let mut out = Vec::with_capacity(target_size.min(records.len().saturating_mul(8)));
    let mut old: i64 = 0;
    let mut p = 0usize;

    while out.len() < target_size {
        if p + CONTROL_LEN > records.len() {
            return Err(CodecError::Corrupt(format!(
                "record stream ends at {} of {target_size} target bytes",
                out.len()
            )));
        }
        let diff_len = read_off(records, p);
        let extra_len = read_off(records, p + 8);
        let seek = read_off(records, p + 16);
        p += CONTROL_LEN;

        if diff_len < 0 || extra_len < 0 {
            return Err(CodecError::Corrupt(format!(
                "negative record lengths ({diff_len}, {extra_len})"
            )));
        }
        let (diff_len, extra_len) = (diff_len as usize, extra_len as usize);
        let payload = diff_len
            .checked_add(extra_len)
            .ok_or_else(|| CodecError::Corrupt("record lengths overflow".into()))?;
        if payload > target_size - out.len() {
            return Err(CodecError::Corrupt("record overruns the target size".into()));
        }
        if payload > records.len() - p {
            return Err(CodecError::Corrupt("record payload is truncated".into()));
        }

        if diff_len > 0 {
            if old < 0 || diff_len > source.len() || old as usize > source.len() - diff_len {
                return Err(CodecError::Corrupt(format!(
                    "source range {old}+{diff_len} outside {}-byte source",
                    source.len()
                )));
            }
            let base = &source[old as usize..old as usize + diff_len];
            out.extend(
                records[p..p + diff_len]
                    .iter()
                    .zip(base)
                    .map(|(d, s)| d.wrapping_add(*s)),
            );
            p += diff_len;
            old += diff_len as i64;
        }

        out.extend_from_slice(&records[p..p + extra_len]);
        p += extra_len;

        old = old
            .checked_add(seek)
            .ok_or_else(|| CodecError::Corrupt(format!("seek {seek} overflows")))?;
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// DeltaCodec implementation
// ---------------------------------------------------------------------------

/// bsdiff records compressed with heatshrink, the format the device applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct BsdiffHeatshrink;

impl DeltaCodec for BsdiffHeatshrink {
    fn diff(
        &self,
        source: &[u8],
        target: &[u8],
        config: CompressionConfig,
    ) -> Result<Vec<u8>, CodecError> {
        heatshrink::check_params(config.window_exp, config.lookahead_exp)?;
        let records = encode_records(source, target);
        let body = heatshrink::compress(&records, config.window_exp, config.lookahead_exp)?;

        let prefix = BsdiffPrefix {
            target_size: target.len() as u64,
        };
        let mut out = Vec::with_capacity(PREFIX_LEN + body.len());
        out.extend_from_slice(&prefix.encode());
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn apply(
        &self,
        source: &[u8],
        payload: &[u8],
        config: CompressionConfig,
    ) -> Result<Vec<u8>, CodecError> {
        let prefix = BsdiffPrefix::parse(payload)?;
        let target_size = usize::try_from(prefix.target_size).map_err(|_| {
            CodecError::Corrupt(format!("target size {} too large", prefix.target_size))
        })?;
        let records = heatshrink::decompress_bounded(
            &payload[PREFIX_LEN..],
            config.window_exp,
            config.lookahead_exp,
            max_records_len(target_size),
        )?;
        apply_records(source, &records, target_size)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
