// Heatshrink-compatible LZSS compression.
//
// Bit stream (MSB first, last byte zero-padded):
//   literal:  1 | byte (8 bits)
//   backref:  0 | distance - 1 (window_sz2 bits) | length - 1 (lookahead_sz2 bits)
//
// A back-reference may overlap the bytes it produces. The decoder stops
// as soon as the remaining bits cannot hold a complete symbol, which is
// what makes the zero padding unambiguous: the shortest backref is
// 1 + 4 + 3 = 8 bits and the padding is at most 7.
//
// Matches are found with 2-byte hash chains over the plaintext, bounded
// by the window distance and a fixed chain depth.

use super::CodecError;

pub const MIN_WINDOW_BITS: u8 = 4;
pub const MAX_WINDOW_BITS: u8 = 15;
pub const MIN_LOOKAHEAD_BITS: u8 = 3;

/// Maximum number of chain links to follow per position.
const MAX_CHAIN: usize = 128;

const HEAD_SIZE: usize = 1 << 16;

/// Reject parameters the device decoder cannot be built with.
pub fn check_params(window_bits: u8, lookahead_bits: u8) -> Result<(), CodecError> {
    let ok = (MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&window_bits)
        && lookahead_bits >= MIN_LOOKAHEAD_BITS
        && lookahead_bits < window_bits;
    if ok {
        Ok(())
    } else {
        Err(CodecError::InvalidParameters {
            window_exp: window_bits,
            lookahead_exp: lookahead_bits,
        })
    }
}

// ---------------------------------------------------------------------------
// Bit I/O
// ---------------------------------------------------------------------------

struct BitWriter {
    out: Vec<u8>,
    current: u8,
    used: u8,
}

impl BitWriter {
    fn with_capacity(cap: usize) -> Self {
        Self {
            out: Vec::with_capacity(cap),
            current: 0,
            used: 0,
        }
    }

    #[inline]
    fn push(&mut self, value: u32, count: u8) {
        for shift in (0..count).rev() {
            let bit = ((value >> shift) & 1) as u8;
            self.current = (self.current << 1) | bit;
            self.used += 1;
            if self.used == 8 {
                self.out.push(self.current);
                self.current = 0;
                self.used = 0;
            }
        }
    }

    fn finish(mut self) -> Vec<u8> {
        if self.used > 0 {
            self.out.push(self.current << (8 - self.used));
        }
        self.out
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_pos: 0 }
    }

    /// Read `count` bits, or `None` when fewer remain.
    #[inline]
    fn read(&mut self, count: u8) -> Option<u32> {
        let count = count as usize;
        if self.bit_pos + count > self.data.len() * 8 {
            return None;
        }
        let mut value = 0u32;
        for _ in 0..count {
            let byte = self.data[self.bit_pos / 8];
            let bit = (byte >> (7 - (self.bit_pos % 8))) & 1;
            value = (value << 1) | bit as u32;
            self.bit_pos += 1;
        }
        Some(value)
    }
}

// ---------------------------------------------------------------------------
// Match finder
// ---------------------------------------------------------------------------

/// Hash chains keyed by the next two bytes. Stored value 0 means empty.
struct MatchFinder {
    head: Vec<u32>,
    prev: Vec<u32>,
}

impl MatchFinder {
    fn new(len: usize) -> Self {
        Self {
            head: vec![0; HEAD_SIZE],
            prev: vec![0; len],
        }
    }

    #[inline]
    fn key(data: &[u8], pos: usize) -> usize {
        ((data[pos] as usize) << 8) | data[pos + 1] as usize
    }

    #[inline]
    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + 2 > data.len() {
            return;
        }
        let key = Self::key(data, pos);
        self.prev[pos] = self.head[key];
        self.head[key] = pos as u32 + 1;
    }

    /// Longest `(distance, length)` match for `pos` within `window` bytes back.
    fn longest(&self, data: &[u8], pos: usize, window: usize, max_len: usize) -> (usize, usize) {
        if pos + 2 > data.len() {
            return (0, 0);
        }
        let limit = max_len.min(data.len() - pos);
        let mut best = (0, 0);
        let mut link = self.head[Self::key(data, pos)];
        let mut depth = 0;

        while link != 0 && depth < MAX_CHAIN {
            let cand = link as usize - 1;
            let distance = pos - cand;
            if distance > window {
                break;
            }
            let len = data[cand..]
                .iter()
                .zip(&data[pos..pos + limit])
                .take_while(|(a, b)| a == b)
                .count();
            if len > best.1 {
                best = (distance, len);
                if len == limit {
                    break;
                }
            }
            link = self.prev[cand];
            depth += 1;
        }
        best
    }
}

// ---------------------------------------------------------------------------
// Encoder / decoder
// ---------------------------------------------------------------------------

/// Compress `data` with a `2^window_bits` window and `2^lookahead_bits` lookahead.
pub fn compress(data: &[u8], window_bits: u8, lookahead_bits: u8) -> Result<Vec<u8>, CodecError> {
    check_params(window_bits, lookahead_bits)?;

    let window = 1usize << window_bits;
    let max_len = 1usize << lookahead_bits;
    let backref_bits = 1 + window_bits as usize + lookahead_bits as usize;
    // Shortest match that costs fewer bits than the literals it replaces.
    let min_len = backref_bits / 9 + 1;

    let mut finder = MatchFinder::new(data.len());
    let mut writer = BitWriter::with_capacity(data.len() / 2 + 8);
    let mut pos = 0;

    while pos < data.len() {
        let (distance, len) = finder.longest(data, pos, window, max_len);
        if len >= min_len {
            writer.push(0, 1);
            writer.push((distance - 1) as u32, window_bits);
            writer.push((len - 1) as u32, lookahead_bits);
            for p in pos..pos + len {
                finder.insert(data, p);
            }
            pos += len;
        } else {
            writer.push(1, 1);
            writer.push(data[pos] as u32, 8);
            finder.insert(data, pos);
            pos += 1;
        }
    }

    Ok(writer.finish())
}

/// Inverse of [`compress`] for the same parameters.
pub fn decompress(data: &[u8], window_bits: u8, lookahead_bits: u8) -> Result<Vec<u8>, CodecError> {
    decompress_bounded(data, window_bits, lookahead_bits, usize::MAX)
}

/// [`decompress`], failing as soon as the output would exceed `limit` bytes.
pub fn decompress_bounded(
    data: &[u8],
    window_bits: u8,
    lookahead_bits: u8,
    limit: usize,
) -> Result<Vec<u8>, CodecError> {
    check_params(window_bits, lookahead_bits)?;

    let mut reader = BitReader::new(data);
    let mut out = Vec::with_capacity(data.len().saturating_mul(2).min(limit));
    let over_limit = || CodecError::Corrupt(format!("stream expands past {limit} bytes"));

    while let Some(flag) = reader.read(1) {
        if flag == 1 {
            let Some(byte) = reader.read(8) else { break };
            if out.len() >= limit {
                return Err(over_limit());
            }
            out.push(byte as u8);
            continue;
        }
        let Some(index) = reader.read(window_bits) else {
            break;
        };
        let Some(count) = reader.read(lookahead_bits) else {
            break;
        };
        let distance = index as usize + 1;
        if distance > out.len() {
            return Err(CodecError::Corrupt(format!(
                "back-reference distance {distance} before start of output ({} bytes)",
                out.len()
            )));
        }
        if count as usize >= limit - out.len() {
            return Err(over_limit());
        }
        let start = out.len() - distance;
        for i in 0..=count as usize {
            let byte = out[start + i];
            out.push(byte);
        }
    }

    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(data: &[u8], w: u8, l: u8) -> Vec<u8> {
        let packed = compress(data, w, l).expect("compress failed");
        let unpacked = decompress(&packed, w, l).expect("decompress failed");
        assert_eq!(unpacked, data, "roundtrip mismatch (w={w}, l={l})");
        packed
    }

    #[test]
    fn empty_input() {
        assert!(roundtrip(b"", 8, 4).is_empty());
    }

    #[test]
    fn single_literal_is_nine_bits() {
        let packed = roundtrip(b"A", 8, 4);
        // 1 + 0x41 => 1_0100_0001, padded to two bytes.
        assert_eq!(packed, vec![0b1010_0000, 0b1000_0000]);
    }

    #[test]
    fn runs_compress_with_overlapping_backrefs() {
        let data = vec![0u8; 1000];
        let packed = roundtrip(&data, 4, 3);
        assert!(packed.len() < 150, "packed {} bytes", packed.len());
        let packed = roundtrip(&data, 12, 8);
        assert!(packed.len() < 20, "packed {} bytes", packed.len());
    }

    #[test]
    fn all_parameter_pairs_roundtrip() {
        let data: Vec<u8> = b"The quick brown fox jumps over the lazy dog. "
            .iter()
            .cycle()
            .take(3000)
            .copied()
            .chain((0..=255u8).cycle().take(700))
            .collect();
        for w in MIN_WINDOW_BITS..=MAX_WINDOW_BITS {
            for l in MIN_LOOKAHEAD_BITS..w {
                roundtrip(&data, w, l);
            }
        }
    }

    #[test]
    fn incompressible_data_expands_by_one_ninth() {
        let mut s = 0x1234_5678u32;
        let data: Vec<u8> = (0..4096)
            .map(|_| {
                s ^= s << 13;
                s ^= s >> 17;
                s ^= s << 5;
                s as u8
            })
            .collect();
        let packed = roundtrip(&data, 8, 4);
        assert!(packed.len() <= data.len() * 9 / 8 + 1);
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(compress(b"x", 3, 2).is_err());
        assert!(compress(b"x", 16, 4).is_err());
        assert!(compress(b"x", 8, 8).is_err());
        assert!(decompress(b"x", 8, 2).is_err());
    }

    #[test]
    fn bounded_decode_stops_at_limit() {
        let data = vec![0u8; 64 * 1024];
        let packed = compress(&data, 15, 14).unwrap();
        assert_eq!(decompress_bounded(&packed, 15, 14, data.len()).unwrap(), data);
        let err = decompress_bounded(&packed, 15, 14, 100).unwrap_err();
        assert!(matches!(err, CodecError::Corrupt(_)));

        let packed = compress(b"abc", 8, 4).unwrap();
        assert!(decompress_bounded(&packed, 8, 4, 2).is_err());
        assert_eq!(decompress_bounded(&packed, 8, 4, 3).unwrap(), b"abc");
    }

    #[test]
    fn backref_before_start_is_corrupt() {
        // flag 0, index 0 (distance 1) with nothing decoded yet.
        let err = decompress(&[0x00, 0x00], 4, 3).unwrap_err();
        assert!(matches!(err, CodecError::Corrupt(_)));
    }
}
