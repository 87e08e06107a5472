//! Chunked run-length pixel codec.
//!
//! Pixel buffers are split into fixed-size chunks compressed independently,
//! so chunks can be encoded in parallel and transmitted before the whole
//! buffer is done. The per-chunk encoding is PackBits-style: a control byte
//! introduces either a literal run or a repeat run.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("pixel payload size mismatch: expected {expected} bytes, got {actual}")]
    FormatMismatch { expected: usize, actual: usize },
    #[error("compressed chunk truncated at byte {0}")]
    Truncated(usize),
}

/// Uncompressed bytes covered by one compressed chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Independently-sized compressed chunks plus the raw length they decode to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedChunks {
    pub chunks: Vec<Vec<u8>>,
    pub raw_len: usize,
}

impl CompressedChunks {
    /// Total compressed payload size across all chunks.
    pub fn compressed_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }
}

/// Number of low bits discarded per byte for a given quality factor.
fn quantize_bits(quality: f32) -> u32 {
    if quality >= 1.0 {
        return 0;
    }
    (((1.0 - quality.max(0.0)) * 4.0).ceil() as u32).min(4)
}

/// Compresses a pixel buffer.
///
/// `quality == 1.0` is lossless; lower values discard low bits of every byte
/// before run-length encoding, trading fidelity for longer runs. The result
/// depends only on the input bytes and quality, so re-compressing unchanged
/// pixels yields identical chunks.
pub fn compress(data: &[u8], quality: f32) -> CompressedChunks {
    let bits = quantize_bits(quality);
    let mask = if bits == 0 { 0xFF } else { 0xFFu8 << bits };

    let mut chunks = Vec::with_capacity(data.len().div_ceil(CHUNK_SIZE).max(1));
    if data.is_empty() {
        return CompressedChunks {
            chunks,
            raw_len: 0,
        };
    }
    for raw in data.chunks(CHUNK_SIZE) {
        chunks.push(encode_chunk(raw, mask));
    }
    CompressedChunks {
        chunks,
        raw_len: data.len(),
    }
}

/// Decompresses a chunk list produced by [`compress`].
///
/// Fails with [`CodecError::FormatMismatch`] when the declared raw length
/// does not match `expected_len`, and with [`CodecError::Truncated`] when a
/// chunk payload ends mid-run.
pub fn decompress(compressed: &CompressedChunks, expected_len: usize) -> Result<Vec<u8>, CodecError> {
    if compressed.raw_len != expected_len {
        return Err(CodecError::FormatMismatch {
            expected: expected_len,
            actual: compressed.raw_len,
        });
    }
    let mut out = Vec::with_capacity(expected_len);
    let mut remaining = expected_len;
    for chunk in &compressed.chunks {
        let chunk_raw = remaining.min(CHUNK_SIZE);
        decode_chunk(chunk, chunk_raw, &mut out)?;
        remaining -= chunk_raw;
    }
    if remaining != 0 || out.len() != expected_len {
        return Err(CodecError::FormatMismatch {
            expected: expected_len,
            actual: out.len(),
        });
    }
    Ok(out)
}

// Control byte: 0..=127 -> literal run of n+1 bytes; 129..=255 -> the next
// byte repeated 257-n times; 128 is unused.
fn encode_chunk(raw: &[u8], mask: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() / 4 + 8);
    let mut literal: Vec<u8> = Vec::with_capacity(128);
    let mut i = 0;
    while i < raw.len() {
        let value = raw[i] & mask;
        let mut run = 1;
        while run < 128 && i + run < raw.len() && raw[i + run] & mask == value {
            run += 1;
        }
        if run >= 3 {
            flush_literal(&mut out, &mut literal);
            out.push((257 - run) as u8);
            out.push(value);
            i += run;
        } else {
            for _ in 0..run {
                literal.push(value);
                if literal.len() == 128 {
                    flush_literal(&mut out, &mut literal);
                }
            }
            i += run;
        }
    }
    flush_literal(&mut out, &mut literal);
    out
}

fn flush_literal(out: &mut Vec<u8>, literal: &mut Vec<u8>) {
    if literal.is_empty() {
        return;
    }
    out.push((literal.len() - 1) as u8);
    out.extend_from_slice(literal);
    literal.clear();
}

fn decode_chunk(chunk: &[u8], raw_len: usize, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let target = out.len() + raw_len;
    let mut pos = 0;
    while out.len() < target {
        let control = *chunk.get(pos).ok_or(CodecError::Truncated(pos))?;
        pos += 1;
        if control <= 127 {
            let len = control as usize + 1;
            let literal = chunk
                .get(pos..pos + len)
                .ok_or(CodecError::Truncated(pos))?;
            out.extend_from_slice(literal);
            pos += len;
        } else if control >= 129 {
            let len = 257 - control as usize;
            let value = *chunk.get(pos).ok_or(CodecError::Truncated(pos))?;
            pos += 1;
            out.resize(out.len() + len, value);
        } else {
            return Err(CodecError::Truncated(pos));
        }
    }
    if out.len() != target {
        return Err(CodecError::FormatMismatch {
            expected: target,
            actual: out.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn lossless_round_trip_of_a_single_black_pixel() {
        let pixel = vec![0u8, 0, 0, 255];
        let compressed = compress(&pixel, 1.0);
        assert_eq!(decompress(&compressed, 4).unwrap(), pixel);
    }

    #[test]
    fn lossless_round_trip_of_seeded_noise() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise: Vec<u8> = (0..3 * CHUNK_SIZE + 17).map(|_| rng.gen()).collect();
        let compressed = compress(&noise, 1.0);
        assert_eq!(compressed.chunks.len(), 4);
        assert_eq!(decompress(&compressed, noise.len()).unwrap(), noise);
    }

    #[test]
    fn uniform_data_compresses_to_runs() {
        let flat = vec![42u8; CHUNK_SIZE];
        let compressed = compress(&flat, 1.0);
        assert!(compressed.compressed_len() < flat.len() / 32);
        assert_eq!(decompress(&compressed, flat.len()).unwrap(), flat);
    }

    #[test]
    fn compression_is_idempotent_for_unchanged_input() {
        let data: Vec<u8> = (0..=255).cycle().take(1000).collect();
        assert_eq!(compress(&data, 1.0), compress(&data, 1.0));
    }

    #[test]
    fn length_mismatch_is_detected() {
        let compressed = compress(&[1, 2, 3, 4], 1.0);
        assert_eq!(
            decompress(&compressed, 8),
            Err(CodecError::FormatMismatch {
                expected: 8,
                actual: 4
            })
        );
    }

    #[test]
    fn lossy_quality_discards_low_bits_only() {
        let data: Vec<u8> = (0..=255).collect();
        let compressed = compress(&data, 0.5);
        let restored = decompress(&compressed, data.len()).unwrap();
        for (raw, lossy) in data.iter().zip(&restored) {
            assert_eq!(raw & 0xFC, lossy & 0xFC);
            assert_eq!(lossy & 0x03, 0);
        }
    }

    #[test]
    fn truncated_chunk_is_rejected() {
        let mut compressed = compress(&vec![9u8; 64], 1.0);
        compressed.chunks[0].pop();
        assert!(matches!(
            decompress(&compressed, 64),
            Err(CodecError::Truncated(_))
        ));
    }
}
