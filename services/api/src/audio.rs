//! Pure audio conversions between the telephony leg (μ-law, 8 kHz mono) and
//! the model leg (linear PCM16, 16 kHz mono).
//!
//! Everything here is stateless and allocation-per-call; the bridge composes
//! these functions per media frame. All functions map empty input to empty
//! output.

use base64::Engine;

/// Encoding of digital silence: μ-law for linear 0.
pub const MULAW_SILENCE: u8 = 0xFF;

const BIAS: i32 = 0x84; // 132
const CLIP: i32 = 32_635;

/// μ-law byte -> linear PCM16, one entry per possible byte.
const MULAW_DECODE: [i16; 256] = build_decode_table();

const fn build_decode_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0usize;
    while i < 256 {
        table[i] = decode_mulaw_math(i as u8);
        i += 1;
    }
    table
}

/// Standard logarithmic-PCM decode: invert all bits, split into
/// sign/exponent/mantissa, rebuild the biased magnitude and remove the bias.
const fn decode_mulaw_math(byte: u8) -> i16 {
    let inverted = !byte;
    let sign = inverted & 0x80;
    let exponent = (inverted >> 4) & 0x07;
    let mantissa = (inverted & 0x0f) as i32;
    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

#[inline]
pub fn decode_mulaw_sample(byte: u8) -> i16 {
    MULAW_DECODE[byte as usize]
}

/// Linear PCM16 -> μ-law byte: clamp, bias, locate the segment (highest set
/// exponent bit, 7 down to 0), take a 4-bit mantissa, reassemble, invert.
pub fn encode_mulaw_sample(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };
    if magnitude > CLIP {
        magnitude = CLIP;
    }
    magnitude += BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (magnitude & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (magnitude >> (exponent + 3)) & 0x0f;

    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Decodes a μ-law buffer into PCM16 samples.
pub fn decode_mulaw(mulaw: &[u8]) -> Vec<i16> {
    mulaw.iter().map(|&b| decode_mulaw_sample(b)).collect()
}

/// Encodes PCM16 samples into a μ-law buffer.
pub fn encode_mulaw(pcm: &[i16]) -> Vec<u8> {
    pcm.iter().map(|&s| encode_mulaw_sample(s)).collect()
}

/// 8 kHz -> 16 kHz: each sample is followed by the truncated midpoint to its
/// successor; the final sample has no successor and is duplicated.
pub fn upsample_8k_to_16k(input: &[i16]) -> Vec<i16> {
    let mut output = Vec::with_capacity(input.len() * 2);
    for (i, &sample) in input.iter().enumerate() {
        output.push(sample);
        let next = match input.get(i + 1) {
            Some(&next) => ((sample as i32 + next as i32) / 2) as i16,
            None => sample,
        };
        output.push(next);
    }
    output
}

/// 16 kHz -> 8 kHz by decimation: keep the first sample of each pair, drop
/// the second.
pub fn downsample_16k_to_8k(input: &[i16]) -> Vec<i16> {
    input.iter().step_by(2).copied().collect()
}

/// Interprets little-endian PCM16 bytes as samples. A trailing odd byte is
/// dropped.
pub fn pcm_from_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Serializes PCM16 samples as little-endian bytes.
pub fn pcm_to_bytes(pcm: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(pcm.len() * 2);
    for sample in pcm {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

pub fn base64_encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn base64_decode(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_decode_values() {
        // All-zeros byte is the negative extreme of the μ-law range.
        assert_eq!(decode_mulaw_sample(0x00), -32_124);
        // All-ones byte is digital silence.
        assert_eq!(decode_mulaw_sample(0xFF), 0);
        // Positive extreme mirrors the negative one.
        assert_eq!(decode_mulaw_sample(0x80), 32_124);
    }

    #[test]
    fn silence_encodes_to_the_reserved_byte() {
        assert_eq!(encode_mulaw_sample(0), MULAW_SILENCE);
    }

    #[test]
    fn encode_clamps_out_of_range_magnitudes() {
        assert_eq!(encode_mulaw_sample(i16::MAX), encode_mulaw_sample(32_635));
        assert_eq!(encode_mulaw_sample(i16::MIN), encode_mulaw_sample(-32_635));
    }

    #[test]
    fn round_trip_stays_in_the_same_quantization_bucket() {
        // Exact bit identity is not guaranteed (e.g. negative zero), but
        // re-encoding a decoded byte must land on the same decoded value.
        for byte in 0..=255u8 {
            let decoded = decode_mulaw_sample(byte);
            let reencoded = encode_mulaw_sample(decoded);
            assert_eq!(
                decode_mulaw_sample(reencoded),
                decoded,
                "byte {byte:#04x} drifted across buckets"
            );
        }
    }

    #[test]
    fn encode_decode_is_monotone_on_samples() {
        // Decoding an encoded sample must stay within one quantization step.
        for &sample in &[0i16, 1, -1, 100, -100, 1000, -1000, 16_000, -16_000, 32_000] {
            let decoded = decode_mulaw_sample(encode_mulaw_sample(sample));
            let step = (sample.unsigned_abs() as i32 / 16).max(8);
            assert!(
                (decoded as i32 - sample as i32).abs() <= step,
                "sample {sample} decoded to {decoded}"
            );
        }
    }

    #[test]
    fn upsample_interpolates_midpoints_and_duplicates_the_tail() {
        assert_eq!(upsample_8k_to_16k(&[0, 100]), vec![0, 50, 100, 100]);
        assert_eq!(upsample_8k_to_16k(&[10]), vec![10, 10]);
        // Truncation, not rounding.
        assert_eq!(upsample_8k_to_16k(&[0, 3]), vec![0, 1, 3, 3]);
        assert_eq!(upsample_8k_to_16k(&[0, -3]), vec![0, -1, -3, -3]);
    }

    #[test]
    fn downsample_keeps_the_first_of_each_pair() {
        assert_eq!(downsample_16k_to_8k(&[1, 2, 3, 4, 5, 6]), vec![1, 3, 5]);
        assert_eq!(downsample_16k_to_8k(&[7]), vec![7]);
    }

    #[test]
    fn resampler_round_trip_preserves_length_and_constants() {
        for len in [2usize, 8, 160, 320] {
            let frame: Vec<i16> = (0..len as i16).collect();
            let round = downsample_16k_to_8k(&upsample_8k_to_16k(&frame));
            assert_eq!(round.len(), frame.len());
        }

        // Constant frames survive the round trip unchanged.
        for value in [0i16, 42, -42, i16::MAX] {
            let frame = vec![value; 160];
            assert_eq!(downsample_16k_to_8k(&upsample_8k_to_16k(&frame)), frame);
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(decode_mulaw(&[]).is_empty());
        assert!(encode_mulaw(&[]).is_empty());
        assert!(upsample_8k_to_16k(&[]).is_empty());
        assert!(downsample_16k_to_8k(&[]).is_empty());
        assert!(pcm_from_bytes(&[]).is_empty());
        assert!(pcm_to_bytes(&[]).is_empty());
    }

    #[test]
    fn pcm_byte_helpers_are_little_endian() {
        assert_eq!(pcm_from_bytes(&[0x00, 0x40]), vec![16_384]);
        assert_eq!(pcm_to_bytes(&[16_384]), vec![0x00, 0x40]);
        // Incomplete trailing chunk is dropped.
        assert_eq!(pcm_from_bytes(&[0x00, 0x40, 0x01]), vec![16_384]);
    }
}
