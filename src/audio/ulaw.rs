//! G.711 µ-law companding
//!
//! Bit-for-bit compatible with the reference algorithm: sign bit, 3-bit
//! segment, 4-bit mantissa, all bits inverted on the wire.

/// Bias added before segment search (G.711 reference value)
const BIAS: i32 = 0x84;

/// Clip level for linear input
const CLIP: i32 = 32_635;

/// µ-law byte for digital silence (encode of sample 0)
pub const SILENCE: u8 = 0xFF;

/// Encode one 16-bit linear PCM sample to a µ-law byte
#[must_use]
pub fn ulaw_encode(sample: i16) -> u8 {
    let sign: u8 = if sample < 0 { 0x80 } else { 0x00 };
    let mut magnitude = i32::from(sample).abs().min(CLIP);
    magnitude += BIAS;

    // Segment = index of the highest set bit of (magnitude >> 7), 0..=7
    let top = (magnitude >> 7) & 0xFF;
    #[allow(clippy::cast_possible_truncation)]
    let segment = if top == 0 { 0 } else { (31 - top.leading_zeros()) as u8 };

    let mantissa = u8::try_from((magnitude >> (segment + 3)) & 0x0F).unwrap_or(0);
    !(sign | (segment << 4) | mantissa)
}

/// Decode one µ-law byte to a 16-bit linear PCM sample
#[must_use]
pub fn ulaw_decode(byte: u8) -> i16 {
    let u = !byte;
    let sign = u & 0x80;
    let segment = (u >> 4) & 0x07;
    let mantissa = u & 0x0F;

    let magnitude = ((i32::from(mantissa) << 3) + BIAS) << segment;
    let sample = magnitude - BIAS;

    let sample = if sign == 0 { sample } else { -sample };
    i16::try_from(sample).unwrap_or(if sign == 0 { i16::MAX } else { i16::MIN })
}

/// Decode a µ-law payload to linear PCM
#[must_use]
pub fn decode_slice(payload: &[u8]) -> Vec<i16> {
    payload.iter().map(|&b| ulaw_decode(b)).collect()
}

/// Encode linear PCM to a µ-law payload
#[must_use]
pub fn encode_slice(pcm: &[i16]) -> Vec<u8> {
    pcm.iter().map(|&s| ulaw_encode(s)).collect()
}
