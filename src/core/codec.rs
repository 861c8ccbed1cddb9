//! Media frame codec for Twilio Media Streams.
//!
//! Twilio carries each 20 ms audio frame as base64-encoded G.711 mu-law
//! (8 kHz, mono) inside a JSON `media` event. Deepgram accepts mu-law
//! directly, so inbound decoding stops at the raw mu-law bytes.
//!
//! The outbound helpers are only needed when replies are streamed back over
//! the media connection: OpenAI speech returns 24 kHz 16-bit PCM, which is
//! downsampled to 8 kHz, mu-law encoded and cut into 20 ms frames.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use thiserror::Error;

/// Sample rate of Twilio media frames.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Bytes in one 20 ms mu-law frame at 8 kHz.
pub const FRAME_BYTES: usize = 160;

/// Largest payload accepted from a single media event (1 s of audio).
pub const MAX_FRAME_PAYLOAD: usize = 8000;

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32635;

/// Errors produced while decoding a media payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Empty media payload")]
    EmptyPayload,

    #[error("Invalid base64 media payload: {0}")]
    InvalidBase64(String),

    #[error("Media payload of {0} bytes exceeds the {MAX_FRAME_PAYLOAD} byte frame limit")]
    FrameTooLarge(usize),
}

/// Decode one `media.payload` string into raw mu-law bytes.
pub fn decode_media_payload(payload: &str) -> Result<Bytes, CodecError> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err(CodecError::EmptyPayload);
    }

    let decoded = STANDARD
        .decode(trimmed)
        .map_err(|e| CodecError::InvalidBase64(e.to_string()))?;

    if decoded.is_empty() {
        return Err(CodecError::EmptyPayload);
    }
    if decoded.len() > MAX_FRAME_PAYLOAD {
        return Err(CodecError::FrameTooLarge(decoded.len()));
    }

    Ok(Bytes::from(decoded))
}

/// Encode raw mu-law bytes as a `media.payload` string.
pub fn encode_media_payload(audio: &[u8]) -> String {
    STANDARD.encode(audio)
}

/// G.711 mu-law encode one 16-bit linear sample.
pub fn mulaw_encode(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    pcm = pcm.min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent: i32 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;

    !((sign | (exponent << 4) | mantissa) as u8)
}

/// G.711 mu-law decode one byte into a 16-bit linear sample.
pub fn mulaw_decode(byte: u8) -> i16 {
    let value = !byte;
    let sign = value & 0x80;
    let exponent = ((value >> 4) & 0x07) as i32;
    let mantissa = (value & 0x0F) as i32;

    let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Interpret little-endian 16-bit PCM bytes as samples. A trailing odd byte is ignored.
pub fn pcm16_from_le_bytes(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Downsample PCM by averaging each group of input samples that maps to one output sample.
///
/// Only integer ratios are supported (24 kHz → 8 kHz is the case that matters);
/// other rates fall back to nearest-sample picking.
pub fn downsample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() || to_rate == 0 {
        return samples.to_vec();
    }

    if from_rate % to_rate == 0 {
        let ratio = (from_rate / to_rate) as usize;
        return samples
            .chunks(ratio)
            .map(|group| {
                let sum: i32 = group.iter().map(|&s| s as i32).sum();
                (sum / group.len() as i32) as i16
            })
            .collect();
    }

    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    (0..out_len)
        .map(|i| {
            let src = (i as u64 * from_rate as u64 / to_rate as u64) as usize;
            samples[src.min(samples.len() - 1)]
        })
        .collect()
}

/// Convert 16-bit PCM at `sample_rate` into base64 mu-law payloads, one per 20 ms frame.
pub fn pcm_to_media_frames(pcm_le: &[u8], sample_rate: u32) -> Vec<String> {
    let samples = pcm16_from_le_bytes(pcm_le);
    let narrow = downsample(&samples, sample_rate, TELEPHONY_SAMPLE_RATE);
    let mulaw: Vec<u8> = narrow.into_iter().map(mulaw_encode).collect();

    mulaw
        .chunks(FRAME_BYTES)
        .map(encode_media_payload)
        .collect()
}
