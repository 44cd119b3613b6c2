//! Carrier audio codecs.
//!
//! Internally audio is 16-bit linear PCM. A codec converts between that and
//! the carrier's wire encoding. Sample-rate conversion is not performed; the
//! backend speech service is expected to run at the carrier rate.

use std::sync::Arc;

use bytes::Bytes;

use super::base::{AudioError, AudioResult};

/// Conversion between linear PCM samples and a carrier encoding.
pub trait AudioCodec: Send + Sync {
    /// Codec name as used in configuration (e.g. "mulaw")
    fn name(&self) -> &'static str;

    fn sample_rate(&self) -> u32;

    /// Encoded bytes per sample
    fn bytes_per_sample(&self) -> usize;

    /// Decode a carrier frame into samples.
    fn decode(&self, frame: &[u8]) -> AudioResult<Vec<i16>>;

    /// Encode samples into the carrier format.
    fn encode(&self, samples: &[i16]) -> Vec<u8>;
}

/// 16-bit little-endian linear PCM passthrough.
#[derive(Debug, Clone)]
pub struct Linear16Codec {
    sample_rate: u32,
}

impl Linear16Codec {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

impl AudioCodec for Linear16Codec {
    fn name(&self) -> &'static str {
        "linear16"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bytes_per_sample(&self) -> usize {
        2
    }

    fn decode(&self, frame: &[u8]) -> AudioResult<Vec<i16>> {
        pcm_from_le_bytes(frame)
    }

    fn encode(&self, samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// G.711 μ-law at 8 kHz.
#[derive(Debug, Clone, Default)]
pub struct MulawCodec;

impl AudioCodec for MulawCodec {
    fn name(&self) -> &'static str {
        "mulaw"
    }

    fn sample_rate(&self) -> u32 {
        8000
    }

    fn bytes_per_sample(&self) -> usize {
        1
    }

    fn decode(&self, frame: &[u8]) -> AudioResult<Vec<i16>> {
        Ok(frame.iter().map(|&b| ulaw_expand(b)).collect())
    }

    fn encode(&self, samples: &[i16]) -> Vec<u8> {
        samples.iter().map(|&s| ulaw_compress(s)).collect()
    }
}

/// Create a codec by configuration name.
pub fn create_codec(name: &str, sample_rate: u32) -> AudioResult<Arc<dyn AudioCodec>> {
    match name.to_lowercase().as_str() {
        "linear16" | "pcm" | "l16" => Ok(Arc::new(Linear16Codec::new(sample_rate))),
        "mulaw" | "ulaw" | "pcmu" => Ok(Arc::new(MulawCodec)),
        other => Err(AudioError::UnsupportedCodec(other.to_string())),
    }
}

/// Parse 16-bit little-endian PCM.
pub fn pcm_from_le_bytes(data: &[u8]) -> AudioResult<Vec<i16>> {
    if data.len() % 2 != 0 {
        return Err(AudioError::InvalidFrame(format!(
            "linear16 frame has odd length {}",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

/// Serialize samples as 16-bit little-endian PCM.
pub fn pcm_to_le_bytes(samples: &[i16]) -> Bytes {
    Bytes::from(
        samples
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect::<Vec<u8>>(),
    )
}

/// ITU-T G.711 μ-law compression of a 16-bit sample.
fn ulaw_compress(sample: i16) -> u8 {
    let magnitude: i32 = if sample < 0 {
        ((!sample) as i32 >> 2) + 33
    } else {
        (sample as i32 >> 2) + 33
    };
    let magnitude = magnitude.min(0x1FFF);

    let mut segment = 1;
    let mut i = magnitude >> 6;
    while i != 0 {
        segment += 1;
        i >>= 1;
    }

    let high = 0x08 - segment;
    let low = 0x0F - ((magnitude >> segment) & 0x0F);
    let mut out = (high << 4) | low;
    if sample >= 0 {
        out |= 0x80;
    }
    out as u8
}

/// ITU-T G.711 μ-law expansion to a 16-bit sample.
fn ulaw_expand(code: u8) -> i16 {
    let sign: i32 = if code < 0x80 { -1 } else { 1 };
    let inverted = (!code) as i32;
    let exponent = (inverted >> 4) & 0x07;
    let mantissa = inverted & 0x0F;
    let step = 4 << (exponent + 1);

    let magnitude = (0x80 << exponent) + step * mantissa + step / 2 - 4 * 33;
    (sign * magnitude) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_codec() {
        assert_eq!(create_codec("mulaw", 8000).unwrap().name(), "mulaw");
        assert_eq!(create_codec("PCMU", 8000).unwrap().name(), "mulaw");
        assert_eq!(create_codec("linear16", 16000).unwrap().sample_rate(), 16000);
        assert!(matches!(
            create_codec("opus", 48000),
            Err(AudioError::UnsupportedCodec(_))
        ));
    }

    #[test]
    fn test_linear16_passthrough() {
        let codec = Linear16Codec::new(8000);
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN];
        let encoded = codec.encode(&samples);
        assert_eq!(encoded.len(), samples.len() * 2);
        assert_eq!(codec.decode(&encoded).unwrap(), samples);
    }

    #[test]
    fn test_linear16_rejects_odd_frame() {
        let codec = Linear16Codec::new(8000);
        assert!(matches!(
            codec.decode(&[0, 1, 2]),
            Err(AudioError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_mulaw_silence_and_sign() {
        let codec = MulawCodec;
        // Zero encodes to the positive zero code
        assert_eq!(codec.encode(&[0]), vec![0xFF]);

        let decoded = codec.decode(&codec.encode(&[8000, -8000])).unwrap();
        assert!(decoded[0] > 0);
        assert!(decoded[1] < 0);
    }

    #[test]
    fn test_mulaw_is_lossy_but_close() {
        let codec = MulawCodec;
        for sample in [100i16, 1000, 10000, 30000, -100, -1000, -10000, -30000] {
            let decoded = codec.decode(&codec.encode(&[sample])).unwrap()[0];
            let error = (decoded as i32 - sample as i32).abs();
            // Quantization error grows with magnitude, bounded by ~1/16 of the value
            assert!(error <= (sample as i32).abs() / 16 + 8, "{sample} -> {decoded}");
        }
    }
}
