use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

// Define standard sample rates for clarity and consistency
pub const CLIENT_PCM16_SAMPLE_RATE: f64 = 16000.0;
pub const OPENAI_REALTIME_API_PCM16_SAMPLE_RATE: f64 = 24000.0;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,                     // No cutoff frequency, pass all frequencies
        PolynomialDegree::Cubic, // Cubic interpolation for quality
        chunk_size,
        1, // 1 channel (mono)
    )?;
    Ok(resampler)
}

/// Interprets little-endian PCM16 bytes as samples. A trailing odd byte is dropped.
pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Converts a slice of f32 samples to a vector of i16 samples.
pub fn convert_f32_to_i16(pcm32: &[f32]) -> Vec<i16> {
    pcm32
        .iter()
        .map(|&sample| (sample * i16::MAX as f32).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Converts a slice of i16 samples to a vector of f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

pub fn encode_i16(pcm16: &[i16]) -> String {
    let pcm16_bytes: Vec<u8> = pcm16
        .iter()
        .flat_map(|&sample| sample.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(&pcm16_bytes)
}

/// Resamples a PCM16 byte stream whose chunk boundaries are arbitrary.
///
/// Input bytes are buffered until a full resampler chunk is available; an odd
/// trailing byte is carried over to the next push.
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    pending: Vec<f32>,
    carry: Option<u8>,
}

impl StreamResampler {
    pub fn new(in_sampling_rate: f64, out_sampling_rate: f64) -> anyhow::Result<Self> {
        Ok(Self {
            resampler: create_resampler(in_sampling_rate, out_sampling_rate, 1024)?,
            pending: Vec::new(),
            carry: None,
        })
    }

    /// Feeds raw bytes and returns whatever output samples are ready.
    pub fn push(&mut self, bytes: &[u8]) -> anyhow::Result<Vec<i16>> {
        let mut joined;
        let bytes = match self.carry.take() {
            Some(first) => {
                joined = Vec::with_capacity(bytes.len() + 1);
                joined.push(first);
                joined.extend_from_slice(bytes);
                joined.as_slice()
            }
            None => bytes,
        };
        if bytes.len() % 2 == 1 {
            self.carry = bytes.last().copied();
        }
        self.pending
            .extend(convert_i16_to_f32(&pcm16_from_le_bytes(bytes)));

        let mut out = Vec::new();
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            let res = self.resampler.process(&[chunk], None)?;
            out.extend(convert_f32_to_i16(&res[0]));
        }
        Ok(out)
    }

    /// Flushes the buffered tail, padding the final chunk with silence.
    pub fn finish(&mut self) -> anyhow::Result<Vec<i16>> {
        if self.pending.is_empty() {
            return Ok(Vec::new());
        }
        let tail = std::mem::take(&mut self.pending);
        let res = self.resampler.process_partial(Some(&[tail][..]), None)?;
        Ok(convert_f32_to_i16(&res[0]))
    }
}
