use crate::error::{Error, Result};
use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Sample rate the service renders at unless configured otherwise.
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

const WAV_HEADER_SIZE: usize = 44;
const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// Builds a 44-byte RIFF/PCM header.
///
/// With `data_size` unknown (a stream of unknown length) both size fields are
/// written as `0xFFFFFFFF`.
pub fn wav_header(
    sample_rate: u32,
    data_size: Option<u32>,
    num_channels: u16,
    bits_per_sample: u16,
) -> [u8; WAV_HEADER_SIZE] {
    let byte_rate = sample_rate.saturating_mul(u32::from(num_channels) * u32::from(bits_per_sample)) / 8;
    let block_align = num_channels * bits_per_sample / 8;

    let mut header = [0u8; WAV_HEADER_SIZE];
    let mut offset = 0;
    let mut put = |bytes: &[u8]| {
        header[offset..offset + bytes.len()].copy_from_slice(bytes);
        offset += bytes.len();
    };

    // RIFF header
    put(b"RIFF");
    put(&data_size.map_or(u32::MAX, |size| size.saturating_add(36)).to_le_bytes());
    put(b"WAVE");

    // fmt sub-chunk, PCM
    put(b"fmt ");
    put(&16u32.to_le_bytes());
    put(&1u16.to_le_bytes());
    put(&num_channels.to_le_bytes());
    put(&sample_rate.to_le_bytes());
    put(&byte_rate.to_le_bytes());
    put(&block_align.to_le_bytes());
    put(&bits_per_sample.to_le_bytes());

    // data sub-chunk
    put(b"data");
    put(&data_size.unwrap_or(u32::MAX).to_le_bytes());

    header
}

/// RIFF sizes are 32 bit; larger buffers are clamped.
fn riff_size(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Wraps mono 16-bit PCM in a WAV container.
pub fn to_wav(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    let header = wav_header(sample_rate, Some(riff_size(pcm.len())), 1, 16);
    let mut wav = Vec::with_capacity(header.len() + pcm.len());
    wav.extend_from_slice(&header);
    wav.extend_from_slice(pcm);
    wav
}

/// Decodes the base64 audio payload of a frame into raw bytes.
pub fn decode_base64_audio(fragment: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(fragment)
}

pub fn encode_base64_audio(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Interprets little-endian PCM16 bytes as samples normalised to [-1.0, 1.0).
pub fn pcm16_to_f32(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect()
}

/// Converts normalised samples back to little-endian PCM16, clamping.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect()
}

/// Playback length of mono PCM16 at `sample_rate`.
pub fn pcm16_duration(byte_len: usize, sample_rate: u32) -> std::time::Duration {
    if sample_rate == 0 {
        return std::time::Duration::ZERO;
    }
    std::time::Duration::from_secs_f64((byte_len / 2) as f64 / sample_rate as f64)
}

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: u32,
    out_sampling_rate: u32,
    chunk_size: usize,
) -> Result<FastFixedIn<f32>> {
    FastFixedIn::<f32>::new(
        out_sampling_rate as f64 / in_sampling_rate as f64,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )
    .map_err(|e| Error::Audio(e.to_string()))
}

/// Resamples mono PCM16 from one rate to another.
///
/// The output is trimmed to the expected length for the ratio.
pub fn resample_pcm16(pcm: &[u8], from: u32, to: u32) -> Result<Vec<u8>> {
    if from == to || pcm.is_empty() {
        return Ok(pcm.to_vec());
    }
    let samples = pcm16_to_f32(pcm);
    let mut resampler = create_resampler(from, to, RESAMPLER_CHUNK_SIZE)?;
    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;

    let mut out = Vec::with_capacity(expected + RESAMPLER_CHUNK_SIZE);
    let mut chunks = samples.chunks_exact(resampler.input_frames_next());
    for chunk in &mut chunks {
        let processed = resampler
            .process(&[chunk], None)
            .map_err(|e| Error::Audio(e.to_string()))?;
        out.extend_from_slice(&processed[0]);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let processed = resampler
            .process_partial(Some(&[rest]), None)
            .map_err(|e| Error::Audio(e.to_string()))?;
        out.extend_from_slice(&processed[0]);
    }
    out.resize(expected, 0.0);
    Ok(f32_to_pcm16(&out))
}
