//! # Audio Decoding
//!
//! Decodes an uploaded audio file into a mono waveform at a target sample
//! rate. Containers and codecs are handled by symphonia (wav, mp3, ogg,
//! m4a/aac, mkv/webm-vorbis); sample-rate conversion by rubato.
//!
//! Down-mix policy: multi-channel audio is folded to mono by taking the
//! arithmetic mean of all channels per frame. Deterministic, so a given file
//! always produces the same waveform and therefore the same window count.
//!
//! Any probe, decode, or resample failure is terminal for the whole
//! transcription job; per-window failure isolation starts after decoding.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::{AudioBuffer, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Decode `path` and return the mono waveform resampled to `target_rate`.
pub fn load_waveform(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let (samples, source_rate) = decode_to_mono(path)?;
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples);
    }
    resample(samples, source_rate, target_rate)
}

/// Decode `path` into mean-down-mixed mono samples plus the source rate.
pub fn decode_to_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let src = std::fs::File::open(path)
        .with_context(|| format!("failed to open audio file {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("unrecognized audio container")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("no decodable audio track"))?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("audio track does not declare a sample rate"))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("unsupported audio codec")?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("error reading audio packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => match decoded {
                symphonia::core::audio::AudioBufferRef::F32(buf) => downmix(&mut samples, &buf),
                symphonia::core::audio::AudioBufferRef::F64(buf) => downmix(&mut samples, &buf),
                symphonia::core::audio::AudioBufferRef::S8(buf) => downmix(&mut samples, &buf),
                symphonia::core::audio::AudioBufferRef::S16(buf) => downmix(&mut samples, &buf),
                symphonia::core::audio::AudioBufferRef::S24(buf) => downmix(&mut samples, &buf),
                symphonia::core::audio::AudioBufferRef::S32(buf) => downmix(&mut samples, &buf),
                symphonia::core::audio::AudioBufferRef::U8(buf) => downmix(&mut samples, &buf),
                symphonia::core::audio::AudioBufferRef::U16(buf) => downmix(&mut samples, &buf),
                symphonia::core::audio::AudioBufferRef::U24(buf) => downmix(&mut samples, &buf),
                symphonia::core::audio::AudioBufferRef::U32(buf) => downmix(&mut samples, &buf),
            },
            // A corrupt packet is skippable; a corrupt stream is not.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!("skipping undecodable packet: {}", e);
            }
            Err(e) => return Err(e).context("error decoding audio packet"),
        }
    }

    Ok((samples, sample_rate))
}

/// Fold one decoded buffer into `samples`, averaging across channels.
fn downmix<T>(samples: &mut Vec<f32>, buf: &AudioBuffer<T>)
where
    T: symphonia::core::sample::Sample,
    f32: FromSample<T>,
{
    let channels = buf.spec().channels.count();
    if channels == 1 {
        samples.extend(buf.chan(0).iter().map(|&v| f32::from_sample(v)));
        return;
    }
    let frames = buf.frames();
    samples.reserve(frames);
    for frame in 0..frames {
        let mut sum = 0f32;
        for ch in 0..channels {
            sum += f32::from_sample(buf.chan(ch)[frame]);
        }
        samples.push(sum / channels as f32);
    }
}

/// Resample a mono waveform between sample rates.
pub fn resample(samples: Vec<f32>, from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate {
        return Ok(samples);
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    const CHUNK: usize = 1024;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, CHUNK, 1)
        .context("failed to construct resampler")?;

    let mut out = Vec::with_capacity((samples.len() as f64 * ratio) as usize + CHUNK);
    let mut pos = 0;
    while pos + CHUNK <= samples.len() {
        let frames = resampler
            .process(&[&samples[pos..pos + CHUNK]], None)
            .context("resampling failed")?;
        out.extend_from_slice(&frames[0]);
        pos += CHUNK;
    }
    if pos < samples.len() {
        let frames = resampler
            .process_partial(Some(&[&samples[pos..]]), None)
            .context("resampling failed")?;
        out.extend_from_slice(&frames[0]);
    }
    // Drain frames still buffered in the sinc filter.
    let frames = resampler
        .process_partial::<&[f32]>(None, None)
        .context("resampling failed")?;
    out.extend_from_slice(&frames[0]);

    Ok(out)
}
