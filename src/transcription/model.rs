//! # Whisper Model Loading and Inference
//!
//! Loads a Whisper checkpoint with Candle-rs and runs greedy decoding on
//! single windows of audio.
//!
//! ## Checkpoint Resolution:
//! A model location is either a local directory holding the three checkpoint
//! files, or a HuggingFace repository id (e.g. `openai/whisper-base`) that is
//! fetched through the hub and cached locally.
//!
//! ## Inference Contract:
//! `transcribe_window` expects mono f32 samples at 16kHz, at most 30 seconds
//! long. Longer recordings are split into windows upstream; the model only
//! ever sees one window per call.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, audio, Config};
use tokenizers::Tokenizer;

/// Resolved on-disk paths of the three files a Whisper checkpoint needs.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    /// Resolve a model location to concrete files.
    ///
    /// A location naming an existing directory is used as-is. Anything else
    /// is treated as a HuggingFace repository id and downloaded (hf-hub keeps
    /// a local cache, so the network is only hit once per checkpoint).
    pub async fn locate(location: &str) -> Result<Self> {
        let path = Path::new(location);
        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Self::fetch(location).await
        }
    }

    fn from_dir(dir: &Path) -> Result<Self> {
        let files = Self {
            config: dir.join("config.json"),
            tokenizer: dir.join("tokenizer.json"),
            weights: dir.join("model.safetensors"),
        };
        for (name, path) in [
            ("config.json", &files.config),
            ("tokenizer.json", &files.tokenizer),
            ("model.safetensors", &files.weights),
        ] {
            if !path.is_file() {
                bail!("model directory {} is missing {}", dir.display(), name);
            }
        }
        Ok(files)
    }

    async fn fetch(repo_id: &str) -> Result<Self> {
        use hf_hub::api::tokio::ApiBuilder;

        tracing::info!("Fetching model files from HuggingFace repo {}", repo_id);

        let mut builder = ApiBuilder::new().with_progress(false);
        if let Ok(token) = std::env::var("HF_TOKEN") {
            builder = builder.with_token(Some(token));
        }
        let api = builder
            .build()
            .context("failed to initialize HuggingFace hub client")?;
        let repo = api.model(repo_id.to_string());

        let config = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("failed to fetch config.json from {}: {}", repo_id, e))?;
        let tokenizer = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("failed to fetch tokenizer.json from {}: {}", repo_id, e))?;
        let weights = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("failed to fetch model.safetensors from {}: {}", repo_id, e))?;

        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }
}

/// A Whisper checkpoint loaded onto a device and ready for inference.
pub struct WhisperModel {
    model: m::model::Whisper,
    tokenizer: Tokenizer,
    config: Config,
    device: Device,
    mel_filters: Vec<f32>,
}

impl WhisperModel {
    /// Load model weights, tokenizer and mel filters from resolved files.
    ///
    /// This is synchronous and heavy (mmaps the weights and builds the full
    /// transformer), so callers run it on a blocking thread.
    pub fn load(files: &ModelFiles, device: Device) -> Result<Self> {
        let start_time = std::time::Instant::now();

        let config: Config = serde_json::from_reader(
            std::fs::File::open(&files.config)
                .with_context(|| format!("failed to open {}", files.config.display()))?,
        )?;
        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("failed to load tokenizer: {}", e))?;
        let mel_filters = mel_filter_bank(config.num_mel_bins);

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&files.weights], m::DTYPE, &device)?
        };
        let model = m::model::Whisper::load(&vb, config.clone())?;

        tracing::info!(
            "Whisper model loaded in {:.2}s ({} mel bins, vocab {})",
            start_time.elapsed().as_secs_f64(),
            config.num_mel_bins,
            config.vocab_size,
        );

        Ok(Self {
            model,
            tokenizer,
            config,
            device,
            mel_filters,
        })
    }

    /// Transcribe one window of audio with greedy decoding.
    ///
    /// ## Parameters:
    /// - **pcm**: Mono f32 samples at 16kHz, range [-1.0, 1.0], at most 30s
    /// - **language**: Optional language hint, e.g. `"en"`
    ///
    /// ## Returns:
    /// The trimmed transcription text, which may be empty for silence.
    pub fn transcribe_window(&mut self, pcm: &[f32], language: Option<&str>) -> Result<String> {
        if pcm.is_empty() {
            bail!("cannot transcribe an empty window");
        }
        let start_time = std::time::Instant::now();

        let mel = audio::pcm_to_mel(&self.config, pcm, &self.mel_filters);
        let mel_len = mel.len();
        let mel = Tensor::from_vec(
            mel,
            (1, self.config.num_mel_bins, mel_len / self.config.num_mel_bins),
            &self.device,
        )?;

        // pcm_to_mel pads the spectrogram past the audio itself. Windows are
        // capped at the model's 30s receptive field, so a single encoder pass
        // over the first N_FRAMES covers everything that is not padding.
        let (_, _, content_frames) = mel.dims3()?;
        let segment_frames = usize::min(content_frames, m::N_FRAMES);
        let mel_segment = mel.narrow(2, 0, segment_frames)?;
        let audio_features = self.model.encoder.forward(&mel_segment, true)?;

        let sot_token = self.token_id(m::SOT_TOKEN)?;
        let transcribe_token = self.token_id(m::TRANSCRIBE_TOKEN)?;
        let eot_token = self.token_id(m::EOT_TOKEN)?;
        let no_timestamps_token = self.token_id(m::NO_TIMESTAMPS_TOKEN)?;

        let mut tokens = vec![sot_token];
        if let Some(language) = language {
            // Only multilingual checkpoints carry language tokens; the
            // English-only variants have none and ignore the hint.
            if let Some(language_token) = self.language_token(language) {
                tokens.push(language_token);
            }
        }
        tokens.push(transcribe_token);
        tokens.push(no_timestamps_token);
        let prompt_len = tokens.len();

        let max_tokens = self.config.max_target_positions / 2;
        for i in 0..max_tokens {
            let tokens_t = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let decoder_output = self.model.decoder.forward(&tokens_t, &audio_features, i == 0)?;
            let (_, seq_len, _) = decoder_output.dims3()?;
            let tail = decoder_output.i((..1, seq_len - 1..))?;
            let logits = self.model.decoder.final_linear(&tail)?.i(0)?.i(0)?;
            let next_token = logits.argmax(0)?.to_scalar::<u32>()?;
            if next_token == eot_token {
                break;
            }
            tokens.push(next_token);
        }

        let text = self
            .tokenizer
            .decode(&tokens[prompt_len..], true)
            .map_err(|e| anyhow!("failed to decode tokens: {}", e))?;
        let text = text.trim().to_string();

        tracing::debug!(
            "Transcribed {:.2}s of audio in {:.2}s ({} tokens)",
            pcm.len() as f64 / m::SAMPLE_RATE as f64,
            start_time.elapsed().as_secs_f64(),
            tokens.len() - prompt_len,
        );

        Ok(text)
    }

    /// Get the device the model is loaded on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn token_id(&self, token: &str) -> Result<u32> {
        self.tokenizer
            .token_to_id(token)
            .ok_or_else(|| anyhow!("tokenizer has no token {}", token))
    }

    fn language_token(&self, language: &str) -> Option<u32> {
        self.tokenizer.token_to_id(&format!("<|{}|>", language))
    }
}

/// Build the Slaney-scale mel filter bank Whisper preprocessing expects.
///
/// Returns `n_mels * 201` weights in row-major order (one row per mel band,
/// one column per FFT bin of the 400-point STFT), matching the layout
/// `pcm_to_mel` indexes into.
pub(crate) fn mel_filter_bank(n_mels: usize) -> Vec<f32> {
    let n_freqs = m::N_FFT / 2 + 1;
    let sample_rate = m::SAMPLE_RATE as f32;
    let f_max = sample_rate / 2.0;

    let fft_freqs: Vec<f32> = (0..n_freqs)
        .map(|bin| bin as f32 * sample_rate / m::N_FFT as f32)
        .collect();

    // n_mels + 2 band edges evenly spaced on the mel scale; each filter is a
    // triangle between edge i and edge i+2 peaking at edge i+1.
    let mel_max = hz_to_mel(f_max);
    let band_edges: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();

    let mut filters = vec![0.0f32; n_mels * n_freqs];
    for row in 0..n_mels {
        let (lower, center, upper) = (band_edges[row], band_edges[row + 1], band_edges[row + 2]);
        // Slaney area normalization keeps per-band energy comparable.
        let norm = 2.0 / (upper - lower);
        for (bin, &freq) in fft_freqs.iter().enumerate() {
            let rising = (freq - lower) / (center - lower);
            let falling = (upper - freq) / (upper - center);
            let weight = rising.min(falling).max(0.0);
            filters[row * n_freqs + bin] = weight * norm;
        }
    }
    filters
}

/// Hz to mel, Slaney scale: linear below 1kHz, logarithmic above.
fn hz_to_mel(freq: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;
    if freq >= min_log_hz {
        min_log_mel + (freq / min_log_hz).ln() / logstep
    } else {
        freq / f_sp
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    let f_sp = 200.0 / 3.0;
    let min_log_hz = 1000.0;
    let min_log_mel = min_log_hz / f_sp;
    let logstep = 6.4f32.ln() / 27.0;
    if mel >= min_log_mel {
        min_log_hz * ((mel - min_log_mel) * logstep).exp()
    } else {
        mel * f_sp
    }
}
