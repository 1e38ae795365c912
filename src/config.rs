//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **impl blocks**: Add methods to structs
//! - **Result<T, E>**: Error handling that forces you to handle potential failures
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER__HOST, APP_SERVER__PORT, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, storage, model,
/// transcription) makes it easier to understand and maintain as the
/// application grows. Each group maps to one `[section]` in config.toml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub model: ModelConfig,
    pub transcription: TranscriptionConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to (e.g., "127.0.0.1", "0.0.0.0")
/// - `port`: TCP port number to listen on (1-65535)
/// - `cors_permissive`: Allow any origin — convenient for a local frontend,
///   should be disabled behind a real reverse proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_permissive: bool,
}

/// Where uploaded audio and the notes database live on disk.
///
/// ## Fields:
/// - `database_path`: SQLite database file holding the notes table
/// - `upload_dir`: directory where uploaded audio artifacts are staged and kept
/// - `allowed_extensions`: lowercase extensions accepted for upload; anything
///   else is rejected before the pipeline starts
/// - `max_upload_mb`: hard cap on a single uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: String,
    pub upload_dir: String,
    pub allowed_extensions: Vec<String>,
    pub max_upload_mb: usize,
}

/// Speech-model configuration settings.
///
/// ## Fields:
/// - `location`: where the Whisper checkpoint comes from — either a local
///   directory containing `config.json`/`tokenizer.json`/`model.safetensors`,
///   or a Hugging Face repo id such as "openai/whisper-base"
/// - `preload`: resolve the model at startup instead of on the first request
/// - `language`: spoken-language hint for multilingual checkpoints ("en", "fr", ...)
///
/// ## Model size trade-offs:
/// - Smaller checkpoints (tiny, base): faster inference, lower accuracy
/// - Larger checkpoints (small, medium, large): slower, more memory, higher accuracy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub location: String,
    pub preload: bool,
    pub language: String,
}

/// Tuning for the chunked transcription pipeline.
///
/// ## Fields:
/// - `window_seconds`: length of each audio window fed to the model as one
///   unit. Whisper pads every window to its 30-second frame budget, so values
///   above 30 would silently truncate and are rejected by validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub window_seconds: usize,
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// Default values ensure the application can start even if no configuration
/// file exists. They also serve as documentation of reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                cors_permissive: true,
            },
            storage: StorageConfig {
                database_path: "notes.db".to_string(),
                upload_dir: "uploads".to_string(),
                allowed_extensions: ["wav", "mp3", "ogg", "m4a", "webm"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                max_upload_mb: 64,
            },
            model: ModelConfig {
                location: "openai/whisper-base".to_string(),
                preload: true,
                language: "en".to_string(),
            },
            transcription: TranscriptionConfig {
                window_seconds: 25,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__HOST=0.0.0.0`: Override server host
    /// - `APP_STORAGE__UPLOAD_DIR=/var/lib/notes/audio`: Override upload directory
    /// - `APP_MODEL__LOCATION=openai/whisper-small`: Override model location
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    ///
    /// The `__` separator keeps section nesting unambiguous, since several
    /// field names themselves contain underscores.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        // Deployment platforms commonly inject bare HOST/PORT variables that
        // don't follow the APP_ prefix convention.
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server host is non-empty and port is not 0
    /// - Storage paths are non-empty and the upload allow-list has entries
    /// - The upload size cap is non-zero
    /// - The transcription window fits Whisper's 30-second frame budget
    ///
    /// ## Why validate:
    /// Catching configuration errors early prevents runtime failures and
    /// provides clear error messages about what's wrong.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.storage.database_path.is_empty() {
            return Err(anyhow::anyhow!("Database path cannot be empty"));
        }

        if self.storage.upload_dir.is_empty() {
            return Err(anyhow::anyhow!("Upload directory cannot be empty"));
        }

        if self.storage.allowed_extensions.is_empty() {
            return Err(anyhow::anyhow!(
                "At least one allowed upload extension is required"
            ));
        }

        if self.storage.max_upload_mb == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if self.model.location.is_empty() {
            return Err(anyhow::anyhow!("Model location cannot be empty"));
        }

        if self.transcription.window_seconds == 0 || self.transcription.window_seconds > 30 {
            return Err(anyhow::anyhow!(
                "Transcription window must be between 1 and 30 seconds, got {}",
                self.transcription.window_seconds
            ));
        }

        Ok(())
    }

    /// Maximum upload size in bytes, derived from `max_upload_mb`.
    pub fn max_upload_bytes(&self) -> usize {
        self.storage.max_upload_mb * 1024 * 1024
    }

    /// True if `filename` carries an extension from the allow-list.
    ///
    /// The comparison is case-insensitive and only looks at the final
    /// extension, mirroring how browsers name recorded uploads
    /// (`recording.webm`, `memo.m4a`, ...). A name without any extension is
    /// rejected.
    pub fn is_allowed_upload(&self, filename: &str) -> bool {
        let ext = match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
            _ => return false,
        };
        self.storage
            .allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
    }
}

/// Tests for the configuration module.
#[cfg(test)]
mod tests {
    use super::*;

    /// Test that the default configuration is valid and has expected values.
    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.transcription.window_seconds, 25);
        assert!(config.storage.allowed_extensions.contains(&"wav".to_string()));
        assert!(config.validate().is_ok());
    }

    /// Test that validation catches invalid configurations.
    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.transcription.window_seconds = 31;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.storage.allowed_extensions.clear();
        assert!(config.validate().is_err());
    }

    /// Test the upload extension allow-list check.
    #[test]
    fn test_allowed_upload_extensions() {
        let config = AppConfig::default();
        assert!(config.is_allowed_upload("memo.wav"));
        assert!(config.is_allowed_upload("Recording.WEBM"));
        assert!(config.is_allowed_upload("a.b.m4a"));
        assert!(!config.is_allowed_upload("notes.txt"));
        assert!(!config.is_allowed_upload("noextension"));
        assert!(!config.is_allowed_upload(".wav"));
        assert!(!config.is_allowed_upload("trailingdot."));
    }

    /// Test the byte-size derivation from the megabyte cap.
    #[test]
    fn test_max_upload_bytes() {
        let mut config = AppConfig::default();
        config.storage.max_upload_mb = 2;
        assert_eq!(config.max_upload_bytes(), 2 * 1024 * 1024);
    }
}
