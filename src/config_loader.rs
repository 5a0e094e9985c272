use config::{Config, File};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_KOEIROINK_URL: &str = "http://localhost:50032";
pub const DEFAULT_VOICEVOX_URL: &str = "http://localhost:50021";
pub const DEFAULT_OUTPUT_FILE: &str = "test.wav";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    // Engine endpoints
    pub koeiroink_url: String,
    pub voicevox_url: String,
    // Per-request timeouts
    pub catalog_timeout_ms: u64,
    pub prosody_synthesis_timeout_secs: u64,
    pub voicevox_timeout_secs: u64,
    // Where synthesized audio lands (overwritten on every success)
    pub output_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            koeiroink_url: DEFAULT_KOEIROINK_URL.to_string(),
            voicevox_url: DEFAULT_VOICEVOX_URL.to_string(),
            catalog_timeout_ms: 2000,
            prosody_synthesis_timeout_secs: 10,
            voicevox_timeout_secs: 30,
            output_path: default_output_path().to_string_lossy().into_owned(),
        }
    }
}

lazy_static! {
    /// Loaded once per process. A bad file or env value stays an error here
    /// so the binary can refuse to start.
    pub static ref SETTINGS: Result<Settings, config::ConfigError> = Settings::new();
}

/// `<downloads>/test.wav`, or `~/Downloads/test.wav` when the platform has no
/// downloads directory configured.
pub fn default_output_path() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_OUTPUT_FILE)
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let defaults = Settings::default();
        let builder = Config::builder()
            .set_default("koeiroink_url", defaults.koeiroink_url)?
            .set_default("voicevox_url", defaults.voicevox_url)?
            .set_default("catalog_timeout_ms", defaults.catalog_timeout_ms)?
            .set_default(
                "prosody_synthesis_timeout_secs",
                defaults.prosody_synthesis_timeout_secs,
            )?
            .set_default("voicevox_timeout_secs", defaults.voicevox_timeout_secs)?
            .set_default("output_path", defaults.output_path)?
            // Local config file (if exists)
            .add_source(File::with_name("Kowairo").required(false))
            .add_source(
                File::with_name(&format!(
                    "{}/.config/kowairo-ink/Kowairo",
                    dirs::home_dir().unwrap_or_default().display()
                ))
                .required(false),
            )
            // e.g. KOWAIRO_VOICEVOX_URL
            .add_source(config::Environment::with_prefix("KOWAIRO").try_parsing(true));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        for (key, url) in [
            ("koeiroink_url", &self.koeiroink_url),
            ("voicevox_url", &self.voicevox_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(config::ConfigError::Message(format!(
                    "Invalid {}: {}. Must be an http(s) URL",
                    key, url
                )));
            }
        }
        if self.catalog_timeout_ms == 0
            || self.prosody_synthesis_timeout_secs == 0
            || self.voicevox_timeout_secs == 0
        {
            return Err(config::ConfigError::Message(
                "timeouts must be greater than 0".to_string(),
            ));
        }
        if self.output_path.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "output_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }

    pub fn prosody_synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.prosody_synthesis_timeout_secs)
    }

    pub fn voicevox_timeout(&self) -> Duration {
        Duration::from_secs(self.voicevox_timeout_secs)
    }
}
