pub mod direct;
pub mod prosody;

use crate::error::{FetchError, SynthesisError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt;
use std::io::Cursor;
use std::time::Duration;

pub use direct::DirectSynthesisClient;
pub use prosody::ProsodyClient;

/// Which engine a voice belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BackendKind {
    /// KoeiroInk: estimate prosody, then synthesize.
    Prosody,
    /// VOICEVOX: build an audio query, then synthesize.
    Direct,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Prosody => f.write_str("koeiroink"),
            BackendKind::Direct => f.write_str("voicevox"),
        }
    }
}

/// One speaker + style combination offered by an engine.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Voice {
    pub backend: BackendKind,
    pub speaker_uuid: String,
    pub speaker_name: String,
    pub style_id: i64,
    pub style_name: String,
}

impl Voice {
    /// The name shown to the user: `"{speaker}({style})"`.
    pub fn label(&self) -> String {
        format!("{}({})", self.speaker_name, self.style_name)
    }
}

/// Synthesized audio exactly as the engine returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBytes(pub Vec<u8>);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavSummary {
    pub channels: u16,
    pub sample_rate: u32,
    pub duration: Duration,
}

impl AudioBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Header details when the payload is a WAV container, `None` otherwise.
    pub fn wav_summary(&self) -> Option<WavSummary> {
        let reader = hound::WavReader::new(Cursor::new(self.as_slice())).ok()?;
        let spec = reader.spec();
        if spec.sample_rate == 0 {
            return None;
        }
        let frames = reader.duration() as f64;
        Some(WavSummary {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            duration: Duration::from_secs_f64(frames / spec.sample_rate as f64),
        })
    }
}

impl From<Vec<u8>> for AudioBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// A local speech engine reachable over HTTP.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Every voice the engine currently offers.
    async fn list_voices(&self) -> Result<Vec<Voice>, FetchError>;

    /// Runs the engine's two-step pipeline for `text` in `voice`.
    async fn synthesize(&self, voice: &Voice, text: &str) -> Result<AudioBytes, SynthesisError>;
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    backend: BackendKind,
    url: &str,
    timeout: Duration,
) -> Result<T, FetchError> {
    let resp = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|source| FetchError::Request { backend, source })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status { backend, status });
    }

    resp.json::<T>()
        .await
        .map_err(|source| FetchError::Decode { backend, source })
}
