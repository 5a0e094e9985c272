//! KoeiroInk client: `/v1/estimate_prosody` then `/v1/synthesis`.

use super::{get_json, AudioBytes, BackendKind, SpeechBackend, Voice};
use crate::config_loader::Settings;
use crate::error::{FetchError, SynthesisError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Speaker {
    speaker_name: String,
    speaker_uuid: String,
    styles: Vec<Style>,
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Style {
    style_name: String,
    style_id: i64,
}

#[derive(Debug, Serialize)]
struct EstimateRequest<'a> {
    text: &'a str,
}

/// One mora of the estimated reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProsodyMora {
    pub phoneme: String,
    pub hira: String,
    pub accent: i32,
}

/// Result of `/v1/estimate_prosody`: phrase groups of moras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProsodyBreakdown {
    pub plain: Vec<String>,
    pub detail: Vec<Vec<ProsodyMora>>,
}

/// Body of `/v1/synthesis`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProsodySynthesisRequest {
    pub speaker_uuid: String,
    pub style_id: i64,
    pub text: String,
    pub prosody_detail: Vec<Vec<ProsodyMora>>,
    pub speed_scale: f32,
    pub volume_scale: f32,
    pub pitch_scale: f32,
    pub intonation_scale: f32,
    pub pre_phoneme_length: f32,
    pub post_phoneme_length: f32,
    pub output_sampling_rate: u32,
}

impl ProsodySynthesisRequest {
    pub fn new(voice: &Voice, text: &str, breakdown: ProsodyBreakdown) -> Self {
        Self {
            speaker_uuid: voice.speaker_uuid.clone(),
            style_id: voice.style_id,
            text: text.to_string(),
            prosody_detail: breakdown.detail,
            speed_scale: 1.0,
            volume_scale: 1.0,
            pitch_scale: 0.0,
            intonation_scale: 1.0,
            pre_phoneme_length: 0.1,
            post_phoneme_length: 0.1,
            output_sampling_rate: 24000,
        }
    }
}

#[derive(Clone)]
pub struct ProsodyClient {
    client: Client,
    base_url: String,
    catalog_timeout: Duration,
    synthesis_timeout: Duration,
}

impl ProsodyClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let defaults = Settings::default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            catalog_timeout: defaults.catalog_timeout(),
            synthesis_timeout: defaults.prosody_synthesis_timeout(),
        }
    }

    pub fn from_settings(client: Client, settings: &Settings) -> Self {
        Self::new(client, settings.koeiroink_url.clone())
            .with_timeouts(settings.catalog_timeout(), settings.prosody_synthesis_timeout())
    }

    pub fn with_timeouts(mut self, catalog: Duration, synthesis: Duration) -> Self {
        self.catalog_timeout = catalog;
        self.synthesis_timeout = synthesis;
        self
    }

    pub async fn estimate_prosody(&self, text: &str) -> Result<ProsodyBreakdown, SynthesisError> {
        let url = format!("{}/v1/estimate_prosody", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&EstimateRequest { text })
            .timeout(self.synthesis_timeout)
            .send()
            .await
            .map_err(|e| SynthesisError::ProsodyEstimationFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SynthesisError::ProsodyEstimationFailed(format!(
                "HTTP {}",
                resp.status()
            )));
        }

        resp.json::<ProsodyBreakdown>()
            .await
            .map_err(|e| SynthesisError::ProsodyEstimationFailed(e.to_string()))
    }

    async fn render(&self, request: &ProsodySynthesisRequest) -> Result<AudioBytes, SynthesisError> {
        let url = format!("{}/v1/synthesis", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(request)
            .timeout(self.synthesis_timeout)
            .send()
            .await
            .map_err(|e| SynthesisError::SynthesisFailed(e.to_string()))?;

        if resp.status() != StatusCode::OK {
            return Err(SynthesisError::SynthesisFailed(format!(
                "HTTP {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SynthesisError::SynthesisFailed(e.to_string()))?;
        Ok(AudioBytes(bytes.to_vec()))
    }
}

#[async_trait]
impl SpeechBackend for ProsodyClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Prosody
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, FetchError> {
        let url = format!("{}/v1/speakers", self.base_url);
        let speakers: Vec<Speaker> =
            get_json(&self.client, BackendKind::Prosody, &url, self.catalog_timeout).await?;

        let mut voices = Vec::new();
        for speaker in speakers {
            debug!(speaker = %speaker.speaker_name, version = %speaker.version, "KoeiroInk speaker");
            for style in speaker.styles {
                voices.push(Voice {
                    backend: BackendKind::Prosody,
                    speaker_uuid: speaker.speaker_uuid.clone(),
                    speaker_name: speaker.speaker_name.clone(),
                    style_id: style.style_id,
                    style_name: style.style_name,
                });
            }
        }
        Ok(voices)
    }

    async fn synthesize(&self, voice: &Voice, text: &str) -> Result<AudioBytes, SynthesisError> {
        let breakdown = self.estimate_prosody(text).await?;
        debug!(phrases = breakdown.detail.len(), "Prosody estimated");

        let request = ProsodySynthesisRequest::new(voice, text, breakdown);
        let audio = self.render(&request).await?;
        info!(voice = %voice.label(), bytes = audio.len(), "KoeiroInk synthesis complete");
        Ok(audio)
    }
}
