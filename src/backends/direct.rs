//! VOICEVOX client: `/audio_query` then `/synthesis`.

use super::{get_json, AudioBytes, BackendKind, SpeechBackend, Voice};
use crate::config_loader::Settings;
use crate::error::{FetchError, SynthesisError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info};

/// Speed the engine is always asked to render at, whatever the query proposed.
pub const FORCED_SPEED_SCALE: f32 = 1.0;

#[derive(Debug, Deserialize)]
struct Speaker {
    #[serde(default)]
    supported_features: Option<SupportedFeatures>,
    name: String,
    speaker_uuid: String,
    styles: Vec<Style>,
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct SupportedFeatures {
    #[serde(default)]
    permitted_synthesis_morphing: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Style {
    name: String,
    id: i64,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    text: &'a str,
    speaker: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mora {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consonant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consonant_length: Option<f32>,
    pub vowel: String,
    pub vowel_length: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccentPhrase {
    pub moras: Vec<Mora>,
    pub accent: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_mora: Option<Mora>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_interrogative: Option<bool>,
}

/// Full synthesis parameters as returned by `/audio_query`.
///
/// Fields this crate does not model are kept in `extra` and sent back as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioQuery {
    pub accent_phrases: Vec<AccentPhrase>,
    #[serde(rename = "speedScale")]
    pub speed_scale: f32,
    #[serde(rename = "pitchScale")]
    pub pitch_scale: f32,
    #[serde(rename = "intonationScale")]
    pub intonation_scale: f32,
    #[serde(rename = "volumeScale")]
    pub volume_scale: f32,
    #[serde(rename = "prePhonemeLength")]
    pub pre_phoneme_length: f32,
    #[serde(rename = "postPhonemeLength")]
    pub post_phoneme_length: f32,
    #[serde(rename = "outputSamplingRate")]
    pub output_sampling_rate: u32,
    #[serde(rename = "outputStereo")]
    pub output_stereo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kana: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AudioQuery {
    pub fn normalize(&mut self) {
        self.speed_scale = FORCED_SPEED_SCALE;
    }
}

#[derive(Clone)]
pub struct DirectSynthesisClient {
    client: Client,
    base_url: String,
    catalog_timeout: Duration,
    timeout: Duration,
}

impl DirectSynthesisClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let defaults = Settings::default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            catalog_timeout: defaults.catalog_timeout(),
            timeout: defaults.voicevox_timeout(),
        }
    }

    pub fn from_settings(client: Client, settings: &Settings) -> Self {
        Self::new(client, settings.voicevox_url.clone())
            .with_timeouts(settings.catalog_timeout(), settings.voicevox_timeout())
    }

    pub fn with_timeouts(mut self, catalog: Duration, synthesis: Duration) -> Self {
        self.catalog_timeout = catalog;
        self.timeout = synthesis;
        self
    }

    pub async fn audio_query(&self, style_id: i64, text: &str) -> Result<AudioQuery, SynthesisError> {
        let url = format!("{}/audio_query", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("text", text.to_string()), ("speaker", style_id.to_string())])
            .json(&QueryRequest {
                text,
                speaker: style_id,
            })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SynthesisError::QueryBuildFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SynthesisError::QueryBuildFailed(format!(
                "HTTP {}",
                resp.status()
            )));
        }

        resp.json::<AudioQuery>()
            .await
            .map_err(|e| SynthesisError::QueryBuildFailed(e.to_string()))
    }

    async fn render(&self, style_id: i64, query: &AudioQuery) -> Result<AudioBytes, SynthesisError> {
        let url = format!("{}/synthesis", self.base_url);
        let resp = self
            .client
            .post(&url)
            .query(&[("speaker", style_id)])
            .json(query)
            .timeout(self.timeout)
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
impl SpeechBackend for DirectSynthesisClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Direct
    }

    async fn list_voices(&self) -> Result<Vec<Voice>, FetchError> {
        let url = format!("{}/speakers", self.base_url);
        let speakers: Vec<Speaker> =
            get_json(&self.client, BackendKind::Direct, &url, self.catalog_timeout).await?;

        let mut voices = Vec::new();
        for speaker in speakers {
            let morphing = speaker
                .supported_features
                .as_ref()
                .and_then(|f| f.permitted_synthesis_morphing.as_deref())
                .unwrap_or("UNKNOWN");
            debug!(speaker = %speaker.name, version = %speaker.version, morphing, "VOICEVOX speaker");
            for style in speaker.styles {
                voices.push(Voice {
                    backend: BackendKind::Direct,
                    speaker_uuid: speaker.speaker_uuid.clone(),
                    speaker_name: speaker.name.clone(),
                    style_id: style.id,
                    style_name: style.name,
                });
            }
        }
        Ok(voices)
    }

    async fn synthesize(&self, voice: &Voice, text: &str) -> Result<AudioBytes, SynthesisError> {
        let mut query = self.audio_query(voice.style_id, text).await?;
        if query.speed_scale != FORCED_SPEED_SCALE {
            debug!(proposed = query.speed_scale, "Overriding proposed speedScale");
        }
        query.normalize();

        let audio = self.render(voice.style_id, &query).await?;
        info!(voice = %voice.label(), bytes = audio.len(), "VOICEVOX synthesis complete");
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn voice() -> Voice {
        Voice {
            backend: BackendKind::Direct,
            speaker_uuid: "7ffcb7ce".into(),
            speaker_name: "ずんだもん".into(),
            style_id: 3,
            style_name: "ノーマル".into(),
        }
    }

    fn query_body(speed: f64) -> String {
        json!({
            "accent_phrases": [{
                "moras": [
                    {"text": "コ", "consonant": "k", "consonant_length": 0.05,
                     "vowel": "o", "vowel_length": 0.1, "pitch": 5.8},
                    {"text": "ン", "consonant": null, "consonant_length": null,
                     "vowel": "N", "vowel_length": 0.08, "pitch": 5.9}
                ],
                "accent": 5,
                "pause_mora": null,
                "is_interrogative": false
            }],
            "speedScale": speed,
            "pitchScale": 0.0,
            "intonationScale": 1.0,
            "volumeScale": 1.0,
            "prePhonemeLength": 0.1,
            "postPhonemeLength": 0.1,
            "pauseLengthScale": 1.0,
            "outputSamplingRate": 24000,
            "outputStereo": false,
            "kana": "コ'ン"
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_list_voices() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/speakers")
            .with_status(200)
            .with_body(
                json!([{
                    "supported_features": {"permitted_synthesis_morphing": "SELF_ONLY"},
                    "name": "ずんだもん",
                    "speaker_uuid": "7ffcb7ce",
                    "styles": [{"name": "ノーマル", "id": 3}, {"name": "あまあま", "id": 1}],
                    "version": "0.14.0"
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let client = DirectSynthesisClient::new(Client::new(), server.url());
        let voices = client.list_voices().await.unwrap();
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].label(), "ずんだもん(ノーマル)");
        assert_eq!(voices[1].style_id, 1);
        assert!(voices.iter().all(|v| v.backend == BackendKind::Direct));
    }

    #[tokio::test]
    async fn test_speed_scale_forced_to_one() {
        let mut server = mockito::Server::new_async().await;
        let query = server
            .mock("POST", "/audio_query")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("text".into(), "こんにちは world".into()),
                Matcher::UrlEncoded("speaker".into(), "3".into()),
            ]))
            .match_body(Matcher::Json(json!({"text": "こんにちは world", "speaker": 3})))
            .with_status(200)
            .with_body(query_body(2.5))
            .expect(1)
            .create_async()
            .await;
        let synth = server
            .mock("POST", "/synthesis")
            .match_query(Matcher::UrlEncoded("speaker".into(), "3".into()))
            .match_body(Matcher::PartialJson(json!({
                "speedScale": 1.0,
                "pauseLengthScale": 1.0,
                "kana": "コ'ン"
            })))
            .with_status(200)
            .with_body(b"RIFF-voicevox")
            .expect(1)
            .create_async()
            .await;

        let client = DirectSynthesisClient::new(Client::new(), server.url());
        let audio = client.synthesize(&voice(), "こんにちは world").await.unwrap();
        assert_eq!(audio.as_slice(), b"RIFF-voicevox");
        query.assert_async().await;
        synth.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_failure_skips_synthesis() {
        let mut server = mockito::Server::new_async().await;
        let _query = server
            .mock("POST", "/audio_query")
            .match_query(Matcher::Any)
            .with_status(422)
            .with_body(r#"{"detail":"bad speaker"}"#)
            .create_async()
            .await;
        let synth = server
            .mock("POST", "/synthesis")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = DirectSynthesisClient::new(Client::new(), server.url());
        let err = client.synthesize(&voice(), "hello").await.unwrap_err();
        assert!(matches!(err, SynthesisError::QueryBuildFailed(_)));
        synth.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_200_is_synthesis_failure() {
        let mut server = mockito::Server::new_async().await;
        let _query = server
            .mock("POST", "/audio_query")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(query_body(1.0))
            .create_async()
            .await;
        let _synth = server
            .mock("POST", "/synthesis")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let client = DirectSynthesisClient::new(Client::new(), server.url());
        let err = client.synthesize(&voice(), "hello").await.unwrap_err();
        assert!(matches!(err, SynthesisError::SynthesisFailed(_)));
    }

    #[test]
    fn test_absent_optionals_are_omitted() {
        let mut query: AudioQuery = serde_json::from_str(&query_body(1.7)).unwrap();
        query.normalize();
        let value = serde_json::to_value(&query).unwrap();

        let nasal = &value["accent_phrases"][0]["moras"][1];
        assert!(nasal.get("consonant").is_none());
        assert!(value["accent_phrases"][0].get("pause_mora").is_none());
        assert_eq!(value["accent_phrases"][0]["is_interrogative"], json!(false));
        assert_eq!(value["speedScale"], json!(1.0));
        assert_eq!(value["pauseLengthScale"], json!(1.0));
    }
}
