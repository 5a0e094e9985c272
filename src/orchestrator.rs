//! Ties the catalog, the two engines and the output sink together.

use crate::backends::{BackendKind, SpeechBackend, Voice};
use crate::catalog::{RefreshReport, VoiceCatalog};
use crate::error::{FetchError, OrchestrationError};
use crate::storage::AudioSink;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Result of a successful `speak`.
#[derive(Debug, Clone)]
pub struct SpeakOutcome {
    pub voice: Voice,
    pub path: PathBuf,
    pub bytes_written: usize,
    pub wav: Option<crate::backends::WavSummary>,
}

pub struct SynthesisOrchestrator {
    catalog: Arc<VoiceCatalog>,
    prosody: Arc<dyn SpeechBackend>,
    direct: Arc<dyn SpeechBackend>,
    sink: Arc<dyn AudioSink>,
    // Held for the whole of one `speak`; a second caller is turned away.
    busy: Mutex<()>,
}

impl SynthesisOrchestrator {
    pub fn new(
        catalog: Arc<VoiceCatalog>,
        prosody: Arc<dyn SpeechBackend>,
        direct: Arc<dyn SpeechBackend>,
        sink: Arc<dyn AudioSink>,
    ) -> Self {
        Self {
            catalog,
            prosody,
            direct,
            sink,
            busy: Mutex::new(()),
        }
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    fn backend(&self, kind: BackendKind) -> &dyn SpeechBackend {
        match kind {
            BackendKind::Prosody => self.prosody.as_ref(),
            BackendKind::Direct => self.direct.as_ref(),
        }
    }

    /// Reloads the catalog from both engines (KoeiroInk first, then VOICEVOX).
    pub async fn refresh_catalog(&self) -> Result<RefreshReport, FetchError> {
        self.catalog
            .refresh(&[self.prosody.as_ref(), self.direct.as_ref()])
            .await
    }

    /// Synthesizes `text` with the voice named `label` and writes the audio.
    pub async fn speak(&self, label: &str, text: &str) -> Result<SpeakOutcome, OrchestrationError> {
        let _guard = self
            .busy
            .try_lock()
            .map_err(|_| OrchestrationError::Busy)?;

        let voice = self.catalog.lookup(label).ok_or_else(|| {
            error!(label, "Voice label not in catalog");
            OrchestrationError::LabelNotFound(label.to_string())
        })?;

        info!(label, backend = %voice.backend, chars = text.chars().count(), "Dispatching synthesis");
        let audio = self
            .backend(voice.backend)
            .synthesize(&voice, text)
            .await
            .map_err(|e| {
                error!(label, error = %e, "Synthesis failed");
                OrchestrationError::from(e)
            })?;

        let path = self.sink.write(&audio).await.map_err(|e| {
            error!(label, error = %e, "Could not store audio");
            OrchestrationError::from(e)
        })?;

        info!(label, path = %path.display(), bytes = audio.len(), "Speech saved");
        Ok(SpeakOutcome {
            voice,
            path,
            bytes_written: audio.len(),
            wav: audio.wav_summary(),
        })
    }
}
