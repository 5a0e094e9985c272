//! Label → voice lookup table built from every engine's speaker list.

use crate::backends::{BackendKind, SpeechBackend, Voice};
use crate::error::FetchError;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Immutable view of the catalog at one point in time.
#[derive(Debug, Default, Clone)]
pub struct CatalogSnapshot {
    voices: HashMap<String, Voice>,
}

impl CatalogSnapshot {
    pub fn get(&self, label: &str) -> Option<&Voice> {
        self.voices.get(label)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Labels in sorted order, as presented to the user.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.voices.keys().cloned().collect();
        labels.sort();
        labels
    }
}

/// What happened during one `refresh`.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub voices: usize,
    pub collisions: usize,
    pub failures: Vec<FetchError>,
}

#[derive(Default)]
pub struct VoiceCatalog {
    current: RwLock<Arc<CatalogSnapshot>>,
}

impl VoiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        match self.current.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn lookup(&self, label: &str) -> Option<Voice> {
        self.snapshot().get(label).cloned()
    }

    pub fn labels(&self) -> Vec<String> {
        self.snapshot().labels()
    }

    /// Builds a snapshot from `voices` and swaps it in. Later entries win on
    /// a label collision. Returns the number of overwritten labels.
    pub fn replace(&self, voices: impl IntoIterator<Item = Voice>) -> usize {
        let mut table = HashMap::new();
        let mut collisions = 0;
        for voice in voices {
            let label = voice.label();
            if let Some(previous) = table.insert(label.clone(), voice) {
                collisions += 1;
                warn!(
                    label = %label,
                    replaced = %previous.backend,
                    "Voice label collision; keeping the later voice"
                );
            }
        }

        let snapshot = Arc::new(CatalogSnapshot { voices: table });
        match self.current.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
        collisions
    }

    /// Queries every backend in order and installs the merged result.
    ///
    /// A backend that fails is skipped. The old snapshot is kept only when
    /// every backend fails.
    pub async fn refresh(
        &self,
        backends: &[&dyn SpeechBackend],
    ) -> Result<RefreshReport, FetchError> {
        let mut voices = Vec::new();
        let mut failures = Vec::new();

        for backend in backends {
            match backend.list_voices().await {
                Ok(list) => {
                    info!(backend = %backend.kind(), count = list.len(), "Fetched voices");
                    voices.extend(list);
                }
                Err(e) => {
                    warn!(backend = %backend.kind(), error = %e, "Voice list unavailable");
                    failures.push(e);
                }
            }
        }

        if !backends.is_empty() && failures.len() == backends.len() {
            return Err(FetchError::AllBackendsFailed);
        }

        let collisions = self.replace(voices);
        let report = RefreshReport {
            voices: self.snapshot().len(),
            collisions,
            failures,
        };
        info!(voices = report.voices, collisions, "Voice catalog refreshed");
        Ok(report)
    }
}
