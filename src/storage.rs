use crate::backends::AudioBytes;
use crate::error::StorageError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Destination for synthesized audio.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Persists `audio` and returns where it went.
    async fn write(&self, audio: &AudioBytes) -> Result<PathBuf, StorageError>;
}

/// Writes every result to one fixed file, replacing what was there.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<target>.<pid>.part`: another process aiming at the same target
    /// stages into its own file, and the last rename wins.
    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}.part", std::process::id()));
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl AudioSink for FileSink {
    async fn write(&self, audio: &AudioBytes) -> Result<PathBuf, StorageError> {
        let io_err = |source: std::io::Error| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        // Stage next to the target so the rename stays on one filesystem.
        let staging = self.staging_path();
        if let Err(e) = tokio::fs::write(&staging, audio.as_slice()).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(io_err(e));
        }
        if let Err(e) = tokio::fs::rename(&staging, &self.path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(io_err(e));
        }

        tracing::debug!(path = %self.path.display(), bytes = audio.len(), "Audio written");
        Ok(self.path.clone())
    }
}

/// `<dir>/kowairo-YYYYmmdd-HHMMSS.wav` for the current local time.
pub fn timestamped_path(dir: &Path) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("kowairo-{}.wav", stamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("test.wav");
        std::fs::write(&target, b"old audio that is longer").unwrap();

        let sink = FileSink::new(&target);
        let written = assert_ok!(sink.write(&AudioBytes(b"new".to_vec())).await);

        assert_eq!(written, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("test.wav")]);
    }

    #[tokio::test]
    async fn test_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("Downloads").join("test.wav");

        let sink = FileSink::new(&target);
        assert_ok!(sink.write(&AudioBytes(vec![1, 2, 3])).await);
        assert_eq!(std::fs::read(&target).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_target_untouched() {
        let dir = tempdir().unwrap();
        // A directory sitting at the target path makes the rename fail.
        let target = dir.path().join("test.wav");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();

        let sink = FileSink::new(&target);
        let err = sink.write(&AudioBytes(vec![9; 16])).await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        assert!(target.is_dir());
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("test.wav")]);
    }

    #[test]
    fn test_staging_name_is_per_process() {
        let sink = FileSink::new("/tmp/out/test.wav");
        let staging = sink.staging_path();
        assert_eq!(staging.parent(), Some(Path::new("/tmp/out")));
        assert_eq!(
            staging.file_name().unwrap().to_string_lossy(),
            format!("test.wav.{}.part", std::process::id())
        );
    }

    #[test]
    fn test_timestamped_path_shape() {
        let path = timestamped_path(Path::new("/tmp/out"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("kowairo-"));
        assert!(name.ends_with(".wav"));
        assert_eq!(name.len(), "kowairo-20261017-101500.wav".len());
        assert_eq!(path.parent(), Some(Path::new("/tmp/out")));
    }
}
