//! Storage for job inputs and results
//!
//! The engine never touches artifact storage directly beyond the [`ArtifactStore`]
//! trait, so object-storage backends can be swapped in by embedders. The bundled
//! [`LocalArtifactStore`] keeps everything under one directory.

use crate::error::{Error, Result};
use crate::types::{JobId, JobKind};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Input bytes handed to a provider at submit time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputArtifact {
    /// Reference the caller supplied
    pub reference: String,
    /// File name sent in multipart uploads
    pub file_name: String,
    /// Raw content
    pub bytes: Vec<u8>,
}

/// Persists results and resolves input references
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store a staged result file and return its reference
    async fn put(&self, job_id: JobId, kind: JobKind, staged: &Path) -> Result<String>;

    /// Retrievable URL for a stored reference
    fn url(&self, reference: &str) -> String;

    /// Delete a stored result; deleting a missing one succeeds
    async fn remove(&self, reference: &str) -> Result<()>;

    /// Load an uploaded input
    async fn read_input(&self, reference: &str) -> Result<InputArtifact>;
}

/// Filesystem-backed artifact store
///
/// Results land in `<root>/<kind>/<job_id>.<ext>`. Input references are paths
/// relative to `root` or `file://` URLs inside it; anything resolving outside the
/// root is refused.
#[derive(Clone, Debug)]
pub struct LocalArtifactStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalArtifactStore {
    /// Store rooted at `root`, creating it if needed
    pub async fn new(root: impl Into<PathBuf>, public_base_url: Option<String>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn stored_path(&self, reference: &str) -> Result<PathBuf> {
        confined(Path::new(reference))
            .map(|relative| self.root.join(relative))
            .ok_or_else(|| Error::NotFound(format!("artifact {reference}")))
    }

    /// Resolve an input reference to a file under `root`
    ///
    /// `file://` URLs must point inside the root; plain references are relative to it.
    fn input_path(&self, reference: &str) -> Result<PathBuf> {
        let rejected = || Error::NotFound(format!("input {reference}"));

        if reference.starts_with("file://") {
            let path = url::Url::parse(reference)
                .ok()
                .and_then(|url| url.to_file_path().ok())
                .ok_or_else(rejected)?;
            let root = std::path::absolute(&self.root)?;
            let relative = path.strip_prefix(&root).map_err(|_| rejected())?;
            return confined(relative)
                .map(|relative| root.join(relative))
                .ok_or_else(rejected);
        }

        confined(Path::new(reference))
            .map(|relative| self.root.join(relative))
            .ok_or_else(rejected)
    }
}

/// `path` when it is relative and never climbs out of its base directory
fn confined(path: &Path) -> Option<&Path> {
    let escapes = path.components().any(|c| {
        !matches!(
            c,
            std::path::Component::Normal(_) | std::path::Component::CurDir
        )
    });
    (!escapes && path.components().next().is_some()).then_some(path)
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn put(&self, job_id: JobId, kind: JobKind, staged: &Path) -> Result<String> {
        let reference = format!("{}/{}.{}", kind.as_str(), job_id, kind.result_extension());
        let dest = self.root.join(&reference);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(staged, &dest).await?;
        tracing::debug!(job_id = job_id.0, path = %dest.display(), "Stored result artifact");
        Ok(reference)
    }

    fn url(&self, reference: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/{reference}"),
            None => {
                let path = self.root.join(reference);
                let absolute = std::path::absolute(&path).unwrap_or(path);
                url::Url::from_file_path(&absolute)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|()| absolute.display().to_string())
            }
        }
    }

    async fn remove(&self, reference: &str) -> Result<()> {
        let path = self.stored_path(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_input(&self, reference: &str) -> Result<InputArtifact> {
        let path = self.input_path(reference)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("input {reference}"))
            } else {
                Error::Io(e)
            }
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        Ok(InputArtifact {
            reference: reference.to_string(),
            file_name,
            bytes,
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_copies_into_kind_directory() {
        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(dir.path().join("artifacts"), None)
            .await
            .unwrap();
        let staged = dir.path().join("staged.bin");
        std::fs::write(&staged, b"audio").unwrap();

        let reference = store.put(JobId(9), JobKind::MusicGen, &staged).await.unwrap();

        assert_eq!(reference, "music_gen/9.mp3");
        let stored = dir.path().join("artifacts/music_gen/9.mp3");
        assert_eq!(std::fs::read(stored).unwrap(), b"audio");
        assert!(staged.exists(), "put copies, the caller owns the staged file");
    }

    #[tokio::test]
    async fn test_url_uses_public_base_when_configured() {
        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(dir.path(), Some("https://cdn.example.com/r/".into()))
            .await
            .unwrap();
        assert_eq!(
            store.url("face_swap/1.mp4"),
            "https://cdn.example.com/r/face_swap/1.mp4"
        );
    }

    #[tokio::test]
    async fn test_url_falls_back_to_file_url() {
        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(dir.path(), None).await.unwrap();
        let url = store.url("sheet_gen/3.musicxml");
        assert!(url.starts_with("file://"), "{url}");
        assert!(url.ends_with("sheet_gen/3.musicxml"), "{url}");
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(dir.path(), None).await.unwrap();
        let staged = dir.path().join("s");
        std::fs::write(&staged, b"x").unwrap();
        let reference = store.put(JobId(1), JobKind::OutfitMerge, &staged).await.unwrap();

        store.remove(&reference).await.unwrap();
        store.remove(&reference).await.unwrap();
        assert!(!dir.path().join(&reference).exists());
    }

    #[tokio::test]
    async fn test_remove_rejects_escaping_references() {
        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(dir.path(), None).await.unwrap();
        assert!(store.remove("../outside").await.is_err());
    }

    #[tokio::test]
    async fn test_read_input_resolves_relative_and_file_urls() {
        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(dir.path(), None).await.unwrap();
        std::fs::create_dir_all(dir.path().join("uploads")).unwrap();
        let face = dir.path().join("uploads/face.png");
        std::fs::write(&face, b"png").unwrap();

        let relative = store.read_input("uploads/face.png").await.unwrap();
        assert_eq!(relative.bytes, b"png");
        assert_eq!(relative.file_name, "face.png");

        let file_url = url::Url::from_file_path(&face).unwrap().to_string();
        let via_url = store.read_input(&file_url).await.unwrap();
        assert_eq!(via_url.bytes, b"png");
    }

    #[tokio::test]
    async fn test_read_input_stays_inside_the_root() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("artifacts");
        let store = LocalArtifactStore::new(&root, None).await.unwrap();
        let secret = dir.path().join("secret.txt");
        std::fs::write(&secret, b"TOP-SECRET").unwrap();
        let secret_url = url::Url::from_file_path(&secret).unwrap().to_string();
        let sneaky_url = url::Url::from_file_path(&root).unwrap().to_string() + "/../secret.txt";

        for reference in [
            "../secret.txt",
            "uploads/../../secret.txt",
            secret.to_str().unwrap(),
            "/etc/hostname",
            secret_url.as_str(),
            sneaky_url.as_str(),
            "",
        ] {
            assert!(
                matches!(store.read_input(reference).await, Err(Error::NotFound(_))),
                "{reference} was readable"
            );
        }
    }

    #[tokio::test]
    async fn test_read_missing_input_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::new(dir.path(), None).await.unwrap();
        assert!(matches!(
            store.read_input("nope.png").await,
            Err(Error::NotFound(_))
        ));
    }
}
