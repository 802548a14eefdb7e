use anyhow::Context;
use chrono::Utc;
use log::{debug, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

const FALLBACK_EXTENSION: &str = "bin";

/// Profile pictures on local disk, laid out as `<root>/<owner>/<millis>.<ext>`
/// and served under `public_base_url`.
#[derive(Debug, Clone)]
pub struct PictureStorage {
    root: PathBuf,
    public_base_url: String,
}

fn safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn extension_of(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// Media type for a raster picture name. Anything else, SVG included, is
/// neither stored nor served.
pub fn picture_type(file_name: &str) -> Option<&'static str> {
    match extension_of(file_name).as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

async fn discard(file: tokio::fs::File, path: &Path) {
    drop(file);
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("Could not remove partial picture {}: {e}", path.display());
    }
}

impl PictureStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        PictureStorage {
            root: root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Write `bytes` under a fresh name and return its public URL. Only the
    /// extension of `file_name` is kept.
    pub async fn store(&self, owner: &str, file_name: &str, bytes: &[u8]) -> anyhow::Result<String> {
        anyhow::ensure!(safe_segment(owner), "invalid owner id {owner:?}");
        anyhow::ensure!(!bytes.is_empty(), "picture is empty");
        anyhow::ensure!(
            picture_type(file_name).is_some(),
            "unsupported picture type {file_name:?}"
        );

        let dir = self.root.join(owner);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let stem = Utc::now().timestamp_millis();
        let ext = extension_of(file_name);
        let mut attempt = 0u32;
        loop {
            let name = if attempt == 0 {
                format!("{stem}.{ext}")
            } else {
                format!("{stem}-{attempt}.{ext}")
            };
            let path = dir.join(&name);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    let written = match file.write_all(bytes).await {
                        Ok(()) => file.flush().await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = written {
                        discard(file, &path).await;
                        return Err(e).with_context(|| format!("failed to write {}", path.display()));
                    }
                    debug!("Stored picture {} ({} bytes)", path.display(), bytes.len());
                    return Ok(format!("{}/{owner}/{name}", self.public_base_url));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to create {}", path.display()));
                }
            }
        }
    }

    /// The stored bytes, or `None` when there is no such picture.
    pub async fn read(&self, owner: &str, name: &str) -> anyhow::Result<Option<Vec<u8>>> {
        if !safe_segment(owner) || !safe_segment(name) {
            return Ok(None);
        }
        match tokio::fs::read(self.root.join(owner).join(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("failed to read picture"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stored_picture_can_be_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PictureStorage::new(dir.path(), "http://localhost:8080/pictures/");

        let first = storage.store("alice", "Me.PNG", b"png-bytes").await.unwrap();
        let second = storage.store("alice", "me.png", b"other").await.unwrap();

        assert!(first.starts_with("http://localhost:8080/pictures/alice/"));
        assert!(first.ends_with(".png"));
        assert_ne!(first, second);

        let name = first.rsplit('/').next().unwrap();
        assert_eq!(
            storage.read("alice", name).await.unwrap().as_deref(),
            Some(&b"png-bytes"[..])
        );
    }

    #[tokio::test]
    async fn rejects_unsafe_input() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PictureStorage::new(dir.path(), "http://pics");

        assert!(storage.store("../evil", "x.png", b"x").await.is_err());
        assert!(storage.store("alice", "x.png", b"").await.is_err());
        assert_eq!(storage.read("..", "passwd").await.unwrap(), None);
        assert_eq!(storage.read("alice", "missing.png").await.unwrap(), None);
    }

    #[test]
    fn extension_and_picture_type() {
        assert_eq!(extension_of("photo.JPEG"), "jpeg");
        assert_eq!(extension_of("no-extension"), FALLBACK_EXTENSION);
        assert_eq!(extension_of("weird.p$g"), FALLBACK_EXTENSION);
        assert_eq!(picture_type("a.jpg"), Some("image/jpeg"));
        assert_eq!(picture_type("a.WEBP"), Some("image/webp"));
        assert_eq!(picture_type("a.tiff"), None);
        assert_eq!(picture_type("a.svg"), None);
        assert_eq!(picture_type("a.html"), None);
    }

    #[tokio::test]
    async fn scriptable_pictures_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PictureStorage::new(dir.path(), "http://pics");

        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg"><script>alert(1)</script></svg>"#;
        assert!(storage.store("alice", "me.svg", svg).await.is_err());
        assert!(storage.store("alice", "me", b"x").await.is_err());
        assert!(!dir.path().join("alice").exists());
    }

    #[tokio::test]
    async fn partial_picture_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.png");
        let file = tokio::fs::File::create(&path).await.unwrap();

        discard(file, &path).await;
        assert!(!path.exists());
    }
}
