use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

const MAX_MEDIA_SIZE: usize = 20 * 1024 * 1024; // 20MB

/// Public store for re-hosted agent attachments.
///
/// Chatwoot attachment URLs require the API token, so agent media is pulled
/// once, written under `dir`, and served back to Twilio at
/// `{public_base_url}/{filename}`.
pub struct MediaStore {
    dir: PathBuf,
    public_base_url: String,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: &str) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create media directory: {}", dir.display()))?;
        Ok(Self {
            dir,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Write attachment bytes under a collision-resistant generated filename
    /// and return the public URL Twilio should fetch.
    pub fn save(&self, bytes: &[u8], source_url: &str) -> Result<String> {
        if bytes.is_empty() {
            bail!("empty media data");
        }
        if bytes.len() > MAX_MEDIA_SIZE {
            bail!(
                "media too large: {} bytes (max {})",
                bytes.len(),
                MAX_MEDIA_SIZE
            );
        }

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let random = fastrand::u32(..);
        let filename = format!(
            "agent_{timestamp}_{random:08x}_{}",
            sanitize_basename(source_url)
        );
        let path = self.dir.join(&filename);
        std::fs::write(&path, bytes)
            .with_context(|| format!("failed to write media file: {}", path.display()))?;

        Ok(format!("{}/{}", self.public_base_url, filename))
    }

    /// Resolve a requested filename to a path inside the media directory.
    /// Rejects anything that could escape it.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return None;
        }
        let path = self.dir.join(name);
        path.is_file().then_some(path)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Last path segment of a URL, restricted to a filesystem-safe alphabet and
/// bounded length. Falls back to "file" when nothing usable remains.
fn sanitize_basename(source_url: &str) -> String {
    let base = source_url
        .split(['?', '#'])
        .next()
        .unwrap_or(source_url)
        .rsplit('/')
        .next()
        .unwrap_or("");
    let safe: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .take(64)
        .collect();
    if safe.is_empty() || safe.chars().all(|c| c == '.') {
        "file".to_string()
    } else {
        safe
    }
}
