use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use uuid::Uuid;

use crate::services::encryption;

/// A file pulled out of a multipart body along with its text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct UploadedFile {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> anyhow::Result<Self> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            if name == "file" {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&filename)
                            .first_or_octet_stream()
                            .to_string()
                    });
                let bytes = field.bytes().await?.to_vec();
                form.file = Some(UploadedFile { bytes, filename, content_type });
            } else {
                form.fields.push((name, field.text().await?));
            }
        }
        Ok(form)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Encrypts `bytes` and writes them under `<media_dir>/<kind>/`. Returns the
/// path relative to `media_dir`.
pub async fn store_encrypted(
    media_dir: &str,
    kind: &str,
    original_filename: &str,
    bytes: &[u8],
    key: &[u8; 32],
) -> anyhow::Result<String> {
    let dir = PathBuf::from(media_dir).join(kind);
    tokio::fs::create_dir_all(&dir).await?;

    let ext = safe_extension(original_filename);
    let storage_filename = format!("{}.{}.enc", Uuid::new_v4(), ext);
    let blob = encryption::seal(bytes, key)?;
    tokio::fs::write(dir.join(&storage_filename), blob).await?;

    Ok(format!("{kind}/{storage_filename}"))
}

pub async fn load_decrypted(media_dir: &str, rel_path: &str, key: &[u8; 32]) -> anyhow::Result<Vec<u8>> {
    let blob = tokio::fs::read(resolve(media_dir, rel_path)?).await?;
    encryption::open(&blob, key)
}

/// Best-effort removal; a missing file is not an error.
pub async fn remove(media_dir: &str, rel_path: &str) {
    if let Ok(path) = resolve(media_dir, rel_path) {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to remove {}: {e}", path.display());
            }
        }
    }
}

/// Stored paths come from the database, but still refuse anything that could
/// escape the media directory.
fn resolve(media_dir: &str, rel_path: &str) -> anyhow::Result<PathBuf> {
    let rel = Path::new(rel_path);
    let escapes = rel.is_absolute()
        || rel
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)));
    if escapes {
        anyhow::bail!("Invalid storage path");
    }
    Ok(PathBuf::from(media_dir).join(rel))
}

fn safe_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_extension() {
        assert_eq!(safe_extension("Diploma.PDF"), "pdf");
        assert_eq!(safe_extension("noext"), "bin");
        assert_eq!(safe_extension("evil.p/h"), "bin");
        assert_eq!(safe_extension("archive.verylongextension"), "bin");
    }

    #[test]
    fn test_resolve_rejects_escape() {
        assert!(resolve("/data", "documents/a.pdf.enc").is_ok());
        assert!(resolve("/data", "../etc/passwd").is_err());
        assert!(resolve("/data", "/etc/passwd").is_err());
        assert!(resolve("/data", "documents/../../x").is_err());
    }

    #[tokio::test]
    async fn test_store_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("schoolhub-storage-{}", Uuid::new_v4()));
        let media_dir = dir.to_string_lossy().to_string();
        let key = [7u8; 32];

        let rel = store_encrypted(&media_dir, "documents", "id.png", b"png-bytes", &key)
            .await
            .unwrap();
        assert!(rel.starts_with("documents/") && rel.ends_with(".png.enc"));

        let on_disk = tokio::fs::read(dir.join(&rel)).await.unwrap();
        assert_ne!(on_disk, b"png-bytes");
        assert_eq!(load_decrypted(&media_dir, &rel, &key).await.unwrap(), b"png-bytes");

        remove(&media_dir, &rel).await;
        assert!(load_decrypted(&media_dir, &rel, &key).await.is_err());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
