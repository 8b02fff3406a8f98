use crate::{
    config::UploadConfig,
    error::{Result, StudioError},
    models::ImageUpload,
};
use std::path::PathBuf;
use uuid::Uuid;

pub const PUBLIC_PREFIX: &str = "/uploads";

/// Flat directory of user-supplied reference images.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            root: config.dir.clone(),
            max_bytes: config.max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Writes the image and returns its public path (`/uploads/<file>`).
    pub async fn save(&self, user_id: i64, upload: &ImageUpload) -> Result<String> {
        upload.validate(self.max_bytes)?;
        let extension = upload.extension().unwrap_or_else(|| "png".to_string());
        let suffix = Uuid::new_v4().simple().to_string();
        let filename = format!(
            "original-{}-{}-{}.{}",
            user_id,
            chrono::Utc::now().timestamp_millis(),
            &suffix[..8],
            extension
        );

        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(&filename), &upload.data).await?;
        log::debug!("Stored upload {} ({} bytes)", filename, upload.data.len());

        Ok(format!("{}/{}", PUBLIC_PREFIX, filename))
    }

    /// Deletes a file previously returned by [`UploadStore::save`].
    pub async fn remove(&self, public_url: &str) -> Result<()> {
        let filename = public_url
            .strip_prefix(PUBLIC_PREFIX)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| {
                !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\'])
            })
            .ok_or_else(|| StudioError::NotFound("File not found".to_string()))?;

        match tokio::fs::remove_file(self.root.join(filename)).await {
            Ok(()) => {
                log::debug!("Removed upload {}", filename);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads a stored file back with its content type.
    pub async fn read(&self, filename: &str) -> Result<(Vec<u8>, &'static str)> {
        let not_found = || StudioError::NotFound("File not found".to_string());
        let safe = !filename.is_empty()
            && !filename.starts_with('.')
            && filename
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !safe {
            return Err(not_found());
        }

        let content_type = match filename.rsplit_once('.').map(|(_, ext)| ext) {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            _ => return Err(not_found()),
        };

        match tokio::fs::read(self.root.join(filename)).await {
            Ok(bytes) => Ok((bytes, content_type)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> UploadStore {
        UploadStore::new(&UploadConfig::default().with_dir(dir.path()))
    }

    #[tokio::test]
    async fn test_save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = store(&dir);
        let image = ImageUpload::new("Reference.JPG", "image/jpeg", vec![0xFF, 0xD8, 0xFF]);

        let url = uploads.save(3, &image).await.unwrap();
        assert!(url.starts_with("/uploads/original-3-"));
        assert!(url.ends_with(".jpg"));

        let filename = url.trim_start_matches("/uploads/");
        let (bytes, content_type) = uploads.read(filename).await.unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_rejects_invalid_images() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = store(&dir);
        let gif = ImageUpload::new("anim.gif", "image/gif", vec![1]);
        assert!(matches!(
            uploads.save(1, &gif).await,
            Err(StudioError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_deletes_saved_file() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = store(&dir);
        let url = uploads
            .save(1, &ImageUpload::new("ref.png", "image/png", vec![1, 2, 3]))
            .await
            .unwrap();

        uploads.remove(&url).await.unwrap();
        let filename = url.trim_start_matches("/uploads/");
        assert!(matches!(
            uploads.read(filename).await,
            Err(StudioError::NotFound(_))
        ));
        uploads.remove(&url).await.unwrap();
        assert!(uploads.remove("/uploads/../secret.png").await.is_err());
        assert!(uploads.remove("/elsewhere/file.png").await.is_err());
    }

    #[tokio::test]
    async fn test_read_refuses_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = store(&dir);
        for name in ["../secret.png", "..", "a/b.png", "missing.png", "notes.txt"] {
            assert!(
                matches!(uploads.read(name).await, Err(StudioError::NotFound(_))),
                "{} should not be readable",
                name
            );
        }
    }
}
