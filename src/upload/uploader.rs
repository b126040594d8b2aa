use std::{sync::Arc, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::{debug, warn};

use crate::{
    FlowError, Result,
    config::UploadConfig,
    model::MediaRef,
    upload::{UploadFile, UploadGateway},
};

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// Uploads media with retry, falling back to a local reference.
#[derive(Clone)]
pub struct Uploader {
    gateway: Arc<dyn UploadGateway>,
    config: UploadConfig,
}

impl Uploader {
    pub fn new(
        gateway: Arc<dyn UploadGateway>,
        config: UploadConfig,
    ) -> Self {
        Self {
            gateway,
            config,
        }
    }

    /// Upload `file`; after `retry_times` retries fall back to a non-durable
    /// `data:` reference instead of failing.
    ///
    /// Fails only for an empty file.
    pub async fn upload(
        &self,
        mut file: UploadFile,
    ) -> Result<MediaRef> {
        if file.bytes.is_empty() {
            return Err(FlowError::Upload("cannot upload an empty file".into()));
        }
        if file.folder.is_none() {
            file.folder = Some(self.config.default_folder.clone());
        }

        match self.upload_with_retry(&file).await {
            Ok(media) => Ok(media),
            Err(err) => {
                warn!(error = %err, mime = %file.mime_type, "upload failed, keeping a local reference");
                Ok(MediaRef::fallback(to_data_url(&file), file.mime_type, file.folder))
            }
        }
    }

    /// Re-upload a fallback reference. Durable references are returned as-is.
    pub async fn retry(
        &self,
        media: &MediaRef,
    ) -> Result<MediaRef> {
        if media.durable {
            return Ok(media.clone());
        }
        let mut file = from_data_url(&media.url)?;
        file.folder = media.folder.clone().or_else(|| Some(self.config.default_folder.clone()));
        self.upload_with_retry(&file).await
    }

    async fn upload_with_retry(
        &self,
        file: &UploadFile,
    ) -> Result<MediaRef> {
        let mut attempt = 0;
        loop {
            match self.gateway.upload(file).await {
                Ok(uploaded) => {
                    debug!(url = %uploaded.url, "upload stored");
                    return Ok(MediaRef::durable(uploaded.url, uploaded.mime_type, file.folder.clone()));
                }
                Err(err) if attempt < self.config.retry_times => {
                    attempt += 1;
                    warn!(attempt, error = %err, "upload failed, retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.retry_interval_ms)).await;
                }
                Err(err) => return Err(FlowError::Upload(err.to_string())),
            }
        }
    }
}

fn to_data_url(file: &UploadFile) -> String {
    format!("{}{}{}{}", DATA_URL_PREFIX, file.mime_type, BASE64_MARKER, STANDARD.encode(&file.bytes))
}

fn from_data_url(url: &str) -> Result<UploadFile> {
    let rest = url.strip_prefix(DATA_URL_PREFIX).ok_or_else(|| FlowError::Upload(format!("not a local reference: {}", url)))?;
    let (mime_type, payload) = rest.split_once(BASE64_MARKER).ok_or_else(|| FlowError::Upload("local reference is not base64 encoded".into()))?;
    Ok(UploadFile::new(STANDARD.decode(payload)?, mime_type))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::MemUploader;

    fn uploader(gateway: &MemUploader) -> Uploader {
        Uploader::new(Arc::new(gateway.clone()), UploadConfig::default())
    }

    fn png() -> UploadFile {
        UploadFile::new(vec![0x89, 0x50, 0x4e, 0x47], "image/png").with_file_name("cat.png")
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_returns_durable_reference() {
        let gateway = MemUploader::new();
        let media = uploader(&gateway).upload(png().with_folder("images")).await.unwrap();

        assert!(media.durable);
        assert!(!media.is_retry_pending());
        assert!(media.url.starts_with("mem://images/"));
        assert_eq!(gateway.get(&media.url).unwrap().bytes, png().bytes);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_upload_falls_back_then_retry_recovers() {
        let gateway = MemUploader::new();
        gateway.set_online(false);
        let uploader = uploader(&gateway);

        let fallback = uploader.upload(png()).await.unwrap();
        assert!(fallback.is_retry_pending());
        assert!(fallback.url.starts_with("data:image/png;base64,"));
        assert_eq!(fallback.folder.as_deref(), Some("uploads"));
        assert!(gateway.is_empty());

        assert!(matches!(uploader.retry(&fallback).await, Err(FlowError::Upload(_))));

        gateway.set_online(true);
        let durable = uploader.retry(&fallback).await.unwrap();
        assert!(!durable.is_retry_pending());
        assert!(durable.url.starts_with("mem://uploads/"));
        assert_eq!(gateway.get(&durable.url).unwrap().bytes, png().bytes);
    }

    #[tokio::test]
    async fn test_empty_file_is_rejected() {
        let gateway = MemUploader::new();
        let err = uploader(&gateway).upload(UploadFile::new(Vec::new(), "image/png")).await.unwrap_err();
        assert!(matches!(err, FlowError::Upload(_)));
    }

    #[tokio::test]
    async fn test_retry_of_durable_reference_is_a_noop() {
        let gateway = MemUploader::new();
        let media = MediaRef::durable("https://cdn/a.png", "image/png", None);
        assert_eq!(uploader(&gateway).retry(&media).await.unwrap(), media);
        assert!(gateway.is_empty());
    }
}
