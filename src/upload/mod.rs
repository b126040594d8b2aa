//! Media upload with a non-durable fallback.
//!
//! Uploads go through an [`UploadGateway`]. When the gateway keeps failing the
//! [`Uploader`] hands back a local `data:` URL marked non-durable, so editing
//! continues; a later retry swaps it for a durable URL.

mod mem;
mod uploader;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use mem::MemUploader;
pub use uploader::Uploader;

/// A file to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// destination folder hint
    pub folder: Option<String>,
    pub file_name: Option<String>,
}

impl UploadFile {
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            folder: None,
            file_name: None,
        }
    }

    pub fn with_folder(
        mut self,
        folder: impl Into<String>,
    ) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn with_file_name(
        mut self,
        file_name: impl Into<String>,
    ) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// Durable location returned by the gateway.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Uploaded {
    pub url: String,
    pub mime_type: String,
}

#[async_trait]
pub trait UploadGateway: Send + Sync {
    /// Uploads a file.
    ///
    /// # Arguments
    ///
    /// * `file` - The [`UploadFile`] with its bytes, mime type and folder hint.
    ///
    /// # Returns
    ///
    /// Returns a [`Result<Uploaded>`] with the durable url of the stored file.
    async fn upload(
        &self,
        file: &UploadFile,
    ) -> Result<Uploaded>;
}
