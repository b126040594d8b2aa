use std::{
    collections::HashMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use tracing::trace;

use crate::{
    FlowError, Result, ShareLock,
    upload::{UploadFile, UploadGateway, Uploaded},
    utils,
};

/// In-memory upload gateway. Files are addressed as `mem://<folder>/<id>`.
///
/// Can be switched offline to simulate an unavailable gateway.
#[derive(Debug, Clone)]
pub struct MemUploader {
    files: ShareLock<HashMap<String, UploadFile>>,
    online: Arc<AtomicBool>,
}

impl Default for MemUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl MemUploader {
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(HashMap::new())),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_online(
        &self,
        online: bool,
    ) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn get(
        &self,
        url: &str,
    ) -> Option<UploadFile> {
        self.files.read().unwrap().get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.files.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UploadGateway for MemUploader {
    async fn upload(
        &self,
        file: &UploadFile,
    ) -> Result<Uploaded> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(FlowError::Upload("upload gateway unavailable".into()));
        }
        let folder = file.folder.as_deref().unwrap_or("uploads");
        let name = match &file.file_name {
            Some(name) => format!("{}-{}", utils::shortid(), name),
            None => utils::shortid(),
        };
        let url = format!("mem://{}/{}", folder, name);
        trace!("uploader::upload({})", url);

        self.files.write().unwrap().insert(url.clone(), file.clone());
        Ok(Uploaded {
            url,
            mime_type: file.mime_type.clone(),
        })
    }
}
