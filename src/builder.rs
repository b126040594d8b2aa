use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::{
    Config, Editor, FlowError, Result,
    config::StoreType,
    identity::{IdentityProvider, StaticIdentity},
    persist::{MemStore, PersistenceGateway},
    registry::NodeRegistry,
    upload::{MemUploader, UploadGateway, Uploader},
};

pub struct EditorBuilder {
    config: Config,
    registry: Option<NodeRegistry>,
    store: Option<Arc<dyn PersistenceGateway>>,
    upload: Option<Arc<dyn UploadGateway>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    async_worker_thread_number: u16,
    rt: Option<Handle>,
}

impl Default for EditorBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            registry: None,
            store: None,
            upload: None,
            identity: None,
            async_worker_thread_number: 4,
            rt: None,
        }
    }
}

impl EditorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(
        mut self,
        config: Config,
    ) -> Self {
        self.config = config;
        self
    }

    /// Node registry to use instead of the built-in one.
    pub fn registry(
        mut self,
        registry: NodeRegistry,
    ) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(
        mut self,
        store: Arc<dyn PersistenceGateway>,
    ) -> Self {
        self.store = Some(store);
        self
    }

    pub fn upload_gateway(
        mut self,
        gateway: Arc<dyn UploadGateway>,
    ) -> Self {
        self.upload = Some(gateway);
        self
    }

    pub fn identity(
        mut self,
        identity: impl IdentityProvider + 'static,
    ) -> Self {
        self.identity = Some(Arc::new(identity));
        self
    }

    pub fn async_worker_thread_number(
        mut self,
        n: u16,
    ) -> Self {
        self.async_worker_thread_number = n;
        self
    }

    /// Runtime to spawn workers on; defaults to the ambient one.
    pub fn runtime(
        mut self,
        handle: Handle,
    ) -> Self {
        self.rt = Some(handle);
        self
    }

    pub fn build(self) -> Result<Editor> {
        self.config.validate()?;
        let (handle, runtime) = match self.rt.or_else(|| Handle::try_current().ok()) {
            Some(handle) => (handle, None),
            None => {
                let runtime: Arc<Runtime> = Arc::new(
                    Builder::new_multi_thread()
                        .worker_threads(self.async_worker_thread_number.max(1).into())
                        .enable_all()
                        .build()
                        .map_err(|e| FlowError::IoError(format!("failed to build runtime: {}", e)))?,
                );
                (runtime.handle().clone(), Some(runtime))
            }
        };

        let store = match self.store {
            Some(store) => store,
            None => match self.config.store.store_type {
                StoreType::Mem => Arc::new(MemStore::new()),
            },
        };
        let upload = self.upload.unwrap_or_else(|| Arc::new(MemUploader::new()));
        let uploader = Uploader::new(upload, self.config.upload.clone());
        let identity = self.identity.unwrap_or_else(|| Arc::new(StaticIdentity::anonymous()));
        let registry = Arc::new(self.registry.unwrap_or_else(NodeRegistry::with_builtins));

        Ok(Editor::new(self.config, registry, store, uploader, identity, handle, runtime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_rejects_config_without_save_retries() {
        let mut config = Config::default();
        config.autosave.retry_times = 0;

        let result = EditorBuilder::new().config(config).build();
        assert!(matches!(result, Err(FlowError::Config(msg)) if msg.contains("autosave.retry_times")));
    }

    #[test]
    fn test_build_rejects_config_without_upload_retries() {
        let mut config = Config::default();
        config.upload.retry_times = 0;

        let result = EditorBuilder::new().config(config).build();
        assert!(matches!(result, Err(FlowError::Config(msg)) if msg.contains("upload.retry_times")));
    }

    #[tokio::test]
    async fn test_build_accepts_valid_config() {
        let mut config = Config::default();
        config.autosave.retry_times = 3;

        let editor = EditorBuilder::new().config(config).build().unwrap();
        assert_eq!(editor.config().autosave.retry_times, 3);
    }
}
