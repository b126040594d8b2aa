use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{
    FlowError, Result, ShareLock,
    model::{DocumentId, GraphDocument},
    persist::PersistenceGateway,
};

/// Stored row: document metadata next to the serialized snapshot.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub data: String,
    pub create_time: i64,
    pub update_time: i64,
}

impl StoredDocument {
    fn from_document(document: &GraphDocument) -> Result<Self> {
        Ok(Self {
            id: document.id().clone(),
            owner_id: document.owner_id().to_string(),
            name: document.name().to_string(),
            data: document.to_json()?,
            create_time: document.created_at(),
            update_time: document.updated_at(),
        })
    }
}

/// In-memory persistence gateway.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    documents: ShareLock<HashMap<DocumentId, StoredDocument>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Stored rows owned by `owner_id`, most recently updated first.
    pub fn list(
        &self,
        owner_id: &str,
    ) -> Vec<StoredDocument> {
        let documents = self.documents.read().unwrap();
        let mut rows: Vec<StoredDocument> = documents.values().filter(|d| d.owner_id == owner_id).cloned().collect();
        rows.sort_by(|a, b| b.update_time.cmp(&a.update_time).then_with(|| a.id.cmp(&b.id)));
        rows
    }

    pub fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        trace!("store::delete({})", id);
        Ok(self.documents.write().unwrap().remove(id).is_some())
    }
}

#[async_trait]
impl PersistenceGateway for MemStore {
    async fn save(
        &self,
        document: &GraphDocument,
    ) -> Result<bool> {
        trace!("store::save({}, {})", document.id(), document.updated_at());
        if document.id().is_empty() {
            return Err(FlowError::Persistence("missing id in graph document".into()));
        }
        let row = StoredDocument::from_document(document)?;

        let mut documents = self.documents.write().unwrap();
        if let Some(stored) = documents.get(document.id())
            && stored.update_time > row.update_time
        {
            warn!(doc = %document.id(), stored = stored.update_time, incoming = row.update_time, "discarding stale save");
            return Ok(false);
        }
        documents.insert(row.id.clone(), row);
        Ok(true)
    }

    async fn load(
        &self,
        id: &str,
    ) -> Result<GraphDocument> {
        trace!("store::load({})", id);
        let row = self.documents.read().unwrap().get(id).cloned().ok_or_else(|| FlowError::NotFound(id.to_string()))?;
        GraphDocument::from_json(&row.data)
    }

    async fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        Ok(self.documents.read().unwrap().contains_key(id))
    }
}
