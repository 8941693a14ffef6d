use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::client::{GallyClient, GallyError};
use crate::entity::{LocalizedCatalog, Metadata};
use crate::repository::{
    CatalogRepository, LocalizedCatalogRepository, Reference, Repository, members,
};

pub const INDEX_RESOURCE: &str = "indices";
const INDEX_DOCUMENT_RESOURCE: &str = "index_documents";
const LIVE_STATUS: &str = "live";

/// A search index for one entity type in one localized catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub metadata: Metadata,
    pub localized_catalog: LocalizedCatalog,
    pub name: Option<String>,
}

impl Index {
    pub fn new(metadata: Metadata, localized_catalog: LocalizedCatalog) -> Self {
        Self {
            metadata,
            localized_catalog,
            name: None,
        }
    }

    fn payload(&self) -> Value {
        json!({
            "entityType": self.metadata.entity,
            "localizedCatalog": self.localized_catalog.code,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIndex {
    name: String,
    #[serde(default)]
    entity_type: Option<String>,
    #[serde(default)]
    localized_catalog: Option<Reference>,
    #[serde(default)]
    status: Option<String>,
}

impl RawIndex {
    fn serves(&self, metadata: &Metadata, localized_catalog_uri: Option<&str>) -> bool {
        self.entity_type.as_deref() == Some(metadata.entity.as_str())
            && self.localized_catalog.as_ref().map(Reference::iri) == localized_catalog_uri
            && self.status.as_deref() == Some(LIVE_STATUS)
    }
}

/// Index lifecycle and document bulk indexing.
pub struct IndexOperation {
    client: GallyClient,
    localized_catalogs: Arc<LocalizedCatalogRepository>,
}

impl IndexOperation {
    pub fn new(client: GallyClient) -> Self {
        let catalogs = Arc::new(CatalogRepository::new(client.clone()));
        let localized_catalogs = Arc::new(LocalizedCatalogRepository::new(client.clone(), catalogs));
        Self::with_repository(client, localized_catalogs)
    }

    pub fn with_repository(
        client: GallyClient,
        localized_catalogs: Arc<LocalizedCatalogRepository>,
    ) -> Self {
        Self {
            client,
            localized_catalogs,
        }
    }

    pub async fn create_index(
        &self,
        metadata: &Metadata,
        localized_catalog: &LocalizedCatalog,
    ) -> Result<Index, GallyError> {
        let mut index = Index::new(metadata.clone(), localized_catalog.clone());
        let raw = self.client.post(INDEX_RESOURCE, &index.payload()).await?;
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| GallyError::UnmanagedEntity {
                resource: INDEX_RESOURCE,
                reason: "response carries no index name".to_string(),
            })?;
        index.name = Some(name.to_string());
        Ok(index)
    }

    /// Finds the live index serving `metadata` in `localized_catalog`.
    ///
    /// A localized catalog without locator is looked up by code first; it
    /// must have been synchronized beforehand.
    pub async fn get_index_by_name(
        &self,
        metadata: &Metadata,
        localized_catalog: &mut LocalizedCatalog,
    ) -> Result<Index, GallyError> {
        let raw_indices = self.client.get(INDEX_RESOURCE, &[]).await?;

        if localized_catalog.uri.is_none() {
            let existing = self
                .localized_catalogs
                .find_by(&[("code", localized_catalog.code.clone())], false)
                .await?;
            if existing.len() != 1 {
                return Err(GallyError::StructuralPrecondition(format!(
                    "can't find localized catalog with code '{}', make sure the catalog structure has been synchronized",
                    localized_catalog.code
                )));
            }
            localized_catalog.uri = existing.values().next().and_then(|found| found.uri.clone());
        }

        for raw in members(raw_indices) {
            let Ok(raw) = serde_json::from_value::<RawIndex>(raw) else {
                continue;
            };
            if raw.serves(metadata, localized_catalog.uri.as_deref()) {
                let mut index = Index::new(metadata.clone(), localized_catalog.clone());
                index.name = Some(raw.name);
                return Ok(index);
            }
        }

        Err(GallyError::StructuralPrecondition(format!(
            "index for entity {} and localized catalog {} does not exist yet, make sure everything is reindexed",
            metadata.entity, localized_catalog.code
        )))
    }

    pub async fn refresh_index(&self, name: &str) -> Result<(), GallyError> {
        self.client
            .put(&format!("{INDEX_RESOURCE}/refresh/{name}"), &json!({}))
            .await?;
        Ok(())
    }

    pub async fn install_index(&self, name: &str) -> Result<(), GallyError> {
        self.client
            .put(&format!("{INDEX_RESOURCE}/install/{name}"), &json!({}))
            .await?;
        Ok(())
    }

    pub async fn execute_bulk(&self, name: &str, documents: &[Value]) -> Result<(), GallyError> {
        tracing::debug!(index = name, documents = documents.len(), "indexing documents");
        self.client
            .post(
                INDEX_DOCUMENT_RESOURCE,
                &json!({ "indexName": name, "documents": documents }),
            )
            .await?;
        Ok(())
    }
}
