use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{
    BulkRepository, EntityMap, LocalizedCatalogRepository, MetadataRepository, RawLabel,
    Reference, Repository, RepositoryCore, decode,
};
use crate::client::{GallyClient, GallyError};
use crate::entity::{Entity, Metadata, SourceField, SourceFieldType};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceField {
    #[serde(rename = "@id")]
    id: Option<String>,
    metadata: Reference,
    code: String,
    #[serde(rename = "type")]
    field_type: SourceFieldType,
    #[serde(default)]
    default_label: Option<String>,
    #[serde(default)]
    labels: Vec<RawLabel>,
    #[serde(default)]
    is_system: bool,
}

pub struct SourceFieldRepository {
    core: RepositoryCore<SourceField>,
    metadata: Arc<MetadataRepository>,
    localized_catalogs: Arc<LocalizedCatalogRepository>,
}

impl SourceFieldRepository {
    pub fn new(
        client: GallyClient,
        metadata: Arc<MetadataRepository>,
        localized_catalogs: Arc<LocalizedCatalogRepository>,
    ) -> Self {
        Self {
            core: RepositoryCore::new(client),
            metadata,
            localized_catalogs,
        }
    }

    /// Source fields of `metadata` usable as search filters.
    pub async fn find_filterable(
        &self,
        metadata: &Metadata,
    ) -> Result<EntityMap<SourceField>, GallyError> {
        self.find_by(
            &[
                ("metadata.entity", metadata.entity.clone()),
                ("isFilterable", "true".to_string()),
            ],
            true,
        )
        .await
    }

    pub async fn find_select(
        &self,
        metadata: &Metadata,
    ) -> Result<EntityMap<SourceField>, GallyError> {
        self.find_by(
            &[
                ("metadata.entity", metadata.entity.clone()),
                ("type", SourceFieldType::Select.as_str().to_string()),
            ],
            true,
        )
        .await
    }
}

impl Repository for SourceFieldRepository {
    type Entity = SourceField;

    fn core(&self) -> &RepositoryCore<SourceField> {
        &self.core
    }

    async fn build_entity(&self, raw: Value) -> Result<SourceField, GallyError> {
        let raw: RawSourceField = decode(SourceField::RESOURCE, raw)?;
        let metadata = self.metadata.find_by_uri(raw.metadata.iri()).await?;
        let labels = self.localized_catalogs.build_labels(raw.labels).await?;
        Ok(SourceField {
            metadata,
            code: raw.code,
            field_type: raw.field_type,
            default_label: raw.default_label.unwrap_or_default(),
            labels,
            is_system: raw.is_system,
            uri: raw.id,
        })
    }
}

impl BulkRepository for SourceFieldRepository {}
