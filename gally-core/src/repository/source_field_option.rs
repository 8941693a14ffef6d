use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{
    BulkRepository, LocalizedCatalogRepository, RawLabel, Reference, Repository, RepositoryCore,
    SourceFieldRepository, decode,
};
use crate::client::{GallyClient, GallyError};
use crate::entity::{Entity, SourceFieldOption};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceFieldOption {
    #[serde(rename = "@id")]
    id: Option<String>,
    source_field: Reference,
    code: String,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    default_label: Option<String>,
    #[serde(default)]
    labels: Vec<RawLabel>,
}

pub struct SourceFieldOptionRepository {
    core: RepositoryCore<SourceFieldOption>,
    source_fields: Arc<SourceFieldRepository>,
    localized_catalogs: Arc<LocalizedCatalogRepository>,
}

impl SourceFieldOptionRepository {
    pub fn new(
        client: GallyClient,
        source_fields: Arc<SourceFieldRepository>,
        localized_catalogs: Arc<LocalizedCatalogRepository>,
    ) -> Self {
        Self {
            core: RepositoryCore::new(client),
            source_fields,
            localized_catalogs,
        }
    }
}

impl Repository for SourceFieldOptionRepository {
    type Entity = SourceFieldOption;

    fn core(&self) -> &RepositoryCore<SourceFieldOption> {
        &self.core
    }

    async fn build_entity(&self, raw: Value) -> Result<SourceFieldOption, GallyError> {
        let raw: RawSourceFieldOption = decode(SourceFieldOption::RESOURCE, raw)?;
        let source_field = self.source_fields.find_by_uri(raw.source_field.iri()).await?;
        let labels = self.localized_catalogs.build_labels(raw.labels).await?;
        Ok(SourceFieldOption {
            source_field,
            code: raw.code,
            position: raw.position.unwrap_or(0),
            default_label: raw.default_label.unwrap_or_default(),
            labels,
            uri: raw.id,
        })
    }
}

impl BulkRepository for SourceFieldOptionRepository {}
