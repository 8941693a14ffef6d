use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::{CatalogRepository, RawLabel, Reference, Repository, RepositoryCore, decode};
use crate::client::{GallyClient, GallyError};
use crate::entity::{Entity, Label, LocalizedCatalog};

#[derive(Debug, Deserialize)]
struct RawLocalizedCatalog {
    #[serde(rename = "@id")]
    id: Option<String>,
    catalog: Reference,
    code: String,
    name: String,
    locale: String,
    currency: String,
}

pub struct LocalizedCatalogRepository {
    core: RepositoryCore<LocalizedCatalog>,
    catalogs: Arc<CatalogRepository>,
}

impl LocalizedCatalogRepository {
    pub fn new(client: GallyClient, catalogs: Arc<CatalogRepository>) -> Self {
        Self {
            core: RepositoryCore::new(client),
            catalogs,
        }
    }

    /// Turns raw label documents into labels bound to hydrated localized
    /// catalogs.
    pub(crate) async fn build_labels(&self, raw: Vec<RawLabel>) -> Result<Vec<Label>, GallyError> {
        let mut labels = Vec::with_capacity(raw.len());
        for item in raw {
            let localized_catalog = self.find_by_uri(item.localized_catalog.iri()).await?;
            labels.push(Label::new(localized_catalog, item.label));
        }
        Ok(labels)
    }
}

impl Repository for LocalizedCatalogRepository {
    type Entity = LocalizedCatalog;

    fn core(&self) -> &RepositoryCore<LocalizedCatalog> {
        &self.core
    }

    async fn build_entity(&self, raw: Value) -> Result<LocalizedCatalog, GallyError> {
        let raw: RawLocalizedCatalog = decode(LocalizedCatalog::RESOURCE, raw)?;
        let catalog = self.catalogs.find_by_uri(raw.catalog.iri()).await?;
        Ok(LocalizedCatalog {
            catalog,
            code: raw.code,
            name: raw.name,
            locale: raw.locale,
            currency: raw.currency,
            uri: raw.id,
        })
    }
}
