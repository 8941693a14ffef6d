use serde::Deserialize;
use serde_json::Value;

use super::{Repository, RepositoryCore, decode};
use crate::client::{GallyClient, GallyError};
use crate::entity::{Catalog, Entity};

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(rename = "@id")]
    id: Option<String>,
    code: String,
    name: String,
}

pub struct CatalogRepository {
    core: RepositoryCore<Catalog>,
}

impl CatalogRepository {
    pub fn new(client: GallyClient) -> Self {
        Self {
            core: RepositoryCore::new(client),
        }
    }
}

impl Repository for CatalogRepository {
    type Entity = Catalog;

    fn core(&self) -> &RepositoryCore<Catalog> {
        &self.core
    }

    async fn build_entity(&self, raw: Value) -> Result<Catalog, GallyError> {
        let raw: RawCatalog = decode(Catalog::RESOURCE, raw)?;
        Ok(Catalog {
            code: raw.code,
            name: raw.name,
            uri: raw.id,
        })
    }
}
