use serde::Deserialize;
use serde_json::Value;

use super::{Repository, RepositoryCore, decode};
use crate::client::{GallyClient, GallyError};
use crate::entity::{Entity, Metadata};

#[derive(Debug, Deserialize)]
struct RawMetadata {
    #[serde(rename = "@id")]
    id: Option<String>,
    entity: String,
}

pub struct MetadataRepository {
    core: RepositoryCore<Metadata>,
}

impl MetadataRepository {
    pub fn new(client: GallyClient) -> Self {
        Self {
            core: RepositoryCore::new(client),
        }
    }
}

impl Repository for MetadataRepository {
    type Entity = Metadata;

    fn core(&self) -> &RepositoryCore<Metadata> {
        &self.core
    }

    async fn build_entity(&self, raw: Value) -> Result<Metadata, GallyError> {
        let raw: RawMetadata = decode(Metadata::RESOURCE, raw)?;
        Ok(Metadata {
            entity: raw.entity,
            uri: raw.id,
        })
    }
}
