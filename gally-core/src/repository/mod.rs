//! Identity-keyed repositories over the Gally resource collections.
//!
//! Each repository keeps two caches, by identity and by locator, that are
//! always updated together. Concrete repositories only supply hydration from
//! raw JSON; listing, pagination, upsert, deletion and bulk staging are
//! shared through the [`Repository`] and [`BulkRepository`] default methods.

mod catalog;
mod localized_catalog;
mod metadata;
mod source_field;
mod source_field_option;

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::client::{GallyClient, GallyError};
use crate::entity::Entity;

pub use catalog::CatalogRepository;
pub use localized_catalog::LocalizedCatalogRepository;
pub use metadata::MetadataRepository;
pub use source_field::SourceFieldRepository;
pub use source_field_option::SourceFieldOptionRepository;

pub const FETCH_PAGE_SIZE: usize = 50;
pub const LOCATOR_KEY: &str = "@id";
const MEMBER_KEY: &str = "hydra:member";

/// Entities found by a listing, keyed by identity in response order.
pub type EntityMap<E> = IndexMap<String, E>;

struct EntityCache<E> {
    by_identity: HashMap<String, E>,
    by_uri: HashMap<String, E>,
}

impl<E: Entity> EntityCache<E> {
    fn new() -> Self {
        Self {
            by_identity: HashMap::new(),
            by_uri: HashMap::new(),
        }
    }

    fn by_identity(&self, identity: &str) -> Option<&E> {
        self.by_identity.get(identity)
    }

    fn by_uri(&self, uri: &str) -> Option<&E> {
        self.by_uri.get(uri)
    }

    /// Never leaves an identity pointing at two locators or a locator
    /// pointing at two identities.
    fn store(&mut self, entity: E) {
        let Some(uri) = entity.uri().map(str::to_owned) else {
            return;
        };
        let identity = entity.identity();

        let stale_uri = self
            .by_identity
            .get(&identity)
            .and_then(|previous| previous.uri())
            .filter(|previous| *previous != uri)
            .map(str::to_owned);
        if let Some(stale_uri) = stale_uri {
            self.by_uri.remove(&stale_uri);
        }
        let stale_identity = self
            .by_uri
            .get(&uri)
            .map(|previous| previous.identity())
            .filter(|previous| *previous != identity);
        if let Some(stale_identity) = stale_identity {
            self.by_identity.remove(&stale_identity);
        }

        self.by_identity.insert(identity, entity.clone());
        self.by_uri.insert(uri, entity);
    }

    fn evict(&mut self, identity: &str) {
        if let Some(entity) = self.by_identity.remove(identity) {
            if let Some(uri) = entity.uri() {
                self.by_uri.remove(uri);
            }
        }
    }
}

/// State shared by every repository: the transport, both caches and the
/// bulk staging buffer.
pub struct RepositoryCore<E> {
    client: GallyClient,
    cache: Mutex<EntityCache<E>>,
    bulk: Mutex<Vec<E>>,
}

impl<E: Entity> RepositoryCore<E> {
    pub fn new(client: GallyClient) -> Self {
        Self {
            client,
            cache: Mutex::new(EntityCache::new()),
            bulk: Mutex::new(Vec::new()),
        }
    }

    pub fn client(&self) -> &GallyClient {
        &self.client
    }

    async fn store(&self, entity: E) {
        self.cache.lock().await.store(entity);
    }
}

#[allow(async_fn_in_trait)]
pub trait Repository {
    type Entity: Entity;

    fn core(&self) -> &RepositoryCore<Self::Entity>;

    /// Hydrates one raw API document, resolving nested references through
    /// sibling repositories.
    async fn build_entity(&self, raw: Value) -> Result<Self::Entity, GallyError>;

    async fn find_by_uri(&self, uri: &str) -> Result<Self::Entity, GallyError> {
        let cached = self.core().cache.lock().await.by_uri(uri).cloned();
        if let Some(entity) = cached {
            tracing::debug!(resource = <Self::Entity as Entity>::RESOURCE, uri, "cache hit");
            return Ok(entity);
        }

        let raw = self.core().client.get(uri, &[]).await?;
        let entity = self.build_entity(raw).await?;
        self.core().store(entity.clone()).await;
        Ok(entity)
    }

    /// Cache lookup only, never hits the network.
    async fn find_by_identity(&self, entity: &Self::Entity) -> Option<Self::Entity> {
        self.core()
            .cache
            .lock()
            .await
            .by_identity(&entity.identity())
            .cloned()
    }

    async fn find_by(
        &self,
        criteria: &[(&str, String)],
        cache_results: bool,
    ) -> Result<EntityMap<Self::Entity>, GallyError> {
        let resource = <Self::Entity as Entity>::RESOURCE;
        let mut entities = EntityMap::new();
        let mut current_page = 1usize;
        loop {
            let mut query = criteria.to_vec();
            query.push(("currentPage", current_page.to_string()));
            query.push(("pageSize", FETCH_PAGE_SIZE.to_string()));

            let page = members(self.core().client.get(resource, &query).await?);
            let fetched = page.len();
            for raw in page {
                let entity = self.build_entity(raw).await?;
                if cache_results {
                    self.core().store(entity.clone()).await;
                }
                entities.insert(entity.identity(), entity);
            }
            tracing::debug!(resource, current_page, fetched, "fetched page");

            if fetched < FETCH_PAGE_SIZE {
                break;
            }
            current_page += 1;
        }
        Ok(entities)
    }

    async fn find_all(&self) -> Result<EntityMap<Self::Entity>, GallyError> {
        self.find_by(&[], true).await
    }

    /// Updates the entity when its identity is cached or it already carries a
    /// locator, creates it otherwise. The returned locator is written back
    /// into `entity`.
    async fn create_or_update(&self, entity: &mut Self::Entity) -> Result<(), GallyError> {
        ensure_resolved(entity)?;
        let resource = <Self::Entity as Entity>::RESOURCE;
        let identity = entity.identity();
        let cached_uri = self
            .core()
            .cache
            .lock()
            .await
            .by_identity(&identity)
            .and_then(|cached| cached.uri().map(str::to_owned));

        let payload = entity.payload(false);
        let response = match cached_uri.or_else(|| entity.uri().map(str::to_owned)) {
            Some(uri) => {
                tracing::debug!(resource, %identity, %uri, "updating entity");
                self.core().client.put(&uri, &payload).await?
            }
            None => {
                tracing::debug!(resource, %identity, "creating entity");
                self.core().client.post(resource, &payload).await?
            }
        };

        let uri = locator(resource, &response)?;
        entity.set_uri(uri);
        self.core().store(entity.clone()).await;
        Ok(())
    }

    /// Deletes a previously fetched entity; the identity must be cached.
    async fn delete(&self, entity: &Self::Entity) -> Result<(), GallyError> {
        let identity = entity.identity();
        let uri = self
            .core()
            .cache
            .lock()
            .await
            .by_identity(&identity)
            .and_then(|cached| cached.uri().map(str::to_owned))
            .ok_or_else(|| GallyError::NotFound(identity.clone()))?;

        self.core().client.delete(&uri).await?;
        self.core().cache.lock().await.evict(&identity);
        Ok(())
    }
}

/// Repositories whose collection accepts a multi-document write on
/// `{resource}/bulk`.
#[allow(async_fn_in_trait)]
pub trait BulkRepository: Repository {
    async fn add_entity_to_bulk(&self, entity: &Self::Entity) -> Result<(), GallyError> {
        ensure_resolved(entity)?;
        tracing::debug!(
            resource = <Self::Entity as Entity>::RESOURCE,
            identity = %entity.identity(),
            "staging entity for bulk"
        );
        self.core().bulk.lock().await.push(entity.clone());
        Ok(())
    }

    async fn pending_bulk(&self) -> usize {
        self.core().bulk.lock().await.len()
    }

    /// Sends every staged entity in one request, in staging order, and
    /// returns how many were flushed. The buffer is cleared once the write
    /// succeeded; response members that fail to hydrate are logged and left
    /// out of the cache.
    async fn run_bulk(&self) -> Result<usize, GallyError> {
        let resource = <Self::Entity as Entity>::RESOURCE;
        let (staged, payload) = {
            let bulk = self.core().bulk.lock().await;
            let payload: Vec<Value> = bulk.iter().map(|entity| entity.payload(true)).collect();
            (bulk.len(), Value::Array(payload))
        };
        if staged == 0 {
            return Ok(0);
        }

        let response = self
            .core()
            .client
            .post(&format!("{resource}/bulk"), &payload)
            .await?;
        self.core().bulk.lock().await.drain(..staged);

        for raw in members(response) {
            if raw.get(LOCATOR_KEY).is_none() {
                continue;
            }
            match self.build_entity(raw).await {
                Ok(entity) => self.core().store(entity).await,
                Err(err) => {
                    tracing::warn!(resource, error = %err, "skipping unreadable bulk member")
                }
            }
        }
        tracing::debug!(resource, staged, "bulk flushed");
        Ok(staged)
    }
}

/// An IRI reference as returned by the API: either the bare IRI or an
/// embedded document carrying `@id`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Reference {
    Iri(String),
    Embedded {
        #[serde(rename = "@id")]
        id: String,
    },
}

impl Reference {
    pub(crate) fn iri(&self) -> &str {
        match self {
            Reference::Iri(iri) => iri,
            Reference::Embedded { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawLabel {
    #[serde(rename = "localizedCatalog")]
    pub(crate) localized_catalog: Reference,
    pub(crate) label: String,
}

pub(crate) fn decode<T: DeserializeOwned>(
    resource: &'static str,
    raw: Value,
) -> Result<T, GallyError> {
    serde_json::from_value(raw).map_err(|err| GallyError::UnmanagedEntity {
        resource,
        reason: err.to_string(),
    })
}

/// Unwraps a collection response, accepting a bare array or a Hydra
/// envelope.
pub(crate) fn members(response: Value) -> Vec<Value> {
    match response {
        Value::Array(items) => items,
        Value::Object(mut envelope) => match envelope.remove(MEMBER_KEY) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

fn locator(resource: &'static str, response: &Value) -> Result<String, GallyError> {
    response
        .get(LOCATOR_KEY)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| GallyError::UnmanagedEntity {
            resource,
            reason: format!("response carries no {LOCATOR_KEY}"),
        })
}

fn ensure_resolved<E: Entity>(entity: &E) -> Result<(), GallyError> {
    match entity.unresolved_reference() {
        Some(reference) => Err(GallyError::StructuralPrecondition(format!(
            "{} {} references {reference}, which has not been synchronized",
            E::RESOURCE,
            entity.identity()
        ))),
        None => Ok(()),
    }
}
